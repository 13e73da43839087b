//! 设备控制指令下发与应答关联

pub mod correlator;
pub mod sequence;

pub use correlator::CommandCorrelator;
pub use sequence::SequenceGenerator;
