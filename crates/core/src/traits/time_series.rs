use async_trait::async_trait;

use crate::{
    models::{ColumnDef, SubTableBatch},
    IotResult,
};

/// 时序库抽象
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// 超级表的属性列（不含时间戳与标签列），超级表不存在时返回 `None`
    async fn describe(&self, stable: &str) -> IotResult<Option<Vec<String>>>;

    /// 创建超级表，已存在视为成功
    async fn create_stable(&self, stable: &str, columns: &[ColumnDef]) -> IotResult<()>;

    /// 为超级表增加一列，列已存在视为成功
    async fn add_column(&self, stable: &str, column: &ColumnDef) -> IotResult<()>;

    /// 以一次请求写入多张子表，返回写入行数
    async fn insert(&self, batches: &[SubTableBatch]) -> IotResult<usize>;
}
