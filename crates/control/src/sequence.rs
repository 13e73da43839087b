use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// 基于时间的指令序列号
///
/// 格式为 `yyyyMMddHHmmssSSS` 加四位序号。同一毫秒内序号递增，溢出时借用下一毫秒；
/// 时钟回拨时沿用上一次的时间，保证进程内单调且唯一。
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    last: Mutex<(i64, u32)>,
}

const PER_MILLI: u32 = 10_000;

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> String {
        self.next_at(Utc::now().timestamp_millis())
    }

    fn next_at(&self, now_millis: i64) -> String {
        let (millis, counter) = {
            let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
            *last = if now_millis > last.0 {
                (now_millis, 0)
            } else if last.1 + 1 < PER_MILLI {
                (last.0, last.1 + 1)
            } else {
                (last.0 + 1, 0)
            };
            *last
        };

        let stamp = DateTime::<Utc>::from_timestamp_millis(millis)
            .map(|t| t.format("%Y%m%d%H%M%S%3f").to_string())
            .unwrap_or_else(|| millis.to_string());
        format!("{stamp}{counter:04}")
    }
}
