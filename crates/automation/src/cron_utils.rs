use chrono::{DateTime, TimeZone};
use cron::Schedule;
use iothub_core::{IotError, IotResult};
use std::str::FromStr;

/// 定时触发的CRON表达式
///
/// 支持带秒的6/7段格式；常见的5段格式（分 时 日 月 周）按第0秒补齐。
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expr: String,
    schedule: Schedule,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> IotResult<Self> {
        let normalized = normalize(expr);
        let schedule = Schedule::from_str(&normalized).map_err(|e| IotError::InvalidCron {
            expr: expr.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            expr: expr.trim().to_string(),
            schedule,
        })
    }

    pub fn expr(&self) -> &str {
        &self.expr
    }

    /// `from` 之后的下一次触发时间
    pub fn next_after<Tz: TimeZone>(&self, from: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.after(from).next()
    }

    pub fn upcoming<Tz: TimeZone>(&self, from: &DateTime<Tz>, count: usize) -> Vec<DateTime<Tz>> {
        self.schedule.after(from).take(count).collect()
    }

    pub fn validate(expr: &str) -> IotResult<()> {
        Self::parse(expr).map(|_| ())
    }
}

fn normalize(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Timelike, Utc};

    #[test]
    fn test_six_field_expression() {
        let cron = CronSchedule::parse("0 30 8 * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let next = cron.next_after(&from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 2, 8, 30, 0).unwrap());
    }

    #[test]
    fn test_five_field_expression_gets_seconds() {
        let cron = CronSchedule::parse("*/15 * * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 1, 1, 9, 1, 0).unwrap();
        let times = cron.upcoming(&from, 2);
        assert_eq!(times[0].minute(), 15);
        assert_eq!(times[0].second(), 0);
        assert_eq!(times[1].minute(), 30);
        assert_eq!(cron.expr(), "*/15 * * * *");
    }

    #[test]
    fn test_invalid_expression() {
        let err = CronSchedule::parse("every morning").unwrap_err();
        assert!(matches!(err, IotError::InvalidCron { .. }));
        assert!(CronSchedule::validate("0 61 * * * *").is_err());
        assert!(CronSchedule::validate("").is_err());
    }
}
