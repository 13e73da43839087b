//! 条件 DSL：场景与告警规则共用的触发条件、通知与动作定义

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::{IotError, IotResult};

pub const OPT_CODE: &str = "code";
pub const OPT_OPERATOR: &str = "operator";
pub const OPT_VALUE: &str = "value";
pub const OPT_VALUE_TYPE: &str = "valueType";
pub const OPT_AGGREGATION: &str = "aggregation";
pub const OPT_EVENT_CODE: &str = "eventCode";
pub const OPT_STATUS: &str = "status";
pub const OPT_CRON: &str = "cron";

/// 触发类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    #[serde(rename = "设备数据触发")]
    DeviceData,
    #[serde(rename = "设备事件触发")]
    DeviceEvent,
    #[serde(rename = "设备状态触发")]
    DeviceStatus,
    #[serde(rename = "定时触发")]
    Timer,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::DeviceData => "设备数据触发",
            TriggerKind::DeviceEvent => "设备事件触发",
            TriggerKind::DeviceStatus => "设备状态触发",
            TriggerKind::Timer => "定时触发",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个触发条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRule {
    pub trigger: TriggerKind,
    #[serde(default)]
    pub devices: Vec<String>,
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl SubRule {
    pub fn new(trigger: TriggerKind) -> Self {
        Self {
            trigger,
            devices: Vec::new(),
            options: HashMap::new(),
        }
    }

    pub fn device(mut self, device_id: impl Into<String>) -> Self {
        self.devices.push(device_id.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn opt(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn require(&self, key: &str) -> IotResult<&str> {
        self.opt(key).ok_or_else(|| {
            IotError::invalid_rule(format!("{}缺少参数 {}", self.trigger, key))
        })
    }
}

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Operator {
    pub fn parse(raw: &str) -> IotResult<Self> {
        match raw.trim() {
            ">" | "gt" | "大于" => Ok(Operator::Gt),
            ">=" | "ge" | "大于等于" => Ok(Operator::Ge),
            "<" | "lt" | "小于" => Ok(Operator::Lt),
            "<=" | "le" | "小于等于" => Ok(Operator::Le),
            "=" | "==" | "eq" | "等于" => Ok(Operator::Eq),
            "!=" | "<>" | "ne" | "不等于" => Ok(Operator::Ne),
            other => Err(IotError::invalid_rule(format!("不支持的比较运算符: {other}"))),
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Eq => "=",
            Operator::Ne => "!=",
        }
    }

    pub fn is_equality(&self) -> bool {
        matches!(self, Operator::Eq | Operator::Ne)
    }
}

/// 窗口聚合函数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
    Avg,
    Max,
    Min,
    Sum,
}

impl AggregateFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunc::Avg => "avg",
            AggregateFunc::Max => "max",
            AggregateFunc::Min => "min",
            AggregateFunc::Sum => "sum",
        }
    }
}

/// 滚动窗口聚合，如 `avg/5分钟周期`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub func: AggregateFunc,
    pub seconds: u64,
}

/// 聚合窗口上限：一天
pub const MAX_WINDOW_SECONDS: u64 = 24 * 3600;

/// 解析聚合选项，`raw` 或空表示不聚合
pub fn parse_window(raw: &str) -> IotResult<Option<Window>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("raw") || raw == "原始值" {
        return Ok(None);
    }

    let invalid = || IotError::invalid_rule(format!("无效的聚合方式: {raw}"));

    let (func, period) = raw.split_once('/').ok_or_else(invalid)?;
    let func = match func.trim().to_ascii_lowercase().as_str() {
        "avg" => AggregateFunc::Avg,
        "max" => AggregateFunc::Max,
        "min" => AggregateFunc::Min,
        "sum" => AggregateFunc::Sum,
        _ => return Err(invalid()),
    };

    let period = period.trim().trim_end_matches("周期").trim();
    let split = period
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (amount, unit) = period.split_at(split);
    let amount: u64 = amount.parse().map_err(|_| invalid())?;
    let multiplier = match unit.trim() {
        "秒" | "s" => 1,
        "分钟" | "分" | "m" | "min" => 60,
        "小时" | "时" | "h" => 3600,
        _ => return Err(invalid()),
    };

    let seconds = amount
        .checked_mul(multiplier)
        .filter(|seconds| (1..=MAX_WINDOW_SECONDS).contains(seconds))
        .ok_or_else(invalid)?;

    Ok(Some(Window { func, seconds }))
}

/// 通知渠道
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifySink {
    /// 渠道类型，如 `webhook`、`log`
    pub kind: String,
    /// 渠道目标，如回调地址
    #[serde(default)]
    pub target: String,
}

/// 告警通知配置
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Notify {
    #[serde(default)]
    pub sinks: Vec<NotifySink>,
    /// 每日生效时段 `HH:MM-HH:MM`，为空表示全天
    #[serde(default)]
    pub effective: Option<String>,
}

impl Notify {
    pub fn window(&self) -> IotResult<Option<EffectiveWindow>> {
        self.effective
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(EffectiveWindow::parse)
            .transpose()
    }

    /// 给定本地时刻是否在生效时段内
    pub fn is_effective_at(&self, time: NaiveTime) -> IotResult<bool> {
        Ok(self.window()?.map_or(true, |w| w.contains(time)))
    }
}

/// 每日生效时段，允许跨零点（如 `22:00-06:00`）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl EffectiveWindow {
    pub fn parse(raw: &str) -> IotResult<Self> {
        let invalid = || IotError::invalid_rule(format!("无效的生效时段: {raw}"));
        let (start, end) = raw.split_once('-').ok_or_else(invalid)?;
        let start = NaiveTime::parse_from_str(start.trim(), "%H:%M").map_err(|_| invalid())?;
        let end = NaiveTime::parse_from_str(end.trim(), "%H:%M").map_err(|_| invalid())?;
        Ok(Self { start, end })
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            time >= self.start && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

/// 场景动作：向设备属性写值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneAction {
    pub device_id: String,
    pub property: String,
    pub value: String,
}

/// 场景定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneEntry {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub conditions: Vec<SubRule>,
    pub actions: Vec<SceneAction>,
}

impl SceneEntry {
    pub fn rule_id(&self) -> String {
        scene_rule_id(self.id)
    }
}

/// 告警规则定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmRule {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_alarm_level")]
    pub level: String,
    pub conditions: Vec<SubRule>,
    #[serde(default)]
    pub notify: Notify,
}

fn default_alarm_level() -> String {
    "warning".to_string()
}

impl AlarmRule {
    pub fn rule_id(&self) -> String {
        alarm_rule_id(self.id)
    }
}

pub fn scene_rule_id(scene_id: i64) -> String {
    format!("scene_{scene_id}")
}

pub fn alarm_rule_id(alarm_id: i64) -> String {
    format!("alarm_{alarm_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_window() {
        assert_eq!(
            parse_window("avg/5分钟周期").unwrap(),
            Some(Window {
                func: AggregateFunc::Avg,
                seconds: 300
            })
        );
        assert_eq!(
            parse_window("max/30秒周期").unwrap(),
            Some(Window {
                func: AggregateFunc::Max,
                seconds: 30
            })
        );
        assert_eq!(parse_window("sum/1小时").unwrap().unwrap().seconds, 3600);
        assert_eq!(parse_window("raw").unwrap(), None);
        assert_eq!(parse_window("").unwrap(), None);

        assert!(parse_window("median/5分钟周期").is_err());
        assert!(parse_window("avg/分钟").is_err());
        assert!(parse_window("avg/0秒").is_err());
        assert!(parse_window("avg/5天").is_err());
    }

    #[test]
    fn test_parse_window_rejects_oversized_periods() {
        assert!(parse_window("avg/18446744073709551615小时").is_err());
        assert!(parse_window("avg/99999999999999999999秒").is_err());
        assert!(parse_window("max/25小时").is_err());
        assert_eq!(
            parse_window("max/24小时").unwrap().unwrap().seconds,
            MAX_WINDOW_SECONDS
        );
    }

    #[test]
    fn test_operator_parse() {
        assert_eq!(Operator::parse(">").unwrap(), Operator::Gt);
        assert_eq!(Operator::parse("小于等于").unwrap(), Operator::Le);
        assert_eq!(Operator::parse("<>").unwrap().symbol(), "!=");
        assert!(Operator::parse("~").is_err());
    }

    #[test]
    fn test_effective_window() {
        let t = |s: &str| NaiveTime::parse_from_str(s, "%H:%M").unwrap();

        let day = EffectiveWindow::parse("08:00-18:00").unwrap();
        assert!(day.contains(t("08:00")));
        assert!(day.contains(t("12:30")));
        assert!(!day.contains(t("19:00")));

        let night = EffectiveWindow::parse("22:00 - 06:00").unwrap();
        assert!(night.contains(t("23:10")));
        assert!(night.contains(t("05:59")));
        assert!(!night.contains(t("12:00")));

        assert!(EffectiveWindow::parse("25:00-06:00").is_err());
        assert!(EffectiveWindow::parse("08:00").is_err());
    }

    #[test]
    fn test_notify_without_window_is_always_effective() {
        let notify = Notify::default();
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap();
        assert!(notify.is_effective_at(noon).unwrap());
    }

    #[test]
    fn test_sub_rule_deserialize() {
        let rule: SubRule = serde_json::from_value(json!({
            "trigger": "设备数据触发",
            "devices": ["d1", "d2"],
            "options": {"code": "temp", "operator": ">", "value": "30", "aggregation": "avg/5分钟周期"}
        }))
        .unwrap();
        assert_eq!(rule.trigger, TriggerKind::DeviceData);
        assert_eq!(rule.opt(OPT_CODE), Some("temp"));
        assert!(rule.require(OPT_EVENT_CODE).is_err());
    }

    #[test]
    fn test_scene_entry_deserialize() {
        let scene: SceneEntry = serde_json::from_value(json!({
            "id": 9,
            "conditions": [{"trigger": "定时触发", "options": {"cron": "0 0 8 * * *"}}],
            "actions": [{"deviceId": "lamp", "property": "switch", "value": "1"}]
        }))
        .unwrap();
        assert_eq!(scene.rule_id(), "scene_9");
        assert_eq!(scene.actions[0].device_id, "lamp");
    }
}
