use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::{IotError, IotResult};

/// 控制指令状态，WAITING 只会迁移一次
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WriteStatus {
    #[serde(rename = "WAITING")]
    Waiting,
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAIL")]
    Fail,
}

impl WriteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteStatus::Waiting => "WAITING",
            WriteStatus::Success => "SUCCESS",
            WriteStatus::Fail => "FAIL",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, WriteStatus::Waiting)
    }
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteStatus {
    type Err = IotError;

    fn from_str(s: &str) -> IotResult<Self> {
        match s {
            "WAITING" => Ok(WriteStatus::Waiting),
            "SUCCESS" => Ok(WriteStatus::Success),
            "FAIL" => Ok(WriteStatus::Fail),
            _ => Err(IotError::Serialization(format!("无效的指令状态: {s}"))),
        }
    }
}

/// 指令下发渠道
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum WriteChannel {
    #[serde(rename = "手动控制")]
    Manual,
    #[serde(rename = "场景联动")]
    Scene,
    #[serde(rename = "配置下发")]
    ConfigPush,
}

impl WriteChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteChannel::Manual => "手动控制",
            WriteChannel::Scene => "场景联动",
            WriteChannel::ConfigPush => "配置下发",
        }
    }
}

impl fmt::Display for WriteChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteChannel {
    type Err = IotError;

    fn from_str(s: &str) -> IotResult<Self> {
        match s {
            "手动控制" => Ok(WriteChannel::Manual),
            "场景联动" => Ok(WriteChannel::Scene),
            "配置下发" => Ok(WriteChannel::ConfigPush),
            _ => Err(IotError::Serialization(format!("无效的下发渠道: {s}"))),
        }
    }
}

/// 指令日志（待确认指令），作为审计记录永久保留
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteLog {
    pub seq: String,
    pub device_id: String,
    pub gateway_id: String,
    pub property: String,
    pub value: String,
    pub channel: WriteChannel,
    pub status: WriteStatus,
    pub requester: Option<i64>,
    /// 网关应答回显的值
    pub response_value: Option<String>,
    pub reason: Option<String>,
    pub latency_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WriteLog {
    pub fn waiting(
        seq: impl Into<String>,
        device_id: impl Into<String>,
        gateway_id: impl Into<String>,
        property: impl Into<String>,
        value: impl Into<String>,
        channel: WriteChannel,
        requester: Option<i64>,
    ) -> Self {
        Self {
            seq: seq.into(),
            device_id: device_id.into(),
            gateway_id: gateway_id.into(),
            property: property.into(),
            value: value.into(),
            channel,
            status: WriteStatus::Waiting,
            requester,
            response_value: None,
            reason: None,
            latency_ms: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// 在内存中应用终态，仅 WAITING 记录生效
    pub fn apply(&mut self, completion: &WriteCompletion) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = completion.status;
        self.response_value = completion.response_value.clone();
        self.reason = completion.reason.clone();
        self.completed_at = Some(completion.completed_at);
        self.latency_ms = Some(
            (completion.completed_at - self.created_at)
                .num_milliseconds()
                .max(0),
        );
        true
    }
}

/// 指令终态
#[derive(Debug, Clone, PartialEq)]
pub struct WriteCompletion {
    pub status: WriteStatus,
    pub response_value: Option<String>,
    pub reason: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl WriteCompletion {
    pub fn success(response_value: Option<String>) -> Self {
        Self {
            status: WriteStatus::Success,
            response_value,
            reason: None,
            completed_at: Utc::now(),
        }
    }

    pub fn fail(reason: impl Into<String>, response_value: Option<String>) -> Self {
        Self {
            status: WriteStatus::Fail,
            response_value,
            reason: Some(reason.into()),
            completed_at: Utc::now(),
        }
    }
}

/// 告警来源
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AlertSource {
    #[serde(rename = "DEVICE_EVENT")]
    DeviceEvent,
    #[serde(rename = "ALARM_RULE")]
    AlarmRule,
}

impl AlertSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSource::DeviceEvent => "DEVICE_EVENT",
            AlertSource::AlarmRule => "ALARM_RULE",
        }
    }
}

impl FromStr for AlertSource {
    type Err = IotError;

    fn from_str(s: &str) -> IotResult<Self> {
        match s {
            "DEVICE_EVENT" => Ok(AlertSource::DeviceEvent),
            "ALARM_RULE" => Ok(AlertSource::AlarmRule),
            _ => Err(IotError::Serialization(format!("无效的告警来源: {s}"))),
        }
    }
}

/// 告警记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i64,
    pub source: AlertSource,
    /// 告警规则ID，设备事件为空
    pub rule_id: Option<i64>,
    pub device_id: Option<String>,
    pub code: String,
    pub level: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl AlertRecord {
    pub fn device_event(
        device_id: impl Into<String>,
        event_code: impl Into<String>,
        level: Option<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: 0,
            source: AlertSource::DeviceEvent,
            rule_id: None,
            device_id: Some(device_id.into()),
            code: event_code.into(),
            level: level.unwrap_or_else(|| "info".to_string()),
            payload,
            created_at: Utc::now(),
        }
    }

    /// 规则引擎回调产生的告警，设备取自回调报文中的 `deviceId`
    pub fn alarm_rule(rule_id: i64, rule_name: impl Into<String>, level: impl Into<String>, payload: Value) -> Self {
        let device_id = payload
            .get("deviceId")
            .or_else(|| payload.get("dn"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            id: 0,
            source: AlertSource::AlarmRule,
            rule_id: Some(rule_id),
            device_id,
            code: rule_name.into(),
            level: level.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_channel_serde_names() {
        assert_eq!(
            serde_json::to_value(WriteChannel::Scene).unwrap(),
            json!("场景联动")
        );
        let channel: WriteChannel = serde_json::from_value(json!("手动控制")).unwrap();
        assert_eq!(channel, WriteChannel::Manual);
        assert_eq!("配置下发".parse::<WriteChannel>().unwrap(), WriteChannel::ConfigPush);
        assert!("其他".parse::<WriteChannel>().is_err());
    }

    #[test]
    fn test_apply_only_transitions_waiting() {
        let mut log = WriteLog::waiting("1", "dev1", "gw1", "temp", "25", WriteChannel::Manual, Some(7));
        assert!(log.apply(&WriteCompletion::success(Some("25".into()))));
        assert_eq!(log.status, WriteStatus::Success);
        assert!(log.latency_ms.is_some());

        assert!(!log.apply(&WriteCompletion::fail("late", None)));
        assert_eq!(log.status, WriteStatus::Success);
        assert_eq!(log.reason, None);
    }

    #[test]
    fn test_alarm_record_picks_device_from_payload() {
        let record = AlertRecord::alarm_rule(3, "高温", "critical", json!({"deviceId": "d1", "temp": 80}));
        assert_eq!(record.device_id.as_deref(), Some("d1"));
        assert_eq!(record.rule_id, Some(3));
        assert_eq!(record.source, AlertSource::AlarmRule);
    }
}
