//! 网关与规则引擎之间流转的 JSON 报文

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use super::telemetry::TelemetryPoint;

pub const MESSAGE_TYPE_PROPERTY: &str = "PROPERTY_REPORT";
pub const MESSAGE_TYPE_EVENT: &str = "EVENT_REPORT";
pub const MESSAGE_TYPE_STATUS: &str = "STATUS";

/// 网关属性上报 `{dn, time, properties}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyReport {
    pub dn: String,
    /// Unix 秒，缺省时取接收时间
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl PropertyReport {
    pub fn into_point(self, received_at: i64) -> TelemetryPoint {
        TelemetryPoint {
            device_id: self.dn,
            properties: self.properties.into_iter().collect(),
            timestamp: self.time.unwrap_or(received_at),
        }
    }
}

/// 网关上下线状态 `{dn, status, time}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub dn: String,
    pub status: String,
    #[serde(default)]
    pub time: Option<i64>,
}

impl StatusReport {
    pub fn is_online(&self) -> bool {
        self.status.eq_ignore_ascii_case("online")
    }
}

/// 网关事件上报 `{dn, time, eventCode, level, data}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventReport {
    pub dn: String,
    #[serde(default)]
    pub time: Option<i64>,
    pub event_code: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// 下行控制指令，网关约定以单元素数组发送
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    pub seq: String,
    pub device_code: String,
    pub tag_code: String,
    pub val: String,
}

impl CommandEnvelope {
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&[self])
    }
}

/// 控制指令应答 `{seq, status, value}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckEnvelope {
    #[serde(deserialize_with = "string_or_number")]
    pub seq: String,
    pub status: bool,
    #[serde(default)]
    pub value: Value,
}

impl AckEnvelope {
    /// 应答中回显的值，统一转为字符串保存
    pub fn value_text(&self) -> Option<String> {
        match &self.value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "seq 必须是字符串或数字: {other}"
        ))),
    }
}

/// 发往规则引擎数据流的标准化报文，同时携带 `dn` 与 `deviceId`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEnvelope {
    pub dn: String,
    pub device_id: String,
    pub message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_code: Option<String>,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
}

impl StreamEnvelope {
    /// `data: {code: {value, time}}`
    pub fn property(point: &TelemetryPoint) -> Self {
        let data: Map<String, Value> = point
            .properties
            .iter()
            .map(|(code, value)| {
                (
                    code.clone(),
                    json!({ "value": value, "time": point.timestamp }),
                )
            })
            .collect();
        Self {
            dn: point.device_id.clone(),
            device_id: point.device_id.clone(),
            message_type: MESSAGE_TYPE_PROPERTY.to_string(),
            event_code: None,
            data: Value::Object(data),
            time: None,
        }
    }

    pub fn status(report: &StatusReport, time: i64) -> Self {
        Self {
            dn: report.dn.clone(),
            device_id: report.dn.clone(),
            message_type: MESSAGE_TYPE_STATUS.to_string(),
            event_code: None,
            data: json!({ "status": report.status.to_ascii_lowercase(), "time": time }),
            time: None,
        }
    }

    pub fn event(report: &EventReport, time: i64) -> Self {
        Self {
            dn: report.dn.clone(),
            device_id: report.dn.clone(),
            message_type: MESSAGE_TYPE_EVENT.to_string(),
            event_code: Some(report.event_code.clone()),
            data: report.data.clone(),
            time: Some(time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_report_into_point() {
        let report: PropertyReport = serde_json::from_str(
            r#"{"dn":"dev1","time":1700000000,"properties":{"temp":21.5,"on":true}}"#,
        )
        .unwrap();
        let point = report.into_point(1);
        assert_eq!(point.device_id, "dev1");
        assert_eq!(point.timestamp, 1_700_000_000);
        assert_eq!(point.properties["temp"], json!(21.5));

        let report: PropertyReport =
            serde_json::from_str(r#"{"dn":"dev2","properties":{}}"#).unwrap();
        assert_eq!(report.into_point(42).timestamp, 42);
    }

    #[test]
    fn test_command_envelope_is_single_element_array() {
        let cmd = CommandEnvelope {
            seq: "123".into(),
            device_code: "dev1".into(),
            tag_code: "temp".into(),
            val: "25".into(),
        };
        let payload: Value = serde_json::from_slice(&cmd.to_payload().unwrap()).unwrap();
        assert_eq!(
            payload,
            json!([{"seq":"123","deviceCode":"dev1","tagCode":"temp","val":"25"}])
        );
    }

    #[test]
    fn test_ack_accepts_numeric_seq() {
        let ack: AckEnvelope =
            serde_json::from_str(r#"{"seq":7340032,"status":true,"value":25}"#).unwrap();
        assert_eq!(ack.seq, "7340032");
        assert_eq!(ack.value_text().as_deref(), Some("25"));

        let ack: AckEnvelope = serde_json::from_str(r#"{"seq":"s1","status":false}"#).unwrap();
        assert!(!ack.status);
        assert_eq!(ack.value_text(), None);
    }

    #[test]
    fn test_stream_envelope_property_shape() {
        let point = TelemetryPoint::new("dev1", 100).with_property("temp", 30);
        let value = serde_json::to_value(StreamEnvelope::property(&point)).unwrap();
        assert_eq!(
            value,
            json!({
                "dn": "dev1",
                "deviceId": "dev1",
                "messageType": "PROPERTY_REPORT",
                "data": {"temp": {"value": 30, "time": 100}}
            })
        );
    }

    #[test]
    fn test_stream_envelope_status_lowercases() {
        let report = StatusReport {
            dn: "dev1".into(),
            status: "OFFLINE".into(),
            time: None,
        };
        assert!(!report.is_online());
        let env = StreamEnvelope::status(&report, 5);
        assert_eq!(env.data["status"], "offline");
        assert_eq!(env.message_type, MESSAGE_TYPE_STATUS);
    }
}
