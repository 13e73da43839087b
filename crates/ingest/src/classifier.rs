//! 按主题分类入站消息，只做字符串匹配

use iothub_core::models::{JobKind, Topics};

/// 返回消息类别与网关ID，不属于四类上行主题时返回 `None`
///
/// 上行主题形如 `{prefix}/{gateway}/property`，应答主题为 `{prefix}/{gateway}/write/ack`。
pub fn classify(topic: &str, topics: &Topics) -> Option<(JobKind, String)> {
    let rest = topic.strip_prefix(topics.prefix())?.strip_prefix('/')?;
    let (gateway, suffix) = rest.split_once('/')?;
    if gateway.is_empty() {
        return None;
    }

    let kind = match suffix {
        "write/ack" => JobKind::ControlAck,
        "event" => JobKind::AlertEvent,
        "property" => JobKind::PropertyReport,
        "status" => JobKind::StreamStatus,
        _ => return None,
    };
    Some((kind, gateway.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics() -> Topics {
        Topics::new("iot/gateway", "iot/stream")
    }

    #[test]
    fn test_classify_four_families() {
        let t = topics();
        assert_eq!(
            classify("iot/gateway/gw1/property", &t),
            Some((JobKind::PropertyReport, "gw1".to_string()))
        );
        assert_eq!(
            classify("iot/gateway/gw1/event", &t),
            Some((JobKind::AlertEvent, "gw1".to_string()))
        );
        assert_eq!(
            classify("iot/gateway/gw-2/status", &t),
            Some((JobKind::StreamStatus, "gw-2".to_string()))
        );
        assert_eq!(
            classify("iot/gateway/gw1/write/ack", &t),
            Some((JobKind::ControlAck, "gw1".to_string()))
        );
    }

    #[test]
    fn test_reject_foreign_topics() {
        let t = topics();
        assert_eq!(classify("iot/gateway/gw1/write", &t), None);
        assert_eq!(classify("iot/gateway//property", &t), None);
        assert_eq!(classify("iot/gatewayx/gw1/property", &t), None);
        assert_eq!(classify("iot/stream/property", &t), None);
        assert_eq!(classify("iot/gateway/gw1/property/extra", &t), None);
        assert_eq!(classify("", &t), None);
    }
}
