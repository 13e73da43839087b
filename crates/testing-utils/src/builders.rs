//! 测试数据构造器

use iothub_domain::{
    AlarmRule, Notify, NotifySink, SceneAction, SceneEntry, SubRule, TriggerKind, OPT_AGGREGATION,
    OPT_CODE, OPT_CRON, OPT_OPERATOR, OPT_STATUS, OPT_VALUE, OPT_VALUE_TYPE,
};
use serde_json::{json, Value};

/// 数值属性条件，`aggregation` 为空表示原始值
pub fn data_condition(devices: &[&str], code: &str, operator: &str, value: &str, aggregation: Option<&str>) -> SubRule {
    let mut rule = SubRule::new(TriggerKind::DeviceData)
        .option(OPT_CODE, code)
        .option(OPT_OPERATOR, operator)
        .option(OPT_VALUE, value)
        .option(OPT_VALUE_TYPE, "numeric");
    for device in devices {
        rule = rule.device(*device);
    }
    if let Some(aggregation) = aggregation {
        rule = rule.option(OPT_AGGREGATION, aggregation);
    }
    rule
}

pub fn status_condition(device: &str, status: &str) -> SubRule {
    SubRule::new(TriggerKind::DeviceStatus)
        .device(device)
        .option(OPT_STATUS, status)
}

pub fn timer_condition(cron: &str) -> SubRule {
    SubRule::new(TriggerKind::Timer).option(OPT_CRON, cron)
}

pub struct SceneBuilder {
    scene: SceneEntry,
}

impl SceneBuilder {
    pub fn new(id: i64) -> Self {
        Self {
            scene: SceneEntry {
                id,
                name: format!("scene-{id}"),
                conditions: Vec::new(),
                actions: Vec::new(),
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.scene.name = name.to_string();
        self
    }

    pub fn with_condition(mut self, condition: SubRule) -> Self {
        self.scene.conditions.push(condition);
        self
    }

    pub fn with_timer(self, cron: &str) -> Self {
        self.with_condition(timer_condition(cron))
    }

    pub fn with_action(mut self, device_id: &str, property: &str, value: &str) -> Self {
        self.scene.actions.push(SceneAction {
            device_id: device_id.to_string(),
            property: property.to_string(),
            value: value.to_string(),
        });
        self
    }

    pub fn build(self) -> SceneEntry {
        self.scene
    }
}

pub struct AlarmRuleBuilder {
    alarm: AlarmRule,
}

impl AlarmRuleBuilder {
    pub fn new(id: i64) -> Self {
        Self {
            alarm: AlarmRule {
                id,
                name: format!("alarm-{id}"),
                level: "warning".to_string(),
                conditions: Vec::new(),
                notify: Notify::default(),
            },
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.alarm.name = name.to_string();
        self
    }

    pub fn with_level(mut self, level: &str) -> Self {
        self.alarm.level = level.to_string();
        self
    }

    pub fn with_condition(mut self, condition: SubRule) -> Self {
        self.alarm.conditions.push(condition);
        self
    }

    pub fn with_sink(mut self, kind: &str, target: &str) -> Self {
        self.alarm.notify.sinks.push(NotifySink {
            kind: kind.to_string(),
            target: target.to_string(),
        });
        self
    }

    /// 每日生效时段，如 `08:00-18:00`
    pub fn effective(mut self, window: &str) -> Self {
        self.alarm.notify.effective = Some(window.to_string());
        self
    }

    pub fn build(self) -> AlarmRule {
        self.alarm
    }
}

/// 网关属性上报报文
pub fn property_payload(device: &str, time: i64, properties: Value) -> Vec<u8> {
    json!({ "dn": device, "time": time, "properties": properties })
        .to_string()
        .into_bytes()
}

pub fn status_payload(device: &str, status: &str, time: i64) -> Vec<u8> {
    json!({ "dn": device, "status": status, "time": time })
        .to_string()
        .into_bytes()
}

pub fn event_payload(device: &str, event_code: &str, level: &str, data: Value) -> Vec<u8> {
    json!({ "dn": device, "time": 1_700_000_000, "eventCode": event_code, "level": level, "data": data })
        .to_string()
        .into_bytes()
}

pub fn ack_payload(seq: &str, status: bool, value: Value) -> Vec<u8> {
    json!({ "seq": seq, "status": status, "value": value })
        .to_string()
        .into_bytes()
}
