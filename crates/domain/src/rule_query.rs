//! 条件 DSL 到流式 SQL 的编译
//!
//! 每种 {触发类型 × 值类型} 对应一个 [`RuleQuery`] 变体，渲染是纯函数，
//! 不依赖远端规则引擎即可单独测试。

use iothub_core::models::{ValueKind, MESSAGE_TYPE_EVENT, MESSAGE_TYPE_PROPERTY, MESSAGE_TYPE_STATUS};

use crate::rule_dsl::{
    parse_window, Operator, SubRule, TriggerKind, Window, OPT_AGGREGATION, OPT_CODE, OPT_CRON,
    OPT_EVENT_CODE, OPT_OPERATOR, OPT_STATUS, OPT_VALUE, OPT_VALUE_TYPE,
};
use crate::{IotError, IotResult};

/// 规则引擎中的三条数据流
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamNames {
    pub property: String,
    pub event: String,
    pub status: String,
}

impl Default for StreamNames {
    fn default() -> Self {
        Self {
            property: "iot_property_stream".to_string(),
            event: "iot_event_stream".to_string(),
            status: "iot_status_stream".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuleQuery {
    NumericRaw {
        devices: Vec<String>,
        code: String,
        operator: Operator,
        value: f64,
    },
    NumericWindow {
        devices: Vec<String>,
        code: String,
        operator: Operator,
        value: f64,
        window: Window,
    },
    Text {
        devices: Vec<String>,
        code: String,
        operator: Operator,
        value: String,
    },
    Boolean {
        devices: Vec<String>,
        code: String,
        operator: Operator,
        value: bool,
    },
    Event {
        devices: Vec<String>,
        event_code: String,
    },
    Status {
        devices: Vec<String>,
        status: String,
    },
}

/// 查询的各组成部分
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParts {
    pub select: String,
    pub from: String,
    pub filters: Vec<String>,
    pub group_by: Option<String>,
    pub having: Option<String>,
}

impl QueryParts {
    pub fn to_sql(&self) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.select, self.from);
        if !self.filters.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.filters.join(" AND "));
        }
        if let Some(group_by) = &self.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(group_by);
        }
        if let Some(having) = &self.having {
            sql.push_str(" HAVING ");
            sql.push_str(having);
        }
        sql
    }
}

impl RuleQuery {
    /// 根据触发类型、值类型与聚合方式选择变体；定时触发不产生查询
    pub fn from_sub_rule(rule: &SubRule) -> IotResult<Self> {
        for device in &rule.devices {
            if device.trim().is_empty() {
                return Err(IotError::invalid_rule("设备ID不能为空"));
            }
        }
        let devices = rule.devices.clone();

        match rule.trigger {
            TriggerKind::DeviceData => {
                let code = identifier(rule.require(OPT_CODE)?)?;
                let operator = Operator::parse(rule.require(OPT_OPERATOR)?)?;
                let raw_value = rule.require(OPT_VALUE)?;
                let kind = match rule.opt(OPT_VALUE_TYPE) {
                    Some(name) => ValueKind::parse(name).ok_or_else(|| {
                        IotError::invalid_rule(format!("不支持的值类型: {name}"))
                    })?,
                    None => ValueKind::Numeric,
                };
                let window = parse_window(rule.opt(OPT_AGGREGATION).unwrap_or(""))?;

                match kind {
                    ValueKind::Numeric => {
                        let value: f64 = raw_value.parse().map_err(|_| {
                            IotError::invalid_rule(format!("数值条件的阈值不是数字: {raw_value}"))
                        })?;
                        Ok(match window {
                            Some(window) => RuleQuery::NumericWindow {
                                devices,
                                code,
                                operator,
                                value,
                                window,
                            },
                            None => RuleQuery::NumericRaw {
                                devices,
                                code,
                                operator,
                                value,
                            },
                        })
                    }
                    ValueKind::Text | ValueKind::Boolean if window.is_some() => Err(
                        IotError::invalid_rule(format!("{code} 不是数值属性，不支持窗口聚合")),
                    ),
                    ValueKind::Text | ValueKind::Boolean if !operator.is_equality() => Err(
                        IotError::invalid_rule(format!("{code} 只支持等于/不等于比较")),
                    ),
                    ValueKind::Text => Ok(RuleQuery::Text {
                        devices,
                        code,
                        operator,
                        value: raw_value.to_string(),
                    }),
                    ValueKind::Boolean => {
                        let value = match raw_value.to_ascii_lowercase().as_str() {
                            "true" | "1" | "on" => true,
                            "false" | "0" | "off" => false,
                            _ => {
                                return Err(IotError::invalid_rule(format!(
                                    "布尔条件的取值无效: {raw_value}"
                                )))
                            }
                        };
                        Ok(RuleQuery::Boolean {
                            devices,
                            code,
                            operator,
                            value,
                        })
                    }
                }
            }
            TriggerKind::DeviceEvent => Ok(RuleQuery::Event {
                devices,
                event_code: rule.require(OPT_EVENT_CODE)?.to_string(),
            }),
            TriggerKind::DeviceStatus => {
                let status = rule.require(OPT_STATUS)?.to_ascii_lowercase();
                if status != "online" && status != "offline" {
                    return Err(IotError::invalid_rule(format!("无效的设备状态: {status}")));
                }
                Ok(RuleQuery::Status { devices, status })
            }
            TriggerKind::Timer => Err(IotError::invalid_rule("定时触发不生成规则查询")),
        }
    }

    pub fn window(&self) -> Option<Window> {
        match self {
            RuleQuery::NumericWindow { window, .. } => Some(*window),
            _ => None,
        }
    }

    pub fn parts(&self, streams: &StreamNames) -> QueryParts {
        match self {
            RuleQuery::NumericRaw {
                devices,
                code,
                operator,
                value,
            } => property_parts(
                streams,
                devices,
                code,
                format!("{} {} {}", value_path(code), operator.symbol(), number(*value)),
            ),
            RuleQuery::Text {
                devices,
                code,
                operator,
                value,
            } => property_parts(
                streams,
                devices,
                code,
                format!("{} {} {}", value_path(code), operator.symbol(), quote(value)),
            ),
            RuleQuery::Boolean {
                devices,
                code,
                operator,
                value,
            } => property_parts(
                streams,
                devices,
                code,
                format!("{} {} {}", value_path(code), operator.symbol(), value),
            ),
            RuleQuery::NumericWindow {
                devices,
                code,
                operator,
                value,
                window,
            } => {
                let aggregate = format!("{}({})", window.func.name(), value_path(code));
                let mut filters = device_filter(devices).into_iter().collect::<Vec<_>>();
                filters.push(format!("messageType = {}", quote(MESSAGE_TYPE_PROPERTY)));
                filters.push(format!("isNull(data->{code}) = false"));
                QueryParts {
                    select: format!("deviceId, {aggregate} AS {code}"),
                    from: streams.property.clone(),
                    filters,
                    group_by: Some(format!("deviceId, TUMBLINGWINDOW(ss, {})", window.seconds)),
                    having: Some(format!(
                        "{aggregate} {} {}",
                        operator.symbol(),
                        number(*value)
                    )),
                }
            }
            RuleQuery::Event {
                devices,
                event_code,
            } => {
                let mut filters = device_filter(devices).into_iter().collect::<Vec<_>>();
                filters.push(format!("messageType = {}", quote(MESSAGE_TYPE_EVENT)));
                filters.push(format!("eventCode = {}", quote(event_code)));
                QueryParts {
                    select: "*".to_string(),
                    from: streams.event.clone(),
                    filters,
                    group_by: None,
                    having: None,
                }
            }
            RuleQuery::Status { devices, status } => {
                let mut filters = device_filter(devices).into_iter().collect::<Vec<_>>();
                filters.push(format!("messageType = {}", quote(MESSAGE_TYPE_STATUS)));
                filters.push(format!("data->status = {}", quote(status)));
                QueryParts {
                    select: "deviceId, data->status AS status".to_string(),
                    from: streams.status.clone(),
                    filters,
                    group_by: None,
                    having: None,
                }
            }
        }
    }

    pub fn render(&self, streams: &StreamNames) -> String {
        self.parts(streams).to_sql()
    }
}

/// 编译结果：本地定时任务与远端规则二选一
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledTrigger {
    Cron(String),
    Remote(String),
}

/// 编译一组条件
///
/// 定时触发必须单独出现；多个非定时条件要求落在同一数据流且均不含窗口聚合，
/// 以 OR 组合。
pub fn compile_conditions(conditions: &[SubRule], streams: &StreamNames) -> IotResult<CompiledTrigger> {
    if conditions.is_empty() {
        return Err(IotError::invalid_rule("触发条件不能为空"));
    }

    let timers = conditions
        .iter()
        .filter(|c| c.trigger == TriggerKind::Timer)
        .count();
    if timers > 0 {
        if conditions.len() > 1 {
            return Err(IotError::invalid_rule("定时触发不能与其他条件组合"));
        }
        return Ok(CompiledTrigger::Cron(
            conditions[0].require(OPT_CRON)?.to_string(),
        ));
    }

    let queries = conditions
        .iter()
        .map(RuleQuery::from_sub_rule)
        .collect::<IotResult<Vec<_>>>()?;

    if let [query] = queries.as_slice() {
        return Ok(CompiledTrigger::Remote(query.render(streams)));
    }

    if queries.iter().any(|q| q.window().is_some()) {
        return Err(IotError::invalid_rule("窗口聚合条件不能与其他条件组合"));
    }

    let parts: Vec<QueryParts> = queries.iter().map(|q| q.parts(streams)).collect();
    let from = parts[0].from.clone();
    if parts.iter().any(|p| p.from != from) {
        return Err(IotError::invalid_rule("不同类型的触发条件不能组合"));
    }

    let combined = parts
        .iter()
        .map(|p| format!("({})", p.filters.join(" AND ")))
        .collect::<Vec<_>>()
        .join(" OR ");

    Ok(CompiledTrigger::Remote(format!(
        "SELECT * FROM {from} WHERE {combined}"
    )))
}

fn property_parts(streams: &StreamNames, devices: &[String], code: &str, comparison: String) -> QueryParts {
    let mut filters = device_filter(devices).into_iter().collect::<Vec<_>>();
    filters.push(format!("messageType = {}", quote(MESSAGE_TYPE_PROPERTY)));
    filters.push(format!("isNull(data->{code}) = false"));
    filters.push(comparison);
    QueryParts {
        select: format!("deviceId, {} AS {code}", value_path(code)),
        from: streams.property.clone(),
        filters,
        group_by: None,
        having: None,
    }
}

/// 单设备用等值，多设备用 IN，未指定设备时不过滤
fn device_filter(devices: &[String]) -> Option<String> {
    match devices {
        [] => None,
        [device] => Some(format!("deviceId = {}", quote(device))),
        many => Some(format!(
            "deviceId IN ({})",
            many.iter().map(|d| quote(d)).collect::<Vec<_>>().join(",")
        )),
    }
}

fn value_path(code: &str) -> String {
    format!("data->{code}->value")
}

fn quote(raw: &str) -> String {
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

fn number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn identifier(raw: &str) -> IotResult<String> {
    if raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !raw.starts_with(|c: char| c.is_ascii_digit())
    {
        Ok(raw.to_string())
    } else {
        Err(IotError::invalid_rule(format!("无效的属性编码: {raw}")))
    }
}
