use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 远端规则定义 `{id, name, sql, actions}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    pub name: String,
    pub sql: String,
    pub actions: Vec<RuleAction>,
}

impl RuleDefinition {
    /// 命中后以 JSON POST 回调指定地址的规则
    pub fn with_callback(id: impl Into<String>, sql: impl Into<String>, url: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            sql: sql.into(),
            actions: vec![RuleAction::rest(url)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleAction {
    pub rest: RestAction,
}

impl RuleAction {
    pub fn rest(url: impl Into<String>) -> Self {
        Self {
            rest: RestAction {
                url: url.into(),
                method: "post".to_string(),
                send_single: true,
                body_type: "json".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestAction {
    pub url: String,
    pub method: String,
    pub send_single: bool,
    pub body_type: String,
}

/// 远端规则运行状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleStatus {
    pub status: String,
    #[serde(default)]
    pub detail: Value,
}

impl RuleStatus {
    pub fn is_running(&self) -> bool {
        self.status.eq_ignore_ascii_case("running")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_definition_wire_shape() {
        let rule = RuleDefinition::with_callback(
            "scene_1",
            "SELECT * FROM s",
            "http://hub/api/rule/callback/scene/1",
        );
        assert_eq!(
            serde_json::to_value(&rule).unwrap(),
            json!({
                "id": "scene_1",
                "name": "scene_1",
                "sql": "SELECT * FROM s",
                "actions": [{"rest": {
                    "url": "http://hub/api/rule/callback/scene/1",
                    "method": "post",
                    "sendSingle": true,
                    "bodyType": "json"
                }}]
            })
        );
    }
}
