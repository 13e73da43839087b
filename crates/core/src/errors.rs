use thiserror::Error;

/// 平台统一错误类型
#[derive(Debug, Error)]
pub enum IotError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),

    #[error("消息传输错误: {0}")]
    Transport(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("时序库错误: {0}")]
    TimeSeries(String),

    #[error("规则引擎错误: HTTP {status} - {message}")]
    RuleEngine { status: u16, message: String },

    #[error("远端资源不存在: {0}")]
    RemoteNotFound(String),

    #[error("未知设备: {0}")]
    UnknownDevice(String),

    #[error("设备 {0} 未绑定网关")]
    UnknownGateway(String),

    #[error("指令记录未找到: {seq}")]
    WriteLogNotFound { seq: String },

    #[error("场景未找到: {id}")]
    SceneNotFound { id: i64 },

    #[error("告警规则未找到: {id}")]
    AlarmRuleNotFound { id: i64 },

    #[error("无效的规则条件: {0}")]
    InvalidRule(String),

    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("资源不足: {0}")]
    CapacityExhausted(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

/// 统一的Result类型
pub type IotResult<T> = std::result::Result<T, IotError>;

impl IotError {
    pub fn invalid_rule<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRule(msg.into())
    }

    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// 远端返回"不存在"，停止/删除场景时视为已满足
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::RemoteNotFound(_) => true,
            Self::RuleEngine { status, .. } => *status == 404,
            _ => false,
        }
    }

    /// 传输层、网络及超时错误，调用方只记录不重试
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Network(_) | Self::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for IotError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        assert!(IotError::RemoteNotFound("rule_1".into()).is_not_found());
        assert!(IotError::RuleEngine {
            status: 404,
            message: "rule not found".into()
        }
        .is_not_found());
        assert!(!IotError::RuleEngine {
            status: 400,
            message: "bad sql".into()
        }
        .is_not_found());
        assert!(!IotError::Internal("x".into()).is_not_found());
    }

    #[test]
    fn test_transient_errors() {
        assert!(IotError::Transport("closed".into()).is_transient());
        assert!(IotError::timeout("stop rule").is_transient());
        assert!(!IotError::UnknownDevice("d1".into()).is_transient());
    }

    #[test]
    fn test_display_contains_context() {
        let err = IotError::InvalidCron {
            expr: "bad".into(),
            message: "parse".into(),
        };
        assert!(err.to_string().contains("bad"));
    }
}
