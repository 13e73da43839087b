//! 规则引擎命中回调的HTTP入口

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use iothub_core::IotError;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::alarm::AlarmRuleService;
use crate::scene::SceneService;

#[derive(Clone)]
pub struct CallbackState {
    pub scenes: Arc<SceneService>,
    pub alarms: Arc<AlarmRuleService>,
}

pub fn create_callback_routes(state: CallbackState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/rule/callback/scene/{scene_id}", post(scene_callback))
        .route("/api/rule/callback/alarm/{alarm_id}", post(alarm_callback))
        .with_state(state)
}

pub struct ApiError(IotError);

impl From<IotError> for ApiError {
    fn from(e: IotError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            IotError::SceneNotFound { .. } | IotError::AlarmRuleNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            IotError::InvalidRule(_) | IotError::Serialization(_) => StatusCode::BAD_REQUEST,
            IotError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "回调处理失败");
        }
        let body = json!({
            "success": false,
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "iothub" }))
}

async fn scene_callback(
    State(state): State<CallbackState>,
    Path(scene_id): Path<i64>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    debug!(scene_id, bytes = body.len(), "收到场景回调");
    let commands = state.scenes.execute(scene_id).await?;
    Ok(Json(json!({
        "success": true,
        "data": { "sceneId": scene_id, "commands": commands },
    })))
}

async fn alarm_callback(
    State(state): State<CallbackState>,
    Path(alarm_id): Path<i64>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let payload = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).map_err(IotError::from)?
    };
    let alert_id = state.alarms.on_callback(alarm_id, payload).await?;
    Ok(Json(json!({
        "success": true,
        "data": { "alarmId": alarm_id, "alertId": alert_id },
    })))
}
