mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::harness;
use iothub_automation::{create_callback_routes, CallbackState};
use iothub_testing_utils::{data_condition, AlarmRuleBuilder, SceneBuilder};
use serde_json::Value;
use tower::ServiceExt;

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_scene_callback_executes_actions() {
    let h = harness();
    h.scenes
        .start(
            SceneBuilder::new(1)
                .with_condition(data_condition(&["fan"], "temp", ">", "30", None))
                .with_action("lamp", "switch", "1")
                .build(),
        )
        .await
        .unwrap();
    let app = create_callback_routes(CallbackState {
        scenes: h.scenes.clone(),
        alarms: h.alarms.clone(),
    });

    let response = app
        .oneshot(post("/api/rule/callback/scene/1", r#"{"deviceId":"fan","temp":35}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = json_body(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["commands"].as_array().unwrap().len(), 1);
    assert_eq!(h.broker.published_to("iot/gateway/gw1/write").len(), 1);
}

#[tokio::test]
async fn test_unknown_scene_returns_not_found() {
    let h = harness();
    let app = create_callback_routes(CallbackState {
        scenes: h.scenes.clone(),
        alarms: h.alarms.clone(),
    });

    let response = app
        .oneshot(post("/api/rule/callback/scene/42", "{}"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["success"], false);
}

#[tokio::test]
async fn test_alarm_callback_stores_alert() {
    let h = harness();
    h.alarms
        .apply(
            AlarmRuleBuilder::new(3)
                .with_condition(data_condition(&["d1"], "temp", ">", "30", None))
                .build(),
        )
        .await
        .unwrap();
    let app = create_callback_routes(CallbackState {
        scenes: h.scenes.clone(),
        alarms: h.alarms.clone(),
    });

    let response = app
        .clone()
        .oneshot(post("/api/rule/callback/alarm/3", r#"{"deviceId":"d1","temp":50}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["data"]["alertId"], 1);
    assert_eq!(h.alerts.records()[0].device_id.as_deref(), Some("d1"));

    let response = app
        .oneshot(post("/api/rule/callback/alarm/3", "not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.alerts.count(), 1);
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = harness();
    let app = create_callback_routes(CallbackState {
        scenes: h.scenes.clone(),
        alarms: h.alarms.clone(),
    });

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}
