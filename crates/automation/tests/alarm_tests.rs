mod common;

use chrono::NaiveTime;
use common::harness;
use iothub_core::IotError;
use iothub_domain::AlertSource;
use iothub_testing_utils::{data_condition, AlarmRuleBuilder};
use serde_json::json;

fn at(hh: u32, mm: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hh, mm, 0).unwrap()
}

fn high_temp(id: i64) -> AlarmRuleBuilder {
    AlarmRuleBuilder::new(id)
        .with_name("高温告警")
        .with_level("critical")
        .with_condition(data_condition(
            &["d1", "d2"],
            "temp",
            ">",
            "30",
            Some("avg/5分钟周期"),
        ))
}

#[tokio::test]
async fn test_apply_deploys_windowed_rule() {
    let h = harness();
    h.alarms
        .apply(high_temp(1).with_sink("webhook", "http://ops/hook").build())
        .await
        .unwrap();

    let rule = h.engine.rule("alarm_1").unwrap();
    assert!(rule.definition.sql.contains(r#"deviceId IN ("d1","d2")"#));
    assert!(rule.definition.sql.contains("TUMBLINGWINDOW(ss, 300)"));
    assert!(rule.definition.sql.ends_with("> 30"));
    assert_eq!(
        rule.definition.actions[0].rest.url,
        "http://hub:8080/api/rule/callback/alarm/1"
    );
}

#[tokio::test]
async fn test_apply_rejects_timer_and_unknown_sink() {
    let h = harness();
    let timer = AlarmRuleBuilder::new(2)
        .with_condition(iothub_testing_utils::timer_condition("0 0 8 * * *"))
        .build();
    assert!(matches!(
        h.alarms.apply(timer).await.unwrap_err(),
        IotError::InvalidRule(_)
    ));

    let sms = high_temp(3).with_sink("sms", "13800000000").build();
    assert!(h.alarms.apply(sms).await.is_err());

    let bad_window = high_temp(4).effective("25:00-08:00").build();
    assert!(h.alarms.apply(bad_window).await.is_err());
    assert!(h.engine.calls().is_empty());
}

#[tokio::test]
async fn test_callback_records_alert_and_notifies() {
    let h = harness();
    h.alarms
        .apply(
            high_temp(5)
                .with_sink("webhook", "http://ops/hook")
                .effective("08:00-18:00")
                .build(),
        )
        .await
        .unwrap();

    let alert_id = h
        .alarms
        .on_callback_at(5, json!({"deviceId": "d2", "temp": 41.5}), at(9, 30))
        .await
        .unwrap();
    h.tasks.drain().await;

    let record = &h.alerts.records()[0];
    assert_eq!(record.id, alert_id);
    assert_eq!(record.source, AlertSource::AlarmRule);
    assert_eq!(record.rule_id, Some(5));
    assert_eq!(record.device_id.as_deref(), Some("d2"));
    assert_eq!(record.code, "高温告警");
    assert_eq!(record.level, "critical");

    let sent = h.webhook.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.target, "http://ops/hook");
    assert_eq!(sent[0].1.id, alert_id);
}

#[tokio::test]
async fn test_callback_outside_window_records_without_notifying() {
    let h = harness();
    h.alarms
        .apply(
            high_temp(6)
                .with_sink("webhook", "http://ops/hook")
                .effective("22:00-06:00")
                .build(),
        )
        .await
        .unwrap();

    h.alarms
        .on_callback_at(6, json!({"deviceId": "d1"}), at(12, 0))
        .await
        .unwrap();
    h.alarms
        .on_callback_at(6, json!({"deviceId": "d1"}), at(23, 15))
        .await
        .unwrap();
    h.tasks.drain().await;

    assert_eq!(h.alerts.count(), 2);
    assert_eq!(h.webhook.count(), 1);
}

#[tokio::test]
async fn test_notifier_failure_does_not_fail_callback() {
    let h = harness();
    h.webhook.set_fail(true);
    h.alarms
        .apply(high_temp(7).with_sink("webhook", "http://ops/hook").build())
        .await
        .unwrap();

    assert!(h.alarms.on_callback(7, json!({})).await.is_ok());
    h.tasks.drain().await;
    assert_eq!(h.alerts.count(), 1);
    assert_eq!(h.webhook.count(), 0);
}

#[tokio::test]
async fn test_stopped_alarm_rejects_callbacks() {
    let h = harness();
    h.alarms.apply(high_temp(8).build()).await.unwrap();
    h.alarms.stop(8).await.unwrap();
    h.tasks.drain().await;

    assert!(!h.engine.rule("alarm_8").unwrap().running);
    assert!(matches!(
        h.alarms.on_callback(8, json!({})).await.unwrap_err(),
        IotError::AlarmRuleNotFound { id: 8 }
    ));
    assert_eq!(h.alerts.count(), 0);

    h.alarms.delete(8).await.unwrap();
    assert!(h.engine.rule("alarm_8").is_none());
}

#[tokio::test]
async fn test_failed_redeploy_stops_remote_rule() {
    let h = harness();
    h.alarms.apply(high_temp(9).build()).await.unwrap();
    assert!(h.engine.rule("alarm_9").unwrap().running);

    h.engine.fail_on("restart", "engine busy");
    let err = h.alarms.apply(high_temp(9).build()).await.unwrap_err();
    assert!(matches!(err, IotError::RuleEngine { status: 400, .. }));
    h.tasks.drain().await;

    assert!(!h.engine.rule("alarm_9").unwrap().running);
    assert!(h.engine.calls().iter().any(|c| c == "stop:alarm_9"));
    assert!(matches!(
        h.alarms.on_callback(9, json!({})).await.unwrap_err(),
        IotError::AlarmRuleNotFound { id: 9 }
    ));
}
