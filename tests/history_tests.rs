//! History engine pipeline: window resolution, retention clamping,
//! limit/filter interplay, and gap detection

mod common;

use common::*;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use unihome::config::{HistoryConfig, RegistryConfig};
use unihome::error::UnihomeError;
use unihome::history::{DeviceEventQuery, HistoryEngine};
use unihome::registry::PlatformRegistry;
use unihome::types::{DeviceCapability, Platform};

const HOUR_MS: i64 = 3600 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

async fn setup(retention: Option<Duration>) -> (Arc<MockAdapter>, HistoryEngine) {
    let registry = Arc::new(PlatformRegistry::new(RegistryConfig::default()));
    let mock = Arc::new(MockAdapter::new(Platform::SmartThings));
    mock.set_retention(retention);
    mock.add_device(test_device(
        Platform::SmartThings,
        "d1",
        "Desk Lamp",
        vec![DeviceCapability::Switch],
    ))
    .await;
    registry
        .register_adapter(Platform::SmartThings, mock.clone())
        .await
        .unwrap();
    let engine = HistoryEngine::new(registry, HistoryConfig::default());
    (mock, engine)
}

/// Three events: 1h between the first pair, 3h between the second
async fn seed_gap_fixture(mock: &MockAdapter) {
    for (epoch, value) in [
        (1_700_000_000_000, "on"),
        (1_699_996_400_000, "off"),
        (1_699_985_600_000, "on"),
    ] {
        mock.add_history_event(history_event(
            Platform::SmartThings,
            "d1",
            epoch,
            "switch",
            "switch",
            serde_json::json!(value),
        ))
        .await;
    }
}

fn fixture_query() -> DeviceEventQuery {
    DeviceEventQuery::new("smartthings:d1")
        .since(1_699_900_000_000_i64)
        .until(1_700_000_100_000_i64)
}

async_test!(returns_events_newest_first_with_gap_metadata, {
    let (mock, engine) = setup(None).await;
    seed_gap_fixture(&mock).await;

    let result = engine.device_events(&fixture_query()).await.unwrap();

    assert_eq!(result.events.len(), 3);
    assert_eq!(result.events[0].epoch, 1_700_000_000_000);
    assert_eq!(result.events[2].epoch, 1_699_985_600_000);
    assert!(!result.has_more);
    assert!(!result.reached_retention_limit);
    assert_eq!(result.location_id.as_deref(), Some("loc-1"));

    let metadata = result.metadata.expect("metadata requested by default");
    assert_eq!(metadata.gaps.len(), 1);
    assert_eq!(metadata.gaps[0].duration_ms, 3 * HOUR_MS);
    assert!(metadata.gaps[0].likely_connectivity_issue);
    assert_eq!(metadata.largest_gap_ms, Some(3 * HOUR_MS));

    let summary = result.summary.expect("summary requested by default");
    assert!(summary.contains("3 events"), "summary was: {summary}");
    assert!(summary.contains("1 gap detected"), "summary was: {summary}");
});

async_test!(oldest_first_reverses_order_and_still_finds_gaps, {
    let (mock, engine) = setup(None).await;
    seed_gap_fixture(&mock).await;

    let query = fixture_query().oldest_first();
    let result = engine.device_events(&query).await.unwrap();

    assert_eq!(result.events[0].epoch, 1_699_985_600_000);
    assert_eq!(result.events[2].epoch, 1_700_000_000_000);
    assert_eq!(result.metadata.unwrap().gaps.len(), 1);
});

async_test!(limit_cuts_before_filters_apply, {
    let (mock, engine) = setup(None).await;
    for (epoch, capability) in [
        (1_700_000_000_000, "switch"),
        (1_699_999_000_000, "battery"),
        (1_699_998_000_000, "switch"),
        (1_699_997_000_000, "switch"),
    ] {
        mock.add_history_event(history_event(
            Platform::SmartThings,
            "d1",
            epoch,
            capability,
            "value",
            serde_json::json!(1),
        ))
        .await;
    }

    let query = fixture_query().limit(2).capability("switch");
    let result = engine.device_events(&query).await.unwrap();

    // The limit keeps the two newest raw events; filtering then drops the
    // battery event rather than pulling in an older switch event
    assert_eq!(result.events.len(), 1);
    assert_eq!(result.events[0].epoch, 1_700_000_000_000);
    assert!(result.has_more);
});

async_test!(requested_limit_is_clamped, {
    let (mock, engine) = setup(None).await;
    seed_gap_fixture(&mock).await;

    let query = fixture_query().limit(9999);
    engine.device_events(&query).await.unwrap();
    let recorded = mock.last_history_query.read().await.clone().unwrap();
    // The engine over-fetches by one to detect a further page
    assert_eq!(recorded.limit, 501);

    let query = fixture_query().limit(0);
    engine.device_events(&query).await.unwrap();
    let recorded = mock.last_history_query.read().await.clone().unwrap();
    assert_eq!(recorded.limit, 2);
});

async_test!(attribute_filter_applies, {
    let (mock, engine) = setup(None).await;
    for (epoch, attribute) in [
        (1_700_000_000_000, "switch"),
        (1_699_999_000_000, "level"),
    ] {
        mock.add_history_event(history_event(
            Platform::SmartThings,
            "d1",
            epoch,
            "switch",
            attribute,
            serde_json::json!(1),
        ))
        .await;
    }

    let query = fixture_query().attribute("level");
    let result = engine.device_events(&query).await.unwrap();
    assert_eq!(result.events.len(), 1);
    assert_eq!(result.events[0].attribute, "level");
});

async_test!(retention_clamps_start_and_warns, {
    let (_mock, engine) = setup(Some(Duration::from_secs(30 * 24 * 3600))).await;
    let now_ms = chrono::Utc::now().timestamp_millis();

    let query = DeviceEventQuery::new("smartthings:d1").since(now_ms - 40 * DAY_MS);
    let result = engine.device_events(&query).await.unwrap();

    assert!(result.reached_retention_limit);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("clamped"));

    let expected_start = now_ms - 30 * DAY_MS;
    let drift = (result.window.start.timestamp_millis() - expected_start).abs();
    assert!(drift < 5_000, "start drifted {drift}ms from the boundary");

    let summary = result.summary.unwrap();
    assert!(summary.contains("clamped"), "summary was: {summary}");
});

async_test!(window_fully_beyond_retention_is_empty_not_an_error, {
    let (mock, engine) = setup(Some(Duration::from_secs(30 * 24 * 3600))).await;
    let now_ms = chrono::Utc::now().timestamp_millis();

    let query = DeviceEventQuery::new("smartthings:d1")
        .since(now_ms - 90 * DAY_MS)
        .until(now_ms - 60 * DAY_MS);
    let result = engine.device_events(&query).await.unwrap();

    assert!(result.events.is_empty());
    assert!(result.reached_retention_limit);
    assert!(result.summary.unwrap().contains("0 events"));
    // The fetch never ran; the clamped window had nothing left to ask for
    assert!(mock.last_history_query.read().await.is_none());
});

async_test!(location_resolved_through_device_lookup, {
    let (mock, engine) = setup(None).await;
    seed_gap_fixture(&mock).await;

    engine.device_events(&fixture_query()).await.unwrap();
    let recorded = mock.last_history_query.read().await.clone().unwrap();
    assert_eq!(recorded.location_id, "loc-1");
    assert_eq!(recorded.device_id, "d1");
});

async_test!(device_without_location_needs_explicit_location, {
    let (mock, engine) = setup(None).await;
    let mut device = test_device(
        Platform::SmartThings,
        "nowhere",
        "Orphan Sensor",
        vec![DeviceCapability::Switch],
    );
    device.location_id = None;
    mock.add_device(device).await;

    let query = DeviceEventQuery::new("smartthings:nowhere")
        .since(1_699_900_000_000_i64)
        .until(1_700_000_100_000_i64);
    let err = engine.device_events(&query).await.unwrap_err();
    assert!(matches!(err, UnihomeError::Configuration(_)), "got {err}");

    let located = query.in_location("loc-9");
    engine.device_events(&located).await.unwrap();
    let recorded = mock.last_history_query.read().await.clone().unwrap();
    assert_eq!(recorded.location_id, "loc-9");
});

async_test!(unroutable_device_is_not_found, {
    let (_mock, engine) = setup(None).await;
    let err = engine
        .device_events(&DeviceEventQuery::new("tuya:x"))
        .await
        .unwrap_err();
    assert!(matches!(err, UnihomeError::DeviceNotFound(_)), "got {err}");
});

async_test!(single_event_never_reports_gaps, {
    let (mock, engine) = setup(None).await;
    mock.add_history_event(history_event(
        Platform::SmartThings,
        "d1",
        1_700_000_000_000,
        "switch",
        "switch",
        serde_json::json!("on"),
    ))
    .await;

    let result = engine.device_events(&fixture_query()).await.unwrap();
    assert_eq!(result.events.len(), 1);
    assert!(result.metadata.unwrap().gaps.is_empty());
    assert!(result.summary.unwrap().starts_with("1 event "));
});

async_test!(metadata_and_summary_can_be_disabled, {
    let (mock, engine) = setup(None).await;
    seed_gap_fixture(&mock).await;

    let mut query = fixture_query().without_metadata();
    query.human_readable = false;
    let result = engine.device_events(&query).await.unwrap();

    assert!(result.metadata.is_none());
    assert!(result.summary.is_none());
    assert_eq!(result.events.len(), 3);
});

async_test!(unparseable_times_are_rejected, {
    let (_mock, engine) = setup(None).await;
    let err = engine
        .device_events(&DeviceEventQuery::new("smartthings:d1").since("yesterday"))
        .await
        .unwrap_err();
    assert!(matches!(err, UnihomeError::Configuration(_)), "got {err}");
});

async_test!(inverted_window_is_rejected, {
    let (_mock, engine) = setup(None).await;
    let query = DeviceEventQuery::new("smartthings:d1")
        .since(1_700_000_100_000_i64)
        .until(1_699_900_000_000_i64);
    let err = engine.device_events(&query).await.unwrap_err();
    assert!(matches!(err, UnihomeError::Configuration(_)), "got {err}");
});
