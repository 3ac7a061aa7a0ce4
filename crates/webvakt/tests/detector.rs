use assert_json_diff::assert_json_include;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use webvakt::{
    CheckRequest, ComparisonType, DifferenceDetector, EngineConfig, EngineError,
    FixtureRenderer, MissingElementPolicy, MonitorSpec,
};

const URL: &str = "https://example.com/";
const PAGE: &str = r#"<!doctype html>
<html>
  <body>
    <h1 id="title">Spring sale</h1>
    <p id="x">Hello</p>
    <a id="l" href="/about">About us</a>
    <div id="banner" style="color: red; display: block"></div>
    <ul id="items"><li>Tea</li><li>Coffee</li></ul>
  </body>
</html>"#;

fn fixture() -> FixtureRenderer {
    FixtureRenderer::new().with_page(URL, PAGE)
}

fn detector(renderer: &FixtureRenderer) -> DifferenceDetector {
    DifferenceDetector::new(Arc::new(renderer.clone()), EngineConfig::default())
}

fn matching_monitors() -> Vec<MonitorSpec> {
    vec![
        MonitorSpec::new(1, "#title", ComparisonType::Text).expecting(json!("Spring sale")),
        MonitorSpec::new(2, "#l", ComparisonType::Attribute)
            .with_attributes(["href"])
            .expecting(json!({"href": "https://example.com/about"})),
        MonitorSpec::new(3, "#banner", ComparisonType::Style)
            .expecting(json!({"display": "block", "color": "red"})),
        MonitorSpec::new(4, "#items", ComparisonType::Children)
            .expecting(json!("<li>Tea</li><li>Coffee</li>")),
    ]
}

#[tokio::test]
async fn unchanged_page_is_idempotent() {
    let renderer = fixture();
    let detector = detector(&renderer);
    let monitors = matching_monitors();

    let first = detector.check(URL, &monitors).await.unwrap();
    let second = detector.check(URL, &monitors).await.unwrap();

    assert!(first.is_empty());
    assert!(second.is_empty());
    assert_eq!(renderer.opened(), 2);
    assert_eq!(renderer.live(), 0);
}

#[tokio::test]
async fn only_mismatches_are_reported_in_input_order() {
    let renderer = fixture();
    let monitors = vec![
        MonitorSpec::new("m1", "#title", ComparisonType::Text).expecting(json!("Spring sale")),
        MonitorSpec::new("m2", "#x", ComparisonType::Text).expecting(json!("Hi")),
        MonitorSpec::new("m3", "#items", ComparisonType::Children)
            .expecting(json!("<li>Tea</li><li>Coffee</li>")),
    ];

    let records = detector(&renderer).check(URL, &monitors).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].monitor_id, "m2".into());
}

#[tokio::test]
async fn relative_href_matches_absolute_snapshot() {
    let renderer = fixture();
    let monitors = vec![MonitorSpec::new(1, "#l", ComparisonType::Attribute)
        .with_attributes(["href"])
        .expecting(json!({"href": "https://example.com/about"}))];

    let records = detector(&renderer).check(URL, &monitors).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn path_relative_hrefs_resolve_against_document_url() {
    let docs = "https://example.com/docs/";
    let renderer = FixtureRenderer::new().with_page(
        docs,
        r##"<a id="l" href="about">About</a><a id="h" href="#top">Top</a>"##,
    );
    let monitors = vec![
        MonitorSpec::new(1, "#l", ComparisonType::Attribute)
            .with_attributes(["href"])
            .expecting(json!({"href": "https://example.com/docs/about"})),
        MonitorSpec::new(2, "#h", ComparisonType::Attribute)
            .with_attributes(["href"])
            .expecting(json!({"href": "https://example.com/docs/#top"})),
    ];

    let records = detector(&renderer).check(docs, &monitors).await.unwrap();
    assert!(records.is_empty(), "unexpected changes: {records:?}");
}

#[tokio::test]
async fn text_mismatch_carries_current_and_expected() {
    let renderer = fixture();
    let monitors = vec![MonitorSpec::new(7, "#x", ComparisonType::Text).expecting(json!("Hi"))];

    let records = detector(&renderer).check(URL, &monitors).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].current, json!("Hello"));
    assert_eq!(records[0].expected, json!("Hi"));
    assert_eq!(records[0].error, None);
}

#[tokio::test]
async fn missing_element_text_is_absent_but_attribute_is_empty_mapping() {
    let renderer = fixture();
    let monitors = vec![
        MonitorSpec::new(1, "#gone", ComparisonType::Text).expecting(json!("placeholder")),
        MonitorSpec::new(2, "#gone", ComparisonType::Attribute)
            .with_attributes(["href"])
            .expecting(json!({"href": "https://example.com/about"})),
    ];

    let records = detector(&renderer).check(URL, &monitors).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].current, Value::Null);
    assert_eq!(records[0].expected, json!("placeholder"));
    assert_eq!(records[1].current, json!({}));
    assert_ne!(records[0].current, records[1].current);
}

#[tokio::test]
async fn absent_policy_unifies_missing_values() {
    let renderer = fixture();
    let config = EngineConfig {
        missing_element: MissingElementPolicy::Absent,
        ..EngineConfig::default()
    };
    let detector = DifferenceDetector::new(Arc::new(renderer.clone()), config);
    let monitors = vec![
        MonitorSpec::new(1, "#gone", ComparisonType::Text).expecting(json!("placeholder")),
        MonitorSpec::new(2, "#gone", ComparisonType::Attribute)
            .with_attributes(["href"])
            .expecting(json!({"href": "x"})),
    ];

    let records = detector.check(URL, &monitors).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.current.is_null()));
}

#[tokio::test]
async fn failing_selector_does_not_hide_other_changes() {
    let renderer = fixture();
    let monitors = vec![
        MonitorSpec::new(1, "p[", ComparisonType::Text).expecting(json!("Hello")),
        MonitorSpec::new(2, "#x", ComparisonType::Text).expecting(json!("Hi")),
    ];

    let records = detector(&renderer).check(URL, &monitors).await.unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].monitor_id, 1.into());
    assert_eq!(records[0].current, Value::Null);
    assert!(records[0].error.is_some());
    assert_eq!(records[1].monitor_id, 2.into());
    assert_eq!(records[1].current, json!("Hello"));
    assert_eq!(renderer.live(), 0);
}

#[tokio::test]
async fn navigation_failure_is_fatal_and_releases_session() {
    let renderer = fixture();
    let monitors = matching_monitors();

    let err = detector(&renderer)
        .check("https://unknown.example/", &monitors)
        .await
        .unwrap_err();

    assert!(err.is_navigation());
    assert_eq!(renderer.opened(), 1);
    assert_eq!(renderer.released(), 1);
}

#[tokio::test]
async fn settle_deadline_is_a_navigation_error() {
    let renderer = fixture().with_latency(Duration::from_millis(500));
    let mut config = EngineConfig::default();
    config.navigation.timeout = Duration::from_millis(20);
    let detector = DifferenceDetector::new(Arc::new(renderer.clone()), config);

    let err = detector.check(URL, &matching_monitors()).await.unwrap_err();

    assert!(matches!(err, EngineError::SettleTimeout { .. }));
    assert_eq!(renderer.released(), 1);
}

#[tokio::test]
async fn cancelled_check_still_releases_session() {
    let renderer = fixture().with_latency(Duration::from_millis(500));
    let detector = detector(&renderer);
    let monitors = matching_monitors();

    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), detector.check(URL, &monitors)).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(renderer.opened(), 1);
    assert_eq!(renderer.released(), 1);
}

#[tokio::test]
async fn repeated_checks_do_not_leak() {
    let renderer = fixture();
    let detector = detector(&renderer);
    let monitors = vec![MonitorSpec::new(1, "#x", ComparisonType::Text).expecting(json!("Hi"))];

    for _ in 0..5 {
        detector.check(URL, &monitors).await.unwrap();
    }
    let _ = detector.check("https://unknown.example/", &monitors).await;

    assert_eq!(renderer.opened(), 6);
    assert_eq!(renderer.released(), 6);
}

#[tokio::test]
async fn concurrent_checks_use_independent_sessions() {
    let other = "https://shop.example/";
    let renderer = fixture().with_page(other, r#"<p id="x">Sold out</p>"#);
    let detector = detector(&renderer);
    let monitors = vec![MonitorSpec::new(1, "#x", ComparisonType::Text).expecting(json!("Hello"))];

    let (a, b) = tokio::join!(detector.check(URL, &monitors), detector.check(other, &monitors));

    assert!(a.unwrap().is_empty());
    let b = b.unwrap();
    assert_eq!(b.len(), 1);
    assert_eq!(b[0].current, json!("Sold out"));
    assert_eq!(renderer.opened(), 2);
    assert_eq!(renderer.live(), 0);
}

#[tokio::test]
async fn page_update_is_detected_on_next_check() {
    let renderer = fixture();
    let detector = detector(&renderer);
    let monitors = matching_monitors();

    assert!(detector.check(URL, &monitors).await.unwrap().is_empty());

    renderer.set_page(
        URL,
        PAGE.replace("<li>Coffee</li>", "<li>Coffee</li><li>Cocoa</li>"),
    );
    let records = detector.check(URL, &monitors).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].comparison_type, ComparisonType::Children);
    assert_eq!(
        records[0].current,
        json!("<li>Tea</li><li>Coffee</li><li>Cocoa</li>")
    );
}

#[tokio::test]
async fn request_envelope_round_trip() {
    let renderer = fixture();
    let request = CheckRequest::from_json(
        r##"{
            "WebsiteURL": "https://example.com/",
            "Monitors": [
                {"MonitorID": 11, "WebsiteID": 3, "UserID": 5, "SnapshotID": 40,
                 "Selector": "#x", "ComparisonType": "text", "ExpectedValue": "Hi"},
                {"MonitorID": 12, "WebsiteID": 3, "UserID": 5, "SnapshotID": 41,
                 "Selector": "#l", "ComparisonType": "attribute", "Attributes": ["href"],
                 "ExpectedValue": {"href": "https://example.com/about"}}
            ]
        }"##,
    )
    .unwrap();

    let records = detector(&renderer)
        .check(&request.website_url, &request.monitors)
        .await
        .unwrap();
    assert_eq!(records.len(), 1);

    let output = serde_json::to_value(&records[0]).unwrap();
    assert_json_include!(
        actual: output,
        expected: json!({
            "MonitorID": 11,
            "WebsiteID": 3,
            "UserID": 5,
            "SnapshotID": 40,
            "Selector": "#x",
            "ComparisonType": "text",
            "Attributes": [],
            "ExpectedValue": "Hi",
            "current": "Hello",
            "expected": "Hi"
        })
    );
    assert!(output["DetectedAt"].is_string());
}
