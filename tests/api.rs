//! Command facade behavior: response shapes, error codes, send-now, and
//! the global-config and profile pass-through surface.

mod common;

use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{fast_settings, page_content, wait_for, ScriptedAgent};
use pagewatch::{dispatch_command, Command, Engine, LogCategory, LogFilter, MemoryStore};

async fn engine_with_page(webhook: Option<String>) -> (Engine, Arc<ScriptedAgent>) {
    let agent = Arc::new(ScriptedAgent::new());
    agent.add_page("7", "https://shop.example/listing", &page_content("listing", 400));
    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(fast_settings(webhook), store, agent.clone());
    engine.start().await;
    (engine, agent)
}

async fn run(engine: &Engine, value: serde_json::Value) -> serde_json::Value {
    let command: Command = serde_json::from_value(value).unwrap();
    dispatch_command(engine, command).await
}

#[tokio::test]
async fn start_status_stop_roundtrip() {
    let (engine, _agent) = engine_with_page(None).await;

    let started = run(
        &engine,
        json!({
            "command": "start_target",
            "pageRef": "7",
            "initialUrl": "https://shop.example/listing",
            "selector": "#items",
            "intervalMs": 60_000,
        }),
    )
    .await;
    assert_eq!(started["success"], true);
    let id = started["targetId"].as_str().unwrap().to_owned();

    let status = run(&engine, json!({"command": "status", "targetId": id})).await;
    assert_eq!(status["success"], true);
    assert_eq!(status["isRunning"], true);
    assert_eq!(status["config"]["selector"], "#items");

    let all = run(&engine, json!({"command": "status_all"})).await;
    assert_eq!(all["targetIds"].as_array().unwrap().len(), 1);

    let stopped = run(&engine, json!({"command": "stop_target", "targetId": id})).await;
    assert_eq!(stopped["success"], true);

    let all = run(&engine, json!({"command": "status_all"})).await;
    assert!(all["targetIds"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn validation_failures_carry_stable_codes() {
    let (engine, _agent) = engine_with_page(None).await;

    // Below even the test floor configured in fast_settings.
    let response = run(
        &engine,
        json!({
            "command": "start_target",
            "pageRef": "7",
            "initialUrl": "https://shop.example/listing",
            "selector": "#items",
            "intervalMs": 5,
        }),
    )
    .await;
    assert_eq!(response["success"], false);
    assert_eq!(response["code"], "invalid_interval");
    assert!(response["message"].as_str().unwrap().contains("interval"));

    let response = run(
        &engine,
        json!({
            "command": "start_target",
            "pageRef": "7",
            "initialUrl": "ftp://shop.example/listing",
            "selector": "#items",
            "intervalMs": 60_000,
        }),
    )
    .await;
    assert_eq!(response["code"], "invalid_page_url");

    let response = run(
        &engine,
        json!({
            "command": "start_target",
            "pageRef": "7",
            "initialUrl": "https://shop.example/listing",
            "selector": "",
            "intervalMs": 60_000,
        }),
    )
    .await;
    assert_eq!(response["code"], "invalid_selector");

    let response = run(
        &engine,
        json!({"command": "stop_target", "targetId": "no-such-target"}),
    )
    .await;
    assert_eq!(response["success"], false);
    assert_eq!(response["code"], "target_not_found");
}

#[tokio::test]
async fn start_on_missing_page_is_rejected() {
    let (engine, _agent) = engine_with_page(None).await;
    let response = run(
        &engine,
        json!({
            "command": "start_target",
            "pageRef": "999",
            "initialUrl": "https://shop.example/listing",
            "selector": "#items",
            "intervalMs": 60_000,
        }),
    )
    .await;
    assert_eq!(response["success"], false);
    assert_eq!(response["code"], "page_gone");
}

#[tokio::test]
async fn interval_floor_boundary_is_five_seconds_by_default() {
    // Default settings here, not the fast test settings: the floor is 5 s.
    let agent = Arc::new(ScriptedAgent::new());
    agent.add_page("7", "https://shop.example/listing", &page_content("listing", 400));
    let engine = Engine::new(
        pagewatch::EngineSettings::default(),
        Arc::new(MemoryStore::new()),
        agent,
    );

    let ok = run(
        &engine,
        json!({
            "command": "start_target",
            "pageRef": "7",
            "initialUrl": "https://shop.example/listing",
            "selector": "#items",
            "intervalMs": 5_000,
        }),
    )
    .await;
    assert_eq!(ok["success"], true);

    let rejected = run(
        &engine,
        json!({
            "command": "start_target",
            "pageRef": "7",
            "initialUrl": "https://shop.example/listing",
            "selector": "#items",
            "intervalMs": 4_999,
        }),
    )
    .await;
    assert_eq!(rejected["code"], "invalid_interval");
}

#[tokio::test]
async fn send_now_posts_once_without_touching_target_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/adhoc"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (engine, _agent) = engine_with_page(None).await;

    let response = run(
        &engine,
        json!({
            "command": "send_now",
            "pageRef": "7",
            "selector": "#items",
            "webhookOverride": format!("{}/adhoc", server.uri()),
        }),
    )
    .await;
    assert_eq!(response["success"], true);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["type"], "page_monitor");
    assert_eq!(body["changeDetected"], true);
    assert_eq!(body["url"], "https://shop.example/listing");
    assert!(body["content"].as_str().unwrap().starts_with("listing"));
}

#[tokio::test]
async fn send_now_explicit_override_beats_target_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/explicit"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/target"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (engine, _agent) = engine_with_page(None).await;
    let started = run(
        &engine,
        json!({
            "command": "start_target",
            "pageRef": "7",
            "initialUrl": "https://shop.example/listing",
            "selector": "#items",
            "intervalMs": 60_000,
            "webhookOverride": format!("{}/target", server.uri()),
        }),
    )
    .await;
    let id = started["targetId"].as_str().unwrap().to_owned();

    // Let the baseline cycle finish so the target dispatch path stays quiet.
    wait_for("baseline", || async {
        engine
            .activity_log()
            .query(&LogFilter {
                category: Some(LogCategory::Change),
                ..LogFilter::default()
            })
            .await
            .len()
            == 1
    })
    .await;

    let response = run(
        &engine,
        json!({
            "command": "send_now",
            "targetId": id,
            "webhookOverride": format!("{}/explicit", server.uri()),
        }),
    )
    .await;
    assert_eq!(response["success"], true);
}

#[tokio::test]
async fn send_now_without_webhook_reports_unconfigured() {
    let (engine, _agent) = engine_with_page(None).await;
    let response = run(
        &engine,
        json!({"command": "send_now", "pageRef": "7", "selector": "#items"}),
    )
    .await;
    assert_eq!(response["success"], false);
    assert_eq!(response["code"], "no_webhook_configured");
}

#[tokio::test]
async fn test_webhook_fires_a_synthetic_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/probe"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (engine, _agent) = engine_with_page(None).await;
    let response = run(
        &engine,
        json!({"command": "test_webhook", "url": format!("{}/probe", server.uri())}),
    )
    .await;
    assert_eq!(response["success"], true);
}

#[tokio::test]
async fn global_config_roundtrips_and_validates() {
    let (engine, _agent) = engine_with_page(None).await;

    let set = run(
        &engine,
        json!({
            "command": "set_global_config",
            "webhookUrl": "https://hooks.example.com/h",
            "defaults": {"refreshIntervalMs": 120_000, "changeDetection": false},
        }),
    )
    .await;
    assert_eq!(set["success"], true);

    let got = run(&engine, json!({"command": "get_global_config"})).await;
    assert_eq!(got["global"]["webhookUrl"], "https://hooks.example.com/h");
    assert_eq!(got["global"]["defaults"]["refreshIntervalMs"], 120_000);

    let bad = run(
        &engine,
        json!({"command": "set_global_config", "webhookUrl": "not a url"}),
    )
    .await;
    assert_eq!(bad["success"], false);
    assert_eq!(bad["code"], "invalid_webhook_url");

    // The setup placeholder persists as configured-but-unset.
    let placeholder = run(
        &engine,
        json!({"command": "set_global_config", "webhookUrl": "YOUR_WEBHOOK_URL"}),
    )
    .await;
    assert_eq!(placeholder["success"], true);
}

#[tokio::test]
async fn defaults_fill_unset_start_fields() {
    let (engine, _agent) = engine_with_page(None).await;
    run(
        &engine,
        json!({
            "command": "set_global_config",
            "defaults": {"refreshIntervalMs": 45_000, "changeDetection": false},
        }),
    )
    .await;

    let started = run(
        &engine,
        json!({
            "command": "start_target",
            "pageRef": "7",
            "initialUrl": "https://shop.example/listing",
            "selector": "#items",
        }),
    )
    .await;
    assert_eq!(started["success"], true);
    let id = started["targetId"].as_str().unwrap().to_owned();

    let status = run(&engine, json!({"command": "status", "targetId": id})).await;
    assert_eq!(status["config"]["intervalMs"], 45_000);
    assert_eq!(status["config"]["changeDetection"], false);
}

#[tokio::test]
async fn activity_log_commands_query_and_clear() {
    let (engine, _agent) = engine_with_page(None).await;
    run(
        &engine,
        json!({
            "command": "start_target",
            "pageRef": "7",
            "initialUrl": "https://shop.example/listing",
            "selector": "#items",
            "intervalMs": 60_000,
        }),
    )
    .await;

    let log = run(
        &engine,
        json!({"command": "get_activity_log", "category": "monitoring"}),
    )
    .await;
    assert_eq!(log["success"], true);
    assert!(!log["entries"].as_array().unwrap().is_empty());
    assert!(log["counts"]["info"].as_u64().unwrap() >= 1);

    let cleared = run(&engine, json!({"command": "clear_activity_log"})).await;
    assert_eq!(cleared["success"], true);

    let log = run(&engine, json!({"command": "get_activity_log"})).await;
    assert!(log["entries"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn profiles_pass_through_the_store() {
    let (engine, _agent) = engine_with_page(None).await;

    let body = json!({"selector": "#price", "intervalMs": 30_000, "note": "opaque to the engine"});
    let saved = run(
        &engine,
        json!({"command": "save_profile", "name": "price-watch", "body": body}),
    )
    .await;
    assert_eq!(saved["success"], true);

    let listed = run(&engine, json!({"command": "list_profiles"})).await;
    assert_eq!(listed["profiles"]["price-watch"]["selector"], "#price");

    let deleted = run(
        &engine,
        json!({"command": "delete_profile", "name": "price-watch"}),
    )
    .await;
    assert_eq!(deleted["success"], true);

    let listed = run(&engine, json!({"command": "list_profiles"})).await;
    assert!(listed["profiles"].as_object().unwrap().is_empty());
}
