// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value as Json};
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use common::{RecordingDispatcher, StaticFetcher};
use eu_compliance_monitor::analyze::{ComplianceAnalyzer, MockProvider};
use eu_compliance_monitor::api::{self, AppState};
use eu_compliance_monitor::monitor::{MonitorPipeline, PipelineSettings, SchedulerHandle};
use eu_compliance_monitor::store::{MemoryStore, Stores};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

const ANALYSIS: &str = r#"{"regulatory_requirements":["GDPR"],"compliance_gaps":[],"action_items":[],"risks":[],"overall_compliance_score":72}"#;

struct Harness {
    app: Router,
    scheduler: SchedulerHandle,
    fetcher: StaticFetcher,
}

fn harness(reply: &str) -> Harness {
    let fetcher = StaticFetcher::new("eur-lex", &["Reg A", "Reg B"]);
    let pipeline = MonitorPipeline::new(
        vec![fetcher.boxed()],
        Arc::new(RecordingDispatcher::default()),
        Stores::shared(Arc::new(MemoryStore::new())),
        PipelineSettings::default(),
    );
    let scheduler = SchedulerHandle::new(Arc::new(pipeline));
    let analyzer = ComplianceAnalyzer::new(Arc::new(MockProvider::replying(reply)));
    Harness {
        app: api::router(AppState::new(scheduler.clone(), analyzer)),
        scheduler,
        fetcher,
    }
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Json) {
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let v = serde_json::from_slice(&bytes).unwrap_or_else(|_| Json::String(String::from_utf8_lossy(&bytes).into()));
    (status, v)
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("build GET")
}

fn post_json(uri: &str, body: Json) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build POST")
}

#[tokio::test]
async fn health_returns_ok() {
    let h = harness(ANALYSIS);
    let (status, body) = call(&h.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Json::String("OK".into()));
}

#[tokio::test]
async fn normalize_date_accepts_three_shapes_and_rejects_slashes() {
    let h = harness(ANALYSIS);
    for input in ["2025-09-10", "10-09-2025", "10092025"] {
        let (status, body) = call(&h.app, get(&format!("/api/normalize-date?date={input}"))).await;
        assert_eq!(status, StatusCode::OK, "{input}");
        assert_eq!(body["oj_date"], "10092025");
    }
    let (status, body) = call(&h.app, get("/api/normalize-date?date=2025%2F09%2F10")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("invalid date format"));
}

#[tokio::test]
async fn manual_trigger_starts_then_conflicts_while_running() {
    let h = harness(ANALYSIS);
    h.fetcher.delay(Duration::from_millis(300));

    let (status, body) = call(&h.app, post_json("/api/monitor/run", json!({}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "started");

    let (status, _) = call(&h.app, post_json("/api/monitor/run", json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = call(&h.app, get("/api/monitor/status")).await;
    assert_eq!(body["state"], "running");

    // wait for the background cycle, then the log is visible
    for _ in 0..50 {
        if h.scheduler.state() == eu_compliance_monitor::monitor::SchedulerState::Idle {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let (status, body) = call(&h.app, get("/api/regulatory-updates?days=7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["updates"]["eur-lex"][0]["title"], "Reg A");

    let (_, body) = call(&h.app, get("/api/regulatory-updates?source=gdpr")).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn recipients_can_be_added_once_and_listed() {
    let h = harness(ANALYSIS);

    let (status, created) = call(
        &h.app,
        post_json("/api/recipients", json!({ "email": "legal@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, again) = call(
        &h.app,
        post_json("/api/recipients", json!({ "email": "LEGAL@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["id"], created["id"]);

    let (status, _) = call(
        &h.app,
        post_json("/api/recipients", json!({ "email": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, list) = call(&h.app, get("/api/recipients")).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn alerts_endpoint_lists_the_ledger() {
    let h = harness(ANALYSIS);
    let (status, body) = call(&h.app, get("/api/alerts")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn analyze_without_business_info_is_400() {
    let h = harness(ANALYSIS);
    let (status, body) = call(&h.app, post_json("/api/analyze-compliance", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Business information required");

    let (status, _) = call(
        &h.app,
        post_json("/api/analyze-compliance", json!({ "business_info": null })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn analyze_returns_parsed_analysis() {
    let h = harness(ANALYSIS);
    let (status, body) = call(
        &h.app,
        post_json(
            "/api/analyze-compliance",
            json!({ "business_info": { "business_name": "Acme", "industry": "SaaS" } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overall_compliance_score"], 72);
    assert_eq!(body["business_info"]["industry"], "SaaS");
    assert!(body.get("raw_response").is_none());
}

#[tokio::test]
async fn analyze_with_prose_reply_still_200_with_fallback() {
    let h = harness("Sorry, I can't produce JSON today.");
    let (status, body) = call(
        &h.app,
        post_json("/api/analyze-compliance", json!({ "business_info": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overall_compliance_score"], 0);
    assert_eq!(body["raw_response"], "Sorry, I can't produce JSON today.");
}

#[tokio::test]
async fn huge_days_query_lists_everything() {
    let h = harness(ANALYSIS);
    h.scheduler.run_now().await;

    let (status, body) = call(&h.app, get("/api/regulatory-updates?days=4294967295")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_posts_register_one_recipient() {
    let h = harness(ANALYSIS);
    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let app = h.app.clone();
            tokio::spawn(async move {
                call(
                    &app,
                    post_json("/api/recipients", json!({ "email": "dpo@example.com" })),
                )
                .await
            })
        })
        .collect();

    let mut created = 0;
    for t in tasks {
        let (status, _) = t.await.unwrap();
        if status == StatusCode::CREATED {
            created += 1;
        } else {
            assert_eq!(status, StatusCode::OK);
        }
    }
    assert_eq!(created, 1);

    let (_, list) = call(&h.app, get("/api/recipients")).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}
