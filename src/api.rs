// src/api.rs
//! HTTP surface: read the log and ledger, manage recipients, trigger a cycle,
//! run compliance analysis.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use shuttle_axum::axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::analyze::{BusinessProfile, ComplianceAnalyzer, IMPACT_WINDOW_DAYS};
use crate::error::MonitorError;
use crate::ingest::date::to_oj_date;
use crate::monitor::scheduler::SchedulerHandle;
use crate::monitor::threshold::recent_updates;
use crate::recipients::Recipient;
use crate::store::Registration;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: SchedulerHandle,
    pub analyzer: ComplianceAnalyzer,
}

impl AppState {
    pub fn new(scheduler: SchedulerHandle, analyzer: ComplianceAnalyzer) -> Self {
        Self {
            scheduler,
            analyzer,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/regulatory-updates", get(regulatory_updates))
        .route("/api/alerts", get(alerts))
        .route("/api/recipients", get(list_recipients).post(add_recipient))
        .route("/api/monitor/run", post(run_monitor))
        .route("/api/monitor/status", get(monitor_status))
        .route("/api/analyze-compliance", post(analyze_compliance))
        .route("/api/assess-impact", post(assess_impact))
        .route("/api/normalize-date", get(normalize_date))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// `{"error": ...}` with a status code.
pub struct ApiError(StatusCode, String);

impl ApiError {
    fn bad_request(msg: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, msg.into())
    }
}

impl From<MonitorError> for ApiError {
    fn from(e: MonitorError) -> Self {
        let status = match e {
            MonitorError::InvalidDateFormat(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
struct UpdatesQuery {
    /// Only records discovered in the last `days` days.
    days: Option<u32>,
    source: Option<String>,
}

async fn regulatory_updates(
    State(state): State<AppState>,
    Query(q): Query<UpdatesQuery>,
) -> ApiResult<Json<Value>> {
    let log = state.scheduler.pipeline().load_log()?;
    let mut grouped = match q.days {
        Some(days) => recent_updates(&log, days, Utc::now()),
        None => log
            .iter()
            .map(|(s, recs)| (s.to_string(), recs.to_vec()))
            .collect(),
    };
    if let Some(source) = q.source.as_deref().filter(|s| *s != "all") {
        grouped.retain(|k, _| k == source);
    }
    let total: usize = grouped.values().map(Vec::len).sum();
    Ok(Json(json!({ "total": total, "updates": grouped })))
}

async fn alerts(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let history = state.scheduler.pipeline().ledger().history()?;
    Ok(Json(json!({ "total": history.len(), "alerts": history })))
}

async fn list_recipients(State(state): State<AppState>) -> ApiResult<Json<Vec<Recipient>>> {
    let list = state
        .scheduler
        .pipeline()
        .stores()
        .recipients
        .recipients()
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;
    Ok(Json(list))
}

#[derive(Deserialize)]
struct NewRecipient {
    email: String,
}

async fn add_recipient(
    State(state): State<AppState>,
    Json(body): Json<NewRecipient>,
) -> ApiResult<(StatusCode, Json<Recipient>)> {
    let candidate = Recipient::parse(&body.email).map_err(|e| ApiError::bad_request(format!("{e:#}")))?;
    let store = &state.scheduler.pipeline().stores().recipients;
    let internal = |e: anyhow::Error| ApiError(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"));

    match store.register(candidate).map_err(internal)? {
        Registration::Existing(found) => Ok((StatusCode::OK, Json(found))),
        Registration::Created(added) => {
            tracing::info!(target: "api", id = %added.id, "recipient added");
            Ok((StatusCode::CREATED, Json(added)))
        }
    }
}

async fn run_monitor(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    if state.scheduler.trigger() {
        (StatusCode::ACCEPTED, Json(json!({ "status": "started" })))
    } else {
        (StatusCode::CONFLICT, Json(json!({ "status": "running" })))
    }
}

async fn monitor_status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "state": state.scheduler.state() }))
}

/// `business_info` out of a request body, 400 when absent or malformed.
fn business_info(body: &Value) -> ApiResult<BusinessProfile> {
    match body.get("business_info") {
        None | Some(Value::Null) => Err(ApiError::bad_request("Business information required")),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| ApiError::bad_request(format!("invalid business_info: {e}"))),
    }
}

async fn analyze_compliance(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let profile = business_info(&body)?;
    let analysis = state.analyzer.analyze_compliance(&profile).await;
    let mut out = serde_json::to_value(&analysis)
        .map_err(|e| ApiError(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    if body.get("include_plan").and_then(Value::as_bool).unwrap_or(false) && !analysis.is_fallback() {
        let roadmap = state.analyzer.generate_roadmap(&analysis).await;
        let costs = state.analyzer.estimate_costs(&analysis).await;
        out["roadmap"] = roadmap;
        out["cost_estimate"] = costs;
    }
    Ok(Json(out))
}

async fn assess_impact(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let profile = business_info(&body)?;
    let log = state.scheduler.pipeline().load_log()?;
    let recent = recent_updates(&log, IMPACT_WINDOW_DAYS, Utc::now());
    Ok(Json(state.analyzer.assess_impact(&profile, &recent).await))
}

#[derive(Deserialize)]
struct DateQuery {
    date: String,
}

async fn normalize_date(Query(q): Query<DateQuery>) -> ApiResult<Json<Value>> {
    let oj_date = to_oj_date(q.date.as_str())?;
    Ok(Json(json!({ "input": q.date, "oj_date": oj_date })))
}
