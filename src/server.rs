use crate::config::{Config, RunOverrides};
use crate::pipeline::driver::{run_pipeline, PipelineSummary};
use axum::{
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use cron::Schedule;
use hyper::Server;
use serde::Serialize;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Record of one triggered run
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub trigger: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<PipelineSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    pub fn succeeded(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    /// Held for the whole run so HTTP and cron triggers never overlap
    run_lock: Arc<Mutex<()>>,
    latest: Arc<RwLock<Option<RunRecord>>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            run_lock: Arc::new(Mutex::new(())),
            latest: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn latest(&self) -> Option<RunRecord> {
        self.latest.read().await.clone()
    }
}

/// Run the pipeline once with `overrides` applied and remember the outcome.
pub async fn execute_run(state: &AppState, overrides: &RunOverrides, trigger: &str) -> RunRecord {
    let _guard = state.run_lock.lock().await;
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!(%run_id, trigger, "run_triggered");

    let mut config = (*state.config).clone();
    config.apply_overrides(overrides);
    let result = run_pipeline(&config).await;

    let record = match result {
        Ok(summary) => RunRecord {
            run_id,
            trigger: trigger.to_string(),
            started_at,
            finished_at: Utc::now(),
            status: "success".to_string(),
            summary: Some(summary),
            error: None,
        },
        Err(e) => {
            error!(%run_id, error = %e, "run_failed");
            RunRecord {
                run_id,
                trigger: trigger.to_string(),
                started_at,
                finished_at: Utc::now(),
                status: "failed".to_string(),
                summary: None,
                error: Some(e.to_string()),
            }
        }
    };

    *state.latest.write().await = Some(record.clone());
    record
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.orchestration.flow_name,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// An empty body means no overrides. Anything else must be a valid override object.
fn parse_overrides(body: &[u8]) -> Result<RunOverrides, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RunOverrides::default());
    }
    serde_json::from_slice(body)
}

async fn trigger_run(State(state): State<AppState>, body: Bytes) -> Response {
    let overrides = match parse_overrides(&body) {
        Ok(overrides) => overrides,
        Err(e) => {
            warn!(error = %e, "rejected_run_overrides");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": format!("invalid run overrides: {}", e) })),
            )
                .into_response();
        }
    };
    let record = execute_run(&state, &overrides, "http").await;
    let status = if record.succeeded() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(record)).into_response()
}

async fn latest_run(State(state): State<AppState>) -> impl IntoResponse {
    match state.latest().await {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no runs yet" })),
        )
            .into_response(),
    }
}

pub fn create_server(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/runs", post(trigger_run))
        .route("/runs/latest", get(latest_run))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
}

/// Accept standard five-field cron expressions by adding a seconds field.
pub fn parse_schedule(expr: &str) -> Result<Schedule, cron::error::Error> {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        Schedule::from_str(&format!("0 {}", expr))
    } else {
        Schedule::from_str(expr)
    }
}

/// Trigger a run at every fire time of `schedule`. Never returns.
pub async fn run_scheduler(state: AppState, schedule: Schedule) {
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!("Cron schedule has no upcoming fire times; scheduler stopped");
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        info!(next = %next, "next_scheduled_run");
        tokio::time::sleep(wait).await;

        let record = execute_run(&state, &RunOverrides::default(), "cron").await;
        info!(run_id = %record.run_id, status = %record.status, "scheduled_run_finished");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Start the HTTP server and, with a cron expression, the scheduler.
pub async fn start_server(
    config: Config,
    port: u16,
    cron: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(config);

    if let Some(expr) = cron {
        let schedule = parse_schedule(&expr)
            .map_err(|e| format!("Invalid cron expression '{}': {}", expr, e))?;
        info!(cron = %expr, "Scheduling pipeline runs");
        tokio::spawn(run_scheduler(state.clone(), schedule));
    }

    let app = create_server(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("HTTP server running on http://localhost:{port}");
    info!("Health check: http://localhost:{port}/health");
    info!("Trigger a run: POST http://localhost:{port}/runs");

    Server::try_bind(&addr)?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
