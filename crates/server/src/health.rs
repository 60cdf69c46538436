//! Liveness and readiness endpoints.

use std::{sync::Arc, time::Instant};

use accord_core::SettlementReport;
use accord_queue::SchedulerState;
use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use tokio::sync::RwLock;

/// Shared state of the health router.
#[derive(Clone)]
pub struct HealthState {
    pub db: Arc<DatabaseConnection>,
    /// `None` when the scheduler is disabled.
    pub scheduler: Option<Arc<RwLock<SchedulerState>>>,
}

/// Create the health router.
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Simple health check (liveness probe).
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub database: CheckResult,
    pub scheduler: Option<SchedulerView>,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub latency_ms: Option<u64>,
}

/// Snapshot of the scheduler's last and next runs.
#[derive(Debug, Serialize)]
pub struct SchedulerView {
    pub next_run: Option<DateTime<Utc>>,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_report: Option<SettlementReport>,
    pub skipped: u64,
}

impl From<&SchedulerState> for SchedulerView {
    fn from(state: &SchedulerState) -> Self {
        Self {
            next_run: state.next_run,
            last_started: state.last_started,
            last_finished: state.last_finished,
            last_error: state.last_error.clone(),
            last_report: state.last_report.clone(),
            skipped: state.skipped,
        }
    }
}

/// Readiness check (readiness probe).
///
/// Only the database decides readiness; a failed settlement pass is
/// reported but does not take the process out of rotation.
async fn readiness_check(
    State(state): State<HealthState>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let start = Instant::now();
    let database = match accord_db::ping(&state.db).await {
        Ok(()) => CheckResult {
            status: "ok".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Database readiness check failed");
            CheckResult {
                status: format!("error: {e}"),
                latency_ms: None,
            }
        }
    };

    let scheduler = match &state.scheduler {
        Some(shared) => Some(SchedulerView::from(&*shared.read().await)),
        None => None,
    };

    let ready = database.status == "ok";
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            database,
            scheduler,
        }),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use tower::ServiceExt;

    fn healthy_db() -> Arc<DatabaseConnection> {
        Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        )
    }

    fn empty_db() -> Arc<DatabaseConnection> {
        Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection())
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_liveness_always_ok() {
        let app = router(HealthState {
            db: empty_db(),
            scheduler: None,
        });

        let (status, body) = get_json(app, "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_ready_reports_scheduler_state() {
        let state = SchedulerState {
            last_error: Some("vote service down".to_string()),
            skipped: 2,
            ..SchedulerState::default()
        };
        let app = router(HealthState {
            db: healthy_db(),
            scheduler: Some(Arc::new(RwLock::new(state))),
        });

        let (status, body) = get_json(app, "/health/ready").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
        assert_eq!(body["database"]["status"], "ok");
        assert_eq!(body["scheduler"]["last_error"], "vote service down");
        assert_eq!(body["scheduler"]["skipped"], 2);
    }

    #[tokio::test]
    async fn test_not_ready_when_database_fails() {
        let app = router(HealthState {
            db: empty_db(),
            scheduler: None,
        });

        let (status, body) = get_json(app, "/health/ready").await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["ready"], false);
        assert!(body["scheduler"].is_null());
    }
}
