//! Health endpoints for the bookstore backend.
//!
//! `/health/live` answers as long as the process serves requests. `/health/ready`
//! checks the database and the catalog schema, and reports which carrier quotes
//! delivery fees.

use crate::{db, entities::book, AppState};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::warn;

lazy_static! {
    static ref STARTED: Instant = Instant::now();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Up,
    Down,
}

#[derive(Debug, Serialize)]
pub struct Liveness {
    pub status: CheckStatus,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct Readiness {
    pub status: CheckStatus,
    pub checks: BTreeMap<&'static str, CheckStatus>,
    /// `yalidine` or `flat_rate`
    pub carrier: &'static str,
    pub timestamp: DateTime<Utc>,
}

pub async fn liveness() -> Json<Liveness> {
    Json(Liveness {
        status: CheckStatus::Up,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: STARTED.elapsed().as_secs(),
    })
}

/// 503 until the database answers and the catalog tables exist
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Readiness>) {
    let mut checks = BTreeMap::new();

    let database = match db::check_connection(&state.db).await {
        Ok(()) => CheckStatus::Up,
        Err(_) => CheckStatus::Down,
    };
    checks.insert("database", database);

    let catalog = match book::Entity::find().count(&*state.db).await {
        Ok(_) => CheckStatus::Up,
        Err(e) => {
            warn!(error = %e, "catalog tables unavailable; migrations pending?");
            CheckStatus::Down
        }
    };
    checks.insert("catalog", catalog);

    let status = if checks.values().all(|c| *c == CheckStatus::Up) {
        CheckStatus::Up
    } else {
        CheckStatus::Down
    };
    let code = match status {
        CheckStatus::Up => StatusCode::OK,
        CheckStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    let carrier = if state.config.yalidine_credentials().is_some() {
        "yalidine"
    } else {
        "flat_rate"
    };

    (
        code,
        Json(Readiness {
            status,
            checks,
            carrier,
            timestamp: Utc::now(),
        }),
    )
}

pub fn health_routes() -> Router<AppState> {
    lazy_static::initialize(&STARTED);
    Router::new()
        .route("/", get(readiness))
        .route("/ready", get(readiness))
        .route("/live", get(liveness))
}
