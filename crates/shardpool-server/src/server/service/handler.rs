//! HTTP endpoints.
//!
//! - `GET /random?type=int|float` - one value, or `503` with a retry hint.
//! - `GET /stats` - per-partition and registry counts.
//! - `GET /health` - liveness.

use crate::server::telemetry::{
    increment_pops_served, increment_pops_unavailable, record_pop_duration,
};
use axum::{
    Json, Router,
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use core::time::Duration;
use serde::{Deserialize, Serialize};
use shardpool::{
    Allocation, CandidateSource, Kind, PartitionId, PoolAllocator, TokioSleep, UniquenessRegistry,
    Value,
};
use std::time::Instant;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Seconds advertised in `Retry-After` on a `503`.
pub const RETRY_AFTER_SECS: u64 = 1;

#[derive(Debug, Deserialize)]
pub struct RandomQuery {
    #[serde(rename = "type")]
    pub kind: Option<Kind>,
}

#[derive(Debug, Serialize)]
pub struct RandomResponse {
    pub partition: PartitionId,
    pub kind: Kind,
    pub value: Value,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
    pub retryable: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub status: &'static str,
    pub active_partitions: usize,
}

/// Serves a [`PoolAllocator`] over HTTP. Cloning shares the same pool.
pub struct ValueService<R, C> {
    pool: PoolAllocator<R, C>,
}

impl<R, C> Clone for ValueService<R, C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<R, C> ValueService<R, C>
where
    R: UniquenessRegistry + 'static,
    C: CandidateSource + 'static,
{
    pub const fn new(pool: PoolAllocator<R, C>) -> Self {
        Self { pool }
    }

    pub const fn pool(&self) -> &PoolAllocator<R, C> {
        &self.pool
    }

    /// All routes, with permissive CORS and request tracing.
    pub fn router(self) -> Router {
        Router::new()
            .route("/random", get(random::<R, C>))
            .route("/stats", get(stats::<R, C>))
            .route("/health", get(health::<R, C>))
            .layer(TraceLayer::new_for_http())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(self)
    }

    /// Stops scheduling refills and waits up to `timeout` for running ones.
    pub async fn shutdown(&self, timeout: Duration) {
        if !self.pool.shutdown(timeout).await {
            tracing::warn!("shut down with refills still running");
        }
    }
}

fn error_response(status: StatusCode, detail: String, retryable: bool) -> Response {
    let mut response = (status, Json(ErrorBody { detail, retryable })).into_response();
    if retryable {
        response.headers_mut().insert(
            header::RETRY_AFTER,
            HeaderValue::from(RETRY_AFTER_SECS),
        );
    }
    response
}

async fn random<R, C>(
    State(service): State<ValueService<R, C>>,
    query: Result<Query<RandomQuery>, QueryRejection>,
) -> Response
where
    R: UniquenessRegistry + 'static,
    C: CandidateSource + 'static,
{
    let kind = match query {
        Ok(Query(query)) => query.kind,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("{rejection}. Expected `type=int` or `type=float`."),
                false,
            );
        }
    };

    let start = Instant::now();
    let allocation = service.pool.pop::<TokioSleep>(kind).await;
    record_pop_duration(start.elapsed().as_secs_f64() * 1000.0);

    match allocation {
        Allocation::Ready { partition, value } => {
            increment_pops_served(value.kind());
            Json(RandomResponse {
                partition,
                kind: value.kind(),
                value,
            })
            .into_response()
        }
        Allocation::Unavailable { reason } => {
            increment_pops_unavailable();
            tracing::debug!(%reason, "pop unavailable");
            error_response(StatusCode::SERVICE_UNAVAILABLE, reason.to_string(), true)
        }
    }
}

async fn stats<R, C>(State(service): State<ValueService<R, C>>) -> Response
where
    R: UniquenessRegistry + 'static,
    C: CandidateSource + 'static,
{
    let pool = service.pool.clone();
    match tokio::task::spawn_blocking(move || pool.snapshot()).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "snapshot task failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Statistics are unavailable.".to_string(),
                true,
            )
        }
    }
}

async fn health<R, C>(State(service): State<ValueService<R, C>>) -> Json<HealthBody>
where
    R: UniquenessRegistry + 'static,
    C: CandidateSource + 'static,
{
    Json(HealthBody {
        status: "ok",
        active_partitions: service.pool.active_count(),
    })
}
