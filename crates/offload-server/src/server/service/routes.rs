use crate::server::service::{
    error::{Result, ServiceError},
    handler::ComputeService,
};
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use offload::DispatchState;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

#[derive(Debug, Serialize)]
pub struct ComputeResponse {
    pub input: u64,
    pub result: u64,
}

pub fn router(service: ComputeService) -> Router {
    Router::new()
        .route("/compute/{n}", get(compute))
        .route("/health", get(health))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(service)
}

async fn compute(
    State(service): State<ComputeService>,
    input: core::result::Result<Path<u64>, PathRejection>,
) -> Result<Json<ComputeResponse>> {
    let Path(n) = input.map_err(|e| ServiceError::InvalidRequest {
        reason: e.body_text(),
    })?;
    let result = service.compute(n).await?;
    Ok(Json(ComputeResponse { input: n, result }))
}

async fn health(State(service): State<ComputeService>) -> Response {
    let status = service.status().await;
    let code = if status.state == DispatchState::Running {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status)).into_response()
}
