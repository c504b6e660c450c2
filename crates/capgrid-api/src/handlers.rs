//! REST API handlers for scheduling.
//!
//! Each handler delegates to the `DeploymentScheduler` and returns a JSON
//! `ApiResponse`. Scheduler errors are mapped to HTTP statuses in
//! [`scheduler_error`].

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use capgrid_scheduler::{DeploymentRequest, SchedulerError};
use capgrid_state::{ClusterId, DeploymentId, DeploymentStatus};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::ApiState;
use crate::identity::CurrentUser;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
pub(crate) struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Map a scheduler error onto an HTTP response.
///
/// Insufficient-resource failures carry both vectors in `data` so the
/// caller can see what was short.
pub(crate) fn scheduler_error(e: SchedulerError) -> Response {
    let msg = e.to_string();
    match e {
        SchedulerError::NotFound(_) => error_response(&msg, StatusCode::NOT_FOUND).into_response(),
        SchedulerError::Forbidden(_) => error_response(&msg, StatusCode::FORBIDDEN).into_response(),
        SchedulerError::InsufficientResources {
            requested,
            available,
        } => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse {
                success: false,
                data: Some(serde_json::json!({
                    "requested": requested,
                    "available": available,
                })),
                error: Some(msg),
            }),
        )
            .into_response(),
        SchedulerError::InvalidRequest(_) => {
            error_response(&msg, StatusCode::BAD_REQUEST).into_response()
        }
        SchedulerError::Conflict(_) => error_response(&msg, StatusCode::CONFLICT).into_response(),
        SchedulerError::Unavailable(_) => {
            error_response(&msg, StatusCode::SERVICE_UNAVAILABLE).into_response()
        }
        SchedulerError::ResourceInvariantViolation(_)
        | SchedulerError::Internal(_)
        | SchedulerError::State(_) => {
            error!(error = %msg, "request failed");
            error_response(&msg, StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok("ok")
}

// ── Deployments ────────────────────────────────────────────────

/// Query string for `POST /api/v1/deployments`.
#[derive(Debug, Default, Deserialize)]
pub struct ScheduleQuery {
    pub strategy: Option<String>,
}

/// Body for `POST /api/v1/deployments`.
#[derive(Debug, Deserialize)]
pub struct CreateDeployment {
    pub cluster_id: ClusterId,
    #[serde(flatten)]
    pub request: DeploymentRequest,
}

/// Body for `POST /api/v1/deployments/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: DeploymentStatus,
}

/// GET /api/v1/deployments
pub async fn list_deployments(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
) -> impl IntoResponse {
    match state.scheduler.list_deployments_for_user(&user) {
        Ok(deployments) => ApiResponse::ok(deployments).into_response(),
        Err(e) => scheduler_error(e),
    }
}

/// POST /api/v1/deployments
pub async fn create_deployment(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ScheduleQuery>,
    Json(body): Json<CreateDeployment>,
) -> impl IntoResponse {
    match state
        .scheduler
        .handle_deployment(&body.request, query.strategy.as_deref(), body.cluster_id, &user)
        .await
    {
        Ok(deployment) => (StatusCode::CREATED, ApiResponse::ok(deployment)).into_response(),
        Err(e) => scheduler_error(e),
    }
}

/// GET /api/v1/deployments/{id}
pub async fn get_deployment(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<DeploymentId>,
) -> impl IntoResponse {
    match state.scheduler.get_deployment(id, &user) {
        Ok(deployment) => ApiResponse::ok(deployment).into_response(),
        Err(e) => scheduler_error(e),
    }
}

/// POST /api/v1/deployments/{id}/status
pub async fn transition_deployment(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<DeploymentId>,
    Json(update): Json<StatusUpdate>,
) -> impl IntoResponse {
    match state
        .scheduler
        .transition_deployment(id, update.status, &user)
        .await
    {
        Ok(deployment) => ApiResponse::ok(deployment).into_response(),
        Err(e) => scheduler_error(e),
    }
}
