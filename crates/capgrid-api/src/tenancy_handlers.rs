//! REST API handlers for users, organizations and clusters.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use capgrid_scheduler::ClusterRequest;
use capgrid_state::ClusterId;
use serde::Deserialize;

use crate::ApiState;
use crate::handlers::{ApiResponse, scheduler_error};
use crate::identity::CurrentUser;

/// Body for `POST /api/v1/users`.
#[derive(Debug, Deserialize)]
pub struct RegisterUser {
    pub username: String,
    pub email: String,
}

/// Body for `POST /api/v1/organizations`.
#[derive(Debug, Deserialize)]
pub struct CreateOrganization {
    pub name: String,
}

// ── Users ──────────────────────────────────────────────────────

/// POST /api/v1/users
pub async fn register_user(
    State(state): State<ApiState>,
    Json(body): Json<RegisterUser>,
) -> impl IntoResponse {
    match state.tenancy.register_user(&body.username, &body.email) {
        Ok(user) => (StatusCode::CREATED, ApiResponse::ok(user)).into_response(),
        Err(e) => scheduler_error(e),
    }
}

// ── Organizations ──────────────────────────────────────────────

/// POST /api/v1/organizations
pub async fn create_organization(
    State(state): State<ApiState>,
    CurrentUser(_user): CurrentUser,
    Json(body): Json<CreateOrganization>,
) -> impl IntoResponse {
    match state.tenancy.create_organization(&body.name) {
        Ok(org) => (StatusCode::CREATED, ApiResponse::ok(org)).into_response(),
        Err(e) => scheduler_error(e),
    }
}

/// POST /api/v1/organizations/{invite_code}/join
pub async fn join_organization(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
    Path(invite_code): Path<String>,
) -> impl IntoResponse {
    match state.tenancy.join_organization(&invite_code, &user) {
        Ok(org) => ApiResponse::ok(org).into_response(),
        Err(e) => scheduler_error(e),
    }
}

// ── Clusters ───────────────────────────────────────────────────

/// GET /api/v1/clusters
pub async fn list_clusters(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
) -> impl IntoResponse {
    match state.tenancy.list_clusters(&user) {
        Ok(clusters) => ApiResponse::ok(clusters).into_response(),
        Err(e) => scheduler_error(e),
    }
}

/// POST /api/v1/clusters
pub async fn create_cluster(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ClusterRequest>,
) -> impl IntoResponse {
    match state.tenancy.create_cluster(&body, &user) {
        Ok(cluster) => (StatusCode::CREATED, ApiResponse::ok(cluster)).into_response(),
        Err(e) => scheduler_error(e),
    }
}

/// GET /api/v1/clusters/{id}
pub async fn get_cluster(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ClusterId>,
) -> impl IntoResponse {
    match state.tenancy.get_cluster(id, &user) {
        Ok(cluster) => ApiResponse::ok(cluster).into_response(),
        Err(e) => scheduler_error(e),
    }
}

/// DELETE /api/v1/clusters/{id}
pub async fn delete_cluster(
    State(state): State<ApiState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<ClusterId>,
) -> impl IntoResponse {
    match state.tenancy.delete_cluster(id, &user).await {
        Ok(()) => ApiResponse::ok("deleted").into_response(),
        Err(e) => scheduler_error(e),
    }
}
