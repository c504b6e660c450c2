//! capgrid-api — REST API for capgrid.
//!
//! Thin axum layer over `capgrid-scheduler`. Every `/api/v1` route
//! except user registration acts on behalf of the user named in the
//! `x-capgrid-user` header.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/v1/users` | Register a user |
//! | POST | `/api/v1/organizations` | Create an organization |
//! | POST | `/api/v1/organizations/{invite_code}/join` | Join an organization |
//! | GET | `/api/v1/clusters` | List the caller's clusters |
//! | POST | `/api/v1/clusters` | Create a cluster |
//! | GET | `/api/v1/clusters/{id}` | Get a cluster |
//! | DELETE | `/api/v1/clusters/{id}` | Delete an idle cluster |
//! | GET | `/api/v1/deployments` | List the caller's deployments |
//! | POST | `/api/v1/deployments` | Schedule a deployment (`?strategy=`) |
//! | GET | `/api/v1/deployments/{id}` | Get a deployment |
//! | POST | `/api/v1/deployments/{id}/status` | Transition a deployment |
//! | GET | `/healthz` | Liveness |

pub mod handlers;
pub mod identity;
pub mod tenancy_handlers;

use axum::Router;
use axum::routing::{get, post};
use capgrid_scheduler::{DeploymentScheduler, Tenancy};

pub use identity::{CurrentUser, USER_HEADER};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub scheduler: DeploymentScheduler,
    pub tenancy: Tenancy,
}

impl ApiState {
    pub fn new(scheduler: DeploymentScheduler) -> Self {
        let tenancy = scheduler.tenancy();
        Self { scheduler, tenancy }
    }
}

/// Build the complete API router.
pub fn build_router(scheduler: DeploymentScheduler) -> Router {
    let api_state = ApiState::new(scheduler);

    let api_routes = Router::new()
        .route("/users", post(tenancy_handlers::register_user))
        .route("/organizations", post(tenancy_handlers::create_organization))
        .route(
            "/organizations/{invite_code}/join",
            post(tenancy_handlers::join_organization),
        )
        .route(
            "/clusters",
            get(tenancy_handlers::list_clusters).post(tenancy_handlers::create_cluster),
        )
        .route(
            "/clusters/{id}",
            get(tenancy_handlers::get_cluster).delete(tenancy_handlers::delete_cluster),
        )
        .route(
            "/deployments",
            get(handlers::list_deployments).post(handlers::create_deployment),
        )
        .route("/deployments/{id}", get(handlers::get_deployment))
        .route("/deployments/{id}/status", post(handlers::transition_deployment))
        .with_state(api_state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}
