//! Resolving the requesting user.
//!
//! There are no sessions: callers name themselves with the
//! [`USER_HEADER`] header carrying their numeric user id.

use axum::extract::FromRequestParts;
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use capgrid_scheduler::SchedulerError;
use capgrid_state::User;
use tracing::debug;

use crate::ApiState;
use crate::handlers::{error_response, scheduler_error};

pub const USER_HEADER: &str = "x-capgrid-user";

/// The user a request acts for.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<ApiState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &ApiState) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(USER_HEADER) else {
            return Err(unauthorized(&format!("missing {USER_HEADER} header")));
        };
        let Some(id) = raw.to_str().ok().and_then(|v| v.trim().parse::<u64>().ok()) else {
            return Err(unauthorized(&format!("malformed {USER_HEADER} header")));
        };

        match state.tenancy.get_user(id) {
            Ok(user) => Ok(CurrentUser(user)),
            Err(SchedulerError::NotFound(_)) => {
                debug!(user = id, "request names unknown user");
                Err(unauthorized("unknown user"))
            }
            Err(e) => Err(scheduler_error(e)),
        }
    }
}

fn unauthorized(msg: &str) -> Response {
    error_response(msg, StatusCode::UNAUTHORIZED).into_response()
}
