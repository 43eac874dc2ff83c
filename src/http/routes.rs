//! Axum router and handlers for the accept-invite service.
//!
//! `build_router` is the single entry point; `main.rs` attaches the tracing
//! layer so tests can drive the bare router with `oneshot`.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::invites::{InviteError, InviteService};

/// Shared state for all handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub invites: InviteService,
    /// Base URL of the web app that accepted invites redirect into
    pub app_url: String,
}

impl AppState {
    pub fn new(invites: InviteService, app_url: impl Into<String>) -> Self {
        Self {
            invites,
            app_url: app_url.into(),
        }
    }

    pub fn contract_url(&self, contract_id: &str) -> String {
        format!("{}/contracts/{}", self.app_url.trim_end_matches('/'), contract_id)
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct AcceptInviteQuery {
    pub id: Option<String>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/acceptInvite", get(accept_invite))
        .with_state(state)
}

pub(crate) async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// GET /acceptInvite?id=<inviteId>
///
/// 302 to the contract page on success; 400 for a missing id or an invite that
/// was already accepted; 404 for an unknown invite or contract; 500 otherwise.
pub(crate) async fn accept_invite(
    State(st): State<Arc<AppState>>,
    Query(query): Query<AcceptInviteQuery>,
) -> Response {
    let Some(invite_id) = query.id.filter(|id| !id.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing invite id");
    };

    match st.invites.accept_invite(invite_id.trim()).await {
        Ok(invite) => {
            let location = st.contract_url(&invite.contract_id);
            info!(invite_id = %invite.id, location = %location, "Redirecting accepted invite");
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
        Err(e @ InviteError::AlreadyAccepted(_)) => {
            warn!(error = %e, "Invite accept refused");
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e @ (InviteError::InviteNotFound(_) | InviteError::ContractNotFound(_))) => {
            warn!(error = %e, "Invite accept refused");
            error_response(StatusCode::NOT_FOUND, e.to_string())
        }
        Err(e) => {
            error!(error = %e, "Invite accept failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}
