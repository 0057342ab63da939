//! Login and token refresh.

use axum::{Json, extract::State, extract::rejection::JsonRejection};
use pocketbook_access::{
    AuthenticationError, Principal, Session, SessionLookup, StoreError, TokenPair, User,
    normalize_email,
};
use pocketbook_core::DeviceId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::AppState;
use crate::error::ApiError;

/// Credentials posted to `/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub device_id: DeviceId,
}

/// Body posted to `/refresh`.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub device_id: DeviceId,
}

/// Response of a successful login or refresh.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub tokens: TokenPair,
    pub user: User,
}

/// Exchanges email and password for a token pair bound to a device.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = payload?;
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("email and password are required"));
    }
    if request.device_id.is_nil() {
        return Err(ApiError::bad_request("device_id is required"));
    }

    let email = normalize_email(&request.email);
    let user = match state.users.get_user_by_email(&email).await {
        Ok(user) => user,
        Err(report) if *report.current_context() == StoreError::NotFound => {
            debug!(%email, "login for unknown email");
            return Err(AuthenticationError::InvalidCredentials.into());
        }
        Err(report) => return Err(ApiError::from_store(report, "user")),
    };

    let hasher = state.hasher.clone();
    let hash = user.password_hash.clone();
    let password = request.password;
    let matches = tokio::task::spawn_blocking(move || hasher.verify(&hash, &password))
        .await
        .map_err(|e| ApiError::internal(format!("password check panicked: {e}")))?;
    if !matches {
        debug!(user_id = %user.id, "login with wrong password");
        return Err(AuthenticationError::InvalidCredentials.into());
    }

    info!(user_id = %user.id, device_id = %request.device_id, "user logged in");
    issue_session(&state, user, request.device_id).await
}

/// Exchanges a refresh token for a new pair, retiring the old one.
///
/// The token must verify and must also be the one currently stored for the
/// device; a token replaced by a later login or refresh is rejected.
#[instrument(skip_all)]
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = payload?;
    if request.refresh_token.is_empty() || request.device_id.is_nil() {
        return Err(ApiError::bad_request(
            "refresh_token and device_id are required",
        ));
    }

    let principal = state.codec.verify_refresh(&request.refresh_token)?;

    let lookup = SessionLookup {
        user_id: principal.user_id().clone(),
        device_id: request.device_id.clone(),
        refresh_token: request.refresh_token,
    };
    state
        .sessions
        .get_session(&lookup)
        .await
        .map_err(|report| session_error(report, &principal))?;

    let user = state
        .users
        .get_user(principal.user_id())
        .await
        .map_err(|report| session_error(report, &principal))?;

    debug!(user_id = %user.id, device_id = %request.device_id, "refreshing tokens");
    issue_session(&state, user, request.device_id).await
}

fn session_error(report: rootcause::Report<StoreError>, principal: &Principal) -> ApiError {
    if *report.current_context() == StoreError::NotFound {
        debug!(%principal, "no live session for refresh token");
        AuthenticationError::SessionNotFound.into()
    } else {
        ApiError::from_store(report, "session")
    }
}

/// Issues a pair for `user` and stores its refresh token for the device.
async fn issue_session(
    state: &AppState,
    user: User,
    device_id: DeviceId,
) -> Result<Json<TokenResponse>, ApiError> {
    let tokens = state.codec.issue(&Principal::new(user.id.clone()))?;
    let session = Session::for_tokens(user.id.clone(), device_id, &tokens);
    state
        .sessions
        .save_refresh_token(&session)
        .await
        .map_err(|report| ApiError::from_store(report, "session"))?;

    Ok(Json(TokenResponse { tokens, user }))
}
