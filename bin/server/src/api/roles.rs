//! Role administration. Every handler here is admin-only.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use pocketbook_access::{Role, RoleLoader, UnknownRole};
use pocketbook_core::UserId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{Created, Deleted};
use crate::auth::{AppState, CurrentPrincipal};
use crate::error::ApiError;

/// Wire form of one grant, `{"role": "admin"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRole {
    #[serde(default)]
    pub role: String,
}

impl UserRole {
    fn parse(&self) -> Result<Role, ApiError> {
        self.role
            .parse()
            .map_err(|e: UnknownRole| ApiError::bad_request(e.to_string()))
    }
}

/// `POST /users/{userID}/roles`
#[instrument(skip_all, fields(%user_id, %principal))]
pub async fn grant_role(
    State(state): State<Arc<AppState>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(user_id): Path<UserId>,
    payload: Result<Json<UserRole>, JsonRejection>,
) -> Result<(StatusCode, Json<Created>), ApiError> {
    let Json(request) = payload?;
    let role = request.parse()?;

    state
        .users
        .get_user(&user_id)
        .await
        .map_err(|report| ApiError::from_store(report, "user"))?;
    state
        .roles
        .grant_role(&user_id, role)
        .await
        .map_err(|report| ApiError::from_store(report, "role"))?;
    state.role_cache().invalidate(&user_id);

    info!(%user_id, %role, "role granted");
    Ok((StatusCode::CREATED, Json(Created { created: true })))
}

/// `DELETE /users/{userID}/roles`
#[instrument(skip_all, fields(%user_id, %principal))]
pub async fn revoke_role(
    State(state): State<Arc<AppState>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(user_id): Path<UserId>,
    payload: Result<Json<UserRole>, JsonRejection>,
) -> Result<Json<Deleted>, ApiError> {
    let Json(request) = payload?;
    let role = request.parse()?;

    state
        .roles
        .revoke_role(&user_id, role)
        .await
        .map_err(|report| ApiError::from_store(report, "role"))?;
    state.role_cache().invalidate(&user_id);

    info!(%user_id, %role, "role revoked");
    Ok(Json(Deleted { deleted: true }))
}

/// `GET /users/{userID}/roles`
///
/// Reads the store directly so the answer reflects grants made moments ago.
pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<Vec<UserRole>>, ApiError> {
    let roles = state
        .roles
        .load_roles(&user_id)
        .await
        .map_err(|report| ApiError::from_store(report, "role"))?;

    Ok(Json(
        roles
            .roles()
            .iter()
            .map(|role| UserRole {
                role: role.as_str().to_string(),
            })
            .collect(),
    ))
}
