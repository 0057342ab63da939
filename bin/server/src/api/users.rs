//! User account handlers.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use pocketbook_access::{User, normalize_email};
use pocketbook_core::UserId;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

use super::Deleted;
use crate::auth::{AppState, CurrentPrincipal};
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub password: Option<String>,
}

/// `POST /users`
#[instrument(skip_all)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(request) = payload?;
    let email = normalize_email(&request.email);
    if email.is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("email and password are required"));
    }

    let password_hash = hash_password(&state, request.password).await?;
    let user = User::new(email, password_hash);
    state
        .users
        .create_user(&user)
        .await
        .map_err(|report| ApiError::from_store(report, "user"))?;

    info!(user_id = %user.id, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /users`
pub async fn list_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = state
        .users
        .list_users()
        .await
        .map_err(|report| ApiError::from_store(report, "user"))?;
    Ok(Json(users))
}

/// `GET /users/{userID}`
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .users
        .get_user(&user_id)
        .await
        .map_err(|report| ApiError::from_store(report, "user"))?;
    Ok(Json(user))
}

/// `PATCH /users/{userID}`: changes the password when one is given.
#[instrument(skip_all, fields(%user_id, %principal))]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(user_id): Path<UserId>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let Json(request) = payload?;

    if let Some(password) = request.password.filter(|p| !p.is_empty()) {
        let password_hash = hash_password(&state, password).await?;
        state
            .users
            .update_password(&user_id, &password_hash)
            .await
            .map_err(|report| ApiError::from_store(report, "user"))?;
        info!(%user_id, "password changed");
    }

    get_user(State(state), Path(user_id)).await
}

/// `DELETE /users/{userID}`
#[instrument(skip_all, fields(%user_id, %principal))]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(user_id): Path<UserId>,
) -> Result<Json<Deleted>, ApiError> {
    let deleted = state
        .users
        .delete_user(&user_id)
        .await
        .map_err(|report| ApiError::from_store(report, "user"))?;
    state.role_cache().invalidate(&user_id);

    info!(%user_id, deleted, "user deleted");
    Ok(Json(Deleted { deleted }))
}

async fn hash_password(state: &AppState, password: String) -> Result<String, ApiError> {
    let hasher = state.hasher.clone();
    let hashed = tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| ApiError::internal(format!("password hashing panicked: {e}")))?;
    Ok(hashed?)
}
