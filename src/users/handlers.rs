use axum::{
    extract::State,
    routing::put,
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use super::{
    dto::{UserList, UserUpdateRequest},
    repo,
};
use crate::{auth::gate::AuthUser, error::AppError, extract::ApiJson, state::AppState};

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/users", put(update_user).get(list_users))
}

/// Canonical form of an email address as stored in `users.email`.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

#[instrument(skip(state, auth, payload), fields(caller = auth.user_id))]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    ApiJson(mut payload): ApiJson<UserUpdateRequest>,
) -> Result<Json<Value>, AppError> {
    payload.email = normalize_email(&payload.email);

    if payload.id.trim().is_empty() {
        return Err(AppError::validation("Invalid input: id is required"));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::validation("Invalid input: email"));
    }

    let updated = repo::update_by_subject(&state.db, &payload.id, &payload.email, &payload.name)
        .await
        .map_err(|e| AppError::internal("Failed to update user", e))?;
    if !updated {
        return Err(AppError::NotFound("User not found"));
    }

    info!(subject = %payload.id, "user updated");
    Ok(Json(json!({ "message": "User updated successfully" })))
}

#[instrument(skip(state, _auth))]
pub async fn list_users(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<UserList>, AppError> {
    let users = repo::list_all(&state.db)
        .await
        .map_err(|e| AppError::internal("Failed to fetch users", e))?;
    Ok(Json(UserList { users }))
}
