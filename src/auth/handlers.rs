use axum::{
    extract::{FromRef, State},
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{GoogleOauthRequest, OauthResponse},
        session::SessionKeys,
    },
    error::AppError,
    extract::ApiJson,
    state::AppState,
    users::{handlers::normalize_email, repo as users_repo},
};

pub fn oauth_routes() -> Router<AppState> {
    Router::new().route("/oauth/google", post(google_oauth))
}

/// Exchanges a Google ID token for a session token, creating or refreshing
/// the user record on the way.
#[instrument(skip(state, payload))]
pub async fn google_oauth(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<GoogleOauthRequest>,
) -> Result<Json<OauthResponse>, AppError> {
    let credential = payload
        .credential
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::validation("Missing credential"))?;

    let identity = match state.identity.verify(&credential).await {
        Ok(identity) => identity,
        Err(e) => {
            warn!(error = %e, "identity verification failed");
            return Err(AppError::Unauthorized("Invalid ID token"));
        }
    };

    let email = normalize_email(&identity.email);
    let user_id = users_repo::upsert(&state.db, &identity.subject, &email, &identity.name)
        .await
        .map_err(|e| AppError::internal("Failed to insert or update user", e))?;

    let token = SessionKeys::from_ref(&state)
        .issue(user_id, &email)
        .map_err(|e| AppError::internal("Failed to issue session token", e))?;

    info!(user_id, "user signed in with google");
    Ok(Json(OauthResponse { user_id, token }))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use super::*;
    use crate::test_support::{json_request, send, test_state};

    #[tokio::test]
    async fn missing_credential_is_bad_request() {
        let app = oauth_routes().with_state(test_state());
        let (status, body) =
            send(app, json_request(Method::POST, "/oauth/google", None, json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing credential");
    }

    #[tokio::test]
    async fn rejected_credential_is_unauthorized_with_generic_message() {
        let app = oauth_routes().with_state(test_state());
        let (status, body) = send(
            app,
            json_request(Method::POST, "/oauth/google", None, json!({"credential": "forged"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid ID token");
    }

    #[test]
    fn oauth_response_uses_camel_case() {
        let json = serde_json::to_value(OauthResponse {
            user_id: 9,
            token: "t".into(),
        })
        .unwrap();
        assert_eq!(json, json!({"userId": 9, "token": "t"}));
    }
}
