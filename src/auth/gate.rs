use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::session::SessionKeys;
use crate::{error::AppError, state::AppState};

const MALFORMED_HEADER: &str = "Authorization header missing or malformed";
const INVALID_TOKEN: &str = "Invalid token";

/// Identity of the session owner, placed in request extensions by
/// [`require_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
}

/// Middleware guarding protected routes. Rejects with 401 before the inner
/// handler runs unless the request carries a valid `Bearer` session token.
pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let keys = SessionKeys::from_ref(&state);
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized(MALFORMED_HEADER))?;

    let claims = keys.verify(token).map_err(|e| {
        warn!(reason = %e, "session token rejected");
        AppError::Unauthorized(INVALID_TOKEN)
    })?;

    req.extensions_mut().insert(AuthUser {
        user_id: claims.user_id,
        email: claims.email,
    });
    Ok(next.run(req).await)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::Unauthorized(MALFORMED_HEADER))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use axum::{http::StatusCode, middleware, routing::get, Json, Router};
    use time::{Duration, OffsetDateTime};

    use super::*;
    use crate::test_support::{get_with, send, test_state};

    fn probed_app(state: AppState, hit: Arc<AtomicBool>) -> Router {
        Router::new()
            .route(
                "/probe",
                get(move |user: AuthUser| {
                    let hit = hit.clone();
                    async move {
                        hit.store(true, Ordering::SeqCst);
                        Json(serde_json::json!({ "user_id": user.user_id, "email": user.email }))
                    }
                }),
            )
            .route_layer(middleware::from_fn_with_state(state.clone(), require_session))
            .with_state(state)
    }

    #[tokio::test]
    async fn missing_header_is_rejected_before_handler() {
        let hit = Arc::new(AtomicBool::new(false));
        let app = probed_app(test_state(), hit.clone());

        let (status, body) = send(app, get_with("/probe", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], MALFORMED_HEADER);
        assert!(!hit.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn wrong_scheme_is_rejected_before_handler() {
        let hit = Arc::new(AtomicBool::new(false));
        let app = probed_app(test_state(), hit.clone());

        let (status, body) = send(app, get_with("/probe", Some("Basic dXNlcjpwYXNz"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], MALFORMED_HEADER);
        assert!(!hit.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn garbage_bearer_is_rejected_before_handler() {
        let hit = Arc::new(AtomicBool::new(false));
        let app = probed_app(test_state(), hit.clone());

        let (status, body) = send(app, get_with("/probe", Some("Bearer garbage"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], INVALID_TOKEN);
        assert!(!hit.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn expired_token_is_rejected_before_handler() {
        let state = test_state();
        let keys = SessionKeys::from_ref(&state);
        let token = keys
            .issue_at(3, "old@example.com", OffsetDateTime::now_utc() - Duration::hours(3))
            .unwrap();
        let hit = Arc::new(AtomicBool::new(false));
        let app = probed_app(state, hit.clone());

        let auth = format!("Bearer {token}");
        let (status, body) = send(app, get_with("/probe", Some(&auth))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], INVALID_TOKEN);
        assert!(!hit.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn valid_token_binds_identity_for_handler() {
        let state = test_state();
        let token = SessionKeys::from_ref(&state)
            .issue(11, "dee@example.com")
            .unwrap();
        let hit = Arc::new(AtomicBool::new(false));
        let app = probed_app(state, hit.clone());

        let auth = format!("Bearer {token}");
        let (status, body) = send(app, get_with("/probe", Some(&auth))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], 11);
        assert_eq!(body["email"], "dee@example.com");
        assert!(hit.load(Ordering::SeqCst));
    }
}
