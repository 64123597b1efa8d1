use std::{net::SocketAddr, time::Duration};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, Request, Response, StatusCode},
    middleware,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, field, info, info_span, warn, Level, Span};

use crate::{auth, error::AppError, expenses, state::AppState, users};

/// Builds the full router. Both the TCP listener and the function runtime
/// serve exactly this.
pub fn build_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    let protected = Router::new()
        .merge(expenses::router())
        .merge(users::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::gate::require_session,
        ));

    let public = Router::new()
        .merge(auth::router())
        .route("/health", get(health))
        .route("/ping", get(|| async { Json(json!({ "message": "pong" })) }));

    Router::new()
        .merge(public)
        .merge(protected)
        .with_state(state)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(log_response),
        )
}

/// Level a finished request is logged at.
fn response_level(status: StatusCode) -> Level {
    if status.is_server_error() {
        Level::ERROR
    } else if status.is_client_error() {
        Level::WARN
    } else {
        Level::INFO
    }
}

/// Per-request span keyed by method and path. The query string is left out
/// since it carries user ids and date filters.
fn request_span(req: &Request<Body>) -> Span {
    info_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
        status = field::Empty,
        latency_ms = field::Empty,
    )
}

fn log_response(res: &Response<Body>, latency: Duration, span: &Span) {
    let status = res.status();
    span.record("status", status.as_u16());
    span.record("latency_ms", latency.as_millis() as u64);
    match response_level(status) {
        Level::ERROR => error!(%status, "request failed"),
        Level::WARN => warn!(%status, "request rejected"),
        _ => info!(%status, "request served"),
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ])
        .expose_headers([header::CONTENT_LENGTH])
        .max_age(Duration::from_secs(12 * 60 * 60))
}

/// Storage connectivity probe.
async fn health(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    if let Err(e) = expenses::repo::ping(&state.db).await {
        error!(error = %e, "health check failed");
        return Err(AppError::internal("Database connection failed", e));
    }
    Ok(Json(json!({ "status": "Database connected" })))
}

pub async fn serve(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        auth::google::{IdentityError, IdentityVerifier, VerifiedIdentity},
        invocation::{self, FunctionUrlRequest, HttpDescription, RequestContext},
        test_support::{bearer_for, get_with, json_request, send, test_state},
    };

    #[test]
    fn rejected_requests_log_louder_than_served_ones() {
        assert_eq!(response_level(StatusCode::OK), Level::INFO);
        assert_eq!(response_level(StatusCode::UNAUTHORIZED), Level::WARN);
        assert_eq!(response_level(StatusCode::BAD_REQUEST), Level::WARN);
        assert_eq!(response_level(StatusCode::INTERNAL_SERVER_ERROR), Level::ERROR);
    }

    #[tokio::test]
    async fn ping_is_public() {
        let (status, body) = send(build_app(test_state()), get_with("/ping", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "pong");
    }

    #[tokio::test]
    async fn health_is_public_and_reports_storage_failure() {
        let (status, body) = send(build_app(test_state()), get_with("/health", None)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Database connection failed");
    }

    #[tokio::test]
    async fn protected_routes_need_a_session() {
        let app = build_app(test_state());
        for uri in ["/expenses?userId=1", "/expenses/summary?userId=1", "/users"] {
            let (status, _) = send(app.clone(), get_with(uri, None)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        }
        let (status, _) = send(
            app,
            json_request(Method::DELETE, "/expenses/1", Some("Bearer garbage"), json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found_rather_than_unauthorized() {
        let (status, _) = send(build_app(test_state()), get_with("/nowhere", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn oauth_route_is_public() {
        struct MissingClaims;
        #[async_trait::async_trait]
        impl IdentityVerifier for MissingClaims {
            async fn verify(&self, _c: &str) -> Result<VerifiedIdentity, IdentityError> {
                Err(IdentityError::MissingClaims)
            }
        }
        let state = AppState::fake_with_identity(std::sync::Arc::new(MissingClaims));
        let (status, body) = send(
            build_app(state),
            json_request(Method::POST, "/oauth/google", None, json!({"credential": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid ID token");
    }

    #[tokio::test]
    async fn function_invocation_runs_the_same_pipeline() {
        let state = test_state();
        let auth = bearer_for(&state, 1);
        let app = build_app(state);

        let base = FunctionUrlRequest {
            raw_path: "/expenses".into(),
            request_context: RequestContext {
                domain_name: "fn.example".into(),
                http: HttpDescription {
                    method: "POST".into(),
                },
            },
            body: Some(
                json!({"userId": 1, "amount": 0, "category": "food", "date": "2025-01-15"})
                    .to_string(),
            ),
            ..Default::default()
        };

        let unauthenticated = invocation::handle(app.clone(), base.clone()).await;
        assert_eq!(unauthenticated.status_code, 401);

        let mut authed = base;
        authed.headers.insert("authorization".into(), auth);
        authed
            .headers
            .insert("content-type".into(), "application/json".into());
        let rejected = invocation::handle(app, authed).await;
        assert_eq!(rejected.status_code, 400);
        let body: serde_json::Value = serde_json::from_str(&rejected.body).unwrap();
        assert_eq!(body["error"], "amount must be greater than 0");
    }

    #[tokio::test]
    async fn cors_preflight_is_answered() {
        let req = axum::http::Request::builder()
            .method(Method::OPTIONS)
            .uri("/expenses")
            .header(header::ORIGIN, "https://app.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(axum::body::Body::empty())
            .unwrap();
        let resp = tower::ServiceExt::oneshot(build_app(test_state()), req)
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }
}
