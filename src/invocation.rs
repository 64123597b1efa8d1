//! Adapter between function URL events and the axum router.
//!
//! The same [`Router`] served by the long-running listener is driven here
//! one request at a time, so handlers never know which deployment runs
//! them.

use std::collections::HashMap;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower::ServiceExt;
use tracing::{debug, warn};

/// Function URL request payload (version 2.0 event format).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionUrlRequest {
    #[serde(default)]
    pub raw_path: String,
    #[serde(default)]
    pub raw_query_string: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
    #[serde(default)]
    pub request_context: RequestContext,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default)]
    pub domain_name: String,
    #[serde(default)]
    pub http: HttpDescription,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HttpDescription {
    #[serde(default)]
    pub method: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FunctionUrlResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub is_base64_encoded: bool,
}

#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("request body is not valid base64")]
    InvalidBody(#[from] base64::DecodeError),
    #[error("cannot build request: {0}")]
    InvalidRequest(#[from] axum::http::Error),
    #[error("cannot read response body: {0}")]
    ResponseBody(#[from] axum::Error),
}

impl FunctionUrlRequest {
    /// Absolute URL of the request. `x-forwarded-proto` and `host` headers
    /// win over the platform defaults.
    pub fn url(&self) -> String {
        let scheme = self
            .headers
            .get("x-forwarded-proto")
            .map(String::as_str)
            .unwrap_or("https");
        let host = self
            .headers
            .get("host")
            .map(String::as_str)
            .unwrap_or(&self.request_context.domain_name);
        let path = if self.raw_path.is_empty() {
            "/"
        } else {
            self.raw_path.as_str()
        };
        if self.raw_query_string.is_empty() {
            format!("{scheme}://{host}{path}")
        } else {
            format!("{scheme}://{host}{path}?{}", self.raw_query_string)
        }
    }

    fn decoded_body(&self) -> Result<Vec<u8>, InvocationError> {
        match &self.body {
            None => Ok(Vec::new()),
            Some(body) if self.is_base64_encoded => Ok(STANDARD.decode(body)?),
            Some(body) => Ok(body.clone().into_bytes()),
        }
    }

    pub fn into_http(self) -> Result<Request<Body>, InvocationError> {
        let body = self.decoded_body()?;
        let method = if self.request_context.http.method.is_empty() {
            "GET"
        } else {
            self.request_context.http.method.as_str()
        };
        let mut req = Request::builder()
            .method(method)
            .uri(self.url())
            .body(Body::from(body))?;

        let headers = req.headers_mut();
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "dropping invalid inbound header"),
            }
        }
        Ok(req)
    }
}

impl FunctionUrlResponse {
    fn error(status: StatusCode, message: &str) -> Self {
        Self {
            status_code: status.as_u16(),
            headers: HashMap::from([("content-type".to_string(), "application/json".to_string())]),
            body: serde_json::json!({ "error": message }).to_string(),
            is_base64_encoded: false,
        }
    }
}

/// Runs one event through `app` and captures status, headers (first value
/// per name) and body.
pub async fn dispatch(
    app: Router,
    event: FunctionUrlRequest,
) -> Result<FunctionUrlResponse, InvocationError> {
    let req = event.into_http()?;
    debug!(method = %req.method(), uri = %req.uri(), "dispatching invocation");

    let resp = match app.oneshot(req).await {
        Ok(resp) => resp,
        Err(never) => match never {},
    };

    let status_code = resp.status().as_u16();
    let mut headers = HashMap::new();
    for name in resp.headers().keys() {
        if let Some(value) = resp.headers().get(name).and_then(|v| v.to_str().ok()) {
            headers.insert(name.as_str().to_string(), value.to_string());
        }
    }
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;

    Ok(FunctionUrlResponse {
        status_code,
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
        is_base64_encoded: false,
    })
}

/// Like [`dispatch`], but folds adapter failures into an error envelope.
pub async fn handle(app: Router, event: FunctionUrlRequest) -> FunctionUrlResponse {
    match dispatch(app, event).await {
        Ok(resp) => resp,
        Err(e @ InvocationError::ResponseBody(_)) => {
            warn!(error = %e, "invocation failed");
            FunctionUrlResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
        Err(e) => {
            warn!(error = %e, "rejecting invocation");
            FunctionUrlResponse::error(StatusCode::BAD_REQUEST, &e.to_string())
        }
    }
}
