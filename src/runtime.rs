//! Function runtime loop (Lambda runtime API).
//!
//! Used instead of the TCP listener when `AWS_LAMBDA_RUNTIME_API` is set.
//! Invocations are handled one at a time; the router and its database pool
//! live for the whole process.

use std::time::Duration;

use anyhow::Context;
use axum::Router;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{error, info, info_span, warn, Instrument};

use crate::invocation::{self, FunctionUrlRequest};

const RUNTIME_API_VERSION: &str = "2018-06-01";
const REQUEST_ID_HEADER: &str = "lambda-runtime-aws-request-id";
const DEADLINE_HEADER: &str = "lambda-runtime-deadline-ms";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RuntimeError {
    error_message: String,
    error_type: &'static str,
}

fn runtime_base(api: &str) -> String {
    format!("http://{api}/{RUNTIME_API_VERSION}/runtime")
}

/// Time left before the platform deadline (epoch milliseconds). `None` when
/// the header is absent or unreadable; an already passed deadline is zero.
fn time_left(deadline_ms: Option<&str>, now: OffsetDateTime) -> Option<Duration> {
    let deadline = deadline_ms?.trim().parse::<i128>().ok()?;
    let now_ms = now.unix_timestamp_nanos() / 1_000_000;
    let left = u64::try_from((deadline - now_ms).max(0)).ok()?;
    Some(Duration::from_millis(left))
}

/// Tells the platform that startup failed, so the failure shows up as an
/// init error instead of a silent exit.
pub async fn report_init_error(api: &str, err: &anyhow::Error) -> anyhow::Result<()> {
    reqwest::Client::new()
        .post(format!("{}/init/error", runtime_base(api)))
        .json(&RuntimeError {
            error_message: format!("{err:#}"),
            error_type: "InitError",
        })
        .send()
        .await
        .context("post init error")?
        .error_for_status()
        .context("init error rejected")?;
    Ok(())
}

async fn post_outcome<T: Serialize>(client: &reqwest::Client, url: String, body: &T) {
    let sent = client
        .post(url)
        .json(body)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status);
    if let Err(e) = sent {
        warn!(error = %e, "runtime API refused invocation outcome; continuing");
    }
}

pub async fn run(api: &str, app: Router) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let base = runtime_base(api);
    info!(%api, "function runtime started");

    loop {
        let next = client
            .get(format!("{base}/invocation/next"))
            .send()
            .await
            .context("fetch next invocation")?;
        let request_id = next
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .context("invocation without request id")?;
        let deadline = time_left(
            next.headers()
                .get(DEADLINE_HEADER)
                .and_then(|v| v.to_str().ok()),
            OffsetDateTime::now_utc(),
        );
        let payload = next.bytes().await.context("read invocation payload")?;

        let span = info_span!("invocation", %request_id);
        let event = match serde_json::from_slice::<FunctionUrlRequest>(&payload) {
            Ok(event) => event,
            Err(e) => {
                error!(parent: &span, error = %e, "undecodable invocation event");
                let body = RuntimeError {
                    error_message: e.to_string(),
                    error_type: "InvalidEvent",
                };
                post_outcome(&client, format!("{base}/invocation/{request_id}/error"), &body)
                    .await;
                continue;
            }
        };

        let handled = invocation::handle(app.clone(), event).instrument(span.clone());
        let outcome = match deadline {
            Some(left) => tokio::time::timeout(left, handled).await.ok(),
            None => Some(handled.await),
        };
        match outcome {
            Some(response) => {
                post_outcome(
                    &client,
                    format!("{base}/invocation/{request_id}/response"),
                    &response,
                )
                .await;
            }
            None => {
                error!(parent: &span, "invocation exceeded its deadline");
                let body = RuntimeError {
                    error_message: "invocation exceeded its deadline".into(),
                    error_type: "Timeout",
                };
                post_outcome(&client, format!("{base}/invocation/{request_id}/error"), &body)
                    .await;
            }
        }
    }
}
