use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

mod app;
mod auth;
mod config;
mod error;
mod expenses;
mod extract;
mod invocation;
mod runtime;
mod state;
mod users;

#[cfg(test)]
mod test_support;

const DEFAULT_LOG_FILTER: &str = "expense_tracker=debug,axum=info,tower_http=info";

/// `RUST_LOG` picks the filter; `LOG_FORMAT=json` switches to one JSON object
/// per line for log shipping from the function platform.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json_logs {
        builder
            .json()
            .with_current_span(true)
            .flatten_event(true)
            .with_target(false)
            .init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    let runtime_api = std::env::var("AWS_LAMBDA_RUNTIME_API")
        .ok()
        .filter(|api| !api.is_empty());

    let app_state = match state::AppState::init().await {
        Ok(state) => state,
        Err(e) => {
            if let Some(api) = &runtime_api {
                if let Err(report) = runtime::report_init_error(api, &e).await {
                    tracing::error!(error = %report, "could not report init failure");
                }
            }
            return Err(e);
        }
    };

    if let Err(e) = sqlx::migrate!("./migrations").run(&app_state.db).await {
        tracing::warn!(error = %e, "migration failed; continuing");
    }

    let addr: SocketAddr =
        format!("{}:{}", app_state.config.host, app_state.config.port).parse()?;
    let app = app::build_app(app_state);

    match runtime_api {
        Some(api) => runtime::run(&api, app).await,
        None => app::serve(app, addr).await,
    }
}
