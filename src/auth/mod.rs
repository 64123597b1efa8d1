use crate::state::AppState;
use axum::Router;

mod dto;
pub mod gate;
pub mod google;
pub mod handlers;
pub mod session;

pub fn router() -> Router<AppState> {
    handlers::oauth_routes()
}
