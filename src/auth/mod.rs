use crate::state::AppState;
use axum::Router;

mod claims;
mod dto;
mod error;
pub(crate) mod extractors;
pub mod handlers;
mod jwt;
mod password;
pub mod repo;
pub mod repo_types;
pub mod services;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
