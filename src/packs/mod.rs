mod dto;
pub mod handlers;
pub mod repo;
mod repo_types;

use crate::state::AppState;
use axum::Router;

pub use dto::{CreatePackRequest, PackResponse, PackSummary, UpdatePackRequest};
pub use repo_types::{Pack, PackCategory};

pub fn router() -> Router<AppState> {
    handlers::pack_routes()
}
