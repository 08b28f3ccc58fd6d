mod dto;
pub mod handlers;
pub mod repo;
mod repo_types;

use crate::state::AppState;
use axum::Router;

pub use dto::{ChangesQuery, CreateItemRequest, UpdateItemRequest};
pub use repo_types::PackItem;

pub fn router() -> Router<AppState> {
    handlers::item_routes()
}
