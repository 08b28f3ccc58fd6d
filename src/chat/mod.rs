pub mod handlers;
mod llm;
mod prompt;

use crate::state::AppState;
use axum::Router;

pub use llm::{ChatMessage, ChatModel, OpenAiChat, Role, TextStream};
pub use prompt::{build_system_prompt, PromptContext};

pub fn router() -> Router<AppState> {
    handlers::chat_routes()
}
