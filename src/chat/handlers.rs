use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Router,
};
use futures::{stream, Stream, StreamExt};
use serde::Deserialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{
    llm::{ChatMessage, Role},
    prompt::{build_system_prompt, PromptContext},
};
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    extract::AppJson,
    items, packs,
    state::AppState,
};

const MAX_MESSAGES: usize = 50;

pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/chat", post(chat))
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChatLocation {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub pack_id: Option<Uuid>,
    pub item_id: Option<Uuid>,
    pub location: Option<ChatLocation>,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.messages.is_empty() {
            return Err(ApiError::bad_request("messages must not be empty"));
        }
        if self.messages.len() > MAX_MESSAGES {
            return Err(ApiError::bad_request("Too many messages"));
        }
        if self.messages.iter().any(|m| m.role == Role::System) {
            return Err(ApiError::bad_request("System messages are not allowed"));
        }
        if self.messages.last().map(|m| m.role) != Some(Role::User) {
            return Err(ApiError::bad_request("The last message must come from the user"));
        }
        Ok(())
    }
}

#[instrument(skip(state, body), fields(messages = body.messages.len()))]
pub async fn chat(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    AppJson(body): AppJson<ChatRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    body.validate()?;

    let pack = match body.pack_id {
        Some(id) => {
            let pack = packs::repo::get_visible(&state.db, user_id, id)
                .await?
                .ok_or_else(|| ApiError::not_found("Pack not found"))?;
            let items = items::repo::list_by_pack(&state.db, pack.id).await?;
            Some((pack, items))
        }
        None => None,
    };
    let item = match body.item_id {
        Some(id) => Some(
            items::repo::get(&state.db, user_id, id)
                .await?
                .ok_or_else(|| ApiError::not_found("Item not found"))?,
        ),
        None => None,
    };
    // Weather is context, not a requirement.
    let weather = match body.location {
        Some(loc) => match state.weather.forecast(loc.lat, loc.lon, 3).await {
            Ok(f) => Some(f.summary()),
            Err(e) => {
                warn!(error = %e, "weather context unavailable");
                None
            }
        },
        None => None,
    };

    let system = build_system_prompt(&PromptContext {
        pack: pack.as_ref().map(|(p, i)| (p, i.as_slice())),
        item: item.as_ref(),
        weather,
    });
    let mut messages = Vec::with_capacity(body.messages.len() + 1);
    messages.push(ChatMessage::system(system));
    messages.extend(body.messages);

    let deltas = state.llm.stream(messages).await.map_err(|e| {
        error!(error = ?e, "chat model unavailable");
        ApiError::Upstream("Assistant unavailable".into())
    })?;
    info!(%user_id, "chat stream started");

    let events = deltas
        .map(|chunk| {
            Ok(match chunk {
                Ok(text) => Event::default().data(text),
                Err(e) => {
                    error!(error = %e, "chat stream failed");
                    Event::default().event("error").data("stream interrupted")
                }
            })
        })
        .chain(stream::once(async {
            Ok(Event::default().event("done").data(""))
        }));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
