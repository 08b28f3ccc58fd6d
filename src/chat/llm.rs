use anyhow::Context;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{stream::BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

pub type TextStream = BoxStream<'static, anyhow::Result<String>>;

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Streams the assistant reply as text deltas.
    async fn stream(&self, messages: Vec<ChatMessage>) -> anyhow::Result<TextStream>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Extracts the text carried by one `data:` payload; `None` for `[DONE]`
/// and for chunks without content.
fn delta_text(data: &str) -> anyhow::Result<Option<String>> {
    if data.trim() == "[DONE]" {
        return Ok(None);
    }
    let chunk: StreamChunk = serde_json::from_str(data).context("parse completion chunk")?;
    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.content)
        .collect();
    Ok((!text.is_empty()).then_some(text))
}

pub struct OpenAiChat {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl OpenAiChat {
    pub fn new(api_key: Option<String>, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn stream(&self, messages: Vec<ChatMessage>) -> anyhow::Result<TextStream> {
        let key = self
            .api_key
            .as_deref()
            .context("OPENAI_API_KEY is not configured")?;
        let response = self
            .http
            .post(OPENAI_URL)
            .bearer_auth(key)
            .json(&CompletionRequest {
                model: &self.model,
                messages: &messages,
                stream: true,
            })
            .send()
            .await
            .context("completion request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("completion failed with {status}: {body}");
        }

        let stream = response
            .bytes_stream()
            .eventsource()
            .filter_map(|event| async move {
                match event {
                    Ok(ev) => delta_text(&ev.data).transpose(),
                    Err(e) => Some(Err(anyhow::anyhow!("completion stream: {e}"))),
                }
            })
            .boxed();
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_delta_content() {
        let data = r#"{"choices":[{"delta":{"content":"Bring "}}]}"#;
        assert_eq!(delta_text(data).unwrap().as_deref(), Some("Bring "));
    }

    #[test]
    fn done_and_empty_chunks_yield_nothing() {
        assert_eq!(delta_text("[DONE]").unwrap(), None);
        assert_eq!(delta_text(r#"{"choices":[{"delta":{}}]}"#).unwrap(), None);
        assert!(delta_text("{not json").is_err());
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::system("hi")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"hi"}"#);
    }
}
