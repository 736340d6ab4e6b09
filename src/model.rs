//! Upstream model invoker.
//!
//! The production implementation talks to the Workers AI REST endpoint over
//! HTTP. The trait exists so the synthesizer and the stream tests can run
//! against scripted doubles; nothing else in the crate knows what sits behind
//! `run`.
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::Config;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: String) -> Self {
        Self {
            role: ChatRole::System,
            content,
        }
    }
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned status {0}")]
    Status(StatusCode),

    #[error("no usable completion in upstream response")]
    EmptyCompletion,
}

pub type FragmentStream =
    std::pin::Pin<Box<dyn Stream<Item = Result<String, ModelError>> + Send>>;

#[async_trait]
pub trait ModelInvoker: Send + Sync {
    fn model_id(&self) -> &str;

    /// Live streaming run. May fail outright or be unsupported by the
    /// upstream; callers fall back to [`ModelInvoker::complete`].
    async fn stream(&self, messages: &[ChatMessage]) -> Result<FragmentStream, ModelError>;

    /// One-shot completion for the fallback path.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError>;
}

/// Maps the union of known upstream chunk shapes to a single fragment type.
///
/// Recognized shapes: bare string, `{"response": "text"}`, the byte-map
/// variant `{"response": {"0": 72, "1": 105}}` some runtimes emit, wrapped
/// `{"result": {"response": "text"}}`, and OpenAI-style
/// `choices[0].delta.content`. Anything else is "no fragment", never an
/// error.
pub fn fragment_from_value(value: &Value) -> Option<String> {
    if let Some(text) = value.as_str() {
        return Some(text.to_string());
    }

    match value.get("response") {
        Some(Value::String(text)) => return Some(text.clone()),
        Some(Value::Object(map)) => {
            let mut bytes = Vec::with_capacity(map.len());
            for index in 0..map.len() {
                let value = map.get(&index.to_string())?.as_u64()?;
                bytes.push(u8::try_from(value).ok()?);
            }
            return String::from_utf8(bytes).ok();
        }
        _ => {}
    }

    if let Some(text) = value
        .get("result")
        .and_then(|result| result.get("response"))
        .and_then(Value::as_str)
    {
        return Some(text.to_string());
    }

    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

fn fragment_from_sse_data(data: &str) -> Option<String> {
    let value: Value = serde_json::from_str(data).ok()?;
    fragment_from_value(&value)
}

pub struct WorkersAi {
    client: Client,
    run_url: String,
    api_token: String,
    model_id: String,
}

impl WorkersAi {
    pub fn new(config: &Config) -> Self {
        Self {
            client: Client::new(),
            run_url: format!(
                "{}/accounts/{}/ai/run/{}",
                config.cf_api_base, config.cf_account_id, config.model_id
            ),
            api_token: config.cf_api_token.clone(),
            model_id: config.model_id.clone(),
        }
    }

    async fn run(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response, ModelError> {
        let response = self
            .client
            .post(&self.run_url)
            .bearer_auth(&self.api_token)
            .json(&json!({ "messages": messages, "stream": stream }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ModelError::Status(response.status()));
        }

        Ok(response)
    }
}

#[async_trait]
impl ModelInvoker for WorkersAi {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<FragmentStream, ModelError> {
        let response = self.run(messages, true).await?;

        let (tx, rx) = mpsc::channel::<Result<String, ModelError>>(16);
        let mut bytes = response.bytes_stream();

        tokio::spawn(async move {
            // SSE lines may straddle chunk boundaries; carry the remainder.
            let mut buffer = String::new();

            while let Some(next) = bytes.next().await {
                let chunk = match next {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(ModelError::Transport(e))).await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim_end().to_string();
                    buffer.drain(..=newline);

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();

                    if data == "[DONE]" {
                        return;
                    }

                    if let Some(fragment) = fragment_from_sse_data(data) {
                        #[cfg(feature = "verbose")]
                        tracing::info!("Upstream fragment: {fragment:?}");

                        if tx.send(Ok(fragment)).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        let value: Value = self.run(messages, false).await?.json().await?;

        fragment_from_value(&value).ok_or(ModelError::EmptyCompletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_accepts_bare_string() {
        assert_eq!(fragment_from_value(&json!("Hi")), Some("Hi".to_string()));
    }

    #[test]
    fn adapter_accepts_response_string() {
        assert_eq!(
            fragment_from_value(&json!({ "response": "Hi there" })),
            Some("Hi there".to_string())
        );
    }

    #[test]
    fn adapter_accepts_response_byte_map() {
        let value = json!({ "response": { "0": 72, "1": 105 } });

        assert_eq!(fragment_from_value(&value), Some("Hi".to_string()));
    }

    #[test]
    fn adapter_accepts_wrapped_result() {
        let value = json!({ "result": { "response": "done" }, "success": true });

        assert_eq!(fragment_from_value(&value), Some("done".to_string()));
    }

    #[test]
    fn adapter_accepts_openai_delta() {
        let value = json!({ "choices": [{ "delta": { "content": "tok" } }] });

        assert_eq!(fragment_from_value(&value), Some("tok".to_string()));
    }

    #[test]
    fn adapter_returns_none_for_unrecognized_shapes() {
        assert_eq!(fragment_from_value(&json!({ "unexpected": 1 })), None);
        assert_eq!(fragment_from_value(&json!(42)), None);
        assert_eq!(fragment_from_value(&json!({ "choices": [] })), None);
    }

    #[test]
    fn adapter_rejects_out_of_range_byte_map_values() {
        assert_eq!(fragment_from_value(&json!({ "response": { "0": 300 } })), None);
        assert_eq!(
            fragment_from_value(&json!({ "response": { "0": 72, "1": 999 } })),
            None
        );
    }

    #[test]
    fn sse_data_line_is_parsed() {
        assert_eq!(
            fragment_from_sse_data(r#"{"response":" world"}"#),
            Some(" world".to_string())
        );
        assert_eq!(fragment_from_sse_data("not json"), None);
    }
}
