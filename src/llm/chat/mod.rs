pub mod ollama;
pub mod openai;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serde_json::{ Map, Value };
use std::sync::Arc;
use super::{ LlmConfig, LlmError, LlmType };
use self::ollama::OllamaClient;
use self::openai::OpenAIChatClient;
use crate::media::NormalizedImage;
use crate::models::api::ModelReply;
use crate::models::chat::{ ChatMessage, Role };

/// One role-tagged message as sent upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
    pub image: Option<NormalizedImage>,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), image: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), image: None }
    }
}

impl From<&ChatMessage> for PromptMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self { role: msg.role, content: msg.content.clone(), image: None }
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends `messages` upstream. With `expect_json` the provider is asked
    /// to answer with a single JSON object.
    async fn complete(
        &self,
        messages: &[PromptMessage],
        expect_json: bool
    ) -> Result<CompletionResponse, LlmError>;

    fn get_model(&self) -> String;
    fn get_base_url(&self) -> Option<String>;
}

/// Outcome of a remote call. Callers decide what to do with a fallback;
/// the payload is always well-formed.
#[derive(Debug)]
pub enum Completion<T> {
    Answered(T),
    Fallback {
        payload: T,
        cause: LlmError,
    },
}

impl<T> Completion<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Completion::Fallback { .. })
    }

    pub fn payload(&self) -> &T {
        match self {
            Completion::Answered(p) => p,
            Completion::Fallback { payload, .. } => payload,
        }
    }

    pub fn into_payload(self) -> T {
        match self {
            Completion::Answered(p) => p,
            Completion::Fallback { payload, .. } => payload,
        }
    }
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, LlmError> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::OpenAI => {
            let specific_client = OpenAIChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::Ollama => {
            let specific_client = OllamaClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}

/// Pulls the JSON object out of a model answer, tolerating markdown fences.
pub fn extract_json_object(raw: &str) -> Result<Map<String, Value>, LlmError> {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        text = rest.trim_end().strip_suffix("```").unwrap_or(rest).trim();
    }

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(LlmError::NotJsonObject(format!("got {}", kind_of(&other)))),
        Err(e) => Err(LlmError::NotJsonObject(e.to_string())),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Asks for a JSON answer and validates it as `T`.
pub async fn request_reply<T: ModelReply>(
    client: &dyn ChatClient,
    messages: &[PromptMessage]
) -> Result<T, LlmError> {
    let completion = client.complete(messages, true).await?;
    let object = extract_json_object(&completion.response)?;
    let reply: T = serde_json
        ::from_value(Value::Object(object))
        .map_err(|e| LlmError::InvalidShape(e.to_string()))?;
    reply.check().map_err(LlmError::InvalidShape)?;
    Ok(reply)
}
