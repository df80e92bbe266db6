use async_trait::async_trait;
use log::debug;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };

use super::{ ChatClient, CompletionResponse, PromptMessage };
use crate::llm::{ LlmConfig, LlmError, LlmType };

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAIChatClient {
    http: HttpClient,
    model: String,
    endpoint: String,
}

#[derive(Serialize)]
struct OpenAIMessage {
    role: &'static str,
    content: OpenAIContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum OpenAIContent {
    Text(String),
    Parts(Vec<OpenAIContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpenAIContentPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: OpenAIImageUrl,
    },
}

#[derive(Serialize)]
struct OpenAIImageUrl {
    url: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

impl From<&PromptMessage> for OpenAIMessage {
    fn from(msg: &PromptMessage) -> Self {
        let content = match &msg.image {
            None => OpenAIContent::Text(msg.content.clone()),
            Some(image) => {
                let mut parts = Vec::with_capacity(2);
                if !msg.content.is_empty() {
                    parts.push(OpenAIContentPart::Text { text: msg.content.clone() });
                }
                parts.push(OpenAIContentPart::ImageUrl {
                    image_url: OpenAIImageUrl { url: image.data_url() },
                });
                OpenAIContent::Parts(parts)
            }
        };
        Self { role: msg.role.as_str(), content }
    }
}

/// Accepts either a host (`https://api.openai.com`) or a full
/// `.../chat/completions` URL.
fn chat_endpoint(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.ends_with("/chat/completions") {
        trimmed.to_string()
    } else if trimmed.ends_with("/v1") {
        format!("{}/chat/completions", trimmed)
    } else {
        format!("{}/v1/chat/completions", trimmed)
    }
}

impl OpenAIChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, LlmError> {
        let chat_model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| LlmError::Config(format!("Invalid API key format: {}", e)))?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            model: chat_model,
            endpoint: chat_endpoint(&api_url),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.llm_type != LlmType::OpenAI {
            return Err(LlmError::Config("Invalid config type for OpenAIChatClient".into()));
        }
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or(LlmError::MissingApiKey("OpenAI"))?;

        Self::new(
            api_key,
            config.completion_model.clone(),
            config.base_url.clone(),
            config.timeout,
        )
    }

    fn build_request(&self, messages: &[PromptMessage], expect_json: bool) -> OpenAIChatRequest {
        OpenAIChatRequest {
            model: self.model.clone(),
            messages: messages.iter().map(OpenAIMessage::from).collect(),
            response_format: expect_json.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        }
    }
}

#[async_trait]
impl ChatClient for OpenAIChatClient {
    async fn complete(
        &self,
        messages: &[PromptMessage],
        expect_json: bool
    ) -> Result<CompletionResponse, LlmError> {
        let req = self.build_request(messages, expect_json);
        debug!("OpenAI request: model={} messages={}", self.model, messages.len());

        let resp = self.http.post(&self.endpoint).json(&req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }

        let resp = resp.json::<OpenAIResponse>().await?;
        let content = resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse)?;

        Ok(CompletionResponse { response: content })
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_base_url(&self) -> Option<String> {
        Some(self.endpoint.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::NormalizedImage;
    use serde_json::json;
    use std::time::Duration;

    fn client() -> OpenAIChatClient {
        OpenAIChatClient::new("sk-test".into(), None, None, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn resolves_endpoint_from_base_url() {
        assert_eq!(chat_endpoint("https://api.openai.com"), "https://api.openai.com/v1/chat/completions");
        assert_eq!(chat_endpoint("http://proxy/v1/"), "http://proxy/v1/chat/completions");
        assert_eq!(
            chat_endpoint("https://api.openai.com/v1/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn json_mode_sets_response_format() {
        let c = client();
        let req = c.build_request(&[PromptMessage::system("回覆 JSON"), PromptMessage::user("嗨")], true);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["model"], "gpt-4o-mini");
        assert_eq!(value["response_format"], json!({"type": "json_object"}));
        assert_eq!(value["messages"][0], json!({"role": "system", "content": "回覆 JSON"}));

        let plain = serde_json::to_value(c.build_request(&[], false)).unwrap();
        assert!(plain.get("response_format").is_none());
    }

    #[test]
    fn image_messages_become_content_parts() {
        let mut msg = PromptMessage::user("幫我看看");
        msg.image = Some(NormalizedImage { mime_type: "image/jpeg", data: "QUJD".into(), width: 1, height: 1 });
        let value = serde_json::to_value(OpenAIMessage::from(&msg)).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "幫我看看"},
                    {"type": "image_url", "image_url": {"url": "data:image/jpeg;base64,QUJD"}}
                ]
            })
        );
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let config = LlmConfig { api_key: Some("  ".into()), ..LlmConfig::default() };
        assert!(matches!(OpenAIChatClient::from_config(&config), Err(LlmError::MissingApiKey(_))));
    }
}
