use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::sync::Arc;
use log::info;

use crate::llm::chat::PromptMessage;
use crate::media::NormalizedImage;
use crate::models::chat::Conversation;

pub const DEFAULT_EMOTION_SYSTEM: &str = "你是「小語氣 LittleTone」，一位溫暖、善於傾聽的情緒陪伴教練。\
請以繁體中文回應使用者，先同理對方的感受，再給予溫和具體的回應。\
若使用者附上聊天截圖，請先理解截圖中的對話脈絡再回應。\
請務必只輸出一個 JSON 物件，包含以下欄位：\
\"reply\"（給使用者的回覆，字串）、\
\"options\"（使用者可以接著說的 2 到 3 句建議，字串陣列）、\
\"key_change\"（這次回覆的關鍵調整，字串）、\
\"analysis\"（對使用者情緒的簡短分析，字串）、\
\"tip\"（一個溝通小技巧，字串）。";

pub const DEFAULT_TONE_SYSTEM: &str = "你是一位專業的溝通語氣教練，擅長在保留原意的前提下調整訊息語氣。\
請以繁體中文回應，並且只輸出一個 JSON 物件，包含以下欄位：\
\"result\"（改寫後的訊息，字串）、\
\"key_change\"（改寫的關鍵差異，字串）、\
\"analysis\"（原訊息可能給人的感受分析，字串）、\
\"tip\"（一個溝通小技巧，字串）。";

pub const DEFAULT_TONE_TEMPLATE: &str = "請將以下訊息改寫成「{tone}」的語氣。\n\
額外要求：{modifier}\n\
原始訊息：{text}";

#[derive(Debug)]
pub enum PromptError {
    TemplateInvalid(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::TemplateInvalid(msg) => write!(f, "Invalid prompt template: {}", msg),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptConfig {
    pub emotion_system: String,
    pub tone_system: String,
    pub tone_template: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            emotion_system: DEFAULT_EMOTION_SYSTEM.to_string(),
            tone_system: DEFAULT_TONE_SYSTEM.to_string(),
            tone_template: DEFAULT_TONE_TEMPLATE.to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PromptOverrides {
    emotion_system: Option<String>,
    tone_system: Option<String>,
    tone_template: Option<String>,
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        if self.emotion_system.trim().is_empty() {
            return Err(PromptError::TemplateInvalid("emotion_system is empty".to_string()));
        }
        if self.tone_system.trim().is_empty() {
            return Err(PromptError::TemplateInvalid("tone_system is empty".to_string()));
        }
        if !self.tone_template.contains("{text}") {
            return Err(
                PromptError::TemplateInvalid("tone_template must contain {text}".to_string())
            );
        }
        Ok(())
    }

    fn apply(mut self, overrides: PromptOverrides) -> Self {
        if let Some(v) = overrides.emotion_system {
            self.emotion_system = v;
        }
        if let Some(v) = overrides.tone_system {
            self.tone_system = v;
        }
        if let Some(v) = overrides.tone_template {
            self.tone_template = v;
        }
        self
    }
}

/// Built-in prompts, optionally overridden by a JSON file.
pub fn load_prompts(path: Option<&str>) -> Result<Arc<PromptConfig>, PromptError> {
    let config = match path {
        None => PromptConfig::default(),
        Some(path) => {
            let file_content = fs::read_to_string(path)?;
            let overrides: PromptOverrides = serde_json::from_str(&file_content)?;
            info!("Loaded prompt overrides from '{}'", path);
            PromptConfig::default().apply(overrides)
        }
    };
    config.validate()?;
    Ok(Arc::new(config))
}

pub fn get_tone_prompt(config: &PromptConfig, text: &str, tone: &str, modifier: &str) -> String {
    let modifier = if modifier.is_empty() { "無" } else { modifier };
    config.tone_template
        .replace("{tone}", tone)
        .replace("{modifier}", modifier)
        .replace("{text}", text)
}

/// System prompt, then the history window. The image rides on the final
/// user message.
pub fn build_emotion_messages(
    config: &PromptConfig,
    conversation: &Conversation,
    image: Option<NormalizedImage>
) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(conversation.messages.len() + 1);
    messages.push(PromptMessage::system(config.emotion_system.clone()));
    messages.extend(conversation.messages.iter().map(PromptMessage::from));

    if let Some(image) = image {
        match messages.iter_mut().rev().find(|m| m.role == crate::models::chat::Role::User) {
            Some(last_user) => last_user.image = Some(image),
            None => {
                let mut msg = PromptMessage::user("");
                msg.image = Some(image);
                messages.push(msg);
            }
        }
    }
    messages
}

pub fn build_tone_messages(
    config: &PromptConfig,
    text: &str,
    tone: &str,
    modifier: &str
) -> Vec<PromptMessage> {
    vec![
        PromptMessage::system(config.tone_system.clone()),
        PromptMessage::user(get_tone_prompt(config, text, tone, modifier))
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ ChatMessage, Role };
    use std::io::Write;

    #[test]
    fn default_prompts_ask_for_json() {
        let config = load_prompts(None).unwrap();
        // OpenAI's JSON mode refuses prompts that never mention JSON.
        assert!(config.emotion_system.contains("JSON"));
        assert!(config.tone_system.contains("JSON"));
    }

    #[test]
    fn tone_prompt_fills_placeholders() {
        let config = PromptConfig::default();
        let prompt = get_tone_prompt(&config, "你怎麼還沒回？", "溫和", "");
        assert!(prompt.contains("「溫和」"));
        assert!(prompt.contains("額外要求：無"));
        assert!(prompt.ends_with("原始訊息：你怎麼還沒回？"));
    }

    #[test]
    fn overrides_replace_only_given_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tone_template": "Rewrite as {{tone}}: {{text}}"}}"#).unwrap();

        let config = load_prompts(file.path().to_str()).unwrap();
        assert_eq!(config.tone_template, "Rewrite as {tone}: {text}");
        assert_eq!(config.emotion_system, DEFAULT_EMOTION_SYSTEM);
    }

    #[test]
    fn rejects_template_without_text_placeholder() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"tone_template": "Rewrite as {{tone}}"}}"#).unwrap();
        assert!(matches!(load_prompts(file.path().to_str()), Err(PromptError::TemplateInvalid(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(load_prompts(Some("/nonexistent/prompts.json")), Err(PromptError::IoError(_))));
    }

    #[test]
    fn emotion_messages_attach_image_to_last_user_turn() {
        let config = PromptConfig::default();
        let conversation = Conversation {
            id: "s".into(),
            messages: vec![
                ChatMessage::new(Role::User, "早安"),
                ChatMessage::new(Role::Assistant, "早安！"),
                ChatMessage::new(Role::User, "[圖片]")
            ],
        };
        let image = NormalizedImage { mime_type: "image/jpeg", data: "QUJD".into(), width: 1, height: 1 };
        let messages = build_emotion_messages(&config, &conversation, Some(image));

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[1].image.is_none());
        assert!(messages[3].image.is_some());
    }

    #[test]
    fn tone_messages_are_a_single_pair() {
        let messages = build_tone_messages(&PromptConfig::default(), "快點", "專業", "簡短一點");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].role, Role::User);
        assert!(messages[1].content.contains("簡短一點"));
    }
}
