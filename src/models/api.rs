use crate::error::ApiError;
use serde::de::DeserializeOwned;
use serde::{ Deserialize, Deserializer, Serialize };

pub const DEFAULT_TONE: &str = "溫和";

/// Body of `POST /api/chat`.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    /// Base64 screenshot, optionally as a `data:` URL.
    #[serde(default)]
    pub image: Option<String>,
}

impl ChatRequest {
    pub fn text(&self) -> &str {
        self.message.as_deref().map(str::trim).unwrap_or("")
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Rejects requests with neither text nor image, and images whose
    /// base64 form is longer than `max_image_len`.
    pub fn validate(&self, max_image_len: usize) -> Result<(), ApiError> {
        let image = self.image();
        if self.text().is_empty() && image.is_none() {
            return Err(ApiError::Validation("請提供文字訊息或圖片截圖".into()));
        }
        if let Some(image) = image {
            if image.len() > max_image_len {
                return Err(ApiError::ImageTooLarge { size: image.len(), limit: max_image_len });
            }
        }
        Ok(())
    }
}

/// Body of `POST /api/tone`.
#[derive(Deserialize, Debug, Default, Clone)]
pub struct ToneRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub modifier: Option<String>,
}

impl ToneRequest {
    pub fn tone(&self) -> &str {
        self.tone
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TONE)
    }

    pub fn modifier(&self) -> &str {
        self.modifier.as_deref().map(str::trim).unwrap_or("")
    }
}

/// A JSON object the model is asked to produce. Implementors carry the
/// fallback payload used when the remote call fails.
pub trait ModelReply: DeserializeOwned + Serialize + Send + Sized {
    fn fallback() -> Self;

    /// Boundary check applied after a successful parse.
    fn check(&self) -> Result<(), String>;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct EmotionReply {
    #[serde(default, deserialize_with = "null_as_default")]
    pub reply: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key_change: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub analysis: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tip: String,
}

impl ModelReply for EmotionReply {
    fn fallback() -> Self {
        Self {
            reply: "抱歉，我現在有點累，能請您再說一次嗎？".into(),
            options: Vec::new(),
            key_change: "連線不穩定".into(),
            analysis: "系統暫時無法分析".into(),
            tip: "請稍後再嘗試與我聊聊。".into(),
        }
    }

    fn check(&self) -> Result<(), String> {
        if self.reply.trim().is_empty() {
            return Err("missing 'reply'".into());
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ToneReply {
    #[serde(default, deserialize_with = "null_as_default")]
    pub result: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub key_change: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub analysis: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tip: String,
}

impl ModelReply for ToneReply {
    fn fallback() -> Self {
        Self {
            result: "改寫失敗，請稍後再試。".into(),
            key_change: "連線問題".into(),
            analysis: String::new(),
            tip: String::new(),
        }
    }

    fn check(&self) -> Result<(), String> {
        if self.result.trim().is_empty() {
            return Err("missing 'result'".into());
        }
        Ok(())
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where D: Deserializer<'de>, T: Deserialize<'de> + Default
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Serialize, Debug)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Envelope<T> {
    Success {
        data: T,
    },
    Error {
        message: String,
    },
}

#[derive(Serialize, Debug)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self { status: "alive", service: "LittleTone", version: "2.0" }
    }
}
