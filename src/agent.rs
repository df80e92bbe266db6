use crate::cli::Args;
use crate::config::prompt::{ self, PromptConfig };
use crate::error::ApiError;
use crate::history::{ initialize_history_store, HistoryStore };
use crate::llm::chat::{ new_client as new_chat_client, request_reply, ChatClient, Completion, PromptMessage };
use crate::llm::{ LlmConfig, LlmType };
use crate::media::{ normalize_image, ImageLimits, NormalizedImage };
use crate::models::api::{ ChatRequest, EmotionReply, ModelReply, ToneReply, ToneRequest };
use crate::models::chat::Role;
use crate::session::SessionContext;

use log::{ info, warn };
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

/// Stored in place of the text when a user sends only a screenshot.
pub const IMAGE_PLACEHOLDER: &str = "[圖片]";
const PREVIEW_CHARS: usize = 20;

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub history_window: usize,
    pub max_image_base64_len: usize,
    pub image_limits: ImageLimits,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            history_window: 10,
            max_image_base64_len: 4 * 1024 * 1024,
            image_limits: ImageLimits::default(),
        }
    }
}

#[derive(Clone)]
pub struct LittleToneAgent {
    chat_client: Arc<dyn ChatClient>,
    history_store: Arc<dyn HistoryStore>,
    prompt_config: Arc<PromptConfig>,
    settings: ChatSettings,
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

impl LittleToneAgent {
    pub async fn new(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let llm_type: LlmType = args.chat_llm_type.parse()?;
        let chat_api_key = if !args.chat_api_key.is_empty() {
            Some(args.chat_api_key.clone())
        } else {
            None
        };
        let chat_config = LlmConfig {
            llm_type,
            api_key: chat_api_key,
            completion_model: args.chat_model.clone(),
            base_url: args.chat_base_url.clone(),
            timeout: Duration::from_secs(args.chat_timeout_secs),
        };
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Type={}, Model={}, BaseURL={}",
            args.chat_llm_type,
            chat_client.get_model(),
            chat_client.get_base_url().as_deref().unwrap_or("adapter default")
        );

        let history_store = initialize_history_store(args)?;
        let prompt_config = prompt::load_prompts(args.prompts_path.as_deref())?;

        let settings = ChatSettings {
            history_window: args.history_window as usize,
            max_image_base64_len: args.max_image_base64_len,
            image_limits: ImageLimits {
                max_edge: args.image_max_edge,
                jpeg_quality: args.image_jpeg_quality,
            },
        };

        Ok(Self::with_parts(chat_client, history_store, prompt_config, settings))
    }

    pub fn with_parts(
        chat_client: Arc<dyn ChatClient>,
        history_store: Arc<dyn HistoryStore>,
        prompt_config: Arc<PromptConfig>,
        settings: ChatSettings
    ) -> Self {
        Self { chat_client, history_store, prompt_config, settings }
    }

    async fn ask<T: ModelReply>(&self, messages: &[PromptMessage]) -> Completion<T> {
        match request_reply::<T>(self.chat_client.as_ref(), messages).await {
            Ok(reply) => Completion::Answered(reply),
            Err(cause) => {
                warn!("Remote completion failed, serving fallback: {}", cause);
                Completion::Fallback { payload: T::fallback(), cause }
            }
        }
    }

    async fn normalize(&self, raw: &str) -> Result<NormalizedImage, ApiError> {
        let raw = raw.to_string();
        let limits = self.settings.image_limits;
        let normalized = tokio::task
            ::spawn_blocking(move || normalize_image(&raw, &limits)).await
            .map_err(|e| ApiError::Unhandled(format!("image task failed: {}", e)))??;
        info!("Normalized image to {}x{} JPEG", normalized.width, normalized.height);
        Ok(normalized)
    }

    /// Emotion chat with session memory. Validation and size errors are
    /// returned before any remote call; remote failures come back as
    /// `Completion::Fallback` and leave no assistant turn in the history.
    pub async fn chat(
        &self,
        session: &SessionContext,
        request: &ChatRequest
    ) -> Result<Completion<EmotionReply>, ApiError> {
        if let Err(e) = request.validate(self.settings.max_image_base64_len) {
            if let ApiError::ImageTooLarge { size, .. } = &e {
                warn!("[{}] Rejected oversized image (length: {})", session.id, size);
            }
            return Err(e);
        }

        let text = request.text();
        info!(
            "[{}] Processing chat request: {}... | image: {}",
            session.id,
            preview(text),
            if request.image().is_some() { "yes" } else { "no" }
        );

        let image = match request.image() {
            Some(raw) => Some(self.normalize(raw).await?),
            None => None,
        };

        let stored = if text.is_empty() { IMAGE_PLACEHOLDER } else { text };
        self.history_store.append(&session.id, Role::User, stored).await?;
        let window = self.settings.history_window.max(1);
        let conversation = self.history_store.recent(&session.id, window).await?;

        let messages = prompt::build_emotion_messages(&self.prompt_config, &conversation, image);
        let completion = self.ask::<EmotionReply>(&messages).await;

        if let Completion::Answered(reply) = &completion {
            self.history_store.append(&session.id, Role::Assistant, &reply.reply).await?;
        }
        Ok(completion)
    }

    /// One-shot tone rewrite; never reads or writes history.
    pub async fn rewrite_tone(&self, request: &ToneRequest) -> Completion<ToneReply> {
        info!(
            "Processing tone rewrite: {}... | tone: {}",
            preview(request.text.trim()),
            request.tone()
        );
        let messages = prompt::build_tone_messages(
            &self.prompt_config,
            request.text.trim(),
            request.tone(),
            request.modifier()
        );
        self.ask::<ToneReply>(&messages).await
    }

    pub async fn reset(&self, session: &SessionContext) -> Result<(), ApiError> {
        self.history_store.clear(&session.id).await?;
        info!("[{}] Conversation history cleared", session.id);
        Ok(())
    }
}
