use crate::history::HistoryError;
use crate::media::ImageError;
use axum::http::StatusCode;
use thiserror::Error;

/// Failures surfaced to HTTP callers. Upstream model failures never appear
/// here; they are replaced by a fallback payload before reaching a handler.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Embedded image too large: {size} > {limit}")]
    ImageTooLarge {
        size: usize,
        limit: usize,
    },

    #[error("Request body exceeds the configured limit")]
    BodyTooLarge,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Unhandled server error: {0}")]
    Unhandled(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::ImageTooLarge { .. } | ApiError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text safe to show to end users.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Validation(msg) => msg.clone(),
            ApiError::ImageTooLarge { .. } => "圖片檔案過大，請選擇較小的截圖".into(),
            ApiError::BodyTooLarge => "上傳內容過大，已遭系統攔截".into(),
            ApiError::RateLimited => "請求過於頻繁，請稍後再試".into(),
            ApiError::Unhandled(_) => "伺服器忙碌中，請稍後再試".into(),
        }
    }
}

impl From<HistoryError> for ApiError {
    fn from(e: HistoryError) -> Self {
        ApiError::Unhandled(e.to_string())
    }
}

impl From<ImageError> for ApiError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::Encode(inner) => ApiError::Unhandled(inner.to_string()),
            _ => ApiError::Validation("圖片格式無法辨識".into()),
        }
    }
}
