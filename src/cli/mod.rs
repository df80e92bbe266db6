use clap::{ Parser, ValueEnum };

/// Shape of `/api/chat` responses and of error bodies.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStyle {
    /// `{reply, options, ...}` on success, `{error}` on failure.
    Plain,
    /// `{status: "success", data}` on success, `{status: "error", message}` on failure.
    Envelope,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the HTTP server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:5000")]
    pub server_addr: String,

    /// Response shape for /api/chat and for error bodies (plain, envelope)
    #[arg(long, env = "RESPONSE_STYLE", value_enum, default_value = "plain")]
    pub response_style: ResponseStyle,

    /// Maximum accepted request body size in bytes.
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "5242880")] // 5 MiB
    pub max_body_bytes: usize,

    /// Global request rate for /api/* routes, per second.
    #[arg(long, env = "RATE_LIMIT_PER_SECOND", default_value = "20")]
    pub rate_limit_per_second: u32,

    /// LINE LIFF app id injected into the HTML entry point.
    #[arg(long, env = "LINE_LIFF_ID", default_value = "")]
    pub liff_id: String,

    /// Path to the HTML entry point template.
    #[arg(long, env = "TEMPLATE_PATH", default_value = "templates/index.html")]
    pub template_path: String,

    // --- Chat LLM Provider Args ---
    /// Type of LLM provider for chat completion (openai, ollama)
    #[arg(long, env = "CHAT_LLM_TYPE", default_value = "openai")]
    pub chat_llm_type: String,

    /// Base URL for the Chat LLM provider API (e.g., https://api.openai.com)
    #[arg(long, env = "CHAT_BASE_URL")] // No default, let adapters handle defaults if None
    pub chat_base_url: Option<String>,

    /// API Key for the Chat LLM provider
    #[arg(long, env = "OPENAI_API_KEY", default_value = "")]
    pub chat_api_key: String,

    /// Model name for chat completion (e.g., gpt-4o-mini, llama3.2-vision)
    #[arg(long, env = "CHAT_MODEL")] // No default, rely on adapter defaults if None
    pub chat_model: Option<String>,

    /// Timeout in seconds for a single upstream completion call.
    #[arg(long, env = "CHAT_TIMEOUT_SECS", default_value = "60")]
    pub chat_timeout_secs: u64,

    /// Optional JSON file overriding the built-in prompts.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    // --- Image Args ---
    /// Maximum base64 length of an embedded image before it is rejected.
    #[arg(long, env = "MAX_IMAGE_BASE64_LEN", default_value = "4194304")] // 4 MiB
    pub max_image_base64_len: usize,

    /// Longest edge, in pixels, of images forwarded upstream.
    #[arg(long, env = "IMAGE_MAX_EDGE", default_value = "1024")]
    pub image_max_edge: u32,

    /// JPEG quality used when re-encoding images (1-100).
    #[arg(long, env = "IMAGE_JPEG_QUALITY", default_value = "80", value_parser = clap::value_parser!(u8).range(1..=100))]
    pub image_jpeg_quality: u8,

    // --- History Store Args ---
    /// History chat store type (memory, redis)
    #[arg(long, env = "HISTORY_TYPE", default_value = "memory")]
    pub history_type: String,

    /// History chat store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379")]
    pub history_host: String,

    /// Prefix for Redis history keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "littletone:history:")]
    pub history_redis_prefix: String,

    /// Idle seconds after which a session's history expires. 0 means never.
    #[arg(long, env = "HISTORY_TTL_SECS", default_value = "1800")]
    pub history_ttl_secs: u64,

    /// Number of most recent history messages sent upstream as context.
    #[arg(long, env = "HISTORY_WINDOW", default_value = "10", value_parser = clap::value_parser!(u64).range(1..=1000))]
    pub history_window: u64,

    // --- TLS Args ---
    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_limits() {
        let args = Args::try_parse_from(["little-tone"]).unwrap();
        assert_eq!(args.max_body_bytes, 5 * 1024 * 1024);
        assert_eq!(args.max_image_base64_len, 4 * 1024 * 1024);
        assert_eq!(args.history_window, 10);
        assert_eq!(args.response_style, ResponseStyle::Plain);
    }

    #[test]
    fn rejects_out_of_range_history_window() {
        let parsed = Args::try_parse_from(["little-tone", "--history-window", "0"]);
        assert!(parsed.is_err());
        let parsed = Args::try_parse_from(["little-tone", "--history-window", "18446744073709551615"]);
        assert!(parsed.is_err());
        let args = Args::try_parse_from(["little-tone", "--history-window", "1000"]).unwrap();
        assert_eq!(args.history_window, 1000);
    }

    #[test]
    fn parses_envelope_style() {
        let args = Args::try_parse_from(["little-tone", "--response-style", "envelope"]).unwrap();
        assert_eq!(args.response_style, ResponseStyle::Envelope);
    }
}
