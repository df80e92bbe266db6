pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod llm;
pub mod media;
pub mod models;
pub mod server;
pub mod session;

use agent::LittleToneAgent;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Response Style: {:?}", args.response_style);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("adapter default"));
    info!("History Store Type: {}", args.history_type);
    info!("History Window: {}", args.history_window);
    info!("History TTL (s): {}", args.history_ttl_secs);
    info!("Max Body Bytes: {}", args.max_body_bytes);
    info!("Max Image Base64 Length: {}", args.max_image_base64_len);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("Template Path: {}", args.template_path);
    info!("Rate Limit (req/s): {}", args.rate_limit_per_second);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let agent = Arc::new(LittleToneAgent::new(&args).await?);
    let addr = args.server_addr.clone();
    let server = Server::new(addr, agent, args);
    server.run().await?;

    Ok(())
}
