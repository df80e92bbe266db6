use crate::agent::LittleToneAgent;
use crate::cli::{ Args, ResponseStyle };
use crate::error::ApiError;
use crate::models::api::{ ChatRequest, Envelope, HealthResponse, ToneRequest };
use crate::session::SessionContext;
use std::any::Any;
use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use axum::{
    routing::{ get, post },
    Router,
    Json,
    extract::{ State, Request, DefaultBodyLimit, rejection::JsonRejection },
    middleware::{ self, Next },
    response::{ Html, IntoResponse, Response },
    http::StatusCode,
};
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{ self, CorsLayer };
use log::{ info, warn, error };

type GlobalLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct SiteConfig {
    pub liff_id: String,
    pub template_path: PathBuf,
}

#[derive(Clone)]
pub struct AppState {
    agent: Arc<LittleToneAgent>,
    site: Arc<SiteConfig>,
    style: ResponseStyle,
    limiter: Arc<GlobalLimiter>,
    max_body_bytes: usize,
}

impl AppState {
    pub fn new(
        agent: Arc<LittleToneAgent>,
        args: &Args
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let per_second = NonZeroU32::new(args.rate_limit_per_second).ok_or(
            "RATE_LIMIT_PER_SECOND must be greater than zero"
        )?;
        if args.liff_id.trim().is_empty() {
            warn!("LINE_LIFF_ID is not set; the entry page will load without a LIFF id");
        }
        let site = SiteConfig {
            liff_id: args.liff_id.trim().to_string(),
            template_path: PathBuf::from(&args.template_path),
        };
        Ok(Self::with_parts(agent, site, args.response_style, per_second, args.max_body_bytes))
    }

    pub fn with_parts(
        agent: Arc<LittleToneAgent>,
        site: SiteConfig,
        style: ResponseStyle,
        per_second: NonZeroU32,
        max_body_bytes: usize
    ) -> Self {
        Self {
            agent,
            site: Arc::new(site),
            style,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(per_second))),
            max_body_bytes,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods(cors::Any)
        .allow_headers(cors::Any);
    let style = state.style;

    let api = Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/reset", post(reset_handler))
        .route("/api/tone", post(tone_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .merge(api)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(CatchPanicLayer::custom(move |panic: Box<dyn Any + Send + 'static>| {
            panic_response(style, panic)
        }))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    addr: &str,
    state: AppState,
    args: &Args,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = addr.parse::<SocketAddr>()?;
    let app = router(state);

    if args.enable_tls {
        match (&args.tls_cert_path, &args.tls_key_path) {
            (Some(cert_path), Some(key_path)) => {
                info!(
                    "TLS enabled. Loading certificate from '{}' and key from '{}'",
                    cert_path,
                    key_path
                );
                let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                    cert_path,
                    key_path
                ).await?;
                info!("Starting HTTPS server on: https://{}", addr);
                axum_server::bind_rustls(addr, tls_config)
                    .serve(app.into_make_service())
                    .await?;
            }
            _ => {
                error!("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.");
                return Err("TLS enabled without cert/key".into());
            }
        }
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            format!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e)
        })?;
        info!("Starting HTTP server on: http://{}", addr);
        axum::serve(listener, app.into_make_service()).await?;
    }

    Ok(())
}

fn error_response(style: ResponseStyle, err: &ApiError) -> Response {
    match err {
        ApiError::Unhandled(detail) => error!("Unhandled server error: {}", detail),
        other => info!("Request rejected: {}", other),
    }
    let status = err.status_code();
    let message = err.public_message();
    match style {
        ResponseStyle::Plain => (status, Json(json!({ "error": message }))).into_response(),
        ResponseStyle::Envelope => (status, Json(Envelope::<()>::Error { message })).into_response(),
    }
}

fn panic_response(style: ResponseStyle, panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "request handler panicked".to_string()
    };
    error_response(style, &ApiError::Unhandled(format!("panic: {}", detail)))
}

fn rejection_error(rejection: JsonRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("Request body exceeded the configured limit");
        ApiError::BodyTooLarge
    } else {
        ApiError::Validation(format!("無效的請求內容 ({})", rejection.body_text()))
    }
}

async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.limiter.check().is_err() {
        warn!("Global request rate limit exceeded for {}", request.uri().path());
        return error_response(state.style, &ApiError::RateLimited);
    }
    next.run(request).await
}

async fn chat_handler(
    State(state): State<AppState>,
    session: SessionContext,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let response = match payload {
        Err(rejection) => error_response(state.style, &rejection_error(rejection)),
        Ok(Json(request)) => match state.agent.chat(&session, &request).await {
            Ok(completion) => {
                let reply = completion.into_payload();
                match state.style {
                    ResponseStyle::Plain => Json(reply).into_response(),
                    ResponseStyle::Envelope => Json(Envelope::Success { data: reply }).into_response(),
                }
            }
            Err(e) => error_response(state.style, &e),
        },
    };
    session.attach(response)
}

async fn reset_handler(State(state): State<AppState>, session: SessionContext) -> Response {
    let response = match state.agent.reset(&session).await {
        Ok(()) => Json(json!({ "status": "cleared" })).into_response(),
        Err(e) => error_response(state.style, &e),
    };
    session.attach(response)
}

async fn tone_handler(
    State(state): State<AppState>,
    payload: Result<Json<ToneRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(request)) => Json(state.agent.rewrite_tone(&request).await.into_payload()).into_response(),
        Err(rejection) => error_response(state.style, &rejection_error(rejection)),
    }
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

async fn index_handler(State(state): State<AppState>) -> Response {
    match tokio::fs::read_to_string(&state.site.template_path).await {
        Ok(template) => Html(render_index(&template, &state.site.liff_id)).into_response(),
        Err(e) => {
            error!(
                "Failed to read template '{}': {}",
                state.site.template_path.display(),
                e
            );
            (StatusCode::INTERNAL_SERVER_ERROR, "Template unavailable").into_response()
        }
    }
}

fn render_index(template: &str, liff_id: &str) -> String {
    let escaped = escape_html(liff_id);
    template.replace("{{ liff_id }}", &escaped).replace("{{liff_id}}", &escaped)
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
