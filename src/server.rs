use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    response::Json,
    routing::{get, post},
};
use http::{HeaderMap, header};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::chat::run_chat;
use crate::codec::{Turn, TurnRecord, parse_turns};
use crate::config::AppConfig;
use crate::error::ChatError;
use crate::gemini::{GeminiClient, GenerateContent};
use crate::gmail::{EmailRecord, GmailSearchGateway, MailSearch};

type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: AppConfig,
    pub model: Box<dyn GenerateContent + Send + Sync>,
    pub gateway: Box<dyn MailSearch + Send + Sync>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        model: Box<dyn GenerateContent + Send + Sync>,
        gateway: Box<dyn MailSearch + Send + Sync>,
    ) -> Self {
        Self {
            config,
            model,
            gateway,
        }
    }
}

#[derive(Deserialize)]
struct ChatRequest {
    messages: Vec<TurnRecord>,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
    messages: Vec<TurnRecord>,
    emails: Vec<EmailRecord>,
}

async fn index() -> &'static str {
    "Hello, World!"
}

fn bearer_token(headers: &HeaderMap) -> Result<String, ChatError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ChatError::MissingAuth)?;
    Ok(value.strip_prefix("Bearer ").unwrap_or(value).to_string())
}

async fn chat_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ChatError> {
    let token = bearer_token(&headers)?;
    let turns: Vec<Turn> = parse_turns(&payload.messages)?;

    let deadline = Duration::from_secs(state.config.request_deadline_secs);
    let outcome = tokio::time::timeout(
        deadline,
        run_chat(
            state.model.as_ref(),
            state.gateway.as_ref(),
            &token,
            turns,
            state.config.max_tool_calls,
        ),
    )
    .await
    .map_err(|_| ChatError::DeadlineExceeded)??;

    Ok(Json(ChatResponse {
        response: outcome.answer,
        messages: outcome.turns.iter().map(TurnRecord::from).collect(),
        emails: outcome.emails,
    }))
}

pub fn app(app_state: AppState) -> Router {
    let shared_state = SharedState::new(app_state);
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/", get(index))
        // Chat with the email assistant
        .route("/chat", post(chat_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

// Run the server
pub async fn serve(host: String, port: String, config: AppConfig) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // axum logs rejections from built-in extractors with the `axum::rejection`
                // target, at `TRACE` level. `axum::rejection=trace` enables showing those events
                format! {
                    "{}=debug,tower_http=debug,axum::rejection=trace",
                    env!("CARGO_CRATE_NAME")
                }
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let model = GeminiClient::new(&config);
    let gateway = GmailSearchGateway::new(&config.gmail_api_hostname);
    let app_state = AppState::new(config, Box::new(model), Box::new(gateway));
    let app = app(app_state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port))
        .await
        .unwrap();

    tracing::debug!(
        "Server started. Listening on {}",
        listener.local_addr().unwrap()
    );

    axum::serve(listener, app).await.unwrap();
}
