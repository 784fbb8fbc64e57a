use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{ IntoResponse, Response },
    routing::{ delete, get, post },
    Json,
    Router,
};
use chrono::Utc;
use log::{ info, error };
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{ Any, CorsLayer };

use super::websocket::Broadcaster;
use crate::cli::Args;
use crate::insights::{ InsightError, InsightService };
use crate::llm::DeploymentClient;
use crate::models::api::{
    ChatRequest,
    ChatResponse,
    ErrorResponse,
    HistoryResponse,
    InsightsResponse,
    MessageResponse,
    StatusResponse,
};
use crate::models::reading::{ ReadingSet, ReadingSubmission };
use crate::models::websocket::ServerMessage;
use crate::storage::DocumentStore;
use crate::store::{ ConversationStore, ReadingStore };

const CHAT_FAILURE: &str = "An error occurred while processing your request";

#[derive(Clone)]
pub struct AppState {
    pub readings: ReadingStore,
    pub conversations: ConversationStore,
    pub insights: InsightService,
    pub broadcaster: Option<Broadcaster>,
}

impl AppState {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        client: Arc<dyn DeploymentClient>,
        insight_deployment: &str
    ) -> Self {
        let readings = ReadingStore::new(Arc::clone(&documents));
        let conversations = ConversationStore::new(documents);
        let insights = InsightService::new(
            client,
            readings.clone(),
            conversations.clone(),
            insight_deployment
        );
        Self { readings, conversations, insights, broadcaster: None }
    }

    pub fn with_broadcaster(mut self, broadcaster: Broadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }
}

/// Failures as the HTTP client sees them. Every handler error ends up here.
#[derive(Debug)]
pub enum ApiError {
    /// Reading endpoints answer with `{status: "error", message}`.
    Status(String),
    NoData(String),
    /// Chat failures are logged in full but reported generically.
    ChatFailed,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Status(message) =>
                (StatusCode::INTERNAL_SERVER_ERROR, Json(StatusResponse::error(message))).into_response(),
            ApiError::NoData(error) =>
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response(),
            ApiError::ChatFailed =>
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { error: CHAT_FAILURE.to_string() }),
                ).into_response(),
            ApiError::Internal(error) =>
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error })).into_response(),
        }
    }
}

fn internal(context: &str, e: impl std::fmt::Display) -> ApiError {
    error!("{}: {}", context, e);
    ApiError::Internal(e.to_string())
}

fn chat_failure(context: &str, e: InsightError) -> ApiError {
    match e {
        InsightError::NoData => ApiError::NoData(InsightError::NoData.to_string()),
        other => {
            error!("{}: {}", context, other);
            ApiError::ChatFailed
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/readings", get(get_readings_handler))
        .route("/api/addReading", post(add_reading_handler))
        .route("/api/clearAllReadings", delete(clear_all_readings_handler))
        .route("/api/clearchat", post(clear_chat_handler))
        .route("/api/generate_insights", post(generate_insights_handler))
        .route("/api/fetchhistory", get(fetch_history_handler))
        .route("/api/initial_chat", post(initial_chat_handler))
        .route("/api/chat", post(chat_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    state: AppState,
    args: &Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = args.server_addr.parse::<SocketAddr>()?;
    let app = build_router(state);

    if let Some((cert_path, key_path)) = args.tls_paths() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            cert_path,
            key_path
        ).await?;
        info!("Starting HTTPS API server on: https://{}", addr);
        axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e);
            e
        })?;
        info!("Starting HTTP API server on: http://{}", addr);
        axum::serve(listener, app.into_make_service()).await?;
    }

    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn get_readings_handler(State(state): State<AppState>) -> Result<Json<ReadingSet>, ApiError> {
    let readings = state.readings
        .get_all().await
        .map_err(|e| internal("Failed to read readings", e))?;
    Ok(Json(readings))
}

async fn add_reading_handler(
    State(state): State<AppState>,
    body: Bytes
) -> Result<Json<StatusResponse>, ApiError> {
    let (date, reading) = ReadingSubmission::from_slice(&body)
        .and_then(ReadingSubmission::into_parts)
        .map_err(|e| {
            error!("Rejected reading: {}", e);
            ApiError::Status(e.to_string())
        })?;

    state.readings.upsert(&date, reading.clone()).await.map_err(|e| {
        error!("Failed to store reading for {}: {}", date, e);
        ApiError::Status(e.to_string())
    })?;
    info!("Stored reading for {}", date);

    if let Some(broadcaster) = &state.broadcaster {
        broadcaster.publish(ServerMessage::NewReading {
            date,
            reading,
            timestamp: Utc::now().timestamp(),
        });
    }

    Ok(Json(StatusResponse::success("Reading added successfully")))
}

async fn clear_all_readings_handler(
    State(state): State<AppState>
) -> Result<Json<StatusResponse>, ApiError> {
    let cleared = match state.readings.clear().await {
        Ok(()) => state.conversations.clear().await,
        Err(e) => Err(e),
    };
    cleared.map_err(|e| {
        error!("Failed to clear readings: {}", e);
        ApiError::Status(e.to_string())
    })?;
    info!("Cleared all readings and conversation history");
    Ok(Json(StatusResponse::success("All readings cleared")))
}

async fn clear_chat_handler(
    State(state): State<AppState>
) -> Result<Json<MessageResponse>, ApiError> {
    state.conversations
        .clear().await
        .map_err(|e| internal("Failed to clear chat history", e))?;
    Ok(Json(MessageResponse { message: "Chat history cleared successfully".to_string() }))
}

async fn generate_insights_handler(
    State(state): State<AppState>
) -> Result<Json<InsightsResponse>, ApiError> {
    let response_text = state.insights
        .generate_insights().await
        .map_err(|e| internal("Failed to generate insights", e))?;
    Ok(Json(InsightsResponse { response_text }))
}

async fn fetch_history_handler(
    State(state): State<AppState>
) -> Result<Json<HistoryResponse>, ApiError> {
    let conversations = state.conversations
        .get_all().await
        .map_err(|e| internal("Failed to read chat history", e))?;
    Ok(Json(HistoryResponse { conversations }))
}

async fn initial_chat_handler(
    State(state): State<AppState>
) -> Result<Json<ChatResponse>, ApiError> {
    let outcome = state.insights
        .initial_greeting().await
        .map_err(|e| chat_failure("Initial chat failed", e))?;
    Ok(Json(ChatResponse { message: outcome.reply, conversations: outcome.conversations }))
}

async fn chat_handler(
    State(state): State<AppState>,
    body: Bytes
) -> Result<Json<ChatResponse>, ApiError> {
    let request: ChatRequest = serde_json::from_slice(&body).map_err(|e| {
        error!("Malformed chat request: {}", e);
        ApiError::ChatFailed
    })?;
    let outcome = state.insights
        .chat(&request.message).await
        .map_err(|e| chat_failure("Chat failed", e))?;
    Ok(Json(ChatResponse { message: outcome.reply, conversations: outcome.conversations }))
}
