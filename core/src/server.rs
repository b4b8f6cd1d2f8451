use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::chatbot::Chatbot;
use crate::setup;

const INDEX_HTML: &str = include_str!("ui.html");

#[derive(Clone)]
pub struct AppState {
    pub chatbot: Arc<Mutex<Chatbot>>,
    pub db_path: PathBuf,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    response: String,
    response_time: f64,
}

fn error_response(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/chat", post(chat_handler))
        .route("/api/setup", post(setup_handler))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// `POST /api/chat` with `{"message": ".."}`. The chat turn blocks on model
/// calls, so it runs on the blocking pool.
pub async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "rejected chat request body");
            return bad_message();
        }
    };
    let message = match body.get("message").and_then(Value::as_str) {
        Some(m) if !m.trim().is_empty() => m.to_string(),
        _ => return bad_message(),
    };

    let start = Instant::now();
    let chatbot = Arc::clone(&state.chatbot);
    let joined = tokio::task::spawn_blocking(move || {
        let mut bot = chatbot.lock().map_err(|e| format!("lock error: {e}"))?;
        Ok::<_, String>(bot.chat(&message))
    })
    .await;

    let answer = match joined {
        Ok(Ok(answer)) => answer,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "chat handler failed");
            return internal_error();
        }
        Err(e) => {
            tracing::error!(error = %e, "chat task panicked");
            return internal_error();
        }
    };

    let secs = start.elapsed().as_secs_f64();
    Json(ChatResponse {
        response: format!("{answer} ({secs:.2}s)"),
        response_time: secs,
    })
    .into_response()
}

/// `POST /api/setup`: create the schema and seed the user row.
pub async fn setup_handler(State(state): State<AppState>) -> Response {
    let db_path = state.db_path.clone();
    let joined = tokio::task::spawn_blocking(move || {
        setup::prepare_database(&db_path).map(|_| ()).map_err(|e| format!("{e:#}"))
    })
    .await;

    let result = joined.unwrap_or_else(|e| Err(format!("setup task panicked: {e}")));
    match result {
        Ok(()) => Json(json!({
            "message": "Database setup completed successfully",
            "success": true,
        }))
        .into_response(),
        Err(details) => {
            tracing::error!(error = %details, "database setup failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Failed to setup database", "details": details }),
            )
        }
    }
}

fn bad_message() -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        json!({ "error": "Message is required and must be a string" }),
    )
}

fn internal_error() -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({ "error": "Internal server error" }),
    )
}

/// Serve the chat UI until `ct` is cancelled.
pub async fn serve(state: AppState, bind_addr: &str, ct: CancellationToken) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "serving chat UI over HTTP");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            ct.cancelled().await;
            tracing::info!("shutting down HTTP server");
        })
        .await?;
    Ok(())
}
