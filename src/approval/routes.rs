//! WebSocket server + REST endpoints for the review queue.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use super::card::{ClientAction, WsMessage};
use super::queue::ReviewQueue;
use crate::model::ThreadId;

/// Build the Axum router with review WebSocket and REST routes.
pub fn review_routes(queue: Arc<ReviewQueue>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/reviews", get(list_reviews))
        .route("/api/reviews/{thread_id}", get(get_review))
        .route("/api/reviews/{thread_id}/reply", post(reply))
        .layer(CorsLayer::permissive())
        .with_state(queue)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "outreach-reviews"
    }))
}

// ── REST ────────────────────────────────────────────────────────────────

async fn list_reviews(State(queue): State<Arc<ReviewQueue>>) -> impl IntoResponse {
    Json(queue.open_reviews().await)
}

async fn get_review(
    State(queue): State<Arc<ReviewQueue>>,
    Path(thread_id): Path<String>,
) -> impl IntoResponse {
    match queue.get(&ThreadId::from(thread_id)).await {
        Some(card) => Json(card).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Deserialize)]
struct ReplyBody {
    text: String,
}

async fn reply(
    State(queue): State<Arc<ReviewQueue>>,
    Path(thread_id): Path<String>,
    Json(body): Json<ReplyBody>,
) -> impl IntoResponse {
    let thread_id = ThreadId::from(thread_id);
    if queue.submit_reply(&thread_id, &body.text).await {
        info!(thread_id = %thread_id, "Reply received via REST");
        (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({"status": "accepted"})),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "Thread not found or closed"})),
        )
    }
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(queue): State<Arc<ReviewQueue>>,
) -> impl IntoResponse {
    info!("WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, queue))
}

async fn send_sync(socket: &mut WebSocket, queue: &ReviewQueue) -> bool {
    let sync = WsMessage::ReviewsSync {
        cards: queue.open_reviews().await,
    };
    match serde_json::to_string(&sync) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(_) => true,
    }
}

async fn handle_socket(mut socket: WebSocket, queue: Arc<ReviewQueue>) {
    info!("WebSocket client connected");

    // Subscribe before the sync so nothing posted in between is missed
    let mut rx = queue.subscribe();

    if !send_sync(&mut socket, &queue).await {
        warn!("Failed to send initial sync, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if socket.send(Message::Text(json.into())).await.is_err() {
                                debug!("Client disconnected during send");
                                break;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind broadcast");
                        if !send_sync(&mut socket, &queue).await {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &queue).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

async fn handle_client_message(text: &str, queue: &ReviewQueue) {
    match serde_json::from_str::<ClientAction>(text) {
        Ok(ClientAction::Reply { thread_id, text }) => {
            if queue.submit_reply(&thread_id, &text).await {
                info!(thread_id = %thread_id, "Reply received via WS");
            } else {
                warn!(thread_id = %thread_id, "Reply dropped, thread not found or closed");
            }
        }
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized WS message from client");
        }
    }
}
