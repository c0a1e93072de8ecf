//! HTTP adapter for reading the journal and posting messages.
//!
//! - `GET /messages` returns everything flushed to the journal so far.
//! - `POST /post` takes `{"name", "room", "msg"}` and relays it to the room
//!   as if `name` had typed it.
//!
//! Runs on its own listener and stops when its token is cancelled.

use crate::journal::Journal;
use crate::network::protocol;
use crate::state::Registry;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const BAD_REQUEST_BODY: &str = "bad request body";

/// Shared handles for the HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub registry: Arc<Registry>,
    pub journal: Arc<Journal>,
}

/// A message posted over HTTP.
#[derive(Debug, Deserialize)]
struct PostedMessage {
    name: String,
    room: String,
    msg: String,
}

impl PostedMessage {
    fn is_complete(&self) -> bool {
        !self.name.is_empty() && !self.room.is_empty() && !self.msg.is_empty()
    }
}

/// Build the router.
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/messages", get(read_messages))
        .route("/post", post(post_message))
        .with_state(state)
}

/// Serve the router on `listener` until `stop` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: HttpState,
    stop: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { stop.cancelled().await })
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

/// Handler for GET /messages.
async fn read_messages(State(state): State<HttpState>) -> Response {
    match state.journal.snapshot().await {
        Ok(content) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html; charset=UTF-8")],
            content,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, code = e.error_code(), "Journal snapshot failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Handler for POST /post.
async fn post_message(State(state): State<HttpState>, body: Bytes) -> Response {
    let message = match serde_json::from_slice::<PostedMessage>(&body) {
        Ok(message) if message.is_complete() => message,
        Ok(_) => {
            debug!("Rejected post with empty field");
            return (StatusCode::BAD_REQUEST, BAD_REQUEST_BODY).into_response();
        }
        Err(e) => {
            debug!(error = %e, "Rejected unparsable post");
            return (StatusCode::BAD_REQUEST, BAD_REQUEST_BODY).into_response();
        }
    };

    let PostedMessage { name, room, msg } = message;
    // Not tied to the request, so a dropped client never cancels delivery.
    let cancel = CancellationToken::new();
    let payload = Bytes::from(protocol::chat_line(&name, &room, &msg));
    state.registry.broadcast(&cancel, &name, &room, payload).await;

    if let Err(e) = state
        .journal
        .append(protocol::journal_record(&name, &room, &msg))
        .await
    {
        warn!(name = %name, error = %e, code = e.error_code(), "Failed to journal posted message");
    }

    StatusCode::CREATED.into_response()
}
