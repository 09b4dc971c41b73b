//! WebSocket upgrade + message loop.
//!
//! One generation may run per socket. It runs on its own task so the loop
//! keeps reading: a `cancel` message or a disconnect aborts the task, which
//! drops the engine's `JoinSet` and every in-flight model call with it.
//! Storing happens in the loop after the task joins, so an abort never
//! leaves a partly saved batch behind.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::GenerationOutcome;
use crate::error::ServiceError;
use crate::logic::{run_request, store_outcome};
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::state::AppState;

struct InFlight {
  request_id: Option<String>,
  save: bool,
  handle: JoinHandle<Result<GenerationOutcome, ServiceError>>,
}

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "questgen_backend", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "questgen_backend", "WebSocket connected");
  let mut inflight: Option<InFlight> = None;

  loop {
    tokio::select! {
      incoming = socket.recv() => {
        let msg = match incoming {
          Some(Ok(msg)) => msg,
          _ => break,
        };
        match msg {
          Message::Text(txt) => {
            let reply = match serde_json::from_str::<ClientWsMessage>(&txt) {
              Ok(incoming) => {
                debug!(target: "questgen_backend", "WS received: {:?}", &incoming);
                handle_client_ws(incoming, &state, &mut inflight)
              }
              Err(e) => ServerWsMessage::Error { request_id: None, message: format!("Invalid JSON: {}", e) },
            };
            if !send(&mut socket, &reply).await { break; }
          }
          Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
          Message::Close(_) => break,
          _ => {}
        }
      }

      joined = async {
        match inflight.as_mut() {
          Some(job) => (&mut job.handle).await,
          None => std::future::pending().await,
        }
      } => {
        let (request_id, save) = match inflight.take() {
          Some(job) => (job.request_id, job.save),
          None => (None, false),
        };
        let reply = match joined {
          Ok(Ok(outcome)) => match store_outcome(&state, outcome, save).await {
            Ok(result) => ServerWsMessage::Generated { request_id, result },
            Err(e) => ServerWsMessage::Error { request_id, message: e.to_string() },
          },
          Ok(Err(e)) => ServerWsMessage::Error { request_id, message: e.to_string() },
          Err(e) => {
            error!(target: "questgen_backend", error = %e, "WS generation task failed");
            ServerWsMessage::Error { request_id, message: "generation task failed".into() }
          }
        };
        if !send(&mut socket, &reply).await { break; }
      }
    }
  }

  if let Some(InFlight { request_id, handle, .. }) = inflight.take() {
    handle.abort();
    info!(target: "questgen_backend", ?request_id, "Generation aborted on disconnect");
  }
  info!(target: "questgen_backend", "WebSocket disconnected");
}

/// Dispatch one client message. Generation is started here and answered later
/// from the loop; everything else is answered immediately.
fn handle_client_ws(msg: ClientWsMessage, state: &Arc<AppState>, inflight: &mut Option<InFlight>) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::Generate { request_id, request } => {
      if inflight.is_some() {
        return ServerWsMessage::Error { request_id, message: "a generation is already running on this connection".into() };
      }
      let save = request.save;
      let state = state.clone();
      let handle = tokio::spawn(async move { run_request(&state, &request).await });
      info!(target: "generation", ?request_id, "WS generation started");
      *inflight = Some(InFlight { request_id: request_id.clone(), save, handle });
      ServerWsMessage::Accepted { request_id }
    }

    ClientWsMessage::Cancel => match inflight.take() {
      Some(InFlight { request_id, handle, .. }) => {
        handle.abort();
        warn!(target: "generation", ?request_id, "WS generation cancelled by client");
        ServerWsMessage::Cancelled { request_id }
      }
      None => ServerWsMessage::Error { request_id: None, message: "nothing to cancel".into() },
    },
  }
}

async fn send(socket: &mut WebSocket, msg: &ServerWsMessage) -> bool {
  let out = serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  });
  if let Err(e) = socket.send(Message::Text(out)).await {
    error!(target: "questgen_backend", error = %e, "WS send error");
    return false;
  }
  true
}
