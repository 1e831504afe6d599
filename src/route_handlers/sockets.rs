use axum::{
  extract::{
    ws::{self, CloseFrame, Message, Utf8Bytes, WebSocket},
    Query, WebSocketUpgrade,
  },
  response::IntoResponse,
  Extension,
};
use futures::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use crate::engine::projections::{OwnerRow, PlayerRow};
use crate::feed::{ChangeFeedAdapter, FeedFilter, FeedItem};
use crate::midwares::app_state::{AppError, AppState, RequestContext};
use crate::store::ChangeEvent;

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum WsRequest {
  Stop,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum WsResponse {
  Snapshot { players: Vec<PlayerRow>, owners: Vec<OwnerRow> },
  Change { change: ChangeEvent },
}

#[derive(Debug, Deserialize)]
pub struct FeedParams {
  /// Narrow player events to one row; owner events always flow.
  pub player_id: Option<i64>,
}

pub async fn ws_handler(
  ws: WebSocketUpgrade,
  Query(params): Query<FeedParams>,
  Extension(state): Extension<AppState>,
  Extension(ctx): Extension<RequestContext>,
) -> impl IntoResponse {
  tracing::info!(remote_ip = %ctx.remote_ip, player_id = ?params.player_id, "feed client connected");

  ws.on_upgrade(move |socket| handle_socket(socket, state, params.player_id, ctx.remote_ip))
}

async fn handle_socket(socket: WebSocket, state: AppState, player_id: Option<i64>, who: String) {
  let (mut sender, mut receiver) = socket.split();

  // Subscribe before the snapshot reads so no commit can land between the
  // snapshot and the first delivered event.
  let mut feed = ChangeFeedAdapter::new(state.store.subscribe(), FeedFilter { player_id });

  match snapshot_message(&state, player_id).await {
    Ok(msg) => {
      if sender.send(msg).await.is_err() {
        return;
      }
    }
    Err(e) => {
      tracing::error!(%who, error = ?e, "initial snapshot failed");
      graceful_ws_closure(sender, ws::close_code::ERROR, "snapshot fetch failed").await;
      return;
    }
  }

  loop {
    tokio::select! {
      msg = receiver.next() => {
        match msg {
          Some(Ok(Message::Text(t))) => {
            match serde_json::from_str::<WsRequest>(t.as_str()) {
              Ok(WsRequest::Stop) => {
                tracing::info!(%who, "client requested stop");
                graceful_ws_closure(sender, ws::close_code::NORMAL, "client requested to stop the feed").await;
                break;
              }
              Err(e) => {
                tracing::warn!(%who, error = %e, "unparseable client message ignored");
              }
            }
          }
          Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
            tracing::info!(%who, "client went away");
            break;
          }
          Some(Ok(_)) => {} // Binary, Ping or Pong
        }
      }

      item = feed.next() => {
        match item {
          Some(FeedItem::Event(change)) => {
            let payload = match serde_json::to_string(&WsResponse::Change { change }) {
              Ok(p) => p,
              Err(e) => {
                tracing::error!(%who, error = %e, "serializing change event failed");
                break;
              }
            };
            if sender.send(Message::text(payload)).await.is_err() {
              break;
            }
          }
          Some(FeedItem::Resync) => {
            // missed events: replace the client's state wholesale
            match snapshot_message(&state, player_id).await {
              Ok(msg) => {
                if sender.send(msg).await.is_err() {
                  break;
                }
              }
              Err(e) => {
                tracing::error!(%who, error = ?e, "resync snapshot failed");
                graceful_ws_closure(sender, ws::close_code::ERROR, "resync failed").await;
                break;
              }
            }
          }
          None => {
            graceful_ws_closure(sender, ws::close_code::AWAY, "change feed closed").await;
            break;
          }
        }
      }
    }
  }

  // feed drops here, releasing the subscription slot on every exit path
  tracing::info!(%who, "websocket context destroyed");
}

async fn snapshot_message(state: &AppState, player_id: Option<i64>) -> Result<Message, AppError> {
  let players = state.store.list_players().await?;
  let owners = state.store.list_owners().await?;

  let rows: Vec<PlayerRow> = players
    .iter()
    .filter(|p| player_id.map_or(true, |id| p.id == id))
    .map(|p| PlayerRow::project(p, &owners, &state.image_base))
    .collect();
  let owner_rows: Vec<OwnerRow> = owners.iter().map(OwnerRow::project).collect();

  let payload = serde_json::to_string(&WsResponse::Snapshot { players: rows, owners: owner_rows })
    .map_err(|e| AppError::InternalError(format!("serializing snapshot failed: {}", e)))?;

  Ok(Message::text(payload))
}

// helper to close the Websocket gracefully
async fn graceful_ws_closure(mut sender: SplitSink<WebSocket, Message>, code: u16, reason_str: &'static str) {
  if let Err(e) = sender
    .send(Message::Close(Some(CloseFrame { code, reason: Utf8Bytes::from_static(reason_str) })))
    .await
  {
    tracing::warn!(error = %e, "error sending close frame");
  }
  if let Err(e) = sender.flush().await {
    tracing::warn!(error = %e, "error flushing sender");
  }
}
