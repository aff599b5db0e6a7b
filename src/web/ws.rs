//! WebSocket handler feeding the subscriber registry.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::AppState;

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Own one live connection: register it, forward queued frames to the
/// socket, and deregister from the single exit path. Close, protocol
/// error, and failed send all funnel into the same removal, so the
/// registry never double-removes.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let id = state.registry.add(tx).await;

    let (mut sink, mut stream) = socket.split();
    let mut outbound = UnboundedReceiverStream::new(rx);

    loop {
        tokio::select! {
            frame = outbound.next() => {
                match frame {
                    Some(frame) => {
                        if sink.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Inbound frames carry no meaning on this channel.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.registry.remove(id).await;
}
