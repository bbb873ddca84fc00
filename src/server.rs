use std::time::Duration;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::relay::Relay;

#[derive(Clone)]
struct AppState {
    relay: Relay,
    ping_interval: Duration,
}

/// The relay's only surface: a WebSocket endpoint at `/`.
pub fn router(relay: Relay, ping_interval: Duration) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .with_state(AppState {
            relay,
            ping_interval,
        })
}

pub async fn serve(
    listener: TcpListener,
    relay: Relay,
    ping_interval: Duration,
) -> Result<(), RelayError> {
    axum::serve(listener, router(relay, ping_interval))
        .await
        .map_err(RelayError::Serve)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let conn = state.relay.connect(tx);

    // Writer: forwarded frames plus keepalive pings.
    let ping_every = state.ping_interval;
    let send_task = tokio::spawn(async move {
        let mut ping_interval = time::interval_at(time::Instant::now() + ping_every, ping_every);
        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let Some(text) = frame else { break };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                // Errors are already logged; the connection stays open.
                let _ = state.relay.dispatch(&conn, text.as_str()).await;
            }
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => debug!("peer {}: ignoring binary frame", conn.id()),
            Ok(_) => {}
            Err(err) => {
                warn!("peer {}: socket error: {}", conn.id(), err);
                break;
            }
        }
    }

    state.relay.disconnect(&conn).await;
    send_task.abort();
}
