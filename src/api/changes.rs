//! Websocket change feed for the member collection.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::notify::{ChangeEvent, ChangeHub};
use crate::AppState;

/// GET /api/members/changes - Upgrade to a websocket streaming change events.
pub async fn member_changes(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let hub = state.changes.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Forward hub events to one client until either side goes away.
async fn handle_socket(socket: WebSocket, hub: ChangeHub) {
    info!("Change feed client connected");

    let (mut sender, mut receiver) = socket.split();
    let mut rx = hub.subscribe();

    // Client frames carry nothing; only watch for the close.
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "Change feed receive error");
                    break;
                }
            }
        }
    });

    loop {
        tokio::select! {
            result = rx.recv() => {
                let event = match result {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Change feed client lagged");
                        // Any event means "refetch", so one catch-up signal covers the gap.
                        ChangeEvent::MembersChanged { revision: -1 }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if let Err(e) = send_event(&mut sender, &event).await {
                    debug!(error = %e, "Failed to send change event, closing connection");
                    break;
                }
            }
            _ = &mut recv_task => break,
        }
    }

    recv_task.abort();
    let _ = sender.send(Message::Close(None)).await;
    info!("Change feed client disconnected");
}

async fn send_event(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    event: &ChangeEvent,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(axum::Error::new)?;
    sender.send(Message::Text(json.into())).await
}
