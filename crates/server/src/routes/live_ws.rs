//! WebSocket binding of the live relay.
//!
//! Each socket is split: a writer task drains the connection's outbound
//! queue into the sink while this task feeds inbound text frames to the
//! relay. JSON text frames only.

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    Extension,
};
use futures::{SinkExt, StreamExt};

use crate::relay::{ConnectionManager, ServerMessage};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(relay): Extension<Arc<ConnectionManager>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, relay))
}

async fn handle_socket(socket: WebSocket, relay: Arc<ConnectionManager>) {
    let (mut sender, mut receiver) = socket.split();
    let connection = relay.connect();
    let conn = connection.id;
    let mut outbound = connection.outbound;

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if let Err(e) = send_msg(&mut sender, &msg).await {
                tracing::debug!("Dropping writer for {conn}: {e}");
                break;
            }
        }
    });

    while let Some(frame) = receiver.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!("Connection {conn} errored: {e}");
                break;
            }
        };
        match msg {
            Message::Text(t) => relay.handle_text(conn, t.as_str()).await,
            Message::Close(_) => break,
            _ => continue,
        }
    }

    relay.disconnect(conn).await;
    writer.abort();
}

async fn send_msg(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(msg)?;
    sender.send(Message::Text(json.into())).await?;
    Ok(())
}
