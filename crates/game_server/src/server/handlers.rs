//! Per-connection WebSocket handling.

use crate::{
    connection::ConnectionManager,
    dispatcher::Dispatcher,
    error::ServerError,
};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Handles a single client connection from handshake to close.
///
/// The socket is split: a writer task drains the connection's outbound
/// queue (and any control frames) into the sink while this task reads
/// frames and hands text to the dispatcher. When the read side ends the
/// dispatcher is told first, then the connection is unregistered.
///
/// # Arguments
///
/// * `stream` - The TCP stream for the connection
/// * `addr` - The remote address of the client
/// * `connection_manager` - Shared connection manager
/// * `dispatcher` - Event dispatcher that owns all game state
///
/// # Returns
///
/// `Ok(())` when the connection closed normally, or a `ServerError` if the
/// handshake failed.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    connection_manager: Arc<ConnectionManager>,
    dispatcher: Arc<Dispatcher>,
) -> Result<(), ServerError> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| ServerError::Network(format!("WebSocket handshake failed for {addr}: {e}")))?;

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (connection_id, mut outbound) = connection_manager.add_connection(addr);
    let (control_tx, mut control_rx) = mpsc::unbounded_channel::<Message>();

    dispatcher.on_connect(connection_id);
    info!(connection_id, %addr, "🔗 New connection");

    let writer = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                frame = outbound.recv() => match frame {
                    Some(text) => Message::text(text),
                    None => break,
                },
                control = control_rx.recv() => match control {
                    Some(message) => message,
                    None => break,
                },
            };
            if let Err(e) = ws_sender.send(message).await {
                debug!(connection_id, error = %e, "Writer stopped");
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                dispatcher.handle_text(connection_id, text.as_str()).await;
            }
            Ok(Message::Close(_)) => {
                info!(connection_id, "Connection requested close");
                break;
            }
            Ok(Message::Ping(data)) => {
                let _ = control_tx.send(Message::Pong(data));
            }
            Ok(Message::Pong(_)) => {}
            Err(e) => {
                error!(connection_id, error = %e, "WebSocket error");
                break;
            }
            _ => {
                warn!(connection_id, "Received unsupported message type");
            }
        }
    }

    dispatcher.on_disconnect(connection_id).await;
    connection_manager.remove_connection(connection_id);
    drop(control_tx);
    if let Err(e) = writer.await {
        debug!(connection_id, error = %e, "Writer task ended abnormally");
    }
    info!(connection_id, %addr, "👋 Connection closed");
    Ok(())
}
