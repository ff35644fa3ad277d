//! Per-connection WebSocket loop.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::{ClientMessage, ServerMessage};
use crate::AppState;

/// Handle an established WebSocket connection.
///
/// Outgoing messages funnel through one channel: state notifications from
/// the engine, and replies to whatever the client sent.
pub async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    tracing::info!("WebSocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text.into())).await {
                        tracing::warn!("Failed to send WebSocket message: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize WebSocket message: {}", e);
                }
            }
        }
    });

    let mut changes = state.engine.subscribe();
    let notify_tx = tx.clone();
    let notify_task = tokio::spawn(async move {
        // Current state first, then every change after it.
        loop {
            let summary = changes.borrow_and_update().clone();
            if notify_tx
                .send(ServerMessage::StateChanged { state: summary })
                .is_err()
            {
                break;
            }
            if changes.changed().await.is_err() {
                break;
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => process_message(&text, &state, &tx),
            Ok(Message::Binary(_)) => {
                tracing::warn!("Binary messages not supported");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                tracing::debug!("WebSocket close frame received");
                break;
            }
            Err(e) => {
                tracing::warn!("WebSocket error: {}", e);
                break;
            }
        }
    }

    notify_task.abort();
    send_task.abort();

    tracing::info!("WebSocket client disconnected");
}

fn process_message(text: &str, state: &AppState, tx: &mpsc::UnboundedSender<ServerMessage>) {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            let _ = tx.send(ServerMessage::error(
                format!("Invalid message format: {}", e),
                None,
            ));
            return;
        }
    };

    match client_msg {
        ClientMessage::Ping => {
            let _ = tx.send(ServerMessage::Pong);
        }
        ClientMessage::Cancel => {
            let was_running = state.scheduler.cancel_current_round();
            let _ = tx.send(ServerMessage::Cancelled { was_running });
        }
        ClientMessage::Sync { request_id } => {
            // The round keeps running if the socket goes away.
            let scheduler = state.scheduler.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let reply = match scheduler.trigger_manual_sync().await {
                    Ok(report) => ServerMessage::SyncResult { report, request_id },
                    Err(e) => ServerMessage::error(e.to_string(), request_id),
                };
                let _ = tx.send(reply);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use crate::routes::app;
    use crate::scheduler::SyncScheduler;
    use crate::testing::{raw, seeded_engine, ScriptedRemote};
    use crate::AppState;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn connect(remote: Arc<ScriptedRemote>) -> (Client, AppState) {
        let (engine, _, _) = seeded_engine().await;
        let scheduler = SyncScheduler::new(engine.clone(), remote, 5, Duration::from_secs(60));
        let state = AppState { engine, scheduler };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = app(state.clone());
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

        let (client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        (client, state)
    }

    async fn send(client: &mut Client, message: &str) {
        client
            .send(WsMessage::Text(message.to_string().into()))
            .await
            .unwrap();
    }

    async fn next_message(client: &mut Client) -> Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("no message within 5s")
                .expect("socket closed")
                .unwrap();
            if let WsMessage::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    /// Skip messages until one of type `kind` arrives.
    async fn next_of(client: &mut Client, kind: &str) -> Value {
        loop {
            let message = next_message(client).await;
            if message["type"] == kind {
                return message;
            }
        }
    }

    #[tokio::test]
    async fn sends_state_then_answers_ping_and_cancel() {
        let (mut client, state) = connect(Arc::new(ScriptedRemote::new())).await;

        let first = next_message(&mut client).await;
        assert_eq!(first["type"], "state_changed");
        assert_eq!(first["state"]["records"], 3);
        assert_eq!(first["state"]["syncing"], false);

        send(&mut client, r#"{"type": "ping"}"#).await;
        assert_eq!(next_message(&mut client).await, json!({"type": "pong"}));

        send(&mut client, r#"{"type": "cancel"}"#).await;
        assert_eq!(
            next_message(&mut client).await,
            json!({"type": "cancelled", "was_running": false})
        );

        send(&mut client, "not json").await;
        let error = next_message(&mut client).await;
        assert_eq!(error["type"], "error");
        assert!(error["message"]
            .as_str()
            .unwrap()
            .starts_with("Invalid message format"));

        state
            .engine
            .add_local_record("Know thyself", "Wisdom")
            .await
            .unwrap();
        let changed = next_of(&mut client, "state_changed").await;
        assert_eq!(changed["state"]["records"], 4);
    }

    #[tokio::test]
    async fn sync_request_gets_report_and_state_updates() {
        let remote = Arc::new(ScriptedRemote::new());
        remote.script_fetch(Ok(vec![raw("1", "Wisdom", "Know thyself")]));
        let (mut client, _state) = connect(remote.clone()).await;
        next_of(&mut client, "state_changed").await;

        send(&mut client, r#"{"type": "sync", "request_id": "r1"}"#).await;

        let mut report = None;
        let mut settled = false;
        while report.is_none() || !settled {
            let message = next_message(&mut client).await;
            match message["type"].as_str() {
                Some("sync_result") => report = Some(message),
                Some("state_changed") => {
                    settled = message["state"]["records"] == 4
                        && message["state"]["syncing"] == false;
                }
                other => panic!("unexpected message type {other:?}"),
            }
        }

        let report = report.unwrap();
        assert_eq!(report["request_id"], "r1");
        assert_eq!(report["report"]["outcome"]["status"], "completed");
        assert_eq!(report["report"]["pushed"], 3);
        assert_eq!(report["report"]["fetched"], 1);
        assert_eq!(remote.pushed().len(), 3);
    }
}
