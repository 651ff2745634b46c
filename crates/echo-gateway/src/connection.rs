use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use echo_types::events::{GatewayCommand, GatewayEvent};
use echo_types::identity::participant_key;

use crate::projector::{Projector, Scope};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_PONGS: u8 = 2;

/// Live projections per connection.
const MAX_SUBSCRIPTIONS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SubscriptionKey {
    Thread(Uuid),
    Vault(Uuid),
}

/// A connection's running projections. Dropping it stops them all.
#[derive(Default)]
struct Subscriptions {
    active: HashMap<SubscriptionKey, JoinHandle<()>>,
}

impl Subscriptions {
    fn len(&self) -> usize {
        self.active.len()
    }

    fn contains(&self, key: SubscriptionKey) -> bool {
        self.active.contains_key(&key)
    }

    /// Re-subscribing to a scope replaces its projection.
    fn insert(&mut self, key: SubscriptionKey, handle: JoinHandle<()>) {
        if let Some(old) = self.active.insert(key, handle) {
            old.abort();
        }
    }

    fn remove(&mut self, key: SubscriptionKey) {
        if let Some(handle) = self.active.remove(&key) {
            handle.abort();
        }
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        for handle in self.active.values() {
            handle.abort();
        }
    }
}

/// Serve one gateway client until it disconnects or stops answering pings.
pub async fn handle_connection(socket: WebSocket, projector: Projector) {
    let connection_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();

    info!("Gateway connection {} opened", connection_id);

    if send_event(&mut sender, &GatewayEvent::Ready { connection_id })
        .await
        .is_err()
    {
        return;
    }

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<GatewayEvent>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Projection output + heartbeat -> client
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_pongs: u8 = 0;

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_pongs = 0;
                    } else {
                        missed_pongs += 1;
                        if missed_pongs >= MAX_MISSED_PONGS {
                            warn!(
                                "Gateway connection {} missed {} pongs, dropping",
                                connection_id, missed_pongs
                            );
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Client commands -> projections
    let mut recv_task = tokio::spawn(async move {
        let mut subscriptions = Subscriptions::default();

        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&projector, cmd, &mut subscriptions, &event_tx),
                    Err(e) => {
                        warn!(
                            "Gateway connection {} bad command: {} -- raw: {}",
                            connection_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                        let _ = event_tx.send(GatewayEvent::Error {
                            message: format!("Bad command: {}", e),
                        });
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("Gateway connection {} closed", connection_id);
}

fn handle_command(
    projector: &Projector,
    cmd: GatewayCommand,
    subscriptions: &mut Subscriptions,
    events: &mpsc::UnboundedSender<GatewayEvent>,
) {
    let (key, scope) = match cmd {
        GatewayCommand::SubscribeThread {
            thread_id,
            viewer_token,
        } => (
            SubscriptionKey::Thread(thread_id),
            Scope::Thread {
                thread_id,
                viewer: viewer_token.as_deref().map(participant_key),
            },
        ),
        GatewayCommand::SubscribeVault {
            vault_id,
            include_private,
        } => (
            SubscriptionKey::Vault(vault_id),
            Scope::Vault {
                vault_id,
                include_private,
            },
        ),
        GatewayCommand::UnsubscribeThread { thread_id } => {
            subscriptions.remove(SubscriptionKey::Thread(thread_id));
            return;
        }
        GatewayCommand::UnsubscribeVault { vault_id } => {
            subscriptions.remove(SubscriptionKey::Vault(vault_id));
            return;
        }
    };

    if !subscriptions.contains(key) && subscriptions.len() >= MAX_SUBSCRIPTIONS {
        let _ = events.send(GatewayEvent::Error {
            message: format!("Subscription limit of {} reached", MAX_SUBSCRIPTIONS),
        });
        return;
    }

    debug!("Subscribing to {}", scope);
    subscriptions.insert(key, projector.project(scope, events.clone()));
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), axum::Error> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to serialize gateway event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse() {
        let thread_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"SubscribeThread","data":{{"thread_id":"{}","viewer_token":"abc"}}}}"#,
            thread_id
        );
        match serde_json::from_str::<GatewayCommand>(&raw).unwrap() {
            GatewayCommand::SubscribeThread {
                thread_id: id,
                viewer_token,
            } => {
                assert_eq!(id, thread_id);
                assert_eq!(viewer_token.as_deref(), Some("abc"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let raw = format!(r#"{{"type":"SubscribeVault","data":{{"vault_id":"{}"}}}}"#, thread_id);
        assert!(matches!(
            serde_json::from_str::<GatewayCommand>(&raw).unwrap(),
            GatewayCommand::SubscribeVault {
                include_private: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn resubscribe_replaces_and_drop_aborts() {
        let first = tokio::spawn(std::future::pending::<()>());
        let second = tokio::spawn(std::future::pending::<()>());
        let first_abort = first.abort_handle();
        let second_abort = second.abort_handle();

        let key = SubscriptionKey::Thread(Uuid::new_v4());
        let mut subs = Subscriptions::default();
        subs.insert(key, first);
        subs.insert(key, second);
        assert_eq!(subs.len(), 1);

        settle(&first_abort).await;
        assert!(first_abort.is_finished());
        assert!(!second_abort.is_finished());

        drop(subs);
        settle(&second_abort).await;
        assert!(second_abort.is_finished());
    }

    async fn settle(handle: &tokio::task::AbortHandle) {
        for _ in 0..100 {
            if handle.is_finished() {
                return;
            }
            tokio::task::yield_now().await;
        }
    }
}
