use std::fmt;
use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use echo_db::Database;
use echo_db::models::ThreadQuery;
use echo_types::events::{ChangeEvent, GatewayEvent};
use echo_types::view::{FeedFilter, FeedOrder, derive_thread_view};

/// Threads delivered per vault feed projection.
const FEED_LIMIT: u32 = 50;

/// What a projection watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// `viewer` is a participant key, not a raw device token.
    Thread { thread_id: Uuid, viewer: Option<String> },
    Vault { vault_id: Uuid, include_private: bool },
}

impl Scope {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            Self::Thread { thread_id, .. } => event.affects_thread(*thread_id),
            Self::Vault { vault_id, .. } => event.affects_vault(*vault_id),
        }
    }

    /// Recompute the scope's view from the full current row set.
    fn render(&self, db: &Database) -> Result<GatewayEvent> {
        match self {
            Self::Thread { thread_id, viewer } => {
                if db.get_thread(*thread_id)?.is_none() {
                    bail!("Unknown thread {}", thread_id);
                }
                let rows = db.load_thread_rows(*thread_id)?;
                Ok(GatewayEvent::ThreadView {
                    thread_id: *thread_id,
                    view: derive_thread_view(&rows, viewer.as_deref()),
                })
            }
            Self::Vault {
                vault_id,
                include_private,
            } => {
                if db.get_vault(*vault_id)?.is_none() {
                    bail!("Unknown vault {}", vault_id);
                }
                let entries = db.load_feed(&ThreadQuery {
                    vault_id: Some(*vault_id),
                    filter: FeedFilter {
                        include_private: *include_private,
                        explicit: None,
                    },
                    order: FeedOrder::Activity,
                    offset: 0,
                    limit: FEED_LIMIT,
                })?;
                Ok(GatewayEvent::VaultFeed {
                    vault_id: *vault_id,
                    entries,
                })
            }
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thread { thread_id, .. } => write!(f, "thread {}", thread_id),
            Self::Vault { vault_id, .. } => write!(f, "vault {}", vault_id),
        }
    }
}

/// Turns store change notifications into recomputed views.
#[derive(Clone)]
pub struct Projector {
    db: Arc<Database>,
}

impl Projector {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Render a scope once.
    pub async fn render(&self, scope: &Scope) -> Result<GatewayEvent> {
        let db = self.db.clone();
        let scope = scope.clone();
        tokio::task::spawn_blocking(move || scope.render(&db)).await?
    }

    /// Deliver the current view of `scope`, then a fresh one after every
    /// change that touches it. Runs until `tx` closes or the task is aborted.
    /// An unknown scope yields a single `Error` event.
    pub fn project(&self, scope: Scope, tx: mpsc::UnboundedSender<GatewayEvent>) -> JoinHandle<()> {
        // Subscribe before the first render so no change slips between them.
        let mut changes = self.db.subscribe();
        let projector = self.clone();

        tokio::spawn(async move {
            match projector.render(&scope).await {
                Ok(event) => {
                    if tx.send(event).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx.send(GatewayEvent::Error {
                        message: e.to_string(),
                    });
                    return;
                }
            }

            loop {
                match changes.recv().await {
                    Ok(event) if scope.matches(&event) => {}
                    Ok(_) => continue,
                    Err(RecvError::Lagged(n)) => {
                        debug!("Projection of {} lagged by {} changes", scope, n);
                    }
                    Err(RecvError::Closed) => break,
                }

                // A burst of changes needs one recompute
                loop {
                    match changes.try_recv() {
                        Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                        Err(_) => break,
                    }
                }

                match projector.render(&scope).await {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to project {}: {:#}", scope, e),
                }
            }

            debug!("Projection of {} stopped", scope);
        })
    }
}
