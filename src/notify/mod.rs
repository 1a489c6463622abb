//! Change notification fan-out for the member collection.
//!
//! A watcher task polls the store revision and broadcasts one [`ChangeEvent`]
//! each time it moves. Websocket clients subscribe to the hub.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::db::Repository;

/// Notification that the member collection changed.
///
/// Clients treat it as an opaque signal; the revision is informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    MembersChanged { revision: i64 },
}

/// Broadcast hub shared by the watcher and all websocket connections.
#[derive(Clone)]
pub struct ChangeHub {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeHub {
    /// Create a hub buffering up to `capacity` events per slow receiver.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to every connected client.
    pub fn publish(&self, event: ChangeEvent) {
        match self.tx.send(event) {
            Ok(receivers) => debug!(receivers, "Broadcast member change"),
            Err(_) => debug!("No receivers for member change"),
        }
    }

    /// Subscribe to future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Number of connected receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Shortest poll period the watcher accepts.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Poll the store revision and publish a change whenever it moves.
///
/// `interval` is clamped to [`MIN_POLL_INTERVAL`].
pub fn spawn_revision_watcher(
    repo: Arc<Repository>,
    hub: ChangeHub,
    interval: Duration,
) -> JoinHandle<()> {
    let interval = interval.max(MIN_POLL_INTERVAL);
    tokio::spawn(async move {
        let mut last_seen = match repo.revision_id().await {
            Ok(revision) => Some(revision),
            Err(e) => {
                warn!(error = %e, "Could not read initial member revision");
                None
            }
        };
        info!(revision = ?last_seen, poll_ms = interval.as_millis() as u64, "Member change watcher started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match repo.revision_id().await {
                Ok(revision) if Some(revision) != last_seen => {
                    if last_seen.is_some() {
                        hub.publish(ChangeEvent::MembersChanged { revision });
                    }
                    last_seen = Some(revision);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Failed to poll member revision"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database;
    use tempfile::TempDir;

    #[test]
    fn test_event_wire_format() {
        let json = serde_json::to_value(ChangeEvent::MembersChanged { revision: 7 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "members_changed", "revision": 7}));
    }

    #[tokio::test]
    async fn test_publish_without_receivers_is_fine() {
        let hub = ChangeHub::new(4);
        hub.publish(ChangeEvent::MembersChanged { revision: 1 });
        assert_eq!(hub.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_watcher_publishes_on_revision_change() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        let repo = Arc::new(Repository::new(pool));
        let hub = ChangeHub::new(8);
        let mut rx = hub.subscribe();

        let watcher = spawn_revision_watcher(repo.clone(), hub.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(60)).await;

        sqlx::query("INSERT INTO members (id, name) VALUES ('a', 'Ada')")
            .execute(repo.pool())
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher should publish")
            .unwrap();
        let expected = repo.revision_id().await.unwrap();
        assert_eq!(event, ChangeEvent::MembersChanged { revision: expected });

        watcher.abort();
    }

    #[tokio::test]
    async fn test_watcher_with_zero_interval_keeps_running() {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        let repo = Arc::new(Repository::new(pool));
        let hub = ChangeHub::new(8);
        let mut rx = hub.subscribe();

        let watcher = spawn_revision_watcher(repo.clone(), hub.clone(), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!watcher.is_finished());

        sqlx::query("INSERT INTO members (id, name) VALUES ('a', 'Ada')")
            .execute(repo.pool())
            .await
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher should publish")
            .unwrap();
        assert!(matches!(event, ChangeEvent::MembersChanged { .. }));

        watcher.abort();
    }
}
