//! Change listener: turns change-feed traffic into invalidation requests.
//!
//! The listener never looks inside an event. Anything that arrives on the feed
//! means "the collection changed, refetch it".

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::cache::{InvalidationReason, Invalidator};
use crate::config::Config;
use crate::errors::DirectoryError;

/// One opaque "something changed" notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeSignal;

/// Stream of change signals; it ends when the feed closes.
pub type ChangeStream = BoxStream<'static, Result<ChangeSignal, DirectoryError>>;

/// A push channel scoped to the member collection.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn connect(&self) -> Result<ChangeStream, DirectoryError>;
}

/// Websocket change feed (`GET /api/members/changes`).
#[derive(Debug, Clone)]
pub struct WsChangeFeed {
    url: String,
}

impl WsChangeFeed {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Build the feed from configuration; fails when no feed URL is configured.
    pub fn from_config(config: &Config) -> Result<Self, DirectoryError> {
        config
            .feed_url
            .as_deref()
            .map(Self::new)
            .ok_or_else(|| {
                DirectoryError::SubscriptionUnavailable("no change feed URL configured".to_string())
            })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChangeFeed for WsChangeFeed {
    async fn connect(&self) -> Result<ChangeStream, DirectoryError> {
        let (stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| DirectoryError::SubscriptionUnavailable(e.to_string()))?;

        let signals = stream
            .take_while(|msg| futures::future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| {
                futures::future::ready(match msg {
                    Ok(Message::Text(_)) | Ok(Message::Binary(_)) => Some(Ok(ChangeSignal)),
                    Ok(_) => None,
                    Err(e) => Some(Err(DirectoryError::SubscriptionUnavailable(e.to_string()))),
                })
            });
        Ok(signals.boxed())
    }
}

/// Lifecycle of a [`Subscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// Channel setup in progress.
    Connecting,
    /// Receiving change events.
    Live,
    /// The channel could not be established; live updates are off.
    Degraded { reason: String },
    /// The feed closed or failed after being live.
    Ended { reason: String },
    /// Released by the consumer.
    Closed,
}

/// Handle to a running change subscription.
///
/// Dropping the handle releases the channel.
pub struct Subscription {
    task: Option<JoinHandle<()>>,
    status: Arc<Mutex<SubscriptionStatus>>,
}

impl Subscription {
    /// A subscription that never fires, for when no feed could be set up.
    pub fn unavailable(err: &DirectoryError) -> Self {
        warn!(error = %err, "Member change feed unavailable; continuing without live updates");
        Self {
            task: None,
            status: Arc::new(Mutex::new(SubscriptionStatus::Degraded {
                reason: err.message(),
            })),
        }
    }

    pub fn status(&self) -> SubscriptionStatus {
        self.status.lock().clone()
    }

    /// Release the channel. Calling it again does nothing.
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            *self.status.lock() = SubscriptionStatus::Closed;
            debug!("Member change subscription closed");
        }
    }
}

/// Record a task-side status change unless the consumer already closed the
/// subscription.
fn update_status(status: &Mutex<SubscriptionStatus>, next: SubscriptionStatus) {
    let mut current = status.lock();
    if *current != SubscriptionStatus::Closed {
        *current = next;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

/// Subscribes change feeds to a cache's invalidation entry point.
pub struct ChangeListener;

impl ChangeListener {
    /// Open `feed` and forward every event to `invalidator`.
    ///
    /// Must be called from within a Tokio runtime. Setup failures are logged and
    /// leave the subscription [`SubscriptionStatus::Degraded`]; they are never
    /// retried.
    pub fn subscribe(feed: Arc<dyn ChangeFeed>, invalidator: Invalidator) -> Subscription {
        let status = Arc::new(Mutex::new(SubscriptionStatus::Connecting));
        let task_status = Arc::clone(&status);

        let task = tokio::spawn(async move {
            let mut signals = match feed.connect().await {
                Ok(signals) => {
                    info!("Member change feed connected");
                    update_status(&task_status, SubscriptionStatus::Live);
                    signals
                }
                Err(e) => {
                    warn!(error = %e, "Member change feed unavailable; continuing without live updates");
                    update_status(
                        &task_status,
                        SubscriptionStatus::Degraded {
                            reason: e.message(),
                        },
                    );
                    return;
                }
            };

            let reason = loop {
                match signals.next().await {
                    Some(Ok(ChangeSignal)) => {
                        debug!("Member change signal received");
                        if !invalidator.request(InvalidationReason::ChangeFeed) {
                            break "cache dropped".to_string();
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Member change feed failed");
                        break e.message();
                    }
                    None => break "feed closed".to_string(),
                }
            };
            info!(%reason, "Member change feed ended; live updates stopped");
            update_status(&task_status, SubscriptionStatus::Ended { reason });
        });

        Subscription {
            task: Some(task),
            status,
        }
    }
}
