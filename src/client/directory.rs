//! Directory facade: cache, change subscription, query and selection in one
//! place, the way a browsing UI consumes them.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use super::cache::{
    CacheEvent, InvalidationReason, LoadState, MemberCache, RefreshOutcome, Snapshot,
};
use super::gateway::HttpMemberGateway;
use super::listener::{
    ChangeFeed, ChangeListener, Subscription, SubscriptionStatus, WsChangeFeed,
};
use super::query::{project_indices, MemberQuery};
use super::selection::Selection;
use super::view::{DetailView, MemberCard, MemberDetail};
use crate::config::Config;
use crate::errors::DirectoryError;
use crate::models::Member;

/// Filtered view over one snapshot. Keeps the snapshot alive so the view stays
/// consistent even if the cache moves on.
#[derive(Debug, Clone)]
pub struct Projection {
    snapshot: Snapshot,
    indices: Vec<usize>,
}

impl Projection {
    pub fn new(snapshot: Snapshot, query: &MemberQuery) -> Self {
        let indices = if query.is_identity() {
            (0..snapshot.len()).collect()
        } else {
            project_indices(&snapshot, query)
        };
        Self { snapshot, indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> + '_ {
        self.indices.iter().map(move |&i| &self.snapshot[i])
    }

    /// The snapshot this projection was taken from.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

pub struct Directory {
    cache: MemberCache,
    subscription: Subscription,
    query: MemberQuery,
    selection: Selection,
}

impl Directory {
    /// Start browsing `cache`: subscribe to `feed` when there is one and kick
    /// off the initial load.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(cache: MemberCache, feed: Option<Arc<dyn ChangeFeed>>) -> Self {
        let subscription = match feed {
            Some(feed) => ChangeListener::subscribe(feed, cache.invalidator()),
            None => Subscription::unavailable(&DirectoryError::SubscriptionUnavailable(
                "no change feed configured".to_string(),
            )),
        };
        cache.invalidator().request(InvalidationReason::Initial);

        Self {
            cache,
            subscription,
            query: MemberQuery::default(),
            selection: Selection::new(),
        }
    }

    /// Open a directory against the HTTP API and websocket feed in `config`.
    pub fn connect(config: &Config) -> Result<Self, DirectoryError> {
        let gateway = HttpMemberGateway::from_config(config)?;
        info!(url = %gateway.members_url(), "Opening member directory");

        let feed = WsChangeFeed::from_config(config).ok().map(|feed| {
            info!(url = %feed.url(), "Subscribing to member changes");
            Arc::new(feed) as Arc<dyn ChangeFeed>
        });
        Ok(Self::open(MemberCache::new(Arc::new(gateway)), feed))
    }

    pub fn cache(&self) -> &MemberCache {
        &self.cache
    }

    pub fn query(&self) -> &MemberQuery {
        &self.query
    }

    pub fn set_search_text(&mut self, text: impl Into<String>) {
        self.query.text = text.into();
    }

    pub fn set_role_filter(&mut self, role: impl Into<String>) {
        self.query.role = Some(role.into());
    }

    pub fn clear_role_filter(&mut self) {
        self.query.role = None;
    }

    /// Current snapshot filtered by the current query.
    pub fn visible(&self) -> Projection {
        Projection::new(self.cache.snapshot(), &self.query)
    }

    pub fn cards(&self) -> Vec<MemberCard> {
        self.visible().iter().map(MemberCard::from_member).collect()
    }

    pub fn select(&mut self, id: impl Into<String>) {
        self.selection.select(id);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// The selected member as of the current snapshot.
    pub fn selected(&self) -> Option<Member> {
        self.selection.current(&self.cache.snapshot()).cloned()
    }

    pub fn detail(&self) -> DetailView {
        let Some(id) = self.selection.selected_id() else {
            return DetailView::Closed;
        };
        match self.selection.current(&self.cache.snapshot()) {
            Some(member) => DetailView::Open(Box::new(MemberDetail::from_member(member))),
            None => DetailView::Missing { id: id.to_string() },
        }
    }

    /// Manual retry: refetch now and wait for the outcome.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.cache.invalidate().await
    }

    pub fn load_state(&self) -> LoadState {
        self.cache.load_state()
    }

    pub fn events(&self) -> broadcast::Receiver<CacheEvent> {
        self.cache.events()
    }

    /// The event that produced the current load state, for observers that
    /// subscribe after it was broadcast. `None` while the first fetch runs.
    pub fn current_event(&self) -> Option<CacheEvent> {
        match self.cache.load_state() {
            LoadState::Pending => None,
            LoadState::Ready { .. } => Some(CacheEvent::Replaced {
                generation: self.cache.generation(),
                len: self.cache.snapshot().len(),
            }),
            LoadState::Failed { error } => Some(CacheEvent::RefreshFailed { error }),
        }
    }

    pub fn subscription_status(&self) -> SubscriptionStatus {
        self.subscription.status()
    }

    /// Stop live updates. The cached snapshot stays readable.
    pub fn close(&mut self) {
        self.subscription.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::gateway::MemberSource;
    use crate::client::listener::{ChangeSignal, ChangeStream};
    use crate::models::fixtures::member;
    use async_trait::async_trait;
    use futures::StreamExt;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Source serving whatever the test last stored, or an error when unset.
    struct StoreSource {
        members: Mutex<Option<Vec<Member>>>,
    }

    impl StoreSource {
        fn new(members: Vec<Member>) -> Arc<Self> {
            Arc::new(Self {
                members: Mutex::new(Some(members)),
            })
        }

        fn set(&self, members: Option<Vec<Member>>) {
            *self.members.lock() = members;
        }
    }

    #[async_trait]
    impl MemberSource for StoreSource {
        async fn fetch_all(&self) -> Result<Vec<Member>, DirectoryError> {
            self.members.lock().clone().ok_or_else(|| DirectoryError::Server {
                status: 503,
                message: "Service Unavailable".to_string(),
            })
        }
    }

    struct ChannelFeed {
        rx: Mutex<Option<mpsc::UnboundedReceiver<ChangeSignal>>>,
    }

    #[async_trait]
    impl ChangeFeed for ChannelFeed {
        async fn connect(&self) -> Result<ChangeStream, DirectoryError> {
            let rx = self.rx.lock().take().ok_or_else(|| {
                DirectoryError::SubscriptionUnavailable("already connected".to_string())
            })?;
            Ok(futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|signal| (Ok(signal), rx))
            })
            .boxed())
        }
    }

    fn channel_feed() -> (Arc<dyn ChangeFeed>, mpsc::UnboundedSender<ChangeSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let feed: Arc<dyn ChangeFeed> = Arc::new(ChannelFeed {
            rx: Mutex::new(Some(rx)),
        });
        (feed, tx)
    }

    fn ada_and_bo() -> Vec<Member> {
        vec![
            member("1", "Ada", "Lead", &["Rust"]),
            member("2", "Bo", "Member", &[]),
        ]
    }

    async fn wait_for_generation(directory: &Directory, generation: u64) {
        for _ in 0..200 {
            if directory.cache().generation() >= generation {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "generation {} never reached, at {}",
            generation,
            directory.cache().generation()
        );
    }

    async fn wait_for_live(directory: &Directory) {
        for _ in 0..200 {
            if directory.subscription_status() == SubscriptionStatus::Live {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("subscription never went live");
    }

    fn visible_ids(directory: &Directory) -> Vec<String> {
        directory.visible().iter().map(|m| m.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_open_loads_and_filters() {
        let mut directory = Directory::open(MemberCache::new(StoreSource::new(ada_and_bo())), None);
        wait_for_generation(&directory, 1).await;

        assert_eq!(visible_ids(&directory), vec!["1", "2"]);

        directory.set_search_text("rust");
        assert_eq!(visible_ids(&directory), vec!["1"]);

        directory.set_search_text("");
        directory.set_role_filter("Member");
        assert_eq!(visible_ids(&directory), vec!["2"]);

        directory.clear_role_filter();
        directory.set_search_text("zz");
        assert!(directory.visible().is_empty());
        assert!(directory.cards().is_empty());
    }

    #[test]
    fn test_identity_projection_covers_snapshot() {
        let snapshot: Snapshot = Arc::from(ada_and_bo());

        let all = Projection::new(Arc::clone(&snapshot), &MemberQuery::default());
        assert_eq!(all.len(), 2);
        for (projected, original) in all.iter().zip(snapshot.iter()) {
            assert!(std::ptr::eq(projected, original));
        }

        let leads = Projection::new(snapshot, &MemberQuery::role("Lead"));
        let ids: Vec<&str> = leads.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1"]);
    }

    #[tokio::test]
    async fn test_missing_feed_degrades_but_loads() {
        let directory = Directory::open(MemberCache::new(StoreSource::new(ada_and_bo())), None);
        wait_for_generation(&directory, 1).await;

        assert!(matches!(
            directory.subscription_status(),
            SubscriptionStatus::Degraded { .. }
        ));
        assert_eq!(directory.cards().len(), 2);
        assert!(matches!(directory.load_state(), LoadState::Ready { .. }));
    }

    #[tokio::test]
    async fn test_change_signal_refetches_and_selection_follows() {
        let source = StoreSource::new(ada_and_bo());
        let (feed, signals) = channel_feed();
        let mut directory = Directory::open(MemberCache::new(source.clone()), Some(feed));
        wait_for_generation(&directory, 1).await;
        wait_for_live(&directory).await;

        directory.select("1");
        assert!(matches!(directory.detail(), DetailView::Open(ref d) if d.name == "Ada"));

        let mut promoted = member("1", "Ada", "Alumni", &["Rust"]);
        promoted.status = Some("Alumni".to_string());
        source.set(Some(vec![promoted, member("2", "Bo", "Member", &[])]));
        signals.send(ChangeSignal).unwrap();
        wait_for_generation(&directory, 2).await;

        match directory.detail() {
            DetailView::Open(detail) => {
                assert_eq!(detail.role, "Alumni");
                assert_eq!(detail.status, "Alumni");
                assert_eq!(detail.role_color, "#F59E0B");
            }
            other => panic!("unexpected detail: {other:?}"),
        }

        source.set(Some(vec![member("2", "Bo", "Member", &[])]));
        signals.send(ChangeSignal).unwrap();
        wait_for_generation(&directory, 3).await;

        assert_eq!(
            directory.detail(),
            DetailView::Missing {
                id: "1".to_string()
            }
        );
        assert!(directory.selection().is_open());
        assert!(directory.selected().is_none());

        directory.clear_selection();
        assert_eq!(directory.detail(), DetailView::Closed);
    }

    #[tokio::test]
    async fn test_refresh_retries_after_failure() {
        let source = StoreSource::new(ada_and_bo());
        source.set(None);
        let directory = Directory::open(MemberCache::new(source.clone()), None);

        for _ in 0..200 {
            if directory.load_state().is_failed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(directory.load_state().is_failed());
        assert!(directory.visible().is_empty());

        source.set(Some(ada_and_bo()));
        let snapshot = directory.refresh().await.unwrap();

        assert_eq!(snapshot.len(), 2);
        assert!(matches!(directory.load_state(), LoadState::Ready { .. }));
        assert_eq!(directory.cards().len(), 2);
    }

    #[tokio::test]
    async fn test_late_observer_sees_initial_failure() {
        let source = StoreSource::new(vec![]);
        source.set(None);
        let directory = Directory::open(MemberCache::new(source.clone()), None);

        for _ in 0..200 {
            if directory.load_state().is_failed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let mut events = directory.events();

        match directory.current_event() {
            Some(CacheEvent::RefreshFailed { error }) => {
                assert!(matches!(*error, DirectoryError::Server { status: 503, .. }));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(events.try_recv().is_err());

        source.set(Some(ada_and_bo()));
        directory.refresh().await.unwrap();
        assert!(matches!(
            directory.current_event(),
            Some(CacheEvent::Replaced { generation: 1, len: 2 })
        ));
    }

    #[tokio::test]
    async fn test_projection_outlives_replacement() {
        let source = StoreSource::new(ada_and_bo());
        let directory = Directory::open(MemberCache::new(source.clone()), None);
        wait_for_generation(&directory, 1).await;

        let before = directory.visible();
        source.set(Some(vec![]));
        directory.refresh().await.unwrap();

        assert_eq!(before.len(), 2);
        assert_eq!(before.iter().next().unwrap().name, "Ada");
        assert!(directory.visible().is_empty());
    }

    #[tokio::test]
    async fn test_close_stops_subscription() {
        let (feed, _signals) = channel_feed();
        let mut directory = Directory::open(MemberCache::new(StoreSource::new(vec![])), Some(feed));
        wait_for_live(&directory).await;

        directory.close();
        directory.close();

        assert_eq!(directory.subscription_status(), SubscriptionStatus::Closed);
    }
}
