//! Client core: fetching, caching and browsing the member collection.

pub mod cache;
pub mod directory;
pub mod gateway;
pub mod listener;
pub mod query;
pub mod selection;
pub mod view;

pub use cache::{
    CacheEvent, InvalidationReason, Invalidator, LoadState, MemberCache, PendingRefresh,
    RefreshOutcome, Snapshot,
};
pub use directory::{Directory, Projection};
pub use gateway::{HttpMemberGateway, MemberSource};
pub use listener::{
    ChangeFeed, ChangeListener, ChangeSignal, ChangeStream, Subscription, SubscriptionStatus,
    WsChangeFeed,
};
pub use query::{project, project_indices, MemberQuery};
pub use selection::Selection;
pub use view::{DetailView, MemberCard, MemberDetail, FALLBACK_AVATAR};
