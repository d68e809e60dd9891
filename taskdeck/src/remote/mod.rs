//! Remote document store abstraction.
//!
//! Defines the [`RemoteStore`] trait the synchronization layer talks to.
//! Concrete implementations include:
//! - [`memory::InMemoryRemote`]: in-process store with snapshot fan-out,
//!   failure injection and optional JSON file persistence
//!
//! A hosted backend plugs in by implementing the same trait.

pub mod memory;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;

use taskdeck_proto::UserId;
use taskdeck_proto::value::{Document, Record};

/// Path of a per-user collection (`users/{uid}/tasks`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// The user's task collection.
    #[must_use]
    pub fn tasks(user: &UserId) -> Self {
        Self(format!("users/{user}/tasks"))
    }

    /// The user's habit collection.
    #[must_use]
    pub fn habits(user: &UserId) -> Self {
        Self(format!("users/{user}/habits"))
    }

    /// The user's habit log collection.
    #[must_use]
    pub fn habit_logs(user: &UserId) -> Self {
        Self(format!("users/{user}/habitLogs"))
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The backend rejected the caller's credentials for this path.
    #[error("permission denied on {0}")]
    PermissionDenied(String),

    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The addressed document does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// A delivery on a live subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotEvent {
    /// Full point-in-time listing of the collection.
    Snapshot(Vec<Document>),
    /// The subscription failed; no further snapshots should be expected.
    Failed(RemoteError),
}

/// Owned cancellation token for a subscription.
///
/// Cancelling (or dropping) the handle tells the store to stop delivering.
/// Deliveries already in flight may still reach the receiver, so consumers
/// must not rely on the handle alone to discard late snapshots.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    /// Creates a handle and the shared flag the store side polls.
    #[must_use]
    pub fn new(id: u64) -> (Self, Arc<AtomicBool>) {
        let cancelled = Arc::new(AtomicBool::new(false));
        (
            Self {
                id,
                cancelled: Arc::clone(&cancelled),
            },
            cancelled,
        )
    }

    /// Store-assigned subscription id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Stops delivery. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Store side of a [`SnapshotStream`].
pub type SnapshotSender = watch::Sender<Option<SnapshotEvent>>;

/// Receiving side of a subscription.
///
/// Every delivery is a full listing of the collection, so only the newest
/// undelivered event is kept. A consumer that falls behind skips the
/// intermediate snapshots and always ends on the latest one.
#[derive(Debug)]
pub struct SnapshotStream {
    rx: watch::Receiver<Option<SnapshotEvent>>,
}

impl SnapshotStream {
    /// Creates a connected sender and stream with nothing delivered yet.
    #[must_use]
    pub fn channel() -> (SnapshotSender, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }

    /// Waits for the next undelivered event.
    ///
    /// Returns `None` once the store side is gone and the last event has
    /// been seen.
    pub async fn recv(&mut self) -> Option<SnapshotEvent> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }

    /// Returns the undelivered event, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<SnapshotEvent> {
        if self.rx.has_changed().unwrap_or(false) {
            self.rx.borrow_and_update().clone()
        } else {
            None
        }
    }
}

/// A live subscription: the event stream plus its disposable handle.
#[derive(Debug)]
pub struct Subscription {
    /// Snapshot deliveries; the newest one supersedes any unread one.
    pub events: SnapshotStream,
    /// Cancellation handle.
    pub handle: SubscriptionHandle,
}

/// Async document store with per-collection subscriptions.
///
/// Records are plain field maps; the store assigns document ids on
/// [`add`](RemoteStore::add). Implementations deliver a snapshot of the
/// whole collection to each live subscriber after every change, and one
/// initial snapshot right after subscribing.
pub trait RemoteStore: Send + Sync {
    /// Opens a live subscription to a collection.
    fn subscribe(
        &self,
        path: &CollectionPath,
    ) -> impl std::future::Future<Output = Result<Subscription, RemoteError>> + Send;

    /// Reads every document of a collection once.
    fn get_all(
        &self,
        path: &CollectionPath,
    ) -> impl std::future::Future<Output = Result<Vec<Document>, RemoteError>> + Send;

    /// Creates a document and returns its store-assigned id.
    fn add(
        &self,
        path: &CollectionPath,
        record: Record,
    ) -> impl std::future::Future<Output = Result<String, RemoteError>> + Send;

    /// Merges `patch` into an existing document.
    fn update(
        &self,
        path: &CollectionPath,
        id: &str,
        patch: Record,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;

    /// Deletes a document. Deleting a missing document succeeds.
    fn delete(
        &self,
        path: &CollectionPath,
        id: &str,
    ) -> impl std::future::Future<Output = Result<(), RemoteError>> + Send;
}
