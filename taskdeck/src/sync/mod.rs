//! Live-synchronized collections.
//!
//! A [`SyncedCollection`] mirrors one remote collection. It owns at most
//! one subscription at a time; every snapshot replaces the items wholesale.
//! Each subscribe or unsubscribe bumps a generation counter, and a snapshot
//! is applied only if the generation it was requested under is still
//! current, so a late delivery for a previous user can never repopulate the
//! collection.
//!
//! Local edits made after a successful remote write are tagged with the
//! [`Epoch`] captured before the write, which also names the collection the
//! write went to. If the collection was re-targeted while the write was in
//! flight, or mirrors a different collection, the edit is dropped. Edited
//! ids stay *pending* until the next applied snapshot, which is
//! authoritative.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use taskdeck_proto::FromDocument;
use taskdeck_proto::value::Document;

use crate::remote::{
    CollectionPath, RemoteError, RemoteStore, SnapshotEvent, SnapshotStream, SubscriptionHandle,
};

/// Observable state of a synchronized collection.
#[derive(Debug, Clone)]
pub struct SyncState<T> {
    /// Current items, in snapshot order.
    pub items: Vec<T>,
    /// `true` between subscribing and the first snapshot.
    pub loading: bool,
    /// Human-readable description of the last failure, if any.
    pub error: Option<String>,
    /// `true` while a subscription listener is running.
    pub subscribed: bool,
    /// Collection the items were loaded from.
    pub source: Option<CollectionPath>,
    /// Ids edited locally since the last applied snapshot.
    pub pending: BTreeSet<String>,
    /// Bumped on every subscribe/unsubscribe.
    pub generation: u64,
}

impl<T> Default for SyncState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: false,
            error: None,
            subscribed: false,
            source: None,
            pending: BTreeSet::new(),
            generation: 0,
        }
    }
}

/// Generation token captured before a remote write to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Epoch {
    generation: u64,
    target: CollectionPath,
}

impl Epoch {
    /// An edit is admitted if nothing was re-targeted since the capture and
    /// the items are unbound or mirror the written collection.
    fn admits<T>(&self, state: &SyncState<T>) -> bool {
        state.generation == self.generation
            && state.source.as_ref().is_none_or(|source| *source == self.target)
    }
}

struct Listener {
    handle: SubscriptionHandle,
    task: JoinHandle<()>,
}

impl Listener {
    fn stop(self) {
        self.handle.cancel();
        self.task.abort();
    }
}

/// A client-side mirror of one remote collection.
pub struct SyncedCollection<T> {
    label: &'static str,
    state: Arc<watch::Sender<SyncState<T>>>,
    listener: Mutex<Option<Listener>>,
}

impl<T: FromDocument> SyncedCollection<T> {
    /// Creates an empty, unsubscribed collection. `label` names it in logs.
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            label,
            state: Arc::new(state),
            listener: Mutex::new(None),
        }
    }

    /// Subscribes to `path`, replacing any previous subscription.
    ///
    /// Items loaded from a different path are cleared immediately; the
    /// collection stays in the loading state until the first snapshot.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the subscription cannot be opened. The
    /// error is also recorded in the state.
    pub async fn subscribe<R: RemoteStore>(
        &self,
        remote: &R,
        path: &CollectionPath,
    ) -> Result<(), RemoteError> {
        let generation = {
            let mut slot = self.listener.lock();
            if let Some(old) = slot.take() {
                old.stop();
            }
            let mut generation = 0;
            self.state.send_modify(|s| {
                s.generation += 1;
                generation = s.generation;
                s.loading = true;
                s.error = None;
                s.subscribed = false;
                if s.source.as_ref() != Some(path) {
                    s.items.clear();
                    s.pending.clear();
                }
                s.source = Some(path.clone());
            });
            generation
        };

        let subscription = match remote.subscribe(path).await {
            Ok(sub) => sub,
            Err(e) => {
                record_failure(&self.state, generation, &e, self.label);
                return Err(e);
            }
        };

        let mut slot = self.listener.lock();
        let current = self.state.send_if_modified(|s| {
            if s.generation != generation {
                return false;
            }
            s.subscribed = true;
            true
        });
        if !current {
            tracing::debug!(collection = self.label, %path, "subscription superseded before it opened");
            subscription.handle.cancel();
            return Ok(());
        }
        let task = tokio::spawn(listen(
            Arc::clone(&self.state),
            generation,
            subscription.events,
            self.label,
        ));
        *slot = Some(Listener {
            handle: subscription.handle,
            task,
        });
        tracing::info!(collection = self.label, %path, generation, "subscribed");
        Ok(())
    }

    /// Cancels the live subscription (if any) and clears the items.
    pub fn unsubscribe(&self) {
        let mut slot = self.listener.lock();
        if let Some(old) = slot.take() {
            old.stop();
        }
        self.state.send_modify(|s| {
            s.generation += 1;
            s.items.clear();
            s.pending.clear();
            s.loading = false;
            s.subscribed = false;
            s.source = None;
        });
        tracing::debug!(collection = self.label, "unsubscribed");
    }

    /// Reads the collection once.
    ///
    /// The result replaces the items only when no live subscription is
    /// running; a live subscription stays authoritative.
    ///
    /// # Errors
    ///
    /// Returns the store's error; it is also recorded in the state.
    pub async fn fetch<R: RemoteStore>(
        &self,
        remote: &R,
        path: &CollectionPath,
    ) -> Result<Vec<T>, RemoteError> {
        let generation = self.state.borrow().generation;
        match remote.get_all(path).await {
            Ok(docs) => {
                let items = normalize::<T>(&docs, self.label);
                self.state.send_if_modified(|s| {
                    if s.generation != generation || s.subscribed {
                        return false;
                    }
                    s.items.clone_from(&items);
                    s.pending.clear();
                    s.source = Some(path.clone());
                    s.error = None;
                    true
                });
                Ok(items)
            }
            Err(e) => {
                self.record_error(format!("failed to fetch {path}: {e}"));
                Err(e)
            }
        }
    }

    /// Captures the current generation for a write to `target`, to be
    /// passed to the local edit methods once the write succeeds.
    #[must_use]
    pub fn epoch(&self, target: &CollectionPath) -> Epoch {
        Epoch {
            generation: self.state.borrow().generation,
            target: target.clone(),
        }
    }

    /// Inserts `item`, or replaces the item with the same id.
    ///
    /// An unbound collection becomes bound to the epoch's target. Returns
    /// `false` if the edit is not admitted.
    pub fn upsert(&self, epoch: &Epoch, item: T) -> bool {
        let admitted = self.state.send_if_modified(|s| {
            if !epoch.admits(s) {
                return false;
            }
            s.source.get_or_insert_with(|| epoch.target.clone());
            let id = item.document_id().to_string();
            match s.items.iter_mut().find(|t| t.document_id() == id) {
                Some(existing) => *existing = item,
                None => s.items.push(item),
            }
            s.pending.insert(id);
            true
        });
        if !admitted {
            tracing::debug!(collection = self.label, target = %epoch.target, "local insert dropped");
        }
        admitted
    }

    /// Applies `edit` to the item with id `id` and returns the result.
    ///
    /// Returns `None` if the item is absent or the edit is not admitted.
    pub fn modify(&self, epoch: &Epoch, id: &str, edit: impl FnOnce(&mut T)) -> Option<T> {
        let mut updated = None;
        self.state.send_if_modified(|s| {
            if !epoch.admits(s) {
                return false;
            }
            let Some(item) = s.items.iter_mut().find(|t| t.document_id() == id) else {
                return false;
            };
            edit(item);
            updated = Some(item.clone());
            s.pending.insert(id.to_string());
            true
        });
        updated
    }

    /// Removes the item with id `id`. Returns `true` if it was present.
    pub fn remove(&self, epoch: &Epoch, id: &str) -> bool {
        self.remove_where(epoch, |t| t.document_id() == id) > 0
    }

    /// Removes every item matching `predicate` and returns how many went.
    pub fn remove_where(&self, epoch: &Epoch, predicate: impl Fn(&T) -> bool) -> usize {
        let mut removed = 0;
        self.state.send_if_modified(|s| {
            if !epoch.admits(s) {
                return false;
            }
            let mut gone = Vec::new();
            s.items.retain(|t| {
                if predicate(t) {
                    gone.push(t.document_id().to_string());
                    false
                } else {
                    true
                }
            });
            removed = gone.len();
            s.pending.extend(gone);
            removed > 0
        });
        removed
    }

    /// Returns a clone of the item with id `id`.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<T> {
        self.find_by(|t| t.document_id() == id)
    }

    /// Returns a clone of the first item matching `predicate`.
    #[must_use]
    pub fn find_by(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.state.borrow().items.iter().find(|t| predicate(t)).cloned()
    }

    /// Returns a clone of the current items.
    #[must_use]
    pub fn items(&self) -> Vec<T> {
        self.state.borrow().items.clone()
    }

    /// Returns a clone of the whole state.
    #[must_use]
    pub fn state(&self) -> SyncState<T> {
        self.state.borrow().clone()
    }

    /// Returns a receiver that observes every state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<SyncState<T>> {
        self.state.subscribe()
    }

    /// Records a failure message.
    pub fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(collection = self.label, error = %message, "operation failed");
        self.state.send_modify(|s| s.error = Some(message));
    }

    /// Clears the recorded failure.
    pub fn clear_error(&self) {
        self.state.send_if_modified(|s| s.error.take().is_some());
    }

    /// Last recorded failure.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    /// `true` while waiting for the first snapshot.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// `true` while a subscription listener is running.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.state.borrow().subscribed
    }

    /// `true` once every local edit has been confirmed by a snapshot.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.state.borrow().pending.is_empty()
    }
}

impl<T> Drop for SyncedCollection<T> {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.stop();
        }
    }
}

async fn listen<T: FromDocument>(
    state: Arc<watch::Sender<SyncState<T>>>,
    generation: u64,
    mut events: SnapshotStream,
    label: &'static str,
) {
    while let Some(event) = events.recv().await {
        match event {
            SnapshotEvent::Snapshot(docs) => {
                if !apply_snapshot(&state, generation, &docs, label) {
                    tracing::debug!(collection = label, generation, "discarded stale snapshot");
                }
            }
            SnapshotEvent::Failed(err) => {
                record_failure(&state, generation, &err, label);
                break;
            }
        }
    }
}

/// Replaces the items with a snapshot if `generation` is still current.
fn apply_snapshot<T: FromDocument>(
    state: &watch::Sender<SyncState<T>>,
    generation: u64,
    docs: &[Document],
    label: &'static str,
) -> bool {
    let items = normalize::<T>(docs, label);
    state.send_if_modified(|s| {
        if s.generation != generation {
            return false;
        }
        s.items = items;
        s.pending.clear();
        s.loading = false;
        s.error = None;
        true
    })
}

fn record_failure<T>(
    state: &watch::Sender<SyncState<T>>,
    generation: u64,
    err: &RemoteError,
    label: &'static str,
) {
    let applied = state.send_if_modified(|s| {
        if s.generation != generation {
            return false;
        }
        s.loading = false;
        s.subscribed = false;
        s.error = Some(format!("sync failed: {err}"));
        true
    });
    if applied {
        tracing::error!(collection = label, error = %err, "subscription failed");
    }
}

/// Normalizes raw documents, skipping (and logging) malformed ones.
fn normalize<T: FromDocument>(docs: &[Document], label: &'static str) -> Vec<T> {
    let now = Utc::now();
    docs.iter()
        .filter_map(|doc| match T::from_document(doc, now) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(collection = label, error = %e, "skipping malformed document");
                None
            }
        })
        .collect()
}
