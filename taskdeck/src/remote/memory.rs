//! In-process remote store.
//!
//! Keeps collections in memory, assigns time-ordered ids and fans a full
//! snapshot out to every live subscriber after each write. Tests drive the
//! edge cases through the control methods: one-shot failure injection,
//! held delivery (snapshots queue until released) and hand-crafted
//! snapshots. The CLI opens it with a JSON file so state survives between
//! invocations.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use taskdeck_proto::value::{Document, Record};

use super::{
    CollectionPath, RemoteError, RemoteStore, SnapshotEvent, SnapshotSender, SnapshotStream,
    Subscription, SubscriptionHandle,
};

/// Store operation, used to target failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// [`RemoteStore::subscribe`].
    Subscribe,
    /// [`RemoteStore::get_all`].
    GetAll,
    /// [`RemoteStore::add`].
    Add,
    /// [`RemoteStore::update`].
    Update,
    /// [`RemoteStore::delete`].
    Delete,
}

type Collection = BTreeMap<String, Record>;
type Collections = BTreeMap<String, Collection>;

struct Subscriber {
    id: u64,
    path: String,
    tx: SnapshotSender,
    cancelled: Arc<AtomicBool>,
}

impl Subscriber {
    fn is_live(&self) -> bool {
        !self.cancelled.load(Ordering::Acquire) && !self.tx.is_closed()
    }
}

#[derive(Default)]
struct Inner {
    collections: Collections,
    subscribers: Vec<Subscriber>,
    next_subscription: u64,
    failures: HashMap<Operation, RemoteError>,
    held: bool,
    queued: Vec<(u64, SnapshotEvent)>,
}

impl Inner {
    fn documents(&self, path: &str) -> Vec<Document> {
        self.collections
            .get(path)
            .map(|docs| {
                docs.iter()
                    .map(|(id, record)| Document::new(id.clone(), record.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn take_failure(&mut self, op: Operation) -> Result<(), RemoteError> {
        self.failures.remove(&op).map_or(Ok(()), Err)
    }

    /// Sends (or queues, while held) an event to one subscriber.
    fn deliver(&mut self, subscriber: u64, event: SnapshotEvent) {
        if self.held {
            self.queued.push((subscriber, event));
            return;
        }
        if let Some(sub) = self.subscribers.iter().find(|s| s.id == subscriber) {
            send_event(sub, event);
        }
    }

    /// Delivers the current listing of `path` to each live subscriber.
    fn fan_out(&mut self, path: &str) {
        self.subscribers.retain(Subscriber::is_live);
        let docs = self.documents(path);
        let targets: Vec<u64> = self
            .subscribers
            .iter()
            .filter(|s| s.path == path)
            .map(|s| s.id)
            .collect();
        for id in targets {
            self.deliver(id, SnapshotEvent::Snapshot(docs.clone()));
        }
    }
}

fn send_event(sub: &Subscriber, event: SnapshotEvent) {
    if !sub.is_live() {
        return;
    }
    if sub.tx.send(Some(event)).is_err() {
        tracing::debug!(subscription = sub.id, path = %sub.path, "subscriber gone");
    }
}

/// In-memory [`RemoteStore`] with snapshot fan-out.
pub struct InMemoryRemote {
    inner: Mutex<Inner>,
    file: Option<PathBuf>,
}

impl InMemoryRemote {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            file: None,
        }
    }

    /// Opens a store persisted to a JSON file.
    ///
    /// A missing file starts an empty store; the file is created on the
    /// first write.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Backend`] if the file exists but cannot be
    /// read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RemoteError> {
        let path = path.into();
        let collections = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<Collections>(&text).map_err(|e| {
                RemoteError::Backend(format!("corrupt store file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Collections::new(),
            Err(e) => {
                return Err(RemoteError::Backend(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        tracing::debug!(path = %path.display(), collections = collections.len(), "opened store file");
        Ok(Self {
            inner: Mutex::new(Inner {
                collections,
                ..Inner::default()
            }),
            file: Some(path),
        })
    }

    /// Path of the backing file, if any.
    #[must_use]
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Makes the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: Operation, error: RemoteError) {
        self.inner.lock().failures.insert(op, error);
    }

    /// Queues snapshot deliveries instead of sending them.
    pub fn hold_delivery(&self) {
        self.inner.lock().held = true;
    }

    /// Sends every queued delivery, in order, and resumes direct delivery.
    ///
    /// Deliveries to subscriptions cancelled in the meantime are discarded.
    pub fn release_delivery(&self) {
        let mut inner = self.inner.lock();
        inner.held = false;
        let queued = std::mem::take(&mut inner.queued);
        for (id, event) in queued {
            inner.deliver(id, event);
        }
    }

    /// Number of deliveries waiting for [`release_delivery`](Self::release_delivery).
    #[must_use]
    pub fn queued_deliveries(&self) -> usize {
        self.inner.lock().queued.len()
    }

    /// Sends an arbitrary snapshot to every live subscriber of `path`.
    pub fn inject_snapshot(&self, path: &CollectionPath, docs: Vec<Document>) {
        self.broadcast(path, &SnapshotEvent::Snapshot(docs));
    }

    /// Fails every live subscription on `path`.
    pub fn fail_subscriptions(&self, path: &CollectionPath, error: RemoteError) {
        self.broadcast(path, &SnapshotEvent::Failed(error));
    }

    /// Number of live subscriptions on `path`.
    #[must_use]
    pub fn subscriber_count(&self, path: &CollectionPath) -> usize {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(Subscriber::is_live);
        inner
            .subscribers
            .iter()
            .filter(|s| s.path == path.as_str())
            .count()
    }

    /// Returns the raw record stored under `path`/`id`.
    #[must_use]
    pub fn record(&self, path: &CollectionPath, id: &str) -> Option<Record> {
        self.inner
            .lock()
            .collections
            .get(path.as_str())
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Writes a record under a caller-chosen id, bypassing id assignment.
    ///
    /// Used to seed documents in shapes the client never writes itself.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Backend`] if the backing file cannot be written.
    pub fn seed(&self, path: &CollectionPath, id: &str, record: Record) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock();
        self.commit(&mut inner, path, |docs| {
            docs.insert(id.to_string(), record);
            Ok(())
        })
    }

    /// Applies `change` to one collection, persists, then notifies
    /// subscribers.
    ///
    /// If the change or the file write fails, the collection is restored
    /// and nobody is notified.
    fn commit<T>(
        &self,
        inner: &mut Inner,
        path: &CollectionPath,
        change: impl FnOnce(&mut Collection) -> Result<T, RemoteError>,
    ) -> Result<T, RemoteError> {
        let key = path.as_str();
        let existed = inner.collections.contains_key(key);
        let backup = if self.file.is_some() {
            inner.collections.get(key).cloned()
        } else {
            None
        };

        let result = change(inner.collections.entry(key.to_string()).or_default());
        let result = result.and_then(|out| self.persist(inner).map(|()| out));
        match result {
            Ok(out) => {
                inner.fan_out(key);
                Ok(out)
            }
            Err(e) => {
                match backup {
                    Some(docs) => {
                        inner.collections.insert(key.to_string(), docs);
                    }
                    None if !existed => {
                        inner.collections.remove(key);
                    }
                    // Without a file only `change` can fail, and it fails
                    // before mutating anything.
                    None => {}
                }
                tracing::warn!(%path, error = %e, "write rejected");
                Err(e)
            }
        }
    }

    fn broadcast(&self, path: &CollectionPath, event: &SnapshotEvent) {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(Subscriber::is_live);
        let targets: Vec<u64> = inner
            .subscribers
            .iter()
            .filter(|s| s.path == path.as_str())
            .map(|s| s.id)
            .collect();
        for id in targets {
            inner.deliver(id, event.clone());
        }
    }

    fn persist(&self, inner: &Inner) -> Result<(), RemoteError> {
        let Some(path) = &self.file else {
            return Ok(());
        };
        let text = serde_json::to_string_pretty(&inner.collections)
            .map_err(|e| RemoteError::Backend(format!("failed to encode store: {e}")))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RemoteError::Backend(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        std::fs::write(path, text)
            .map_err(|e| RemoteError::Backend(format!("failed to write {}: {e}", path.display())))
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteStore for InMemoryRemote {
    async fn subscribe(&self, path: &CollectionPath) -> Result<Subscription, RemoteError> {
        let mut inner = self.inner.lock();
        inner.take_failure(Operation::Subscribe)?;

        inner.next_subscription += 1;
        let id = inner.next_subscription;
        let (tx, events) = SnapshotStream::channel();
        let (handle, cancelled) = SubscriptionHandle::new(id);
        inner.subscribers.push(Subscriber {
            id,
            path: path.as_str().to_string(),
            tx,
            cancelled,
        });

        let initial = inner.documents(path.as_str());
        inner.deliver(id, SnapshotEvent::Snapshot(initial));
        tracing::debug!(subscription = id, %path, "subscribed");
        Ok(Subscription { events, handle })
    }

    async fn get_all(&self, path: &CollectionPath) -> Result<Vec<Document>, RemoteError> {
        let mut inner = self.inner.lock();
        inner.take_failure(Operation::GetAll)?;
        Ok(inner.documents(path.as_str()))
    }

    async fn add(&self, path: &CollectionPath, record: Record) -> Result<String, RemoteError> {
        let mut inner = self.inner.lock();
        inner.take_failure(Operation::Add)?;

        let id = uuid::Uuid::now_v7().simple().to_string();
        self.commit(&mut inner, path, |docs| {
            docs.insert(id.clone(), record);
            Ok(())
        })?;
        Ok(id)
    }

    async fn update(
        &self,
        path: &CollectionPath,
        id: &str,
        patch: Record,
    ) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock();
        inner.take_failure(Operation::Update)?;

        self.commit(&mut inner, path, |docs| {
            let record = docs
                .get_mut(id)
                .ok_or_else(|| RemoteError::NotFound(format!("{path}/{id}")))?;
            record.extend(patch);
            Ok(())
        })
    }

    async fn delete(&self, path: &CollectionPath, id: &str) -> Result<(), RemoteError> {
        let mut inner = self.inner.lock();
        inner.take_failure(Operation::Delete)?;

        let exists = inner
            .collections
            .get(path.as_str())
            .is_some_and(|docs| docs.contains_key(id));
        if !exists {
            return Ok(());
        }
        self.commit(&mut inner, path, |docs| {
            docs.remove(id);
            Ok(())
        })
    }
}
