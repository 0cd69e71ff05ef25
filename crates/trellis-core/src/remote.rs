//! Contract of the backend that owns the canonical task and note rows.
//!
//! The sync stores only ever talk to a [`RemoteStore`]. A hosted
//! backend-as-a-service client implements it in the host shell;
//! [`crate::datastore::LocalBackend`] implements it for the
//! non-networked mode.

use std::cell::{
    Cell,
    RefCell,
};
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

pub type OwnerId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Tasks,
    Notes,
}

impl EntityKind {
    /// Remote table name.
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Tasks => "tasks",
            EntityKind::Notes => "notes",
        }
    }

    /// Key of the blob holding this entity type in local mode.
    pub fn storage_key(self) -> &'static str {
        self.table()
    }

    pub fn singular(self) -> &'static str {
        match self {
            EntityKind::Tasks => "task",
            EntityKind::Notes => "note",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("not authorized: {0}")]
    Unauthorized(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(pub u64);

pub type ChangeCallback = Rc<dyn Fn()>;

/// Generic CRUD + change-notification store. Rows travel as JSON objects
/// with a `user_id` owner column.
///
/// Futures are not `Send`: everything runs on the single UI event loop.
#[async_trait(?Send)]
pub trait RemoteStore {
    /// All rows of `kind` owned by `owner`, newest `created_at` first.
    async fn fetch_all(&self, kind: EntityKind, owner: &str) -> Result<Vec<Value>, RemoteError>;

    async fn insert(&self, kind: EntityKind, record: Value) -> Result<(), RemoteError>;

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        owner: &str,
        fields: Value,
    ) -> Result<(), RemoteError>;

    async fn delete(&self, kind: EntityKind, id: &str, owner: &str) -> Result<(), RemoteError>;

    /// Register `on_change` for any insert/update/delete of `kind` rows
    /// under `owner` made by another session.
    fn subscribe(
        &self,
        kind: EntityKind,
        owner: &str,
        on_change: ChangeCallback,
    ) -> SubscriptionHandle;

    fn unsubscribe(&self, handle: SubscriptionHandle);
}

struct Subscriber {
    handle: SubscriptionHandle,
    kind: EntityKind,
    owner: OwnerId,
    on_change: ChangeCallback,
}

/// Bookkeeping for change listeners, shared by backend implementations.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_handle: Cell<u64>,
    entries: RefCell<Vec<Subscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, kind: EntityKind, owner: &str, on_change: ChangeCallback) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_handle.get() + 1);
        self.next_handle.set(handle.0);
        self.entries.borrow_mut().push(Subscriber {
            handle,
            kind,
            owner: owner.to_string(),
            on_change,
        });
        trace!(?handle, %kind, owner, "subscriber added");
        handle
    }

    /// Returns `true` if the handle was registered.
    pub fn remove(&self, handle: SubscriptionHandle) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|entry| entry.handle != handle);
        before != entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Invoke every listener of `kind` under `owner`. Returns how many
    /// listeners fired.
    pub fn notify(&self, kind: EntityKind, owner: &str) -> usize {
        // Callbacks are collected first so a listener may touch the
        // registry without a double borrow.
        let callbacks: Vec<ChangeCallback> = self
            .entries
            .borrow()
            .iter()
            .filter(|entry| entry.kind == kind && entry.owner == owner)
            .map(|entry| Rc::clone(&entry.on_change))
            .collect();
        for callback in &callbacks {
            callback();
        }
        callbacks.len()
    }
}
