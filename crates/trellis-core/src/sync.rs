//! Client-side copy of one entity collection, kept eventually consistent
//! with a [`RemoteStore`].
//!
//! Every mutation is applied to the local snapshot first and described by
//! a [`Mutation`] command that carries what is needed to undo it. Once the
//! remote call resolves, [`SyncStore::settle`] either confirms the record
//! or restores the snapshot: a failed create removes the record, a failed
//! delete puts it back where it was, and a failed update re-fetches the
//! whole collection. Change notifications from other sessions trigger a
//! full re-fetch that overwrites local state; optimistic state racing with
//! such a re-fetch may be lost until the next one.

use std::cell::{
    Cell,
    Ref,
    RefCell,
};
use std::collections::{
    HashMap,
    HashSet,
};
use std::fmt;
use std::rc::Rc;

use chrono::{
    DateTime,
    Utc,
};
use serde_json::{
    Map,
    Value,
    json,
};
use tokio::sync::Notify;
use tracing::{
    debug,
    error,
    info,
    warn,
};
use trellis_shared::{
    Note,
    NoteRow,
    Task,
    TaskPatch,
    TaskRow,
};

use crate::calendar::date_key;
use crate::error::{
    OpKind,
    SyncError,
    SyncResult,
    ValidationError,
};
use crate::remote::{
    EntityKind,
    OwnerId,
    RemoteError,
    RemoteStore,
    SubscriptionHandle,
};
use crate::task::{
    Normalized,
    apply_patch,
    normalize_row,
    note_from_row,
    validate_patch,
};

/// An entity type the sync store can hold.
pub trait Record: Clone + fmt::Debug + 'static {
    const KIND: EntityKind;

    fn id(&self) -> &str;

    fn created_at(&self) -> DateTime<Utc>;

    /// Full row for an insert, owned by `owner`.
    fn encode(&self, owner: &str) -> Result<Value, serde_json::Error>;

    fn decode(row: Value) -> Result<Normalized<Self>, serde_json::Error>;
}

/// Records that support partial updates.
pub trait Patchable: Record {
    type Patch: Clone + fmt::Debug;

    fn validate_patch(patch: &Self::Patch) -> Result<(), ValidationError>;

    fn apply_patch(&mut self, patch: &Self::Patch, now: DateTime<Utc>);

    /// Row fields sent with the remote update, `updated_at` included.
    fn encode_patch(patch: &Self::Patch, now: DateTime<Utc>) -> Result<Value, serde_json::Error>;
}

impl Record for Task {
    const KIND: EntityKind = EntityKind::Tasks;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn encode(&self, owner: &str) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self.to_row(Some(owner)))
    }

    fn decode(row: Value) -> Result<Normalized<Self>, serde_json::Error> {
        let row: TaskRow = serde_json::from_value(row)?;
        Ok(normalize_row(row))
    }
}

impl Patchable for Task {
    type Patch = TaskPatch;

    fn validate_patch(patch: &TaskPatch) -> Result<(), ValidationError> {
        validate_patch(patch)
    }

    fn apply_patch(&mut self, patch: &TaskPatch, now: DateTime<Utc>) {
        apply_patch(self, patch, now);
    }

    fn encode_patch(patch: &TaskPatch, now: DateTime<Utc>) -> Result<Value, serde_json::Error> {
        let mut fields = Map::new();
        if let Some(title) = patch.title.as_deref() {
            fields.insert("title".to_string(), json!(title.trim()));
        }
        if let Some(description) = patch.description.as_deref() {
            fields.insert("description".to_string(), json!(description));
        }
        if let Some(status) = patch.status {
            fields.insert("status".to_string(), serde_json::to_value(status)?);
        }
        if let Some(priority) = patch.priority {
            fields.insert("priority".to_string(), serde_json::to_value(priority)?);
        }
        if let Some(tags) = patch.tags.as_ref() {
            fields.insert("tags".to_string(), serde_json::to_value(tags)?);
        }
        if let Some(subtasks) = patch.subtasks.as_ref() {
            fields.insert("subtasks".to_string(), serde_json::to_value(subtasks)?);
        }
        if let Some(due_date) = patch.due_date {
            let value = due_date.map(|day| json!(date_key(day))).unwrap_or(Value::Null);
            fields.insert("due_date".to_string(), value);
        }
        fields.insert("updated_at".to_string(), serde_json::to_value(now)?);
        Ok(Value::Object(fields))
    }
}

impl Record for Note {
    const KIND: EntityKind = EntityKind::Notes;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn encode(&self, owner: &str) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self.to_row(Some(owner)))
    }

    fn decode(row: Value) -> Result<Normalized<Self>, serde_json::Error> {
        let row: NoteRow = serde_json::from_value(row)?;
        Ok(Normalized {
            record: note_from_row(row),
            migrated: false,
        })
    }
}

/// Where a record stands relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Applied locally, remote call still in flight.
    PendingLocal,
    Confirmed,
    /// The last operation on it failed and was undone.
    RolledBack,
}

#[derive(Debug, Clone)]
enum Action<R> {
    Create { row: Value },
    Update { fields: Value },
    Delete { prior: R, index: usize },
}

/// One optimistic operation awaiting its remote outcome.
#[derive(Debug, Clone)]
pub struct Mutation<R> {
    op_id: u64,
    epoch: u64,
    target: String,
    owner: OwnerId,
    action: Action<R>,
}

impl<R> Mutation<R> {
    pub fn op_id(&self) -> u64 {
        self.op_id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn op(&self) -> OpKind {
        match self.action {
            Action::Create { .. } => OpKind::Create,
            Action::Update { .. } => OpKind::Update,
            Action::Delete { .. } => OpKind::Delete,
        }
    }

    /// Body sent to the remote: the full row for a create, the changed
    /// fields for an update.
    fn payload(&self) -> Value {
        match &self.action {
            Action::Create { row } => row.clone(),
            Action::Update { fields } => fields.clone(),
            Action::Delete { .. } => Value::Null,
        }
    }
}

/// Result of applying a remote outcome to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Confirmed,
    /// Local state was restored to its pre-mutation shape.
    RolledBack(RemoteError),
    /// The local patch can no longer be trusted; re-fetch everything.
    RefetchRequired(RemoteError),
    /// The mutation belongs to an owner that is no longer bound.
    Ignored,
}

#[derive(Debug)]
pub struct SyncStore<R: Record> {
    owner: Option<OwnerId>,
    records: Vec<R>,
    loading: bool,
    epoch: u64,
    next_op: u64,
    in_flight: HashMap<String, usize>,
    rolled_back: HashSet<String>,
    subscription: Option<SubscriptionHandle>,
}

impl<R: Record> Default for SyncStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> SyncStore<R> {
    pub fn new() -> Self {
        Self {
            owner: None,
            records: Vec::new(),
            loading: true,
            epoch: 0,
            next_op: 0,
            in_flight: HashMap::new(),
            rolled_back: HashSet::new(),
            subscription: None,
        }
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.records.iter().find(|record| record.id() == id)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn lifecycle(&self, id: &str) -> Option<Lifecycle> {
        if self.in_flight.get(id).is_some_and(|count| *count > 0) {
            return Some(Lifecycle::PendingLocal);
        }
        if self.rolled_back.contains(id) {
            return Some(Lifecycle::RolledBack);
        }
        self.get(id).map(|_| Lifecycle::Confirmed)
    }

    /// Switch to a new owner (or none). Clears the snapshot and bumps the
    /// epoch so completions for the previous owner are ignored. Returns
    /// `false` when the owner is unchanged. Binding no owner always leaves
    /// an empty, non-loading collection.
    pub fn bind_owner(&mut self, owner: Option<OwnerId>) -> bool {
        if self.owner == owner {
            if owner.is_none() {
                self.loading = false;
            }
            return false;
        }
        self.epoch += 1;
        self.loading = owner.is_some();
        self.owner = owner;
        self.records.clear();
        self.in_flight.clear();
        self.rolled_back.clear();
        info!(kind = %R::KIND, epoch = self.epoch, signed_in = self.owner.is_some(), "bound store owner");
        true
    }

    /// Replace the snapshot with fetched rows. Rows that fail to decode are
    /// skipped. Returns the records that needed schema defaults.
    pub fn apply_fetch(&mut self, epoch: u64, rows: Vec<Value>) -> Vec<R> {
        if epoch != self.epoch {
            debug!(kind = %R::KIND, epoch, current = self.epoch, "ignoring stale fetch");
            return Vec::new();
        }

        let mut migrated = Vec::new();
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match R::decode(row) {
                Ok(normalized) => {
                    if normalized.migrated {
                        migrated.push(normalized.record.clone());
                    }
                    records.push(normalized.record);
                }
                Err(err) => {
                    warn!(kind = %R::KIND, error = %err, "skipping undecodable row");
                }
            }
        }
        records.sort_by_key(|record| std::cmp::Reverse(record.created_at()));

        for record in &records {
            self.rolled_back.remove(record.id());
        }
        debug!(kind = %R::KIND, count = records.len(), migrated = migrated.len(), "applied fetch");
        self.records = records;
        self.loading = false;
        migrated
    }

    pub fn fetch_failed(&mut self, epoch: u64) {
        if epoch == self.epoch {
            self.loading = false;
        }
    }

    fn require_owner(&self) -> SyncResult<OwnerId> {
        self.owner.clone().ok_or(SyncError::NotSignedIn(R::KIND))
    }

    fn index_of(&self, id: &str) -> SyncResult<usize> {
        self.records
            .iter()
            .position(|record| record.id() == id)
            .ok_or_else(|| SyncError::NotFound {
                kind: R::KIND,
                id: id.to_string(),
            })
    }

    fn track(&mut self, target: &str, action: Action<R>, owner: OwnerId) -> Mutation<R> {
        self.next_op += 1;
        *self.in_flight.entry(target.to_string()).or_insert(0) += 1;
        self.rolled_back.remove(target);
        Mutation {
            op_id: self.next_op,
            epoch: self.epoch,
            target: target.to_string(),
            owner,
            action,
        }
    }

    fn untrack(&mut self, target: &str) {
        if let Some(count) = self.in_flight.get_mut(target) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.in_flight.remove(target);
            }
        }
    }

    /// Insert `record` locally, keeping newest-first order.
    pub fn begin_create(&mut self, record: R) -> SyncResult<Mutation<R>> {
        let owner = self.require_owner()?;
        if self.get(record.id()).is_some() {
            return Err(SyncError::DuplicateId {
                kind: R::KIND,
                id: record.id().to_string(),
            });
        }
        let row = record.encode(&owner).map_err(|source| SyncError::Encode {
            kind: R::KIND,
            source,
        })?;

        let created_at = record.created_at();
        let index = self.records.partition_point(|existing| existing.created_at() > created_at);
        let id = record.id().to_string();
        self.records.insert(index, record);
        debug!(kind = %R::KIND, id = %id, index, "optimistic insert");
        Ok(self.track(&id, Action::Create { row }, owner))
    }

    /// Remove the record locally; it is kept in the mutation for rollback.
    pub fn begin_delete(&mut self, id: &str) -> SyncResult<Mutation<R>> {
        let owner = self.require_owner()?;
        let index = self.index_of(id)?;
        let prior = self.records.remove(index);
        debug!(kind = %R::KIND, id, index, "optimistic delete");
        Ok(self.track(id, Action::Delete { prior, index }, owner))
    }

    /// Apply the remote outcome of `mutation`.
    pub fn settle(&mut self, mutation: Mutation<R>, result: Result<(), RemoteError>) -> Settlement {
        if mutation.epoch != self.epoch {
            debug!(
                kind = %R::KIND,
                op_id = mutation.op_id,
                id = %mutation.target,
                "ignoring completion from a previous session"
            );
            return Settlement::Ignored;
        }
        self.untrack(&mutation.target);

        let err = match result {
            Ok(()) => {
                debug!(kind = %R::KIND, op_id = mutation.op_id, id = %mutation.target, "mutation confirmed");
                return Settlement::Confirmed;
            }
            Err(err) => err,
        };

        warn!(
            kind = %R::KIND,
            op = %mutation.op(),
            op_id = mutation.op_id,
            id = %mutation.target,
            error = %err,
            "remote mutation failed"
        );
        match mutation.action {
            Action::Create { .. } => {
                self.records.retain(|record| record.id() != mutation.target);
                self.rolled_back.insert(mutation.target);
                Settlement::RolledBack(err)
            }
            Action::Delete { prior, index } => {
                if self.get(prior.id()).is_none() {
                    let index = index.min(self.records.len());
                    self.records.insert(index, prior);
                }
                self.rolled_back.insert(mutation.target);
                Settlement::RolledBack(err)
            }
            Action::Update { .. } => Settlement::RefetchRequired(err),
        }
    }
}

impl<R: Patchable> SyncStore<R> {
    /// Merge `patch` into the local record and stamp `updated_at`.
    pub fn begin_update(&mut self, id: &str, patch: &R::Patch, now: DateTime<Utc>) -> SyncResult<Mutation<R>> {
        R::validate_patch(patch)?;
        let owner = self.require_owner()?;
        let index = self.index_of(id)?;
        let fields = R::encode_patch(patch, now).map_err(|source| SyncError::Encode {
            kind: R::KIND,
            source,
        })?;

        self.records[index].apply_patch(patch, now);
        debug!(kind = %R::KIND, id, "optimistic update");
        Ok(self.track(id, Action::Update { fields }, owner))
    }
}

/// Raised by change notifications; awaited by [`SyncHandle::watch`].
#[derive(Default)]
struct ChangeSignal {
    raised: Cell<bool>,
    closed: Cell<bool>,
    notify: Notify,
}

impl ChangeSignal {
    fn raise(&self) {
        self.raised.set(true);
        self.notify.notify_one();
    }

    fn take(&self) -> bool {
        self.raised.replace(false)
    }

    fn close(&self) {
        self.closed.set(true);
        self.raised.set(false);
        self.notify.notify_one();
    }

    fn reopen(&self) {
        self.closed.set(false);
        self.raised.set(false);
    }
}

/// Drives a [`SyncStore`] against a remote backend. Cheap to clone; all
/// clones share one snapshot. The store is never borrowed across an
/// await, so readers see optimistic state while requests are in flight.
pub struct SyncHandle<R: Record> {
    store: Rc<RefCell<SyncStore<R>>>,
    remote: Rc<dyn RemoteStore>,
    signal: Rc<ChangeSignal>,
}

impl<R: Record> Clone for SyncHandle<R> {
    fn clone(&self) -> Self {
        Self {
            store: Rc::clone(&self.store),
            remote: Rc::clone(&self.remote),
            signal: Rc::clone(&self.signal),
        }
    }
}

pub type TaskStore = SyncHandle<Task>;
pub type NoteStore = SyncHandle<Note>;

impl<R: Record> SyncHandle<R> {
    pub fn new(remote: Rc<dyn RemoteStore>) -> Self {
        Self {
            store: Rc::new(RefCell::new(SyncStore::new())),
            remote,
            signal: Rc::new(ChangeSignal::default()),
        }
    }

    /// Borrow the underlying store. Do not hold across an await.
    pub fn store(&self) -> Ref<'_, SyncStore<R>> {
        self.store.borrow()
    }

    pub fn snapshot(&self) -> Vec<R> {
        self.store.borrow().records().to_vec()
    }

    pub fn with_records<T>(&self, f: impl FnOnce(&[R]) -> T) -> T {
        f(self.store.borrow().records())
    }

    pub fn is_loading(&self) -> bool {
        self.store.borrow().is_loading()
    }

    pub fn owner(&self) -> Option<OwnerId> {
        self.store.borrow().owner().map(str::to_string)
    }

    pub fn lifecycle(&self, id: &str) -> Option<Lifecycle> {
        self.store.borrow().lifecycle(id)
    }

    /// Bind the store to `owner`, subscribe to its change notifications
    /// and fetch its records. `None` tears everything down and leaves an
    /// empty, non-loading collection.
    #[tracing::instrument(skip(self), fields(kind = %R::KIND))]
    pub async fn load(&self, owner: Option<&str>) -> SyncResult<()> {
        let Some(owner) = owner else {
            self.teardown();
            return Ok(());
        };

        let previous = {
            let mut store = self.store.borrow_mut();
            if store.owner() == Some(owner) {
                return Ok(());
            }
            let previous = store.subscription.take();
            store.bind_owner(Some(owner.to_string()));
            previous
        };
        if let Some(handle) = previous {
            self.remote.unsubscribe(handle);
        }

        self.signal.reopen();
        let signal = Rc::clone(&self.signal);
        let handle = self.remote.subscribe(R::KIND, owner, Rc::new(move || signal.raise()));
        self.store.borrow_mut().subscription = Some(handle);

        self.refresh().await
    }

    /// Unsubscribe and forget the owner. In-flight requests keep running;
    /// their completions are ignored.
    pub fn teardown(&self) {
        let previous = {
            let mut store = self.store.borrow_mut();
            let previous = store.subscription.take();
            store.bind_owner(None);
            previous
        };
        if let Some(handle) = previous {
            self.remote.unsubscribe(handle);
        }
        self.signal.close();
    }

    /// Re-fetch the whole collection and overwrite local state.
    #[tracing::instrument(skip(self), fields(kind = %R::KIND))]
    pub async fn refresh(&self) -> SyncResult<()> {
        let (epoch, owner) = {
            let store = self.store.borrow();
            (store.epoch(), store.owner.clone())
        };
        let Some(owner) = owner else {
            return Ok(());
        };

        match self.remote.fetch_all(R::KIND, &owner).await {
            Ok(rows) => {
                let migrated = self.store.borrow_mut().apply_fetch(epoch, rows);
                if !migrated.is_empty() {
                    self.persist_migrated(epoch, &owner, migrated).await;
                }
                Ok(())
            }
            Err(source) => {
                error!(error = %source, "fetch failed");
                self.store.borrow_mut().fetch_failed(epoch);
                Err(SyncError::Remote {
                    kind: R::KIND,
                    op: OpKind::Fetch,
                    source,
                })
            }
        }
    }

    /// Write normalized defaults back for records loaded from an older
    /// schema. Failures only cost a repeat migration on the next load.
    async fn persist_migrated(&self, epoch: u64, owner: &str, migrated: Vec<R>) {
        info!(count = migrated.len(), "persisting migrated records");
        for record in migrated {
            if self.store.borrow().epoch() != epoch {
                return;
            }
            let fields = match record.encode(owner) {
                Ok(fields) => fields,
                Err(err) => {
                    warn!(id = record.id(), error = %err, "failed to encode migrated record");
                    continue;
                }
            };
            if let Err(err) = self.remote.update(R::KIND, record.id(), owner, fields).await {
                warn!(id = record.id(), error = %err, "failed to persist migrated record");
            }
        }
    }

    #[tracing::instrument(skip(self, record), fields(kind = %R::KIND, id = record.id()))]
    pub async fn create(&self, record: R) -> SyncResult<()> {
        let mutation = self.store.borrow_mut().begin_create(record)?;
        let result = self.remote.insert(R::KIND, mutation.payload()).await;
        self.finish(mutation, result).await
    }

    #[tracing::instrument(skip(self), fields(kind = %R::KIND))]
    pub async fn delete(&self, id: &str) -> SyncResult<()> {
        let mutation = self.store.borrow_mut().begin_delete(id)?;
        let result = self.remote.delete(R::KIND, id, mutation.owner()).await;
        self.finish(mutation, result).await
    }

    /// Re-fetch if a change notification arrived since the last call.
    pub async fn sync_changes(&self) -> SyncResult<bool> {
        if !self.signal.take() {
            return Ok(false);
        }
        debug!(kind = %R::KIND, "change notification; re-fetching");
        self.refresh().await?;
        Ok(true)
    }

    /// Re-fetch on every change notification until torn down.
    pub async fn watch(&self) {
        loop {
            self.signal.notify.notified().await;
            if self.signal.closed.get() {
                debug!(kind = %R::KIND, "change watch stopped");
                return;
            }
            if let Err(err) = self.sync_changes().await {
                warn!(kind = %R::KIND, error = %err, "re-fetch after change notification failed");
            }
        }
    }

    async fn finish(&self, mutation: Mutation<R>, result: Result<(), RemoteError>) -> SyncResult<()> {
        let op = mutation.op();
        let settlement = self.store.borrow_mut().settle(mutation, result);
        match settlement {
            Settlement::Confirmed | Settlement::Ignored => Ok(()),
            Settlement::RolledBack(source) => Err(SyncError::Remote {
                kind: R::KIND,
                op,
                source,
            }),
            Settlement::RefetchRequired(source) => {
                if let Err(err) = self.refresh().await {
                    warn!(kind = %R::KIND, error = %err, "re-fetch after failed update also failed");
                }
                Err(SyncError::Remote {
                    kind: R::KIND,
                    op,
                    source,
                })
            }
        }
    }
}

impl<R: Patchable> SyncHandle<R> {
    #[tracing::instrument(skip(self, patch), fields(kind = %R::KIND))]
    pub async fn update(&self, id: &str, patch: R::Patch) -> SyncResult<()> {
        let mutation = self.store.borrow_mut().begin_update(id, &patch, Utc::now())?;
        let result = self
            .remote
            .update(R::KIND, id, mutation.owner(), mutation.payload())
            .await;
        self.finish(mutation, result).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use trellis_shared::TaskStatus;

    use super::*;
    use crate::task::{
        TaskDraft,
        create_task,
    };

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, minute, 0).unwrap()
    }

    fn task(title: &str, minute: u32) -> Task {
        create_task(TaskDraft::titled(title), at(minute)).unwrap()
    }

    fn signed_in() -> SyncStore<Task> {
        let mut store = SyncStore::new();
        store.bind_owner(Some("owner-1".to_string()));
        let rows = vec![
            task("older", 1).encode("owner-1").unwrap(),
            task("newer", 5).encode("owner-1").unwrap(),
        ];
        store.apply_fetch(store.epoch(), rows);
        store
    }

    fn titles(store: &SyncStore<Task>) -> Vec<&str> {
        store.records().iter().map(|t| t.title.as_str()).collect()
    }

    #[test]
    fn unbound_store_stops_loading_when_no_owner_is_bound() {
        let mut store = SyncStore::<Task>::new();
        assert!(store.is_loading());
        assert!(!store.bind_owner(None));
        assert!(!store.is_loading());
        assert!(store.records().is_empty());
    }

    #[test]
    fn fetch_orders_newest_first_and_clears_loading() {
        let store = signed_in();
        assert!(!store.is_loading());
        assert_eq!(titles(&store), vec!["newer", "older"]);
    }

    #[test]
    fn failed_create_restores_prior_snapshot() {
        let mut store = signed_in();
        let before = store.records().to_vec();
        let new_task = task("fresh", 10);
        let id = new_task.id.clone();

        let mutation = store.begin_create(new_task).unwrap();
        assert_eq!(titles(&store), vec!["fresh", "newer", "older"]);
        assert_eq!(store.lifecycle(&id), Some(Lifecycle::PendingLocal));

        let outcome = store.settle(mutation, Err(RemoteError::Network("offline".to_string())));
        assert!(matches!(outcome, Settlement::RolledBack(_)));
        assert_eq!(store.records(), before.as_slice());
        assert_eq!(store.lifecycle(&id), Some(Lifecycle::RolledBack));
    }

    #[test]
    fn failed_delete_restores_original_position() {
        let mut store = signed_in();
        let before = store.records().to_vec();
        let id = before[1].id.clone();

        let mutation = store.begin_delete(&id).unwrap();
        assert_eq!(titles(&store), vec!["newer"]);
        store.settle(mutation, Err(RemoteError::Rejected("rls".to_string())));
        assert_eq!(store.records(), before.as_slice());
    }

    #[test]
    fn failed_update_asks_for_refetch() {
        let mut store = signed_in();
        let id = store.records()[0].id.clone();
        let mutation = store
            .begin_update(&id, &TaskPatch::status(TaskStatus::Done), at(30))
            .unwrap();
        assert_eq!(store.get(&id).unwrap().status, TaskStatus::Done);
        assert_eq!(store.get(&id).unwrap().updated_at, at(30));

        let outcome = store.settle(mutation, Err(RemoteError::Network("timeout".to_string())));
        assert!(matches!(outcome, Settlement::RefetchRequired(_)));
    }

    #[test]
    fn invalid_patch_is_rejected_before_mutating() {
        let mut store = signed_in();
        let before = store.records().to_vec();
        let id = before[0].id.clone();
        let patch = TaskPatch {
            title: Some("   ".to_string()),
            ..TaskPatch::default()
        };
        let err = store.begin_update(&id, &patch, at(30)).unwrap_err();
        assert!(matches!(err, SyncError::Validation(ValidationError::EmptyTitle)));
        assert_eq!(store.records(), before.as_slice());
    }

    #[test]
    fn completions_after_owner_change_are_ignored() {
        let mut store = signed_in();
        let mutation = store.begin_create(task("late", 20)).unwrap();
        store.bind_owner(None);
        let outcome = store.settle(mutation, Err(RemoteError::Network("gone".to_string())));
        assert_eq!(outcome, Settlement::Ignored);
        assert!(store.records().is_empty());
    }

    #[test]
    fn mutations_require_an_owner() {
        let mut store: SyncStore<Task> = SyncStore::new();
        assert!(matches!(
            store.begin_create(task("x", 1)),
            Err(SyncError::NotSignedIn(EntityKind::Tasks))
        ));
    }

    #[test]
    fn patch_rows_carry_only_changed_fields() {
        let patch = TaskPatch {
            due_date: Some(None),
            status: Some(TaskStatus::InProgress),
            ..TaskPatch::default()
        };
        let fields = Task::encode_patch(&patch, at(0)).unwrap();
        let object = fields.as_object().unwrap();
        assert_eq!(object["status"], "in-progress");
        assert!(object["due_date"].is_null());
        assert!(object.contains_key("updated_at"));
        assert!(!object.contains_key("title"));
    }
}
