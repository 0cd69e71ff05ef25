#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;
use trellis_core::error::OpKind;
use trellis_core::remote::{
    ChangeCallback, EntityKind, RemoteError, RemoteStore, SubscriberRegistry, SubscriptionHandle,
};

/// In-memory backend with failure injection and an optional gate that
/// holds mutations in flight until released.
#[derive(Default)]
pub struct FakeRemote {
    rows: RefCell<HashMap<EntityKind, Vec<Value>>>,
    failures: RefCell<Vec<(OpKind, RemoteError)>>,
    gate: RefCell<Option<Rc<Notify>>>,
    subscribers: SubscriberRegistry,
    pub calls: RefCell<Vec<(OpKind, EntityKind)>>,
}

impl FakeRemote {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn seed(&self, kind: EntityKind, rows: Vec<Value>) {
        self.rows.borrow_mut().insert(kind, rows);
    }

    pub fn rows(&self, kind: EntityKind) -> Vec<Value> {
        self.rows.borrow().get(&kind).cloned().unwrap_or_default()
    }

    pub fn fail_next(&self, op: OpKind, err: RemoteError) {
        self.failures.borrow_mut().push((op, err));
    }

    /// Hold every mutation until the returned notifier fires once per call.
    pub fn hold_mutations(&self) -> Rc<Notify> {
        let gate = Rc::new(Notify::new());
        *self.gate.borrow_mut() = Some(Rc::clone(&gate));
        gate
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Another session inserts a row and the backend broadcasts it.
    pub fn external_insert(&self, kind: EntityKind, owner: &str, row: Value) {
        self.rows.borrow_mut().entry(kind).or_default().insert(0, row);
        self.subscribers.notify(kind, owner);
    }

    fn take_failure(&self, op: OpKind) -> Result<(), RemoteError> {
        let mut failures = self.failures.borrow_mut();
        match failures.iter().position(|(failing, _)| *failing == op) {
            Some(idx) => Err(failures.remove(idx).1),
            None => Ok(()),
        }
    }

    async fn pass_gate(&self) {
        let gate = self.gate.borrow().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    fn record(&self, op: OpKind, kind: EntityKind) {
        self.calls.borrow_mut().push((op, kind));
    }
}

fn id_of(row: &Value) -> Option<&str> {
    row.get("id").and_then(Value::as_str)
}

fn owned_by(row: &Value, owner: &str) -> bool {
    row.get("user_id").and_then(Value::as_str) == Some(owner)
}

#[async_trait(?Send)]
impl RemoteStore for FakeRemote {
    async fn fetch_all(&self, kind: EntityKind, owner: &str) -> Result<Vec<Value>, RemoteError> {
        self.record(OpKind::Fetch, kind);
        self.take_failure(OpKind::Fetch)?;
        Ok(self
            .rows(kind)
            .into_iter()
            .filter(|row| owned_by(row, owner))
            .collect())
    }

    async fn insert(&self, kind: EntityKind, record: Value) -> Result<(), RemoteError> {
        self.record(OpKind::Create, kind);
        self.pass_gate().await;
        self.take_failure(OpKind::Create)?;
        self.rows.borrow_mut().entry(kind).or_default().insert(0, record);
        Ok(())
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        owner: &str,
        fields: Value,
    ) -> Result<(), RemoteError> {
        self.record(OpKind::Update, kind);
        self.pass_gate().await;
        self.take_failure(OpKind::Update)?;
        let mut rows = self.rows.borrow_mut();
        let row = rows
            .entry(kind)
            .or_default()
            .iter_mut()
            .find(|row| id_of(row) == Some(id) && owned_by(row, owner))
            .ok_or_else(|| RemoteError::Rejected(format!("no row {id}")))?;
        if let (Some(target), Value::Object(fields)) = (row.as_object_mut(), fields) {
            target.extend(fields);
        }
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, id: &str, owner: &str) -> Result<(), RemoteError> {
        self.record(OpKind::Delete, kind);
        self.pass_gate().await;
        self.take_failure(OpKind::Delete)?;
        self.rows
            .borrow_mut()
            .entry(kind)
            .or_default()
            .retain(|row| !(id_of(row) == Some(id) && owned_by(row, owner)));
        Ok(())
    }

    fn subscribe(
        &self,
        kind: EntityKind,
        owner: &str,
        on_change: ChangeCallback,
    ) -> SubscriptionHandle {
        self.subscribers.add(kind, owner, on_change)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.subscribers.remove(handle);
    }
}
