use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

use uow_coordinator::{BoxError, Context, TransactionHandle, TransactionSource};

/// Failure injected into the in-memory source.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MockError(pub String);

/// Everything the in-memory source observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Begin(u64),
    Operation(u64, String),
    Commit(u64),
    CommitFailed(u64),
    Rollback(u64),
    RollbackFailed(u64),
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    events: Vec<Event>,
    fail_begin: Option<String>,
    fail_commit: Option<String>,
    fail_rollback: Option<String>,
    hang_on_begin: bool,
}

/// Recording transactional source with switchable failures.
#[derive(Debug, Clone, Default)]
pub struct MockSource {
    state: Arc<Mutex<State>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_begin_with(&self, message: &str) {
        self.state.lock().fail_begin = Some(message.to_string());
    }

    pub fn fail_commit_with(&self, message: &str) {
        self.state.lock().fail_commit = Some(message.to_string());
    }

    pub fn fail_rollback_with(&self, message: &str) {
        self.state.lock().fail_rollback = Some(message.to_string());
    }

    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.fail_begin = None;
        state.fail_commit = None;
        state.fail_rollback = None;
        state.hang_on_begin = false;
    }

    /// Make `begin` wait forever, so only the context can end it.
    pub fn hang_on_begin(&self) {
        self.state.lock().hang_on_begin = true;
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    pub fn begun(&self) -> Vec<u64> {
        self.collect(|event| match event {
            Event::Begin(id) => Some(*id),
            _ => None,
        })
    }

    pub fn committed(&self) -> Vec<u64> {
        self.collect(|event| match event {
            Event::Commit(id) => Some(*id),
            _ => None,
        })
    }

    pub fn rolled_back(&self) -> Vec<u64> {
        self.collect(|event| match event {
            Event::Rollback(id) => Some(*id),
            _ => None,
        })
    }

    pub fn rollback_attempts(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, Event::Rollback(_) | Event::RollbackFailed(_)))
            .count()
    }

    pub fn operations(&self, tx: u64) -> Vec<String> {
        self.collect(|event| match event {
            Event::Operation(id, op) if *id == tx => Some(op.clone()),
            _ => None,
        })
    }

    fn collect<T>(&self, pick: impl Fn(&Event) -> Option<T>) -> Vec<T> {
        self.state.lock().events.iter().filter_map(pick).collect()
    }
}

#[async_trait]
impl TransactionSource for MockSource {
    type Transaction = MockTransaction;

    async fn begin(&self, _ctx: &Context) -> Result<Self::Transaction, BoxError> {
        let hang = self.state.lock().hang_on_begin;
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock();
        if let Some(message) = state.fail_begin.clone() {
            return Err(MockError(message).into());
        }
        state.next_id += 1;
        let id = state.next_id;
        state.events.push(Event::Begin(id));
        Ok(MockTransaction {
            id,
            state: Arc::clone(&self.state),
        })
    }
}

/// Handle to one in-memory transaction.
#[derive(Debug, Clone)]
pub struct MockTransaction {
    id: u64,
    state: Arc<Mutex<State>>,
}

impl MockTransaction {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn record(&self, operation: impl Into<String>) {
        self.state
            .lock()
            .events
            .push(Event::Operation(self.id, operation.into()));
    }
}

#[async_trait]
impl TransactionHandle for MockTransaction {
    async fn commit(&mut self) -> Result<(), BoxError> {
        let mut state = self.state.lock();
        if let Some(message) = state.fail_commit.clone() {
            state.events.push(Event::CommitFailed(self.id));
            return Err(MockError(message).into());
        }
        state.events.push(Event::Commit(self.id));
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), BoxError> {
        let mut state = self.state.lock();
        if let Some(message) = state.fail_rollback.clone() {
            state.events.push(Event::RollbackFailed(self.id));
            return Err(MockError(message).into());
        }
        state.events.push(Event::Rollback(self.id));
        Ok(())
    }
}
