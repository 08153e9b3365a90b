//! Mock implementations of the store and the event bus.
//!
//! Both mocks can share a [`CallLog`], so a test can assert the relative order
//! of storage calls and event publication.

use assessment_domain::{ChallengeId, DomainEvent, EvaluationId, UserId};
use assessment_infrastructure::{
    Error, EvaluationRow, EvaluationStore, EvaluationTransaction, EventBus, Result, RowPatch,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Ordered record of mock calls
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<RwLock<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.write().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.read().clone()
    }

    /// Index of the first entry equal to `entry`
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.read().iter().position(|e| e == entry)
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries.read().iter().filter(|e| *e == entry).count()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_some()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[derive(Debug, Default)]
struct StoreState {
    rows: HashMap<Uuid, EvaluationRow>,
    fail_inserts: bool,
    fail_commits: bool,
    transient_find_failures: u32,
    find_calls: u32,
}

impl StoreState {
    /// Count a read and consume one injected failure, if any
    fn begin_read(&mut self) -> Result<()> {
        self.find_calls += 1;
        if self.transient_find_failures > 0 {
            self.transient_find_failures -= 1;
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

fn newest_first(rows: &mut [EvaluationRow]) {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

/// In-memory [`EvaluationStore`] with fault injection
#[derive(Debug, Clone, Default)]
pub struct MockEvaluationStore {
    state: Arc<RwLock<StoreState>>,
    log: CallLog,
}

impl MockEvaluationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record calls into a log shared with other mocks
    pub fn with_log(log: CallLog) -> Self {
        Self {
            state: Arc::default(),
            log,
        }
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Seed a row without going through a transaction
    pub fn insert_row(&self, row: EvaluationRow) {
        self.state.write().rows.insert(row.id, row);
    }

    pub fn row(&self, id: EvaluationId) -> Option<EvaluationRow> {
        self.state.read().rows.get(id.as_uuid()).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.read().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every insert fail with a permanent database error
    pub fn fail_inserts(&self, fail: bool) {
        self.state.write().fail_inserts = fail;
    }

    /// Make every commit fail
    pub fn fail_commits(&self, fail: bool) {
        self.state.write().fail_commits = fail;
    }

    /// Fail the next `count` non-transactional reads with a transient error
    pub fn fail_next_finds(&self, count: u32) {
        self.state.write().transient_find_failures = count;
    }

    /// Number of non-transactional reads attempted
    pub fn find_calls(&self) -> u32 {
        self.state.read().find_calls
    }
}

#[async_trait]
impl EvaluationStore for MockEvaluationStore {
    type Tx = MockEvaluationTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        self.log.record("begin");
        Ok(MockEvaluationTransaction {
            state: Arc::clone(&self.state),
            log: self.log.clone(),
            staged: HashMap::new(),
        })
    }

    async fn find_by_id(&self, id: EvaluationId) -> Result<Option<EvaluationRow>> {
        self.log.record("find_by_id");
        let mut state = self.state.write();
        state.begin_read()?;
        Ok(state.rows.get(id.as_uuid()).cloned())
    }

    async fn find_by_user(
        &self,
        user_id: &UserId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<EvaluationRow>> {
        self.log.record("find_by_user");
        let mut state = self.state.write();
        state.begin_read()?;

        let mut rows: Vec<_> = state
            .rows
            .values()
            .filter(|row| row.user_id == user_id.as_str())
            .cloned()
            .collect();
        newest_first(&mut rows);

        Ok(rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn find_by_challenge(
        &self,
        challenge_id: &ChallengeId,
        user_id: Option<&UserId>,
    ) -> Result<Vec<EvaluationRow>> {
        self.log.record("find_by_challenge");
        let mut state = self.state.write();
        state.begin_read()?;

        let mut rows: Vec<_> = state
            .rows
            .values()
            .filter(|row| row.challenge_id == challenge_id.as_str())
            .filter(|row| user_id.map_or(true, |user| row.user_id == user.as_str()))
            .cloned()
            .collect();
        newest_first(&mut rows);
        Ok(rows)
    }

    async fn update(&self, id: EvaluationId, patch: &RowPatch) -> Result<Option<EvaluationRow>> {
        self.log.record("patch");
        let mut state = self.state.write();
        let Some(current) = state.rows.get(id.as_uuid()) else {
            return Ok(None);
        };
        let updated = patch.apply_to(current)?;
        state.rows.insert(updated.id, updated.clone());
        Ok(Some(updated))
    }
}

/// Transaction over [`MockEvaluationStore`]
///
/// Writes are staged and only become visible to the store on commit.
#[derive(Debug)]
pub struct MockEvaluationTransaction {
    state: Arc<RwLock<StoreState>>,
    log: CallLog,
    /// `None` marks a staged delete
    staged: HashMap<Uuid, Option<EvaluationRow>>,
}

impl MockEvaluationTransaction {
    fn current(&self, id: &Uuid) -> Option<EvaluationRow> {
        match self.staged.get(id) {
            Some(staged) => staged.clone(),
            None => self.state.read().rows.get(id).cloned(),
        }
    }
}

#[async_trait]
impl EvaluationTransaction for MockEvaluationTransaction {
    async fn insert(&mut self, row: &EvaluationRow) -> Result<()> {
        self.log.record("insert");
        if self.state.read().fail_inserts {
            return Err(Error::Database(sqlx::Error::Protocol(
                "simulated insert failure".to_string(),
            )));
        }
        if self.current(&row.id).is_some() {
            return Err(Error::Database(sqlx::Error::Protocol(format!(
                "duplicate key {}",
                row.id
            ))));
        }
        self.staged.insert(row.id, Some(row.clone()));
        Ok(())
    }

    async fn update(&mut self, row: &EvaluationRow) -> Result<bool> {
        self.log.record("update");
        if self.current(&row.id).is_none() {
            return Ok(false);
        }
        self.staged.insert(row.id, Some(row.clone()));
        Ok(true)
    }

    async fn delete(&mut self, id: EvaluationId) -> Result<bool> {
        self.log.record("delete");
        if self.current(id.as_uuid()).is_none() {
            return Ok(false);
        }
        self.staged.insert(*id.as_uuid(), None);
        Ok(true)
    }

    async fn find_by_id(&mut self, id: EvaluationId) -> Result<Option<EvaluationRow>> {
        self.log.record("tx_find_by_id");
        Ok(self.current(id.as_uuid()))
    }

    async fn commit(self) -> Result<()> {
        self.log.record("commit");
        let mut state = self.state.write();
        if state.fail_commits {
            return Err(Error::Database(sqlx::Error::PoolClosed));
        }
        for (id, row) in self.staged {
            match row {
                Some(row) => {
                    state.rows.insert(id, row);
                }
                None => {
                    state.rows.remove(&id);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.log.record("rollback");
        Ok(())
    }
}

/// [`EventBus`] that records every published event
#[derive(Debug, Clone, Default)]
pub struct RecordingEventBus {
    events: Arc<RwLock<Vec<DomainEvent>>>,
    failing: Arc<RwLock<bool>>,
    log: CallLog,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record publications into a log shared with other mocks
    pub fn with_log(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Make every publish fail
    pub fn fail_publishes(&self, fail: bool) {
        *self.failing.write() = fail;
    }

    /// Successfully published events, oldest first
    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.read().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .map(|event| event.event_type.clone())
            .collect()
    }

    pub fn event_count(&self) -> usize {
        self.events.read().len()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        self.log.record(format!("publish:{}", event.event_type));
        if *self.failing.read() {
            return Err(Error::Messaging("simulated publish failure".to_string()));
        }
        self.events.write().push(event.clone());
        Ok(())
    }
}
