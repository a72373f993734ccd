use crate::models::{
    AccessLogEntry, NewAccessLog, NewVisitor, VisitRecorded, Visitor, VisitorFilter,
    VisitorUpdate,
};
use crate::store::{AccessLogStore, InMemoryStore, StoreError, StoreResult, VisitorStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

fn down<T>() -> StoreResult<T> {
    Err(StoreError::Unavailable("connection refused".to_string()))
}

/// Every call fails as if the database were unreachable
pub struct FailingStore;

#[async_trait]
impl VisitorStore for FailingStore {
    async fn find_by_national_id(&self, _: &str) -> StoreResult<Option<Visitor>> {
        down()
    }
    async fn find_banned(&self, _: &str) -> StoreResult<Option<Visitor>> {
        down()
    }
    async fn find_by_id(&self, _: Uuid) -> StoreResult<Option<Visitor>> {
        down()
    }
    async fn find_by_ids(&self, _: &[Uuid]) -> StoreResult<Vec<Visitor>> {
        down()
    }
    async fn create(&self, _: NewVisitor) -> StoreResult<Visitor> {
        down()
    }
    async fn update(&self, _: Uuid, _: VisitorUpdate) -> StoreResult<Visitor> {
        down()
    }
    async fn record_visit(&self, _: VisitRecorded) -> StoreResult<()> {
        down()
    }
    async fn list(&self, _: VisitorFilter) -> StoreResult<Vec<Visitor>> {
        down()
    }
    async fn health_check(&self) -> StoreResult<()> {
        down()
    }
    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

#[async_trait]
impl AccessLogStore for FailingStore {
    async fn create(&self, _: NewAccessLog) -> StoreResult<AccessLogEntry> {
        down()
    }
    async fn list_recent(&self, _: usize) -> StoreResult<Vec<AccessLogEntry>> {
        down()
    }
}

/// In-memory store with switchable faults
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    pub fail_lookup: AtomicBool,
    pub fail_ban_check: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_log_write: AtomicBool,
    pub fail_stats: AtomicBool,
    pub fail_list: AtomicBool,
    /// Lookups by national ID that report a miss before the real answer
    pub hidden_lookups: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn set(flag: &AtomicBool) {
        flag.store(true, Ordering::SeqCst);
    }
}

fn tripped(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}

#[async_trait]
impl VisitorStore for FlakyStore {
    async fn find_by_national_id(&self, national_id: &str) -> StoreResult<Option<Visitor>> {
        if tripped(&self.fail_lookup) {
            return down();
        }
        let hidden = self
            .hidden_lookups
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hidden {
            return Ok(None);
        }
        self.inner.find_by_national_id(national_id).await
    }

    async fn find_banned(&self, national_id: &str) -> StoreResult<Option<Visitor>> {
        if tripped(&self.fail_ban_check) {
            return down();
        }
        self.inner.find_banned(national_id).await
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Visitor>> {
        if tripped(&self.fail_lookup) {
            return down();
        }
        self.inner.find_by_id(id).await
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Visitor>> {
        self.inner.find_by_ids(ids).await
    }

    async fn create(&self, visitor: NewVisitor) -> StoreResult<Visitor> {
        if tripped(&self.fail_create) {
            return down();
        }
        VisitorStore::create(&self.inner, visitor).await
    }

    async fn update(&self, id: Uuid, update: VisitorUpdate) -> StoreResult<Visitor> {
        if tripped(&self.fail_update) {
            return down();
        }
        self.inner.update(id, update).await
    }

    async fn record_visit(&self, visit: VisitRecorded) -> StoreResult<()> {
        if tripped(&self.fail_stats) {
            return down();
        }
        self.inner.record_visit(visit).await
    }

    async fn list(&self, filter: VisitorFilter) -> StoreResult<Vec<Visitor>> {
        if tripped(&self.fail_list) {
            return down();
        }
        self.inner.list(filter).await
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.inner.health_check().await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

#[async_trait]
impl AccessLogStore for FlakyStore {
    async fn create(&self, entry: NewAccessLog) -> StoreResult<AccessLogEntry> {
        if tripped(&self.fail_log_write) {
            return down();
        }
        AccessLogStore::create(&self.inner, entry).await
    }

    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<AccessLogEntry>> {
        if tripped(&self.fail_list) {
            return down();
        }
        self.inner.list_recent(limit).await
    }
}
