use crate::models::{
    AccessLogEntry, NewAccessLog, NewVisitor, VisitRecorded, Visitor, VisitorFilter,
    VisitorUpdate,
};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;
#[cfg(all(test, feature = "pg-tests"))]
mod postgres_tests;

pub use memory::{InMemoryStore, MemoryObjectStorage};
pub use postgres::PostgresStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Visitor records. Backends are picked at startup and shared as trait objects.
#[async_trait]
pub trait VisitorStore: Send + Sync {
    /// At most one visitor matches a national ID
    async fn find_by_national_id(&self, national_id: &str) -> StoreResult<Option<Visitor>>;
    /// Matches only when the visitor is currently banned
    async fn find_banned(&self, national_id: &str) -> StoreResult<Option<Visitor>>;
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Visitor>>;
    /// Missing IDs are skipped
    async fn find_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Visitor>>;
    /// Fails with `Conflict` when the national ID is already taken
    async fn create(&self, visitor: NewVisitor) -> StoreResult<Visitor>;
    async fn update(&self, id: Uuid, update: VisitorUpdate) -> StoreResult<Visitor>;
    /// Bumps `visit_count` and stamps the last entry
    async fn record_visit(&self, visit: VisitRecorded) -> StoreResult<()>;
    /// Newest `created_at` first
    async fn list(&self, filter: VisitorFilter) -> StoreResult<Vec<Visitor>>;
    async fn health_check(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}

#[async_trait]
pub trait AccessLogStore: Send + Sync {
    async fn create(&self, entry: NewAccessLog) -> StoreResult<AccessLogEntry>;
    /// Newest first
    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<AccessLogEntry>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<()>;
    /// Pure derivation, never touches the network
    fn public_url(&self, path: &str) -> String;
    /// Bucket exists and accepts writes
    async fn check_ready(&self) -> StoreResult<()>;
}
