use super::{AccessLogStore, ObjectStorage, StoreError, StoreResult, VisitorStore};
use crate::models::{
    AccessLogEntry, BanState, NewAccessLog, NewVisitor, VisitRecorded, Visitor, VisitorFilter,
    VisitorUpdate,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct VisitorTable {
    rows: HashMap<Uuid, Visitor>,
    /// national_id -> visitor id
    by_national_id: HashMap<String, Uuid>,
}

/// Process-local visitor and access log store, selected with `store.backend = "memory"`.
///
/// Nothing is durable. National-ID uniqueness is checked under the visitor
/// write lock and reported as `Conflict`, same as the Postgres unique index.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    visitors: Arc<RwLock<VisitorTable>>,
    access_logs: Arc<RwLock<Vec<AccessLogEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored visitors
    pub async fn visitor_count(&self) -> usize {
        self.visitors.read().await.rows.len()
    }

    /// Number of stored access log entries
    pub async fn access_log_count(&self) -> usize {
        self.access_logs.read().await.len()
    }
}

#[async_trait]
impl VisitorStore for InMemoryStore {
    async fn find_by_national_id(&self, national_id: &str) -> StoreResult<Option<Visitor>> {
        let table = self.visitors.read().await;
        Ok(table
            .by_national_id
            .get(national_id)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn find_banned(&self, national_id: &str) -> StoreResult<Option<Visitor>> {
        Ok(self
            .find_by_national_id(national_id)
            .await?
            .filter(|v| v.is_banned))
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Visitor>> {
        Ok(self.visitors.read().await.rows.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Visitor>> {
        let table = self.visitors.read().await;
        Ok(ids.iter().filter_map(|id| table.rows.get(id).cloned()).collect())
    }

    async fn create(&self, visitor: NewVisitor) -> StoreResult<Visitor> {
        let mut table = self.visitors.write().await;
        if table.by_national_id.contains_key(&visitor.national_id) {
            return Err(StoreError::Conflict(format!(
                "visitor with national id {} exists",
                visitor.national_id
            )));
        }

        let row = Visitor {
            id: Uuid::new_v4(),
            name: visitor.name,
            national_id: visitor.national_id,
            photo_ref: visitor.photo_ref,
            is_banned: false,
            ban_reason: None,
            visit_count: 0,
            last_entry_at: None,
            last_apartment_visited: None,
            created_at: Utc::now(),
        };
        table.by_national_id.insert(row.national_id.clone(), row.id);
        table.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update(&self, id: Uuid, update: VisitorUpdate) -> StoreResult<Visitor> {
        let mut table = self.visitors.write().await;
        let row = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("visitor {id}")))?;

        if let Some(photo_ref) = update.photo_ref {
            row.photo_ref = photo_ref;
        }
        match update.ban {
            Some(BanState::Banned { reason }) => {
                row.is_banned = true;
                row.ban_reason = Some(reason);
            }
            Some(BanState::Clear) => {
                row.is_banned = false;
                row.ban_reason = None;
            }
            None => {}
        }
        Ok(row.clone())
    }

    async fn record_visit(&self, visit: VisitRecorded) -> StoreResult<()> {
        let mut table = self.visitors.write().await;
        let row = table
            .rows
            .get_mut(&visit.visitor_id)
            .ok_or_else(|| StoreError::NotFound(format!("visitor {}", visit.visitor_id)))?;
        row.visit_count += 1;
        row.last_entry_at = Some(visit.at);
        row.last_apartment_visited = Some(visit.apartment);
        Ok(())
    }

    async fn list(&self, filter: VisitorFilter) -> StoreResult<Vec<Visitor>> {
        let table = self.visitors.read().await;
        let mut visitors: Vec<Visitor> = table
            .rows
            .values()
            .filter(|v| filter.matches(v))
            .cloned()
            .collect();
        visitors.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(visitors)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl AccessLogStore for InMemoryStore {
    async fn create(&self, entry: NewAccessLog) -> StoreResult<AccessLogEntry> {
        let row = AccessLogEntry {
            id: Uuid::new_v4(),
            visitor_id: entry.visitor_id,
            destination_apartment: entry.destination_apartment,
            authorized_by: entry.authorized_by,
            collaborator: entry.collaborator,
            photo_ref: entry.photo_ref,
            timestamp: entry.timestamp,
        };
        self.access_logs.write().await.push(row.clone());
        Ok(row)
    }

    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<AccessLogEntry>> {
        let logs = self.access_logs.read().await;
        let mut recent: Vec<AccessLogEntry> = logs.iter().cloned().collect();
        // Stable sort keeps insertion order among equal timestamps; reverse makes it newest first.
        recent.sort_by_key(|e| e.timestamp);
        recent.reverse();
        recent.truncate(limit);
        Ok(recent)
    }
}

/// Photo bytes kept in memory, addressed as `memory://<bucket>/<key>`
#[derive(Clone)]
pub struct MemoryObjectStorage {
    bucket: String,
    objects: Arc<RwLock<HashMap<String, (Vec<u8>, String)>>>,
}

impl MemoryObjectStorage {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Stored bytes and content type for a key
    pub async fn object(&self, path: &str) -> Option<(Vec<u8>, String)> {
        self.objects.read().await.get(path).cloned()
    }
}

#[async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<()> {
        self.objects
            .write()
            .await
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://{}/{}", self.bucket, path)
    }

    async fn check_ready(&self) -> StoreResult<()> {
        Ok(())
    }
}
