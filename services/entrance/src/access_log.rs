use crate::error::{RegistrationError, RegistrationResult};
use crate::models::{AccessLogEntry, EntryView, NewAccessLog, VisitRecorded, VisitorSummary};
use crate::photo_pipeline::display_url;
use crate::store::{AccessLogStore, ObjectStorage, VisitorStore};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Normalize an optional collaborator name to a trimmed string, empty when absent.
///
/// Applied on both the write and the read path.
pub fn normalize_collaborator(value: Option<&str>) -> String {
    match value.map(str::trim) {
        None | Some("") | Some("null") | Some("undefined") => String::new(),
        Some(name) => name.to_string(),
    }
}

/// Input for a single entry event
#[derive(Debug, Clone)]
pub struct EntryRecord {
    /// Must reference an already-persisted visitor
    pub visitor_id: Uuid,
    pub destination_apartment: String,
    pub authorized_by: String,
    pub collaborator: Option<String>,
    pub photo_ref: String,
}

/// Writes access log entries and maintains the visitor's denormalized stats
pub struct AccessLogWriter {
    logs: Arc<dyn AccessLogStore>,
    visitors: Arc<dyn VisitorStore>,
}

impl AccessLogWriter {
    pub fn new(logs: Arc<dyn AccessLogStore>, visitors: Arc<dyn VisitorStore>) -> Self {
        Self { logs, visitors }
    }

    /// Persist one entry, then bump the visitor's stats.
    ///
    /// A failed stats update is logged and counted but never rolls back the
    /// committed entry. The returned warning, if any, describes that failure.
    #[instrument(skip(self, record), fields(visitor_id = %record.visitor_id))]
    pub async fn record(
        &self,
        record: EntryRecord,
    ) -> RegistrationResult<(AccessLogEntry, Option<String>)> {
        let entry = self
            .logs
            .create(NewAccessLog {
                visitor_id: record.visitor_id,
                destination_apartment: record.destination_apartment,
                authorized_by: record.authorized_by,
                collaborator: normalize_collaborator(record.collaborator.as_deref()),
                photo_ref: record.photo_ref,
                timestamp: Utc::now(),
            })
            .await
            .map_err(RegistrationError::LogWriteFailed)?;

        metrics::counter!("registry.entries.recorded").increment(1);
        info!(
            entry_id = %entry.id,
            apartment = %entry.destination_apartment,
            "Access log entry recorded"
        );

        let visit = VisitRecorded {
            visitor_id: entry.visitor_id,
            apartment: entry.destination_apartment.clone(),
            at: entry.timestamp,
        };
        let warning = match self.visitors.record_visit(visit).await {
            Ok(()) => None,
            Err(e) => {
                warn!(error = %e, entry_id = %entry.id, "Failed to update visitor stats");
                metrics::counter!("registry.visitor_stats.update_failed").increment(1);
                Some(format!("Entry recorded, but visitor stats were not updated: {e}"))
            }
        };

        Ok((normalized(entry), warning))
    }
}

fn normalized(mut entry: AccessLogEntry) -> AccessLogEntry {
    entry.collaborator = normalize_collaborator(Some(&entry.collaborator));
    entry
}

/// Join an entry with its visitor and resolve its photo for display
pub fn entry_view(
    entry: AccessLogEntry,
    visitor: Option<VisitorSummary>,
    storage: &dyn ObjectStorage,
) -> EntryView {
    let photo_url = (!entry.photo_ref.is_empty()).then(|| display_url(storage, &entry.photo_ref));
    EntryView {
        entry: normalized(entry),
        visitor: visitor.unwrap_or_else(VisitorSummary::missing),
        photo_url,
    }
}

/// Newest entries, each joined with its visitor for display
#[instrument(skip(logs, visitors, storage))]
pub async fn list_recent(
    logs: &dyn AccessLogStore,
    visitors: &dyn VisitorStore,
    storage: &dyn ObjectStorage,
    limit: usize,
) -> RegistrationResult<Vec<EntryView>> {
    let entries = logs
        .list_recent(limit)
        .await
        .map_err(RegistrationError::LookupFailed)?;

    let mut ids: Vec<Uuid> = entries.iter().map(|e| e.visitor_id).collect();
    ids.sort_unstable();
    ids.dedup();

    let by_id: HashMap<Uuid, VisitorSummary> = visitors
        .find_by_ids(&ids)
        .await
        .map_err(RegistrationError::LookupFailed)?
        .iter()
        .map(|v| (v.id, VisitorSummary::from(v)))
        .collect();

    debug!(entries = entries.len(), visitors = by_id.len(), "Loaded recent entries");

    Ok(entries
        .into_iter()
        .map(|entry| {
            let visitor = by_id.get(&entry.visitor_id).cloned();
            entry_view(entry, visitor, storage)
        })
        .collect())
}
