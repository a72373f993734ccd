use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A person identified by a national ID (CPF), with photo and ban state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Visitor {
    /// Generated at creation, immutable
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Natural key, unique across all visitors
    pub national_id: String,
    /// Storage path or inline `data:` URI of the representative photo
    pub photo_ref: String,
    pub is_banned: bool,
    /// Only meaningful while `is_banned` is true
    pub ban_reason: Option<String>,
    /// Maintained by the access log writer
    pub visit_count: i32,
    pub last_entry_at: Option<DateTime<Utc>>,
    pub last_apartment_visited: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Visitor {
    /// Ban state as seen by the ban checker
    pub fn ban_status(&self) -> BanStatus {
        if self.is_banned {
            BanStatus::banned(self.ban_reason.clone().unwrap_or_default())
        } else {
            BanStatus::clear()
        }
    }
}

/// Fields needed to persist a new visitor
#[derive(Debug, Clone, PartialEq)]
pub struct NewVisitor {
    pub name: String,
    pub national_id: String,
    pub photo_ref: String,
}

/// Ban dimension of a visitor; the reason only exists in the banned state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BanState {
    Clear,
    Banned { reason: String },
}

/// Partial update applied through `VisitorStore::update`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisitorUpdate {
    pub photo_ref: Option<String>,
    pub ban: Option<BanState>,
}

impl VisitorUpdate {
    pub fn photo(photo_ref: impl Into<String>) -> Self {
        Self {
            photo_ref: Some(photo_ref.into()),
            ..Default::default()
        }
    }

    pub fn ban(state: BanState) -> Self {
        Self {
            ban: Some(state),
            ..Default::default()
        }
    }
}

/// Narrows `VisitorStore::list`; empty filter lists everyone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisitorFilter {
    pub banned: Option<bool>,
    /// Case-insensitive substring of the name or national ID
    pub query: Option<String>,
}

impl VisitorFilter {
    pub fn new(banned: Option<bool>, query: Option<&str>) -> Self {
        let query = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string);
        Self { banned, query }
    }

    pub fn matches(&self, visitor: &Visitor) -> bool {
        if self.banned.is_some_and(|banned| banned != visitor.is_banned) {
            return false;
        }
        match &self.query {
            Some(query) => {
                let query = query.to_lowercase();
                visitor.name.to_lowercase().contains(&query)
                    || visitor.national_id.to_lowercase().contains(&query)
            }
            None => true,
        }
    }
}

/// Denormalized stats written after an access log entry is committed
#[derive(Debug, Clone, PartialEq)]
pub struct VisitRecorded {
    pub visitor_id: Uuid,
    pub apartment: String,
    pub at: DateTime<Utc>,
}

/// Result of a ban check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanStatus {
    pub banned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BanStatus {
    pub fn clear() -> Self {
        Self {
            banned: false,
            reason: None,
        }
    }

    pub fn banned(reason: impl Into<String>) -> Self {
        Self {
            banned: true,
            reason: Some(reason.into()),
        }
    }
}

/// Immutable record of one entry event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AccessLogEntry {
    pub id: Uuid,
    pub visitor_id: Uuid,
    pub destination_apartment: String,
    pub authorized_by: String,
    /// Empty string when absent, never null
    pub collaborator: String,
    /// Copy of the visitor's photo reference at entry time
    pub photo_ref: String,
    pub timestamp: DateTime<Utc>,
}

/// Fields needed to persist a new access log entry
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccessLog {
    pub visitor_id: Uuid,
    pub destination_apartment: String,
    pub authorized_by: String,
    /// Already normalized by the writer
    pub collaborator: String,
    pub photo_ref: String,
    pub timestamp: DateTime<Utc>,
}

/// Visitor fields shown next to an entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitorSummary {
    pub id: Option<Uuid>,
    pub name: String,
    pub national_id: String,
}

impl From<&Visitor> for VisitorSummary {
    fn from(v: &Visitor) -> Self {
        Self {
            id: Some(v.id),
            name: v.name.clone(),
            national_id: v.national_id.clone(),
        }
    }
}

impl VisitorSummary {
    /// Placeholder for a log whose visitor row is gone
    pub fn missing() -> Self {
        Self {
            id: None,
            name: "Visitor not found".to_string(),
            national_id: "N/A".to_string(),
        }
    }
}

/// Access log entry joined with its visitor, ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryView {
    #[serde(flatten)]
    pub entry: AccessLogEntry,
    pub visitor: VisitorSummary,
    /// Resolved from `entry.photo_ref`
    pub photo_url: Option<String>,
}

/// Outcome of a completed registration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationOutcome {
    pub entry: EntryView,
    /// True when this registration created the visitor
    pub visitor_created: bool,
    /// True when the photo was stored inline because the upload failed
    pub photo_degraded: bool,
    /// Non-fatal problems the operator should see
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visitor() -> Visitor {
        Visitor {
            id: Uuid::new_v4(),
            name: "Ana Rodrigues".to_string(),
            national_id: "12345678901".to_string(),
            photo_ref: "photo_1_abc.jpg".to_string(),
            is_banned: false,
            ban_reason: None,
            visit_count: 0,
            last_entry_at: None,
            last_apartment_visited: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_ban_status_follows_flag() {
        let mut v = visitor();
        assert_eq!(v.ban_status(), BanStatus::clear());

        v.is_banned = true;
        v.ban_reason = Some("drunk and disorderly".to_string());
        assert_eq!(v.ban_status(), BanStatus::banned("drunk and disorderly"));
    }

    #[test]
    fn test_clear_ban_status_omits_reason() {
        let json = serde_json::to_value(BanStatus::clear()).unwrap();
        assert_eq!(json, serde_json::json!({ "banned": false }));
    }

    #[test]
    fn test_visitor_filter_matches_name_or_national_id() {
        let v = visitor();
        assert!(VisitorFilter::default().matches(&v));
        assert!(VisitorFilter::new(None, Some("  rodri ")).matches(&v));
        assert!(VisitorFilter::new(None, Some("5678")).matches(&v));
        assert!(!VisitorFilter::new(None, Some("Ferreira")).matches(&v));
        assert!(!VisitorFilter::new(Some(true), None).matches(&v));
        assert!(VisitorFilter::new(Some(false), Some("")).matches(&v));
        assert_eq!(VisitorFilter::new(None, Some("   ")).query, None);
    }
}
