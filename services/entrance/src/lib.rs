//! Entrance Registry Service
//!
//! Front-desk visitor registration for a residential building. Staff record who
//! enters, which apartment they visit, who authorized it and an optional photo,
//! while a banned-visitor list is enforced on every entry.
//!
//! ## Features
//!
//! - **Entrance Workflow**: ban check, identity resolution by national ID (CPF),
//!   idempotent visitor creation and access log writes with denormalized stats
//! - **Photo Pipeline**: uploads to S3-compatible storage, falling back to an
//!   inline data URI when the bucket is unavailable
//! - **Ban Administration**: forward-looking bans with a mandatory reason
//! - **Recent Entries Feed**: background polling task with a watch channel
//!
//! ## Architecture
//!
//! ```text
//!   HTTP API (axum)
//!        │
//!        ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Ban          │──▶│ Identity     │──▶│ Photo        │──┐
//! │ Checker      │   │ Resolver     │   │ Pipeline     │  │
//! └──────────────┘   └──────────────┘   └──────────────┘  │
//!                                              │          │
//!                                              ▼          ▼
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Access Log   │◀──│ Visitor      │   │ Object       │
//! │ Writer       │   │ Upsert       │   │ Storage (S3) │
//! └──────────────┘   └──────────────┘   └──────────────┘
//!        │                  │
//!        ▼                  ▼
//! ┌─────────────────────────────────┐   ┌──────────────┐
//! │ VisitorStore / AccessLogStore   │──▶│ Recent       │
//! │ (PostgreSQL or in-memory)       │   │ Entries Feed │
//! └─────────────────────────────────┘   └──────────────┘
//! ```

pub mod access_log;
pub mod api;
pub mod ban_admin;
pub mod ban_checker;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod photo_pipeline;
pub mod photo_storage;
pub mod refresh;
pub mod registration;
pub mod store;
pub mod visitor_upsert;

#[cfg(test)]
mod test_support;

pub use api::{start_api_server, AppState};
pub use config::Config;
pub use error::{RegistrationError, RegistrationResult};
pub use models::{AccessLogEntry, BanStatus, EntryView, RegistrationOutcome, Visitor};
pub use photo_pipeline::{PhotoPipeline, RawImage, StoredPhoto};
pub use photo_storage::S3PhotoStorage;
pub use refresh::{FeedSnapshot, RecentEntriesFeed};
pub use registration::{EntranceRequest, EntranceWorkflow, QuickEntryRequest};
pub use store::{
    AccessLogStore, InMemoryStore, MemoryObjectStorage, ObjectStorage, PostgresStore, StoreError,
    VisitorStore,
};
