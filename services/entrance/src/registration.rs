use crate::access_log::{entry_view, list_recent, AccessLogWriter, EntryRecord};
use crate::ban_admin::BanAdministration;
use crate::ban_checker::BanChecker;
use crate::error::{RegistrationError, RegistrationResult};
use crate::identity::IdentityResolver;
use crate::models::{BanStatus, EntryView, RegistrationOutcome, Visitor, VisitorSummary};
use crate::photo_pipeline::{PhotoPipeline, RawImage};
use crate::store::{AccessLogStore, ObjectStorage, VisitorStore};
use crate::visitor_upsert::{UpsertRequest, VisitorUpsert};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Everything the front desk submits for one entry
#[derive(Debug, Clone, Default)]
pub struct EntranceRequest {
    pub national_id: String,
    /// Only used when the visitor is new
    pub name: String,
    pub apartment: String,
    pub authorized_by: String,
    pub collaborator: Option<String>,
    pub photo: Option<RawImage>,
}

/// A new entry for a visitor that is already on file
#[derive(Debug, Clone)]
pub struct QuickEntryRequest {
    pub visitor_id: Uuid,
    pub apartment: String,
    pub authorized_by: String,
    pub collaborator: Option<String>,
}

/// Front-desk registration.
///
/// `register` runs validation, the authoritative ban check, identity
/// resolution, the photo pipeline, the visitor upsert and the access log write
/// in that order. Nothing is mutated before the ban check has passed, and no
/// log entry is written unless the visitor is persisted.
pub struct EntranceWorkflow {
    resolver: IdentityResolver,
    ban_checker: BanChecker,
    photos: PhotoPipeline,
    upsert: VisitorUpsert,
    log_writer: AccessLogWriter,
    bans: BanAdministration,
    visitors: Arc<dyn VisitorStore>,
    logs: Arc<dyn AccessLogStore>,
    recorded: Option<Arc<Notify>>,
}

impl EntranceWorkflow {
    pub fn new(
        visitors: Arc<dyn VisitorStore>,
        logs: Arc<dyn AccessLogStore>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        Self {
            resolver: IdentityResolver::new(visitors.clone()),
            ban_checker: BanChecker::new(visitors.clone()),
            photos: PhotoPipeline::new(storage),
            upsert: VisitorUpsert::new(visitors.clone()),
            log_writer: AccessLogWriter::new(logs.clone(), visitors.clone()),
            bans: BanAdministration::new(visitors.clone()),
            visitors,
            logs,
            recorded: None,
        }
    }

    /// Notified after every committed entry
    pub fn with_entry_notifier(mut self, notify: Arc<Notify>) -> Self {
        self.recorded = Some(notify);
        self
    }

    pub fn bans(&self) -> &BanAdministration {
        &self.bans
    }

    pub fn storage(&self) -> &dyn ObjectStorage {
        self.photos.storage()
    }

    /// Advisory ban check for early feedback; registration checks again
    pub async fn precheck_ban(&self, national_id: &str) -> RegistrationResult<BanStatus> {
        self.ban_checker.check_banned(national_id.trim()).await
    }

    pub async fn lookup(&self, national_id: &str) -> RegistrationResult<Option<Visitor>> {
        self.resolver.resolve(national_id.trim()).await
    }

    /// Run the full registration workflow
    #[instrument(skip(self, request), fields(national_id = %request.national_id.trim()))]
    pub async fn register(&self, request: EntranceRequest) -> RegistrationResult<RegistrationOutcome> {
        let national_id = required("national ID", &request.national_id)?;
        let apartment = required("apartment", &request.apartment)?;
        let authorized_by = required("authorizer", &request.authorized_by)?;

        self.authoritative_ban_check(&national_id).await?;

        let existing = self.resolver.resolve(&national_id).await?;

        let photo = request.photo.filter(|p| !p.bytes.is_empty());
        if existing.is_none() {
            // Fail before uploading anything for a visitor that cannot be created.
            required("name", &request.name)?;
            if photo.is_none() {
                return Err(RegistrationError::PhotoRequired);
            }
        }

        let mut warnings = Vec::new();
        let stored = match photo {
            Some(ref image) => Some(self.photos.store(image).await?),
            None => None,
        };
        let photo_degraded = stored.as_ref().map(|s| s.degraded).unwrap_or(false);
        if photo_degraded {
            warnings.push("Photo upload failed; the photo is stored inline".to_string());
        }
        let new_photo_ref = stored.map(|s| s.persisted_ref());

        let upserted = self
            .upsert
            .upsert(
                existing,
                UpsertRequest {
                    national_id,
                    name: request.name,
                    photo_ref: new_photo_ref.clone(),
                },
            )
            .await?;
        warnings.extend(upserted.warning);

        let visitor = upserted.visitor;
        let photo_ref = new_photo_ref.unwrap_or_else(|| visitor.photo_ref.clone());

        let entry = self
            .commit_entry(
                &visitor,
                apartment,
                authorized_by,
                request.collaborator,
                photo_ref,
                &mut warnings,
            )
            .await?;

        info!(
            visitor_id = %visitor.id,
            visitor_created = upserted.created,
            photo_degraded,
            "Entrance registered"
        );

        Ok(RegistrationOutcome {
            entry,
            visitor_created: upserted.created,
            photo_degraded,
            warnings,
        })
    }

    /// Record an entry for a known visitor, reusing the stored photo
    #[instrument(skip(self, request), fields(visitor_id = %request.visitor_id))]
    pub async fn register_quick_entry(
        &self,
        request: QuickEntryRequest,
    ) -> RegistrationResult<RegistrationOutcome> {
        let apartment = required("apartment", &request.apartment)?;
        let authorized_by = required("authorizer", &request.authorized_by)?;

        let visitor = self
            .visitors
            .find_by_id(request.visitor_id)
            .await
            .map_err(RegistrationError::LookupFailed)?
            .ok_or_else(|| RegistrationError::visitor_id_not_found(request.visitor_id))?;

        self.authoritative_ban_check(&visitor.national_id).await?;

        let mut warnings = Vec::new();
        let photo_ref = visitor.photo_ref.clone();
        let entry = self
            .commit_entry(
                &visitor,
                apartment,
                authorized_by,
                request.collaborator,
                photo_ref,
                &mut warnings,
            )
            .await?;

        Ok(RegistrationOutcome {
            entry,
            visitor_created: false,
            photo_degraded: false,
            warnings,
        })
    }

    /// Newest entries joined with their visitors
    pub async fn list_recent(&self, limit: usize) -> RegistrationResult<Vec<EntryView>> {
        list_recent(
            self.logs.as_ref(),
            self.visitors.as_ref(),
            self.photos.storage(),
            limit,
        )
        .await
    }

    async fn authoritative_ban_check(&self, national_id: &str) -> RegistrationResult<()> {
        let result = self.ban_checker.ensure_not_banned(national_id).await;
        if let Err(RegistrationError::BannedVisitor { ref reason }) = result {
            metrics::counter!("registry.entries.rejected_banned").increment(1);
            warn!(reason = %reason, "Entry refused for banned visitor");
        }
        result
    }

    async fn commit_entry(
        &self,
        visitor: &Visitor,
        apartment: String,
        authorized_by: String,
        collaborator: Option<String>,
        photo_ref: String,
        warnings: &mut Vec<String>,
    ) -> RegistrationResult<EntryView> {
        let (entry, warning) = self
            .log_writer
            .record(EntryRecord {
                visitor_id: visitor.id,
                destination_apartment: apartment,
                authorized_by,
                collaborator,
                photo_ref,
            })
            .await?;
        warnings.extend(warning);

        if let Some(ref notify) = self.recorded {
            notify.notify_one();
        }

        Ok(entry_view(
            entry,
            Some(VisitorSummary::from(visitor)),
            self.photos.storage(),
        ))
    }
}

/// Trimmed value, or `InvalidRequest` when blank
fn required(field: &str, value: &str) -> RegistrationResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(RegistrationError::InvalidRequest(format!("{field} is required")));
    }
    Ok(value.to_string())
}
