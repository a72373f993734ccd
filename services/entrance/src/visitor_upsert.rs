use crate::error::{RegistrationError, RegistrationResult};
use crate::models::{NewVisitor, Visitor, VisitorUpdate};
use crate::store::{StoreError, VisitorStore};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// What the caller wants the visitor to look like
#[derive(Debug, Clone)]
pub struct UpsertRequest {
    pub national_id: String,
    pub name: String,
    /// New photo reference, if one was captured for this entry
    pub photo_ref: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Upserted {
    pub visitor: Visitor,
    pub created: bool,
    /// Set when a photo refresh on an existing visitor failed
    pub warning: Option<String>,
}

/// Creates a visitor only when identity resolution found none
#[derive(Clone)]
pub struct VisitorUpsert {
    visitors: Arc<dyn VisitorStore>,
}

impl VisitorUpsert {
    pub fn new(visitors: Arc<dyn VisitorStore>) -> Self {
        Self { visitors }
    }

    /// `existing` is the identity resolver's verdict for `request.national_id`
    #[instrument(skip(self, existing, request), fields(national_id = %request.national_id))]
    pub async fn upsert(
        &self,
        existing: Option<Visitor>,
        request: UpsertRequest,
    ) -> RegistrationResult<Upserted> {
        match existing {
            Some(visitor) => Ok(self.refresh_photo(visitor, request.photo_ref).await),
            None => self.create(request).await,
        }
    }

    async fn refresh_photo(&self, visitor: Visitor, photo_ref: Option<String>) -> Upserted {
        let photo_ref = match photo_ref {
            Some(p) if !p.is_empty() && p != visitor.photo_ref => p,
            _ => {
                return Upserted {
                    visitor,
                    created: false,
                    warning: None,
                }
            }
        };

        match self
            .visitors
            .update(visitor.id, VisitorUpdate::photo(photo_ref))
            .await
        {
            Ok(updated) => Upserted {
                visitor: updated,
                created: false,
                warning: None,
            },
            Err(e) => {
                warn!(error = %e, visitor_id = %visitor.id, "Failed to refresh visitor photo");
                Upserted {
                    visitor,
                    created: false,
                    warning: Some(format!(
                        "Visitor photo was not updated ({e}); this entry keeps the new photo \
                         while the visitor record still shows the previous one"
                    )),
                }
            }
        }
    }

    async fn create(&self, request: UpsertRequest) -> RegistrationResult<Upserted> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(RegistrationError::InvalidRequest(
                "name is required for a new visitor".to_string(),
            ));
        }
        let photo_ref = request
            .photo_ref
            .filter(|p| !p.is_empty())
            .ok_or(RegistrationError::PhotoRequired)?;

        let result = self
            .visitors
            .create(NewVisitor {
                name: name.to_string(),
                national_id: request.national_id.clone(),
                photo_ref,
            })
            .await;

        match result {
            Ok(visitor) => {
                metrics::counter!("registry.visitors.created").increment(1);
                info!(visitor_id = %visitor.id, "Visitor created");
                Ok(Upserted {
                    visitor,
                    created: true,
                    warning: None,
                })
            }
            // A concurrent registration won the unique index; reuse its row.
            Err(StoreError::Conflict(detail)) => {
                warn!(detail = %detail, "Visitor created concurrently, re-resolving");
                match self
                    .visitors
                    .find_by_national_id(&request.national_id)
                    .await
                    .map_err(RegistrationError::LookupFailed)?
                {
                    Some(visitor) => Ok(Upserted {
                        visitor,
                        created: false,
                        warning: None,
                    }),
                    None => Err(RegistrationError::VisitorCreationFailed(
                        StoreError::Conflict(detail),
                    )),
                }
            }
            Err(e) => Err(RegistrationError::VisitorCreationFailed(e)),
        }
    }
}
