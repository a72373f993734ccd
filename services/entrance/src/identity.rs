use crate::error::{RegistrationError, RegistrationResult};
use crate::models::Visitor;
use crate::store::VisitorStore;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Read-only lookup of visitors by national ID
#[derive(Clone)]
pub struct IdentityResolver {
    visitors: Arc<dyn VisitorStore>,
}

impl IdentityResolver {
    pub fn new(visitors: Arc<dyn VisitorStore>) -> Self {
        Self { visitors }
    }

    /// `Ok(None)` means no visitor has this national ID.
    ///
    /// Store failures surface as `LookupFailed` and are never reported as a miss.
    #[instrument(skip(self))]
    pub async fn resolve(&self, national_id: &str) -> RegistrationResult<Option<Visitor>> {
        let found = self
            .visitors
            .find_by_national_id(national_id)
            .await
            .map_err(RegistrationError::LookupFailed)?;

        debug!(found = found.is_some(), "Identity resolved");
        Ok(found)
    }
}
