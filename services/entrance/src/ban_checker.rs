use crate::error::{RegistrationError, RegistrationResult};
use crate::models::BanStatus;
use crate::store::VisitorStore;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Answers whether a national ID is currently banned.
///
/// Stateless: every call reads the store, so the pre-commit check always sees
/// bans applied or lifted after an earlier advisory check.
#[derive(Clone)]
pub struct BanChecker {
    visitors: Arc<dyn VisitorStore>,
}

impl BanChecker {
    pub fn new(visitors: Arc<dyn VisitorStore>) -> Self {
        Self { visitors }
    }

    #[instrument(skip(self))]
    pub async fn check_banned(&self, national_id: &str) -> RegistrationResult<BanStatus> {
        let banned = self
            .visitors
            .find_banned(national_id)
            .await
            .map_err(RegistrationError::LookupFailed)?;

        let status = banned.map(|v| v.ban_status()).unwrap_or_else(BanStatus::clear);
        debug!(banned = status.banned, "Ban check completed");
        Ok(status)
    }

    /// Fail with `BannedVisitor` when the national ID is banned
    pub async fn ensure_not_banned(&self, national_id: &str) -> RegistrationResult<()> {
        match self.check_banned(national_id).await? {
            BanStatus {
                banned: true,
                reason,
            } => Err(RegistrationError::BannedVisitor {
                reason: reason.unwrap_or_default(),
            }),
            _ => Ok(()),
        }
    }
}
