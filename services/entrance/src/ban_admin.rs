use crate::error::{RegistrationError, RegistrationResult};
use crate::models::{BanState, Visitor, VisitorFilter, VisitorUpdate};
use crate::store::{StoreError, VisitorStore};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Toggles a visitor's ban flag and reason.
///
/// Both transitions are idempotent. Past access log entries are never touched.
#[derive(Clone)]
pub struct BanAdministration {
    visitors: Arc<dyn VisitorStore>,
}

impl BanAdministration {
    pub fn new(visitors: Arc<dyn VisitorStore>) -> Self {
        Self { visitors }
    }

    /// Ban requires a non-blank reason; unban discards whatever reason is passed
    #[instrument(skip(self, reason))]
    pub async fn set_banned(
        &self,
        visitor_id: Uuid,
        banned: bool,
        reason: Option<&str>,
    ) -> RegistrationResult<Visitor> {
        let state = ban_state(banned, reason)?;

        let visitor = self
            .visitors
            .update(visitor_id, VisitorUpdate::ban(state))
            .await
            .map_err(|e| match e {
                StoreError::NotFound(_) => RegistrationError::visitor_id_not_found(visitor_id),
                other => RegistrationError::BanUpdateFailed(other),
            })?;

        info!(visitor_id = %visitor.id, banned = visitor.is_banned, "Ban state updated");
        Ok(visitor)
    }

    /// Same as `set_banned`, addressing the visitor by national ID
    #[instrument(skip(self, reason))]
    pub async fn set_banned_by_national_id(
        &self,
        national_id: &str,
        banned: bool,
        reason: Option<&str>,
    ) -> RegistrationResult<Visitor> {
        // Validate before the lookup so a blank reason never costs a round trip.
        ban_state(banned, reason)?;

        let visitor = self
            .visitors
            .find_by_national_id(national_id.trim())
            .await
            .map_err(RegistrationError::LookupFailed)?
            .ok_or_else(|| RegistrationError::VisitorNotFound(national_id.trim().to_string()))?;

        self.set_banned(visitor.id, banned, reason).await
    }

    /// Visitors to pick from when banning or unbanning, newest first
    #[instrument(skip(self))]
    pub async fn list_visitors(&self, filter: VisitorFilter) -> RegistrationResult<Vec<Visitor>> {
        let visitors = self
            .visitors
            .list(filter)
            .await
            .map_err(RegistrationError::LookupFailed)?;
        debug!(count = visitors.len(), "Visitors listed");
        Ok(visitors)
    }
}

fn ban_state(banned: bool, reason: Option<&str>) -> RegistrationResult<BanState> {
    if !banned {
        return Ok(BanState::Clear);
    }
    match reason.map(str::trim) {
        Some(reason) if !reason.is_empty() => Ok(BanState::Banned {
            reason: reason.to_string(),
        }),
        _ => Err(RegistrationError::ReasonRequired),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ban_checker::BanChecker;
    use crate::models::{BanStatus, NewVisitor};
    use crate::store::InMemoryStore;
    use crate::test_support::FlakyStore;

    async fn setup() -> (Arc<InMemoryStore>, BanAdministration, BanChecker, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let visitor = store
            .create(NewVisitor {
                name: "Bruno Santos".to_string(),
                national_id: "55566677788".to_string(),
                photo_ref: "photo_1_abcd1234.jpg".to_string(),
            })
            .await
            .unwrap();
        (
            store.clone(),
            BanAdministration::new(store.clone()),
            BanChecker::new(store),
            visitor.id,
        )
    }

    #[tokio::test]
    async fn test_ban_requires_reason() {
        let (_, admin, checker, id) = setup().await;

        for reason in [None, Some(""), Some("   ")] {
            let err = admin.set_banned(id, true, reason).await.unwrap_err();
            assert!(matches!(err, RegistrationError::ReasonRequired));
        }
        assert_eq!(checker.check_banned("55566677788").await.unwrap(), BanStatus::clear());
    }

    #[tokio::test]
    async fn test_ban_then_unban() {
        let (_, admin, checker, id) = setup().await;

        admin
            .set_banned(id, true, Some("drunk and disorderly"))
            .await
            .unwrap();
        assert_eq!(
            checker.check_banned("55566677788").await.unwrap(),
            BanStatus::banned("drunk and disorderly")
        );

        let cleared = admin
            .set_banned(id, false, Some("ignored"))
            .await
            .unwrap();
        assert!(!cleared.is_banned);
        assert!(cleared.ban_reason.is_none());
        assert_eq!(checker.check_banned("55566677788").await.unwrap(), BanStatus::clear());
    }

    #[tokio::test]
    async fn test_transitions_are_idempotent() {
        let (_, admin, _, id) = setup().await;

        admin.set_banned(id, false, None).await.unwrap();
        admin.set_banned(id, true, Some("fight")).await.unwrap();
        let again = admin.set_banned(id, true, Some(" fight ")).await.unwrap();
        assert!(again.is_banned);
        assert_eq!(again.ban_reason.as_deref(), Some("fight"));
    }

    #[tokio::test]
    async fn test_unknown_visitor() {
        let (_, admin, _, _) = setup().await;

        let err = admin
            .set_banned(Uuid::new_v4(), true, Some("fight"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::VisitorNotFound(_)));

        let err = admin
            .set_banned_by_national_id("99999999999", false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::VisitorNotFound(_)));
    }

    #[tokio::test]
    async fn test_ban_by_national_id() {
        let (store, admin, _, id) = setup().await;

        let visitor = admin
            .set_banned_by_national_id(" 55566677788 ", true, Some("threatened staff"))
            .await
            .unwrap();
        assert_eq!(visitor.id, id);
        assert!(store.find_by_id(id).await.unwrap().unwrap().is_banned);
    }

    #[tokio::test]
    async fn test_store_failure_is_ban_update_failed() {
        let (store, _, _, id) = setup().await;
        let flaky = FlakyStore::new((*store).clone());
        FlakyStore::set(&flaky.fail_update);

        let admin = BanAdministration::new(Arc::new(flaky));
        let err = admin.set_banned(id, true, Some("fight")).await.unwrap_err();
        assert!(matches!(err, RegistrationError::BanUpdateFailed(_)));
    }

    #[tokio::test]
    async fn test_list_banned_visitors() {
        let (store, admin, _, id) = setup().await;
        admin.set_banned(id, true, Some("fight")).await.unwrap();

        let banned = admin
            .list_visitors(VisitorFilter::new(Some(true), Some("bruno")))
            .await
            .unwrap();
        assert_eq!(banned.len(), 1);
        assert_eq!(banned[0].ban_reason.as_deref(), Some("fight"));
        assert!(admin
            .list_visitors(VisitorFilter::new(Some(false), None))
            .await
            .unwrap()
            .is_empty());

        let flaky = FlakyStore::new((*store).clone());
        FlakyStore::set(&flaky.fail_list);
        let err = BanAdministration::new(Arc::new(flaky))
            .list_visitors(VisitorFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::LookupFailed(_)));
    }
}
