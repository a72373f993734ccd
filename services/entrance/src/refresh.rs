use crate::error::RegistrationResult;
use crate::models::EntryView;
use crate::registration::EntranceWorkflow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedSnapshot {
    pub entries: Vec<EntryView>,
    /// None until the first successful reload
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Reloads the recent-entries list on a fixed interval and whenever a
/// registration commits an entry. A failed reload keeps the previous snapshot.
pub struct RecentEntriesFeed {
    workflow: Arc<EntranceWorkflow>,
    limit: usize,
    interval: Duration,
    nudge: Arc<Notify>,
    tx: watch::Sender<Arc<FeedSnapshot>>,
}

impl RecentEntriesFeed {
    /// `nudge` should be the notifier the workflow signals on each committed entry
    pub fn new(
        workflow: Arc<EntranceWorkflow>,
        limit: usize,
        interval: Duration,
        nudge: Arc<Notify>,
    ) -> Self {
        let (tx, _) = watch::channel(Arc::new(FeedSnapshot::default()));
        Self {
            workflow,
            limit,
            interval,
            nudge,
            tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<FeedSnapshot>> {
        self.tx.subscribe()
    }

    /// Reload once and publish the result
    pub async fn refresh(&self) -> RegistrationResult<()> {
        let entries = self.workflow.list_recent(self.limit).await?;
        debug!(entries = entries.len(), "Feed refreshed");
        self.tx.send_replace(Arc::new(FeedSnapshot {
            entries,
            refreshed_at: Some(Utc::now()),
        }));
        Ok(())
    }

    /// Poll until `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.interval.as_secs(),
            limit = self.limit,
            "Recent entries feed started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.nudge.notified() => {
                    ticker.reset();
                }
            }

            if let Err(e) = self.refresh().await {
                warn!(error = %e, "Feed refresh failed, keeping previous snapshot");
            }
        }

        info!("Recent entries feed stopped");
    }
}
