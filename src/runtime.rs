//! App lifecycle loop driving the queue refresher.
//!
//! Spawns a tokio task that performs the app-start refresh, then reacts to
//! foreground transitions, data-change invalidations, and the periodic
//! elapsed-interval check. Refresh failures are logged and retried at the
//! next trigger; the loop itself never dies on them.

use crate::error::{NotifyError, Result};
use crate::refresher::{QueueRefresher, RefreshTrigger};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Interval between periodic due-checks (seconds). The actual refresh
/// cadence comes from `refresh_interval_hours`; this only bounds how late
/// a due refresh can start.
const TICK_INTERVAL_SECS: u64 = 60;

/// Lifecycle events forwarded by the host app shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    /// The app moved to the foreground.
    Foreground,
    /// An activity or task mutation committed.
    DataChanged,
}

/// Owns the background loop and the event channel into it.
pub struct NotifyRuntime {
    refresher: Arc<QueueRefresher>,
    event_tx: mpsc::UnboundedSender<AppEvent>,
    join: tokio::task::JoinHandle<()>,
}

impl NotifyRuntime {
    /// Start the background loop, performing the app-start refresh first.
    pub fn start(refresher: Arc<QueueRefresher>) -> Self {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AppEvent>();

        let loop_refresher = Arc::clone(&refresher);
        let join = tokio::spawn(async move {
            info!("notification runtime started");
            if let Err(e) = loop_refresher.refresh(RefreshTrigger::AppStart).await {
                warn!("app-start refresh failed: {e}");
            }

            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(TICK_INTERVAL_SECS));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    event = event_rx.recv() => {
                        let Some(event) = event else {
                            debug!("runtime event channel closed, stopping");
                            return;
                        };
                        let trigger = match event {
                            AppEvent::Foreground => RefreshTrigger::Foreground,
                            AppEvent::DataChanged => RefreshTrigger::Invalidated,
                        };
                        if let Err(e) = loop_refresher.refresh(trigger).await {
                            warn!(?event, "triggered refresh failed: {e}");
                        }
                    }
                    _ = interval.tick() => {
                        if loop_refresher.refresh_due(Utc::now()).await {
                            if let Err(e) =
                                loop_refresher.refresh(RefreshTrigger::Scheduled).await
                            {
                                warn!("periodic refresh failed: {e}");
                            }
                        }
                    }
                }
            }
        });

        Self {
            refresher,
            event_tx,
            join,
        }
    }

    /// The refresher this runtime drives.
    pub fn refresher(&self) -> &Arc<QueueRefresher> {
        &self.refresher
    }

    /// Forward a foreground transition from the app shell.
    pub fn notify_foreground(&self) -> Result<()> {
        self.send(AppEvent::Foreground)
    }

    /// Forward a data mutation commit from the app shell.
    pub fn notify_data_changed(&self) -> Result<()> {
        self.send(AppEvent::DataChanged)
    }

    fn send(&self, event: AppEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .map_err(|_| NotifyError::Channel("runtime loop stopped".to_owned()))
    }

    /// Stop the background loop.
    pub fn shutdown(self) {
        self.join.abort();
    }
}
