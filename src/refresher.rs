//! Queue refresher: keeps the platform notification queue reconciled.
//!
//! One refresh cycle reads pending reminders, splits them against the
//! look-ahead window, cancels stale platform handles, then schedules the
//! missing ones. Only one cycle runs at a time: the window state sits
//! behind a `tokio::sync::Mutex` acquired with `try_lock`, and a trigger
//! arriving mid-cycle sets a pending-rerun flag that the in-flight cycle
//! drains before releasing the guard. Triggers are therefore coalesced,
//! never queued.

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::reminder::{Reminder, SourceId};
use crate::sink::{
    HandleId, NotificationSink, PermissionState, ScheduleRequest, cancel_with_retry,
    schedule_with_retry,
};
use crate::store::ReminderSource;
use crate::window::select_window;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Failure streak length after which the engine logs a persistent-failure
/// warning (the streak itself is always visible via [`RefresherStatus`]).
const PERSISTENT_FAILURE_STREAK: u32 = 3;

/// Why a refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// App start.
    AppStart,
    /// Elapsed time since the last refresh exceeded the interval.
    Scheduled,
    /// App moved to the foreground.
    Foreground,
    /// An activity or task mutation committed.
    Invalidated,
}

/// Result of a refresh request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A full cycle ran; counts describe what it did.
    Completed(RefreshStats),
    /// Another cycle was in flight; this request was folded into its
    /// follow-up rerun.
    Coalesced,
    /// Permission is revoked; scheduling was skipped wholesale.
    PermissionDenied,
}

/// What one completed cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Newly scheduled notifications.
    pub scheduled: usize,
    /// Handles cancelled as stale.
    pub cancelled: usize,
    /// In-window reminders already holding a live handle.
    pub kept: usize,
    /// Reminders left unscheduled (outside the window or past the cap).
    pub deferred: usize,
    /// Schedule calls abandoned after the retry budget.
    pub schedule_failures: usize,
    /// Cancel calls abandoned after the retry budget; their handles stay
    /// tracked and are retried next cycle.
    pub cancel_failures: usize,
}

/// Result of the single-item fast path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastPathOutcome {
    /// Scheduled immediately.
    Scheduled,
    /// Already held a handle for the same fire time; nothing to do.
    AlreadyScheduled,
    /// Outside the window or at capacity; the next full refresh picks it
    /// up once eligible.
    Deferred,
    /// A refresh was in flight; folded into its follow-up rerun.
    Coalesced,
    /// Permission is revoked.
    PermissionDenied,
}

/// Diagnostic snapshot of the refresher.
#[derive(Debug, Clone, Serialize)]
pub struct RefresherStatus {
    /// Source ids currently believed to hold a platform handle.
    pub scheduled_count: usize,
    /// When the last successful cycle completed.
    pub last_refresh_at: Option<DateTime<Utc>>,
    /// Consecutive cycles that failed at the reader.
    pub consecutive_failures: u32,
    /// Message from the most recent failure, if any.
    pub last_error: Option<String>,
    /// Current platform permission state.
    pub permission: PermissionState,
}

/// A platform handle the refresher believes is live, with the fire time it
/// was scheduled for. A changed fire time marks the entry stale.
#[derive(Debug, Clone)]
struct ScheduledEntry {
    handle: HandleId,
    fire_at: DateTime<Utc>,
}

/// Mutable window state, owned exclusively by the refresher.
///
/// Ephemeral by design: the platform is the durable source of truth, and
/// this mirror is rebuilt by reconciling against fresh source data, never
/// trusted across process restarts.
#[derive(Debug, Default)]
struct WindowState {
    scheduled: HashMap<SourceId, ScheduledEntry>,
    last_refresh_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    last_error: Option<String>,
    permission_warned: bool,
}

/// Orchestrates reader → window selector → platform sink.
///
/// Constructed once at app start and handed (via `Arc`) to the mutation
/// collaborators that need to trigger invalidation.
pub struct QueueRefresher {
    source: Arc<dyn ReminderSource>,
    sink: Arc<dyn NotificationSink>,
    config: SchedulerConfig,
    state: Mutex<WindowState>,
    rerun_pending: AtomicBool,
}

impl QueueRefresher {
    /// Create a refresher over the given source and sink.
    ///
    /// # Errors
    ///
    /// Returns a config error when the scheduler configuration is invalid.
    pub fn new(
        source: Arc<dyn ReminderSource>,
        sink: Arc<dyn NotificationSink>,
        config: SchedulerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            sink,
            config,
            state: Mutex::new(WindowState::default()),
            rerun_pending: AtomicBool::new(false),
        })
    }

    /// Run (or coalesce) a full refresh cycle.
    pub async fn refresh(&self, trigger: RefreshTrigger) -> Result<RefreshOutcome> {
        self.refresh_at(trigger, Utc::now()).await
    }

    /// Entry point for mutation collaborators after a commit.
    pub async fn invalidate_and_refresh(&self) -> Result<RefreshOutcome> {
        self.refresh(RefreshTrigger::Invalidated).await
    }

    /// As [`refresh`](Self::refresh), with an explicit current time.
    pub async fn refresh_at(
        &self,
        trigger: RefreshTrigger,
        now: DateTime<Utc>,
    ) -> Result<RefreshOutcome> {
        let Ok(mut state) = self.state.try_lock() else {
            // A cycle is in flight; its result supersedes this request.
            self.rerun_pending.store(true, Ordering::SeqCst);
            debug!(?trigger, "refresh coalesced into in-flight cycle");
            return Ok(RefreshOutcome::Coalesced);
        };

        let mut outcome = self.run_cycle(&mut state, trigger, now).await;
        // Drain triggers that arrived while the cycle ran: exactly one
        // follow-up per drain, no queue.
        while self.rerun_pending.swap(false, Ordering::SeqCst) {
            debug!("running coalesced follow-up refresh");
            outcome = self.run_cycle(&mut state, RefreshTrigger::Invalidated, now).await;
        }
        outcome
    }

    /// Fast path: schedule one newly created or updated reminder without a
    /// full refresh, when it is already known to be in-window.
    pub async fn schedule_one(&self, reminder: &Reminder) -> Result<FastPathOutcome> {
        self.schedule_one_at(reminder, Utc::now()).await
    }

    /// As [`schedule_one`](Self::schedule_one), with an explicit current time.
    pub async fn schedule_one_at(
        &self,
        reminder: &Reminder,
        now: DateTime<Utc>,
    ) -> Result<FastPathOutcome> {
        let Ok(mut state) = self.state.try_lock() else {
            // The in-flight cycle's follow-up re-reads source data and
            // picks this reminder up, which keeps the state identical to
            // what a full refresh would have produced.
            self.rerun_pending.store(true, Ordering::SeqCst);
            return Ok(FastPathOutcome::Coalesced);
        };

        if !self.sink.permission().await.allows_scheduling() {
            return Ok(FastPathOutcome::PermissionDenied);
        }

        let window_end = now + Duration::days(i64::from(self.config.window_days));
        let in_window = reminder.fire_at > now && reminder.fire_at <= window_end;
        if !in_window {
            return Ok(FastPathOutcome::Deferred);
        }

        if let Some(entry) = state.scheduled.get(&reminder.source_id) {
            if entry.fire_at == reminder.fire_at {
                return Ok(FastPathOutcome::AlreadyScheduled);
            }
            // Fire time moved: replace the stale handle first so the
            // platform never holds two alarms for one source.
            let handle = entry.handle.clone();
            cancel_with_retry(self.sink.as_ref(), &handle, self.config.sink_attempts).await?;
            state.scheduled.remove(&reminder.source_id);
        }

        if state.scheduled.len() >= self.config.max_scheduled {
            return Ok(FastPathOutcome::Deferred);
        }

        let request = ScheduleRequest::from(reminder);
        let handle =
            schedule_with_retry(self.sink.as_ref(), &request, self.config.sink_attempts).await?;
        state.scheduled.insert(
            reminder.source_id.clone(),
            ScheduledEntry {
                handle,
                fire_at: reminder.fire_at,
            },
        );
        debug!(source_id = %reminder.source_id, fire_at = %reminder.fire_at, "fast-path scheduled");
        Ok(FastPathOutcome::Scheduled)
    }

    /// Returns `true` when the periodic refresh interval has elapsed (or
    /// no refresh has completed yet).
    pub async fn refresh_due(&self, now: DateTime<Utc>) -> bool {
        let state = self.state.lock().await;
        match state.last_refresh_at {
            None => true,
            Some(last) => {
                now - last >= Duration::hours(i64::from(self.config.refresh_interval_hours))
            }
        }
    }

    /// Diagnostic snapshot for the status surface.
    pub async fn status(&self) -> RefresherStatus {
        let permission = self.sink.permission().await;
        let state = self.state.lock().await;
        RefresherStatus {
            scheduled_count: state.scheduled.len(),
            last_refresh_at: state.last_refresh_at,
            consecutive_failures: state.consecutive_failures,
            last_error: state.last_error.clone(),
            permission,
        }
    }

    /// One full read-select-reconcile cycle against the sink.
    async fn run_cycle(
        &self,
        state: &mut WindowState,
        trigger: RefreshTrigger,
        now: DateTime<Utc>,
    ) -> Result<RefreshOutcome> {
        if !self.sink.permission().await.allows_scheduling() {
            if !state.permission_warned {
                warn!("notification permission revoked; scheduling suspended");
                state.permission_warned = true;
            }
            // Still counts as a completed pass so the periodic trigger
            // does not hot-loop; foreground/invalidation triggers re-check.
            state.last_refresh_at = Some(now);
            return Ok(RefreshOutcome::PermissionDenied);
        }
        state.permission_warned = false;

        let horizon = Duration::days(i64::from(self.config.horizon_days));
        let reminders = match self.source.pending_reminders(now, horizon).await {
            Ok(reminders) => reminders,
            Err(e) => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                state.last_error = Some(e.to_string());
                if state.consecutive_failures >= PERSISTENT_FAILURE_STREAK {
                    warn!(
                        streak = state.consecutive_failures,
                        "reminder source unavailable across consecutive refreshes: {e}"
                    );
                }
                return Err(e);
            }
        };

        let plan = select_window(
            reminders,
            now,
            Duration::days(i64::from(self.config.window_days)),
            self.config.max_scheduled,
        );
        let desired: HashMap<&SourceId, &Reminder> = plan
            .to_schedule
            .iter()
            .map(|r| (&r.source_id, r))
            .collect();

        let mut stats = RefreshStats {
            deferred: plan.deferred.len(),
            ..RefreshStats::default()
        };

        // Cancellations are fully applied before new schedules so the
        // platform count never transiently exceeds the cap.
        let stale: Vec<SourceId> = state
            .scheduled
            .iter()
            .filter(|(source_id, entry)| {
                desired
                    .get(source_id)
                    .is_none_or(|r| r.fire_at != entry.fire_at)
            })
            .map(|(source_id, _)| source_id.clone())
            .collect();

        for source_id in stale {
            let Some(entry) = state.scheduled.get(&source_id) else {
                continue;
            };
            let handle = entry.handle.clone();
            match cancel_with_retry(self.sink.as_ref(), &handle, self.config.sink_attempts).await {
                Ok(()) => {
                    state.scheduled.remove(&source_id);
                    stats.cancelled += 1;
                }
                Err(e) => {
                    // Keep the entry: it may still hold a live alarm, and
                    // dropping it could let a later schedule exceed the cap.
                    warn!(source_id = %source_id, "cancel failed, will retry next cycle: {e}");
                    stats.cancel_failures += 1;
                }
            }
        }

        for reminder in &plan.to_schedule {
            if state.scheduled.contains_key(&reminder.source_id) {
                stats.kept += 1;
                continue;
            }
            if state.scheduled.len() >= self.config.max_scheduled {
                // Slots still held by failed cancels; retried next cycle.
                stats.deferred += 1;
                continue;
            }
            let request = ScheduleRequest::from(reminder);
            match schedule_with_retry(self.sink.as_ref(), &request, self.config.sink_attempts).await
            {
                Ok(handle) => {
                    state.scheduled.insert(
                        reminder.source_id.clone(),
                        ScheduledEntry {
                            handle,
                            fire_at: reminder.fire_at,
                        },
                    );
                    stats.scheduled += 1;
                }
                Err(e) => {
                    // Left absent from the tracked set; next cycle retries.
                    warn!(source_id = %reminder.source_id, "schedule failed, will retry next cycle: {e}");
                    stats.schedule_failures += 1;
                }
            }
        }

        state.last_refresh_at = Some(now);
        state.consecutive_failures = 0;
        state.last_error = None;

        info!(
            ?trigger,
            scheduled = stats.scheduled,
            cancelled = stats.cancelled,
            kept = stats.kept,
            deferred = stats.deferred,
            schedule_failures = stats.schedule_failures,
            cancel_failures = stats.cancel_failures,
            tracked = state.scheduled.len(),
            "refresh cycle complete"
        );
        Ok(RefreshOutcome::Completed(stats))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::error::NotifyError;
    use crate::reminder::ReminderKind;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn reminder(source: &str, fire_at: DateTime<Utc>) -> Reminder {
        Reminder {
            fire_at,
            source_id: SourceId::from(source),
            kind: ReminderKind::Task,
            title: "Training".to_owned(),
            body: String::new(),
            source_updated_at: now(),
        }
    }

    #[derive(Default)]
    struct StaticSource {
        reminders: StdMutex<Vec<Reminder>>,
        fail: AtomicBool,
    }

    impl StaticSource {
        fn set(&self, reminders: Vec<Reminder>) {
            *self.reminders.lock().unwrap() = reminders;
        }
    }

    #[async_trait]
    impl ReminderSource for StaticSource {
        async fn pending_reminders(
            &self,
            _now: DateTime<Utc>,
            _horizon: Duration,
        ) -> crate::Result<Vec<Reminder>> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(NotifyError::Store("backend unavailable".to_owned()));
            }
            Ok(self.reminders.lock().unwrap().clone())
        }
    }

    /// Records every sink call; can reject schedules for chosen sources.
    #[derive(Default)]
    struct RecordingSink {
        next_handle: AtomicUsize,
        schedule_calls: AtomicUsize,
        cancel_calls: AtomicUsize,
        reject_sources: StdMutex<Vec<SourceId>>,
        permission: StdMutex<Option<PermissionState>>,
    }

    impl RecordingSink {
        fn reject(&self, source: &str) {
            self.reject_sources
                .lock()
                .unwrap()
                .push(SourceId::from(source));
        }

        fn deny_permission(&self) {
            *self.permission.lock().unwrap() = Some(PermissionState::Denied);
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn schedule(&self, request: &ScheduleRequest) -> crate::Result<HandleId> {
            self.schedule_calls.fetch_add(1, Ordering::SeqCst);
            if self
                .reject_sources
                .lock()
                .unwrap()
                .contains(&request.source_id)
            {
                return Err(NotifyError::Sink("rejected".to_owned()));
            }
            let n = self.next_handle.fetch_add(1, Ordering::SeqCst);
            Ok(HandleId::new(format!("h-{n}")))
        }

        async fn cancel(&self, _handle: &HandleId) -> crate::Result<()> {
            self.cancel_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn permission(&self) -> PermissionState {
            self.permission
                .lock()
                .unwrap()
                .unwrap_or(PermissionState::Granted)
        }
    }

    fn refresher(
        source: Arc<StaticSource>,
        sink: Arc<RecordingSink>,
    ) -> QueueRefresher {
        QueueRefresher::new(source, sink, SchedulerConfig::default()).expect("valid config")
    }

    #[tokio::test]
    async fn first_refresh_schedules_in_window_reminders() {
        let source = Arc::new(StaticSource::default());
        let sink = Arc::new(RecordingSink::default());
        source.set(vec![
            reminder("task:a", now() + Duration::hours(1)),
            reminder("task:b", now() + Duration::days(2)),
            reminder("task:far", now() + Duration::days(80)),
        ]);

        let refresher = refresher(Arc::clone(&source), Arc::clone(&sink));
        let outcome = refresher
            .refresh_at(RefreshTrigger::AppStart, now())
            .await
            .expect("refresh");

        let RefreshOutcome::Completed(stats) = outcome else {
            panic!("expected completed cycle");
        };
        assert_eq!(stats.scheduled, 2);
        assert_eq!(stats.deferred, 1);
        assert_eq!(refresher.status().await.scheduled_count, 2);
    }

    #[tokio::test]
    async fn second_refresh_without_changes_is_idempotent() {
        let source = Arc::new(StaticSource::default());
        let sink = Arc::new(RecordingSink::default());
        source.set(vec![reminder("task:a", now() + Duration::hours(1))]);

        let refresher = refresher(Arc::clone(&source), Arc::clone(&sink));
        refresher
            .refresh_at(RefreshTrigger::AppStart, now())
            .await
            .expect("first");
        let calls_after_first = sink.schedule_calls.load(Ordering::SeqCst);

        let outcome = refresher
            .refresh_at(RefreshTrigger::Scheduled, now())
            .await
            .expect("second");
        let RefreshOutcome::Completed(stats) = outcome else {
            panic!("expected completed cycle");
        };
        assert_eq!(stats.scheduled, 0);
        assert_eq!(stats.cancelled, 0);
        assert_eq!(stats.kept, 1);
        assert_eq!(sink.schedule_calls.load(Ordering::SeqCst), calls_after_first);
        assert_eq!(sink.cancel_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn removed_source_gets_cancelled() {
        // Scenario C: activity deleted whose task had a scheduled reminder.
        let source = Arc::new(StaticSource::default());
        let sink = Arc::new(RecordingSink::default());
        source.set(vec![
            reminder("task:a", now() + Duration::hours(1)),
            reminder("task:b", now() + Duration::hours(2)),
        ]);

        let refresher = refresher(Arc::clone(&source), Arc::clone(&sink));
        refresher
            .refresh_at(RefreshTrigger::AppStart, now())
            .await
            .expect("first");

        source.set(vec![reminder("task:b", now() + Duration::hours(2))]);
        let outcome = refresher
            .refresh_at(RefreshTrigger::Invalidated, now())
            .await
            .expect("second");

        let RefreshOutcome::Completed(stats) = outcome else {
            panic!("expected completed cycle");
        };
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.kept, 1);
        assert_eq!(refresher.status().await.scheduled_count, 1);
    }

    #[tokio::test]
    async fn changed_fire_time_reschedules() {
        let source = Arc::new(StaticSource::default());
        let sink = Arc::new(RecordingSink::default());
        source.set(vec![reminder("task:a", now() + Duration::hours(1))]);

        let refresher = refresher(Arc::clone(&source), Arc::clone(&sink));
        refresher
            .refresh_at(RefreshTrigger::AppStart, now())
            .await
            .expect("first");

        source.set(vec![reminder("task:a", now() + Duration::hours(3))]);
        let outcome = refresher
            .refresh_at(RefreshTrigger::Invalidated, now())
            .await
            .expect("second");

        let RefreshOutcome::Completed(stats) = outcome else {
            panic!("expected completed cycle");
        };
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.scheduled, 1);
        assert_eq!(refresher.status().await.scheduled_count, 1);
    }

    #[tokio::test]
    async fn partial_sink_rejection_does_not_abort_batch() {
        // Scenario D shape: some schedules rejected, the rest succeed.
        let source = Arc::new(StaticSource::default());
        let sink = Arc::new(RecordingSink::default());
        sink.reject("task:02");
        sink.reject("task:05");

        source.set(
            (0..10)
                .map(|i| {
                    reminder(
                        &format!("task:{i:02}"),
                        now() + Duration::minutes(i64::from(i) + 1),
                    )
                })
                .collect(),
        );

        let refresher = refresher(Arc::clone(&source), Arc::clone(&sink));
        let outcome = refresher
            .refresh_at(RefreshTrigger::AppStart, now())
            .await
            .expect("refresh");

        let RefreshOutcome::Completed(stats) = outcome else {
            panic!("expected completed cycle");
        };
        assert_eq!(stats.scheduled, 8);
        assert_eq!(stats.schedule_failures, 2);
        assert_eq!(refresher.status().await.scheduled_count, 8);
    }

    #[tokio::test]
    async fn reader_failure_leaves_state_unchanged_and_tracks_streak() {
        let source = Arc::new(StaticSource::default());
        let sink = Arc::new(RecordingSink::default());
        source.set(vec![reminder("task:a", now() + Duration::hours(1))]);

        let refresher = refresher(Arc::clone(&source), Arc::clone(&sink));
        refresher
            .refresh_at(RefreshTrigger::AppStart, now())
            .await
            .expect("first");

        source.fail.store(true, Ordering::SeqCst);
        let result = refresher.refresh_at(RefreshTrigger::Scheduled, now()).await;
        assert!(result.is_err());

        let status = refresher.status().await;
        assert_eq!(status.scheduled_count, 1);
        assert_eq!(status.consecutive_failures, 1);
        assert!(status.last_error.is_some());

        // Recovery clears the streak.
        source.fail.store(false, Ordering::SeqCst);
        refresher
            .refresh_at(RefreshTrigger::Scheduled, now())
            .await
            .expect("recovered");
        let status = refresher.status().await;
        assert_eq!(status.consecutive_failures, 0);
        assert!(status.last_error.is_none());
    }

    #[tokio::test]
    async fn permission_denied_skips_scheduling_entirely() {
        let source = Arc::new(StaticSource::default());
        let sink = Arc::new(RecordingSink::default());
        sink.deny_permission();
        source.set(vec![reminder("task:a", now() + Duration::hours(1))]);

        let refresher = refresher(Arc::clone(&source), Arc::clone(&sink));
        let outcome = refresher
            .refresh_at(RefreshTrigger::AppStart, now())
            .await
            .expect("refresh");

        assert_eq!(outcome, RefreshOutcome::PermissionDenied);
        assert_eq!(sink.schedule_calls.load(Ordering::SeqCst), 0);
        assert_eq!(refresher.status().await.scheduled_count, 0);
    }

    #[tokio::test]
    async fn fast_path_schedules_near_term_reminder() {
        // Scenario B: fire_at = now + 2 days, window 60 days, count < cap.
        let source = Arc::new(StaticSource::default());
        let sink = Arc::new(RecordingSink::default());
        let refresher = refresher(Arc::clone(&source), Arc::clone(&sink));

        let outcome = refresher
            .schedule_one_at(&reminder("task:new", now() + Duration::days(2)), now())
            .await
            .expect("fast path");
        assert_eq!(outcome, FastPathOutcome::Scheduled);
        assert_eq!(sink.schedule_calls.load(Ordering::SeqCst), 1);
        assert_eq!(refresher.status().await.scheduled_count, 1);
    }

    #[tokio::test]
    async fn fast_path_defers_out_of_window_reminder() {
        let source = Arc::new(StaticSource::default());
        let sink = Arc::new(RecordingSink::default());
        let refresher = refresher(Arc::clone(&source), Arc::clone(&sink));

        let outcome = refresher
            .schedule_one_at(&reminder("task:far", now() + Duration::days(61)), now())
            .await
            .expect("fast path");
        assert_eq!(outcome, FastPathOutcome::Deferred);
        assert_eq!(sink.schedule_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fast_path_defers_at_capacity() {
        let source = Arc::new(StaticSource::default());
        let sink = Arc::new(RecordingSink::default());
        let mut config = SchedulerConfig::default();
        config.max_scheduled = 1;
        let refresher = QueueRefresher::new(source.clone(), sink.clone(), config)
            .expect("valid config");

        refresher
            .schedule_one_at(&reminder("task:a", now() + Duration::hours(1)), now())
            .await
            .expect("first");
        let outcome = refresher
            .schedule_one_at(&reminder("task:b", now() + Duration::hours(2)), now())
            .await
            .expect("second");
        assert_eq!(outcome, FastPathOutcome::Deferred);
        assert_eq!(refresher.status().await.scheduled_count, 1);
    }

    #[tokio::test]
    async fn fast_path_is_idempotent_for_same_fire_time() {
        let source = Arc::new(StaticSource::default());
        let sink = Arc::new(RecordingSink::default());
        let refresher = refresher(Arc::clone(&source), Arc::clone(&sink));
        let r = reminder("task:a", now() + Duration::hours(1));

        refresher.schedule_one_at(&r, now()).await.expect("first");
        let outcome = refresher.schedule_one_at(&r, now()).await.expect("second");
        assert_eq!(outcome, FastPathOutcome::AlreadyScheduled);
        assert_eq!(sink.schedule_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fast_path_replaces_moved_fire_time() {
        let source = Arc::new(StaticSource::default());
        let sink = Arc::new(RecordingSink::default());
        let refresher = refresher(Arc::clone(&source), Arc::clone(&sink));

        refresher
            .schedule_one_at(&reminder("task:a", now() + Duration::hours(1)), now())
            .await
            .expect("first");
        let outcome = refresher
            .schedule_one_at(&reminder("task:a", now() + Duration::hours(4)), now())
            .await
            .expect("moved");
        assert_eq!(outcome, FastPathOutcome::Scheduled);
        assert_eq!(sink.cancel_calls.load(Ordering::SeqCst), 1);
        assert_eq!(refresher.status().await.scheduled_count, 1);
    }

    #[tokio::test]
    async fn refresh_due_tracks_interval() {
        let source = Arc::new(StaticSource::default());
        let sink = Arc::new(RecordingSink::default());
        let refresher = refresher(Arc::clone(&source), Arc::clone(&sink));

        assert!(refresher.refresh_due(now()).await);
        refresher
            .refresh_at(RefreshTrigger::AppStart, now())
            .await
            .expect("refresh");
        assert!(!refresher.refresh_due(now() + Duration::hours(1)).await);
        assert!(refresher.refresh_due(now() + Duration::hours(13)).await);
    }

    #[tokio::test]
    async fn cap_is_enforced_after_any_refresh() {
        let source = Arc::new(StaticSource::default());
        let sink = Arc::new(RecordingSink::default());
        source.set(
            (0..70)
                .map(|i| {
                    reminder(
                        &format!("task:{i:03}"),
                        now() + Duration::minutes(i64::from(i) + 1),
                    )
                })
                .collect(),
        );

        let refresher = refresher(Arc::clone(&source), Arc::clone(&sink));
        refresher
            .refresh_at(RefreshTrigger::AppStart, now())
            .await
            .expect("refresh");
        assert_eq!(refresher.status().await.scheduled_count, 60);
    }
}
