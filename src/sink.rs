//! Platform notification sink seam.
//!
//! The sink is the external, capacity-constrained OS service that actually
//! fires notifications. The engine only talks to it through
//! [`NotificationSink`], so tests and the doctor binary can substitute
//! their own implementations.

use crate::error::{NotifyError, Result};
use crate::reminder::{Reminder, SourceId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Opaque platform-assigned id of a pending notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandleId(String);

impl HandleId {
    /// Wrap a platform-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One schedule request handed to the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRequest {
    /// Correlation id embedded in the notification payload.
    pub source_id: SourceId,
    /// Absolute fire time.
    pub fire_at: DateTime<Utc>,
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
}

impl From<&Reminder> for ScheduleRequest {
    fn from(reminder: &Reminder) -> Self {
        Self {
            source_id: reminder.source_id.clone(),
            fire_at: reminder.fire_at,
            title: reminder.title.clone(),
            body: reminder.body.clone(),
        }
    }
}

/// Whether the user has granted notification delivery permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    /// Notifications may be scheduled.
    Granted,
    /// The user revoked (or never granted) permission; every schedule
    /// call would fail, so the engine skips scheduling wholesale.
    Denied,
    /// The platform has not been asked yet. Treated as schedulable; the
    /// platform prompts on first use.
    Undetermined,
}

impl PermissionState {
    /// Returns `true` when schedule calls are worth attempting.
    pub fn allows_scheduling(self) -> bool {
        !matches!(self, PermissionState::Denied)
    }
}

/// The platform notification service.
///
/// Both calls must tolerate redundant invocation: cancelling an
/// already-cancelled handle is success, not an error.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Schedule one notification; returns the platform handle.
    async fn schedule(&self, request: &ScheduleRequest) -> Result<HandleId>;

    /// Cancel a pending notification by handle.
    async fn cancel(&self, handle: &HandleId) -> Result<()>;

    /// Current notification permission state.
    async fn permission(&self) -> PermissionState;
}

/// Call `schedule` with a bounded retry budget.
///
/// Retries are immediate; the budget exists so one flaky call cannot stall
/// a refresh cycle, not to paper over a dead sink.
pub(crate) async fn schedule_with_retry(
    sink: &dyn NotificationSink,
    request: &ScheduleRequest,
    attempts: u32,
) -> Result<HandleId> {
    let attempts = attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match sink.schedule(request).await {
            Ok(handle) => return Ok(handle),
            Err(e) => {
                debug!(
                    source_id = %request.source_id,
                    attempt,
                    "schedule attempt failed: {e}"
                );
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| NotifyError::Sink("schedule failed".to_owned())))
}

/// Call `cancel` with a bounded retry budget.
pub(crate) async fn cancel_with_retry(
    sink: &dyn NotificationSink,
    handle: &HandleId,
    attempts: u32,
) -> Result<()> {
    let attempts = attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match sink.cancel(handle).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                debug!(handle = %handle, attempt, "cancel attempt failed: {e}");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| NotifyError::Sink("cancel failed".to_owned())))
}

/// Sink that logs instead of delivering.
///
/// Stands in for the platform service on headless hosts (CI, the doctor
/// binary). Handles are minted locally and every cancel succeeds.
#[derive(Debug, Default)]
pub struct LogOnlySink;

#[async_trait]
impl NotificationSink for LogOnlySink {
    async fn schedule(&self, request: &ScheduleRequest) -> Result<HandleId> {
        let handle = HandleId::new(uuid::Uuid::new_v4().to_string());
        warn!(
            source_id = %request.source_id,
            fire_at = %request.fire_at,
            handle = %handle,
            "log-only sink: notification not delivered"
        );
        Ok(handle)
    }

    async fn cancel(&self, handle: &HandleId) -> Result<()> {
        debug!(handle = %handle, "log-only sink: cancel");
        Ok(())
    }

    async fn permission(&self) -> PermissionState {
        PermissionState::Granted
    }
}
