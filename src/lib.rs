//! Pitchside: rolling-window training reminder notification engine.
//!
//! Derives reminder obligations from persisted training activities and
//! keeps a bounded subset of them scheduled with the platform
//! notification service:
//! Activity store → Window selector → Queue refresher → Platform sink
//!
//! # Architecture
//!
//! - **Activity store**: SQLite-backed activities and tasks; materializes
//!   [`Reminder`]s for a time horizon via [`store::ReminderSource`]
//! - **Window selector**: pure split of pending reminders into the capped
//!   in-window set and the deferred rest
//! - **Queue refresher**: reconciles the platform queue (cancel stale,
//!   schedule missing), coalescing concurrent triggers
//! - **Runtime**: lifecycle loop reacting to app start, foreground,
//!   data-change, and elapsed-interval triggers
//! - **Calendar matcher**: fuzzy-matches imported calendar events to
//!   activities so feed imports do not create duplicates

pub mod calmatch;
pub mod config;
pub mod error;
pub mod refresher;
pub mod reminder;
pub mod runtime;
pub mod sink;
pub mod store;
pub mod window;

pub use config::NotifyConfig;
pub use error::{NotifyError, Result};
pub use refresher::{QueueRefresher, RefreshOutcome, RefreshTrigger, RefresherStatus};
pub use reminder::{Reminder, ReminderKind, SourceId};
pub use runtime::{AppEvent, NotifyRuntime};
pub use sink::{HandleId, NotificationSink, PermissionState, ScheduleRequest};
pub use store::{Activity, ActivityTask, ReminderSource, SqliteActivityStore};
pub use window::{WindowPlan, select_window};
