//! Reminder records derived from training activities and their tasks.
//!
//! A [`Reminder`] is never stored as its own row: it is materialized fresh
//! on every refresh cycle from the current activity and task rows, and
//! recomputed whenever the source data changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// What kind of notification obligation a reminder represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    /// Pre-activity reminder derived from a task's `reminder_minutes` offset.
    Task,
    /// Post-activity feedback prompt derived from the configured delay.
    Feedback,
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderKind::Task => f.write_str("task"),
            ReminderKind::Feedback => f.write_str("feedback"),
        }
    }
}

/// Identifier correlating a reminder with its source row.
///
/// Task reminders use `task:<id>`, feedback reminders `feedback:<activity id>`.
/// Ordering is lexical, which makes it usable as a deterministic secondary
/// sort key when two reminders share the same fire time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Source id for a task reminder.
    pub fn for_task(task_id: &str) -> Self {
        Self(format!("task:{task_id}"))
    }

    /// Source id for a feedback reminder.
    pub fn for_feedback(activity_id: &str) -> Self {
        Self(format!("feedback:{activity_id}"))
    }

    /// Returns the raw string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A computed future notification obligation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Absolute time the notification should fire.
    pub fire_at: DateTime<Utc>,
    /// Correlates the reminder with the activity or task it came from.
    pub source_id: SourceId,
    /// Reminder category.
    pub kind: ReminderKind,
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// When the source row was last updated (used for duplicate collapse).
    pub source_updated_at: DateTime<Utc>,
}

/// Collapse duplicate source ids, keeping the most recently updated row.
///
/// Duplicates only appear under data anomalies; the freshest computation
/// wins so a stale row can never shadow a corrected one.
pub fn dedup_by_source(reminders: Vec<Reminder>) -> Vec<Reminder> {
    let mut by_source: HashMap<SourceId, Reminder> = HashMap::with_capacity(reminders.len());
    for reminder in reminders {
        match by_source.get(&reminder.source_id) {
            Some(existing) if existing.source_updated_at >= reminder.source_updated_at => {}
            _ => {
                by_source.insert(reminder.source_id.clone(), reminder);
            }
        }
    }
    by_source.into_values().collect()
}
