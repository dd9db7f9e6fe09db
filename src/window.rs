//! Window selection: which pending reminders get a platform slot.
//!
//! Pure logic, no I/O: the caller supplies the current time, so every
//! split is reproducible in tests.

use crate::reminder::Reminder;
use chrono::{DateTime, Duration, Utc};

/// Result of splitting pending reminders against the look-ahead window.
#[derive(Debug, Clone, Default)]
pub struct WindowPlan {
    /// Reminders to hold a platform slot, sorted by fire time ascending,
    /// truncated to the capacity cap.
    pub to_schedule: Vec<Reminder>,
    /// Everything else: outside the window, or inside but past the cap.
    /// Picked up by a later refresh.
    pub deferred: Vec<Reminder>,
}

/// Split `reminders` into the set to schedule now and the deferred rest.
///
/// A reminder is in-window when `now < fire_at <= now + window`; the upper
/// boundary is inclusive. Already-fired times are deferred (the next
/// refresh drops them once the source query excludes them). Ordering under
/// truncation: earliest `fire_at` wins, ties broken by source id lexically.
pub fn select_window(
    mut reminders: Vec<Reminder>,
    now: DateTime<Utc>,
    window: Duration,
    max_scheduled: usize,
) -> WindowPlan {
    let window_end = now + window;

    reminders.sort_by(|a, b| {
        a.fire_at
            .cmp(&b.fire_at)
            .then_with(|| a.source_id.cmp(&b.source_id))
    });

    let mut plan = WindowPlan::default();
    for reminder in reminders {
        let in_window = reminder.fire_at > now && reminder.fire_at <= window_end;
        if in_window && plan.to_schedule.len() < max_scheduled {
            plan.to_schedule.push(reminder);
        } else {
            plan.deferred.push(reminder);
        }
    }
    plan
}
