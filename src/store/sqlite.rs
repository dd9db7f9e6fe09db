//! SQLite-backed activity store.
//!
//! Holds training activities and their tasks in a single database file at
//! `{root_dir}/pitchside.db`, and materializes [`Reminder`]s from them.
//! Thread-safe via an internal `Mutex<Connection>`; all access is
//! serialized, which is plenty for a per-device store.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, Row, params};

use super::schema::{apply_schema, read_schema_version};
use super::{ReminderSource, StoreError};
use crate::config::ReminderConfig;
use crate::reminder::{Reminder, ReminderKind, SourceId, dedup_by_source};

/// Database filename within the store root directory.
const DB_FILENAME: &str = "pitchside.db";

/// A training activity (session or match).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    /// Stable activity id.
    pub id: String,
    /// Display title, e.g. "U15 training".
    pub title: String,
    /// Start time.
    pub starts_at: DateTime<Utc>,
    /// Planned duration in minutes.
    pub duration_minutes: u32,
}

/// A task attached to an activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityTask {
    /// Stable task id.
    pub id: String,
    /// Owning activity id.
    pub activity_id: String,
    /// Display title, e.g. "Bring cones".
    pub title: String,
    /// Free-form details shown in the notification body.
    pub details: String,
    /// Minutes before the activity start the reminder should fire.
    /// `None` means no reminder is configured for this task.
    pub reminder_minutes: Option<u32>,
}

/// SQLite-backed activity store.
pub struct SqliteActivityStore {
    root: PathBuf,
    conn: Mutex<Connection>,
    feedback_delay_minutes: Option<u32>,
}

impl SqliteActivityStore {
    /// Open (or create) the database at `{root_dir}/pitchside.db`.
    ///
    /// Applies the schema if the database is new.
    pub fn new(root_dir: &Path, reminders: &ReminderConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(root_dir).map_err(|e| StoreError::Io(e.to_string()))?;
        let db_path = root_dir.join(DB_FILENAME);
        let conn = Connection::open(&db_path)?;
        apply_schema(&conn)?;
        Ok(Self {
            root: root_dir.to_path_buf(),
            conn: Mutex::new(conn),
            feedback_delay_minutes: reminders.feedback_delay_minutes,
        })
    }

    /// Returns the root directory path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Idempotent schema application.
    pub fn ensure_layout(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        Ok(apply_schema(&conn)?)
    }

    /// Read the current schema version from the database.
    pub fn schema_version(&self) -> Result<Option<u32>, StoreError> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    /// Insert or replace an activity. Clears any soft-delete flag.
    pub fn upsert_activity(&self, activity: &Activity) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO activities (id, title, starts_at, duration_minutes, deleted, updated_at) \
             VALUES (?1, ?2, ?3, ?4, 0, ?5) \
             ON CONFLICT(id) DO UPDATE SET \
               title = excluded.title, starts_at = excluded.starts_at, \
               duration_minutes = excluded.duration_minutes, deleted = 0, \
               updated_at = excluded.updated_at",
            params![
                activity.id,
                activity.title,
                activity.starts_at.timestamp(),
                activity.duration_minutes,
                Utc::now().timestamp()
            ],
        )?;
        Ok(())
    }

    /// Insert or replace a task. The owning activity must exist.
    pub fn upsert_task(&self, task: &ActivityTask) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO activity_tasks \
             (id, activity_id, title, details, reminder_minutes, deleted, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6) \
             ON CONFLICT(id) DO UPDATE SET \
               activity_id = excluded.activity_id, title = excluded.title, \
               details = excluded.details, reminder_minutes = excluded.reminder_minutes, \
               deleted = 0, updated_at = excluded.updated_at",
            params![
                task.id,
                task.activity_id,
                task.title,
                task.details,
                task.reminder_minutes,
                Utc::now().timestamp()
            ],
        )?;
        Ok(())
    }

    /// Soft-delete an activity. Its tasks stop producing reminders via the
    /// join, so they are left untouched.
    pub fn delete_activity(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE activities SET deleted = 1, updated_at = ?1 WHERE id = ?2",
            params![Utc::now().timestamp(), id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        Ok(())
    }

    /// Soft-delete a single task.
    pub fn delete_task(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE activity_tasks SET deleted = 1, updated_at = ?1 WHERE id = ?2",
            params![Utc::now().timestamp(), id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        Ok(())
    }

    /// List non-deleted activities ordered by start time, for the
    /// calendar-import matcher and the doctor surface.
    pub fn list_activities(&self) -> Result<Vec<Activity>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, starts_at, duration_minutes FROM activities \
             WHERE deleted = 0 ORDER BY starts_at ASC",
        )?;
        let rows = stmt.query_map([], row_to_activity)?;

        let mut activities = Vec::new();
        for r in rows {
            activities.push(r?);
        }
        Ok(activities)
    }

    /// Synchronous reminder materialization; the [`ReminderSource`] impl
    /// delegates here.
    pub fn pending_reminders_sync(
        &self,
        now: DateTime<Utc>,
        horizon: Duration,
    ) -> Result<Vec<Reminder>, StoreError> {
        if horizon <= Duration::zero() {
            return Err(StoreError::InvalidArgument(
                "horizon must be positive".to_owned(),
            ));
        }
        let end = now + horizon;

        let conn = self.lock()?;
        let mut reminders = task_reminders(&conn, now, end)?;
        if let Some(delay) = self.feedback_delay_minutes {
            reminders.extend(feedback_reminders(&conn, now, end, delay)?);
        }
        drop(conn);

        Ok(dedup_by_source(reminders))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl ReminderSource for SqliteActivityStore {
    async fn pending_reminders(
        &self,
        now: DateTime<Utc>,
        horizon: Duration,
    ) -> crate::Result<Vec<Reminder>> {
        Ok(self.pending_reminders_sync(now, horizon)?)
    }
}

/// Task reminders: `fire_at = starts_at - reminder_minutes`, computed in
/// SQL so the range filter uses the index on `starts_at` indirectly.
fn task_reminders(
    conn: &Connection,
    now: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Reminder>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.title, t.details, t.updated_at, a.title, \
                a.starts_at - t.reminder_minutes * 60 AS fire_at \
         FROM activity_tasks t JOIN activities a ON a.id = t.activity_id \
         WHERE t.deleted = 0 AND a.deleted = 0 AND t.reminder_minutes IS NOT NULL \
           AND a.starts_at - t.reminder_minutes * 60 > ?1 \
           AND a.starts_at - t.reminder_minutes * 60 <= ?2",
    )?;
    let rows = stmt.query_map(params![now.timestamp(), end.timestamp()], |row| {
        let task_id: String = row.get(0)?;
        let task_title: String = row.get(1)?;
        let details: String = row.get(2)?;
        let updated_at: i64 = row.get(3)?;
        let activity_title: String = row.get(4)?;
        let fire_at: i64 = row.get(5)?;
        Ok(Reminder {
            fire_at: from_epoch(fire_at),
            source_id: SourceId::for_task(&task_id),
            kind: ReminderKind::Task,
            title: task_title,
            body: if details.is_empty() {
                activity_title
            } else {
                format!("{activity_title} — {details}")
            },
            source_updated_at: from_epoch(updated_at),
        })
    })?;

    let mut reminders = Vec::new();
    for r in rows {
        reminders.push(r?);
    }
    Ok(reminders)
}

/// Feedback reminders: `fire_at = starts_at + duration + delay`.
fn feedback_reminders(
    conn: &Connection,
    now: DateTime<Utc>,
    end: DateTime<Utc>,
    delay_minutes: u32,
) -> Result<Vec<Reminder>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, updated_at, \
                starts_at + duration_minutes * 60 + ?1 AS fire_at \
         FROM activities \
         WHERE deleted = 0 \
           AND starts_at + duration_minutes * 60 + ?1 > ?2 \
           AND starts_at + duration_minutes * 60 + ?1 <= ?3",
    )?;
    let delay_secs = i64::from(delay_minutes) * 60;
    let rows = stmt.query_map(params![delay_secs, now.timestamp(), end.timestamp()], |row| {
        let activity_id: String = row.get(0)?;
        let activity_title: String = row.get(1)?;
        let updated_at: i64 = row.get(2)?;
        let fire_at: i64 = row.get(3)?;
        Ok(Reminder {
            fire_at: from_epoch(fire_at),
            source_id: SourceId::for_feedback(&activity_id),
            kind: ReminderKind::Feedback,
            title: "How did it go?".to_owned(),
            body: format!("Leave feedback for {activity_title}"),
            source_updated_at: from_epoch(updated_at),
        })
    })?;

    let mut reminders = Vec::new();
    for r in rows {
        reminders.push(r?);
    }
    Ok(reminders)
}

fn row_to_activity(row: &Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        id: row.get(0)?,
        title: row.get(1)?,
        starts_at: from_epoch(row.get(2)?),
        duration_minutes: row.get(3)?,
    })
}

fn from_epoch(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}
