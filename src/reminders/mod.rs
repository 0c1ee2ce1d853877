use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, RunQueryDsl};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde::Serialize;
use tracing::info;

use crate::admission::AdmissionGuard;
use crate::error::{RemindBotError, Result};
use crate::recurrence::{RecurrenceKind, RecurrenceRule};

mod schema;
use schema::reminders;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

type SqliteAsyncConn = SyncConnectionWrapper<SqliteConnection>;
type SqlitePool = Pool<SqliteAsyncConn>;
type SqlitePooledConn<'a> = PooledConnection<'a, SqliteAsyncConn>;

/// One persisted version of a reminder. `fire_at` always holds the next
/// pending occurrence; past occurrences of a recurring reminder are implied
/// by `last_fired_at`.
#[derive(Debug, Clone, Serialize)]
pub struct Reminder {
    pub id: i32,
    pub chat_id: i64,
    pub task: String,
    pub context: Option<String>,
    pub fire_at: DateTime<Utc>,
    pub fired: bool,
    pub recurrence: Option<RecurrenceRule>,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub version: i32,
    pub original_id: Option<i32>,
    pub is_current_version: bool,
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }
}

/// Field overrides applied by an edit. Unset fields carry over from the
/// prior version, recurrence included.
#[derive(Debug, Clone, Default)]
pub struct ReminderChanges {
    pub task: Option<String>,
    pub fire_at: Option<DateTime<Utc>>,
    pub context: Option<String>,
}

#[derive(Queryable)]
struct ReminderRow {
    id: i32,
    chat_id: i64,
    task: String,
    context: Option<String>,
    fire_at: i64,
    fired: bool,
    recurrence_kind: Option<String>,
    recurrence_interval: Option<i32>,
    recurrence_weekdays: Option<String>,
    recurrence_ends_at: Option<i64>,
    last_fired_at: Option<i64>,
    deleted: bool,
    deleted_at: Option<i64>,
    deleted_by: Option<String>,
    version: i32,
    original_id: Option<i32>,
    is_current_version: bool,
    created_at: i64,
}

#[derive(Insertable)]
#[diesel(table_name = reminders)]
struct NewReminder<'a> {
    chat_id: i64,
    task: &'a str,
    context: Option<&'a str>,
    fire_at: i64,
    fired: bool,
    recurrence_kind: Option<&'a str>,
    recurrence_interval: Option<i32>,
    recurrence_weekdays: Option<String>,
    recurrence_ends_at: Option<i64>,
    last_fired_at: Option<i64>,
    deleted: bool,
    deleted_at: Option<i64>,
    deleted_by: Option<&'a str>,
    version: i32,
    original_id: Option<i32>,
    is_current_version: bool,
    created_at: i64,
}

/// Owns the persisted reminder records, their version chains, soft-delete
/// state, and the admission ceilings guarding creation.
pub struct ReminderStore {
    pool: SqlitePool,
    guard: AdmissionGuard,
}

impl ReminderStore {
    pub async fn new(sqlite_path: impl AsRef<str>) -> Result<Self> {
        Self::with_guard(sqlite_path, AdmissionGuard::default()).await
    }

    pub async fn with_guard(sqlite_path: impl AsRef<str>, guard: AdmissionGuard) -> Result<Self> {
        let sqlite_path = sqlite_path.as_ref();
        ensure_parent_dir(sqlite_path)?;
        run_migrations(sqlite_path).await?;

        let manager = AsyncDieselConnectionManager::<SqliteAsyncConn>::new(sqlite_path);
        let pool: SqlitePool = Pool::builder()
            .build(manager)
            .await
            .map_err(|e| RemindBotError::Storage(e.to_string()))?;
        Ok(Self { pool, guard })
    }

    /// Creates version 1 of a new reminder. The admission ceilings are
    /// checked inside the same transaction as the insert so a racing create
    /// cannot slip past them.
    pub async fn create(
        &self,
        chat_id: i64,
        task: &str,
        context: Option<&str>,
        fire_at: DateTime<Utc>,
        recurrence: Option<&RecurrenceRule>,
        now: DateTime<Utc>,
    ) -> Result<i32> {
        if fire_at <= now {
            return Err(RemindBotError::Validation(format!(
                "fire time {fire_at} is not in the future"
            )));
        }
        if let Some(rule) = recurrence {
            rule.validate()?;
        }

        let guard = &self.guard;
        let mut conn = self.conn().await?;
        let id = conn
            .transaction::<i32, RemindBotError, _>(|conn| {
                async move {
                    let active: i64 = reminders::table
                        .filter(reminders::chat_id.eq(chat_id))
                        .filter(reminders::deleted.eq(false))
                        .filter(reminders::is_current_version.eq(true))
                        .count()
                        .get_result(conn)
                        .await?;
                    guard.admit(chat_id, active, now)?;

                    let new = NewReminder {
                        chat_id,
                        task,
                        context,
                        fire_at: fire_at.timestamp(),
                        fired: false,
                        recurrence_kind: recurrence.map(|r| r.kind.as_str()),
                        recurrence_interval: recurrence.map(|r| r.interval as i32),
                        recurrence_weekdays: recurrence.and_then(encode_weekdays),
                        recurrence_ends_at: recurrence
                            .and_then(|r| r.ends_at)
                            .map(|t| t.timestamp()),
                        last_fired_at: None,
                        deleted: false,
                        deleted_at: None,
                        deleted_by: None,
                        version: 1,
                        original_id: None,
                        is_current_version: true,
                        created_at: now.timestamp(),
                    };
                    diesel::insert_into(reminders::table)
                        .values(&new)
                        .execute(conn)
                        .await?;

                    let id: i32 = reminders::table
                        .select(reminders::id)
                        .order(reminders::id.desc())
                        .first(conn)
                        .await?;
                    Ok(id)
                }
                .scope_boxed()
            })
            .await?;

        info!(reminder_id = id, chat_id, "reminder created");
        Ok(id)
    }

    /// Supersedes the current version of `id` with a new row. The prior row
    /// is never mutated beyond its `is_current_version` flag; both steps
    /// happen in one transaction so readers never observe a chain without a
    /// current member.
    pub async fn edit(
        &self,
        id: i32,
        chat_id: i64,
        changes: ReminderChanges,
        now: DateTime<Utc>,
    ) -> Result<i32> {
        if let Some(fire_at) = changes.fire_at {
            if fire_at <= now {
                return Err(RemindBotError::Validation(format!(
                    "fire time {fire_at} is not in the future"
                )));
            }
        }

        let mut conn = self.conn().await?;
        let changes = &changes;
        let new_id = conn
            .transaction::<i32, RemindBotError, _>(|conn| {
                async move {
                    let prior: ReminderRow = reminders::table
                        .filter(reminders::id.eq(id))
                        .filter(reminders::chat_id.eq(chat_id))
                        .filter(reminders::deleted.eq(false))
                        .filter(reminders::is_current_version.eq(true))
                        .first(conn)
                        .await
                        .optional()?
                        .ok_or_else(|| {
                            RemindBotError::NotFound(format!(
                                "no current reminder {id} for chat {chat_id}"
                            ))
                        })?;

                    diesel::update(reminders::table.filter(reminders::id.eq(id)))
                        .set(reminders::is_current_version.eq(false))
                        .execute(conn)
                        .await?;

                    let new = NewReminder {
                        chat_id,
                        task: changes.task.as_deref().unwrap_or(&prior.task),
                        context: changes.context.as_deref().or(prior.context.as_deref()),
                        fire_at: changes
                            .fire_at
                            .map(|t| t.timestamp())
                            .unwrap_or(prior.fire_at),
                        fired: false,
                        recurrence_kind: prior.recurrence_kind.as_deref(),
                        recurrence_interval: prior.recurrence_interval,
                        recurrence_weekdays: prior.recurrence_weekdays.clone(),
                        recurrence_ends_at: prior.recurrence_ends_at,
                        last_fired_at: None,
                        deleted: false,
                        deleted_at: None,
                        deleted_by: None,
                        version: prior.version + 1,
                        original_id: Some(prior.original_id.unwrap_or(prior.id)),
                        is_current_version: true,
                        created_at: now.timestamp(),
                    };
                    diesel::insert_into(reminders::table)
                        .values(&new)
                        .execute(conn)
                        .await?;

                    let new_id: i32 = reminders::table
                        .select(reminders::id)
                        .order(reminders::id.desc())
                        .first(conn)
                        .await?;
                    Ok(new_id)
                }
                .scope_boxed()
            })
            .await?;

        info!(reminder_id = id, new_id, chat_id, "reminder edited");
        Ok(new_id)
    }

    /// Marks one reminder deleted. Returns false when it was already deleted
    /// or never existed; repeated calls are no-ops.
    pub async fn soft_delete(
        &self,
        id: i32,
        chat_id: i64,
        actor: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.conn().await?;
        let updated = diesel::update(
            reminders::table
                .filter(reminders::id.eq(id))
                .filter(reminders::chat_id.eq(chat_id))
                .filter(reminders::deleted.eq(false)),
        )
        .set((
            reminders::deleted.eq(true),
            reminders::deleted_at.eq(Some(now.timestamp())),
            reminders::deleted_by.eq(actor),
        ))
        .execute(&mut conn)
        .await?;
        if updated > 0 {
            info!(reminder_id = id, chat_id, actor, "reminder soft-deleted");
        }
        Ok(updated > 0)
    }

    /// Soft-deletes every current, unfired reminder of a chat. Recurring
    /// reminders between occurrences count as unfired and are included;
    /// already-deleted and finalized rows are not touched.
    pub async fn bulk_soft_delete(
        &self,
        chat_id: i64,
        actor: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut conn = self.conn().await?;
        let count = diesel::update(
            reminders::table
                .filter(reminders::chat_id.eq(chat_id))
                .filter(reminders::deleted.eq(false))
                .filter(reminders::is_current_version.eq(true))
                .filter(reminders::fired.eq(false)),
        )
        .set((
            reminders::deleted.eq(true),
            reminders::deleted_at.eq(Some(now.timestamp())),
            reminders::deleted_by.eq(actor),
        ))
        .execute(&mut conn)
        .await?;
        info!(chat_id, count, actor, "bulk soft-delete");
        Ok(count)
    }

    /// Current, non-deleted reminders whose next occurrence falls within
    /// `horizon_days` of `now`, soonest first.
    pub async fn list_upcoming(
        &self,
        chat_id: i64,
        horizon_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reminder>> {
        let lo = now.timestamp();
        let hi = (now + Duration::days(horizon_days)).timestamp();
        let mut conn = self.conn().await?;
        let rows: Vec<ReminderRow> = reminders::table
            .filter(reminders::chat_id.eq(chat_id))
            .filter(reminders::deleted.eq(false))
            .filter(reminders::is_current_version.eq(true))
            .filter(
                reminders::recurrence_kind
                    .is_null()
                    .and(reminders::fired.eq(false))
                    .and(reminders::fire_at.gt(lo))
                    .and(reminders::fire_at.le(hi))
                    .or(reminders::recurrence_kind
                        .is_not_null()
                        .and(reminders::fire_at.le(hi))),
            )
            .order(reminders::fire_at.asc())
            .load(&mut conn)
            .await?;
        rows.into_iter().map(map_row).collect()
    }

    /// Reminders that should notify now: unfired one-shots past their fire
    /// time, and recurring reminders not yet notified for the pending
    /// occurrence. Longest overdue first.
    pub async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let mut conn = self.conn().await?;
        let rows: Vec<ReminderRow> = reminders::table
            .filter(reminders::deleted.eq(false))
            .filter(reminders::is_current_version.eq(true))
            .filter(reminders::fire_at.le(now.timestamp()))
            .filter(
                reminders::recurrence_kind
                    .is_null()
                    .and(reminders::fired.eq(false))
                    .or(reminders::recurrence_kind.is_not_null().and(
                        reminders::last_fired_at
                            .is_null()
                            .or(reminders::last_fired_at.lt(reminders::fire_at.nullable())),
                    )),
            )
            .order(reminders::fire_at.asc())
            .load(&mut conn)
            .await?;
        rows.into_iter().map(map_row).collect()
    }

    /// Marks a one-shot reminder notified. Already-fired rows stay fired, so
    /// a retried dispatch cannot double-notify.
    pub async fn mark_fired_oneshot(&self, id: i32) -> Result<()> {
        let mut conn = self.conn().await?;
        diesel::update(reminders::table.filter(reminders::id.eq(id)))
            .set(reminders::fired.eq(true))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Moves a recurring reminder to its next occurrence, or finalizes it
    /// when the rule produced none. The same row is updated in place; only
    /// edits spawn new versions.
    pub async fn advance_recurring(
        &self,
        id: i32,
        next_fire_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn().await?;
        match next_fire_at {
            Some(next) => {
                diesel::update(reminders::table.filter(reminders::id.eq(id)))
                    .set((
                        reminders::fire_at.eq(next.timestamp()),
                        reminders::fired.eq(false),
                        reminders::last_fired_at.eq(Some(now.timestamp())),
                    ))
                    .execute(&mut conn)
                    .await?;
                info!(reminder_id = id, next = %next, "recurring reminder advanced");
            }
            None => {
                diesel::update(reminders::table.filter(reminders::id.eq(id)))
                    .set((
                        reminders::fired.eq(true),
                        reminders::last_fired_at.eq(Some(now.timestamp())),
                    ))
                    .execute(&mut conn)
                    .await?;
                info!(reminder_id = id, "recurring reminder reached its end date");
            }
        }
        Ok(())
    }

    /// The current, non-deleted version of `id`, if any.
    pub async fn get_current(&self, id: i32, chat_id: i64) -> Result<Option<Reminder>> {
        let mut conn = self.conn().await?;
        let row: Option<ReminderRow> = reminders::table
            .filter(reminders::id.eq(id))
            .filter(reminders::chat_id.eq(chat_id))
            .filter(reminders::deleted.eq(false))
            .filter(reminders::is_current_version.eq(true))
            .first(&mut conn)
            .await
            .optional()?;
        row.map(map_row).transpose()
    }

    /// Every version in the chain containing `id`, oldest first. Deleted and
    /// superseded rows are included; this is the audit view.
    pub async fn version_history(&self, id: i32) -> Result<Vec<Reminder>> {
        let mut conn = self.conn().await?;
        let row: Option<ReminderRow> = reminders::table
            .filter(reminders::id.eq(id))
            .first(&mut conn)
            .await
            .optional()?;
        let Some(row) = row else {
            return Ok(Vec::new());
        };
        let root = row.original_id.unwrap_or(row.id);
        let rows: Vec<ReminderRow> = reminders::table
            .filter(
                reminders::id
                    .eq(root)
                    .or(reminders::original_id.eq(Some(root))),
            )
            .order(reminders::version.asc())
            .load(&mut conn)
            .await?;
        rows.into_iter().map(map_row).collect()
    }

    /// Current, non-deleted reminder count for a chat (fired or not).
    pub async fn active_count(&self, chat_id: i64) -> Result<i64> {
        let mut conn = self.conn().await?;
        let count = reminders::table
            .filter(reminders::chat_id.eq(chat_id))
            .filter(reminders::deleted.eq(false))
            .filter(reminders::is_current_version.eq(true))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count)
    }

    async fn conn(&self) -> Result<SqlitePooledConn<'_>> {
        self.pool
            .get()
            .await
            .map_err(|e| RemindBotError::Storage(e.to_string()))
    }
}

fn encode_weekdays(rule: &RecurrenceRule) -> Option<String> {
    rule.weekdays.as_ref().map(|days| {
        days.iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(",")
    })
}

fn decode_weekdays(raw: &str) -> Result<Vec<u8>> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<u8>()
                .map_err(|_| RemindBotError::Storage(format!("corrupt weekday set: {raw}")))
        })
        .collect()
}

fn decode_instant(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| RemindBotError::Storage(format!("corrupt timestamp: {secs}")))
}

fn map_row(row: ReminderRow) -> Result<Reminder> {
    let recurrence = match row.recurrence_kind.as_deref() {
        None => None,
        Some(raw) => {
            let kind = RecurrenceKind::parse(raw)
                .ok_or_else(|| RemindBotError::Storage(format!("corrupt recurrence kind: {raw}")))?;
            let interval = row.recurrence_interval.unwrap_or(1).max(1) as u32;
            let weekdays = row
                .recurrence_weekdays
                .as_deref()
                .map(decode_weekdays)
                .transpose()?;
            let ends_at = row.recurrence_ends_at.map(decode_instant).transpose()?;
            Some(RecurrenceRule {
                kind,
                interval,
                weekdays,
                ends_at,
            })
        }
    };

    Ok(Reminder {
        id: row.id,
        chat_id: row.chat_id,
        task: row.task,
        context: row.context,
        fire_at: decode_instant(row.fire_at)?,
        fired: row.fired,
        recurrence,
        last_fired_at: row.last_fired_at.map(decode_instant).transpose()?,
        deleted: row.deleted,
        deleted_at: row.deleted_at.map(decode_instant).transpose()?,
        deleted_by: row.deleted_by,
        version: row.version,
        original_id: row.original_id,
        is_current_version: row.is_current_version,
        created_at: decode_instant(row.created_at)?,
    })
}

fn ensure_parent_dir(path: &str) -> Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| RemindBotError::Storage(e.to_string()))?;
    }
    Ok(())
}

async fn run_migrations(database_url: &str) -> Result<()> {
    let database_url = database_url.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = SqliteConnection::establish(&database_url)
            .map_err(|e| RemindBotError::Storage(e.to_string()))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| RemindBotError::Storage(e.to_string()))?;
        Ok::<_, RemindBotError>(())
    })
    .await
    .map_err(|e| RemindBotError::Storage(e.to_string()))??;
    Ok(())
}
