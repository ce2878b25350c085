//! # Mutation Queue Repository
//!
//! Persists writes made while the server is unreachable, so they survive a
//! restart and replay in order.
//!
//! ## Entry Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  enqueue ──► pending ──claim──► in_flight ──┬── accepted ──► done      │
//! │                 ▲                           │                           │
//! │                 │                           ├── network error           │
//! │                 └──── mark_retry ───────────┘   (attempts+1)            │
//! │                                             │                           │
//! │                                             └── rejected ──► failed     │
//! │                                                 (never retried,         │
//! │                                                  listed, discardable)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The optimistic local change is written in the same command as the
//! enqueue; rolling it back on `failed` is the processor's job. Only
//! `pending` entries can be cancelled: once claimed, the request may
//! already have reached the server.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use ecopila_core::{MutationEntry, MutationKind, MutationStatus};

const SELECT_ENTRIES: &str = r#"
    SELECT
        id, kind, entity_id, payload, status, attempts, last_error,
        created_at, attempted_at, completed_at
    FROM mutation_queue
"#;

#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    id: String,
    kind: MutationKind,
    entity_id: String,
    payload: String,
    status: MutationStatus,
    attempts: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    attempted_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<EntryRow> for MutationEntry {
    fn from(row: EntryRow) -> Self {
        MutationEntry {
            id: row.id,
            kind: row.kind,
            entity_id: row.entity_id,
            payload: row.payload,
            status: row.status,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            attempted_at: row.attempted_at,
            completed_at: row.completed_at,
        }
    }
}

/// Repository for the persisted mutation queue.
#[derive(Debug, Clone)]
pub struct MutationRepository {
    pool: SqlitePool,
}

impl MutationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MutationRepository { pool }
    }

    /// Queues a mutation.
    ///
    /// ## Arguments
    /// * `kind` - Which endpoint replays it
    /// * `entity_id` - Target row (may be an optimistic id)
    /// * `payload` - JSON request body plus rollback snapshot
    ///
    /// ## Example
    /// ```rust,ignore
    /// let payload = serde_json::to_string(&QueuedProduct { .. })?;
    /// db.mutations()
    ///     .enqueue(MutationKind::CreateProduct, &temp_id.to_string(), &payload)
    ///     .await?;
    /// ```
    pub async fn enqueue(
        &self,
        kind: MutationKind,
        entity_id: &str,
        payload: &str,
    ) -> DbResult<MutationEntry> {
        let entry = MutationEntry {
            id: Uuid::new_v4().to_string(),
            kind,
            entity_id: entity_id.to_string(),
            payload: payload.to_string(),
            status: MutationStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            attempted_at: None,
            completed_at: None,
        };

        debug!(id = %entry.id, kind = %kind, entity_id = %entity_id, "Queuing mutation");

        sqlx::query(
            r#"
            INSERT INTO mutation_queue (
                id, kind, entity_id, payload, status, attempts, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)
            "#,
        )
        .bind(&entry.id)
        .bind(entry.kind)
        .bind(&entry.entity_id)
        .bind(&entry.payload)
        .bind(entry.status)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Pending entries in the order they were queued.
    ///
    /// Ordered by rowid, which follows insertion even within the same
    /// millisecond.
    pub async fn get_pending(&self, limit: u32) -> DbResult<Vec<MutationEntry>> {
        let sql = format!("{SELECT_ENTRIES} WHERE status = 'pending' ORDER BY rowid LIMIT ?1");
        let rows: Vec<EntryRow> = sqlx::query_as(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(MutationEntry::from).collect())
    }

    /// Marks a pending entry as being sent. Returns false when the entry
    /// is gone or no longer pending (cancelled in the meantime).
    pub async fn claim(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE mutation_queue SET status = 'in_flight', attempted_at = ?2
             WHERE id = ?1 AND status = 'pending'",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Puts entries claimed by a run that never finished back in line.
    pub async fn release_in_flight(&self) -> DbResult<u64> {
        let result =
            sqlx::query("UPDATE mutation_queue SET status = 'pending' WHERE status = 'in_flight'")
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Drops every pending entry for `entity_id`, but only while its
    /// `create_kind` entry is still pending. One statement, so a
    /// concurrent [`claim`](Self::claim) either wins or loses entirely.
    ///
    /// ## Returns
    /// Number of entries removed; zero when the create was already claimed
    /// or never queued.
    pub async fn cancel_unclaimed_create(
        &self,
        create_kind: MutationKind,
        entity_id: &str,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            "DELETE FROM mutation_queue
             WHERE status = 'pending' AND entity_id = ?1
               AND EXISTS (
                   SELECT 1 FROM mutation_queue
                   WHERE status = 'pending' AND kind = ?2 AND entity_id = ?1
               )",
        )
        .bind(entity_id)
        .bind(create_kind)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<MutationEntry>> {
        let sql = format!("{SELECT_ENTRIES} WHERE id = ?1");
        let row: Option<EntryRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(MutationEntry::from))
    }

    /// The pending entry of `kind` for `entity_id`, if any.
    pub async fn find_pending(
        &self,
        kind: MutationKind,
        entity_id: &str,
    ) -> DbResult<Option<MutationEntry>> {
        let sql = format!(
            "{SELECT_ENTRIES} WHERE status = 'pending' AND kind = ?1 AND entity_id = ?2
             ORDER BY rowid LIMIT 1"
        );
        let row: Option<EntryRow> = sqlx::query_as(&sql)
            .bind(kind)
            .bind(entity_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(MutationEntry::from))
    }

    /// Every pending entry that targets `entity_id`.
    pub async fn pending_for_entity(&self, entity_id: &str) -> DbResult<Vec<MutationEntry>> {
        let sql = format!(
            "{SELECT_ENTRIES} WHERE status = 'pending' AND entity_id = ?1 ORDER BY rowid"
        );
        let rows: Vec<EntryRow> = sqlx::query_as(&sql)
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(MutationEntry::from).collect())
    }

    /// The server accepted the entry.
    pub async fn mark_done(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE mutation_queue SET
                status = 'done', attempts = attempts + 1,
                attempted_at = ?2, completed_at = ?2, last_error = NULL
             WHERE id = ?1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Mutation", id));
        }
        Ok(())
    }

    /// A network error: count the attempt, put the entry back in line.
    pub async fn mark_retry(&self, id: &str, error: &str) -> DbResult<()> {
        self.update_status(
            id,
            "UPDATE mutation_queue SET
                status = 'pending', attempts = attempts + 1,
                attempted_at = ?2, last_error = ?3
             WHERE id = ?1",
            error,
        )
        .await
    }

    /// The server rejected the entry. Terminal.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        self.update_status(
            id,
            "UPDATE mutation_queue SET
                status = 'failed', attempts = attempts + 1,
                attempted_at = ?2, completed_at = ?2, last_error = ?3
             WHERE id = ?1",
            error,
        )
        .await
    }

    /// Runs a status update bound as `(id, now, error)`.
    async fn update_status(&self, id: &str, sql: &str, error: &str) -> DbResult<()> {
        let result = sqlx::query(sql)
            .bind(id)
            .bind(Utc::now())
            .bind(error)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Mutation", id));
        }
        Ok(())
    }

    /// Points pending entries at the server id once a create is confirmed.
    ///
    /// Updates `entity_id` and every occurrence of the temporary id in the
    /// payload (relations, sales). Optimistic ids are 13-digit timestamps,
    /// so the textual replace cannot hit a price or a quantity.
    pub async fn rekey_entity(&self, temp_id: i64, server_id: i64) -> DbResult<u64> {
        let temp = temp_id.to_string();
        let server = server_id.to_string();

        let result = sqlx::query(
            "UPDATE mutation_queue SET
                entity_id = CASE WHEN entity_id = ?1 THEN ?2 ELSE entity_id END,
                payload = replace(payload, ?1, ?2)
             WHERE status = 'pending' AND (entity_id = ?1 OR instr(payload, ?1) > 0)",
        )
        .bind(&temp)
        .bind(&server)
        .execute(&self.pool)
        .await?;

        debug!(temp_id, server_id, rows = result.rows_affected(), "Re-keyed queued mutations");
        Ok(result.rows_affected())
    }

    /// Entries the server has not answered yet, in flight included.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM mutation_queue WHERE status IN ('pending', 'in_flight')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn count_failed(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM mutation_queue WHERE status = 'failed'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Rejected entries, newest first, for the sync panel.
    pub async fn list_failed(&self) -> DbResult<Vec<MutationEntry>> {
        let sql = format!("{SELECT_ENTRIES} WHERE status = 'failed' ORDER BY rowid DESC");
        let rows: Vec<EntryRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(MutationEntry::from).collect())
    }

    /// Removes an entry whatever its status.
    pub async fn discard(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM mutation_queue WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Mutation", id));
        }
        debug!(id, "Discarded mutation");
        Ok(())
    }

    /// Deletes entries completed more than `days_old` days ago.
    ///
    /// ## Returns
    /// Number of deleted entries.
    pub async fn cleanup_completed(&self, days_old: u32) -> DbResult<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(days_old));
        let result = sqlx::query(
            "DELETE FROM mutation_queue WHERE status = 'done' AND completed_at < ?1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
