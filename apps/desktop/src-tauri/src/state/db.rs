//! # Database State
//!
//! Wraps the local replica for use in commands.
//!
//! ## Thread Safety
//! The `Database` struct from `ecopila-db` contains a `SqlitePool` which
//! is inherently thread-safe. It is shared with the sync agent through an
//! `Arc`, so the processor and the commands see the same replica.
//!
//! ## Temporary Ids
//! Optimistic creates need an id before the server answers. Ids are
//! minted from the clock and kept strictly increasing, so two creates in
//! the same millisecond (a CSV import) never collide.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use ecopila_core::optimistic_id;
use ecopila_db::Database;

#[derive(Debug)]
pub struct DbState {
    db: Arc<Database>,
    last_temp_id: AtomicI64,
}

impl DbState {
    pub fn new(db: Arc<Database>) -> Self {
        DbState {
            db,
            last_temp_id: AtomicI64::new(0),
        }
    }

    /// Returns a reference to the inner Database.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let productos = db_state.inner().productos().list(&filter).await?;
    /// ```
    pub fn inner(&self) -> &Database {
        &self.db
    }

    /// The shared handle, for the sync agent.
    pub fn shared(&self) -> Arc<Database> {
        self.db.clone()
    }

    /// Mints a temporary id greater than every id minted before.
    pub fn next_temp_id(&self) -> i64 {
        let now = optimistic_id(Utc::now());
        let previous = self
            .last_temp_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now - 1);
        now.max(previous + 1)
    }

    /// Mints `n` consecutive temporary ids.
    pub fn next_temp_ids(&self, n: usize) -> Vec<i64> {
        (0..n).map(|_| self.next_temp_id()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecopila_core::is_optimistic_id;
    use ecopila_db::DbConfig;

    #[tokio::test]
    async fn test_temp_ids_are_unique_and_optimistic() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let state = DbState::new(Arc::new(db));

        let ids = state.next_temp_ids(50);
        assert!(ids.iter().all(|id| is_optimistic_id(*id)));
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }
}
