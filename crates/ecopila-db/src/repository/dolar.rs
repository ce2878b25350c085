//! # Dólar Cache Repository
//!
//! Keeps the last rate fetched from `/dolar/dolar` so prices can still be
//! computed offline. A single row; every save overwrites it.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use ecopila_core::Dolar;

/// The cached rate and when it was fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedDolar {
    pub dolar: Dolar,
    pub fetched_at: DateTime<Utc>,
}

impl CachedDolar {
    /// True when the rate is older than `max_age` at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.fetched_at > max_age
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DolarRow {
    dolar_id: i64,
    nombre: String,
    precio_centavos: i64,
    fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DolarRepository {
    pool: SqlitePool,
}

impl DolarRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DolarRepository { pool }
    }

    /// Stores `dolar` as the current rate.
    pub async fn save(&self, dolar: &Dolar, fetched_at: DateTime<Utc>) -> DbResult<()> {
        debug!(precio_centavos = dolar.precio_centavos, "Caching dólar");

        sqlx::query(
            r#"
            INSERT INTO dolar_cache (slot, dolar_id, nombre, precio_centavos, fetched_at)
            VALUES (1, ?1, ?2, ?3, ?4)
            ON CONFLICT (slot) DO UPDATE SET
                dolar_id = excluded.dolar_id,
                nombre = excluded.nombre,
                precio_centavos = excluded.precio_centavos,
                fetched_at = excluded.fetched_at
            "#,
        )
        .bind(dolar.id)
        .bind(&dolar.nombre)
        .bind(dolar.precio_centavos)
        .bind(fetched_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The last saved rate, if any.
    pub async fn latest(&self) -> DbResult<Option<CachedDolar>> {
        let row: Option<DolarRow> = sqlx::query_as(
            "SELECT dolar_id, nombre, precio_centavos, fetched_at FROM dolar_cache WHERE slot = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| CachedDolar {
            dolar: Dolar {
                id: r.dolar_id,
                nombre: r.nombre,
                precio_centavos: r.precio_centavos,
            },
            fetched_at: r.fetched_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::tests::setup;

    fn dolar(centavos: i64) -> Dolar {
        Dolar {
            id: 1,
            nombre: "Valor del Dólar Actual".to_string(),
            precio_centavos: centavos,
        }
    }

    #[tokio::test]
    async fn test_save_overwrites_single_row() {
        let db = setup().await;
        let repo = db.dolar();
        assert!(repo.latest().await.unwrap().is_none());

        let t0 = Utc::now() - Duration::hours(2);
        repo.save(&dolar(105_000), t0).await.unwrap();
        repo.save(&dolar(110_000), Utc::now()).await.unwrap();

        let cached = repo.latest().await.unwrap().unwrap();
        assert_eq!(cached.dolar.precio_centavos, 110_000);
    }

    #[test]
    fn test_is_stale() {
        let now = Utc::now();
        let cached = CachedDolar {
            dolar: dolar(105_000),
            fetched_at: now - Duration::minutes(10),
        };
        assert!(cached.is_stale(now, Duration::minutes(5)));
        assert!(!cached.is_stale(now, Duration::minutes(15)));
    }
}
