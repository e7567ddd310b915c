//! SQLite-backed persistence.
//!
//! Piles are read-only configuration from the core's perspective: they are
//! seeded once (`seed_piles`) and then only ever read back through
//! `PileRepository::list_all`. Orders are an append-only settlement log.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

use billing::{Order, OrderRepository};
use core_types::{Pile, PileKind, PileRepository, PileStatus};

use crate::schema;

pub struct SqliteStore {
    pool: SqlitePool,
}

fn kind_to_str(kind: PileKind) -> &'static str {
    match kind {
        PileKind::Slow => "slow",
        PileKind::Fast => "fast",
    }
}

fn kind_from_str(s: &str) -> anyhow::Result<PileKind> {
    match s {
        "slow" => Ok(PileKind::Slow),
        "fast" => Ok(PileKind::Fast),
        other => Err(anyhow::anyhow!("unknown pile kind '{other}'")),
    }
}

fn status_to_str(status: PileStatus) -> &'static str {
    match status {
        PileStatus::Running => "running",
        PileStatus::Shutdown => "shutdown",
        PileStatus::Unavailable => "unavailable",
    }
}

fn status_from_str(s: &str) -> anyhow::Result<PileStatus> {
    match s {
        "running" => Ok(PileStatus::Running),
        "shutdown" => Ok(PileStatus::Shutdown),
        "unavailable" => Ok(PileStatus::Unavailable),
        other => Err(anyhow::anyhow!("unknown pile status '{other}'")),
    }
}

impl SqliteStore {
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connects (creating the database file if missing, via a
    /// `?mode=rwc` URL) and ensures the schema exists.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        schema::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Inserts `piles` if the table is empty. No-op on a database that
    /// already has pile rows, so restarts don't reset status/counters.
    pub async fn seed_piles(&self, piles: &[Pile]) -> anyhow::Result<()> {
        let count: i64 = sqlx::query("SELECT COUNT(*) FROM piles")
            .fetch_one(&self.pool)
            .await?
            .get(0);
        if count > 0 {
            return Ok(());
        }

        for pile in piles {
            sqlx::query(
                "INSERT INTO piles (pile_id, kind, status, usage_count, charging_seconds, kwh_delivered)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(pile.pile_id)
            .bind(kind_to_str(pile.kind))
            .bind(status_to_str(pile.status))
            .bind(pile.usage_count as i64)
            .bind(pile.charging_seconds)
            .bind(pile.kwh_delivered.to_string())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PileRepository for SqliteStore {
    async fn list_all(&self) -> anyhow::Result<Vec<Pile>> {
        let rows = sqlx::query("SELECT * FROM piles ORDER BY pile_id")
            .fetch_all(&self.pool)
            .await?;

        let mut piles = Vec::with_capacity(rows.len());
        for row in rows {
            let pile_id: i64 = row.get("pile_id");
            let kind: String = row.get("kind");
            let status: String = row.get("status");
            let usage_count: i64 = row.get("usage_count");
            let charging_seconds: i64 = row.get("charging_seconds");
            let kwh_delivered: String = row.get("kwh_delivered");

            piles.push(Pile {
                pile_id: pile_id as u32,
                kind: kind_from_str(&kind)?,
                status: status_from_str(&status)?,
                usage_count: usage_count as u64,
                charging_seconds,
                kwh_delivered: Decimal::from_str(&kwh_delivered)?,
            });
        }
        Ok(piles)
    }
}

#[async_trait]
impl OrderRepository for SqliteStore {
    async fn save(&self, order: &Order) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO orders (
                order_id, username, pile_id, create_time, begin_time, end_time,
                charged_amount_kwh, charged_seconds, charging_cost, service_cost, total_cost
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(order.order_id as i64)
        .bind(&order.username)
        .bind(order.pile_id)
        .bind(order.create_time.to_rfc3339())
        .bind(order.begin_time.to_rfc3339())
        .bind(order.end_time.to_rfc3339())
        .bind(order.charged_amount_kwh.to_string())
        .bind(order.charged_seconds)
        .bind(order.charging_cost.to_string())
        .bind(order.service_cost.to_string())
        .bind(order.total_cost.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    async fn in_memory_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn seed_then_list_round_trips() {
        let store = in_memory_store().await;
        let piles = vec![
            Pile::new(1, PileKind::Slow, PileStatus::Running),
            Pile::new(2, PileKind::Fast, PileStatus::Running),
        ];
        store.seed_piles(&piles).await.unwrap();

        let loaded = store.list_all().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].pile_id, 1);
        assert_eq!(loaded[0].kind, PileKind::Slow);
        assert_eq!(loaded[1].kind, PileKind::Fast);
    }

    #[tokio::test]
    async fn seed_is_idempotent() {
        let store = in_memory_store().await;
        let piles = vec![Pile::new(1, PileKind::Slow, PileStatus::Running)];
        store.seed_piles(&piles).await.unwrap();
        store.seed_piles(&piles).await.unwrap();
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn save_order_persists_all_fields() {
        let store = in_memory_store().await;
        let now = Utc::now();
        let order = Order {
            order_id: 1,
            username: "alice".to_string(),
            pile_id: 1,
            create_time: now,
            begin_time: now,
            end_time: now,
            charged_amount_kwh: dec!(5.00),
            charged_seconds: 600,
            charging_cost: dec!(2.00),
            service_cost: dec!(4.00),
            total_cost: dec!(6.00),
        };
        store.save(&order).await.unwrap();

        let row = sqlx::query("SELECT * FROM orders WHERE order_id = 1")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        let username: String = row.get("username");
        assert_eq!(username, "alice");
    }
}
