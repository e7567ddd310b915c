//! Wires the scheduler core to its SQLite-backed ports.

use std::sync::Arc;

use core_types::{AcceleratedClock, Pile, PileStatus};
use scheduler::{Scheduler, SchedulerConfig};
use store::SqliteStore;

use crate::config::AppConfig;
use crate::error::AppError;

/// The core exposed as a plain async API; an HTTP layer, a CLI, or a test
/// harness drives this directly.
pub type ChargingService = Scheduler<AcceleratedClock, SqliteStore>;

pub async fn build_service(cfg: &AppConfig) -> anyhow::Result<(Arc<ChargingService>, Arc<SqliteStore>)> {
    if cfg.piles.is_empty() {
        return Err(AppError::NoPilesConfigured.into());
    }
    let store = Arc::new(SqliteStore::new(&cfg.database_url).await?);

    let seed: Vec<Pile> = cfg
        .piles
        .iter()
        .map(|&(pile_id, kind)| Pile::new(pile_id, kind, PileStatus::Running))
        .collect();
    store.seed_piles(&seed).await?;

    let clock = Arc::new(AcceleratedClock::new(cfg.clock_rate));
    let scheduler_config = SchedulerConfig {
        waiting_area_capacity: cfg.waiting_area_capacity,
        ..SchedulerConfig::default()
    };

    let scheduler = Scheduler::new(scheduler_config, clock, store.clone(), store.as_ref()).await?;
    Ok((Arc::new(scheduler), store))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_a_config_with_no_piles() {
        let mut cfg = AppConfig::from_env();
        cfg.database_url = "sqlite::memory:".to_string();
        cfg.piles.clear();

        let result = build_service(&cfg).await;
        assert!(result.is_err());
        assert!(result.err().unwrap().downcast::<AppError>().is_ok());
    }
}
