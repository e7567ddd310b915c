//! Process configuration, loaded from the environment with the station's
//! defaults as a fallback.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,

    // =========================
    // Clock configuration
    // =========================
    /// Multiple of real time the mock clock advances by.
    pub clock_rate: u32,

    // =========================
    // Scheduler configuration
    // =========================
    pub waiting_area_capacity: usize,

    /// How often the completion watcher checks executing heads.
    pub watcher_poll_interval: Duration,

    // =========================
    // Station layout
    // =========================
    /// `(pile_id, kind)` pairs seeded on first boot.
    pub piles: Vec<(u32, core_types::PileKind)>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://charging_station.db".to_string());

        let clock_rate = std::env::var("CLOCK_RATE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let waiting_area_capacity = std::env::var("WAITING_AREA_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(scheduler::SchedulerConfig::default().waiting_area_capacity);

        let poll_interval_ms = std::env::var("WATCHER_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1_000);

        Self {
            database_url,
            clock_rate,
            waiting_area_capacity,
            watcher_poll_interval: Duration::from_millis(poll_interval_ms),
            piles: vec![
                (1, core_types::PileKind::Slow),
                (2, core_types::PileKind::Slow),
                (3, core_types::PileKind::Fast),
                (4, core_types::PileKind::Fast),
            ],
        }
    }
}
