use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PileKind {
    Slow,
    Fast,
}

impl PileKind {
    /// Power rating in kW for this kind of pile.
    pub fn power_kw(&self) -> u32 {
        match self {
            PileKind::Slow => 30,
            PileKind::Fast => 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PileStatus {
    Running,
    Shutdown,
    Unavailable,
}

impl PileStatus {
    /// SHUTDOWN and UNAVAILABLE are operationally equivalent to the scheduler.
    pub fn is_broken(&self) -> bool {
        !matches!(self, PileStatus::Running)
    }
}

/// A physical charging pile, configured at startup and mutated only through
/// `brake`/`recover` (status) and settlement (counters).
#[derive(Debug, Clone)]
pub struct Pile {
    pub pile_id: u32,
    pub kind: PileKind,
    pub status: PileStatus,
    pub usage_count: u64,
    pub charging_seconds: i64,
    pub kwh_delivered: Money,
}

impl Pile {
    pub fn new(pile_id: u32, kind: PileKind, status: PileStatus) -> Self {
        Self {
            pile_id,
            kind,
            status,
            usage_count: 0,
            charging_seconds: 0,
            kwh_delivered: Money::ZERO,
        }
    }

    pub fn record_settlement(&mut self, charged_seconds: i64, charged_amount: Money) {
        self.usage_count += 1;
        self.charging_seconds += charged_seconds;
        self.kwh_delivered += charged_amount;
    }
}

/// Enumerates the piles configured for this station. Called once at
/// construction; the core never writes through this port.
#[async_trait]
pub trait PileRepository: Send + Sync {
    async fn list_all(&self) -> anyhow::Result<Vec<Pile>>;
}
