use rust_decimal::Decimal;

use core_types::{MockInstant, PileKind};

/// Where a request currently sits in the dispatch pipeline.
///
/// Collapses the source's independent mutable flags (`executing`,
/// `in_pile_queue`, `removed`, `fail_flag`, `requeue_flag`) into one tagged
/// state so illegal combinations (e.g. executing but not in a pile queue)
/// are unrepresentable.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestStage {
    /// Sitting in `WaitingArea[kind]`. `requeue_origin` is set when this
    /// request was re-admitted after a kind-changing `update_request`.
    WaitingStage1 { requeue_origin: bool },
    /// In a `PileQueue` but not yet the executing head.
    Queued { pile_id: u32 },
    /// The executing head of `pile_id`'s queue; accruing charge since
    /// `begin_time`.
    Executing { pile_id: u32, begin_time: MockInstant },
    /// Displaced by a `brake`/`recover` and waiting in the recovery queue.
    FailRequeue,
    /// Settled or cancelled; retained only long enough to answer a stale
    /// status query before it is dropped from the index.
    Tombstone,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub request_id: u16,
    pub username: String,
    pub kind: PileKind,
    pub amount_kwh: Decimal,
    pub battery_kwh: Decimal,
    pub create_time: MockInstant,
    pub stage: RequestStage,
}

impl Request {
    pub fn is_executing(&self) -> bool {
        matches!(self.stage, RequestStage::Executing { .. })
    }

    pub fn pile_id(&self) -> Option<u32> {
        match self.stage {
            RequestStage::Queued { pile_id } | RequestStage::Executing { pile_id, .. } => {
                Some(pile_id)
            }
            _ => None,
        }
    }
}
