use std::collections::VecDeque;

use core_types::PileKind;

use crate::request::{Request, RequestStage};

pub const WAITING_AREA_CAPACITY: usize = 20;

/// One kind's FIFO. Cancelled entries are tombstoned in place (so we never
/// pay an O(n) shift to cancel) and lazily dropped the next time they reach
/// the front of the queue.
#[derive(Default)]
struct WaitingQueue {
    items: VecDeque<Request>,
    live_len: usize,
}

impl WaitingQueue {
    fn push(&mut self, r: Request) {
        self.items.push_back(r);
        self.live_len += 1;
    }

    fn pop(&mut self) -> Option<Request> {
        while matches!(
            self.items.front().map(|r| &r.stage),
            Some(RequestStage::Tombstone)
        ) {
            self.items.pop_front();
        }
        let r = self.items.pop_front();
        if r.is_some() {
            self.live_len -= 1;
        }
        r
    }

    /// Tombstones a live entry in place; returns false if not found or
    /// already tombstoned.
    fn tombstone(&mut self, request_id: u16) -> bool {
        if let Some(r) = self.items.iter_mut().find(|r| r.request_id == request_id) {
            if matches!(r.stage, RequestStage::Tombstone) {
                return false;
            }
            r.stage = RequestStage::Tombstone;
            self.live_len -= 1;
            true
        } else {
            false
        }
    }

    /// Count of live predecessors ahead of `request_id`, i.e. its 0-based
    /// position ignoring tombstones.
    fn position_of(&self, request_id: u16) -> Option<usize> {
        let mut ahead = 0;
        for r in &self.items {
            if r.request_id == request_id {
                return Some(ahead);
            }
            if !matches!(r.stage, RequestStage::Tombstone) {
                ahead += 1;
            }
        }
        None
    }

    fn get(&self, request_id: u16) -> Option<&Request> {
        self.items.iter().find(|r| r.request_id == request_id)
    }

    fn set_amount(&mut self, request_id: u16, amount_kwh: rust_decimal::Decimal) -> bool {
        if let Some(r) = self.items.iter_mut().find(|r| r.request_id == request_id) {
            r.amount_kwh = amount_kwh;
            true
        } else {
            false
        }
    }
}

/// Station-wide bounded FIFOs, one per pile kind, gating admission.
#[derive(Default)]
pub struct WaitingArea {
    slow: WaitingQueue,
    fast: WaitingQueue,
}

impl WaitingArea {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, kind: PileKind) -> &WaitingQueue {
        match kind {
            PileKind::Slow => &self.slow,
            PileKind::Fast => &self.fast,
        }
    }

    fn queue_mut(&mut self, kind: PileKind) -> &mut WaitingQueue {
        match kind {
            PileKind::Slow => &mut self.slow,
            PileKind::Fast => &mut self.fast,
        }
    }

    /// Total live occupancy across both kinds; this is the admission gate.
    pub fn total_len(&self) -> usize {
        self.slow.live_len + self.fast.live_len
    }

    pub fn push(&mut self, kind: PileKind, r: Request) {
        self.queue_mut(kind).push(r);
    }

    pub fn pop(&mut self, kind: PileKind) -> Option<Request> {
        self.queue_mut(kind).pop()
    }

    pub fn peek_nonempty(&self, kind: PileKind) -> bool {
        self.queue(kind).live_len > 0
    }

    /// Tombstones a waiting request by id; returns whether it was found.
    pub fn remove(&mut self, kind: PileKind, request_id: u16) -> bool {
        self.queue_mut(kind).tombstone(request_id)
    }

    pub fn position_of(&self, kind: PileKind, request_id: u16) -> Option<usize> {
        self.queue(kind).position_of(request_id)
    }

    pub fn get(&self, kind: PileKind, request_id: u16) -> Option<&Request> {
        self.queue(kind).get(request_id)
    }

    pub fn set_amount(&mut self, kind: PileKind, request_id: u16, amount_kwh: rust_decimal::Decimal) -> bool {
        self.queue_mut(kind).set_amount(request_id, amount_kwh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn req(id: u16) -> Request {
        Request {
            request_id: id,
            username: format!("user{id}"),
            kind: PileKind::Slow,
            amount_kwh: dec!(5.0),
            battery_kwh: dec!(60.0),
            create_time: Utc::now(),
            stage: RequestStage::WaitingStage1 {
                requeue_origin: false,
            },
        }
    }

    #[test]
    fn fifo_order_preserved() {
        let mut wa = WaitingArea::new();
        wa.push(PileKind::Slow, req(1));
        wa.push(PileKind::Slow, req(2));
        assert_eq!(wa.pop(PileKind::Slow).unwrap().request_id, 1);
        assert_eq!(wa.pop(PileKind::Slow).unwrap().request_id, 2);
    }

    #[test]
    fn tombstone_is_skipped_on_pop() {
        let mut wa = WaitingArea::new();
        wa.push(PileKind::Slow, req(1));
        wa.push(PileKind::Slow, req(2));
        assert!(wa.remove(PileKind::Slow, 1));
        assert_eq!(wa.total_len(), 1);
        assert_eq!(wa.pop(PileKind::Slow).unwrap().request_id, 2);
    }

    #[test]
    fn position_of_ignores_tombstones() {
        let mut wa = WaitingArea::new();
        wa.push(PileKind::Slow, req(1));
        wa.push(PileKind::Slow, req(2));
        wa.push(PileKind::Slow, req(3));
        wa.remove(PileKind::Slow, 1);
        assert_eq!(wa.position_of(PileKind::Slow, 2), Some(0));
        assert_eq!(wa.position_of(PileKind::Slow, 3), Some(1));
    }

    #[test]
    fn kinds_are_independent() {
        let mut wa = WaitingArea::new();
        wa.push(PileKind::Slow, req(1));
        wa.push(PileKind::Fast, req(2));
        assert_eq!(wa.total_len(), 2);
        assert_eq!(wa.pop(PileKind::Slow).unwrap().request_id, 1);
        assert_eq!(wa.total_len(), 1);
    }
}
