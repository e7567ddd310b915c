use rust_decimal::Decimal;

use core_types::MockInstant;

use crate::request::{Request, RequestStage};

pub const PILE_QUEUE_CAPACITY: usize = 5;

/// A single pile's short bounded FIFO. Invariant: whenever non-empty, the
/// head (`items[0]`) is the one `Executing`; every other entry is `Queued`.
pub struct PileQueue {
    pile_id: u32,
    power_kw: u32,
    capacity: usize,
    items: Vec<Request>,
}

impl PileQueue {
    pub fn new(pile_id: u32, power_kw: u32) -> Self {
        Self {
            pile_id,
            power_kw,
            capacity: PILE_QUEUE_CAPACITY,
            items: Vec::with_capacity(PILE_QUEUE_CAPACITY),
        }
    }

    pub fn pile_id(&self) -> u32 {
        self.pile_id
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn has_room(&self) -> bool {
        self.items.len() < self.capacity
    }

    /// Appends a request, tagging it `Queued`. If the queue was empty, the
    /// new entry is immediately promoted to `Executing`.
    pub fn push(&mut self, mut r: Request, now: MockInstant) {
        r.stage = RequestStage::Queued {
            pile_id: self.pile_id,
        };
        self.items.push(r);
        if self.items.len() == 1 {
            self.promote_head(now);
        }
    }

    /// Evicts the current executing head (if any) and, if the queue is
    /// still non-empty, promotes the new head to `Executing`.
    fn promote_head(&mut self, now: MockInstant) -> Option<Request> {
        let evicted = if self.items.first().is_some_and(Request::is_executing) {
            Some(self.items.remove(0))
        } else {
            None
        };

        if let Some(head) = self.items.first_mut() {
            head.stage = RequestStage::Executing {
                pile_id: self.pile_id,
                begin_time: now,
            };
        }

        evicted
    }

    /// Removes a request by id. If it is the executing head, this runs
    /// `promote_head` so the next entry (if any) takes over; otherwise it
    /// is a plain order-preserving delete.
    pub fn remove(&mut self, request_id: u16, now: MockInstant) -> Option<Request> {
        let pos = self.items.iter().position(|r| r.request_id == request_id)?;
        if pos == 0 {
            self.promote_head(now)
        } else {
            Some(self.items.remove(pos))
        }
    }

    pub fn position_of(&self, request_id: u16) -> Option<usize> {
        self.items.iter().position(|r| r.request_id == request_id)
    }

    pub fn executing_head(&self) -> Option<&Request> {
        self.items.first().filter(|r| r.is_executing())
    }

    /// Sum of estimated finish time across every queued request, using each
    /// request's full originally-requested amount (including the head's —
    /// not its remaining energy). Used by dispatch to rank piles.
    pub fn estimated_finish_seconds(&self) -> Decimal {
        let power = Decimal::from(self.power_kw);
        self.items
            .iter()
            .map(|r| r.amount_kwh / power * Decimal::from(3600))
            .sum()
    }

    /// Drains the queue for `brake`/`recover`. With `include_executing =
    /// false`, the head is left in place (used when the head has already
    /// been dealt with separately, e.g. settled). Must be called *after*
    /// any executing settlement on this pile, or the head would be both
    /// settled and re-queued.
    pub fn fetch_and_clear(&mut self, include_executing: bool) -> Vec<Request> {
        if include_executing || self.items.first().is_none_or(|h| !h.is_executing()) {
            std::mem::take(&mut self.items)
        } else {
            self.items.drain(1..).collect()
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Request> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_types::PileKind;
    use rust_decimal_macros::dec;

    fn req(id: u16, username: &str, amount: Decimal) -> Request {
        Request {
            request_id: id,
            username: username.to_string(),
            kind: PileKind::Slow,
            amount_kwh: amount,
            battery_kwh: dec!(60.0),
            create_time: Utc::now(),
            stage: RequestStage::WaitingStage1 {
                requeue_origin: false,
            },
        }
    }

    #[test]
    fn first_push_promotes_immediately() {
        let mut q = PileQueue::new(1, 30);
        let now = Utc::now();
        q.push(req(1, "alice", dec!(5.0)), now);
        assert!(q.executing_head().is_some());
        assert_eq!(q.executing_head().unwrap().request_id, 1);
    }

    #[test]
    fn second_push_stays_queued() {
        let mut q = PileQueue::new(1, 30);
        let now = Utc::now();
        q.push(req(1, "alice", dec!(5.0)), now);
        q.push(req(2, "bob", dec!(5.0)), now);
        assert_eq!(q.len(), 2);
        assert_eq!(q.executing_head().unwrap().request_id, 1);
    }

    #[test]
    fn removing_head_promotes_next() {
        let mut q = PileQueue::new(1, 30);
        let now = Utc::now();
        q.push(req(1, "alice", dec!(5.0)), now);
        q.push(req(2, "bob", dec!(5.0)), now);
        let removed = q.remove(1, now).unwrap();
        assert_eq!(removed.request_id, 1);
        assert_eq!(q.executing_head().unwrap().request_id, 2);
    }

    #[test]
    fn removing_non_head_preserves_order() {
        let mut q = PileQueue::new(1, 30);
        let now = Utc::now();
        q.push(req(1, "alice", dec!(5.0)), now);
        q.push(req(2, "bob", dec!(5.0)), now);
        q.push(req(3, "carol", dec!(5.0)), now);
        q.remove(2, now);
        assert_eq!(q.len(), 2);
        assert_eq!(q.position_of(1), Some(0));
        assert_eq!(q.position_of(3), Some(1));
    }

    #[test]
    fn estimated_finish_sums_full_amounts() {
        let mut q = PileQueue::new(1, 30);
        let now = Utc::now();
        q.push(req(1, "alice", dec!(30.0)), now); // 1 hour
        q.push(req(2, "bob", dec!(15.0)), now); // 0.5 hour
        assert_eq!(q.estimated_finish_seconds(), dec!(5400));
    }

    #[test]
    fn fetch_and_clear_excluding_executing_keeps_head() {
        let mut q = PileQueue::new(1, 30);
        let now = Utc::now();
        q.push(req(1, "alice", dec!(5.0)), now);
        q.push(req(2, "bob", dec!(5.0)), now);
        let drained = q.fetch_and_clear(false);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].request_id, 2);
        assert_eq!(q.len(), 1);
        assert_eq!(q.executing_head().unwrap().request_id, 1);
    }
}
