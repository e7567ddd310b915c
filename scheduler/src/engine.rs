//! The charging scheduler.
//!
//! For every inbound operation it:
//!   1. Locks the scheduler mutex `L` for the whole critical section (and,
//!      for `brake`/`recover`/`complete_due_requests`, the outer control
//!      mutex `M` first — `M` before `L`, never the reverse).
//!   2. Mutates request/pile/queue state and runs a dispatch pass before
//!      releasing `L`.
//!   3. If a request settled, persists the order *after* releasing both
//!      locks, from a payload copied out while still under `L`.
//!
//! `complete_due_requests` is `CompletionWatcher`'s poll entry point: it
//! takes `M` for the whole completed-ids-then-settle round so a concurrent
//! `brake`/`recover` cannot settle the same executing head first and hand
//! the watcher a now-dangling id.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use core_types::{Clock, MockInstant, Pile, PileKind, PileRepository, PileStatus};

use billing::{Order, OrderRepository, calc_cost};

use crate::error::SchedulerError;
use crate::ids::IdAllocator;
use crate::pile_queue::PileQueue;
use crate::request::{Request, RequestStage};
use crate::status::{RequestStatus, RequestStatusKind, SnapshotEntry};
use crate::waiting_area::WaitingArea;

/// Recovery-queue construction strategy used by `brake`. `Priority` is
/// defined for forward compatibility but not wired into any default
/// configuration; `TimeOrdered` is what the station actually runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrakePolicy {
    TimeOrdered,
    Priority,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub waiting_area_capacity: usize,
    pub brake_policy: BrakePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            waiting_area_capacity: crate::waiting_area::WAITING_AREA_CAPACITY,
            brake_policy: BrakePolicy::TimeOrdered,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    TimeOrdered,
    Recovery,
}

#[derive(Default)]
struct KindState {
    mode: Option<Mode>,
    recovery_queue: VecDeque<Request>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Location {
    Waiting(PileKind, bool),
    Pile(u32),
    Recovery(PileKind),
}

struct PileEntry {
    pile: Pile,
    queue: PileQueue,
}

struct SchedulerInner {
    waiting_area: WaitingArea,
    piles: HashMap<u32, PileEntry>,
    id_location: HashMap<u16, Location>,
    id_username: HashMap<u16, String>,
    username_to_id: HashMap<String, u16>,
    kind_state: HashMap<PileKind, KindState>,
    next_order_id: u64,
}

/// Settlement facts copied out under `L`, persisted after it is released.
struct SettlePayload {
    order_id: u64,
    username: String,
    pile_id: u32,
    create_time: MockInstant,
    begin_time: MockInstant,
    end_time: MockInstant,
    amount_kwh: Decimal,
}

pub struct Scheduler<C: Clock, O: OrderRepository> {
    config: SchedulerConfig,
    clock: Arc<C>,
    order_repo: Arc<O>,
    ids: IdAllocator,
    inner: Mutex<SchedulerInner>,
    control: Mutex<()>,
}

fn pick_target_pile(inner: &SchedulerInner, kind: PileKind) -> Option<u32> {
    inner
        .piles
        .values()
        .filter(|e| e.pile.kind == kind && !e.pile.status.is_broken() && e.queue.has_room())
        .min_by(|a, b| {
            a.queue
                .estimated_finish_seconds()
                .cmp(&b.queue.estimated_finish_seconds())
                .then(a.pile.pile_id.cmp(&b.pile.pile_id))
        })
        .map(|e| e.pile.pile_id)
}

fn drain_recovery_for_kind(inner: &mut SchedulerInner, kind: PileKind, now: MockInstant) {
    loop {
        let in_recovery = inner
            .kind_state
            .get(&kind)
            .is_some_and(|s| s.mode.is_some());
        if !in_recovery {
            return;
        }
        let Some(pile_id) = pick_target_pile(inner, kind) else {
            return;
        };
        let req = {
            let state = inner.kind_state.get_mut(&kind).unwrap();
            match state.recovery_queue.pop_front() {
                Some(r) => r,
                None => {
                    state.mode = None;
                    return;
                }
            }
        };
        let request_id = req.request_id;
        inner.piles.get_mut(&pile_id).unwrap().queue.push(req, now);
        inner.id_location.insert(request_id, Location::Pile(pile_id));
    }
}

fn drain_waiting_for_kind(inner: &mut SchedulerInner, kind: PileKind, now: MockInstant) {
    loop {
        let Some(pile_id) = pick_target_pile(inner, kind) else {
            return;
        };
        let Some(req) = inner.waiting_area.pop(kind) else {
            return;
        };
        let request_id = req.request_id;
        inner.piles.get_mut(&pile_id).unwrap().queue.push(req, now);
        inner.id_location.insert(request_id, Location::Pile(pile_id));
    }
}

/// Drains the recovery queue (if any) then the waiting area, for both
/// kinds. Non-blocking, idempotent, always runs while `L` is held.
fn dispatch_pass(inner: &mut SchedulerInner, now: MockInstant) {
    for kind in [PileKind::Slow, PileKind::Fast] {
        drain_recovery_for_kind(inner, kind, now);
        drain_waiting_for_kind(inner, kind, now);
    }
}

/// Ids of every executing head whose accrued mock time has reached its
/// requested energy, as of `now`.
fn due_request_ids(inner: &SchedulerInner, now: MockInstant) -> Vec<u16> {
    inner
        .piles
        .values()
        .filter_map(|entry| {
            let head = entry.queue.executing_head()?;
            let RequestStage::Executing { begin_time, .. } = head.stage else {
                unreachable!("executing_head only returns Executing requests");
            };
            let elapsed_hours =
                Decimal::from((now - begin_time).num_seconds().max(0)) / Decimal::from(3600);
            let delivered = elapsed_hours * Decimal::from(entry.pile.kind.power_kw());
            (delivered >= head.amount_kwh).then_some(head.request_id)
        })
        .collect()
}

impl<C: Clock, O: OrderRepository> Scheduler<C, O> {
    /// Loads the configured piles once, at construction, through `repo`.
    pub async fn new(
        config: SchedulerConfig,
        clock: Arc<C>,
        order_repo: Arc<O>,
        pile_repo: &dyn PileRepository,
    ) -> anyhow::Result<Self> {
        let piles = pile_repo.list_all().await?;
        let mut entries = HashMap::with_capacity(piles.len());
        for pile in piles {
            let queue = PileQueue::new(pile.pile_id, pile.kind.power_kw());
            entries.insert(pile.pile_id, PileEntry { pile, queue });
        }

        Ok(Self {
            config,
            clock,
            order_repo,
            ids: IdAllocator::new(),
            inner: Mutex::new(SchedulerInner {
                waiting_area: WaitingArea::new(),
                piles: entries,
                id_location: HashMap::new(),
                id_username: HashMap::new(),
                username_to_id: HashMap::new(),
                kind_state: HashMap::new(),
                next_order_id: 1,
            }),
            control: Mutex::new(()),
        })
    }

    #[instrument(skip_all)]
    pub async fn submit_request(
        &self,
        kind: PileKind,
        username: impl Into<String>,
        amount_kwh: Decimal,
        battery_kwh: Decimal,
    ) -> anyhow::Result<u16> {
        let username = username.into();
        Ok(self
            .submit_request_with_origin(kind, username, amount_kwh, battery_kwh, false)
            .await?)
    }

    async fn submit_request_with_origin(
        &self,
        kind: PileKind,
        username: String,
        amount_kwh: Decimal,
        battery_kwh: Decimal,
        requeue_origin: bool,
    ) -> Result<u16, SchedulerError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        if inner.username_to_id.contains_key(&username) {
            return Err(SchedulerError::AlreadyRequested);
        }
        if inner.waiting_area.total_len() >= self.config.waiting_area_capacity {
            return Err(SchedulerError::OutOfSpace);
        }

        let id = self.ids.alloc()?;
        let req = Request {
            request_id: id,
            username: username.clone(),
            kind,
            amount_kwh,
            battery_kwh,
            create_time: now,
            stage: RequestStage::WaitingStage1 { requeue_origin },
        };
        inner.username_to_id.insert(username.clone(), id);
        inner.id_username.insert(id, username);
        inner
            .id_location
            .insert(id, Location::Waiting(kind, requeue_origin));
        inner.waiting_area.push(kind, req);

        dispatch_pass(&mut inner, now);
        debug!(request_id = id, "admitted into waiting area");
        Ok(id)
    }

    #[instrument(skip(self))]
    pub async fn end_request(&self, request_id: u16) -> anyhow::Result<()> {
        let now = self.clock.now();
        let settle_payload = {
            let mut inner = self.inner.lock();
            let payload = self.end_request_locked(&mut inner, request_id, now)?;
            dispatch_pass(&mut inner, now);
            payload
        };
        if let Some(payload) = settle_payload {
            self.persist_settlement(payload).await;
        }
        Ok(())
    }

    /// Removes `request_id` from wherever it lives and, if it was the
    /// executing head of a pile, returns the settlement facts for the
    /// caller to persist once `L` is released. Runs no dispatch pass
    /// itself; callers that need one run it after this returns.
    fn end_request_locked(
        &self,
        inner: &mut SchedulerInner,
        request_id: u16,
        now: MockInstant,
    ) -> Result<Option<SettlePayload>, SchedulerError> {
        let location = inner
            .id_location
            .remove(&request_id)
            .ok_or(SchedulerError::MappingNotExisted)?;
        if let Some(username) = inner.id_username.remove(&request_id) {
            inner.username_to_id.remove(&username);
        }
        self.ids.free(request_id);

        let removed = match location {
            Location::Waiting(kind, _) => {
                inner.waiting_area.remove(kind, request_id);
                None
            }
            Location::Pile(pile_id) => {
                let entry = inner
                    .piles
                    .get_mut(&pile_id)
                    .expect("pile exists for a live request assigned to it");
                entry.queue.remove(request_id, now)
            }
            Location::Recovery(kind) => {
                let state = inner
                    .kind_state
                    .get_mut(&kind)
                    .expect("kind state exists for a request in its recovery queue");
                let pos = state
                    .recovery_queue
                    .iter()
                    .position(|r| r.request_id == request_id);
                pos.and_then(|p| state.recovery_queue.remove(p))
            }
        };

        let Some(req) = removed else {
            return Ok(None);
        };
        if !req.is_executing() {
            return Ok(None);
        }

        let pile_id = req.pile_id().expect("executing request carries a pile id");
        let entry = inner.piles.get_mut(&pile_id).expect("pile exists");
        // §9 open question 1: charged_amount is the originally requested
        // amount, not what was actually delivered up to `now`. Preserved
        // for compatibility rather than corrected.
        let charged_seconds = (now - req.create_time).num_seconds().max(0);
        entry.pile.record_settlement(charged_seconds, req.amount_kwh);

        let order_id = inner.next_order_id;
        inner.next_order_id += 1;

        Ok(Some(SettlePayload {
            order_id,
            username: req.username,
            pile_id,
            create_time: req.create_time,
            // §9 open question 2: begin_time is sourced from create_time
            // (admission), not the promotion timestamp.
            begin_time: req.create_time,
            end_time: now,
            amount_kwh: req.amount_kwh,
        }))
    }

    async fn persist_settlement(&self, payload: SettlePayload) {
        let cost = calc_cost(payload.begin_time, payload.end_time, payload.amount_kwh);
        let charged_seconds = (payload.end_time - payload.begin_time).num_seconds().max(0);
        let order = Order {
            order_id: payload.order_id,
            username: payload.username,
            pile_id: payload.pile_id,
            create_time: payload.create_time,
            begin_time: payload.begin_time,
            end_time: payload.end_time,
            charged_amount_kwh: payload.amount_kwh,
            charged_seconds,
            charging_cost: cost.charging,
            service_cost: cost.service,
            total_cost: cost.total,
        };
        if let Err(err) = self.order_repo.save(&order).await {
            warn!(error = %err, order_id = order.order_id, "failed to persist settlement order");
        }
    }

    #[instrument(skip(self, new_amount_kwh))]
    pub async fn update_request(
        &self,
        request_id: u16,
        new_amount_kwh: Decimal,
        new_kind: PileKind,
    ) -> anyhow::Result<()> {
        let now = self.clock.now();
        let requeue = {
            let mut inner = self.inner.lock();
            let location = inner
                .id_location
                .get(&request_id)
                .copied()
                .ok_or(SchedulerError::MappingNotExisted)?;

            match location {
                Location::Pile(_) | Location::Recovery(_) => {
                    return Err(SchedulerError::IllegalUpdate.into());
                }
                Location::Waiting(old_kind, _) if old_kind == new_kind => {
                    inner
                        .waiting_area
                        .set_amount(old_kind, request_id, new_amount_kwh);
                    dispatch_pass(&mut inner, now);
                    None
                }
                Location::Waiting(old_kind, _) => {
                    let (username, battery_kwh) = {
                        let req = inner
                            .waiting_area
                            .get(old_kind, request_id)
                            .expect("located request must be in its waiting queue");
                        (req.username.clone(), req.battery_kwh)
                    };
                    self.end_request_locked(&mut inner, request_id, now)?;
                    dispatch_pass(&mut inner, now);
                    Some((username, battery_kwh))
                }
            }
        };

        if let Some((username, battery_kwh)) = requeue {
            self.submit_request_with_origin(new_kind, username, new_amount_kwh, battery_kwh, true)
                .await?;
        }
        Ok(())
    }

    pub async fn get_request_id_by_username(&self, username: &str) -> anyhow::Result<u16> {
        let inner = self.inner.lock();
        inner
            .username_to_id
            .get(username)
            .copied()
            .ok_or_else(|| SchedulerError::MappingNotExisted.into())
    }

    pub async fn get_request_status(&self, request_id: u16) -> anyhow::Result<RequestStatus> {
        let inner = self.inner.lock();
        let location = inner
            .id_location
            .get(&request_id)
            .copied()
            .ok_or(SchedulerError::MappingNotExisted)?;

        let status = match location {
            Location::Pile(pile_id) => {
                let entry = inner
                    .piles
                    .get(&pile_id)
                    .expect("pile exists for a live request assigned to it");
                if entry
                    .queue
                    .executing_head()
                    .is_some_and(|h| h.request_id == request_id)
                {
                    RequestStatus {
                        status: RequestStatusKind::Charging,
                        position: 0,
                        pile_id: Some(pile_id),
                    }
                } else {
                    let position = entry
                        .queue
                        .position_of(request_id)
                        .expect("located request must be in its pile queue")
                        as i64;
                    RequestStatus {
                        status: RequestStatusKind::WaitingStage2,
                        position,
                        pile_id: Some(pile_id),
                    }
                }
            }
            Location::Recovery(kind) => {
                let state = inner
                    .kind_state
                    .get(&kind)
                    .expect("kind state exists for a request in its recovery queue");
                let position = state
                    .recovery_queue
                    .iter()
                    .position(|r| r.request_id == request_id)
                    .expect("located request must be in its recovery queue")
                    as i64;
                RequestStatus {
                    status: RequestStatusKind::FailRequeue,
                    position,
                    pile_id: None,
                }
            }
            Location::Waiting(kind, requeue_origin) => {
                let ahead = inner
                    .waiting_area
                    .position_of(kind, request_id)
                    .expect("located request must be in its waiting queue")
                    as i64;
                let max_pile_len = inner
                    .piles
                    .values()
                    .map(|e| e.queue.len() as i64)
                    .max()
                    .unwrap_or(0);
                let status = if requeue_origin {
                    RequestStatusKind::ChangeModeRequeue
                } else {
                    RequestStatusKind::WaitingStage1
                };
                RequestStatus {
                    status,
                    position: ahead + max_pile_len,
                    pile_id: None,
                }
            }
        };
        Ok(status)
    }

    /// Ids of every executing head whose accrued mock time has reached its
    /// requested energy, as of `now`.
    pub fn completed_request_ids(&self, now: MockInstant) -> Vec<u16> {
        let inner = self.inner.lock();
        due_request_ids(&inner, now)
    }

    /// Settles every request due as of `now`, with the whole round covered
    /// by `M` so it cannot interleave with `brake`/`recover`. This is the
    /// entry point `CompletionWatcher` polls; calling `completed_request_ids`
    /// and `end_request` separately would let a `brake` land between the two
    /// and settle the same head out from under it.
    #[instrument(skip(self))]
    pub async fn complete_due_requests(&self, now: MockInstant) -> anyhow::Result<()> {
        let settle_payloads = {
            let _control = self.control.lock();
            let mut inner = self.inner.lock();
            let due = due_request_ids(&inner, now);
            let mut payloads = Vec::with_capacity(due.len());
            for request_id in due {
                if let Some(payload) = self.end_request_locked(&mut inner, request_id, now)? {
                    payloads.push(payload);
                }
            }
            dispatch_pass(&mut inner, now);
            payloads
        };
        for payload in settle_payloads {
            self.persist_settlement(payload).await;
        }
        Ok(())
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub async fn snapshot(&self) -> Vec<SnapshotEntry> {
        let inner = self.inner.lock();
        let now = self.clock.now();
        let mut out = Vec::with_capacity(inner.id_location.len());

        for (&request_id, &location) in &inner.id_location {
            let username = inner
                .id_username
                .get(&request_id)
                .cloned()
                .unwrap_or_default();
            let (pile_id, battery_kwh, amount_kwh, create_time) = match location {
                Location::Waiting(kind, _) => {
                    let req = inner
                        .waiting_area
                        .get(kind, request_id)
                        .expect("located request must be in its waiting queue");
                    (None, req.battery_kwh, req.amount_kwh, req.create_time)
                }
                Location::Pile(pile_id) => {
                    let entry = inner.piles.get(&pile_id).expect("pile exists");
                    let req = entry
                        .queue
                        .iter()
                        .find(|r| r.request_id == request_id)
                        .expect("located request must be in its pile queue");
                    (
                        Some(pile_id),
                        req.battery_kwh,
                        req.amount_kwh,
                        req.create_time,
                    )
                }
                Location::Recovery(kind) => {
                    let state = inner.kind_state.get(&kind).expect("kind state exists");
                    let req = state
                        .recovery_queue
                        .iter()
                        .find(|r| r.request_id == request_id)
                        .expect("located request must be in its recovery queue");
                    (None, req.battery_kwh, req.amount_kwh, req.create_time)
                }
            };
            out.push(SnapshotEntry {
                request_id,
                pile_id,
                username,
                battery_kwh,
                amount_kwh,
                waiting_seconds: (now - create_time).num_seconds().max(0),
            });
        }
        out
    }

    /// Moves `request_id`'s remaining requests into the recovery queue
    /// under `kind`, tagging each `FailRequeue`, ordered by `create_time`
    /// ascending with ties by `request_id`.
    fn build_recovery_queue(
        inner: &mut SchedulerInner,
        braked_pile: u32,
        kind: PileKind,
        policy: BrakePolicy,
        include_executing: bool,
    ) {
        let mut drained: Vec<Request> = Vec::new();
        match policy {
            BrakePolicy::Priority => {
                let entry = inner.piles.get_mut(&braked_pile).unwrap();
                drained.extend(entry.queue.fetch_and_clear(include_executing));
            }
            BrakePolicy::TimeOrdered => {
                for entry in inner.piles.values_mut().filter(|e| e.pile.kind == kind) {
                    drained.extend(entry.queue.fetch_and_clear(include_executing));
                }
            }
        }
        for req in drained.iter_mut() {
            req.stage = RequestStage::FailRequeue;
        }
        drained.sort_by(|a, b| {
            a.create_time
                .cmp(&b.create_time)
                .then(a.request_id.cmp(&b.request_id))
        });
        for req in &drained {
            inner.id_location.insert(req.request_id, Location::Recovery(kind));
        }
        inner
            .kind_state
            .entry(kind)
            .or_default()
            .recovery_queue
            .extend(drained);
    }

    #[instrument(skip(self))]
    pub async fn brake(&self, pile_id: u32) -> anyhow::Result<()> {
        let now = self.clock.now();
        let settle_payload = {
            let _control = self.control.lock();
            let mut inner = self.inner.lock();

            let kind = inner
                .piles
                .get(&pile_id)
                .ok_or(SchedulerError::PileNotFound(pile_id))?
                .pile
                .kind;
            inner.piles.get_mut(&pile_id).unwrap().pile.status = PileStatus::Unavailable;

            let executing_id = inner
                .piles
                .get(&pile_id)
                .unwrap()
                .queue
                .executing_head()
                .map(|r| r.request_id);
            let settle_payload = match executing_id {
                Some(id) => self.end_request_locked(&mut inner, id, now)?,
                None => None,
            };

            Self::build_recovery_queue(&mut inner, pile_id, kind, self.config.brake_policy, true);
            inner.kind_state.entry(kind).or_default().mode = Some(Mode::TimeOrdered);

            dispatch_pass(&mut inner, now);
            info!(pile_id, "pile braked");
            settle_payload
        };
        if let Some(payload) = settle_payload {
            self.persist_settlement(payload).await;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn recover(&self, pile_id: u32) -> anyhow::Result<()> {
        let now = self.clock.now();
        {
            let _control = self.control.lock();
            let mut inner = self.inner.lock();

            let kind = inner
                .piles
                .get(&pile_id)
                .ok_or(SchedulerError::PileNotFound(pile_id))?
                .pile
                .kind;
            inner.piles.get_mut(&pile_id).unwrap().pile.status = PileStatus::Running;

            Self::build_recovery_queue(&mut inner, pile_id, kind, BrakePolicy::TimeOrdered, false);
            inner.kind_state.entry(kind).or_default().mode = Some(Mode::Recovery);

            dispatch_pass(&mut inner, now);
            info!(pile_id, "pile recovered");
        }
        Ok(())
    }
}
