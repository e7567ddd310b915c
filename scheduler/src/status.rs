/// `end_request` removes the id from the index entirely rather than leaving
/// a tombstone behind, so a settled or cancelled request is never observed
/// in a `NotCharging` state by `get_request_status` — it surfaces as
/// `MappingNotExisted` instead, same as an id that never existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatusKind {
    Charging,
    FailRequeue,
    WaitingStage2,
    ChangeModeRequeue,
    WaitingStage1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestStatus {
    pub status: RequestStatusKind,
    pub position: i64,
    pub pile_id: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub request_id: u16,
    pub pile_id: Option<u32>,
    pub username: String,
    pub battery_kwh: rust_decimal::Decimal,
    pub amount_kwh: rust_decimal::Decimal,
    pub waiting_seconds: i64,
}
