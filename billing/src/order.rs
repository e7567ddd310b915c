use async_trait::async_trait;
use rust_decimal::Decimal;

use core_types::MockInstant;

/// A settled billing order, persisted once per completed or cancelled
/// charging request.
#[derive(Debug, Clone)]
pub struct Order {
    pub order_id: u64,
    pub username: String,
    pub pile_id: u32,
    pub create_time: MockInstant,
    pub begin_time: MockInstant,
    pub end_time: MockInstant,
    pub charged_amount_kwh: Decimal,
    pub charged_seconds: i64,
    pub charging_cost: Decimal,
    pub service_cost: Decimal,
    pub total_cost: Decimal,
}

/// Durable sink for settled orders. The core never reads orders back; it
/// only appends.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn save(&self, order: &Order) -> anyhow::Result<()>;
}
