pub mod order;
pub mod tariff;

pub use order::{Order, OrderRepository};
pub use tariff::{CostBreakdown, calc_cost};
