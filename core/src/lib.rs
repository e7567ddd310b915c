pub mod clock;
pub mod pile;

pub use clock::{AcceleratedClock, Clock, MockInstant};
pub use pile::{Pile, PileKind, PileRepository, PileStatus};

/// Fixed-point money/energy amounts, always rounded to 2 decimal places.
pub type Money = rust_decimal::Decimal;
