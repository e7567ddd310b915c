//! Stepped time-of-day tariff.
//!
//! Prices are piecewise-constant by hour-of-day, left-closed/right-open.
//! A billing interval is apportioned across bands in proportion to the
//! fraction of wall-clock time it spends in each one.

use chrono::Timelike;
use rust_decimal::Decimal;
use rust_decimal::RoundingStrategy;
use rust_decimal_macros::dec;

use core_types::MockInstant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Bottom,
    Medium,
    Top,
}

impl Band {
    fn price_per_kwh(&self) -> Decimal {
        match self {
            Band::Bottom => dec!(0.40),
            Band::Medium => dec!(0.70),
            Band::Top => dec!(1.00),
        }
    }

    fn for_hour(hour: u32) -> Band {
        match hour {
            23 | 0..=6 => Band::Bottom,
            7..=9 | 15..=17 | 21..=22 => Band::Medium,
            10..=14 | 18..=20 => Band::Top,
            _ => unreachable!("hour out of range"),
        }
    }
}

/// Flat surcharge applied to every kWh regardless of band.
pub const SERVICE_PRICE_PER_KWH: Decimal = dec!(0.80);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostBreakdown {
    pub total: Decimal,
    pub charging: Decimal,
    pub service: Decimal,
}

fn round2(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

/// Walks `[begin, end]` one hour-aligned segment at a time and sums the
/// wall-clock seconds spent in each tariff band.
fn seconds_in_bands(begin: MockInstant, end: MockInstant) -> (i64, i64, i64) {
    let mut top = 0i64;
    let mut medium = 0i64;
    let mut bottom = 0i64;

    if end <= begin {
        return (top, medium, bottom);
    }

    let mut cursor = begin;
    while cursor < end {
        let hour_start = cursor
            .date_naive()
            .and_hms_opt(cursor.hour(), 0, 0)
            .expect("valid hour");
        let hour_start = chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(
            hour_start,
            chrono::Utc,
        );
        let next_hour = hour_start + chrono::Duration::hours(1);
        let segment_end = next_hour.min(end);
        let segment_secs = (segment_end - cursor).num_seconds();

        match Band::for_hour(cursor.hour()) {
            Band::Top => top += segment_secs,
            Band::Medium => medium += segment_secs,
            Band::Bottom => bottom += segment_secs,
        }

        cursor = segment_end;
    }

    (top, medium, bottom)
}

/// Computes the stepped-tariff cost of delivering `amount_kwh` over
/// `[begin, end]`, apportioning energy across bands in proportion to the
/// time spent in each.
pub fn calc_cost(begin: MockInstant, end: MockInstant, amount_kwh: Decimal) -> CostBreakdown {
    let (top_s, med_s, bot_s) = seconds_in_bands(begin, end);
    let total_s = top_s + med_s + bot_s;

    let service = round2(amount_kwh * SERVICE_PRICE_PER_KWH);

    if total_s == 0 {
        return CostBreakdown {
            total: service,
            charging: Decimal::ZERO,
            service,
        };
    }

    let total_s_dec = Decimal::from(total_s);
    let e_top = amount_kwh * Decimal::from(top_s) / total_s_dec;
    let e_med = amount_kwh * Decimal::from(med_s) / total_s_dec;
    let e_bot = amount_kwh * Decimal::from(bot_s) / total_s_dec;

    let charging = round2(
        e_top * Band::Top.price_per_kwh()
            + e_med * Band::Medium.price_per_kwh()
            + e_bot * Band::Bottom.price_per_kwh(),
    );

    CostBreakdown {
        total: charging + service,
        charging,
        service,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> MockInstant {
        chrono::Utc.with_ymd_and_hms(2026, 7, 31, hour, minute, 0).unwrap()
    }

    #[test]
    fn entirely_within_peak_band() {
        let begin = at(11, 0);
        let end = at(12, 0);
        let out = calc_cost(begin, end, dec!(10.00));
        assert_eq!(out.charging, dec!(10.00));
        assert_eq!(out.service, dec!(8.00));
        assert_eq!(out.total, dec!(18.00));
    }

    #[test]
    fn entirely_within_valley_band() {
        let begin = at(2, 0);
        let end = at(3, 0);
        let out = calc_cost(begin, end, dec!(5.00));
        assert_eq!(out.charging, dec!(2.00));
        assert_eq!(out.service, dec!(4.00));
        assert_eq!(out.total, dec!(6.00));
    }

    #[test]
    fn spans_a_band_boundary_evenly() {
        // [9:00, 11:00): one hour medium (7-10), one hour top (10-15).
        let begin = at(9, 0);
        let end = at(11, 0);
        let out = calc_cost(begin, end, dec!(10.00));
        // 5 kWh at 0.70 + 5 kWh at 1.00 = 3.50 + 5.00 = 8.50
        assert_eq!(out.charging, dec!(8.50));
        assert_eq!(out.total, out.charging + out.service);
    }

    #[test]
    fn zero_length_interval_is_service_only() {
        let begin = at(5, 0);
        let out = calc_cost(begin, begin, dec!(3.00));
        assert_eq!(out.charging, Decimal::ZERO);
        assert_eq!(out.total, out.service);
    }

    #[test]
    fn spans_midnight_across_days() {
        let begin = at(23, 30);
        let end = chrono::Utc.with_ymd_and_hms(2026, 8, 1, 0, 30, 0).unwrap();
        let out = calc_cost(begin, end, dec!(2.00));
        // whole interval is in the bottom band (23:00-24:00 and 0:00-7:00)
        assert_eq!(out.charging, dec!(0.80));
    }

    proptest::proptest! {
        #[test]
        fn total_always_equals_charging_plus_service(
            start_hour in 0u32..24,
            duration_mins in 1i64..600,
            amount_cents in 1i64..100_000,
        ) {
            let begin = at(start_hour, 0);
            let end = begin + chrono::Duration::minutes(duration_mins);
            let amount = Decimal::new(amount_cents, 2);
            let out = calc_cost(begin, end, amount);
            proptest::prop_assert_eq!(out.total, out.charging + out.service);
        }
    }
}
