use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// 月份键，格式 YYYY-MM（UTC）
pub fn month_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

pub fn month_key_for_date(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// `revenue * percentage / 100`, rounded half-up to whole minor units.
///
/// A strictly positive entitlement never rounds down to zero: it is floored to
/// one minor unit instead. Returns `None` if the result does not fit in `i64`.
pub fn percentage_of(revenue_minor_units: i64, percentage: Decimal) -> Option<i64> {
    let exact = Decimal::from(revenue_minor_units) * percentage / Decimal::ONE_HUNDRED;
    let rounded = exact
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()?;
    if rounded == 0 && exact > Decimal::ZERO {
        return Some(1);
    }
    Some(rounded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_percentage_of_rounds_half_up() {
        assert_eq!(percentage_of(1000, Decimal::new(500, 2)), Some(50));
        assert_eq!(percentage_of(1000, Decimal::new(300, 2)), Some(30));
        // 12.5 -> 13
        assert_eq!(percentage_of(250, Decimal::new(500, 2)), Some(13));
        // 12.49 -> 12
        assert_eq!(percentage_of(1249, Decimal::new(100, 2)), Some(12));
        assert_eq!(percentage_of(0, Decimal::new(500, 2)), Some(0));
    }

    #[test]
    fn test_percentage_of_never_drops_positive_entitlement() {
        // 0.05 -> 1
        assert_eq!(percentage_of(5, Decimal::new(100, 2)), Some(1));
        // 0.4 -> 1
        assert_eq!(percentage_of(10, Decimal::new(400, 2)), Some(1));
    }

    #[test]
    fn test_month_key() {
        let at = Utc.with_ymd_and_hms(2026, 3, 31, 23, 59, 59).unwrap();
        assert_eq!(month_key(at), "2026-03");
        let date = NaiveDate::from_ymd_opt(2026, 11, 1).unwrap();
        assert_eq!(month_key_for_date(date), "2026-11");
    }
}
