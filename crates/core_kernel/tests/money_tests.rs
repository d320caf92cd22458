//! Money construction, parsing and the proximity ratio
//!
//! Tests cover creation, parsing, display and the proximity ratio used by
//! duplicate scoring.

use core_kernel::{Currency, Money, MoneyError};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

mod creation {
    use super::*;

    #[test]
    fn test_new_creates_money_with_correct_amount() {
        let m = Money::new(dec!(100.50), Currency::USD);
        assert_eq!(m.amount(), dec!(100.50));
        assert_eq!(m.currency(), Currency::USD);
    }

    #[test]
    fn test_new_rounds_to_four_decimal_places() {
        let m = Money::new(dec!(100.123456789), Currency::USD);
        assert_eq!(m.amount(), dec!(100.1235));
    }

    #[test]
    fn test_from_minor_converts_cents_correctly() {
        let m = Money::from_minor(10050, Currency::USD);
        assert_eq!(m.amount(), dec!(100.50));
    }

    #[test]
    fn test_from_minor_handles_jpy_no_decimals() {
        let m = Money::from_minor(10000, Currency::JPY);
        assert_eq!(m.amount(), dec!(10000));
    }

    #[test]
    fn test_zero_is_not_positive() {
        let m = Money::zero(Currency::EUR);
        assert!(m.is_zero());
        assert!(!m.is_positive());
    }
}

mod parsing {
    use super::*;

    #[test]
    fn test_parse_strips_symbols_and_separators() {
        let m = Money::parse("$1,250.00", Currency::USD).unwrap();
        assert_eq!(m.amount(), dec!(1250));
    }

    #[test]
    fn test_parse_rejects_text_without_digits() {
        let err = Money::parse("n/a", Currency::USD).unwrap_err();
        assert!(matches!(err, MoneyError::InvalidAmount(_)));
    }

    #[test]
    fn test_currency_from_str_is_case_insensitive() {
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::USD);
        assert!("XYZ".parse::<Currency>().is_err());
    }
}

mod display {
    use super::*;

    #[test]
    fn test_usd_display() {
        assert_eq!(Money::new(dec!(500), Currency::USD).to_string(), "$500.00");
    }

    #[test]
    fn test_jpy_display_has_no_fraction() {
        assert_eq!(Money::new(dec!(1200), Currency::JPY).to_string(), "¥1200");
    }

    #[test]
    fn test_serde_uses_uppercase_codes() {
        let json = serde_json::to_string(&Currency::GBP).unwrap();
        assert_eq!(json, "\"GBP\"");
    }
}

mod arithmetic {
    use super::*;

    #[test]
    fn test_checked_sub_same_currency() {
        let a = Money::new(dec!(750), Currency::USD);
        let b = Money::new(dec!(500), Currency::USD);
        assert_eq!(a.checked_sub(&b).unwrap().amount(), dec!(250));
    }

    #[test]
    fn test_checked_sub_currency_mismatch() {
        let a = Money::new(dec!(1), Currency::USD);
        let b = Money::new(dec!(1), Currency::CAD);
        assert!(matches!(
            a.checked_sub(&b),
            Err(MoneyError::CurrencyMismatch(_, _))
        ));
    }

    #[test]
    fn test_relative_difference_two_percent() {
        let a = Money::new(dec!(100.00), Currency::USD);
        let b = Money::new(dec!(102.00), Currency::USD);
        assert_eq!(a.relative_difference(&b).unwrap(), dec!(0.02));
    }
}

proptest! {
    #[test]
    fn prop_relative_difference_is_non_negative(a in 0i64..10_000_000, b in 0i64..10_000_000) {
        let x = Money::from_minor(a, Currency::USD);
        let y = Money::from_minor(b, Currency::USD);
        let ratio = x.relative_difference(&y).unwrap();
        prop_assert!(ratio >= Decimal::ZERO);
    }

    #[test]
    fn prop_relative_difference_to_self_is_zero(a in 0i64..10_000_000) {
        let x = Money::from_minor(a, Currency::USD);
        prop_assert!(x.relative_difference(&x).unwrap().is_zero());
    }
}
