//! Claim amounts with precise decimal arithmetic
//!
//! Billed, capped and approved amounts are carried as `Money` so that
//! threshold comparisons and proximity ratios never go through floating point.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

macro_rules! currencies {
    ($($code:ident => $symbol:literal, $places:literal;)+) => {
        /// ISO 4217 currencies accepted on claims and plans
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "UPPERCASE")]
        pub enum Currency {
            $($code,)+
        }

        impl Currency {
            pub const ALL: &'static [Currency] = &[$(Currency::$code,)+];

            /// Minor-unit digits, 0 for yen
            pub fn decimal_places(&self) -> u32 {
                match self {
                    $(Currency::$code => $places,)+
                }
            }

            pub fn symbol(&self) -> &'static str {
                match self {
                    $(Currency::$code => $symbol,)+
                }
            }

            pub fn code(&self) -> &'static str {
                match self {
                    $(Currency::$code => stringify!($code),)+
                }
            }
        }
    };
}

currencies! {
    USD => "$", 2;
    EUR => "€", 2;
    GBP => "£", 2;
    CAD => "C$", 2;
    AUD => "A$", 2;
    INR => "₹", 2;
    CHF => "CHF ", 2;
    JPY => "¥", 0;
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = MoneyError;

    /// Case-insensitive, surrounding whitespace ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Currency::ALL
            .iter()
            .copied()
            .find(|currency| currency.code().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| MoneyError::UnknownCurrency(wanted.to_ascii_uppercase()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Currency mismatch: {0} against {1}")]
    CurrencyMismatch(String, String),

    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

/// An amount in one currency
///
/// Stored rounded to four places; `Display` uses the currency's own
/// precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self {
            amount: amount.round_dp(4),
            currency,
        }
    }

    /// From minor units, cents for USD
    pub fn from_minor(minor_units: i64, currency: Currency) -> Self {
        let divisor = Decimal::new(10_i64.pow(currency.decimal_places()), 0);
        Self::new(Decimal::new(minor_units, 0) / divisor, currency)
    }

    /// Parses a free-text amount such as `"1,250.00"` or `"$80"`
    pub fn parse(text: &str, currency: Currency) -> Result<Self, MoneyError> {
        let cleaned: String = text
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
            .collect();
        let amount = Decimal::from_str(&cleaned)
            .map_err(|_| MoneyError::InvalidAmount(text.to_string()))?;
        Ok(Self::new(amount, currency))
    }

    pub fn zero(currency: Currency) -> Self {
        Self {
            amount: dec!(0),
            currency,
        }
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    /// Strictly greater than zero
    pub fn is_positive(&self) -> bool {
        self.amount.is_sign_positive() && !self.amount.is_zero()
    }

    /// Fails on mixed currencies
    pub fn checked_sub(&self, other: &Money) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        Ok(Self::new(self.amount - other.amount, self.currency))
    }

    /// Relative difference `|self - other| / max(self, 1)`
    ///
    /// The denominator is floored at one unit so that near-zero amounts do not
    /// blow the ratio up.
    pub fn relative_difference(&self, other: &Money) -> Result<Decimal, MoneyError> {
        self.ensure_same_currency(other)?;
        let denominator = self.amount.max(Decimal::ONE);
        Ok((self.amount - other.amount).abs() / denominator)
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch(
                self.currency.to_string(),
                other.currency.to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let places = self.currency.decimal_places() as usize;
        write!(f, "{}{:.places$}", self.currency.symbol(), self.amount)
    }
}
