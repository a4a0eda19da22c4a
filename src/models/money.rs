use std::fmt;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Which side of a [`MoneyValue`] the user typed last.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Currency {
    #[default]
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "CNY")]
    Cny,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Cny => "CNY",
        }
    }

    pub fn other(&self) -> Self {
        match self {
            Self::Usd => Self::Cny,
            Self::Cny => Self::Usd,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round to whole cents, half away from zero.
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount` in `from` converted to the other currency, or `None` on overflow.
fn convert(amount: Decimal, from: Currency, rate: ExchangeRate) -> Option<Decimal> {
    match from {
        Currency::Usd => amount.checked_mul(rate.value()),
        Currency::Cny => amount.checked_div(rate.value()),
    }
}

/// CNY per USD. Always positive; invalid inputs collapse to [`ExchangeRate::DEFAULT`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct ExchangeRate(Decimal);

impl ExchangeRate {
    pub const DEFAULT: ExchangeRate = ExchangeRate(dec!(7.25));

    /// Accept `rate` if it is finite and positive, otherwise fall back to the default.
    pub fn clamp(rate: f64) -> Self {
        if !rate.is_finite() || rate <= 0.0 {
            return Self::DEFAULT;
        }
        Decimal::from_f64(rate)
            .map(Self::from_decimal)
            .unwrap_or(Self::DEFAULT)
    }

    pub fn from_decimal(rate: Decimal) -> Self {
        if rate > Decimal::ZERO {
            Self(rate.normalize())
        } else {
            Self::DEFAULT
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl Default for ExchangeRate {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<Decimal> for ExchangeRate {
    fn from(rate: Decimal) -> Self {
        Self::from_decimal(rate)
    }
}

impl From<ExchangeRate> for Decimal {
    fn from(rate: ExchangeRate) -> Self {
        rate.0
    }
}

impl fmt::Display for ExchangeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One amount held in both currencies.
///
/// The field named by `primary_currency` is authoritative; the other one is
/// always `round2` of the primary converted at the document's exchange rate.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MoneyValue {
    #[serde(default)]
    pub usd: Decimal,
    #[serde(default)]
    pub cny: Decimal,
    #[serde(default)]
    pub primary_currency: Currency,
}

impl MoneyValue {
    pub fn zero(primary_currency: Currency) -> Self {
        Self {
            usd: Decimal::ZERO,
            cny: Decimal::ZERO,
            primary_currency,
        }
    }

    /// A value typed by the user in `currency`; that side becomes primary.
    ///
    /// A derived side too large for a `Decimal` saturates at the type's
    /// bounds.
    pub fn entered(amount: Decimal, currency: Currency, rate: ExchangeRate) -> Self {
        let amount = round2(amount);
        let derived = convert(amount, currency, rate)
            .map(round2)
            .unwrap_or(if amount.is_sign_negative() {
                Decimal::MIN
            } else {
                Decimal::MAX
            });
        match currency {
            Currency::Usd => Self {
                usd: amount,
                cny: derived,
                primary_currency: Currency::Usd,
            },
            Currency::Cny => Self {
                usd: derived,
                cny: amount,
                primary_currency: Currency::Cny,
            },
        }
    }

    /// Re-derive the non-primary side from the primary one.
    pub fn synced(&self, rate: ExchangeRate) -> Self {
        Self::entered(self.amount(self.primary_currency), self.primary_currency, rate)
    }

    /// Make the currently displayed non-primary amount authoritative.
    ///
    /// The value the user is looking at survives; the old primary is
    /// re-derived from it.
    pub fn flipped(&self, rate: ExchangeRate) -> Self {
        let next = self.primary_currency.other();
        Self::entered(self.amount(next), next, rate)
    }

    pub fn amount(&self, currency: Currency) -> Decimal {
        match currency {
            Currency::Usd => self.usd,
            Currency::Cny => self.cny,
        }
    }

    /// The amount in USD as the pricing engine sees it.
    ///
    /// CNY-primary values are converted without intermediate rounding.
    /// `None` when the conversion overflows.
    pub fn usd_basis(&self, rate: ExchangeRate) -> Option<Decimal> {
        match self.primary_currency {
            Currency::Usd => Some(self.usd),
            Currency::Cny => self.cny.checked_div(rate.value()),
        }
    }

    pub fn is_synced(&self, rate: ExchangeRate) -> bool {
        *self == self.synced(rate)
    }
}
