//! Supported currencies and the rate table served by the API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Base currency all multipliers are expressed against. Not user-selectable.
pub const BASE_CURRENCY: Currency = Currency::Kzt;

/// The closed set of currencies the service knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Currency {
    Usd,
    Eur,
    Rub,
    Kzt,
}

impl Currency {
    pub const SUPPORTED: [Currency; 4] =
        [Currency::Usd, Currency::Eur, Currency::Rub, Currency::Kzt];

    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Rub => "RUB",
            Currency::Kzt => "KZT",
        }
    }

    /// Codes advertised in "Invalid currency" responses.
    pub fn supported_codes() -> [&'static str; 4] {
        Self::SUPPORTED.map(|c| c.code())
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = UnsupportedCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::SUPPORTED
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnsupportedCurrency(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported currency: {0}")]
pub struct UnsupportedCurrency(pub String);

/// Multipliers from [`BASE_CURRENCY`] to every supported currency.
///
/// The set is closed so a lookup can never miss; `kzt` is always `1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct RateTable {
    pub usd: f64,
    pub eur: f64,
    pub rub: f64,
    pub kzt: f64,
}

impl RateTable {
    /// Hardcoded approximations served only when no real data has ever been
    /// observed, cached or fetched.
    pub const FALLBACK: RateTable = RateTable {
        usd: 0.0021,
        eur: 0.0020,
        rub: 0.21,
        kzt: 1.0,
    };

    pub fn get(&self, currency: Currency) -> f64 {
        match currency {
            Currency::Usd => self.usd,
            Currency::Eur => self.eur,
            Currency::Rub => self.rub,
            Currency::Kzt => self.kzt,
        }
    }
}
