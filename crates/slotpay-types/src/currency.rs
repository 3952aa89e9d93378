//! The closed set of currencies the escrow ledger accounts for.
//!
//! Amounts are always [`Decimal`] — never floating point — so escrow
//! arithmetic is exact. Chain-side amounts arrive as integer smallest units
//! (nanotons, token micro-units) and are converted here.

use std::fmt;
use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::SlotpayError;

/// A currency the ledger holds balances in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    /// In-platform stars. No chain presence; deposits arrive via the
    /// platform's own payment callback, not the chain reconcilers.
    Stars,
    /// Native chain asset. Deposits attributed by sender address.
    Ton,
    /// Fungible token on the chain. Deposits attributed by transfer memo.
    Usdt,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Stars, Currency::Ton, Currency::Usdt];

    /// Lowercase wire code, as stored and exposed to the route layer.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Stars => "stars",
            Self::Ton => "ton",
            Self::Usdt => "usdt",
        }
    }

    /// Number of decimal places in the chain's smallest-unit representation.
    #[must_use]
    pub fn chain_decimals(self) -> u32 {
        match self {
            Self::Stars => 0,
            Self::Ton => 9,
            Self::Usdt => constants::USDT_CHAIN_DECIMALS,
        }
    }

    /// Convert an integer amount in smallest chain units to a [`Decimal`].
    #[must_use]
    pub fn amount_from_chain_units(self, raw: u64) -> Decimal {
        Decimal::from(raw) / Decimal::from(10u64.pow(self.chain_decimals()))
    }

    /// Convert a [`Decimal`] amount to integer smallest chain units,
    /// truncating sub-unit dust.
    #[must_use]
    pub fn amount_to_chain_units(self, amount: Decimal) -> u64 {
        let scaled = amount * Decimal::from(10u64.pow(self.chain_decimals()));
        scaled.trunc().to_u64().unwrap_or(0)
    }

    /// Human display string with trailing zeros trimmed (`1`, `10.5`, `0.25`).
    #[must_use]
    pub fn format_amount(self, amount: Decimal) -> String {
        let rounded = amount.round_dp(self.chain_decimals().min(6));
        let normalized = rounded.normalize();
        normalized.to_string()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code().to_ascii_uppercase().as_str())
    }
}

impl FromStr for Currency {
    type Err = SlotpayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stars" => Ok(Self::Stars),
            "ton" => Ok(Self::Ton),
            "usdt" => Ok(Self::Usdt),
            other => Err(SlotpayError::Configuration(format!(
                "unknown currency code: {other}"
            ))),
        }
    }
}
