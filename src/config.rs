// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Ledger configuration.
//!
//! Loaded from TOML by the binary, or built in code by embedding hosts:
//!
//! ```toml
//! currency = "USD"
//! max_amount_minor = 500000000
//! allow_zero_shares = true
//! ```

use crate::money::{Currency, Money};
use crate::LedgerError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Validation limits and defaults applied by the split calculator and ledger.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Currency for groups that do not name their own.
    pub currency: Currency,
    /// Largest accepted expense or settlement amount, in minor units.
    pub max_amount_minor: i64,
    /// Whether an `exact` or `percentage` split may give someone a zero share.
    pub allow_zero_shares: bool,
}

impl LedgerConfig {
    pub const DEFAULT_MAX_AMOUNT_MINOR: i64 = 100_000_000_000;

    /// Upper bound for `max_amount_minor`.
    pub const MAX_AMOUNT_LIMIT: i64 = 1_000_000_000_000_000;

    /// Parses a TOML document; missing keys take their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the limits are usable.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when `max_amount_minor` is not within
    /// `1..=MAX_AMOUNT_LIMIT`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=Self::MAX_AMOUNT_LIMIT).contains(&self.max_amount_minor) {
            return Err(ConfigError::Invalid(format!(
                "max_amount_minor must be between 1 and {}, got {}",
                Self::MAX_AMOUNT_LIMIT,
                self.max_amount_minor
            )));
        }
        Ok(())
    }

    /// Reads and parses a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::debug!("loading ledger configuration from {}", path.display());
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Checks that a recorded amount is strictly positive and within bounds.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`] if `amount <= 0` or above `max_amount_minor`.
    pub fn check_amount(&self, amount: Money) -> Result<Money, LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(format!(
                "{amount} must be positive"
            )));
        }
        if amount.minor() > self.max_amount_minor {
            return Err(LedgerError::InvalidAmount(format!(
                "{amount} exceeds the maximum of {}",
                Money::from_minor(self.max_amount_minor, amount.currency())
            )));
        }
        Ok(amount)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            currency: Currency::INR,
            max_amount_minor: Self::DEFAULT_MAX_AMOUNT_MINOR,
            allow_zero_shares: false,
        }
    }
}

/// Failure to read or parse a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
