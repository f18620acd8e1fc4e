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

//! Fixed-precision money.
//!
//! [`Money`] is an integer count of minor currency units (cents, paise) tagged
//! with its [`Currency`]. It is never backed by a binary float: all arithmetic
//! is on `i64` minor units, and ratio scaling goes through `i128` with
//! half-away-from-zero rounding.
//!
//! # Example
//!
//! ```
//! use expense_ledger::{Currency, Money};
//! use rust_decimal_macros::dec;
//!
//! let bill = Money::from_decimal(dec!(100.00), Currency::INR).unwrap();
//! assert_eq!(bill.minor(), 10_000);
//! assert_eq!(bill.to_string(), "INR 100.00");
//! ```

use crate::LedgerError;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::num::NonZeroU64;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// ISO 4217-style currency: a three-letter code and its number of minor digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Currency {
    code: [u8; 3],
    minor_digits: u8,
}

impl Currency {
    pub const INR: Currency = Currency::new_unchecked(*b"INR", 2);
    pub const USD: Currency = Currency::new_unchecked(*b"USD", 2);
    pub const EUR: Currency = Currency::new_unchecked(*b"EUR", 2);
    pub const JPY: Currency = Currency::new_unchecked(*b"JPY", 0);

    const fn new_unchecked(code: [u8; 3], minor_digits: u8) -> Self {
        Self { code, minor_digits }
    }

    /// Looks up a currency by its three-letter code.
    ///
    /// Codes are case-insensitive. Currencies without fractional units
    /// (`JPY`, `KRW`) and three-digit currencies (`BHD`, `KWD`, `OMR`) are
    /// recognised; everything else uses two minor digits.
    pub fn from_code(code: &str) -> Result<Self, LedgerError> {
        let upper = code.trim().to_ascii_uppercase();
        let bytes: [u8; 3] = upper
            .as_bytes()
            .try_into()
            .map_err(|_| LedgerError::InvalidCurrency(code.to_string()))?;
        if !bytes.iter().all(u8::is_ascii_uppercase) {
            return Err(LedgerError::InvalidCurrency(code.to_string()));
        }
        let minor_digits = match &bytes {
            b"JPY" | b"KRW" | b"VND" | b"CLP" => 0,
            b"BHD" | b"KWD" | b"OMR" | b"JOD" => 3,
            _ => 2,
        };
        Ok(Self::new_unchecked(bytes, minor_digits))
    }

    pub fn code(&self) -> &str {
        // Constructed only from ASCII uppercase letters.
        std::str::from_utf8(&self.code).unwrap_or("???")
    }

    /// Number of decimal digits in one major unit (2 for cents).
    pub fn minor_digits(&self) -> u32 {
        u32::from(self.minor_digits)
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::INR
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::from_code(s)
    }
}

impl Serialize for Currency {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let code = String::deserialize(deserializer)?;
        Currency::from_code(&code).map_err(de::Error::custom)
    }
}

/// An exact amount of money in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    minor: i64,
    currency: Currency,
}

impl Money {
    pub const fn from_minor(minor: i64, currency: Currency) -> Self {
        Self { minor, currency }
    }

    pub const fn zero(currency: Currency) -> Self {
        Self::from_minor(0, currency)
    }

    /// Converts a decimal amount such as `12.50` into minor units.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`] when the value has more fractional
    /// digits than the currency allows or does not fit in `i64` minor units.
    pub fn from_decimal(value: Decimal, currency: Currency) -> Result<Self, LedgerError> {
        let digits = currency.minor_digits();
        let normalized = value.normalize();
        if normalized.scale() > digits {
            return Err(LedgerError::InvalidAmount(format!(
                "{value} has more than {digits} decimal places for {currency}"
            )));
        }
        let mut scaled = normalized;
        scaled.rescale(digits);
        let minor = i64::try_from(scaled.mantissa())
            .map_err(|_| LedgerError::InvalidAmount(format!("{value} is out of range")))?;
        Ok(Self::from_minor(minor, currency))
    }

    /// Converts untrusted floating-point input, rounding to the nearest minor unit.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidAmount`] for NaN, infinities and out-of-range values.
    pub fn from_f64(value: f64, currency: Currency) -> Result<Self, LedgerError> {
        if !value.is_finite() {
            return Err(LedgerError::InvalidAmount(format!("{value} is not finite")));
        }
        let decimal = Decimal::from_f64(value)
            .ok_or_else(|| LedgerError::InvalidAmount(format!("{value} is out of range")))?
            .round_dp_with_strategy(
                currency.minor_digits(),
                RoundingStrategy::MidpointAwayFromZero,
            );
        Self::from_decimal(decimal, currency)
    }

    pub fn minor(&self) -> i64 {
        self.minor
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Decimal value in major units, with exactly the currency's minor digits.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.minor, self.currency.minor_digits())
    }

    pub fn add(self, other: Money) -> Money {
        debug_assert_eq!(self.currency, other.currency, "currency mismatch in add");
        Money::from_minor(self.minor + other.minor, self.currency)
    }

    pub fn subtract(self, other: Money) -> Money {
        debug_assert_eq!(self.currency, other.currency, "currency mismatch in subtract");
        Money::from_minor(self.minor - other.minor, self.currency)
    }

    pub fn negate(self) -> Money {
        Money::from_minor(-self.minor, self.currency)
    }

    pub fn abs(self) -> Money {
        Money::from_minor(self.minor.abs(), self.currency)
    }

    /// Scales by `numerator / denominator`, rounding half away from zero.
    pub fn multiply_by_ratio(self, numerator: u64, denominator: NonZeroU64) -> Money {
        let product = i128::from(self.minor) * i128::from(numerator);
        let denominator = i128::from(denominator.get());
        let mut quotient = product / denominator;
        let remainder = product % denominator;
        if remainder.abs() * 2 >= denominator {
            quotient += product.signum();
        }
        let minor = i64::try_from(quotient).unwrap_or(if quotient > 0 {
            i64::MAX
        } else {
            i64::MIN
        });
        Money::from_minor(minor, self.currency)
    }

    pub fn is_zero(&self) -> bool {
        self.minor == 0
    }

    pub fn is_positive(&self) -> bool {
        self.minor > 0
    }

    pub fn is_negative(&self) -> bool {
        self.minor < 0
    }

    /// `None` when the result does not fit in `i64` minor units.
    pub fn checked_add(self, other: Money) -> Option<Money> {
        debug_assert_eq!(self.currency, other.currency, "currency mismatch in add");
        self.minor
            .checked_add(other.minor)
            .map(|minor| Money::from_minor(minor, self.currency))
    }

    /// Sums amounts of one currency; an empty iterator yields zero.
    ///
    /// Callers must keep totals in range; see [`Money::checked_sum`] for
    /// untrusted input.
    pub fn sum<I>(amounts: I, currency: Currency) -> Money
    where
        I: IntoIterator<Item = Money>,
    {
        amounts.into_iter().fold(Money::zero(currency), Money::add)
    }

    /// Sums amounts of one currency, or `None` if any partial sum overflows.
    pub fn checked_sum<I>(amounts: I, currency: Currency) -> Option<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::zero(currency), Money::checked_add)
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.minor
            .cmp(&other.minor)
            .then_with(|| self.currency.cmp(&other.currency))
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money::add(self, rhs)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        *self = Money::add(*self, rhs);
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        self.subtract(rhs)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        *self = self.subtract(rhs);
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        self.negate()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.currency, self.to_decimal())
    }
}
