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

//! Split calculator.
//!
//! Divides an expense amount among participants according to a [`SplitRule`].
//! Every successful split reconciles exactly: the resolved shares always sum
//! to the expense amount, down to the last minor unit.
//!
//! Rounding remainders are handed out one minor unit at a time in a fixed
//! order, so the same input always produces the same shares. Equal splits go
//! in ascending [`MemberId`] order. Percentage splits first adjust the shares
//! that rounding moved furthest, falling back to ascending id on ties.
//!
//! # Example
//!
//! ```
//! use expense_ledger::{compute_shares, Currency, LedgerConfig, MemberId, Money, SplitRule};
//!
//! let amount = Money::from_minor(100, Currency::INR);
//! let rule = SplitRule::Equal(vec![MemberId(1), MemberId(2), MemberId(3)]);
//! let shares = compute_shares(amount, &rule, &LedgerConfig::default()).unwrap();
//!
//! assert_eq!(shares[&MemberId(1)].minor(), 34);
//! assert_eq!(shares[&MemberId(2)].minor(), 33);
//! assert_eq!(shares[&MemberId(3)].minor(), 33);
//! ```

use crate::base::MemberId;
use crate::config::LedgerConfig;
use crate::money::Money;
use crate::LedgerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::num::NonZeroU64;

/// Resolved per-member amounts of one expense, ordered by member id.
pub type Shares = BTreeMap<MemberId, Money>;

/// A percentage held exactly as basis points (1/100 of a percent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percentage(u32);

impl Percentage {
    /// 100% in basis points.
    pub const WHOLE: u32 = 10_000;

    pub const fn from_basis_points(bps: u32) -> Self {
        Self(bps)
    }

    /// Converts a user-entered percentage such as `33.33`.
    ///
    /// Returns `None` for negative values or values with more than two
    /// decimal places, which cannot be represented exactly.
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return None;
        }
        let normalized = value.normalize();
        if normalized.scale() > 2 {
            return None;
        }
        let mut scaled = normalized;
        scaled.rescale(2);
        u32::try_from(scaled.mantissa()).ok().map(Self)
    }

    pub fn basis_points(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", Decimal::new(i64::from(self.0), 2).normalize())
    }
}

/// How an expense is divided among its participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", content = "shares", rename_all = "lowercase")]
pub enum SplitRule {
    /// Everyone listed pays the same, remainders go to the lowest ids.
    Equal(Vec<MemberId>),
    /// Caller supplies each participant's amount; must sum to the expense.
    Exact(Vec<(MemberId, Money)>),
    /// Caller supplies each participant's percentage; must sum to 100%.
    Percentage(Vec<(MemberId, Percentage)>),
}

impl SplitRule {
    /// Participants in the order the caller listed them.
    pub fn participants(&self) -> Vec<MemberId> {
        match self {
            Self::Equal(members) => members.clone(),
            Self::Exact(shares) => shares.iter().map(|(member, _)| *member).collect(),
            Self::Percentage(shares) => shares.iter().map(|(member, _)| *member).collect(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Equal(_) => "equal",
            Self::Exact(_) => "exact",
            Self::Percentage(_) => "percentage",
        }
    }
}

/// Resolves `rule` into per-member shares of `amount`.
///
/// # Errors
///
/// - [`LedgerError::InvalidAmount`] - `amount` is negative.
/// - [`LedgerError::EmptySplit`] - no participants.
/// - [`LedgerError::DuplicateParticipant`] - a member is listed twice.
/// - [`LedgerError::InvalidShare`] - a non-positive exact share or percentage
///   (zero is accepted when `config.allow_zero_shares` is set).
/// - [`LedgerError::CurrencyMismatch`] - an exact share in another currency.
/// - [`LedgerError::SplitMismatch`] - exact shares do not sum to `amount`, or
///   percentages do not sum to exactly 100%.
pub fn compute_shares(
    amount: Money,
    rule: &SplitRule,
    config: &LedgerConfig,
) -> Result<Shares, LedgerError> {
    if amount.is_negative() {
        return Err(LedgerError::InvalidAmount(format!(
            "{amount} cannot be split"
        )));
    }
    ensure_unique(rule.participants())?;

    match rule {
        SplitRule::Equal(members) => Ok(split_equal(amount, members)),
        SplitRule::Exact(shares) => split_exact(amount, shares, config),
        SplitRule::Percentage(shares) => split_percentage(amount, shares, config),
    }
}

fn ensure_unique(participants: Vec<MemberId>) -> Result<(), LedgerError> {
    if participants.is_empty() {
        return Err(LedgerError::EmptySplit);
    }
    let mut seen = BTreeSet::new();
    for member in participants {
        if !seen.insert(member) {
            return Err(LedgerError::DuplicateParticipant(member));
        }
    }
    Ok(())
}

fn split_equal(amount: Money, members: &[MemberId]) -> Shares {
    let currency = amount.currency();
    // Non-empty, checked by ensure_unique.
    let count = members.len() as i64;
    let quotient = amount.minor() / count;

    let mut shares: Shares = members
        .iter()
        .map(|member| (*member, Money::from_minor(quotient, currency)))
        .collect();
    let eligible: Vec<MemberId> = shares.keys().copied().collect();
    reconcile(&mut shares, &eligible, amount);
    shares
}

fn split_exact(
    amount: Money,
    entries: &[(MemberId, Money)],
    config: &LedgerConfig,
) -> Result<Shares, LedgerError> {
    let mut shares = Shares::new();
    for (member, share) in entries {
        if share.currency() != amount.currency() {
            return Err(LedgerError::CurrencyMismatch {
                expected: amount.currency(),
                found: share.currency(),
            });
        }
        if share.is_negative() || (share.is_zero() && !config.allow_zero_shares) {
            return Err(LedgerError::InvalidShare {
                member: *member,
                reason: format!("{share} must be positive"),
            });
        }
        shares.insert(*member, *share);
    }

    match Money::checked_sum(shares.values().copied(), amount.currency()) {
        Some(total) if total == amount => Ok(shares),
        total => Err(LedgerError::SplitMismatch {
            expected: amount.to_string(),
            actual: total.map_or_else(|| "an out-of-range total".to_string(), |t| t.to_string()),
        }),
    }
}

fn split_percentage(
    amount: Money,
    entries: &[(MemberId, Percentage)],
    config: &LedgerConfig,
) -> Result<Shares, LedgerError> {
    for (member, percentage) in entries {
        if percentage.basis_points() == 0 && !config.allow_zero_shares {
            return Err(LedgerError::InvalidShare {
                member: *member,
                reason: "percentage must be positive".to_string(),
            });
        }
    }

    let total: u64 = entries
        .iter()
        .map(|(_, percentage)| u64::from(percentage.basis_points()))
        .sum();
    if total != u64::from(Percentage::WHOLE) {
        return Err(LedgerError::SplitMismatch {
            expected: Percentage(Percentage::WHOLE).to_string(),
            actual: Decimal::new(total as i64, 2).normalize().to_string() + "%",
        });
    }

    let whole = NonZeroU64::new(u64::from(Percentage::WHOLE)).unwrap_or(NonZeroU64::MIN);
    let mut shares: Shares = entries
        .iter()
        .map(|(member, percentage)| {
            let share = amount.multiply_by_ratio(u64::from(percentage.basis_points()), whole);
            (*member, share)
        })
        .collect();

    // Rounding error of each share, scaled by WHOLE: positive if rounded up.
    let exact = |bps: u32| i128::from(amount.minor()) * i128::from(bps);
    let mut eligible: Vec<(i128, MemberId)> = entries
        .iter()
        .filter(|(_, percentage)| percentage.basis_points() > 0)
        .map(|(member, percentage)| {
            let rounded = i128::from(shares[member].minor()) * i128::from(Percentage::WHOLE);
            (rounded - exact(percentage.basis_points()), *member)
        })
        .collect();

    // Overshoot is taken back from the shares rounded up the most; a
    // shortfall goes to the shares rounded down the most. Ties: lowest id.
    if total_minor(&shares) > i128::from(amount.minor()) {
        eligible.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    } else {
        eligible.sort();
    }
    let order: Vec<MemberId> = eligible.into_iter().map(|(_, member)| member).collect();
    reconcile(&mut shares, &order, amount);
    Ok(shares)
}

fn total_minor(shares: &Shares) -> i128 {
    shares.values().map(|share| i128::from(share.minor())).sum()
}

/// Adjusts `shares` one minor unit at a time until they sum to `target`.
///
/// Units are added (or taken) following the order of `eligible`, cycling if
/// needed. Equal splits pass ascending member ids; percentage splits pass
/// members ordered by how far rounding moved their share. Shares never drop
/// below zero.
fn reconcile(shares: &mut Shares, eligible: &[MemberId], target: Money) {
    let currency = target.currency();
    let mut diff = i128::from(target.minor()) - total_minor(shares);
    if eligible.is_empty() {
        debug_assert_eq!(diff, 0, "no eligible members to absorb remainder");
        return;
    }

    let step = Money::from_minor(if diff > 0 { 1 } else { -1 }, currency);
    while diff != 0 {
        let mut progressed = false;
        for member in eligible {
            if diff == 0 {
                break;
            }
            let Some(share) = shares.get_mut(member) else {
                continue;
            };
            if diff < 0 && share.is_zero() {
                continue;
            }
            *share += step;
            diff -= i128::from(step.minor());
            progressed = true;
        }
        if !progressed {
            break;
        }
    }
    debug_assert_eq!(diff, 0, "remainder could not be distributed");
}
