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

//! Settlement planner.
//!
//! Turns net balances into a short list of payer → payee transfers that
//! brings everyone to zero. Greedy largest-pair matching: the largest debtor
//! pays the largest creditor `min(debt, credit)`, and whoever reaches zero
//! drops out. Ties go to the lower member id, so plans are reproducible.
//!
//! Every step zeroes at least one party and the last step zeroes two, so a
//! plan never has more than `non-zero balances - 1` transfers.

use crate::base::MemberId;
use crate::ledger::Balances;
use crate::money::{Currency, Money};
use crate::LedgerError;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::error;

/// A single payment in a settlement plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transfer {
    pub from: MemberId,
    pub to: MemberId,
    pub amount: Money,
}

/// Heap entry: largest magnitude first, then lowest member id.
///
/// Magnitudes are unsigned so that `i64::MIN` debts are representable.
type Party = (u64, Reverse<MemberId>);

/// Computes the transfers that settle `balances`.
///
/// Returns an empty plan when every balance is already zero.
///
/// # Errors
///
/// - [`LedgerError::CurrencyMismatch`] - balances in more than one currency.
/// - [`LedgerError::Unbalanced`] - balances do not sum to exactly zero. This
///   means a bug upstream; the ledger never produces such input. Totals are
///   checked in `i128`, so overflowing input is reported, not wrapped.
pub fn plan_settlement(balances: &Balances) -> Result<Vec<Transfer>, LedgerError> {
    let Some(currency) = balances.values().next().map(Money::currency) else {
        return Ok(Vec::new());
    };
    check_balanced(balances, currency)?;

    let mut creditors: BinaryHeap<Party> = BinaryHeap::new();
    let mut debtors: BinaryHeap<Party> = BinaryHeap::new();
    for (member, balance) in balances {
        if balance.is_positive() {
            creditors.push((balance.minor().unsigned_abs(), Reverse(*member)));
        } else if balance.is_negative() {
            debtors.push((balance.minor().unsigned_abs(), Reverse(*member)));
        }
    }

    let mut transfers = Vec::new();
    while let (Some((debt, Reverse(debtor))), Some((credit, Reverse(creditor)))) =
        (debtors.pop(), creditors.pop())
    {
        let amount = debt.min(credit);
        // Bounded by a creditor's positive i64 balance.
        let minor = i64::try_from(amount).unwrap_or(i64::MAX);
        transfers.push(Transfer {
            from: debtor,
            to: creditor,
            amount: Money::from_minor(minor, currency),
        });
        if debt > amount {
            debtors.push((debt - amount, Reverse(debtor)));
        }
        if credit > amount {
            creditors.push((credit - amount, Reverse(creditor)));
        }
    }
    debug_assert!(
        debtors.is_empty() && creditors.is_empty(),
        "Invariant violated: parties left after settlement"
    );

    Ok(transfers)
}

fn check_balanced(balances: &Balances, currency: Currency) -> Result<(), LedgerError> {
    if let Some(foreign) = balances.values().find(|b| b.currency() != currency) {
        return Err(LedgerError::CurrencyMismatch {
            expected: currency,
            found: foreign.currency(),
        });
    }
    let total: i128 = balances.values().map(|b| i128::from(b.minor())).sum();
    if total != 0 {
        let clamped = i64::try_from(total).unwrap_or(if total > 0 { i64::MAX } else { i64::MIN });
        let off_by = Money::from_minor(clamped, currency);
        error!(%off_by, exact = %total, "refusing to plan settlement for unbalanced group");
        return Err(LedgerError::Unbalanced(off_by));
    }
    Ok(())
}
