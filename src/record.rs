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

//! Ledger records: expenses, settlements and the events that log them.
//!
//! `New*` types are caller requests; [`Expense`] and [`Settlement`] are the
//! validated, immutable records the ledger stores. Expenses carry their
//! resolved [`Shares`] so balances never need to re-run the split.

use crate::base::{ExpenseId, GroupId, MemberId, SettlementId};
use crate::money::Money;
use crate::split::{Shares, SplitRule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Expense category. Informational only; it never affects the arithmetic.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Food,
    Groceries,
    Transport,
    Rent,
    Utility,
    Entertainment,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Food,
        Category::Groceries,
        Category::Transport,
        Category::Rent,
        Category::Utility,
        Category::Entertainment,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Groceries => "groceries",
            Self::Transport => "transport",
            Self::Rent => "rent",
            Self::Utility => "utility",
            Self::Entertainment => "entertainment",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown category name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category {0:?}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == wanted)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Request to record an expense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExpense {
    pub id: ExpenseId,
    pub group_id: GroupId,
    pub description: String,
    pub payer: MemberId,
    pub amount: Money,
    #[serde(default)]
    pub category: Category,
    pub split: SplitRule,
    pub created_at: DateTime<Utc>,
}

/// A validated expense with its shares resolved.
///
/// Immutable once recorded; the only lifecycle transition is deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub group_id: GroupId,
    pub description: String,
    pub payer: MemberId,
    pub amount: Money,
    pub category: Category,
    pub split: SplitRule,
    pub shares: Shares,
    pub created_at: DateTime<Utc>,
}

impl Expense {
    /// Share owed by `member`, zero when they did not participate.
    pub fn share_of(&self, member: MemberId) -> Money {
        self.shares
            .get(&member)
            .copied()
            .unwrap_or(Money::zero(self.amount.currency()))
    }
}

/// Request to record a settlement payment from `payer` to `payee`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSettlement {
    pub id: SettlementId,
    pub group_id: GroupId,
    pub payer: MemberId,
    pub payee: MemberId,
    pub amount: Money,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A recorded payment between two members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: SettlementId,
    pub group_id: GroupId,
    pub payer: MemberId,
    pub payee: MemberId,
    pub amount: Money,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Entry in a ledger's append-only event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "id", rename_all = "snake_case")]
pub enum LedgerEvent {
    ExpenseRecorded(ExpenseId),
    ExpenseDeleted(ExpenseId),
    SettlementRecorded(SettlementId),
    SettlementDeleted(SettlementId),
}
