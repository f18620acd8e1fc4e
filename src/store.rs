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

//! Persistence collaborator interface.
//!
//! The ledger does not own storage. A [`GroupStore`] loads a consistent
//! snapshot of a group and persists individual changes, each call
//! succeeding or failing atomically. [`MemoryStore`] keeps everything in
//! process and backs the command line tool and the tests.

use crate::base::{ExpenseId, GroupId, Member, SettlementId};
use crate::money::Currency;
use crate::record::{Expense, Settlement};
use crate::LedgerError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Everything the ledger needs to know about one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub group_id: GroupId,
    #[serde(default)]
    pub currency: Currency,
    pub members: Vec<Member>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
    #[serde(default)]
    pub settlements: Vec<Settlement>,
}

impl GroupSnapshot {
    /// A group with members but no records yet.
    pub fn new(group_id: GroupId, currency: Currency, members: Vec<Member>) -> Self {
        Self {
            group_id,
            currency,
            members,
            expenses: Vec::new(),
            settlements: Vec::new(),
        }
    }
}

/// Remote (or local) storage for group records.
///
/// Implementations report failures as [`LedgerError::Store`] or
/// [`LedgerError::UnknownGroup`]; callers never retry.
pub trait GroupStore: Send + Sync {
    fn load_group_state(&self, group_id: GroupId) -> Result<GroupSnapshot, LedgerError>;

    fn persist_expense(&self, expense: &Expense) -> Result<(), LedgerError>;

    fn persist_expense_deletion(&self, group_id: GroupId, id: ExpenseId) -> Result<(), LedgerError>;

    fn persist_settlement(&self, settlement: &Settlement) -> Result<(), LedgerError>;

    fn persist_settlement_deletion(
        &self,
        group_id: GroupId,
        id: SettlementId,
    ) -> Result<(), LedgerError>;
}

/// In-process [`GroupStore`] keyed by group.
#[derive(Debug, Default)]
pub struct MemoryStore {
    groups: DashMap<GroupId, GroupSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a group.
    pub fn insert_group(&self, snapshot: GroupSnapshot) {
        self.groups.insert(snapshot.group_id, snapshot);
    }

    fn with_group<R>(
        &self,
        group_id: GroupId,
        f: impl FnOnce(&mut GroupSnapshot) -> R,
    ) -> Result<R, LedgerError> {
        let mut group = self
            .groups
            .get_mut(&group_id)
            .ok_or(LedgerError::UnknownGroup(group_id))?;
        Ok(f(&mut *group))
    }
}

impl GroupStore for MemoryStore {
    fn load_group_state(&self, group_id: GroupId) -> Result<GroupSnapshot, LedgerError> {
        self.with_group(group_id, |group| group.clone())
    }

    fn persist_expense(&self, expense: &Expense) -> Result<(), LedgerError> {
        self.with_group(expense.group_id, |group| {
            group.expenses.push(expense.clone());
        })
    }

    fn persist_expense_deletion(&self, group_id: GroupId, id: ExpenseId) -> Result<(), LedgerError> {
        self.with_group(group_id, |group| {
            group.expenses.retain(|expense| expense.id != id);
        })
    }

    fn persist_settlement(&self, settlement: &Settlement) -> Result<(), LedgerError> {
        self.with_group(settlement.group_id, |group| {
            group.settlements.push(settlement.clone());
        })
    }

    fn persist_settlement_deletion(
        &self,
        group_id: GroupId,
        id: SettlementId,
    ) -> Result<(), LedgerError> {
        self.with_group(group_id, |group| {
            group.settlements.retain(|settlement| settlement.id != id);
        })
    }
}
