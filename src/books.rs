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

//! Multi-group host.
//!
//! [`Books`] keeps one [`Ledger`] per open group and writes every change
//! through a [`GroupStore`]. Each change is validated first, then persisted,
//! then committed in memory, so a store failure leaves the ledger untouched.
//!
//! # Thread Safety
//!
//! Ledgers live in a [`DashMap`], each behind its own [`Mutex`]. Operations on
//! different groups run in parallel; operations on the same group are
//! serialized, which gives the single-writer-per-group discipline the ledger
//! relies on.

use crate::base::{ExpenseId, GroupId, MemberId, RecordId, SettlementId};
use crate::config::LedgerConfig;
use crate::ledger::{Balances, Ledger, MemberSummary};
use crate::money::Money;
use crate::planner::Transfer;
use crate::record::{Category, Expense, NewExpense, NewSettlement, Settlement};
use crate::store::GroupStore;
use crate::LedgerError;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{error, info};

/// Open group ledgers backed by a persistence collaborator.
pub struct Books<S> {
    store: S,
    config: LedgerConfig,
    groups: DashMap<GroupId, Mutex<Ledger>>,
}

impl<S: GroupStore> Books<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Books {
            store,
            config,
            groups: DashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads a group from the store unless it is already open.
    ///
    /// # Errors
    ///
    /// Whatever the store reports, or a validation error if the persisted
    /// records are inconsistent.
    pub fn open(&self, group_id: GroupId) -> Result<(), LedgerError> {
        if self.groups.contains_key(&group_id) {
            return Ok(());
        }
        let ledger = self.load(group_id)?;
        // A concurrent open may have won the race; keep whichever landed first.
        self.groups
            .entry(group_id)
            .or_insert_with(|| Mutex::new(ledger));
        Ok(())
    }

    /// Reloads a group from the store, picking up membership changes.
    pub fn refresh(&self, group_id: GroupId) -> Result<(), LedgerError> {
        let ledger = self.load(group_id)?;
        self.groups.insert(group_id, Mutex::new(ledger));
        Ok(())
    }

    /// Drops a group from memory. Returns `false` if it was not open.
    pub fn close(&self, group_id: GroupId) -> bool {
        self.groups.remove(&group_id).is_some()
    }

    /// IDs of the open groups, ascending.
    pub fn groups(&self) -> Vec<GroupId> {
        let mut ids: Vec<GroupId> = self.groups.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    /// Runs `f` against a group's ledger while holding its lock.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownGroup`] if the group is not open.
    pub fn with_ledger<R>(
        &self,
        group_id: GroupId,
        f: impl FnOnce(&Ledger) -> R,
    ) -> Result<R, LedgerError> {
        let entry = self
            .groups
            .get(&group_id)
            .ok_or(LedgerError::UnknownGroup(group_id))?;
        let ledger = entry.lock();
        Ok(f(&*ledger))
    }

    /// Validates, persists and records an expense.
    pub fn record_expense(&self, request: NewExpense) -> Result<Expense, LedgerError> {
        self.with_ledger_mut(request.group_id, |ledger, store| {
            let expense = ledger.prepare_expense(request)?;
            store.persist_expense(&expense).inspect_err(|e| {
                error!(group = %expense.group_id, expense = %expense.id, "failed to persist expense: {e}")
            })?;
            Ok(ledger.commit_expense(expense).clone())
        })
    }

    /// Deletes an expense from the store, then from the ledger.
    pub fn delete_expense(&self, group_id: GroupId, id: ExpenseId) -> Result<Expense, LedgerError> {
        self.with_ledger_mut(group_id, |ledger, store| {
            if ledger.expense(id).is_none() {
                return Err(LedgerError::NotFound(RecordId::Expense(id)));
            }
            store.persist_expense_deletion(group_id, id).inspect_err(|e| {
                error!(group = %group_id, expense = %id, "failed to persist expense deletion: {e}")
            })?;
            ledger.delete_expense(id)
        })
    }

    /// Validates, persists and records a settlement.
    pub fn record_settlement(&self, request: NewSettlement) -> Result<Settlement, LedgerError> {
        self.with_ledger_mut(request.group_id, |ledger, store| {
            let settlement = ledger.prepare_settlement(request)?;
            store.persist_settlement(&settlement).inspect_err(|e| {
                error!(group = %settlement.group_id, settlement = %settlement.id, "failed to persist settlement: {e}")
            })?;
            Ok(ledger.commit_settlement(settlement).clone())
        })
    }

    /// Deletes a settlement from the store, then from the ledger.
    pub fn delete_settlement(
        &self,
        group_id: GroupId,
        id: SettlementId,
    ) -> Result<Settlement, LedgerError> {
        self.with_ledger_mut(group_id, |ledger, store| {
            if ledger.settlement(id).is_none() {
                return Err(LedgerError::NotFound(RecordId::Settlement(id)));
            }
            store.persist_settlement_deletion(group_id, id).inspect_err(|e| {
                error!(group = %group_id, settlement = %id, "failed to persist settlement deletion: {e}")
            })?;
            ledger.delete_settlement(id)
        })
    }

    pub fn get_balances(&self, group_id: GroupId) -> Result<Balances, LedgerError> {
        self.with_ledger(group_id, Ledger::balances)
    }

    pub fn get_balance(&self, group_id: GroupId, member: MemberId) -> Result<Money, LedgerError> {
        self.with_ledger(group_id, |ledger| ledger.balance(member))
    }

    pub fn summaries(&self, group_id: GroupId) -> Result<Vec<MemberSummary>, LedgerError> {
        self.with_ledger(group_id, Ledger::summaries)
    }

    pub fn total_spent(&self, group_id: GroupId) -> Result<Money, LedgerError> {
        self.with_ledger(group_id, Ledger::total_spent)
    }

    pub fn totals_by_category(
        &self,
        group_id: GroupId,
    ) -> Result<BTreeMap<Category, Money>, LedgerError> {
        self.with_ledger(group_id, Ledger::totals_by_category)
    }

    pub fn plan_settlement(&self, group_id: GroupId) -> Result<Vec<Transfer>, LedgerError> {
        self.with_ledger(group_id, Ledger::plan_settlement)?
    }

    fn load(&self, group_id: GroupId) -> Result<Ledger, LedgerError> {
        let snapshot = self.store.load_group_state(group_id)?;
        if snapshot.group_id != group_id {
            return Err(LedgerError::WrongGroup {
                expected: group_id,
                found: snapshot.group_id,
            });
        }
        let ledger = Ledger::from_snapshot(snapshot, self.config.clone())?;
        info!(group = %group_id, members = ledger.members().count(), "group opened");
        Ok(ledger)
    }

    fn with_ledger_mut<R>(
        &self,
        group_id: GroupId,
        f: impl FnOnce(&mut Ledger, &S) -> Result<R, LedgerError>,
    ) -> Result<R, LedgerError> {
        let entry = self
            .groups
            .get(&group_id)
            .ok_or(LedgerError::UnknownGroup(group_id))?;
        let mut ledger = entry.lock();
        f(&mut *ledger, &self.store)
    }
}
