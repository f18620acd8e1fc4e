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

//! Per-group ledger.
//!
//! A [`Ledger`] holds one group's members, expenses and settlements, plus an
//! append-only log of what happened to them. Balances are never stored: every
//! call to [`Ledger::balances`] folds the full record set again, so deleting a
//! record can't leave drift behind.
//!
//! # Balance Formula
//!
//! | Record | Effect |
//! |--------|--------|
//! | Expense | payer `+= amount`, each participant `-= share` |
//! | Settlement | payer `+= amount`, payee `-= amount` |
//!
//! Positive means the group owes the member; negative means the member owes
//! the group. The balances of a group always sum to exactly zero.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use expense_ledger::{
//!     Category, Currency, ExpenseId, GroupId, Ledger, LedgerConfig, Member, MemberId, Money,
//!     NewExpense, SplitRule,
//! };
//!
//! let mut ledger = Ledger::new(GroupId(1), Currency::INR, LedgerConfig::default());
//! for (id, name) in [(1, "Asha"), (2, "Bilal"), (3, "Chen")] {
//!     ledger.add_member(Member::new(MemberId(id), name));
//! }
//!
//! ledger
//!     .record_expense(NewExpense {
//!         id: ExpenseId(1),
//!         group_id: GroupId(1),
//!         description: "Groceries".to_string(),
//!         payer: MemberId(1),
//!         amount: Money::from_minor(100, Currency::INR),
//!         category: Category::Groceries,
//!         split: SplitRule::Equal(vec![MemberId(1), MemberId(2), MemberId(3)]),
//!         created_at: Utc::now(),
//!     })
//!     .unwrap();
//!
//! assert_eq!(ledger.balance(MemberId(1)).minor(), 66);
//! assert_eq!(ledger.balance(MemberId(2)).minor(), -33);
//! ```

use crate::base::{ExpenseId, GroupId, Member, MemberId, RecordId, SettlementId};
use crate::config::LedgerConfig;
use crate::money::{Currency, Money};
use crate::planner::{self, Transfer};
use crate::record::{Category, Expense, LedgerEvent, NewExpense, NewSettlement, Settlement};
use crate::split::compute_shares;
use crate::store::GroupSnapshot;
use crate::LedgerError;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Net balance per member, ordered by member id.
pub type Balances = BTreeMap<MemberId, Money>;

/// Whether a member is square with the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceStatus {
    /// Balance is exactly zero.
    Settled,
    /// The group owes the member.
    Owed,
    /// The member owes the group.
    Owes,
}

impl BalanceStatus {
    pub fn of(balance: Money) -> Self {
        if balance.is_positive() {
            Self::Owed
        } else if balance.is_negative() {
            Self::Owes
        } else {
            Self::Settled
        }
    }
}

/// Breakdown of how a member's balance came about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberSummary {
    pub member: MemberId,
    /// Name, if the member is still in the group.
    pub name: Option<String>,
    /// Total of expenses the member paid for.
    pub paid: Money,
    /// Total of the member's own shares across all expenses.
    pub share: Money,
    /// Settlement payments the member made.
    pub sent: Money,
    /// Settlement payments the member received.
    pub received: Money,
    /// `paid - share + sent - received`
    pub balance: Money,
    pub status: BalanceStatus,
}

/// Expense and settlement book for a single group.
///
/// Not internally synchronized: hosts serving several callers must serialize
/// mutations per group (see [`Books`](crate::Books)).
#[derive(Debug, Clone)]
pub struct Ledger {
    group_id: GroupId,
    currency: Currency,
    config: LedgerConfig,
    members: BTreeMap<MemberId, Member>,
    expenses: BTreeMap<ExpenseId, Expense>,
    settlements: BTreeMap<SettlementId, Settlement>,
    events: Vec<LedgerEvent>,
}

impl Ledger {
    /// Creates an empty ledger with no members.
    pub fn new(group_id: GroupId, currency: Currency, config: LedgerConfig) -> Self {
        Self {
            group_id,
            currency,
            config,
            members: BTreeMap::new(),
            expenses: BTreeMap::new(),
            settlements: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    /// Rebuilds a ledger from persisted group state.
    ///
    /// Restored records are checked structurally (group, currency, unique ids,
    /// positive amounts, shares that reconcile with the expense amount).
    /// Membership is not re-checked: past participants may have left.
    pub fn from_snapshot(snapshot: GroupSnapshot, config: LedgerConfig) -> Result<Self, LedgerError> {
        let mut ledger = Ledger::new(snapshot.group_id, snapshot.currency, config);
        for member in snapshot.members {
            ledger.add_member(member);
        }
        for expense in snapshot.expenses {
            ledger.restore_expense(expense)?;
        }
        for settlement in snapshot.settlements {
            ledger.restore_settlement(settlement)?;
        }
        debug!(
            group = %ledger.group_id,
            expenses = ledger.expenses.len(),
            settlements = ledger.settlements.len(),
            "restored ledger from snapshot"
        );
        Ok(ledger)
    }

    /// Captures the current state in the shape the store persists.
    pub fn snapshot(&self) -> GroupSnapshot {
        GroupSnapshot {
            group_id: self.group_id,
            currency: self.currency,
            members: self.members.values().cloned().collect(),
            expenses: self.expenses.values().cloned().collect(),
            settlements: self.settlements.values().cloned().collect(),
        }
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // === Membership ===

    /// Adds a member, or updates the name of an existing one.
    pub fn add_member(&mut self, member: Member) {
        debug!(group = %self.group_id, member = %member.id, "member added");
        self.members.insert(member.id, member);
    }

    /// Removes a member whose balance is zero.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::UnknownMember`] - not a current member.
    /// - [`LedgerError::OutstandingBalance`] - the member still owes or is owed.
    pub fn remove_member(&mut self, member: MemberId) -> Result<Member, LedgerError> {
        if !self.members.contains_key(&member) {
            return Err(LedgerError::UnknownMember(member));
        }
        let balance = self.balance(member);
        if !balance.is_zero() {
            return Err(LedgerError::OutstandingBalance { member, balance });
        }
        debug!(group = %self.group_id, %member, "member removed");
        self.members
            .remove(&member)
            .ok_or(LedgerError::UnknownMember(member))
    }

    pub fn is_member(&self, member: MemberId) -> bool {
        self.members.contains_key(&member)
    }

    pub fn member(&self, member: MemberId) -> Option<&Member> {
        self.members.get(&member)
    }

    /// Current members in ascending id order.
    pub fn members(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    // === Expenses ===

    /// Validates an expense request and resolves its shares without storing it.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::WrongGroup`] - request targets another group.
    /// - [`LedgerError::DuplicateRecord`] - expense id already recorded.
    /// - [`LedgerError::InvalidDescription`] - blank description.
    /// - [`LedgerError::CurrencyMismatch`] - amount not in the group currency.
    /// - [`LedgerError::InvalidAmount`] - amount not positive, above the limit,
    ///   or the group's recorded volume would leave `i64` range.
    /// - [`LedgerError::UnknownMember`] - payer is not a member.
    /// - [`LedgerError::InvalidParticipant`] - a participant is not a member.
    /// - Any split error from [`compute_shares`].
    pub fn prepare_expense(&self, request: NewExpense) -> Result<Expense, LedgerError> {
        self.check_group(request.group_id)?;
        if self.expenses.contains_key(&request.id) {
            return Err(LedgerError::DuplicateRecord(RecordId::Expense(request.id)));
        }
        let description = request.description.trim();
        if description.is_empty() {
            return Err(LedgerError::InvalidDescription);
        }
        self.check_currency(request.amount)?;
        self.config.check_amount(request.amount)?;
        self.check_volume(request.amount)?;
        if !self.is_member(request.payer) {
            return Err(LedgerError::UnknownMember(request.payer));
        }
        if let Some(outsider) = request
            .split
            .participants()
            .into_iter()
            .find(|participant| !self.is_member(*participant))
        {
            return Err(LedgerError::InvalidParticipant(outsider));
        }

        let shares = compute_shares(request.amount, &request.split, &self.config)?;

        Ok(Expense {
            id: request.id,
            group_id: request.group_id,
            description: description.to_string(),
            payer: request.payer,
            amount: request.amount,
            category: request.category,
            split: request.split,
            shares,
            created_at: request.created_at,
        })
    }

    /// Stores an expense produced by [`Ledger::prepare_expense`].
    pub(crate) fn commit_expense(&mut self, expense: Expense) -> &Expense {
        let id = expense.id;
        debug!(
            group = %self.group_id,
            expense = %id,
            amount = %expense.amount,
            rule = expense.split.kind(),
            "expense recorded"
        );
        self.events.push(LedgerEvent::ExpenseRecorded(id));
        self.expenses.insert(id, expense);
        self.assert_invariants();
        &self.expenses[&id]
    }

    /// Validates, splits and stores an expense.
    ///
    /// Returns the stored expense with its resolved shares. See
    /// [`Ledger::prepare_expense`] for the error cases.
    pub fn record_expense(&mut self, request: NewExpense) -> Result<&Expense, LedgerError> {
        let id = request.id;
        let expense = self
            .prepare_expense(request)
            .inspect_err(|e| warn!(group = %self.group_id, expense = %id, "expense rejected: {e}"))?;
        Ok(self.commit_expense(expense))
    }

    /// Removes an expense; balances are recomputed without it.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] if no expense has this id.
    pub fn delete_expense(&mut self, id: ExpenseId) -> Result<Expense, LedgerError> {
        let expense = self
            .expenses
            .remove(&id)
            .ok_or(LedgerError::NotFound(RecordId::Expense(id)))?;
        self.events.push(LedgerEvent::ExpenseDeleted(id));
        debug!(group = %self.group_id, expense = %id, "expense deleted");
        self.assert_invariants();
        Ok(expense)
    }

    pub fn expense(&self, id: ExpenseId) -> Option<&Expense> {
        self.expenses.get(&id)
    }

    /// Recorded expenses in ascending id order.
    pub fn expenses(&self) -> impl Iterator<Item = &Expense> {
        self.expenses.values()
    }

    /// Recorded expenses of one category.
    pub fn expenses_in(&self, category: Category) -> impl Iterator<Item = &Expense> {
        self.expenses
            .values()
            .filter(move |expense| expense.category == category)
    }

    /// Sum of all recorded expense amounts.
    pub fn total_spent(&self) -> Money {
        Money::sum(
            self.expenses.values().map(|expense| expense.amount),
            self.currency,
        )
    }

    /// Expense totals per category; categories with no expenses are absent.
    pub fn totals_by_category(&self) -> BTreeMap<Category, Money> {
        let mut totals = BTreeMap::new();
        for expense in self.expenses.values() {
            *totals
                .entry(expense.category)
                .or_insert(Money::zero(self.currency)) += expense.amount;
        }
        totals
    }

    // === Settlements ===

    /// Validates a settlement request without storing it.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::WrongGroup`] - request targets another group.
    /// - [`LedgerError::DuplicateRecord`] - settlement id already recorded.
    /// - [`LedgerError::SameParty`] - payer and payee are the same member.
    /// - [`LedgerError::CurrencyMismatch`] - amount not in the group currency.
    /// - [`LedgerError::InvalidAmount`] - amount not positive, above the limit,
    ///   or the group's recorded volume would leave `i64` range.
    /// - [`LedgerError::UnknownMember`] - payer or payee is not a member.
    pub fn prepare_settlement(&self, request: NewSettlement) -> Result<Settlement, LedgerError> {
        self.check_group(request.group_id)?;
        if self.settlements.contains_key(&request.id) {
            return Err(LedgerError::DuplicateRecord(RecordId::Settlement(request.id)));
        }
        if request.payer == request.payee {
            return Err(LedgerError::SameParty(request.payer));
        }
        self.check_currency(request.amount)?;
        self.config.check_amount(request.amount)?;
        self.check_volume(request.amount)?;
        for party in [request.payer, request.payee] {
            if !self.is_member(party) {
                return Err(LedgerError::UnknownMember(party));
            }
        }

        Ok(Settlement {
            id: request.id,
            group_id: request.group_id,
            payer: request.payer,
            payee: request.payee,
            amount: request.amount,
            note: request
                .note
                .map(|note| note.trim().to_string())
                .filter(|note| !note.is_empty()),
            created_at: request.created_at,
        })
    }

    /// Stores a settlement produced by [`Ledger::prepare_settlement`].
    pub(crate) fn commit_settlement(&mut self, settlement: Settlement) -> &Settlement {
        let id = settlement.id;
        debug!(
            group = %self.group_id,
            settlement = %id,
            payer = %settlement.payer,
            payee = %settlement.payee,
            amount = %settlement.amount,
            "settlement recorded"
        );
        self.events.push(LedgerEvent::SettlementRecorded(id));
        self.settlements.insert(id, settlement);
        self.assert_invariants();
        &self.settlements[&id]
    }

    /// Validates and stores a settlement payment.
    ///
    /// See [`Ledger::prepare_settlement`] for the error cases.
    pub fn record_settlement(&mut self, request: NewSettlement) -> Result<&Settlement, LedgerError> {
        let id = request.id;
        let settlement = self.prepare_settlement(request).inspect_err(
            |e| warn!(group = %self.group_id, settlement = %id, "settlement rejected: {e}"),
        )?;
        Ok(self.commit_settlement(settlement))
    }

    /// Removes a settlement; balances are recomputed without it.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] if no settlement has this id.
    pub fn delete_settlement(&mut self, id: SettlementId) -> Result<Settlement, LedgerError> {
        let settlement = self
            .settlements
            .remove(&id)
            .ok_or(LedgerError::NotFound(RecordId::Settlement(id)))?;
        self.events.push(LedgerEvent::SettlementDeleted(id));
        debug!(group = %self.group_id, settlement = %id, "settlement deleted");
        self.assert_invariants();
        Ok(settlement)
    }

    pub fn settlement(&self, id: SettlementId) -> Option<&Settlement> {
        self.settlements.get(&id)
    }

    /// Recorded settlements in ascending id order.
    pub fn settlements(&self) -> impl Iterator<Item = &Settlement> {
        self.settlements.values()
    }

    /// Every record and removal in the order it happened.
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    // === Balances ===

    /// Net balance of every member who appears in an expense or settlement.
    pub fn balances(&self) -> Balances {
        fold_balances(
            self.currency,
            self.expenses.values(),
            self.settlements.values(),
        )
    }

    /// Net balance of one member; zero when they have no recorded activity.
    pub fn balance(&self, member: MemberId) -> Money {
        self.balances()
            .get(&member)
            .copied()
            .unwrap_or(Money::zero(self.currency))
    }

    /// Per-member breakdown for current members and anyone with activity.
    pub fn summaries(&self) -> Vec<MemberSummary> {
        let mut summaries: BTreeMap<MemberId, MemberSummary> = BTreeMap::new();

        for member in self.members.keys() {
            self.summary_entry(&mut summaries, *member);
        }
        for expense in self.expenses.values() {
            self.summary_entry(&mut summaries, expense.payer).paid += expense.amount;
            for (member, share) in &expense.shares {
                self.summary_entry(&mut summaries, *member).share += *share;
            }
        }
        for settlement in self.settlements.values() {
            self.summary_entry(&mut summaries, settlement.payer).sent += settlement.amount;
            self.summary_entry(&mut summaries, settlement.payee).received += settlement.amount;
        }

        summaries
            .into_values()
            .map(|mut summary| {
                summary.balance = summary.paid - summary.share + summary.sent - summary.received;
                summary.status = BalanceStatus::of(summary.balance);
                summary
            })
            .collect()
    }

    /// Minimal transfer list that brings every balance to zero.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unbalanced`] only if the zero-sum invariant is broken.
    pub fn plan_settlement(&self) -> Result<Vec<Transfer>, LedgerError> {
        planner::plan_settlement(&self.balances())
    }

    // === Internals ===

    fn check_group(&self, group_id: GroupId) -> Result<(), LedgerError> {
        if group_id != self.group_id {
            return Err(LedgerError::WrongGroup {
                expected: self.group_id,
                found: group_id,
            });
        }
        Ok(())
    }

    fn check_currency(&self, amount: Money) -> Result<(), LedgerError> {
        if amount.currency() != self.currency {
            return Err(LedgerError::CurrencyMismatch {
                expected: self.currency,
                found: amount.currency(),
            });
        }
        Ok(())
    }

    /// Every balance, partial fold and total is bounded by the sum of all
    /// recorded amounts, so keeping that sum in `i64` range keeps the
    /// arithmetic exact.
    fn check_volume(&self, amount: Money) -> Result<(), LedgerError> {
        let recorded: i128 = self
            .expenses
            .values()
            .map(|expense| i128::from(expense.amount.minor()))
            .chain(
                self.settlements
                    .values()
                    .map(|settlement| i128::from(settlement.amount.minor())),
            )
            .sum();
        if recorded + i128::from(amount.minor()) > i128::from(i64::MAX) {
            return Err(LedgerError::InvalidAmount(format!(
                "{amount} would take the group's recorded total out of range"
            )));
        }
        Ok(())
    }

    fn restore_expense(&mut self, expense: Expense) -> Result<(), LedgerError> {
        self.check_group(expense.group_id)?;
        if self.expenses.contains_key(&expense.id) {
            return Err(LedgerError::DuplicateRecord(RecordId::Expense(expense.id)));
        }
        self.check_currency(expense.amount)?;
        self.config.check_amount(expense.amount)?;
        for (member, share) in &expense.shares {
            self.check_currency(*share)?;
            if share.is_negative() {
                return Err(LedgerError::InvalidShare {
                    member: *member,
                    reason: format!("{share} must not be negative"),
                });
            }
        }
        self.check_volume(expense.amount)?;
        match Money::checked_sum(expense.shares.values().copied(), self.currency) {
            Some(total) if total == expense.amount => {}
            total => {
                return Err(LedgerError::SplitMismatch {
                    expected: expense.amount.to_string(),
                    actual: total
                        .map_or_else(|| "an out-of-range total".to_string(), |t| t.to_string()),
                });
            }
        }
        self.commit_expense(expense);
        Ok(())
    }

    fn restore_settlement(&mut self, settlement: Settlement) -> Result<(), LedgerError> {
        self.check_group(settlement.group_id)?;
        if self.settlements.contains_key(&settlement.id) {
            return Err(LedgerError::DuplicateRecord(RecordId::Settlement(
                settlement.id,
            )));
        }
        if settlement.payer == settlement.payee {
            return Err(LedgerError::SameParty(settlement.payer));
        }
        self.check_currency(settlement.amount)?;
        self.config.check_amount(settlement.amount)?;
        self.check_volume(settlement.amount)?;
        self.commit_settlement(settlement);
        Ok(())
    }

    fn summary_entry<'s>(
        &self,
        summaries: &'s mut BTreeMap<MemberId, MemberSummary>,
        member: MemberId,
    ) -> &'s mut MemberSummary {
        let zero = Money::zero(self.currency);
        summaries.entry(member).or_insert_with(|| MemberSummary {
            member,
            name: self.members.get(&member).map(|m| m.name.clone()),
            paid: zero,
            share: zero,
            sent: zero,
            received: zero,
            balance: zero,
            status: BalanceStatus::Settled,
        })
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.balances().values().all(|b| b.currency() == self.currency),
            "Invariant violated: balance in foreign currency"
        );
        debug_assert!(
            Money::sum(self.balances().into_values(), self.currency).is_zero(),
            "Invariant violated: balances of group {} do not sum to zero",
            self.group_id
        );
    }
}

/// Folds expenses and settlements into per-member balances.
///
/// Order-independent: the result depends only on the set of records.
pub fn fold_balances<'a, E, S>(currency: Currency, expenses: E, settlements: S) -> Balances
where
    E: IntoIterator<Item = &'a Expense>,
    S: IntoIterator<Item = &'a Settlement>,
{
    let zero = Money::zero(currency);
    let mut balances = Balances::new();

    for expense in expenses {
        *balances.entry(expense.payer).or_insert(zero) += expense.amount;
        for (member, share) in &expense.shares {
            *balances.entry(*member).or_insert(zero) -= *share;
        }
    }
    for settlement in settlements {
        *balances.entry(settlement.payer).or_insert(zero) += settlement.amount;
        *balances.entry(settlement.payee).or_insert(zero) -= settlement.amount;
    }

    balances
}
