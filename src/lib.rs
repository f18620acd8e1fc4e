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

//! # Expense Ledger
//!
//! This library splits shared expenses among group members, keeps track of
//! who owes whom, and plans the fewest payments that settle a group.
//!
//! ## Core Components
//!
//! - [`Money`]: Exact integer amount in minor currency units
//! - [`compute_shares`]: Split calculator for `equal`, `exact` and `percentage` rules
//! - [`Ledger`]: Per-group record of expenses and settlements with derived balances
//! - [`plan_settlement`]: Minimal transfer plan that zeroes all balances
//! - [`Books`]: Concurrent multi-group host backed by a [`GroupStore`]
//! - [`LedgerError`]: Error types for validation and invariant failures
//!
//! ## Example
//!
//! ```
//! use chrono::Utc;
//! use expense_ledger::{
//!     Currency, GroupId, Ledger, LedgerConfig, Member, MemberId, Money, NewSettlement,
//!     SettlementId,
//! };
//!
//! let mut ledger = Ledger::new(GroupId(1), Currency::USD, LedgerConfig::default());
//! ledger.add_member(Member::new(MemberId(1), "Ana"));
//! ledger.add_member(Member::new(MemberId(2), "Ben"));
//!
//! ledger
//!     .record_settlement(NewSettlement {
//!         id: SettlementId(1),
//!         group_id: GroupId(1),
//!         payer: MemberId(2),
//!         payee: MemberId(1),
//!         amount: Money::from_minor(2_500, Currency::USD),
//!         note: Some("taxi".to_string()),
//!         created_at: Utc::now(),
//!     })
//!     .unwrap();
//!
//! let plan = ledger.plan_settlement().unwrap();
//! assert_eq!(plan.len(), 1);
//! assert_eq!(plan[0].from, MemberId(1));
//! assert_eq!(plan[0].to, MemberId(2));
//! ```
//!
//! ## Thread Safety
//!
//! A [`Ledger`] is plain data and is not synchronized. [`Books`] holds one
//! ledger per group behind its own lock, so different groups proceed in
//! parallel while writes to the same group are serialized.

mod base;
mod books;
pub mod config;
pub mod error;
pub mod ledger;
mod money;
pub mod planner;
mod record;
pub mod split;
pub mod store;

pub use base::{ExpenseId, GroupId, Member, MemberId, RecordId, SettlementId};
pub use books::Books;
pub use config::{ConfigError, LedgerConfig};
pub use error::LedgerError;
pub use ledger::{BalanceStatus, Balances, Ledger, MemberSummary, fold_balances};
pub use money::{Currency, Money};
pub use planner::{Transfer, plan_settlement};
pub use record::{
    Category, Expense, LedgerEvent, NewExpense, NewSettlement, Settlement, UnknownCategory,
};
pub use split::{Percentage, Shares, SplitRule, compute_shares};
pub use store::{GroupSnapshot, GroupStore, MemoryStore};
