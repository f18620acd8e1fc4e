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

//! Error types for expense splitting, ledger bookkeeping and settlement planning.

use crate::base::{GroupId, MemberId, RecordId};
use crate::money::{Currency, Money};
use thiserror::Error;

/// Errors reported by the split calculator, the ledger and the settlement planner.
///
/// Every variant carries enough context (member, record, amounts) for the
/// caller to render a message. Nothing is retried internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Amount is non-finite, negative, zero where a positive value is required,
    /// too precise for its currency, or above the configured maximum.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// A per-participant share is non-positive or malformed
    #[error("invalid share for member {member}: {reason}")]
    InvalidShare { member: MemberId, reason: String },

    /// Split has no participants
    #[error("split has no participants")]
    EmptySplit,

    /// Supplied shares do not add up to the expense amount (or to 100%)
    #[error("split mismatch: expected {expected}, got {actual}")]
    SplitMismatch { expected: String, actual: String },

    /// The same member is listed twice in one split
    #[error("member {0} appears more than once in the split")]
    DuplicateParticipant(MemberId),

    /// Expense participant is not a current group member
    #[error("participant {0} is not a member of the group")]
    InvalidParticipant(MemberId),

    /// Payer or payee is not a current group member
    #[error("unknown member {0}")]
    UnknownMember(MemberId),

    /// Settlement payer and payee are the same member
    #[error("member {0} cannot settle with themselves")]
    SameParty(MemberId),

    /// Referenced expense or settlement does not exist
    #[error("{0} not found")]
    NotFound(RecordId),

    /// Record ID is already in use
    #[error("duplicate {0}")]
    DuplicateRecord(RecordId),

    /// Currency code is not three ASCII letters
    #[error("unknown currency code {0:?}")]
    InvalidCurrency(String),

    /// Amount is denominated in a different currency than the group
    #[error("currency mismatch: expected {expected}, found {found}")]
    CurrencyMismatch { expected: Currency, found: Currency },

    /// Expense description is empty
    #[error("expense description is required")]
    InvalidDescription,

    /// Member still has a non-zero balance
    #[error("member {member} has an outstanding balance of {balance}")]
    OutstandingBalance { member: MemberId, balance: Money },

    /// Record belongs to another group
    #[error("record belongs to group {found}, not group {expected}")]
    WrongGroup { expected: GroupId, found: GroupId },

    /// No ledger is open for the group
    #[error("unknown group {0}")]
    UnknownGroup(GroupId),

    /// Balances handed to the planner do not sum to zero
    #[error("balances do not sum to zero (off by {0})")]
    Unbalanced(Money),

    /// The persistence collaborator rejected the operation
    #[error("store error: {0}")]
    Store(String),
}
