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

//! Multi-group host tests: write-through persistence and per-group locking.

use chrono::{DateTime, Utc};
use expense_ledger::{
    Books, Category, Currency, Expense, ExpenseId, GroupId, GroupSnapshot, GroupStore,
    LedgerConfig, LedgerError, Member, MemberId, MemoryStore, Money, NewExpense, NewSettlement,
    RecordId, Settlement, SettlementId, SplitRule,
};
use parking_lot::deadlock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

fn inr(minor: i64) -> Money {
    Money::from_minor(minor, Currency::INR)
}

fn group(id: u32, members: &[u32]) -> GroupSnapshot {
    GroupSnapshot::new(
        GroupId(id),
        Currency::INR,
        members
            .iter()
            .map(|m| Member::new(MemberId(*m), format!("member-{m}")))
            .collect(),
    )
}

fn make_expense(group: u32, id: u32, payer: u32, amount: i64, participants: &[u32]) -> NewExpense {
    NewExpense {
        id: ExpenseId(id),
        group_id: GroupId(group),
        description: "shared".to_string(),
        payer: MemberId(payer),
        amount: inr(amount),
        category: Category::Groceries,
        split: SplitRule::Equal(participants.iter().map(|m| MemberId(*m)).collect()),
        created_at: DateTime::<Utc>::UNIX_EPOCH,
    }
}

fn make_settlement(group: u32, id: u32, payer: u32, payee: u32, amount: i64) -> NewSettlement {
    NewSettlement {
        id: SettlementId(id),
        group_id: GroupId(group),
        payer: MemberId(payer),
        payee: MemberId(payee),
        amount: inr(amount),
        note: None,
        created_at: DateTime::<Utc>::UNIX_EPOCH,
    }
}

fn open_books(groups: &[GroupSnapshot]) -> Books<MemoryStore> {
    let store = MemoryStore::new();
    for snapshot in groups {
        store.insert_group(snapshot.clone());
    }
    let books = Books::new(store, LedgerConfig::default());
    for snapshot in groups {
        books.open(snapshot.group_id).unwrap();
    }
    books
}

/// Store that can be told to fail every write.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    fn check(&self) -> Result<(), LedgerError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LedgerError::Store("connection reset".to_string()));
        }
        Ok(())
    }
}

impl GroupStore for FlakyStore {
    fn load_group_state(&self, group_id: GroupId) -> Result<GroupSnapshot, LedgerError> {
        self.inner.load_group_state(group_id)
    }

    fn persist_expense(&self, expense: &Expense) -> Result<(), LedgerError> {
        self.check()?;
        self.inner.persist_expense(expense)
    }

    fn persist_expense_deletion(&self, group_id: GroupId, id: ExpenseId) -> Result<(), LedgerError> {
        self.check()?;
        self.inner.persist_expense_deletion(group_id, id)
    }

    fn persist_settlement(&self, settlement: &Settlement) -> Result<(), LedgerError> {
        self.check()?;
        self.inner.persist_settlement(settlement)
    }

    fn persist_settlement_deletion(
        &self,
        group_id: GroupId,
        id: SettlementId,
    ) -> Result<(), LedgerError> {
        self.check()?;
        self.inner.persist_settlement_deletion(group_id, id)
    }
}

#[test]
fn unopened_group_is_unknown() {
    let books = Books::new(MemoryStore::new(), LedgerConfig::default());
    assert_eq!(
        books.get_balances(GroupId(1)),
        Err(LedgerError::UnknownGroup(GroupId(1)))
    );
    assert_eq!(books.open(GroupId(1)), Err(LedgerError::UnknownGroup(GroupId(1))));
}

#[test]
fn records_are_written_through_to_the_store() {
    let books = open_books(&[group(1, &[1, 2, 3])]);
    books.record_expense(make_expense(1, 1, 1, 100, &[1, 2, 3])).unwrap();
    books.record_settlement(make_settlement(1, 1, 2, 1, 33)).unwrap();

    let persisted = books.store().load_group_state(GroupId(1)).unwrap();
    assert_eq!(persisted.expenses.len(), 1);
    assert_eq!(persisted.settlements.len(), 1);

    assert_eq!(books.get_balance(GroupId(1), MemberId(1)), Ok(inr(33)));
    assert_eq!(books.get_balance(GroupId(1), MemberId(2)), Ok(inr(0)));
    assert_eq!(books.get_balance(GroupId(1), MemberId(3)), Ok(inr(-33)));
}

#[test]
fn reopening_from_store_reproduces_balances() {
    let books = open_books(&[group(1, &[1, 2, 3])]);
    books.record_expense(make_expense(1, 1, 1, 1_000, &[1, 2, 3])).unwrap();
    books.record_expense(make_expense(1, 2, 2, 301, &[2, 3])).unwrap();
    books.record_settlement(make_settlement(1, 1, 3, 1, 100)).unwrap();
    books.delete_expense(GroupId(1), ExpenseId(2)).unwrap();
    let before = books.get_balances(GroupId(1)).unwrap();

    assert!(books.close(GroupId(1)));
    books.open(GroupId(1)).unwrap();
    assert_eq!(books.get_balances(GroupId(1)).unwrap(), before);
}

#[test]
fn store_failure_leaves_ledger_unchanged() {
    let store = FlakyStore::default();
    store.inner.insert_group(group(1, &[1, 2]));
    let books = Books::new(store, LedgerConfig::default());
    books.open(GroupId(1)).unwrap();
    books.record_expense(make_expense(1, 1, 1, 100, &[1, 2])).unwrap();
    let before = books.get_balances(GroupId(1)).unwrap();

    books.store().failing.store(true, Ordering::SeqCst);
    assert_eq!(
        books.record_expense(make_expense(1, 2, 2, 500, &[1, 2])),
        Err(LedgerError::Store("connection reset".to_string()))
    );
    assert!(books.delete_expense(GroupId(1), ExpenseId(1)).is_err());
    assert!(books.record_settlement(make_settlement(1, 1, 2, 1, 50)).is_err());

    assert_eq!(books.get_balances(GroupId(1)).unwrap(), before);
    assert_eq!(books.with_ledger(GroupId(1), |l| l.events().len()), Ok(1));
}

#[test]
fn validation_failure_never_reaches_the_store() {
    let books = open_books(&[group(1, &[1, 2])]);
    assert_eq!(
        books.record_expense(make_expense(1, 1, 1, 100, &[1, 9])),
        Err(LedgerError::InvalidParticipant(MemberId(9)))
    );
    assert_eq!(
        books.delete_settlement(GroupId(1), SettlementId(4)),
        Err(LedgerError::NotFound(RecordId::Settlement(SettlementId(4))))
    );

    let persisted = books.store().load_group_state(GroupId(1)).unwrap();
    assert!(persisted.expenses.is_empty());
}

#[test]
fn refresh_picks_up_new_members() {
    let books = open_books(&[group(1, &[1, 2])]);
    assert_eq!(
        books.record_expense(make_expense(1, 1, 1, 90, &[1, 2, 3])),
        Err(LedgerError::InvalidParticipant(MemberId(3)))
    );

    books.store().insert_group(group(1, &[1, 2, 3]));
    books.refresh(GroupId(1)).unwrap();
    books.record_expense(make_expense(1, 1, 1, 90, &[1, 2, 3])).unwrap();
    assert_eq!(books.get_balance(GroupId(1), MemberId(3)), Ok(inr(-30)));
}

#[test]
fn plan_and_summaries_per_group() {
    let books = open_books(&[group(1, &[1, 2]), group(2, &[1, 2])]);
    books.record_expense(make_expense(1, 1, 1, 100, &[1, 2])).unwrap();

    let plan = books.plan_settlement(GroupId(1)).unwrap();
    assert_eq!(plan.len(), 1);
    assert_eq!(plan[0].amount, inr(50));
    assert!(books.plan_settlement(GroupId(2)).unwrap().is_empty());

    let summaries = books.summaries(GroupId(2)).unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(books.groups(), vec![GroupId(1), GroupId(2)]);
}

#[test]
fn spending_totals_per_group() {
    let books = open_books(&[group(1, &[1, 2]), group(2, &[1, 2])]);
    books.record_expense(make_expense(1, 1, 1, 100, &[1, 2])).unwrap();
    books.record_expense(make_expense(1, 2, 2, 30, &[1, 2])).unwrap();

    assert_eq!(books.total_spent(GroupId(1)), Ok(inr(130)));
    assert_eq!(books.total_spent(GroupId(2)), Ok(inr(0)));

    let totals = books.totals_by_category(GroupId(1)).unwrap();
    assert_eq!(totals.into_iter().collect::<Vec<_>>(), vec![(Category::Groceries, inr(130))]);
    assert!(books.totals_by_category(GroupId(2)).unwrap().is_empty());
    assert_eq!(
        books.total_spent(GroupId(9)),
        Err(LedgerError::UnknownGroup(GroupId(9)))
    );
}

#[test]
fn concurrent_writes_across_groups() {
    const GROUPS: u32 = 8;
    const EXPENSES: u32 = 50;

    let snapshots: Vec<GroupSnapshot> = (1..=GROUPS).map(|g| group(g, &[1, 2, 3])).collect();
    let books = Arc::new(open_books(&snapshots));

    let mut handles = vec![];
    for g in 1..=GROUPS {
        let books = Arc::clone(&books);
        handles.push(thread::spawn(move || {
            for e in 0..EXPENSES {
                let payer = e % 3 + 1;
                books
                    .record_expense(make_expense(g, e, payer, 101, &[1, 2, 3]))
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for g in 1..=GROUPS {
        let balances = books.get_balances(GroupId(g)).unwrap();
        assert!(Money::sum(balances.into_values(), Currency::INR).is_zero());
        let persisted = books.store().load_group_state(GroupId(g)).unwrap();
        assert_eq!(persisted.expenses.len(), EXPENSES as usize);
    }
}

#[test]
fn concurrent_writers_on_one_group_are_serialized() {
    const THREADS: u32 = 4;
    const PER_THREAD: u32 = 25;

    let books = Arc::new(open_books(&[group(1, &[1, 2])]));

    let mut handles = vec![];
    for t in 0..THREADS {
        let books = Arc::clone(&books);
        handles.push(thread::spawn(move || {
            for i in 0..PER_THREAD {
                let id = t * PER_THREAD + i;
                books.record_expense(make_expense(1, id, 1, 2, &[1, 2])).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let expected = i64::from(THREADS * PER_THREAD);
    assert_eq!(books.get_balance(GroupId(1), MemberId(1)), Ok(inr(expected)));
    assert_eq!(books.get_balance(GroupId(1), MemberId(2)), Ok(inr(-expected)));
}

// === Deadlock Detection ===

/// Polls parking_lot's detector until stopped; returns whether a cycle was seen.
fn start_deadlock_detector() -> (Arc<AtomicBool>, thread::JoinHandle<bool>) {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);

    let handle = thread::spawn(move || {
        while flag.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(50));
            let deadlocks = deadlock::check_deadlock();
            if !deadlocks.is_empty() {
                for (i, threads) in deadlocks.iter().enumerate() {
                    eprintln!("Deadlock #{}", i + 1);
                    for t in threads {
                        eprintln!("Thread ID: {:?}\n{:#?}", t.thread_id(), t.backtrace());
                    }
                }
                return true;
            }
        }
        false
    });

    (running, handle)
}

#[test]
fn no_deadlock_with_mixed_readers_and_writers() {
    const GROUPS: u32 = 4;
    const THREADS: u32 = 16;
    const OPS: u32 = 50;

    let (running, detector) = start_deadlock_detector();
    let snapshots: Vec<GroupSnapshot> = (1..=GROUPS).map(|g| group(g, &[1, 2, 3])).collect();
    let books = Arc::new(open_books(&snapshots));

    let mut handles = vec![];
    for t in 0..THREADS {
        let books = Arc::clone(&books);
        handles.push(thread::spawn(move || {
            for i in 0..OPS {
                let g = (t + i) % GROUPS + 1;
                let id = t * OPS + i;
                match i % 4 {
                    0 => {
                        let _ = books.record_expense(make_expense(g, id, t % 3 + 1, 99, &[1, 2, 3]));
                    }
                    1 => {
                        let _ = books.record_settlement(make_settlement(g, id, 2, 1, 10));
                    }
                    2 => {
                        let _ = books.plan_settlement(GroupId(g));
                    }
                    _ => {
                        let _ = books.delete_expense(GroupId(g), ExpenseId(id - 3));
                    }
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    running.store(false, Ordering::SeqCst);
    assert!(!detector.join().unwrap(), "deadlock detected");

    for g in 1..=GROUPS {
        let balances = books.get_balances(GroupId(g)).unwrap();
        assert!(Money::sum(balances.into_values(), Currency::INR).is_zero());
    }
}
