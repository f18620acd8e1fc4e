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

//! Split calculator integration tests.

use expense_ledger::{
    Currency, LedgerConfig, LedgerError, MemberId, Money, Percentage, SplitRule, compute_shares,
};
use rust_decimal_macros::dec;

fn inr(minor: i64) -> Money {
    Money::from_minor(minor, Currency::INR)
}

fn pct(bps: u32) -> Percentage {
    Percentage::from_basis_points(bps)
}

fn permissive() -> LedgerConfig {
    LedgerConfig {
        allow_zero_shares: true,
        ..LedgerConfig::default()
    }
}

#[test]
fn equal_split_divides_evenly() {
    let rule = SplitRule::Equal(vec![MemberId(1), MemberId(2)]);
    let shares = compute_shares(inr(1_000), &rule, &LedgerConfig::default()).unwrap();
    assert_eq!(shares[&MemberId(1)], inr(500));
    assert_eq!(shares[&MemberId(2)], inr(500));
}

#[test]
fn equal_split_single_participant_takes_all() {
    let rule = SplitRule::Equal(vec![MemberId(5)]);
    let shares = compute_shares(inr(12_345), &rule, &LedgerConfig::default()).unwrap();
    assert_eq!(shares.len(), 1);
    assert_eq!(shares[&MemberId(5)], inr(12_345));
}

#[test]
fn equal_split_smaller_than_participant_count() {
    let rule = SplitRule::Equal(vec![MemberId(4), MemberId(3), MemberId(2), MemberId(1)]);
    let shares = compute_shares(inr(2), &rule, &LedgerConfig::default()).unwrap();
    assert_eq!(shares[&MemberId(1)], inr(1));
    assert_eq!(shares[&MemberId(2)], inr(1));
    assert_eq!(shares[&MemberId(3)], inr(0));
    assert_eq!(shares[&MemberId(4)], inr(0));
}

#[test]
fn empty_split_rejected() {
    for rule in [
        SplitRule::Equal(Vec::new()),
        SplitRule::Exact(Vec::new()),
        SplitRule::Percentage(Vec::new()),
    ] {
        assert_eq!(
            compute_shares(inr(100), &rule, &LedgerConfig::default()),
            Err(LedgerError::EmptySplit)
        );
    }
}

#[test]
fn duplicate_participant_rejected() {
    let rule = SplitRule::Equal(vec![MemberId(1), MemberId(2), MemberId(1)]);
    assert_eq!(
        compute_shares(inr(100), &rule, &LedgerConfig::default()),
        Err(LedgerError::DuplicateParticipant(MemberId(1)))
    );
}

#[test]
fn exact_split_accepted_when_sum_matches() {
    let rule = SplitRule::Exact(vec![(MemberId(1), inr(250)), (MemberId(2), inr(750))]);
    let shares = compute_shares(inr(1_000), &rule, &LedgerConfig::default()).unwrap();
    assert_eq!(shares[&MemberId(1)], inr(250));
    assert_eq!(shares[&MemberId(2)], inr(750));
}

#[test]
fn exact_split_sum_off_by_one_unit_rejected() {
    let rule = SplitRule::Exact(vec![(MemberId(1), inr(500)), (MemberId(2), inr(499))]);
    assert!(matches!(
        compute_shares(inr(1_000), &rule, &LedgerConfig::default()),
        Err(LedgerError::SplitMismatch { .. })
    ));
}

#[test]
fn exact_split_zero_share_depends_on_config() {
    let rule = SplitRule::Exact(vec![(MemberId(1), inr(1_000)), (MemberId(2), inr(0))]);

    assert_eq!(
        compute_shares(inr(1_000), &rule, &LedgerConfig::default()),
        Err(LedgerError::InvalidShare {
            member: MemberId(2),
            reason: "INR 0.00 must be positive".to_string(),
        })
    );

    let shares = compute_shares(inr(1_000), &rule, &permissive()).unwrap();
    assert!(shares[&MemberId(2)].is_zero());
}

#[test]
fn exact_split_negative_share_rejected_even_when_zero_allowed() {
    let rule = SplitRule::Exact(vec![(MemberId(1), inr(1_100)), (MemberId(2), inr(-100))]);
    assert!(matches!(
        compute_shares(inr(1_000), &rule, &permissive()),
        Err(LedgerError::InvalidShare { member: MemberId(2), .. })
    ));
}

#[test]
fn exact_split_foreign_currency_rejected() {
    let rule = SplitRule::Exact(vec![(MemberId(1), Money::from_minor(100, Currency::USD))]);
    assert_eq!(
        compute_shares(inr(100), &rule, &LedgerConfig::default()),
        Err(LedgerError::CurrencyMismatch {
            expected: Currency::INR,
            found: Currency::USD,
        })
    );
}

#[test]
fn percentage_split_of_non_integral_products_reconciles() {
    // 33.34% / 33.33% / 33.33% of 1.00
    let rule = SplitRule::Percentage(vec![
        (MemberId(1), pct(3_334)),
        (MemberId(2), pct(3_333)),
        (MemberId(3), pct(3_333)),
    ]);
    let shares = compute_shares(inr(100), &rule, &LedgerConfig::default()).unwrap();
    assert_eq!(shares[&MemberId(1)], inr(34));
    assert_eq!(shares[&MemberId(2)], inr(33));
    assert_eq!(shares[&MemberId(3)], inr(33));
}

#[test]
fn percentage_rounding_overshoot_is_taken_back() {
    // Each of 50% of 0.01 rounds up to 0.01; one unit must come back.
    let rule = SplitRule::Percentage(vec![(MemberId(1), pct(5_000)), (MemberId(2), pct(5_000))]);
    let shares = compute_shares(inr(1), &rule, &LedgerConfig::default()).unwrap();
    assert_eq!(shares[&MemberId(1)], inr(0));
    assert_eq!(shares[&MemberId(2)], inr(1));
}

#[test]
fn percentage_split_summing_to_99_99_rejected() {
    let rule = SplitRule::Percentage(vec![
        (MemberId(1), Percentage::from_decimal(dec!(50)).unwrap()),
        (MemberId(2), Percentage::from_decimal(dec!(49.99)).unwrap()),
    ]);
    assert_eq!(
        compute_shares(inr(10_000), &rule, &LedgerConfig::default()),
        Err(LedgerError::SplitMismatch {
            expected: "100%".to_string(),
            actual: "99.99%".to_string(),
        })
    );
}

#[test]
fn percentage_split_over_100_rejected() {
    let rule = SplitRule::Percentage(vec![(MemberId(1), pct(6_000)), (MemberId(2), pct(4_001))]);
    assert!(matches!(
        compute_shares(inr(10_000), &rule, &LedgerConfig::default()),
        Err(LedgerError::SplitMismatch { .. })
    ));
}

#[test]
fn percentage_zero_share_gets_nothing_when_allowed() {
    let rule = SplitRule::Percentage(vec![
        (MemberId(1), pct(0)),
        (MemberId(2), pct(5_000)),
        (MemberId(3), pct(5_000)),
    ]);
    assert!(matches!(
        compute_shares(inr(101), &rule, &LedgerConfig::default()),
        Err(LedgerError::InvalidShare { member: MemberId(1), .. })
    ));

    let shares = compute_shares(inr(101), &rule, &permissive()).unwrap();
    assert_eq!(shares[&MemberId(1)], inr(0));
    assert_eq!(shares[&MemberId(2)] + shares[&MemberId(3)], inr(101));
}

#[test]
fn split_results_are_deterministic() {
    let rule = SplitRule::Equal(vec![MemberId(9), MemberId(2), MemberId(7)]);
    let first = compute_shares(inr(1_000), &rule, &LedgerConfig::default()).unwrap();
    let second = compute_shares(inr(1_000), &rule, &LedgerConfig::default()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first[&MemberId(2)], inr(334));
}

#[test]
fn percentage_rounding_favours_larger_percentages() {
    let rule = SplitRule::Percentage(vec![
        (MemberId(1), pct(3_334)),
        (MemberId(2), pct(3_333)),
        (MemberId(3), pct(3_333)),
    ]);

    // 0.6668 / 0.6666 / 0.6666 units: all round up, one comes back from member 2.
    let shares = compute_shares(inr(2), &rule, &LedgerConfig::default()).unwrap();
    assert_eq!(shares[&MemberId(1)], inr(1));
    assert_eq!(shares[&MemberId(2)], inr(0));
    assert_eq!(shares[&MemberId(3)], inr(1));

    // 0.3334 / 0.3333 / 0.3333 units: all round down, member 1 gets the unit.
    let shares = compute_shares(inr(1), &rule, &permissive()).unwrap();
    assert_eq!(shares[&MemberId(1)], inr(1));
    assert_eq!(shares[&MemberId(2)], inr(0));
    assert_eq!(shares[&MemberId(3)], inr(0));
}

#[test]
fn exact_shares_overflowing_the_amount_are_rejected() {
    let rule = SplitRule::Exact(vec![
        (MemberId(1), inr(i64::MAX)),
        (MemberId(2), inr(i64::MAX)),
    ]);
    assert_eq!(
        compute_shares(inr(i64::MAX), &rule, &LedgerConfig::default()),
        Err(LedgerError::SplitMismatch {
            expected: inr(i64::MAX).to_string(),
            actual: "an out-of-range total".to_string(),
        })
    );
}
