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

use chrono::Utc;
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use expense_ledger::{
    Balances, Category, ExpenseId, GroupId, Ledger, LedgerConfig, LedgerError, Member, MemberId,
    Money, NewExpense, NewSettlement, Percentage, SettlementId, SplitRule, plan_settlement,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Expense Ledger - Replay a group's expense CSV
///
/// Reads members, expenses and settlements for one group from a CSV file and
/// writes either member balances or a settlement plan to stdout.
#[derive(Parser, Debug)]
#[command(name = "expense-ledger")]
#[command(about = "Splits group expenses and plans who pays whom", long_about = None)]
struct Args {
    /// Path to CSV file with group events
    ///
    /// Expected format: type,id,payer,payee,amount,split,category,description
    /// Example: cargo run -- trip.csv > balances.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// TOML file with ledger limits and the default currency
    #[arg(long, value_name = "TOML")]
    config: Option<PathBuf>,

    /// Currency code for the group (overrides the config file)
    #[arg(long, value_name = "CODE")]
    currency: Option<String>,

    /// Print the settlement plan instead of balances
    #[arg(long)]
    plan: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => LedgerConfig::load(path).unwrap_or_else(|e| {
            error!("{e}");
            process::exit(1);
        }),
        None => LedgerConfig::default(),
    };
    if let Some(code) = &args.currency {
        config.currency = code.parse().unwrap_or_else(|e| {
            error!("invalid --currency: {e}");
            process::exit(1);
        });
    }

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            error!("error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let ledger = match process_events(BufReader::new(file), config) {
        Ok(ledger) => ledger,
        Err(e) => {
            error!("error processing events: {}", e);
            process::exit(1);
        }
    };
    info!(
        expenses = ledger.expenses().count(),
        settlements = ledger.settlements().count(),
        "replayed group"
    );

    let written = if args.plan {
        write_plan(&ledger, std::io::stdout())
    } else {
        write_balances(&ledger, std::io::stdout()).map_err(OutputError::from)
    };
    if let Err(e) = written {
        error!("error writing output: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `type, id, payer, payee, amount, split, category, description`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "type")]
    kind: String,
    id: u32,
    #[serde(deserialize_with = "csv::invalid_option")]
    payer: Option<u32>,
    #[serde(deserialize_with = "csv::invalid_option")]
    payee: Option<u32>,
    #[serde(deserialize_with = "csv::invalid_option")]
    amount: Option<Decimal>,
    split: Option<String>,
    category: Option<String>,
    description: Option<String>,
}

/// Why a row could not be applied.
#[derive(Debug, thiserror::Error)]
enum RowError {
    #[error("malformed row: {0}")]
    Malformed(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, RowError> {
    value.ok_or_else(|| RowError::Malformed(format!("missing {field}")))
}

/// Parses a split column such as `equal:1 2 3`, `exact:1=30 2=70` or
/// `percentage:1=33.34 2=33.33 3=33.33`.
fn parse_split(column: &str, ledger: &Ledger) -> Result<SplitRule, RowError> {
    let (rule, body) = column.split_once(':').unwrap_or((column, ""));
    let mut entries = body.split_whitespace();

    let member = |raw: &str| {
        raw.parse::<u32>()
            .map(MemberId)
            .map_err(|_| RowError::Malformed(format!("bad member id {raw:?}")))
    };
    let pair = |raw: &str| {
        let (id, value) = raw
            .split_once('=')
            .ok_or_else(|| RowError::Malformed(format!("expected member=value, got {raw:?}")))?;
        let value: Decimal = value
            .parse()
            .map_err(|_| RowError::Malformed(format!("bad number {value:?}")))?;
        Ok::<_, RowError>((member(id)?, value))
    };

    match rule.trim().to_ascii_lowercase().as_str() {
        // An empty participant list means everyone currently in the group.
        "equal" | "" => {
            let members: Vec<MemberId> = entries.by_ref().map(member).collect::<Result<_, _>>()?;
            if members.is_empty() {
                Ok(SplitRule::Equal(ledger.members().map(|m| m.id).collect()))
            } else {
                Ok(SplitRule::Equal(members))
            }
        }
        "exact" => {
            let mut shares = Vec::new();
            for raw in entries {
                let (id, value) = pair(raw)?;
                shares.push((id, Money::from_decimal(value, ledger.currency())?));
            }
            Ok(SplitRule::Exact(shares))
        }
        "percentage" => {
            let mut shares = Vec::new();
            for raw in entries {
                let (id, value) = pair(raw)?;
                let percentage = Percentage::from_decimal(value).ok_or_else(|| {
                    LedgerError::InvalidShare {
                        member: id,
                        reason: format!("{value}% is not an exact percentage"),
                    }
                })?;
                shares.push((id, percentage));
            }
            Ok(SplitRule::Percentage(shares))
        }
        other => Err(RowError::Malformed(format!("unknown split rule {other:?}"))),
    }
}

fn apply(ledger: &mut Ledger, record: CsvRecord) -> Result<(), RowError> {
    let group_id = ledger.group_id();
    let currency = ledger.currency();

    match record.kind.to_lowercase().as_str() {
        "member" => {
            let name = required(record.description, "member name")?;
            ledger.add_member(Member::new(MemberId(record.id), name));
        }
        "leave" => {
            ledger.remove_member(MemberId(record.id))?;
        }
        "expense" => {
            let amount = Money::from_decimal(required(record.amount, "amount")?, currency)?;
            let category = match record.category {
                Some(raw) => raw
                    .parse::<Category>()
                    .map_err(|e| RowError::Malformed(e.to_string()))?,
                None => Category::default(),
            };
            let split = parse_split(record.split.as_deref().unwrap_or("equal"), ledger)?;
            ledger.record_expense(NewExpense {
                id: ExpenseId(record.id),
                group_id,
                description: record.description.unwrap_or_default(),
                payer: MemberId(required(record.payer, "payer")?),
                amount,
                category,
                split,
                created_at: Utc::now(),
            })?;
        }
        "delete_expense" => {
            ledger.delete_expense(ExpenseId(record.id))?;
        }
        "settlement" => {
            let amount = Money::from_decimal(required(record.amount, "amount")?, currency)?;
            ledger.record_settlement(NewSettlement {
                id: SettlementId(record.id),
                group_id,
                payer: MemberId(required(record.payer, "payer")?),
                payee: MemberId(required(record.payee, "payee")?),
                amount,
                note: record.description,
                created_at: Utc::now(),
            })?;
        }
        "delete_settlement" => {
            ledger.delete_settlement(SettlementId(record.id))?;
        }
        other => return Err(RowError::Malformed(format!("unknown row type {other:?}"))),
    }
    Ok(())
}

/// Replays group events from a CSV reader into a fresh ledger.
///
/// Rows are applied in file order. Malformed rows and rejected records are
/// logged and skipped; the rest of the file still applies.
///
/// # CSV Format
///
/// | type | id | payer | payee | amount | split | category | description |
/// |------|----|-------|-------|--------|-------|----------|-------------|
/// | member | member id | | | | | | name |
/// | leave | member id | | | | | | |
/// | expense | expense id | member | | decimal | rule | category | text |
/// | delete_expense | expense id | | | | | | |
/// | settlement | settlement id | member | member | decimal | | | note |
/// | delete_settlement | settlement id | | | | | | |
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the header is unreadable.
pub fn process_events<R: Read>(reader: R, config: LedgerConfig) -> Result<Ledger, csv::Error> {
    let currency = config.currency;
    let mut ledger = Ledger::new(GroupId(1), currency, config);

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (row, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        match result {
            Ok(record) => {
                if let Err(e) = apply(&mut ledger, record) {
                    warn!(row = row + 1, "skipping row: {e}");
                }
            }
            Err(e) => {
                warn!(row = row + 1, "skipping malformed row: {e}");
            }
        }
    }

    Ok(ledger)
}

#[derive(Debug, Serialize)]
struct BalanceRow {
    member: MemberId,
    name: String,
    paid: Decimal,
    share: Decimal,
    sent: Decimal,
    received: Decimal,
    balance: Decimal,
    status: String,
}

/// Writes one row per member with the breakdown of their balance.
///
/// # CSV Format
///
/// ```csv
/// member,name,paid,share,sent,received,balance,status
/// 1,Asha,100.00,33.34,0.00,33.00,33.66,owed
/// ```
pub fn write_balances<W: Write>(ledger: &Ledger, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);

    for summary in ledger.summaries() {
        wtr.serialize(BalanceRow {
            member: summary.member,
            name: summary.name.unwrap_or_default(),
            paid: summary.paid.to_decimal(),
            share: summary.share.to_decimal(),
            sent: summary.sent.to_decimal(),
            received: summary.received.to_decimal(),
            balance: summary.balance.to_decimal(),
            status: format!("{:?}", summary.status).to_lowercase(),
        })?;
    }

    wtr.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct TransferRow {
    from: MemberId,
    to: MemberId,
    amount: Decimal,
}

/// Why output could not be produced.
#[derive(Debug, thiserror::Error)]
enum OutputError {
    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("cannot plan settlement: {0}")]
    Plan(#[from] LedgerError),
}

/// Writes the settlement plan for the ledger's balances.
fn write_plan<W: Write>(ledger: &Ledger, writer: W) -> Result<(), OutputError> {
    write_plan_for(&ledger.balances(), writer)
}

/// Writes the settlement plan as `from,to,amount` rows.
///
/// Nothing is written when the balances cannot be planned.
fn write_plan_for<W: Write>(balances: &Balances, writer: W) -> Result<(), OutputError> {
    let plan = plan_settlement(balances)?;
    let mut wtr = Writer::from_writer(writer);

    for transfer in plan {
        wtr.serialize(TransferRow {
            from: transfer.from,
            to: transfer.to,
            amount: transfer.amount.to_decimal(),
        })?;
    }

    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}
