use std::fs;
use std::path::Path;

use rust_decimal_macros::dec;
use tempfile::TempDir;
use time::macros::date;

use dwload::models::{RowBatch, RunStatus, SourceTable};
use dwload::pipeline::{self, RunSummary};
use dwload::storage::MemoryStorage;

const BALANCE_CSV: &str = "\
ON_DATE;ACCOUNT_RK;CURRENCY_RK;BALANCE_OUT
31.12.2017;14155;810;365558.54
31.12.2017;22560;643;7456.13
";

const POSTING_CSV: &str = "\
oper_date;credit_account_rk;debet_account_rk;credit_amount;debet_amount
2018-01-09;14155;22560;5999.00;5999.00
2018-01-09;22560;14155;1200.50;1200.50
2018-01-10;14155;22560;;
";

const ACCOUNT_CSV: &str = "\
data_actual_date;data_actual_end_date;account_rk;account_number;char_type;currency_rk;currency_code
2018-01-01;2018-12-31;14155;40702810300000014155;А;810;810
2018-01-01;2018-12-31;22560;40817810100000022560;П;643;643
";

const CURRENCY_CSV: &str = "\
currency_rk;data_actual_date;data_actual_end_date;currency_code;code_iso_char
643;2017-01-01;2018-12-31;810.0;RUB
52;2017-01-01;;840;USD
53;2017-01-01;;978;EURO
";

const EXCHANGE_RATE_CSV: &str = "\
data_actual_date;data_actual_end_date;currency_rk;reduced_cource;code_iso_num
2018-01-01;2018-01-31;52;57.6002;840
2018-01-01;2018-01-31;53;68.8668;978
";

const LEDGER_ACCOUNT_CSV: &str = "\
chapter;chapter_name;section_number;section_name;subsection_name;ledger1_account;ledger1_account_name;ledger_account;ledger_account_name;characteristic;start_date;end_date
А;Балансовые счета;1;Капитал;;102;Уставный капитал кредитных организаций;10207;Уставный капитал АО;П;2017-01-01;
А;Балансовые счета;1;Капитал;;102;Уставный капитал кредитных организаций;10208;Уставный капитал ООО;П;2017-01-01;
";

fn write_source(dir: &Path, table: SourceTable, contents: &str) {
    fs::write(dir.join(table.file_name()), contents).unwrap();
}

fn write_all_sources(dir: &Path) {
    write_source(dir, SourceTable::Balance, BALANCE_CSV);
    write_source(dir, SourceTable::Posting, POSTING_CSV);
    write_source(dir, SourceTable::Account, ACCOUNT_CSV);
    write_source(dir, SourceTable::Currency, CURRENCY_CSV);
    write_source(dir, SourceTable::ExchangeRate, EXCHANGE_RATE_CSV);
    write_source(dir, SourceTable::LedgerAccount, LEDGER_ACCOUNT_CSV);
}

#[test]
fn full_run_loads_every_table() {
    let dir = TempDir::new().unwrap();
    write_all_sources(dir.path());
    let mut storage = MemoryStorage::new();

    let summary = pipeline::run(&mut storage, dir.path());
    assert_eq!(
        summary,
        RunSummary {
            tables_loaded: 6,
            tables_failed: 0,
            rows_loaded: 14,
        }
    );

    assert_eq!(storage.row_count(SourceTable::Balance), 2);
    assert_eq!(storage.row_count(SourceTable::Posting), 3);
    assert_eq!(storage.row_count(SourceTable::Account), 2);
    assert_eq!(storage.row_count(SourceTable::Currency), 3);
    assert_eq!(storage.row_count(SourceTable::ExchangeRate), 2);
    assert_eq!(storage.row_count(SourceTable::LedgerAccount), 2);

    match storage.batch(SourceTable::Balance) {
        Some(RowBatch::Balances(rows)) => {
            assert_eq!(rows[0].on_date, date!(2017 - 12 - 31));
            assert_eq!(rows[0].account_rk, 14155);
            assert_eq!(rows[0].currency_rk, Some(810));
            assert_eq!(rows[0].balance_out, Some(dec!(365558.54)));
        }
        other => panic!("Expected balances, got {other:?}"),
    }
    match storage.batch(SourceTable::Posting) {
        Some(RowBatch::Postings(rows)) => {
            assert_eq!(rows[1].credit_amount, Some(dec!(1200.50)));
            assert_eq!(rows[2].credit_amount, None);
            assert_eq!(rows[2].debet_amount, None);
        }
        other => panic!("Expected postings, got {other:?}"),
    }
    match storage.batch(SourceTable::Account) {
        Some(RowBatch::Accounts(rows)) => {
            assert_eq!(rows[0].account_number, "40702810300000014155");
            assert_eq!(rows[0].char_type, "А");
        }
        other => panic!("Expected accounts, got {other:?}"),
    }
    match storage.batch(SourceTable::Currency) {
        Some(RowBatch::Currencies(rows)) => {
            // Dirty master data: codes wider than three chars are truncated.
            assert_eq!(rows[0].currency_code.as_deref(), Some("810"));
            assert_eq!(rows[2].code_iso_char.as_deref(), Some("EUR"));
        }
        other => panic!("Expected currencies, got {other:?}"),
    }
    match storage.batch(SourceTable::ExchangeRate) {
        Some(RowBatch::ExchangeRates(rows)) => {
            assert_eq!(rows[0].reduced_cource, Some(dec!(57.6002)));
            assert_eq!(rows[0].code_iso_num.as_deref(), Some("840"));
        }
        other => panic!("Expected exchange rates, got {other:?}"),
    }
    match storage.batch(SourceTable::LedgerAccount) {
        Some(RowBatch::LedgerAccounts(rows)) => {
            assert_eq!(rows[0].ledger_account, 10207);
            assert_eq!(rows[0].section_number, Some(1));
            assert_eq!(rows[0].subsection_name, None);
            assert_eq!(rows[0].start_date, date!(2017 - 01 - 01));
            assert_eq!(rows[0].end_date, None);
        }
        other => panic!("Expected ledger accounts, got {other:?}"),
    }
}

#[test]
fn success_audit_row_carries_the_row_count() {
    let dir = TempDir::new().unwrap();
    write_all_sources(dir.path());
    let mut storage = MemoryStorage::new();
    pipeline::run(&mut storage, dir.path());

    let logs = storage.logs_for(SourceTable::Currency);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, RunStatus::Success);
    assert_eq!(logs[0].records_processed, 3);
    assert!(logs[0].error_message.is_none());
    let end_time = logs[0].end_time.expect("audit row not finalized");
    assert!(end_time >= logs[0].start_time);
}

#[test]
fn missing_file_fails_only_that_table() {
    let dir = TempDir::new().unwrap();
    write_all_sources(dir.path());
    fs::remove_file(dir.path().join(SourceTable::Posting.file_name())).unwrap();
    let mut storage = MemoryStorage::new();

    let summary = pipeline::run(&mut storage, dir.path());
    assert_eq!(summary.tables_loaded, 5);
    assert_eq!(summary.tables_failed, 1);

    let logs = storage.logs_for(SourceTable::Posting);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, RunStatus::Failed);
    assert!(logs[0].end_time.is_some());
    let error = logs[0].error_message.as_deref().expect("no error recorded");
    assert!(error.contains("ft_posting_f.csv"), "got: {error}");
    assert_eq!(storage.row_count(SourceTable::Posting), 0);

    // Tables after the failed one still load.
    assert_eq!(storage.row_count(SourceTable::Currency), 3);
    assert_eq!(
        storage.logs_for(SourceTable::Currency)[0].status,
        RunStatus::Success
    );
}

#[test]
fn rerun_replaces_instead_of_accumulating() {
    let dir = TempDir::new().unwrap();
    write_all_sources(dir.path());
    let mut storage = MemoryStorage::new();

    let first = pipeline::run(&mut storage, dir.path());
    let snapshot: Vec<RowBatch> = SourceTable::ALL
        .iter()
        .map(|&table| storage.batch(table).unwrap().clone())
        .collect();

    let second = pipeline::run(&mut storage, dir.path());
    assert_eq!(first, second);
    for (table, before) in SourceTable::ALL.iter().zip(&snapshot) {
        assert_eq!(storage.batch(*table).unwrap(), before);
    }

    // Audit rows are append-only; each run adds one per table.
    assert_eq!(storage.run_logs().len(), 12);
}

#[test]
fn parse_failure_keeps_previous_contents() {
    let dir = TempDir::new().unwrap();
    write_all_sources(dir.path());
    let mut storage = MemoryStorage::new();
    pipeline::run(&mut storage, dir.path());

    write_source(
        dir.path(),
        SourceTable::Balance,
        "on_date;account_rk;currency_rk;balance_out\n2017-12-31;not_a_number;810;100.00\n",
    );
    let summary = pipeline::run(&mut storage, dir.path());
    assert_eq!(summary.tables_loaded, 5);
    assert_eq!(summary.tables_failed, 1);
    assert_eq!(storage.row_count(SourceTable::Balance), 2);

    let logs = storage.logs_for(SourceTable::Balance);
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].status, RunStatus::Success);
    assert_eq!(logs[1].status, RunStatus::Failed);
    let error = logs[1].error_message.as_deref().expect("no error recorded");
    assert!(error.contains("row 1"), "got: {error}");
}

#[test]
fn replace_shrinks_to_the_new_snapshot() {
    let dir = TempDir::new().unwrap();
    write_all_sources(dir.path());
    let mut storage = MemoryStorage::new();
    pipeline::run(&mut storage, dir.path());
    assert_eq!(storage.row_count(SourceTable::Currency), 3);

    write_source(
        dir.path(),
        SourceTable::Currency,
        "currency_rk;data_actual_date;data_actual_end_date;currency_code;code_iso_char\n\
         643;2017-01-01;;810;RUB\n",
    );
    pipeline::run(&mut storage, dir.path());
    assert_eq!(storage.row_count(SourceTable::Currency), 1);
}

#[test]
fn header_only_snapshot_empties_the_table() {
    let dir = TempDir::new().unwrap();
    write_all_sources(dir.path());
    let mut storage = MemoryStorage::new();
    pipeline::run(&mut storage, dir.path());

    write_source(
        dir.path(),
        SourceTable::Currency,
        "currency_rk;data_actual_date;data_actual_end_date;currency_code;code_iso_char\n",
    );
    let summary = pipeline::run(&mut storage, dir.path());
    assert_eq!(summary.tables_failed, 0);
    assert_eq!(storage.row_count(SourceTable::Currency), 0);

    let logs = storage.logs_for(SourceTable::Currency);
    assert_eq!(logs[1].status, RunStatus::Success);
    assert_eq!(logs[1].records_processed, 0);
}

#[test]
fn windows_1251_snapshot_loads() {
    let dir = TempDir::new().unwrap();
    write_all_sources(dir.path());
    let (bytes, _, had_errors) = encoding_rs::WINDOWS_1251.encode(LEDGER_ACCOUNT_CSV);
    assert!(!had_errors);
    fs::write(
        dir.path().join(SourceTable::LedgerAccount.file_name()),
        &bytes,
    )
    .unwrap();
    let mut storage = MemoryStorage::new();

    let summary = pipeline::run(&mut storage, dir.path());
    assert_eq!(summary.tables_failed, 0);

    match storage.batch(SourceTable::LedgerAccount) {
        Some(RowBatch::LedgerAccounts(rows)) => {
            assert_eq!(rows[0].chapter_name.as_deref(), Some("Балансовые счета"));
            assert_eq!(rows[1].ledger_account_name, "Уставный капитал ООО");
        }
        other => panic!("Expected ledger accounts, got {other:?}"),
    }
}
