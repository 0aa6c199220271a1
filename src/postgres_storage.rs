use postgres::{Client, NoTls, Transaction};
use time::OffsetDateTime;

use crate::models::{
    AccountRow, BalanceRow, CurrencyRow, ExchangeRateRow, LedgerAccountRow, PostingRow, RowBatch,
    RunOutcome, RunStatus, SourceTable,
};
use crate::storage::{LoadError, Storage};

const SCHEMA_DDL: &str = "
    CREATE SCHEMA IF NOT EXISTS ds;
    CREATE SCHEMA IF NOT EXISTS logs;

    CREATE TABLE IF NOT EXISTS ds.ft_balance_f (
        on_date DATE NOT NULL,
        account_rk BIGINT NOT NULL,
        currency_rk BIGINT,
        balance_out NUMERIC,
        PRIMARY KEY (on_date, account_rk)
    );

    CREATE TABLE IF NOT EXISTS ds.ft_posting_f (
        oper_date DATE NOT NULL,
        credit_account_rk BIGINT NOT NULL,
        debet_account_rk BIGINT NOT NULL,
        credit_amount NUMERIC,
        debet_amount NUMERIC
    );

    CREATE TABLE IF NOT EXISTS ds.md_account_d (
        data_actual_date DATE NOT NULL,
        data_actual_end_date DATE NOT NULL,
        account_rk BIGINT NOT NULL,
        account_number VARCHAR(20) NOT NULL,
        char_type VARCHAR(1) NOT NULL,
        currency_rk BIGINT NOT NULL,
        currency_code VARCHAR(3) NOT NULL,
        PRIMARY KEY (data_actual_date, account_rk)
    );

    CREATE TABLE IF NOT EXISTS ds.md_currency_d (
        currency_rk BIGINT NOT NULL,
        data_actual_date DATE NOT NULL,
        data_actual_end_date DATE,
        currency_code VARCHAR(3),
        code_iso_char VARCHAR(3),
        PRIMARY KEY (currency_rk, data_actual_date)
    );

    CREATE TABLE IF NOT EXISTS ds.md_exchange_rate_d (
        data_actual_date DATE NOT NULL,
        data_actual_end_date DATE,
        currency_rk BIGINT NOT NULL,
        reduced_cource NUMERIC,
        code_iso_num VARCHAR(3),
        PRIMARY KEY (data_actual_date, currency_rk)
    );

    CREATE TABLE IF NOT EXISTS ds.md_ledger_account_s (
        chapter CHAR(1),
        chapter_name VARCHAR(16),
        section_number INTEGER,
        section_name VARCHAR(22),
        subsection_name VARCHAR(21),
        ledger1_account INTEGER,
        ledger1_account_name VARCHAR(47),
        ledger_account INTEGER NOT NULL,
        ledger_account_name VARCHAR(153),
        characteristic CHAR(1),
        start_date DATE NOT NULL,
        end_date DATE,
        PRIMARY KEY (ledger_account, start_date)
    );

    CREATE TABLE IF NOT EXISTS logs.etl_logs (
        log_id BIGSERIAL PRIMARY KEY,
        table_name TEXT NOT NULL,
        start_time TIMESTAMPTZ NOT NULL,
        end_time TIMESTAMPTZ,
        status TEXT NOT NULL,
        records_processed BIGINT NOT NULL DEFAULT 0,
        error_message TEXT
    );
";

pub struct PostgresStorage {
    client: Client,
}

impl PostgresStorage {
    pub fn connect(connection_string: &str) -> Result<Self, LoadError> {
        let client = Client::connect(connection_string, NoTls)
            .map_err(|e| LoadError::Connection(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Storage for PostgresStorage {
    fn init_schema(&mut self) -> Result<(), LoadError> {
        self.client.batch_execute(SCHEMA_DDL).map_err(db_error)?;
        tracing::debug!("warehouse schema ready");
        Ok(())
    }

    fn replace_rows(&mut self, batch: &RowBatch) -> Result<u64, LoadError> {
        let table = batch.table();
        let mut tx = self.client.transaction().map_err(db_error)?;
        tx.execute(
            format!("TRUNCATE TABLE {}", table.qualified_name()).as_str(),
            &[],
        )
        .map_err(db_error)?;

        let written = match batch {
            RowBatch::Balances(rows) => insert_balances(&mut tx, rows)?,
            RowBatch::Postings(rows) => insert_postings(&mut tx, rows)?,
            RowBatch::Accounts(rows) => insert_accounts(&mut tx, rows)?,
            RowBatch::Currencies(rows) => insert_currencies(&mut tx, rows)?,
            RowBatch::ExchangeRates(rows) => insert_exchange_rates(&mut tx, rows)?,
            RowBatch::LedgerAccounts(rows) => insert_ledger_accounts(&mut tx, rows)?,
        };

        tx.commit().map_err(db_error)?;
        tracing::debug!(table = %table, rows = written, "table contents replaced");
        Ok(written)
    }

    fn begin_run_log(
        &mut self,
        table: SourceTable,
        started_at: OffsetDateTime,
    ) -> Result<i64, LoadError> {
        let row = self
            .client
            .query_one(
                "INSERT INTO logs.etl_logs (table_name, start_time, status, records_processed)
                 VALUES ($1, $2, $3, $4) RETURNING log_id",
                &[
                    &table.qualified_name(),
                    &started_at,
                    &RunStatus::Started.as_str(),
                    &0i64,
                ],
            )
            .map_err(db_error)?;
        Ok(row.get(0))
    }

    fn finish_run_log(&mut self, log_id: i64, outcome: &RunOutcome) -> Result<(), LoadError> {
        self.client
            .execute(
                "UPDATE logs.etl_logs
                 SET end_time = $1, status = $2, records_processed = $3, error_message = $4
                 WHERE log_id = $5",
                &[
                    &outcome.finished_at,
                    &outcome.status.as_str(),
                    &(outcome.records_processed as i64),
                    &outcome.error.as_deref(),
                    &log_id,
                ],
            )
            .map_err(db_error)?;
        Ok(())
    }
}

fn insert_balances(tx: &mut Transaction<'_>, rows: &[BalanceRow]) -> Result<u64, LoadError> {
    let stmt = tx
        .prepare(
            "INSERT INTO ds.ft_balance_f (on_date, account_rk, currency_rk, balance_out)
             VALUES ($1, $2, $3, $4)",
        )
        .map_err(db_error)?;
    for row in rows {
        tx.execute(
            &stmt,
            &[
                &row.on_date,
                &row.account_rk,
                &row.currency_rk,
                &row.balance_out,
            ],
        )
        .map_err(db_error)?;
    }
    Ok(rows.len() as u64)
}

fn insert_postings(tx: &mut Transaction<'_>, rows: &[PostingRow]) -> Result<u64, LoadError> {
    let stmt = tx
        .prepare(
            "INSERT INTO ds.ft_posting_f
                 (oper_date, credit_account_rk, debet_account_rk, credit_amount, debet_amount)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .map_err(db_error)?;
    for row in rows {
        tx.execute(
            &stmt,
            &[
                &row.oper_date,
                &row.credit_account_rk,
                &row.debet_account_rk,
                &row.credit_amount,
                &row.debet_amount,
            ],
        )
        .map_err(db_error)?;
    }
    Ok(rows.len() as u64)
}

fn insert_accounts(tx: &mut Transaction<'_>, rows: &[AccountRow]) -> Result<u64, LoadError> {
    let stmt = tx
        .prepare(
            "INSERT INTO ds.md_account_d
                 (data_actual_date, data_actual_end_date, account_rk, account_number,
                  char_type, currency_rk, currency_code)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .map_err(db_error)?;
    for row in rows {
        tx.execute(
            &stmt,
            &[
                &row.data_actual_date,
                &row.data_actual_end_date,
                &row.account_rk,
                &row.account_number,
                &row.char_type,
                &row.currency_rk,
                &row.currency_code,
            ],
        )
        .map_err(db_error)?;
    }
    Ok(rows.len() as u64)
}

fn insert_currencies(tx: &mut Transaction<'_>, rows: &[CurrencyRow]) -> Result<u64, LoadError> {
    let stmt = tx
        .prepare(
            "INSERT INTO ds.md_currency_d
                 (currency_rk, data_actual_date, data_actual_end_date, currency_code, code_iso_char)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .map_err(db_error)?;
    for row in rows {
        tx.execute(
            &stmt,
            &[
                &row.currency_rk,
                &row.data_actual_date,
                &row.data_actual_end_date,
                &row.currency_code,
                &row.code_iso_char,
            ],
        )
        .map_err(db_error)?;
    }
    Ok(rows.len() as u64)
}

fn insert_exchange_rates(
    tx: &mut Transaction<'_>,
    rows: &[ExchangeRateRow],
) -> Result<u64, LoadError> {
    let stmt = tx
        .prepare(
            "INSERT INTO ds.md_exchange_rate_d
                 (data_actual_date, data_actual_end_date, currency_rk, reduced_cource, code_iso_num)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .map_err(db_error)?;
    for row in rows {
        tx.execute(
            &stmt,
            &[
                &row.data_actual_date,
                &row.data_actual_end_date,
                &row.currency_rk,
                &row.reduced_cource,
                &row.code_iso_num,
            ],
        )
        .map_err(db_error)?;
    }
    Ok(rows.len() as u64)
}

fn insert_ledger_accounts(
    tx: &mut Transaction<'_>,
    rows: &[LedgerAccountRow],
) -> Result<u64, LoadError> {
    let stmt = tx
        .prepare(
            "INSERT INTO ds.md_ledger_account_s
                 (chapter, chapter_name, section_number, section_name, subsection_name,
                  ledger1_account, ledger1_account_name, ledger_account, ledger_account_name,
                  characteristic, start_date, end_date)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .map_err(db_error)?;
    for row in rows {
        tx.execute(
            &stmt,
            &[
                &row.chapter,
                &row.chapter_name,
                &row.section_number,
                &row.section_name,
                &row.subsection_name,
                &row.ledger1_account,
                &row.ledger1_account_name,
                &row.ledger_account,
                &row.ledger_account_name,
                &row.characteristic,
                &row.start_date,
                &row.end_date,
            ],
        )
        .map_err(db_error)?;
    }
    Ok(rows.len() as u64)
}

fn db_error(err: postgres::Error) -> LoadError {
    classify(err.code().map(|state| state.code()), err.to_string())
}

// SQLSTATE class 23 covers integrity constraint violations.
fn classify(sqlstate: Option<&str>, message: String) -> LoadError {
    match sqlstate {
        Some(code) if code.starts_with("23") => LoadError::Constraint(message),
        _ => LoadError::Database(message),
    }
}
