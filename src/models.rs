use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

const DATE_ISO: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const DATE_DOTTED: &[FormatItem<'static>] = format_description!("[day].[month].[year]");

/// The six warehouse tables, in load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceTable {
    Balance,
    Posting,
    Account,
    Currency,
    ExchangeRate,
    LedgerAccount,
}

impl SourceTable {
    pub const ALL: [SourceTable; 6] = [
        SourceTable::Balance,
        SourceTable::Posting,
        SourceTable::Account,
        SourceTable::Currency,
        SourceTable::ExchangeRate,
        SourceTable::LedgerAccount,
    ];

    /// Schema-qualified name of the target table.
    pub fn qualified_name(&self) -> &'static str {
        match self {
            SourceTable::Balance => "ds.ft_balance_f",
            SourceTable::Posting => "ds.ft_posting_f",
            SourceTable::Account => "ds.md_account_d",
            SourceTable::Currency => "ds.md_currency_d",
            SourceTable::ExchangeRate => "ds.md_exchange_rate_d",
            SourceTable::LedgerAccount => "ds.md_ledger_account_s",
        }
    }

    /// Name of the source file, relative to the data directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            SourceTable::Balance => "ft_balance_f.csv",
            SourceTable::Posting => "ft_posting_f.csv",
            SourceTable::Account => "md_account_d.csv",
            SourceTable::Currency => "md_currency_d.csv",
            SourceTable::ExchangeRate => "md_exchange_rate_d.csv",
            SourceTable::LedgerAccount => "md_ledger_account_s.csv",
        }
    }
}

impl fmt::Display for SourceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.qualified_name())
    }
}

/// Account balance at end of day.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BalanceRow {
    #[serde(deserialize_with = "de_date")]
    pub on_date: Date,
    pub account_rk: i64,
    pub currency_rk: Option<i64>,
    #[serde(deserialize_with = "de_opt_decimal")]
    pub balance_out: Option<Decimal>,
}

/// Double-sided posting between two accounts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PostingRow {
    #[serde(deserialize_with = "de_date")]
    pub oper_date: Date,
    pub credit_account_rk: i64,
    pub debet_account_rk: i64,
    #[serde(deserialize_with = "de_opt_decimal")]
    pub credit_amount: Option<Decimal>,
    #[serde(deserialize_with = "de_opt_decimal")]
    pub debet_amount: Option<Decimal>,
}

/// Account master data, versioned by actuality interval.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountRow {
    #[serde(deserialize_with = "de_date")]
    pub data_actual_date: Date,
    #[serde(deserialize_with = "de_date")]
    pub data_actual_end_date: Date,
    pub account_rk: i64,
    pub account_number: String,
    pub char_type: String,
    pub currency_rk: i64,
    #[serde(deserialize_with = "de_code")]
    pub currency_code: String,
}

/// Currency master data.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CurrencyRow {
    pub currency_rk: i64,
    #[serde(deserialize_with = "de_date")]
    pub data_actual_date: Date,
    #[serde(deserialize_with = "de_opt_date")]
    pub data_actual_end_date: Option<Date>,
    #[serde(deserialize_with = "de_opt_code")]
    pub currency_code: Option<String>,
    #[serde(deserialize_with = "de_opt_code")]
    pub code_iso_char: Option<String>,
}

/// Exchange rate against the accounting currency.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExchangeRateRow {
    #[serde(deserialize_with = "de_date")]
    pub data_actual_date: Date,
    #[serde(deserialize_with = "de_opt_date")]
    pub data_actual_end_date: Option<Date>,
    pub currency_rk: i64,
    #[serde(deserialize_with = "de_opt_decimal")]
    pub reduced_cource: Option<Decimal>,
    #[serde(deserialize_with = "de_opt_code")]
    pub code_iso_num: Option<String>,
}

/// Chart-of-accounts entry from the ledger account directory.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LedgerAccountRow {
    pub chapter: Option<String>,
    pub chapter_name: Option<String>,
    pub section_number: Option<i32>,
    pub section_name: Option<String>,
    pub subsection_name: Option<String>,
    pub ledger1_account: Option<i32>,
    pub ledger1_account_name: Option<String>,
    pub ledger_account: i32,
    pub ledger_account_name: String,
    pub characteristic: Option<String>,
    #[serde(deserialize_with = "de_date")]
    pub start_date: Date,
    #[serde(deserialize_with = "de_opt_date")]
    pub end_date: Option<Date>,
}

/// One parsed source file, ready to be written to its table.
#[derive(Debug, Clone, PartialEq)]
pub enum RowBatch {
    Balances(Vec<BalanceRow>),
    Postings(Vec<PostingRow>),
    Accounts(Vec<AccountRow>),
    Currencies(Vec<CurrencyRow>),
    ExchangeRates(Vec<ExchangeRateRow>),
    LedgerAccounts(Vec<LedgerAccountRow>),
}

impl RowBatch {
    pub fn table(&self) -> SourceTable {
        match self {
            RowBatch::Balances(_) => SourceTable::Balance,
            RowBatch::Postings(_) => SourceTable::Posting,
            RowBatch::Accounts(_) => SourceTable::Account,
            RowBatch::Currencies(_) => SourceTable::Currency,
            RowBatch::ExchangeRates(_) => SourceTable::ExchangeRate,
            RowBatch::LedgerAccounts(_) => SourceTable::LedgerAccount,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RowBatch::Balances(rows) => rows.len(),
            RowBatch::Postings(rows) => rows.len(),
            RowBatch::Accounts(rows) => rows.len(),
            RowBatch::Currencies(rows) => rows.len(),
            RowBatch::ExchangeRates(rows) => rows.len(),
            RowBatch::LedgerAccounts(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Started,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Started => "started",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final state of one table load, recorded against its audit row.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub finished_at: OffsetDateTime,
    pub status: RunStatus,
    pub records_processed: u64,
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn success(records_processed: u64) -> Self {
        Self {
            finished_at: OffsetDateTime::now_utc(),
            status: RunStatus::Success,
            records_processed,
            error: None,
        }
    }

    pub fn failure(error: String) -> Self {
        Self {
            finished_at: OffsetDateTime::now_utc(),
            status: RunStatus::Failed,
            records_processed: 0,
            error: Some(error),
        }
    }
}

/// One audit row in `logs.etl_logs`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunLogRow {
    pub log_id: i64,
    pub table_name: String,
    pub start_time: OffsetDateTime,
    pub end_time: Option<OffsetDateTime>,
    pub status: RunStatus,
    pub records_processed: u64,
    pub error_message: Option<String>,
}

impl RunLogRow {
    pub fn started(log_id: i64, table: SourceTable, start_time: OffsetDateTime) -> Self {
        Self {
            log_id,
            table_name: table.qualified_name().to_string(),
            start_time,
            end_time: None,
            status: RunStatus::Started,
            records_processed: 0,
            error_message: None,
        }
    }
}

// Source dates arrive either ISO (`2018-01-31`) or dotted (`31.12.2017`)
// depending on the file.
fn parse_date(raw: &str) -> Option<Date> {
    Date::parse(raw, DATE_ISO)
        .or_else(|_| Date::parse(raw, DATE_DOTTED))
        .ok()
}

fn de_date<'de, D>(deserializer: D) -> Result<Date, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date(&raw).ok_or_else(|| de::Error::custom(format!("invalid date `{raw}`")))
}

fn de_opt_date<'de, D>(deserializer: D) -> Result<Option<Date>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_date(&raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid date `{raw}`"))),
    }
}

// Amounts are kept as strings until here so they never round-trip through
// floating point.
fn de_opt_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => Decimal::from_str(&raw)
            .map(Some)
            .map_err(|e| de::Error::custom(format!("invalid number `{raw}`: {e}"))),
    }
}

// Currency code columns are three characters wide; dirty master data
// sometimes carries longer values, which get truncated.
fn truncate_code(raw: &str) -> String {
    raw.trim().chars().take(3).collect()
}

fn de_code<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(truncate_code(&raw))
}

fn de_opt_code<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(|s| truncate_code(&s))
        .filter(|code| !code.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn parses_iso_dates() {
        assert_eq!(parse_date("2018-01-31"), Some(date!(2018 - 01 - 31)));
    }

    #[test]
    fn parses_dotted_dates() {
        assert_eq!(parse_date("31.12.2017"), Some(date!(2017 - 12 - 31)));
    }

    #[test]
    fn rejects_malformed_dates() {
        assert_eq!(parse_date("2018/01/31"), None);
        assert_eq!(parse_date("31.13.2017"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn truncates_codes_to_three_chars() {
        assert_eq!(truncate_code("810"), "810");
        assert_eq!(truncate_code("643.0"), "643");
        assert_eq!(truncate_code(" RUB "), "RUB");
        // Multibyte values must truncate on char boundaries.
        assert_eq!(truncate_code("рубль"), "руб");
    }

    #[test]
    fn tables_iterate_in_load_order() {
        let names: Vec<&str> = SourceTable::ALL.iter().map(|t| t.file_name()).collect();
        assert_eq!(
            names,
            vec![
                "ft_balance_f.csv",
                "ft_posting_f.csv",
                "md_account_d.csv",
                "md_currency_d.csv",
                "md_exchange_rate_d.csv",
                "md_ledger_account_s.csv",
            ]
        );
    }

    #[test]
    fn success_outcome_carries_count() {
        let outcome = RunOutcome::success(3);
        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.records_processed, 3);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn failure_outcome_carries_error() {
        let outcome = RunOutcome::failure("boom".to_string());
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.records_processed, 0);
        assert_eq!(outcome.error.as_deref(), Some("boom"));
    }
}
