//! Loads the bank's daily CSV snapshots into a PostgreSQL warehouse.
//!
//! Six files feed six tables under the `ds` schema: end-of-day balances,
//! postings, and the account, currency, exchange-rate and ledger-account
//! directories. Every load replaces the table's contents and leaves one
//! audit row in `logs.etl_logs`.

pub mod config;
pub mod models;
pub mod pipeline;
pub mod postgres_storage;
pub mod source;
pub mod storage;

pub use config::Config;
pub use models::{RowBatch, RunOutcome, RunStatus, SourceTable};
pub use pipeline::RunSummary;
pub use postgres_storage::PostgresStorage;
pub use storage::{LoadError, MemoryStorage, Storage};
