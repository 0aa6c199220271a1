use std::env;
use std::path::PathBuf;

/// Optional env file with connection settings, looked up relative to the
/// working directory.
pub const ENV_FILE: &str = "config/.env";

#[derive(Debug, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl Config {
    /// Reads settings from the environment, after populating it from
    /// `config/.env` when that file exists. Unset variables fall back to
    /// local-development defaults.
    pub fn from_env() -> Self {
        dotenvy::from_path(ENV_FILE).ok();

        let port_raw = var_or("DB_PORT", "5432");
        let port = port_raw.parse().unwrap_or_else(|_| {
            eprintln!("Warning: invalid DB_PORT `{port_raw}`, using 5432");
            5432
        });

        Config {
            db: DbConfig {
                host: var_or("DB_HOST", "localhost"),
                port,
                dbname: var_or("DB_NAME", "bank_db"),
                user: var_or("DB_USER", "postgres"),
                password: var_or("DB_PASSWORD", "postgres"),
            },
            data_dir: PathBuf::from(var_or("DATA_DIR", "data")),
            logs_dir: PathBuf::from(var_or("LOGS_DIR", "logs")),
        }
    }
}

impl DbConfig {
    /// Key/value parameter string for `postgres::Client::connect`.
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host,
            self.port,
            self.dbname,
            self.user,
            quote(&self.password)
        )
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

// Passwords may contain spaces; the parameter syntax wants them quoted.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
