pub mod config;

use std::{env, path::PathBuf};

pub use config::{AppConfig, ConfigError, Environment};

pub const DEFAULT_DATABASE_PATH: &str = "data/dka_data.db";

/// Loads environment variables from `.env` when available.
///
/// Missing files are ignored so the function is safe in production builds
/// where dotenv files are not deployed.
pub fn load_env_file() {
    let _ = dotenvy::dotenv();
}

/// Returns the SQLite file the reference tables live in.
///
/// The value is resolved from the `DKA_DB_PATH` environment variable and
/// falls back to [`DEFAULT_DATABASE_PATH`] when the variable is not set.
/// `None` means the variable is set but blank.
pub fn database_path() -> Option<PathBuf> {
    let value = env::var("DKA_DB_PATH").unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string());
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(PathBuf::from(trimmed))
}
