mod initializer;
mod repository;
mod schema;

use std::{path::Path, str::FromStr, time::Duration};

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;
use thiserror::Error;

use dka_core::{AdministrationType, DimensionError, Treatment};

pub use initializer::{DimensionInitializer, InitReport, TableReport};
pub use repository::DimensionRepository;

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating when missing) the SQLite file at `path`.
    ///
    /// The parent directory is created first so a fresh checkout can bootstrap
    /// its store without manual setup.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|err| StorageError::Unavailable(Box::new(err)))?;
        }

        let options = SqliteConnectOptions::new().filename(path);
        Self::connect_with(options).await
    }

    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|err| StorageError::Unavailable(Box::new(err)))?;
        Self::connect_with(options).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> Result<Self, StorageError> {
        let options = options
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|err| StorageError::Unavailable(Box::new(err)))?;

        Ok(Self { pool })
    }

    /// Returns the initializer that creates and seeds the dimension tables.
    pub fn initializer(&self) -> DimensionInitializer {
        DimensionInitializer::new(self.pool.clone())
    }

    /// Returns a handle for reading `dim_treatment`.
    pub fn treatments(&self) -> DimensionRepository<Treatment> {
        DimensionRepository::new(self.pool.clone())
    }

    /// Returns a handle for reading `dim_administration_type`.
    pub fn administration_types(&self) -> DimensionRepository<AdministrationType> {
        DimensionRepository::new(self.pool.clone())
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes every pooled connection, waiting for in-flight work to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("table {table} is incompatible with the expected layout: {detail}")]
    SchemaConflict { table: &'static str, detail: String },
    #[error(
        "{table} already holds id {id} as {existing:?}, refusing to replace it with {expected:?}"
    )]
    ConstraintViolation {
        table: &'static str,
        id: i64,
        existing: String,
        expected: String,
    },
    #[error("invalid row in {table}: {source}")]
    InvalidRow {
        table: &'static str,
        #[source]
        source: DimensionError,
    },
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

// Primary SQLite result codes meaning the store cannot be reached or written.
const SQLITE_IOERR: i32 = 10;
const SQLITE_READONLY: i32 = 8;
const SQLITE_FULL: i32 = 13;
const SQLITE_CANTOPEN: i32 = 14;

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::Unavailable(Box::new(err))
            }
            sqlx::Error::Database(db_err) => {
                let primary = db_err
                    .code()
                    .as_deref()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| code & 0xff);
                let err = sqlx::Error::Database(db_err);
                match primary {
                    Some(SQLITE_IOERR | SQLITE_READONLY | SQLITE_FULL | SQLITE_CANTOPEN) => {
                        Self::Unavailable(Box::new(err))
                    }
                    _ => Self::Database(err),
                }
            }
            other => Self::Database(other),
        }
    }
}
