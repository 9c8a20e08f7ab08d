//! This module is responsible for reading, writing and managing the SQLite database.
//!
//! Money is stored as decimal TEXT and dates as ISO-8601 TEXT so that nothing passes through
//! floating point on the way in or out. Queries live in one `impl Db` block per aggregate.

mod bank;
mod books;
mod dividends;
mod guarantees;
mod loans;
mod members;
mod migrations;

use crate::error::{tagged, ErrorType};
use crate::model::Amount;
use crate::Result;
use anyhow::{bail, Context};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone)]
pub(crate) struct Db {
    pool: SqlitePool,
}

impl Db {
    /// - Validates that no file exists at `path`
    /// - Creates the SQLite file and brings its schema to the latest version
    pub(crate) async fn init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            bail!("A database already exists at '{}'", path.display())
        }
        let pool = connect(path, true).await?;
        sqlx::query("CREATE TABLE schema_version (version INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .context("Unable to create the schema_version table")?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
            .execute(&pool)
            .await
            .context("Unable to initialize the schema version")?;
        migrations::run(&pool, 0, migrations::latest_version()).await?;
        info!("Created database at {}", path.display());
        Ok(Self { pool })
    }

    /// - Validates that the SQLite file at `path` exists
    /// - Refuses a schema newer than this build understands
    /// - Runs any outstanding migrations
    pub(crate) async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("The database file is missing '{}'", path.display())
        }
        let pool = connect(path, false).await?;
        let db = Self { pool };
        let current = db.schema_version().await?;
        let latest = migrations::latest_version();
        if current > latest {
            bail!(
                "The database schema is at version {current} but this program only knows \
                version {latest}, please upgrade"
            )
        }
        migrations::run(&db.pool, current, latest).await?;
        debug!("Loaded database at {}", path.display());
        Ok(db)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) async fn schema_version(&self) -> Result<i32> {
        let (version,): (i32,) = sqlx::query_as("SELECT version FROM schema_version")
            .fetch_one(&self.pool)
            .await
            .context("Unable to read the schema version")?;
        Ok(version)
    }

    /// Writes a consistent copy of the database to `path`, which must not exist.
    pub(crate) async fn vacuum_into(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        sqlx::query("VACUUM INTO ?")
            .bind(path.to_string_lossy().to_string())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Unable to copy the database to '{}'", path.display()))?;
        Ok(())
    }
}

async fn connect(path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Unable to open the database at '{}'", path.display()))
}

fn parse_amount(value: &str, column: &str) -> Result<Amount> {
    Amount::from_str(value).with_context(|| format!("Bad amount '{value}' in column {column}"))
}

fn parse_decimal(value: &str, column: &str) -> Result<Decimal> {
    Decimal::from_str(value).with_context(|| format!("Bad number '{value}' in column {column}"))
}

fn parse_date(value: &str, column: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .with_context(|| format!("Bad date '{value}' in column {column}"))
}

fn parse_opt_date(value: Option<&str>, column: &str) -> Result<Option<NaiveDate>> {
    value.map(|v| parse_date(v, column)).transpose()
}

fn fmt_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn fmt_opt_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(fmt_date)
}

/// Turns constraint violations into `Request` errors: `duplicate` describes a uniqueness
/// violation. Other errors pass through with context.
fn constraint_error(e: sqlx::Error, duplicate: impl FnOnce() -> String) -> crate::Error {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return tagged(ErrorType::Request, duplicate());
        }
        if db_err.is_foreign_key_violation() {
            return tagged(
                ErrorType::Request,
                "The record refers to a member, loan or account that does not exist",
            );
        }
    }
    crate::Error::new(e).context("The database rejected the write")
}
