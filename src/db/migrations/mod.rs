//! Schema migrations for the ledger database.
//!
//! Each schema version `NN` has two embedded scripts next to this file: `migration_NN_up.sql`
//! brings the schema from `NN-1` to `NN` and `migration_NN_down.sql` takes it back.

use anyhow::{bail, Context};
use sqlx::{Executor, SqlitePool};
use tracing::{debug, info};

use crate::Result;

struct Migration {
    version: i32,
    up: &'static str,
    down: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        up: include_str!("migration_01_up.sql"),
        down: include_str!("migration_01_down.sql"),
    },
    Migration {
        version: 2,
        up: include_str!("migration_02_up.sql"),
        down: include_str!("migration_02_down.sql"),
    },
];

/// The newest schema version this build knows about.
pub(crate) fn latest_version() -> i32 {
    MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0)
}

/// Moves the schema from version `from` to version `to`, one step at a time. Each step and its
/// `schema_version` update commit together, so an interrupted run leaves the database at the last
/// completed step.
pub(crate) async fn run(pool: &SqlitePool, from: i32, to: i32) -> Result<()> {
    if from == to {
        debug!("Schema is at version {to}, nothing to migrate");
        return Ok(());
    }
    let steps = plan(from, to)?;
    for (migration, upgrade) in steps {
        let (sql, resulting) = if upgrade {
            (migration.up, migration.version)
        } else {
            (migration.down, migration.version - 1)
        };
        debug!(
            "Applying migration {:02} ({})",
            migration.version,
            if upgrade { "up" } else { "down" }
        );
        apply(pool, sql, resulting).await.with_context(|| {
            format!("Migration {:02} failed", migration.version)
        })?;
    }
    info!("Database schema migrated from version {from} to {to}");
    Ok(())
}

/// Lists the migrations to apply, in order, and whether each is applied up or down. Fails before
/// anything runs if one is missing.
fn plan(from: i32, to: i32) -> Result<Vec<(&'static Migration, bool)>> {
    let upgrade = from < to;
    let versions: Vec<i32> = if upgrade {
        ((from + 1)..=to).collect()
    } else {
        ((to + 1)..=from).rev().collect()
    };

    let mut steps = Vec::with_capacity(versions.len());
    for version in versions {
        match MIGRATIONS.iter().find(|m| m.version == version) {
            Some(m) => steps.push((m, upgrade)),
            None => bail!("There is no migration {version}, cannot go from schema {from} to {to}"),
        }
    }
    Ok(steps)
}

async fn apply(pool: &SqlitePool, sql: &str, resulting_version: i32) -> Result<()> {
    let mut tx = pool.begin().await.context("Unable to begin a transaction")?;
    tx.execute(sql).await.context("Unable to execute the migration script")?;
    sqlx::query("UPDATE schema_version SET version = ?")
        .bind(resulting_version)
        .execute(&mut *tx)
        .await
        .context("Unable to record the schema version")?;
    tx.commit().await.context("Unable to commit the migration")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use tempfile::TempDir;

    async fn empty_db() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("migrate.sqlite"))
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE schema_version (version INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
            .execute(&pool)
            .await
            .unwrap();
        (dir, pool)
    }

    async fn version(pool: &SqlitePool) -> i32 {
        let (v,): (i32,) = sqlx::query_as("SELECT version FROM schema_version")
            .fetch_one(pool)
            .await
            .unwrap();
        v
    }

    async fn has_table(pool: &SqlitePool, name: &str) -> bool {
        let (n,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(name)
                .fetch_one(pool)
                .await
                .unwrap();
        n > 0
    }

    #[tokio::test]
    async fn test_up_then_down() {
        let (_dir, pool) = empty_db().await;
        run(&pool, 0, 1).await.unwrap();
        assert_eq!(version(&pool).await, 1);
        for table in ["members", "loans", "schedule_entries", "bank_transactions"] {
            assert!(has_table(&pool, table).await, "{table}");
        }

        run(&pool, 1, 0).await.unwrap();
        assert_eq!(version(&pool).await, 0);
        assert!(!has_table(&pool, "loans").await);
        assert!(has_table(&pool, "schema_version").await);
    }

    #[tokio::test]
    async fn test_second_step_adds_guarantees_and_books() {
        let (_dir, pool) = empty_db().await;
        run(&pool, 0, 2).await.unwrap();
        assert_eq!(version(&pool).await, 2);
        for table in ["loan_guarantees", "expenses", "other_income"] {
            assert!(has_table(&pool, table).await, "{table}");
        }

        run(&pool, 2, 1).await.unwrap();
        assert_eq!(version(&pool).await, 1);
        assert!(!has_table(&pool, "expenses").await);
        assert!(has_table(&pool, "loans").await);
    }

    #[tokio::test]
    async fn test_same_version_is_a_no_op() {
        let (_dir, pool) = empty_db().await;
        run(&pool, 0, 1).await.unwrap();
        run(&pool, 1, 1).await.unwrap();
        assert_eq!(version(&pool).await, 1);
    }

    #[test]
    fn test_plan() {
        assert_eq!(plan(0, 1).unwrap().len(), 1);
        assert!(!plan(1, 0).unwrap()[0].1);
        assert_eq!(plan(0, 2).unwrap().len(), 2);
        assert_eq!(plan(2, 0).unwrap()[0].0.version, 2);
        assert!(plan(0, 3).is_err());
        assert_eq!(latest_version(), 2);
    }
}
