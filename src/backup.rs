//! Rotating backups in `$SACCO_HOME/.backups`.

use crate::db::Db;
use crate::{utils, Config, Result};
use anyhow::Context;
use serde::Serialize;
use std::path::PathBuf;

/// Prefix for the JSON record written for each dividend distribution.
pub const DISTRIBUTION: &str = "distribution";

/// Prefix for SQLite backup files.
pub const SQLITE: &str = "sacco.sqlite";

/// Writes backup files and keeps at most `backup_copies` of each kind.
///
/// Create one via `Config::backup()`.
#[derive(Debug, Clone)]
pub struct Backup {
    backups_dir: PathBuf,
    backup_copies: u32,
    db: Db,
}

impl Backup {
    pub fn new(config: &Config) -> Self {
        Self {
            backups_dir: config.backups().to_path_buf(),
            backup_copies: config.backup_copies(),
            db: config.db().clone(),
        }
    }

    /// Saves `data` as a pretty-printed JSON file named `{prefix}.YYYY-MM-DD-NNN.json`, where
    /// NNN is a sequence number for the day, and rotates old files of the same prefix.
    ///
    /// Returns the path to the created backup file.
    pub async fn save_json<T: Serialize>(&self, prefix: &str, data: &T) -> Result<PathBuf> {
        let path = self.next_path(prefix, "json").await?;
        let json = serde_json::to_string_pretty(data).context("Failed to serialize the backup")?;
        utils::write(&path, json).await?;
        self.rotate(prefix, "json").await?;
        Ok(path)
    }

    /// Writes a consistent copy of the database to `sacco.sqlite.YYYY-MM-DD-NNN` and rotates old
    /// copies.
    pub async fn copy_sqlite(&self) -> Result<PathBuf> {
        let path = self.next_path(SQLITE, "").await?;
        self.db.vacuum_into(&path).await?;
        self.rotate(SQLITE, "").await?;
        Ok(path)
    }

    async fn next_path(&self, prefix: &str, extension: &str) -> Result<PathBuf> {
        let date = utils::today().format("%Y-%m-%d").to_string();
        let mut max_seq: u32 = 0;
        for name in self.file_names().await? {
            if let Some(seq) = parse_sequence_number(&name, prefix, &date, extension) {
                max_seq = max_seq.max(seq);
            }
        }
        let seq = max_seq + 1;
        let file_name = if extension.is_empty() {
            format!("{prefix}.{date}-{seq:03}")
        } else {
            format!("{prefix}.{date}-{seq:03}.{extension}")
        };
        Ok(self.backups_dir.join(file_name))
    }

    /// Deletes the oldest files of a kind beyond `backup_copies`. Names sort by date, then
    /// sequence number.
    async fn rotate(&self, prefix: &str, extension: &str) -> Result<()> {
        let mut names: Vec<String> = self
            .file_names()
            .await?
            .into_iter()
            .filter(|name| is_backup_file(name, prefix, extension))
            .collect();
        names.sort();

        let excess = names.len().saturating_sub(self.backup_copies as usize);
        for name in names.into_iter().take(excess) {
            utils::remove(self.backups_dir.join(name)).await?;
        }
        Ok(())
    }

    async fn file_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut dir = utils::read_dir(&self.backups_dir).await?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        Ok(names)
    }
}

/// Parses NNN out of `{prefix}.{date}-NNN[.{extension}]`.
fn parse_sequence_number(filename: &str, prefix: &str, date: &str, extension: &str) -> Option<u32> {
    let rest = filename.strip_prefix(&format!("{prefix}.{date}-"))?;
    let seq = if extension.is_empty() {
        rest
    } else {
        rest.strip_suffix(&format!(".{extension}"))?
    };
    seq.parse().ok()
}

fn is_backup_file(filename: &str, prefix: &str, extension: &str) -> bool {
    let Some(rest) = filename.strip_prefix(&format!("{prefix}.")) else {
        return false;
    };
    if extension.is_empty() {
        // SQLite copies have no extension, so anything with a dot after the date is not one.
        !rest.contains('.') && !rest.ends_with("-wal") && !rest.ends_with("-shm")
    } else {
        rest.ends_with(&format!(".{extension}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::TestEnv;
    use serde_json::json;

    #[test]
    fn test_parse_sequence_number() {
        let date = "2025-06-30";
        assert_eq!(
            parse_sequence_number("distribution.2025-06-30-001.json", "distribution", date, "json"),
            Some(1)
        );
        assert_eq!(
            parse_sequence_number("sacco.sqlite.2025-06-30-017", "sacco.sqlite", date, ""),
            Some(17)
        );
        assert_eq!(
            parse_sequence_number("distribution.2025-06-29-001.json", "distribution", date, "json"),
            None
        );
        assert_eq!(
            parse_sequence_number("sacco.sqlite.2025-06-30-001", "distribution", date, ""),
            None
        );
    }

    #[test]
    fn test_is_backup_file() {
        assert!(is_backup_file(
            "distribution.2025-06-30-001.json",
            "distribution",
            "json"
        ));
        assert!(is_backup_file("sacco.sqlite.2025-06-30-001", "sacco.sqlite", ""));
        assert!(!is_backup_file(
            "sacco.sqlite.2025-06-30-001.json",
            "sacco.sqlite",
            ""
        ));
        assert!(!is_backup_file("sacco.sqlite.2025-06-30-001-wal", "sacco.sqlite", ""));
        assert!(!is_backup_file("other.2025-06-30-001.json", "distribution", "json"));
    }

    #[tokio::test]
    async fn test_json_rotation() {
        let env = TestEnv::new().await;
        let backup = env.config().backup();
        let mut paths = Vec::new();
        for i in 0..7 {
            paths.push(
                backup
                    .save_json(DISTRIBUTION, &json!({ "run": i }))
                    .await
                    .unwrap(),
            );
        }
        let kept: Vec<String> = backup
            .file_names()
            .await
            .unwrap()
            .into_iter()
            .filter(|n| is_backup_file(n, DISTRIBUTION, "json"))
            .collect();
        assert_eq!(kept.len(), 5);
        assert!(!paths[0].exists());
        assert!(!paths[1].exists());
        assert!(paths[6].exists());
        assert!(paths[6].to_string_lossy().ends_with("-007.json"));
    }

    #[tokio::test]
    async fn test_copy_sqlite() {
        let env = TestEnv::new().await;
        let backup = env.config().backup();
        let first = backup.copy_sqlite().await.unwrap();
        let second = backup.copy_sqlite().await.unwrap();
        assert!(first.is_file());
        assert!(second.is_file());
        assert_ne!(first, second);
        Db::load(&second).await.unwrap();
    }
}
