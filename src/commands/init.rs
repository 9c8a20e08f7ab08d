use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::{Config, Result};
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Creates the SACCO home directory with an initial `config.json`, the backups directory and an
/// empty database.
///
/// # Errors
/// - Returns an error if the home already holds a `config.json` or any file operation fails.
pub async fn init(sacco_home: &Path, sacco_name: &str) -> Result<Out<PathBuf>> {
    let config = Config::create(sacco_home, sacco_name)
        .await
        .context("Unable to create the SACCO home directory and config")
        .pub_result(ErrorType::Config)?;
    Ok(Out::new(
        format!("Created the books for {sacco_name}"),
        config.root().to_path_buf(),
    ))
}

/// Writes a consistent copy of the database to the backups directory.
pub async fn backup(config: Config) -> Result<Out<PathBuf>> {
    let path = config.backup().copy_sqlite().await.pub_result(ErrorType::Io)?;
    Ok(Out::new(
        format!("Backed up the database to {}", path.display()),
        path,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_type;
    use crate::test::TestEnv;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_twice() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("books");
        let out = init(&home, "Umoja").await.unwrap();
        assert!(out.structure().unwrap().join("config.json").is_file());

        let e = init(&home, "Umoja").await.unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Config));
    }

    #[tokio::test]
    async fn test_backup() {
        let env = TestEnv::new().await;
        let out = backup(env.config()).await.unwrap();
        let path = out.structure().unwrap();
        assert!(path.starts_with(env.config().backups()));
        assert!(path.is_file());
    }
}
