//! Configuration file handling for the SACCO home directory.
//!
//! The configuration file is stored at `$SACCO_HOME/config.json`. Besides bookkeeping settings it
//! holds the SACCO's lending and savings policy: share value, minimum contribution, interest rate
//! and so on.

use crate::backup::Backup;
use crate::calc::LendingPolicy;
use crate::db::Db;
use crate::model::{Amount, DividendBasis, InterestMethod};
use crate::{utils, Result};
use anyhow::{bail, ensure, Context};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "sacco";
const CONFIG_VERSION: u8 = 1;
const BACKUP_COPIES: u32 = 5;
const BACKUPS: &str = ".backups";
const CONFIG_JSON: &str = "config.json";
const SACCO_SQLITE: &str = "sacco.sqlite";

/// The `Config` object represents an opened SACCO home directory. You instantiate it by providing
/// the path to `$SACCO_HOME` and from there it loads `config.json` and opens the database.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    backups: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    db: Db,
    sqlite_path: PathBuf,
}

impl Config {
    /// Creates the home directory, its backups directory, an initial `config.json` with the
    /// default policy and an empty database.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the SACCO home, e.g. `$HOME/sacco`
    /// - `sacco_name` - The display name of the SACCO
    ///
    /// # Errors
    /// - Returns an error if `config.json` already exists or any file operation fails.
    pub async fn create(dir: impl Into<PathBuf>, sacco_name: &str) -> Result<Self> {
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the SACCO home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let config_path = root.join(CONFIG_JSON);
        if config_path.exists() {
            bail!(
                "A SACCO home already exists at '{}', refusing to overwrite it",
                root.display()
            )
        }

        let backups = root.join(BACKUPS);
        utils::make_dir(&backups).await?;

        let config_file = ConfigFile {
            sacco_name: sacco_name.to_string(),
            ..ConfigFile::default()
        };
        config_file.save(&config_path).await?;

        let sqlite_path = root.join(SACCO_SQLITE);
        let db = Db::init(&sqlite_path)
            .await
            .context("Unable to create SQLite DB")?;

        Ok(Self {
            root,
            backups,
            config_path,
            config_file,
            db,
            sqlite_path,
        })
    }

    /// This will
    /// - validate that `sacco_home` and its config file exist
    /// - load and validate the config file
    /// - open the database, migrating it if needed
    pub async fn load(sacco_home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = sacco_home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("The SACCO home is missing, run 'sacco init' first")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let sqlite_path = root.join(SACCO_SQLITE);
        let db = Db::load(&sqlite_path)
            .await
            .context("Unable to load SQLite DB")?;

        let backups = root.join(BACKUPS);
        if !backups.is_dir() {
            bail!("The backups directory is missing '{}'", backups.display())
        }

        Ok(Self {
            root,
            backups,
            config_path,
            config_file,
            db,
            sqlite_path,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub(crate) fn db(&self) -> &Db {
        &self.db
    }

    pub fn backups(&self) -> &Path {
        &self.backups
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub fn sacco_name(&self) -> &str {
        &self.config_file.sacco_name
    }

    pub fn backup_copies(&self) -> u32 {
        self.config_file.backup_copies
    }

    pub fn policy(&self) -> &Policy {
        &self.config_file.policy
    }

    pub fn backup(&self) -> Backup {
        Backup::new(self)
    }
}

/// The serialization format of `config.json`.
///
/// ```json
/// {
///   "app_name": "sacco",
///   "config_version": 1,
///   "sacco_name": "Umoja SACCO",
///   "backup_copies": 5,
///   "policy": {
///     "share_value": "5000.00",
///     "loan_interest_rate": "10"
///   }
/// }
/// ```
///
/// Policy fields that are left out take their default values.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Should always be "sacco".
    app_name: String,

    config_version: u8,

    sacco_name: String,

    /// Number of backup copies to keep per backup kind.
    backup_copies: u32,

    #[serde(default)]
    policy: Policy,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            sacco_name: String::new(),
            backup_copies: BACKUP_COPIES,
            policy: Policy::default(),
        }
    }
}

impl ConfigFile {
    async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = utils::read(path).await?;
        let config: ConfigFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

        ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        ensure!(
            config.config_version <= CONFIG_VERSION,
            "The config file is version {} but this program only understands version {}",
            config.config_version,
            CONFIG_VERSION
        );
        config
            .policy
            .validate()
            .with_context(|| format!("Invalid policy in {}", path.display()))?;
        Ok(config)
    }

    async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(path.as_ref(), data)
            .await
            .context("Unable to write config file")
    }
}

/// The SACCO's savings and lending rules.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct Policy {
    /// The share capital every member is expected to pay up, which is also the value of one share.
    pub share_value: Amount,
    pub minimum_monthly_contribution: Amount,
    /// Annual percentage applied to new loans.
    pub loan_interest_rate: Decimal,
    /// A member may borrow up to this many times their total deposits.
    pub maximum_loan_multiplier: Decimal,
    pub processing_fee_percentage: Decimal,
    pub insurance_percentage: Decimal,
    pub maximum_term_months: u32,
    /// How far a repayment may exceed the outstanding balance and still be accepted.
    pub overpayment_tolerance: Amount,
    pub dividend_basis: DividendBasis,
    pub interest_method: InterestMethod,
    pub require_full_share_capital: bool,
    /// Members who must pledge their deposits before a loan can be approved.
    pub minimum_guarantors: u32,
    /// How long a member must have belonged to the SACCO before borrowing.
    pub minimum_membership_months: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            share_value: Amount::new(Decimal::new(5000, 0)),
            minimum_monthly_contribution: Amount::new(Decimal::new(1000, 0)),
            loan_interest_rate: Decimal::TEN,
            maximum_loan_multiplier: Decimal::new(3, 0),
            processing_fee_percentage: Decimal::ONE,
            insurance_percentage: Decimal::ONE,
            maximum_term_months: 36,
            overpayment_tolerance: Amount::ONE,
            dividend_basis: DividendBasis::Both,
            interest_method: InterestMethod::ReducingBalance,
            require_full_share_capital: true,
            minimum_guarantors: 2,
            minimum_membership_months: 3,
        }
    }
}

impl Policy {
    fn validate(&self) -> Result<()> {
        ensure!(
            self.share_value.is_positive(),
            "share_value must be positive, got {}",
            self.share_value
        );
        ensure!(
            !self.minimum_monthly_contribution.is_negative(),
            "minimum_monthly_contribution cannot be negative"
        );
        ensure!(
            !self.loan_interest_rate.is_sign_negative() || self.loan_interest_rate.is_zero(),
            "loan_interest_rate cannot be negative"
        );
        ensure!(
            self.maximum_loan_multiplier > Decimal::ZERO,
            "maximum_loan_multiplier must be positive"
        );
        for (name, pct) in [
            ("processing_fee_percentage", self.processing_fee_percentage),
            ("insurance_percentage", self.insurance_percentage),
        ] {
            ensure!(
                pct >= Decimal::ZERO && pct < Decimal::ONE_HUNDRED,
                "{name} must be at least 0 and below 100, got {pct}"
            );
        }
        ensure!(
            self.maximum_term_months > 0,
            "maximum_term_months must be positive"
        );
        ensure!(
            !self.overpayment_tolerance.is_negative(),
            "overpayment_tolerance cannot be negative"
        );
        Ok(())
    }

    /// The subset of the policy that the loan calculators need.
    pub fn lending_policy(&self) -> LendingPolicy {
        LendingPolicy {
            multiplier: self.maximum_loan_multiplier,
            max_term_months: self.maximum_term_months,
            require_full_share_capital: self.require_full_share_capital,
            processing_fee_percentage: self.processing_fee_percentage,
            insurance_percentage: self.insurance_percentage,
            minimum_guarantors: self.minimum_guarantors,
            minimum_membership_months: self.minimum_membership_months,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_config_create_then_load() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("sacco_home");

        let config = Config::create(&home, "Umoja SACCO").await.unwrap();
        assert_eq!(config.sacco_name(), "Umoja SACCO");
        assert!(config.backups().is_dir());
        assert!(config.sqlite_path().is_file());
        assert_eq!(config.policy(), &Policy::default());

        let loaded = Config::load(&home).await.unwrap();
        assert_eq!(loaded.sacco_name(), "Umoja SACCO");
        assert_eq!(loaded.backup_copies(), 5);
    }

    #[tokio::test]
    async fn test_create_refuses_existing_home() {
        let dir = TempDir::new().unwrap();
        Config::create(dir.path(), "A").await.unwrap();
        let e = Config::create(dir.path(), "B").await.unwrap_err();
        assert!(e.to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_load_missing_home() {
        let dir = TempDir::new().unwrap();
        let e = Config::load(dir.path().join("nowhere")).await.unwrap_err();
        assert!(format!("{e:#}").contains("sacco init"));
    }

    #[tokio::test]
    async fn test_partial_policy_takes_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_JSON);
        let json = r#"{
            "app_name": "sacco",
            "config_version": 1,
            "sacco_name": "Tumaini",
            "backup_copies": 3,
            "policy": { "share_value": "10000", "loan_interest_rate": "12.5" }
        }"#;
        utils::write(&path, json).await.unwrap();

        let config = ConfigFile::load(&path).await.unwrap();
        assert_eq!(config.backup_copies, 3);
        assert_eq!(config.policy.share_value.value(), dec!(10000));
        assert_eq!(config.policy.loan_interest_rate, dec!(12.5));
        assert_eq!(config.policy.maximum_term_months, 36);
        assert_eq!(config.policy.dividend_basis, DividendBasis::Both);
        assert_eq!(config.policy.minimum_guarantors, 2);
        assert_eq!(config.policy.minimum_membership_months, 3);
    }

    #[tokio::test]
    async fn test_invalid_app_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_JSON);
        let json = r#"{
            "app_name": "ledger",
            "config_version": 1,
            "sacco_name": "",
            "backup_copies": 5
        }"#;
        utils::write(&path, json).await.unwrap();
        let e = ConfigFile::load(&path).await.unwrap_err();
        assert!(e.to_string().contains("Invalid app_name"));
    }

    #[tokio::test]
    async fn test_invalid_policy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_JSON);
        let json = r#"{
            "app_name": "sacco",
            "config_version": 1,
            "sacco_name": "",
            "backup_copies": 5,
            "policy": { "processing_fee_percentage": "150" }
        }"#;
        utils::write(&path, json).await.unwrap();
        let e = ConfigFile::load(&path).await.unwrap_err();
        assert!(format!("{e:#}").contains("processing_fee_percentage"));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_JSON);
        let mut original = ConfigFile::default();
        original.sacco_name = "Harambee".to_string();
        original.policy.interest_method = InterestMethod::EqualPrincipal;
        original.save(&path).await.unwrap();
        assert_eq!(ConfigFile::load(&path).await.unwrap(), original);
    }

    #[test]
    fn test_lending_policy() {
        let lending = Policy::default().lending_policy();
        assert_eq!(lending.multiplier, dec!(3));
        assert_eq!(lending.max_term_months, 36);
        assert!(lending.require_full_share_capital);
        assert_eq!(lending.minimum_guarantors, 2);
        assert_eq!(lending.minimum_membership_months, 3);
    }
}
