use super::{constraint_error, fmt_date, fmt_opt_date, parse_amount, parse_date, parse_opt_date, Db};
use crate::error::{tagged, ErrorType};
use crate::model::{Amount, BankAccount, BankTransaction, BankTransactionKind};
use crate::Result;
use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{FromRow, SqliteConnection};
use std::str::FromStr;

#[derive(FromRow)]
struct AccountRow {
    account_id: String,
    bank_name: String,
    account_name: String,
    account_number: String,
    balance: String,
    last_reconciled: Option<String>,
}

impl TryFrom<AccountRow> for BankAccount {
    type Error = crate::Error;

    fn try_from(row: AccountRow) -> Result<Self> {
        Ok(BankAccount {
            account_id: row.account_id,
            bank_name: row.bank_name,
            account_name: row.account_name,
            account_number: row.account_number,
            balance: parse_amount(&row.balance, "bank_accounts.balance")?,
            last_reconciled: parse_opt_date(
                row.last_reconciled.as_deref(),
                "bank_accounts.last_reconciled",
            )?,
        })
    }
}

#[derive(FromRow)]
struct TransactionRow {
    id: i64,
    account_id: String,
    kind: String,
    amount: String,
    transaction_date: String,
    reference: String,
    description: String,
    destination_account_id: Option<String>,
    reconciled_on: Option<String>,
}

impl TryFrom<TransactionRow> for BankTransaction {
    type Error = crate::Error;

    fn try_from(row: TransactionRow) -> Result<Self> {
        Ok(BankTransaction {
            id: row.id,
            account_id: row.account_id,
            kind: BankTransactionKind::from_str(&row.kind)
                .with_context(|| format!("Bad transaction kind '{}'", row.kind))?,
            amount: parse_amount(&row.amount, "bank_transactions.amount")?,
            transaction_date: parse_date(&row.transaction_date, "transaction_date")?,
            reference: row.reference,
            description: row.description,
            destination_account_id: row.destination_account_id,
            reconciled_on: parse_opt_date(row.reconciled_on.as_deref(), "reconciled_on")?,
        })
    }
}

const TRANSACTION_COLUMNS: &str = "id, account_id, kind, amount, transaction_date, reference, \
    description, destination_account_id, reconciled_on";

impl Db {
    pub(crate) async fn insert_bank_account(&self, account: &BankAccount) -> Result<()> {
        sqlx::query(
            "INSERT INTO bank_accounts \
            (account_id, bank_name, account_name, account_number, balance, last_reconciled) \
            VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&account.account_id)
        .bind(&account.bank_name)
        .bind(&account.account_name)
        .bind(&account.account_number)
        .bind(account.balance.to_string())
        .bind(fmt_opt_date(account.last_reconciled))
        .execute(self.pool())
        .await
        .map_err(|e| {
            constraint_error(e, || {
                format!(
                    "A bank account numbered '{}' already exists",
                    account.account_number
                )
            })
        })?;
        Ok(())
    }

    pub(crate) async fn require_bank_account(&self, account_id: &str) -> Result<BankAccount> {
        let row: Option<AccountRow> = sqlx::query_as(
            "SELECT account_id, bank_name, account_name, account_number, balance, \
            last_reconciled FROM bank_accounts WHERE account_id = ?",
        )
        .bind(account_id)
        .fetch_optional(self.pool())
        .await
        .context("Unable to read bank account")?;
        match row {
            Some(row) => BankAccount::try_from(row),
            None => Err(tagged(
                ErrorType::Request,
                format!("No such bank account '{account_id}'"),
            )),
        }
    }

    /// Records `txn` and moves the balances it affects, in one transaction. The `id` and
    /// `reconciled_on` fields of `txn` are ignored. Returns the stored transaction.
    pub(crate) async fn record_bank_transaction(
        &self,
        txn: &BankTransaction,
    ) -> Result<BankTransaction> {
        let mut tx = self.pool().begin().await.context("Unable to begin a transaction")?;

        adjust_balance(&mut *tx, &txn.account_id, txn.signed_amount()).await?;
        if let Some(destination) = &txn.destination_account_id {
            adjust_balance(&mut *tx, destination, txn.amount).await?;
        }

        let result = sqlx::query(
            "INSERT INTO bank_transactions (account_id, kind, amount, transaction_date, \
            reference, description, destination_account_id) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&txn.account_id)
        .bind(txn.kind.to_string())
        .bind(txn.amount.to_string())
        .bind(fmt_date(txn.transaction_date))
        .bind(&txn.reference)
        .bind(&txn.description)
        .bind(txn.destination_account_id.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(|e| constraint_error(e, || "Duplicate bank transaction".to_string()))?;
        tx.commit().await.context("Unable to commit the bank transaction")?;

        let mut stored = txn.clone();
        stored.id = result.last_insert_rowid();
        stored.reconciled_on = None;
        Ok(stored)
    }

    /// Transactions touching `account_id`, as source or destination, that have not been
    /// reconciled yet.
    pub(crate) async fn unreconciled_transactions(
        &self,
        account_id: &str,
    ) -> Result<Vec<BankTransaction>> {
        let rows: Vec<TransactionRow> = sqlx::query_as(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM bank_transactions \
            WHERE (account_id = ?1 OR destination_account_id = ?1) AND reconciled_on IS NULL \
            ORDER BY transaction_date, id"
        ))
        .bind(account_id)
        .fetch_all(self.pool())
        .await
        .context("Unable to read bank transactions")?;
        rows.into_iter().map(BankTransaction::try_from).collect()
    }

    /// Marks `ids` reconciled on `date` and sets the account's last-reconciled date.
    pub(crate) async fn mark_reconciled(
        &self,
        account_id: &str,
        ids: &[i64],
        date: NaiveDate,
    ) -> Result<()> {
        let mut tx = self.pool().begin().await.context("Unable to begin a transaction")?;
        for &id in ids {
            sqlx::query("UPDATE bank_transactions SET reconciled_on = ? WHERE id = ?")
                .bind(fmt_date(date))
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Unable to mark a transaction reconciled")?;
        }
        sqlx::query("UPDATE bank_accounts SET last_reconciled = ? WHERE account_id = ?")
            .bind(fmt_date(date))
            .bind(account_id)
            .execute(&mut *tx)
            .await
            .context("Unable to update the account")?;
        tx.commit().await.context("Unable to commit the reconciliation")?;
        Ok(())
    }
}

async fn adjust_balance(
    conn: &mut SqliteConnection,
    account_id: &str,
    delta: Amount,
) -> Result<()> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT balance FROM bank_accounts WHERE account_id = ?")
            .bind(account_id)
            .fetch_optional(&mut *conn)
            .await
            .context("Unable to read the account balance")?;
    let Some((balance,)) = row else {
        return Err(tagged(
            ErrorType::Request,
            format!("No such bank account '{account_id}'"),
        ));
    };
    let balance = parse_amount(&balance, "bank_accounts.balance")? + delta;
    sqlx::query("UPDATE bank_accounts SET balance = ? WHERE account_id = ?")
        .bind(balance.to_string())
        .bind(account_id)
        .execute(&mut *conn)
        .await
        .context("Unable to update the account balance")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_type;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, d).unwrap()
    }

    fn account(id: &str, number: &str) -> BankAccount {
        BankAccount {
            account_id: id.to_string(),
            bank_name: "Equity".to_string(),
            account_name: "SACCO Main".to_string(),
            account_number: number.to_string(),
            balance: Amount::ZERO,
            last_reconciled: None,
        }
    }

    fn txn(kind: BankTransactionKind, amount: Amount, to: Option<&str>) -> BankTransaction {
        BankTransaction {
            id: 0,
            account_id: "A".to_string(),
            kind,
            amount,
            transaction_date: date(2),
            reference: String::new(),
            description: String::new(),
            destination_account_id: to.map(str::to_string),
            reconciled_on: None,
        }
    }

    async fn db() -> (TempDir, Db) {
        let dir = TempDir::new().unwrap();
        let db = Db::init(dir.path().join("sacco.sqlite")).await.unwrap();
        db.insert_bank_account(&account("A", "001")).await.unwrap();
        db.insert_bank_account(&account("B", "002")).await.unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn test_balances_follow_transactions() {
        let (_dir, db) = db().await;
        let hundred = Amount::new(dec!(100));
        db.record_bank_transaction(&txn(BankTransactionKind::Deposit, hundred, None))
            .await
            .unwrap();
        db.record_bank_transaction(&txn(
            BankTransactionKind::Fee,
            Amount::new(dec!(2.50)),
            None,
        ))
        .await
        .unwrap();
        let transfer = db
            .record_bank_transaction(&txn(
                BankTransactionKind::Transfer,
                Amount::new(dec!(40)),
                Some("B"),
            ))
            .await
            .unwrap();
        assert!(transfer.id > 0);

        assert_eq!(
            db.require_bank_account("A").await.unwrap().balance.value(),
            dec!(57.50)
        );
        assert_eq!(
            db.require_bank_account("B").await.unwrap().balance.value(),
            dec!(40)
        );
        assert_eq!(db.unreconciled_transactions("A").await.unwrap().len(), 3);
        assert_eq!(db.unreconciled_transactions("B").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_destination_rolls_back() {
        let (_dir, db) = db().await;
        let e = db
            .record_bank_transaction(&txn(
                BankTransactionKind::Transfer,
                Amount::new(dec!(40)),
                Some("Z"),
            ))
            .await
            .unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Request));
        assert_eq!(db.require_bank_account("A").await.unwrap().balance, Amount::ZERO);
        assert!(db.unreconciled_transactions("A").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_reconciled() {
        let (_dir, db) = db().await;
        let stored = db
            .record_bank_transaction(&txn(
                BankTransactionKind::Deposit,
                Amount::new(dec!(10)),
                None,
            ))
            .await
            .unwrap();
        db.mark_reconciled("A", &[stored.id], date(30)).await.unwrap();
        assert!(db.unreconciled_transactions("A").await.unwrap().is_empty());
        assert_eq!(
            db.require_bank_account("A").await.unwrap().last_reconciled,
            Some(date(30))
        );
    }

    #[tokio::test]
    async fn test_duplicate_account_number() {
        let (_dir, db) = db().await;
        let e = db.insert_bank_account(&account("C", "001")).await.unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Request));
    }
}
