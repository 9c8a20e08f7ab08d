use crate::args::{BankAccountArgs, BankReconcileArgs, BankRecordArgs};
use crate::commands::{require_money, Out};
use crate::error::{tagged, ErrorType, IntoResult};
use crate::model::{BankAccount, BankTransaction, BankTransactionKind, StatementLine};
use crate::reconcile::{reconcile, BookEntry, Reconciliation};
use crate::{utils, Config, Result};
use anyhow::Context;
use std::path::Path;
use tracing::{debug, warn};

pub async fn bank_add_account(config: Config, args: BankAccountArgs) -> Result<Out<BankAccount>> {
    if args.opening_balance.is_negative() || !args.opening_balance.is_whole_cents() {
        return Err(tagged(
            ErrorType::Request,
            format!(
                "The opening balance must be zero or more in whole cents, got {}",
                args.opening_balance
            ),
        ));
    }
    let account = BankAccount {
        account_id: utils::new_id("BA"),
        bank_name: args.bank_name,
        account_name: args.account_name,
        account_number: args.account_number.trim().to_string(),
        balance: args.opening_balance,
        last_reconciled: None,
    };
    config
        .db()
        .insert_bank_account(&account)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(
        format!(
            "Added {} account {} as {}",
            account.bank_name, account.account_number, account.account_id
        ),
        account,
    ))
}

/// Records a transaction and moves the balances it affects. A transfer needs a destination
/// account; nothing else may have one.
pub async fn bank_record(config: Config, args: BankRecordArgs) -> Result<Out<BankTransaction>> {
    require_money(args.amount, "transaction amount")?;
    match (args.kind, args.to.as_deref()) {
        (BankTransactionKind::Transfer, None) => {
            return Err(tagged(
                ErrorType::Request,
                "A transfer needs a destination account, pass --to",
            ))
        }
        (BankTransactionKind::Transfer, Some(to)) if to == args.account_id => {
            return Err(tagged(
                ErrorType::Request,
                "A transfer cannot go to the account it comes from",
            ))
        }
        (BankTransactionKind::Transfer, Some(_)) => {}
        (kind, Some(_)) => {
            return Err(tagged(
                ErrorType::Request,
                format!("Only transfers have a destination account, not a {kind}"),
            ))
        }
        (_, None) => {}
    }

    let txn = BankTransaction {
        id: 0,
        account_id: args.account_id,
        kind: args.kind,
        amount: args.amount,
        transaction_date: args.date.unwrap_or_else(utils::today),
        reference: args.reference.trim().to_string(),
        description: args.description,
        destination_account_id: args.to,
        reconciled_on: None,
    };
    let stored = config
        .db()
        .record_bank_transaction(&txn)
        .await
        .pub_result(ErrorType::Database)?;
    let account = config
        .db()
        .require_bank_account(&stored.account_id)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(
        format!(
            "Recorded {} of {} on {}, balance {}",
            stored.kind,
            stored.amount.grouped(),
            account.account_id,
            account.balance.grouped()
        ),
        stored,
    ))
}

/// Matches a statement CSV against the account's unreconciled transactions and marks the matched
/// ones reconciled.
pub async fn bank_reconcile(
    config: Config,
    args: BankReconcileArgs,
) -> Result<Out<Reconciliation>> {
    if args.window_days < 0 {
        return Err(tagged(
            ErrorType::Request,
            format!("The date window cannot be negative, got {}", args.window_days),
        ));
    }
    let db = config.db();
    let account = db
        .require_bank_account(&args.account_id)
        .await
        .pub_result(ErrorType::Database)?;
    let lines = read_statement(&args.statement)
        .await
        .pub_result(ErrorType::Io)?;
    let entries: Vec<BookEntry> = db
        .unreconciled_transactions(&account.account_id)
        .await
        .pub_result(ErrorType::Database)?
        .iter()
        .filter_map(|txn| BookEntry::for_account(txn, &account.account_id))
        .collect();
    debug!(
        "Reconciling {} statement lines against {} book entries",
        lines.len(),
        entries.len()
    );

    let result = reconcile(&entries, &lines, args.window_days);
    let ids: Vec<i64> = result.matched.iter().map(|m| m.transaction_id).collect();
    db.mark_reconciled(
        &account.account_id,
        &ids,
        args.date.unwrap_or_else(utils::today),
    )
    .await
    .pub_result(ErrorType::Database)?;

    let message = if result.is_balanced() {
        format!(
            "Account {} reconciled, {} transactions matched",
            account.account_id,
            result.matched.len()
        )
    } else {
        warn!(
            "{} statement lines and {} book entries are unmatched",
            result.unmatched_lines.len(),
            result.unmatched_entries.len()
        );
        format!(
            "Account {}: {} matched, difference of {}",
            account.account_id,
            result.matched.len(),
            result.difference.grouped()
        )
    };
    Ok(Out::new(message, result))
}

/// Reads `date,reference,description,amount` rows.
async fn read_statement(path: &Path) -> Result<Vec<StatementLine>> {
    let content = utils::read(path).await?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let mut lines = Vec::new();
    for (i, row) in reader.deserialize::<StatementLine>().enumerate() {
        let line = row.with_context(|| {
            format!("Bad row {} in statement {}", i + 2, path.display())
        })?;
        lines.push(line);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_type;
    use crate::model::Amount;
    use crate::reconcile::{MatchKind, DEFAULT_WINDOW_DAYS};
    use crate::test::{date, TestEnv};
    use rust_decimal_macros::dec;

    async fn account(env: &TestEnv, number: &str) -> BankAccount {
        bank_add_account(
            env.config(),
            BankAccountArgs {
                bank_name: "Co-op Bank".to_string(),
                account_name: "Main".to_string(),
                account_number: number.to_string(),
                opening_balance: Amount::new(dec!(1000)),
            },
        )
        .await
        .unwrap()
        .structure()
        .unwrap()
        .clone()
    }

    fn record(
        account_id: &str,
        kind: BankTransactionKind,
        amount: Amount,
        to: Option<&str>,
        d: &str,
        reference: &str,
    ) -> BankRecordArgs {
        BankRecordArgs {
            account_id: account_id.to_string(),
            kind,
            amount,
            to: to.map(str::to_string),
            date: Some(date(d)),
            reference: reference.to_string(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_record_validates_transfers() {
        let env = TestEnv::new().await;
        let a = account(&env, "100").await;
        let b = account(&env, "200").await;
        let hundred = Amount::new(dec!(100));

        let e = bank_record(
            env.config(),
            record(&a.account_id, BankTransactionKind::Transfer, hundred, None, "2025-05-01", ""),
        )
        .await
        .unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Request));

        let e = bank_record(
            env.config(),
            record(
                &a.account_id,
                BankTransactionKind::Fee,
                hundred,
                Some(&b.account_id),
                "2025-05-01",
                "",
            ),
        )
        .await
        .unwrap_err();
        assert!(format!("{e:#}").contains("Only transfers"));

        bank_record(
            env.config(),
            record(
                &a.account_id,
                BankTransactionKind::Transfer,
                hundred,
                Some(&b.account_id),
                "2025-05-01",
                "",
            ),
        )
        .await
        .unwrap();
        let db = env.config().db().clone();
        assert_eq!(
            db.require_bank_account(&a.account_id).await.unwrap().balance.value(),
            dec!(900)
        );
        assert_eq!(
            db.require_bank_account(&b.account_id).await.unwrap().balance.value(),
            dec!(1100)
        );
    }

    #[tokio::test]
    async fn test_reconcile_statement() {
        let env = TestEnv::new().await;
        let a = account(&env, "100").await;
        let id = a.account_id.as_str();
        use BankTransactionKind::{Deposit, Fee, Withdrawal};
        for args in [
            record(id, Deposit, Amount::new(dec!(5000)), None, "2025-05-02", "MP-77"),
            record(id, Withdrawal, Amount::new(dec!(1200)), None, "2025-05-05", ""),
            record(id, Fee, Amount::new(dec!(35)), None, "2025-05-20", ""),
        ] {
            bank_record(env.config(), args).await.unwrap();
        }

        let dir = tempfile::TempDir::new().unwrap();
        let statement = dir.path().join("may.csv");
        let csv = "date,reference,description,amount\n\
            2025-05-03, mp-77 ,M-Pesa deposit,5000.00\n\
            2025-05-06,,Cash withdrawal,-1200.00\n\
            2025-05-31,,Ledger fee,-40.00\n";
        utils::write(&statement, csv).await.unwrap();

        let out = bank_reconcile(
            env.config(),
            BankReconcileArgs {
                account_id: id.to_string(),
                statement,
                window_days: DEFAULT_WINDOW_DAYS,
                date: Some(date("2025-06-01")),
            },
        )
        .await
        .unwrap();
        let r = out.structure().unwrap();
        assert_eq!(r.matched.len(), 2);
        assert_eq!(r.matched[0].kind, MatchKind::Reference);
        assert_eq!(r.matched[1].kind, MatchKind::Amount);
        assert_eq!(r.unmatched_lines.len(), 1);
        assert_eq!(r.unmatched_entries.len(), 1);
        assert_eq!(r.difference.value(), dec!(-40));
        assert!(!r.is_balanced());

        let db = env.config().db().clone();
        let left = db.unreconciled_transactions(id).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].kind, BankTransactionKind::Fee);
        assert_eq!(
            db.require_bank_account(id).await.unwrap().last_reconciled,
            Some(date("2025-06-01"))
        );
    }

    #[tokio::test]
    async fn test_reconcile_bad_csv() {
        let env = TestEnv::new().await;
        let a = account(&env, "100").await;
        let dir = tempfile::TempDir::new().unwrap();
        let statement = dir.path().join("bad.csv");
        utils::write(&statement, "date,reference,description,amount\nyesterday,,x,10\n")
            .await
            .unwrap();
        let e = bank_reconcile(
            env.config(),
            BankReconcileArgs {
                account_id: a.account_id,
                statement,
                window_days: DEFAULT_WINDOW_DAYS,
                date: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Io));
        assert!(format!("{e:#}").contains("Bad row 2"));
    }
}
