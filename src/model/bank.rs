//! SACCO bank accounts and the transactions recorded against them.

use crate::model::Amount;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum BankTransactionKind {
    #[default]
    Deposit,
    Withdrawal,
    /// Moves money to another SACCO account.
    Transfer,
    /// Interest credited by the bank.
    Interest,
    /// A bank fee or charge.
    Fee,
}

serde_plain::derive_display_from_serialize!(BankTransactionKind);
serde_plain::derive_fromstr_from_deserialize!(BankTransactionKind);

impl BankTransactionKind {
    /// The effect of a transaction of this kind on the balance of the account it is recorded
    /// against: positive for money in, negative for money out.
    pub fn signed(&self, amount: Amount) -> Amount {
        match self {
            BankTransactionKind::Deposit | BankTransactionKind::Interest => amount,
            BankTransactionKind::Withdrawal
            | BankTransactionKind::Fee
            | BankTransactionKind::Transfer => -amount,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BankAccount {
    pub account_id: String,
    pub bank_name: String,
    pub account_name: String,
    pub account_number: String,
    /// The book balance, maintained as transactions are recorded.
    pub balance: Amount,
    pub last_reconciled: Option<NaiveDate>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BankTransaction {
    pub id: i64,
    pub account_id: String,
    pub kind: BankTransactionKind,
    /// Always positive; direction comes from `kind`.
    pub amount: Amount,
    pub transaction_date: NaiveDate,
    pub reference: String,
    pub description: String,
    pub destination_account_id: Option<String>,
    pub reconciled_on: Option<NaiveDate>,
}

impl BankTransaction {
    /// The movement on the account this transaction belongs to, as the bank would show it.
    pub fn signed_amount(&self) -> Amount {
        self.kind.signed(self.amount)
    }
}

/// A row of a bank statement CSV.
///
/// `date,reference,description,amount` where the amount is positive for credits and negative for
/// debits.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StatementLine {
    pub date: NaiveDate,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub description: String,
    pub amount: Amount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_signed() {
        let a = Amount::new(dec!(100));
        assert_eq!(BankTransactionKind::Deposit.signed(a), a);
        assert_eq!(BankTransactionKind::Interest.signed(a), a);
        assert_eq!(BankTransactionKind::Withdrawal.signed(a), -a);
        assert_eq!(BankTransactionKind::Fee.signed(a), -a);
        assert_eq!(BankTransactionKind::Transfer.signed(a), -a);
    }

    #[test]
    fn test_statement_line_from_csv() {
        let data = "date,reference,description,amount\n\
                    2025-03-01,DEP-1,Member deposit,\"1,500.00\"\n\
                    2025-03-02,,Bank charge,-25.00\n";
        let mut rdr = csv::Reader::from_reader(data.as_bytes());
        let lines: Vec<StatementLine> = rdr.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].reference, "DEP-1");
        assert_eq!(lines[0].amount.value(), dec!(1500));
        assert_eq!(lines[1].reference, "");
        assert_eq!(lines[1].amount.value(), dec!(-25));
    }
}
