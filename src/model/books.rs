//! Money the SACCO spends and earns outside of member shares and loans.

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
pub enum ExpenseCategory {
    #[default]
    Administrative,
    Operation,
    Rental,
    /// Bank charges not already captured as bank transaction fees.
    Banking,
    Marketing,
    Technology,
    /// Audit, legal and other professional fees.
    Professional,
    Other,
}

serde_plain::derive_display_from_serialize!(ExpenseCategory);
serde_plain::derive_fromstr_from_deserialize!(ExpenseCategory);

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
pub enum IncomeCategory {
    /// Returns on SACCO investments.
    #[default]
    Investment,
    /// Registration and membership fees.
    Membership,
    Penalties,
    Donations,
    Grants,
    Other,
}

serde_plain::derive_display_from_serialize!(IncomeCategory);
serde_plain::derive_fromstr_from_deserialize!(IncomeCategory);

/// An operating cost paid by the SACCO.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Expense {
    pub expense_id: String,
    pub category: ExpenseCategory,
    pub amount: Amount,
    /// Charged by the payment channel on top of `amount`.
    pub transaction_cost: Amount,
    pub spent_on: NaiveDate,
    pub description: String,
    pub reference: String,
}

impl Expense {
    /// What the expense took out of the SACCO's cash.
    pub fn total_cost(&self) -> Amount {
        self.amount + self.transaction_cost
    }
}

/// Income that is neither loan interest nor loan fees.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OtherIncome {
    pub income_id: String,
    pub category: IncomeCategory,
    pub amount: Amount,
    pub received_on: NaiveDate,
    pub description: String,
    pub reference: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[test]
    fn test_category_names() {
        assert_eq!(ExpenseCategory::Professional.to_string(), "professional");
        assert_eq!(
            IncomeCategory::from_str("grants").unwrap(),
            IncomeCategory::Grants
        );
        assert!(ExpenseCategory::from_str("salaries").is_err());
    }

    #[test]
    fn test_total_cost_includes_charges() {
        let expense = Expense {
            expense_id: "E-1".into(),
            category: ExpenseCategory::Rental,
            amount: Amount::new(dec!(15000)),
            transaction_cost: Amount::new(dec!(55)),
            spent_on: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            description: "March rent".into(),
            reference: String::new(),
        };
        assert_eq!(expense.total_cost(), Amount::new(dec!(15055)));
    }
}
