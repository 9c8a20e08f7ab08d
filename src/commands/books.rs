//! The SACCO's own spending and income, outside of member savings and loans.

use crate::args::{ExpenseRecordArgs, IncomeRecordArgs};
use crate::commands::{require_money, Out};
use crate::error::{tagged, ErrorType, IntoResult};
use crate::model::{Amount, Expense, ExpenseCategory, IncomeCategory, OtherIncome};
use crate::{utils, Config, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Records of one kind with their total, overall and per category.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Ledger<R, C: Ord> {
    pub records: Vec<R>,
    pub total: Amount,
    pub by_category: BTreeMap<C, Amount>,
}

impl<R, C: Ord + Copy> Ledger<R, C> {
    fn new(records: Vec<R>, category: impl Fn(&R) -> C, amount: impl Fn(&R) -> Amount) -> Self {
        let mut by_category = BTreeMap::new();
        for record in &records {
            *by_category.entry(category(record)).or_insert(Amount::ZERO) += amount(record);
        }
        let total = by_category.values().sum();
        Self {
            records,
            total,
            by_category,
        }
    }
}

pub async fn expense_record(config: Config, args: ExpenseRecordArgs) -> Result<Out<Expense>> {
    require_money(args.amount, "expense amount")?;
    if args.transaction_cost.is_negative() || !args.transaction_cost.is_whole_cents() {
        return Err(tagged(
            ErrorType::Request,
            format!(
                "The transaction cost must be zero or more in whole cents, got {}",
                args.transaction_cost
            ),
        ));
    }
    let expense = Expense {
        expense_id: utils::new_id("EX"),
        category: args.category,
        amount: args.amount,
        transaction_cost: args.transaction_cost,
        spent_on: args.date.unwrap_or_else(utils::today),
        description: args.description,
        reference: args.reference.trim().to_string(),
    };
    config
        .db()
        .insert_expense(&expense)
        .await
        .pub_result(ErrorType::Database)?;
    debug!("Recorded expense {}", expense.expense_id);
    Ok(Out::new(
        format!(
            "Recorded {} {} expense on {}",
            expense.total_cost().grouped(),
            expense.category,
            expense.spent_on
        ),
        expense,
    ))
}

pub async fn expense_list(config: Config) -> Result<Out<Ledger<Expense, ExpenseCategory>>> {
    let expenses = config
        .db()
        .expenses()
        .await
        .pub_result(ErrorType::Database)?;
    let ledger = Ledger::new(expenses, |e| e.category, Expense::total_cost);
    Ok(Out::new(
        format!(
            "{} expenses totalling {}",
            ledger.records.len(),
            ledger.total.grouped()
        ),
        ledger,
    ))
}

pub async fn income_record(config: Config, args: IncomeRecordArgs) -> Result<Out<OtherIncome>> {
    require_money(args.amount, "income amount")?;
    let income = OtherIncome {
        income_id: utils::new_id("IN"),
        category: args.category,
        amount: args.amount,
        received_on: args.date.unwrap_or_else(utils::today),
        description: args.description,
        reference: args.reference.trim().to_string(),
    };
    config
        .db()
        .insert_other_income(&income)
        .await
        .pub_result(ErrorType::Database)?;
    debug!("Recorded income {}", income.income_id);
    Ok(Out::new(
        format!(
            "Recorded {} of {} income on {}",
            income.amount.grouped(),
            income.category,
            income.received_on
        ),
        income,
    ))
}

pub async fn income_list(config: Config) -> Result<Out<Ledger<OtherIncome, IncomeCategory>>> {
    let income = config
        .db()
        .other_income()
        .await
        .pub_result(ErrorType::Database)?;
    let ledger = Ledger::new(income, |i| i.category, |i| i.amount);
    Ok(Out::new(
        format!(
            "{} income records totalling {}",
            ledger.records.len(),
            ledger.total.grouped()
        ),
        ledger,
    ))
}
