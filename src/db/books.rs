use super::{constraint_error, fmt_date, parse_amount, parse_date, Db};
use crate::model::{Expense, OtherIncome};
use crate::Result;
use anyhow::Context;
use sqlx::FromRow;
use std::str::FromStr;

#[derive(FromRow)]
struct ExpenseRow {
    expense_id: String,
    category: String,
    amount: String,
    transaction_cost: String,
    spent_on: String,
    description: String,
    reference: String,
}

impl TryFrom<ExpenseRow> for Expense {
    type Error = crate::Error;

    fn try_from(row: ExpenseRow) -> Result<Self> {
        Ok(Expense {
            expense_id: row.expense_id,
            category: FromStr::from_str(&row.category)
                .with_context(|| format!("Bad expense category '{}'", row.category))?,
            amount: parse_amount(&row.amount, "expenses.amount")?,
            transaction_cost: parse_amount(&row.transaction_cost, "expenses.transaction_cost")?,
            spent_on: parse_date(&row.spent_on, "expenses.spent_on")?,
            description: row.description,
            reference: row.reference,
        })
    }
}

#[derive(FromRow)]
struct IncomeRow {
    income_id: String,
    category: String,
    amount: String,
    received_on: String,
    description: String,
    reference: String,
}

impl TryFrom<IncomeRow> for OtherIncome {
    type Error = crate::Error;

    fn try_from(row: IncomeRow) -> Result<Self> {
        Ok(OtherIncome {
            income_id: row.income_id,
            category: FromStr::from_str(&row.category)
                .with_context(|| format!("Bad income category '{}'", row.category))?,
            amount: parse_amount(&row.amount, "other_income.amount")?,
            received_on: parse_date(&row.received_on, "other_income.received_on")?,
            description: row.description,
            reference: row.reference,
        })
    }
}

impl Db {
    pub(crate) async fn insert_expense(&self, expense: &Expense) -> Result<()> {
        sqlx::query(
            "INSERT INTO expenses \
            (expense_id, category, amount, transaction_cost, spent_on, description, reference) \
            VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&expense.expense_id)
        .bind(expense.category.to_string())
        .bind(expense.amount.to_string())
        .bind(expense.transaction_cost.to_string())
        .bind(fmt_date(expense.spent_on))
        .bind(&expense.description)
        .bind(&expense.reference)
        .execute(self.pool())
        .await
        .map_err(|e| {
            constraint_error(e, || format!("Expense '{}' already exists", expense.expense_id))
        })?;
        Ok(())
    }

    /// Expenses in date order.
    pub(crate) async fn expenses(&self) -> Result<Vec<Expense>> {
        let rows: Vec<ExpenseRow> = sqlx::query_as(
            "SELECT expense_id, category, amount, transaction_cost, spent_on, description, \
            reference FROM expenses ORDER BY spent_on, rowid",
        )
        .fetch_all(self.pool())
        .await
        .context("Unable to read expenses")?;
        rows.into_iter().map(Expense::try_from).collect()
    }

    pub(crate) async fn insert_other_income(&self, income: &OtherIncome) -> Result<()> {
        sqlx::query(
            "INSERT INTO other_income \
            (income_id, category, amount, received_on, description, reference) \
            VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&income.income_id)
        .bind(income.category.to_string())
        .bind(income.amount.to_string())
        .bind(fmt_date(income.received_on))
        .bind(&income.description)
        .bind(&income.reference)
        .execute(self.pool())
        .await
        .map_err(|e| {
            constraint_error(e, || format!("Income '{}' already exists", income.income_id))
        })?;
        Ok(())
    }

    /// Income other than loan interest and fees, in date order.
    pub(crate) async fn other_income(&self) -> Result<Vec<OtherIncome>> {
        let rows: Vec<IncomeRow> = sqlx::query_as(
            "SELECT income_id, category, amount, received_on, description, reference \
            FROM other_income ORDER BY received_on, rowid",
        )
        .fetch_all(self.pool())
        .await
        .context("Unable to read other income")?;
        rows.into_iter().map(OtherIncome::try_from).collect()
    }
}
