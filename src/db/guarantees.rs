use super::{constraint_error, fmt_date, parse_amount, parse_date, parse_decimal, Db};
use crate::model::{Amount, Guarantee, LoanStatus, MemberId};
use crate::Result;
use anyhow::Context;
use sqlx::FromRow;
use std::str::FromStr;

#[derive(FromRow)]
struct GuaranteeRow {
    loan_id: String,
    guarantor_id: String,
    amount: String,
    percentage: String,
    pledged_on: String,
}

impl TryFrom<GuaranteeRow> for Guarantee {
    type Error = crate::Error;

    fn try_from(row: GuaranteeRow) -> Result<Self> {
        Ok(Guarantee {
            loan_id: row.loan_id,
            guarantor_id: MemberId::new(row.guarantor_id),
            amount: parse_amount(&row.amount, "loan_guarantees.amount")?,
            percentage: parse_decimal(&row.percentage, "loan_guarantees.percentage")?,
            pledged_on: parse_date(&row.pledged_on, "loan_guarantees.pledged_on")?,
        })
    }
}

impl Db {
    pub(crate) async fn insert_guarantee(&self, guarantee: &Guarantee) -> Result<()> {
        sqlx::query(
            "INSERT INTO loan_guarantees \
            (loan_id, guarantor_id, amount, percentage, pledged_on) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&guarantee.loan_id)
        .bind(guarantee.guarantor_id.as_str())
        .bind(guarantee.amount.to_string())
        .bind(guarantee.percentage.to_string())
        .bind(fmt_date(guarantee.pledged_on))
        .execute(self.pool())
        .await
        .map_err(|e| {
            constraint_error(e, || {
                format!(
                    "Member '{}' already guarantees loan '{}'",
                    guarantee.guarantor_id, guarantee.loan_id
                )
            })
        })?;
        Ok(())
    }

    /// The pledges made for a loan, in the order they were made.
    pub(crate) async fn guarantees(&self, loan_id: &str) -> Result<Vec<Guarantee>> {
        let rows: Vec<GuaranteeRow> = sqlx::query_as(
            "SELECT loan_id, guarantor_id, amount, percentage, pledged_on \
            FROM loan_guarantees WHERE loan_id = ? ORDER BY pledged_on, rowid",
        )
        .bind(loan_id)
        .fetch_all(self.pool())
        .await
        .context("Unable to read loan guarantees")?;
        rows.into_iter().map(Guarantee::try_from).collect()
    }

    /// What `guarantor_id` has pledged for loans that are not yet closed, rejected or written off.
    pub(crate) async fn open_pledges(&self, guarantor_id: &MemberId) -> Result<Amount> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT g.amount, l.status FROM loan_guarantees g \
            JOIN loans l ON l.loan_id = g.loan_id WHERE g.guarantor_id = ?",
        )
        .bind(guarantor_id.as_str())
        .fetch_all(self.pool())
        .await
        .context("Unable to read the member's pledges")?;
        let mut pledged = Amount::ZERO;
        for (amount, status) in rows {
            let status = LoanStatus::from_str(&status)
                .with_context(|| format!("Bad loan status '{status}'"))?;
            if status.binds_guarantors() {
                pledged += parse_amount(&amount, "loan_guarantees.amount")?;
            }
        }
        Ok(pledged)
    }
}
