use super::{
    constraint_error, fmt_date, fmt_opt_date, parse_amount, parse_date, parse_decimal,
    parse_opt_date, Db,
};
use crate::error::{tagged, ErrorType};
use crate::model::{Loan, MemberId, Repayment, RepaymentSchedule, ScheduleEntry};
use crate::Result;
use anyhow::Context;
use sqlx::{FromRow, SqliteConnection};
use std::str::FromStr;
use tracing::debug;

#[derive(FromRow)]
struct LoanRow {
    loan_id: String,
    member_id: String,
    principal: String,
    annual_rate: String,
    term_months: i64,
    interest_method: String,
    purpose: String,
    status: String,
    applied_on: String,
    approved_on: Option<String>,
    disbursed_on: Option<String>,
    closed_on: Option<String>,
    processing_fee: String,
    insurance_fee: String,
    rejection_reason: String,
    version: i64,
}

impl TryFrom<LoanRow> for Loan {
    type Error = crate::Error;

    fn try_from(row: LoanRow) -> Result<Self> {
        Ok(Loan {
            loan_id: row.loan_id,
            member_id: MemberId::new(row.member_id),
            principal: parse_amount(&row.principal, "loans.principal")?,
            annual_rate: parse_decimal(&row.annual_rate, "loans.annual_rate")?,
            term_months: u32::try_from(row.term_months)
                .context("loans.term_months is out of range")?,
            interest_method: FromStr::from_str(&row.interest_method)
                .with_context(|| format!("Bad interest method '{}'", row.interest_method))?,
            purpose: row.purpose,
            status: FromStr::from_str(&row.status)
                .with_context(|| format!("Bad loan status '{}'", row.status))?,
            applied_on: parse_date(&row.applied_on, "loans.applied_on")?,
            approved_on: parse_opt_date(row.approved_on.as_deref(), "loans.approved_on")?,
            disbursed_on: parse_opt_date(row.disbursed_on.as_deref(), "loans.disbursed_on")?,
            closed_on: parse_opt_date(row.closed_on.as_deref(), "loans.closed_on")?,
            processing_fee: parse_amount(&row.processing_fee, "loans.processing_fee")?,
            insurance_fee: parse_amount(&row.insurance_fee, "loans.insurance_fee")?,
            rejection_reason: row.rejection_reason,
            version: row.version,
        })
    }
}

#[derive(FromRow)]
struct EntryRow {
    installment: i64,
    due_date: String,
    principal: String,
    interest: String,
    amount_paid: String,
}

impl TryFrom<EntryRow> for ScheduleEntry {
    type Error = crate::Error;

    fn try_from(row: EntryRow) -> Result<Self> {
        let mut entry = ScheduleEntry::new(
            u32::try_from(row.installment).context("schedule_entries.installment is out of range")?,
            parse_date(&row.due_date, "schedule_entries.due_date")?,
            parse_amount(&row.principal, "schedule_entries.principal")?,
            parse_amount(&row.interest, "schedule_entries.interest")?,
        );
        entry.amount_paid = parse_amount(&row.amount_paid, "schedule_entries.amount_paid")?;
        Ok(entry)
    }
}

#[derive(FromRow)]
struct RepaymentRow {
    loan_id: String,
    amount: String,
    applied: String,
    surplus: String,
    paid_on: String,
    reference: String,
    early_closure: bool,
}

impl TryFrom<RepaymentRow> for Repayment {
    type Error = crate::Error;

    fn try_from(row: RepaymentRow) -> Result<Self> {
        Ok(Repayment {
            loan_id: row.loan_id,
            amount: parse_amount(&row.amount, "repayments.amount")?,
            applied: parse_amount(&row.applied, "repayments.applied")?,
            surplus: parse_amount(&row.surplus, "repayments.surplus")?,
            paid_on: parse_date(&row.paid_on, "repayments.paid_on")?,
            reference: row.reference,
            early_closure: row.early_closure,
        })
    }
}

const LOAN_COLUMNS: &str = "loan_id, member_id, principal, annual_rate, term_months, \
    interest_method, purpose, status, applied_on, approved_on, disbursed_on, closed_on, \
    processing_fee, insurance_fee, rejection_reason, version";

impl Db {
    pub(crate) async fn insert_loan(&self, loan: &Loan) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO loans ({LOAN_COLUMNS}) \
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&loan.loan_id)
        .bind(loan.member_id.as_str())
        .bind(loan.principal.to_string())
        .bind(loan.annual_rate.to_string())
        .bind(loan.term_months)
        .bind(loan.interest_method.to_string())
        .bind(&loan.purpose)
        .bind(loan.status.to_string())
        .bind(fmt_date(loan.applied_on))
        .bind(fmt_opt_date(loan.approved_on))
        .bind(fmt_opt_date(loan.disbursed_on))
        .bind(fmt_opt_date(loan.closed_on))
        .bind(loan.processing_fee.to_string())
        .bind(loan.insurance_fee.to_string())
        .bind(&loan.rejection_reason)
        .bind(loan.version)
        .execute(self.pool())
        .await
        .map_err(|e| constraint_error(e, || format!("Loan '{}' already exists", loan.loan_id)))?;
        Ok(())
    }

    pub(crate) async fn get_loan(&self, loan_id: &str) -> Result<Option<Loan>> {
        let row: Option<LoanRow> =
            sqlx::query_as(&format!("SELECT {LOAN_COLUMNS} FROM loans WHERE loan_id = ?"))
                .bind(loan_id)
                .fetch_optional(self.pool())
                .await
                .context("Unable to read loan")?;
        row.map(Loan::try_from).transpose()
    }

    /// Like `get_loan` but a missing loan is a `Request` error.
    pub(crate) async fn require_loan(&self, loan_id: &str) -> Result<Loan> {
        self.get_loan(loan_id)
            .await?
            .ok_or_else(|| tagged(ErrorType::Request, format!("No such loan '{loan_id}'")))
    }

    /// Loans in application order, for one member or everyone.
    pub(crate) async fn list_loans(&self, member_id: Option<&MemberId>) -> Result<Vec<Loan>> {
        let rows: Vec<LoanRow> = sqlx::query_as(&format!(
            "SELECT {LOAN_COLUMNS} FROM loans WHERE ?1 IS NULL OR member_id = ?1 \
            ORDER BY applied_on, loan_id"
        ))
        .bind(member_id.map(|m| m.as_str()))
        .fetch_all(self.pool())
        .await
        .context("Unable to list loans")?;
        rows.into_iter().map(Loan::try_from).collect()
    }

    /// Saves a change to `loan`. Fails with a `Conflict` error if the stored loan has moved on
    /// from `loan.version`. Returns the loan with its new version.
    pub(crate) async fn update_loan(&self, loan: &Loan) -> Result<Loan> {
        let mut conn = self
            .pool()
            .acquire()
            .await
            .context("Unable to get a connection")?;
        write_loan(&mut *conn, loan).await
    }

    /// Moves `loan` to disbursed and stores its schedule, in one transaction.
    pub(crate) async fn disburse_loan(
        &self,
        loan: &Loan,
        schedule: &RepaymentSchedule,
    ) -> Result<Loan> {
        let mut tx = self.pool().begin().await.context("Unable to begin a transaction")?;
        let saved = write_loan(&mut *tx, loan).await?;
        for entry in schedule.entries() {
            sqlx::query(
                "INSERT INTO schedule_entries \
                (loan_id, installment, due_date, principal, interest, amount_paid) \
                VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&loan.loan_id)
            .bind(entry.installment)
            .bind(fmt_date(entry.due_date))
            .bind(entry.principal.to_string())
            .bind(entry.interest.to_string())
            .bind(entry.amount_paid.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                constraint_error(e, || {
                    format!("Loan '{}' already has a repayment schedule", loan.loan_id)
                })
            })?;
        }
        tx.commit().await.context("Unable to commit the disbursement")?;
        debug!(
            "Stored {} installments for loan {}",
            schedule.len(),
            loan.loan_id
        );
        Ok(saved)
    }

    /// Stores a repayment: the loan's new state, the updated installments and the payment
    /// itself, in one transaction.
    pub(crate) async fn record_repayment(
        &self,
        loan: &Loan,
        schedule: &RepaymentSchedule,
        repayment: &Repayment,
    ) -> Result<Loan> {
        let mut tx = self.pool().begin().await.context("Unable to begin a transaction")?;
        let saved = write_loan(&mut *tx, loan).await?;
        for entry in schedule.entries() {
            sqlx::query(
                "UPDATE schedule_entries SET amount_paid = ? \
                WHERE loan_id = ? AND installment = ?",
            )
            .bind(entry.amount_paid.to_string())
            .bind(&loan.loan_id)
            .bind(entry.installment)
            .execute(&mut *tx)
            .await
            .context("Unable to update the repayment schedule")?;
        }
        sqlx::query(
            "INSERT INTO repayments \
            (loan_id, amount, applied, surplus, paid_on, reference, early_closure) \
            VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&repayment.loan_id)
        .bind(repayment.amount.to_string())
        .bind(repayment.applied.to_string())
        .bind(repayment.surplus.to_string())
        .bind(fmt_date(repayment.paid_on))
        .bind(&repayment.reference)
        .bind(repayment.early_closure)
        .execute(&mut *tx)
        .await
        .context("Unable to record the repayment")?;
        tx.commit().await.context("Unable to commit the repayment")?;
        Ok(saved)
    }

    /// The schedule of a loan. Empty until the loan is disbursed.
    pub(crate) async fn schedule(&self, loan_id: &str) -> Result<RepaymentSchedule> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            "SELECT installment, due_date, principal, interest, amount_paid \
            FROM schedule_entries WHERE loan_id = ? ORDER BY installment",
        )
        .bind(loan_id)
        .fetch_all(self.pool())
        .await
        .context("Unable to read the repayment schedule")?;
        let entries = rows
            .into_iter()
            .map(ScheduleEntry::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(RepaymentSchedule::new(entries))
    }

    pub(crate) async fn repayments(&self, loan_id: &str) -> Result<Vec<Repayment>> {
        let rows: Vec<RepaymentRow> = sqlx::query_as(
            "SELECT loan_id, amount, applied, surplus, paid_on, reference, early_closure \
            FROM repayments WHERE loan_id = ? ORDER BY paid_on, id",
        )
        .bind(loan_id)
        .fetch_all(self.pool())
        .await
        .context("Unable to read repayments")?;
        rows.into_iter().map(Repayment::try_from).collect()
    }

    /// Every repayment on every loan, oldest first.
    pub(crate) async fn all_repayments(&self) -> Result<Vec<Repayment>> {
        let rows: Vec<RepaymentRow> = sqlx::query_as(
            "SELECT loan_id, amount, applied, surplus, paid_on, reference, early_closure \
            FROM repayments ORDER BY paid_on, id",
        )
        .fetch_all(self.pool())
        .await
        .context("Unable to read repayments")?;
        rows.into_iter().map(Repayment::try_from).collect()
    }

    /// Every loan paired with its schedule.
    pub(crate) async fn loans_with_schedules(&self) -> Result<Vec<(Loan, RepaymentSchedule)>> {
        let loans = self.list_loans(None).await?;
        let mut out = Vec::with_capacity(loans.len());
        for loan in loans {
            let schedule = self.schedule(&loan.loan_id).await?;
            out.push((loan, schedule));
        }
        Ok(out)
    }
}

/// Writes every mutable column of `loan` if the stored version still matches, bumping the version.
async fn write_loan(conn: &mut SqliteConnection, loan: &Loan) -> Result<Loan> {
    let result = sqlx::query(
        "UPDATE loans SET status = ?, approved_on = ?, disbursed_on = ?, closed_on = ?, \
        processing_fee = ?, insurance_fee = ?, rejection_reason = ?, version = version + 1 \
        WHERE loan_id = ? AND version = ?",
    )
    .bind(loan.status.to_string())
    .bind(fmt_opt_date(loan.approved_on))
    .bind(fmt_opt_date(loan.disbursed_on))
    .bind(fmt_opt_date(loan.closed_on))
    .bind(loan.processing_fee.to_string())
    .bind(loan.insurance_fee.to_string())
    .bind(&loan.rejection_reason)
    .bind(&loan.loan_id)
    .bind(loan.version)
    .execute(&mut *conn)
    .await
    .context("Unable to update loan")?;

    if result.rows_affected() == 0 {
        return Err(tagged(
            ErrorType::Conflict,
            format!(
                "Loan '{}' was changed by someone else, reload it and try again",
                loan.loan_id
            ),
        ));
    }
    let mut saved = loan.clone();
    saved.version += 1;
    Ok(saved)
}
