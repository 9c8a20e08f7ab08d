//! Loan statements and SACCO-wide reports.

use crate::calc::replay_repayments;
use crate::model::{
    round_currency, Amount, Contribution, DividendDistribution, Expense, Loan, LoanStatus, Member,
    MemberId, OtherIncome, Repayment, RepaymentSchedule, SharePayment,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The position of one loan on a given day.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoanStatement {
    pub loan_id: String,
    pub member_id: MemberId,
    pub status: LoanStatus,
    pub as_of: NaiveDate,
    pub principal: Amount,
    pub annual_rate: Decimal,
    pub term_months: u32,
    pub disbursed_on: Option<NaiveDate>,
    pub maturity_date: Option<NaiveDate>,
    pub total_principal: Amount,
    pub total_interest: Amount,
    pub total_due: Amount,
    pub total_paid: Amount,
    pub interest_paid: Amount,
    /// What is still owed, principal and interest.
    pub remaining_balance: Amount,
    pub outstanding_principal: Amount,
    /// Owed on installments whose due date has passed.
    pub overdue_amount: Amount,
    pub installments_paid: usize,
    pub installments_total: usize,
    pub next_due_date: Option<NaiveDate>,
    pub next_due_amount: Amount,
}

pub fn loan_statement(
    loan: &Loan,
    schedule: &RepaymentSchedule,
    as_of: NaiveDate,
) -> LoanStatement {
    let next = schedule.next_due();
    LoanStatement {
        loan_id: loan.loan_id.clone(),
        member_id: loan.member_id.clone(),
        status: loan.status,
        as_of,
        principal: loan.principal,
        annual_rate: loan.annual_rate,
        term_months: loan.term_months,
        disbursed_on: loan.disbursed_on,
        maturity_date: schedule.maturity_date(),
        total_principal: schedule.total_principal(),
        total_interest: schedule.total_interest(),
        total_due: schedule.total_due(),
        total_paid: schedule.total_paid(),
        interest_paid: schedule.interest_collected(),
        remaining_balance: schedule.outstanding(),
        outstanding_principal: schedule.outstanding_principal(),
        overdue_amount: schedule.overdue_amount(as_of),
        installments_paid: schedule.entries().iter().filter(|e| e.is_paid()).count(),
        installments_total: schedule.len(),
        next_due_date: next.map(|e| e.due_date),
        next_due_amount: next.map(|e| e.outstanding()).unwrap_or_default(),
    }
}

/// Everything the SACCO-wide summary is computed from.
#[derive(Debug, Clone, Copy)]
pub struct Books<'a> {
    pub members: &'a [Member],
    pub shares: &'a [SharePayment],
    pub contributions: &'a [Contribution],
    /// Loans with their schedules as they stand today.
    pub loans: &'a [(Loan, RepaymentSchedule)],
    /// Every repayment, oldest first, so the schedules can be wound back to an earlier day.
    pub repayments: &'a [Repayment],
    pub distributions: &'a [DividendDistribution],
    pub expenses: &'a [Expense],
    pub other_income: &'a [OtherIncome],
}

/// The SACCO's financial position.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FinancialSummary {
    pub as_of: NaiveDate,
    pub total_members: usize,
    pub active_members: usize,
    pub total_share_capital: Amount,
    pub total_contributions: Amount,
    pub loans_disbursed: Amount,
    /// Principal less fees: what actually left the SACCO.
    pub net_disbursed: Amount,
    pub active_loans: usize,
    pub outstanding_loans: Amount,
    pub outstanding_principal: Amount,
    pub overdue_amount: Amount,
    pub defaulted_principal: Amount,
    pub repayments_received: Amount,
    pub interest_income: Amount,
    pub fee_income: Amount,
    /// Investment returns, membership fees, penalties, grants and the like.
    pub other_income: Amount,
    pub total_income: Amount,
    /// Operating costs including their transaction charges.
    pub operational_expenses: Amount,
    pub dividends_paid: Amount,
    /// Operating costs plus dividends paid.
    pub total_expenses: Amount,
    pub net_income: Amount,
    /// Money in less money out.
    pub cash_at_hand: Amount,
    /// Cash plus principal still owed on active loans.
    pub total_assets: Amount,
}

/// Summarizes the books as they stood at the end of `as_of`. Anything dated later is left out,
/// and loan schedules are rebuilt from the repayments made by then.
pub fn financial_summary(books: Books<'_>, as_of: NaiveDate) -> FinancialSummary {
    let total_share_capital: Amount = books
        .shares
        .iter()
        .filter(|p| p.paid_on <= as_of)
        .map(|p| p.amount)
        .sum();
    let total_contributions: Amount = books
        .contributions
        .iter()
        .filter(|c| c.paid_on <= as_of)
        .map(|c| c.amount)
        .sum();

    let disbursed: Vec<(&Loan, RepaymentSchedule)> = books
        .loans
        .iter()
        .filter(|(loan, _)| loan.disbursed_on.is_some_and(|d| d <= as_of))
        .map(|(loan, schedule)| (loan, schedule_as_of(loan, schedule, books.repayments, as_of)))
        .collect();
    let closed_by = |closed_on: Option<NaiveDate>| closed_on.is_some_and(|c| c <= as_of);
    let active: Vec<&(&Loan, RepaymentSchedule)> = disbursed
        .iter()
        .filter(|(l, _)| !closed_by(l.closed_on))
        .collect();

    let loans_disbursed: Amount = disbursed.iter().map(|(l, _)| l.principal).sum();
    let net_disbursed: Amount = disbursed.iter().map(|(l, _)| l.disbursed_amount()).sum();
    let fee_income: Amount = disbursed.iter().map(|(l, _)| l.fees()).sum();
    let repayments_received: Amount = disbursed.iter().map(|(_, s)| s.total_paid()).sum();
    let interest_income: Amount = disbursed.iter().map(|(_, s)| s.interest_collected()).sum();
    let defaulted_principal: Amount = disbursed
        .iter()
        .filter(|(l, _)| l.status == LoanStatus::Defaulted && closed_by(l.closed_on))
        .map(|(_, s)| s.outstanding_principal())
        .sum();

    let outstanding_loans: Amount = active.iter().map(|(_, s)| s.outstanding()).sum();
    let outstanding_principal: Amount =
        active.iter().map(|(_, s)| s.outstanding_principal()).sum();
    let overdue_amount: Amount = active.iter().map(|(_, s)| s.overdue_amount(as_of)).sum();

    let dividends_paid: Amount = books
        .distributions
        .iter()
        .filter(|d| d.distributed_on <= as_of)
        .map(|d| d.total_allocated())
        .sum();
    let other_income: Amount = books
        .other_income
        .iter()
        .filter(|i| i.received_on <= as_of)
        .map(|i| i.amount)
        .sum();
    let operational_expenses: Amount = books
        .expenses
        .iter()
        .filter(|e| e.spent_on <= as_of)
        .map(Expense::total_cost)
        .sum();

    let total_income = interest_income + fee_income + other_income;
    let total_expenses = operational_expenses + dividends_paid;
    let cash_at_hand = total_share_capital
        + total_contributions
        + repayments_received
        + other_income
        - net_disbursed
        - dividends_paid
        - operational_expenses;

    let members: Vec<&Member> = books.members.iter().filter(|m| m.joined_on <= as_of).collect();
    FinancialSummary {
        as_of,
        total_members: members.len(),
        active_members: members.iter().filter(|m| !m.on_hold).count(),
        total_share_capital,
        total_contributions,
        loans_disbursed,
        net_disbursed,
        active_loans: active.len(),
        outstanding_loans,
        outstanding_principal,
        overdue_amount,
        defaulted_principal,
        repayments_received,
        interest_income,
        fee_income,
        other_income,
        total_income,
        operational_expenses,
        dividends_paid,
        total_expenses,
        net_income: total_income - total_expenses,
        cash_at_hand,
        total_assets: cash_at_hand + outstanding_principal,
    }
}

/// The schedule of `loan` with only the repayments made by `as_of`.
fn schedule_as_of(
    loan: &Loan,
    schedule: &RepaymentSchedule,
    repayments: &[Repayment],
    as_of: NaiveDate,
) -> RepaymentSchedule {
    let own: Vec<&Repayment> = repayments
        .iter()
        .filter(|r| r.loan_id == loan.loan_id)
        .collect();
    if own.iter().all(|r| r.paid_on <= as_of) {
        return schedule.clone();
    }
    replay_repayments(
        schedule,
        own.iter().filter(|r| r.paid_on <= as_of).map(|r| r.applied),
    )
}

/// Contributions for one month compared with the month before.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ContributionReport {
    pub year: i32,
    pub month: u32,
    pub total_amount: Amount,
    pub contributing_members: usize,
    pub total_members: usize,
    /// Contributing members as a percentage of all members.
    pub participation_percentage: Decimal,
    pub average_contribution: Amount,
    pub previous_month_amount: Amount,
    /// Change from the previous month as a percentage. Absent when the previous month had nothing.
    pub growth_percentage: Option<Decimal>,
}

pub fn contribution_report(
    contributions: &[Contribution],
    total_members: usize,
    year: i32,
    month: u32,
) -> ContributionReport {
    let (prev_year, prev_month) = if month <= 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    };

    let current: Vec<&Contribution> = contributions
        .iter()
        .filter(|c| c.year == year && c.month == month)
        .collect();
    let total_amount: Amount = current.iter().map(|c| c.amount).sum();
    let contributing: BTreeSet<&MemberId> = current.iter().map(|c| &c.member_id).collect();
    let previous_month_amount: Amount = contributions
        .iter()
        .filter(|c| c.year == prev_year && c.month == prev_month)
        .map(|c| c.amount)
        .sum();

    let participation_percentage = if total_members == 0 {
        Decimal::ZERO
    } else {
        round_currency(
            Decimal::from(contributing.len() as u64) * Decimal::ONE_HUNDRED
                / Decimal::from(total_members as u64),
        )
    };
    let average_contribution = if contributing.is_empty() {
        Amount::ZERO
    } else {
        Amount::rounded(total_amount.value() / Decimal::from(contributing.len() as u64))
    };
    let growth_percentage = previous_month_amount.is_positive().then(|| {
        round_currency(
            (total_amount - previous_month_amount).value() * Decimal::ONE_HUNDRED
                / previous_month_amount.value(),
        )
    });

    ContributionReport {
        year,
        month,
        total_amount,
        contributing_members: contributing.len(),
        total_members,
        participation_percentage,
        average_contribution,
        previous_month_amount,
        growth_percentage,
    }
}
