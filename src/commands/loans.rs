//! Loan workflow: application, approval, disbursement, repayment and closure.
//!
//! The calculators know nothing about loan status. The handlers here enforce the status
//! progression and persist every change with an optimistic version check, so two repayments
//! racing against the same loan cannot both succeed. Approval repeats the eligibility check made
//! at application, since other loans may have been approved in between.

use crate::args::{
    GuarantorAddArgs, LoanApplyArgs, LoanDateArgs, LoanIdArgs, LoanListArgs, LoanPaymentArgs,
    LoanRejectArgs, LoanStatementArgs, MemberIdArgs,
};
use crate::calc::{
    amortize, apply_repayment, assess, check_application, check_guarantors, close_early,
    loan_charges, pledge, AppliedRepayment, Eligibility, GuarantorCapacity, InstallmentPayment,
    LoanCharges, LoanStatement, LoanTerms,
};
use crate::commands::members::member_summary;
use crate::commands::{calc, require_money, Out};
use crate::error::{tagged, ErrorType, IntoResult};
use crate::model::{Amount, Guarantee, Loan, LoanStatus, Member, RepaymentSchedule, Repayment};
use crate::{utils, Config, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// A new loan together with the charges and limits it was assessed against.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoanApplication {
    pub loan: Loan,
    pub charges: LoanCharges,
    pub eligibility: Eligibility,
    /// The first installment if the loan were disbursed on the day it was applied for.
    pub projected_installment: Amount,
    pub projected_total_interest: Amount,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Disbursement {
    pub loan: Loan,
    pub disbursed_amount: Amount,
    pub schedule: RepaymentSchedule,
}

/// The pledges backing a loan.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoanGuarantees {
    pub loan_id: String,
    pub principal: Amount,
    pub guarantees: Vec<Guarantee>,
    pub total_guaranteed: Amount,
    /// How many guarantors the policy asks for before approval.
    pub minimum_guarantors: u32,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RepaymentOutcome {
    pub loan: Loan,
    pub repayment: Repayment,
    pub installments: Vec<InstallmentPayment>,
    pub remaining_balance: Amount,
}

pub async fn loan_apply(config: Config, args: LoanApplyArgs) -> Result<Out<LoanApplication>> {
    require_money(args.amount, "loan amount")?;
    let policy = config.policy();
    let lending = policy.lending_policy();
    let member = config
        .db()
        .require_member(&args.member_id)
        .await
        .pub_result(ErrorType::Database)?;

    let applied_on = args.applied_on.unwrap_or_else(utils::today);
    let eligibility = eligibility(&config, &member, applied_on).await?;
    calc(check_application(&eligibility, args.amount, args.term_months))?;
    let charges = calc(loan_charges(args.amount, &lending))?;

    let loan = Loan {
        loan_id: utils::new_id("LN"),
        member_id: member.member_id,
        principal: args.amount,
        annual_rate: args.rate.unwrap_or(policy.loan_interest_rate),
        term_months: args.term_months,
        interest_method: args.method.unwrap_or(policy.interest_method),
        purpose: args.purpose,
        status: LoanStatus::Applied,
        applied_on,
        approved_on: None,
        disbursed_on: None,
        closed_on: None,
        processing_fee: charges.processing_fee,
        insurance_fee: charges.insurance_fee,
        rejection_reason: String::new(),
        version: 0,
    };
    let projected = calc(amortize(&terms(&loan, applied_on)))?;

    config
        .db()
        .insert_loan(&loan)
        .await
        .pub_result(ErrorType::Database)?;
    info!(
        "Loan {} of {} applied for by {}",
        loan.loan_id, loan.principal, loan.member_id
    );

    let projected_installment = projected
        .entries()
        .first()
        .map(|e| e.amount_due())
        .unwrap_or_default();
    Ok(Out::new(
        format!(
            "Loan {} of {} over {} months is awaiting approval",
            loan.loan_id,
            loan.principal.grouped(),
            loan.term_months
        ),
        LoanApplication {
            loan,
            charges,
            eligibility,
            projected_installment,
            projected_total_interest: projected.total_interest(),
        },
    ))
}

pub async fn loan_eligibility(config: Config, args: MemberIdArgs) -> Result<Out<Eligibility>> {
    let member = config
        .db()
        .require_member(&args.member_id)
        .await
        .pub_result(ErrorType::Database)?;
    let eligibility = eligibility(&config, &member, utils::today()).await?;
    let message = if eligibility.eligible {
        format!(
            "Member {} can borrow up to {}",
            member.member_id,
            eligibility.available.grouped()
        )
    } else {
        format!(
            "Member {} cannot borrow: {}",
            member.member_id,
            eligibility.reasons.join("; ")
        )
    };
    Ok(Out::new(message, eligibility))
}

pub async fn loan_list(config: Config, args: LoanListArgs) -> Result<Out<Vec<Loan>>> {
    let loans = config
        .db()
        .list_loans(args.member_id.as_ref())
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(format!("{} loans", loans.len()), loans))
}

/// Pledges part of a member's deposits for a loan that awaits approval. A member can pledge up to
/// their deposits less what they have pledged for other loans that are still open.
pub async fn loan_guarantor_add(config: Config, args: GuarantorAddArgs) -> Result<Out<Guarantee>> {
    require_money(args.amount, "guarantee")?;
    let loan = require_loan(&config, &args.loan_id).await?;
    if loan.status != LoanStatus::Applied {
        return Err(tagged(
            ErrorType::Request,
            format!(
                "Loan {} is {}, guarantors can only be added while it awaits approval",
                loan.loan_id, loan.status
            ),
        ));
    }
    let pledged_on = args.date.unwrap_or_else(utils::today);
    if pledged_on < loan.applied_on {
        return Err(tagged(
            ErrorType::Request,
            format!(
                "Loan {} was applied for on {}, it cannot be guaranteed on {pledged_on}",
                loan.loan_id, loan.applied_on
            ),
        ));
    }

    let db = config.db();
    let guarantor = db
        .require_member(&args.member_id)
        .await
        .pub_result(ErrorType::Database)?;
    let deposits = member_summary(&config, &guarantor.member_id)
        .await?
        .total_deposits;
    let pledged = db
        .open_pledges(&guarantor.member_id)
        .await
        .pub_result(ErrorType::Database)?;
    let existing = db
        .guarantees(&loan.loan_id)
        .await
        .pub_result(ErrorType::Database)?;
    let capacity = GuarantorCapacity::new(guarantor.member_id.clone(), deposits, pledged);
    let on_hold = guarantor.on_hold.then_some(guarantor.on_hold_reason.as_str());
    let guarantee = calc(pledge(
        &loan,
        &existing,
        &capacity,
        on_hold,
        args.amount,
        pledged_on,
    ))?;

    db.insert_guarantee(&guarantee)
        .await
        .pub_result(ErrorType::Database)?;
    info!(
        "Member {} guarantees {} of loan {}",
        guarantee.guarantor_id, guarantee.amount, guarantee.loan_id
    );
    Ok(Out::new(
        format!(
            "Member {} guarantees {} ({}%) of loan {}",
            guarantee.guarantor_id,
            guarantee.amount.grouped(),
            guarantee.percentage,
            guarantee.loan_id
        ),
        guarantee,
    ))
}

pub async fn loan_guarantor_list(config: Config, args: LoanIdArgs) -> Result<Out<LoanGuarantees>> {
    let loan = require_loan(&config, &args.loan_id).await?;
    let guarantees = config
        .db()
        .guarantees(&loan.loan_id)
        .await
        .pub_result(ErrorType::Database)?;
    let total_guaranteed: Amount = guarantees.iter().map(|g| g.amount).sum();
    let minimum_guarantors = config.policy().minimum_guarantors;
    Ok(Out::new(
        format!(
            "Loan {} has {} of {minimum_guarantors} guarantors covering {} of {}",
            loan.loan_id,
            guarantees.len(),
            total_guaranteed.grouped(),
            loan.principal.grouped()
        ),
        LoanGuarantees {
            loan_id: loan.loan_id,
            principal: loan.principal,
            guarantees,
            total_guaranteed,
            minimum_guarantors,
        },
    ))
}

/// Approves an applied loan. The member must still be eligible for the principal on the day of
/// approval, counting loans approved since this one was applied for, and the loan must have the
/// guarantors the policy asks for.
pub async fn loan_approve(config: Config, args: LoanDateArgs) -> Result<Out<Loan>> {
    let mut loan = require_loan(&config, &args.loan_id).await?;
    let status = transition(&loan, LoanStatus::Approved)?;
    let approved_on = args.date.unwrap_or_else(utils::today);

    let member = config
        .db()
        .require_member(&loan.member_id)
        .await
        .pub_result(ErrorType::Database)?;
    let eligibility = eligibility(&config, &member, approved_on).await?;
    calc(check_application(&eligibility, loan.principal, loan.term_months))
        .map_err(|e| e.context(format!("Loan {} cannot be approved", loan.loan_id)))?;
    let guarantees = config
        .db()
        .guarantees(&loan.loan_id)
        .await
        .pub_result(ErrorType::Database)?;
    calc(check_guarantors(
        &loan,
        &guarantees,
        config.policy().minimum_guarantors,
    ))?;

    loan.status = status;
    loan.approved_on = Some(approved_on);
    let loan = save(&config, &loan).await?;
    info!("Loan {} of {} approved", loan.loan_id, loan.principal);
    Ok(Out::new(format!("Loan {} approved", loan.loan_id), loan))
}

pub async fn loan_reject(config: Config, args: LoanRejectArgs) -> Result<Out<Loan>> {
    let mut loan = require_loan(&config, &args.loan_id).await?;
    loan.status = transition(&loan, LoanStatus::Rejected)?;
    loan.rejection_reason = args.reason.trim().to_string();
    let loan = save(&config, &loan).await?;
    Ok(Out::new(format!("Loan {} rejected", loan.loan_id), loan))
}

/// Pays out an approved loan. The repayment schedule is computed once, here, and stored with the
/// loan. A copy of the database is taken first.
pub async fn loan_disburse(config: Config, args: LoanDateArgs) -> Result<Out<Disbursement>> {
    let mut loan = require_loan(&config, &args.loan_id).await?;
    let status = transition(&loan, LoanStatus::Disbursed)?;
    let disbursed_on = args.date.unwrap_or_else(utils::today);
    if disbursed_on < loan.applied_on {
        return Err(tagged(
            ErrorType::Request,
            format!(
                "Loan {} cannot be disbursed on {disbursed_on}, before it was applied for on {}",
                loan.loan_id, loan.applied_on
            ),
        ));
    }
    let schedule = calc(amortize(&terms(&loan, disbursed_on)))?;

    let backup = config.backup().copy_sqlite().await.pub_result(ErrorType::Io)?;
    debug!("Backed up the database to {}", backup.display());

    loan.status = status;
    loan.disbursed_on = Some(disbursed_on);
    let loan = config
        .db()
        .disburse_loan(&loan, &schedule)
        .await
        .pub_result(ErrorType::Database)?;
    let disbursed_amount = loan.disbursed_amount();
    Ok(Out::new(
        format!(
            "Disbursed {} on loan {}, {} installments starting {}",
            disbursed_amount.grouped(),
            loan.loan_id,
            schedule.len(),
            schedule
                .entries()
                .first()
                .map(|e| e.due_date.to_string())
                .unwrap_or_default()
        ),
        Disbursement {
            loan,
            disbursed_amount,
            schedule,
        },
    ))
}

/// Applies a repayment to the oldest unpaid installments. A payment that would overpay the loan by
/// more than the policy tolerance is refused; `loan_settle` is the way to pay a loan off early.
pub async fn loan_repay(config: Config, args: LoanPaymentArgs) -> Result<Out<RepaymentOutcome>> {
    let tolerance = config.policy().overpayment_tolerance;
    record(config, args, false, |schedule, amount| {
        apply_repayment(schedule, amount, tolerance)
    })
    .await
}

/// Pays off the whole balance of a loan. Anything paid above the balance is reported as a refund.
pub async fn loan_settle(config: Config, args: LoanPaymentArgs) -> Result<Out<RepaymentOutcome>> {
    record(config, args, true, close_early).await
}

pub async fn loan_default(config: Config, args: LoanDateArgs) -> Result<Out<Loan>> {
    let mut loan = require_loan(&config, &args.loan_id).await?;
    loan.status = transition(&loan, LoanStatus::Defaulted)?;
    loan.closed_on = Some(args.date.unwrap_or_else(utils::today));
    let loan = save(&config, &loan).await?;
    warn!("Loan {} of member {} defaulted", loan.loan_id, loan.member_id);
    Ok(Out::new(format!("Loan {} marked as defaulted", loan.loan_id), loan))
}

/// The stored schedule of a disbursed loan, or the schedule the loan would get if it were
/// disbursed today.
pub async fn loan_schedule(config: Config, args: LoanIdArgs) -> Result<Out<RepaymentSchedule>> {
    let loan = require_loan(&config, &args.loan_id).await?;
    if loan.disbursed_on.is_some() {
        let schedule = config
            .db()
            .schedule(&loan.loan_id)
            .await
            .pub_result(ErrorType::Database)?;
        return Ok(Out::new(
            format!(
                "Loan {}: {} of {} owed",
                loan.loan_id,
                schedule.outstanding().grouped(),
                schedule.total_due().grouped()
            ),
            schedule,
        ));
    }
    if loan.status == LoanStatus::Rejected {
        return Err(tagged(
            ErrorType::Request,
            format!("Loan {} was rejected and has no schedule", loan.loan_id),
        ));
    }
    let schedule = calc(amortize(&terms(&loan, utils::today())))?;
    Ok(Out::new(
        format!(
            "Loan {} has not been disbursed, this is the schedule if it were disbursed today",
            loan.loan_id
        ),
        schedule,
    ))
}

pub async fn loan_statement(config: Config, args: LoanStatementArgs) -> Result<Out<LoanStatement>> {
    let loan = require_loan(&config, &args.loan_id).await?;
    if loan.disbursed_on.is_none() {
        return Err(tagged(
            ErrorType::Request,
            format!("Loan {} has not been disbursed", loan.loan_id),
        ));
    }
    let schedule = config
        .db()
        .schedule(&loan.loan_id)
        .await
        .pub_result(ErrorType::Database)?;
    let as_of = args.as_of.unwrap_or_else(utils::today);
    let statement = crate::calc::loan_statement(&loan, &schedule, as_of);
    let message = if statement.overdue_amount.is_positive() {
        format!(
            "Loan {} owes {}, of which {} is overdue",
            loan.loan_id,
            statement.remaining_balance.grouped(),
            statement.overdue_amount.grouped()
        )
    } else {
        format!(
            "Loan {} owes {}",
            loan.loan_id,
            statement.remaining_balance.grouped()
        )
    };
    Ok(Out::new(message, statement))
}

/// Shared by `loan_repay` and `loan_settle`: `apply` decides how the payment meets the schedule.
async fn record<F>(
    config: Config,
    args: LoanPaymentArgs,
    early_closure: bool,
    apply: F,
) -> Result<Out<RepaymentOutcome>>
where
    F: FnOnce(&RepaymentSchedule, Amount) -> crate::calc::CalcResult<AppliedRepayment>,
{
    require_money(args.amount, "repayment")?;
    let mut loan = require_loan(&config, &args.loan_id).await?;
    if !loan.status.is_active() {
        return Err(tagged(
            ErrorType::Request,
            format!(
                "Loan {} is {} and cannot take repayments",
                loan.loan_id, loan.status
            ),
        ));
    }
    let paid_on = args.paid_on.unwrap_or_else(utils::today);
    let schedule = config
        .db()
        .schedule(&loan.loan_id)
        .await
        .pub_result(ErrorType::Database)?;

    let applied = calc(apply(&schedule, args.amount))?;
    if applied.schedule.is_settled() {
        loan.status = transition(&loan, LoanStatus::Closed)?;
        loan.closed_on = Some(paid_on);
    } else if loan.status == LoanStatus::Disbursed {
        loan.status = transition(&loan, LoanStatus::Repaying)?;
    }

    let repayment = Repayment {
        loan_id: loan.loan_id.clone(),
        amount: args.amount,
        applied: applied.applied,
        surplus: applied.surplus,
        paid_on,
        reference: args.reference,
        early_closure,
    };
    let loan = config
        .db()
        .record_repayment(&loan, &applied.schedule, &repayment)
        .await
        .pub_result(ErrorType::Database)?;

    let remaining_balance = applied.schedule.outstanding();
    let mut message = format!(
        "Applied {} to loan {}, {} remaining",
        applied.applied.grouped(),
        loan.loan_id,
        remaining_balance.grouped()
    );
    if loan.status == LoanStatus::Closed {
        message = format!("{message}, the loan is closed");
    }
    if applied.surplus.is_positive() {
        message = format!("{message}, {} to refund", applied.surplus.grouped());
    }
    Ok(Out::new(
        message,
        RepaymentOutcome {
            loan,
            repayment,
            installments: applied.payments,
            remaining_balance,
        },
    ))
}

/// Assesses `member` against the lending policy on `as_of`. Loans that are approved but not yet
/// paid out count at their principal, active loans at what is still owed on them.
async fn eligibility(config: &Config, member: &Member, as_of: NaiveDate) -> Result<Eligibility> {
    let summary = member_summary(config, &member.member_id).await?;
    let loans = config
        .db()
        .list_loans(Some(&member.member_id))
        .await
        .pub_result(ErrorType::Database)?;
    let mut committed = Amount::ZERO;
    for loan in loans.iter().filter(|l| l.status.counts_against_limit()) {
        if loan.status.is_active() {
            committed += config
                .db()
                .schedule(&loan.loan_id)
                .await
                .pub_result(ErrorType::Database)?
                .outstanding();
        } else {
            committed += loan.principal;
        }
    }
    let on_hold = member.on_hold.then_some(member.on_hold_reason.as_str());
    Ok(assess(
        &summary,
        on_hold,
        member.joined_on,
        committed,
        &config.policy().lending_policy(),
        as_of,
    ))
}

async fn require_loan(config: &Config, loan_id: &str) -> Result<Loan> {
    config
        .db()
        .require_loan(loan_id)
        .await
        .pub_result(ErrorType::Database)
}

async fn save(config: &Config, loan: &Loan) -> Result<Loan> {
    config
        .db()
        .update_loan(loan)
        .await
        .pub_result(ErrorType::Database)
}

fn transition(loan: &Loan, next: LoanStatus) -> Result<LoanStatus> {
    loan.status
        .transition(next)
        .map_err(|e| e.context(format!("Loan {}", loan.loan_id)))
        .pub_result(ErrorType::Request)
}

fn terms(loan: &Loan, disbursement_date: NaiveDate) -> LoanTerms {
    LoanTerms {
        principal: loan.principal,
        annual_rate: loan.annual_rate,
        term_months: loan.term_months,
        disbursement_date,
        method: loan.interest_method,
    }
}
