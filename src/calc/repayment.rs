//! Applies payments to repayment schedules.

use crate::calc::{CalcError, CalcResult};
use crate::model::{Amount, RepaymentSchedule};
use serde::{Deserialize, Serialize};

/// How much of a payment went to one installment.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InstallmentPayment {
    pub installment: u32,
    pub amount: Amount,
    /// True if this payment left the installment fully paid.
    pub settled: bool,
}

/// The outcome of applying a payment. The input schedule is left untouched.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AppliedRepayment {
    pub schedule: RepaymentSchedule,
    pub payments: Vec<InstallmentPayment>,
    /// The part of the payment that went to installments.
    pub applied: Amount,
    /// The part of the payment left over once everything was paid. Within the overpayment
    /// tolerance for `apply_repayment`; the refund due for `close_early`.
    pub surplus: Amount,
}

/// Applies `amount` to the oldest unpaid installments of `schedule` first.
///
/// A payment smaller than the next installment leaves it partly paid. Anything beyond one
/// installment carries over to the next. An amount that exceeds the outstanding balance by no more
/// than `tolerance` pays off the loan and the excess is reported as `surplus`.
///
/// # Errors
/// - `CalcError::InvalidInput` if the amount is not positive, is not in whole cents, the tolerance
///   is negative, or the schedule has no installments.
/// - `CalcError::Overpayment` if the amount exceeds the outstanding balance by more than
///   `tolerance`.
pub fn apply_repayment(
    schedule: &RepaymentSchedule,
    amount: Amount,
    tolerance: Amount,
) -> CalcResult<AppliedRepayment> {
    validate(schedule, amount)?;
    if tolerance.is_negative() {
        return Err(CalcError::invalid(format!(
            "the overpayment tolerance cannot be negative, got {tolerance}"
        )));
    }

    let outstanding = schedule.outstanding();
    if amount > outstanding + tolerance {
        return Err(CalcError::Overpayment {
            payment: amount,
            outstanding,
            tolerance,
        });
    }
    Ok(distribute(schedule, amount))
}

/// Pays off the whole outstanding balance at once. `amount` must cover the balance; whatever is
/// left is returned as `surplus` so that it can be refunded.
///
/// # Errors
/// - `CalcError::InvalidInput` if the amount is not positive, is not in whole cents, does not
///   cover the outstanding balance, or the schedule has no installments.
pub fn close_early(schedule: &RepaymentSchedule, amount: Amount) -> CalcResult<AppliedRepayment> {
    validate(schedule, amount)?;
    let outstanding = schedule.outstanding();
    if amount < outstanding {
        return Err(CalcError::invalid(format!(
            "a payment of {amount} does not cover the outstanding balance of {outstanding}"
        )));
    }
    Ok(distribute(schedule, amount))
}

/// Rebuilds `schedule` as it stood after only the given repayments, where `applied` holds what each
/// repayment put toward installments, oldest first. Amounts that are not positive are skipped.
pub fn replay_repayments<I>(schedule: &RepaymentSchedule, applied: I) -> RepaymentSchedule
where
    I: IntoIterator<Item = Amount>,
{
    let mut replayed = schedule.clone();
    for entry in replayed.entries_mut() {
        entry.amount_paid = Amount::ZERO;
    }
    for amount in applied.into_iter().filter(Amount::is_positive) {
        replayed = distribute(&replayed, amount).schedule;
    }
    replayed
}

fn validate(schedule: &RepaymentSchedule, amount: Amount) -> CalcResult<()> {
    if schedule.is_empty() {
        return Err(CalcError::invalid("the schedule has no installments"));
    }
    if !amount.is_positive() {
        return Err(CalcError::invalid(format!(
            "the payment must be positive, got {amount}"
        )));
    }
    if !amount.is_whole_cents() {
        return Err(CalcError::invalid(format!(
            "the payment must be in whole cents, got {amount}"
        )));
    }
    Ok(())
}

fn distribute(schedule: &RepaymentSchedule, amount: Amount) -> AppliedRepayment {
    let mut updated = schedule.clone();

    let mut order: Vec<usize> = (0..updated.len()).collect();
    order.sort_by_key(|&ix| {
        let e = &updated.entries()[ix];
        (e.due_date, e.installment)
    });

    let mut remaining = amount;
    let mut payments = Vec::new();
    for ix in order {
        if remaining.is_zero() {
            break;
        }
        let entry = &mut updated.entries_mut()[ix];
        let owed = entry.outstanding();
        if owed.is_zero() {
            continue;
        }
        let paid = remaining.min(owed);
        entry.amount_paid += paid;
        remaining -= paid;
        payments.push(InstallmentPayment {
            installment: entry.installment,
            amount: paid,
            settled: entry.is_paid(),
        });
    }

    AppliedRepayment {
        schedule: updated,
        payments,
        applied: amount - remaining,
        surplus: remaining,
    }
}
