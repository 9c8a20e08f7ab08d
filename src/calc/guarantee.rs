//! Guarantor pledges: how much a member can still guarantee and whether a loan has enough cover.

use crate::calc::{CalcError, CalcResult};
use crate::model::{Amount, Guarantee, Loan, MemberId};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What a member can still pledge for other members' loans.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GuarantorCapacity {
    pub guarantor_id: MemberId,
    /// A member can guarantee up to their own deposits.
    pub total_deposits: Amount,
    /// Pledged for loans that are still open.
    pub pledged: Amount,
    /// Deposits not yet pledged, never below zero.
    pub available: Amount,
}

impl GuarantorCapacity {
    pub fn new(guarantor_id: MemberId, total_deposits: Amount, pledged: Amount) -> Self {
        Self {
            guarantor_id,
            total_deposits,
            pledged,
            available: total_deposits.saturating_sub(pledged),
        }
    }
}

/// Builds the pledge of `amount` by the member described by `capacity` for `loan`. `existing`
/// holds the pledges already made for the loan. `on_hold` is the guarantor's hold reason, if any.
///
/// # Errors
/// - `CalcError::InvalidInput` if the amount is not positive, the borrower is guaranteeing their
///   own loan, the guarantor is on hold or already pledged for this loan, the pledge exceeds what
///   the guarantor has free, or the loan would be guaranteed for more than its principal.
pub fn pledge(
    loan: &Loan,
    existing: &[Guarantee],
    capacity: &GuarantorCapacity,
    on_hold: Option<&str>,
    amount: Amount,
    pledged_on: NaiveDate,
) -> CalcResult<Guarantee> {
    let guarantor = &capacity.guarantor_id;
    if !amount.is_positive() || !amount.is_whole_cents() {
        return Err(CalcError::invalid(format!(
            "a guarantee must be a positive amount in whole cents, got {amount}"
        )));
    }
    if guarantor == &loan.member_id {
        return Err(CalcError::invalid(format!(
            "member {guarantor} cannot guarantee their own loan"
        )));
    }
    match on_hold {
        Some("") => {
            return Err(CalcError::invalid(format!(
                "member {guarantor} is on hold and cannot guarantee loans"
            )))
        }
        Some(reason) => {
            return Err(CalcError::invalid(format!(
                "member {guarantor} is on hold and cannot guarantee loans: {reason}"
            )))
        }
        None => {}
    }
    if existing.iter().any(|g| &g.guarantor_id == guarantor) {
        return Err(CalcError::invalid(format!(
            "member {guarantor} already guarantees loan {}",
            loan.loan_id
        )));
    }
    if amount > capacity.available {
        return Err(CalcError::invalid(format!(
            "member {guarantor} can guarantee at most {} more",
            capacity.available
        )));
    }
    let covered: Amount = existing.iter().map(|g| g.amount).sum();
    let uncovered = loan.principal.saturating_sub(covered);
    if amount > uncovered {
        return Err(CalcError::invalid(format!(
            "loan {} of {} only needs {uncovered} more in guarantees",
            loan.loan_id, loan.principal
        )));
    }

    let percentage = (amount.value() * Decimal::ONE_HUNDRED)
        .checked_div(loan.principal.value())
        .ok_or_else(|| {
            CalcError::invalid(format!("loan {} has no principal", loan.loan_id))
        })?
        .round_dp(2);
    Ok(Guarantee {
        loan_id: loan.loan_id.clone(),
        guarantor_id: guarantor.clone(),
        amount,
        percentage,
        pledged_on,
    })
}

/// Checks that `loan` has the guarantors the policy asks for.
///
/// # Errors
/// - `CalcError::InvalidInput` if fewer than `minimum` members have pledged.
pub fn check_guarantors(loan: &Loan, guarantees: &[Guarantee], minimum: u32) -> CalcResult<()> {
    let count = guarantees
        .iter()
        .filter(|g| g.loan_id == loan.loan_id)
        .count();
    if count < minimum as usize {
        return Err(CalcError::invalid(format!(
            "loan {} has {count} of the {minimum} guarantors it needs",
            loan.loan_id
        )));
    }
    Ok(())
}
