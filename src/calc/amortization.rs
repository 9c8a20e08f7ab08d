//! Builds repayment schedules from loan terms.

use crate::calc::{CalcError, CalcResult};
use crate::model::{Amount, InterestMethod, RepaymentSchedule, ScheduleEntry};
use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const MONTHS_PER_YEAR: Decimal = Decimal::from_parts(12, 0, 0, false, 0);

/// The inputs to `amortize`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoanTerms {
    pub principal: Amount,
    /// Annual percentage, e.g. `12.00` for twelve percent a year.
    pub annual_rate: Decimal,
    pub term_months: u32,
    pub disbursement_date: NaiveDate,
    #[serde(default)]
    pub method: InterestMethod,
}

/// Produces the repayment schedule for `terms`.
///
/// - There is one entry per month; entry `k` falls due `k` months after disbursement.
/// - Interest on entry `k` is charged on the balance left after entry `k - 1`.
/// - Every amount is rounded to cents and the last entry takes whatever principal is left, so the
///   principal components add up to exactly the loan principal.
///
/// # Errors
/// - `CalcError::InvalidInput` when the principal is not positive or not in whole cents, the term
///   is zero, the rate is negative, or a due date cannot be represented.
pub fn amortize(terms: &LoanTerms) -> CalcResult<RepaymentSchedule> {
    validate(terms)?;
    let rate = monthly_rate(terms.annual_rate);
    let n = terms.term_months;
    let principal = terms.principal;

    let level = match terms.method {
        InterestMethod::ReducingBalance => level_installment(principal, rate, n)?,
        InterestMethod::EqualPrincipal => Amount::rounded(principal.value() / Decimal::from(n)),
    };

    let mut balance = principal;
    let mut entries = Vec::with_capacity(n as usize);
    for k in 1..=n {
        let due_date = terms
            .disbursement_date
            .checked_add_months(Months::new(k))
            .ok_or_else(|| {
                CalcError::invalid(format!(
                    "installment {k} falls due after the last representable date"
                ))
            })?;

        let interest = Amount::rounded(balance.value() * rate);
        let principal_part = if k == n {
            balance
        } else {
            let planned = match terms.method {
                InterestMethod::ReducingBalance => level - interest,
                InterestMethod::EqualPrincipal => level,
            };
            planned.max(Amount::ZERO).min(balance)
        };

        balance -= principal_part;
        entries.push(ScheduleEntry::new(k, due_date, principal_part, interest));
    }

    Ok(RepaymentSchedule::new(entries))
}

/// Converts an annual percentage into a monthly fraction, e.g. `12` -> `0.01`.
pub fn monthly_rate(annual_rate: Decimal) -> Decimal {
    annual_rate / Decimal::ONE_HUNDRED / MONTHS_PER_YEAR
}

/// The equal monthly installment that repays `principal` over `n` months at `rate` per month.
fn level_installment(principal: Amount, rate: Decimal, n: u32) -> CalcResult<Amount> {
    let p = principal.value();
    if rate.is_zero() {
        return Ok(Amount::rounded(p / Decimal::from(n)));
    }

    let overflow = || CalcError::invalid("the interest rate and term are too large to compute");
    let growth = Decimal::ONE + rate;
    let mut factor = Decimal::ONE;
    for _ in 0..n {
        factor = factor.checked_mul(growth).ok_or_else(overflow)?;
    }

    let numerator = p
        .checked_mul(rate)
        .and_then(|v| v.checked_mul(factor))
        .ok_or_else(overflow)?;
    let installment = numerator
        .checked_div(factor - Decimal::ONE)
        .ok_or_else(overflow)?;
    Ok(Amount::rounded(installment))
}

fn validate(terms: &LoanTerms) -> CalcResult<()> {
    if !terms.principal.is_positive() {
        return Err(CalcError::invalid(format!(
            "the principal must be positive, got {}",
            terms.principal
        )));
    }
    if !terms.principal.is_whole_cents() {
        return Err(CalcError::invalid(format!(
            "the principal must be in whole cents, got {}",
            terms.principal
        )));
    }
    if terms.term_months == 0 {
        return Err(CalcError::invalid("the term must be at least one month"));
    }
    if terms.annual_rate.is_sign_negative() && !terms.annual_rate.is_zero() {
        return Err(CalcError::invalid(format!(
            "the interest rate cannot be negative, got {}",
            terms.annual_rate
        )));
    }
    Ok(())
}
