//! Loan charges and borrowing limits.

use crate::calc::shares::MemberSummary;
use crate::calc::{CalcError, CalcResult};
use crate::model::Amount;
use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The lending rules of the SACCO.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LendingPolicy {
    /// A member can borrow up to this many times their total deposits.
    pub multiplier: Decimal,
    pub max_term_months: u32,
    /// When set, members must have paid their full share value before borrowing.
    pub require_full_share_capital: bool,
    pub processing_fee_percentage: Decimal,
    pub insurance_percentage: Decimal,
    /// Pledges a loan needs before it can be approved.
    pub minimum_guarantors: u32,
    /// Calendar months a member must have belonged before borrowing.
    pub minimum_membership_months: u32,
}

/// Fees deducted from a loan at disbursement.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoanCharges {
    pub principal: Amount,
    pub processing_fee: Amount,
    pub insurance_fee: Amount,
    /// What the member receives: the principal less both fees.
    pub disbursed_amount: Amount,
}

/// Computes the fees on `principal`.
///
/// # Errors
/// - `CalcError::InvalidInput` if the principal is not positive, a percentage is negative, or the
///   fees would take the whole principal.
pub fn loan_charges(principal: Amount, policy: &LendingPolicy) -> CalcResult<LoanCharges> {
    if !principal.is_positive() {
        return Err(CalcError::invalid(format!(
            "the principal must be positive, got {principal}"
        )));
    }
    for (name, pct) in [
        ("processing fee", policy.processing_fee_percentage),
        ("insurance", policy.insurance_percentage),
    ] {
        if pct.is_sign_negative() && !pct.is_zero() {
            return Err(CalcError::invalid(format!(
                "the {name} percentage cannot be negative, got {pct}"
            )));
        }
    }

    let processing_fee = principal.percent(policy.processing_fee_percentage);
    let insurance_fee = principal.percent(policy.insurance_percentage);
    let disbursed_amount = principal - processing_fee - insurance_fee;
    if !disbursed_amount.is_positive() {
        return Err(CalcError::invalid(format!(
            "fees of {} would consume the whole principal of {principal}",
            processing_fee + insurance_fee
        )));
    }

    Ok(LoanCharges {
        principal,
        processing_fee,
        insurance_fee,
        disbursed_amount,
    })
}

/// Whether a member may borrow, and how much.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Eligibility {
    pub eligible: bool,
    /// Why the member is not eligible. Empty when eligible.
    pub reasons: Vec<String>,
    pub total_deposits: Amount,
    /// Deposits times the multiplier.
    pub borrowing_limit: Amount,
    /// Principal of loans that are approved or still being repaid.
    pub committed: Amount,
    /// What can still be borrowed: the limit less what is committed, never below zero.
    pub available: Amount,
    pub max_term_months: u32,
    pub minimum_guarantors: u32,
}

/// Assesses whether the member described by `summary` may take a new loan on `as_of`.
///
/// `committed` is the principal of the member's loans that already count against the limit.
/// `on_hold` is the member's hold reason, if any. `joined_on` is when the member joined.
pub fn assess(
    summary: &MemberSummary,
    on_hold: Option<&str>,
    joined_on: NaiveDate,
    committed: Amount,
    policy: &LendingPolicy,
    as_of: NaiveDate,
) -> Eligibility {
    let borrowing_limit = Amount::rounded(summary.total_deposits.value() * policy.multiplier);
    let available = borrowing_limit.saturating_sub(committed);

    let mut reasons = Vec::new();
    match joined_on.checked_add_months(Months::new(policy.minimum_membership_months)) {
        Some(from) if from <= as_of => {}
        Some(from) => reasons.push(format!(
            "the member joined on {joined_on} and cannot borrow before {from}"
        )),
        None => reasons.push(format!(
            "a membership period of {} months cannot be reckoned from {joined_on}",
            policy.minimum_membership_months
        )),
    }
    if let Some(reason) = on_hold {
        if reason.is_empty() {
            reasons.push("the member is on hold".to_string());
        } else {
            reasons.push(format!("the member is on hold: {reason}"));
        }
    }
    if policy.require_full_share_capital && !summary.share_capital_complete() {
        reasons.push(format!(
            "share capital of {} is below the required {}",
            summary.total_share_capital, summary.share_capital_target
        ));
    }
    if !available.is_positive() {
        reasons.push(format!(
            "existing loans of {committed} already use the borrowing limit of {borrowing_limit}"
        ));
    }

    Eligibility {
        eligible: reasons.is_empty(),
        reasons,
        total_deposits: summary.total_deposits,
        borrowing_limit,
        committed,
        available,
        max_term_months: policy.max_term_months,
        minimum_guarantors: policy.minimum_guarantors,
    }
}

/// Checks a specific application against an assessment.
///
/// # Errors
/// - `CalcError::InvalidInput` naming the first rule the application breaks.
pub fn check_application(
    eligibility: &Eligibility,
    principal: Amount,
    term_months: u32,
) -> CalcResult<()> {
    if let Some(reason) = eligibility.reasons.first() {
        return Err(CalcError::invalid(format!(
            "the member is not eligible for a loan: {reason}"
        )));
    }
    if principal > eligibility.available {
        return Err(CalcError::invalid(format!(
            "a loan of {principal} exceeds the {} the member can still borrow",
            eligibility.available
        )));
    }
    if term_months > eligibility.max_term_months {
        return Err(CalcError::invalid(format!(
            "a term of {term_months} months exceeds the maximum of {} months",
            eligibility.max_term_months
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemberId;
    use rust_decimal_macros::dec;

    fn policy() -> LendingPolicy {
        LendingPolicy {
            multiplier: dec!(3),
            max_term_months: 36,
            require_full_share_capital: true,
            processing_fee_percentage: dec!(1),
            insurance_percentage: dec!(1),
            minimum_guarantors: 2,
            minimum_membership_months: 3,
        }
    }

    fn joined() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()
    }

    fn assess_on(
        summary: &MemberSummary,
        on_hold: Option<&str>,
        committed: Amount,
        policy: &LendingPolicy,
    ) -> Eligibility {
        assess(summary, on_hold, joined(), committed, policy, today())
    }

    fn summary(share_capital: Decimal, contributions: Decimal) -> MemberSummary {
        MemberSummary {
            member_id: MemberId::new("M-1"),
            total_share_capital: Amount::new(share_capital),
            share_capital_target: Amount::new(dec!(5000)),
            total_contributions: Amount::new(contributions),
            total_deposits: Amount::new(share_capital + contributions),
            ..MemberSummary::default()
        }
    }

    #[test]
    fn test_loan_charges() {
        let charges = loan_charges(Amount::new(dec!(100000)), &policy()).unwrap();
        assert_eq!(charges.processing_fee.value(), dec!(1000));
        assert_eq!(charges.insurance_fee.value(), dec!(1000));
        assert_eq!(charges.disbursed_amount.value(), dec!(98000));
    }

    #[test]
    fn test_loan_charges_round_to_cents() {
        let mut p = policy();
        p.processing_fee_percentage = dec!(1.5);
        let charges = loan_charges(Amount::new(dec!(333.33)), &p).unwrap();
        assert_eq!(charges.processing_fee.value(), dec!(5.00));
        assert_eq!(charges.insurance_fee.value(), dec!(3.33));
        assert_eq!(charges.disbursed_amount.value(), dec!(325.00));
    }

    #[test]
    fn test_loan_charges_rejects_bad_input() {
        assert!(loan_charges(Amount::ZERO, &policy()).is_err());
        let mut p = policy();
        p.insurance_percentage = dec!(-1);
        assert!(loan_charges(Amount::new(dec!(100)), &p).is_err());
        p.insurance_percentage = dec!(100);
        let e = loan_charges(Amount::new(dec!(100)), &p).unwrap_err();
        assert!(e.to_string().contains("consume"));
    }

    #[test]
    fn test_eligible_member() {
        let e = assess_on(&summary(dec!(5000), dec!(10000)), None, Amount::ZERO, &policy());
        assert!(e.eligible);
        assert_eq!(e.borrowing_limit.value(), dec!(45000));
        assert_eq!(e.available.value(), dec!(45000));
        assert!(check_application(&e, Amount::new(dec!(45000)), 36).is_ok());
    }

    #[test]
    fn test_committed_loans_reduce_available() {
        let e = assess_on(
            &summary(dec!(5000), dec!(10000)),
            None,
            Amount::new(dec!(30000)),
            &policy(),
        );
        assert!(e.eligible);
        assert_eq!(e.available.value(), dec!(15000));
        let err = check_application(&e, Amount::new(dec!(15000.01)), 12).unwrap_err();
        assert!(err.to_string().contains("can still borrow"));
    }

    #[test]
    fn test_limit_exhausted() {
        let e = assess_on(
            &summary(dec!(5000), dec!(0)),
            None,
            Amount::new(dec!(20000)),
            &policy(),
        );
        assert!(!e.eligible);
        assert_eq!(e.available, Amount::ZERO);
    }

    #[test]
    fn test_on_hold() {
        let e = assess_on(
            &summary(dec!(5000), dec!(1000)),
            Some("arrears"),
            Amount::ZERO,
            &policy(),
        );
        assert!(!e.eligible);
        assert_eq!(e.reasons, vec!["the member is on hold: arrears".to_string()]);
        assert!(check_application(&e, Amount::new(dec!(1)), 1).is_err());
    }

    #[test]
    fn test_incomplete_share_capital() {
        let e = assess_on(&summary(dec!(4999.99), dec!(1000)), None, Amount::ZERO, &policy());
        assert!(!e.eligible);
        assert!(e.reasons[0].contains("share capital"));

        let mut relaxed = policy();
        relaxed.require_full_share_capital = false;
        let e = assess_on(&summary(dec!(4999.99), dec!(1000)), None, Amount::ZERO, &relaxed);
        assert!(e.eligible);
    }

    #[test]
    fn test_membership_period() {
        let s = summary(dec!(5000), dec!(1000));
        let joined = NaiveDate::from_ymd_opt(2024, 11, 30).unwrap();
        let feb = NaiveDate::from_ymd_opt(2025, 2, 27).unwrap();
        let e = assess(&s, None, joined, Amount::ZERO, &policy(), feb);
        assert!(!e.eligible);
        assert_eq!(
            e.reasons,
            vec!["the member joined on 2024-11-30 and cannot borrow before 2025-02-28".to_string()]
        );
        let err = check_application(&e, Amount::new(dec!(100)), 6).unwrap_err();
        assert!(err.to_string().contains("cannot borrow before"));

        let e = assess(&s, None, joined, Amount::ZERO, &policy(), feb.succ_opt().unwrap());
        assert!(e.eligible);

        let mut open_door = policy();
        open_door.minimum_membership_months = 0;
        assert!(assess(&s, None, feb, Amount::ZERO, &open_door, feb).eligible);
    }

    #[test]
    fn test_term_too_long() {
        let e = assess_on(&summary(dec!(5000), dec!(0)), None, Amount::ZERO, &policy());
        let err = check_application(&e, Amount::new(dec!(100)), 37).unwrap_err();
        assert!(err.to_string().contains("maximum of 36 months"));
    }
}
