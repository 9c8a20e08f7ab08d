//! Loans and their status progression.

use crate::model::{Amount, MemberId};
use anyhow::bail;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where a loan is in its life.
///
/// ```text
/// Applied -> Approved -> Disbursed -> Repaying -> Closed
///    |                       |           |
///    v                       |           +------> Defaulted
/// Rejected                   +--> Closed | Defaulted
/// ```
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    #[default]
    Applied,
    Approved,
    Rejected,
    Disbursed,
    Repaying,
    Closed,
    Defaulted,
}

serde_plain::derive_display_from_serialize!(LoanStatus);
serde_plain::derive_fromstr_from_deserialize!(LoanStatus);

impl LoanStatus {
    /// True when no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoanStatus::Rejected | LoanStatus::Closed | LoanStatus::Defaulted
        )
    }

    /// True for loans that have money out with the member.
    pub fn is_active(&self) -> bool {
        matches!(self, LoanStatus::Disbursed | LoanStatus::Repaying)
    }

    /// True for loans that count against a member's borrowing limit.
    pub fn counts_against_limit(&self) -> bool {
        matches!(
            self,
            LoanStatus::Approved | LoanStatus::Disbursed | LoanStatus::Repaying
        )
    }

    /// True for loans whose guarantors are still on the hook.
    pub fn binds_guarantors(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(&self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        matches!(
            (self, next),
            (Applied, Approved)
                | (Applied, Rejected)
                | (Approved, Disbursed)
                | (Disbursed, Repaying)
                | (Disbursed, Closed)
                | (Disbursed, Defaulted)
                | (Repaying, Closed)
                | (Repaying, Defaulted)
        )
    }

    /// Returns `next` if the move is allowed, otherwise an error naming both states.
    pub fn transition(self, next: LoanStatus) -> crate::Result<LoanStatus> {
        if !self.can_transition_to(next) {
            bail!("A loan cannot move from '{self}' to '{next}'")
        }
        Ok(next)
    }
}

/// How interest and principal are spread over the installments.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum InterestMethod {
    /// Equal installments; interest on the declining balance.
    #[default]
    ReducingBalance,
    /// Equal principal each month; interest on the declining balance.
    EqualPrincipal,
}

serde_plain::derive_display_from_serialize!(InterestMethod);
serde_plain::derive_fromstr_from_deserialize!(InterestMethod);

/// A member loan as stored in the ledger.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Loan {
    pub loan_id: String,
    pub member_id: MemberId,
    pub principal: Amount,
    /// Annual percentage, e.g. `12.00`.
    pub annual_rate: Decimal,
    pub term_months: u32,
    pub interest_method: InterestMethod,
    pub purpose: String,
    pub status: LoanStatus,
    pub applied_on: NaiveDate,
    pub approved_on: Option<NaiveDate>,
    pub disbursed_on: Option<NaiveDate>,
    pub closed_on: Option<NaiveDate>,
    pub processing_fee: Amount,
    pub insurance_fee: Amount,
    pub rejection_reason: String,
    /// Incremented on every write; used to detect concurrent updates.
    pub version: i64,
}

impl Loan {
    /// The amount actually paid out to the member.
    pub fn disbursed_amount(&self) -> Amount {
        self.principal - self.processing_fee - self.insurance_fee
    }

    /// Fees retained by the SACCO at disbursement.
    pub fn fees(&self) -> Amount {
        self.processing_fee + self.insurance_fee
    }
}

/// A payment received against a loan.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Repayment {
    pub loan_id: String,
    /// The amount received.
    pub amount: Amount,
    /// The part that went to installments.
    pub applied: Amount,
    /// The part left over: an overpayment within tolerance, or a refund on early closure.
    pub surplus: Amount,
    pub paid_on: NaiveDate,
    pub reference: String,
    pub early_closure: bool,
}

/// A member's pledge of their deposits as security for another member's loan.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Guarantee {
    pub loan_id: String,
    pub guarantor_id: MemberId,
    pub amount: Amount,
    /// The share of the loan's principal covered by this pledge.
    pub percentage: Decimal,
    pub pledged_on: NaiveDate,
}
