//! The financial calculators. Everything in this module is pure: functions take values and return
//! new values, never touching the database or the clock.
mod allocation;
mod amortization;
mod eligibility;
mod error;
mod guarantee;
mod repayment;
mod shares;
mod statement;

pub use allocation::{allocate, percentages};
pub use amortization::{amortize, monthly_rate, LoanTerms};
pub use eligibility::{
    assess, check_application, loan_charges, Eligibility, LendingPolicy, LoanCharges,
};
pub use error::{CalcError, CalcResult};
pub use guarantee::{check_guarantors, pledge, GuarantorCapacity};
pub use repayment::{
    apply_repayment, close_early, replay_repayments, AppliedRepayment, InstallmentPayment,
};
pub use shares::{basis_snapshot, summarize_members, MemberSummary};
pub use statement::{
    contribution_report, financial_summary, loan_statement, Books, ContributionReport,
    FinancialSummary, LoanStatement,
};
