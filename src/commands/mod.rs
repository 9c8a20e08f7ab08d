//! Command handlers for the sacco CLI.
//!
//! Each handler takes the loaded `Config` and its parsed arguments and returns an `Out`. Errors
//! leave a handler tagged with an `ErrorType`.

mod bank;
mod books;
mod dividends;
mod init;
mod loans;
mod members;
mod reports;

use crate::calc::{CalcError, CalcResult};
use crate::error::{ErrorType, IntoResult};
use crate::model::Amount;
use crate::Result;
use serde::Serialize;
use std::fmt::Debug;
use tracing::info;

pub use bank::{bank_add_account, bank_reconcile, bank_record};
pub use books::{expense_list, expense_record, income_list, income_record, Ledger};
pub use dividends::{dividend_distribute, dividend_show};
pub use init::{backup, init};
pub use loans::{
    loan_apply, loan_approve, loan_default, loan_disburse, loan_eligibility, loan_guarantor_add,
    loan_guarantor_list, loan_list, loan_reject, loan_repay, loan_schedule, loan_settle,
    loan_statement, Disbursement, LoanApplication, LoanGuarantees, RepaymentOutcome,
};
pub use members::{
    contribute, member_add, member_hold, member_list, member_release, member_show, share_add,
    MemberDetails, MemberOverview,
};
pub use reports::{report_contributions, report_summary};

/// The output type for a command: a message for the person at the terminal and, optionally,
/// structured data for whoever consumes stdout.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    message: String,
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Logs the message with `info!` and prints the structured data, if any, to stdout as JSON.
    pub fn print(&self) -> Result<()> {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            let json = serde_json::to_string_pretty(structure)
                .map_err(anyhow::Error::from)
                .pub_result(ErrorType::Io)?;
            println!("{json}");
        }
        Ok(())
    }
}

/// Tags a calculator error. An overpayment gets a hint about the early-closure path.
fn calc<T>(result: CalcResult<T>) -> Result<T> {
    result
        .map_err(|e| match e {
            CalcError::Overpayment { outstanding, .. } => anyhow::Error::new(e).context(format!(
                "Use 'sacco loan settle' to pay off the balance of {outstanding} early"
            )),
            e => anyhow::Error::new(e),
        })
        .pub_result(ErrorType::Calculation)
}

/// Refuses amounts that are not positive or carry fractions of a cent.
fn require_money(amount: Amount, what: &str) -> Result<()> {
    if !amount.is_positive() || !amount.is_whole_cents() {
        return Err(crate::error::tagged(
            ErrorType::Request,
            format!("The {what} must be a positive amount in whole cents, got {amount}"),
        ));
    }
    Ok(())
}
