//! These structs provide the CLI interface for the sacco CLI.

use crate::model::{
    Amount, BankTransactionKind, DividendBasis, ExpenseCategory, IncomeCategory, InterestMethod,
    MemberId,
};
use crate::reconcile::DEFAULT_WINDOW_DAYS;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// sacco: the books of a savings and credit cooperative.
///
/// Keeps members, share capital, monthly contributions, loans, dividends, bank accounts and the
/// SACCO's own income and expenses in a local SQLite database under the SACCO home directory.
/// Every command prints a short message to stderr and its result as JSON to stdout.
#[derive(Debug, Parser, Clone)]
#[command(name = "sacco", version)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the SACCO home directory, its config.json and an empty database.
    ///
    /// Run this once. The policy block of config.json (share value, interest rate, fees and so
    /// on) starts with defaults that you can edit afterwards.
    Init(InitArgs),
    /// Write a copy of the database to the backups directory.
    Backup,
    /// Add, list and inspect members.
    Member(MemberArgs),
    /// Record share capital payments.
    Share(ShareArgs),
    /// Record a member's monthly contribution.
    Contribute(ContributeArgs),
    /// Loan applications, disbursements and repayments.
    Loan(LoanArgs),
    /// Distribute dividends to members.
    Dividend(DividendArgs),
    /// SACCO bank accounts and reconciliation.
    Bank(BankArgs),
    /// The SACCO's operating expenses.
    Expense(ExpenseArgs),
    /// Income other than loan interest and fees, e.g. membership fees or grants.
    Income(IncomeArgs),
    /// SACCO-wide reports.
    Report(ReportArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where the SACCO's data and configuration are held. Defaults to ~/sacco
    #[arg(long, env = "SACCO_HOME", default_value_t = default_sacco_home())]
    sacco_home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, sacco_home: PathBuf) -> Self {
        Self {
            log_level,
            sacco_home: sacco_home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn sacco_home(&self) -> &DisplayPath {
        &self.sacco_home
    }
}

/// Args for `sacco init`.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The name of the SACCO, e.g. "Umoja Teachers SACCO".
    #[arg(long)]
    pub name: String,
}

#[derive(Debug, Parser, Clone)]
pub struct MemberArgs {
    #[command(subcommand)]
    pub command: MemberSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum MemberSubcommand {
    /// Register a new member.
    Add(MemberAddArgs),
    /// List every member with their savings totals.
    List,
    /// Show one member's savings position and loans.
    Show(MemberIdArgs),
    /// Put a member on hold. A member on hold cannot apply for loans.
    Hold(MemberHoldArgs),
    /// Take a member off hold.
    Release(MemberIdArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct MemberAddArgs {
    /// The membership number, e.g. M-0042.
    pub member_id: MemberId,

    #[arg(long)]
    pub name: String,

    #[arg(long, default_value = "")]
    pub email: String,

    #[arg(long, default_value = "")]
    pub phone: String,

    /// Defaults to today.
    #[arg(long)]
    pub joined_on: Option<NaiveDate>,
}

#[derive(Debug, Parser, Clone)]
pub struct MemberIdArgs {
    pub member_id: MemberId,
}

#[derive(Debug, Parser, Clone)]
pub struct MemberHoldArgs {
    pub member_id: MemberId,

    #[arg(long, default_value = "")]
    pub reason: String,
}

#[derive(Debug, Parser, Clone)]
pub struct ShareArgs {
    #[command(subcommand)]
    pub command: ShareSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ShareSubcommand {
    /// Record a payment toward a member's share capital.
    Add(PaymentArgs),
}

/// A dated payment by a member.
#[derive(Debug, Parser, Clone)]
pub struct PaymentArgs {
    pub member_id: MemberId,

    pub amount: Amount,

    /// Defaults to today.
    #[arg(long)]
    pub paid_on: Option<NaiveDate>,

    /// A receipt or M-Pesa reference.
    #[arg(long, default_value = "")]
    pub reference: String,
}

#[derive(Debug, Parser, Clone)]
pub struct ContributeArgs {
    #[clap(flatten)]
    pub payment: PaymentArgs,

    /// The year the contribution is for. Defaults to the year of the payment.
    #[arg(long)]
    pub year: Option<i32>,

    /// The month (1-12) the contribution is for. Defaults to the month of the payment.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub month: Option<u32>,
}

#[derive(Debug, Parser, Clone)]
pub struct LoanArgs {
    #[command(subcommand)]
    pub command: LoanSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum LoanSubcommand {
    /// Apply for a loan on behalf of a member.
    Apply(LoanApplyArgs),
    /// Show how much a member can borrow.
    Eligibility(MemberIdArgs),
    /// List loans, optionally for one member.
    List(LoanListArgs),
    /// Add or list the members guaranteeing a loan.
    Guarantor(GuarantorArgs),
    /// Approve an applied loan. The member must still be eligible and the loan must have the
    /// guarantors the policy asks for.
    Approve(LoanDateArgs),
    /// Reject an applied loan.
    Reject(LoanRejectArgs),
    /// Pay out an approved loan and fix its repayment schedule.
    Disburse(LoanDateArgs),
    /// Record a repayment. Payments go to the oldest unpaid installment first.
    Repay(LoanPaymentArgs),
    /// Pay off a loan early. Any amount above the balance is reported as a refund.
    Settle(LoanPaymentArgs),
    /// Mark a loan as defaulted.
    Default(LoanDateArgs),
    /// Show a loan's repayment schedule, or the projected one if it has not been disbursed.
    Schedule(LoanIdArgs),
    /// Show a loan's position on a given day.
    Statement(LoanStatementArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct LoanApplyArgs {
    pub member_id: MemberId,

    /// The principal requested.
    pub amount: Amount,

    /// The number of monthly installments.
    #[arg(long)]
    pub term_months: u32,

    #[arg(long, default_value = "")]
    pub purpose: String,

    /// Annual interest rate in percent. Defaults to the policy rate.
    #[arg(long)]
    pub rate: Option<Decimal>,

    /// Defaults to the policy method.
    #[arg(long, value_enum)]
    pub method: Option<InterestMethod>,

    /// Defaults to today.
    #[arg(long)]
    pub applied_on: Option<NaiveDate>,
}

#[derive(Debug, Parser, Clone)]
pub struct LoanListArgs {
    #[arg(long)]
    pub member_id: Option<MemberId>,
}

#[derive(Debug, Parser, Clone)]
pub struct LoanIdArgs {
    pub loan_id: String,
}

#[derive(Debug, Parser, Clone)]
pub struct LoanDateArgs {
    pub loan_id: String,

    /// Defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Parser, Clone)]
pub struct GuarantorArgs {
    #[command(subcommand)]
    pub command: GuarantorSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum GuarantorSubcommand {
    /// Pledge part of a member's deposits as security for a loan that awaits approval.
    Add(GuarantorAddArgs),
    /// List the pledges made for a loan.
    List(LoanIdArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct GuarantorAddArgs {
    pub loan_id: String,

    /// The guaranteeing member.
    pub member_id: MemberId,

    /// The amount guaranteed. At most what the member has not already pledged.
    pub amount: Amount,

    /// Defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Parser, Clone)]
pub struct LoanRejectArgs {
    pub loan_id: String,

    #[arg(long)]
    pub reason: String,
}

#[derive(Debug, Parser, Clone)]
pub struct LoanPaymentArgs {
    pub loan_id: String,

    pub amount: Amount,

    /// Defaults to today.
    #[arg(long)]
    pub paid_on: Option<NaiveDate>,

    #[arg(long, default_value = "")]
    pub reference: String,
}

#[derive(Debug, Parser, Clone)]
pub struct LoanStatementArgs {
    pub loan_id: String,

    /// Defaults to today.
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Parser, Clone)]
pub struct DividendArgs {
    #[command(subcommand)]
    pub command: DividendSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum DividendSubcommand {
    /// Split a pool of money among members in proportion to their holdings.
    Distribute(DividendDistributeArgs),
    /// Show one distribution, or all of them.
    Show(DividendShowArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct DividendDistributeArgs {
    /// The amount to distribute.
    pub pool: Amount,

    /// Holdings are taken as of the end of this day. Defaults to today.
    #[arg(long)]
    pub snapshot_date: Option<NaiveDate>,

    /// Defaults to the policy basis.
    #[arg(long, value_enum)]
    pub basis: Option<DividendBasis>,

    #[arg(long, default_value = "Interest Income")]
    pub source: String,
}

#[derive(Debug, Parser, Clone)]
pub struct DividendShowArgs {
    pub distribution_id: Option<String>,
}

#[derive(Debug, Parser, Clone)]
pub struct BankArgs {
    #[command(subcommand)]
    pub command: BankSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum BankSubcommand {
    /// Register a SACCO bank account.
    AddAccount(BankAccountArgs),
    /// Record a deposit, withdrawal, transfer, interest or fee.
    Record(BankRecordArgs),
    /// Match a bank statement CSV against the recorded transactions.
    Reconcile(BankReconcileArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct BankAccountArgs {
    #[arg(long)]
    pub bank_name: String,

    #[arg(long)]
    pub account_name: String,

    #[arg(long)]
    pub account_number: String,

    #[arg(long, default_value = "0")]
    pub opening_balance: Amount,
}

#[derive(Debug, Parser, Clone)]
pub struct BankRecordArgs {
    pub account_id: String,

    #[arg(value_enum)]
    pub kind: BankTransactionKind,

    /// Always positive; the kind decides the direction.
    pub amount: Amount,

    /// The destination account of a transfer.
    #[arg(long)]
    pub to: Option<String>,

    /// Defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,

    #[arg(long, default_value = "")]
    pub reference: String,

    #[arg(long, default_value = "")]
    pub description: String,
}

#[derive(Debug, Parser, Clone)]
pub struct BankReconcileArgs {
    pub account_id: String,

    /// A CSV file with the columns date,reference,description,amount. Amounts are negative for
    /// money leaving the account.
    pub statement: PathBuf,

    /// How many days a statement date may differ from the recorded date.
    #[arg(long, default_value_t = DEFAULT_WINDOW_DAYS)]
    pub window_days: i64,

    /// The reconciliation date. Defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Parser, Clone)]
pub struct ExpenseArgs {
    #[command(subcommand)]
    pub command: ExpenseSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ExpenseSubcommand {
    /// Record an expense paid by the SACCO.
    Record(ExpenseRecordArgs),
    /// List expenses with totals per category.
    List,
}

#[derive(Debug, Parser, Clone)]
pub struct ExpenseRecordArgs {
    #[arg(value_enum)]
    pub category: ExpenseCategory,

    pub amount: Amount,

    /// Charged by the bank or mobile money provider on top of the amount.
    #[arg(long, default_value = "0")]
    pub transaction_cost: Amount,

    /// Defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,

    #[arg(long, default_value = "")]
    pub description: String,

    #[arg(long, default_value = "")]
    pub reference: String,
}

#[derive(Debug, Parser, Clone)]
pub struct IncomeArgs {
    #[command(subcommand)]
    pub command: IncomeSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum IncomeSubcommand {
    /// Record income received by the SACCO.
    Record(IncomeRecordArgs),
    /// List other income with totals per category.
    List,
}

#[derive(Debug, Parser, Clone)]
pub struct IncomeRecordArgs {
    #[arg(value_enum)]
    pub category: IncomeCategory,

    pub amount: Amount,

    /// Defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,

    #[arg(long, default_value = "")]
    pub description: String,

    #[arg(long, default_value = "")]
    pub reference: String,
}

#[derive(Debug, Parser, Clone)]
pub struct ReportArgs {
    #[command(subcommand)]
    pub command: ReportSubcommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ReportSubcommand {
    /// The SACCO's financial position.
    Summary(ReportSummaryArgs),
    /// Contributions for one month compared with the month before.
    Contributions(ReportContributionsArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct ReportSummaryArgs {
    /// Defaults to today.
    #[arg(long)]
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Parser, Clone)]
pub struct ReportContributionsArgs {
    #[arg(long)]
    pub year: i32,

    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub month: u32,
}

fn default_sacco_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("sacco"),
        None => {
            error!(
                "Unable to find your home directory. Provide --sacco-home or SACCO_HOME instead \
                of relying on the default location."
            );
            PathBuf::from("sacco")
        }
    })
}

/// A `PathBuf` that clap can show as a default value.
#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}
