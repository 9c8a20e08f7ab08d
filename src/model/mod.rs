//! Types that represent the ledger's data model, such as `Member`, `Loan` and `Amount`.
mod amount;
mod bank;
mod books;
mod dividend;
mod loan;
mod member;
mod schedule;

pub use amount::{round_currency, Amount, AmountError, CURRENCY_DP};
pub use bank::{BankAccount, BankTransaction, BankTransactionKind, StatementLine};
pub use books::{Expense, ExpenseCategory, IncomeCategory, OtherIncome};
pub use dividend::{DividendBasis, DividendDistribution, MemberDividend};
pub use loan::{Guarantee, InterestMethod, Loan, LoanStatus, Repayment};
pub use member::{Contribution, Member, MemberId, SharePayment};
pub use schedule::{EntryStatus, RepaymentSchedule, ScheduleEntry};
