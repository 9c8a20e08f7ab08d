//! Repayment schedules.

use crate::model::Amount;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The payment state of a single installment.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    #[default]
    Pending,
    Partial,
    Paid,
}

serde_plain::derive_display_from_serialize!(EntryStatus);
serde_plain::derive_fromstr_from_deserialize!(EntryStatus);

/// One installment of a repayment schedule.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScheduleEntry {
    /// 1-based position in the schedule.
    pub installment: u32,
    pub due_date: NaiveDate,
    pub principal: Amount,
    pub interest: Amount,
    pub amount_paid: Amount,
}

impl ScheduleEntry {
    pub fn new(installment: u32, due_date: NaiveDate, principal: Amount, interest: Amount) -> Self {
        Self {
            installment,
            due_date,
            principal,
            interest,
            amount_paid: Amount::ZERO,
        }
    }

    /// Principal plus interest.
    pub fn amount_due(&self) -> Amount {
        self.principal + self.interest
    }

    /// What is still owed on this installment.
    pub fn outstanding(&self) -> Amount {
        self.amount_due().saturating_sub(self.amount_paid)
    }

    pub fn is_paid(&self) -> bool {
        self.outstanding().is_zero()
    }

    pub fn status(&self) -> EntryStatus {
        if self.is_paid() {
            EntryStatus::Paid
        } else if self.amount_paid.is_positive() {
            EntryStatus::Partial
        } else {
            EntryStatus::Pending
        }
    }

    /// An unpaid installment is overdue once its due date is before `as_of`.
    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        !self.is_paid() && self.due_date < as_of
    }

    /// The part of the payments on this installment that went to interest. Payments settle
    /// interest before principal.
    pub fn interest_paid(&self) -> Amount {
        self.amount_paid.min(self.interest)
    }

    /// The part of the payments on this installment that went to principal.
    pub fn principal_paid(&self) -> Amount {
        self.amount_paid.saturating_sub(self.interest).min(self.principal)
    }
}

/// The ordered installments of a loan.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RepaymentSchedule {
    entries: Vec<ScheduleEntry>,
}

impl RepaymentSchedule {
    /// Creates a schedule, ordering the entries by installment number.
    pub fn new(mut entries: Vec<ScheduleEntry>) -> Self {
        entries.sort_by_key(|e| e.installment);
        Self { entries }
    }

    pub fn entries(&self) -> &[ScheduleEntry] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [ScheduleEntry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_principal(&self) -> Amount {
        self.entries.iter().map(|e| e.principal).sum()
    }

    pub fn total_interest(&self) -> Amount {
        self.entries.iter().map(|e| e.interest).sum()
    }

    /// Principal plus interest over the whole term.
    pub fn total_due(&self) -> Amount {
        self.entries.iter().map(|e| e.amount_due()).sum()
    }

    pub fn total_paid(&self) -> Amount {
        self.entries.iter().map(|e| e.amount_paid).sum()
    }

    /// The outstanding balance: principal plus interest less everything paid.
    pub fn outstanding(&self) -> Amount {
        self.entries.iter().map(|e| e.outstanding()).sum()
    }

    /// Principal not yet repaid.
    pub fn outstanding_principal(&self) -> Amount {
        self.entries
            .iter()
            .map(|e| e.principal - e.principal_paid())
            .sum()
    }

    /// Interest collected so far.
    pub fn interest_collected(&self) -> Amount {
        self.entries.iter().map(|e| e.interest_paid()).sum()
    }

    pub fn is_settled(&self) -> bool {
        !self.entries.is_empty() && self.entries.iter().all(|e| e.is_paid())
    }

    /// The earliest unpaid installment.
    pub fn next_due(&self) -> Option<&ScheduleEntry> {
        self.entries
            .iter()
            .filter(|e| !e.is_paid())
            .min_by_key(|e| (e.due_date, e.installment))
    }

    /// Everything still owed on installments that were due before `as_of`.
    pub fn overdue_amount(&self, as_of: NaiveDate) -> Amount {
        self.entries
            .iter()
            .filter(|e| e.is_overdue(as_of))
            .map(|e| e.outstanding())
            .sum()
    }

    /// The final due date of the schedule.
    pub fn maturity_date(&self) -> Option<NaiveDate> {
        self.entries.iter().map(|e| e.due_date).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(installment: u32, month: u32, principal: Amount, interest: Amount) -> ScheduleEntry {
        ScheduleEntry::new(installment, date(2025, month, 15), principal, interest)
    }

    fn schedule() -> RepaymentSchedule {
        RepaymentSchedule::new(vec![
            entry(2, 3, Amount::new(dec!(500)), Amount::new(dec!(5))),
            entry(1, 2, Amount::new(dec!(500)), Amount::new(dec!(10))),
        ])
    }

    #[test]
    fn test_new_orders_by_installment() {
        let s = schedule();
        assert_eq!(s.entries()[0].installment, 1);
        assert_eq!(s.entries()[1].installment, 2);
    }

    #[test]
    fn test_totals() {
        let s = schedule();
        assert_eq!(s.total_principal().value(), dec!(1000));
        assert_eq!(s.total_interest().value(), dec!(15));
        assert_eq!(s.total_due().value(), dec!(1015));
        assert_eq!(s.outstanding().value(), dec!(1015));
        assert!(!s.is_settled());
    }

    #[test]
    fn test_entry_status() {
        let mut e = entry(1, 1, Amount::new(dec!(100)), Amount::new(dec!(1)));
        assert_eq!(e.status(), EntryStatus::Pending);
        e.amount_paid = Amount::new(dec!(50));
        assert_eq!(e.status(), EntryStatus::Partial);
        assert_eq!(e.outstanding().value(), dec!(51));
        e.amount_paid = Amount::new(dec!(101));
        assert_eq!(e.status(), EntryStatus::Paid);
    }

    #[test]
    fn test_interest_is_paid_first() {
        let mut e = entry(1, 1, Amount::new(dec!(100)), Amount::new(dec!(10)));
        e.amount_paid = Amount::new(dec!(4));
        assert_eq!(e.interest_paid().value(), dec!(4));
        assert_eq!(e.principal_paid(), Amount::ZERO);
        e.amount_paid = Amount::new(dec!(30));
        assert_eq!(e.interest_paid().value(), dec!(10));
        assert_eq!(e.principal_paid().value(), dec!(20));
    }

    #[test]
    fn test_overdue_and_next_due() {
        let s = schedule();
        assert_eq!(s.next_due().unwrap().installment, 1);
        assert_eq!(s.overdue_amount(date(2025, 2, 15)), Amount::ZERO);
        assert_eq!(s.overdue_amount(date(2025, 2, 16)).value(), dec!(510));
        assert_eq!(s.overdue_amount(date(2025, 4, 1)).value(), dec!(1015));
        assert_eq!(s.maturity_date(), Some(date(2025, 3, 15)));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(EntryStatus::Partial.to_string(), "partial");
    }
}
