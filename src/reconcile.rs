//! Matches the ledger's bank transactions against a bank statement.

use crate::model::{Amount, BankTransaction, StatementLine};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The default number of days a statement date may differ from the book date.
pub const DEFAULT_WINDOW_DAYS: i64 = 3;

/// A bank transaction as it affects one account.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BookEntry {
    pub transaction_id: i64,
    pub date: NaiveDate,
    pub reference: String,
    /// Positive for money into the account.
    pub amount: Amount,
}

impl BookEntry {
    /// Views `txn` from the side of `account_id`. Returns `None` if the transaction does not touch
    /// the account. A transfer is money out for its source and money in for its destination.
    pub fn for_account(txn: &BankTransaction, account_id: &str) -> Option<Self> {
        let amount = if txn.account_id == account_id {
            txn.signed_amount()
        } else if txn.destination_account_id.as_deref() == Some(account_id) {
            txn.amount
        } else {
            return None;
        };
        Some(Self {
            transaction_id: txn.id,
            date: txn.transaction_date,
            reference: txn.reference.clone(),
            amount,
        })
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Reference,
    Amount,
}

serde_plain::derive_display_from_serialize!(MatchKind);

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReconciledPair {
    pub transaction_id: i64,
    /// 0-based position of the line in the statement.
    pub line: usize,
    pub kind: MatchKind,
    pub amount: Amount,
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Reconciliation {
    pub matched: Vec<ReconciledPair>,
    pub unmatched_lines: Vec<StatementLine>,
    pub unmatched_entries: Vec<BookEntry>,
    /// Net movement on the statement.
    pub statement_total: Amount,
    /// Net movement of the matched book entries.
    pub matched_total: Amount,
    /// `statement_total - matched_total`; zero when every line was explained.
    pub difference: Amount,
}

impl Reconciliation {
    pub fn is_balanced(&self) -> bool {
        self.difference.is_zero() && self.unmatched_lines.is_empty()
    }
}

/// Matches `lines` against `entries`.
///
/// A line with a reference is first matched to an entry with the same reference (ignoring case)
/// and the same amount. Remaining lines are matched to an entry with the same amount whose date is
/// within `window_days`; the closest date wins and the earliest entry breaks a tie. Each entry is
/// matched at most once.
pub fn reconcile(
    entries: &[BookEntry],
    lines: &[StatementLine],
    window_days: i64,
) -> Reconciliation {
    let mut taken = vec![false; entries.len()];
    let mut line_match: Vec<Option<(usize, MatchKind)>> = vec![None; lines.len()];

    for (li, line) in lines.iter().enumerate() {
        let reference = line.reference.trim();
        if reference.is_empty() {
            continue;
        }
        let found = entries.iter().enumerate().find(|(ei, e)| {
            !taken[*ei]
                && e.amount == line.amount
                && e.reference.trim().eq_ignore_ascii_case(reference)
        });
        if let Some((ei, _)) = found {
            taken[ei] = true;
            line_match[li] = Some((ei, MatchKind::Reference));
        }
    }

    for (li, line) in lines.iter().enumerate() {
        if line_match[li].is_some() {
            continue;
        }
        let found = entries
            .iter()
            .enumerate()
            .filter(|(ei, e)| !taken[*ei] && e.amount == line.amount)
            .map(|(ei, e)| (ei, (e.date - line.date).num_days().abs(), e))
            .filter(|(_, gap, _)| *gap <= window_days)
            .min_by_key(|(_, gap, e)| (*gap, e.date, e.transaction_id));
        if let Some((ei, _, _)) = found {
            taken[ei] = true;
            line_match[li] = Some((ei, MatchKind::Amount));
        }
    }

    let mut result = Reconciliation::default();
    for (li, line) in lines.iter().enumerate() {
        result.statement_total += line.amount;
        match line_match[li] {
            Some((ei, kind)) => {
                let entry = &entries[ei];
                result.matched_total += entry.amount;
                result.matched.push(ReconciledPair {
                    transaction_id: entry.transaction_id,
                    line: li,
                    kind,
                    amount: entry.amount,
                });
            }
            None => result.unmatched_lines.push(line.clone()),
        }
    }
    result.unmatched_entries = entries
        .iter()
        .zip(&taken)
        .filter(|(_, taken)| !**taken)
        .map(|(e, _)| e.clone())
        .collect();
    result.difference = result.statement_total - result.matched_total;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BankTransactionKind;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn entry(id: i64, d: u32, reference: &str, amount: Decimal) -> BookEntry {
        BookEntry {
            transaction_id: id,
            date: date(d),
            reference: reference.to_string(),
            amount: Amount::new(amount),
        }
    }

    fn line(d: u32, reference: &str, amount: Decimal) -> StatementLine {
        StatementLine {
            date: date(d),
            reference: reference.to_string(),
            description: String::new(),
            amount: Amount::new(amount),
        }
    }

    #[test]
    fn test_reference_beats_amount() {
        let entries = vec![
            entry(1, 10, "", dec!(500)),
            entry(2, 12, "DEP-9", dec!(500)),
        ];
        let lines = vec![line(10, "dep-9", dec!(500))];
        let result = reconcile(&entries, &lines, DEFAULT_WINDOW_DAYS);
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.matched[0].transaction_id, 2);
        assert_eq!(result.matched[0].kind, MatchKind::Reference);
        assert_eq!(result.unmatched_entries, vec![entries[0].clone()]);
    }

    #[test]
    fn test_amount_within_window() {
        let entries = vec![
            entry(1, 1, "", dec!(-25)),
            entry(2, 9, "", dec!(-25)),
            entry(3, 6, "", dec!(-25)),
        ];
        let lines = vec![line(8, "", dec!(-25))];
        let result = reconcile(&entries, &lines, DEFAULT_WINDOW_DAYS);
        // Entry 2 is one day off, entry 3 two days; entry 1 is outside the window.
        assert_eq!(result.matched[0].transaction_id, 2);
        assert_eq!(result.matched[0].kind, MatchKind::Amount);
        assert_eq!(result.unmatched_entries.len(), 2);
    }

    #[test]
    fn test_tie_goes_to_earliest_entry() {
        let entries = vec![entry(7, 11, "", dec!(100)), entry(8, 9, "", dec!(100))];
        let lines = vec![line(10, "", dec!(100))];
        let result = reconcile(&entries, &lines, DEFAULT_WINDOW_DAYS);
        assert_eq!(result.matched[0].transaction_id, 8);
    }

    #[test]
    fn test_entries_match_once() {
        let entries = vec![entry(1, 5, "", dec!(100))];
        let lines = vec![line(5, "", dec!(100)), line(5, "", dec!(100))];
        let result = reconcile(&entries, &lines, DEFAULT_WINDOW_DAYS);
        assert_eq!(result.matched.len(), 1);
        assert_eq!(result.unmatched_lines.len(), 1);
        assert_eq!(result.difference.value(), dec!(100));
        assert!(!result.is_balanced());
    }

    #[test]
    fn test_reference_with_wrong_amount_is_not_matched() {
        let entries = vec![entry(1, 5, "CHQ-1", dec!(-300))];
        let lines = vec![line(5, "CHQ-1", dec!(-30))];
        let result = reconcile(&entries, &lines, DEFAULT_WINDOW_DAYS);
        assert!(result.matched.is_empty());
        assert_eq!(result.unmatched_lines.len(), 1);
        assert_eq!(result.unmatched_entries.len(), 1);
    }

    #[test]
    fn test_balanced() {
        let entries = vec![entry(1, 5, "A", dec!(1000)), entry(2, 6, "", dec!(-40))];
        let lines = vec![line(5, "A", dec!(1000)), line(7, "", dec!(-40))];
        let result = reconcile(&entries, &lines, DEFAULT_WINDOW_DAYS);
        assert!(result.is_balanced());
        assert_eq!(result.statement_total.value(), dec!(960));
        assert_eq!(result.matched_total.value(), dec!(960));
    }

    #[test]
    fn test_book_entry_for_account() {
        let txn = BankTransaction {
            id: 4,
            account_id: "ACC-1".to_string(),
            kind: BankTransactionKind::Transfer,
            amount: Amount::new(dec!(250)),
            transaction_date: date(2),
            reference: "TR-1".to_string(),
            description: String::new(),
            destination_account_id: Some("ACC-2".to_string()),
            reconciled_on: None,
        };
        let out = BookEntry::for_account(&txn, "ACC-1").unwrap();
        assert_eq!(out.amount.value(), dec!(-250));
        let incoming = BookEntry::for_account(&txn, "ACC-2").unwrap();
        assert_eq!(incoming.amount.value(), dec!(250));
        assert!(BookEntry::for_account(&txn, "ACC-3").is_none());
    }
}
