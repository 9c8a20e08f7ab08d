//! Share capital and contribution totals per member.

use crate::calc::{allocation, CalcError, CalcResult};
use crate::model::{Amount, Contribution, DividendBasis, MemberId, SharePayment};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A member's savings position.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MemberSummary {
    pub member_id: MemberId,
    pub total_share_capital: Amount,
    /// The share value every member is expected to pay up.
    pub share_capital_target: Amount,
    /// Share capital paid as a percentage of the target, at most 100.
    pub share_completion_percentage: Decimal,
    /// Whole shares held.
    pub number_of_shares: Decimal,
    pub total_contributions: Amount,
    pub current_year_contributions: Amount,
    pub previous_year_contributions: Amount,
    /// Share capital plus contributions.
    pub total_deposits: Amount,
    /// Share capital as a percentage of the SACCO's total share capital.
    pub share_capital_percentage: Decimal,
    /// Total deposits as a percentage of the SACCO's total deposits.
    pub deposit_percentage: Decimal,
}

impl MemberSummary {
    /// True once the member has paid the full share value.
    pub fn share_capital_complete(&self) -> bool {
        self.total_share_capital >= self.share_capital_target
    }
}

/// Builds a summary for each member in `members`, with `year` as the current year.
///
/// Payments by members not in `members` are ignored. The ownership percentages are taken across
/// the listed members.
///
/// # Errors
/// - `CalcError::InvalidInput` if `share_value` is not positive.
pub fn summarize_members(
    members: &[MemberId],
    shares: &[SharePayment],
    contributions: &[Contribution],
    share_value: Amount,
    year: i32,
) -> CalcResult<Vec<MemberSummary>> {
    if !share_value.is_positive() {
        return Err(CalcError::invalid(format!(
            "the share value must be positive, got {share_value}"
        )));
    }

    let mut summaries: BTreeMap<MemberId, MemberSummary> = members
        .iter()
        .map(|id| {
            let summary = MemberSummary {
                member_id: id.clone(),
                share_capital_target: share_value,
                ..MemberSummary::default()
            };
            (id.clone(), summary)
        })
        .collect();

    for payment in shares {
        if let Some(summary) = summaries.get_mut(&payment.member_id) {
            summary.total_share_capital += payment.amount;
        }
    }

    for contribution in contributions {
        if let Some(summary) = summaries.get_mut(&contribution.member_id) {
            summary.total_contributions += contribution.amount;
            if contribution.year == year {
                summary.current_year_contributions += contribution.amount;
            } else if contribution.year == year - 1 {
                summary.previous_year_contributions += contribution.amount;
            }
        }
    }

    for summary in summaries.values_mut() {
        let capital = summary.total_share_capital.value();
        let completion = capital * Decimal::ONE_HUNDRED / share_value.value();
        summary.share_completion_percentage =
            crate::model::round_currency(completion.min(Decimal::ONE_HUNDRED));
        summary.number_of_shares = (capital / share_value.value()).floor();
        summary.total_deposits = summary.total_share_capital + summary.total_contributions;
    }

    let capital: BTreeMap<MemberId, Amount> = summaries
        .iter()
        .map(|(id, s)| (id.clone(), s.total_share_capital))
        .collect();
    let deposits: BTreeMap<MemberId, Amount> = summaries
        .iter()
        .map(|(id, s)| (id.clone(), s.total_deposits))
        .collect();
    let capital_pct = allocation::percentages(&capital);
    let deposit_pct = allocation::percentages(&deposits);

    Ok(summaries
        .into_values()
        .map(|mut s| {
            s.share_capital_percentage = capital_pct[&s.member_id];
            s.deposit_percentage = deposit_pct[&s.member_id];
            s
        })
        .collect())
}

/// Each member's dividend basis as of the end of `as_of`.
///
/// Every id in `members` appears in the result, with zero if nothing was paid by `as_of`.
pub fn basis_snapshot(
    members: &[MemberId],
    basis: DividendBasis,
    as_of: NaiveDate,
    shares: &[SharePayment],
    contributions: &[Contribution],
) -> BTreeMap<MemberId, Amount> {
    let mut snapshot: BTreeMap<MemberId, Amount> =
        members.iter().map(|id| (id.clone(), Amount::ZERO)).collect();

    if matches!(basis, DividendBasis::Shares | DividendBasis::Both) {
        for payment in shares.iter().filter(|p| p.paid_on <= as_of) {
            if let Some(total) = snapshot.get_mut(&payment.member_id) {
                *total += payment.amount;
            }
        }
    }

    if matches!(basis, DividendBasis::Deposits | DividendBasis::Both) {
        for contribution in contributions.iter().filter(|c| c.paid_on <= as_of) {
            if let Some(total) = snapshot.get_mut(&contribution.member_id) {
                *total += contribution.amount;
            }
        }
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn share(id: &str, amount: Decimal, paid_on: NaiveDate) -> SharePayment {
        SharePayment {
            member_id: MemberId::new(id),
            amount: Amount::new(amount),
            paid_on,
            reference: String::new(),
        }
    }

    fn contribution(id: &str, year: i32, month: u32, amount: Decimal) -> Contribution {
        Contribution {
            member_id: MemberId::new(id),
            year,
            month,
            amount: Amount::new(amount),
            paid_on: date(year, month, 5),
            reference: String::new(),
        }
    }

    fn members() -> Vec<MemberId> {
        vec![MemberId::new("A"), MemberId::new("B")]
    }

    fn fixtures() -> (Vec<SharePayment>, Vec<Contribution>) {
        let shares = vec![
            share("A", dec!(3000), date(2024, 1, 10)),
            share("A", dec!(2000), date(2025, 2, 10)),
            share("B", dec!(1000), date(2024, 6, 1)),
            share("Z", dec!(9999), date(2024, 6, 1)),
        ];
        let contributions = vec![
            contribution("A", 2024, 12, dec!(1000)),
            contribution("A", 2025, 1, dec!(1000)),
            contribution("B", 2025, 1, dec!(1500)),
            contribution("B", 2023, 1, dec!(500)),
        ];
        (shares, contributions)
    }

    #[test]
    fn test_summaries() {
        let (shares, contributions) = fixtures();
        let summaries = summarize_members(
            &members(),
            &shares,
            &contributions,
            Amount::new(dec!(5000)),
            2025,
        )
        .unwrap();
        assert_eq!(summaries.len(), 2);

        let a = &summaries[0];
        assert_eq!(a.member_id.as_str(), "A");
        assert_eq!(a.total_share_capital.value(), dec!(5000));
        assert_eq!(a.share_completion_percentage, dec!(100));
        assert!(a.share_capital_complete());
        assert_eq!(a.number_of_shares, dec!(1));
        assert_eq!(a.total_contributions.value(), dec!(2000));
        assert_eq!(a.current_year_contributions.value(), dec!(1000));
        assert_eq!(a.previous_year_contributions.value(), dec!(1000));
        assert_eq!(a.total_deposits.value(), dec!(7000));

        let b = &summaries[1];
        assert_eq!(b.share_completion_percentage, dec!(20));
        assert!(!b.share_capital_complete());
        assert_eq!(b.number_of_shares, dec!(0));
        assert_eq!(b.previous_year_contributions, Amount::ZERO);
        assert_eq!(b.total_deposits.value(), dec!(3000));
    }

    #[test]
    fn test_ownership_percentages() {
        let (shares, contributions) = fixtures();
        let summaries = summarize_members(
            &members(),
            &shares,
            &contributions,
            Amount::new(dec!(5000)),
            2025,
        )
        .unwrap();
        assert_eq!(summaries[0].share_capital_percentage, dec!(83.33));
        assert_eq!(summaries[1].share_capital_percentage, dec!(16.67));
        assert_eq!(summaries[0].deposit_percentage, dec!(70));
        assert_eq!(summaries[1].deposit_percentage, dec!(30));
    }

    #[test]
    fn test_completion_is_capped() {
        let shares = vec![share("A", dec!(12000), date(2024, 1, 1))];
        let summaries =
            summarize_members(&members(), &shares, &[], Amount::new(dec!(5000)), 2025).unwrap();
        assert_eq!(summaries[0].share_completion_percentage, dec!(100));
        assert_eq!(summaries[0].number_of_shares, dec!(2));
    }

    #[test]
    fn test_rejects_zero_share_value() {
        let e = summarize_members(&members(), &[], &[], Amount::ZERO, 2025).unwrap_err();
        assert!(matches!(e, CalcError::InvalidInput(_)));
    }

    #[test]
    fn test_snapshot_by_basis() {
        let (shares, contributions) = fixtures();
        let as_of = date(2024, 12, 31);

        let by_shares =
            basis_snapshot(&members(), DividendBasis::Shares, as_of, &shares, &contributions);
        assert_eq!(by_shares[&MemberId::new("A")].value(), dec!(3000));
        assert_eq!(by_shares[&MemberId::new("B")].value(), dec!(1000));
        assert!(!by_shares.contains_key(&MemberId::new("Z")));

        let by_deposits =
            basis_snapshot(&members(), DividendBasis::Deposits, as_of, &shares, &contributions);
        assert_eq!(by_deposits[&MemberId::new("A")].value(), dec!(1000));
        assert_eq!(by_deposits[&MemberId::new("B")].value(), dec!(500));

        let both = basis_snapshot(&members(), DividendBasis::Both, as_of, &shares, &contributions);
        assert_eq!(both[&MemberId::new("A")].value(), dec!(4000));
        assert_eq!(both[&MemberId::new("B")].value(), dec!(1500));
    }
}
