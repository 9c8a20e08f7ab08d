use crate::model::{Amount, MemberId};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What a member's dividend is proportional to.
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
#[serde(rename_all = "lowercase")]
pub enum DividendBasis {
    /// Share capital only.
    Shares,
    /// Monthly contributions only.
    Deposits,
    /// Share capital plus monthly contributions.
    #[default]
    Both,
}

serde_plain::derive_display_from_serialize!(DividendBasis);
serde_plain::derive_fromstr_from_deserialize!(DividendBasis);

/// A single dividend payout event.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DividendDistribution {
    pub distribution_id: String,
    pub distributed_on: NaiveDate,
    /// Balances are taken as of the end of this day.
    pub snapshot_date: NaiveDate,
    pub pool: Amount,
    pub basis: DividendBasis,
    /// Where the money came from, e.g. "Interest Income".
    pub source: String,
    pub member_dividends: Vec<MemberDividend>,
}

impl DividendDistribution {
    pub fn total_allocated(&self) -> Amount {
        self.member_dividends.iter().map(|d| d.amount).sum()
    }
}

/// One member's share of a distribution.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MemberDividend {
    pub member_id: MemberId,
    /// The member's share capital and/or deposits at the snapshot date.
    pub basis_amount: Amount,
    pub amount: Amount,
    /// Percentage of the pool, two decimal places.
    pub percentage: Decimal,
}
