use crate::model::Amount;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A membership number such as `M-0042`.
///
/// Member identifiers are ordered lexically; the ordering is used to break ties deterministically
/// when the dividend allocator has to pick one member out of several equal ones.
#[derive(Debug, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MemberId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MemberId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().to_string()))
    }
}

impl From<&str> for MemberId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A member of the SACCO.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Member {
    pub member_id: MemberId,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub joined_on: NaiveDate,
    /// A member on hold cannot borrow.
    pub on_hold: bool,
    pub on_hold_reason: String,
}

/// A payment toward a member's share capital.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SharePayment {
    pub member_id: MemberId,
    pub amount: Amount,
    pub paid_on: NaiveDate,
    pub reference: String,
}

/// A member's contribution for one calendar month.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Contribution {
    pub member_id: MemberId,
    pub year: i32,
    /// 1 through 12.
    pub month: u32,
    pub amount: Amount,
    pub paid_on: NaiveDate,
    pub reference: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_id_ordering() {
        let mut ids = vec![
            MemberId::new("M-0010"),
            MemberId::new("M-0002"),
            MemberId::new("M-0001"),
        ];
        ids.sort();
        assert_eq!(ids[0].as_str(), "M-0001");
        assert_eq!(ids[2].as_str(), "M-0010");
    }

    #[test]
    fn test_member_id_from_str_trims() {
        let id = MemberId::from_str("  M-7 ").unwrap();
        assert_eq!(id.to_string(), "M-7");
    }

    #[test]
    fn test_member_id_serializes_as_string() {
        let json = serde_json::to_string(&MemberId::new("M-1")).unwrap();
        assert_eq!(json, "\"M-1\"");
    }
}
