//! Shared test utilities for creating test environments.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::model::{Amount, Contribution, Guarantee, Member, MemberId, SharePayment};
use crate::Config;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use std::str::FromStr;
use tempfile::TempDir;

/// A SACCO home in a temporary directory with the default policy. Holds the `TempDir` to keep the
/// directory alive for the duration of the test.
pub struct TestEnv {
    _temp_dir: TempDir,
    config: Config,
}

impl TestEnv {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("sacco");
        let config = Config::create(&root, "Test SACCO").await.unwrap();
        Self {
            _temp_dir: temp_dir,
            config,
        }
    }

    pub fn config(&self) -> Config {
        self.config.clone()
    }

    /// Adds a member who joined on 2024-01-01.
    pub async fn add_member(&self, member_id: &str) -> MemberId {
        let member_id = MemberId::new(member_id);
        self.config
            .db()
            .insert_member(&Member {
                member_id: member_id.clone(),
                full_name: format!("Member {member_id}"),
                email: String::new(),
                phone: String::new(),
                joined_on: date("2024-01-01"),
                on_hold: false,
                on_hold_reason: String::new(),
            })
            .await
            .unwrap();
        member_id
    }

    pub async fn pay_shares(&self, member_id: &str, amount: &str, paid_on: &str) {
        self.config
            .db()
            .insert_share_payment(&SharePayment {
                member_id: MemberId::new(member_id),
                amount: Amount::from_str(amount).unwrap(),
                paid_on: date(paid_on),
                reference: String::new(),
            })
            .await
            .unwrap();
    }

    /// Records a contribution for the month in which it was paid.
    pub async fn contribute(&self, member_id: &str, amount: &str, paid_on: &str) {
        let paid_on = date(paid_on);
        self.config
            .db()
            .insert_contribution(&Contribution {
                member_id: MemberId::new(member_id),
                year: paid_on.year(),
                month: paid_on.month(),
                amount: Amount::from_str(amount).unwrap(),
                paid_on,
                reference: String::new(),
            })
            .await
            .unwrap();
    }

    /// A member whose share capital is complete and who has saved `deposits` on top of it.
    pub async fn add_saver(&self, member_id: &str, deposits: &str) -> MemberId {
        let id = self.add_member(member_id).await;
        self.pay_shares(member_id, "5000", "2024-01-15").await;
        self.contribute(member_id, deposits, "2024-02-01").await;
        id
    }

    /// Records a pledge of 1,000 by each of `guarantors` for `loan_id`, adding any guarantor who
    /// is not a member yet. Pledge limits are not checked.
    pub async fn guarantee(&self, loan_id: &str, guarantors: &[&str]) {
        let db = self.config.db();
        let loan = db.require_loan(loan_id).await.unwrap();
        for &id in guarantors {
            let guarantor_id = MemberId::new(id);
            if db.get_member(&guarantor_id).await.unwrap().is_none() {
                self.add_member(id).await;
            }
            let amount = Amount::from_str("1000").unwrap();
            db.insert_guarantee(&Guarantee {
                loan_id: loan.loan_id.clone(),
                guarantor_id,
                amount,
                percentage: (amount.value() * Decimal::ONE_HUNDRED / loan.principal.value())
                    .round_dp(2),
                pledged_on: loan.applied_on,
            })
            .await
            .unwrap();
        }
    }
}

/// Parses `YYYY-MM-DD`.
pub fn date(s: &str) -> NaiveDate {
    NaiveDate::from_str(s).unwrap()
}
