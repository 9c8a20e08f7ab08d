use super::{constraint_error, fmt_date, parse_amount, parse_date, Db};
use crate::error::{tagged, ErrorType};
use crate::model::{Contribution, Member, MemberId, SharePayment};
use crate::Result;
use anyhow::Context;
use sqlx::FromRow;

#[derive(FromRow)]
struct MemberRow {
    member_id: String,
    full_name: String,
    email: String,
    phone: String,
    joined_on: String,
    on_hold: bool,
    on_hold_reason: String,
}

impl TryFrom<MemberRow> for Member {
    type Error = crate::Error;

    fn try_from(row: MemberRow) -> Result<Self> {
        Ok(Member {
            member_id: MemberId::new(row.member_id),
            full_name: row.full_name,
            email: row.email,
            phone: row.phone,
            joined_on: parse_date(&row.joined_on, "members.joined_on")?,
            on_hold: row.on_hold,
            on_hold_reason: row.on_hold_reason,
        })
    }
}

#[derive(FromRow)]
struct SharePaymentRow {
    member_id: String,
    amount: String,
    paid_on: String,
    reference: String,
}

impl TryFrom<SharePaymentRow> for SharePayment {
    type Error = crate::Error;

    fn try_from(row: SharePaymentRow) -> Result<Self> {
        Ok(SharePayment {
            member_id: MemberId::new(row.member_id),
            amount: parse_amount(&row.amount, "share_payments.amount")?,
            paid_on: parse_date(&row.paid_on, "share_payments.paid_on")?,
            reference: row.reference,
        })
    }
}

#[derive(FromRow)]
struct ContributionRow {
    member_id: String,
    year: i64,
    month: i64,
    amount: String,
    paid_on: String,
    reference: String,
}

impl TryFrom<ContributionRow> for Contribution {
    type Error = crate::Error;

    fn try_from(row: ContributionRow) -> Result<Self> {
        Ok(Contribution {
            member_id: MemberId::new(row.member_id),
            year: i32::try_from(row.year).context("contributions.year is out of range")?,
            month: u32::try_from(row.month).context("contributions.month is out of range")?,
            amount: parse_amount(&row.amount, "contributions.amount")?,
            paid_on: parse_date(&row.paid_on, "contributions.paid_on")?,
            reference: row.reference,
        })
    }
}

const MEMBER_COLUMNS: &str =
    "member_id, full_name, email, phone, joined_on, on_hold, on_hold_reason";

impl Db {
    pub(crate) async fn insert_member(&self, member: &Member) -> Result<()> {
        sqlx::query(
            "INSERT INTO members (member_id, full_name, email, phone, joined_on, on_hold, \
            on_hold_reason) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(member.member_id.as_str())
        .bind(&member.full_name)
        .bind(&member.email)
        .bind(&member.phone)
        .bind(fmt_date(member.joined_on))
        .bind(member.on_hold)
        .bind(&member.on_hold_reason)
        .execute(self.pool())
        .await
        .map_err(|e| {
            constraint_error(e, || {
                format!("Member '{}' already exists", member.member_id)
            })
        })?;
        Ok(())
    }

    pub(crate) async fn get_member(&self, member_id: &MemberId) -> Result<Option<Member>> {
        let row: Option<MemberRow> = sqlx::query_as(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE member_id = ?"
        ))
        .bind(member_id.as_str())
        .fetch_optional(self.pool())
        .await
        .context("Unable to read member")?;
        row.map(Member::try_from).transpose()
    }

    /// Like `get_member` but a missing member is a `Request` error.
    pub(crate) async fn require_member(&self, member_id: &MemberId) -> Result<Member> {
        self.get_member(member_id)
            .await?
            .ok_or_else(|| tagged(ErrorType::Request, format!("No such member '{member_id}'")))
    }

    pub(crate) async fn list_members(&self) -> Result<Vec<Member>> {
        let rows: Vec<MemberRow> = sqlx::query_as(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members ORDER BY member_id"
        ))
        .fetch_all(self.pool())
        .await
        .context("Unable to list members")?;
        rows.into_iter().map(Member::try_from).collect()
    }

    pub(crate) async fn set_member_hold(
        &self,
        member_id: &MemberId,
        on_hold: bool,
        reason: &str,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE members SET on_hold = ?, on_hold_reason = ? WHERE member_id = ?")
                .bind(on_hold)
                .bind(reason)
                .bind(member_id.as_str())
                .execute(self.pool())
                .await
                .context("Unable to update member")?;
        if result.rows_affected() == 0 {
            return Err(tagged(
                ErrorType::Request,
                format!("No such member '{member_id}'"),
            ));
        }
        Ok(())
    }

    pub(crate) async fn insert_share_payment(&self, payment: &SharePayment) -> Result<()> {
        sqlx::query(
            "INSERT INTO share_payments (member_id, amount, paid_on, reference) \
            VALUES (?, ?, ?, ?)",
        )
        .bind(payment.member_id.as_str())
        .bind(payment.amount.to_string())
        .bind(fmt_date(payment.paid_on))
        .bind(&payment.reference)
        .execute(self.pool())
        .await
        .map_err(|e| {
            constraint_error(e, || {
                format!("Unable to record share capital for '{}'", payment.member_id)
            })
        })?;
        Ok(())
    }

    pub(crate) async fn insert_contribution(&self, contribution: &Contribution) -> Result<()> {
        sqlx::query(
            "INSERT INTO contributions (member_id, year, month, amount, paid_on, reference) \
            VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(contribution.member_id.as_str())
        .bind(contribution.year)
        .bind(contribution.month)
        .bind(contribution.amount.to_string())
        .bind(fmt_date(contribution.paid_on))
        .bind(&contribution.reference)
        .execute(self.pool())
        .await
        .map_err(|e| {
            constraint_error(e, || {
                format!(
                    "Member '{}' already has a contribution for {}-{:02}",
                    contribution.member_id, contribution.year, contribution.month
                )
            })
        })?;
        Ok(())
    }

    /// Share payments in the order they were recorded, for one member or everyone.
    pub(crate) async fn share_payments(
        &self,
        member_id: Option<&MemberId>,
    ) -> Result<Vec<SharePayment>> {
        let rows: Vec<SharePaymentRow> = sqlx::query_as(
            "SELECT member_id, amount, paid_on, reference FROM share_payments \
            WHERE ?1 IS NULL OR member_id = ?1 ORDER BY paid_on, id",
        )
        .bind(member_id.map(|m| m.as_str()))
        .fetch_all(self.pool())
        .await
        .context("Unable to read share payments")?;
        rows.into_iter().map(SharePayment::try_from).collect()
    }

    /// Contributions ordered by period, for one member or everyone.
    pub(crate) async fn contributions(
        &self,
        member_id: Option<&MemberId>,
    ) -> Result<Vec<Contribution>> {
        let rows: Vec<ContributionRow> = sqlx::query_as(
            "SELECT member_id, year, month, amount, paid_on, reference FROM contributions \
            WHERE ?1 IS NULL OR member_id = ?1 ORDER BY year, month, member_id",
        )
        .bind(member_id.map(|m| m.as_str()))
        .fetch_all(self.pool())
        .await
        .context("Unable to read contributions")?;
        rows.into_iter().map(Contribution::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_type;
    use crate::model::Amount;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    async fn db() -> (TempDir, Db) {
        let dir = TempDir::new().unwrap();
        let db = Db::init(dir.path().join("sacco.sqlite")).await.unwrap();
        (dir, db)
    }

    fn member(id: &str) -> Member {
        Member {
            member_id: MemberId::new(id),
            full_name: format!("Member {id}"),
            email: format!("{id}@example.com"),
            phone: String::new(),
            joined_on: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            on_hold: false,
            on_hold_reason: String::new(),
        }
    }

    fn contribution(id: &str, month: u32) -> Contribution {
        Contribution {
            member_id: MemberId::new(id),
            year: 2025,
            month,
            amount: Amount::new(dec!(1000)),
            paid_on: NaiveDate::from_ymd_opt(2025, month, 3).unwrap(),
            reference: "MPESA-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_member_round_trip() {
        let (_dir, db) = db().await;
        db.insert_member(&member("M-2")).await.unwrap();
        db.insert_member(&member("M-1")).await.unwrap();

        let found = db.get_member(&MemberId::new("M-2")).await.unwrap().unwrap();
        assert_eq!(found, member("M-2"));
        let all = db.list_members().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].member_id.as_str(), "M-1");
        assert!(db.get_member(&MemberId::new("M-3")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_member() {
        let (_dir, db) = db().await;
        db.insert_member(&member("M-1")).await.unwrap();
        let e = db.insert_member(&member("M-1")).await.unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Request));
        assert!(format!("{e:#}").contains("already exists"));
    }

    #[tokio::test]
    async fn test_hold_and_release() {
        let (_dir, db) = db().await;
        db.insert_member(&member("M-1")).await.unwrap();
        let id = MemberId::new("M-1");
        db.set_member_hold(&id, true, "arrears").await.unwrap();
        let m = db.require_member(&id).await.unwrap();
        assert!(m.on_hold);
        assert_eq!(m.on_hold_reason, "arrears");

        db.set_member_hold(&id, false, "").await.unwrap();
        assert!(!db.require_member(&id).await.unwrap().on_hold);

        let e = db
            .set_member_hold(&MemberId::new("M-9"), true, "")
            .await
            .unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Request));
    }

    #[tokio::test]
    async fn test_payments_filter_by_member() {
        let (_dir, db) = db().await;
        db.insert_member(&member("M-1")).await.unwrap();
        db.insert_member(&member("M-2")).await.unwrap();
        for id in ["M-1", "M-2", "M-1"] {
            db.insert_share_payment(&SharePayment {
                member_id: MemberId::new(id),
                amount: Amount::new(dec!(2500.50)),
                paid_on: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
                reference: String::new(),
            })
            .await
            .unwrap();
        }
        assert_eq!(db.share_payments(None).await.unwrap().len(), 3);
        let mine = db.share_payments(Some(&MemberId::new("M-1"))).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].amount.value(), dec!(2500.50));
    }

    #[tokio::test]
    async fn test_duplicate_contribution_refused() {
        let (_dir, db) = db().await;
        db.insert_member(&member("M-1")).await.unwrap();
        db.insert_contribution(&contribution("M-1", 3)).await.unwrap();
        db.insert_contribution(&contribution("M-1", 4)).await.unwrap();
        let e = db
            .insert_contribution(&contribution("M-1", 3))
            .await
            .unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Request));
        assert!(format!("{e:#}").contains("2025-03"));
        assert_eq!(db.contributions(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_member_payment_refused() {
        let (_dir, db) = db().await;
        let e = db
            .insert_contribution(&contribution("M-404", 1))
            .await
            .unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Request));
    }
}
