use super::{constraint_error, fmt_date, parse_amount, parse_date, parse_decimal, Db};
use crate::model::{DividendDistribution, MemberDividend, MemberId};
use crate::Result;
use anyhow::Context;
use sqlx::FromRow;
use std::str::FromStr;

#[derive(FromRow)]
struct DistributionRow {
    distribution_id: String,
    distributed_on: String,
    snapshot_date: String,
    pool: String,
    basis: String,
    source: String,
}

#[derive(FromRow)]
struct MemberDividendRow {
    member_id: String,
    basis_amount: String,
    amount: String,
    percentage: String,
}

impl TryFrom<MemberDividendRow> for MemberDividend {
    type Error = crate::Error;

    fn try_from(row: MemberDividendRow) -> Result<Self> {
        Ok(MemberDividend {
            member_id: MemberId::new(row.member_id),
            basis_amount: parse_amount(&row.basis_amount, "member_dividends.basis_amount")?,
            amount: parse_amount(&row.amount, "member_dividends.amount")?,
            percentage: parse_decimal(&row.percentage, "member_dividends.percentage")?,
        })
    }
}

impl Db {
    /// Stores a distribution and every member's share of it in one transaction.
    pub(crate) async fn insert_distribution(&self, d: &DividendDistribution) -> Result<()> {
        let mut tx = self.pool().begin().await.context("Unable to begin a transaction")?;
        sqlx::query(
            "INSERT INTO dividend_distributions \
            (distribution_id, distributed_on, snapshot_date, pool, basis, source) \
            VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&d.distribution_id)
        .bind(fmt_date(d.distributed_on))
        .bind(fmt_date(d.snapshot_date))
        .bind(d.pool.to_string())
        .bind(d.basis.to_string())
        .bind(&d.source)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            constraint_error(e, || {
                format!("Distribution '{}' already exists", d.distribution_id)
            })
        })?;

        for md in &d.member_dividends {
            sqlx::query(
                "INSERT INTO member_dividends \
                (distribution_id, member_id, basis_amount, amount, percentage) \
                VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&d.distribution_id)
            .bind(md.member_id.as_str())
            .bind(md.basis_amount.to_string())
            .bind(md.amount.to_string())
            .bind(md.percentage.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                constraint_error(e, || {
                    format!("Member '{}' appears twice in the distribution", md.member_id)
                })
            })?;
        }
        tx.commit().await.context("Unable to commit the distribution")?;
        Ok(())
    }

    pub(crate) async fn get_distribution(
        &self,
        distribution_id: &str,
    ) -> Result<Option<DividendDistribution>> {
        let row: Option<DistributionRow> = sqlx::query_as(
            "SELECT distribution_id, distributed_on, snapshot_date, pool, basis, source \
            FROM dividend_distributions WHERE distribution_id = ?",
        )
        .bind(distribution_id)
        .fetch_optional(self.pool())
        .await
        .context("Unable to read distribution")?;
        match row {
            Some(row) => Ok(Some(self.assemble(row).await?)),
            None => Ok(None),
        }
    }

    /// All distributions, oldest first.
    pub(crate) async fn list_distributions(&self) -> Result<Vec<DividendDistribution>> {
        let rows: Vec<DistributionRow> = sqlx::query_as(
            "SELECT distribution_id, distributed_on, snapshot_date, pool, basis, source \
            FROM dividend_distributions ORDER BY distributed_on, distribution_id",
        )
        .fetch_all(self.pool())
        .await
        .context("Unable to list distributions")?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(self.assemble(row).await?);
        }
        Ok(out)
    }

    async fn assemble(&self, row: DistributionRow) -> Result<DividendDistribution> {
        let members: Vec<MemberDividendRow> = sqlx::query_as(
            "SELECT member_id, basis_amount, amount, percentage FROM member_dividends \
            WHERE distribution_id = ? ORDER BY member_id",
        )
        .bind(&row.distribution_id)
        .fetch_all(self.pool())
        .await
        .context("Unable to read member dividends")?;

        Ok(DividendDistribution {
            distributed_on: parse_date(&row.distributed_on, "distributed_on")?,
            snapshot_date: parse_date(&row.snapshot_date, "snapshot_date")?,
            pool: parse_amount(&row.pool, "pool")?,
            basis: FromStr::from_str(&row.basis)
                .with_context(|| format!("Bad dividend basis '{}'", row.basis))?,
            source: row.source,
            member_dividends: members
                .into_iter()
                .map(MemberDividend::try_from)
                .collect::<Result<Vec<_>>>()?,
            distribution_id: row.distribution_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Amount, DividendBasis, Member};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_distribution_round_trip() {
        let dir = TempDir::new().unwrap();
        let db = Db::init(dir.path().join("sacco.sqlite")).await.unwrap();
        for id in ["M-1", "M-2"] {
            db.insert_member(&Member {
                member_id: MemberId::new(id),
                full_name: id.to_string(),
                email: String::new(),
                phone: String::new(),
                joined_on: date(2024, 1, 1),
                on_hold: false,
                on_hold_reason: String::new(),
            })
            .await
            .unwrap();
        }

        let distribution = DividendDistribution {
            distribution_id: "D-1".to_string(),
            distributed_on: date(2025, 1, 31),
            snapshot_date: date(2024, 12, 31),
            pool: Amount::new(dec!(1000.01)),
            basis: DividendBasis::Shares,
            source: "Interest Income".to_string(),
            member_dividends: vec![
                MemberDividend {
                    member_id: MemberId::new("M-1"),
                    basis_amount: Amount::new(dec!(600)),
                    amount: Amount::new(dec!(600.01)),
                    percentage: dec!(60),
                },
                MemberDividend {
                    member_id: MemberId::new("M-2"),
                    basis_amount: Amount::new(dec!(400)),
                    amount: Amount::new(dec!(400)),
                    percentage: dec!(40),
                },
            ],
        };
        db.insert_distribution(&distribution).await.unwrap();

        let found = db.get_distribution("D-1").await.unwrap().unwrap();
        assert_eq!(found, distribution);
        assert_eq!(found.total_allocated(), found.pool);
        assert_eq!(db.list_distributions().await.unwrap().len(), 1);
        assert!(db.get_distribution("D-2").await.unwrap().is_none());

        let e = db.insert_distribution(&distribution).await.unwrap_err();
        assert!(format!("{e:#}").contains("already exists"));
    }
}
