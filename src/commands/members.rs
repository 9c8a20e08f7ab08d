//! Member, share capital and contribution handlers.

use crate::args::{ContributeArgs, MemberAddArgs, MemberHoldArgs, MemberIdArgs, PaymentArgs};
use crate::calc::{summarize_members, MemberSummary};
use crate::commands::{calc, require_money, Out};
use crate::error::{tagged, ErrorType, IntoResult};
use crate::model::{Contribution, Loan, Member, MemberId, SharePayment};
use crate::{utils, Config, Result};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A member and their savings position.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MemberOverview {
    pub member: Member,
    pub summary: MemberSummary,
}

/// Everything known about one member.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MemberDetails {
    pub member: Member,
    pub summary: MemberSummary,
    pub share_payments: Vec<SharePayment>,
    pub contributions: Vec<Contribution>,
    pub loans: Vec<Loan>,
}

pub async fn member_add(config: Config, args: MemberAddArgs) -> Result<Out<Member>> {
    let member_id = args.member_id;
    if member_id.as_str().is_empty() {
        return Err(tagged(ErrorType::Request, "The member id cannot be empty"));
    }
    if args.name.trim().is_empty() {
        return Err(tagged(ErrorType::Request, "The member's name cannot be empty"));
    }
    let member = Member {
        member_id,
        full_name: args.name.trim().to_string(),
        email: args.email,
        phone: args.phone,
        joined_on: args.joined_on.unwrap_or_else(utils::today),
        on_hold: false,
        on_hold_reason: String::new(),
    };
    config
        .db()
        .insert_member(&member)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(
        format!("Added member {} ({})", member.member_id, member.full_name),
        member,
    ))
}

pub async fn member_list(config: Config) -> Result<Out<Vec<MemberOverview>>> {
    let members = config
        .db()
        .list_members()
        .await
        .pub_result(ErrorType::Database)?;
    let summaries = summaries(&config, &members).await?;
    let overviews: Vec<MemberOverview> = members
        .into_iter()
        .zip(summaries)
        .map(|(member, summary)| MemberOverview { member, summary })
        .collect();
    Ok(Out::new(
        format!("{} members", overviews.len()),
        overviews,
    ))
}

pub async fn member_show(config: Config, args: MemberIdArgs) -> Result<Out<MemberDetails>> {
    let db = config.db();
    let member = db
        .require_member(&args.member_id)
        .await
        .pub_result(ErrorType::Database)?;
    let members = db.list_members().await.pub_result(ErrorType::Database)?;
    let summary = summaries(&config, &members)
        .await?
        .into_iter()
        .find(|s| s.member_id == member.member_id)
        .unwrap_or_default();
    let share_payments = db
        .share_payments(Some(&member.member_id))
        .await
        .pub_result(ErrorType::Database)?;
    let contributions = db
        .contributions(Some(&member.member_id))
        .await
        .pub_result(ErrorType::Database)?;
    let loans = db
        .list_loans(Some(&member.member_id))
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(
        format!("Member {} ({})", member.member_id, member.full_name),
        MemberDetails {
            member,
            summary,
            share_payments,
            contributions,
            loans,
        },
    ))
}

pub async fn member_hold(config: Config, args: MemberHoldArgs) -> Result<Out<()>> {
    config
        .db()
        .set_member_hold(&args.member_id, true, args.reason.trim())
        .await
        .pub_result(ErrorType::Database)?;
    Ok(format!("Member {} is on hold", args.member_id).into())
}

pub async fn member_release(config: Config, args: MemberIdArgs) -> Result<Out<()>> {
    config
        .db()
        .set_member_hold(&args.member_id, false, "")
        .await
        .pub_result(ErrorType::Database)?;
    Ok(format!("Member {} is no longer on hold", args.member_id).into())
}

/// Records a share capital payment and returns the member's updated position.
pub async fn share_add(config: Config, args: PaymentArgs) -> Result<Out<MemberSummary>> {
    require_money(args.amount, "share capital payment")?;
    let db = config.db();
    let member = db
        .require_member(&args.member_id)
        .await
        .pub_result(ErrorType::Database)?;
    let payment = SharePayment {
        member_id: member.member_id.clone(),
        amount: args.amount,
        paid_on: args.paid_on.unwrap_or_else(utils::today),
        reference: args.reference,
    };
    db.insert_share_payment(&payment)
        .await
        .pub_result(ErrorType::Database)?;
    debug!("Recorded share capital of {} for {}", payment.amount, member.member_id);

    let summary = member_summary(&config, &member.member_id).await?;
    Ok(Out::new(
        format!(
            "Recorded share capital of {} for {}, {} of {} paid",
            payment.amount.grouped(),
            member.member_id,
            summary.total_share_capital.grouped(),
            summary.share_capital_target.grouped()
        ),
        summary,
    ))
}

/// Records a monthly contribution. A member contributes at most once per month and never less than
/// the policy minimum.
pub async fn contribute(config: Config, args: ContributeArgs) -> Result<Out<Contribution>> {
    let payment = args.payment;
    require_money(payment.amount, "contribution")?;
    let minimum = config.policy().minimum_monthly_contribution;
    if payment.amount < minimum {
        return Err(tagged(
            ErrorType::Request,
            format!(
                "A contribution of {} is below the monthly minimum of {minimum}",
                payment.amount
            ),
        ));
    }

    let paid_on = payment.paid_on.unwrap_or_else(utils::today);
    let contribution = Contribution {
        member_id: payment.member_id,
        year: args.year.unwrap_or(paid_on.year()),
        month: args.month.unwrap_or(paid_on.month()),
        amount: payment.amount,
        paid_on,
        reference: payment.reference,
    };
    let db = config.db();
    db.require_member(&contribution.member_id)
        .await
        .pub_result(ErrorType::Database)?;
    db.insert_contribution(&contribution)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(
        format!(
            "Recorded a contribution of {} from {} for {}-{:02}",
            contribution.amount.grouped(),
            contribution.member_id,
            contribution.year,
            contribution.month
        ),
        contribution,
    ))
}

/// Summaries for `members`, in the same order, with ownership percentages across all of them.
pub(super) async fn summaries(config: &Config, members: &[Member]) -> Result<Vec<MemberSummary>> {
    let db = config.db();
    let shares = db.share_payments(None).await.pub_result(ErrorType::Database)?;
    let contributions = db.contributions(None).await.pub_result(ErrorType::Database)?;
    let ids: Vec<MemberId> = members.iter().map(|m| m.member_id.clone()).collect();
    calc(summarize_members(
        &ids,
        &shares,
        &contributions,
        config.policy().share_value,
        utils::today().year(),
    ))
}

/// The summary of a single member, with ownership percentages across the whole SACCO.
pub(super) async fn member_summary(config: &Config, member_id: &MemberId) -> Result<MemberSummary> {
    let members = config
        .db()
        .list_members()
        .await
        .pub_result(ErrorType::Database)?;
    summaries(config, &members)
        .await?
        .into_iter()
        .find(|s| &s.member_id == member_id)
        .ok_or_else(|| tagged(ErrorType::Request, format!("No such member '{member_id}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::error_type;
    use crate::model::Amount;
    use crate::test::{date, TestEnv};
    use rust_decimal_macros::dec;

    fn add_args(id: &str, name: &str) -> MemberAddArgs {
        MemberAddArgs {
            member_id: MemberId::new(id),
            name: name.to_string(),
            email: String::new(),
            phone: String::new(),
            joined_on: Some(date("2025-01-10")),
        }
    }

    fn payment(id: &str, amount: Amount, paid_on: &str) -> PaymentArgs {
        PaymentArgs {
            member_id: MemberId::new(id),
            amount,
            paid_on: Some(date(paid_on)),
            reference: String::new(),
        }
    }

    #[tokio::test]
    async fn test_add_and_show_member() {
        let env = TestEnv::new().await;
        member_add(env.config(), add_args("M-1", " Amina Njeri "))
            .await
            .unwrap();
        let out = member_show(
            env.config(),
            MemberIdArgs {
                member_id: MemberId::new("M-1"),
            },
        )
        .await
        .unwrap();
        let details = out.structure().unwrap();
        assert_eq!(details.member.full_name, "Amina Njeri");
        assert_eq!(details.member.joined_on, date("2025-01-10"));
        assert!(details.loans.is_empty());
        assert_eq!(details.summary.total_deposits, Amount::ZERO);
    }

    #[tokio::test]
    async fn test_show_unknown_member() {
        let env = TestEnv::new().await;
        let e = member_show(
            env.config(),
            MemberIdArgs {
                member_id: MemberId::new("M-404"),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Request));
    }

    #[tokio::test]
    async fn test_share_percentages_are_recomputed() {
        let env = TestEnv::new().await;
        env.add_member("M-1").await;
        env.add_member("M-2").await;
        share_add(env.config(), payment("M-1", Amount::new(dec!(3000)), "2025-01-05"))
            .await
            .unwrap();
        let out = share_add(env.config(), payment("M-2", Amount::new(dec!(1000)), "2025-01-06"))
            .await
            .unwrap();
        let m2 = out.structure().unwrap();
        assert_eq!(m2.share_capital_percentage, dec!(25));

        let list = member_list(env.config()).await.unwrap();
        let list = list.structure().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].summary.share_capital_percentage, dec!(75));
        assert_eq!(list[0].summary.share_completion_percentage, dec!(60));
    }

    #[tokio::test]
    async fn test_contribution_rules() {
        let env = TestEnv::new().await;
        env.add_member("M-1").await;
        let args = |amount| ContributeArgs {
            payment: payment("M-1", Amount::new(amount), "2025-03-04"),
            year: None,
            month: None,
        };

        let e = contribute(env.config(), args(dec!(999.99))).await.unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Request));
        assert!(format!("{e:#}").contains("below the monthly minimum"));

        let out = contribute(env.config(), args(dec!(1500))).await.unwrap();
        let recorded = out.structure().unwrap();
        assert_eq!((recorded.year, recorded.month), (2025, 3));

        let e = contribute(env.config(), args(dec!(1500))).await.unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Request));
        assert!(format!("{e:#}").contains("2025-03"));

        let mut april = args(dec!(1000));
        april.month = Some(4);
        contribute(env.config(), april).await.unwrap();
    }

    #[tokio::test]
    async fn test_hold_and_release() {
        let env = TestEnv::new().await;
        env.add_member("M-1").await;
        member_hold(
            env.config(),
            MemberHoldArgs {
                member_id: MemberId::new("M-1"),
                reason: "arrears".to_string(),
            },
        )
        .await
        .unwrap();
        let m = env
            .config()
            .db()
            .require_member(&MemberId::new("M-1"))
            .await
            .unwrap();
        assert!(m.on_hold);

        member_release(
            env.config(),
            MemberIdArgs {
                member_id: MemberId::new("M-1"),
            },
        )
        .await
        .unwrap();
    }
}
