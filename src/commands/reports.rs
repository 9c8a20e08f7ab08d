use crate::args::{ReportContributionsArgs, ReportSummaryArgs};
use crate::calc::{
    contribution_report, financial_summary, Books, ContributionReport, FinancialSummary,
};
use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::{utils, Config, Result};

pub async fn report_summary(
    config: Config,
    args: ReportSummaryArgs,
) -> Result<Out<FinancialSummary>> {
    let db = config.db();
    let members = db.list_members().await.pub_result(ErrorType::Database)?;
    let shares = db.share_payments(None).await.pub_result(ErrorType::Database)?;
    let contributions = db.contributions(None).await.pub_result(ErrorType::Database)?;
    let loans = db
        .loans_with_schedules()
        .await
        .pub_result(ErrorType::Database)?;
    let repayments = db.all_repayments().await.pub_result(ErrorType::Database)?;
    let distributions = db
        .list_distributions()
        .await
        .pub_result(ErrorType::Database)?;
    let expenses = db.expenses().await.pub_result(ErrorType::Database)?;
    let other_income = db.other_income().await.pub_result(ErrorType::Database)?;

    let as_of = args.as_of.unwrap_or_else(utils::today);
    let summary = financial_summary(
        Books {
            members: &members,
            shares: &shares,
            contributions: &contributions,
            loans: &loans,
            repayments: &repayments,
            distributions: &distributions,
            expenses: &expenses,
            other_income: &other_income,
        },
        as_of,
    );
    Ok(Out::new(
        format!(
            "{} as of {as_of}: cash at hand {}, total assets {}, net income {}",
            config.sacco_name(),
            summary.cash_at_hand.grouped(),
            summary.total_assets.grouped(),
            summary.net_income.grouped()
        ),
        summary,
    ))
}

pub async fn report_contributions(
    config: Config,
    args: ReportContributionsArgs,
) -> Result<Out<ContributionReport>> {
    let db = config.db();
    let members = db.list_members().await.pub_result(ErrorType::Database)?;
    let contributions = db.contributions(None).await.pub_result(ErrorType::Database)?;
    let report = contribution_report(&contributions, members.len(), args.year, args.month);
    Ok(Out::new(
        format!(
            "{}-{:02}: {} from {} of {} members",
            report.year,
            report.month,
            report.total_amount.grouped(),
            report.contributing_members,
            report.total_members
        ),
        report,
    ))
}
