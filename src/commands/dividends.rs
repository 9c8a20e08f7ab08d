use crate::args::{DividendDistributeArgs, DividendShowArgs};
use crate::backup::DISTRIBUTION;
use crate::calc::{allocate, basis_snapshot, percentages};
use crate::commands::{calc, require_money, Out};
use crate::error::{tagged, ErrorType, IntoResult};
use crate::model::{DividendDistribution, MemberDividend, MemberId};
use crate::{utils, Config, Result};
use tracing::{debug, error};

/// Splits `args.pool` among members in proportion to their basis at the snapshot date.
///
/// Members with nothing at the snapshot date get no entry. The allocations add up to exactly the
/// pool. A copy of the database is taken before the distribution is stored, and the distribution
/// itself is written to the backups directory as JSON.
pub async fn dividend_distribute(
    config: Config,
    args: DividendDistributeArgs,
) -> Result<Out<DividendDistribution>> {
    require_money(args.pool, "dividend pool")?;
    let db = config.db();
    let today = utils::today();
    let snapshot_date = args.snapshot_date.unwrap_or(today);
    let basis = args.basis.unwrap_or(config.policy().dividend_basis);

    let members = db.list_members().await.pub_result(ErrorType::Database)?;
    let ids: Vec<MemberId> = members
        .iter()
        .filter(|m| m.joined_on <= snapshot_date)
        .map(|m| m.member_id.clone())
        .collect();
    let shares = db.share_payments(None).await.pub_result(ErrorType::Database)?;
    let contributions = db.contributions(None).await.pub_result(ErrorType::Database)?;
    let mut snapshot = basis_snapshot(&ids, basis, snapshot_date, &shares, &contributions);
    snapshot.retain(|_, amount| amount.is_positive());
    if snapshot.is_empty() {
        return Err(tagged(
            ErrorType::Request,
            format!("No member holds any {basis} as of {snapshot_date}"),
        ));
    }

    let allocations = allocate(args.pool, &snapshot).inspect_err(|e| {
        if e.is_fatal() {
            error!("Dividend allocation failed its rounding check: {e}");
        }
    });
    let allocations = calc(allocations)?;
    let shares_of_pool = percentages(&allocations);

    let member_dividends: Vec<MemberDividend> = allocations
        .iter()
        .map(|(member_id, amount)| MemberDividend {
            member_id: member_id.clone(),
            basis_amount: snapshot.get(member_id).copied().unwrap_or_default(),
            amount: *amount,
            percentage: shares_of_pool.get(member_id).copied().unwrap_or_default(),
        })
        .collect();
    let distribution = DividendDistribution {
        distribution_id: utils::new_id("DV"),
        distributed_on: today,
        snapshot_date,
        pool: args.pool,
        basis,
        source: args.source,
        member_dividends,
    };

    let backup = config.backup();
    let copy = backup.copy_sqlite().await.pub_result(ErrorType::Io)?;
    debug!("Backed up the database to {}", copy.display());
    db.insert_distribution(&distribution)
        .await
        .pub_result(ErrorType::Database)?;
    let record = backup
        .save_json(DISTRIBUTION, &distribution)
        .await
        .pub_result(ErrorType::Io)?;
    debug!("Wrote {}", record.display());

    Ok(Out::new(
        format!(
            "Distributed {} among {} members as distribution {}",
            distribution.pool.grouped(),
            distribution.member_dividends.len(),
            distribution.distribution_id
        ),
        distribution,
    ))
}

/// Shows one distribution, or every distribution when no id is given.
pub async fn dividend_show(
    config: Config,
    args: DividendShowArgs,
) -> Result<Out<Vec<DividendDistribution>>> {
    let db = config.db();
    let distributions = match args.distribution_id {
        Some(id) => {
            let found = db
                .get_distribution(&id)
                .await
                .pub_result(ErrorType::Database)?
                .ok_or_else(|| {
                    tagged(ErrorType::Request, format!("No such distribution '{id}'"))
                })?;
            vec![found]
        }
        None => db.list_distributions().await.pub_result(ErrorType::Database)?,
    };
    Ok(Out::new(
        format!("{} distributions", distributions.len()),
        distributions,
    ))
}
