//! Splits a dividend pool among members in proportion to their holdings.

use crate::calc::{CalcError, CalcResult};
use crate::model::{Amount, MemberId};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// The smallest remainder limit, regardless of how few members there are.
const MIN_REMAINDER_LIMIT: Amount = Amount::ONE;

/// Half a cent: the most a single rounded allocation can drift from its exact value.
const HALF_CENT: Decimal = Decimal::from_parts(5, 0, 0, false, 3);

/// Allocates `pool` across `shares` proportionally.
///
/// Each member gets `pool x share / total` rounded to cents. Whatever rounding leaves over (or
/// takes away) is given to the member with the largest allocation, the lowest member id winning a
/// tie, so that the allocations always add up to exactly `pool`.
///
/// The result has an entry for every member in `shares`, including members with a zero share.
///
/// # Errors
/// - `CalcError::InvalidInput` if the pool is not positive or not in whole cents, there are no
///   members, a share is negative, or all shares are zero.
/// - `CalcError::RoundingOverflow` if the remainder is larger than rounding can explain.
pub fn allocate(
    pool: Amount,
    shares: &BTreeMap<MemberId, Amount>,
) -> CalcResult<BTreeMap<MemberId, Amount>> {
    if !pool.is_positive() {
        return Err(CalcError::invalid(format!(
            "the dividend pool must be positive, got {pool}"
        )));
    }
    if !pool.is_whole_cents() {
        return Err(CalcError::invalid(format!(
            "the dividend pool must be in whole cents, got {pool}"
        )));
    }
    if shares.is_empty() {
        return Err(CalcError::invalid("there are no members to allocate to"));
    }
    if let Some((member_id, share)) = shares.iter().find(|(_, share)| share.is_negative()) {
        return Err(CalcError::invalid(format!(
            "member {member_id} has a negative share of {share}"
        )));
    }

    let total = shares
        .values()
        .try_fold(Decimal::ZERO, |sum, share| sum.checked_add(share.value()))
        .ok_or_else(|| CalcError::invalid("the members' shares are too large to add up"))?;
    if total <= Decimal::ZERO {
        return Err(CalcError::invalid(
            "the members' shares add up to zero, there is nothing to allocate by",
        ));
    }

    let mut allocations = BTreeMap::new();
    for (member_id, share) in shares {
        let exact = pool
            .value()
            .checked_mul(share.value())
            .and_then(|product| product.checked_div(total))
            .ok_or_else(|| {
                CalcError::invalid(format!(
                    "a pool of {pool} is too large to split by member {member_id}'s \
                     share of {share}"
                ))
            })?;
        allocations.insert(member_id.clone(), Amount::rounded(exact));
    }

    let allocated: Amount = allocations.values().sum();
    let remainder = pool - allocated;
    if remainder.is_zero() {
        return Ok(allocations);
    }

    let limit = remainder_limit(shares.len());
    if remainder.abs() > limit {
        return Err(CalcError::RoundingOverflow { remainder, limit });
    }

    // BTreeMap iterates in ascending id order and max_by_key keeps the last maximum, so reverse to
    // have the lowest id win ties.
    let recipient = allocations
        .iter()
        .rev()
        .max_by_key(|(_, amount)| **amount)
        .map(|(member_id, _)| member_id.clone());
    if let Some(member_id) = recipient {
        if let Some(amount) = allocations.get_mut(&member_id) {
            *amount += remainder;
        }
    }
    Ok(allocations)
}

/// Each member's `value` as a percentage of the total, rounded to two decimal places. Every member
/// gets zero when the total is zero.
pub fn percentages(values: &BTreeMap<MemberId, Amount>) -> BTreeMap<MemberId, Decimal> {
    let total: Amount = values.values().sum();
    values
        .iter()
        .map(|(member_id, value)| {
            let pct = if total.is_positive() {
                let scaled = match value.value().checked_mul(Decimal::ONE_HUNDRED) {
                    Some(v) => v / total.value(),
                    None => value.value() / total.value() * Decimal::ONE_HUNDRED,
                };
                crate::model::round_currency(scaled)
            } else {
                Decimal::ZERO
            };
            (member_id.clone(), pct)
        })
        .collect()
}

fn remainder_limit(members: usize) -> Amount {
    let scaled = Amount::new(HALF_CENT * Decimal::from(members));
    scaled.max(MIN_REMAINDER_LIMIT)
}
