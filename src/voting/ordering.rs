//! Numbering primitives shared by the aggregate operations.
//!
//! Every function here runs inside a caller-supplied unit of work and never
//! commits. Writes are ordered so that `(vote_id, number)` stays unique after
//! each individual statement, which is what SQLite checks.

use std::collections::HashSet;

use log::debug;

use crate::db::UnitOfWork;
use crate::error::{Error, Result};
use crate::models::VoteOption;

/// Rank held by an option while it is being swapped. Never observable after
/// commit, and free because a renumbered set has no negative ranks.
const SWAP_PARKING: i64 = -1;

/// Rewrite the vote's option ranks to `0..n` keeping their current relative
/// order. Returns the options in their new order and the number of options
/// whose rank changed.
pub(crate) async fn renumber<U: UnitOfWork>(
    unit: &mut U,
    vote_id: &str,
) -> Result<(Vec<VoteOption>, usize)> {
    let mut options = unit.options_for_vote(vote_id).await?;
    options.sort_by_key(|option| option.number);

    let changed: Vec<usize> = options
        .iter()
        .enumerate()
        .filter(|(rank, option)| option.number != *rank as i64)
        .map(|(rank, _)| rank)
        .collect();
    if changed.is_empty() {
        return Ok((options, 0));
    }

    // With only non-negative ranks, ascending assignment never lands on a rank
    // that is still held. Negative ranks can break that, so when a target rank
    // is taken move the affected options out of the occupied range first.
    let lowest = options[0].number;
    let held: HashSet<i64> = options.iter().map(|option| option.number).collect();
    if lowest < 0 && changed.iter().any(|&rank| held.contains(&(rank as i64))) {
        let highest = options[options.len() - 1].number;
        let start = parking_start(lowest, highest, changed.len()).ok_or_else(|| {
            Error::InvalidState(format!(
                "no free ranks to renumber vote {vote_id} (ranks span {lowest}..={highest})"
            ))
        })?;
        for (slot, &rank) in changed.iter().enumerate() {
            options[rank].number = start + slot as i64;
            unit.save_option(&options[rank]).await?;
        }
    }

    for &rank in &changed {
        options[rank].number = rank as i64;
        unit.save_option(&options[rank]).await?;
    }

    debug!("Renumbered {} option(s) of vote {}", changed.len(), vote_id);
    Ok((options, changed.len()))
}

/// First of `slots` consecutive ranks lying entirely below `lowest` or, failing
/// that, entirely above `highest`.
fn parking_start(lowest: i64, highest: i64, slots: usize) -> Option<i64> {
    let slots = i64::try_from(slots).ok()?;
    lowest.checked_sub(slots).or_else(|| {
        let start = highest.checked_add(1)?;
        start.checked_add(slots - 1)?;
        Some(start)
    })
}

/// Exchange the ranks of two options of the same vote.
pub(crate) async fn swap<U: UnitOfWork>(
    unit: &mut U,
    mut first: VoteOption,
    mut second: VoteOption,
) -> Result<()> {
    let (first_number, second_number) = (first.number, second.number);

    second.number = SWAP_PARKING;
    unit.save_option(&second).await?;

    first.number = second_number;
    unit.save_option(&first).await?;

    second.number = first_number;
    unit.save_option(&second).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parks_below_the_lowest_rank_when_it_fits() {
        assert_eq!(parking_start(-3, 1, 2), Some(-5));
    }

    #[test]
    fn parks_above_when_below_would_overflow() {
        assert_eq!(parking_start(i64::MIN, 0, 2), Some(1));
        assert_eq!(parking_start(i64::MIN + 1, 4, 2), Some(5));
    }

    #[test]
    fn no_parking_when_both_ends_are_full() {
        assert_eq!(parking_start(i64::MIN, i64::MAX, 2), None);
        assert_eq!(parking_start(i64::MIN, i64::MAX - 1, 2), None);
    }
}
