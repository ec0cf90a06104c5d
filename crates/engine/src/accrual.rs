//! Yield accrual calculator.
//!
//! Pure functions over committed state: no mutation, no IO, safe to
//! call concurrently with writes to other programs. The calculator
//! reconstructs a continuous-time reward model from the discrete epoch
//! ledger:
//!
//! - every timestamp is clamped into the program's active window
//!   before use, so activity outside the window accrues nothing;
//! - each deposit walks the epochs from its starting index to the
//!   program's current index, accruing
//!   `elapsed × emission_rate_per_hour / 3600 × amount / total_staked`
//!   per epoch (share is an explicit 0 when the epoch staked nothing);
//! - the withdrawn-yield total is netted off and the dev fee deducted
//!   from what remains; a non-positive net reports 0.
//!
//! All arithmetic is exact `Decimal`. Elapsed seconds are multiplied
//! by the hourly rate before dividing by 3600 so whole-hour intervals
//! stay exact. Rounding, if any, happens only on externally reported
//! numbers.
//!
//! A missing ledger index in `[starting_epoch, current_epoch]` raises
//! [`ProjectionError::LedgerGap`], aborting only this computation.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::error::ProjectionError;
use crate::state::{Epoch, ProgramMeta, UserAccount};

const SECONDS_PER_HOUR: i64 = 3_600;

/// Computes the yield the account may currently harvest.
///
/// `now` is the caller's clock in Unix seconds; passing it explicitly
/// keeps the function deterministic and testable.
pub fn harvestable_yield(
    meta: &ProgramMeta,
    epochs: &BTreeMap<u64, Epoch>,
    account: &UserAccount,
    now: i64,
) -> Result<Decimal, ProjectionError> {
    let (window_start, window_end) = active_window(meta)?;
    let clamp = |t: i64| t.clamp(window_start, window_end);
    let current = meta.current_epoch_index;

    let gap = |index: u64| ProjectionError::LedgerGap {
        program_id: meta.program_id.clone(),
        epoch_index: index,
    };

    let mut gross = Decimal::ZERO;
    for deposit in &account.deposits {
        if deposit.starting_epoch_index > current {
            return Err(ProjectionError::Validation(format!(
                "deposit starting epoch {} is beyond current epoch {}",
                deposit.starting_epoch_index, current
            )));
        }

        for index in deposit.starting_epoch_index..=current {
            let this_epoch = epochs.get(&index).ok_or_else(|| gap(index))?;

            let (t0, t1) = if deposit.starting_epoch_index == current {
                (clamp(deposit.deposit_time), clamp(now))
            } else if index == deposit.starting_epoch_index {
                let next = epochs.get(&(index + 1)).ok_or_else(|| gap(index + 1))?;
                (clamp(deposit.deposit_time), clamp(next.epoch_start_time))
            } else if index == current {
                (clamp(this_epoch.epoch_start_time), clamp(now))
            } else {
                let next = epochs.get(&(index + 1)).ok_or_else(|| gap(index + 1))?;
                (
                    clamp(this_epoch.epoch_start_time),
                    clamp(next.epoch_start_time),
                )
            };

            let elapsed = Decimal::from((t1 - t0).max(0));
            let epoch_global_yield =
                elapsed * meta.emission_rate_per_hour / Decimal::from(SECONDS_PER_HOUR);
            // Explicit guard: an epoch with nothing staked contributes
            // zero, never a division fault.
            let share = if this_epoch.total_staked.is_zero() {
                Decimal::ZERO
            } else {
                deposit.amount / this_epoch.total_staked
            };
            gross += epoch_global_yield * share;
        }
    }

    let net = gross - account.withdrawn_yield;
    if net <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    let dev_fee = net * meta.dev_reward_fraction;
    Ok(net - dev_fee)
}

/// Best-effort per-second emission estimate for UI display; never used
/// for settlement. Reports 0 when the program has no staked balance.
pub fn yield_per_second(meta: &ProgramMeta, account_total_staked: Decimal) -> Decimal {
    if meta.staked_balance.is_zero() {
        return Decimal::ZERO;
    }
    let rate_per_second = meta.emission_rate_per_hour / Decimal::from(SECONDS_PER_HOUR);
    rate_per_second * (account_total_staked / meta.staked_balance)
}

fn active_window(meta: &ProgramMeta) -> Result<(i64, i64), ProjectionError> {
    match (meta.program_start_time, meta.program_end_time) {
        (Some(start), Some(end)) if start <= end => Ok((start, end)),
        (Some(start), Some(end)) => Err(ProjectionError::Validation(format!(
            "program {} window is inverted ({} > {})",
            meta.program_id, start, end
        ))),
        _ => Err(ProjectionError::Validation(format!(
            "program {} window not yet observed",
            meta.program_id
        ))),
    }
}
