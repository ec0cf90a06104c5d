//! Projected entities of one staking program.
//!
//! A [`ProgramAggregate`] bundles the program metadata, the epoch
//! ledger and every user account of one program. It is the unit of
//! atomic commit and of write serialization: either all field updates
//! of a block batch land, or none do.
//!
//! Field names mirror the contract's state where the contract owns the
//! vocabulary (`Epochs`, `Deposits`, ...); the Rust side uses the
//! engine's own names.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ProjectionError;

// ════════════════════════════════════════════════════════════════════════════
// PROGRAM METADATA
// ════════════════════════════════════════════════════════════════════════════

/// Program-wide parameters.
///
/// Created on the first observed event for a program, mutated
/// field-by-field by the router, never deleted. The reward window
/// (`program_start_time`/`program_end_time`) is `None` until the
/// corresponding state keys have been observed; accrual requires both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramMeta {
    pub program_id: String,
    /// Reward window start, Unix seconds.
    pub program_start_time: Option<i64>,
    /// Reward window end, Unix seconds.
    pub program_end_time: Option<i64>,
    pub emission_rate_per_hour: Decimal,
    /// Protocol-retained fraction of net harvestable yield, in [0, 1].
    pub dev_reward_fraction: Decimal,
    pub current_epoch_index: u64,
    /// Contract id of the token rewards are paid in.
    pub reward_token_id: Option<String>,
    /// Contract id of the token being staked.
    pub staking_token_id: Option<String>,
    /// Program-wide staked balance, used by the yield-per-second
    /// estimate.
    pub staked_balance: Decimal,
    /// Display-only annualized yield estimate. Defaults to 0; written
    /// by the ROI deriver.
    pub roi_yearly: Decimal,
    pub owner: Option<String>,
    pub dev_reward_wallet: Option<String>,
    pub developer: Option<String>,
    pub open_for_business: bool,
    pub contract_version: Option<String>,
    pub contract_type: Option<String>,
}

impl ProgramMeta {
    pub fn new(program_id: impl Into<String>) -> Self {
        ProgramMeta {
            program_id: program_id.into(),
            program_start_time: None,
            program_end_time: None,
            emission_rate_per_hour: Decimal::ZERO,
            dev_reward_fraction: Decimal::ZERO,
            current_epoch_index: 0,
            reward_token_id: None,
            staking_token_id: None,
            staked_balance: Decimal::ZERO,
            roi_yearly: Decimal::ZERO,
            owner: None,
            dev_reward_wallet: None,
            developer: None,
            open_for_business: false,
            contract_version: None,
            contract_type: None,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// EPOCH LEDGER
// ════════════════════════════════════════════════════════════════════════════

/// One epoch snapshot: the stake total fixed at epoch start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    pub epoch_index: u64,
    pub total_staked: Decimal,
    /// Epoch start, Unix seconds.
    pub epoch_start_time: i64,
    pub emission_rate_per_tau: Option<Decimal>,
}

// ════════════════════════════════════════════════════════════════════════════
// USER ACCOUNT
// ════════════════════════════════════════════════════════════════════════════

/// An amount a participant staked starting at a given epoch and time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub amount: Decimal,
    pub starting_epoch_index: u64,
    /// Deposit time, Unix seconds.
    pub deposit_time: i64,
}

/// Per-(participant, program) deposit/withdrawal projection.
///
/// The deposit sequence and the withdrawn-yield total are replaced
/// wholesale on each relevant event; the source diff always carries
/// the full current value, never a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub participant_id: String,
    pub program_id: String,
    pub deposits: Vec<Deposit>,
    pub withdrawn_yield: Decimal,
}

impl UserAccount {
    pub fn new(participant_id: impl Into<String>, program_id: impl Into<String>) -> Self {
        UserAccount {
            participant_id: participant_id.into(),
            program_id: program_id.into(),
            deposits: Vec::new(),
            withdrawn_yield: Decimal::ZERO,
        }
    }

    /// Full exit: deposits emptied, withdrawn yield back to 0.
    pub fn reset(&mut self) {
        self.deposits.clear();
        self.withdrawn_yield = Decimal::ZERO;
    }

    /// Sum of all deposit amounts currently staked by this account.
    pub fn total_staked(&self) -> Decimal {
        self.deposits.iter().map(|d| d.amount).sum()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// PROGRAM AGGREGATE
// ════════════════════════════════════════════════════════════════════════════

/// Metadata + epoch ledger + all user accounts of one program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramAggregate {
    pub meta: ProgramMeta,
    pub epochs: BTreeMap<u64, Epoch>,
    pub accounts: HashMap<String, UserAccount>,
}

impl ProgramAggregate {
    pub fn new(program_id: impl Into<String>) -> Self {
        ProgramAggregate {
            meta: ProgramMeta::new(program_id),
            epochs: BTreeMap::new(),
            accounts: HashMap::new(),
        }
    }

    /// Epoch ledger lookup.
    pub fn epoch(&self, index: u64) -> Option<&Epoch> {
        self.epochs.get(&index)
    }

    /// Inserts or replaces the ledger entry at `epoch.epoch_index`
    /// (idempotent) and refreshes the metadata's current-epoch pointer.
    ///
    /// An insert that would leave a hole in a non-empty ledger
    /// (`index > highest + 1`) makes the aggregate internally
    /// inconsistent and fails with [`ProjectionError::LedgerGap`]; the
    /// router aborts the whole program batch on it. An empty ledger
    /// accepts any starting index so a program first observed
    /// mid-history can still be tracked.
    pub fn upsert_epoch(&mut self, epoch: Epoch) -> Result<(), ProjectionError> {
        if let Some((&highest, _)) = self.epochs.last_key_value() {
            if epoch.epoch_index > highest + 1 {
                return Err(ProjectionError::LedgerGap {
                    program_id: self.meta.program_id.clone(),
                    epoch_index: highest + 1,
                });
            }
        }
        self.meta.current_epoch_index = epoch.epoch_index;
        self.epochs.insert(epoch.epoch_index, epoch);
        Ok(())
    }

    /// The index range the accrual calculator will read:
    /// `[lowest tracked, current_epoch_index]`. Contiguity inside the
    /// range is enforced at read time by the calculator.
    pub fn contiguous_range(&self) -> Option<(u64, u64)> {
        let (&lowest, _) = self.epochs.first_key_value()?;
        Some((lowest, self.meta.current_epoch_index))
    }

    pub fn account(&self, participant_id: &str) -> Option<&UserAccount> {
        self.accounts.get(participant_id)
    }

    /// Loads or creates the account for a participant.
    pub fn account_mut(&mut self, participant_id: &str) -> &mut UserAccount {
        let program_id = self.meta.program_id.clone();
        self.accounts
            .entry(participant_id.to_string())
            .or_insert_with(|| UserAccount::new(participant_id, program_id))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SNAPSHOT
// ════════════════════════════════════════════════════════════════════════════

/// A committed, immutable view of one program aggregate, as carried by
/// outbound notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramSnapshot {
    pub meta: ProgramMeta,
    /// Ledger entries in index order.
    pub epochs: Vec<Epoch>,
    pub accounts: Vec<UserAccount>,
}

impl From<&ProgramAggregate> for ProgramSnapshot {
    fn from(aggregate: &ProgramAggregate) -> Self {
        let mut accounts: Vec<UserAccount> = aggregate.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.participant_id.cmp(&b.participant_id));
        ProgramSnapshot {
            meta: aggregate.meta.clone(),
            epochs: aggregate.epochs.values().cloned().collect(),
            accounts,
        }
    }
}
