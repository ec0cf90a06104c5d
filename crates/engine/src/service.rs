//! Read-side yield service.
//!
//! Combines the committed aggregate with the accrual calculator into
//! the view a UI asks for: "what can this participant harvest right
//! now, and how fast is it growing". Reads are taken from committed
//! snapshots only; the service never writes.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::accrual;
use crate::error::ProjectionError;
use crate::state::{Epoch, ProgramSnapshot};
use crate::store::AggregateStore;

/// Point-in-time yield view for one (program, participant) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YieldInfo {
    pub current_yield: Decimal,
    /// Best-effort growth estimate, not a settlement number.
    pub yield_per_sec: Decimal,
    /// The `now` the view was computed at, Unix seconds.
    pub time_updated: i64,
    /// The program's current epoch at computation time.
    pub epoch_updated: u64,
}

pub struct YieldService<S: AggregateStore> {
    store: Arc<S>,
}

impl<S: AggregateStore> YieldService<S> {
    pub fn new(store: Arc<S>) -> Self {
        YieldService { store }
    }

    /// Computes the participant's harvestable yield as of `now`.
    pub fn user_yield(
        &self,
        program_id: &str,
        participant_id: &str,
        now: i64,
    ) -> Result<YieldInfo, ProjectionError> {
        let aggregate = self
            .store
            .load(program_id)
            .ok_or_else(|| ProjectionError::NotFound(format!("program {}", program_id)))?;
        let account = aggregate.account(participant_id).ok_or_else(|| {
            ProjectionError::NotFound(format!(
                "account {} in program {}",
                participant_id, program_id
            ))
        })?;

        let current_yield =
            accrual::harvestable_yield(&aggregate.meta, &aggregate.epochs, account, now)?;
        let yield_per_sec = accrual::yield_per_second(&aggregate.meta, account.total_staked());

        Ok(YieldInfo {
            current_yield,
            yield_per_sec,
            time_updated: now,
            epoch_updated: aggregate.meta.current_epoch_index,
        })
    }

    /// Committed snapshot of a program.
    pub fn program(&self, program_id: &str) -> Result<ProgramSnapshot, ProjectionError> {
        self.store
            .load(program_id)
            .map(|aggregate| ProgramSnapshot::from(&aggregate))
            .ok_or_else(|| ProjectionError::NotFound(format!("program {}", program_id)))
    }

    /// One ledger entry of a program.
    pub fn epoch(&self, program_id: &str, index: u64) -> Result<Epoch, ProjectionError> {
        let aggregate = self
            .store
            .load(program_id)
            .ok_or_else(|| ProjectionError::NotFound(format!("program {}", program_id)))?;
        aggregate.epoch(index).cloned().ok_or_else(|| {
            ProjectionError::NotFound(format!("epoch {} of program {}", index, program_id))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Deposit;
    use crate::store::MemoryStore;
    use rust_decimal_macros::dec;

    const T0: i64 = 1_700_000_000;
    const HOUR: i64 = 3_600;

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .update("con_staking", &mut |agg| {
                agg.meta.program_start_time = Some(T0);
                agg.meta.program_end_time = Some(T0 + 24 * HOUR);
                agg.meta.emission_rate_per_hour = dec!(10);
                agg.meta.dev_reward_fraction = dec!(0.1);
                agg.meta.staked_balance = dec!(200);
                agg.upsert_epoch(Epoch {
                    epoch_index: 0,
                    total_staked: dec!(100),
                    epoch_start_time: T0,
                    emission_rate_per_tau: None,
                })?;
                agg.upsert_epoch(Epoch {
                    epoch_index: 1,
                    total_staked: dec!(200),
                    epoch_start_time: T0 + HOUR,
                    emission_rate_per_tau: None,
                })?;
                agg.account_mut("vk1").deposits.push(Deposit {
                    amount: dec!(100),
                    starting_epoch_index: 0,
                    deposit_time: T0,
                });
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn user_yield_combines_accrual_and_rate() {
        let service = YieldService::new(seeded_store());
        let info = service
            .user_yield("con_staking", "vk1", T0 + 2 * HOUR)
            .unwrap();
        assert_eq!(info.current_yield, dec!(13.5));
        // (10/3600) × (100/200) per second
        assert_eq!(info.yield_per_sec * Decimal::from(3_600), dec!(5));
        assert_eq!(info.time_updated, T0 + 2 * HOUR);
        assert_eq!(info.epoch_updated, 1);
    }

    #[test]
    fn unknown_program_is_not_found() {
        let service = YieldService::new(seeded_store());
        let err = service.user_yield("con_ghost", "vk1", T0).unwrap_err();
        assert!(matches!(err, ProjectionError::NotFound(_)));
        assert!(matches!(
            service.program("con_ghost").unwrap_err(),
            ProjectionError::NotFound(_)
        ));
    }

    #[test]
    fn unknown_account_is_not_found() {
        let service = YieldService::new(seeded_store());
        let err = service
            .user_yield("con_staking", "vk_ghost", T0)
            .unwrap_err();
        assert!(matches!(err, ProjectionError::NotFound(_)));
    }

    #[test]
    fn epoch_lookup() {
        let service = YieldService::new(seeded_store());
        assert_eq!(
            service.epoch("con_staking", 1).unwrap().total_staked,
            dec!(200)
        );
        assert!(matches!(
            service.epoch("con_staking", 9).unwrap_err(),
            ProjectionError::NotFound(_)
        ));
    }

    #[test]
    fn program_snapshot_is_committed_view() {
        let service = YieldService::new(seeded_store());
        let snapshot = service.program("con_staking").unwrap();
        assert_eq!(snapshot.epochs.len(), 2);
        assert_eq!(snapshot.accounts.len(), 1);
        assert_eq!(snapshot.accounts[0].participant_id, "vk1");
    }
}
