//! State-change router.
//!
//! Each processed block carries a list of raw `{key, value}` state
//! changes. The router parses every key, groups the changes by program
//! and applies each program's group as one atomic batch through the
//! aggregate store:
//!
//! - a malformed key or value drops that single change with a log
//!   line; the rest of the batch proceeds (last writer wins within a
//!   batch, in block order);
//! - an epoch-ledger gap aborts the whole program batch; the committed
//!   aggregate stays untouched and other programs in the block are
//!   unaffected;
//! - every committed program batch publishes exactly one
//!   [`EventKind::ProgramUpdated`] notification with the new snapshot.
//!
//! Routing is a declarative table from contract field name to handler.
//! Unknown fields are skipped silently so contract upgrades that add
//! state never stall ingestion.
//!
//! Two change classes feed the ROI deriver instead of an aggregate:
//! AMM `prices:{token}` keys and, after commit, any batch that rewrote
//! `EmissionRatePerHour`. Both are forwarded as [`RoiTrigger`]s over a
//! bounded channel; a full channel drops the trigger with a warning
//! (the next price tick or emission change re-derives anyway).

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use stakewatch_common::{decode, BlockDiff, StateKey};

use crate::error::ProjectionError;
use crate::notify::{EventKind, ProgramNotification, SnapshotPublisher};
use crate::roi::RoiTrigger;
use crate::state::{Deposit, Epoch, ProgramAggregate};
use crate::store::AggregateStore;

// ════════════════════════════════════════════════════════════════════════════
// ROUTE TABLE
// ════════════════════════════════════════════════════════════════════════════

/// One raw state change scoped to a program, key already parsed.
struct ProgramEvent<'a> {
    field: &'a str,
    subkey: Option<&'a str>,
    value: &'a Value,
}

/// Context a handler sees besides the aggregate.
struct EventCtx<'a> {
    subkey: Option<&'a str>,
    value: &'a Value,
    /// The block's top-level function was the program's full-exit
    /// function.
    full_exit: bool,
}

/// What a successfully applied change implies for downstream work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Plain,
    EmissionRateChanged,
}

type Handler = fn(&mut ProgramAggregate, &EventCtx<'_>) -> Result<Applied, ProjectionError>;

struct Route {
    field: &'static str,
    wants_subkey: bool,
    handler: Handler,
}

const ROUTES: &[Route] = &[
    Route { field: "Owner", wants_subkey: false, handler: apply_owner },
    Route { field: "DevRewardWallet", wants_subkey: false, handler: apply_dev_reward_wallet },
    Route { field: "StakedBalance", wants_subkey: false, handler: apply_staked_balance },
    Route { field: "EmissionRatePerHour", wants_subkey: false, handler: apply_emission_rate },
    Route { field: "DevRewardPct", wants_subkey: false, handler: apply_dev_reward_pct },
    Route { field: "StartTime", wants_subkey: false, handler: apply_start_time },
    Route { field: "EndTime", wants_subkey: false, handler: apply_end_time },
    Route { field: "OpenForBusiness", wants_subkey: false, handler: apply_open_for_business },
    Route { field: "__developer__", wants_subkey: false, handler: apply_developer },
    Route { field: "CurrentEpochIndex", wants_subkey: false, handler: apply_current_epoch_index },
    Route { field: "meta", wants_subkey: true, handler: apply_meta },
    Route { field: "Epochs", wants_subkey: true, handler: apply_epoch },
    Route { field: "Deposits", wants_subkey: true, handler: apply_deposits },
    Route { field: "Withdrawals", wants_subkey: true, handler: apply_withdrawals },
];

fn apply_owner(agg: &mut ProgramAggregate, ctx: &EventCtx<'_>) -> Result<Applied, ProjectionError> {
    agg.meta.owner = Some(decode::text(ctx.value)?);
    Ok(Applied::Plain)
}

fn apply_dev_reward_wallet(
    agg: &mut ProgramAggregate,
    ctx: &EventCtx<'_>,
) -> Result<Applied, ProjectionError> {
    agg.meta.dev_reward_wallet = Some(decode::text(ctx.value)?);
    Ok(Applied::Plain)
}

fn apply_staked_balance(
    agg: &mut ProgramAggregate,
    ctx: &EventCtx<'_>,
) -> Result<Applied, ProjectionError> {
    agg.meta.staked_balance = decode::decimal(ctx.value)?;
    Ok(Applied::Plain)
}

fn apply_emission_rate(
    agg: &mut ProgramAggregate,
    ctx: &EventCtx<'_>,
) -> Result<Applied, ProjectionError> {
    agg.meta.emission_rate_per_hour = decode::decimal(ctx.value)?;
    Ok(Applied::EmissionRateChanged)
}

fn apply_dev_reward_pct(
    agg: &mut ProgramAggregate,
    ctx: &EventCtx<'_>,
) -> Result<Applied, ProjectionError> {
    let fraction = decode::decimal(ctx.value)?;
    if fraction < Decimal::ZERO || fraction > Decimal::ONE {
        return Err(ProjectionError::Validation(format!(
            "dev reward fraction {} outside [0, 1]",
            fraction
        )));
    }
    agg.meta.dev_reward_fraction = fraction;
    Ok(Applied::Plain)
}

fn apply_start_time(
    agg: &mut ProgramAggregate,
    ctx: &EventCtx<'_>,
) -> Result<Applied, ProjectionError> {
    agg.meta.program_start_time = Some(decode::unix_time(ctx.value)?);
    Ok(Applied::Plain)
}

fn apply_end_time(
    agg: &mut ProgramAggregate,
    ctx: &EventCtx<'_>,
) -> Result<Applied, ProjectionError> {
    agg.meta.program_end_time = Some(decode::unix_time(ctx.value)?);
    Ok(Applied::Plain)
}

fn apply_open_for_business(
    agg: &mut ProgramAggregate,
    ctx: &EventCtx<'_>,
) -> Result<Applied, ProjectionError> {
    agg.meta.open_for_business = decode::boolean(ctx.value)?;
    Ok(Applied::Plain)
}

fn apply_developer(
    agg: &mut ProgramAggregate,
    ctx: &EventCtx<'_>,
) -> Result<Applied, ProjectionError> {
    agg.meta.developer = Some(decode::text(ctx.value)?);
    Ok(Applied::Plain)
}

fn apply_current_epoch_index(
    agg: &mut ProgramAggregate,
    ctx: &EventCtx<'_>,
) -> Result<Applied, ProjectionError> {
    agg.meta.current_epoch_index = decode::index(ctx.value)?;
    Ok(Applied::Plain)
}

/// `meta:{subkey}` carries contract self-description.
fn apply_meta(agg: &mut ProgramAggregate, ctx: &EventCtx<'_>) -> Result<Applied, ProjectionError> {
    let subkey = required_subkey(ctx)?;
    let text = decode::text(ctx.value)?;
    match subkey {
        "version" => agg.meta.contract_version = Some(text),
        "type" => agg.meta.contract_type = Some(text),
        "STAKING_TOKEN" => agg.meta.staking_token_id = Some(text),
        "YIELD_TOKEN" => agg.meta.reward_token_id = Some(text),
        other => {
            debug!(program_id = %agg.meta.program_id, subkey = other, "unknown meta subkey");
        }
    }
    Ok(Applied::Plain)
}

fn apply_epoch(agg: &mut ProgramAggregate, ctx: &EventCtx<'_>) -> Result<Applied, ProjectionError> {
    let subkey = required_subkey(ctx)?;
    let epoch_index: u64 = subkey.parse().map_err(|_| {
        ProjectionError::Validation(format!("epoch index is not an integer: {}", subkey))
    })?;
    let decoded = decode::epoch(ctx.value)?;
    agg.upsert_epoch(Epoch {
        epoch_index,
        total_staked: decoded.staked,
        epoch_start_time: decoded.time,
        emission_rate_per_tau: decoded.emission_rate_per_tau,
    })?;
    Ok(Applied::Plain)
}

/// `Deposits:{participant}` replaces the participant's deposit list
/// wholesale; the source always carries the full current list. When the
/// block's function is the full-exit function the account is reset
/// instead, whatever the value says.
fn apply_deposits(
    agg: &mut ProgramAggregate,
    ctx: &EventCtx<'_>,
) -> Result<Applied, ProjectionError> {
    let participant = required_subkey(ctx)?;
    if ctx.full_exit {
        agg.account_mut(participant).reset();
        return Ok(Applied::Plain);
    }

    let decoded = decode::deposits(ctx.value)?;
    let current = agg.meta.current_epoch_index;
    let mut deposits = Vec::with_capacity(decoded.len());
    for entry in decoded {
        if entry.amount <= Decimal::ZERO {
            return Err(ProjectionError::Validation(format!(
                "non-positive deposit amount {} for {}",
                entry.amount, participant
            )));
        }
        if entry.starting_epoch_index > current {
            return Err(ProjectionError::Validation(format!(
                "deposit starting epoch {} beyond current epoch {} for {}",
                entry.starting_epoch_index, current, participant
            )));
        }
        deposits.push(Deposit {
            amount: entry.amount,
            starting_epoch_index: entry.starting_epoch_index,
            deposit_time: entry.deposit_time,
        });
    }
    agg.account_mut(participant).deposits = deposits;
    Ok(Applied::Plain)
}

/// `Withdrawals:{participant}` replaces the withdrawn-yield total.
fn apply_withdrawals(
    agg: &mut ProgramAggregate,
    ctx: &EventCtx<'_>,
) -> Result<Applied, ProjectionError> {
    let participant = required_subkey(ctx)?;
    if ctx.full_exit {
        agg.account_mut(participant).reset();
        return Ok(Applied::Plain);
    }
    agg.account_mut(participant).withdrawn_yield = decode::decimal(ctx.value)?;
    Ok(Applied::Plain)
}

fn required_subkey<'a>(ctx: &EventCtx<'a>) -> Result<&'a str, ProjectionError> {
    ctx.subkey
        .ok_or_else(|| ProjectionError::Validation("missing subkey".to_string()))
}

// ════════════════════════════════════════════════════════════════════════════
// ROUTER
// ════════════════════════════════════════════════════════════════════════════

/// Routes block state changes into per-program atomic commits.
pub struct StateRouter<S: AggregateStore> {
    store: Arc<S>,
    publisher: Arc<SnapshotPublisher>,
    triggers: mpsc::Sender<RoiTrigger>,
    full_exit_fn: String,
}

impl<S: AggregateStore> StateRouter<S> {
    pub fn new(
        store: Arc<S>,
        publisher: Arc<SnapshotPublisher>,
        triggers: mpsc::Sender<RoiTrigger>,
        full_exit_fn: impl Into<String>,
    ) -> Self {
        StateRouter {
            store,
            publisher,
            triggers,
            full_exit_fn: full_exit_fn.into(),
        }
    }

    /// Processes one block's state changes. Never fails: per-change and
    /// per-program errors are logged and contained.
    pub fn process_block(&self, block: &BlockDiff) {
        let full_exit = block.fn_name == self.full_exit_fn;

        // Group by program, first-seen order, keeping block order
        // within each group.
        let mut groups: Vec<(&str, Vec<ProgramEvent<'_>>)> = Vec::new();
        for pair in &block.state {
            let Some(key) = StateKey::parse(&pair.key) else {
                debug!(key = %pair.key, "unparseable state key, skipping");
                continue;
            };

            if key.field == "prices" {
                self.forward_price(&key, &pair.value);
                continue;
            }

            let event = ProgramEvent {
                field: key.field,
                subkey: key.subkey,
                value: &pair.value,
            };
            match groups.iter_mut().find(|(id, _)| *id == key.id) {
                Some((_, events)) => events.push(event),
                None => groups.push((key.id, vec![event])),
            }
        }

        for (program_id, events) in groups {
            self.commit_program(program_id, &events, full_exit, &block.hash);
        }
    }

    fn commit_program(
        &self,
        program_id: &str,
        events: &[ProgramEvent<'_>],
        full_exit: bool,
        block_hash: &str,
    ) {
        let mut emission_changed = false;

        let committed = self.store.update(program_id, &mut |agg| {
            for event in events {
                let Some(route) = ROUTES.iter().find(|r| r.field == event.field) else {
                    debug!(program_id, field = event.field, "unknown field, skipping");
                    continue;
                };
                if route.wants_subkey != event.subkey.is_some() {
                    warn!(
                        program_id,
                        field = event.field,
                        "key shape mismatch, dropping change"
                    );
                    continue;
                }

                let ctx = EventCtx {
                    subkey: event.subkey,
                    value: event.value,
                    full_exit,
                };
                match (route.handler)(agg, &ctx) {
                    Ok(Applied::EmissionRateChanged) => emission_changed = true,
                    Ok(Applied::Plain) => {}
                    Err(ProjectionError::Validation(reason)) => {
                        warn!(program_id, field = event.field, %reason, "dropping change");
                    }
                    Err(fatal) => return Err(fatal),
                }
            }
            Ok(())
        });

        let snapshot = match committed {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warn!(program_id, block_hash, %error, "program batch aborted");
                return;
            }
        };

        self.publisher.publish(ProgramNotification {
            event_kind: EventKind::ProgramUpdated,
            program_id: program_id.to_string(),
            snapshot,
        });

        if emission_changed {
            self.send_trigger(RoiTrigger::EmissionRate {
                program_id: program_id.to_string(),
            });
        }
    }

    /// `prices:{token}` on the AMM contract is not program state; it
    /// feeds the ROI deriver directly.
    fn forward_price(&self, key: &StateKey<'_>, value: &Value) {
        let Some(token_id) = key.subkey else {
            debug!(key_id = key.id, "price key without token, skipping");
            return;
        };
        match decode::decimal(value) {
            Ok(price) => self.send_trigger(RoiTrigger::Price {
                token_id: token_id.to_string(),
                price,
            }),
            Err(error) => {
                warn!(token_id, %error, "malformed price value, skipping");
            }
        }
    }

    fn send_trigger(&self, trigger: RoiTrigger) {
        match self.triggers.try_send(trigger) {
            Ok(()) => {}
            Err(TrySendError::Full(t)) => {
                warn!(trigger = ?t, "trigger channel full, dropping");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("roi deriver gone, dropping trigger");
            }
        }
    }
}
