//! ROI deriver.
//!
//! Consumes [`RoiTrigger`]s published by the router over a bounded
//! channel and rewrites the display-only `roi_yearly` estimate:
//!
//! - a price tick updates the deriver's price book and recomputes
//!   every program whose reward token matches;
//! - an emission-rate change recomputes that single program.
//!
//! `roi_yearly = round(price × emission_rate_per_hour × 24 × 365 × 100)`.
//! A program whose reward-token price has never been observed keeps its
//! previous value; the next price tick catches it up.
//!
//! Write-backs go through the same per-program store lock as router
//! commits, so a recompute never interleaves with a half-applied block
//! batch. Each write-back publishes one [`EventKind::RoiUpdated`]
//! notification.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::notify::{EventKind, ProgramNotification, SnapshotPublisher};
use crate::store::AggregateStore;

/// A change that may move a program's annualized yield estimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoiTrigger {
    /// Latest AMM price of a token.
    Price { token_id: String, price: Decimal },
    /// A program rewrote its `EmissionRatePerHour`.
    EmissionRate { program_id: String },
}

/// Recomputes `roi_yearly` from the latest observed prices.
pub struct RoiDeriver<S: AggregateStore> {
    store: Arc<S>,
    publisher: Arc<SnapshotPublisher>,
    /// Latest pushed price per token id.
    prices: RwLock<HashMap<String, Decimal>>,
}

impl<S: AggregateStore> RoiDeriver<S> {
    pub fn new(store: Arc<S>, publisher: Arc<SnapshotPublisher>) -> Self {
        RoiDeriver {
            store,
            publisher,
            prices: RwLock::new(HashMap::new()),
        }
    }

    /// Drains the trigger channel until every sender is gone.
    pub async fn run(self: Arc<Self>, mut triggers: mpsc::Receiver<RoiTrigger>) {
        info!("roi deriver started");
        while let Some(trigger) = triggers.recv().await {
            self.handle(trigger);
        }
        info!("trigger channel closed, roi deriver stopping");
    }

    /// Applies one trigger synchronously.
    pub fn handle(&self, trigger: RoiTrigger) {
        match trigger {
            RoiTrigger::Price { token_id, price } => {
                self.prices.write().insert(token_id.clone(), price);
                for program_id in self.store.programs_for_reward_token(&token_id) {
                    self.recompute(&program_id);
                }
            }
            RoiTrigger::EmissionRate { program_id } => self.recompute(&program_id),
        }
    }

    /// Latest known price for a token, if any was observed.
    pub fn price_of(&self, token_id: &str) -> Option<Decimal> {
        self.prices.read().get(token_id).copied()
    }

    fn recompute(&self, program_id: &str) {
        let Some(aggregate) = self.store.load(program_id) else {
            debug!(program_id, "roi trigger for unknown program");
            return;
        };
        let Some(token_id) = aggregate.meta.reward_token_id else {
            debug!(program_id, "program has no reward token yet");
            return;
        };
        let Some(price) = self.price_of(&token_id) else {
            debug!(program_id, %token_id, "no price observed yet, keeping roi");
            return;
        };

        let roi_yearly = annualized_roi(price, aggregate.meta.emission_rate_per_hour);

        let committed = self.store.update(program_id, &mut |agg| {
            agg.meta.roi_yearly = roi_yearly;
            Ok(())
        });
        match committed {
            Ok(snapshot) => {
                self.publisher.publish(ProgramNotification {
                    event_kind: EventKind::RoiUpdated,
                    program_id: program_id.to_string(),
                    snapshot,
                });
            }
            Err(error) => {
                warn!(program_id, %error, "roi write-back failed");
            }
        }
    }
}

/// `round(price × hourly rate × 24 × 365 × 100)`, rounded only here,
/// on the externally reported number.
fn annualized_roi(price: Decimal, emission_rate_per_hour: Decimal) -> Decimal {
    let yearly_emission = emission_rate_per_hour * Decimal::from(24) * Decimal::from(365);
    (price * yearly_emission * Decimal::from(100)).round()
}
