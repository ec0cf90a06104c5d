//! Pipeline assembly.
//!
//! Wires store, router, ROI deriver and notification channel from a
//! [`Config`]. The caller feeds block diffs in, drains notifications
//! out, and optionally spawns the deriver loop on its runtime.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use stakewatch_common::config::Config;
use stakewatch_common::BlockDiff;

use crate::notify::{ProgramNotification, SnapshotPublisher};
use crate::roi::{RoiDeriver, RoiTrigger};
use crate::router::StateRouter;
use crate::service::YieldService;
use crate::store::MemoryStore;

/// A fully wired projection pipeline over the in-memory store.
pub struct Pipeline {
    store: Arc<MemoryStore>,
    router: StateRouter<MemoryStore>,
    deriver: Arc<RoiDeriver<MemoryStore>>,
    /// Taken once by [`Pipeline::spawn_roi_deriver`].
    triggers: Option<mpsc::Receiver<RoiTrigger>>,
}

impl Pipeline {
    /// Builds the pipeline and hands back the notification receiver the
    /// UI collaborator drains.
    pub fn new(config: &Config) -> (Self, mpsc::Receiver<ProgramNotification>) {
        let store = Arc::new(MemoryStore::new());
        let (publisher, notifications) = SnapshotPublisher::channel(config.notify_capacity());
        let publisher = Arc::new(publisher);
        let (trigger_tx, triggers) = mpsc::channel(config.trigger_capacity());

        let router = StateRouter::new(
            Arc::clone(&store),
            Arc::clone(&publisher),
            trigger_tx,
            config.full_exit_fn(),
        );
        let deriver = Arc::new(RoiDeriver::new(Arc::clone(&store), publisher));

        info!(
            notify_capacity = config.notify_capacity(),
            trigger_capacity = config.trigger_capacity(),
            full_exit_fn = config.full_exit_fn(),
            "pipeline assembled"
        );

        (
            Pipeline {
                store,
                router,
                deriver,
                triggers: Some(triggers),
            },
            notifications,
        )
    }

    /// Feeds one block diff through the router.
    pub fn process_block(&self, block: &BlockDiff) {
        self.router.process_block(block);
    }

    /// Spawns the ROI deriver loop on the current runtime. Returns
    /// `None` if it was already spawned.
    pub fn spawn_roi_deriver(&mut self) -> Option<JoinHandle<()>> {
        let triggers = self.triggers.take()?;
        Some(tokio::spawn(Arc::clone(&self.deriver).run(triggers)))
    }

    /// Read-side service over the pipeline's store.
    pub fn yield_service(&self) -> YieldService<MemoryStore> {
        YieldService::new(Arc::clone(&self.store))
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AggregateStore;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[tokio::test]
    async fn assembled_pipeline_projects_and_derives() {
        let (mut pipeline, mut notifications) = Pipeline::new(&Config::default());
        let deriver = pipeline.spawn_roi_deriver().unwrap();
        assert!(pipeline.spawn_roi_deriver().is_none());

        let block = serde_json::from_value(json!({
            "state": [
                { "key": "con_staking.StakedBalance", "value": { "__fixed__": "100" } }
            ],
            "fn": "addStakingTokens",
            "contract": "con_staking",
            "timestamp": 1_700_000_000,
            "hash": "b1"
        }))
        .unwrap();
        pipeline.process_block(&block);

        let n = notifications.recv().await.unwrap();
        assert_eq!(n.program_id, "con_staking");
        assert_eq!(
            pipeline
                .store()
                .load("con_staking")
                .unwrap()
                .meta
                .staked_balance,
            dec!(100)
        );

        drop(pipeline);
        deriver.await.unwrap();
    }
}
