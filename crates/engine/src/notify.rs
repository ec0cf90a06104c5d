//! Outbound snapshot notifications.
//!
//! The UI collaborator consumes `{event_kind, program_id, snapshot}`
//! messages, fire-and-forget. The channel is bounded: block ingestion
//! must never stall behind a slow consumer, so when the buffer is full
//! the new notification is dropped with a warning and counted. The
//! consumer always converges on the latest committed snapshot with the
//! next successful send.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::state::ProgramSnapshot;

/// What a notification announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    /// A block batch was committed for the program.
    ProgramUpdated,
    /// The ROI deriver rewrote the program's `roi_yearly`.
    RoiUpdated,
}

/// One outbound message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramNotification {
    pub event_kind: EventKind,
    pub program_id: String,
    pub snapshot: ProgramSnapshot,
}

/// Bounded, non-blocking publisher of committed snapshots.
#[derive(Debug)]
pub struct SnapshotPublisher {
    tx: mpsc::Sender<ProgramNotification>,
    dropped: AtomicU64,
}

impl SnapshotPublisher {
    /// Creates a publisher and the receiving end the UI collaborator
    /// drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgramNotification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            SnapshotPublisher {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Publishes a notification without blocking. A full buffer drops
    /// the message (backpressure policy); a closed channel is treated
    /// as "no consumer" and ignored.
    pub fn publish(&self, notification: ProgramNotification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(n)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    program_id = %n.program_id,
                    dropped_total = total,
                    "notification buffer full, dropping message"
                );
            }
            Err(TrySendError::Closed(n)) => {
                debug!(program_id = %n.program_id, "notification consumer gone");
            }
        }
    }

    /// Number of notifications dropped because the consumer lagged.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
