//! # Stakewatch Engine Crate
//!
//! Projection and yield-accrual engine for on-chain staking programs.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Engine                                 │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  block diffs ──▶ StateRouter ──▶ AggregateStore ──▶ snapshots    │
//! │                      │               │                  │        │
//! │                      │ RoiTrigger    │ committed        ▼        │
//! │                      ▼               │ reads    SnapshotPublisher│
//! │                  RoiDeriver ─────────┘                  │        │
//! │                      │ roi_yearly write-back            ▼        │
//! │                      └──▶ AggregateStore          UI consumer    │
//! │                                                                  │
//! │  YieldService (read side) ──▶ accrual::harvestable_yield        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//! - `state`: projected entities and the per-program aggregate
//! - `store`: aggregate repository with all-or-nothing commits
//! - `router`: block state changes → per-program atomic batches
//! - `accrual`: pure harvestable-yield calculator
//! - `roi`: annualized-yield deriver fed by router triggers
//! - `notify`: bounded outbound snapshot notifications
//! - `service`: read-side yield views
//! - `pipeline`: config-driven assembly of the above
//! - `error`: the engine's error taxonomy

pub mod accrual;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod roi;
pub mod router;
pub mod service;
pub mod state;
pub mod store;

pub use error::ProjectionError;
pub use notify::{EventKind, ProgramNotification, SnapshotPublisher};
pub use pipeline::Pipeline;
pub use roi::{RoiDeriver, RoiTrigger};
pub use router::StateRouter;
pub use service::{YieldInfo, YieldService};
pub use state::{Deposit, Epoch, ProgramAggregate, ProgramMeta, ProgramSnapshot, UserAccount};
pub use store::{AggregateStore, MemoryStore};
