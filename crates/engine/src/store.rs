//! Aggregate repository.
//!
//! The router and the ROI deriver never touch a persistence session
//! directly; they go through [`AggregateStore`], an explicit repository
//! interface injected at construction. [`MemoryStore`] is the in-memory
//! implementation used by the engine and by every unit test; a durable
//! collaborator can implement the same trait.
//!
//! ## Guarantees
//!
//! - **All-or-nothing**: [`AggregateStore::update`] runs the mutation
//!   on a clone of the committed aggregate and swaps it in only when
//!   the mutation succeeds. A failed update leaves the committed state
//!   byte-for-byte untouched.
//! - **Single writer per aggregate**: each program has its own mutex.
//!   Router commits and ROI write-backs for the same program are
//!   serialized against it; different programs proceed in parallel.
//! - **Committed reads**: [`AggregateStore::load`] clones under the
//!   same mutex, so a reader can never observe an aggregate mid-update.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::ProjectionError;
use crate::state::{ProgramAggregate, ProgramSnapshot};

/// Mutation applied to a program aggregate under its write lock.
pub type ApplyFn<'a> = &'a mut dyn FnMut(&mut ProgramAggregate) -> Result<(), ProjectionError>;

/// Explicit repository interface for program aggregates.
pub trait AggregateStore: Send + Sync + 'static {
    /// Returns a committed snapshot of the aggregate, or `None` when
    /// the program has never been observed.
    fn load(&self, program_id: &str) -> Option<ProgramAggregate>;

    /// Applies `apply` to the aggregate (created empty when absent)
    /// under the program's write lock, committing all-or-nothing.
    /// Returns the snapshot of the newly committed state.
    fn update(
        &self,
        program_id: &str,
        apply: ApplyFn<'_>,
    ) -> Result<ProgramSnapshot, ProjectionError>;

    /// All tracked program ids.
    fn program_ids(&self) -> Vec<String>;

    /// Programs whose reward token matches `token_id`.
    fn programs_for_reward_token(&self, token_id: &str) -> Vec<String>;
}

/// In-memory aggregate store with one mutex per program.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: RwLock<HashMap<String, Arc<Mutex<ProgramAggregate>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, program_id: &str) -> Option<Arc<Mutex<ProgramAggregate>>> {
        self.slots.read().get(program_id).cloned()
    }

    fn slot_or_create(&self, program_id: &str) -> Arc<Mutex<ProgramAggregate>> {
        if let Some(slot) = self.slot(program_id) {
            return slot;
        }
        let mut slots = self.slots.write();
        slots
            .entry(program_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ProgramAggregate::new(program_id))))
            .clone()
    }
}

impl AggregateStore for MemoryStore {
    fn load(&self, program_id: &str) -> Option<ProgramAggregate> {
        self.slot(program_id).map(|slot| slot.lock().clone())
    }

    fn update(
        &self,
        program_id: &str,
        apply: ApplyFn<'_>,
    ) -> Result<ProgramSnapshot, ProjectionError> {
        let slot = self.slot_or_create(program_id);
        let mut committed = slot.lock();

        // Mutate a draft; the committed aggregate is replaced only on
        // success, so an aborted batch leaves it untouched.
        let mut draft = committed.clone();
        apply(&mut draft)?;
        *committed = draft;
        Ok(ProgramSnapshot::from(&*committed))
    }

    fn program_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.slots.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn programs_for_reward_token(&self, token_id: &str) -> Vec<String> {
        let slots: Vec<Arc<Mutex<ProgramAggregate>>> =
            self.slots.read().values().cloned().collect();
        let mut ids: Vec<String> = slots
            .iter()
            .filter_map(|slot| {
                let aggregate = slot.lock();
                match aggregate.meta.reward_token_id.as_deref() {
                    Some(token) if token == token_id => {
                        Some(aggregate.meta.program_id.clone())
                    }
                    _ => None,
                }
            })
            .collect();
        ids.sort();
        ids
    }
}
