use std::num::NonZero;

use super::keyed_vec::StorageKey;

/// Identifies an integer variable known to the engine.
///
/// Allocated in order as constraints are registered; stable for the lifetime of a solving step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct VarId(NonZero<u32>);

impl StorageKey for VarId {
    fn index(&self) -> usize {
        self.0.get() as usize - 1
    }

    fn create_from_index(index: usize) -> Self {
        VarId(NonZero::new(index as u32 + 1).expect("index + 1 does not overflow u32"))
    }
}

/// Identifies a registered constraint state (sum or distinct) within one thread's [`State`].
///
/// [`State`]: crate::engine::state::State
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ConstraintId(NonZero<u32>);

impl StorageKey for ConstraintId {
    fn index(&self) -> usize {
        self.0.get() as usize - 1
    }

    fn create_from_index(index: usize) -> Self {
        ConstraintId(NonZero::new(index as u32 + 1).expect("index + 1 does not overflow u32"))
    }
}
