//! Small index and identifier types shared across the engine.

mod keyed_vec;
mod literal;
mod var_id;

pub(crate) use keyed_vec::KeyedVec;
pub(crate) use keyed_vec::StorageKey;
pub use literal::Literal;
pub(crate) use var_id::ConstraintId;
pub(crate) use var_id::VarId;

/// Static domain extrema used when a variable has not been given explicit bounds.
///
/// The reference implementation uses `2**32`; we use the `i32` extrema minus a margin so that
/// bound arithmetic (`value + 1`, `-value`) never overflows `i32`.
pub(crate) const MIN_INT: i32 = i32::MIN + 1;
pub(crate) const MAX_INT: i32 = i32::MAX - 1;
