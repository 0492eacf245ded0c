//! Error types raised from fallible, non-solve-time entry points (SPEC_FULL.md §7, §10).
//!
//! A propagation conflict (SPEC_FULL.md §7 outcome 1) is deliberately *not* represented here:
//! it is the ordinary `false`/`Err(Conflict)` return of `propagate`/`check`, the main
//! control-flow channel of a CP propagator rather than an exceptional condition.

use thiserror::Error;

/// Failures raised while registering constraints or running `init`, before search begins.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InitializationError {
    #[error("min_int ({min_int}) must not exceed max_int ({max_int})")]
    InconsistentBounds { min_int: i32, max_int: i32 },

    #[error("constraint references unknown variable `{name}`")]
    UnknownVariable { name: Box<str> },

    #[error("variable `{variable}` was given an empty domain")]
    EmptyDomain { variable: Box<str> },

    #[error("host rejected a root-level clause or weight constraint during initialisation")]
    HostRejected,
}

/// A detected root-level or propagation-time contradiction.
///
/// Distinct from [`InitializationError`]: a conflict is a normal outcome of propagation, not a
/// misuse of the API. Engine-internal methods return `Result<(), Conflict>` so that `?` reads
/// naturally; the facade's public, host-facing methods collapse this into the plain `bool`
/// SPEC_FULL.md §6.1 calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Conflict;
