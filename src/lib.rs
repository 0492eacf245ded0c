//! # ordinal-cp
//!
//! An integer constraint-programming propagator that plugs into an external Boolean search
//! engine through a propagator callback interface: `init`, `propagate`, `check`, `undo`,
//! `check_full`. It accepts linear sum constraints, explicit domain statements, all-different
//! ("distinct") constraints and a single linear minimize objective, each tagged with a Boolean
//! activation literal owned by the host. For every thread of the host's search it keeps
//! integer-variable bounds consistent with the literals the host has asserted, mints new order
//! literals on demand, and reports implications back as clauses.
//!
//! This crate does not search and does not implement a SAT/ASP engine: the host and the
//! constraint-normalizing front end that feeds [`propagator::InitSpec`] are out of scope.
//!
//! A host binding implements [`host::HostInit`]/[`host::HostControl`] over its own search loop;
//! everything else is driven through [`propagator::Propagator`]:
//!
//! ```text
//! let mut propagator = Propagator::new(PropagatorConfig::default());
//! let spec = InitSpec {
//!     variables: vec![VariableSpec { name: "x".into(), min_bound: -20, max_bound: 20 }],
//!     sums: vec![SumInput {
//!         activation: Literal::TRUE,
//!         elements: vec![Term { coef: 1, var: "x".into() }],
//!         rhs: 5,
//!         strict: true,
//!     }],
//!     ..InitSpec::default()
//! };
//! propagator.init(&mut host, 1, spec)?;
//! assert_eq!(propagator.get_assignment(0), vec![("x".to_string(), 5)]);
//! ```

pub mod basic_types;
pub mod config;
pub mod engine;
pub mod error;
pub mod host;
pub mod propagator;

pub use basic_types::Literal;

#[cfg(test)]
mod tests;
