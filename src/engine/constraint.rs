//! Constraint input shapes handed to the engine by the (out-of-scope) translator
//! (SPEC_FULL.md §6.2), shaped as tagged variants dispatched by `match` per the "Polymorphism
//! over constraint kinds" design note in SPEC_FULL.md §9.

use crate::basic_types::Literal;
use crate::basic_types::VarId;

/// One `coef * var` term of a linear sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SumTerm {
    pub(crate) coef: i32,
    pub(crate) var: VarId,
}

/// `activation -> sum(coef * var) <= rhs`, and the reverse implication too when `strict`.
#[derive(Debug, Clone)]
pub(crate) struct SumConstraintDef {
    pub(crate) activation: Literal,
    pub(crate) terms: Vec<SumTerm>,
    pub(crate) rhs: i32,
    pub(crate) strict: bool,
}

/// One term of a distinct constraint: `offset + sum(coef * var)`.
#[derive(Debug, Clone)]
pub(crate) struct DistinctTerm {
    pub(crate) offset: i32,
    pub(crate) elements: Vec<SumTerm>,
}

/// `activation -> ` the values of `terms` are pairwise distinct.
#[derive(Debug, Clone)]
pub(crate) struct DistinctConstraintDef {
    pub(crate) activation: Literal,
    pub(crate) terms: Vec<DistinctTerm>,
}

/// `activation -> var` in the union of the half-open intervals `[lo, hi)`.
#[derive(Debug, Clone)]
pub(crate) struct DomainConstraintDef {
    pub(crate) activation: Literal,
    pub(crate) var: VarId,
    pub(crate) intervals: Vec<(i32, i32)>,
}

/// The objective: minimize `sum(coef * var) + adjust`. There is exactly one of these per
/// propagator instance; its effective rhs is `current_bound - 1 - adjust` and tightens as the
/// host reports better models (SPEC_FULL.md §4.2.10).
#[derive(Debug, Clone)]
pub(crate) struct MinimizeConstraintDef {
    pub(crate) terms: Vec<SumTerm>,
    pub(crate) adjust: i32,
}
