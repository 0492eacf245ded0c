//! The collaborator contract the engine consumes from the external Boolean search engine
//! (SPEC_FULL.md §6.1). A concrete host binding (out of scope for this crate) implements
//! these traits over its own FFI layer; the engine only ever programs against them.

use crate::basic_types::Literal;

/// Read-only queries against the host's current Boolean assignment. A supertrait of both
/// [`HostInit`] and [`HostControl`] since both phases need to inspect the trail (e.g. to decide
/// whether a derived literal can be simplified to a fact).
pub trait HostAssignment {
    fn is_true(&self, literal: Literal) -> bool;
    fn is_false(&self, literal: Literal) -> bool;
    fn is_fixed(&self, literal: Literal) -> bool {
        self.is_true(literal) || self.is_false(literal)
    }

    /// The decision level at which `literal` was assigned, if it is assigned.
    fn level(&self, literal: Literal) -> Option<u32>;

    /// The host's current decision level.
    fn decision_level(&self) -> u32;

    /// Whether every Boolean variable the host knows about is currently assigned.
    fn is_total(&self) -> bool;

    /// Literals assigned true so far, in assignment order (SPEC_FULL.md §6.1
    /// `assignment.trail`). `init`'s simplify pass (SPEC_FULL.md §4.3.1 step 4) replays this to
    /// integrate facts the host already knows about before propagation starts.
    fn trail(&self) -> &[Literal];
}

/// Operations available while the host is setting up a solving step, before search starts.
pub trait HostInit: HostAssignment {
    /// Allocates a fresh Boolean variable and returns its positive literal.
    fn add_literal(&mut self) -> Literal;

    /// Requests a callback when `literal` is assigned (in either polarity; the host is expected
    /// to report both `literal` and `!literal` assignments through `propagate`).
    fn add_watch(&mut self, literal: Literal);

    /// Stops watching `literal`; used by the `init` cleanup pass (SPEC_FULL.md §4.3.1 step 5).
    fn remove_watch(&mut self, literal: Literal);

    /// Adds a clause that must hold throughout the solving step. Returns `false` if the clause
    /// is already falsified by the current (root-level) assignment.
    fn add_clause(&mut self, clause: &[Literal]) -> bool;

    /// Adds a natively-encoded weight constraint `lit <-> (sum of weight * lit <= bound)`.
    /// Returns `false` on immediate root-level conflict.
    fn add_weight_constraint(&mut self, lit: Literal, terms: &[(Literal, i32)], bound: i32) -> bool;
}

/// Adapts a [`HostInit`] reference so the engine's bound-literal machinery (written once against
/// [`HostControl`]) can run during `init` too (SPEC_FULL.md §4.3.1 steps 3-4 integrate facts and
/// propagate to fixpoint using the same code path `propagate`/`check` use).
pub(crate) struct AsControl<'a>(pub(crate) &'a mut dyn HostInit);

impl HostAssignment for AsControl<'_> {
    fn is_true(&self, literal: Literal) -> bool {
        self.0.is_true(literal)
    }

    fn is_false(&self, literal: Literal) -> bool {
        self.0.is_false(literal)
    }

    fn level(&self, literal: Literal) -> Option<u32> {
        self.0.level(literal)
    }

    fn decision_level(&self) -> u32 {
        self.0.decision_level()
    }

    fn is_total(&self) -> bool {
        self.0.is_total()
    }

    fn trail(&self) -> &[Literal] {
        self.0.trail()
    }
}

impl HostControl for AsControl<'_> {
    fn add_literal(&mut self) -> Literal {
        self.0.add_literal()
    }

    fn add_watch(&mut self, literal: Literal) {
        self.0.add_watch(literal)
    }

    fn remove_watch(&mut self, literal: Literal) {
        self.0.remove_watch(literal)
    }

    fn add_clause(&mut self, clause: &[Literal]) -> bool {
        self.0.add_clause(clause)
    }

    fn add_weight_constraint(&mut self, lit: Literal, terms: &[(Literal, i32)], bound: i32) -> bool {
        self.0.add_weight_constraint(lit, terms, bound)
    }
}

/// Operations available during `propagate`/`check`/`undo`.
pub trait HostControl: HostAssignment {
    /// Allocates a fresh Boolean variable and returns its positive literal. New order literals
    /// are minted on demand during propagation, not only at `init` (SPEC_FULL.md §4.2.1).
    fn add_literal(&mut self) -> Literal;

    /// Requests a callback the next time `literal` is assigned.
    fn add_watch(&mut self, literal: Literal);

    /// Stops watching `literal`; used when an order literal becomes a fact and is retired.
    fn remove_watch(&mut self, literal: Literal);

    /// Adds a (possibly solve-step-local) clause. Returns `false` if it is already falsified.
    fn add_clause(&mut self, clause: &[Literal]) -> bool;

    /// Adds a natively-encoded weight constraint `lit <-> (sum of weight * lit <= bound)`.
    /// Only ever invoked during `init` (SPEC_FULL.md §4.3.1 step 6), through [`AsControl`].
    fn add_weight_constraint(&mut self, lit: Literal, terms: &[(Literal, i32)], bound: i32) -> bool;
}
