//! Order-literal lattice for a single integer variable (SPEC_FULL.md §4.1).

use std::collections::BTreeMap;

use crate::basic_types::Literal;
use crate::basic_types::VarId;

/// Per-variable bound stacks and the ordered value-to-literal map.
///
/// `literals` maps a value `v` to the host literal representing `var <= v`; it is ordered so
/// that [`VarState::succ_value`] and [`VarState::prev_value`] run in `O(log n)`, which is what
/// lets `_update_domain` chain order-literal implications without scanning every known value.
#[derive(Debug, Clone)]
pub(crate) struct VarState {
    var: VarId,
    min_bound: i32,
    max_bound: i32,
    lower_stack: Vec<i32>,
    upper_stack: Vec<i32>,
    literals: BTreeMap<i32, Literal>,
}

impl VarState {
    pub(crate) fn new(var: VarId, min_bound: i32, max_bound: i32) -> VarState {
        VarState {
            var,
            min_bound,
            max_bound,
            lower_stack: vec![min_bound],
            upper_stack: vec![max_bound],
            literals: BTreeMap::new(),
        }
    }

    pub(crate) fn var(&self) -> VarId {
        self.var
    }

    pub(crate) fn min_bound(&self) -> i32 {
        self.min_bound
    }

    pub(crate) fn max_bound(&self) -> i32 {
        self.max_bound
    }

    pub(crate) fn lower_bound(&self) -> i32 {
        *self.lower_stack.last().expect("lower_stack is never empty")
    }

    pub(crate) fn upper_bound(&self) -> i32 {
        *self.upper_stack.last().expect("upper_stack is never empty")
    }

    pub(crate) fn is_fixed(&self) -> bool {
        self.lower_bound() == self.upper_bound()
    }

    /// Pushes a new snapshot of the lower bound, setting it to `value`. Called once per
    /// decision level the first time that level tightens the lower bound.
    pub(crate) fn push_lower(&mut self, value: i32) {
        self.lower_stack.push(value);
    }

    pub(crate) fn push_upper(&mut self, value: i32) {
        self.upper_stack.push(value);
    }

    /// Overwrites the current (top-of-stack) lower bound snapshot in place, without growing the
    /// stack. Used when the same decision level tightens a bound more than once.
    pub(crate) fn set_lower_top(&mut self, value: i32) {
        *self.lower_stack.last_mut().expect("lower_stack is never empty") = value;
    }

    pub(crate) fn set_upper_top(&mut self, value: i32) {
        *self.upper_stack.last_mut().expect("upper_stack is never empty") = value;
    }

    /// Restores the previous lower bound snapshot. Never pops the static extremum at index 0.
    pub(crate) fn pop_lower(&mut self) {
        if self.lower_stack.len() > 1 {
            let _ = self.lower_stack.pop();
        }
    }

    pub(crate) fn pop_upper(&mut self) {
        if self.upper_stack.len() > 1 {
            let _ = self.upper_stack.pop();
        }
    }

    pub(crate) fn has_literal(&self, value: i32) -> bool {
        self.literals.contains_key(&value)
    }

    pub(crate) fn get_literal(&self, value: i32) -> Option<Literal> {
        self.literals.get(&value).copied()
    }

    pub(crate) fn set_literal(&mut self, value: i32, literal: Literal) {
        let _ = self.literals.insert(value, literal);
    }

    pub(crate) fn unset_literal(&mut self, value: i32) {
        let _ = self.literals.remove(&value);
    }

    /// The largest known value strictly below `value`, if any has a literal.
    pub(crate) fn prev_value(&self, value: i32) -> Option<i32> {
        self.literals
            .range(..value)
            .next_back()
            .map(|(&v, _)| v)
    }

    /// The smallest known value strictly above `value`, if any has a literal.
    pub(crate) fn succ_value(&self, value: i32) -> Option<i32> {
        self.literals
            .range(value + 1..)
            .next()
            .map(|(&v, _)| v)
    }

    /// All (value, literal) pairs in ascending value order, for diagnostics and `cleanup`.
    pub(crate) fn iter_literals(&self) -> impl Iterator<Item = (i32, Literal)> + '_ {
        self.literals.iter().map(|(&v, &l)| (v, l))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var() -> VarId {
        VarId::create_from_index(0)
    }

    #[test]
    fn fresh_state_spans_the_full_domain() {
        let vs = VarState::new(var(), -5, 5);
        assert_eq!(vs.lower_bound(), -5);
        assert_eq!(vs.upper_bound(), 5);
        assert!(!vs.is_fixed());
    }

    #[test]
    fn push_and_pop_round_trip() {
        let mut vs = VarState::new(var(), 0, 10);
        vs.push_upper(7);
        vs.push_upper(3);
        assert_eq!(vs.upper_bound(), 3);
        vs.pop_upper();
        assert_eq!(vs.upper_bound(), 7);
        vs.pop_upper();
        assert_eq!(vs.upper_bound(), 10);
        // Popping past the static extremum is a no-op.
        vs.pop_upper();
        assert_eq!(vs.upper_bound(), 10);
    }

    #[test]
    fn successor_and_predecessor_skip_unlabelled_values() {
        let mut vs = VarState::new(var(), 0, 100);
        vs.set_literal(10, Literal::new(1));
        vs.set_literal(20, Literal::new(2));
        vs.set_literal(30, Literal::new(3));

        assert_eq!(vs.succ_value(10), Some(20));
        assert_eq!(vs.succ_value(11), Some(20));
        assert_eq!(vs.succ_value(30), None);
        assert_eq!(vs.prev_value(20), Some(10));
        assert_eq!(vs.prev_value(10), None);
        assert_eq!(vs.prev_value(30), Some(20));
    }
}
