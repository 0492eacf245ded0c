//! A trivial unit-propagating clause database standing in for the real host (SPEC_FULL.md §12),
//! used by the colocated unit tests in `engine::*` and by the integration tests under `tests/`.

use std::collections::HashMap;

use crate::basic_types::Literal;
use crate::host::HostAssignment;
use crate::host::HostControl;
use crate::host::HostInit;

/// Minimal host double: allocates literals, stores a flat clause list, and unit-propagates to a
/// fixpoint after every assignment or added clause. Not a real solver — no search, no conflict
/// analysis, no learned clauses — just enough to drive the engine's own propagation logic in
/// tests.
#[derive(Debug, Default)]
pub(crate) struct MockHost {
    next_id: i32,
    values: HashMap<i32, (bool, u32)>,
    level: u32,
    clauses: Vec<Vec<Literal>>,
    trail: Vec<Literal>,
}

impl MockHost {
    pub(crate) fn new() -> MockHost {
        // Lets `RUST_LOG=trace cargo test` surface the engine's own `log::trace!`/`debug!`
        // calls; harmless (and a no-op on repeat) when a logger is already installed.
        #[cfg(test)]
        {
            let _ = env_logger::try_init();
        }
        MockHost {
            next_id: 2,
            values: HashMap::new(),
            level: 0,
            clauses: Vec::new(),
            trail: Vec::new(),
        }
    }

    pub(crate) fn new_decision_level(&mut self) {
        self.level += 1;
    }

    pub(crate) fn assert_true(&mut self, literal: Literal) {
        self.assign(literal, true);
    }

    #[allow(unused, reason = "exercised by future integration tests")]
    pub(crate) fn assert_false(&mut self, literal: Literal) {
        self.assign(literal, false);
    }

    fn assign(&mut self, literal: Literal, truth: bool) {
        self.assign_internal(literal, truth);
        self.propagate_clauses();
    }

    fn assign_internal(&mut self, literal: Literal, truth: bool) {
        let key = literal.var_magnitude() as i32;
        let value = if literal.is_positive() { truth } else { !truth };
        if let std::collections::hash_map::Entry::Vacant(entry) = self.values.entry(key) {
            let _ = entry.insert((value, self.level));
            self.trail.push(if truth { literal } else { !literal });
        }
    }

    fn value_of(&self, literal: Literal) -> Option<bool> {
        let key = literal.var_magnitude() as i32;
        self.values.get(&key).map(|&(value, _)| if literal.is_positive() { value } else { !value })
    }

    fn propagate_clauses(&mut self) {
        let mut changed = true;
        while changed {
            changed = false;
            for clause in self.clauses.clone() {
                let mut satisfied = false;
                let mut unassigned = None;
                let mut unassigned_count = 0;
                for &literal in &clause {
                    match self.value_of(literal) {
                        Some(true) => {
                            satisfied = true;
                            break;
                        }
                        Some(false) => {}
                        None => {
                            unassigned_count += 1;
                            unassigned = Some(literal);
                        }
                    }
                }
                if satisfied {
                    continue;
                }
                if unassigned_count == 1 {
                    if let Some(literal) = unassigned {
                        self.assign_internal(literal, true);
                        changed = true;
                    }
                }
            }
        }
    }
}

impl HostAssignment for MockHost {
    fn is_true(&self, literal: Literal) -> bool {
        self.value_of(literal) == Some(true)
    }

    fn is_false(&self, literal: Literal) -> bool {
        self.value_of(literal) == Some(false)
    }

    fn level(&self, literal: Literal) -> Option<u32> {
        let key = literal.var_magnitude() as i32;
        self.values.get(&key).map(|&(_, level)| level)
    }

    fn decision_level(&self) -> u32 {
        self.level
    }

    fn is_total(&self) -> bool {
        self.values.len() == (self.next_id - 2) as usize
    }

    fn trail(&self) -> &[Literal] {
        &self.trail
    }
}

impl HostInit for MockHost {
    fn add_literal(&mut self) -> Literal {
        let id = self.next_id;
        self.next_id += 1;
        Literal::new(id)
    }

    fn add_watch(&mut self, _literal: Literal) {}

    fn remove_watch(&mut self, _literal: Literal) {}

    fn add_clause(&mut self, clause: &[Literal]) -> bool {
        HostControl::add_clause(self, clause)
    }

    fn add_weight_constraint(&mut self, lit: Literal, terms: &[(Literal, i32)], bound: i32) -> bool {
        HostControl::add_weight_constraint(self, lit, terms, bound)
    }
}

impl HostControl for MockHost {
    fn add_literal(&mut self) -> Literal {
        HostInit::add_literal(self)
    }

    fn add_watch(&mut self, _literal: Literal) {}

    fn remove_watch(&mut self, _literal: Literal) {}

    fn add_clause(&mut self, clause: &[Literal]) -> bool {
        if clause.iter().all(|&l| self.value_of(l) == Some(false)) {
            return false;
        }
        self.clauses.push(clause.to_vec());
        self.propagate_clauses();
        true
    }

    /// A real host encodes this natively; the mock just accepts it without modeling the
    /// cardinality semantics, since no current test exercises translated constraints directly.
    fn add_weight_constraint(&mut self, _lit: Literal, _terms: &[(Literal, i32)], _bound: i32) -> bool {
        true
    }
}
