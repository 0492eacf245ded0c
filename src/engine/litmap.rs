//! Reverse index from a host literal to the `(variable, value)` pairs it witnesses
//! (SPEC_FULL.md §2 item 2, §3 "Litmap").
//!
//! Each value `v` with a literal `lit` (`vs.literals[v] == lit`, meaning `lit` true encodes
//! `var <= v`) is registered under the single key `lit`. The dual, lower-bound reading ("`lit`
//! false means `var >= v + 1`") needs no separate entry: a caller processing a newly-asserted
//! literal `ℓ` looks up `litmap[ℓ]` for upper-bound witnesses and `litmap[-ℓ]` for lower-bound
//! ones, and the second lookup lands on exactly the same entry when `ℓ == !lit`. The special
//! constants [`Literal::TRUE`]/[`Literal::FALSE`] index the facts accumulated at decision level
//! 0 the same way.

use fnv::FnvHashMap;

use crate::basic_types::Literal;
use crate::basic_types::VarId;

/// A host literal together with one `(var, value)` witness pair it carries.
pub(crate) type Witness = (VarId, i32);

#[derive(Debug, Default, Clone)]
pub(crate) struct LiteralMap {
    entries: FnvHashMap<Literal, Vec<Witness>>,
}

impl LiteralMap {
    pub(crate) fn new() -> LiteralMap {
        LiteralMap::default()
    }

    /// The `(var, value)` pairs for which `literal` being true is a fact about an upper bound.
    pub(crate) fn witnesses(&self, literal: Literal) -> &[Witness] {
        self.entries.get(&literal).map_or(&[], Vec::as_slice)
    }

    pub(crate) fn insert(&mut self, literal: Literal, var: VarId, value: i32) {
        self.entries.entry(literal).or_default().push((var, value));
    }

    /// Removes a single witness. Used when an order literal is retired (its value was
    /// resolved to a fact, or the variable's domain shrank past it during `init` cleanup).
    pub(crate) fn remove(&mut self, literal: Literal, var: VarId, value: i32) {
        if let Some(list) = self.entries.get_mut(&literal) {
            list.retain(|&(v, val)| !(v == var && val == value));
            if list.is_empty() {
                let _ = self.entries.remove(&literal);
            }
        }
    }

    /// Whether `literal`'s entry is non-empty, i.e. whether the host still needs to watch it.
    pub(crate) fn is_registered(&self, literal: Literal) -> bool {
        self.entries.get(&literal).is_some_and(|v| !v.is_empty())
    }

    /// The number of facts accumulated so far under a constant literal (`TRUE` or `FALSE`),
    /// used by [`crate::engine::state::State::integrate_facts`] as the fact-integration cursor.
    pub(crate) fn fact_count(&self, constant: Literal) -> usize {
        self.witnesses(constant).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(i: usize) -> VarId {
        use crate::basic_types::StorageKey;
        VarId::create_from_index(i)
    }

    #[test]
    fn insert_and_lookup_round_trip() {
        let mut map = LiteralMap::new();
        let lit = Literal::new(5);
        map.insert(lit, var(0), 10);
        map.insert(lit, var(1), 20);
        assert_eq!(map.witnesses(lit), &[(var(0), 10), (var(1), 20)]);
        assert_eq!(map.witnesses(!lit), &[]);
    }

    #[test]
    fn negated_lookup_finds_the_same_entry() {
        let mut map = LiteralMap::new();
        let lit = Literal::new(7);
        map.insert(lit, var(0), 4);
        // A caller processing the assertion of `!lit` looks things up via `-(!lit) == lit`.
        assert_eq!(map.witnesses(!(!lit)), &[(var(0), 4)]);
    }

    #[test]
    fn remove_drops_empty_entry() {
        let mut map = LiteralMap::new();
        let lit = Literal::new(3);
        map.insert(lit, var(0), 1);
        map.remove(lit, var(0), 1);
        assert_eq!(map.witnesses(lit), &[]);
        assert!(!map.is_registered(lit));
    }

    #[test]
    fn facts_accumulate_under_constant_literals() {
        let mut map = LiteralMap::new();
        map.insert(Literal::TRUE, var(0), 4);
        map.insert(Literal::FALSE, var(1), 9);
        assert_eq!(map.fact_count(Literal::TRUE), 1);
        assert_eq!(map.fact_count(Literal::FALSE), 1);
    }
}
