//! Distinct-constraint propagation (SPEC_FULL.md §4.2.6).
//!
//! Like [`super::sum::SumConstraintState`], this recomputes each term's cached bounds from the
//! live variable bounds on every call rather than maintaining a separate incremental diff ledger
//! (see that module's doc comment for the rationale). The per-term `lower_map`/`upper_map`
//! inverse indices from SPEC_FULL.md §3 are still maintained incrementally, since that is exactly
//! what lets a newly-assigned term find which other terms collide with it in `O(log n)` rather
//! than scanning every term pair.

use std::collections::BTreeMap;

use crate::basic_types::KeyedVec;
use crate::basic_types::Literal;
use crate::basic_types::VarId;
use crate::engine::constraint::DistinctConstraintDef;
use crate::engine::constraint::DistinctTerm;
use crate::engine::constraint::SumTerm;
use crate::engine::state::Ctx;
use crate::engine::var_state::VarState;
use crate::error::Conflict;

#[derive(Debug, Clone)]
struct TermState {
    offset: i32,
    elements: Vec<SumTerm>,
    lower: i32,
    upper: i32,
}

/// Cached state for one `activation -> terms pairwise distinct` constraint.
#[derive(Debug, Clone)]
pub(crate) struct DistinctConstraintState {
    pub(crate) activation: Literal,
    terms: Vec<TermState>,
    lower_map: BTreeMap<i32, Vec<usize>>,
    upper_map: BTreeMap<i32, Vec<usize>>,
    inactive_level: Option<u32>,
}

impl DistinctConstraintState {
    pub(crate) fn new(def: DistinctConstraintDef) -> DistinctConstraintState {
        let terms = def
            .terms
            .into_iter()
            .map(|DistinctTerm { offset, elements }| TermState {
                offset,
                elements,
                lower: i32::MIN,
                upper: i32::MAX,
            })
            .collect();
        DistinctConstraintState {
            activation: def.activation,
            terms,
            lower_map: BTreeMap::new(),
            upper_map: BTreeMap::new(),
            inactive_level: None,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.inactive_level.is_none()
    }

    pub(crate) fn mark_inactive(&mut self, level: u32) {
        self.inactive_level = Some(level);
    }

    pub(crate) fn mark_active(&mut self) {
        self.inactive_level = None;
    }

    pub(crate) fn vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.terms
            .iter()
            .flat_map(|t| t.elements.iter().map(|e| e.var))
    }

    /// Whether every term's current (assumed fixed) value is distinct from every other.
    pub(crate) fn is_pairwise_distinct(&self, variables: &KeyedVec<VarId, VarState>) -> bool {
        let mut values: Vec<i64> = self
            .terms
            .iter()
            .map(|term| {
                let mut acc = i64::from(term.offset);
                for element in &term.elements {
                    let lb = variables[element.var].lower_bound();
                    acc += i64::from(element.coef) * i64::from(lb);
                }
                acc
            })
            .collect();
        values.sort_unstable();
        values.windows(2).all(|pair| pair[0] != pair[1])
    }

    /// Implements SPEC_FULL.md §4.2.6. Returns `Ok(true)` if the constraint became inactive on
    /// this call, `Ok(false)` otherwise, or `Err(Conflict)` with the conflict clause already
    /// added.
    pub(crate) fn propagate(&mut self, ctx: &mut Ctx) -> Result<bool, Conflict> {
        if !self.is_active() {
            return Ok(false);
        }
        if ctx.is_false(self.activation) {
            self.mark_inactive(ctx.level());
            return Ok(true);
        }
        // SPEC_FULL.md §6.4 `clause_limit`: once this constraint has added that many multi-literal
        // reason clauses on this call, stop recomputing further terms; they wait for the next pass.
        let limit = ctx.clause_limit();
        let mut clauses_emitted: u32 = 0;
        for index in 0..self.terms.len() {
            if limit.is_some_and(|limit| clauses_emitted >= limit) {
                break;
            }
            if self.recompute_term(ctx, index)? {
                clauses_emitted += 1;
            }
        }
        Ok(false)
    }

    fn bounds_of(&self, ctx: &Ctx, index: usize) -> (i32, i32) {
        let term = &self.terms[index];
        let mut lower = i64::from(term.offset);
        let mut upper = i64::from(term.offset);
        for element in &term.elements {
            let (lb, ub) = ctx.bounds(element.var);
            let coef = i64::from(element.coef);
            if element.coef > 0 {
                lower += coef * i64::from(lb);
                upper += coef * i64::from(ub);
            } else {
                lower += coef * i64::from(ub);
                upper += coef * i64::from(lb);
            }
        }
        (clamp_i32(lower), clamp_i32(upper))
    }

    /// Returns whether any of this term's forced bounds added a multi-literal reason clause
    /// (§6.4 `clause_limit` accounting), mirroring `sum.rs`'s per-term bool.
    fn recompute_term(&mut self, ctx: &mut Ctx, index: usize) -> Result<bool, Conflict> {
        let (new_lower, new_upper) = self.bounds_of(ctx, index);
        let old_lower = self.terms[index].lower;
        let old_upper = self.terms[index].upper;
        if new_lower == old_lower && new_upper == old_upper {
            return Ok(false);
        }

        if new_lower != old_lower {
            remove_index(&mut self.lower_map, old_lower, index);
            self.terms[index].lower = new_lower;
            self.lower_map.entry(new_lower).or_default().push(index);
        }
        if new_upper != old_upper {
            remove_index(&mut self.upper_map, old_upper, index);
            self.terms[index].upper = new_upper;
            self.upper_map.entry(new_upper).or_default().push(index);
        }

        let mut emitted = false;
        if new_lower == new_upper {
            let value = new_lower;
            for other in self.others_at(&self.upper_map, value, index) {
                emitted |= self.force_below(ctx, other, index, value)?;
            }
            for other in self.others_at(&self.lower_map, value, index) {
                emitted |= self.force_above(ctx, other, index, value)?;
            }
        } else {
            if let Some(assigned) = self.assigned_term_at(new_upper, index) {
                emitted |= self.force_below(ctx, index, assigned, new_upper)?;
            }
            if let Some(assigned) = self.assigned_term_at(new_lower, index) {
                emitted |= self.force_above(ctx, index, assigned, new_lower)?;
            }
        }
        Ok(emitted)
    }

    fn others_at(&self, map: &BTreeMap<i32, Vec<usize>>, value: i32, exclude: usize) -> Vec<usize> {
        map.get(&value)
            .map(|indices| indices.iter().copied().filter(|&i| i != exclude).collect())
            .unwrap_or_default()
    }

    fn assigned_term_at(&self, value: i32, exclude: usize) -> Option<usize> {
        self.lower_map.get(&value).and_then(|indices| {
            indices
                .iter()
                .copied()
                .find(|&j| j != exclude && self.terms[j].lower == self.terms[j].upper)
        })
    }

    /// The term's one not-yet-fixed element, if exactly one exists. `None` means the term is
    /// either fully fixed already or has more than one free variable; in the latter case forcing
    /// a new term bound can't be attributed to a single witness literal, so the engine only keeps
    /// tracking the term's aggregate bounds for conflict detection rather than propagating a
    /// tighter one (SPEC_FULL.md §4.2.6's "engine does not claim minimal/unit reasons" allowance).
    fn free_pivot(&self, ctx: &Ctx, index: usize) -> Option<SumTerm> {
        let mut pivot = None;
        for &element in &self.terms[index].elements {
            let (lb, ub) = ctx.bounds(element.var);
            if lb != ub {
                if pivot.is_some() {
                    return None;
                }
                pivot = Some(element);
            }
        }
        pivot
    }

    fn fixed_contribution(&self, ctx: &Ctx, index: usize, pivot: SumTerm) -> i64 {
        let term = &self.terms[index];
        let mut acc = i64::from(term.offset);
        let mut skipped = false;
        for &element in &term.elements {
            if !skipped && element.var == pivot.var && element.coef == pivot.coef {
                skipped = true;
                continue;
            }
            let (lb, ub) = ctx.bounds(element.var);
            acc += i64::from(element.coef) * i64::from(if element.coef > 0 { lb } else { ub });
        }
        acc
    }

    /// The reason conjunction for `terms[index]`: the activation literal plus the bound-witness
    /// literals of every element (both the lower- and upper-bound witness, since either of them
    /// may justify the forcing, per SPEC_FULL.md §4.2.6's non-minimal-reason allowance).
    fn reason(&self, ctx: &mut Ctx, index: usize) -> Vec<Literal> {
        let elements = self.terms[index].elements.clone();
        let mut reason = Vec::with_capacity(elements.len() * 2 + 1);
        if self.activation != Literal::TRUE {
            reason.push(self.activation);
        }
        for element in elements {
            reason.push(ctx.lower_contribution_literal(&element));
            reason.push(ctx.upper_contribution_literal(&element));
        }
        ctx.refine_reason(reason)
    }

    /// Builds and adds the clause forbidding the collision between `terms[index]` and
    /// `terms[other_index]`. When `activation` is not yet assigned, this clause is a unit
    /// propagation forcing it false rather than a genuine conflict — `add_clause` reports a real
    /// conflict (clause already falsified under the current assignment) by returning `false`.
    fn conflict(&self, ctx: &mut Ctx, index: usize, other_index: usize) -> Result<(), Conflict> {
        let mut reason = self.reason(ctx, index);
        reason.extend(self.reason(ctx, other_index));
        let clause: Vec<Literal> = reason.into_iter().map(|l| !l).collect();
        if !ctx.add_clause(&clause) {
            return Err(Conflict);
        }
        Ok(())
    }

    /// Forces `terms[index] < value`, citing `terms[other_index]` (pinned to `value`) as the
    /// colliding witness.
    fn force_below(&mut self, ctx: &mut Ctx, index: usize, other_index: usize, value: i32) -> Result<bool, Conflict> {
        let Some(pivot) = self.free_pivot(ctx, index) else {
            if self.terms[index].lower == self.terms[index].upper && self.terms[index].lower == value {
                return self.conflict(ctx, index, other_index).map(|()| true);
            }
            return Ok(false);
        };
        let fixed = self.fixed_contribution(ctx, index, pivot);
        let target = i64::from(value) - 1 - fixed;
        let mut reason = self.reason(ctx, index);
        reason.extend(self.reason(ctx, other_index));
        let coef = i64::from(pivot.coef);
        let (lb, ub) = ctx.bounds(pivot.var);
        if pivot.coef > 0 {
            let new_value = clamp_i32(target.div_euclid(coef));
            if new_value >= ub {
                return Ok(false);
            }
            ctx.force_bound(pivot.var, new_value, true, &reason)
        } else {
            let positive = -coef;
            let min_value = clamp_i32(ceil_div(-target, positive));
            if min_value <= lb {
                return Ok(false);
            }
            ctx.force_bound(pivot.var, min_value - 1, false, &reason)
        }
    }

    /// Forces `terms[index] > value`, citing `terms[other_index]` (pinned to `value`) as the
    /// colliding witness.
    fn force_above(&mut self, ctx: &mut Ctx, index: usize, other_index: usize, value: i32) -> Result<bool, Conflict> {
        let Some(pivot) = self.free_pivot(ctx, index) else {
            if self.terms[index].lower == self.terms[index].upper && self.terms[index].lower == value {
                return self.conflict(ctx, index, other_index).map(|()| true);
            }
            return Ok(false);
        };
        let fixed = self.fixed_contribution(ctx, index, pivot);
        let target = i64::from(value) + 1 - fixed;
        let mut reason = self.reason(ctx, index);
        reason.extend(self.reason(ctx, other_index));
        let coef = i64::from(pivot.coef);
        let (lb, ub) = ctx.bounds(pivot.var);
        if pivot.coef > 0 {
            let min_value = clamp_i32(ceil_div(target, coef));
            if min_value <= lb {
                return Ok(false);
            }
            ctx.force_bound(pivot.var, min_value - 1, false, &reason)
        } else {
            let positive = -coef;
            let new_value = clamp_i32((-target).div_euclid(positive));
            if new_value >= ub {
                return Ok(false);
            }
            ctx.force_bound(pivot.var, new_value, true, &reason)
        }
    }
}

fn remove_index(map: &mut BTreeMap<i32, Vec<usize>>, key: i32, index: usize) {
    if let Some(list) = map.get_mut(&key) {
        list.retain(|&i| i != index);
        if list.is_empty() {
            let _ = map.remove(&key);
        }
    }
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// `ceil(a / b)` for `b > 0`, any sign of `a`.
fn ceil_div(a: i64, b: i64) -> i64 {
    debug_assert!(b > 0);
    let q = a.div_euclid(b);
    let r = a.rem_euclid(b);
    if r > 0 {
        q + 1
    } else {
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_types::StorageKey;
    use crate::config::PropagatorConfig;
    use crate::engine::state::State;
    use crate::engine::test_support::MockHost;

    fn var(i: usize) -> VarId {
        VarId::create_from_index(i)
    }

    #[test]
    fn two_variable_distinct_forces_the_complement() {
        let mut state = State::new();
        let _ = state.add_variable(0, 1);
        let _ = state.add_variable(0, 1);
        let def = DistinctConstraintDef {
            activation: Literal::TRUE,
            terms: vec![
                DistinctTerm {
                    offset: 0,
                    elements: vec![SumTerm { coef: 1, var: var(0) }],
                },
                DistinctTerm {
                    offset: 0,
                    elements: vec![SumTerm { coef: 1, var: var(1) }],
                },
            ],
        };
        let config = PropagatorConfig::default();
        let mut host = MockHost::new();
        {
            let mut ctx = Ctx::new(&mut state, &mut host, &config);
            let cid = ctx.register_distinct(def);
            ctx.propagate_constraint(cid).expect("no conflict");
            // Fixing x = 0 should force y = 1.
            let _ = ctx.update_literal(var(0), 0, Some(true)).expect("fact");
        }
        assert!(state.check(&mut host, &config));
        assert_eq!(state.bounds(var(1)), (1, 1));
    }
}
