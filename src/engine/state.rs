//! The propagation core: per-thread bound maintenance, constraint dispatch, fact integration and
//! undo (SPEC_FULL.md §4.2, §2 item 6). [`State`] owns the data; [`Ctx`] borrows it together with
//! the host and the active [`PropagatorConfig`] for the duration of one `propagate`/`check`/
//! `undo`/`check_full` call, and is what [`crate::engine::constraint_state::sum::SumConstraintState`]
//! and [`crate::engine::constraint_state::distinct::DistinctConstraintState`] propagate against.

use std::collections::VecDeque;

use fnv::FnvHashMap;

use crate::basic_types::ConstraintId;
use crate::basic_types::KeyedVec;
use crate::basic_types::Literal;
use crate::basic_types::StorageKey;
use crate::basic_types::VarId;
use crate::basic_types::MAX_INT;
use crate::config::PropagatorConfig;
use crate::engine::constraint::DistinctConstraintDef;
use crate::engine::constraint::DomainConstraintDef;
use crate::engine::constraint::MinimizeConstraintDef;
use crate::engine::constraint::SumConstraintDef;
use crate::engine::constraint::SumTerm;
use crate::engine::constraint_state::ConstraintState;
use crate::engine::constraint_state::DistinctConstraintState;
use crate::engine::constraint_state::SumConstraintState;
use crate::engine::level::Trail;
use crate::engine::litmap::LiteralMap;
use crate::engine::var_state::VarState;
use crate::error::Conflict;
use crate::host::HostAssignment;
use crate::host::HostControl;

#[derive(Debug, Clone, Copy, Default)]
struct Stats {
    facts_integrated: u64,
    propagations: u64,
    conflicts: u64,
}

/// Per-thread propagation state (SPEC_FULL.md §3). Cheap to [`Clone`], which is how
/// `init` duplicates thread 0 to every other thread (SPEC_FULL.md §4.3.1 step 7).
#[derive(Debug, Clone)]
pub(crate) struct State {
    variables: KeyedVec<VarId, VarState>,
    litmap: LiteralMap,
    trail: Trail,
    constraints: KeyedVec<ConstraintId, ConstraintState>,
    v2cs: KeyedVec<VarId, Vec<ConstraintId>>,
    /// Reverse index from an activation literal (either polarity) to the constraints that watch
    /// it (SPEC_FULL.md §2 item 3's "l2c", used by `propagate` step 2). Distinct from
    /// [`litmap::LiteralMap`], which indexes *order* literals rather than activation literals.
    l2c: FnvHashMap<Literal, Vec<ConstraintId>>,
    queued: KeyedVec<ConstraintId, bool>,
    todo: VecDeque<ConstraintId>,
    integrated_true: usize,
    integrated_false: usize,
    check_full_cursor: usize,
    minimize_id: Option<ConstraintId>,
    minimize_adjust: i32,
    minimize_bound: Option<i32>,
    stats: Stats,
}

impl Default for State {
    fn default() -> State {
        State {
            variables: KeyedVec::default(),
            litmap: LiteralMap::default(),
            trail: Trail::default(),
            constraints: KeyedVec::default(),
            v2cs: KeyedVec::default(),
            l2c: FnvHashMap::default(),
            queued: KeyedVec::default(),
            todo: VecDeque::default(),
            integrated_true: 0,
            integrated_false: 0,
            check_full_cursor: 0,
            minimize_id: None,
            minimize_adjust: 0,
            minimize_bound: None,
            stats: Stats::default(),
        }
    }
}

/// The outcome of [`State::check_full`]: either a new branching literal for the host to decide
/// on, or confirmation that every variable is already fixed (SPEC_FULL.md §4.2.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CheckFullOutcome {
    Branch(Literal),
    Complete,
}

impl State {
    pub(crate) fn new() -> State {
        State::default()
    }

    pub(crate) fn add_variable(&mut self, min_bound: i32, max_bound: i32) -> VarId {
        self.variables.push(VarState::new(
            VarId::create_from_index(self.variables.len()),
            min_bound,
            max_bound,
        ));
        self.v2cs.push(Vec::new());
        VarId::create_from_index(self.variables.len() - 1)
    }

    pub(crate) fn bounds(&self, var: VarId) -> (i32, i32) {
        let vs = &self.variables[var];
        (vs.lower_bound(), vs.upper_bound())
    }

    pub(crate) fn assignment(&self) -> Vec<(VarId, i32)> {
        self.variables
            .keys()
            .map(|var| (var, self.variables[var].lower_bound()))
            .collect()
    }

    pub(crate) fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// SPEC_FULL.md §4.2.3.
    pub(crate) fn propagate(
        &mut self,
        host: &mut dyn HostControl,
        config: &PropagatorConfig,
        changes: &[Literal],
    ) -> bool {
        let mut ctx = Ctx { state: self, host, config };
        for &lit in changes {
            let level = ctx.host.decision_level();
            ctx.state.trail.ensure_level(level);
            let watching = ctx.state.l2c.get(&lit).cloned().unwrap_or_default();
            for cid in watching {
                ctx.enqueue(cid);
            }
            if ctx.update_domain(lit).is_err() {
                return false;
            }
        }
        true
    }

    /// SPEC_FULL.md §4.2.7.
    pub(crate) fn check(&mut self, host: &mut dyn HostControl, config: &PropagatorConfig) -> bool {
        let mut ctx = Ctx { state: self, host, config };
        loop {
            let before_true = ctx.state.litmap.fact_count(Literal::TRUE);
            let before_false = ctx.state.litmap.fact_count(Literal::FALSE);

            if ctx.integrate_facts().is_err() {
                return false;
            }

            while let Some(cid) = ctx.state.todo.pop_front() {
                ctx.state.queued[cid] = false;
                if ctx.propagate_constraint(cid).is_err() {
                    return false;
                }
            }

            let after_true = ctx.state.litmap.fact_count(Literal::TRUE);
            let after_false = ctx.state.litmap.fact_count(Literal::FALSE);
            if after_true == before_true && after_false == before_false {
                log::trace!("check reached fixpoint");
                return true;
            }
        }
    }

    /// SPEC_FULL.md §4.2.9. Never fails: undo is not allowed to raise a conflict.
    pub(crate) fn undo(&mut self) {
        let Some(level) = self.trail.pop() else {
            return;
        };
        log::debug!("undo: popping level {}", level.level);
        for var in level.undo_upper {
            self.variables[var].pop_upper();
        }
        for var in level.undo_lower {
            self.variables[var].pop_lower();
        }
        for cid in level.inactive {
            self.constraints[cid].mark_active();
        }
        self.todo.clear();
        for queued in self.queued.iter_mut() {
            *queued = false;
        }
    }

    /// SPEC_FULL.md §4.2.8.
    pub(crate) fn check_full(
        &mut self,
        host: &mut dyn HostControl,
        config: &PropagatorConfig,
    ) -> Result<CheckFullOutcome, Conflict> {
        let mut ctx = Ctx { state: self, host, config };
        ctx.check_full_impl()
    }

    /// SPEC_FULL.md §4.2.10. `dl` is the decision level the improving model was found at.
    pub(crate) fn update_minimize(&mut self, bound: i32, dl: u32) {
        if let Some(current) = self.minimize_bound {
            if bound >= current {
                return;
            }
        }
        self.minimize_bound = Some(bound);
        let Some(mid) = self.minimize_id else {
            return;
        };
        let rhs = bound - 1 - self.minimize_adjust;
        if let ConstraintState::Sum(sum) = &mut self.constraints[mid] {
            sum.tighten_rhs(rhs);
            sum.mark_active();
        }
        self.trail.ensure_level(dl);
        enqueue(&mut self.queued, &mut self.todo, mid);
    }

    fn push_constraint(&mut self, constraint: ConstraintState) -> ConstraintId {
        self.constraints.push(constraint);
        self.queued.push(false);
        ConstraintId::create_from_index(self.constraints.len() - 1)
    }

    /// SPEC_FULL.md §4.3.1 step 5: every order literal that has become a fact (true or false at
    /// level 0, detected from the host's own assignment) is replaced by the constant ±TRUE/FALSE
    /// in-place, and the real host literal is released; literals for values the current bounds
    /// have already ruled out (above `ub` or below `lb`) are likewise fixed and released, since
    /// only `init` runs this and the host has not started watching them for search yet.
    pub(crate) fn cleanup_literals(&mut self, host: &mut dyn crate::host::HostInit) {
        for var in self.variables.keys() {
            let (lb, ub) = self.bounds(var);
            let stale: Vec<(i32, Literal)> = self.variables[var]
                .iter_literals()
                .filter(|&(_, lit)| lit != Literal::TRUE && lit != Literal::FALSE)
                .filter(|&(value, lit)| {
                    value < lb || value >= ub || host.is_true(lit) || host.is_false(lit)
                })
                .collect();
            for (value, lit) in stale {
                let constant = if value < lb {
                    Literal::FALSE
                } else if value >= ub {
                    Literal::TRUE
                } else if host.is_true(lit) {
                    Literal::TRUE
                } else {
                    Literal::FALSE
                };
                self.litmap.remove(lit, var, value);
                self.variables[var].set_literal(value, constant);
                self.litmap.insert(constant, var, value);
                host.remove_watch(lit);
                host.remove_watch(!lit);
            }
        }
    }
}

fn enqueue(queued: &mut KeyedVec<ConstraintId, bool>, todo: &mut VecDeque<ConstraintId>, cid: ConstraintId) {
    if !queued[cid] {
        queued[cid] = true;
        todo.push_back(cid);
    }
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

fn clamp_i32(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Borrows [`State`] together with the host and the active config for one call. Constraint
/// propagators (SPEC_FULL.md §4.2.5, §4.2.6) and the registration/init entry points (SPEC_FULL.md
/// §4.3.1) are written against this type rather than `State` directly, since both need the host.
pub(crate) struct Ctx<'a> {
    state: &'a mut State,
    host: &'a mut dyn HostControl,
    config: &'a PropagatorConfig,
}

impl<'a> Ctx<'a> {
    /// Builds a [`Ctx`] directly, bypassing [`State::propagate`]/[`State::check`]. Used by unit
    /// tests and by [`crate::propagator::Propagator::init`], which needs to register constraints
    /// and run propagation to fixpoint before any host-driven `propagate` call exists.
    pub(crate) fn new(state: &'a mut State, host: &'a mut dyn HostControl, config: &'a PropagatorConfig) -> Ctx<'a> {
        Ctx { state, host, config }
    }

    pub(crate) fn variables(&self) -> &KeyedVec<VarId, VarState> {
        &self.state.variables
    }

    pub(crate) fn level(&self) -> u32 {
        self.state.trail.current_level()
    }

    pub(crate) fn bounds(&self, var: VarId) -> (i32, i32) {
        self.state.bounds(var)
    }

    pub(crate) fn is_true(&self, literal: Literal) -> bool {
        if literal == Literal::TRUE {
            return true;
        }
        if literal == Literal::FALSE {
            return false;
        }
        self.host.is_true(literal)
    }

    pub(crate) fn is_false(&self, literal: Literal) -> bool {
        if literal == Literal::FALSE {
            return true;
        }
        if literal == Literal::TRUE {
            return false;
        }
        self.host.is_false(literal)
    }

    /// A literal counts as a fact once it is fixed at decision level 0 (or is one of the
    /// constants, which are facts by construction).
    pub(crate) fn is_fact(&self, literal: Literal) -> bool {
        if literal == Literal::TRUE || literal == Literal::FALSE {
            return true;
        }
        self.host.level(literal) == Some(0)
    }

    pub(crate) fn config(&self) -> &PropagatorConfig {
        self.config
    }

    /// SPEC_FULL.md §6.4 `clause_limit`: the most clauses one `propagate` call on a single
    /// constraint may add, or `None` for no limit.
    pub(crate) fn clause_limit(&self) -> Option<u32> {
        self.config.clause_limit
    }

    /// SPEC_FULL.md §6.4 `refine_reasons`: a reason literal that already holds as a level-0 fact
    /// contributes nothing to the implication it antecedes (`fact && X -> Y` is just `X -> Y`), so
    /// it can be dropped from the clause without changing its meaning. Gated on the option since
    /// keeping the full reason is also sound, just more verbose.
    pub(crate) fn refine_reason(&self, reason: Vec<Literal>) -> Vec<Literal> {
        if !self.config.refine_reasons {
            return reason;
        }
        let refined: Vec<Literal> = reason.iter().copied().filter(|&l| !(self.is_fact(l) && self.is_true(l))).collect();
        if refined.is_empty() {
            reason
        } else {
            refined
        }
    }

    /// SPEC_FULL.md §4.2.1.
    pub(crate) fn get_literal(&mut self, var: VarId, value: i32) -> Literal {
        let (min_bound, max_bound) = {
            let vs = &self.state.variables[var];
            (vs.min_bound(), vs.max_bound())
        };
        if value < min_bound {
            return Literal::FALSE;
        }
        if value >= max_bound {
            return Literal::TRUE;
        }
        if let Some(existing) = self.state.variables[var].get_literal(value) {
            return existing;
        }
        let raw = self.host.add_literal();
        let literal = if value >= 0 { !raw } else { raw };
        log::trace!("get_literal: minted {literal:?} for var {var:?} <= {value}");
        self.state.variables[var].set_literal(value, literal);
        self.state.litmap.insert(literal, var, value);
        self.host.add_watch(literal);
        self.host.add_watch(!literal);
        literal
    }

    /// SPEC_FULL.md §4.2.2.
    pub(crate) fn update_literal(&mut self, var: VarId, value: i32, truth: Option<bool>) -> Result<Literal, Conflict> {
        let (min_bound, max_bound) = {
            let vs = &self.state.variables[var];
            (vs.min_bound(), vs.max_bound())
        };
        if value < min_bound {
            return Ok(Literal::FALSE);
        }
        if value >= max_bound {
            return Ok(Literal::TRUE);
        }

        let Some(want) = truth else {
            return Ok(self.get_literal(var, value));
        };
        if self.level() != 0 {
            return Ok(self.get_literal(var, value));
        }

        match self.state.variables[var].get_literal(value) {
            Some(existing) if existing == Literal::TRUE || existing == Literal::FALSE => {
                let already_true = existing == Literal::TRUE;
                if already_true == want {
                    Ok(existing)
                } else {
                    // SPEC_FULL.md §9: coincident forcing to both a positive and a negative
                    // constant at level 0 is an immediate conflict.
                    let _ = self.host.add_clause(&[]);
                    Err(Conflict)
                }
            }
            Some(existing) => {
                let unit = if want { existing } else { !existing };
                if !self.host.add_clause(&[unit]) {
                    return Err(Conflict);
                }
                self.state.litmap.remove(existing, var, value);
                let constant = if want { Literal::TRUE } else { Literal::FALSE };
                self.state.variables[var].set_literal(value, constant);
                self.state.litmap.insert(constant, var, value);
                self.host.remove_watch(existing);
                self.host.remove_watch(!existing);
                Ok(constant)
            }
            None => {
                let constant = if want { Literal::TRUE } else { Literal::FALSE };
                self.state.variables[var].set_literal(value, constant);
                self.state.litmap.insert(constant, var, value);
                Ok(constant)
            }
        }
    }

    /// The literal that witnessed `term`'s contribution to a sum/distinct constraint's cached
    /// `lower_bound`: for `coef > 0` that is `¬(var <= lb - 1)`; for `coef < 0`, `var <= ub`.
    pub(crate) fn lower_contribution_literal(&mut self, term: &SumTerm) -> Literal {
        if term.coef > 0 {
            let lb = self.state.variables[term.var].lower_bound();
            !self.get_literal(term.var, lb - 1)
        } else {
            let ub = self.state.variables[term.var].upper_bound();
            self.get_literal(term.var, ub)
        }
    }

    /// The dual of [`Ctx::lower_contribution_literal`]: the witness for `term`'s contribution to
    /// the cached `upper_bound`.
    pub(crate) fn upper_contribution_literal(&mut self, term: &SumTerm) -> Literal {
        if term.coef > 0 {
            let ub = self.state.variables[term.var].upper_bound();
            self.get_literal(term.var, ub)
        } else {
            let lb = self.state.variables[term.var].lower_bound();
            !self.get_literal(term.var, lb - 1)
        }
    }

    /// Forces `var <= value` (`is_upper`) or `var >= value + 1` (otherwise): a fact when every
    /// literal of `reason` is already a level-0 fact and the current level is 0 too (the "fact
    /// iff" rule of SPEC_FULL.md §4.2.5), an ordinary implication clause otherwise. `reason` holds
    /// the positive antecedent literals; the clause adds their negations.
    /// Returns whether a multi-literal reason clause was actually added (as opposed to the fact
    /// path, or the bound already holding), for `clause_limit` accounting (SPEC_FULL.md §6.4).
    pub(crate) fn force_bound(&mut self, var: VarId, value: i32, is_upper: bool, reason: &[Literal]) -> Result<bool, Conflict> {
        let all_facts = self.level() == 0 && reason.iter().all(|&l| self.is_fact(l));
        if all_facts {
            let _ = self.update_literal(var, value, Some(is_upper))?;
            return Ok(false);
        }
        let literal = self.get_literal(var, value);
        let satisfied = if is_upper { literal == Literal::TRUE } else { literal == Literal::FALSE };
        if satisfied {
            return Ok(false);
        }
        let mut clause: Vec<Literal> = reason.iter().map(|&l| !l).collect();
        clause.push(if is_upper { literal } else { !literal });
        if !self.add_clause(&clause) {
            return Err(Conflict);
        }
        Ok(true)
    }

    pub(crate) fn add_clause(&mut self, clause: &[Literal]) -> bool {
        if clause.iter().any(|&l| l == Literal::TRUE) {
            return true;
        }
        let filtered: Vec<Literal> = clause.iter().copied().filter(|&l| l != Literal::FALSE).collect();
        if filtered.is_empty() {
            return false;
        }
        self.host.add_clause(&filtered)
    }

    pub(crate) fn add_weight_constraint(&mut self, lit: Literal, terms: &[(Literal, i32)], bound: i32) -> bool {
        self.host.add_weight_constraint(lit, terms, bound)
    }

    fn set_upper(&mut self, var: VarId, value: i32) {
        let first_change_this_level = !self.state.trail.top_mut().undo_upper.contains(&var);
        if first_change_this_level {
            self.state.variables[var].push_upper(value);
            self.state.trail.top_mut().undo_upper.insert(var);
        } else {
            self.state.variables[var].set_upper_top(value);
        }
    }

    fn set_lower(&mut self, var: VarId, value: i32) {
        let first_change_this_level = !self.state.trail.top_mut().undo_lower.contains(&var);
        if first_change_this_level {
            self.state.variables[var].push_lower(value);
            self.state.trail.top_mut().undo_lower.insert(var);
        } else {
            self.state.variables[var].set_lower_top(value);
        }
    }

    fn enqueue(&mut self, cid: ConstraintId) {
        enqueue(&mut self.state.queued, &mut self.state.todo, cid);
    }

    fn enqueue_downstream(&mut self, var: VarId) {
        let cids = self.state.v2cs[var].clone();
        for cid in cids {
            self.enqueue(cid);
        }
    }

    fn tighten_upper(&mut self, var: VarId, value: i32, reason_lit: Literal) -> Result<(), Conflict> {
        if self.state.variables[var].upper_bound() <= value {
            return Ok(());
        }
        self.set_upper(var, value);
        self.enqueue_downstream(var);
        self.state.stats.propagations += 1;
        if let Some(succ) = self.state.variables[var].succ_value(value) {
            self.imply_literal(reason_lit, var, succ, true)?;
        }
        Ok(())
    }

    fn tighten_lower(&mut self, var: VarId, value: i32, reason_lit: Literal) -> Result<(), Conflict> {
        if self.state.variables[var].lower_bound() >= value + 1 {
            return Ok(());
        }
        self.set_lower(var, value + 1);
        self.enqueue_downstream(var);
        self.state.stats.propagations += 1;
        if let Some(pred) = self.state.variables[var].prev_value(value) {
            self.imply_literal(reason_lit, var, pred, false)?;
        }
        Ok(())
    }

    /// `reason_lit -> (var <= value)` when `want_true`, `reason_lit -> ¬(var <= value)` otherwise.
    fn imply_literal(&mut self, reason_lit: Literal, var: VarId, value: i32, want_true: bool) -> Result<(), Conflict> {
        let target = self.get_literal(var, value);
        if want_true {
            if self.is_true(target) {
                return Ok(());
            }
        } else if self.is_false(target) {
            return Ok(());
        }
        if self.level() == 0 && self.is_fact(reason_lit) {
            let _ = self.update_literal(var, value, Some(want_true))?;
            return Ok(());
        }
        let clause = if want_true { vec![!reason_lit, target] } else { vec![!reason_lit, !target] };
        if !self.add_clause(&clause) {
            return Err(Conflict);
        }
        Ok(())
    }

    /// SPEC_FULL.md §4.2.4.
    fn update_domain(&mut self, lit: Literal) -> Result<(), Conflict> {
        let upper_witnesses = self.state.litmap.witnesses(lit).to_vec();
        for (var, value) in upper_witnesses {
            self.tighten_upper(var, value, lit)?;
        }
        let lower_witnesses = self.state.litmap.witnesses(!lit).to_vec();
        for (var, value) in lower_witnesses {
            self.tighten_lower(var, value, lit)?;
        }
        Ok(())
    }

    /// Re-drives `_update_domain(TRUE)`/`_update_domain(FALSE)` over witnesses registered since
    /// the last call (SPEC_FULL.md §4.2.7 step 1): watches on the constant literals never re-fire,
    /// so facts have to be integrated explicitly.
    fn integrate_facts(&mut self) -> Result<(), Conflict> {
        loop {
            let true_witnesses = self.state.litmap.witnesses(Literal::TRUE).to_vec();
            let false_witnesses = self.state.litmap.witnesses(Literal::FALSE).to_vec();
            let mut progressed = false;

            while self.state.integrated_true < true_witnesses.len() {
                let (var, value) = true_witnesses[self.state.integrated_true];
                self.state.integrated_true += 1;
                self.state.stats.facts_integrated += 1;
                self.tighten_upper(var, value, Literal::TRUE)?;
                progressed = true;
            }
            while self.state.integrated_false < false_witnesses.len() {
                let (var, value) = false_witnesses[self.state.integrated_false];
                self.state.integrated_false += 1;
                self.state.stats.facts_integrated += 1;
                self.tighten_lower(var, value, Literal::TRUE)?;
                progressed = true;
            }

            if !progressed {
                return Ok(());
            }
        }
    }

    pub(crate) fn propagate_constraint(&mut self, cid: ConstraintId) -> Result<(), Conflict> {
        let mut constraint = std::mem::replace(&mut self.state.constraints[cid], ConstraintState::Tombstone);
        let result = constraint.propagate(self);
        self.state.constraints[cid] = constraint;
        match result {
            Ok(true) => {
                self.state.trail.top_mut().inactive.push(cid);
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(conflict) => {
                self.state.stats.conflicts += 1;
                Err(conflict)
            }
        }
    }

    fn check_full_impl(&mut self) -> Result<CheckFullOutcome, Conflict> {
        let count = self.state.variables.len();
        if count == 0 {
            return Ok(CheckFullOutcome::Complete);
        }
        for offset in 0..count {
            let index = (self.state.check_full_cursor + offset) % count;
            let var = VarId::create_from_index(index);
            let (lb, ub) = self.bounds(var);
            if lb < ub {
                let mid = lb + (ub - lb) / 2;
                let literal = self.get_literal(var, mid);
                self.state.check_full_cursor = (index + 1) % count;
                return Ok(CheckFullOutcome::Branch(literal));
            }
        }
        if self.config.check_solution {
            self.verify_solution();
        }
        if self.config.check_state {
            self.verify_state();
        }
        Ok(CheckFullOutcome::Complete)
    }

    /// Debug self-check (§6.4 `check_state`): every variable's bound stacks must be non-empty and
    /// internally consistent (`lb <= ub`), and every order literal registered in the literal map
    /// must still be the literal its `VarState` reports for that value. Unlike `verify_solution`,
    /// this checks the engine's own bookkeeping rather than the constraints it propagates.
    fn verify_state(&mut self) {
        for var in self.state.variables.keys() {
            let (lb, ub) = self.bounds(var);
            if lb > ub {
                log::error!("check_state: {var:?} has lb {lb} > ub {ub}");
            }
            debug_assert!(lb <= ub, "check_state: {var:?} has lb {lb} > ub {ub}");
            for (value, literal) in self.state.variables[var].iter_literals() {
                let matches = self.state.litmap.witnesses(literal).contains(&(var, value));
                debug_assert!(matches, "check_state: litmap entry for {var:?} <= {value} is out of sync");
            }
        }
    }

    /// Debug self-check (SPEC_FULL.md §4.2.8, gated on `check_solution`): every active sum/distinct
    /// constraint must actually hold on a fully-assigned model. A violation here means propagation
    /// missed a case rather than that the model is genuinely infeasible, so it is reported as a
    /// logged error and an assertion rather than a recoverable conflict.
    fn verify_solution(&mut self) {
        let variables = self.state.variables.clone();
        for index in 0..self.state.constraints.len() {
            let cid = ConstraintId::create_from_index(index);
            let satisfied = match &self.state.constraints[cid] {
                ConstraintState::Sum(sum) if sum.is_active() => {
                    !self.is_true(sum.activation) || sum.value(&variables) <= i64::from(sum.rhs())
                }
                ConstraintState::Distinct(distinct) if distinct.is_active() => {
                    !self.is_true(distinct.activation) || distinct.is_pairwise_distinct(&variables)
                }
                _ => true,
            };
            if !satisfied {
                log::error!("check_solution: constraint {index} violated on a total assignment");
            }
            debug_assert!(satisfied, "constraint {index} violated on a total assignment");
        }
    }

    /// Registers `cid` in `l2c` under both polarities of `activation` (SPEC_FULL.md §2 item 3)
    /// and asks the host to watch it, so that asserting the activation literal either way
    /// re-enqueues the constraint even when no term's bounds changed.
    fn watch_activation(&mut self, activation: Literal, cid: ConstraintId) {
        if activation == Literal::TRUE || activation == Literal::FALSE {
            return;
        }
        self.host.add_watch(activation);
        self.host.add_watch(!activation);
        self.state.l2c.entry(activation).or_default().push(cid);
        self.state.l2c.entry(!activation).or_default().push(cid);
    }

    fn push_constraint(&mut self, constraint: ConstraintState) -> ConstraintId {
        self.state.push_constraint(constraint)
    }

    /// SPEC_FULL.md §4.3.1 step 2, §6.2: registers a sum constraint, or — when it has a single
    /// term — integrates it directly by aliasing the activation to the corresponding order
    /// literal rather than allocating a `ConstraintState` at all.
    pub(crate) fn register_sum(&mut self, mut def: SumConstraintDef) -> Result<Option<ConstraintId>, Conflict> {
        if self.config.sort_constraints {
            def.terms.sort_by_key(|t| t.var.index());
        }
        if def.terms.len() == 1 {
            self.register_sum_degenerate(def)?;
            return Ok(None);
        }
        let activation = def.activation;
        let vars: Vec<VarId> = def.terms.iter().map(|t| t.var).collect();
        let cid = self.push_constraint(ConstraintState::Sum(SumConstraintState::new(def)));
        for var in vars {
            self.state.v2cs[var].push(cid);
        }
        self.watch_activation(activation, cid);
        self.enqueue(cid);
        Ok(Some(cid))
    }

    /// SPEC_FULL.md §6.2: a single-term sum is integrated directly rather than becoming a
    /// `ConstraintState`, by aliasing `activation` to the order literal it stands for. When
    /// `literals_only` is set (§6.4), this mints that literal without asserting the clauses that
    /// tie it to `activation` — the translator is left to wire the biconditional itself, and this
    /// call's only effect is guaranteeing the literal exists and is watched.
    fn register_sum_degenerate(&mut self, def: SumConstraintDef) -> Result<(), Conflict> {
        let SumConstraintDef { activation, terms, rhs, strict } = def;
        let term = terms[0];
        let literal = if term.coef > 0 {
            let value = clamp_i32(i64::from(rhs).div_euclid(i64::from(term.coef)));
            self.get_literal(term.var, value)
        } else {
            let positive = i64::from(-term.coef);
            let value = clamp_i32(ceil_div(-i64::from(rhs), positive));
            !self.get_literal(term.var, value - 1)
        };
        if self.config.literals_only {
            return Ok(());
        }
        if !self.add_clause(&[!activation, literal]) {
            return Err(Conflict);
        }
        if strict && !self.add_clause(&[!literal, activation]) {
            return Err(Conflict);
        }
        Ok(())
    }

    pub(crate) fn register_distinct(&mut self, mut def: DistinctConstraintDef) -> ConstraintId {
        if self.config.sort_constraints {
            for term in &mut def.terms {
                term.elements.sort_by_key(|e| e.var.index());
            }
        }
        let activation = def.activation;
        let vars: Vec<VarId> = def
            .terms
            .iter()
            .flat_map(|t| t.elements.iter().map(|e| e.var))
            .collect();
        let cid = self.push_constraint(ConstraintState::Distinct(DistinctConstraintState::new(def)));
        for var in vars {
            self.state.v2cs[var].push(cid);
        }
        self.watch_activation(activation, cid);
        self.enqueue(cid);
        cid
    }

    /// SPEC_FULL.md §4.2.10: registers the single minimize constraint, unbounded until the first
    /// [`Ctx::update_minimize`] call tightens it.
    pub(crate) fn set_minimize(&mut self, def: MinimizeConstraintDef) {
        let MinimizeConstraintDef { terms, adjust } = def;
        let vars: Vec<VarId> = terms.iter().map(|t| t.var).collect();
        let cid = self.push_constraint(ConstraintState::Sum(SumConstraintState::new_minimize(terms, MAX_INT)));
        for var in vars {
            self.state.v2cs[var].push(cid);
        }
        self.state.minimize_id = Some(cid);
        self.state.minimize_adjust = adjust;
    }

    pub(crate) fn update_minimize(&mut self, bound: i32, dl: u32) {
        self.state.update_minimize(bound, dl);
    }

    /// SPEC_FULL.md §6.2 "Domain": translated directly into clauses over order literals at
    /// registration time rather than kept as a running `ConstraintState`, since the set of
    /// intervals is static for the lifetime of the constraint.
    pub(crate) fn apply_domain_constraint(&mut self, def: DomainConstraintDef) -> Result<(), Conflict> {
        let DomainConstraintDef { activation, var, mut intervals } = def;
        intervals.sort_by_key(|&(lo, _)| lo);
        let (min_bound, max_bound) = {
            let vs = &self.state.variables[var];
            (vs.min_bound(), vs.max_bound())
        };

        let mut merged: Vec<(i32, i32)> = Vec::new();
        for (lo, hi) in intervals {
            let lo = lo.max(min_bound);
            let hi = hi.min(max_bound);
            if lo >= hi {
                continue;
            }
            if let Some(last) = merged.last_mut() {
                if lo <= last.1 {
                    last.1 = last.1.max(hi);
                    continue;
                }
            }
            merged.push((lo, hi));
        }

        if merged.is_empty() {
            return if self.add_clause(&[!activation]) { Ok(()) } else { Err(Conflict) };
        }

        let mut cursor = min_bound;
        for &(lo, hi) in &merged {
            if cursor < lo {
                self.exclude_range(activation, var, cursor, lo)?;
            }
            cursor = hi;
        }
        if cursor < max_bound {
            self.exclude_range(activation, var, cursor, max_bound)?;
        }
        Ok(())
    }

    fn exclude_range(&mut self, activation: Literal, var: VarId, lo: i32, hi: i32) -> Result<(), Conflict> {
        for value in lo..hi {
            let below = self.get_literal(var, value - 1);
            let at_or_below = self.get_literal(var, value);
            let mut clause = Vec::with_capacity(3);
            if activation != Literal::TRUE {
                clause.push(!activation);
            }
            clause.push(below);
            clause.push(!at_or_below);
            if !self.add_clause(&clause) {
                return Err(Conflict);
            }
        }
        Ok(())
    }

    /// SPEC_FULL.md §4.3.1 step 6: replaces small, translatable sum constraints with a host-native
    /// weight constraint. Translated constraints become [`ConstraintState::Tombstone`] rather than
    /// being physically removed, since `v2cs` and stored [`ConstraintId`]s are stable references.
    /// Returns how many constraints were translated, for the facade's `init`-milestone logging.
    pub(crate) fn translate_all(&mut self, weight_constraint_limit: u32) -> usize {
        let ids: Vec<ConstraintId> = self.state.constraints.keys().collect();
        let variables = self.state.variables.clone();
        let mut translated_count = 0;
        for cid in ids {
            let constraint = std::mem::replace(&mut self.state.constraints[cid], ConstraintState::Tombstone);
            let translated = constraint.is_active() && constraint.translate(self, &variables, weight_constraint_limit);
            if translated {
                translated_count += 1;
            } else {
                self.state.constraints[cid] = constraint;
            }
        }
        translated_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::MockHost;

    #[test]
    fn get_literal_is_stable_and_respects_extrema() {
        let mut state = State::new();
        let var = state.add_variable(0, 10);
        let config = PropagatorConfig::default();
        let mut host = MockHost::new();
        let mut ctx = Ctx { state: &mut state, host: &mut host, config: &config };

        assert_eq!(ctx.get_literal(var, -1), Literal::FALSE);
        assert_eq!(ctx.get_literal(var, 10), Literal::TRUE);
        let a = ctx.get_literal(var, 5);
        let b = ctx.get_literal(var, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn propagate_tightens_upper_bound_and_chains() {
        let mut state = State::new();
        let var = state.add_variable(0, 10);
        let config = PropagatorConfig::default();
        let mut host = MockHost::new();

        let (l5, l7) = {
            let mut ctx = Ctx { state: &mut state, host: &mut host, config: &config };
            let l5 = ctx.get_literal(var, 5);
            let l7 = ctx.get_literal(var, 7);
            (l5, l7)
        };
        host.assert_true(l5);
        assert!(state.propagate(&mut host, &config, &[l5]));
        assert_eq!(state.bounds(var), (0, 5));
        assert!(host.is_true(l7));
    }

    #[test]
    fn undo_restores_bounds() {
        let mut state = State::new();
        let var = state.add_variable(0, 10);
        let config = PropagatorConfig::default();
        let mut host = MockHost::new();
        host.new_decision_level();

        let l5 = {
            let mut ctx = Ctx { state: &mut state, host: &mut host, config: &config };
            ctx.get_literal(var, 5)
        };
        host.assert_true(l5);
        assert!(state.propagate(&mut host, &config, &[l5]));
        assert_eq!(state.bounds(var), (0, 5));
        state.undo();
        assert_eq!(state.bounds(var), (0, 10));
    }
}
