//! The public propagator facade (SPEC_FULL.md §4.3, §6): a registry of one per-thread [`State`],
//! the `init` constraint-extraction/merge/simplify/translate pipeline (SPEC_FULL.md §4.3.1), and
//! the `propagate`/`check`/`undo`/`check_full`/`get_assignment`/`update_minimize` dispatch a host
//! binding drives by thread id. Everything upstream of this module is crate-private; a host
//! binding (out of scope here) only ever calls through [`Propagator`].

use fnv::FnvHashMap;

use crate::basic_types::Literal;
use crate::basic_types::StorageKey;
use crate::basic_types::VarId;
use crate::config::PropagatorConfig;
use crate::engine::constraint::DistinctConstraintDef;
use crate::engine::constraint::DistinctTerm;
use crate::engine::constraint::DomainConstraintDef;
use crate::engine::constraint::MinimizeConstraintDef;
use crate::engine::constraint::SumConstraintDef;
use crate::engine::constraint::SumTerm;
use crate::engine::state::Ctx;
use crate::engine::state::State;
use crate::error::InitializationError;
use crate::host::AsControl;
use crate::host::HostControl;
use crate::host::HostInit;

/// A thread index into the host's search, as handed back to `propagate`/`check`/`undo` (SPEC_FULL.md §5).
pub type ThreadId = usize;

/// One `coef * var` term of a sum or distinct element, named the way the normalized translator
/// output names variables (SPEC_FULL.md §3: "a stringly-typed name is sufficient").
#[derive(Debug, Clone)]
pub struct Term {
    pub coef: i32,
    pub var: String,
}

/// `activation -> sum(coef * var) <= rhs`, SPEC_FULL.md §6.2 "Sum".
#[derive(Debug, Clone)]
pub struct SumInput {
    pub activation: Literal,
    pub elements: Vec<Term>,
    pub rhs: i32,
    pub strict: bool,
}

impl SumInput {
    /// `activation -> a - b <= rhs`, SPEC_FULL.md §6.2's desugaring of a `&diff` atom: a two-term
    /// sum is common enough from the front end that it gets its own constructor rather than every
    /// caller building the two-element `Vec` by hand.
    pub fn difference(activation: Literal, a: impl Into<String>, b: impl Into<String>, rhs: i32, strict: bool) -> SumInput {
        SumInput {
            activation,
            elements: vec![Term { coef: 1, var: a.into() }, Term { coef: -1, var: b.into() }],
            rhs,
            strict,
        }
    }
}

/// One term of a distinct constraint: `offset + sum(coef * var)`.
#[derive(Debug, Clone)]
pub struct DistinctElement {
    pub offset: i32,
    pub elements: Vec<Term>,
}

/// `activation -> ` the values of `terms` are pairwise distinct, SPEC_FULL.md §6.2 "Distinct".
#[derive(Debug, Clone)]
pub struct DistinctInput {
    pub activation: Literal,
    pub terms: Vec<DistinctElement>,
}

/// `activation -> var` in the union of the half-open intervals `[lo, hi)`, SPEC_FULL.md §6.2 "Domain".
#[derive(Debug, Clone)]
pub struct DomainInput {
    pub activation: Literal,
    pub var: String,
    pub intervals: Vec<(i32, i32)>,
}

/// `minimize sum(coef * var) + adjust`, SPEC_FULL.md §6.2 "Minimize". At most one per solving step.
#[derive(Debug, Clone)]
pub struct MinimizeInput {
    pub elements: Vec<Term>,
    pub adjust: i32,
}

/// One variable's identity and static domain extrema, as introduced by `init`.
#[derive(Debug, Clone)]
pub struct VariableSpec {
    pub name: String,
    pub min_bound: i32,
    pub max_bound: i32,
}

/// Everything a translator yields for one `init` call (SPEC_FULL.md §6.2).
#[derive(Debug, Clone, Default)]
pub struct InitSpec {
    pub variables: Vec<VariableSpec>,
    pub sums: Vec<SumInput>,
    pub distinct: Vec<DistinctInput>,
    pub domains: Vec<DomainInput>,
    pub minimize: Option<MinimizeInput>,
}

/// The outcome of [`Propagator::check_full`] (SPEC_FULL.md §4.2.8): either a new literal for the
/// host's decision heuristic to pick up, or confirmation every variable is already fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckFullOutcome {
    Branch(Literal),
    Complete,
}

/// Per-solving-step propagator state: one [`State`] per host thread, plus the name <-> [`VarId`]
/// mapping shared across all of them (SPEC_FULL.md §3 "Variables ... live for the lifetime of the
/// Propagator").
#[derive(Debug, Default)]
pub struct Propagator {
    config: PropagatorConfig,
    name_to_var: FnvHashMap<Box<str>, VarId>,
    var_names: Vec<Box<str>>,
    threads: Vec<State>,
}

impl Propagator {
    pub fn new(config: PropagatorConfig) -> Propagator {
        Propagator { config, ..Propagator::default() }
    }

    pub fn config(&self) -> &PropagatorConfig {
        &self.config
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// The current `[lower, upper]` bounds of a named variable on `thread`, or `None` if the name
    /// is not (yet) known to this propagator.
    pub fn bounds(&self, thread: ThreadId, name: &str) -> Option<(i32, i32)> {
        let var = self.name_to_var.get(name).copied()?;
        Some(self.threads[thread].bounds(var))
    }

    fn var_id(&self, name: &str) -> Result<VarId, InitializationError> {
        self.name_to_var.get(name).copied().ok_or_else(|| InitializationError::UnknownVariable { name: name.into() })
    }

    fn resolve_term(&self, term: &Term) -> Result<SumTerm, InitializationError> {
        Ok(SumTerm { coef: term.coef, var: self.var_id(&term.var)? })
    }

    fn resolve_terms(&self, terms: &[Term]) -> Result<Vec<SumTerm>, InitializationError> {
        terms.iter().map(|t| self.resolve_term(t)).collect()
    }

    fn to_sum_def(&self, input: &SumInput) -> Result<SumConstraintDef, InitializationError> {
        Ok(SumConstraintDef {
            activation: input.activation,
            terms: self.resolve_terms(&input.elements)?,
            rhs: input.rhs,
            strict: input.strict,
        })
    }

    fn to_distinct_def(&self, input: &DistinctInput) -> Result<DistinctConstraintDef, InitializationError> {
        let terms = input
            .terms
            .iter()
            .map(|t| {
                Ok(DistinctTerm {
                    offset: t.offset,
                    elements: self.resolve_terms(&t.elements)?,
                })
            })
            .collect::<Result<Vec<_>, InitializationError>>()?;
        Ok(DistinctConstraintDef { activation: input.activation, terms })
    }

    fn to_domain_def(&self, input: &DomainInput) -> Result<DomainConstraintDef, InitializationError> {
        Ok(DomainConstraintDef {
            activation: input.activation,
            var: self.var_id(&input.var)?,
            intervals: input.intervals.clone(),
        })
    }

    fn to_minimize_def(&self, input: &MinimizeInput) -> Result<MinimizeConstraintDef, InitializationError> {
        Ok(MinimizeConstraintDef { terms: self.resolve_terms(&input.elements)?, adjust: input.adjust })
    }

    /// SPEC_FULL.md §4.3.1 step 1 equivalent plus thread-count reconciliation: grows or shrinks
    /// the per-thread registry to `num_threads`, seeding new slots from thread 0 so a solving step
    /// that widens its thread count still starts every thread from the currently learned bounds.
    fn ensure_threads(&mut self, num_threads: usize) {
        if self.threads.is_empty() {
            self.threads = (0..num_threads).map(|_| State::new()).collect();
            return;
        }
        while self.threads.len() < num_threads {
            let seed = self.threads[0].clone();
            self.threads.push(seed);
        }
        self.threads.truncate(num_threads);
    }

    /// SPEC_FULL.md §4.3.1 step 2, §3 "Variables are created by the Propagator in init": adds any
    /// not-yet-known variable to every thread, in the order the translator presents them. A name
    /// already registered in an earlier `init` call (multi-shot re-initialization) is left alone
    /// so its learned bounds persist (SPEC_FULL.md §8 scenario 7). Each variable's bounds are
    /// clamped to the configured `min_int`/`max_int` extrema (SPEC_FULL.md §6.4): those options
    /// are the static lower/upper bounds for *every* variable, not just the engine-wide sentinel.
    fn register_variables(&mut self, variables: &[VariableSpec]) -> Result<(), InitializationError> {
        for spec in variables {
            if self.name_to_var.contains_key(spec.name.as_str()) {
                continue;
            }
            let min_bound = spec.min_bound.max(self.config.min_int);
            let max_bound = spec.max_bound.min(self.config.max_int);
            if min_bound > max_bound {
                return Err(InitializationError::EmptyDomain { variable: spec.name.as_str().into() });
            }
            let mut var = None;
            for state in &mut self.threads {
                var = Some(state.add_variable(min_bound, max_bound));
            }
            let var = var.expect("ensure_threads runs before register_variables");
            let _ = self.name_to_var.insert(spec.name.as_str().into(), var);
            self.var_names.push(spec.name.as_str().into());
        }
        Ok(())
    }

    /// SPEC_FULL.md §4.3.1 step 3: intersects the bounds every thread has independently derived
    /// (from a previous solving step's search) and forces the result onto thread 0 as facts.
    fn merge_thread_bounds(&mut self, host: &mut dyn HostControl) -> Result<(), InitializationError> {
        if self.threads.len() <= 1 || self.var_names.is_empty() {
            return Ok(());
        }
        let mut merged = Vec::with_capacity(self.var_names.len());
        for index in 0..self.var_names.len() {
            let var = VarId::create_from_index(index);
            let mut lb = i32::MIN;
            let mut ub = i32::MAX;
            for state in &self.threads {
                let (thread_lb, thread_ub) = state.bounds(var);
                lb = lb.max(thread_lb);
                ub = ub.min(thread_ub);
            }
            merged.push((var, lb, ub));
        }

        let mut ctx = Ctx::new(&mut self.threads[0], host, &self.config);
        for (var, lb, ub) in merged {
            let (cur_lb, cur_ub) = ctx.bounds(var);
            if lb > ub {
                return Err(InitializationError::HostRejected);
            }
            if lb > cur_lb && ctx.force_bound(var, lb - 1, false, &[]).is_err() {
                return Err(InitializationError::HostRejected);
            }
            if ub < cur_ub && ctx.force_bound(var, ub, true, &[]).is_err() {
                return Err(InitializationError::HostRejected);
            }
        }
        Ok(())
    }

    /// Broadcasts thread 0 to every other thread (SPEC_FULL.md §4.3.1 step 7). Run twice: once
    /// before the minimize constraint is registered, once after (step 8).
    fn broadcast_master(&mut self) {
        if self.threads.len() <= 1 {
            return;
        }
        let master = self.threads[0].clone();
        for thread in self.threads.iter_mut().skip(1) {
            *thread = master.clone();
        }
    }

    /// Runs the full `init` pipeline (SPEC_FULL.md §4.3.1) for one solving step: builds/extends
    /// the per-thread registry, introduces variables and constraints, reconciles thread bounds,
    /// simplifies against the host's current trail, retires fixed order literals, translates
    /// small sum constraints to host-native weight constraints, and finally broadcasts thread 0's
    /// resulting state to every other thread before registering the minimize objective.
    pub fn init(&mut self, host: &mut dyn HostInit, num_threads: usize, spec: InitSpec) -> Result<(), InitializationError> {
        self.config.validate()?;
        if num_threads == 0 {
            return Err(InitializationError::HostRejected);
        }
        if self.config.weight_constraint_limit == 0 {
            log::warn!("weight_constraint_limit is 0: no sum constraint will ever be translated to a weight constraint");
        }
        log::info!(
            "init: {} variable(s), {} sum(s), {} distinct(s), {} domain statement(s), minimize = {} over {} thread(s)",
            spec.variables.len(),
            spec.sums.len(),
            spec.distinct.len(),
            spec.domains.len(),
            spec.minimize.is_some(),
            num_threads,
        );

        self.ensure_threads(num_threads);
        self.register_variables(&spec.variables)?;

        // Step 2: extract constraints onto thread 0. Name resolution runs first and borrows only
        // `self.name_to_var`, so the defs are fully owned before `self.threads`/`self.config` are
        // borrowed for the `Ctx` below.
        let sum_defs = spec.sums.iter().map(|s| self.to_sum_def(s)).collect::<Result<Vec<_>, _>>()?;
        let distinct_defs = spec.distinct.iter().map(|d| self.to_distinct_def(d)).collect::<Result<Vec<_>, _>>()?;
        let domain_defs = spec.domains.iter().map(|d| self.to_domain_def(d)).collect::<Result<Vec<_>, _>>()?;
        {
            let mut as_control = AsControl(host);
            let mut ctx = Ctx::new(&mut self.threads[0], &mut as_control, &self.config);
            for def in sum_defs {
                if ctx.register_sum(def).is_err() {
                    return Err(InitializationError::HostRejected);
                }
            }
            for def in distinct_defs {
                let _ = ctx.register_distinct(def);
            }
            for def in domain_defs {
                if ctx.apply_domain_constraint(def).is_err() {
                    return Err(InitializationError::HostRejected);
                }
            }
        }

        // Steps 3-4: merge thread bounds, then integrate the host's trail and propagate to
        // fixpoint, all through the same `HostControl` code path `propagate`/`check` use.
        {
            let mut as_control = AsControl(host);
            self.merge_thread_bounds(&mut as_control)?;

            let trail: Vec<Literal> = as_control.0.trail().to_vec();
            if !self.threads[0].propagate(&mut as_control, &self.config, &trail) {
                return Err(InitializationError::HostRejected);
            }
            if !self.threads[0].check(&mut as_control, &self.config) {
                return Err(InitializationError::HostRejected);
            }
        }

        // Step 5: retire order literals that are now facts or fall outside the final bounds.
        self.threads[0].cleanup_literals(host);

        // Step 6: translate small sum constraints to host-native weight constraints.
        {
            let mut as_control = AsControl(host);
            let mut ctx = Ctx::new(&mut self.threads[0], &mut as_control, &self.config);
            let translated = ctx.translate_all(self.config.weight_constraint_limit);
            log::info!("init: translated {translated} sum constraint(s) to native weight constraints");
        }

        // Step 7: copy thread 0 to every other thread.
        self.broadcast_master();

        // Step 8: the minimize constraint is added last so its clauses are never transitively
        // triggered by step 6's translation pass, then re-broadcast to every thread.
        if let Some(minimize) = &spec.minimize {
            let def = self.to_minimize_def(minimize)?;
            let mut as_control = AsControl(host);
            let mut ctx = Ctx::new(&mut self.threads[0], &mut as_control, &self.config);
            ctx.set_minimize(def);
            self.broadcast_master();
        }

        Ok(())
    }

    /// SPEC_FULL.md §4.3.2, §6.1 `propagate(control, changes)`.
    pub fn propagate(&mut self, thread: ThreadId, host: &mut dyn HostControl, changes: &[Literal]) -> bool {
        self.threads[thread].propagate(host, &self.config, changes)
    }

    /// SPEC_FULL.md §4.3.2, §6.1 `check(control)`.
    pub fn check(&mut self, thread: ThreadId, host: &mut dyn HostControl) -> bool {
        self.threads[thread].check(host, &self.config)
    }

    /// SPEC_FULL.md §4.3.2, §6.1 `undo(thread_id, assignment, changes)`. Never fails.
    pub fn undo(&mut self, thread: ThreadId) {
        self.threads[thread].undo();
    }

    /// SPEC_FULL.md §4.2.8. `Err` signals the same kind of conflict `propagate`/`check` report as
    /// `false`; in the current propagators this never arises from `check_full` itself, but the
    /// signature stays honest about the underlying `Result<_, Conflict>`.
    pub fn check_full(&mut self, thread: ThreadId, host: &mut dyn HostControl) -> Result<CheckFullOutcome, ()> {
        match self.threads[thread].check_full(host, &self.config) {
            Ok(crate::engine::state::CheckFullOutcome::Branch(literal)) => Ok(CheckFullOutcome::Branch(literal)),
            Ok(crate::engine::state::CheckFullOutcome::Complete) => Ok(CheckFullOutcome::Complete),
            Err(_conflict) => Err(()),
        }
    }

    /// SPEC_FULL.md §4.3.2 `get_assignment`: `(var_name, lower_bound)` for every variable, in
    /// `init` order. On a total assignment `lower_bound == upper_bound`, so this is the value.
    pub fn get_assignment(&self, thread: ThreadId) -> Vec<(String, i32)> {
        self.threads[thread]
            .assignment()
            .into_iter()
            .zip(self.var_names.iter())
            .map(|((_, value), name)| (name.to_string(), value))
            .collect()
    }

    /// SPEC_FULL.md §4.2.10: records an improved model bound found externally (by the host's
    /// search) and tightens the minimize constraint on `thread` accordingly.
    pub fn update_minimize(&mut self, thread: ThreadId, bound: i32, decision_level: u32) {
        self.threads[thread].update_minimize(bound, decision_level);
    }
}
