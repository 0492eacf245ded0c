//! Constraint state dispatch (SPEC_FULL.md §9: "tagged-variant dispatch ... a capability set
//! dispatched by match"). The minimize constraint is not a separate variant: per SPEC_FULL.md §3
//! it is an ordinary sum constraint whose activation literal is always [`Literal::TRUE`].

mod distinct;
mod sum;

pub(crate) use distinct::DistinctConstraintState;
pub(crate) use sum::SumConstraintState;

use crate::basic_types::KeyedVec;
use crate::basic_types::Literal;
use crate::basic_types::VarId;
use crate::engine::state::Ctx;
use crate::engine::var_state::VarState;
use crate::error::Conflict;

/// One registered constraint's live propagation state. [`ConstraintKind::Tombstone`] is a
/// placeholder used only to move a constraint out of its [`crate::basic_types::KeyedVec`] slot
/// (via [`std::mem::replace`]) for the duration of a `propagate`/`translate` call, so that call
/// doesn't alias the very collection it lives in; it is also the permanent resting state of a
/// constraint that `translate` replaced with a host-native weight constraint.
#[derive(Debug, Clone)]
pub(crate) enum ConstraintState {
    Sum(SumConstraintState),
    Distinct(DistinctConstraintState),
    Tombstone,
}

impl ConstraintState {
    pub(crate) fn activation(&self) -> Literal {
        match self {
            ConstraintState::Sum(sum) => sum.activation,
            ConstraintState::Distinct(distinct) => distinct.activation,
            ConstraintState::Tombstone => Literal::TRUE,
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        match self {
            ConstraintState::Sum(sum) => sum.is_active(),
            ConstraintState::Distinct(distinct) => distinct.is_active(),
            ConstraintState::Tombstone => false,
        }
    }

    pub(crate) fn mark_active(&mut self) {
        match self {
            ConstraintState::Sum(sum) => sum.mark_active(),
            ConstraintState::Distinct(distinct) => distinct.mark_active(),
            ConstraintState::Tombstone => {}
        }
    }

    pub(crate) fn vars(&self) -> Vec<VarId> {
        match self {
            ConstraintState::Sum(sum) => sum.vars().collect(),
            ConstraintState::Distinct(distinct) => distinct.vars().collect(),
            ConstraintState::Tombstone => Vec::new(),
        }
    }

    /// Returns `Ok(true)` if the constraint became inactive this call, `Ok(false)` if it stayed
    /// (or already was) active without deriving a conflict, `Err(Conflict)` otherwise.
    pub(crate) fn propagate(&mut self, ctx: &mut Ctx) -> Result<bool, Conflict> {
        match self {
            ConstraintState::Sum(sum) => sum.propagate(ctx),
            ConstraintState::Distinct(distinct) => distinct.propagate(ctx),
            ConstraintState::Tombstone => Ok(false),
        }
    }

    /// SPEC_FULL.md §4.3.1 step 6. Only sum constraints translate; distinct constraints have no
    /// direct weight-constraint encoding and are left as-is.
    pub(crate) fn translate(
        &self,
        ctx: &mut Ctx,
        variables: &KeyedVec<VarId, VarState>,
        weight_constraint_limit: u32,
    ) -> bool {
        match self {
            ConstraintState::Sum(sum) => sum.translate(ctx, variables, weight_constraint_limit),
            ConstraintState::Distinct(_) | ConstraintState::Tombstone => false,
        }
    }
}
