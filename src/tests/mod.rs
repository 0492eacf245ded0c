//! Integration tests driving the propagator purely through its public facade
//! (`crate::propagator::Propagator`), the way a host binding would (SPEC_FULL.md §8).

mod scenarios;
