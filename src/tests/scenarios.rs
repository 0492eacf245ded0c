use crate::config::PropagatorConfig;
use crate::engine::test_support::MockHost;
use crate::propagator::CheckFullOutcome;
use crate::propagator::DistinctElement;
use crate::propagator::DistinctInput;
use crate::propagator::InitSpec;
use crate::propagator::MinimizeInput;
use crate::propagator::Propagator;
use crate::propagator::SumInput;
use crate::propagator::Term;
use crate::propagator::VariableSpec;
use crate::Literal;

fn var(name: &str, min_bound: i32, max_bound: i32) -> VariableSpec {
    VariableSpec { name: name.to_string(), min_bound, max_bound }
}

fn term(coef: i32, name: &str) -> Term {
    Term { coef, var: name.to_string() }
}

#[test]
fn sum_equality_forces_unique_model() {
    let mut propagator = Propagator::new(PropagatorConfig::default());
    let mut host = MockHost::new();
    let spec = InitSpec {
        variables: vec![var("x", -20, 20)],
        sums: vec![
            SumInput { activation: Literal::TRUE, elements: vec![term(1, "x")], rhs: 5, strict: false },
            SumInput { activation: Literal::TRUE, elements: vec![term(-1, "x")], rhs: -5, strict: false },
        ],
        ..InitSpec::default()
    };

    propagator.init(&mut host, 1, spec).expect("a fixed variable is consistent");

    assert_eq!(propagator.bounds(0, "x"), Some((5, 5)));
    assert_eq!(propagator.get_assignment(0), vec![("x".to_string(), 5)]);
}

#[test]
fn interval_sum_constraints_narrow_bounds() {
    let mut propagator = Propagator::new(PropagatorConfig::default());
    let mut host = MockHost::new();
    let spec = InitSpec {
        variables: vec![var("x", -3, 3)],
        sums: vec![
            SumInput { activation: Literal::TRUE, elements: vec![term(1, "x")], rhs: 1, strict: false },
            SumInput { activation: Literal::TRUE, elements: vec![term(-1, "x")], rhs: 1, strict: false },
        ],
        ..InitSpec::default()
    };

    propagator.init(&mut host, 1, spec).expect("[-1, 1] is a non-empty interval");

    assert_eq!(propagator.bounds(0, "x"), Some((-1, 1)));
}

#[test]
fn cyclic_inequalities_are_detected_as_inconsistent() {
    let mut propagator = Propagator::new(PropagatorConfig::default());
    let mut host = MockHost::new();
    let spec = InitSpec {
        variables: vec![var("x", -20, 20), var("y", -20, 20)],
        sums: vec![
            SumInput {
                activation: Literal::TRUE,
                elements: vec![term(1, "x"), term(-1, "y")],
                rhs: -1,
                strict: false,
            },
            SumInput {
                activation: Literal::TRUE,
                elements: vec![term(1, "y"), term(-1, "x")],
                rhs: -1,
                strict: false,
            },
        ],
        ..InitSpec::default()
    };

    assert!(propagator.init(&mut host, 1, spec).is_err());
}

#[test]
fn distinct_pair_leaves_both_assignments_open() {
    let mut propagator = Propagator::new(PropagatorConfig::default());
    let mut host = MockHost::new();
    let spec = InitSpec {
        variables: vec![var("x", 0, 1), var("y", 0, 1)],
        distinct: vec![DistinctInput {
            activation: Literal::TRUE,
            terms: vec![
                DistinctElement { offset: 0, elements: vec![term(1, "x")] },
                DistinctElement { offset: 0, elements: vec![term(1, "y")] },
            ],
        }],
        ..InitSpec::default()
    };

    propagator.init(&mut host, 1, spec).expect("x != y is satisfiable over {0, 1}");

    assert_eq!(propagator.bounds(0, "x"), Some((0, 1)));
    assert_eq!(propagator.bounds(0, "y"), Some((0, 1)));
}

#[test]
fn chained_inequalities_tighten_to_the_feasible_diagonal() {
    // SPEC_FULL.md §8 scenario 3: y - 5x <= 0, 5x - y <= 0 (i.e. y == 5x), 15x <= 15, 10x <= 7.
    // The last two bounds force x <= 0 (since 10x <= 7 rules out x = 1); y == 5x then pulls y's
    // bound down to [-20, 0], and that in turn forces x's own lower bound up to -4 (below -4, y
    // would have to go below -20 to keep y == 5x, which the declared domain forbids).
    let mut propagator = Propagator::new(PropagatorConfig::default());
    let mut host = MockHost::new();
    let spec = InitSpec {
        variables: vec![var("x", -20, 20), var("y", -20, 20)],
        sums: vec![
            SumInput {
                activation: Literal::TRUE,
                elements: vec![term(1, "y"), term(-5, "x")],
                rhs: 0,
                strict: false,
            },
            SumInput {
                activation: Literal::TRUE,
                elements: vec![term(-1, "y"), term(5, "x")],
                rhs: 0,
                strict: false,
            },
            SumInput { activation: Literal::TRUE, elements: vec![term(15, "x")], rhs: 15, strict: false },
            SumInput { activation: Literal::TRUE, elements: vec![term(10, "x")], rhs: 7, strict: false },
        ],
        ..InitSpec::default()
    };

    propagator.init(&mut host, 1, spec).expect("x <= 0, y == 5x is satisfiable");

    assert_eq!(propagator.bounds(0, "x"), Some((-4, 0)));
}

#[test]
fn weighted_equality_forces_three_models() {
    // SPEC_FULL.md §8 scenario 6: 5x + 10y == 20 over [-3, 3] admits only
    // {(-2,3), (0,2), (2,1)}, so propagation alone must at least narrow y's domain to {1,2,3}
    // and keep x within the range those models use.
    let mut propagator = Propagator::new(PropagatorConfig::default());
    let mut host = MockHost::new();
    let spec = InitSpec {
        variables: vec![var("x", -3, 3), var("y", -3, 3)],
        sums: vec![
            SumInput {
                activation: Literal::TRUE,
                elements: vec![term(5, "x"), term(10, "y")],
                rhs: 20,
                strict: false,
            },
            SumInput {
                activation: Literal::TRUE,
                elements: vec![term(-5, "x"), term(-10, "y")],
                rhs: -20,
                strict: false,
            },
        ],
        ..InitSpec::default()
    };

    propagator.init(&mut host, 1, spec).expect("5x + 10y == 20 is satisfiable over [-3, 3]");

    assert_eq!(propagator.bounds(0, "x"), Some((-2, 2)));
    assert_eq!(propagator.bounds(0, "y"), Some((1, 3)));
}

#[test]
fn check_full_reports_complete_for_an_already_fixed_variable() {
    let mut propagator = Propagator::new(PropagatorConfig::default());
    let mut host = MockHost::new();
    let spec = InitSpec {
        variables: vec![var("x", 5, 5)],
        ..InitSpec::default()
    };

    propagator.init(&mut host, 1, spec).expect("a singleton domain is consistent");

    assert_eq!(propagator.check_full(0, &mut host), Ok(CheckFullOutcome::Complete));
}

#[test]
fn check_full_branches_on_the_midpoint_then_completes_once_fixed() {
    let mut propagator = Propagator::new(PropagatorConfig::default());
    let mut host = MockHost::new();
    let spec = InitSpec {
        variables: vec![var("x", 0, 1)],
        ..InitSpec::default()
    };

    propagator.init(&mut host, 1, spec).expect("an unconstrained [0, 1] domain is consistent");

    let branch = propagator.check_full(0, &mut host).expect("two open values need a branching literal");
    let CheckFullOutcome::Branch(literal) = branch else {
        panic!("expected a branching literal for an unfixed variable, got {branch:?}");
    };

    host.assert_true(literal);
    assert!(propagator.propagate(0, &mut host, &[literal]));
    assert_eq!(propagator.bounds(0, "x"), Some((0, 0)));
    assert_eq!(propagator.check_full(0, &mut host), Ok(CheckFullOutcome::Complete));
}

#[test]
fn update_minimize_tightens_the_objective_bound_on_check() {
    let mut propagator = Propagator::new(PropagatorConfig::default());
    let mut host = MockHost::new();
    let spec = InitSpec {
        variables: vec![var("x", 0, 10)],
        minimize: Some(MinimizeInput { elements: vec![term(1, "x")], adjust: 0 }),
        ..InitSpec::default()
    };

    propagator.init(&mut host, 1, spec).expect("an unbounded minimize objective is consistent");
    assert_eq!(propagator.bounds(0, "x"), Some((0, 10)));

    // A host-driven search reports a model with x == 5; the objective's rhs tightens to x <= 4.
    propagator.update_minimize(0, 5, 0);
    assert!(propagator.check(0, &mut host));

    assert_eq!(propagator.bounds(0, "x"), Some((0, 4)));
}

#[test]
fn multi_shot_tightening_persists_learned_facts() {
    let mut propagator = Propagator::new(PropagatorConfig::default());

    let steps = [2, 1, 0, 5];
    let expected = [(0, 2), (0, 1), (0, 0), (0, 0)];

    for (rhs, bound) in steps.into_iter().zip(expected) {
        let mut host = MockHost::new();
        let spec = InitSpec {
            variables: vec![var("x", 0, 20)],
            sums: vec![SumInput {
                activation: Literal::TRUE,
                elements: vec![term(1, "x")],
                rhs,
                strict: false,
            }],
            ..InitSpec::default()
        };

        propagator.init(&mut host, 1, spec).expect("each step only tightens an already-consistent bound");

        assert_eq!(propagator.bounds(0, "x"), Some(bound));
    }
}
