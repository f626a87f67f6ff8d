//! End-to-end search scenarios over small integer domains.

use exprsearch::{
    build_candidates_exhaustive, Action, Domain, DomainBuilder, ExprIx, ExpressionBuilderState,
    ExpressionSearch, OutputType, SearchConfig, SearchError, TypedFunction, Universe,
};
use rand::{rngs::StdRng, SeedableRng};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

fn comparison_domain(u: &mut Universe) -> Domain {
    let int = u.intern_type("Int");
    let boolean = u.intern_type("Bool");
    let x = u.input("x", int);
    let one = u.constant("1", int);
    DomainBuilder::new()
        .input(x)
        .constant(one)
        .function(TypedFunction::new("add", &[int, int], OutputType::Fixed(int)))
        .function(TypedFunction::new("gt", &[int, int], OutputType::Fixed(boolean)))
        .target(boolean)
        .build(u)
        .unwrap()
}

fn describe_all(domain: &Domain, u: &Universe, exprs: &[ExprIx]) -> BTreeSet<String> {
    exprs.iter().map(|e| domain.describe(u, *e)).collect()
}

fn seeded(complexity: usize, extended_leaves: bool) -> SearchConfig {
    SearchConfig {
        complexity,
        extended_leaves,
        seed: Some(2024),
        ..SearchConfig::default()
    }
}

#[test]
fn test_exhaustive_comparisons_of_complexity_three() {
    let mut u = Universe::new();
    let domain = comparison_domain(&mut u);

    let found = build_candidates_exhaustive(&domain, &mut u, 3).unwrap();
    assert_eq!(found.len(), 4);

    let expected: BTreeSet<String> = ["gt(x, 1)", "gt(1, x)", "gt(x, x)", "gt(1, 1)"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(describe_all(&domain, &u, &found), expected);
}

#[test]
fn test_exhaustive_grows_with_complexity() {
    let mut u = Universe::new();
    let domain = comparison_domain(&mut u);

    let small = build_candidates_exhaustive(&domain, &mut u, 3).unwrap();
    let large = build_candidates_exhaustive(&domain, &mut u, 5).unwrap();
    let small = describe_all(&domain, &u, &small);
    let large = describe_all(&domain, &u, &large);

    assert!(small.is_subset(&large));
    assert!(large.contains("gt(add(x, 1), x)"));
    assert!(large.contains("gt(x, add(1, 1))"));
    // 4 comparisons of leaves, plus 2 * 2 * 4 with one add on either side
    assert_eq!(large.len(), 4 + 16);
}

#[test]
fn test_unreachable_target_is_an_error() {
    let mut u = Universe::new();
    let domain = comparison_domain(&mut u);
    assert_eq!(
        build_candidates_exhaustive(&domain, &mut u, 2).unwrap_err(),
        SearchError::EmptySearchSpace { complexity: 2 }
    );
}

#[test]
fn test_adaptive_candidates_are_well_formed() {
    let mut u = Universe::new();
    let domain = comparison_domain(&mut u);
    let mut search = ExpressionSearch::new(domain, seeded(5, true), 10).unwrap();
    let exhaustive = search.build_candidates_exhaustive(&mut u).unwrap();

    for _ in 0..200 {
        match search.build_candidate_adaptive(&mut u) {
            Ok(e) => assert!(exhaustive.contains(&e)),
            Err(e) => assert!(matches!(e, SearchError::SamplingFailed { .. })),
        }
    }
}

#[test]
fn test_adaptive_batch_finds_every_small_candidate() {
    let mut u = Universe::new();
    let domain = comparison_domain(&mut u);
    let mut search = ExpressionSearch::new(domain, seeded(3, true), 10).unwrap();

    let found = search.build_candidates_adaptive(&mut u, 4);
    assert_eq!(found.len(), 4);
    let exhaustive = search.build_candidates_exhaustive(&mut u).unwrap();
    assert_eq!(
        describe_all(search.domain(), &u, &found),
        describe_all(search.domain(), &u, &exhaustive)
    );
}

#[test]
fn test_adaptive_batch_stops_after_failures() {
    let mut u = Universe::new();
    let domain = comparison_domain(&mut u);
    // without extended leaves the policy only ever pushes x
    let mut search = ExpressionSearch::new(domain, seeded(3, false), 10).unwrap();

    let found = search.build_candidates_adaptive(&mut u, 4);
    assert_eq!(found.len(), 1);
    assert_eq!(search.domain().describe(&u, found[0]), "gt(x, x)");
}

#[test]
fn test_rewards_shift_the_policy() {
    let mut u = Universe::new();
    let domain = comparison_domain(&mut u);
    let mut search = ExpressionSearch::new(domain, seeded(5, true), 4).unwrap();
    let x = search.domain().inputs()[0];
    let one = search.domain().constants()[0];
    let add = search.domain().find_function("add").unwrap();

    let candidates = search.build_candidates_exhaustive(&mut u).unwrap();
    let target = candidates
        .iter()
        .copied()
        .find(|e| search.domain().describe(&u, *e) == "gt(add(x, x), x)")
        .unwrap();

    let before_x = search.sampler().push_actions().probability(&Action::Push(x));
    let before_one = search.sampler().push_actions().probability(&Action::Push(one));
    assert_eq!(search.record_reward(&u, target, 10.0, &[0, 1, 2, 3]).unwrap(), 1);

    let pools = search.sampler();
    assert!(pools.push_actions().probability(&Action::Push(x)) > before_x);
    assert!(pools.push_actions().probability(&Action::Push(one)) < before_one);
    assert_eq!(pools.apply_actions().weight(&Action::Apply(add)), Some(11.0));
}

#[test]
fn test_active_variables_extend_the_search() {
    let mut u = Universe::new();
    let domain = comparison_domain(&mut u);
    let mut search = ExpressionSearch::new(domain, seeded(3, true), 10).unwrap();
    let int = u.get_type("Int").unwrap();
    let x = search.domain().inputs()[0];
    let one = search.domain().constants()[0];
    let sum = u.make_application(0, int, &[x, one]);

    search.add_active_variable(&u, sum).unwrap();
    assert!(search.sampler().push_actions().contains(&Action::Push(sum)));

    let found = search.build_candidates_exhaustive(&mut u).unwrap();
    let found = describe_all(search.domain(), &u, &found);
    assert_eq!(found.len(), 9);
    assert!(found.contains("gt(add(x, 1), add(x, 1))"));
}

#[test]
fn test_search_spaces_are_shared_across_threads() {
    let mut u = Universe::new();
    let domain = comparison_domain(&mut u);
    domain.prepare_search_spaces(3..6).unwrap();
    assert_eq!(domain.search_space_cache().len(), 3);

    let spaces: Vec<_> = (0..64)
        .into_par_iter()
        .map(|i| domain.search_space(3 + i % 3).unwrap())
        .collect();
    for (i, space) in spaces.iter().enumerate() {
        assert!(Arc::ptr_eq(space, &spaces[i % 3]));
        assert_eq!(space.complexity(), 3 + i % 3);
    }
    assert_eq!(domain.search_space_cache().len(), 3);
}

#[test]
fn test_sampling_continues_a_seeded_state() {
    let mut u = Universe::new();
    let domain = comparison_domain(&mut u);
    let config = SearchConfig {
        max_sampling_attempts: 1,
        ..seeded(3, false)
    };
    let search = ExpressionSearch::new(domain, config, 10).unwrap();
    let space = search.space().clone();
    let x = search.domain().inputs()[0];
    let mut rng = StdRng::seed_from_u64(1);

    // [x, x] only allows gt, which the apply pool always offers
    let mut state = ExpressionBuilderState::seeded(
        search.domain(),
        space,
        &mut u,
        &[Action::Push(x), Action::Push(x)],
    )
    .unwrap();
    let e = exprsearch::sample_expression(&mut state, search.sampler(), &mut rng).unwrap();
    assert!(!state.is_aborted());
    assert_eq!(state.result(), Some(e));
}
