use hashbrown::HashSet;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    Action, AdaptiveSampler, Domain, ExprIx, ExpressionBuilderState, Result, SearchConfig,
    SearchError, TypeSearchSpace, Universe,
};

/// Scores a candidate expression on a subset of the training examples.
pub trait Objective {
    fn score(&self, universe: &Universe, expr: ExprIx, examples: &[usize]) -> f64;
}

impl<F> Objective for F
where
    F: Fn(&Universe, ExprIx, &[usize]) -> f64,
{
    fn score(&self, universe: &Universe, expr: ExprIx, examples: &[usize]) -> f64 {
        self(universe, expr, examples)
    }
}

/// Depth-first enumeration of every expression reachable from `state`.
///
/// Every yielded expression is appended to `res`, in the order the
/// trajectories are visited. `state` is restored before returning.
pub fn enumerate_exhaustively(state: &mut ExpressionBuilderState<'_>, res: &mut Vec<ExprIx>) {
    if state.is_final() {
        if let Some(e) = state.result() {
            res.push(e);
        }
        return;
    }

    let actions = state.available_actions().to_vec();
    for action in actions {
        let snapshot = state.perform_with_snapshot(action);
        enumerate_exhaustively(state, res);
        state.undo(snapshot);
    }
}

/// Runs one sampling episode from `state` to a yielded expression.
///
/// On sampling failure the state is aborted and the error is returned.
pub fn sample_expression<R: Rng + ?Sized>(
    state: &mut ExpressionBuilderState<'_>,
    sampler: &AdaptiveSampler,
    rng: &mut R,
) -> Result<ExprIx> {
    while !state.is_final() {
        match sampler.choose_next_action(state, rng) {
            Ok(action) => state.perform(action),
            Err(e) => {
                state.abort();
                return Err(e);
            }
        }
    }
    state
        .result()
        .ok_or(SearchError::SamplingFailed { attempts: 0 })
}

/// Every distinct expression of at most `complexity` construction steps
/// whose type is accepted by `domain`.
pub fn build_candidates_exhaustive(
    domain: &Domain,
    universe: &mut Universe,
    complexity: usize,
) -> Result<Vec<ExprIx>> {
    let space = domain.search_space(complexity)?;
    let mut found = Vec::new();
    let mut state = ExpressionBuilderState::new(domain, space, universe);
    enumerate_exhaustively(&mut state, &mut found);

    // active variables can rebuild the same expression along two trajectories
    let mut seen = HashSet::with_capacity(found.len());
    found.retain(|e| seen.insert(*e));
    debug!(complexity, candidates = found.len(), "exhaustive enumeration");
    Ok(found)
}

/// Replays `trajectory` from an empty stack, then yields.
pub fn replay(
    domain: &Domain,
    space: Arc<TypeSearchSpace>,
    universe: &mut Universe,
    trajectory: &[Action],
) -> Result<ExprIx> {
    let mut state = ExpressionBuilderState::seeded(domain, space, universe, trajectory)?;
    if !state.is_action_available(&Action::Yield) {
        return Err(SearchError::IllegalAction {
            step: state.step(),
            action: Action::Yield,
        });
    }
    state.perform(Action::Yield);
    state.result().ok_or(SearchError::IllegalAction {
        step: state.step(),
        action: Action::Yield,
    })
}

/// The expression search as driven by a boosting loop: candidates are drawn
/// exhaustively or from the adaptive policy, and scored candidates are fed
/// back through `record_reward`.
///
/// The search owns its domain; the expression universe is owned by the caller
/// and lent to every call that builds or inspects expressions.
#[derive(Debug)]
pub struct ExpressionSearch {
    domain: Domain,
    config: SearchConfig,
    space: Arc<TypeSearchSpace>,
    sampler: AdaptiveSampler,
    rng: StdRng,
    num_training_samples: usize,
}

impl ExpressionSearch {
    pub fn new(domain: Domain, config: SearchConfig, num_training_samples: usize) -> Result<Self> {
        config.validate()?;
        if num_training_samples == 0 {
            return Err(SearchError::Config(
                "number of training samples must be positive".to_string(),
            ));
        }

        let space = domain.search_space(config.complexity)?;
        let sampler = AdaptiveSampler::new(&domain, &space, &config);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        info!(
            complexity = config.complexity,
            states = space.num_states(),
            extended_leaves = config.extended_leaves,
            "expression search ready"
        );

        Ok(Self {
            domain,
            config,
            space,
            sampler,
            rng,
            num_training_samples,
        })
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn space(&self) -> &Arc<TypeSearchSpace> {
        &self.space
    }

    pub fn sampler(&self) -> &AdaptiveSampler {
        &self.sampler
    }

    pub fn sampler_mut(&mut self) -> &mut AdaptiveSampler {
        &mut self.sampler
    }

    pub fn num_training_samples(&self) -> usize {
        self.num_training_samples
    }

    /// Exposes `expr` as a push leaf of the domain. The search space is
    /// refreshed, and in extended-leaves mode the leaf and any function the
    /// new space uses join the policy at weight 1.
    pub fn add_active_variable(&mut self, universe: &Universe, expr: ExprIx) -> Result<()> {
        self.domain.add_active_variable(expr, universe);
        self.space = self.domain.search_space(self.config.complexity)?;
        if self.config.extended_leaves {
            self.sampler.register(Action::Push(expr));
        }
        for f in self.space.functions_used() {
            self.sampler.register(Action::Apply(f));
        }
        Ok(())
    }

    pub fn build_candidates_exhaustive(&self, universe: &mut Universe) -> Result<Vec<ExprIx>> {
        build_candidates_exhaustive(&self.domain, universe, self.config.complexity)
    }

    /// Samples one candidate from the current policy.
    pub fn build_candidate_adaptive(&mut self, universe: &mut Universe) -> Result<ExprIx> {
        let mut state = ExpressionBuilderState::new(&self.domain, self.space.clone(), universe);
        sample_expression(&mut state, &self.sampler, &mut self.rng)
    }

    /// Samples until `count` distinct candidates are found or
    /// `max_sampling_failures` episodes failed or repeated a candidate.
    pub fn build_candidates_adaptive(&mut self, universe: &mut Universe, count: usize) -> Vec<ExprIx> {
        let mut res = Vec::with_capacity(count);
        let mut seen = HashSet::new();
        let mut failures = 0;

        while res.len() < count && failures < self.config.max_sampling_failures {
            match self.build_candidate_adaptive(universe) {
                Ok(e) if seen.insert(e) => res.push(e),
                Ok(_) | Err(_) => failures += 1,
            }
        }

        if res.len() < count {
            warn!(
                requested = count,
                candidates = res.len(),
                failures,
                "adaptive sampling stopped early"
            );
        } else {
            debug!(candidates = res.len(), failures, "adaptive sampling");
        }
        res
    }

    /// Credits `weak_objective`, measured on `examples`, to every trajectory
    /// that builds `expr` within the complexity budget. Returns the number of
    /// trajectories credited. Constants and non-finite objectives are
    /// ignored.
    pub fn record_reward(
        &mut self,
        universe: &Universe,
        expr: ExprIx,
        weak_objective: f64,
        examples: &[usize],
    ) -> Result<usize> {
        if universe.get(expr).is_constant() {
            return Ok(0);
        }
        let weight = examples.len() as f64 / self.num_training_samples as f64;
        self.sampler.credit(
            &self.domain,
            universe,
            expr,
            weak_objective,
            weight,
            self.config.complexity + 1,
        )
    }

    /// Scores `candidates` on `examples`, credits the best one and returns it
    /// with its score. Candidates with a non-finite score are skipped.
    pub fn observe_best<O: Objective + ?Sized>(
        &mut self,
        universe: &Universe,
        objective: &O,
        candidates: &[ExprIx],
        examples: &[usize],
    ) -> Result<Option<(ExprIx, f64)>> {
        let mut best: Option<(ExprIx, f64)> = None;
        for c in candidates {
            let score = objective.score(universe, *c, examples);
            if !score.is_finite() {
                continue;
            }
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((*c, score));
            }
        }

        if let Some((e, score)) = best {
            let trajectories = self.record_reward(universe, e, score, examples)?;
            debug!(
                best = %self.domain.describe(universe, e),
                score,
                trajectories,
                "observed best candidate"
            );
        }
        Ok(best)
    }

    pub fn log_policy(&self, universe: &Universe) {
        self.sampler.log_policy(&self.domain, universe);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DomainBuilder, OutputType, TypedFunction};

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

    fn config(complexity: usize) -> SearchConfig {
        SearchConfig {
            complexity,
            seed: Some(42),
            ..SearchConfig::default()
        }
    }

    #[test]
    fn replays_trajectories() {
        let mut u = Universe::new();
        let domain = comparison_domain(&mut u);
        let space = domain.search_space(3).unwrap();
        let x = domain.inputs()[0];
        let one = domain.constants()[0];

        let e = replay(
            &domain,
            space.clone(),
            &mut u,
            &[Action::Push(one), Action::Push(x), Action::Apply(1)],
        )
        .unwrap();
        assert_eq!(domain.describe(&u, e), "gt(1, x)");

        // an Int on the stack can not be yielded
        let err = replay(&domain, space, &mut u, &[Action::Push(x)]).unwrap_err();
        assert_eq!(
            err,
            SearchError::IllegalAction {
                step: 1,
                action: Action::Yield
            }
        );
    }

    #[test]
    fn rejects_bad_configs() {
        let mut u = Universe::new();
        let domain = comparison_domain(&mut u);
        let err = ExpressionSearch::new(domain, config(3), 0).unwrap_err();
        assert!(matches!(err, SearchError::Config(_)));

        let domain = comparison_domain(&mut u);
        let err = ExpressionSearch::new(domain, config(2), 10).unwrap_err();
        assert_eq!(err, SearchError::EmptySearchSpace { complexity: 2 });
    }

    #[test]
    fn constants_earn_no_reward() {
        let mut u = Universe::new();
        let domain = comparison_domain(&mut u);
        let one = domain.constants()[0];
        let mut search = ExpressionSearch::new(domain, config(3), 10).unwrap();
        let before = search.sampler().total_weight();
        assert_eq!(search.record_reward(&u, one, 1.0, &[0, 1]).unwrap(), 0);
        assert_eq!(search.sampler().total_weight(), before);
    }

    #[test]
    fn observes_the_best_candidate() {
        let mut u = Universe::new();
        let domain = comparison_domain(&mut u);
        let mut search = ExpressionSearch::new(domain, config(3), 4).unwrap();
        let candidates = search.build_candidates_exhaustive(&mut u).unwrap();
        assert_eq!(candidates.len(), 4);

        let x = search.domain().inputs()[0];
        let objective = |u: &Universe, e: ExprIx, _: &[usize]| {
            u.get(e).args().iter().filter(|a| **a == x).count() as f64
        };
        let (best, score) = search
            .observe_best(&u, &objective, &candidates, &[0, 1])
            .unwrap()
            .unwrap();
        assert_eq!(search.domain().describe(&u, best), "gt(x, x)");
        assert_eq!(score, 2.0);

        // [x, x, gt] and the yield each gained 2.0
        let sampler = search.sampler();
        assert_eq!(sampler.push_actions().weight(&Action::Push(x)), Some(5.0));
        assert_eq!(sampler.apply_actions().weight(&Action::Apply(1)), Some(3.0));
        assert_eq!(sampler.yield_actions().weight(&Action::Yield), Some(3.0));
    }
}
