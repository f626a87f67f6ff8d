use hashbrown::HashMap;
use rand::{distributions::WeightedIndex, prelude::*};
use tracing::{debug, info};

use crate::{
    Action, Domain, ExprIx, ExpressionBuilderState, Result, SearchConfig, SearchError,
    TrajectoryEnumerator, TypeSearchSpace, Universe,
};

/// A weighted pool of actions of one category.
///
/// `total()` is the running sum of all weights. Weights are raw sampling
/// mass; weights that dropped to zero or below are never drawn unless the
/// whole pool has no positive mass left, in which case draws are uniform.
#[derive(Debug, Clone, Default)]
pub struct ActionPool {
    index: HashMap<Action, usize>,
    actions: Vec<Action>,
    weights: Vec<f64>,
    z: f64,
}

impl ActionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `action` with `initial_weight`. Returns false, and changes
    /// nothing, if the action is already known.
    pub fn register(&mut self, action: Action, initial_weight: f64) -> bool {
        if self.index.contains_key(&action) {
            return false;
        }
        self.index.insert(action, self.actions.len());
        self.actions.push(action);
        self.weights.push(initial_weight);
        self.z += initial_weight;
        true
    }

    /// Accumulates `delta` on `action`, registering it with `delta` as its
    /// initial weight if it is new.
    pub fn add_weight(&mut self, action: Action, delta: f64) {
        match self.index.get(&action) {
            Some(i) => {
                self.weights[*i] += delta;
                self.z += delta;
            }
            None => {
                self.register(action, delta);
            }
        }
    }

    pub fn contains(&self, action: &Action) -> bool {
        self.index.contains_key(action)
    }

    pub fn weight(&self, action: &Action) -> Option<f64> {
        self.index.get(action).map(|i| self.weights[*i])
    }

    pub fn probability(&self, action: &Action) -> f64 {
        match self.weight(action) {
            Some(w) if self.z != 0.0 => w / self.z,
            _ => 0.0,
        }
    }

    pub fn total(&self) -> f64 {
        self.z
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Action, f64)> + '_ {
        self.actions.iter().copied().zip(self.weights.iter().copied())
    }

    /// The `n` heaviest actions, heaviest first.
    pub fn top(&self, n: usize) -> Vec<(Action, f64)> {
        let mut res: Vec<_> = self.iter().collect();
        res.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        res.truncate(n);
        res
    }

    /// Weighted categorical draw. `None` only for an empty pool.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Action> {
        if self.actions.is_empty() {
            return None;
        }
        let masses = self.weights.iter().map(|w| if *w > 0.0 { *w } else { 0.0 });
        match WeightedIndex::new(masses) {
            Ok(dist) => Some(self.actions[dist.sample(rng)]),
            Err(_) => self.actions.choose(rng).copied(),
        }
    }
}

/// The adaptive sampling policy: one pool per action category, fed by
/// rewards spread over every trajectory that builds a rewarded expression.
#[derive(Debug, Clone)]
pub struct AdaptiveSampler {
    push: ActionPool,
    apply: ActionPool,
    yields: ActionPool,
    // kept for configuration compatibility, probabilities use raw weights
    temperature: f64,
    max_attempts: usize,
    enumerator: TrajectoryEnumerator,
}

impl AdaptiveSampler {
    /// Starts with every input (plus constants and active variables in
    /// extended mode), every function labeling an apply transition of
    /// `space`, and the yield action, all at weight 1.
    pub fn new(domain: &Domain, space: &TypeSearchSpace, config: &SearchConfig) -> Self {
        let mut push = ActionPool::new();
        for leaf in domain.inputs() {
            push.register(Action::Push(*leaf), 1.0);
        }
        if config.extended_leaves {
            for leaf in domain.constants().iter().chain(domain.active_variables()) {
                push.register(Action::Push(*leaf), 1.0);
            }
        }

        let mut apply = ActionPool::new();
        for f in space.functions_used() {
            apply.register(Action::Apply(f), 1.0);
        }

        let mut yields = ActionPool::new();
        yields.register(Action::Yield, 1.0);

        Self {
            push,
            apply,
            yields,
            temperature: config.temperature,
            max_attempts: config.max_sampling_attempts,
            enumerator: TrajectoryEnumerator::new(config.extended_leaves),
        }
    }

    pub fn push_actions(&self) -> &ActionPool {
        &self.push
    }

    pub fn apply_actions(&self) -> &ActionPool {
        &self.apply
    }

    pub fn yield_actions(&self) -> &ActionPool {
        &self.yields
    }

    /// The pool an action belongs to.
    pub fn pool(&self, action: &Action) -> &ActionPool {
        match action {
            Action::Push(_) => &self.push,
            Action::Apply(_) => &self.apply,
            Action::Yield => &self.yields,
        }
    }

    fn pool_mut(&mut self, action: &Action) -> &mut ActionPool {
        match action {
            Action::Push(_) => &mut self.push,
            Action::Apply(_) => &mut self.apply,
            Action::Yield => &mut self.yields,
        }
    }

    /// Adds `action` to its pool at weight 1 if it is not known yet.
    pub fn register(&mut self, action: Action) -> bool {
        self.pool_mut(&action).register(action, 1.0)
    }

    /// Sum of the weights of all three pools.
    pub fn total_weight(&self) -> f64 {
        self.push.total() + self.apply.total() + self.yields.total()
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn set_temperature(&mut self, temperature: f64) {
        self.temperature = temperature;
    }

    pub fn enumerator(&self) -> &TrajectoryEnumerator {
        &self.enumerator
    }

    /// Draws the next action for `state`.
    ///
    /// A category is drawn first among the ones the automaton state allows,
    /// weighted by pool totals. Yield is returned directly; for push and apply
    /// the pool is drawn from until a draw is available in `state`, at most
    /// `max_sampling_attempts` times.
    pub fn choose_next_action<R: Rng + ?Sized>(
        &self,
        state: &ExpressionBuilderState<'_>,
        rng: &mut R,
    ) -> Result<Action> {
        let type_state = match state.type_state() {
            Some(s) if !state.is_final() => s,
            _ => return Err(SearchError::SamplingFailed { attempts: 0 }),
        };

        let legal = [
            type_state.has_push_actions(),
            type_state.has_apply_actions(),
            type_state.has_yield_action(),
        ];
        let totals = [self.push.total(), self.apply.total(), self.yields.total()];
        let masses: Vec<f64> = legal
            .iter()
            .zip(totals.iter())
            .map(|(l, z)| if *l && *z > 0.0 { *z } else { 0.0 })
            .collect();

        let kind = match WeightedIndex::new(&masses) {
            Ok(dist) => dist.sample(rng),
            Err(_) => {
                let kinds: Vec<usize> = (0..3).filter(|k| legal[*k]).collect();
                match kinds.choose(rng) {
                    Some(k) => *k,
                    None => return Err(SearchError::SamplingFailed { attempts: 0 }),
                }
            }
        };

        if kind == 2 {
            return Ok(Action::Yield);
        }

        let pool = if kind == 0 { &self.push } else { &self.apply };
        for _ in 0..self.max_attempts {
            match pool.sample(rng) {
                Some(action) if state.is_action_available(&action) => return Ok(action),
                Some(_) => {}
                None => break,
            }
        }
        Err(SearchError::SamplingFailed {
            attempts: self.max_attempts,
        })
    }

    /// Credits `weak_objective` to every action of every trajectory of at
    /// most `budget - 1` actions that builds `target`, plus one yield per
    /// trajectory. `weight` is the fraction of the examples the objective was
    /// measured on. Returns the number of trajectories credited.
    pub fn credit(
        &mut self,
        domain: &Domain,
        universe: &Universe,
        target: ExprIx,
        weak_objective: f64,
        weight: f64,
        budget: usize,
    ) -> Result<usize> {
        if !weak_objective.is_finite() || !(weight > 0.0) {
            return Ok(0);
        }
        let normalized = weak_objective / weight;
        let delta = normalized * weight;

        let trajectories = self
            .enumerator
            .decompose(domain, universe, target, budget.saturating_sub(1))?;
        debug!(
            trajectories = trajectories.len(),
            budget = budget.saturating_sub(1),
            target = %domain.describe(universe, target),
            "crediting trajectories"
        );

        for trajectory in &trajectories {
            for action in trajectory {
                self.pool_mut(action).add_weight(*action, delta);
            }
            self.yields.add_weight(Action::Yield, delta);
        }
        Ok(trajectories.len())
    }

    /// Logs the heaviest actions of each pool.
    pub fn log_policy(&self, domain: &Domain, universe: &Universe) {
        info!(temperature = self.temperature, "current policy");
        for (name, pool) in [("push", &self.push), ("apply", &self.apply), ("yield", &self.yields)] {
            for (i, (action, weight)) in pool.top(20).into_iter().enumerate() {
                info!(
                    "{} #{}: {} w = {:.2} p = {:.2}%",
                    name,
                    i + 1,
                    domain.describe_action(universe, &action),
                    weight,
                    pool.probability(&action) * 100.0
                );
            }
        }
    }
}
