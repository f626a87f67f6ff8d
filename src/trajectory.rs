use crate::{Action, Domain, Expr, ExprIx, Result, SearchError, Trajectory, Universe};

/// Maps a finished expression back onto every action sequence that builds
/// it within a budget.
///
/// Inputs are always pushed directly. In extended-leaves mode, every other
/// push leaf of the domain (constants, active variables) may also be pushed
/// directly instead of being rebuilt.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrajectoryEnumerator {
    extended_leaves: bool,
}

impl TrajectoryEnumerator {
    pub fn new(extended_leaves: bool) -> Self {
        Self { extended_leaves }
    }

    pub fn extended_leaves(&self) -> bool {
        self.extended_leaves
    }

    /// Every trajectory of at most `budget` actions whose replay leaves
    /// exactly `target` on the stack.
    pub fn decompose(
        &self,
        domain: &Domain,
        universe: &Universe,
        target: ExprIx,
        budget: usize,
    ) -> Result<Vec<Trajectory>> {
        let mut res = Vec::new();
        self.collect(domain, universe, target, budget, &mut res)?;
        Ok(res)
    }

    fn collect(
        &self,
        domain: &Domain,
        universe: &Universe,
        target: ExprIx,
        budget: usize,
        res: &mut Vec<Trajectory>,
    ) -> Result<()> {
        let expr = universe.get(target);
        let (function, args) = match expr {
            Expr::App { function, args, .. } => (Some(*function), &args[..]),
            _ => (None, &[][..]),
        };
        if let Some(f) = function {
            if !(1..=2).contains(&args.len()) {
                return Err(SearchError::UnsupportedArity {
                    function: domain.function(f).name().to_string(),
                    arity: args.len(),
                });
            }
        }

        if budget == 0 {
            return Ok(());
        }

        if domain.is_pushable(target) && (expr.is_input() || self.extended_leaves) {
            res.push(vec![Action::Push(target)]);
        }

        let f = match function {
            Some(f) => f,
            None => return Ok(()),
        };
        let n = args.len();
        if budget < n + 1 {
            return Ok(());
        }

        if n == 1 {
            let mut trajectories = Vec::new();
            self.collect(domain, universe, args[0], budget - 1, &mut trajectories)?;
            res.reserve(trajectories.len());
            for mut trajectory in trajectories {
                trajectory.push(Action::Apply(f));
                res.push(trajectory);
            }
        } else {
            let mut trajectories1 = Vec::new();
            let mut trajectories2 = Vec::new();
            self.collect(domain, universe, args[0], budget - 2, &mut trajectories1)?;
            self.collect(domain, universe, args[1], budget - 2, &mut trajectories2)?;

            for trajectory1 in &trajectories1 {
                for trajectory2 in &trajectories2 {
                    let size = trajectory1.len() + trajectory2.len() + 1;
                    if size <= budget {
                        let mut trajectory = Vec::with_capacity(size);
                        trajectory.extend_from_slice(trajectory1);
                        trajectory.extend_from_slice(trajectory2);
                        trajectory.push(Action::Apply(f));
                        res.push(trajectory);
                    }
                }
            }
        }
        Ok(())
    }
}
