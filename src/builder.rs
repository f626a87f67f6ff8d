use smallvec::SmallVec;
use std::cell::OnceCell;
use std::sync::Arc;

use crate::{
    Action, Domain, ExprIx, Result, SearchError, StateIx, Type, TypeSearchSpace, TypeSignature,
    TypeState, Universe,
};

type Stack = SmallVec<[ExprIx; 8]>;

/// The stack recorded by `perform_with_snapshot`, to be handed back to
/// `undo`.
#[derive(Debug, Clone)]
pub struct Snapshot {
    stack: Stack,
    step: usize,
}

/// The stack-machine decision process that builds one expression.
///
/// The state walks the pruned `TypeSearchSpace`: after every transition it
/// re-resolves its automaton state from `(step, types on the stack)`. A
/// missing automaton state means the pruning guarantee was broken, which is
/// a bug and panics.
#[derive(Debug)]
pub struct ExpressionBuilderState<'a> {
    domain: &'a Domain,
    space: Arc<TypeSearchSpace>,
    universe: &'a mut Universe,

    step: usize,
    stack: Stack,
    type_state: Option<StateIx>,
    aborted: bool,
    yielded: bool,

    // lazily computed, reset by every transition
    actions: OnceCell<Vec<Action>>,
}

impl<'a> ExpressionBuilderState<'a> {
    /// A state at step 0 with an empty stack.
    pub fn new(domain: &'a Domain, space: Arc<TypeSearchSpace>, universe: &'a mut Universe) -> Self {
        let type_state = Some(space.initial_state().index());
        Self {
            domain,
            space,
            universe,
            step: 0,
            stack: Stack::new(),
            type_state,
            aborted: false,
            yielded: false,
            actions: OnceCell::new(),
        }
    }

    /// A state that has already performed the `seed` actions. Every seed
    /// action must be available when it is replayed.
    pub fn seeded(
        domain: &'a Domain,
        space: Arc<TypeSearchSpace>,
        universe: &'a mut Universe,
        seed: &[Action],
    ) -> Result<Self> {
        let mut res = Self::new(domain, space, universe);
        for action in seed {
            if !res.is_action_available(action) {
                return Err(SearchError::IllegalAction {
                    step: res.step,
                    action: *action,
                });
            }
            res.perform(*action);
        }
        Ok(res)
    }

    pub fn domain(&self) -> &'a Domain {
        self.domain
    }

    pub fn universe(&self) -> &Universe {
        &*self.universe
    }

    pub fn space(&self) -> &TypeSearchSpace {
        &self.space
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn stack(&self) -> &[ExprIx] {
        &self.stack
    }

    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    /// The current automaton state; `None` once yielded.
    pub fn type_state(&self) -> Option<&TypeState> {
        self.type_state.map(|ix| self.space.state(ix))
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn is_yielded(&self) -> bool {
        self.yielded
    }

    pub fn abort(&mut self) {
        self.aborted = true;
        self.actions = OnceCell::new();
    }

    pub fn is_final(&self) -> bool {
        self.aborted || self.yielded || self.type_state().map_or(true, |s| !s.has_any_action())
    }

    /// The built expression, once the state has yielded.
    pub fn result(&self) -> Option<ExprIx> {
        if self.yielded && self.stack.len() == 1 {
            Some(self.stack[0])
        } else {
            None
        }
    }

    pub fn available_actions(&self) -> &[Action] {
        self.actions.get_or_init(|| self.compute_actions())
    }

    pub fn is_action_available(&self, action: &Action) -> bool {
        self.available_actions().contains(action)
    }

    fn compute_actions(&self) -> Vec<Action> {
        let state = match self.type_state() {
            Some(s) if !self.aborted => s,
            _ => return Vec::new(),
        };

        let mut res = Vec::new();
        if state.has_push_actions() {
            for leaf in self.domain.push_leaves() {
                if state.has_push_action(self.universe.type_of(leaf)) {
                    res.push(Action::Push(leaf));
                }
            }
        }

        // the automaton only knows about types; the concrete arguments may
        // still be rejected by the function
        for (f, _) in state.apply_actions() {
            let function = self.domain.function(*f);
            let n = function.arity();
            if n <= self.stack.len()
                && function.accepts_arguments(
                    &self.stack[self.stack.len() - n..],
                    &*self.universe,
                    self.domain.hierarchy(),
                )
            {
                res.push(Action::Apply(*f));
            }
        }

        if state.has_yield_action() {
            res.push(Action::Yield);
        }
        res
    }

    /// Performs `action`, which must be one of `available_actions()`.
    pub fn perform(&mut self, action: Action) {
        self.transition(action);
    }

    /// Performs `action` and returns what `undo` needs to restore the
    /// current state.
    pub fn perform_with_snapshot(&mut self, action: Action) -> Snapshot {
        let snapshot = Snapshot {
            stack: self.stack.clone(),
            step: self.step,
        };
        self.transition(action);
        snapshot
    }

    fn transition(&mut self, action: Action) {
        debug_assert!(!self.yielded, "no transition after yield");
        let domain = self.domain;

        match action {
            Action::Push(e) => self.stack.push(e),
            Action::Apply(f) => {
                let function = domain.function(f);
                let n = function.arity();
                assert!(
                    n <= self.stack.len(),
                    "applying {} to a stack of {} elements",
                    function.name(),
                    self.stack.len()
                );
                let first = self.stack.len() - n;
                let inputs: SmallVec<[Type; 2]> = self.stack[first..]
                    .iter()
                    .map(|e| self.universe.type_of(*e))
                    .collect();
                let output = function.output_type(&inputs);
                let node = self.universe.make_application(f, output, &self.stack[first..]);
                self.stack.truncate(first);
                self.stack.push(node);
            }
            Action::Yield => self.yielded = true,
        }

        self.step += 1;
        self.type_state = if self.yielded { None } else { Some(self.resolve()) };
        self.actions = OnceCell::new();
    }

    /// Restores the state that `snapshot` was taken from.
    pub fn undo(&mut self, snapshot: Snapshot) {
        debug_assert_eq!(snapshot.step + 1, self.step);
        self.stack = snapshot.stack;
        self.yielded = false;
        self.aborted = false;
        self.step -= 1;
        self.type_state = Some(self.resolve());
        self.actions = OnceCell::new();
    }

    pub fn signature(&self) -> TypeSignature {
        self.stack.iter().map(|e| self.universe.type_of(*e)).collect()
    }

    fn resolve(&self) -> StateIx {
        match self.space.find(self.step, &self.signature()) {
            Some(ix) => ix,
            None => panic!(
                "no type state for step {} and stack of {} elements: pruned automaton is inconsistent",
                self.step,
                self.stack.len()
            ),
        }
    }
}
