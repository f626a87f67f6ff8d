use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::{Domain, FunctionIx, Result, SearchError, Type, TypeSignature, Universe};

/// An index to access a `TypeState` in a `TypeSearchSpace`.
pub type StateIx = usize;

/// A node of the type automaton: the types on the stack after `step`
/// actions, together with the actions that keep a yield reachable.
#[derive(Debug, Clone)]
pub struct TypeState {
    step: usize,
    signature: TypeSignature,
    push: SmallVec<[(Type, StateIx); 4]>,
    apply: Vec<(FunctionIx, StateIx)>,
    yieldable: bool,
    index: StateIx,
}

impl TypeState {
    fn new(step: usize, signature: TypeSignature, yieldable: bool, index: StateIx) -> Self {
        Self {
            step,
            signature,
            push: SmallVec::new(),
            apply: Vec::new(),
            yieldable,
            index,
        }
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn signature(&self) -> &TypeSignature {
        &self.signature
    }

    pub fn stack_size(&self) -> usize {
        self.signature.len()
    }

    /// Dense index of this state in its search space.
    pub fn index(&self) -> StateIx {
        self.index
    }

    pub fn push_actions(&self) -> &[(Type, StateIx)] {
        &self.push
    }

    pub fn has_push_actions(&self) -> bool {
        !self.push.is_empty()
    }

    pub fn has_push_action(&self, ty: Type) -> bool {
        self.push_transition(ty).is_some()
    }

    pub fn push_transition(&self, ty: Type) -> Option<StateIx> {
        self.push.iter().find(|(t, _)| *t == ty).map(|(_, s)| *s)
    }

    pub fn apply_actions(&self) -> &[(FunctionIx, StateIx)] {
        &self.apply
    }

    pub fn has_apply_actions(&self) -> bool {
        !self.apply.is_empty()
    }

    pub fn has_apply_action(&self, function: FunctionIx) -> bool {
        self.apply_transition(function).is_some()
    }

    pub fn apply_transition(&self, function: FunctionIx) -> Option<StateIx> {
        self.apply.iter().find(|(f, _)| *f == function).map(|(_, s)| *s)
    }

    pub fn has_yield_action(&self) -> bool {
        self.yieldable
    }

    pub fn has_any_action(&self) -> bool {
        self.has_push_actions() || self.has_apply_actions() || self.has_yield_action()
    }

    /// Renders as `[step] {T1, T2} -> n push actions, m apply actions, yield action`.
    pub fn to_short_string(&self, universe: &Universe) -> String {
        let types = self
            .signature
            .as_slice()
            .iter()
            .map(|t| universe.type_name(*t))
            .collect::<Vec<_>>()
            .join(", ");

        let mut parts = Vec::new();
        if self.has_push_actions() {
            parts.push(format!("{} push actions", self.push.len()));
        }
        if self.has_apply_actions() {
            parts.push(format!("{} apply actions", self.apply.len()));
        }
        if self.has_yield_action() {
            parts.push("yield action".to_string());
        }
        format!("[{}] {{{}}} -> {}", self.step, types, parts.join(", "))
    }
}

/// The automaton over `(step, type signature)` pairs for one domain and one
/// complexity budget.
///
/// The complexity counts push and apply actions; the final yield is free.
/// After construction, every state reachable from the initial state has at
/// least one action, and every action leads to a state from which a yield
/// is still reachable within the budget.
#[derive(Debug)]
pub struct TypeSearchSpace {
    complexity: usize,
    states: Vec<TypeState>,
    lookup: HashMap<(usize, TypeSignature), StateIx>,
    initial: StateIx,
}

impl TypeSearchSpace {
    /// Builds the automaton starting from an empty stack.
    pub fn build(domain: &Domain, complexity: usize) -> Result<Self> {
        for f in domain.functions() {
            if !(1..=2).contains(&f.arity()) {
                return Err(SearchError::UnsupportedArity {
                    function: f.name().to_string(),
                    arity: f.arity(),
                });
            }
        }

        let mut space = Self {
            complexity,
            states: Vec::new(),
            lookup: HashMap::new(),
            initial: 0,
        };
        space.expand(domain);
        let before = space.states.len();
        space.prune(complexity)?;
        debug!(
            complexity,
            before,
            after = space.states.len(),
            "built type search space"
        );
        Ok(space)
    }

    fn get_or_create(
        &mut self,
        domain: &Domain,
        step: usize,
        signature: TypeSignature,
        created: &mut Vec<StateIx>,
    ) -> StateIx {
        let key = (step, signature);
        if let Some(ix) = self.lookup.get(&key) {
            return *ix;
        }
        let yieldable = key.1.len() == 1 && domain.is_target_type_accepted(key.1.as_slice()[0]);
        let ix = self.states.len();
        self.states
            .push(TypeState::new(step, key.1.clone(), yieldable, ix));
        self.lookup.insert(key, ix);
        created.push(ix);
        ix
    }

    /// Breadth-first forward expansion, one step layer at a time. States are
    /// allocated in non-decreasing step order.
    fn expand(&mut self, domain: &Domain) {
        let mut frontier = Vec::new();
        self.initial = self.get_or_create(domain, 0, TypeSignature::new(), &mut frontier);

        for step in 0..self.complexity {
            let remaining = self.complexity - step;
            let mut next = Vec::new();

            for ix in frontier {
                let signature = self.states[ix].signature.clone();

                // A push leaves `len + 1` elements, which need `len` more
                // binary applies to collapse into one.
                if remaining > signature.len() {
                    for ty in domain.leaf_types() {
                        let succ = self.get_or_create(domain, step + 1, signature.pushed(*ty), &mut next);
                        self.states[ix].push.push((*ty, succ));
                    }
                }

                for (f_ix, f) in domain.functions().iter().enumerate() {
                    let inputs = match signature.top(f.arity()) {
                        Some(inputs) => inputs,
                        None => continue,
                    };
                    if !f.accepts_input_types(inputs, domain.hierarchy()) {
                        continue;
                    }
                    let output = f.output_type(inputs);
                    let succ = self.get_or_create(
                        domain,
                        step + 1,
                        signature.applied(f.arity(), output),
                        &mut next,
                    );
                    self.states[ix].apply.push((f_ix, succ));
                }
            }

            frontier = next;
        }
    }

    /// Backward pass: drops every transition into a state that cannot reach
    /// a yield, then every state left without actions, and reassigns dense
    /// indices to the survivors.
    fn prune(&mut self, complexity: usize) -> Result<()> {
        let mut alive = vec![false; self.states.len()];

        // Successors always have a larger step, hence a larger index.
        for ix in (0..self.states.len()).rev() {
            let state = &mut self.states[ix];
            state.push.retain(|(_, succ)| alive[*succ]);
            state.apply.retain(|(_, succ)| alive[*succ]);
            alive[ix] = state.has_any_action();
        }

        if !alive[self.initial] {
            return Err(SearchError::EmptySearchSpace { complexity });
        }

        let mut remap = vec![usize::MAX; self.states.len()];
        let mut states = Vec::with_capacity(alive.iter().filter(|a| **a).count());
        for (ix, state) in self.states.drain(..).enumerate() {
            if alive[ix] {
                remap[ix] = states.len();
                states.push(state);
            }
        }
        for (ix, state) in states.iter_mut().enumerate() {
            state.index = ix;
            for (_, succ) in state.push.iter_mut() {
                *succ = remap[*succ];
            }
            for (_, succ) in state.apply.iter_mut() {
                *succ = remap[*succ];
            }
        }

        self.lookup = states
            .iter()
            .map(|s| ((s.step, s.signature.clone()), s.index))
            .collect();
        self.initial = remap[self.initial];
        self.states = states;
        Ok(())
    }

    pub fn complexity(&self) -> usize {
        self.complexity
    }

    pub fn initial_state(&self) -> &TypeState {
        &self.states[self.initial]
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, ix: StateIx) -> &TypeState {
        &self.states[ix]
    }

    pub fn states(&self) -> &[TypeState] {
        &self.states
    }

    /// Looks up the surviving state for `(step, signature)`.
    pub fn find(&self, step: usize, signature: &TypeSignature) -> Option<StateIx> {
        self.lookup.get(&(step, signature.clone())).copied()
    }

    /// Every function that labels at least one apply transition, in order
    /// of first appearance.
    pub fn functions_used(&self) -> Vec<FunctionIx> {
        let mut res: Vec<FunctionIx> = Vec::new();
        for state in &self.states {
            for (f, _) in &state.apply {
                if !res.contains(f) {
                    res.push(*f);
                }
            }
        }
        res
    }

    /// Logs every state at `trace` level.
    pub fn log_states(&self, universe: &Universe) {
        for state in &self.states {
            trace!("{}", state.to_short_string(universe));
        }
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

    #[test]
    fn prunes_dead_ends() {
        let mut u = Universe::new();
        let domain = comparison_domain(&mut u);
        let int = u.get_type("Int").unwrap();
        let boolean = u.get_type("Bool").unwrap();

        let space = TypeSearchSpace::build(&domain, 3).unwrap();
        // {} -> {Int} -> {Int, Int} -> {Bool}
        assert_eq!(space.num_states(), 4);

        let init = space.initial_state();
        assert_eq!(init.step(), 0);
        assert!(init.signature().is_empty());
        assert!(init.has_push_action(int));
        assert!(!init.has_push_action(boolean));
        assert!(!init.has_apply_actions());
        assert!(!init.has_yield_action());

        let two = TypeSignature::new().pushed(int).pushed(int);
        let s = space.state(space.find(2, &two).unwrap());
        assert!(!s.has_push_actions());
        assert!(s.has_apply_action(1));
        // add leads to {Int} at the last step, which cannot yield
        assert!(!s.has_apply_action(0));

        let done = TypeSignature::new().pushed(boolean);
        let s = space.state(space.find(3, &done).unwrap());
        assert!(s.has_yield_action());
        assert!(!s.has_push_actions() && !s.has_apply_actions());

        assert_eq!(s.to_short_string(&u), "[3] {Bool} -> yield action");
        assert_eq!(space.functions_used(), vec![1]);
    }

    #[test]
    fn every_state_has_an_action() {
        let mut u = Universe::new();
        let domain = comparison_domain(&mut u);
        for complexity in 3..7 {
            let space = TypeSearchSpace::build(&domain, complexity).unwrap();
            for (ix, s) in space.states().iter().enumerate() {
                assert_eq!(s.index(), ix);
                assert!(s.has_any_action());
                assert_eq!(space.find(s.step(), s.signature()), Some(ix));
                let succs = s.push_actions().iter().map(|p| p.1);
                for succ in succs.chain(s.apply_actions().iter().map(|a| a.1)) {
                    assert_eq!(space.state(succ).step(), s.step() + 1);
                }
            }
        }
    }

    #[test]
    fn unreachable_target_is_a_config_error() {
        let mut u = Universe::new();
        let domain = comparison_domain(&mut u);
        assert_eq!(
            TypeSearchSpace::build(&domain, 2).unwrap_err(),
            SearchError::EmptySearchSpace { complexity: 2 }
        );
    }

    #[test]
    fn ternary_functions_fail_fast() {
        let mut u = Universe::new();
        let int = u.intern_type("Int");
        let x = u.input("x", int);
        let err = DomainBuilder::new()
            .input(x)
            .function(TypedFunction::new("ite", &[int, int, int], OutputType::Fixed(int)))
            .target(int)
            .build(&u)
            .unwrap_err();
        assert_eq!(
            err,
            SearchError::UnsupportedArity {
                function: "ite".to_string(),
                arity: 3
            }
        );
    }
}
