use hashbrown::HashMap;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use crate::{
    Action, Expr, ExprIx, Function, FunctionIx, Result, SearchError, Type, TypeHierarchy,
    TypeSearchSpace, Universe,
};

type CachedSpace = Arc<OnceLock<Result<Arc<TypeSearchSpace>>>>;

/// Memoizes one `TypeSearchSpace` per complexity.
///
/// Construction is single-flight: the first requester of a complexity builds
/// the space while concurrent requesters of the same complexity block on the
/// same cell and reuse its result. Requests for different complexities do
/// not wait on each other.
#[derive(Debug, Default)]
pub struct SearchSpaceCache {
    spaces: Mutex<HashMap<usize, CachedSpace>>,
}

impl SearchSpaceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build<F>(&self, complexity: usize, build: F) -> Result<Arc<TypeSearchSpace>>
    where
        F: FnOnce() -> Result<TypeSearchSpace>,
    {
        let cell = {
            let mut spaces = self.spaces.lock();
            spaces.entry(complexity).or_default().clone()
        };
        cell.get_or_init(|| build().map(Arc::new)).clone()
    }

    /// Number of complexities requested so far.
    pub fn len(&self) -> usize {
        self.spaces.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.spaces.lock().clear();
    }
}

/// Everything the search needs to know about the problem: the leaves that
/// may be pushed, the function library, the type hierarchy and the accepted
/// target types. A `Domain` also owns the cache of its type search spaces.
#[derive(Debug)]
pub struct Domain {
    hierarchy: TypeHierarchy,
    inputs: Vec<ExprIx>,
    constants: Vec<ExprIx>,
    active: Vec<ExprIx>,
    leaf_types: Vec<Type>,
    functions: Vec<Box<dyn Function>>,
    targets: Vec<Type>,
    cache: SearchSpaceCache,
}

impl Domain {
    pub fn builder() -> DomainBuilder {
        DomainBuilder::new()
    }

    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    pub fn inputs(&self) -> &[ExprIx] {
        &self.inputs
    }

    pub fn constants(&self) -> &[ExprIx] {
        &self.constants
    }

    pub fn active_variables(&self) -> &[ExprIx] {
        &self.active
    }

    /// Every expression a push action may push: inputs, then constants, then
    /// active variables.
    pub fn push_leaves(&self) -> impl Iterator<Item = ExprIx> + '_ {
        self.inputs
            .iter()
            .chain(self.constants.iter())
            .chain(self.active.iter())
            .copied()
    }

    pub fn is_pushable(&self, expr: ExprIx) -> bool {
        self.push_leaves().any(|l| l == expr)
    }

    /// Distinct types of the push leaves, in order of first appearance.
    pub fn leaf_types(&self) -> &[Type] {
        &self.leaf_types
    }

    pub fn functions(&self) -> &[Box<dyn Function>] {
        &self.functions
    }

    pub fn function(&self, ix: FunctionIx) -> &dyn Function {
        self.functions[ix].as_ref()
    }

    pub fn find_function(&self, name: &str) -> Option<FunctionIx> {
        self.functions.iter().position(|f| f.name() == name)
    }

    pub fn targets(&self) -> &[Type] {
        &self.targets
    }

    pub fn is_target_type_accepted(&self, ty: Type) -> bool {
        self.targets
            .iter()
            .any(|t| self.hierarchy.inherits_from(ty, *t))
    }

    /// Exposes `expr` as an additional push leaf. Cached search spaces are
    /// dropped when the leaf brings a new type.
    pub fn add_active_variable(&mut self, expr: ExprIx, universe: &Universe) {
        if self.is_pushable(expr) {
            return;
        }
        self.active.push(expr);
        let ty = universe.type_of(expr);
        if !self.leaf_types.contains(&ty) {
            self.leaf_types.push(ty);
            self.cache.clear();
        }
    }

    pub fn clear_active_variables(&mut self, universe: &Universe) {
        self.active.clear();
        let leaf_types = collect_leaf_types(
            self.inputs.iter().chain(self.constants.iter()).copied(),
            universe,
        );
        if leaf_types != self.leaf_types {
            self.leaf_types = leaf_types;
            self.cache.clear();
        }
    }

    /// The pruned type search space for `complexity`, built on first request.
    pub fn search_space(&self, complexity: usize) -> Result<Arc<TypeSearchSpace>> {
        self.cache.get_or_build(complexity, || {
            info!(complexity, "building type search space");
            TypeSearchSpace::build(self, complexity)
        })
    }

    /// Builds the search spaces of several complexities in parallel.
    pub fn prepare_search_spaces<I>(&self, complexities: I) -> Result<()>
    where
        I: IntoIterator<Item = usize>,
    {
        let complexities: Vec<usize> = complexities.into_iter().collect();
        complexities
            .par_iter()
            .map(|c| self.search_space(*c).map(|_| ()))
            .collect()
    }

    pub fn search_space_cache(&self) -> &SearchSpaceCache {
        &self.cache
    }

    /// Renders an expression as `f(a, b)`.
    pub fn describe(&self, universe: &Universe, expr: ExprIx) -> String {
        match universe.get(expr) {
            Expr::Input { name, .. } => universe.get_str(name).to_string(),
            Expr::Constant { literal, .. } => universe.get_str(literal).to_string(),
            Expr::App { function, args, .. } => {
                let args = args
                    .iter()
                    .map(|a| self.describe(universe, *a))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}({})", self.function(*function).name(), args)
            }
        }
    }

    pub fn describe_action(&self, universe: &Universe, action: &Action) -> String {
        match action {
            Action::Push(e) => self.describe(universe, *e),
            Action::Apply(f) => self.function(*f).name().to_string(),
            Action::Yield => "yield".to_string(),
        }
    }
}

fn collect_leaf_types<I: IntoIterator<Item = ExprIx>>(leaves: I, universe: &Universe) -> Vec<Type> {
    let mut res = Vec::new();
    for l in leaves {
        let ty = universe.type_of(l);
        if !res.contains(&ty) {
            res.push(ty);
        }
    }
    res
}

/// Collects the parts of a `Domain` and validates them in `build`.
#[derive(Debug, Default)]
pub struct DomainBuilder {
    hierarchy: TypeHierarchy,
    parents: Vec<(Type, Type)>,
    inputs: Vec<ExprIx>,
    constants: Vec<ExprIx>,
    active: Vec<ExprIx>,
    functions: Vec<Box<dyn Function>>,
    targets: Vec<Type>,
}

impl DomainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(mut self, child: Type, parent: Type) -> Self {
        self.parents.push((child, parent));
        self
    }

    pub fn input(mut self, expr: ExprIx) -> Self {
        self.inputs.push(expr);
        self
    }

    pub fn constant(mut self, expr: ExprIx) -> Self {
        self.constants.push(expr);
        self
    }

    pub fn active_variable(mut self, expr: ExprIx) -> Self {
        self.active.push(expr);
        self
    }

    pub fn function<F: Function + 'static>(self, function: F) -> Self {
        self.boxed_function(Box::new(function))
    }

    pub fn boxed_function(mut self, function: Box<dyn Function>) -> Self {
        self.functions.push(function);
        self
    }

    pub fn target(mut self, ty: Type) -> Self {
        if !self.targets.contains(&ty) {
            self.targets.push(ty);
        }
        self
    }

    pub fn build(mut self, universe: &Universe) -> Result<Domain> {
        if self.targets.is_empty() {
            return Err(SearchError::NoTargetType);
        }
        for f in &self.functions {
            if !(1..=2).contains(&f.arity()) {
                return Err(SearchError::UnsupportedArity {
                    function: f.name().to_string(),
                    arity: f.arity(),
                });
            }
            f.validate()?;
        }
        for (child, parent) in self.parents.drain(..) {
            self.hierarchy.set_parent(child, parent)?;
        }
        if let Some(e) = self.inputs.iter().find(|e| !universe.get(**e).is_input()) {
            return Err(SearchError::Config(format!("expression {} is not an input", e)));
        }
        if let Some(e) = self.constants.iter().find(|e| !universe.get(**e).is_constant()) {
            return Err(SearchError::Config(format!("expression {} is not a constant", e)));
        }

        let mut leaves: Vec<ExprIx> = Vec::new();
        for l in self
            .inputs
            .iter()
            .chain(self.constants.iter())
            .chain(self.active.iter())
        {
            if !leaves.contains(l) {
                leaves.push(*l);
            }
        }
        let leaf_types = collect_leaf_types(leaves.iter().copied(), universe);
        debug!(
            leaves = leaves.len(),
            leaf_types = leaf_types.len(),
            functions = self.functions.len(),
            "built domain"
        );

        Ok(Domain {
            hierarchy: self.hierarchy,
            inputs: self.inputs,
            constants: self.constants,
            active: self.active,
            leaf_types,
            functions: self.functions,
            targets: self.targets,
            cache: SearchSpaceCache::new(),
        })
    }
}
