use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

use crate::{ExprIx, Result, SearchError, Type, TypeHierarchy, Universe};

/// An index to access a `Function` in a `Domain`'s function library.
pub type FunctionIx = usize;

/// A function of the library that expressions are built from.
///
/// The automaton only sees the type-level predicate (`accepts_input_type`),
/// while builder states additionally check `accepts_arguments` against the
/// actual expressions sitting on the stack.
pub trait Function: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn arity(&self) -> usize;

    /// Whether argument `index` may have type `ty`.
    fn accepts_input_type(&self, index: usize, ty: Type, hierarchy: &TypeHierarchy) -> bool;

    /// Output type for the given (accepted) input types.
    fn output_type(&self, inputs: &[Type]) -> Type;

    /// Checks the definition itself, once, when the domain is built.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Concrete check against the expressions that would become the
    /// arguments. `args` holds exactly `arity()` handles, bottom-most first.
    fn accepts_arguments(&self, args: &[ExprIx], universe: &Universe, hierarchy: &TypeHierarchy) -> bool {
        let types: SmallVec<[Type; 2]> = args.iter().map(|a| universe.type_of(*a)).collect();
        self.accepts_input_types(&types, hierarchy)
    }

    fn accepts_input_types(&self, types: &[Type], hierarchy: &TypeHierarchy) -> bool {
        types.len() == self.arity()
            && types
                .iter()
                .enumerate()
                .all(|(i, ty)| self.accepts_input_type(i, *ty, hierarchy))
    }
}

/// How a `TypedFunction` derives its output type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Fixed(Type),
    /// Same type as the given argument, e.g. `add` over any numeric type.
    SameAsInput(usize),
}

/// Extra restrictions applied to concrete arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionFlags {
    /// `f(a, b) == f(b, a)`: only the ordering with non-decreasing argument
    /// handles is built.
    pub commutative: bool,
    /// `f(a, a)` carries no information and is never built.
    pub all_same_args_irrelevant: bool,
}

/// A function described by a fixed list of input types.
#[derive(Debug, Clone)]
pub struct TypedFunction {
    name: String,
    inputs: SmallVec<[Type; 2]>,
    output: OutputType,
    flags: FunctionFlags,
}

impl TypedFunction {
    pub fn new(name: &str, inputs: &[Type], output: OutputType) -> Self {
        Self {
            name: name.to_string(),
            inputs: inputs.iter().copied().collect(),
            output,
            flags: FunctionFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: FunctionFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn flags(&self) -> FunctionFlags {
        self.flags
    }
}

impl Function for TypedFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> usize {
        self.inputs.len()
    }

    fn accepts_input_type(&self, index: usize, ty: Type, hierarchy: &TypeHierarchy) -> bool {
        self.inputs
            .get(index)
            .map_or(false, |expected| hierarchy.inherits_from(ty, *expected))
    }

    fn output_type(&self, inputs: &[Type]) -> Type {
        match self.output {
            OutputType::Fixed(ty) => ty,
            OutputType::SameAsInput(i) => inputs[i],
        }
    }

    fn validate(&self) -> Result<()> {
        match self.output {
            OutputType::SameAsInput(i) if i >= self.inputs.len() => Err(SearchError::Config(format!(
                "function `{}` has no input {} to take its output type from",
                self.name, i
            ))),
            _ => Ok(()),
        }
    }

    fn accepts_arguments(&self, args: &[ExprIx], universe: &Universe, hierarchy: &TypeHierarchy) -> bool {
        let types: SmallVec<[Type; 2]> = args.iter().map(|a| universe.type_of(*a)).collect();
        if !self.accepts_input_types(&types, hierarchy) {
            return false;
        }
        if args.len() < 2 {
            return true;
        }
        if self.flags.commutative && args.windows(2).any(|w| w[1] < w[0]) {
            return false;
        }
        if self.flags.all_same_args_irrelevant && args.iter().all(|a| *a == args[0]) {
            return false;
        }
        true
    }
}
