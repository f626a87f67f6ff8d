//! Typed expression-program search.
//!
//! This library builds candidate expressions for a boosting loop: a typed
//! stack machine walks a pruned automaton over type signatures, and
//! candidates are either enumerated exhaustively or sampled from an adaptive
//! policy that learns from the rewards of earlier candidates.

mod action;
mod builder;
mod config;
mod domain;
mod error;
mod expr;
mod function;
mod sampler;
mod search;
mod space;
mod trajectory;
mod types;

pub use action::{Action, Trajectory};
pub use builder::{ExpressionBuilderState, Snapshot};
pub use config::{ConstantSpec, DomainSpec, FunctionSpec, InputSpec, OutputSpec, SearchConfig, TypeSpec};
pub use domain::{Domain, DomainBuilder, SearchSpaceCache};
pub use error::{Result, SearchError};
pub use expr::{Expr, ExprIx, Universe};
pub use function::{Function, FunctionFlags, FunctionIx, OutputType, TypedFunction};
pub use sampler::{ActionPool, AdaptiveSampler};
pub use search::{
    build_candidates_exhaustive, enumerate_exhaustively, replay, sample_expression, ExpressionSearch,
    Objective,
};
pub use space::{StateIx, TypeSearchSpace, TypeState};
pub use trajectory::TrajectoryEnumerator;
pub use types::{Type, TypeHierarchy, TypeSignature};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;
