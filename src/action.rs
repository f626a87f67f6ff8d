use crate::{ExprIx, FunctionIx};

/// One step of the expression-building decision process.
///
/// Actions compare by payload identity: two pushes are equal iff they push
/// the same interned expression, two applies iff they apply the same
/// function of the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Push(ExprIx),
    Apply(FunctionIx),
    Yield,
}

impl Action {
    pub fn is_push(&self) -> bool {
        matches!(self, Action::Push(_))
    }

    pub fn is_apply(&self) -> bool {
        matches!(self, Action::Apply(_))
    }

    pub fn is_yield(&self) -> bool {
        matches!(self, Action::Yield)
    }
}

/// An action sequence that builds one expression from an empty stack.
/// The final `Yield` is implicit and never stored.
pub type Trajectory = Vec<Action>;
