use hashbrown::HashMap;
use lasso::{Rodeo, Spur};
use smallvec::SmallVec;

use crate::{FunctionIx, Type};

/// An index to access an `Expr` in the `Universe`.
pub type ExprIx = usize;

/// An `Expr` is a typed symbolic formula. `Expr`s are allocated in a
/// contiguous vector owned by the `Universe` and refer to their arguments
/// by index, so structurally equal expressions share one `ExprIx`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Input {
        name: Spur,
        ty: Type,
    },
    Constant {
        literal: Spur,
        ty: Type,
    },

    // Function application
    App {
        function: FunctionIx,
        ty: Type,
        args: SmallVec<[ExprIx; 2]>,
    },
}

impl Expr {
    pub fn ty(&self) -> Type {
        match self {
            Expr::Input { ty, .. } | Expr::Constant { ty, .. } | Expr::App { ty, .. } => *ty,
        }
    }

    pub fn args(&self) -> &[ExprIx] {
        match self {
            Expr::App { args, .. } => args,
            _ => &[],
        }
    }

    pub fn is_input(&self) -> bool {
        matches!(self, Expr::Input { .. })
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Constant { .. })
    }
}

/// The `Universe` owns every expression node together with the interned
/// strings (type names, input names, constant literals) they refer to.
/// Allocation goes through the interning table, which guarantees that a
/// given `(function, args)` pair is only ever stored once.
#[derive(Debug, Default)]
pub struct Universe {
    exprs: Vec<Expr>,
    index: HashMap<Expr, ExprIx>,
    strs: Rodeo<Spur>,
}

impl Universe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern_str(&mut self, s: &str) -> Spur {
        self.strs.get_or_intern(s)
    }

    pub fn get_str(&self, s: &Spur) -> &str {
        self.strs.resolve(s)
    }

    pub fn intern_type(&mut self, name: &str) -> Type {
        Type(self.intern_str(name))
    }

    /// Looks up a type that was already interned.
    pub fn get_type(&self, name: &str) -> Option<Type> {
        self.strs.get(name).map(Type)
    }

    pub fn type_name(&self, ty: Type) -> &str {
        self.get_str(&ty.0)
    }

    pub fn input(&mut self, name: &str, ty: Type) -> ExprIx {
        let name = self.intern_str(name);
        self.alloc_expr(Expr::Input { name, ty })
    }

    pub fn constant(&mut self, literal: &str, ty: Type) -> ExprIx {
        let literal = self.intern_str(literal);
        self.alloc_expr(Expr::Constant { literal, ty })
    }

    /// Returns the application node `function(args)`, allocating it only if
    /// no structurally equal node exists yet.
    pub fn make_application(&mut self, function: FunctionIx, ty: Type, args: &[ExprIx]) -> ExprIx {
        debug_assert!(args.iter().all(|a| *a < self.exprs.len()));
        self.alloc_expr(Expr::App {
            function,
            ty,
            args: args.iter().copied().collect(),
        })
    }

    fn alloc_expr(&mut self, e: Expr) -> ExprIx {
        if let Some(ix) = self.index.get(&e) {
            return *ix;
        }
        let ix = self.exprs.len();
        self.exprs.push(e.clone());
        self.index.insert(e, ix);
        ix
    }

    pub fn get(&self, ix: ExprIx) -> &Expr {
        &self.exprs[ix]
    }

    pub fn type_of(&self, ix: ExprIx) -> Type {
        self.exprs[ix].ty()
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// Number of push and apply actions needed to build `ix` from scratch.
    pub fn size(&self, ix: ExprIx) -> usize {
        1 + self.get(ix).args().iter().map(|a| self.size(*a)).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structurally_equal_nodes_are_shared() {
        let mut u = Universe::new();
        let int = u.intern_type("Int");
        let x = u.input("x", int);
        let one = u.constant("1", int);

        assert_eq!(u.input("x", int), x);
        assert_ne!(x, one);

        let a = u.make_application(0, int, &[x, one]);
        let b = u.make_application(0, int, &[x, one]);
        let c = u.make_application(0, int, &[one, x]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(u.len(), 4);

        let nested = u.make_application(1, int, &[a]);
        assert_eq!(u.get(nested).args(), &[a]);
        assert_eq!(u.size(nested), 4);
    }

    #[test]
    fn types_are_interned_names() {
        let mut u = Universe::new();
        let int = u.intern_type("Int");
        assert_eq!(u.intern_type("Int"), int);
        assert_eq!(u.get_type("Int"), Some(int));
        assert_eq!(u.get_type("Bool"), None);
        assert_eq!(u.type_name(int), "Int");
    }
}
