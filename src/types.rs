use hashbrown::HashMap;
use lasso::Spur;
use smallvec::SmallVec;

use crate::{Result, SearchError};

/// An element type. Types are interned names in the `Universe`, so
/// comparing two types is comparing two integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Type(pub(crate) Spur);

/// The ordered list of types currently sitting on a builder's stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TypeSignature(SmallVec<[Type; 4]>);

impl TypeSignature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Type] {
        &self.0
    }

    /// The `n` topmost types, bottom-most first. `None` if the stack is
    /// shallower than `n`.
    pub fn top(&self, n: usize) -> Option<&[Type]> {
        if n > self.0.len() {
            None
        } else {
            Some(&self.0[self.0.len() - n..])
        }
    }

    /// Signature after pushing one element of type `ty`.
    pub fn pushed(&self, ty: Type) -> Self {
        let mut res = self.clone();
        res.0.push(ty);
        res
    }

    /// Signature after replacing the `arity` topmost elements by one element
    /// of type `output`.
    pub fn applied(&self, arity: usize, output: Type) -> Self {
        debug_assert!(arity <= self.0.len());
        let mut res = self.clone();
        res.0.truncate(self.0.len() - arity);
        res.0.push(output);
        res
    }
}

impl FromIterator<Type> for TypeSignature {
    fn from_iter<I: IntoIterator<Item = Type>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Single-inheritance relation between types. A value of type `t` is
/// accepted wherever `t` or one of its ancestors is expected.
#[derive(Debug, Clone, Default)]
pub struct TypeHierarchy {
    parents: HashMap<Type, Type>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `parent` as the direct parent of `child`. Fails if this
    /// would introduce a cycle or if `child` already has another parent.
    pub fn set_parent(&mut self, child: Type, parent: Type) -> Result<()> {
        if self.inherits_from(parent, child) {
            return Err(SearchError::Config(
                "type hierarchy must not contain cycles".to_string(),
            ));
        }
        match self.parents.get(&child) {
            Some(p) if *p != parent => Err(SearchError::Config(
                "a type may only have one parent".to_string(),
            )),
            _ => {
                self.parents.insert(child, parent);
                Ok(())
            }
        }
    }

    pub fn parent(&self, ty: Type) -> Option<Type> {
        self.parents.get(&ty).copied()
    }

    /// True if `ty` is `ancestor` or transitively derives from it.
    pub fn inherits_from(&self, ty: Type, ancestor: Type) -> bool {
        let mut cur = Some(ty);
        while let Some(t) = cur {
            if t == ancestor {
                return true;
            }
            cur = self.parents.get(&t).copied();
        }
        false
    }
}
