//! Minimal typed trees.
//!
//! Just enough tree structure to represent annotation arguments, reduce
//! constructor applications to parent types, and carry default-argument
//! getters. Every node knows its type.

use std::rc::Rc;

use tastyr_core::names::Name;

use super::symbols::Symbol;
use super::types::{Constant, Type};

/// A typed host tree.
#[derive(Clone, PartialEq, Debug)]
pub enum Tree {
    /// A label with an explicitly read type.
    Ident { name: Rc<Name>, tpe: Type },
    Select {
        qual: Box<Tree>,
        sym: Symbol,
        tpe: Type,
    },
    Apply {
        fun: Box<Tree>,
        args: Vec<Tree>,
        tpe: Type,
    },
    TypeApply {
        fun: Box<Tree>,
        args: Vec<Type>,
        tpe: Type,
    },
    New(Type),
    This(Type),
    Super { qual: Box<Tree>, tpe: Type },
    Literal(Constant),
    TypeTree(Type),
    Typed { expr: Box<Tree>, tpe: Type },
    NamedArg { name: Rc<Name>, arg: Box<Tree> },
    Repeated {
        elem_tpe: Type,
        elems: Vec<Tree>,
    },
}

impl Tree {
    pub fn tpe(&self) -> Type {
        match self {
            Tree::Ident { tpe, .. }
            | Tree::Select { tpe, .. }
            | Tree::Apply { tpe, .. }
            | Tree::TypeApply { tpe, .. }
            | Tree::Super { tpe, .. }
            | Tree::Typed { tpe, .. } => tpe.clone(),
            Tree::New(tpe) | Tree::This(tpe) | Tree::TypeTree(tpe) => tpe.clone(),
            Tree::Literal(c) => Type::Constant(c.clone()),
            Tree::NamedArg { arg, .. } => arg.tpe(),
            Tree::Repeated { elem_tpe, .. } => elem_tpe.clone(),
        }
    }
}
