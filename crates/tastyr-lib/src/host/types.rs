//! The host compiler's type vocabulary.
//!
//! Everything the unpickler attaches to a symbol is built from these
//! constructors. Lambda and recursive types carry one-shot fields so a
//! placeholder can be registered before its structural body is read; the
//! fields are populated exactly once and never mutated afterwards.

use std::cell::OnceCell;
use std::rc::Rc;

use tastyr_core::bytes::Addr;

use super::scope::Scope;
use super::symbols::Symbol;

/// A literal constant.
#[derive(Clone, PartialEq, Debug)]
pub enum Constant {
    Unit,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(Rc<str>),
    Null,
    Class(Box<Type>),
    /// Tag constant for an enum case value: the constant is the symbol
    /// itself.
    Enum(Symbol),
}

/// Parameter-list flavor of a method type.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MethodKind {
    Plain,
    Implicit,
}

/// Binder flavor of a wire-level lambda type.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LambdaKind {
    Poly,
    TypeLambda,
    Method(MethodKind),
}

/// A lambda binder read from the wire: polymorphic, method, or type-lambda.
///
/// Created empty, registered for self-references, then populated once.
#[derive(Debug)]
pub struct LambdaType {
    pub kind: LambdaKind,
    param_names: OnceCell<Vec<Rc<str>>>,
    param_infos: OnceCell<Vec<Type>>,
    res_type: OnceCell<Type>,
}

impl LambdaType {
    pub fn new(kind: LambdaKind) -> Rc<LambdaType> {
        Rc::new(LambdaType {
            kind,
            param_names: OnceCell::new(),
            param_infos: OnceCell::new(),
            res_type: OnceCell::new(),
        })
    }

    /// Populate the one-shot fields. Panics if called twice; the reader
    /// calls it exactly once per binder.
    pub fn populate(&self, names: Vec<Rc<str>>, infos: Vec<Type>, res: Type) {
        assert!(self.param_names.set(names).is_ok(), "lambda populated twice");
        let _ = self.param_infos.set(infos);
        let _ = self.res_type.set(res);
    }

    pub fn param_names(&self) -> &[Rc<str>] {
        self.param_names.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn param_infos(&self) -> &[Type] {
        self.param_infos.get().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn res_type(&self) -> Type {
        self.res_type.get().cloned().unwrap_or(Type::None)
    }

    pub fn arity(&self) -> usize {
        self.param_names().len()
    }
}

/// A recursive type. The body is seeded after the node is registered, so
/// self-references resolve to this same allocation.
#[derive(Debug)]
pub struct RecType {
    body: OnceCell<Type>,
}

impl RecType {
    pub fn new() -> Rc<RecType> {
        Rc::new(RecType {
            body: OnceCell::new(),
        })
    }

    pub fn set_body(&self, body: Type) {
        assert!(self.body.set(body).is_ok(), "recursive type populated twice");
    }

    pub fn body(&self) -> Type {
        self.body.get().cloned().unwrap_or(Type::None)
    }
}

/// A host type.
///
/// Equality is structural except for lambda and recursive nodes, which
/// compare by identity: a self-reference is "the same node", not "an equal
/// node", and identity comparison keeps cyclic structures total.
#[derive(Clone, Debug)]
pub enum Type {
    /// Absent type.
    None,
    /// Absent prefix of a direct reference.
    NoPrefix,
    /// Installed on a symbol whose completion failed.
    Error,
    TypeRef {
        prefix: Box<Type>,
        sym: Symbol,
        args: Vec<Type>,
    },
    SingleType {
        prefix: Box<Type>,
        sym: Symbol,
    },
    This(Symbol),
    Super {
        this: Box<Type>,
        parent: Box<Type>,
    },
    Constant(Constant),
    Annotated {
        underlying: Box<Type>,
        /// Subtree of the annotation term, read on demand.
        annot: Addr,
    },
    Intersection(Vec<Type>),
    Refined {
        parents: Vec<Type>,
        decls: Scope,
        cls: Symbol,
    },
    ClassInfo {
        parents: Vec<Type>,
        decls: Scope,
        cls: Symbol,
    },
    /// One value-parameter list of a method, binding parameter symbols.
    Method {
        params: Vec<Symbol>,
        result: Box<Type>,
    },
    /// Result type of a parameterless method.
    NullaryMethod(Box<Type>),
    /// Type-parameterized info, binding type-parameter symbols.
    Poly {
        params: Vec<Symbol>,
        result: Box<Type>,
    },
    Bounds {
        lo: Box<Type>,
        hi: Box<Type>,
    },
    ByName(Box<Type>),
    Applied {
        tycon: Box<Type>,
        args: Vec<Type>,
    },
    Lambda(Rc<LambdaType>),
    /// Reference to the `index`-th parameter of a lambda binder.
    ParamRef {
        binder: Rc<LambdaType>,
        index: usize,
    },
    Rec(Rc<RecType>),
    RecThis(Rc<RecType>),
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        use Type::*;
        match (self, other) {
            (None, None) | (NoPrefix, NoPrefix) | (Error, Error) => true,
            (
                TypeRef {
                    prefix: p1,
                    sym: s1,
                    args: a1,
                },
                TypeRef {
                    prefix: p2,
                    sym: s2,
                    args: a2,
                },
            ) => s1 == s2 && p1 == p2 && a1 == a2,
            (
                SingleType {
                    prefix: p1,
                    sym: s1,
                },
                SingleType {
                    prefix: p2,
                    sym: s2,
                },
            ) => s1 == s2 && p1 == p2,
            (This(s1), This(s2)) => s1 == s2,
            (
                Super {
                    this: t1,
                    parent: q1,
                },
                Super {
                    this: t2,
                    parent: q2,
                },
            ) => t1 == t2 && q1 == q2,
            (Constant(c1), Constant(c2)) => c1 == c2,
            (
                Annotated {
                    underlying: u1,
                    annot: a1,
                },
                Annotated {
                    underlying: u2,
                    annot: a2,
                },
            ) => u1 == u2 && a1 == a2,
            (Intersection(t1), Intersection(t2)) => t1 == t2,
            (Refined { cls: c1, .. }, Refined { cls: c2, .. }) => c1 == c2,
            (ClassInfo { cls: c1, .. }, ClassInfo { cls: c2, .. }) => c1 == c2,
            (
                Method {
                    params: p1,
                    result: r1,
                },
                Method {
                    params: p2,
                    result: r2,
                },
            ) => p1 == p2 && r1 == r2,
            (NullaryMethod(r1), NullaryMethod(r2)) => r1 == r2,
            (
                Poly {
                    params: p1,
                    result: r1,
                },
                Poly {
                    params: p2,
                    result: r2,
                },
            ) => p1 == p2 && r1 == r2,
            (Bounds { lo: l1, hi: h1 }, Bounds { lo: l2, hi: h2 }) => l1 == l2 && h1 == h2,
            (ByName(t1), ByName(t2)) => t1 == t2,
            (
                Applied {
                    tycon: t1,
                    args: a1,
                },
                Applied {
                    tycon: t2,
                    args: a2,
                },
            ) => t1 == t2 && a1 == a2,
            (Lambda(l1), Lambda(l2)) => Rc::ptr_eq(l1, l2),
            (
                ParamRef {
                    binder: b1,
                    index: i1,
                },
                ParamRef {
                    binder: b2,
                    index: i2,
                },
            ) => Rc::ptr_eq(b1, b2) && i1 == i2,
            (Rec(r1), Rec(r2)) => Rc::ptr_eq(r1, r2),
            (RecThis(r1), RecThis(r2)) => Rc::ptr_eq(r1, r2),
            _ => false,
        }
    }
}

impl Type {
    /// The symbol a type refers to, if it has one at the head.
    pub fn type_symbol(&self) -> Symbol {
        match self {
            Type::TypeRef { sym, .. } | Type::SingleType { sym, .. } | Type::This(sym) => *sym,
            Type::Applied { tycon, .. } => tycon.type_symbol(),
            Type::Annotated { underlying, .. } | Type::ByName(underlying) => {
                underlying.type_symbol()
            }
            Type::Refined { cls, .. } | Type::ClassInfo { cls, .. } => *cls,
            Type::Poly { result, .. } => result.type_symbol(),
            _ => Symbol::NONE,
        }
    }

    /// Result of applying one argument list, for collapsing constructor
    /// applications to their type.
    pub fn apply_result(&self) -> Type {
        match self {
            Type::Method { result, .. } => (**result).clone(),
            Type::NullaryMethod(result) => (**result).clone(),
            Type::Poly { result, .. } => result.apply_result(),
            Type::Lambda(lambda) => lambda.res_type(),
            other => other.clone(),
        }
    }

    /// Final result after stripping every parameter section.
    pub fn final_result(&self) -> Type {
        match self {
            Type::Method { result, .. } => result.final_result(),
            Type::NullaryMethod(result) => result.final_result(),
            Type::Poly { result, .. } => result.final_result(),
            other => other.clone(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Type::Error)
    }

    /// A bounds pair whose sides coincide denotes an alias.
    pub fn is_alias_bounds(&self) -> bool {
        matches!(self, Type::Bounds { lo, hi } if lo == hi)
    }

    /// Whether a refinement member with this info is method-shaped.
    pub fn is_method_shaped(&self) -> bool {
        matches!(
            self,
            Type::Method { .. } | Type::NullaryMethod(_) | Type::Poly { .. }
        )
    }
}

/// Applied-type constructor that respects higher-kinded type constructors:
/// a direct reference takes the arguments in place, anything else keeps an
/// explicit application node. Bounds among the arguments stand for
/// wildcards and are kept as written.
pub fn applied_type(tycon: Type, args: Vec<Type>) -> Type {
    match tycon {
        Type::TypeRef {
            prefix,
            sym,
            args: existing,
        } if existing.is_empty() => Type::TypeRef {
            prefix,
            sym,
            args,
        },
        other => Type::Applied {
            tycon: Box::new(other),
            args,
        },
    }
}
