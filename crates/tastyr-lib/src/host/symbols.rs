//! The host symbol table.
//!
//! Symbols are dense handles into a table of shared records. Each record
//! carries its declared flags, owner link, declaration scope, and an info
//! slot that is either resolved or deferred behind a completer. Forcing an
//! info is the only suspension point of the reader.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tastyr_core::bytes::Addr;
use tastyr_core::error::{Result, UnpickleError};
use tastyr_core::flags::HostFlags;
use tastyr_core::names::Name;

use super::scope::Scope;
use super::types::Type;

/// A lightweight handle to a symbol. `Symbol::NONE` is the absent symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Symbol(u32);

impl Symbol {
    pub const NONE: Symbol = Symbol(0);

    #[inline]
    pub fn exists(self) -> bool {
        self != Symbol::NONE
    }
}

/// Term or type namespace of a symbol.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Space {
    Term,
    Type,
}

/// What a symbol is.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolKind {
    Package,
    PackageClass,
    Class,
    ModuleClass,
    Module,
    Method,
    Value,
    TypeMember,
    TypeParam,
    Param,
    LocalDummy,
    RefinementClass,
}

impl SymbolKind {
    pub fn space(self) -> Space {
        match self {
            SymbolKind::Package
            | SymbolKind::Module
            | SymbolKind::Method
            | SymbolKind::Value
            | SymbolKind::Param
            | SymbolKind::LocalDummy => Space::Term,
            SymbolKind::PackageClass
            | SymbolKind::Class
            | SymbolKind::ModuleClass
            | SymbolKind::TypeMember
            | SymbolKind::TypeParam
            | SymbolKind::RefinementClass => Space::Type,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            SymbolKind::Package | SymbolKind::PackageClass => "package",
            SymbolKind::Class => "class",
            SymbolKind::ModuleClass | SymbolKind::Module => "object",
            SymbolKind::Method => "method",
            SymbolKind::Value => "value",
            SymbolKind::TypeMember => "type",
            SymbolKind::TypeParam => "type parameter",
            SymbolKind::Param => "parameter",
            SymbolKind::LocalDummy => "local block",
            SymbolKind::RefinementClass => "refinement",
        }
    }
}

/// Host spelling of a symbol's name. Compiler-internal bracketed names
/// (`<init>`, `<root>`, ...) are spelled literally; everything else gets
/// the symbolic-operator escape.
fn host_ident(name: &Rc<Name>) -> String {
    let source = name.source_str();
    if source.starts_with('<') && source.ends_with('>') {
        source
    } else {
        name.encoded_str()
    }
}

/// A deferred annotation: the subtree to re-read when the annotation is
/// demanded.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Annotation {
    pub tree_addr: Addr,
}

/// Deferred info computation attached to a symbol shell.
pub trait Completer {
    /// Read the symbol's subtree and assign its info. Called at most once.
    fn complete(&self, sym: Symbol) -> Result<()>;
}

enum Info {
    /// Shell without info; never observed by well-formed programs.
    Uninit,
    Lazy(Rc<dyn Completer>),
    Resolved(Type),
}

impl std::fmt::Debug for Info {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Info::Uninit => write!(f, "Uninit"),
            Info::Lazy(_) => write!(f, "Lazy(..)"),
            Info::Resolved(t) => write!(f, "Resolved({t:?})"),
        }
    }
}

#[derive(Debug)]
struct SymbolData {
    name: Rc<Name>,
    ident: Rc<str>,
    kind: SymbolKind,
    owner: Symbol,
    flags: Cell<HostFlags>,
    info: RefCell<Info>,
    decls: Scope,
    type_params: RefCell<Vec<Symbol>>,
    annotations: RefCell<Vec<Annotation>>,
    private_within: Cell<Symbol>,
    module_class: Cell<Symbol>,
    source_module: Cell<Symbol>,
    self_type: RefCell<Type>,
}

/// The symbol table. All mutation happens through shared handles; the
/// table is single-threaded by construction.
#[derive(Default)]
pub struct SymbolTable {
    syms: RefCell<Vec<Rc<SymbolData>>>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        let table = SymbolTable::default();
        // Slot 0 backs Symbol::NONE.
        table.alloc(Rc::new(Name::Simple("<none>".into())), SymbolKind::Value, Symbol::NONE, HostFlags::empty());
        table
    }

    fn alloc(
        &self,
        name: Rc<Name>,
        kind: SymbolKind,
        owner: Symbol,
        flags: HostFlags,
    ) -> Symbol {
        let ident: Rc<str> = host_ident(&name).into();
        let mut syms = self.syms.borrow_mut();
        let sym = Symbol(syms.len() as u32);
        syms.push(Rc::new(SymbolData {
            name,
            ident,
            kind,
            owner,
            flags: Cell::new(flags),
            info: RefCell::new(Info::Uninit),
            decls: Scope::new(),
            type_params: RefCell::new(Vec::new()),
            annotations: RefCell::new(Vec::new()),
            private_within: Cell::new(Symbol::NONE),
            module_class: Cell::new(Symbol::NONE),
            source_module: Cell::new(Symbol::NONE),
            self_type: RefCell::new(Type::None),
        }));
        sym
    }

    fn data(&self, sym: Symbol) -> Rc<SymbolData> {
        Rc::clone(&self.syms.borrow()[sym.0 as usize])
    }

    // --- factories ---

    pub fn new_class(&self, owner: Symbol, name: Rc<Name>, flags: HostFlags) -> Symbol {
        self.alloc(name.to_type_name(), SymbolKind::Class, owner, flags)
    }

    /// A module value with its linked module class.
    pub fn new_module(
        &self,
        owner: Symbol,
        name: Rc<Name>,
        val_flags: HostFlags,
        class_flags: HostFlags,
    ) -> (Symbol, Symbol) {
        let val = self.alloc(name.to_term_name(), SymbolKind::Module, owner, val_flags);
        let cls = self.alloc(
            Rc::new(Name::Module(name.to_term_name())).to_type_name(),
            SymbolKind::ModuleClass,
            owner,
            class_flags,
        );
        self.data(val).module_class.set(cls);
        self.data(cls).source_module.set(val);
        (val, cls)
    }

    pub fn new_method(&self, owner: Symbol, name: Rc<Name>, flags: HostFlags) -> Symbol {
        self.alloc(name, SymbolKind::Method, owner, flags | HostFlags::METHOD)
    }

    pub fn new_value(&self, owner: Symbol, name: Rc<Name>, flags: HostFlags) -> Symbol {
        self.alloc(name, SymbolKind::Value, owner, flags)
    }

    pub fn new_type_member(&self, owner: Symbol, name: Rc<Name>, flags: HostFlags) -> Symbol {
        self.alloc(name.to_type_name(), SymbolKind::TypeMember, owner, flags)
    }

    pub fn new_type_param(&self, owner: Symbol, name: Rc<Name>, flags: HostFlags) -> Symbol {
        self.alloc(
            name.to_type_name(),
            SymbolKind::TypeParam,
            owner,
            flags | HostFlags::PARAM,
        )
    }

    pub fn new_value_param(&self, owner: Symbol, name: Rc<Name>, flags: HostFlags) -> Symbol {
        self.alloc(name, SymbolKind::Param, owner, flags | HostFlags::PARAM)
    }

    pub fn new_constructor(&self, owner: Symbol, flags: HostFlags) -> Symbol {
        self.alloc(
            Name::constructor(),
            SymbolKind::Method,
            owner,
            flags | HostFlags::METHOD,
        )
    }

    pub fn new_local_dummy(&self, owner: Symbol) -> Symbol {
        self.alloc(
            Rc::new(Name::Simple("<local>".into())),
            SymbolKind::LocalDummy,
            owner,
            HostFlags::empty(),
        )
    }

    pub fn new_refinement_class(&self, owner: Symbol) -> Symbol {
        let cls = self.alloc(
            Rc::new(Name::Simple("<refinement>".into())),
            SymbolKind::RefinementClass,
            owner,
            HostFlags::SYNTHETIC,
        );
        self.set_info(
            cls,
            Type::ClassInfo {
                parents: Vec::new(),
                decls: self.decls(cls),
                cls,
            },
        );
        cls
    }

    /// A package term with its linked package class.
    pub fn new_package(&self, owner: Symbol, name: Rc<Name>) -> (Symbol, Symbol) {
        let val = self.alloc(
            name.to_term_name(),
            SymbolKind::Package,
            owner,
            HostFlags::MODULE | HostFlags::FINAL | HostFlags::STABLE,
        );
        let cls = self.alloc(
            name.to_type_name(),
            SymbolKind::PackageClass,
            owner,
            HostFlags::MODULE | HostFlags::FINAL,
        );
        self.data(val).module_class.set(cls);
        self.data(cls).source_module.set(val);
        self.set_info(
            cls,
            Type::ClassInfo {
                parents: Vec::new(),
                decls: self.decls(cls),
                cls,
            },
        );
        self.set_info(
            val,
            Type::TypeRef {
                prefix: Box::new(Type::NoPrefix),
                sym: cls,
                args: Vec::new(),
            },
        );
        (val, cls)
    }

    // --- accessors ---

    pub fn name(&self, sym: Symbol) -> Rc<Name> {
        Rc::clone(&self.data(sym).name)
    }

    pub fn ident(&self, sym: Symbol) -> Rc<str> {
        Rc::clone(&self.data(sym).ident)
    }

    pub fn kind(&self, sym: Symbol) -> SymbolKind {
        self.data(sym).kind
    }

    pub fn space(&self, sym: Symbol) -> Space {
        self.data(sym).kind.space()
    }

    pub fn owner(&self, sym: Symbol) -> Symbol {
        self.data(sym).owner
    }

    pub fn flags(&self, sym: Symbol) -> HostFlags {
        self.data(sym).flags.get()
    }

    pub fn add_flags(&self, sym: Symbol, flags: HostFlags) {
        let data = self.data(sym);
        data.flags.set(data.flags.get() | flags);
    }

    pub fn remove_flags(&self, sym: Symbol, flags: HostFlags) {
        let data = self.data(sym);
        data.flags.set(data.flags.get() - flags);
    }

    pub fn decls(&self, sym: Symbol) -> Scope {
        self.data(sym).decls.clone()
    }

    pub fn type_params(&self, sym: Symbol) -> Vec<Symbol> {
        self.data(sym).type_params.borrow().clone()
    }

    pub fn set_type_params(&self, sym: Symbol, params: Vec<Symbol>) {
        *self.data(sym).type_params.borrow_mut() = params;
    }

    pub fn annotations(&self, sym: Symbol) -> Vec<Annotation> {
        self.data(sym).annotations.borrow().clone()
    }

    pub fn add_annotations(&self, sym: Symbol, annots: impl IntoIterator<Item = Annotation>) {
        self.data(sym).annotations.borrow_mut().extend(annots);
    }

    pub fn private_within(&self, sym: Symbol) -> Symbol {
        self.data(sym).private_within.get()
    }

    pub fn set_private_within(&self, sym: Symbol, within: Symbol) {
        self.data(sym).private_within.set(within);
    }

    pub fn module_class(&self, sym: Symbol) -> Symbol {
        self.data(sym).module_class.get()
    }

    pub fn source_module(&self, sym: Symbol) -> Symbol {
        self.data(sym).source_module.get()
    }

    pub fn self_type(&self, sym: Symbol) -> Type {
        self.data(sym).self_type.borrow().clone()
    }

    pub fn set_self_type(&self, sym: Symbol, tpe: Type) {
        *self.data(sym).self_type.borrow_mut() = tpe;
    }

    pub fn is_class_like(&self, sym: Symbol) -> bool {
        matches!(
            self.kind(sym),
            SymbolKind::Class
                | SymbolKind::ModuleClass
                | SymbolKind::PackageClass
                | SymbolKind::RefinementClass
        )
    }

    pub fn is_constructor(&self, sym: Symbol) -> bool {
        self.kind(sym) == SymbolKind::Method && self.data(sym).name.is_constructor()
    }

    // --- info ---

    pub fn set_info(&self, sym: Symbol, tpe: Type) {
        *self.data(sym).info.borrow_mut() = Info::Resolved(tpe);
    }

    pub fn set_completer(&self, sym: Symbol, completer: Rc<dyn Completer>) {
        *self.data(sym).info.borrow_mut() = Info::Lazy(completer);
    }

    /// The info if already resolved; never runs a completer.
    pub fn raw_info(&self, sym: Symbol) -> Option<Type> {
        match &*self.data(sym).info.borrow() {
            Info::Resolved(t) => Some(t.clone()),
            _ => None,
        }
    }

    pub fn is_completed(&self, sym: Symbol) -> bool {
        matches!(&*self.data(sym).info.borrow(), Info::Resolved(_))
    }

    /// The symbol's info, running its completer if this is the first
    /// demand. After return the info is always a resolved type, possibly
    /// the error type.
    pub fn info(&self, sym: Symbol) -> Result<Type> {
        let completer = {
            let data = self.data(sym);
            let info = data.info.borrow();
            match &*info {
                Info::Resolved(t) => return Ok(t.clone()),
                Info::Lazy(c) => Rc::clone(c),
                Info::Uninit => {
                    return Err(UnpickleError::format(format!(
                        "symbol {} has no info",
                        data.ident
                    )));
                }
            }
        };
        match completer.complete(sym) {
            Ok(()) => {}
            Err(err) => {
                // Dependents must observe a resolved, if erroneous, type.
                if self.raw_info(sym).is_none() {
                    self.set_info(sym, Type::Error);
                }
                return Err(err);
            }
        }
        self.raw_info(sym).ok_or_else(|| {
            UnpickleError::format(format!(
                "completer finished without assigning info to {}",
                self.ident(sym)
            ))
        })
    }

    // --- rendering ---

    /// Dotted path of encoded identifiers, omitting root packages.
    pub fn fqn(&self, sym: Symbol) -> String {
        let mut parts = Vec::new();
        let mut cur = sym;
        while cur.exists() {
            let data = self.data(cur);
            if data.kind == SymbolKind::LocalDummy {
                cur = data.owner;
                continue;
            }
            if !data.ident.starts_with('<') || parts.is_empty() {
                parts.push(data.ident.to_string());
            }
            cur = data.owner;
        }
        parts.reverse();
        parts.join(".")
    }

    /// Human-readable owner chain, innermost first.
    pub fn location_of(&self, sym: Symbol) -> String {
        let mut parts = Vec::new();
        let mut cur = sym;
        while cur.exists() && parts.len() < 8 {
            let data = self.data(cur);
            if data.kind != SymbolKind::LocalDummy {
                parts.push(format!("{} {}", data.kind.describe(), data.ident));
            }
            cur = data.owner;
        }
        if parts.is_empty() {
            "<root>".to_string()
        } else {
            parts.join(" in ")
        }
    }

    pub fn len(&self) -> usize {
        self.syms.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        // Slot 0 is the NONE placeholder.
        self.syms.borrow().len() <= 1
    }
}
