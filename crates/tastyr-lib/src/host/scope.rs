//! Declaration scopes.
//!
//! Scopes preserve source order: enumeration yields symbols in first-entry
//! order, and overloads keep their insertion order under one key. Lookup is
//! by host identifier and namespace.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use super::symbols::{Space, Symbol};

type Key = (Rc<str>, Space);

#[derive(Debug, Default)]
struct ScopeData {
    elems: Vec<Symbol>,
    by_name: IndexMap<Key, Vec<Symbol>>,
}

/// A shared, mutable declaration scope.
#[derive(Clone, Debug, Default)]
pub struct Scope(Rc<RefCell<ScopeData>>);

impl Scope {
    pub fn new() -> Scope {
        Scope::default()
    }

    /// Append a symbol. Overloads (same key, different symbol) accumulate
    /// in insertion order.
    pub fn enter(&self, ident: Rc<str>, space: Space, sym: Symbol) {
        let mut data = self.0.borrow_mut();
        data.elems.push(sym);
        data.by_name.entry((ident, space)).or_default().push(sym);
    }

    /// Enter unless an equivalent entry exists: the same symbol, or any
    /// symbol under a non-overloadable (type-space) key. Returns whether
    /// the symbol was entered.
    pub fn enter_if_new(&self, ident: Rc<str>, space: Space, sym: Symbol) -> bool {
        {
            let data = self.0.borrow();
            if let Some(existing) = data.by_name.get(&(Rc::clone(&ident), space)) {
                if existing.contains(&sym) {
                    return false;
                }
                if space == Space::Type {
                    return false;
                }
            }
        }
        self.enter(ident, space, sym);
        true
    }

    /// First symbol under the key, in insertion order.
    pub fn lookup(&self, ident: &str, space: Space) -> Option<Symbol> {
        self.lookup_all(ident, space).into_iter().next()
    }

    /// Every symbol under the key, in insertion order.
    pub fn lookup_all(&self, ident: &str, space: Space) -> Vec<Symbol> {
        let data = self.0.borrow();
        data.by_name
            .iter()
            .find(|((name, sp), _)| &**name == ident && *sp == space)
            .map(|(_, syms)| syms.clone())
            .unwrap_or_default()
    }

    /// All symbols in source order.
    pub fn elems(&self) -> Vec<Symbol> {
        self.0.borrow().elems.clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().elems.is_empty()
    }

    /// Whether two handles share the same underlying scope.
    pub fn same_as(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
