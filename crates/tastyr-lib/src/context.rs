//! Reading context.
//!
//! A context is a small immutable frame: current owner, traversal mode and
//! source handle. Adjusting one returns a new frame; mutation happens only
//! on the symbol table the frames point into.

use std::rc::Rc;

use bitflags::bitflags;

use crate::host::symbols::{Symbol, SymbolTable};

bitflags! {
    /// Traversal modes.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct Mode: u8 {
        /// Reading the parent list of a template.
        const READ_PARENTS = 1 << 0;
        /// Reading an annotation subtree.
        const READ_ANNOTATION = 1 << 1;
        /// Indexing definitions without reading bodies.
        const INDEXING = 1 << 2;
    }
}

/// An immutable reading frame.
#[derive(Clone, Debug)]
pub struct Context {
    owner: Symbol,
    mode: Mode,
    source: Rc<str>,
}

impl Context {
    pub fn new(owner: Symbol, source: Rc<str>) -> Context {
        Context {
            owner,
            mode: Mode::empty(),
            source,
        }
    }

    pub fn owner(&self) -> Symbol {
        self.owner
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn source(&self) -> &Rc<str> {
        &self.source
    }

    pub fn with_owner(&self, owner: Symbol) -> Context {
        Context {
            owner,
            ..self.clone()
        }
    }

    /// Frame whose owner is a fresh local dummy under the current owner.
    pub fn with_new_scope(&self, symtab: &SymbolTable) -> Context {
        self.with_owner(symtab.new_local_dummy(self.owner))
    }

    pub fn with_mode(&self, mode: Mode) -> Context {
        Context {
            mode,
            ..self.clone()
        }
    }

    pub fn add_mode(&self, mode: Mode) -> Context {
        self.with_mode(self.mode | mode)
    }

    pub fn retract_mode(&self, mode: Mode) -> Context {
        self.with_mode(self.mode - mode)
    }

    pub fn with_source(&self, source: Rc<str>) -> Context {
        Context {
            source,
            ..self.clone()
        }
    }

    /// Owner-chain description for diagnostics.
    pub fn location(&self, symtab: &SymbolTable) -> String {
        if self.owner.exists() {
            symtab.location_of(self.owner)
        } else {
            format!("<toplevel of {}>", self.source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tastyr_core::names::Name;

    #[test]
    fn mode_adjustments_return_fresh_frames() {
        let ctx = Context::new(Symbol::NONE, "test".into());
        let with = ctx.add_mode(Mode::READ_PARENTS);
        assert!(with.mode().contains(Mode::READ_PARENTS));
        assert!(!ctx.mode().contains(Mode::READ_PARENTS));
        assert!(!with.retract_mode(Mode::READ_PARENTS).mode().contains(Mode::READ_PARENTS));
    }

    #[test]
    fn new_scope_owner_is_a_local_dummy() {
        let symtab = SymbolTable::new();
        let owner = symtab.new_class(Symbol::NONE, Name::simple("C"), Default::default());
        let ctx = Context::new(owner, "test".into());
        let scoped = ctx.with_new_scope(&symtab);
        assert_ne!(scoped.owner(), owner);
        assert_eq!(symtab.owner(scoped.owner()), owner);
    }
}
