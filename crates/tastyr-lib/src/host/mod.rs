//! The host compiler surface consumed by the unpickler.
//!
//! Symbol factories, type constructors, scopes, the package mirror, phase
//! control and the reporter, bundled behind one [`HostEnv`] handle that
//! rides on the reading context.

pub mod mirror;
pub mod scope;
pub mod symbols;
pub mod trees;
pub mod types;

use std::cell::Cell;
use std::rc::Rc;

use tastyr_core::flags::HostFlags;
use tastyr_core::names::Name;

use crate::reporter::Reporter;
use crate::settings::Settings;
use mirror::Mirror;
use symbols::{Symbol, SymbolTable};
use types::Type;

/// Compiler phases the reader can run under. Ordering is phase-travel
/// ordering.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Phase {
    Namer,
    Pickler,
    ExtensionMethods,
    Erasure,
}

/// Global host state handle passed on the context.
pub struct HostEnv {
    pub symtab: SymbolTable,
    pub mirror: Mirror,
    pub reporter: Reporter,
    pub settings: Settings,
    phase: Cell<Phase>,
}

impl HostEnv {
    pub fn new(settings: Settings) -> Rc<HostEnv> {
        let symtab = SymbolTable::new();
        let mirror = Mirror::new(&symtab);
        Rc::new(HostEnv {
            symtab,
            mirror,
            reporter: Reporter::new(),
            settings,
            phase: Cell::new(Phase::Pickler),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase.get()
    }

    /// Run `f` at `phase` if the current phase is later, otherwise in
    /// place. The current phase is restored afterwards.
    pub fn entering_phase_not_later_than<R>(&self, phase: Phase, f: impl FnOnce() -> R) -> R {
        let saved = self.phase.get();
        if saved > phase {
            self.phase.set(phase);
        }
        let result = f();
        self.phase.set(saved);
        result
    }

    /// Info of a companion-owned extension method derived from a value
    /// class member: the original info with a leading `$this` parameter of
    /// the value class's type.
    pub fn extension_meth_info(&self, cls: Symbol, ext: Symbol, orig: &Type) -> Type {
        let cls_args: Vec<Type> = self
            .symtab
            .type_params(cls)
            .into_iter()
            .map(|p| Type::TypeRef {
                prefix: Box::new(Type::NoPrefix),
                sym: p,
                args: Vec::new(),
            })
            .collect();
        let self_param = self
            .symtab
            .new_value_param(ext, Name::simple("$this"), HostFlags::SYNTHETIC);
        self.symtab.set_info(
            self_param,
            Type::TypeRef {
                prefix: Box::new(Type::NoPrefix),
                sym: cls,
                args: cls_args,
            },
        );
        match orig {
            Type::Poly { params, result } => Type::Poly {
                params: params.clone(),
                result: Box::new(Type::Method {
                    params: vec![self_param],
                    result: result.clone(),
                }),
            },
            Type::NullaryMethod(result) => Type::Method {
                params: vec![self_param],
                result: result.clone(),
            },
            other => Type::Method {
                params: vec![self_param],
                result: Box::new(other.clone()),
            },
        }
    }
}
