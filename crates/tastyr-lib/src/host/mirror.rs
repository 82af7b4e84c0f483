//! Package mirror: root packages, package creation, well-known classes.
//!
//! The mirror pre-seeds the definitions every artifact links against:
//! `scala.Any`, `scala.AnyRef`, `scala.AnyVal`, `scala.Nothing` and
//! `java.lang.Object`. Parent rewriting and value-class detection compare
//! against these seeds.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use tastyr_core::names::Name;

use super::scope::Scope;
use super::symbols::{Space, Symbol, SymbolTable};
use super::types::Type;

/// Package lookups and well-known definitions.
#[derive(Debug)]
pub struct Mirror {
    root_package: Symbol,
    empty_package: Symbol,
    /// Dotted path to package value symbol. The root package is "".
    packages: RefCell<IndexMap<String, Symbol>>,
    object_class: Symbol,
    any_class: Symbol,
    any_ref_class: Symbol,
    any_val_class: Symbol,
    nothing_class: Symbol,
}

impl Mirror {
    pub fn new(symtab: &SymbolTable) -> Mirror {
        let (root_package, root_class) = symtab.new_package(Symbol::NONE, Name::simple("<root>"));
        let (empty_package, _) = symtab.new_package(root_class, Name::simple("<empty>"));

        let mut packages = IndexMap::new();
        packages.insert(String::new(), root_package);
        let mirror = Mirror {
            root_package,
            empty_package,
            packages: RefCell::new(packages),
            object_class: Symbol::NONE,
            any_class: Symbol::NONE,
            any_ref_class: Symbol::NONE,
            any_val_class: Symbol::NONE,
            nothing_class: Symbol::NONE,
        };

        let scala = mirror.get_or_create_package_str(symtab, "scala");
        let java_lang = mirror.get_or_create_package_str(symtab, "java.lang");

        for primitive in ["Int", "Long", "Boolean", "Unit"] {
            seed_class(symtab, scala, primitive);
        }

        Mirror {
            any_class: seed_class(symtab, scala, "Any"),
            any_ref_class: seed_class(symtab, scala, "AnyRef"),
            any_val_class: seed_class(symtab, scala, "AnyVal"),
            nothing_class: seed_class(symtab, scala, "Nothing"),
            object_class: seed_class(symtab, java_lang, "Object"),
            ..mirror
        }
    }

    pub fn root_package(&self) -> Symbol {
        self.root_package
    }

    pub fn empty_package(&self) -> Symbol {
        self.empty_package
    }

    /// `java.lang.Object`; parents referring to it are rewritten.
    pub fn object_class(&self) -> Symbol {
        self.object_class
    }

    pub fn any_class(&self) -> Symbol {
        self.any_class
    }

    pub fn any_ref_class(&self) -> Symbol {
        self.any_ref_class
    }

    /// The value-class root.
    pub fn any_val_class(&self) -> Symbol {
        self.any_val_class
    }

    pub fn nothing_class(&self) -> Symbol {
        self.nothing_class
    }

    pub fn any_ref_type(&self) -> Type {
        Type::TypeRef {
            prefix: Box::new(Type::NoPrefix),
            sym: self.any_ref_class,
            args: Vec::new(),
        }
    }

    /// The package value for a structured (possibly qualified) name,
    /// creating intermediate packages as needed.
    pub fn get_or_create_package(&self, symtab: &SymbolTable, name: &Rc<Name>) -> Symbol {
        let mut segments = Vec::new();
        flatten_segments(name, &mut segments);
        let mut current = self.root_package;
        let mut path = String::new();
        for segment in segments {
            if segment == "<root>" || segment == "_root_" {
                continue;
            }
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(&segment);
            current = self.enter_package(symtab, current, &path, &segment);
        }
        current
    }

    fn get_or_create_package_str(&self, symtab: &SymbolTable, fqn: &str) -> Symbol {
        let mut current = self.root_package;
        let mut path = String::new();
        for segment in fqn.split('.') {
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(segment);
            current = self.enter_package(symtab, current, &path, segment);
        }
        current
    }

    fn enter_package(
        &self,
        symtab: &SymbolTable,
        parent: Symbol,
        path: &str,
        segment: &str,
    ) -> Symbol {
        if let Some(&sym) = self.packages.borrow().get(path) {
            return sym;
        }
        let parent_class = symtab.module_class(parent);
        let (val, _) = symtab.new_package(parent_class, Name::simple(segment));
        self.package_decls(symtab, parent)
            .enter(symtab.ident(val), Space::Term, val);
        self.packages.borrow_mut().insert(path.to_string(), val);
        val
    }

    fn package_decls(&self, symtab: &SymbolTable, pkg: Symbol) -> Scope {
        symtab.decls(symtab.module_class(pkg))
    }

    /// A class or module looked up by dotted path, without creating
    /// anything.
    pub fn get_class_if_defined(
        &self,
        symtab: &SymbolTable,
        fqn: &str,
        space: Space,
    ) -> Option<Symbol> {
        let (pkg_path, member) = fqn.rsplit_once('.').unwrap_or(("", fqn));
        let pkg = *self.packages.borrow().get(pkg_path)?;
        self.package_decls(symtab, pkg).lookup(member, space)
    }
}

fn seed_class(symtab: &SymbolTable, pkg: Symbol, name: &str) -> Symbol {
    let pkg_class = symtab.module_class(pkg);
    let cls = symtab.new_class(
        pkg_class,
        Name::simple(name),
        tastyr_core::flags::HostFlags::empty(),
    );
    symtab.set_info(
        cls,
        Type::ClassInfo {
            parents: Vec::new(),
            decls: symtab.decls(cls),
            cls,
        },
    );
    symtab
        .decls(pkg_class)
        .enter(symtab.ident(cls), Space::Type, cls);
    cls
}

fn flatten_segments(name: &Rc<Name>, out: &mut Vec<String>) {
    match &**name {
        Name::Qualified { qual, sep, sel } if *sep == "." => {
            flatten_segments(qual, out);
            out.push(sel.source_str());
        }
        Name::Module(base) | Name::Type(base) => flatten_segments(base, out),
        other => out.push(other.source_str()),
    }
}
