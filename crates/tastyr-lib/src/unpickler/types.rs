//! The type grammar reader.
//!
//! Tag-driven. Recursive and lambda constructors are registered in the
//! type-at-address cache before their bodies are read, so self-references
//! resolve to the node under construction. After any length-prefixed type
//! the cursor is exactly at the recorded end.

use std::rc::Rc;

use tastyr_core::bytes::Addr;
use tastyr_core::error::{Result, UnpickleError};
use tastyr_core::flags::HostFlags;
use tastyr_core::names::Name;
use tastyr_core::tags::Tag;

use crate::context::Context;
use crate::host::symbols::{Space, Symbol, SymbolKind};
use crate::host::types::{LambdaKind, LambdaType, MethodKind, RecType, Type, applied_type};

use super::TreeReader;

impl TreeReader<'_> {
    /// Read one type.
    pub(crate) fn read_type(&mut self, ctx: &Context) -> Result<Type> {
        let start = self.r.current_addr();
        let tag = Tag::decode(self.r.read_byte()?, start)?;
        match tag {
            Tag::TypeRefDirect => {
                let addr = self.r.read_addr()?;
                let sym = self.u.symbol_at(addr)?;
                Ok(type_ref(Type::NoPrefix, sym))
            }
            Tag::TermRefDirect => {
                let addr = self.r.read_addr()?;
                let sym = self.u.symbol_at(addr)?;
                Ok(single_type(Type::NoPrefix, sym))
            }
            Tag::TypeRefSymbol => {
                let addr = self.r.read_addr()?;
                let sym = self.u.symbol_at(addr)?;
                let prefix = self.read_type(ctx)?;
                Ok(type_ref(prefix, sym))
            }
            Tag::TermRefSymbol => {
                let addr = self.r.read_addr()?;
                let sym = self.u.symbol_at(addr)?;
                let prefix = self.read_type(ctx)?;
                Ok(single_type(prefix, sym))
            }
            Tag::TypeRefPkg => {
                let name = self.read_name()?;
                let pkg = self
                    .env()
                    .mirror
                    .get_or_create_package(&self.env().symtab, &name);
                let cls = self.env().symtab.module_class(pkg);
                Ok(type_ref(Type::NoPrefix, cls))
            }
            Tag::TermRefPkg => {
                let name = self.read_name()?;
                let pkg = self
                    .env()
                    .mirror
                    .get_or_create_package(&self.env().symtab, &name);
                Ok(single_type(Type::NoPrefix, pkg))
            }
            Tag::TypeRef => {
                let name = self.read_name()?;
                let prefix = self.read_type(ctx)?;
                let sym = self.named_member(&prefix, &name, Space::Type)?;
                Ok(type_ref(prefix, sym))
            }
            Tag::TermRef => {
                let name = self.read_name()?;
                let prefix = self.read_type(ctx)?;
                let sym = self.named_member(&prefix, &name, Space::Term)?;
                Ok(single_type(prefix, sym))
            }
            Tag::TypeRefIn | Tag::TermRefIn => {
                let end = self.r.read_end()?;
                let name = self.read_name()?;
                let prefix = self.read_type(ctx)?;
                let space_tpe = self.read_type(ctx)?;
                let space = if tag == Tag::TypeRefIn {
                    Space::Type
                } else {
                    Space::Term
                };
                // The space type disambiguates when the prefix alone is
                // ambiguous.
                let sym = self
                    .named_member(&prefix, &name, space)
                    .or_else(|_| self.named_member(&space_tpe, &name, space))?;
                self.r.assert_at(end, "qualified reference")?;
                if space == Space::Type {
                    Ok(type_ref(prefix, sym))
                } else {
                    Ok(single_type(prefix, sym))
                }
            }
            Tag::This => {
                let underlying = self.read_type(ctx)?;
                Ok(Type::This(underlying.type_symbol()))
            }
            Tag::RecThis => {
                let addr = self.r.read_addr()?;
                match self.u.type_at(addr) {
                    Some(Type::Rec(rec)) => Ok(Type::RecThis(rec)),
                    _ => Err(UnpickleError::format(format!(
                        "recursive self-reference at {start} points to {addr}, which is not a recursive type"
                    ))),
                }
            }
            Tag::SharedType => {
                let addr = self.r.read_addr()?;
                if let Some(t) = self.u.type_at(addr) {
                    return Ok(t);
                }
                let t = self.fork_at(addr).read_type(ctx)?;
                self.u.cache_type(addr, t.clone());
                Ok(t)
            }
            Tag::RecType => {
                let rec = RecType::new();
                self.u.cache_type(start, Type::Rec(Rc::clone(&rec)));
                let cls = self.env().symtab.new_refinement_class(ctx.owner());
                let body = self.read_type(&ctx.with_owner(cls))?;
                rec.set_body(body);
                Ok(Type::Rec(rec))
            }
            Tag::RefinedType => self.read_refined_type(ctx),
            Tag::AppliedType => {
                let end = self.r.read_end()?;
                let tycon = self.read_type(ctx)?;
                let mut args = Vec::new();
                while self.r.current_addr() < end {
                    args.push(self.read_type(ctx)?);
                }
                self.r.assert_at(end, "applied type")?;
                Ok(applied_type(tycon, args))
            }
            Tag::TypeBounds => {
                let end = self.r.read_end()?;
                let lo = self.read_type(ctx)?;
                let hi = if self.r.current_addr() < end {
                    self.read_type(ctx)?
                } else {
                    lo.clone()
                };
                // Trailing variance tags only matter to lambda pickling.
                while self.r.current_addr() < end {
                    self.skip_tree()?;
                }
                self.r.assert_at(end, "type bounds")?;
                Ok(Type::Bounds {
                    lo: Box::new(lo),
                    hi: Box::new(hi),
                })
            }
            Tag::AndType => {
                let end = self.r.read_end()?;
                let mut parts = Vec::new();
                while self.r.current_addr() < end {
                    parts.push(self.read_type(ctx)?);
                }
                self.r.assert_at(end, "intersection type")?;
                Ok(Type::Intersection(parts))
            }
            Tag::SuperType => {
                let end = self.r.read_end()?;
                let this = self.read_type(ctx)?;
                let parent = self.read_type(ctx)?;
                self.r.assert_at(end, "super type")?;
                Ok(Type::Super {
                    this: Box::new(this),
                    parent: Box::new(parent),
                })
            }
            Tag::AnnotatedType => {
                let end = self.r.read_end()?;
                let underlying = self.read_type(ctx)?;
                let annot = self.r.current_addr();
                self.skip_tree()?;
                self.r.assert_at(end, "annotated type")?;
                Ok(Type::Annotated {
                    underlying: Box::new(underlying),
                    annot,
                })
            }
            Tag::ByNameType => Ok(Type::ByName(Box::new(self.read_type(ctx)?))),
            Tag::PolyType => self.read_methodic(start, LambdaKind::Poly, ctx),
            Tag::TypeLambdaType => self.read_methodic(start, LambdaKind::TypeLambda, ctx),
            Tag::MethodType => {
                self.read_methodic(start, LambdaKind::Method(MethodKind::Plain), ctx)
            }
            Tag::ImplicitMethodType | Tag::GivenMethodType => {
                self.read_methodic(start, LambdaKind::Method(MethodKind::Implicit), ctx)
            }
            Tag::ParamType => {
                let end = self.r.read_end()?;
                let binder_addr = self.r.read_addr()?;
                let index = self.r.read_nat()? as usize;
                self.r.assert_at(end, "parameter reference")?;
                match self.u.type_at(binder_addr) {
                    Some(Type::Lambda(binder)) => Ok(Type::ParamRef { binder, index }),
                    _ => Err(UnpickleError::format(format!(
                        "parameter reference at {start} has no lambda binder at {binder_addr}"
                    ))),
                }
            }
            Tag::OrType => Err(UnpickleError::unsupported(
                "union type",
                ctx.location(&self.env().symtab),
            )),
            Tag::MatchType => Err(UnpickleError::unsupported(
                "match type",
                ctx.location(&self.env().symtab),
            )),
            Tag::UnitConst
            | Tag::FalseConst
            | Tag::TrueConst
            | Tag::NullConst
            | Tag::ByteConst
            | Tag::ShortConst
            | Tag::CharConst
            | Tag::IntConst
            | Tag::LongConst
            | Tag::FloatConst
            | Tag::DoubleConst
            | Tag::StringConst
            | Tag::ClassConst => {
                let c = self.read_constant_payload(tag, ctx)?;
                Ok(Type::Constant(c))
            }
            other => Err(UnpickleError::format(format!(
                "unexpected {other} in type position at {start}"
            ))),
        }
    }

    /// Common reader for poly, method and type-lambda binders: the binder
    /// is forward-declared before its result and parameter infos are read.
    fn read_methodic(&mut self, start: Addr, kind: LambdaKind, ctx: &Context) -> Result<Type> {
        let end = self.r.read_end()?;
        let lambda = LambdaType::new(kind);
        self.u.cache_type(start, Type::Lambda(Rc::clone(&lambda)));

        let res = self.read_type(ctx)?;
        let mut names = Vec::new();
        let mut infos = Vec::new();
        while self.r.current_addr() < end {
            let name = self.read_name()?;
            names.push(Rc::from(name.source_str()));
            infos.push(self.read_type(ctx)?);
        }
        self.r.assert_at(end, "lambda type")?;
        lambda.populate(names, infos, res);
        Ok(Type::Lambda(lambda))
    }

    /// `REFINEDtype`: reuse the refinement class of a refined parent (or
    /// of the enclosing context), otherwise open a fresh one; synthesize
    /// the declared member; nested refinements flatten into one scope.
    fn read_refined_type(&mut self, ctx: &Context) -> Result<Type> {
        let end = self.r.read_end()?;
        let name = self.read_name()?;
        let parent = self.read_type(ctx)?;

        let symtab = &self.u.env.symtab;
        let (cls, parents) = match &parent {
            Type::Refined {
                cls, parents, ..
            } => (*cls, parents.clone()),
            _ if symtab.kind(ctx.owner()) == SymbolKind::RefinementClass => {
                (ctx.owner(), vec![parent.clone()])
            }
            _ => (
                symtab.new_refinement_class(ctx.owner()),
                vec![parent.clone()],
            ),
        };
        let decls = symtab.decls(cls);

        let info = self.read_type(&ctx.with_owner(cls))?;
        let member = if name.is_type_name() || matches!(info, Type::Bounds { .. }) {
            let m = symtab.new_type_member(cls, Rc::clone(&name), HostFlags::DEFERRED);
            symtab.set_info(m, info);
            m
        } else if info.is_method_shaped() {
            let m = symtab.new_method(cls, Rc::clone(&name), HostFlags::DEFERRED);
            symtab.set_info(m, info);
            m
        } else {
            let m = symtab.new_value(
                cls,
                Rc::clone(&name),
                HostFlags::DEFERRED | HostFlags::STABLE,
            );
            symtab.set_info(m, info);
            m
        };
        decls.enter_if_new(symtab.ident(member), symtab.space(member), member);

        symtab.set_info(
            cls,
            Type::ClassInfo {
                parents: parents.clone(),
                decls: decls.clone(),
                cls,
            },
        );
        self.r.assert_at(end, "refined type")?;
        Ok(Type::Refined {
            parents,
            decls,
            cls,
        })
    }

    /// Member lookup on a prefix: try the source spelling first, then the
    /// host-escaped spelling.
    pub(crate) fn named_member(
        &self,
        prefix: &Type,
        name: &Rc<Name>,
        space: Space,
    ) -> Result<Symbol> {
        let symtab = &self.u.env.symtab;
        let head = prefix.type_symbol();
        if !head.exists() {
            return Err(UnpickleError::format(format!(
                "cannot select {} from a prefix without a symbol",
                name.debug_str()
            )));
        }
        let owner_cls = match symtab.kind(head) {
            SymbolKind::Module | SymbolKind::Package => symtab.module_class(head),
            _ => head,
        };
        // Completing the prefix populates its scope.
        symtab.info(owner_cls)?;

        let probe = match &**name {
            Name::Signed { qual, .. } => Rc::clone(qual),
            _ => Rc::clone(name),
        };
        let decls = symtab.decls(owner_cls);
        decls
            .lookup(&probe.source_str(), space)
            .or_else(|| decls.lookup(&probe.encoded_str(), space))
            .ok_or_else(|| {
                UnpickleError::format(format!(
                    "{} {} is not a member of {}",
                    match space {
                        Space::Term => "term",
                        Space::Type => "type",
                    },
                    probe.source_str(),
                    symtab.fqn(owner_cls)
                ))
            })
    }
}

pub(crate) fn type_ref(prefix: Type, sym: Symbol) -> Type {
    Type::TypeRef {
        prefix: Box::new(prefix),
        sym,
        args: Vec::new(),
    }
}

pub(crate) fn single_type(prefix: Type, sym: Symbol) -> Type {
    Type::SingleType {
        prefix: Box::new(prefix),
        sym,
    }
}
