//! Term and type-tree reading.
//!
//! Terms are materialized only where symbols need them: annotation
//! arguments, parent constructor applications, default-argument getters.
//! Unsupported constructs are refused with a typed error; the constructs
//! the format names but this reader gives no semantics yet are refused
//! with the reserved kind.

use std::rc::Rc;

use tastyr_core::error::{Result, UnpickleError};
use tastyr_core::names::Name;
use tastyr_core::tags::Tag;

use crate::context::Context;
use crate::host::symbols::{Space, Symbol};
use crate::host::trees::Tree;
use crate::host::types::{Constant, LambdaKind, LambdaType, Type, applied_type};

use super::TreeReader;

impl TreeReader<'_> {
    /// Read one term tree.
    pub(crate) fn read_term(&mut self, ctx: &Context) -> Result<Tree> {
        let start = self.r.current_addr();
        let tag = Tag::decode(self.r.next_byte()?, start)?;
        match tag {
            Tag::SharedTerm => {
                self.r.read_byte()?;
                let addr = self.r.read_addr()?;
                self.fork_at(addr).read_term(ctx)
            }
            Tag::Ident => {
                self.r.read_byte()?;
                let name = self.read_name()?;
                let tpe = self.read_type(ctx)?;
                Ok(Tree::Ident { name, tpe })
            }
            Tag::IdentTpt | Tag::SelectTpt | Tag::SingletonTpt => {
                Ok(Tree::TypeTree(self.read_tpt(ctx)?))
            }
            Tag::Select => {
                self.r.read_byte()?;
                let name = self.read_name()?;
                let qual = self.read_term(ctx)?;
                let sym = self.named_member(&qual.tpe(), &name, Space::Term)?;
                let tpe = Type::SingleType {
                    prefix: Box::new(qual.tpe()),
                    sym,
                };
                Ok(Tree::Select {
                    qual: Box::new(qual),
                    sym,
                    tpe,
                })
            }
            Tag::This => {
                self.r.read_byte()?;
                let underlying = self.read_type(ctx)?;
                Ok(Tree::This(Type::This(underlying.type_symbol())))
            }
            Tag::QualThis => {
                self.r.read_byte()?;
                let qual = self.read_tpt(ctx)?;
                Ok(Tree::This(Type::This(qual.type_symbol())))
            }
            Tag::New => {
                self.r.read_byte()?;
                let tpe = self.read_tpt(ctx)?;
                Ok(Tree::New(tpe))
            }
            Tag::Apply => {
                self.r.read_byte()?;
                let end = self.r.read_end()?;
                let fun = self.read_term(ctx)?;
                let mut args = Vec::new();
                while self.r.current_addr() < end {
                    args.push(self.read_term(ctx)?);
                }
                self.r.assert_at(end, "application")?;
                let tpe = fun.tpe().apply_result();
                Ok(Tree::Apply {
                    fun: Box::new(fun),
                    args,
                    tpe,
                })
            }
            Tag::TypeApply => {
                self.r.read_byte()?;
                let end = self.r.read_end()?;
                let fun = self.read_term(ctx)?;
                let mut args = Vec::new();
                while self.r.current_addr() < end {
                    args.push(self.read_tpt(ctx)?);
                }
                self.r.assert_at(end, "type application")?;
                let tpe = fun.tpe().apply_result();
                Ok(Tree::TypeApply {
                    fun: Box::new(fun),
                    args,
                    tpe,
                })
            }
            Tag::Typed => {
                self.r.read_byte()?;
                let end = self.r.read_end()?;
                let expr = self.read_term(ctx)?;
                let tpe = self.read_tpt(ctx)?;
                self.r.assert_at(end, "ascription")?;
                Ok(Tree::Typed {
                    expr: Box::new(expr),
                    tpe,
                })
            }
            Tag::NamedArg => {
                self.r.read_byte()?;
                let name = self.read_name()?;
                let arg = self.read_term(ctx)?;
                Ok(Tree::NamedArg {
                    name,
                    arg: Box::new(arg),
                })
            }
            Tag::Repeated => {
                self.r.read_byte()?;
                let end = self.r.read_end()?;
                let elem_tpe = self.read_tpt(ctx)?;
                let mut elems = Vec::new();
                while self.r.current_addr() < end {
                    elems.push(self.read_term(ctx)?);
                }
                self.r.assert_at(end, "repeated argument")?;
                Ok(Tree::Repeated { elem_tpe, elems })
            }
            Tag::Super => {
                self.r.read_byte()?;
                let end = self.r.read_end()?;
                let qual = self.read_term(ctx)?;
                let parent = if self.r.current_addr() < end {
                    self.read_tpt(ctx)?
                } else {
                    qual.tpe()
                };
                self.r.assert_at(end, "super reference")?;
                let tpe = Type::Super {
                    this: Box::new(qual.tpe()),
                    parent: Box::new(parent),
                };
                Ok(Tree::Super {
                    qual: Box::new(qual),
                    tpe,
                })
            }
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
                self.r.read_byte()?;
                let c = self.read_constant_payload(tag, ctx)?;
                Ok(Tree::Literal(c))
            }
            Tag::If => self.refuse("`if` expression", ctx),
            Tag::Match => self.refuse("`match` expression", ctx),
            Tag::Block => self.refuse("block expression", ctx),
            Tag::Hole => self.refuse("TASTy hole", ctx),
            Tag::Import => self.refuse("import in expression position", ctx),
            Tag::Package => self.refuse("package in expression position", ctx),
            Tag::Lambda => self.reserve("closure", ctx),
            Tag::Return => self.reserve("explicit return", ctx),
            Tag::Inlined => self.reserve("inlined call", ctx),
            Tag::SelectOuter => self.reserve("outer selection", ctx),
            Tag::MatchTpt => self.reserve("match type tree", ctx),
            other => self.refuse(&format!("{other} expression"), ctx),
        }
    }

    fn refuse(&self, construct: &str, ctx: &Context) -> Result<Tree> {
        Err(UnpickleError::unsupported(
            construct,
            ctx.location(&self.env().symtab),
        ))
    }

    fn reserve(&self, construct: &str, ctx: &Context) -> Result<Tree> {
        Err(UnpickleError::reserved(
            construct,
            ctx.location(&self.env().symtab),
        ))
    }

    /// Read a type-position tree to its type.
    pub(crate) fn read_tpt(&mut self, ctx: &Context) -> Result<Type> {
        let start = self.r.current_addr();
        let tag = Tag::decode(self.r.next_byte()?, start)?;
        match tag {
            Tag::IdentTpt => {
                // The ident is a label; the type is explicit.
                self.r.read_byte()?;
                let _name = self.read_name()?;
                self.read_type(ctx)
            }
            Tag::SelectTpt => {
                self.r.read_byte()?;
                let name = self.read_name()?;
                let qual = self.read_term(ctx)?;
                let sym = self.named_member(&qual.tpe(), &name, Space::Type)?;
                Ok(Type::TypeRef {
                    prefix: Box::new(qual.tpe()),
                    sym,
                    args: Vec::new(),
                })
            }
            Tag::SingletonTpt => {
                self.r.read_byte()?;
                let ref_tree = self.read_term(ctx)?;
                Ok(ref_tree.tpe())
            }
            Tag::RefinedTpt => self.read_refined_tpt(ctx),
            Tag::AppliedTpt => {
                self.r.read_byte()?;
                let end = self.r.read_end()?;
                let tycon = self.read_tpt(ctx)?;
                let mut args = Vec::new();
                while self.r.current_addr() < end {
                    args.push(self.read_tpt(ctx)?);
                }
                self.r.assert_at(end, "applied type tree")?;
                Ok(applied_type(tycon, args))
            }
            Tag::LambdaTpt => {
                self.r.read_byte()?;
                let end = self.r.read_end()?;
                let params = self.read_lambda_params(ctx)?;
                let body = self.read_tpt(ctx)?;
                self.r.assert_at(end, "type lambda tree")?;
                let symtab = &self.env().symtab;
                let lambda = LambdaType::new(LambdaKind::TypeLambda);
                let mut names = Vec::new();
                let mut infos = Vec::new();
                for p in &params {
                    names.push(symtab.ident(*p));
                    infos.push(symtab.info(*p)?);
                }
                lambda.populate(names, infos, body);
                Ok(Type::Lambda(lambda))
            }
            Tag::TypeBoundsTpt => {
                self.r.read_byte()?;
                let end = self.r.read_end()?;
                let lo = self.read_tpt(ctx)?;
                let hi = if self.r.current_addr() < end {
                    self.read_tpt(ctx)?
                } else {
                    lo.clone()
                };
                self.r.assert_at(end, "bounds tree")?;
                Ok(Type::Bounds {
                    lo: Box::new(lo),
                    hi: Box::new(hi),
                })
            }
            Tag::AnnotatedTpt => {
                self.r.read_byte()?;
                let end = self.r.read_end()?;
                let underlying = self.read_tpt(ctx)?;
                let annot = self.r.current_addr();
                self.skip_tree()?;
                self.r.assert_at(end, "annotated type tree")?;
                Ok(Type::Annotated {
                    underlying: Box::new(underlying),
                    annot,
                })
            }
            Tag::ByNameTpt => {
                self.r.read_byte()?;
                Ok(Type::ByName(Box::new(self.read_tpt(ctx)?)))
            }
            Tag::MatchTpt => Err(UnpickleError::reserved(
                "match type tree",
                ctx.location(&self.env().symtab),
            )),
            _ => self.read_type(ctx),
        }
    }

    /// Explicit type-parameter symbols of a type-lambda tree.
    fn read_lambda_params(&mut self, ctx: &Context) -> Result<Vec<Symbol>> {
        let lambda_ctx = ctx.with_new_scope(&self.env().symtab);
        let mut params = Vec::new();
        while self.next_tag_is(Tag::TypeParam)? {
            params.push(self.create_member_symbol(&lambda_ctx)?);
        }
        Ok(params)
    }

    /// `REFINEDtpt`: one parent, then structural members owned by a fresh
    /// refinement class registered at the tree's address.
    fn read_refined_tpt(&mut self, ctx: &Context) -> Result<Type> {
        let start = self.r.current_addr();
        self.r.read_byte()?;
        let end = self.r.read_end()?;
        let cls = self.env().symtab.new_refinement_class(ctx.owner());
        self.u.register_sym(start, cls);

        let parent = self.read_tpt(ctx)?;
        let inner = ctx.with_owner(cls);
        while self.r.current_addr() < end {
            self.create_member_symbol(&inner)?;
        }
        self.r.assert_at(end, "refinement tree")?;

        let symtab = &self.u.env.symtab;
        let decls = symtab.decls(cls);
        symtab.set_info(
            cls,
            Type::ClassInfo {
                parents: vec![parent.clone()],
                decls: decls.clone(),
                cls,
            },
        );
        Ok(Type::Refined {
            parents: vec![parent],
            decls,
            cls,
        })
    }

    /// Reduce a term-shaped parent to its type: applications collapse to
    /// their result, blocks to their tail expression, selections to the
    /// constructor's class.
    pub(crate) fn read_parent(&mut self, ctx: &Context) -> Result<Type> {
        let start = self.r.current_addr();
        let tag = Tag::decode(self.r.next_byte()?, start)?;
        match tag {
            Tag::SharedTerm => {
                self.r.read_byte()?;
                let addr = self.r.read_addr()?;
                self.fork_at(addr).read_parent(ctx)
            }
            Tag::Block => {
                self.r.read_byte()?;
                let end = self.r.read_end()?;
                let parent = self.read_parent(ctx)?;
                // Statements are discarded.
                self.r.goto(end);
                Ok(parent)
            }
            Tag::Apply => {
                self.r.read_byte()?;
                let end = self.r.read_end()?;
                let parent = self.read_parent(ctx)?;
                self.r.goto(end);
                Ok(parent)
            }
            Tag::TypeApply => {
                self.r.read_byte()?;
                let end = self.r.read_end()?;
                let tycon = self.read_parent(ctx)?;
                let mut args = Vec::new();
                while self.r.current_addr() < end {
                    args.push(self.read_tpt(ctx)?);
                }
                self.r.assert_at(end, "parent type application")?;
                Ok(applied_type(tycon, args))
            }
            Tag::Select => {
                self.r.read_byte()?;
                let name = self.read_name()?;
                if !name.stripped().is_constructor() {
                    return Err(UnpickleError::format(format!(
                        "parent at {start} is not a constructor application"
                    )));
                }
                self.read_parent(ctx)
            }
            Tag::New => {
                self.r.read_byte()?;
                self.read_tpt(ctx)
            }
            _ => self.read_tpt(ctx),
        }
    }

    /// Constant payload after the tag byte.
    pub(crate) fn read_constant_payload(&mut self, tag: Tag, ctx: &Context) -> Result<Constant> {
        Ok(match tag {
            Tag::UnitConst => Constant::Unit,
            Tag::FalseConst => Constant::Bool(false),
            Tag::TrueConst => Constant::Bool(true),
            Tag::NullConst => Constant::Null,
            Tag::ByteConst => Constant::Byte(self.r.read_int()? as i8),
            Tag::ShortConst => Constant::Short(self.r.read_int()? as i16),
            Tag::CharConst => {
                let code = self.r.read_nat()?;
                let c = char::from_u32(code).ok_or_else(|| {
                    UnpickleError::format(format!("invalid character constant {code:#x}"))
                })?;
                Constant::Char(c)
            }
            Tag::IntConst => Constant::Int(self.r.read_int()?),
            Tag::LongConst => Constant::Long(self.r.read_long_int()?),
            Tag::FloatConst => Constant::Float(f32::from_bits(self.r.read_int()? as u32)),
            Tag::DoubleConst => Constant::Double(f64::from_bits(self.r.read_long_int()? as u64)),
            Tag::StringConst => {
                let name = self.read_name()?;
                match &*name {
                    Name::Simple(text) => Constant::Str(Rc::clone(text)),
                    other => {
                        return Err(UnpickleError::format(format!(
                            "string constant must name a simple string, got {}",
                            other.debug_str()
                        )));
                    }
                }
            }
            Tag::ClassConst => Constant::Class(Box::new(self.read_type(ctx)?)),
            other => {
                return Err(UnpickleError::format(format!(
                    "{other} is not a constant tag"
                )));
            }
        })
    }

    /// The annotation term behind an `ANNOTATION` node.
    pub(crate) fn read_annotation(&mut self, ctx: &Context) -> Result<Tree> {
        let at = self.r.current_addr();
        let tag = Tag::decode(self.r.read_byte()?, at)?;
        if tag != Tag::Annotation {
            return Err(UnpickleError::format(format!(
                "expected an annotation at {at}, found {tag}"
            )));
        }
        let end = self.r.read_end()?;
        let _tycon = self.read_type(ctx)?;
        let tree = self.read_term(ctx)?;
        self.r.assert_at(end, "annotation")?;
        Ok(tree)
    }
}
