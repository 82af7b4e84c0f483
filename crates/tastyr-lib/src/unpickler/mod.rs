//! The tree/symbol unpickler.
//!
//! Two-pass, laziness-aware: an indexing pass creates symbol shells at
//! exact byte offsets without reading bodies, and each shell carries a
//! completer that re-reads its subtree on first info demand. Forward
//! references resolve through the owner-tree index; recursive types resolve
//! through the type-at-address cache.

mod modifiers;
mod trees;
mod types;

#[cfg(test)]
mod types_tests;

use std::cell::{OnceCell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use tastyr_core::bytes::{Addr, TastyReader};
use tastyr_core::error::{Result, UnpickleError};
use tastyr_core::flags::{HostFlags, TastyFlags};
use tastyr_core::names::{Name, NameRef, NameTable};
use tastyr_core::tags::{Tag, TagShape, shape_of};

use crate::context::{Context, Mode};
use crate::host::HostEnv;
use crate::host::Phase;
use crate::host::symbols::{Annotation, Completer, Space, Symbol, SymbolKind};
use crate::host::types::Type;
use crate::owner_tree::OwnerTree;

pub use modifiers::Modifiers;

#[derive(Clone, Copy)]
struct Roots {
    class_root: Symbol,
    module_root: Symbol,
}

/// One unpickling run over the `ASTs` section of an artifact.
pub struct Unpickler {
    env: Rc<HostEnv>,
    names: NameTable,
    sect: TastyReader,
    source: Rc<str>,
    roots: RefCell<Option<Roots>>,
    sym_at_addr: RefCell<HashMap<Addr, Symbol>>,
    cycle_at_addr: RefCell<HashSet<Addr>>,
    type_at_addr: RefCell<HashMap<Addr, Type>>,
    owner_tree: OnceCell<OwnerTree>,
}

impl Unpickler {
    pub fn new(
        env: Rc<HostEnv>,
        names: NameTable,
        asts: TastyReader,
        source: impl Into<Rc<str>>,
    ) -> Rc<Unpickler> {
        Rc::new(Unpickler {
            env,
            names,
            sect: asts,
            source: source.into(),
            roots: RefCell::new(None),
            sym_at_addr: RefCell::new(HashMap::new()),
            cycle_at_addr: RefCell::new(HashSet::new()),
            type_at_addr: RefCell::new(HashMap::new()),
            owner_tree: OnceCell::new(),
        })
    }

    pub fn env(&self) -> &Rc<HostEnv> {
        &self.env
    }

    /// Index the top-level statements, creating shells for the roots and
    /// their siblings. Bodies stay unread until demanded.
    pub fn enter_top_level(
        self: &Rc<Self>,
        class_root: Symbol,
        module_root: Symbol,
    ) -> Result<()> {
        *self.roots.borrow_mut() = Some(Roots {
            class_root,
            module_root,
        });
        self.owner_tree()?;

        let mut reader = self.reader_at(Addr(0));
        if reader.r.is_at_end() {
            return Ok(());
        }
        let first = reader.r.next_byte()?;
        if matches!(Tag::from_u8(first), Some(Tag::Package | Tag::Import)) {
            let owner = self
                .env
                .symtab
                .module_class(self.env.mirror.empty_package());
            let ctx = Context::new(owner, Rc::clone(&self.source)).add_mode(Mode::INDEXING);
            let end = reader.r.end_addr();
            reader.index_stats(end, &ctx)?;
        }
        Ok(())
    }

    /// Force a symbol's info, reporting a recoverable refusal to the host
    /// instead of propagating it. Returns whether the info resolved cleanly.
    pub fn try_complete(&self, sym: Symbol) -> Result<bool> {
        match self.env.symtab.info(sym) {
            Ok(tpe) => Ok(!tpe.is_error()),
            Err(err) if err.is_recoverable() => {
                self.env.reporter.error(err.to_string());
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Whether all started completions finished. Used by invariants.
    pub fn cycle_guard_is_clear(&self) -> bool {
        self.cycle_at_addr.borrow().is_empty()
    }

    pub fn symbol_at_addr(&self, addr: Addr) -> Option<Symbol> {
        self.sym_at_addr.borrow().get(&addr).copied()
    }

    pub(crate) fn type_at(&self, addr: Addr) -> Option<Type> {
        self.type_at_addr.borrow().get(&addr).cloned()
    }

    pub(crate) fn cache_type(&self, addr: Addr, tpe: Type) {
        self.type_at_addr.borrow_mut().insert(addr, tpe);
    }

    /// The annotation term behind a deferred annotation thunk.
    pub fn annotation_tree(
        self: &Rc<Self>,
        owner: Symbol,
        annot: Annotation,
    ) -> Result<crate::host::trees::Tree> {
        let ctx = Context::new(owner, Rc::clone(&self.source)).add_mode(Mode::READ_ANNOTATION);
        let mut reader = self.reader_at(annot.tree_addr);
        reader.read_annotation(&ctx).map_err(|e| e.inside_annotation())
    }

    fn debug(&self, msg: impl FnOnce() -> String) {
        if self.env.settings.debug_tasty {
            self.env.reporter.echo(msg());
        }
    }

    fn owner_tree(&self) -> Result<&OwnerTree> {
        if self.owner_tree.get().is_none() {
            let _ = self.owner_tree.set(OwnerTree::root(self.sect.fork_at(Addr(0))));
        }
        Ok(self.owner_tree.get().expect("owner tree just built"))
    }

    fn reader_at(self: &Rc<Self>, addr: Addr) -> TreeReader<'_> {
        TreeReader {
            u: self,
            r: self.sect.fork_at(addr),
        }
    }

    fn register_sym(&self, addr: Addr, sym: Symbol) {
        self.debug(|| {
            format!(
                "registered {} at {addr}",
                self.env.symtab.location_of(sym)
            )
        });
        self.sym_at_addr.borrow_mut().insert(addr, sym);
    }

    /// The symbol at `addr`, created on demand with the owner found
    /// through the owner-tree index. Public face of forward-reference
    /// resolution.
    pub fn force_symbol_at(self: &Rc<Self>, addr: Addr) -> Result<Symbol> {
        self.symbol_at(addr)
    }

    /// The symbol at `addr`, creating it on demand with the owner found
    /// through the owner-tree index.
    fn symbol_at(self: &Rc<Self>, addr: Addr) -> Result<Symbol> {
        if let Some(sym) = self.symbol_at_addr(addr) {
            return Ok(sym);
        }
        let resolve =
            |node_addr: Addr, outer: Symbol| self.symbol_at_with_owner(node_addr, outer);
        let owner = self.owner_tree()?.find_owner(addr, &resolve)?;
        self.symbol_at_with_owner(addr, owner)
    }

    fn symbol_at_with_owner(self: &Rc<Self>, addr: Addr, owner: Symbol) -> Result<Symbol> {
        if let Some(sym) = self.symbol_at_addr(addr) {
            return Ok(sym);
        }
        if !owner.exists() {
            return Err(UnpickleError::format(format!(
                "forward reference to {addr} has no resolvable owner"
            )));
        }
        let mut reader = self.reader_at(addr);
        let byte = reader.r.next_byte()?;
        match Tag::from_u8(byte) {
            Some(Tag::Template) => {
                let dummy = self.env.symtab.new_local_dummy(owner);
                self.register_sym(addr, dummy);
                Ok(dummy)
            }
            Some(tag) if tag.is_member_def() => {
                let ctx = Context::new(owner, Rc::clone(&self.source));
                reader.create_member_symbol(&ctx)
            }
            _ => Err(UnpickleError::format(format!(
                "address {addr} does not hold a definition"
            ))),
        }
    }

    /// Completion body, guarded by the cycle map.
    fn complete_at(
        self: &Rc<Self>,
        addr: Addr,
        sym: Symbol,
        completer: &TastyCompleter,
    ) -> Result<()> {
        if !self.cycle_at_addr.borrow_mut().insert(addr) {
            let location = self.env.symtab.location_of(sym);
            self.env.symtab.set_info(sym, Type::Error);
            return Err(UnpickleError::cyclic(location));
        }
        let result = self
            .reader_at(addr)
            .read_new_member(sym, completer);
        match result {
            Ok(()) => {
                self.cycle_at_addr.borrow_mut().remove(&addr);
                Ok(())
            }
            Err(err) => {
                self.env.symtab.set_info(sym, Type::Error);
                Err(err)
            }
        }
    }
}

/// Completer state for one lazily created symbol.
struct TastyCompleter {
    unpickler: Weak<Unpickler>,
    addr: Addr,
    tasty_flags: TastyFlags,
    ctx: Context,
}

impl Completer for TastyCompleter {
    fn complete(&self, sym: Symbol) -> Result<()> {
        let u = self
            .unpickler
            .upgrade()
            .ok_or_else(|| UnpickleError::format("unpickler dropped before completion"))?;
        u.complete_at(self.addr, sym, self)
    }
}

/// A cursor plus the unpickler it reads for.
pub(crate) struct TreeReader<'u> {
    pub(crate) u: &'u Rc<Unpickler>,
    pub(crate) r: TastyReader,
}

impl<'u> TreeReader<'u> {
    pub(crate) fn env(&self) -> &HostEnv {
        &self.u.env
    }

    /// Owned handle, for use across `&mut self` reads.
    pub(crate) fn env_rc(&self) -> Rc<HostEnv> {
        Rc::clone(&self.u.env)
    }

    pub(crate) fn fork_at(&self, addr: Addr) -> TreeReader<'u> {
        TreeReader {
            u: self.u,
            r: self.r.fork_at(addr),
        }
    }

    fn fork(&self) -> TreeReader<'u> {
        TreeReader {
            u: self.u,
            r: self.r.fork(),
        }
    }

    pub(crate) fn read_name(&mut self) -> Result<Rc<Name>> {
        let r = NameRef(self.r.read_nat()?);
        Ok(Rc::clone(self.u.names.resolve(r)?))
    }

    /// Skip one subtree without interpreting it.
    pub(crate) fn skip_tree(&mut self) -> Result<()> {
        let byte = self.r.read_byte()?;
        match shape_of(byte) {
            TagShape::Leaf => Ok(()),
            TagShape::Nat => self.r.read_nat().map(|_| ()),
            TagShape::Ast => self.skip_tree(),
            TagShape::NatAst => {
                self.r.read_nat()?;
                self.skip_tree()
            }
            TagShape::Lengthed => {
                let end = self.r.read_end()?;
                self.r.goto(end);
                Ok(())
            }
        }
    }

    fn skip_params(&mut self) -> Result<()> {
        while !self.r.is_at_end() {
            match Tag::from_u8(self.r.next_byte()?) {
                Some(Tag::TypeParam | Tag::Param | Tag::EmptyClause | Tag::SplitClause) => {
                    self.skip_tree()?;
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// The next tag, following shared-tree indirections.
    pub(crate) fn next_unshared_tag(&self) -> Result<Option<Tag>> {
        let mut fork = self.r.fork();
        loop {
            let byte = fork.next_byte()?;
            match Tag::from_u8(byte) {
                Some(Tag::SharedType | Tag::SharedTerm) => {
                    fork.read_byte()?;
                    let addr = fork.read_addr()?;
                    fork.goto(addr);
                }
                other => return Ok(other),
            }
        }
    }

    fn next_tag_is(&self, tag: Tag) -> Result<bool> {
        if self.r.is_at_end() {
            return Ok(false);
        }
        Ok(self.r.next_byte()? == tag as u8)
    }

    // ------------------------------------------------------------------
    // Indexing pass
    // ------------------------------------------------------------------

    /// Create symbol shells for every definition up to `end`, descending
    /// into packages. Bodies are skipped.
    pub(crate) fn index_stats(&mut self, end: Addr, ctx: &Context) -> Result<()> {
        while self.r.current_addr() < end {
            match Tag::from_u8(self.r.next_byte()?) {
                Some(tag) if tag.is_member_def() => {
                    self.create_member_symbol(ctx)?;
                }
                Some(Tag::Package) => {
                    self.r.read_byte()?;
                    let pkg_end = self.r.read_end()?;
                    let pkg = self.read_package_ref()?;
                    let pkg_class = self.env().symtab.module_class(pkg);
                    let mut inner = ctx.with_owner(pkg_class);
                    inner = inner.add_mode(Mode::INDEXING);
                    self.index_stats(pkg_end, &inner)?;
                }
                _ => self.skip_tree()?,
            }
        }
        self.r.assert_at(end, "statement index")
    }

    fn read_package_ref(&mut self) -> Result<Symbol> {
        let at = self.r.current_addr();
        let tag = Tag::decode(self.r.read_byte()?, at)?;
        if tag != Tag::TermRefPkg {
            return Err(UnpickleError::format(format!(
                "expected a package reference at {at}, found {tag}"
            )));
        }
        let name = self.read_name()?;
        Ok(self
            .env()
            .mirror
            .get_or_create_package(&self.env().symtab, &name))
    }

    // ------------------------------------------------------------------
    // Symbol creation
    // ------------------------------------------------------------------

    /// Read a definition header, create (or adopt) its symbol shell, and
    /// leave the cursor at the end of the definition.
    pub(crate) fn create_member_symbol(&mut self, ctx: &Context) -> Result<Symbol> {
        let start = self.r.current_addr();
        let tag = Tag::decode(self.r.read_byte()?, start)?;
        let end = self.r.read_end()?;
        let name = self.read_name()?;

        // Survey the body without interpreting it.
        self.skip_params()?;
        let info_tag = self.next_unshared_tag()?;
        let is_class = info_tag == Some(Tag::Template);
        let is_abs_type = self.is_abstract_type(info_tag)?;
        let tpt_start = self.r.current_addr();
        self.skip_tree()?;
        let rhs_is_empty = self.r.current_addr() == end
            || Tag::from_u8(self.r.next_byte()?).is_some_and(|t| t.is_modifier());
        if !rhs_is_empty {
            self.skip_tree()?;
        }
        let mods = self.read_modifiers(end, ctx)?;
        self.r.assert_at(end, "definition")?;

        let flags = modifiers::normalize_flags(
            self.env(),
            tag,
            mods.host,
            &name,
            is_abs_type,
            rhs_is_empty,
            ctx,
        );

        let symtab = &self.env().symtab;
        let owner = ctx.owner();

        // Constructor type parameters reuse the class's.
        if tag == Tag::TypeParam && symtab.is_constructor(owner) {
            let cls = symtab.owner(owner);
            let wanted = name.to_type_name().encoded_str();
            let existing = symtab
                .type_params(cls)
                .into_iter()
                .find(|p| *symtab.ident(*p) == *wanted)
                .ok_or_else(|| {
                    UnpickleError::format(format!(
                        "constructor type parameter {wanted} not found on {}",
                        symtab.location_of(cls)
                    ))
                })?;
            self.u.register_sym(start, existing);
            return Ok(existing);
        }

        let adopted_root = self.match_root(tag, &name, flags, ctx);
        let sym = if let Some(root) = adopted_root {
            symtab.add_flags(root, flags);
            root
        } else if tag == Tag::TypeDef && flags.contains(HostFlags::MODULE) {
            // The module class reaches us through the module's linkage.
            let term = name.to_term_name().encoded_str();
            let module_val = symtab
                .decls(owner)
                .lookup(&term, Space::Term)
                .ok_or_else(|| {
                    UnpickleError::format(format!(
                        "module class {term} has no source module in {}",
                        symtab.location_of(owner)
                    ))
                })?;
            let cls = symtab.module_class(module_val);
            symtab.add_flags(cls, flags);
            cls
        } else if is_class {
            let class_flags = if flags.contains(HostFlags::TRAIT) {
                flags | HostFlags::ABSTRACT
            } else {
                flags
            };
            symtab.new_class(owner, Rc::clone(&name), class_flags)
        } else {
            match tag {
                Tag::TypeParam => symtab.new_type_param(owner, Rc::clone(&name), flags),
                Tag::Param => symtab.new_value_param(owner, Rc::clone(&name), flags),
                Tag::ValDef if flags.contains(HostFlags::MODULE) => {
                    let (val, _cls) = symtab.new_module(
                        owner,
                        Rc::clone(&name),
                        flags,
                        HostFlags::MODULE | HostFlags::FINAL,
                    );
                    val
                }
                Tag::ValDef => symtab.new_value(owner, Rc::clone(&name), flags),
                Tag::DefDef if name.is_constructor() => symtab.new_constructor(owner, flags),
                Tag::DefDef => symtab.new_method(owner, Rc::clone(&name), flags),
                Tag::TypeDef => symtab.new_type_member(owner, Rc::clone(&name), flags),
                other => {
                    return Err(UnpickleError::format(format!(
                        "tag {other} cannot introduce a member symbol"
                    )));
                }
            }
        };

        if mods.private_within.exists() {
            symtab.set_private_within(sym, mods.private_within);
        }
        if !mods.annotations.is_empty() {
            symtab.add_annotations(sym, mods.annotations.iter().copied());
        }

        let completer = TastyCompleter {
            unpickler: Rc::downgrade(self.u),
            addr: start,
            tasty_flags: mods.tasty,
            ctx: ctx.clone(),
        };
        symtab.set_completer(sym, Rc::new(completer));
        self.u.register_sym(start, sym);

        let kind = symtab.kind(sym);
        if kind != SymbolKind::ModuleClass && tag != Tag::TypeParam {
            symtab
                .decls(owner)
                .enter_if_new(symtab.ident(sym), symtab.space(sym), sym);
        }
        if tag == Tag::ValDef && flags.contains(HostFlags::MODULE) {
            // The companion pair is visible under both namespaces.
            let cls = symtab.module_class(sym);
            symtab
                .decls(owner)
                .enter_if_new(symtab.ident(cls), Space::Type, cls);
        }

        if is_class {
            self.fork_at(tpt_start)
                .index_template_params(sym, &ctx.with_owner(sym))?;
        }

        self.u.debug(|| {
            format!(
                "created shell for {} ({start}..{end})",
                symtab.location_of(sym)
            )
        });
        Ok(sym)
    }

    /// An abstract type is bounded, directly or under a type lambda.
    fn is_abstract_type(&self, info_tag: Option<Tag>) -> Result<bool> {
        match info_tag {
            Some(Tag::TypeBounds | Tag::TypeBoundsTpt) => Ok(true),
            Some(Tag::LambdaTpt) => {
                let mut fork = self.fork();
                fork.r.read_byte()?;
                fork.r.read_end()?;
                fork.skip_params()?;
                Ok(matches!(
                    fork.next_unshared_tag()?,
                    Some(Tag::TypeBounds | Tag::TypeBoundsTpt)
                ))
            }
            _ => Ok(false),
        }
    }

    fn match_root(
        &self,
        tag: Tag,
        name: &Rc<Name>,
        flags: HostFlags,
        ctx: &Context,
    ) -> Option<Symbol> {
        let roots = (*self.u.roots.borrow())?;
        let symtab = &self.env().symtab;
        if symtab.owner(roots.class_root) != ctx.owner() {
            return None;
        }
        let ident = name.stripped().source_str();
        let is_module = flags.contains(HostFlags::MODULE);
        match tag {
            Tag::TypeDef if !is_module && *symtab.ident(roots.class_root) == *ident => {
                Some(roots.class_root)
            }
            Tag::TypeDef if is_module && *symtab.ident(roots.module_root) == *ident => {
                Some(symtab.module_class(roots.module_root))
            }
            Tag::ValDef if is_module && *symtab.ident(roots.module_root) == *ident => {
                Some(roots.module_root)
            }
            _ => None,
        }
    }

    /// Create shells for a class's template parameters so they exist
    /// before the class completes. The cursor must be at the template.
    fn index_template_params(&mut self, cls: Symbol, ctx: &Context) -> Result<()> {
        let at = self.r.current_addr();
        let tag = Tag::decode(self.r.read_byte()?, at)?;
        if tag != Tag::Template {
            return Err(UnpickleError::format(format!(
                "class body at {at} is not a template"
            )));
        }
        self.r.read_end()?;
        let mut tparams = Vec::new();
        while self.next_tag_is(Tag::TypeParam)? {
            tparams.push(self.create_member_symbol(ctx)?);
        }
        while self.next_tag_is(Tag::Param)? {
            self.create_member_symbol(ctx)?;
        }
        self.env().symtab.set_type_params(cls, tparams);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------

    /// Read the body of a previously indexed definition and assign the
    /// symbol's info. The cursor must be at the definition start.
    fn read_new_member(&mut self, sym: Symbol, completer: &TastyCompleter) -> Result<()> {
        let start = self.r.current_addr();
        let tag = Tag::decode(self.r.read_byte()?, start)?;
        let end = self.r.read_end()?;
        let _name = self.read_name()?;
        let info_tag = self.next_unshared_tag()?;

        let ctx = &completer.ctx;
        let local = ctx.with_owner(sym);
        let env = self.env_rc();
        let symtab = &env.symtab;

        modifiers::check_tasty_flags(&env, tag, sym, completer.tasty_flags)?;

        match tag {
            Tag::DefDef => {
                let tparams = self.read_indexed_params(Tag::TypeParam, &local)?;
                let vparam_lists = self.read_param_clauses(&local)?;
                let result_tpt = self.read_tpt(&local)?;

                let is_ctor = symtab.is_constructor(sym);
                let result = if is_ctor {
                    let cls = ctx.owner();
                    let args: Vec<Type> = symtab
                        .type_params(cls)
                        .into_iter()
                        .map(|p| Type::TypeRef {
                            prefix: Box::new(Type::NoPrefix),
                            sym: p,
                            args: Vec::new(),
                        })
                        .collect();
                    Type::TypeRef {
                        prefix: Box::new(Type::NoPrefix),
                        sym: cls,
                        args,
                    }
                } else {
                    result_tpt
                };

                let mut info = if vparam_lists.is_empty() {
                    Type::NullaryMethod(Box::new(result))
                } else {
                    let mut acc = result;
                    for params in vparam_lists.iter().rev() {
                        acc = Type::Method {
                            params: params.clone(),
                            result: Box::new(acc),
                        };
                    }
                    acc
                };
                // A constructor whose first parameter list is implicit gets
                // an empty leading list.
                if is_ctor {
                    if let Some(first) = vparam_lists.first().and_then(|l| l.first()) {
                        if symtab.flags(*first).contains(HostFlags::IMPLICIT) {
                            info = Type::Method {
                                params: Vec::new(),
                                result: Box::new(info),
                            };
                        }
                    }
                }
                if !tparams.is_empty() {
                    info = Type::Poly {
                        params: tparams,
                        result: Box::new(info),
                    };
                }
                symtab.set_info(sym, info);
            }
            Tag::ValDef => {
                let tpe = self.read_tpt(&local)?;
                if completer.tasty_flags.contains(TastyFlags::INLINE) {
                    self.check_inline_rhs(sym, end)?;
                }
                let info = if completer.tasty_flags.contains(TastyFlags::ENUM) {
                    Type::Constant(crate::host::types::Constant::Enum(sym))
                } else if symtab.flags(sym).contains(HostFlags::METHOD) {
                    Type::NullaryMethod(Box::new(tpe))
                } else {
                    tpe
                };
                symtab.set_info(sym, info);
            }
            Tag::TypeDef if info_tag == Some(Tag::Template) => {
                self.read_template(sym, ctx, end)?;
            }
            Tag::TypeDef | Tag::TypeParam => {
                let rhs = self.read_tpt(&local)?;
                let info = match rhs {
                    Type::Bounds { lo, hi } if lo == hi => *lo,
                    Type::Bounds { lo, hi } => {
                        check_poly_bounds(&env, sym, &lo, &hi)?;
                        Type::Bounds { lo, hi }
                    }
                    alias => alias,
                };
                symtab.set_info(sym, info);
            }
            Tag::Param => {
                let tpe = self.read_tpt(&local)?;
                let rhs_is_empty = self.r.current_addr() == end
                    || Tag::from_u8(self.r.next_byte()?).is_some_and(|t| t.is_modifier());
                let info = if rhs_is_empty
                    && !symtab.flags(sym).contains(HostFlags::PARAM_ACCESSOR)
                {
                    tpe
                } else {
                    Type::NullaryMethod(Box::new(tpe))
                };
                symtab.set_info(sym, info);
            }
            other => {
                return Err(UnpickleError::format(format!(
                    "cannot complete a {other} definition"
                )));
            }
        }

        self.u.debug(|| {
            format!("completed {}", self.env().symtab.location_of(sym))
        });
        Ok(())
    }

    /// Inline values must pickle a literal right-hand side.
    fn check_inline_rhs(&self, sym: Symbol, end: Addr) -> Result<()> {
        let at = self.r.current_addr();
        let is_const = at < end
            && matches!(
                Tag::from_u8(self.r.next_byte()?),
                Some(
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
                )
            );
        if is_const {
            Ok(())
        } else {
            Err(UnpickleError::unsupported(
                "inline value with a non-constant right-hand side",
                self.env().symtab.location_of(sym),
            ))
        }
    }

    /// Collect already-indexed parameter symbols of one kind, completing
    /// each, advancing over their definitions.
    fn read_indexed_params(&mut self, kind: Tag, ctx: &Context) -> Result<Vec<Symbol>> {
        let mut params = Vec::new();
        while self.next_tag_is(kind)? {
            let addr = self.r.current_addr();
            let sym = match self.u.symbol_at_addr(addr) {
                Some(sym) => {
                    self.skip_tree()?;
                    sym
                }
                None => self.create_member_symbol(ctx)?,
            };
            self.env().symtab.info(sym)?;
            params.push(sym);
        }
        Ok(params)
    }

    /// Zero or more value-parameter clauses, with explicit empty-clause and
    /// clause-split sentinels.
    fn read_param_clauses(&mut self, ctx: &Context) -> Result<Vec<Vec<Symbol>>> {
        let mut clauses: Vec<Vec<Symbol>> = Vec::new();
        let mut current: Vec<Symbol> = Vec::new();
        let mut any = false;
        loop {
            if self.next_tag_is(Tag::Param)? {
                any = true;
                current.extend(self.read_indexed_params(Tag::Param, ctx)?);
            } else if self.next_tag_is(Tag::EmptyClause)? {
                self.r.read_byte()?;
                any = true;
                clauses.push(Vec::new());
            } else if self.next_tag_is(Tag::SplitClause)? {
                self.r.read_byte()?;
                clauses.push(std::mem::take(&mut current));
            } else {
                break;
            }
        }
        if !current.is_empty() {
            clauses.push(current);
        } else if any && clauses.is_empty() {
            clauses.push(Vec::new());
        }
        Ok(clauses)
    }

    // ------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------

    /// Read a class template: indexed parameters, parents, optional self
    /// type; members stay behind their completers. The cursor must be at
    /// the template, and `end` is the enclosing type-def's end.
    fn read_template(&mut self, cls: Symbol, ctx: &Context, end: Addr) -> Result<()> {
        let env = self.env_rc();
        let symtab = &env.symtab;
        let template_start = self.r.current_addr();
        let at = template_start;
        let tag = Tag::decode(self.r.read_byte()?, at)?;
        if tag != Tag::Template {
            return Err(UnpickleError::format(format!(
                "class body at {at} is not a template"
            )));
        }
        let template_end = self.r.read_end()?;
        if self.u.symbol_at_addr(template_start).is_none() {
            let dummy = symtab.new_local_dummy(cls);
            self.u.register_sym(template_start, dummy);
        }

        let local = ctx.with_owner(cls);
        let decls = symtab.decls(cls);

        // Interim info so members completing early see a class shape.
        if symtab.kind(cls) == SymbolKind::ModuleClass {
            let module = symtab.source_module(cls);
            let prefix = if symtab.is_class_like(symtab.owner(cls)) {
                Type::This(symtab.owner(cls))
            } else {
                Type::NoPrefix
            };
            symtab.set_self_type(
                cls,
                Type::SingleType {
                    prefix: Box::new(prefix),
                    sym: module,
                },
            );
        }
        symtab.set_info(
            cls,
            Type::ClassInfo {
                parents: Vec::new(),
                decls: decls.clone(),
                cls,
            },
        );

        let tparams = self.read_indexed_params(Tag::TypeParam, &local)?;
        // Value parameters are discarded; they live on the primary
        // constructor.
        self.read_indexed_params(Tag::Param, &local)?;
        if !tparams.is_empty() {
            symtab.set_type_params(cls, tparams.clone());
        }

        // Index every member def before parents are read, so forward
        // references inside parents resolve.
        {
            let mut indexer = self.fork();
            while indexer.r.current_addr() < template_end
                && !indexer.next_tag_is(Tag::DefDef)?
            {
                indexer.skip_tree()?;
            }
            indexer.index_stats(template_end, &local)?;
        }

        let parents = self.read_parents(&local, template_end)?;
        let object_class = env.mirror.object_class();
        let parents: Vec<Type> = parents
            .into_iter()
            .map(|p| {
                if p.type_symbol() == object_class {
                    env.mirror.any_ref_type()
                } else {
                    p
                }
            })
            .collect();

        if parents
            .first()
            .is_some_and(|p| p.type_symbol() == env.mirror.any_val_class())
        {
            self.make_value_class(cls, &local)?;
        }

        if self.r.current_addr() < template_end && self.next_tag_is(Tag::SelfDef)? {
            self.r.read_byte()?;
            let _name = self.read_name()?;
            let self_tpe = self.read_tpt(&local)?;
            symtab.set_self_type(cls, self_tpe);
        }

        // Member bodies complete lazily.
        self.r.goto(template_end);

        let class_info = Type::ClassInfo {
            parents,
            decls,
            cls,
        };
        let info = if tparams.is_empty() {
            class_info
        } else {
            Type::Poly {
                params: tparams,
                result: Box::new(class_info),
            }
        };
        symtab.set_info(cls, info);
        self.r.goto(end);
        Ok(())
    }

    fn read_parents(&mut self, ctx: &Context, template_end: Addr) -> Result<Vec<Type>> {
        let pctx = ctx.add_mode(Mode::READ_PARENTS);
        let mut parents = Vec::new();
        while self.r.current_addr() < template_end {
            match Tag::from_u8(self.r.next_byte()?) {
                Some(Tag::SelfDef | Tag::DefDef) => break,
                Some(Tag::Apply | Tag::TypeApply | Tag::Block | Tag::New | Tag::Select) => {
                    parents.push(self.read_parent(&pctx)?);
                }
                _ => parents.push(self.read_tpt(&pctx)?),
            }
        }
        Ok(parents)
    }

    /// Value-class lowering: open up the constructor and accessors, then
    /// give every method a companion-owned extension twin.
    fn make_value_class(&mut self, cls: Symbol, ctx: &Context) -> Result<()> {
        let env = Rc::clone(&self.u.env);
        let symtab = &env.symtab;
        let decls = symtab.decls(cls);

        let companion_class = {
            let owner = symtab.owner(cls);
            let ident = symtab.ident(cls);
            symtab
                .decls(owner)
                .lookup(&ident, Space::Term)
                .map(|module| symtab.module_class(module))
        };

        env.entering_phase_not_later_than(Phase::ExtensionMethods, || -> Result<()> {
            for member in decls.elems() {
                if symtab.is_constructor(member)
                    || symtab.flags(member).contains(HostFlags::PARAM_ACCESSOR)
                {
                    symtab.remove_flags(member, HostFlags::PRIVATE | HostFlags::LOCAL);
                }
            }
            let Some(companion) = companion_class else {
                return Ok(());
            };
            for member in decls.elems() {
                if symtab.kind(member) != SymbolKind::Method
                    || symtab.is_constructor(member)
                {
                    continue;
                }
                let info = symtab.info(member)?;
                let ext_name = Name::simple(format!(
                    "{}$extension",
                    symtab.name(member).source_str()
                ));
                let ext = symtab.new_method(
                    companion,
                    ext_name,
                    HostFlags::FINAL | HostFlags::METHOD,
                );
                let ext_info = env.extension_meth_info(cls, ext, &info);
                symtab.set_info(ext, ext_info);
                symtab
                    .decls(companion)
                    .enter_if_new(symtab.ident(ext), Space::Term, ext);
            }
            Ok(())
        })?;
        self.u.debug(|| {
            format!("value class {}", symtab.location_of(cls))
        });
        Ok(())
    }
}

/// Both bounds being type lambdas of different arity cannot be represented
/// on the host side.
fn check_poly_bounds(env: &HostEnv, sym: Symbol, lo: &Type, hi: &Type) -> Result<()> {
    if let (Type::Lambda(l), Type::Lambda(h)) = (lo, hi) {
        if l.arity() != h.arity() {
            return Err(UnpickleError::unsupported(
                "higher-kinded bounds of diverging arities",
                env.symtab.location_of(sym),
            ));
        }
    }
    Ok(())
}
