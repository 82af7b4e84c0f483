//! Modifier tail reading and flag translation.
//!
//! Modifier tags toggle one bit each, with three exceptions: `ABSTRACT
//! OVERRIDE` collapses to the abstract-override bit, qualified access
//! modifiers consume a trailing type naming the access boundary, and
//! annotations become lazy thunks. Normalization afterwards derives the
//! host bits the wire leaves implicit.

use tastyr_core::bytes::Addr;
use tastyr_core::error::{Result, UnpickleError};
use tastyr_core::flags::{HostFlags, TastyFlags};
use tastyr_core::names::Name;
use tastyr_core::tags::Tag;

use crate::context::Context;
use crate::host::HostEnv;
use crate::host::symbols::{Annotation, Symbol};

use super::TreeReader;

/// Everything a modifier tail carries.
#[derive(Debug)]
pub struct Modifiers {
    pub host: HostFlags,
    pub tasty: TastyFlags,
    pub annotations: Vec<Annotation>,
    pub private_within: Symbol,
}

impl Default for Modifiers {
    fn default() -> Self {
        Modifiers {
            host: HostFlags::empty(),
            tasty: TastyFlags::empty(),
            annotations: Vec::new(),
            private_within: Symbol::NONE,
        }
    }
}

impl TreeReader<'_> {
    /// Read modifier tags up to `end`.
    pub(crate) fn read_modifiers(&mut self, end: Addr, ctx: &Context) -> Result<Modifiers> {
        let mut mods = Modifiers::default();
        while self.r.current_addr() < end {
            let at = self.r.current_addr();
            let tag = Tag::decode(self.r.next_byte()?, at)?;
            if !tag.is_modifier() {
                return Err(UnpickleError::format(format!(
                    "expected a modifier at {at}, found {tag}"
                )));
            }
            self.r.read_byte()?;
            match tag {
                Tag::Private => mods.host |= HostFlags::PRIVATE,
                Tag::Protected => mods.host |= HostFlags::PROTECTED,
                Tag::Abstract => {
                    // ABSTRACT OVERRIDE is one combined bit.
                    if self.r.current_addr() < end
                        && self.r.next_byte()? == Tag::Override as u8
                    {
                        self.r.read_byte()?;
                        mods.host |= HostFlags::ABSOVERRIDE;
                    } else {
                        mods.host |= HostFlags::ABSTRACT;
                    }
                }
                Tag::Final => mods.host |= HostFlags::FINAL,
                Tag::Sealed => mods.host |= HostFlags::SEALED,
                Tag::Case => mods.host |= HostFlags::CASE,
                Tag::Implicit => mods.host |= HostFlags::IMPLICIT,
                Tag::Lazy => mods.host |= HostFlags::LAZY,
                Tag::Override => mods.host |= HostFlags::OVERRIDE,
                Tag::Static => mods.host |= HostFlags::STATIC,
                Tag::Object => mods.host |= HostFlags::MODULE,
                Tag::Trait => mods.host |= HostFlags::TRAIT,
                Tag::Local => mods.host |= HostFlags::LOCAL,
                Tag::Synthetic => mods.host |= HostFlags::SYNTHETIC,
                Tag::Artifact => mods.host |= HostFlags::ARTIFACT,
                Tag::Mutable => mods.host |= HostFlags::MUTABLE,
                Tag::CaseAccessor => mods.host |= HostFlags::CASE_ACCESSOR,
                Tag::Covariant => mods.host |= HostFlags::COVARIANT,
                Tag::Contravariant => mods.host |= HostFlags::CONTRAVARIANT,
                Tag::DefaultParameterized => mods.host |= HostFlags::DEFAULT_PARAMETERIZED,
                Tag::Stable => mods.host |= HostFlags::STABLE,
                Tag::ParamSetter => mods.host |= HostFlags::PARAM_SETTER,
                // A given is an implicit to the host.
                Tag::Given => mods.host |= HostFlags::IMPLICIT,
                Tag::Enum => mods.tasty |= TastyFlags::ENUM,
                Tag::Inline => mods.tasty |= TastyFlags::INLINE,
                Tag::InlineProxy => mods.tasty |= TastyFlags::INLINE_PROXY,
                Tag::Macro => mods.tasty |= TastyFlags::MACRO,
                Tag::Erased => mods.tasty |= TastyFlags::ERASED,
                Tag::Opaque => mods.tasty |= TastyFlags::OPAQUE,
                Tag::Extension => mods.tasty |= TastyFlags::EXTENSION,
                Tag::Exported => mods.tasty |= TastyFlags::EXPORTED,
                Tag::Open => mods.tasty |= TastyFlags::OPEN,
                Tag::ParamAlias => mods.tasty |= TastyFlags::PARAM_ALIAS,
                Tag::Transparent => mods.tasty |= TastyFlags::TRANSPARENT,
                Tag::Infix => mods.tasty |= TastyFlags::INFIX,
                Tag::Invisible => mods.tasty |= TastyFlags::INVISIBLE,
                Tag::Scala2X => mods.tasty |= TastyFlags::SCALA2X,
                Tag::PrivateQualified => {
                    mods.host |= HostFlags::PRIVATE;
                    let boundary = self.read_type(ctx)?;
                    mods.private_within = boundary.type_symbol();
                }
                Tag::ProtectedQualified => {
                    mods.host |= HostFlags::PROTECTED;
                    let boundary = self.read_type(ctx)?;
                    mods.private_within = boundary.type_symbol();
                }
                Tag::Annotation => {
                    let annot_end = self.r.read_end()?;
                    if !self.env().settings.no_annotations {
                        mods.annotations.push(Annotation { tree_addr: at });
                    }
                    self.r.goto(annot_end);
                }
                other => {
                    return Err(UnpickleError::format(format!(
                        "modifier tag {other} has no translation"
                    )));
                }
            }
        }
        self.r.assert_at(end, "modifiers")?;
        Ok(mods)
    }
}

/// Derive the host bits the wire leaves implicit, in normalization order.
pub(crate) fn normalize_flags(
    env: &HostEnv,
    tag: Tag,
    mut flags: HostFlags,
    name: &Name,
    is_abs_type: bool,
    rhs_is_empty: bool,
    ctx: &Context,
) -> HostFlags {
    let symtab = &env.symtab;
    let owner = ctx.owner();

    // A term definition without a right-hand side is deferred. Modules
    // always have a definition by construction.
    if rhs_is_empty
        && matches!(tag, Tag::ValDef | Tag::DefDef)
        && !name.is_constructor()
        && !flags.intersects(
            HostFlags::PARAM_ACCESSOR
                | HostFlags::ACCESSOR
                | HostFlags::PARAM_SETTER
                | HostFlags::MODULE,
        )
    {
        flags |= HostFlags::DEFERRED;
    }
    if is_abs_type {
        flags |= HostFlags::DEFERRED;
    }

    if tag == Tag::DefDef {
        flags |= HostFlags::METHOD;
    }
    if tag == Tag::ValDef {
        if !flags.contains(HostFlags::MUTABLE) {
            flags |= HostFlags::STABLE;
        }
        if owner.exists() && symtab.flags(owner).contains(HostFlags::TRAIT) {
            flags |= HostFlags::ACCESSOR;
        }
    }

    if flags.contains(HostFlags::MODULE) {
        if tag == Tag::ValDef {
            flags |= HostFlags::MODULE
                | HostFlags::LAZY
                | HostFlags::FINAL
                | HostFlags::STABLE;
        }
        if tag == Tag::TypeDef {
            flags |= HostFlags::MODULE | HostFlags::FINAL;
        }
    }

    if owner.exists() && symtab.is_class_like(owner) {
        if tag == Tag::TypeParam {
            flags |= HostFlags::PARAM;
        }
        if tag == Tag::Param {
            flags |= HostFlags::PARAM_ACCESSOR | HostFlags::ACCESSOR | HostFlags::STABLE;
            if !rhs_is_empty {
                // A parameter alias forwards to the outer accessor.
                flags |= HostFlags::METHOD;
            }
        }
    }

    if name.is_default_getter()
        || (owner.exists() && symtab.flags(owner).contains(HostFlags::DEFAULT_PARAMETERIZED))
    {
        flags |= HostFlags::DEFAULT_PARAMETERIZED;
    }

    flags
}

/// Refuse dialect-only flags on definition kinds that do not accept them.
pub(crate) fn check_tasty_flags(
    env: &HostEnv,
    tag: Tag,
    sym: Symbol,
    tasty: TastyFlags,
) -> Result<()> {
    let tolerated = TastyFlags::SCALA2X | TastyFlags::INVISIBLE | TastyFlags::INFIX;
    let allowed = tolerated
        | match tag {
            Tag::DefDef => TastyFlags::EXTENSION,
            // Inline values are admitted here and checked for a constant
            // right-hand side during completion.
            Tag::ValDef => TastyFlags::ENUM | TastyFlags::INLINE,
            Tag::TypeDef => TastyFlags::OPEN | TastyFlags::ENUM | TastyFlags::TRANSPARENT,
            _ => TastyFlags::empty(),
        };
    let refused = tasty - allowed;
    if refused.is_empty() {
        Ok(())
    } else {
        Err(UnpickleError::unsupported(
            format!("modifier(s) {}", refused.describe()),
            env.symtab.location_of(sym),
        ))
    }
}
