//! Lazy index of definition nesting.
//!
//! A node mirrors one definition (or template) in the byte stream as a
//! `(start, tag, end)` triple. Children are computed on first demand by a
//! scan that records immediate nested definitions and skips everything
//! below them, so forward references can resolve to the correct owner
//! before anything has been completed.
//!
//! Member definitions of a template are recorded at the enclosing level, so
//! their owner is the class; only non-member statements stay in the
//! template's own child list.

use std::cell::OnceCell;

use tastyr_core::bytes::{Addr, TastyReader};
use tastyr_core::error::{Result, UnpickleError};
use tastyr_core::tags::{self, Tag, TagShape};

use crate::host::symbols::Symbol;

/// How a scan treats definition tags at the current level.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum ScanMode {
    /// Record every definition.
    AllDefs,
    /// Record member definitions only; skip everything else wholesale.
    MemberDefsOnly,
    /// Skip member definitions (they belong to the enclosing level) but
    /// descend into statements.
    NoMemberDefs,
}

/// One node of the owner index.
#[derive(Debug)]
pub struct OwnerTree {
    pub start: Addr,
    /// `None` for the synthetic root spanning the whole section.
    pub tag: Option<Tag>,
    pub end: Addr,
    fork: TastyReader,
    children: OnceCell<Vec<OwnerTree>>,
}

impl OwnerTree {
    /// Root node spanning the whole section behind `reader`.
    pub fn root(reader: TastyReader) -> OwnerTree {
        OwnerTree {
            start: reader.current_addr(),
            tag: None,
            end: reader.end_addr(),
            fork: reader,
            children: OnceCell::new(),
        }
    }

    fn node(start: Addr, tag: Tag, end: Addr, fork: TastyReader) -> OwnerTree {
        OwnerTree {
            start,
            tag: Some(tag),
            end,
            fork,
            children: OnceCell::new(),
        }
    }

    pub fn contains(&self, addr: Addr) -> bool {
        self.start < addr && addr < self.end
    }

    /// Immediate nested definitions, computed at most once.
    pub fn children(&self) -> Result<&[OwnerTree]> {
        if self.children.get().is_none() {
            let computed = self.scan_children()?;
            let _ = self.children.set(computed);
        }
        Ok(self.children.get().map(Vec::as_slice).unwrap_or(&[]))
    }

    fn scan_children(&self) -> Result<Vec<OwnerTree>> {
        let mut buf = Vec::new();
        let mut reader = self.fork.fork_at(self.start);
        match self.tag {
            None => scan_trees(&mut buf, &mut reader, self.end, ScanMode::AllDefs)?,
            Some(Tag::Template) => {
                reader.read_byte()?;
                let end = reader.read_end()?;
                scan_trees(&mut buf, &mut reader, end, ScanMode::NoMemberDefs)?;
            }
            Some(tag) if tag.is_member_def() => {
                reader.read_byte()?;
                let end = reader.read_end()?;
                reader.read_nat()?;
                scan_trees(&mut buf, &mut reader, end, ScanMode::AllDefs)?;
            }
            Some(tag) => {
                return Err(UnpickleError::format(format!(
                    "owner index holds a non-definition node {tag} at {}",
                    self.start
                )));
            }
        }
        Ok(buf)
    }

    /// The owner of the definition at `addr`: the symbol of the innermost
    /// enclosing recorded node, created on demand through `resolve`.
    ///
    /// `resolve(node_addr, outer_owner)` must yield the symbol registered
    /// (or creatable) at `node_addr` given its own owner.
    pub fn find_owner(
        &self,
        addr: Addr,
        resolve: &dyn Fn(Addr, Symbol) -> Result<Symbol>,
    ) -> Result<Symbol> {
        fn search(
            children: &[OwnerTree],
            addr: Addr,
            current: Symbol,
            resolve: &dyn Fn(Addr, Symbol) -> Result<Symbol>,
        ) -> Result<Symbol> {
            for child in children {
                if child.start == addr {
                    return Ok(current);
                }
                if child.contains(addr) {
                    let owner = resolve(child.start, current)?;
                    return search(child.children()?, addr, owner, resolve);
                }
            }
            Err(UnpickleError::format(format!(
                "definition at {addr} has no enclosing owner"
            )))
        }
        let owner = search(self.children()?, addr, Symbol::NONE, resolve)?;
        if owner.exists() {
            Ok(owner)
        } else {
            Err(UnpickleError::format(format!(
                "definition at {addr} is not enclosed by any definition"
            )))
        }
    }
}

/// Lengthed tags whose payload interleaves raw numbers with subtrees, so a
/// shape-driven scan cannot walk them. None of them can contain member
/// definitions; the scan jumps straight to their end.
fn is_opaque(tag: u8) -> bool {
    matches!(
        Tag::from_u8(tag),
        Some(
            Tag::PolyType
                | Tag::MethodType
                | Tag::ImplicitMethodType
                | Tag::GivenMethodType
                | Tag::TypeLambdaType
                | Tag::ParamType
                | Tag::SelectOuter
                | Tag::Return
                | Tag::Inlined
                | Tag::MatchType
                | Tag::MatchTpt
                | Tag::Hole
        )
    )
}

/// Lengthed tags with one leading name reference before their subtrees.
fn leading_refs(tag: u8) -> u32 {
    match Tag::from_u8(tag) {
        Some(Tag::RefinedType | Tag::TermRefIn | Tag::TypeRefIn) => 1,
        _ => 0,
    }
}

fn scan_trees(
    buf: &mut Vec<OwnerTree>,
    reader: &mut TastyReader,
    end: Addr,
    mode: ScanMode,
) -> Result<()> {
    while reader.current_addr() < end {
        scan_tree(buf, reader, mode)?;
    }
    reader.assert_at(end, "owner scan")
}

fn scan_tree(buf: &mut Vec<OwnerTree>, reader: &mut TastyReader, mode: ScanMode) -> Result<()> {
    let start = reader.current_addr();
    let byte = reader.read_byte()?;
    let tag = Tag::from_u8(byte);

    if let Some(tag) = tag.filter(|t| t.is_member_def()) {
        let end = reader.read_end()?;
        reader.read_nat()?;
        if mode != ScanMode::NoMemberDefs {
            buf.push(OwnerTree::node(start, tag, end, reader.fork()));
        }
        reader.goto(end);
        return Ok(());
    }

    if tag == Some(Tag::Template) {
        let end = reader.read_end()?;
        if mode != ScanMode::NoMemberDefs {
            // Surface the template's member defs at the enclosing level,
            // then keep the template node for its statement owners.
            scan_trees(buf, reader, end, ScanMode::MemberDefsOnly)?;
            buf.push(OwnerTree::node(start, Tag::Template, end, reader.fork()));
        }
        reader.goto(end);
        return Ok(());
    }

    match tags::shape_of(byte) {
        TagShape::Leaf => {}
        TagShape::Nat => {
            reader.read_nat()?;
        }
        TagShape::Ast => scan_tree(buf, reader, mode)?,
        TagShape::NatAst => {
            reader.read_nat()?;
            scan_tree(buf, reader, mode)?;
        }
        TagShape::Lengthed => {
            let end = reader.read_end()?;
            if is_opaque(byte) || mode == ScanMode::MemberDefsOnly {
                reader.goto(end);
            } else {
                for _ in 0..leading_refs(byte) {
                    reader.read_nat()?;
                }
                // Inside a statement, any nested definition belongs to the
                // statement's owner.
                scan_trees(buf, reader, end, ScanMode::AllDefs)?;
            }
        }
    }
    Ok(())
}
