//! The structured name algebra and the pickled name table.
//!
//! Every name in the ASTs section is a reference into a dense table parsed
//! once per artifact. Entries are either atomic UTF-8 fragments or composed
//! from earlier entries.

use std::rc::Rc;

use crate::bytes::TastyReader;
use crate::error::{Result, UnpickleError};

/// Name-table wire tags.
mod name_tags {
    pub const UTF8: u8 = 1;
    pub const QUALIFIED: u8 = 2;
    pub const EXPANDED: u8 = 3;
    pub const EXPAND_PREFIX: u8 = 4;
    pub const UNIQUE: u8 = 10;
    pub const DEFAULT_GETTER: u8 = 11;
    pub const SUPER_ACCESSOR: u8 = 20;
    pub const INLINE_ACCESSOR: u8 = 21;
    pub const OBJECT_CLASS: u8 = 23;
    pub const SIGNED: u8 = 63;
}

/// Path separator of [`Name::Qualified`] produced by the `QUALIFIED` tag.
pub const PATH_SEP: &str = ".";
/// Separator of expanded (private-mangled) names.
pub const EXPANDED_SEP: &str = "$$";
/// Separator of expanded-prefix names.
pub const EXPAND_PREFIX_SEP: &str = "$";
/// Separator marking a fresh wildcard name.
pub const WILDCARD_SEP: &str = "_$";
/// Prefix of super-accessor names.
pub const SUPER_PREFIX: &str = "super$";
/// Prefix of inline-accessor names.
pub const INLINE_PREFIX: &str = "inline$";
/// Spelling of the constructor name.
pub const CONSTRUCTOR_STR: &str = "<init>";

/// A 1-based reference into the name table. `NameRef(0)` never resolves.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NameRef(pub u32);

impl std::fmt::Display for NameRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One parameter slot of an erased method signature: either a reference to
/// an erased type name, or the arity of a type-parameter section.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ParamSig {
    TypeArity(u32),
    Erased(NameRef),
}

/// An erased method signature, used to disambiguate overloads on the wire.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodSig {
    pub params: Vec<ParamSig>,
    pub result: NameRef,
}

/// A structured name. Value-equal by structure.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Name {
    /// A raw identifier fragment.
    Simple(Rc<str>),
    /// A dotted path with an explicit separator.
    Qualified {
        qual: Rc<Name>,
        sep: &'static str,
        sel: Rc<Name>,
    },
    /// The view of `base` as the module's companion class name.
    Module(Rc<Name>),
    /// The view of `base` as a type name. Built only through
    /// [`Name::to_type_name`], which keeps the constructor idempotent.
    Type(Rc<Name>),
    /// Overload-disambiguating adornment.
    Signed { qual: Rc<Name>, sig: MethodSig },
    /// Compiler-generated fresh name with a numeric tag.
    Unique {
        qual: Rc<Name>,
        sep: Rc<str>,
        num: u32,
    },
    /// The `num`-th default-argument getter of `qual` (0-based on the wire).
    Default { qual: Rc<Name>, num: u32 },
    /// A prefix decoration such as a super- or inline-accessor marker.
    Prefix {
        prefix: &'static str,
        qual: Rc<Name>,
    },
}

impl Name {
    pub fn simple(text: impl Into<Rc<str>>) -> Rc<Name> {
        Rc::new(Name::Simple(text.into()))
    }

    pub fn empty() -> Rc<Name> {
        Name::simple("")
    }

    pub fn constructor() -> Rc<Name> {
        Name::simple(CONSTRUCTOR_STR)
    }

    /// View a name as a type name. Idempotent: `Type` wraps at most once.
    pub fn to_type_name(self: &Rc<Name>) -> Rc<Name> {
        match &**self {
            Name::Type(_) => Rc::clone(self),
            _ => Rc::new(Name::Type(Rc::clone(self))),
        }
    }

    /// Strip a `Type` view, if any.
    pub fn to_term_name(self: &Rc<Name>) -> Rc<Name> {
        match &**self {
            Name::Type(base) => Rc::clone(base),
            _ => Rc::clone(self),
        }
    }

    pub fn is_type_name(&self) -> bool {
        matches!(self, Name::Type(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Name::Simple(s) if s.is_empty())
    }

    pub fn is_constructor(&self) -> bool {
        matches!(self, Name::Simple(s) if &**s == CONSTRUCTOR_STR)
    }

    /// `Unique(Empty, "_$", n)` denotes a wildcard.
    pub fn is_wildcard(&self) -> bool {
        matches!(
            self,
            Name::Unique { qual, sep, .. } if qual.is_empty() && &**sep == WILDCARD_SEP
        )
    }

    pub fn is_default_getter(&self) -> bool {
        matches!(self, Name::Default { .. })
    }

    /// The innermost simple fragment, dropping views and adornments.
    pub fn stripped(self: &Rc<Name>) -> Rc<Name> {
        match &**self {
            Name::Module(base) | Name::Type(base) => base.stripped(),
            Name::Signed { qual, .. } => qual.stripped(),
            _ => Rc::clone(self),
        }
    }
}

/// A dense array of structured names, parsed once per artifact.
#[derive(Debug, Default)]
pub struct NameTable {
    names: Vec<Rc<Name>>,
}

impl NameTable {
    /// Parse the length-prefixed name table at the reader's position.
    ///
    /// The table length counts bytes, not entries; each entry is a tag, a
    /// byte length, and a payload referencing only earlier entries.
    pub fn parse(reader: &mut TastyReader) -> Result<NameTable> {
        let table_end = reader.read_end()?;
        let mut table = NameTable::default();
        while reader.current_addr() < table_end {
            let name = table.parse_entry(reader)?;
            table.names.push(name);
        }
        reader.assert_at(table_end, "name table")?;
        Ok(table)
    }

    /// Resolve a wire reference. References are 1-based; entry `n` may only
    /// reference entries `1..n`.
    pub fn resolve(&self, r: NameRef) -> Result<&Rc<Name>> {
        if r.0 == 0 || r.0 as usize > self.names.len() {
            return Err(UnpickleError::format(format!(
                "name reference {r} outside table of {} entries",
                self.names.len()
            )));
        }
        Ok(&self.names[r.0 as usize - 1])
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NameRef, &Rc<Name>)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (NameRef(i as u32 + 1), n))
    }

    fn parse_entry(&self, reader: &mut TastyReader) -> Result<Rc<Name>> {
        let tag = reader.read_byte()?;
        let end = reader.read_end()?;
        let name = match tag {
            name_tags::UTF8 => {
                let len = end.0 - reader.current_addr().0;
                let bytes = reader.read_bytes(len as usize)?;
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| UnpickleError::format(format!("bad UTF-8 name: {e}")))?;
                Name::simple(text)
            }
            name_tags::QUALIFIED | name_tags::EXPANDED | name_tags::EXPAND_PREFIX => {
                let qual = self.read_ref(reader)?;
                let sel = self.read_ref(reader)?;
                let sep = match tag {
                    name_tags::QUALIFIED => PATH_SEP,
                    name_tags::EXPANDED => EXPANDED_SEP,
                    _ => EXPAND_PREFIX_SEP,
                };
                Rc::new(Name::Qualified { qual, sep, sel })
            }
            name_tags::UNIQUE => {
                let sep = self.read_ref(reader)?;
                let num = reader.read_nat()?;
                let qual = if reader.current_addr() < end {
                    self.read_ref(reader)?
                } else {
                    Name::empty()
                };
                let Name::Simple(sep) = &*sep else {
                    return Err(UnpickleError::format(format!(
                        "unique-name separator must be a simple name, got {sep:?}"
                    )));
                };
                Rc::new(Name::Unique {
                    qual,
                    sep: Rc::clone(sep),
                    num,
                })
            }
            name_tags::DEFAULT_GETTER => {
                let qual = self.read_ref(reader)?;
                let num = reader.read_nat()?;
                Rc::new(Name::Default { qual, num })
            }
            name_tags::SUPER_ACCESSOR | name_tags::INLINE_ACCESSOR => {
                let qual = self.read_ref(reader)?;
                let prefix = if tag == name_tags::SUPER_ACCESSOR {
                    SUPER_PREFIX
                } else {
                    INLINE_PREFIX
                };
                Rc::new(Name::Prefix { prefix, qual })
            }
            name_tags::OBJECT_CLASS => {
                let qual = self.read_ref(reader)?;
                Rc::new(Name::Module(qual))
            }
            name_tags::SIGNED => {
                let qual = self.read_ref(reader)?;
                let result = NameRef(reader.read_nat()?);
                let mut params = Vec::new();
                while reader.current_addr() < end {
                    let n = reader.read_int()?;
                    params.push(if n < 0 {
                        ParamSig::TypeArity((-n) as u32)
                    } else {
                        ParamSig::Erased(NameRef(n as u32))
                    });
                }
                Rc::new(Name::Signed {
                    qual,
                    sig: MethodSig { params, result },
                })
            }
            other => {
                return Err(UnpickleError::format(format!(
                    "unknown name tag {other}"
                )));
            }
        };
        reader.assert_at(end, "name entry")?;
        Ok(name)
    }

    fn read_ref(&self, reader: &mut TastyReader) -> Result<Rc<Name>> {
        let r = NameRef(reader.read_nat()?);
        Ok(Rc::clone(self.resolve(r)?))
    }
}
