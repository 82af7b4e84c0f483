//! Modifier flag sets.
//!
//! [`HostFlags`] is the host compiler's vocabulary; [`TastyFlags`] collects
//! the newer dialect's modifiers that have no host equivalent and must be
//! either tolerated or refused per definition kind.

use bitflags::bitflags;

bitflags! {
    /// Host-side modifier bits.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct HostFlags: u64 {
        const PRIVATE          = 1 << 0;
        const PROTECTED        = 1 << 1;
        const ABSTRACT         = 1 << 2;
        const DEFERRED         = 1 << 3;
        const FINAL            = 1 << 4;
        const SEALED           = 1 << 5;
        const CASE             = 1 << 6;
        const IMPLICIT         = 1 << 7;
        const LAZY             = 1 << 8;
        const OVERRIDE         = 1 << 9;
        const ABSOVERRIDE      = 1 << 10;
        const STATIC           = 1 << 11;
        const MODULE           = 1 << 12;
        const TRAIT            = 1 << 13;
        const ENUM             = 1 << 14;
        const LOCAL            = 1 << 15;
        const SYNTHETIC        = 1 << 16;
        const ARTIFACT         = 1 << 17;
        const MUTABLE          = 1 << 18;
        const ACCESSOR         = 1 << 19;
        const CASE_ACCESSOR    = 1 << 20;
        const PARAM            = 1 << 21;
        const PARAM_ACCESSOR   = 1 << 22;
        const COVARIANT        = 1 << 23;
        const CONTRAVARIANT    = 1 << 24;
        const DEFAULT_PARAMETERIZED = 1 << 25;
        const STABLE           = 1 << 26;
        const METHOD           = 1 << 27;
        const PARAM_SETTER     = 1 << 28;
    }
}

bitflags! {
    /// Dialect-only modifier bits carried beside the host set.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct TastyFlags: u32 {
        const ERASED       = 1 << 0;
        const INLINE       = 1 << 1;
        const INLINE_PROXY = 1 << 2;
        const OPAQUE       = 1 << 3;
        const EXTENSION    = 1 << 4;
        const GIVEN        = 1 << 5;
        const EXPORTED     = 1 << 6;
        const MACRO        = 1 << 7;
        const ENUM         = 1 << 8;
        const OPEN         = 1 << 9;
        const PARAM_ALIAS  = 1 << 10;
        const TRANSPARENT  = 1 << 11;
        const INFIX        = 1 << 12;
        const INVISIBLE    = 1 << 13;
        const SCALA2X     = 1 << 14;
    }
}

impl TastyFlags {
    /// Spell out the set bits for diagnostics, lowest bit first.
    pub fn describe(self) -> String {
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        names.join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_val_bits() {
        let flags = HostFlags::MODULE | HostFlags::LAZY | HostFlags::FINAL | HostFlags::STABLE;
        assert!(flags.contains(HostFlags::MODULE));
        assert!(!flags.contains(HostFlags::METHOD));
    }

    #[test]
    fn describe_names_set_bits() {
        let flags = TastyFlags::ERASED | TastyFlags::OPAQUE;
        assert_eq!(flags.describe(), "ERASED|OPAQUE");
        assert_eq!(TastyFlags::empty().describe(), "");
    }
}
