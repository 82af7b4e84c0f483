//! Rendering of structured names.
//!
//! Three forms: a human-readable *source* form, a bracket-nested *debug*
//! form for diagnostics, and the *host identifier* form which applies the
//! host compiler's symbolic-operator escape to every simple fragment. The
//! host form is what gets handed to the symbol table, so it must round-trip
//! through the host's own name facilities.

use std::borrow::Cow;

use crate::names::{MethodSig, Name, ParamSig};

/// Scala's symbolic-operator escape table.
const OP_ENCODINGS: &[(char, &str)] = &[
    ('~', "$tilde"),
    ('=', "$eq"),
    ('<', "$less"),
    ('>', "$greater"),
    ('!', "$bang"),
    ('#', "$hash"),
    ('%', "$percent"),
    ('^', "$up"),
    ('&', "$amp"),
    ('|', "$bar"),
    ('*', "$times"),
    ('/', "$div"),
    ('+', "$plus"),
    ('-', "$minus"),
    (':', "$colon"),
    ('\\', "$bslash"),
    ('?', "$qmark"),
    ('@', "$at"),
];

/// Escape symbolic operator characters the way the host compiler spells
/// them in bytecode-safe identifiers. Plain identifiers pass through
/// unallocated.
pub fn host_escape(text: &str) -> Cow<'_, str> {
    let needs_escape = text.chars().any(|c| OP_ENCODINGS.iter().any(|&(op, _)| op == c));
    if !needs_escape {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match OP_ENCODINGS.iter().find(|&&(op, _)| op == c) {
            Some(&(_, escape)) => out.push_str(escape),
            None => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Undo [`host_escape`]. Longest-match on `$`-prefixed escapes; text that
/// never came from the escape table passes through unchanged.
pub fn host_unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        let tail = &rest[dollar..];
        match OP_ENCODINGS
            .iter()
            .find(|&&(_, escape)| tail.starts_with(escape))
        {
            Some(&(op, escape)) => {
                out.push(op);
                rest = &tail[escape.len()..];
            }
            None => {
                out.push('$');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

impl Name {
    /// Human-readable source-like form. `Type` and `Module` views are
    /// transparent; `Signed` drops its signature.
    pub fn source_str(&self) -> String {
        let mut out = String::new();
        self.write_form(&mut out, false);
        out
    }

    /// Host-identifier form: source form with every simple fragment run
    /// through [`host_escape`].
    pub fn encoded_str(&self) -> String {
        let mut out = String::new();
        self.write_form(&mut out, true);
        out
    }

    fn write_form(&self, out: &mut String, escape: bool) {
        match self {
            Name::Simple(text) => {
                if escape {
                    out.push_str(&host_escape(text));
                } else {
                    out.push_str(text);
                }
            }
            Name::Qualified { qual, sep, sel } => {
                qual.write_form(out, escape);
                out.push_str(sep);
                sel.write_form(out, escape);
            }
            Name::Module(base) | Name::Type(base) => base.write_form(out, escape),
            Name::Signed { qual, .. } => qual.write_form(out, escape),
            Name::Unique { qual, sep, num } => {
                qual.write_form(out, escape);
                out.push_str(sep);
                out.push_str(&num.to_string());
            }
            Name::Default { qual, num } => {
                // The constructor spelling is already escaped in the host
                // form, so both arms compose with the same getter suffix.
                if escape && qual.is_constructor() {
                    out.push_str("$lessinit$greater");
                } else {
                    qual.write_form(out, escape);
                }
                out.push_str("$default$");
                out.push_str(&(num + 1).to_string());
            }
            Name::Prefix { prefix, qual } => {
                out.push_str(prefix);
                qual.write_form(out, escape);
            }
        }
    }

    /// Self-describing bracket-nested form, used only in diagnostics.
    pub fn debug_str(&self) -> String {
        match self {
            Name::Simple(text) => text.to_string(),
            Name::Qualified { qual, sep, sel } => {
                format!(
                    "{}[Qualified {sep} {}]",
                    qual.debug_str(),
                    sel.debug_str()
                )
            }
            Name::Module(base) => format!("{}[ModuleClass]", base.debug_str()),
            Name::Type(base) => format!("{}[Type]", base.debug_str()),
            Name::Signed { qual, sig } => {
                format!("{}[Signed {}]", qual.debug_str(), debug_sig(sig))
            }
            Name::Unique { qual, sep, num } => {
                format!("{}[Unique {sep} {num}]", qual.debug_str())
            }
            Name::Default { qual, num } => {
                format!("{}[Default {}]", qual.debug_str(), num + 1)
            }
            Name::Prefix { prefix, qual } => {
                format!("[Prefix {prefix}]{}", qual.debug_str())
            }
        }
    }
}

fn debug_sig(sig: &MethodSig) -> String {
    let params: Vec<String> = sig
        .params
        .iter()
        .map(|p| match p {
            ParamSig::TypeArity(n) => format!("<{n}>"),
            ParamSig::Erased(r) => format!("{r}"),
        })
        .collect();
    format!("({}):{}", params.join(","), sig.result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_is_identity_on_plain_identifiers() {
        assert!(matches!(host_escape("foo"), Cow::Borrowed("foo")));
        assert!(matches!(host_escape("Foo_1"), Cow::Borrowed("Foo_1")));
    }

    #[test]
    fn escape_operators() {
        assert_eq!(host_escape("+"), "$plus");
        assert_eq!(host_escape("::"), "$colon$colon");
        assert_eq!(host_escape("<init>"), "$lessinit$greater");
        assert_eq!(host_escape("unary_-"), "unary_$minus");
    }

    #[test]
    fn unescape_undoes_escape() {
        for raw in ["foo", "+", "::", "<init>", "unary_-", "a=b", "max$", "$anon"] {
            assert_eq!(host_unescape(&host_escape(raw)), raw);
        }
    }
}
