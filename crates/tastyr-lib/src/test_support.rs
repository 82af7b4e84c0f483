//! Test-only builder for pickled sections.
//!
//! Emits the same wire layout the reader consumes: a name table referencing
//! earlier entries, and a tree buffer with tagged, length-prefixed nodes.
//! Length prefixes are written as padded four-byte naturals so every
//! address is known while writing; the reader accepts non-minimal naturals.

use std::collections::HashMap;
use std::rc::Rc;

use tastyr_core::bytes::{Addr, TastyReader};
use tastyr_core::names::NameTable;
use tastyr_core::tags::Tag;

use tastyr_core::flags::HostFlags;
use tastyr_core::names::Name;

use crate::host::HostEnv;
use crate::host::symbols::Symbol;
use crate::settings::Settings;
use crate::unpickler::Unpickler;

pub(crate) fn write_nat(out: &mut Vec<u8>, mut x: u64) {
    let mut groups = [0u8; 10];
    let mut n = 0;
    loop {
        groups[n] = (x & 0x7f) as u8;
        x >>= 7;
        n += 1;
        if x == 0 {
            break;
        }
    }
    for i in (1..n).rev() {
        out.push(groups[i]);
    }
    out.push(groups[0] | 0x80);
}

pub(crate) fn write_int(out: &mut Vec<u8>, x: i64) {
    write_nat(out, ((x << 1) ^ (x >> 63)) as u64);
}

/// Four-byte padded natural, for back-patchable length prefixes.
fn nat4(x: u32) -> [u8; 4] {
    debug_assert!(x < 1 << 28);
    [
        ((x >> 21) & 0x7f) as u8,
        ((x >> 14) & 0x7f) as u8,
        ((x >> 7) & 0x7f) as u8,
        (x & 0x7f) as u8 | 0x80,
    ]
}

/// A reserved length slot returned by [`Pickler::begin`].
#[must_use]
pub(crate) struct Patch(usize);

/// Builder for a name table plus an `ASTs` section.
#[derive(Default)]
pub(crate) struct Pickler {
    name_entries: Vec<Vec<u8>>,
    utf8_index: HashMap<String, u32>,
    pub(crate) buf: Vec<u8>,
}

impl Pickler {
    pub(crate) fn new() -> Pickler {
        Pickler::default()
    }

    // --- name table ---

    fn push_name(&mut self, tag: u8, payload: Vec<u8>) -> u32 {
        let mut entry = vec![tag];
        write_nat(&mut entry, payload.len() as u64);
        entry.extend_from_slice(&payload);
        self.name_entries.push(entry);
        self.name_entries.len() as u32
    }

    pub(crate) fn utf8(&mut self, text: &str) -> u32 {
        if let Some(&r) = self.utf8_index.get(text) {
            return r;
        }
        let r = self.push_name(1, text.as_bytes().to_vec());
        self.utf8_index.insert(text.to_string(), r);
        r
    }

    pub(crate) fn qualified(&mut self, qual: u32, sel: u32) -> u32 {
        let mut payload = Vec::new();
        write_nat(&mut payload, qual as u64);
        write_nat(&mut payload, sel as u64);
        self.push_name(2, payload)
    }

    pub(crate) fn object_class(&mut self, base: u32) -> u32 {
        let mut payload = Vec::new();
        write_nat(&mut payload, base as u64);
        self.push_name(23, payload)
    }

    pub(crate) fn default_getter(&mut self, base: u32, num: u32) -> u32 {
        let mut payload = Vec::new();
        write_nat(&mut payload, base as u64);
        write_nat(&mut payload, num as u64);
        self.push_name(11, payload)
    }

    /// Dotted path as nested qualified names, e.g. for package references.
    pub(crate) fn path(&mut self, dotted: &str) -> u32 {
        let mut parts = dotted.split('.');
        let mut acc = {
            let first = parts.next().expect("non-empty path");
            self.utf8(first)
        };
        for part in parts {
            let sel = self.utf8(part);
            acc = self.qualified(acc, sel);
        }
        acc
    }

    // --- tree buffer ---

    /// Current address in the section.
    pub(crate) fn pos(&self) -> Addr {
        Addr(self.buf.len() as u32)
    }

    pub(crate) fn tag(&mut self, tag: Tag) {
        self.buf.push(tag as u8);
    }

    pub(crate) fn nat(&mut self, x: u64) {
        write_nat(&mut self.buf, x);
    }

    pub(crate) fn int(&mut self, x: i64) {
        write_int(&mut self.buf, x);
    }

    /// Open a length-prefixed node; close it with [`Pickler::end`].
    pub(crate) fn begin(&mut self, tag: Tag) -> Patch {
        self.tag(tag);
        let patch = Patch(self.buf.len());
        self.buf.extend_from_slice(&[0; 4]);
        patch
    }

    pub(crate) fn end(&mut self, patch: Patch) {
        let len = (self.buf.len() - patch.0 - 4) as u32;
        self.buf[patch.0..patch.0 + 4].copy_from_slice(&nat4(len));
    }

    // --- common shapes ---

    /// `tag end name ...body...`, returning the definition's address.
    pub(crate) fn def(&mut self, tag: Tag, name: u32, body: impl FnOnce(&mut Pickler)) -> Addr {
        let addr = self.pos();
        let patch = self.begin(tag);
        self.nat(name as u64);
        body(self);
        self.end(patch);
        addr
    }

    /// A type reference by name on a package prefix.
    pub(crate) fn type_ref_in_pkg(&mut self, member: u32, pkg_path: u32) {
        self.tag(Tag::TypeRef);
        self.nat(member as u64);
        self.tag(Tag::TypeRefPkg);
        self.nat(pkg_path as u64);
    }

    /// `PACKAGE end TERMREFpkg path ...stats...`
    pub(crate) fn package(&mut self, path: u32, stats: impl FnOnce(&mut Pickler)) {
        let patch = self.begin(Tag::Package);
        self.tag(Tag::TermRefPkg);
        self.nat(path as u64);
        stats(self);
        self.end(patch);
    }

    // --- assembly ---

    pub(crate) fn name_table(&self) -> NameTable {
        let body: Vec<u8> = self.name_entries.concat();
        let mut bytes = Vec::new();
        write_nat(&mut bytes, body.len() as u64);
        bytes.extend_from_slice(&body);
        let mut reader = TastyReader::new(Rc::from(bytes));
        NameTable::parse(&mut reader).expect("test name table parses")
    }

    pub(crate) fn into_unpickler(self, env: Rc<HostEnv>, source: &str) -> Rc<Unpickler> {
        let names = self.name_table();
        let asts = TastyReader::new(Rc::from(self.buf));
        Unpickler::new(env, names, asts, source)
    }
}

// --- fixtures ---

pub(crate) fn fresh_env() -> Rc<HostEnv> {
    HostEnv::new(Settings::default())
}

/// Module class of the `demo` package, created through the mirror.
pub(crate) fn demo_owner(env: &HostEnv) -> Symbol {
    let pkg = env
        .mirror
        .get_or_create_package(&env.symtab, &Name::simple("demo"));
    env.symtab.module_class(pkg)
}

/// Class root and module root the way the enclosing driver assigns them.
pub(crate) fn make_roots(env: &HostEnv, owner: Symbol, name: &str) -> (Symbol, Symbol) {
    let class_root = env
        .symtab
        .new_class(owner, Name::simple(name), HostFlags::empty());
    let (module_root, _) = env.symtab.new_module(
        owner,
        Name::simple(name),
        HostFlags::empty(),
        HostFlags::empty(),
    );
    (class_root, module_root)
}
