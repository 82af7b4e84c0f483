//! Artifact framer: header, name table, section directory.
//!
//! A `.tasty` artifact is a fixed header (magic, format version, UUID),
//! the name table, then a sequence of named, length-prefixed sections. The
//! tree unpickler only ever sees the `ASTs` section; everything here is
//! plain validation and slicing.

use std::rc::Rc;

use crate::bytes::TastyReader;
use crate::error::{Result, UnpickleError};
use crate::names::{Name, NameTable};

/// Leading magic of every TASTy artifact.
pub const MAGIC: [u8; 4] = [0x5c, 0xa1, 0xab, 0x1f];
/// Highest major format version this reader accepts.
pub const MAJOR_VERSION: u32 = 28;
/// Name of the section holding the pickled trees.
pub const ASTS_SECTION: &str = "ASTs";

/// A parsed artifact: validated header, name table, section windows.
#[derive(Debug)]
pub struct TastyArtifact {
    data: Rc<[u8]>,
    names: NameTable,
    uuid: (u64, u64),
    version: (u32, u32),
    sections: Vec<Section>,
}

#[derive(Debug)]
struct Section {
    name: Rc<Name>,
    start: usize,
    end: usize,
}

impl TastyArtifact {
    /// Parse and validate a whole artifact.
    pub fn parse(bytes: Vec<u8>) -> Result<TastyArtifact> {
        let data: Rc<[u8]> = bytes.into();
        let mut reader = TastyReader::new(Rc::clone(&data));

        let mut magic = [0u8; 4];
        magic.copy_from_slice(reader.read_bytes(4)?);
        if magic != MAGIC {
            return Err(UnpickleError::format(format!(
                "not a TASTy artifact: magic {magic:02x?}"
            )));
        }
        let major = reader.read_nat()?;
        let minor = reader.read_nat()?;
        if major > MAJOR_VERSION {
            return Err(UnpickleError::format(format!(
                "unsupported TASTy version {major}.{minor} (highest supported major is {MAJOR_VERSION})"
            )));
        }
        let uuid = (reader.read_raw_long()?, reader.read_raw_long()?);

        let names = NameTable::parse(&mut reader)?;

        let mut sections = Vec::new();
        while !reader.is_at_end() {
            let name_ref = crate::names::NameRef(reader.read_nat()?);
            let name = Rc::clone(names.resolve(name_ref)?);
            let end = reader.read_end()?;
            let start = reader.current_addr();
            reader.goto(end);
            sections.push(Section {
                name,
                start: start.index(),
                end: end.index(),
            });
        }

        Ok(TastyArtifact {
            data,
            names,
            uuid,
            version: (major, minor),
            sections,
        })
    }

    pub fn name_table(&self) -> &NameTable {
        &self.names
    }

    /// Consume the artifact, keeping its name table. Section readers stay
    /// valid: they share the underlying buffer.
    pub fn into_name_table(self) -> NameTable {
        self.names
    }

    pub fn uuid(&self) -> (u64, u64) {
        self.uuid
    }

    pub fn version(&self) -> (u32, u32) {
        self.version
    }

    /// A cursor over the named section, with addresses relative to the
    /// section start.
    pub fn section(&self, wanted: &str) -> Option<TastyReader> {
        self.sections
            .iter()
            .find(|s| matches!(&*s.name, Name::Simple(text) if &**text == wanted))
            .map(|s| TastyReader::over(Rc::clone(&self.data), s.start, s.end))
    }

    /// The `ASTs` section, required for unpickling.
    pub fn asts(&self) -> Result<TastyReader> {
        self.section(ASTS_SECTION).ok_or_else(|| {
            UnpickleError::format(format!("artifact has no {ASTS_SECTION} section"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes_tests::write_nat;

    fn artifact_bytes(major: u32, sections: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        write_nat(&mut out, major as u64);
        write_nat(&mut out, 0); // minor
        out.extend_from_slice(&0x1234_5678_9abc_def0u64.to_be_bytes());
        out.extend_from_slice(&0x0fed_cba9_8765_4321u64.to_be_bytes());

        // Name table: one UTF8 entry per section name.
        let mut table = Vec::new();
        for (name, _) in sections {
            table.push(1u8);
            write_nat(&mut table, name.len() as u64);
            table.extend_from_slice(name.as_bytes());
        }
        write_nat(&mut out, table.len() as u64);
        out.extend_from_slice(&table);

        for (i, (_, body)) in sections.iter().enumerate() {
            write_nat(&mut out, i as u64 + 1);
            write_nat(&mut out, body.len() as u64);
            out.extend_from_slice(body);
        }
        out
    }

    #[test]
    fn parse_valid_artifact() {
        let bytes = artifact_bytes(MAJOR_VERSION, &[("ASTs", &[0x85, 0x86])]);
        let artifact = TastyArtifact::parse(bytes).unwrap();

        assert_eq!(artifact.version(), (MAJOR_VERSION, 0));
        assert_eq!(
            artifact.uuid(),
            (0x1234_5678_9abc_def0, 0x0fed_cba9_8765_4321)
        );
        assert_eq!(artifact.name_table().len(), 1);

        let mut asts = artifact.asts().unwrap();
        assert_eq!(asts.read_nat().unwrap(), 5);
        assert_eq!(asts.read_nat().unwrap(), 6);
        assert!(asts.is_at_end());
    }

    #[test]
    fn section_addresses_are_relative() {
        let bytes = artifact_bytes(MAJOR_VERSION, &[("Other", &[1]), ("ASTs", &[0x85])]);
        let artifact = TastyArtifact::parse(bytes).unwrap();
        let asts = artifact.asts().unwrap();
        assert_eq!(asts.current_addr(), crate::bytes::Addr(0));
        assert_eq!(asts.end_addr(), crate::bytes::Addr(1));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = artifact_bytes(MAJOR_VERSION, &[("ASTs", &[])]);
        bytes[0] = b'X';
        let err = TastyArtifact::parse(bytes).unwrap_err();
        assert!(err.to_string().contains("not a TASTy artifact"));
    }

    #[test]
    fn future_major_version_is_rejected() {
        let bytes = artifact_bytes(MAJOR_VERSION + 1, &[("ASTs", &[])]);
        let err = TastyArtifact::parse(bytes).unwrap_err();
        assert!(err.to_string().contains("unsupported TASTy version"));
    }

    #[test]
    fn sections_outlive_the_artifact() {
        let bytes = artifact_bytes(MAJOR_VERSION, &[("ASTs", &[0x85])]);
        let artifact = TastyArtifact::parse(bytes).unwrap();
        let mut asts = artifact.asts().unwrap();
        let names = artifact.into_name_table();
        assert_eq!(names.len(), 1);
        assert_eq!(asts.read_nat().unwrap(), 5);
    }

    #[test]
    fn missing_asts_section_is_reported() {
        let bytes = artifact_bytes(MAJOR_VERSION, &[("Positions", &[])]);
        let artifact = TastyArtifact::parse(bytes).unwrap();
        assert!(artifact.asts().is_err());
        assert!(artifact.section("Positions").is_some());
    }
}
