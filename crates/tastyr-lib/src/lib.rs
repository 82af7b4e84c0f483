//! TASTy tree/symbol unpickler.
//!
//! Decodes the `ASTs` section of a TASTy artifact into a Scala 2.x-style
//! symbol table: a two-pass reader that creates symbol shells at exact
//! byte offsets, completes each symbol lazily on first info demand, and
//! reconstructs the full type grammar along the way.
//!
//! ```no_run
//! use std::rc::Rc;
//! use tastyr_core::{Name, TastyArtifact};
//! use tastyr_lib::host::HostEnv;
//! use tastyr_lib::{Settings, Unpickler};
//!
//! # fn run(bytes: Vec<u8>) -> tastyr_core::Result<()> {
//! let artifact = TastyArtifact::parse(bytes)?;
//! let asts = artifact.asts()?;
//!
//! let env = HostEnv::new(Settings::default());
//! let owner = env.symtab.module_class(env.mirror.empty_package());
//! let class_root = env.symtab.new_class(owner, Name::simple("Example"), Default::default());
//! let (module_root, _) = env.symtab.new_module(
//!     owner,
//!     Name::simple("Example"),
//!     Default::default(),
//!     Default::default(),
//! );
//!
//! let unpickler = Unpickler::new(
//!     Rc::clone(&env),
//!     artifact.into_name_table(),
//!     asts,
//!     "Example.tasty",
//! );
//! unpickler.enter_top_level(class_root, module_root)?;
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod host;
pub mod owner_tree;
pub mod reporter;
pub mod settings;
pub mod unpickler;

#[cfg(test)]
mod test_support;

pub use context::{Context, Mode};
pub use reporter::{Diagnostic, Reporter, Severity};
pub use settings::Settings;
pub use unpickler::Unpickler;
