//! Shared types for wheelhouse.
//!
//! Everything here is a pure function of its input: compatibility tags as
//! they appear in wheel filenames, PEP 440 versions and specifiers, the
//! `(major, minor)` interpreter versions we build for, and the CPU
//! architectures a binary can target. The engine in `wheelhouse-core`
//! builds on these.

pub mod arch;
pub mod name;
pub mod python;
pub mod tag;
pub mod version;
pub mod wheel;

// Re-exports
pub use arch::*;
pub use name::ProjectName;
pub use python::PythonVersion;
pub use tag::{Tag, TagError, TagSet};
pub use version::{Specifier, SpecifierSet, Version, VersionError};
pub use wheel::{FilenameError, WheelFilename};
