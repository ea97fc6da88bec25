//! Error taxonomy for a mirror run.
//!
//! Every variant here is fatal for the run. Architecture rejections during
//! acquisition are not errors: they come back as
//! [`ArchMismatch`](crate::arch::ArchMismatch) values and the caller moves
//! on to the next strategy.

use std::path::PathBuf;

use thiserror::Error;
use wheelhouse_schema::{FilenameError, PythonVersion, TagSet, VersionError};

use crate::arch::ArchMismatch;

/// Malformed manifest or settings. Always reported with the offending key.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The manifest file could not be read.
    #[error("{0}: not found")]
    ManifestNotFound(PathBuf),

    /// The manifest is not valid INI.
    #[error("{path}:{line}: {message}")]
    Syntax {
        /// Manifest path as given.
        path: String,
        /// 1-based line number.
        line: usize,
        /// What was wrong with the line.
        message: String,
    },

    /// A section header is not `name==version`.
    #[error("section [{section}] must be `[{section}==...]`")]
    MalformedSection {
        /// Section header as written.
        section: String,
    },

    /// Two sections name the same package and version.
    #[error("duplicate section [{section}]")]
    DuplicateSection {
        /// Section header as written.
        section: String,
    },

    /// A section carries keys the manifest does not define.
    #[error("unexpected attrs for {section}: {}", keys.join(", "))]
    UnknownKeys {
        /// Section header as written.
        section: String,
        /// Unknown keys, sorted.
        keys: Vec<String>,
    },

    /// A pinned version or `python_versions` constraint does not parse.
    #[error("{section}: {source}")]
    InvalidVersion {
        /// Section header as written.
        section: String,
        /// Parse failure.
        #[source]
        source: VersionError,
    },

    /// A wheel names an interpreter tag we cannot map to CPython versions.
    #[error("unexpected tag: {tag}")]
    UnexpectedTag {
        /// Offending tag.
        tag: String,
    },

    /// A wheel's tags and the entry's constraint leave nothing to verify.
    #[error("no interpreters found for {tags}")]
    NoInterpreters {
        /// Tags of the wheel.
        tags: TagSet,
    },

    /// A wheel in the output directory has no manifest entry.
    #[error("{filename}: no manifest entry for {name}=={version}")]
    MissingEntry {
        /// Wheel filename.
        filename: String,
        /// Normalized project name from the filename.
        name: String,
        /// Version from the filename.
        version: String,
    },

    /// An environment setting is malformed.
    #[error("invalid setting {key}={value:?}: {message}")]
    InvalidSetting {
        /// Variable name.
        key: &'static str,
        /// Value as found.
        value: String,
        /// Why it was rejected.
        message: String,
    },

    /// A platform tag names no architecture we know.
    #[error("unexpected platform tag {0:?}")]
    UnexpectedPlatform(String),

    /// The host OS or libc is not supported.
    #[error("unsupported host platform: {0}")]
    UnsupportedHost(String),
}

/// A subprocess or post-build check failed while producing an artifact.
#[derive(Error, Debug)]
pub enum BuildError {
    /// The program could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// Command line.
        command: String,
        /// Spawn failure.
        #[source]
        source: std::io::Error,
    },

    /// The program exited non-zero.
    #[error("`{command}` failed with {status}")]
    Command {
        /// Command line.
        command: String,
        /// Exit status as printed by the OS.
        status: String,
    },

    /// The program succeeded but printed something we cannot parse.
    #[error("unexpected output from `{command}`: {output}")]
    ToolOutput {
        /// Command line.
        command: String,
        /// Captured output.
        output: String,
    },

    /// The sdist looks native but the build produced no shared library.
    #[error("{package} expected binary as {reason}")]
    ExpectedBinary {
        /// `name==version`.
        package: String,
        /// Evidence found in the sdist.
        reason: String,
    },

    /// A tool was expected to leave exactly one file behind.
    #[error("expected exactly one {what} in {dir}, found {found:?}")]
    UnexpectedOutput {
        /// Kind of file, e.g. `wheel`.
        what: &'static str,
        /// Directory inspected.
        dir: PathBuf,
        /// Entries found there, sorted.
        found: Vec<String>,
    },

    /// The source distribution is not a zip, tar or tar.gz.
    #[error("unsupported source distribution format: {0}")]
    UnsupportedSdist(String),

    /// Any failure while resolving one `(package, interpreter)` pair.
    #[error("{package}@{python}: {source}")]
    Pair {
        /// `name==version`.
        package: String,
        /// Interpreter being resolved.
        python: PythonVersion,
        /// Underlying failure.
        #[source]
        source: Box<WheelhouseError>,
    },
}

/// A produced or downloaded artifact failed its final gate.
#[derive(Error, Debug)]
pub enum VerifyError {
    /// A native member does not target what the filename claims.
    #[error("{filename}: architecture check failed\n{mismatch}")]
    ArchMismatch {
        /// Wheel filename.
        filename: String,
        /// First offending member.
        mismatch: ArchMismatch,
    },

    /// The wheel did not install into a fresh environment.
    #[error("{filename}: failed to install on python {python} ({source})\nhint: {hint}")]
    InstallFailed {
        /// Wheel filename.
        filename: String,
        /// Interpreter of the environment.
        python: PythonVersion,
        /// Manifest keys that can work around the failure.
        hint: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<WheelhouseError>,
    },

    /// A top-level module failed to import after install.
    #[error("{filename}: `import {module}` failed on python {python} ({source})\nhint: {hint}")]
    ImportFailed {
        /// Wheel filename.
        filename: String,
        /// Module that failed.
        module: String,
        /// Interpreter of the environment.
        python: PythonVersion,
        /// Manifest key that can work around the failure.
        hint: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<WheelhouseError>,
    },

    /// A native member's path escapes the archive root.
    #[error("{filename}: member {member} escapes the archive root")]
    UnsafeMember {
        /// Wheel filename.
        filename: String,
        /// Offending member path.
        member: String,
    },

    /// The wheel has no `*.dist-info/RECORD`.
    #[error("{0}: wheel has no RECORD")]
    MissingRecord(String),
}

/// Fetching or decoding the remote catalog failed.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// The index base is not a URL.
    #[error("invalid index url {url}: {message}")]
    BadUrl {
        /// URL as configured.
        url: String,
        /// Parse failure.
        message: String,
    },

    /// The server answered with a non-success status.
    #[error("{url}: HTTP {status}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A catalog line is not a valid record.
    #[error("catalog line {line}: {source}")]
    Decode {
        /// 1-based line number.
        line: usize,
        /// JSON failure.
        #[source]
        source: serde_json::Error,
    },

    /// A wheel in the output directory is already in the catalog.
    #[error("{0}: already published")]
    AlreadyPublished(String),
}

/// Top-level error for the engine.
#[derive(Error, Debug)]
pub enum WheelhouseError {
    /// Manifest or settings.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Acquiring or building an artifact.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// Final artifact checks.
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// Remote catalog.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// A file that should be a wheel has a malformed name.
    #[error(transparent)]
    Filename(#[from] FilenameError),

    /// Filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip archive failure.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Engine result type.
pub type Result<T, E = WheelhouseError> = std::result::Result<T, E>;
