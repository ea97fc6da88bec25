//! The wheelhouse engine.
//!
//! Given a manifest of pinned packages, decide for every supported
//! interpreter whether a compatible wheel already exists internally, can be
//! taken from the public index, or has to be compiled and repaired; then
//! gate each new artifact behind an install-and-import check.

pub mod acquire;
pub mod arch;
pub mod availability;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod env;
pub mod error;
pub mod host;
pub mod manifest;
pub mod platform;
pub mod prebuild;
pub mod process;
pub mod python;
pub mod resolver;
pub mod tags;
pub mod verify;

pub mod reporter;

pub use availability::AvailabilityIndex;
pub use config::Config;
pub use error::{Result, WheelhouseError};
pub use manifest::{Manifest, ManifestEntry};
pub use reporter::{NullReporter, Reporter};
pub use resolver::{BuildResult, Resolver, RunReport};

/// User Agent string for catalog requests
pub const USER_AGENT: &str = concat!("wheelhouse/", env!("CARGO_PKG_VERSION"));
