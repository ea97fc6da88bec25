//! AvailabilityIndex: which `(name, version, tags)` wheels already exist.
//!
//! Two sources are merged at query time: wheels already published to the
//! internal index (loaded once from the remote catalog) and wheels produced
//! earlier in this run. The index only grows.

use std::collections::BTreeMap;

use tracing::debug;
use wheelhouse_schema::{ProjectName, TagSet, Version, WheelFilename};

use crate::catalog::CatalogRecord;
use crate::error::Result;

/// Where a satisfying wheel came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Listed in the published catalog.
    Published,
    /// Produced earlier in this run.
    Produced,
}

type Known = BTreeMap<ProjectName, Vec<(Version, TagSet)>>;

/// Queryable set of known wheels.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityIndex {
    published: Known,
    produced: Known,
}

fn add(known: &mut Known, wheel: &WheelFilename) -> bool {
    let versions = known.entry(wheel.name.clone()).or_default();
    if versions
        .iter()
        .any(|(v, tags)| *v == wheel.version && *tags == wheel.tags)
    {
        return false;
    }
    versions.push((wheel.version.clone(), wheel.tags.clone()));
    true
}

fn matches(known: &Known, name: &ProjectName, version: &Version, tags: &TagSet) -> bool {
    known
        .get(name.as_str())
        .is_some_and(|versions| versions.iter().any(|(v, t)| v == version && t.intersects(tags)))
}

impl AvailabilityIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the published source from an iterator of wheels.
    pub fn with_published<I: IntoIterator<Item = WheelFilename>>(wheels: I) -> Self {
        let mut index = Self::new();
        for wheel in wheels {
            add(&mut index.published, &wheel);
        }
        index
    }

    /// Seed the published source from catalog records.
    ///
    /// # Errors
    ///
    /// Any record whose filename is not a valid wheel filename.
    pub fn from_catalog(records: &[CatalogRecord]) -> Result<Self> {
        let wheels = records
            .iter()
            .map(|r| WheelFilename::parse(&r.filename))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = wheels.len(), "loaded published wheels");
        Ok(Self::with_published(wheels))
    }

    /// Record a wheel produced in this run. Re-adding is a no-op.
    pub fn record(&mut self, wheel: &WheelFilename) {
        if add(&mut self.produced, wheel) {
            debug!(filename = %wheel.filename, "recorded produced wheel");
        }
    }

    /// Which source, if any, has a wheel with this exact name and version
    /// installable with `tags`. Published wins over produced.
    pub fn satisfied_by(&self, name: &ProjectName, version: &Version, tags: &TagSet) -> Option<Source> {
        if matches(&self.published, name, version, tags) {
            Some(Source::Published)
        } else if matches(&self.produced, name, version, tags) {
            Some(Source::Produced)
        } else {
            None
        }
    }
}
