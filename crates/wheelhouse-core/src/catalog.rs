//! The internal index's machine-readable catalog.
//!
//! `<pypi-url>/packages.json` is newline-delimited JSON, one record per
//! published file. It is the only source of truth for what is already
//! published; the resolver reads it once per run, and the `catalog` command
//! appends records for freshly produced wheels.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::{BuildError, CatalogError, Result};
use crate::process;

/// One line of `packages.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Basename of the published file.
    pub filename: String,
    /// `sha256=<hex>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Unix timestamp of the commit that published it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_timestamp: Option<i64>,
    /// `git@<short hash>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_by: Option<String>,
    /// `Requires-Dist` headers from the wheel metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_dist: Option<Vec<String>>,
    /// `Requires-Python` header from the wheel metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_python: Option<String>,
    /// Anything else the publisher wrote; preserved on rewrite.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn join(base: &str, path: &str) -> Result<Url, CatalogError> {
    let bad = |message: String| CatalogError::BadUrl {
        url: base.to_string(),
        message,
    };
    Url::parse(base)
        .map_err(|e| bad(e.to_string()))?
        .join(path)
        .map_err(|e| bad(e.to_string()))
}

/// URL of the catalog, resolved relative to `pypi_url` the way a browser
/// would (so the base should end in `/`).
///
/// # Errors
///
/// [`CatalogError::BadUrl`] if `pypi_url` is not a URL.
pub fn catalog_url(pypi_url: &str) -> Result<Url, CatalogError> {
    join(pypi_url, "packages.json")
}

/// URL of the internal simple index used for build-time dependencies.
///
/// # Errors
///
/// [`CatalogError::BadUrl`] if `pypi_url` is not a URL.
pub fn index_url(pypi_url: &str) -> Result<Url, CatalogError> {
    join(pypi_url, "simple")
}

/// Decode newline-delimited JSON records. Blank lines are ignored.
///
/// # Errors
///
/// [`CatalogError::Decode`] naming the 1-based line that failed.
pub fn parse_catalog(body: &str) -> Result<Vec<CatalogRecord>, CatalogError> {
    body.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| CatalogError::Decode {
                line: i + 1,
                source,
            })
        })
        .collect()
}

/// Encode records back to newline-delimited JSON.
///
/// # Errors
///
/// Serialization failures.
pub fn render_catalog(records: &[CatalogRecord]) -> Result<String, CatalogError> {
    let mut out = String::new();
    for (i, record) in records.iter().enumerate() {
        let line = serde_json::to_string(record)
            .map_err(|source| CatalogError::Decode { line: i + 1, source })?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Fetch and decode the published catalog.
///
/// # Errors
///
/// Network failures, non-2xx responses, and malformed lines are all fatal.
pub async fn fetch_catalog(client: &Client, pypi_url: &str) -> Result<Vec<CatalogRecord>, CatalogError> {
    let url = catalog_url(pypi_url)?;
    debug!(%url, "fetching catalog");

    let resp = client.get(url.clone()).send().await?;
    if !resp.status().is_success() {
        return Err(CatalogError::Status {
            url: url.to_string(),
            status: resp.status().as_u16(),
        });
    }
    let body = resp.text().await?;
    let records = parse_catalog(&body)?;
    info!(count = records.len(), "fetched catalog");
    Ok(records)
}

/// The commit a new record is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Abbreviated hash.
    pub short_hash: String,
    /// Commit timestamp (seconds since the epoch).
    pub timestamp: i64,
}

impl CommitInfo {
    /// Read `HEAD` of the git repository in the current directory.
    ///
    /// # Errors
    ///
    /// `git` failing or printing something other than `<hash> <time>`.
    pub fn from_git() -> Result<Self> {
        let mut cmd = Command::new("git");
        cmd.args(["show", "--no-patch", "--format=%h %ct"]);
        let out = process::output(&mut cmd)?;
        Self::parse(&out).ok_or_else(|| {
            BuildError::ToolOutput {
                command: process::describe(&cmd),
                output: out.trim().to_string(),
            }
            .into()
        })
    }

    fn parse(output: &str) -> Option<Self> {
        let (hash, time) = output.trim().split_once(' ')?;
        Some(Self {
            short_hash: hash.to_string(),
            timestamp: time.trim().parse().ok()?,
        })
    }
}

/// `Requires-Dist` and `Requires-Python` from a METADATA document.
///
/// Header names are case-insensitive; continuation lines are folded.
pub fn parse_metadata(text: &str) -> (Vec<String>, Option<String>) {
    let mut headers: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            break;
        }
        if line.starts_with([' ', '\t']) {
            if let Some((_, value)) = headers.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_lowercase(), value.trim().to_string()));
        }
    }

    let requires_dist = headers
        .iter()
        .filter(|(k, _)| k == "requires-dist")
        .map(|(_, v)| v.clone())
        .collect();
    let requires_python = headers
        .into_iter()
        .find(|(k, _)| k == "requires-python")
        .map(|(_, v)| v);
    (requires_dist, requires_python)
}

fn read_metadata(path: &Path) -> Result<String> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let name = archive
        .file_names()
        .find(|n| n.ends_with(".dist-info/METADATA") && n.matches('/').count() == 1)
        .map(str::to_string)
        .ok_or(zip::result::ZipError::FileNotFound)?;
    let mut text = String::new();
    archive.by_name(&name)?.read_to_string(&mut text)?;
    Ok(text)
}

/// Build the catalog record for a freshly produced wheel.
///
/// # Errors
///
/// Read failures, or a wheel without a top-level `*.dist-info/METADATA`.
pub fn record_for_wheel(path: &Path, commit: &CommitInfo) -> Result<CatalogRecord> {
    let mut hasher = Sha256::new();
    std::io::copy(&mut File::open(path)?, &mut hasher)?;
    let digest = hex::encode(hasher.finalize());

    let (requires_dist, requires_python) = parse_metadata(&read_metadata(path)?);

    Ok(CatalogRecord {
        filename: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        hash: Some(format!("sha256={digest}")),
        upload_timestamp: Some(commit.timestamp),
        uploaded_by: Some(format!("git@{}", commit.short_hash)),
        requires_dist: (!requires_dist.is_empty()).then_some(requires_dist),
        requires_python: requires_python.filter(|s| !s.is_empty()),
        extra: serde_json::Map::new(),
    })
}

/// Wheel files under `dist`, sorted so output is reproducible.
///
/// # Errors
///
/// Directory walk failures.
pub fn collect_wheels(dist: &Path) -> Result<Vec<PathBuf>> {
    let mut wheels = Vec::new();
    for entry in WalkDir::new(dist) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == "whl") {
            wheels.push(entry.into_path());
        }
    }
    wheels.sort();
    Ok(wheels)
}

/// Append records for every wheel in `dist` to the published catalog.
///
/// The first wheel with a given basename wins (pure-Python wheels may be
/// produced on several hosts).
///
/// # Errors
///
/// [`CatalogError::AlreadyPublished`] if a wheel in `dist` is already in
/// `published`, plus read failures.
pub fn extend_catalog(
    published: Vec<CatalogRecord>,
    dist: &Path,
    commit: &CommitInfo,
) -> Result<Vec<CatalogRecord>> {
    let on_index: BTreeSet<String> = published.iter().map(|r| r.filename.clone()).collect();
    let mut seen = BTreeSet::new();
    let mut records = published;

    for path in collect_wheels(dist)? {
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if on_index.contains(&basename) {
            return Err(CatalogError::AlreadyPublished(basename).into());
        }
        if !seen.insert(basename.clone()) {
            debug!(%basename, "duplicate wheel, keeping the first");
            continue;
        }
        records.push(record_for_wheel(&path, commit)?);
    }
    Ok(records)
}

/// Write records to `path` as newline-delimited JSON.
///
/// # Errors
///
/// Encode and write failures.
pub fn write_catalog(path: &Path, records: &[CatalogRecord]) -> Result<()> {
    let body = render_catalog(records)?;
    File::create(path)?.write_all(body.as_bytes())?;
    Ok(())
}
