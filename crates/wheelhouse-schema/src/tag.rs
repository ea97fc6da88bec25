//! Compatibility tags as embedded in wheel filenames.
//!
//! A wheel filename carries three dot-compressible components,
//! `<interpreters>-<abis>-<platforms>`; the tag set is their cartesian
//! product. `py2.py3-none-any` therefore expands to `py2-none-any` and
//! `py3-none-any`.

use std::collections::BTreeSet;

use thiserror::Error;

/// Errors produced while parsing a tag triple.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    /// The string did not contain exactly three `-`-separated components.
    #[error("invalid tag {0:?}: expected <interpreter>-<abi>-<platform>")]
    Malformed(String),
}

/// One `(interpreter, abi, platform)` triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    /// Interpreter tag, e.g. `cp311`, `py3`.
    pub interpreter: String,
    /// ABI tag, e.g. `cp311`, `abi3`, `none`.
    pub abi: String,
    /// Platform tag, e.g. `manylinux_2_17_x86_64`, `any`.
    pub platform: String,
}

impl Tag {
    /// Build a tag, lowercasing every component.
    pub fn new(interpreter: &str, abi: &str, platform: &str) -> Self {
        Self {
            interpreter: interpreter.to_lowercase(),
            abi: abi.to_lowercase(),
            platform: platform.to_lowercase(),
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.interpreter, self.abi, self.platform)
    }
}

/// A set of tags. Wheels and interpreters match when their sets intersect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(BTreeSet<Tag>);

impl TagSet {
    /// An empty tag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a possibly compressed tag string such as `py2.py3-none-any`.
    ///
    /// # Errors
    ///
    /// Returns [`TagError::Malformed`] unless the input has exactly three
    /// non-empty `-`-separated components.
    pub fn parse(s: &str) -> Result<Self, TagError> {
        let parts: Vec<&str> = s.split('-').collect();
        let [interpreters, abis, platforms] = parts.as_slice() else {
            return Err(TagError::Malformed(s.to_string()));
        };
        if [interpreters, abis, platforms].iter().any(|p| p.is_empty()) {
            return Err(TagError::Malformed(s.to_string()));
        }

        let mut tags = BTreeSet::new();
        for interpreter in interpreters.split('.') {
            for abi in abis.split('.') {
                for platform in platforms.split('.') {
                    tags.insert(Tag::new(interpreter, abi, platform));
                }
            }
        }
        Ok(Self(tags))
    }

    /// Add a tag to the set.
    pub fn insert(&mut self, tag: Tag) -> bool {
        self.0.insert(tag)
    }

    /// Whether the set contains `tag`.
    pub fn contains(&self, tag: &Tag) -> bool {
        self.0.contains(tag)
    }

    /// Whether the two sets share at least one tag.
    pub fn intersects(&self, other: &TagSet) -> bool {
        !self.0.is_disjoint(&other.0)
    }

    /// Iterate over the tags in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    /// Number of tags in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Tag> for TagSet {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a Tag;
    type IntoIter = std::collections::btree_set::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl std::fmt::Display for TagSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tags: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "{{{}}}", tags.join(", "))
    }
}
