//! CPU architectures as reported by wheel platform tags and binary headers.
//!
//! macOS and Linux spell the same 64-bit ARM architecture differently
//! (`arm64` in Mach-O headers and `macosx_*` tags, `aarch64` in ELF headers
//! and `manylinux_*` tags). Both spellings are kept distinct so that the
//! expected set decoded from a filename can be compared directly against
//! what the host's introspection tool reports.
//!
//! # Example
//!
//! ```
//! use wheelhouse_schema::Arch;
//!
//! let arch: Arch = "ARM64".parse().unwrap();
//! assert_eq!(arch, Arch::Arm64);
//! assert_eq!(arch.to_string(), "arm64");
//! ```

use serde::{Deserialize, Serialize};

/// A CPU architecture a native binary can target.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// 64-bit ARM as spelled on macOS (`arm64`).
    Arm64,
    /// 64-bit ARM as spelled on Linux (`aarch64`).
    Aarch64,
    /// `x86_64`, identical on every platform.
    X86_64,
    /// Any other CPU type an introspection tool reported (`i386`, `ppc`, ...).
    Other(String),
}

impl Arch {
    /// Convert to string representation
    pub fn as_str(&self) -> &str {
        match self {
            Self::Arm64 => "arm64",
            Self::Aarch64 => "aarch64",
            Self::X86_64 => "x86_64",
            Self::Other(name) => name,
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "" => Err("Empty architecture".to_string()),
            "arm64" => Ok(Self::Arm64),
            "aarch64" => Ok(Self::Aarch64),
            "x86_64" => Ok(Self::X86_64),
            _ => Ok(Self::Other(lower)),
        }
    }
}
