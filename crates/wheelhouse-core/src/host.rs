//! Host detection and the platform tags the host can install.
//!
//! The platform list is ordered most-specific first, the same order pip
//! walks when picking a wheel. It still contains the bare `linux_<arch>`
//! tag; [`TagUniverse`](crate::tags::TagUniverse) is responsible for
//! dropping it.

use std::process::Command;

use regex::Regex;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::process;

/// C library flavour and version of a Linux host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Libc {
    /// GNU libc, e.g. 2.35.
    Glibc {
        /// Major version.
        major: u32,
        /// Minor version.
        minor: u32,
    },
    /// musl libc, e.g. 1.2.
    Musl {
        /// Major version.
        major: u32,
        /// Minor version.
        minor: u32,
    },
}

/// Operating system of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOs {
    /// Linux with the given libc.
    Linux {
        /// C library the host links against.
        libc: Libc,
    },
    /// macOS `major.minor`.
    MacOs {
        /// Major version, e.g. 14.
        major: u32,
        /// Minor version.
        minor: u32,
    },
}

/// The machine we are running on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    /// OS and its version.
    pub os: HostOs,
    /// Machine name as it appears in platform tags (`x86_64`, `aarch64`,
    /// `arm64`).
    pub machine: String,
}

impl Host {
    /// Construct a host from known parts; used by tests and by callers that
    /// already probed the system.
    pub fn new(os: HostOs, machine: &str) -> Self {
        Self {
            os,
            machine: machine.to_string(),
        }
    }

    /// Probe the running system.
    ///
    /// # Errors
    ///
    /// Fails on an OS other than Linux or macOS, or when the libc/OS version
    /// cannot be read.
    pub fn detect() -> Result<Self> {
        let os = if cfg!(target_os = "macos") {
            let out = process::output(Command::new("sw_vers").arg("-productVersion"))?;
            let (major, minor) = parse_macos_version(&out)
                .ok_or_else(|| ConfigError::UnsupportedHost(format!("macOS {}", out.trim())))?;
            HostOs::MacOs { major, minor }
        } else if cfg!(target_os = "linux") {
            // musl's ldd prints its banner to stderr and exits 1.
            let out = Command::new("ldd")
                .arg("--version")
                .output()
                .map_err(|e| ConfigError::UnsupportedHost(format!("ldd --version: {e}")))?;
            let text = format!(
                "{}{}",
                String::from_utf8_lossy(&out.stdout),
                String::from_utf8_lossy(&out.stderr)
            );
            let libc = parse_ldd_version(&text)
                .ok_or_else(|| ConfigError::UnsupportedHost("unrecognised libc".to_string()))?;
            HostOs::Linux { libc }
        } else {
            return Err(ConfigError::UnsupportedHost(std::env::consts::OS.to_string()).into());
        };

        let machine = machine_name(&os, std::env::consts::ARCH);
        let host = Self { os, machine };
        debug!(?host, "detected host");
        Ok(host)
    }

    /// Whether this is a macOS host.
    pub fn is_macos(&self) -> bool {
        matches!(self.os, HostOs::MacOs { .. })
    }

    /// Every platform tag installable on this host, most specific first.
    pub fn platform_tags(&self) -> Vec<String> {
        match self.os {
            HostOs::Linux { libc } => linux_platforms(libc, &self.machine),
            HostOs::MacOs { major, minor } => mac_platforms(major, minor, &self.machine),
        }
    }

    /// The manylinux policy auditwheel should repair to on this host,
    /// e.g. `manylinux_2_35_x86_64`.
    pub fn repair_policy(&self) -> Option<String> {
        match self.os {
            HostOs::Linux {
                libc: Libc::Glibc { major, minor },
            } => Some(format!("manylinux_{major}_{minor}_{}", self.machine)),
            HostOs::Linux {
                libc: Libc::Musl { major, minor },
            } => Some(format!("musllinux_{major}_{minor}_{}", self.machine)),
            HostOs::MacOs { .. } => None,
        }
    }
}

fn machine_name(os: &HostOs, arch: &str) -> String {
    match (os, arch) {
        (HostOs::MacOs { .. }, "aarch64") => "arm64".to_string(),
        (_, "x86") => "i686".to_string(),
        (_, other) => other.to_string(),
    }
}

/// Parse `sw_vers -productVersion` output (`14.2.1`) into `(major, minor)`.
pub fn parse_macos_version(output: &str) -> Option<(u32, u32)> {
    let mut parts = output.trim().split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().map_or(Some(0), |m| m.parse().ok())?;
    Some((major, minor))
}

/// Parse the banner of `ldd --version` into a libc flavour and version.
pub fn parse_ldd_version(output: &str) -> Option<Libc> {
    let version = Regex::new(r"(\d+)\.(\d+)").ok()?;
    if output.to_lowercase().contains("musl") {
        let line = output.lines().find(|l| l.starts_with("Version"))?;
        let caps = version.captures(line)?;
        return Some(Libc::Musl {
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
        });
    }
    // glibc: "ldd (Ubuntu GLIBC 2.35-0ubuntu3) 2.35"
    let first = output.lines().next()?;
    let last = first.split_whitespace().last()?;
    let caps = version.captures(last)?;
    Some(Libc::Glibc {
        major: caps[1].parse().ok()?,
        minor: caps[2].parse().ok()?,
    })
}

fn linux_platforms(libc: Libc, machine: &str) -> Vec<String> {
    let mut platforms = Vec::new();
    match libc {
        Libc::Glibc { major, minor } => {
            let legacy_ok = matches!(machine, "x86_64" | "i686");
            let floor = if legacy_ok { 4 } else { 16 };
            if major == 2 {
                for m in (floor + 1..=minor).rev() {
                    platforms.push(format!("manylinux_2_{m}_{machine}"));
                    let alias = match m {
                        17 => Some("manylinux2014"),
                        12 if legacy_ok => Some("manylinux2010"),
                        5 if legacy_ok => Some("manylinux1"),
                        _ => None,
                    };
                    if let Some(alias) = alias {
                        platforms.push(format!("{alias}_{machine}"));
                    }
                }
            }
        }
        Libc::Musl { major, minor } => {
            for m in (0..=minor).rev() {
                platforms.push(format!("musllinux_{major}_{m}_{machine}"));
            }
        }
    }
    platforms.push(format!("linux_{machine}"));
    platforms
}

fn mac_binary_formats(major: u32, minor: u32, machine: &str) -> Vec<&'static str> {
    let mut formats: Vec<&'static str> = match machine {
        "x86_64" => {
            if major == 10 && minor < 4 {
                return Vec::new();
            }
            vec!["x86_64", "intel", "fat64", "fat32"]
        }
        "arm64" => vec!["arm64"],
        _ => return Vec::new(),
    };
    formats.push("universal2");
    if machine == "x86_64" {
        formats.push("universal");
    }
    formats
}

fn mac_platforms(major: u32, minor: u32, machine: &str) -> Vec<String> {
    let mut platforms = Vec::new();
    if major == 10 {
        for m in (0..=minor).rev() {
            for fmt in mac_binary_formats(10, m, machine) {
                platforms.push(format!("macosx_10_{m}_{fmt}"));
            }
        }
        return platforms;
    }

    for maj in (11..=major).rev() {
        for fmt in mac_binary_formats(maj, 0, machine) {
            platforms.push(format!("macosx_{maj}_0_{fmt}"));
        }
    }
    // Big Sur and later can still load anything built for 10.x.
    for m in (4..=16).rev() {
        if machine == "x86_64" {
            for fmt in mac_binary_formats(10, m, machine) {
                platforms.push(format!("macosx_10_{m}_{fmt}"));
            }
        } else {
            platforms.push(format!("macosx_10_{m}_universal2"));
        }
    }
    platforms
}
