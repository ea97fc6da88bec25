//! Console output for a run.
//!
//! Progress lines go to stdout in the order the resolver produces them so
//! CI logs read top to bottom: a `=== name==version@python` header per pair
//! followed by `-> ...` step lines.

use std::io::Write;

use wheelhouse_core::Reporter;
use wheelhouse_schema::{ProjectName, PythonVersion, Version};

/// Line-oriented reporter writing to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter {
    show_skips: bool,
}

impl ConsoleReporter {
    /// Pairs satisfied by the published index are not printed unless
    /// `show_skips` is set.
    pub fn new(show_skips: bool) -> Self {
        Self { show_skips }
    }

    fn line(&self, msg: &str) {
        let mut out = std::io::stdout().lock();
        // stdout may be a closed pipe.
        let _ = writeln!(out, "{msg}");
    }
}

/// Human-readable duration for the summary line.
pub fn format_elapsed(secs: f64) -> String {
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else {
        let total = secs.round() as u64;
        format!("{}m{:02}s", total / 60, total % 60)
    }
}

impl Reporter for ConsoleReporter {
    fn pair(&self, name: &ProjectName, version: &Version, python: PythonVersion) {
        self.line(&format!("=== {name}=={version}@{python}"));
    }

    fn skipped(&self, name: &ProjectName, version: &Version, python: PythonVersion) {
        if self.show_skips {
            self.line(&format!("--- {name}=={version}@{python}: already published"));
        }
    }

    fn just_built(&self) {
        self.line("-> just built!");
    }

    fn building(&self) {
        self.line("-> building...");
    }

    fn downloaded(&self, filename: &str) {
        self.line(&format!("-> downloaded! {filename}"));
    }

    fn built(&self, filename: &str) {
        self.line(&format!("-> built! {filename}"));
    }

    fn ignored(&self, filename: &str, reason: &str) {
        self.line(&format!("-> ignoring: {filename}\n{reason}"));
    }

    fn validating(&self, filename: &str, python: PythonVersion) {
        self.line(&format!("validating {python}: {filename}"));
    }

    fn info(&self, msg: &str) {
        self.line(msg);
    }

    fn warning(&self, msg: &str) {
        self.line(&format!("warning: {msg}"));
    }

    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        let noun = if count == 1 { "wheel" } else { "wheels" };
        self.line(&format!(
            "{count} {noun} {action} in {}",
            format_elapsed(elapsed_secs)
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(2.345), "2.3s");
        assert_eq!(format_elapsed(125.0), "2m05s");
    }
}
