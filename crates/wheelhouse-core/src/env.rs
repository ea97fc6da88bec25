//! Environment overlay for build subprocesses.
//!
//! Dependency installs and prebuild steps adjust compiler and search paths
//! for the duration of one build. Instead of mutating the process
//! environment, they write into a [`BuildEnv`] that is applied to each
//! `Command` the builder spawns, and restored by their guards on exit.

use std::collections::BTreeMap;
use std::process::Command;

/// Variables layered over the inherited process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnv {
    vars: BTreeMap<String, String>,
}

impl BuildEnv {
    /// An empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective value: the overlay first, then the process environment.
    pub fn get(&self, name: &str) -> Option<String> {
        self.vars
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())
    }

    /// Set `name`, shadowing any inherited value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.vars.insert(name.to_string(), value.into());
    }

    /// Put `value` in front of the current value of `name`, joined by `sep`.
    pub fn prepend(&mut self, name: &str, value: &str, sep: &str) {
        let joined = match self.get(name) {
            Some(existing) => format!("{value}{sep}{existing}"),
            None => value.to_string(),
        };
        self.set(name, joined);
    }

    /// Apply the overlay to a command about to be spawned.
    pub fn apply<'a>(&self, cmd: &'a mut Command) -> &'a mut Command {
        cmd.envs(&self.vars)
    }
}
