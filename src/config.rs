//! Resolver configuration

use crate::backend::Mode;
use crate::error::{ResolveError, Result};
use serde::{Deserialize, Serialize};

/// Options for [`crate::UnityResolve::init`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    pub mode: Mode,
    /// Attach the initializing thread to the root domain before enumerating
    pub attach_thread: bool,
    /// Fold members of implemented interfaces into each class
    pub include_interfaces: bool,
    /// Assemblies that are recorded but whose classes are not enumerated
    pub skip_assemblies: Vec<String>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        ResolveConfig {
            mode: Mode::Auto,
            attach_thread: true,
            include_interfaces: true,
            skip_assemblies: Vec::new(),
        }
    }
}

impl ResolveConfig {
    pub fn new(mode: Mode) -> Self {
        ResolveConfig {
            mode,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ResolveError::Config(e.to_string()))
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_interfaces(mut self, include: bool) -> Self {
        self.include_interfaces = include;
        self
    }

    pub fn with_thread_attach(mut self, attach: bool) -> Self {
        self.attach_thread = attach;
        self
    }

    pub fn skip_assembly(mut self, name: impl Into<String>) -> Self {
        self.skip_assemblies.push(name.into());
        self
    }

    pub(crate) fn skips(&self, assembly: &str) -> bool {
        self.skip_assemblies
            .iter()
            .any(|skip| crate::resolver::same_assembly(skip, assembly))
    }
}
