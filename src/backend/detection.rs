//! Runtime selection for IL2CPP vs Mono

use super::BackendRef;
use crate::error::{ResolveError, Result};
use crate::symbols::Exports;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which runtime backend to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Ahead-of-time compiled IL2CPP
    Il2cpp,
    /// Mono JIT
    Mono,
    /// Pick from the host module
    #[default]
    Auto,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Il2cpp => write!(f, "IL2CPP"),
            Mode::Mono => write!(f, "Mono"),
            Mode::Auto => write!(f, "Auto"),
        }
    }
}

/// Resolve `Mode::Auto` against the host module.
///
/// Detection strategy:
/// - a module file name containing "mono" selects Mono, any other name IL2CPP
/// - without a file name, an exported `mono_get_root_domain` selects Mono
pub fn detect_mode(requested: Mode, exports: &Exports) -> Mode {
    if requested != Mode::Auto {
        return requested;
    }

    let detected = match exports.file_name() {
        Some(file) if file.to_ascii_lowercase().contains("mono") => Mode::Mono,
        Some(_) => Mode::Il2cpp,
        None if exports.contains("mono_get_root_domain") => Mode::Mono,
        None => Mode::Il2cpp,
    };
    debug!("detected {} runtime", detected);
    detected
}

/// Create the backend for `mode`, taking ownership of the export table
pub fn create_backend(mode: Mode, exports: Exports) -> Result<BackendRef> {
    let mode = detect_mode(mode, &exports);

    match mode {
        Mode::Il2cpp => {
            #[cfg(feature = "il2cpp")]
            {
                Ok(std::sync::Arc::new(crate::il2cpp::Il2CppBackend::new(exports)))
            }
            #[cfg(not(feature = "il2cpp"))]
            {
                let _ = exports;
                Err(ResolveError::Backend("IL2CPP backend not enabled".to_string()))
            }
        }
        Mode::Mono => {
            #[cfg(feature = "mono")]
            {
                Ok(std::sync::Arc::new(crate::mono::MonoBackend::new(exports)))
            }
            #[cfg(not(feature = "mono"))]
            {
                let _ = exports;
                Err(ResolveError::Backend("Mono backend not enabled".to_string()))
            }
        }
        Mode::Auto => Err(ResolveError::Backend(
            "could not detect runtime type (Mono or IL2CPP)".to_string(),
        )),
    }
}
