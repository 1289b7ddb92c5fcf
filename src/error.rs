//! Error type shared by every public entry point

use crate::handle::Handle;
use thiserror::Error;

/// Errors reported by the resolver.
///
/// Runtime-reported failures (missing exports, null handles, unreadable code)
/// are surfaced here instead of panicking, so one bad record never takes the
/// rest of the metadata graph down with it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The host module does not export the named function
    #[error("export not found: {0}")]
    SymbolNotFound(String),
    /// The host module could not be opened
    #[error("module not loaded: {0}")]
    ModuleNotFound(String),
    /// The runtime handed back a null handle
    #[error("null handle: {0}")]
    NullHandle(&'static str),
    /// A native entry point does not point at executable memory
    #[error("bad pointer: 0x{0:x}")]
    BadPointer(usize),
    /// Nothing in the metadata graph matches the query
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },
    /// Static storage was requested for an instance field
    #[error("field is not static: {0}")]
    NotStatic(String),
    /// Offset access was requested for a static field
    #[error("field is static: {0}")]
    StaticField(String),
    /// The runtime produced no native code for the method
    #[error("method has no native entry point: {0}")]
    NotCompiled(String),
    /// The managed method threw; the exception object is attached
    #[error("managed exception 0x{:x}", .0.addr())]
    ManagedException(Handle),
    /// A requested native type is not pointer-sized where it must be
    #[error("expected a {expected}-byte type, got {actual} bytes")]
    PointerSize { expected: usize, actual: usize },
    /// Negative or overflowing field offset
    #[error("invalid field offset: {0}")]
    InvalidOffset(i32),
    /// A backend that is compiled out, or could not be selected
    #[error("backend unavailable: {0}")]
    Backend(String),
    /// An argument the runtime cannot represent
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Malformed configuration
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ResolveError>;
