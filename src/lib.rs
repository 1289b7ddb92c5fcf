//! In-process metadata enumeration and invocation for Unity's managed runtimes
//!
//! Load into a running IL2CPP or Mono game, call [`UnityResolve::init`] with
//! the runtime module, and query the assemblies, classes, fields and methods
//! the runtime reports:
//!
//! ```no_run
//! use unity_resolve::{Mode, ResolveConfig, UnityResolve};
//!
//! # fn main() -> unity_resolve::Result<()> {
//! let resolve = UnityResolve::open("GameAssembly.dll", ResolveConfig::new(Mode::Il2cpp))?;
//! let player = resolve.class("Assembly-CSharp", "Player")?;
//! let add_score = player.method("AddScore", &["System.Int32"]);
//! assert!(add_score.is_some());
//! # Ok(())
//! # }
//! ```

// Runtime backends
pub mod backend;
pub mod common;

#[cfg(feature = "mono")]
pub mod mono;

#[cfg(feature = "il2cpp")]
pub mod il2cpp;

pub mod config;
pub mod constants;
pub mod dump;
pub mod enumerator;
pub mod error;
pub mod field;
pub mod handle;
pub mod invoke;
pub mod managed;
pub mod memory;
pub mod metadata;
pub mod resolver;
pub mod symbols;

#[cfg(test)]
mod test_support;

pub use backend::{BackendRef, Mode, RuntimeBackend};
pub use common::TypeCode;
pub use config::ResolveConfig;
pub use error::{ResolveError, Result};
pub use field::FieldKey;
pub use handle::Handle;
pub use invoke::{ByValue, RuntimeArg, RuntimeArgs};
pub use managed::{ManagedArray, ManagedString};
pub use metadata::{Arg, Assembly, Class, Field, KeyedList, Method, Type, WILDCARD};
pub use resolver::{ThreadGuard, UnityResolve};
pub use symbols::{ExportMap, Exports, Module, NativeArgs, SymbolSource};
