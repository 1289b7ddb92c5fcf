//! Mono runtime backend implementation
//!
//! Mono is the JIT runtime used by Unity editor and desktop builds that do
//! not go through IL2CPP.

pub mod backend;

pub use backend::MonoBackend;
