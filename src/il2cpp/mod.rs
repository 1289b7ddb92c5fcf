//! IL2CPP runtime backend implementation
//!
//! IL2CPP is used by Unity on consoles, mobile and increasingly desktop builds.
//! Code is compiled ahead of time, so reflection never has to compile anything.

pub mod backend;

pub use backend::Il2CppBackend;
