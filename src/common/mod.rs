//! Types shared between the IL2CPP and Mono backends

pub mod type_code;

pub use type_code::TypeCode;
