//! Backend abstraction for the IL2CPP and Mono runtimes

pub mod traits;
pub mod detection;

pub use traits::*;
pub use detection::{Mode, detect_mode, create_backend};
