//! Opaque runtime handles

use bytemuck::Zeroable;
use serde::{Serialize, Serializer};
use std::ffi::c_void;
use std::fmt;

/// An opaque pointer owned by the managed runtime.
///
/// Assemblies, images, classes, fields, methods, types and objects are all
/// passed around as handles. The layout is a bare machine word so a handle can
/// be handed straight to an exported runtime function.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Handle(pub usize);

unsafe impl Zeroable for Handle {}

impl Handle {
    pub const NULL: Handle = Handle(0);

    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Handle(ptr as usize)
    }

    pub fn as_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    pub fn as_void(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    pub fn addr(self) -> usize {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// `None` for a null handle
    pub fn non_null(self) -> Option<Handle> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle(0x{:x})", self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl Serialize for Handle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{:x}", self.0))
    }
}
