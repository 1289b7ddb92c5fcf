//! Managed objects read in place, and helpers that create them

use crate::constants::OBJECT_HEADER_SIZE;
use crate::error::{ResolveError, Result};
use crate::handle::Handle;
use crate::memory;
use crate::metadata::Class;
use std::mem::size_of;
use tracing::trace;

/// Longest string read in place, in UTF-16 units
const MAX_STRING_LENGTH: i32 = 1 << 24;

/// A `System.String`: object header, `i32` length, UTF-16 characters.
pub struct ManagedString;

impl ManagedString {
    /// Copy the string out of a string object. `None` for null or a
    /// nonsensical length.
    ///
    /// # Safety
    /// A non-null `object` must be a live `System.String`.
    pub unsafe fn read(object: Handle) -> Option<String> {
        if object.is_null() {
            return None;
        }
        let length: i32 = memory::read_at(object, OBJECT_HEADER_SIZE as i32).ok()?;
        if !(0..=MAX_STRING_LENGTH).contains(&length) {
            return None;
        }

        let chars = (object.addr() + OBJECT_HEADER_SIZE + 4) as *const u16;
        let units: Vec<u16> = (0..length as usize)
            .map(|i| chars.add(i).read_unaligned())
            .collect();
        Some(String::from_utf16_lossy(&units))
    }
}

/// A single-dimension managed array: object header, bounds pointer,
/// pointer-sized length, then the elements.
#[derive(Debug, Clone, Copy)]
pub struct ManagedArray {
    object: Handle,
}

impl ManagedArray {
    const LENGTH_OFFSET: usize = OBJECT_HEADER_SIZE + size_of::<usize>();
    const DATA_OFFSET: usize = OBJECT_HEADER_SIZE + 2 * size_of::<usize>();

    /// # Safety
    /// `object` must be a live single-dimension array that outlives the view.
    pub unsafe fn new(object: Handle) -> Result<Self> {
        if object.is_null() {
            return Err(ResolveError::NullHandle("array"));
        }
        Ok(ManagedArray { object })
    }

    pub fn len(&self) -> usize {
        unsafe { memory::read_at::<usize>(self.object, Self::LENGTH_OFFSET as i32) }.unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element `index`, `None` past the end.
    ///
    /// # Safety
    /// `T` must be the array's element type; reference elements read as [`Handle`].
    pub unsafe fn get<T: Copy>(&self, index: usize) -> Option<T> {
        if index >= self.len() {
            return None;
        }
        let address = self.object.addr() + Self::DATA_OFFSET + index * size_of::<T>();
        Some(std::ptr::read_unaligned(address as *const T))
    }

    /// Every element, read as by [`ManagedArray::get`]
    pub unsafe fn to_vec<T: Copy>(&self) -> Vec<T> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }
}

impl Class {
    /// Allocate a new, unconstructed instance of this class
    pub fn new_object(&self) -> Result<Handle> {
        self.backend
            .object_new(self.address)
            .non_null()
            .ok_or(ResolveError::NullHandle("object"))
    }

    /// The class's `System.Type` object, fetched once and cached
    pub fn reflection_type(&self) -> Result<Handle> {
        self.type_object
            .get_or_try_init(|| {
                trace!("fetching System.Type of {}", self.full_name());
                self.backend
                    .class_type_object(self.address)
                    .non_null()
                    .ok_or(ResolveError::NullHandle("type object"))
            })
            .copied()
    }
}
