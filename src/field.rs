//! Field reads and writes
//!
//! Instance fields are plain memory at `object + offset`. Static fields live
//! in runtime-managed storage and go through the backend's accessors.

use crate::error::{ResolveError, Result};
use crate::handle::Handle;
use crate::memory;
use crate::metadata::{Class, Field};
use bytemuck::Zeroable;
use std::ffi::c_void;
use std::mem::size_of;
use tracing::trace;

impl Field {
    fn instance_offset(&self) -> Result<i32> {
        if self.static_field {
            return Err(ResolveError::StaticField(self.name.clone()));
        }
        Ok(self.offset)
    }

    fn ensure_static(&self) -> Result<()> {
        if !self.static_field {
            return Err(ResolveError::NotStatic(self.name.clone()));
        }
        Ok(())
    }

    /// Read this instance field out of `object`.
    ///
    /// # Safety
    /// `object` must be a live instance of the declaring class and `T` must
    /// match the field's type.
    pub unsafe fn get_value<T: Copy>(&self, object: Handle) -> Result<T> {
        memory::read_at(object, self.instance_offset()?)
    }

    /// Write counterpart of [`Field::get_value`]
    pub unsafe fn set_value<T: Copy>(&self, object: Handle, value: T) -> Result<()> {
        memory::write_at(object, self.instance_offset()?, value)
    }

    /// Static storage table of the declaring class or interface, resolved
    /// once. Null for runtimes that address statics without one.
    pub fn vtable(&self) -> Result<Handle> {
        if !self.backend.needs_vtable() {
            return Ok(Handle::NULL);
        }
        self.vtable
            .get_or_try_init(|| {
                trace!("resolving vtable for {}.{}", self.class_name, self.name);
                self.backend
                    .class_vtable(self.declaring)
                    .non_null()
                    .ok_or(ResolveError::NullHandle("vtable"))
            })
            .copied()
    }

    /// # Safety
    /// `T` must match the field's type; reference types read as a pointer-sized value.
    pub unsafe fn get_static_value<T: Copy + Zeroable>(&self) -> Result<T> {
        self.ensure_static()?;
        let vtable = self.vtable()?;

        let mut value = T::zeroed();
        self.backend
            .field_static_get(self.address, vtable, &mut value as *mut T as *mut c_void);
        Ok(value)
    }

    /// # Safety
    /// `T` must match the field's type. For reference types pass the object
    /// pointer (a [`Handle`] or raw pointer).
    pub unsafe fn set_static_value<T: Copy>(&self, value: T) -> Result<()> {
        self.ensure_static()?;
        let reference = self.ty.code.is_reference();
        if reference && size_of::<T>() != size_of::<usize>() {
            return Err(ResolveError::PointerSize {
                expected: size_of::<usize>(),
                actual: size_of::<T>(),
            });
        }
        let vtable = self.vtable()?;

        let mut value = value;
        self.backend.field_static_set(
            self.address,
            vtable,
            &mut value as *mut T as *mut c_void,
            reference,
        );
        Ok(())
    }
}

/// Selects an instance field by name or by raw byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKey<'a> {
    Name(&'a str),
    Offset(i32),
}

impl<'a> From<&'a str> for FieldKey<'a> {
    fn from(name: &'a str) -> Self {
        FieldKey::Name(name)
    }
}

impl From<i32> for FieldKey<'_> {
    fn from(offset: i32) -> Self {
        FieldKey::Offset(offset)
    }
}

impl Class {
    fn offset_of(&self, key: FieldKey<'_>) -> Result<i32> {
        match key {
            FieldKey::Offset(offset) => Ok(offset),
            FieldKey::Name(name) => {
                let field = self.field(name).ok_or_else(|| ResolveError::NotFound {
                    kind: "field",
                    name: format!("{}.{}", self.name, name),
                })?;
                field.instance_offset()
            }
        }
    }

    /// Read an instance field of `object`, by name or offset.
    ///
    /// # Safety
    /// `object` must be a live instance of this class and `T` must match the
    /// field's type.
    pub unsafe fn get_value<'k, T: Copy>(
        &self,
        object: Handle,
        key: impl Into<FieldKey<'k>>,
    ) -> Result<T> {
        memory::read_at(object, self.offset_of(key.into())?)
    }

    /// Write counterpart of [`Class::get_value`]
    pub unsafe fn set_value<'k, T: Copy>(
        &self,
        object: Handle,
        key: impl Into<FieldKey<'k>>,
        value: T,
    ) -> Result<()> {
        memory::write_at(object, self.offset_of(key.into())?, value)
    }
}
