//! Calling discovered methods
//!
//! Two paths: a direct call through the native entry point, where the caller
//! supplies the exact native argument list, and the runtime's reflection
//! invoke, which takes pointers to each argument and returns a boxed object.

use crate::error::{ResolveError, Result};
use crate::handle::Handle;
use crate::memory;
use crate::metadata::Method;
use crate::symbols::NativeArgs;
use bytemuck::Zeroable;
use std::ffi::c_void;
use std::mem::size_of;
use tracing::{trace, warn};

/// A value that can be handed to a reflection call.
///
/// Value types are passed by address; objects are passed as the object
/// pointer itself.
pub trait RuntimeArg {
    fn as_param(&mut self) -> *mut c_void;
}

macro_rules! by_address {
    ($($ty:ty),*) => {
        $(impl RuntimeArg for $ty {
            fn as_param(&mut self) -> *mut c_void {
                self as *mut $ty as *mut c_void
            }
        })*
    };
}

by_address!(bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64, isize, usize);

impl RuntimeArg for Handle {
    fn as_param(&mut self) -> *mut c_void {
        self.as_void()
    }
}

impl RuntimeArg for *mut c_void {
    fn as_param(&mut self) -> *mut c_void {
        *self
    }
}

/// A struct argument, passed by address like the primitives
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ByValue<T>(pub T);

impl<T> RuntimeArg for ByValue<T> {
    fn as_param(&mut self) -> *mut c_void {
        &mut self.0 as *mut T as *mut c_void
    }
}

/// Argument tuples for [`Method::runtime_invoke`]
pub trait RuntimeArgs {
    /// Pointers into `self`, valid while `self` is not moved
    fn params(&mut self) -> Vec<*mut c_void>;
}

macro_rules! runtime_args {
    ($($ty:ident $idx:tt),*) => {
        impl<$($ty: RuntimeArg),*> RuntimeArgs for ($($ty,)*) {
            #[allow(unused_variables)]
            fn params(&mut self) -> Vec<*mut c_void> {
                vec![$(self.$idx.as_param()),*]
            }
        }
    };
}

runtime_args!();
runtime_args!(A 0);
runtime_args!(A 0, B 1);
runtime_args!(A 0, B 1, C 2);
runtime_args!(A 0, B 1, C 2, D 3);
runtime_args!(A 0, B 1, C 2, D 3, E 4);
runtime_args!(A 0, B 1, C 2, D 3, E 4, F 5);
runtime_args!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
runtime_args!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

impl Method {
    /// Native entry point, compiled on first use when the runtime needs it.
    ///
    /// A successful result is stored and never recomputed. A failed compile
    /// is not cached, so a later call tries again.
    pub fn entry_point(&self) -> Result<usize> {
        self.function
            .get_or_try_init(|| {
                trace!("compiling {}::{}", self.class_name, self.name);
                self.backend
                    .compile_method(self.address)
                    .ok_or_else(|| ResolveError::NotCompiled(self.signature()))
            })
            .copied()
    }

    fn checked_entry_point(&self) -> Result<usize> {
        let function = self.entry_point()?;
        if !memory::is_executable(function) {
            warn!(
                "{}::{} entry point 0x{:x} is not executable",
                self.class_name, self.name, function
            );
            return Err(ResolveError::BadPointer(function));
        }
        Ok(function)
    }

    /// Call the native entry point directly with `args`.
    ///
    /// Instance methods take the object as the first argument. Under IL2CPP
    /// every method also takes a trailing `MethodInfo*`, which callers may
    /// pass as `method.address` or leave out when the target ignores it.
    ///
    /// # Safety
    /// `args` and `R` must match the method's real native signature.
    pub unsafe fn invoke<R, A: NativeArgs>(&self, args: A) -> Result<R> {
        let function = self.checked_entry_point()?;
        Ok(args.call(function))
    }

    /// [`Method::invoke`], yielding a zeroed `R` on any failure
    pub unsafe fn invoke_or_default<R: Zeroable, A: NativeArgs>(&self, args: A) -> R {
        self.invoke(args).unwrap_or_else(|_| R::zeroed())
    }

    /// The entry point as a typed function pointer, for repeated calls.
    ///
    /// # Safety
    /// `F` must be an `extern "C" fn` type matching the method's native signature.
    pub unsafe fn cast<F: Copy>(&self) -> Result<F> {
        if size_of::<F>() != size_of::<usize>() {
            return Err(ResolveError::PointerSize {
                expected: size_of::<usize>(),
                actual: size_of::<F>(),
            });
        }
        let function = self.checked_entry_point()?;
        Ok(std::mem::transmute_copy(&function))
    }

    /// Reflection call with a prepared argument array.
    /// Returns the boxed result object, null for `void`.
    ///
    /// # Safety
    /// Each entry of `params` must point at a value of the matching parameter
    /// type (or be the object pointer, for reference types).
    pub unsafe fn runtime_invoke_raw(
        &self,
        object: Handle,
        params: &mut [*mut c_void],
    ) -> Result<Handle> {
        if !self.is_static() && object.is_null() {
            return Err(ResolveError::NullHandle("object"));
        }

        let mut exception = Handle::NULL;
        let params = if params.is_empty() {
            std::ptr::null_mut()
        } else {
            params.as_mut_ptr()
        };
        let result = self
            .backend
            .runtime_invoke(self.address, object, params, &mut exception);

        if !exception.is_null() {
            warn!("{}::{} threw {}", self.class_name, self.name, exception);
            return Err(ResolveError::ManagedException(exception));
        }
        Ok(result)
    }

    /// Reflection call, unboxing the result into `R`.
    ///
    /// Pass `Handle::NULL` as `object` for static methods. `R` is the unboxed
    /// value for value-type returns and the object pointer for reference
    /// returns; `void` methods yield a zeroed `R`.
    ///
    /// # Safety
    /// `args` must match the managed parameter types.
    pub unsafe fn runtime_invoke<R: Copy + Zeroable, A: RuntimeArgs>(
        &self,
        object: Handle,
        mut args: A,
    ) -> Result<R> {
        let mut params = args.params();
        if !params.is_empty() && params.len() != self.args.len() {
            warn!(
                "{} takes {} arguments, got {}",
                self.signature(),
                self.args.len(),
                params.len()
            );
        }
        let result = self.runtime_invoke_raw(object, &mut params)?;
        self.unbox(result)
    }

    unsafe fn unbox<R: Copy + Zeroable>(&self, result: Handle) -> Result<R> {
        let ty = &self.return_type;
        if ty.is_void() || result.is_null() {
            return Ok(R::zeroed());
        }

        if ty.is_value_type() {
            if let Some(expected) = ty.code.size() {
                if expected != size_of::<R>() {
                    return Err(ResolveError::PointerSize {
                        expected,
                        actual: size_of::<R>(),
                    });
                }
            }
            let value = self.backend.object_unbox(result);
            if value.is_null() {
                return Err(ResolveError::NullHandle("unboxed value"));
            }
            return Ok(std::ptr::read_unaligned(value as *const R));
        }

        if size_of::<R>() != size_of::<usize>() {
            return Err(ResolveError::PointerSize {
                expected: size_of::<usize>(),
                actual: size_of::<R>(),
            });
        }
        Ok(std::mem::transmute_copy(&result))
    }
}
