//! Core trait for runtime backend abstraction
//!
//! Export names live in the two implementations. The enumerator, the
//! invocation engine and the field accessor work with either runtime through
//! the trait and never look at the mode flag themselves.

use crate::backend::Mode;
use crate::handle::Handle;
use crate::symbols::Exports;
use std::ffi::{c_void, CStr};
use std::fmt::Debug;
use std::sync::Arc;

/// Everything the enumerator learns about one field
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub type_handle: Handle,
    pub offset: i32,
    pub is_static: bool,
}

/// Everything the enumerator learns about one method
#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub name: String,
    pub return_type: Handle,
    pub flags: u32,
    /// Parameter names and type handles, in declaration order
    pub params: Vec<(String, Handle)>,
    /// Native entry point, when the runtime has one without compiling
    pub entry_point: Option<usize>,
}

/// Main runtime backend trait.
///
/// Handles passed in must come from the same runtime; the backends hand them
/// straight to exported runtime functions.
pub trait RuntimeBackend: Send + Sync + Debug {
    fn mode(&self) -> Mode;

    /// The runtime type name (e.g., "Mono", "IL2CPP")
    fn runtime_name(&self) -> &'static str;

    fn exports(&self) -> &Exports;

    fn domain(&self) -> Handle;

    /// Attach the calling OS thread to `domain`, returning the runtime thread
    fn thread_attach(&self, domain: Handle) -> Handle;

    fn thread_current(&self) -> Handle;

    fn thread_detach(&self, thread: Handle);

    /// Every loaded assembly, nulls included
    fn assemblies(&self, domain: Handle) -> Vec<Handle>;

    fn assembly_image(&self, assembly: Handle) -> Handle;

    fn image_name(&self, image: Handle) -> Option<String>;

    fn image_file(&self, image: Handle) -> Option<String>;

    /// Every class the image defines, nulls included
    fn image_classes(&self, image: Handle) -> Vec<Handle>;

    fn class_name(&self, class: Handle) -> Option<String>;

    fn class_namespace(&self, class: Handle) -> Option<String>;

    fn class_parent(&self, class: Handle) -> Handle;

    fn class_interfaces(&self, class: Handle) -> Vec<Handle>;

    fn class_fields(&self, class: Handle) -> Vec<Handle>;

    fn class_methods(&self, class: Handle) -> Vec<Handle>;

    /// `None` when the runtime reports no name for the field
    fn field_info(&self, field: Handle) -> Option<FieldInfo>;

    /// Fully qualified type name
    fn type_name(&self, ty: Handle) -> Option<String>;

    /// Size in bytes, where the runtime can tell
    fn type_size(&self, ty: Handle) -> Option<i32>;

    fn type_is_value_type(&self, ty: Handle) -> bool;

    /// `None` when the runtime reports no name for the method
    fn method_info(&self, method: Handle) -> Option<MethodInfo>;

    /// Produce the native entry point for `method`, compiling it if the runtime needs to
    fn compile_method(&self, method: Handle) -> Option<usize>;

    /// Reflection-style call. `exception` receives the thrown object, if any.
    fn runtime_invoke(
        &self,
        method: Handle,
        object: Handle,
        params: *mut *mut c_void,
        exception: *mut Handle,
    ) -> Handle;

    /// Pointer to the value inside a boxed object
    fn object_unbox(&self, object: Handle) -> *mut c_void;

    fn needs_vtable(&self) -> bool;

    fn class_vtable(&self, class: Handle) -> Handle;

    /// Copy a static field's value into `out`
    fn field_static_get(&self, field: Handle, vtable: Handle, out: *mut c_void);

    /// Store a static field's value. `value` always points at the value;
    /// for reference types that is the address of the object pointer.
    fn field_static_set(&self, field: Handle, vtable: Handle, value: *mut c_void, reference: bool);

    fn class_type_object(&self, class: Handle) -> Handle;

    fn string_new(&self, value: &CStr) -> Handle;

    fn object_new(&self, class: Handle) -> Handle;
}

/// Shared backend type for dynamic dispatch
pub type BackendRef = Arc<dyn RuntimeBackend>;

/// Drain a cursor-style iterator export such as `*_class_get_fields`.
pub(crate) fn iterate(exports: &Exports, name: &str, owner: Handle) -> Vec<Handle> {
    let mut cursor: *mut c_void = std::ptr::null_mut();
    let mut items = Vec::new();
    if owner.is_null() {
        return items;
    }

    loop {
        let item: Handle =
            unsafe { exports.invoke(name, (owner, &mut cursor as *mut *mut c_void)) };
        if item.is_null() {
            break;
        }
        items.push(item);
    }
    items
}
