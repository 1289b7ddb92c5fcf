//! Mono runtime backend
//!
//! Mono keeps its class list in the image's TypeDef metadata table and only
//! produces native code for a method when asked to compile it.

use crate::backend::{iterate, FieldInfo, MethodInfo, Mode, RuntimeBackend};
use crate::constants::{FIELD_ATTRIBUTE_STATIC, MONO_TABLE_TYPEDEF, TYPEDEF_TOKEN};
use crate::handle::Handle;
use crate::symbols::{c_string, owned_c_string, Exports};
use std::ffi::{c_char, c_void, CStr};

/// Mono runtime backend
#[derive(Debug)]
pub struct MonoBackend {
    exports: Exports,
}

extern "C" fn collect_assembly(assembly: Handle, user_data: *mut c_void) {
    if user_data.is_null() {
        return;
    }
    let assemblies = unsafe { &mut *(user_data as *mut Vec<Handle>) };
    assemblies.push(assembly);
}

impl MonoBackend {
    pub fn new(exports: Exports) -> Self {
        MonoBackend { exports }
    }

    fn name_of(&self, export: &str, handle: Handle) -> Option<String> {
        if handle.is_null() {
            return None;
        }
        c_string(unsafe { self.exports.invoke::<*const c_char, _>(export, (handle,)) })
    }

    fn signature(&self, method: Handle) -> Handle {
        unsafe { self.exports.invoke("mono_method_signature", (method,)) }
    }
}

impl RuntimeBackend for MonoBackend {
    fn mode(&self) -> Mode {
        Mode::Mono
    }

    fn runtime_name(&self) -> &'static str {
        "Mono"
    }

    fn exports(&self) -> &Exports {
        &self.exports
    }

    fn domain(&self) -> Handle {
        unsafe { self.exports.invoke("mono_get_root_domain", ()) }
    }

    /// Registers the thread with both the runtime and the JIT.
    fn thread_attach(&self, domain: Handle) -> Handle {
        let thread: Handle = unsafe { self.exports.invoke("mono_thread_attach", (domain,)) };
        unsafe { self.exports.invoke::<Handle, _>("mono_jit_thread_attach", (domain,)) };
        thread
    }

    fn thread_current(&self) -> Handle {
        unsafe { self.exports.invoke("mono_thread_current", ()) }
    }

    fn thread_detach(&self, thread: Handle) {
        unsafe { self.exports.invoke::<(), _>("mono_thread_detach", (thread,)) }
    }

    fn assemblies(&self, _domain: Handle) -> Vec<Handle> {
        let mut assemblies: Vec<Handle> = Vec::new();
        let callback: extern "C" fn(Handle, *mut c_void) = collect_assembly;
        unsafe {
            self.exports.invoke::<(), _>(
                "mono_assembly_foreach",
                (callback, &mut assemblies as *mut Vec<Handle> as *mut c_void),
            )
        };
        assemblies
    }

    fn assembly_image(&self, assembly: Handle) -> Handle {
        unsafe { self.exports.invoke("mono_assembly_get_image", (assembly,)) }
    }

    fn image_name(&self, image: Handle) -> Option<String> {
        self.name_of("mono_image_get_name", image)
    }

    fn image_file(&self, image: Handle) -> Option<String> {
        self.name_of("mono_image_get_filename", image)
    }

    fn image_classes(&self, image: Handle) -> Vec<Handle> {
        if image.is_null() {
            return Vec::new();
        }
        let table: Handle = unsafe {
            self.exports
                .invoke("mono_image_get_table_info", (image, MONO_TABLE_TYPEDEF))
        };
        if table.is_null() {
            return Vec::new();
        }
        let rows: i32 = unsafe { self.exports.invoke("mono_table_info_get_rows", (table,)) };

        // row indices are 1-based in metadata tokens
        (0..rows.max(0) as u32)
            .map(|row| unsafe {
                self.exports
                    .invoke("mono_class_get", (image, TYPEDEF_TOKEN | (row + 1)))
            })
            .collect()
    }

    fn class_name(&self, class: Handle) -> Option<String> {
        self.name_of("mono_class_get_name", class)
    }

    fn class_namespace(&self, class: Handle) -> Option<String> {
        self.name_of("mono_class_get_namespace", class)
    }

    fn class_parent(&self, class: Handle) -> Handle {
        unsafe { self.exports.invoke("mono_class_get_parent", (class,)) }
    }

    fn class_interfaces(&self, class: Handle) -> Vec<Handle> {
        iterate(&self.exports, "mono_class_get_interfaces", class)
    }

    fn class_fields(&self, class: Handle) -> Vec<Handle> {
        iterate(&self.exports, "mono_class_get_fields", class)
    }

    fn class_methods(&self, class: Handle) -> Vec<Handle> {
        iterate(&self.exports, "mono_class_get_methods", class)
    }

    /// Static-ness comes from the field attributes; Mono reports
    /// offset 0 for some statics and for the first field of a struct alike.
    fn field_info(&self, field: Handle) -> Option<FieldInfo> {
        let name = self.name_of("mono_field_get_name", field)?;
        let type_handle = unsafe { self.exports.invoke("mono_field_get_type", (field,)) };
        let offset: u32 = unsafe { self.exports.invoke("mono_field_get_offset", (field,)) };
        let flags: u32 = unsafe { self.exports.invoke("mono_field_get_flags", (field,)) };

        Some(FieldInfo {
            name,
            type_handle,
            offset: offset as i32,
            is_static: flags & FIELD_ATTRIBUTE_STATIC != 0,
        })
    }

    fn type_name(&self, ty: Handle) -> Option<String> {
        if ty.is_null() {
            return None;
        }
        let name: *mut c_char = unsafe { self.exports.invoke("mono_type_get_name", (ty,)) };
        owned_c_string(&self.exports, name, "mono_free")
    }

    fn type_size(&self, ty: Handle) -> Option<i32> {
        if ty.is_null() || !self.exports.contains("mono_type_size") {
            return None;
        }
        let mut alignment: i32 = 0;
        let size: i32 = unsafe {
            self.exports
                .invoke("mono_type_size", (ty, &mut alignment as *mut i32))
        };
        Some(size)
    }

    fn type_is_value_type(&self, ty: Handle) -> bool {
        if ty.is_null() {
            return false;
        }
        let class: Handle = unsafe { self.exports.invoke("mono_class_from_mono_type", (ty,)) };
        if class.is_null() {
            return false;
        }
        unsafe { self.exports.invoke("mono_class_is_valuetype", (class,)) }
    }

    fn method_info(&self, method: Handle) -> Option<MethodInfo> {
        let name = self.name_of("mono_method_get_name", method)?;
        let signature = self.signature(method);
        let return_type = unsafe {
            self.exports
                .invoke("mono_signature_get_return_type", (signature,))
        };

        let mut implementation_flags: u32 = 0;
        let flags: u32 = unsafe {
            self.exports.invoke(
                "mono_method_get_flags",
                (method, &mut implementation_flags as *mut u32),
            )
        };

        let count: u32 = if signature.is_null() {
            0
        } else {
            unsafe {
                self.exports
                    .invoke("mono_signature_get_param_count", (signature,))
            }
        };
        let mut names: Vec<*const c_char> = vec![std::ptr::null(); count as usize];
        if count > 0 {
            unsafe {
                self.exports.invoke::<(), _>(
                    "mono_method_get_param_names",
                    (method, names.as_mut_ptr()),
                )
            };
        }
        let types = iterate(&self.exports, "mono_signature_get_params", signature);

        let params = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                let name = c_string(name).unwrap_or_else(|| format!("arg{}", index));
                let ty = types.get(index).copied().unwrap_or_default();
                (name, ty)
            })
            .collect();

        Some(MethodInfo {
            name,
            return_type,
            flags,
            params,
            entry_point: None,
        })
    }

    fn compile_method(&self, method: Handle) -> Option<usize> {
        if method.is_null() {
            return None;
        }
        let code: usize = unsafe { self.exports.invoke("mono_compile_method", (method,)) };
        (code != 0).then_some(code)
    }

    fn runtime_invoke(
        &self,
        method: Handle,
        object: Handle,
        params: *mut *mut c_void,
        exception: *mut Handle,
    ) -> Handle {
        unsafe {
            self.exports
                .invoke("mono_runtime_invoke", (method, object, params, exception))
        }
    }

    fn object_unbox(&self, object: Handle) -> *mut c_void {
        unsafe { self.exports.invoke("mono_object_unbox", (object,)) }
    }

    fn needs_vtable(&self) -> bool {
        true
    }

    fn class_vtable(&self, class: Handle) -> Handle {
        let domain = self.domain();
        unsafe { self.exports.invoke("mono_class_vtable", (domain, class)) }
    }

    fn field_static_get(&self, field: Handle, vtable: Handle, out: *mut c_void) {
        unsafe {
            self.exports
                .invoke::<(), _>("mono_field_static_get_value", (vtable, field, out))
        }
    }

    /// Mono takes reference-type values as the object pointer itself.
    fn field_static_set(&self, field: Handle, vtable: Handle, value: *mut c_void, reference: bool) {
        let value = if reference && !value.is_null() {
            unsafe { *(value as *const *mut c_void) }
        } else {
            value
        };
        unsafe {
            self.exports
                .invoke::<(), _>("mono_field_static_set_value", (vtable, field, value))
        }
    }

    fn class_type_object(&self, class: Handle) -> Handle {
        let ty: Handle = unsafe { self.exports.invoke("mono_class_get_type", (class,)) };
        if ty.is_null() {
            return Handle::NULL;
        }
        let domain = self.domain();
        unsafe { self.exports.invoke("mono_type_get_object", (domain, ty)) }
    }

    fn string_new(&self, value: &CStr) -> Handle {
        let domain = self.domain();
        unsafe {
            self.exports
                .invoke("mono_string_new", (domain, value.as_ptr()))
        }
    }

    fn object_new(&self, class: Handle) -> Handle {
        let domain = self.domain();
        unsafe { self.exports.invoke("mono_object_new", (domain, class)) }
    }
}
