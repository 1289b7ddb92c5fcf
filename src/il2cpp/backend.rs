//! IL2CPP runtime backend
//!
//! All reflection functions are process-wide exports and every method
//! already has native code: its entry point is the first word of the
//! `MethodInfo` handle.

use crate::backend::{iterate, FieldInfo, MethodInfo, Mode, RuntimeBackend};
use crate::handle::Handle;
use crate::symbols::{c_string, owned_c_string, Exports};
use std::ffi::{c_char, c_void, CStr};

/// IL2CPP runtime backend
#[derive(Debug)]
pub struct Il2CppBackend {
    exports: Exports,
}

impl Il2CppBackend {
    pub fn new(exports: Exports) -> Self {
        Il2CppBackend { exports }
    }

    fn name_of(&self, export: &str, handle: Handle) -> Option<String> {
        if handle.is_null() {
            return None;
        }
        c_string(unsafe { self.exports.invoke::<*const c_char, _>(export, (handle,)) })
    }

    fn first_word(handle: Handle) -> Option<usize> {
        if handle.is_null() {
            return None;
        }
        let word = unsafe { std::ptr::read(handle.as_ptr::<usize>()) };
        (word != 0).then_some(word)
    }
}

impl RuntimeBackend for Il2CppBackend {
    fn mode(&self) -> Mode {
        Mode::Il2cpp
    }

    fn runtime_name(&self) -> &'static str {
        "IL2CPP"
    }

    fn exports(&self) -> &Exports {
        &self.exports
    }

    fn domain(&self) -> Handle {
        unsafe { self.exports.invoke("il2cpp_domain_get", ()) }
    }

    fn thread_attach(&self, domain: Handle) -> Handle {
        unsafe { self.exports.invoke("il2cpp_thread_attach", (domain,)) }
    }

    fn thread_current(&self) -> Handle {
        unsafe { self.exports.invoke("il2cpp_thread_current", ()) }
    }

    fn thread_detach(&self, thread: Handle) {
        unsafe { self.exports.invoke::<(), _>("il2cpp_thread_detach", (thread,)) }
    }

    fn assemblies(&self, domain: Handle) -> Vec<Handle> {
        let mut count: usize = 0;
        let array: *const Handle = unsafe {
            self.exports
                .invoke("il2cpp_domain_get_assemblies", (domain, &mut count as *mut usize))
        };
        if array.is_null() {
            return Vec::new();
        }
        unsafe { std::slice::from_raw_parts(array, count) }.to_vec()
    }

    fn assembly_image(&self, assembly: Handle) -> Handle {
        unsafe { self.exports.invoke("il2cpp_assembly_get_image", (assembly,)) }
    }

    fn image_name(&self, image: Handle) -> Option<String> {
        self.name_of("il2cpp_image_get_name", image)
    }

    fn image_file(&self, image: Handle) -> Option<String> {
        self.name_of("il2cpp_image_get_filename", image)
    }

    fn image_classes(&self, image: Handle) -> Vec<Handle> {
        if image.is_null() {
            return Vec::new();
        }
        let count: usize = unsafe { self.exports.invoke("il2cpp_image_get_class_count", (image,)) };
        (0..count)
            .map(|index| unsafe { self.exports.invoke("il2cpp_image_get_class", (image, index)) })
            .collect()
    }

    fn class_name(&self, class: Handle) -> Option<String> {
        self.name_of("il2cpp_class_get_name", class)
    }

    fn class_namespace(&self, class: Handle) -> Option<String> {
        self.name_of("il2cpp_class_get_namespace", class)
    }

    fn class_parent(&self, class: Handle) -> Handle {
        unsafe { self.exports.invoke("il2cpp_class_get_parent", (class,)) }
    }

    fn class_interfaces(&self, class: Handle) -> Vec<Handle> {
        iterate(&self.exports, "il2cpp_class_get_interfaces", class)
    }

    fn class_fields(&self, class: Handle) -> Vec<Handle> {
        iterate(&self.exports, "il2cpp_class_get_fields", class)
    }

    fn class_methods(&self, class: Handle) -> Vec<Handle> {
        iterate(&self.exports, "il2cpp_class_get_methods", class)
    }

    fn field_info(&self, field: Handle) -> Option<FieldInfo> {
        let name = self.name_of("il2cpp_field_get_name", field)?;
        let type_handle = unsafe { self.exports.invoke("il2cpp_field_get_type", (field,)) };
        // size_t in the runtime; thread statics report (size_t)-1
        let raw: usize = unsafe { self.exports.invoke("il2cpp_field_get_offset", (field,)) };
        let offset = raw as isize as i32;

        Some(FieldInfo {
            name,
            type_handle,
            offset,
            is_static: offset <= 0,
        })
    }

    fn type_name(&self, ty: Handle) -> Option<String> {
        if ty.is_null() {
            return None;
        }
        let name: *mut c_char = unsafe { self.exports.invoke("il2cpp_type_get_name", (ty,)) };
        owned_c_string(&self.exports, name, "il2cpp_free")
    }

    fn type_size(&self, _ty: Handle) -> Option<i32> {
        None
    }

    fn type_is_value_type(&self, ty: Handle) -> bool {
        if ty.is_null() {
            return false;
        }
        let class: Handle = unsafe { self.exports.invoke("il2cpp_class_from_type", (ty,)) };
        if class.is_null() {
            return false;
        }
        unsafe { self.exports.invoke("il2cpp_class_is_valuetype", (class,)) }
    }

    fn method_info(&self, method: Handle) -> Option<MethodInfo> {
        let name = self.name_of("il2cpp_method_get_name", method)?;
        let return_type = unsafe { self.exports.invoke("il2cpp_method_get_return_type", (method,)) };

        let mut implementation_flags: u32 = 0;
        let flags: u32 = unsafe {
            self.exports.invoke(
                "il2cpp_method_get_flags",
                (method, &mut implementation_flags as *mut u32),
            )
        };

        let count: u32 = unsafe { self.exports.invoke("il2cpp_method_get_param_count", (method,)) };
        let params = (0..count)
            .map(|index| {
                let name = c_string(unsafe {
                    self.exports
                        .invoke::<*const c_char, _>("il2cpp_method_get_param_name", (method, index))
                })
                .unwrap_or_else(|| format!("arg{}", index));
                let ty: Handle =
                    unsafe { self.exports.invoke("il2cpp_method_get_param", (method, index)) };
                (name, ty)
            })
            .collect();

        Some(MethodInfo {
            name,
            return_type,
            flags,
            params,
            entry_point: Self::first_word(method),
        })
    }

    fn compile_method(&self, method: Handle) -> Option<usize> {
        Self::first_word(method)
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
                .invoke("il2cpp_runtime_invoke", (method, object, params, exception))
        }
    }

    fn object_unbox(&self, object: Handle) -> *mut c_void {
        unsafe { self.exports.invoke("il2cpp_object_unbox", (object,)) }
    }

    fn needs_vtable(&self) -> bool {
        false
    }

    fn class_vtable(&self, _class: Handle) -> Handle {
        Handle::NULL
    }

    fn field_static_get(&self, field: Handle, _vtable: Handle, out: *mut c_void) {
        unsafe {
            self.exports
                .invoke::<(), _>("il2cpp_field_static_get_value", (field, out))
        }
    }

    fn field_static_set(&self, field: Handle, _vtable: Handle, value: *mut c_void, _reference: bool) {
        unsafe {
            self.exports
                .invoke::<(), _>("il2cpp_field_static_set_value", (field, value))
        }
    }

    fn class_type_object(&self, class: Handle) -> Handle {
        let ty: Handle = unsafe { self.exports.invoke("il2cpp_class_get_type", (class,)) };
        if ty.is_null() {
            return Handle::NULL;
        }
        unsafe { self.exports.invoke("il2cpp_type_get_object", (ty,)) }
    }

    fn string_new(&self, value: &CStr) -> Handle {
        unsafe { self.exports.invoke("il2cpp_string_new", (value.as_ptr(),)) }
    }

    fn object_new(&self, class: Handle) -> Handle {
        unsafe { self.exports.invoke("il2cpp_object_new", (class,)) }
    }
}
