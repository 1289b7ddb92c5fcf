//! In-process fake of the IL2CPP and Mono export surfaces
//!
//! Fixture records are leaked Rust structs; their addresses are the handles
//! the fake exports hand out. Both export sets read the same fixtures, so one
//! world can be enumerated through either backend.

use crate::constants::OBJECT_HEADER_SIZE;
use crate::handle::Handle;
use crate::symbols::ExportMap;
use std::cell::Cell;
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const FAKE_THREAD: Handle = Handle(0x7000);

thread_local! {
    static CURRENT_DOMAIN: Cell<Handle> = Cell::new(Handle::NULL);
}

fn get<'a, T>(handle: Handle) -> Option<&'a T> {
    unsafe { handle.as_ptr::<T>().as_ref() }
}

fn leak<T>(value: T) -> Handle {
    Handle::from_ptr(Box::leak(Box::new(value)) as *const T)
}

fn cstr(value: &str) -> CString {
    CString::new(value).unwrap()
}

fn name_ptr(name: &Option<CString>) -> *const c_char {
    name.as_ref().map_or(std::ptr::null(), |n| n.as_ptr())
}

unsafe fn next(items: &[Handle], iter: *mut *mut c_void) -> Handle {
    if iter.is_null() {
        return Handle::NULL;
    }
    let index = *iter as usize;
    match items.get(index) {
        Some(item) => {
            *iter = (index + 1) as *mut c_void;
            *item
        }
        None => Handle::NULL,
    }
}

fn alloc_words(bytes: usize) -> *mut u8 {
    let word = std::mem::size_of::<usize>();
    let words = bytes.div_ceil(word).max(1);
    Box::leak(vec![0usize; words].into_boxed_slice()).as_mut_ptr() as *mut u8
}

/// A boxed value: object header followed by `value`
pub fn box_value<T: Copy>(value: T) -> Handle {
    let base = alloc_words(OBJECT_HEADER_SIZE + std::mem::size_of::<T>());
    unsafe { (base.add(OBJECT_HEADER_SIZE) as *mut T).write_unaligned(value) };
    Handle::from_ptr(base)
}

/// A `System.String` object laid out the way both runtimes store it
pub fn managed_string(value: &str) -> Handle {
    let units: Vec<u16> = value.encode_utf16().collect();
    let base = alloc_words(OBJECT_HEADER_SIZE + 4 + units.len() * 2);
    unsafe {
        (base.add(OBJECT_HEADER_SIZE) as *mut i32).write_unaligned(units.len() as i32);
        let chars = base.add(OBJECT_HEADER_SIZE + 4) as *mut u16;
        for (i, unit) in units.iter().enumerate() {
            chars.add(i).write_unaligned(*unit);
        }
    }
    Handle::from_ptr(base)
}

/// A zeroed instance of `class`, 16 words long
pub fn new_instance(class: Handle) -> Handle {
    let base = alloc_words(std::mem::size_of::<usize>() * 16);
    unsafe { (base as *mut Handle).write(class) };
    Handle::from_ptr(base)
}

#[derive(Default)]
pub struct FakeDomain {
    pub assemblies: Vec<Handle>,
    pub attached: AtomicUsize,
    pub jit_attached: AtomicUsize,
    pub detached: AtomicUsize,
}

impl FakeDomain {
    pub fn new(assemblies: Vec<Handle>) -> Self {
        FakeDomain {
            assemblies,
            ..Default::default()
        }
    }

    /// Leak the domain and make it the current thread's root domain
    pub fn install(self) -> &'static FakeDomain {
        let domain: &'static FakeDomain = Box::leak(Box::new(self));
        CURRENT_DOMAIN.with(|current| current.set(Handle::from_ptr(domain as *const FakeDomain)));
        domain
    }
}

pub struct FakeAssembly {
    pub image: Handle,
}

pub struct FakeImage {
    pub name: CString,
    /// IL2CPP reports image names with the file extension
    pub dll_name: CString,
    pub file: CString,
    pub classes: Vec<Handle>,
}

pub fn fake_assembly(name: &str, file: &str, classes: Vec<Handle>) -> Handle {
    let image = leak(FakeImage {
        name: cstr(name),
        dll_name: cstr(&format!("{}.dll", name)),
        file: cstr(file),
        classes,
    });
    leak(FakeAssembly { image })
}

#[derive(Default)]
pub struct FakeType {
    pub name: CString,
    pub size: i32,
    pub class: Handle,
    pub reference: bool,
}

pub fn fake_type(name: &str, size: i32) -> Handle {
    leak(FakeType {
        name: cstr(name),
        size,
        ..Default::default()
    })
}

pub fn fake_reference_type(name: &str) -> Handle {
    leak(FakeType {
        name: cstr(name),
        size: std::mem::size_of::<usize>() as i32,
        reference: true,
        ..Default::default()
    })
}

/// A type whose class reports itself as a value type
pub fn fake_struct_type(name: &str, size: i32) -> Handle {
    let class = FakeClass::new(name).value_type().leak();
    leak(FakeType {
        name: cstr(name),
        size,
        class,
        reference: false,
    })
}

pub struct FakeField {
    pub name: Option<CString>,
    pub ty: Handle,
    pub offset: isize,
    pub flags: u32,
    pub storage: *mut u8,
}

pub fn fake_field(name: &str, ty: Handle, offset: isize, flags: u32) -> Handle {
    leak(FakeField {
        name: Some(cstr(name)),
        ty,
        offset,
        flags,
        storage: alloc_words(16),
    })
}

pub fn nameless_field(ty: Handle) -> Handle {
    leak(FakeField {
        name: None,
        ty,
        offset: 0x10,
        flags: 0,
        storage: alloc_words(16),
    })
}

pub type InvokeFn = fn(object: Handle, params: *mut *mut c_void, exception: *mut Handle) -> Handle;

/// The first word is the native entry point, as in IL2CPP's `MethodInfo`.
#[repr(C)]
#[derive(Default)]
pub struct FakeMethod {
    pub method_ptr: usize,
    pub name: Option<CString>,
    pub return_type: Handle,
    pub flags: u32,
    pub params: Vec<(CString, Handle)>,
    pub compiled: usize,
    pub compile_count: AtomicUsize,
    pub invoke: Option<InvokeFn>,
}

impl FakeMethod {
    pub fn new(name: &str, return_type: Handle) -> Self {
        FakeMethod {
            name: Some(cstr(name)),
            return_type,
            ..Default::default()
        }
    }

    pub fn nameless() -> Self {
        FakeMethod::default()
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn param(mut self, name: &str, ty: Handle) -> Self {
        self.params.push((cstr(name), ty));
        self
    }

    /// Native code, available up front under IL2CPP and after compiling under Mono
    pub fn native(mut self, function: usize) -> Self {
        self.method_ptr = function;
        self.compiled = function;
        self
    }

    pub fn invoke(mut self, invoke: InvokeFn) -> Self {
        self.invoke = Some(invoke);
        self
    }

    pub fn leak(self) -> Handle {
        leak(self)
    }
}

pub fn compile_count(method: Handle) -> usize {
    get::<FakeMethod>(method).map_or(0, |m| m.compile_count.load(Ordering::SeqCst))
}

#[derive(Default)]
pub struct FakeClass {
    pub name: Option<CString>,
    pub namespace: CString,
    pub parent: Handle,
    pub fields: Vec<Handle>,
    pub methods: Vec<Handle>,
    pub interfaces: Vec<Handle>,
    pub value_type: bool,
    pub type_object: Handle,
    pub vtable_calls: AtomicUsize,
    pub type_object_calls: AtomicUsize,
}

impl FakeClass {
    pub fn new(name: &str) -> Self {
        FakeClass {
            name: Some(cstr(name)),
            type_object: box_value(0u64),
            ..Default::default()
        }
    }

    pub fn nameless() -> Self {
        FakeClass::default()
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.namespace = cstr(namespace);
        self
    }

    pub fn parent(mut self, parent: Handle) -> Self {
        self.parent = parent;
        self
    }

    pub fn field(mut self, field: Handle) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: Handle) -> Self {
        self.methods.push(method);
        self
    }

    pub fn interface(mut self, interface: Handle) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn value_type(mut self) -> Self {
        self.value_type = true;
        self
    }

    pub fn leak(self) -> Handle {
        leak(self)
    }
}

pub fn vtable_calls(class: Handle) -> usize {
    get::<FakeClass>(class).map_or(0, |c| c.vtable_calls.load(Ordering::SeqCst))
}

pub fn type_object_calls(class: Handle) -> usize {
    get::<FakeClass>(class).map_or(0, |c| c.type_object_calls.load(Ordering::SeqCst))
}

pub fn static_storage<T: Copy>(field: Handle) -> T {
    let field = get::<FakeField>(field).unwrap();
    unsafe { (field.storage as *const T).read_unaligned() }
}

pub fn set_static_storage<T: Copy>(field: Handle, value: T) {
    let field = get::<FakeField>(field).unwrap();
    unsafe { (field.storage as *mut T).write_unaligned(value) }
}

// Shared behaviour behind both export sets

fn domain_get() -> Handle {
    CURRENT_DOMAIN.with(|current| current.get())
}

fn attach(domain: Handle) -> Handle {
    match get::<FakeDomain>(domain) {
        Some(domain) => {
            domain.attached.fetch_add(1, Ordering::SeqCst);
            FAKE_THREAD
        }
        None => Handle::NULL,
    }
}

fn detach(thread: Handle) {
    if thread == FAKE_THREAD {
        if let Some(domain) = get::<FakeDomain>(domain_get()) {
            domain.detached.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn image_of(assembly: Handle) -> Handle {
    get::<FakeAssembly>(assembly).map_or(Handle::NULL, |a| a.image)
}

fn type_name(ty: Handle) -> *mut c_char {
    get::<FakeType>(ty).map_or(std::ptr::null_mut(), |t| t.name.clone().into_raw())
}

extern "C" fn fake_free(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

fn type_class(ty: Handle) -> Handle {
    get::<FakeType>(ty).map_or(Handle::NULL, |t| t.class)
}

extern "C" fn class_is_valuetype(class: Handle) -> bool {
    get::<FakeClass>(class).is_some_and(|c| c.value_type)
}

extern "C" fn class_get_name(class: Handle) -> *const c_char {
    get::<FakeClass>(class).map_or(std::ptr::null(), |c| name_ptr(&c.name))
}

extern "C" fn class_get_namespace(class: Handle) -> *const c_char {
    get::<FakeClass>(class).map_or(std::ptr::null(), |c| c.namespace.as_ptr())
}

extern "C" fn class_get_parent(class: Handle) -> Handle {
    get::<FakeClass>(class).map_or(Handle::NULL, |c| c.parent)
}

extern "C" fn class_get_fields(class: Handle, iter: *mut *mut c_void) -> Handle {
    get::<FakeClass>(class).map_or(Handle::NULL, |c| unsafe { next(&c.fields, iter) })
}

extern "C" fn class_get_methods(class: Handle, iter: *mut *mut c_void) -> Handle {
    get::<FakeClass>(class).map_or(Handle::NULL, |c| unsafe { next(&c.methods, iter) })
}

extern "C" fn class_get_interfaces(class: Handle, iter: *mut *mut c_void) -> Handle {
    get::<FakeClass>(class).map_or(Handle::NULL, |c| unsafe { next(&c.interfaces, iter) })
}

extern "C" fn class_get_type(class: Handle) -> Handle {
    class
}

fn type_object(ty: Handle) -> Handle {
    match get::<FakeClass>(ty) {
        Some(class) => {
            class.type_object_calls.fetch_add(1, Ordering::SeqCst);
            class.type_object
        }
        None => Handle::NULL,
    }
}

extern "C" fn field_get_name(field: Handle) -> *const c_char {
    get::<FakeField>(field).map_or(std::ptr::null(), |f| name_ptr(&f.name))
}

extern "C" fn field_get_type(field: Handle) -> Handle {
    get::<FakeField>(field).map_or(Handle::NULL, |f| f.ty)
}

extern "C" fn method_get_name(method: Handle) -> *const c_char {
    get::<FakeMethod>(method).map_or(std::ptr::null(), |m| name_ptr(&m.name))
}

extern "C" fn method_get_flags(method: Handle, implementation: *mut u32) -> u32 {
    if !implementation.is_null() {
        unsafe { *implementation = 0 };
    }
    get::<FakeMethod>(method).map_or(0, |m| m.flags)
}

fn runtime_invoke(
    method: Handle,
    object: Handle,
    params: *mut *mut c_void,
    exception: *mut Handle,
) -> Handle {
    match get::<FakeMethod>(method).and_then(|m| m.invoke) {
        Some(invoke) => invoke(object, params, exception),
        None => Handle::NULL,
    }
}

extern "C" fn object_unbox(object: Handle) -> *mut c_void {
    (object.addr() + OBJECT_HEADER_SIZE) as *mut c_void
}

fn static_get(field: Handle, out: *mut c_void) {
    let Some(field) = get::<FakeField>(field) else {
        return;
    };
    let size = get::<FakeType>(field.ty).map_or(0, |t| t.size.max(0) as usize);
    unsafe { std::ptr::copy_nonoverlapping(field.storage, out as *mut u8, size) };
}

/// IL2CPP reads reference values through `value`, Mono takes the object itself
fn static_set(field: Handle, value: *mut c_void, deref: bool) {
    let Some(field) = get::<FakeField>(field) else {
        return;
    };
    let Some(ty) = get::<FakeType>(field.ty) else {
        return;
    };
    unsafe {
        if ty.reference {
            let object = if deref { *(value as *const usize) } else { value as usize };
            (field.storage as *mut usize).write_unaligned(object);
        } else {
            std::ptr::copy_nonoverlapping(value as *const u8, field.storage, ty.size.max(0) as usize);
        }
    }
}

fn string_new(chars: *const c_char) -> Handle {
    if chars.is_null() {
        return Handle::NULL;
    }
    managed_string(&unsafe { CStr::from_ptr(chars) }.to_string_lossy())
}

// IL2CPP exports

extern "C" fn il2cpp_domain_get() -> Handle {
    domain_get()
}

extern "C" fn il2cpp_thread_attach(domain: Handle) -> Handle {
    attach(domain)
}

extern "C" fn il2cpp_thread_current() -> Handle {
    FAKE_THREAD
}

extern "C" fn il2cpp_thread_detach(thread: Handle) {
    detach(thread)
}

extern "C" fn il2cpp_domain_get_assemblies(domain: Handle, size: *mut usize) -> *const Handle {
    match get::<FakeDomain>(domain) {
        Some(domain) => {
            unsafe { *size = domain.assemblies.len() };
            domain.assemblies.as_ptr()
        }
        None => std::ptr::null(),
    }
}

extern "C" fn il2cpp_assembly_get_image(assembly: Handle) -> Handle {
    image_of(assembly)
}

extern "C" fn il2cpp_image_get_name(image: Handle) -> *const c_char {
    get::<FakeImage>(image).map_or(std::ptr::null(), |i| i.dll_name.as_ptr())
}

extern "C" fn mono_image_get_name(image: Handle) -> *const c_char {
    get::<FakeImage>(image).map_or(std::ptr::null(), |i| i.name.as_ptr())
}

extern "C" fn image_get_filename(image: Handle) -> *const c_char {
    get::<FakeImage>(image).map_or(std::ptr::null(), |i| i.file.as_ptr())
}

extern "C" fn il2cpp_image_get_class_count(image: Handle) -> usize {
    get::<FakeImage>(image).map_or(0, |i| i.classes.len())
}

extern "C" fn il2cpp_image_get_class(image: Handle, index: usize) -> Handle {
    get::<FakeImage>(image)
        .and_then(|i| i.classes.get(index).copied())
        .unwrap_or_default()
}

extern "C" fn il2cpp_field_get_offset(field: Handle) -> usize {
    get::<FakeField>(field).map_or(0, |f| f.offset as usize)
}

extern "C" fn il2cpp_type_get_name(ty: Handle) -> *mut c_char {
    type_name(ty)
}

extern "C" fn il2cpp_class_from_type(ty: Handle) -> Handle {
    type_class(ty)
}

extern "C" fn il2cpp_method_get_return_type(method: Handle) -> Handle {
    get::<FakeMethod>(method).map_or(Handle::NULL, |m| m.return_type)
}

extern "C" fn il2cpp_method_get_param_count(method: Handle) -> u32 {
    get::<FakeMethod>(method).map_or(0, |m| m.params.len() as u32)
}

extern "C" fn il2cpp_method_get_param_name(method: Handle, index: u32) -> *const c_char {
    get::<FakeMethod>(method)
        .and_then(|m| m.params.get(index as usize))
        .map_or(std::ptr::null(), |(name, _)| name.as_ptr())
}

extern "C" fn il2cpp_method_get_param(method: Handle, index: u32) -> Handle {
    get::<FakeMethod>(method)
        .and_then(|m| m.params.get(index as usize))
        .map_or(Handle::NULL, |(_, ty)| *ty)
}

extern "C" fn il2cpp_runtime_invoke(
    method: Handle,
    object: Handle,
    params: *mut *mut c_void,
    exception: *mut Handle,
) -> Handle {
    runtime_invoke(method, object, params, exception)
}

extern "C" fn il2cpp_field_static_get_value(field: Handle, out: *mut c_void) {
    static_get(field, out)
}

extern "C" fn il2cpp_field_static_set_value(field: Handle, value: *mut c_void) {
    static_set(field, value, true)
}

extern "C" fn il2cpp_type_get_object(ty: Handle) -> Handle {
    type_object(ty)
}

extern "C" fn il2cpp_string_new(chars: *const c_char) -> Handle {
    string_new(chars)
}

extern "C" fn il2cpp_object_new(class: Handle) -> Handle {
    new_instance(class)
}

/// The IL2CPP export surface, as exported by `GameAssembly.dll`
pub fn il2cpp_exports() -> ExportMap {
    ExportMap::new()
        .with_file_name("GameAssembly.dll")
        .with("il2cpp_domain_get", il2cpp_domain_get as usize)
        .with("il2cpp_thread_attach", il2cpp_thread_attach as usize)
        .with("il2cpp_thread_current", il2cpp_thread_current as usize)
        .with("il2cpp_thread_detach", il2cpp_thread_detach as usize)
        .with("il2cpp_domain_get_assemblies", il2cpp_domain_get_assemblies as usize)
        .with("il2cpp_assembly_get_image", il2cpp_assembly_get_image as usize)
        .with("il2cpp_image_get_name", il2cpp_image_get_name as usize)
        .with("il2cpp_image_get_filename", image_get_filename as usize)
        .with("il2cpp_image_get_class_count", il2cpp_image_get_class_count as usize)
        .with("il2cpp_image_get_class", il2cpp_image_get_class as usize)
        .with("il2cpp_class_get_name", class_get_name as usize)
        .with("il2cpp_class_get_namespace", class_get_namespace as usize)
        .with("il2cpp_class_get_parent", class_get_parent as usize)
        .with("il2cpp_class_get_interfaces", class_get_interfaces as usize)
        .with("il2cpp_class_get_fields", class_get_fields as usize)
        .with("il2cpp_class_get_methods", class_get_methods as usize)
        .with("il2cpp_class_get_type", class_get_type as usize)
        .with("il2cpp_class_is_valuetype", class_is_valuetype as usize)
        .with("il2cpp_class_from_type", il2cpp_class_from_type as usize)
        .with("il2cpp_field_get_name", field_get_name as usize)
        .with("il2cpp_field_get_type", field_get_type as usize)
        .with("il2cpp_field_get_offset", il2cpp_field_get_offset as usize)
        .with("il2cpp_field_static_get_value", il2cpp_field_static_get_value as usize)
        .with("il2cpp_field_static_set_value", il2cpp_field_static_set_value as usize)
        .with("il2cpp_type_get_name", il2cpp_type_get_name as usize)
        .with("il2cpp_type_get_object", il2cpp_type_get_object as usize)
        .with("il2cpp_free", fake_free as usize)
        .with("il2cpp_method_get_name", method_get_name as usize)
        .with("il2cpp_method_get_return_type", il2cpp_method_get_return_type as usize)
        .with("il2cpp_method_get_flags", method_get_flags as usize)
        .with("il2cpp_method_get_param_count", il2cpp_method_get_param_count as usize)
        .with("il2cpp_method_get_param_name", il2cpp_method_get_param_name as usize)
        .with("il2cpp_method_get_param", il2cpp_method_get_param as usize)
        .with("il2cpp_runtime_invoke", il2cpp_runtime_invoke as usize)
        .with("il2cpp_object_unbox", object_unbox as usize)
        .with("il2cpp_string_new", il2cpp_string_new as usize)
        .with("il2cpp_object_new", il2cpp_object_new as usize)
}

// Mono exports

extern "C" fn mono_get_root_domain() -> Handle {
    domain_get()
}

extern "C" fn mono_thread_attach(domain: Handle) -> Handle {
    attach(domain)
}

extern "C" fn mono_jit_thread_attach(domain: Handle) -> Handle {
    if let Some(fake) = get::<FakeDomain>(domain) {
        fake.jit_attached.fetch_add(1, Ordering::SeqCst);
    }
    domain
}

extern "C" fn mono_thread_current() -> Handle {
    FAKE_THREAD
}

extern "C" fn mono_thread_detach(thread: Handle) {
    detach(thread)
}

extern "C" fn mono_assembly_foreach(
    callback: extern "C" fn(Handle, *mut c_void),
    user_data: *mut c_void,
) {
    if let Some(domain) = get::<FakeDomain>(domain_get()) {
        for assembly in &domain.assemblies {
            callback(*assembly, user_data);
        }
    }
}

extern "C" fn mono_assembly_get_image(assembly: Handle) -> Handle {
    image_of(assembly)
}

extern "C" fn mono_image_get_table_info(image: Handle, table: i32) -> Handle {
    if table == crate::constants::MONO_TABLE_TYPEDEF {
        image
    } else {
        Handle::NULL
    }
}

extern "C" fn mono_table_info_get_rows(table: Handle) -> i32 {
    get::<FakeImage>(table).map_or(0, |i| i.classes.len() as i32)
}

extern "C" fn mono_class_get(image: Handle, token: u32) -> Handle {
    let row = (token & 0x00ff_ffff) as usize;
    get::<FakeImage>(image)
        .and_then(|i| i.classes.get(row.wrapping_sub(1)).copied())
        .unwrap_or_default()
}

extern "C" fn mono_field_get_offset(field: Handle) -> u32 {
    get::<FakeField>(field).map_or(0, |f| f.offset as u32)
}

extern "C" fn mono_field_get_flags(field: Handle) -> u32 {
    get::<FakeField>(field).map_or(0, |f| f.flags)
}

extern "C" fn mono_type_get_name(ty: Handle) -> *mut c_char {
    type_name(ty)
}

extern "C" fn mono_type_size(ty: Handle, alignment: *mut i32) -> i32 {
    let size = get::<FakeType>(ty).map_or(0, |t| t.size);
    if !alignment.is_null() {
        unsafe { *alignment = size.max(1) };
    }
    size
}

extern "C" fn mono_class_from_mono_type(ty: Handle) -> Handle {
    type_class(ty)
}

/// Signatures are the method records themselves
extern "C" fn mono_method_signature(method: Handle) -> Handle {
    method
}

extern "C" fn mono_signature_get_return_type(signature: Handle) -> Handle {
    get::<FakeMethod>(signature).map_or(Handle::NULL, |m| m.return_type)
}

extern "C" fn mono_signature_get_param_count(signature: Handle) -> u32 {
    get::<FakeMethod>(signature).map_or(0, |m| m.params.len() as u32)
}

extern "C" fn mono_method_get_param_names(method: Handle, names: *mut *const c_char) {
    if let Some(method) = get::<FakeMethod>(method) {
        for (i, (name, _)) in method.params.iter().enumerate() {
            unsafe { *names.add(i) = name.as_ptr() };
        }
    }
}

extern "C" fn mono_signature_get_params(signature: Handle, iter: *mut *mut c_void) -> Handle {
    match get::<FakeMethod>(signature) {
        Some(method) => {
            let types: Vec<Handle> = method.params.iter().map(|(_, ty)| *ty).collect();
            unsafe { next(&types, iter) }
        }
        None => Handle::NULL,
    }
}

extern "C" fn mono_compile_method(method: Handle) -> usize {
    match get::<FakeMethod>(method) {
        Some(method) => {
            method.compile_count.fetch_add(1, Ordering::SeqCst);
            method.compiled
        }
        None => 0,
    }
}

extern "C" fn mono_runtime_invoke(
    method: Handle,
    object: Handle,
    params: *mut *mut c_void,
    exception: *mut Handle,
) -> Handle {
    runtime_invoke(method, object, params, exception)
}

extern "C" fn mono_class_vtable(domain: Handle, class: Handle) -> Handle {
    if domain.is_null() {
        return Handle::NULL;
    }
    match get::<FakeClass>(class) {
        Some(fake) => {
            fake.vtable_calls.fetch_add(1, Ordering::SeqCst);
            Handle(class.addr() | 1)
        }
        None => Handle::NULL,
    }
}

extern "C" fn mono_field_static_get_value(vtable: Handle, field: Handle, out: *mut c_void) {
    if !vtable.is_null() {
        static_get(field, out)
    }
}

extern "C" fn mono_field_static_set_value(vtable: Handle, field: Handle, value: *mut c_void) {
    if !vtable.is_null() {
        static_set(field, value, false)
    }
}

extern "C" fn mono_type_get_object(domain: Handle, ty: Handle) -> Handle {
    if domain.is_null() {
        return Handle::NULL;
    }
    type_object(ty)
}

extern "C" fn mono_string_new(domain: Handle, chars: *const c_char) -> Handle {
    if domain.is_null() {
        return Handle::NULL;
    }
    string_new(chars)
}

extern "C" fn mono_object_new(domain: Handle, class: Handle) -> Handle {
    if domain.is_null() {
        return Handle::NULL;
    }
    new_instance(class)
}

/// The Mono export surface, as exported by `mono-2.0-bdwgc.dll`
pub fn mono_exports() -> ExportMap {
    ExportMap::new()
        .with_file_name("mono-2.0-bdwgc.dll")
        .with("mono_get_root_domain", mono_get_root_domain as usize)
        .with("mono_thread_attach", mono_thread_attach as usize)
        .with("mono_jit_thread_attach", mono_jit_thread_attach as usize)
        .with("mono_thread_current", mono_thread_current as usize)
        .with("mono_thread_detach", mono_thread_detach as usize)
        .with("mono_assembly_foreach", mono_assembly_foreach as usize)
        .with("mono_assembly_get_image", mono_assembly_get_image as usize)
        .with("mono_image_get_name", mono_image_get_name as usize)
        .with("mono_image_get_filename", image_get_filename as usize)
        .with("mono_image_get_table_info", mono_image_get_table_info as usize)
        .with("mono_table_info_get_rows", mono_table_info_get_rows as usize)
        .with("mono_class_get", mono_class_get as usize)
        .with("mono_class_get_name", class_get_name as usize)
        .with("mono_class_get_namespace", class_get_namespace as usize)
        .with("mono_class_get_parent", class_get_parent as usize)
        .with("mono_class_get_interfaces", class_get_interfaces as usize)
        .with("mono_class_get_fields", class_get_fields as usize)
        .with("mono_class_get_methods", class_get_methods as usize)
        .with("mono_class_get_type", class_get_type as usize)
        .with("mono_class_is_valuetype", class_is_valuetype as usize)
        .with("mono_class_from_mono_type", mono_class_from_mono_type as usize)
        .with("mono_class_vtable", mono_class_vtable as usize)
        .with("mono_field_get_name", field_get_name as usize)
        .with("mono_field_get_type", field_get_type as usize)
        .with("mono_field_get_offset", mono_field_get_offset as usize)
        .with("mono_field_get_flags", mono_field_get_flags as usize)
        .with("mono_field_static_get_value", mono_field_static_get_value as usize)
        .with("mono_field_static_set_value", mono_field_static_set_value as usize)
        .with("mono_type_get_name", mono_type_get_name as usize)
        .with("mono_type_size", mono_type_size as usize)
        .with("mono_type_get_object", mono_type_get_object as usize)
        .with("mono_free", fake_free as usize)
        .with("mono_method_get_name", method_get_name as usize)
        .with("mono_method_signature", mono_method_signature as usize)
        .with("mono_method_get_flags", method_get_flags as usize)
        .with("mono_signature_get_return_type", mono_signature_get_return_type as usize)
        .with("mono_signature_get_param_count", mono_signature_get_param_count as usize)
        .with("mono_signature_get_params", mono_signature_get_params as usize)
        .with("mono_method_get_param_names", mono_method_get_param_names as usize)
        .with("mono_compile_method", mono_compile_method as usize)
        .with("mono_runtime_invoke", mono_runtime_invoke as usize)
        .with("mono_object_unbox", object_unbox as usize)
        .with("mono_string_new", mono_string_new as usize)
        .with("mono_object_new", mono_object_new as usize)
}

// A small game world shared by the unit tests

pub const HEALTH_OFFSET: isize = 0x10;
pub const SPEED_OFFSET: isize = 0x14;
pub const NAME_OFFSET: isize = 0x18;

pub struct World {
    pub domain: &'static FakeDomain,
    pub player: Handle,
    pub legacy_player: Handle,
    pub instances: Handle,
    pub high_score: Handle,
    pub display_name: Handle,
    pub add: Handle,
    pub get_health: Handle,
    pub explode: Handle,
}

pub extern "C" fn native_add(a: i32, b: i32) -> i32 {
    a + b
}

pub extern "C" fn native_get_health(this: Handle) -> i32 {
    unsafe { (this.as_ptr::<u8>().offset(HEALTH_OFFSET) as *const i32).read_unaligned() }
}

fn invoke_add(_object: Handle, params: *mut *mut c_void, _exception: *mut Handle) -> Handle {
    let (a, b) = unsafe { (*(*params as *const i32), *(*params.add(1) as *const i32)) };
    box_value(a + b)
}

fn invoke_get_health(object: Handle, _params: *mut *mut c_void, _exception: *mut Handle) -> Handle {
    box_value(native_get_health(object))
}

fn invoke_get_name(object: Handle, _params: *mut *mut c_void, _exception: *mut Handle) -> Handle {
    unsafe { (object.as_ptr::<u8>().offset(NAME_OFFSET) as *const Handle).read_unaligned() }
}

fn invoke_explode(_object: Handle, _params: *mut *mut c_void, exception: *mut Handle) -> Handle {
    unsafe { *exception = managed_string("boom") };
    Handle::NULL
}

/// Build the shared world and make its domain current on this thread.
///
/// `Assembly-CSharp` holds `Game.Player`, a second `Legacy.Player`, a
/// null class slot and a nameless class; `UnityEngine.CoreModule` holds
/// `MonoBehaviour` and the `Vector3` struct. The domain's assembly list also
/// carries a null entry.
pub fn world() -> World {
    let int32 = fake_type("System.Int32", 4);
    let single = fake_type("System.Single", 4);
    let void = fake_type("System.Void", 0);
    let string = fake_reference_type("System.String");
    let vector3 = fake_struct_type("UnityEngine.Vector3", 12);

    let behaviour = FakeClass::new("MonoBehaviour")
        .namespace("UnityEngine")
        .leak();
    let vector3_class = FakeClass::new("Vector3")
        .namespace("UnityEngine")
        .value_type()
        .field(fake_field("x", single, 0x10, 0))
        .field(fake_field("y", single, 0x14, 0))
        .field(fake_field("z", single, 0x18, 0))
        .leak();

    let damageable = FakeClass::new("IDamageable")
        .namespace("Game")
        .method(FakeMethod::new("OnHit", void).param("amount", int32).leak())
        .leak();

    let instances = fake_field("instances", int32, 0, 0x10);
    let high_score = fake_field("highScore", int32, 0x20, 0x10);
    let display_name = fake_field("displayName", string, 0, 0x10);

    let add = FakeMethod::new("Add", int32)
        .flags(0x10)
        .param("a", int32)
        .param("b", int32)
        .native(native_add as usize)
        .invoke(invoke_add)
        .leak();
    let get_health = FakeMethod::new("GetHealth", int32)
        .native(native_get_health as usize)
        .invoke(invoke_get_health)
        .leak();
    let explode = FakeMethod::new("Explode", void).invoke(invoke_explode).leak();

    let player = FakeClass::new("Player")
        .namespace("Game")
        .parent(behaviour)
        .field(fake_field("health", int32, HEALTH_OFFSET, 0))
        .field(fake_field("speed", single, SPEED_OFFSET, 0))
        .field(fake_field("name", string, NAME_OFFSET, 0))
        .field(fake_field("position", vector3, 0x20, 0))
        .field(nameless_field(int32))
        .field(instances)
        .field(high_score)
        .field(display_name)
        .method(add)
        .method(get_health)
        .method(
            FakeMethod::new("Damage", void)
                .param("amount", int32)
                .leak(),
        )
        .method(
            FakeMethod::new("Damage", void)
                .param("amount", single)
                .leak(),
        )
        .method(
            FakeMethod::new("Damage", void)
                .param("amount", int32)
                .param("source", string)
                .leak(),
        )
        .method(
            FakeMethod::new("GetName", string)
                .invoke(invoke_get_name)
                .leak(),
        )
        .method(explode)
        .method(FakeMethod::nameless().leak())
        .interface(damageable)
        .leak();

    let legacy_player = FakeClass::new("Player")
        .namespace("Legacy")
        .field(fake_field("hp", int32, 0x10, 0))
        .leak();

    let game = fake_assembly(
        "Assembly-CSharp",
        "Managed/Assembly-CSharp.dll",
        vec![
            player,
            Handle::NULL,
            legacy_player,
            FakeClass::nameless().leak(),
        ],
    );
    let engine = fake_assembly(
        "UnityEngine.CoreModule",
        "Managed/UnityEngine.CoreModule.dll",
        vec![behaviour, vector3_class],
    );

    let domain = FakeDomain::new(vec![game, Handle::NULL, engine]).install();

    World {
        domain,
        player,
        legacy_player,
        instances,
        high_score,
        display_name,
        add,
        get_health,
        explode,
    }
}

/// A `Game.Player` instance with the given health, speed and name
pub fn player_instance(world: &World, health: i32, speed: f32, name: &str) -> Handle {
    let object = new_instance(world.player);
    unsafe {
        let base = object.as_ptr::<u8>();
        (base.offset(HEALTH_OFFSET) as *mut i32).write_unaligned(health);
        (base.offset(SPEED_OFFSET) as *mut f32).write_unaligned(speed);
        (base.offset(NAME_OFFSET) as *mut Handle).write_unaligned(managed_string(name));
    }
    object
}
