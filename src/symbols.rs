//! Exported-function lookup for the host runtime module
//!
//! Every reflection call goes through [`Exports`]: the first use of a name
//! resolves it from the module's export table and caches the address, later
//! uses reuse the cached value. Only the cache fill is serialized; the foreign
//! call itself runs outside the lock.

use crate::error::{ResolveError, Result};
use bytemuck::Zeroable;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::{c_char, CStr};
use tracing::trace;

/// Anything that can map an exported function name to its address.
pub trait SymbolSource: Send + Sync {
    /// Address of the named export, if the module has one
    fn lookup(&self, name: &str) -> Option<usize>;

    /// File name of the module, used to infer the runtime backend
    fn file_name(&self) -> Option<String> {
        None
    }
}

/// A runtime module that is already loaded in the current process.
pub struct Module {
    library: libloading::Library,
    file_name: Option<String>,
}

impl Module {
    /// Open a module that the process has already loaded, without loading it again
    #[cfg(unix)]
    pub fn open_loaded(name: &str) -> Result<Self> {
        use libloading::os::unix::{Library, RTLD_NOW};

        let library = unsafe { Library::open(Some(name), RTLD_NOW | libc::RTLD_NOLOAD) }
            .map_err(|e| ResolveError::ModuleNotFound(format!("{}: {}", name, e)))?;

        Ok(Module {
            library: library.into(),
            file_name: Some(name.to_string()),
        })
    }

    #[cfg(target_os = "windows")]
    pub fn open_loaded(name: &str) -> Result<Self> {
        use libloading::os::windows::Library;

        let library = Library::open_already_loaded(name)
            .map_err(|e| ResolveError::ModuleNotFound(format!("{}: {}", name, e)))?;

        Ok(Module {
            library: library.into(),
            file_name: Some(name.to_string()),
        })
    }

    /// Wrap a raw `HMODULE` handed over by the injection bootstrap.
    ///
    /// # Safety
    /// `handle` must be a module handle that stays loaded for the life of the process.
    #[cfg(target_os = "windows")]
    pub unsafe fn from_raw(handle: usize) -> Self {
        use libloading::os::windows::Library;

        let file_name = module_file_name(handle);
        Module {
            library: Library::from_raw(handle as _).into(),
            file_name,
        }
    }

    /// The main program of the current process
    pub fn this() -> Result<Self> {
        #[cfg(unix)]
        let library = libloading::os::unix::Library::this();
        #[cfg(target_os = "windows")]
        let library = libloading::os::windows::Library::this()
            .map_err(|e| ResolveError::ModuleNotFound(e.to_string()))?;

        Ok(Module {
            library: library.into(),
            file_name: None,
        })
    }
}

#[cfg(target_os = "windows")]
fn module_file_name(handle: usize) -> Option<String> {
    use winapi::shared::minwindef::HMODULE;
    use winapi::um::libloaderapi::GetModuleFileNameW;

    let mut buffer = vec![0u16; 1024];
    let len = unsafe {
        GetModuleFileNameW(handle as HMODULE, buffer.as_mut_ptr(), buffer.len() as u32)
    } as usize;
    if len == 0 {
        return None;
    }
    Some(String::from_utf16_lossy(&buffer[..len]))
}

impl SymbolSource for Module {
    fn lookup(&self, name: &str) -> Option<usize> {
        let symbol = unsafe { self.library.get::<unsafe extern "C" fn()>(name.as_bytes()) }.ok()?;
        Some(*symbol as usize)
    }

    fn file_name(&self) -> Option<String> {
        self.file_name.clone()
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("file_name", &self.file_name)
            .finish()
    }
}

/// A pre-resolved name→address table.
///
/// Useful when the embedder already resolved the exports itself (for example
/// from a manually mapped image), and as the symbol source for fake runtimes.
#[derive(Debug, Clone, Default)]
pub struct ExportMap {
    symbols: HashMap<String, usize>,
    file_name: Option<String>,
}

impl ExportMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, address: usize) {
        self.symbols.insert(name.into(), address);
    }

    pub fn with(mut self, name: impl Into<String>, address: usize) -> Self {
        self.insert(name, address);
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl SymbolSource for ExportMap {
    fn lookup(&self, name: &str) -> Option<usize> {
        self.symbols.get(name).copied()
    }

    fn file_name(&self) -> Option<String> {
        self.file_name.clone()
    }
}

impl<S: AsRef<str>> FromIterator<(S, usize)> for ExportMap {
    fn from_iter<I: IntoIterator<Item = (S, usize)>>(iter: I) -> Self {
        ExportMap {
            symbols: iter
                .into_iter()
                .map(|(name, address)| (name.as_ref().to_string(), address))
                .collect(),
            file_name: None,
        }
    }
}

/// Argument lists that can be passed to a native function by address.
///
/// Implemented for tuples of up to ten elements; each element is passed by
/// value using the C calling convention. Matching the real signature is the
/// caller's responsibility.
pub trait NativeArgs {
    /// # Safety
    /// `function` must be the address of a function whose signature matches
    /// `extern "C" fn(Self...) -> R`.
    unsafe fn call<R>(self, function: usize) -> R;
}

macro_rules! native_args {
    ($($ty:ident $arg:ident),*) => {
        impl<$($ty),*> NativeArgs for ($($ty,)*) {
            unsafe fn call<R>(self, function: usize) -> R {
                let target: unsafe extern "C" fn($($ty),*) -> R = std::mem::transmute_copy(&function);
                let ($($arg,)*) = self;
                target($($arg),*)
            }
        }
    };
}

native_args!();
native_args!(A a);
native_args!(A a, B b);
native_args!(A a, B b, C c);
native_args!(A a, B b, C c, D d);
native_args!(A a, B b, C c, D d, E e);
native_args!(A a, B b, C c, D d, E e, F f);
native_args!(A a, B b, C c, D d, E e, F f, G g);
native_args!(A a, B b, C c, D d, E e, F f, G g, H h);
native_args!(A a, B b, C c, D d, E e, F f, G g, H h, I i);
native_args!(A a, B b, C c, D d, E e, F f, G g, H h, I i, J j);

/// Cached view of the runtime module's exports.
pub struct Exports {
    source: Box<dyn SymbolSource>,
    cache: Mutex<HashMap<String, Option<usize>>>,
}

impl Exports {
    pub fn new(source: impl SymbolSource + 'static) -> Self {
        Exports {
            source: Box::new(source),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve `name` once and reuse the cached address afterwards.
    /// Failed lookups are cached too.
    pub fn address(&self, name: &str) -> Option<usize> {
        let mut cache = self.cache.lock();
        if let Some(cached) = cache.get(name) {
            return *cached;
        }

        let resolved = self.source.lookup(name).filter(|address| *address != 0);
        match resolved {
            Some(address) => trace!("resolved {} at 0x{:x}", name, address),
            None => trace!("export {} not found", name),
        }
        cache.insert(name.to_string(), resolved);
        resolved
    }

    pub fn contains(&self, name: &str) -> bool {
        self.address(name).is_some()
    }

    /// Call an export, yielding a zeroed `R` when the export does not exist.
    ///
    /// # Safety
    /// The export's real signature must be `extern "C" fn(A...) -> R`, and any
    /// handles passed must be valid for the runtime.
    pub unsafe fn invoke<R: Zeroable, A: NativeArgs>(&self, name: &str, args: A) -> R {
        match self.address(name) {
            Some(function) => args.call(function),
            None => R::zeroed(),
        }
    }

    /// Like [`Exports::invoke`], but reports a missing export.
    pub unsafe fn try_invoke<R, A: NativeArgs>(&self, name: &str, args: A) -> Result<R> {
        let function = self
            .address(name)
            .ok_or_else(|| ResolveError::SymbolNotFound(name.to_string()))?;
        Ok(args.call(function))
    }

    pub fn file_name(&self) -> Option<String> {
        self.source.file_name()
    }

    /// Number of distinct names looked up so far
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }

    /// Load address of the module, found through any export resolved so far
    pub fn module_base(&self) -> Option<usize> {
        let any = self.cache.lock().values().find_map(|address| *address)?;
        crate::memory::module_base_of(any)
    }
}

impl std::fmt::Debug for Exports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exports")
            .field("file_name", &self.source.file_name())
            .field("cached", &self.cached())
            .finish()
    }
}

/// Copy a runtime-owned C string. Null yields `None`.
pub(crate) fn c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Copy a C string the runtime allocated for us, then hand it back to the
/// runtime's allocator when the module exports one.
pub(crate) fn owned_c_string(exports: &Exports, ptr: *mut c_char, free: &str) -> Option<String> {
    let value = c_string(ptr);
    if !ptr.is_null() {
        unsafe { exports.invoke::<(), _>(free, (ptr,)) };
    }
    value
}
