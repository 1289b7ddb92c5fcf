//! The resolver context: one enumerated runtime and its query surface

use crate::backend::{create_backend, BackendRef, Mode};
use crate::config::ResolveConfig;
use crate::enumerator::{EnumerationStats, Enumerator};
use crate::error::{ResolveError, Result};
use crate::handle::Handle;
use crate::metadata::{Assembly, Class, Field, Method};
use crate::symbols::{Exports, Module, SymbolSource};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::CString;
use tracing::{debug, info};

/// Whether two assembly names refer to the same assembly.
/// IL2CPP reports `Foo.dll`, Mono reports `Foo`.
pub fn same_assembly(a: &str, b: &str) -> bool {
    fn stem(name: &str) -> &str {
        match name.len().checked_sub(4) {
            Some(split) if name.is_char_boundary(split) && name[split..].eq_ignore_ascii_case(".dll") => {
                &name[..split]
            }
            _ => name,
        }
    }
    stem(a) == stem(b)
}

/// (member kind, assembly, class, member, argument types)
type LookupKey = (&'static str, String, String, String, Vec<String>);

/// Position of a member in the graph: assembly, class, member
type MemberIndex = (usize, usize, usize);

/// An enumerated runtime.
///
/// Built once by [`UnityResolve::init`]; the metadata graph is read-only
/// afterwards, so the context can be shared between threads freely.
#[derive(Debug)]
pub struct UnityResolve {
    backend: BackendRef,
    config: ResolveConfig,
    assemblies: Vec<Assembly>,
    stats: EnumerationStats,
    lookups: Mutex<HashMap<LookupKey, Option<MemberIndex>>>,
}

impl UnityResolve {
    /// Select the backend for `source`, attach this thread and enumerate
    pub fn init(source: impl SymbolSource + 'static, config: ResolveConfig) -> Result<Self> {
        let backend = create_backend(config.mode, Exports::new(source))?;
        Self::with_backend(backend, config)
    }

    /// Use a runtime module the process has already loaded
    pub fn open(module: &str, config: ResolveConfig) -> Result<Self> {
        Self::init(Module::open_loaded(module)?, config)
    }

    /// Find the runtime module by its usual file name.
    /// `Mode::Auto` tries IL2CPP first, then Mono.
    #[cfg(any(target_os = "windows", target_os = "linux", target_os = "macos"))]
    pub fn attach(config: ResolveConfig) -> Result<Self> {
        use crate::constants::{IL2CPP_LIBRARY, MONO_LIBRARY};

        let module = match config.mode {
            Mode::Il2cpp => Module::open_loaded(IL2CPP_LIBRARY)?,
            Mode::Mono => Module::open_loaded(MONO_LIBRARY)?,
            Mode::Auto => Module::open_loaded(IL2CPP_LIBRARY)
                .or_else(|_| Module::open_loaded(MONO_LIBRARY))?,
        };
        Self::init(module, config)
    }

    /// Start from a raw module handle handed over by the loader.
    ///
    /// # Safety
    /// `module` must be a valid `HMODULE` that stays loaded for the life of the process.
    #[cfg(target_os = "windows")]
    pub unsafe fn from_module_handle(module: usize, config: ResolveConfig) -> Result<Self> {
        Self::init(Module::from_raw(module), config)
    }

    pub fn with_backend(backend: BackendRef, config: ResolveConfig) -> Result<Self> {
        info!("initializing {} resolver", backend.runtime_name());
        let (assemblies, stats) = Enumerator::new(&backend, &config).run()?;

        Ok(UnityResolve {
            backend,
            config,
            assemblies,
            stats,
            lookups: Mutex::new(HashMap::new()),
        })
    }

    pub fn mode(&self) -> Mode {
        self.backend.mode()
    }

    pub fn backend(&self) -> &BackendRef {
        &self.backend
    }

    pub fn config(&self) -> &ResolveConfig {
        &self.config
    }

    pub fn stats(&self) -> EnumerationStats {
        self.stats
    }

    pub fn assemblies(&self) -> &[Assembly] {
        &self.assemblies
    }

    fn assembly_index(&self, name: &str) -> Option<usize> {
        self.assemblies
            .iter()
            .position(|a| same_assembly(&a.name, name))
    }

    /// Assembly by name, with or without the `.dll` extension
    pub fn get(&self, assembly: &str) -> Result<&Assembly> {
        self.assembly_index(assembly)
            .map(|index| &self.assemblies[index])
            .ok_or_else(|| not_found("assembly", assembly))
    }

    pub fn class(&self, assembly: &str, class: &str) -> Result<&Class> {
        self.find_class(assembly, class, "*", "*")
    }

    /// Class by name, filtered by namespace and parent name (`"*"` for any)
    pub fn find_class(
        &self,
        assembly: &str,
        class: &str,
        namespace: &str,
        parent: &str,
    ) -> Result<&Class> {
        self.get(assembly)?
            .get(class, namespace, parent)
            .ok_or_else(|| not_found("class", class))
    }

    /// Method lookup through the memo table.
    ///
    /// The first lookup of a `(assembly, class, name, args)` combination
    /// searches the graph; later ones, hits and misses alike, come from the table.
    pub fn method(
        &self,
        assembly: &str,
        class: &str,
        name: &str,
        arg_types: &[&str],
    ) -> Result<&Method> {
        let key = lookup_key("method", assembly, class, name, arg_types);
        let index = self.memoized(key, || {
            let a = self.assembly_index(assembly)?;
            let c = self.assemblies[a].class_index(class, "*", "*")?;
            let m = self.assemblies[a].classes.get(c)?.method_index(name, arg_types)?;
            Some((a, c, m))
        });

        index
            .and_then(|(a, c, m)| self.assemblies[a].classes.get(c)?.methods.get(m))
            .ok_or_else(|| not_found("method", &format!("{}.{}", class, name)))
    }

    /// Field lookup through the memo table
    pub fn field(&self, assembly: &str, class: &str, name: &str) -> Result<&Field> {
        let key = lookup_key("field", assembly, class, name, &[]);
        let index = self.memoized(key, || {
            let a = self.assembly_index(assembly)?;
            let c = self.assemblies[a].class_index(class, "*", "*")?;
            let f = self.assemblies[a]
                .classes
                .get(c)?
                .fields
                .position(|f| f.name == name)?;
            Some((a, c, f))
        });

        index
            .and_then(|(a, c, f)| self.assemblies[a].classes.get(c)?.fields.get(f))
            .ok_or_else(|| not_found("field", &format!("{}.{}", class, name)))
    }

    fn memoized(
        &self,
        key: LookupKey,
        search: impl FnOnce() -> Option<MemberIndex>,
    ) -> Option<MemberIndex> {
        let mut lookups = self.lookups.lock();
        *lookups.entry(key).or_insert_with(search)
    }

    /// Number of distinct member lookups remembered so far
    pub fn memoized_lookups(&self) -> usize {
        self.lookups.lock().len()
    }

    /// Attach the calling OS thread to the root domain.
    /// Required before touching the runtime from a thread it has not seen.
    pub fn thread_attach(&self) -> Result<Handle> {
        let domain = self.backend.domain();
        if domain.is_null() {
            return Err(ResolveError::NullHandle("domain"));
        }
        let thread = self.backend.thread_attach(domain);
        debug!("attached thread {}", thread);
        thread.non_null().ok_or(ResolveError::NullHandle("thread"))
    }

    /// Detach the calling OS thread from the runtime
    pub fn thread_detach(&self) -> Result<()> {
        let thread = self
            .backend
            .thread_current()
            .non_null()
            .ok_or(ResolveError::NullHandle("thread"))?;
        self.backend.thread_detach(thread);
        debug!("detached thread {}", thread);
        Ok(())
    }

    /// Attach the calling thread until the guard is dropped
    pub fn attach_scope(&self) -> Result<ThreadGuard> {
        let thread = self.thread_attach()?;
        Ok(ThreadGuard {
            backend: self.backend.clone(),
            thread,
        })
    }

    /// A new managed `System.String`
    pub fn new_string(&self, value: &str) -> Result<Handle> {
        let value = CString::new(value)
            .map_err(|e| ResolveError::InvalidArgument(format!("string with interior NUL: {}", e)))?;
        self.backend
            .string_new(&value)
            .non_null()
            .ok_or(ResolveError::NullHandle("string"))
    }

    /// Load address of the runtime module
    pub fn module_base(&self) -> Option<usize> {
        self.backend.exports().module_base()
    }

    /// Entry point of `method` relative to the module base, if both are known
    pub fn method_rva(&self, method: &Method) -> Option<usize> {
        let function = method.function()?;
        function.checked_sub(self.module_base()?)
    }
}

fn lookup_key(
    kind: &'static str,
    assembly: &str,
    class: &str,
    member: &str,
    arg_types: &[&str],
) -> LookupKey {
    (
        kind,
        assembly.to_string(),
        class.to_string(),
        member.to_string(),
        arg_types.iter().map(|ty| ty.to_string()).collect(),
    )
}

fn not_found(kind: &'static str, name: &str) -> ResolveError {
    ResolveError::NotFound {
        kind,
        name: name.to_string(),
    }
}

/// Keeps the thread attached to the runtime; detaches on drop
#[derive(Debug)]
pub struct ThreadGuard {
    backend: BackendRef,
    thread: Handle,
}

impl ThreadGuard {
    pub fn thread(&self) -> Handle {
        self.thread
    }
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        self.backend.thread_detach(self.thread);
    }
}
