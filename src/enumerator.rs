//! One-shot walk of the live runtime metadata
//!
//! domain -> assemblies -> image -> classes -> fields / methods / interfaces.
//! Null handles and nameless records are skipped one at a time so a single
//! bad entry never ends the walk.

use crate::backend::BackendRef;
use crate::common::TypeCode;
use crate::config::ResolveConfig;
use crate::error::{ResolveError, Result};
use crate::handle::Handle;
use crate::metadata::{Arg, Assembly, Class, Field, KeyedList, Method, Type};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use tracing::{debug, info, trace, warn};

/// Counts of what the walk produced and what it had to skip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnumerationStats {
    pub assemblies: usize,
    pub classes: usize,
    pub fields: usize,
    pub methods: usize,
    pub skipped: usize,
}

pub struct Enumerator<'a> {
    backend: &'a BackendRef,
    config: &'a ResolveConfig,
    types: HashMap<Handle, Type>,
    stats: EnumerationStats,
}

impl<'a> Enumerator<'a> {
    pub fn new(backend: &'a BackendRef, config: &'a ResolveConfig) -> Self {
        Enumerator {
            backend,
            config,
            types: HashMap::new(),
            stats: EnumerationStats::default(),
        }
    }

    /// Walk the whole runtime once and return the assemblies found
    pub fn run(mut self) -> Result<(Vec<Assembly>, EnumerationStats)> {
        let backend = self.backend.clone();
        let domain = backend.domain();
        if domain.is_null() {
            return Err(ResolveError::NullHandle("domain"));
        }
        if self.config.attach_thread {
            backend.thread_attach(domain);
        }

        let mut assemblies = Vec::new();
        for handle in backend.assemblies(domain) {
            if handle.is_null() {
                self.stats.skipped += 1;
                continue;
            }
            match self.read_assembly(handle) {
                Some(assembly) => assemblies.push(assembly),
                None => self.stats.skipped += 1,
            }
        }
        self.stats.assemblies = assemblies.len();

        info!(
            "{} metadata: {} assemblies, {} classes, {} fields, {} methods ({} skipped)",
            backend.runtime_name(),
            self.stats.assemblies,
            self.stats.classes,
            self.stats.fields,
            self.stats.methods,
            self.stats.skipped
        );
        Ok((assemblies, self.stats))
    }

    fn read_assembly(&mut self, handle: Handle) -> Option<Assembly> {
        let backend = self.backend.clone();
        let image = backend.assembly_image(handle);
        if image.is_null() {
            warn!("assembly {} has no image", handle);
            return None;
        }
        let Some(name) = backend.image_name(image) else {
            warn!("assembly {} has no name", handle);
            return None;
        };

        let mut assembly = Assembly {
            address: handle,
            name,
            file: backend.image_file(image).unwrap_or_default(),
            classes: KeyedList::new(),
        };

        if self.config.skips(&assembly.name) {
            debug!("skipping classes of {}", assembly.name);
            return Some(assembly);
        }

        for class in backend.image_classes(image) {
            if class.is_null() {
                self.stats.skipped += 1;
                continue;
            }
            match self.read_class(class) {
                Some(record) => {
                    let name = record.name.clone();
                    let key = assembly.classes.push(&name, record);
                    if key != name {
                        debug!("duplicate class {} in {} stored as {}", name, assembly.name, key);
                    }
                }
                None => self.stats.skipped += 1,
            }
        }
        self.stats.classes += assembly.classes.len();

        debug!("{}: {} classes", assembly.name, assembly.classes.len());
        Some(assembly)
    }

    fn read_class(&mut self, handle: Handle) -> Option<Class> {
        let backend = self.backend.clone();
        let Some(name) = backend.class_name(handle) else {
            warn!("class {} has no name", handle);
            return None;
        };
        let parent = backend
            .class_parent(handle)
            .non_null()
            .and_then(|parent| backend.class_name(parent));

        let mut class = Class::new(
            handle,
            name,
            backend.class_namespace(handle).unwrap_or_default(),
            parent,
            backend.clone(),
        );

        self.read_members(&mut class, handle);
        if self.config.include_interfaces {
            for interface in backend.class_interfaces(handle) {
                trace!("merging interface {} into {}", interface, class.name);
                self.read_members(&mut class, interface);
            }
        }
        Some(class)
    }

    /// Append the fields and methods `owner` reports to `class`
    fn read_members(&mut self, class: &mut Class, owner: Handle) {
        let backend = self.backend.clone();

        for handle in backend.class_fields(owner) {
            let Some(info) = backend.field_info(handle) else {
                trace!("field {} of {} has no name", handle, class.name);
                self.stats.skipped += 1;
                continue;
            };
            let field = Field {
                address: handle,
                ty: self.read_type(info.type_handle),
                name: info.name,
                class: class.address,
                class_name: class.name.clone(),
                declaring: owner,
                offset: info.offset,
                static_field: info.is_static,
                vtable: OnceCell::new(),
                backend: backend.clone(),
            };
            let name = field.name.clone();
            class.fields.push(&name, field);
            self.stats.fields += 1;
        }

        for handle in backend.class_methods(owner) {
            let Some(info) = backend.method_info(handle) else {
                trace!("method {} of {} has no name", handle, class.name);
                self.stats.skipped += 1;
                continue;
            };
            let args = info
                .params
                .into_iter()
                .map(|(name, ty)| Arg {
                    name,
                    ty: self.read_type(ty),
                })
                .collect();
            let function = match info.entry_point {
                Some(address) => OnceCell::with_value(address),
                None => OnceCell::new(),
            };
            let method = Method {
                address: handle,
                return_type: self.read_type(info.return_type),
                name: info.name,
                class: class.address,
                class_name: class.name.clone(),
                flags: info.flags,
                args,
                function,
                backend: backend.clone(),
            };
            let name = method.name.clone();
            class.methods.push(&name, method);
            self.stats.methods += 1;
        }
    }

    fn read_type(&mut self, handle: Handle) -> Type {
        if let Some(ty) = self.types.get(&handle) {
            return ty.clone();
        }

        let ty = if handle.is_null() {
            Type {
                address: handle,
                name: String::new(),
                size: None,
                code: TypeCode::VOID,
            }
        } else {
            let name = self.backend.type_name(handle).unwrap_or_default();
            let code = TypeCode::from_type_name(&name).unwrap_or_else(|| {
                if self.backend.type_is_value_type(handle) {
                    TypeCode::VALUETYPE
                } else {
                    TypeCode::CLASS
                }
            });
            Type {
                address: handle,
                size: self.backend.type_size(handle),
                name,
                code,
            }
        };
        self.types.insert(handle, ty.clone());
        ty
    }
}
