//! The metadata graph: assemblies, classes, fields, methods and types
//!
//! Records are built once by the enumerator and never change shape
//! afterwards. The only mutable state is a handful of fill-once cells
//! (`Method::function`, `Field::vtable`, `Class::type_object`).

use crate::backend::BackendRef;
use crate::common::TypeCode;
use crate::constants::METHOD_ATTRIBUTE_STATIC;
use crate::handle::Handle;
use once_cell::sync::OnceCell;
use serde::{Serialize, Serializer};
use std::collections::HashMap;

/// Matches any namespace, parent or argument type
pub const WILDCARD: &str = "*";

fn matches_filter(filter: &str, value: &str) -> bool {
    filter.is_empty() || filter == WILDCARD || filter == value
}

/// An ordered list whose entries are also reachable by a unique key.
///
/// The first entry pushed under a name gets the bare name as its key, later
/// ones get `name#1`, `name#2`, ... so duplicates never shadow each other.
#[derive(Debug, Clone)]
pub struct KeyedList<T> {
    items: Vec<T>,
    keys: Vec<String>,
    index: HashMap<String, usize>,
    counts: HashMap<String, usize>,
}

impl<T> Default for KeyedList<T> {
    fn default() -> Self {
        KeyedList {
            items: Vec::new(),
            keys: Vec::new(),
            index: HashMap::new(),
            counts: HashMap::new(),
        }
    }
}

impl<T> KeyedList<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `item`, returning the key it is reachable under
    pub fn push(&mut self, name: &str, item: T) -> String {
        let count = self.counts.entry(name.to_string()).or_insert(0);
        let mut key = if *count == 0 {
            name.to_string()
        } else {
            format!("{}#{}", name, count)
        };
        *count += 1;
        // a real name may already look like a generated key
        while self.index.contains_key(&key) {
            key = format!("{}#{}", name, count);
            *count += 1;
        }

        self.index.insert(key.clone(), self.items.len());
        self.keys.push(key.clone());
        self.items.push(item);
        key
    }

    pub fn get_key(&self, key: &str) -> Option<&T> {
        self.index.get(key).map(|&i| &self.items[i])
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn key_of(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Position of the first entry satisfying `predicate`
    pub fn position(&self, predicate: impl FnMut(&T) -> bool) -> Option<usize> {
        self.items.iter().position(predicate)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a, T> IntoIterator for &'a KeyedList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Serialize> Serialize for KeyedList<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.items.iter())
    }
}

/// A managed type as seen from a field, parameter or return value
#[derive(Debug, Clone, Serialize)]
pub struct Type {
    pub address: Handle,
    /// Fully qualified name, the key for overload matching
    pub name: String,
    /// Unknown under IL2CPP
    pub size: Option<i32>,
    pub code: TypeCode,
}

impl Type {
    /// Values of this type travel boxed through reflection calls
    pub fn is_value_type(&self) -> bool {
        self.code.is_value()
    }

    pub fn is_void(&self) -> bool {
        self.code == TypeCode::VOID
    }
}

/// A method parameter
#[derive(Debug, Clone, Serialize)]
pub struct Arg {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
}

#[derive(Debug, Serialize)]
pub struct Field {
    pub address: Handle,
    pub name: String,
    #[serde(rename = "type")]
    pub ty: Type,
    /// Class the field is listed under; the implementing class for fields
    /// merged from an interface
    pub class: Handle,
    pub class_name: String,
    /// Class or interface that owns the static storage
    pub declaring: Handle,
    /// Byte offset from the start of an instance. Meaningless for statics.
    pub offset: i32,
    pub static_field: bool,
    #[serde(skip)]
    pub(crate) vtable: OnceCell<Handle>,
    #[serde(skip)]
    pub(crate) backend: BackendRef,
}

impl Field {
    pub fn is_static(&self) -> bool {
        self.static_field
    }
}

#[derive(Debug, Serialize)]
pub struct Method {
    pub address: Handle,
    pub name: String,
    pub class: Handle,
    pub class_name: String,
    pub return_type: Type,
    pub flags: u32,
    pub args: Vec<Arg>,
    #[serde(serialize_with = "serialize_function")]
    pub(crate) function: OnceCell<usize>,
    #[serde(skip)]
    pub(crate) backend: BackendRef,
}

fn serialize_function<S: Serializer>(
    function: &OnceCell<usize>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match function.get() {
        Some(address) => Handle(*address).serialize(serializer),
        None => serializer.serialize_none(),
    }
}

impl Method {
    pub fn is_static(&self) -> bool {
        self.flags & METHOD_ATTRIBUTE_STATIC != 0
    }

    /// Native entry point if it is already known, without compiling
    pub fn function(&self) -> Option<usize> {
        self.function.get().copied()
    }

    /// Whether every argument type matches `arg_types`, wildcards allowed
    pub fn matches_args(&self, arg_types: &[&str]) -> bool {
        self.args.len() == arg_types.len()
            && self
                .args
                .iter()
                .zip(arg_types)
                .all(|(arg, wanted)| matches_filter(wanted, &arg.ty.name))
    }

    /// `Name(System.Int32, System.String)`
    pub fn signature(&self) -> String {
        let args: Vec<&str> = self.args.iter().map(|a| a.ty.name.as_str()).collect();
        format!("{}({})", self.name, args.join(", "))
    }
}

#[derive(Debug, Serialize)]
pub struct Class {
    pub address: Handle,
    pub name: String,
    pub namespace: String,
    /// Immediate base class name only
    pub parent: Option<String>,
    pub fields: KeyedList<Field>,
    pub methods: KeyedList<Method>,
    #[serde(skip)]
    pub(crate) type_object: OnceCell<Handle>,
    #[serde(skip)]
    pub(crate) backend: BackendRef,
}

impl Class {
    pub(crate) fn new(
        address: Handle,
        name: String,
        namespace: String,
        parent: Option<String>,
        backend: BackendRef,
    ) -> Self {
        Class {
            address,
            name,
            namespace,
            parent,
            fields: KeyedList::new(),
            methods: KeyedList::new(),
            type_object: OnceCell::new(),
            backend,
        }
    }

    /// `Namespace.Name`, or just `Name` in the global namespace
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_key(&self, key: &str) -> Option<&Field> {
        self.fields.get_key(key)
    }

    /// Instance field at exactly `offset`
    pub fn field_at(&self, offset: i32) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| !f.static_field && f.offset == offset)
    }

    /// Look a method up by name and argument type names.
    ///
    /// An empty `arg_types` takes the first method of that name whatever its
    /// arity. Otherwise the arity must match and every position must either
    /// equal the parameter's type name or be `"*"`/`""`.
    pub fn method(&self, name: &str, arg_types: &[&str]) -> Option<&Method> {
        self.method_index(name, arg_types)
            .and_then(|index| self.methods.get(index))
    }

    pub(crate) fn method_index(&self, name: &str, arg_types: &[&str]) -> Option<usize> {
        self.methods.position(|m| {
            m.name == name && (arg_types.is_empty() || m.matches_args(arg_types))
        })
    }

    pub fn method_by_key(&self, key: &str) -> Option<&Method> {
        self.methods.get_key(key)
    }

    /// Every method called `name`, overloads included
    pub fn overloads<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Method> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }
}

#[derive(Debug, Serialize)]
pub struct Assembly {
    pub address: Handle,
    pub name: String,
    pub file: String,
    pub classes: KeyedList<Class>,
}

impl Assembly {
    /// First class called `name` whose namespace and parent pass the filters.
    /// `"*"` or `""` accepts anything.
    pub fn get(&self, name: &str, namespace: &str, parent: &str) -> Option<&Class> {
        self.class_index(name, namespace, parent)
            .and_then(|index| self.classes.get(index))
    }

    /// Shorthand for `get(name, "*", "*")`
    pub fn class(&self, name: &str) -> Option<&Class> {
        self.get(name, WILDCARD, WILDCARD)
    }

    pub(crate) fn class_index(&self, name: &str, namespace: &str, parent: &str) -> Option<usize> {
        self.classes.position(|c| {
            c.name == name
                && matches_filter(namespace, &c.namespace)
                && matches_filter(parent, c.parent.as_deref().unwrap_or(""))
        })
    }

    /// Class by its unique key, `Name` or `Name#n` for later duplicates
    pub fn get_by_key(&self, key: &str) -> Option<&Class> {
        self.classes.get_key(key)
    }

    /// Every class called `name`
    pub fn classes_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Class> + 'a {
        self.classes.iter().filter(move |c| c.name == name)
    }
}
