/// `FIELD_ATTRIBUTE_STATIC` in the field attribute bitmask
pub const FIELD_ATTRIBUTE_STATIC: u32 = 0x10;
/// `METHOD_ATTRIBUTE_STATIC` in the method flags
pub const METHOD_ATTRIBUTE_STATIC: u32 = 0x10;

/// Metadata table index of the TypeDef table
pub const MONO_TABLE_TYPEDEF: i32 = 2;
/// Token prefix for TypeDef rows; rows are 1-based
pub const TYPEDEF_TOKEN: u32 = 0x0200_0000;

/// Name of the IL2CPP runtime module on each platform
#[cfg(target_os = "windows")]
pub const IL2CPP_LIBRARY: &str = "GameAssembly.dll";
#[cfg(target_os = "linux")]
pub const IL2CPP_LIBRARY: &str = "GameAssembly.so";
#[cfg(target_os = "macos")]
pub const IL2CPP_LIBRARY: &str = "GameAssembly.dylib";

/// Name of the Mono runtime module on each platform
#[cfg(target_os = "windows")]
pub const MONO_LIBRARY: &str = "mono-2.0-bdwgc.dll";
#[cfg(target_os = "linux")]
pub const MONO_LIBRARY: &str = "libmonobdwgc-2.0.so";
#[cfg(target_os = "macos")]
pub const MONO_LIBRARY: &str = "libmonobdwgc-2.0.dylib";

/// Size of the object header (`klass`, `monitor`) preceding instance data
pub const OBJECT_HEADER_SIZE: usize = std::mem::size_of::<usize>() * 2;
