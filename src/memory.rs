//! Raw memory access for objects living in the managed heap
//!
//! Field access is a pure function of (object, offset, type). All pointer
//! arithmetic happens here, behind null and offset checks.

use crate::error::{ResolveError, Result};
use crate::handle::Handle;

fn field_address(object: Handle, offset: i32) -> Result<usize> {
    if object.is_null() {
        return Err(ResolveError::NullHandle("object"));
    }
    if offset < 0 {
        return Err(ResolveError::InvalidOffset(offset));
    }
    object
        .addr()
        .checked_add(offset as usize)
        .ok_or(ResolveError::InvalidOffset(offset))
}

/// Read a `T` at `object + offset`.
///
/// # Safety
/// `object` must point at a live object at least `offset + size_of::<T>()`
/// bytes long, and the bytes there must be a valid `T`.
pub unsafe fn read_at<T: Copy>(object: Handle, offset: i32) -> Result<T> {
    let address = field_address(object, offset)?;
    Ok(std::ptr::read_unaligned(address as *const T))
}

/// Write a `T` at `object + offset`.
///
/// # Safety
/// `object` must point at a live, writable object at least
/// `offset + size_of::<T>()` bytes long.
pub unsafe fn write_at<T: Copy>(object: Handle, offset: i32, value: T) -> Result<()> {
    let address = field_address(object, offset)?;
    std::ptr::write_unaligned(address as *mut T, value);
    Ok(())
}

/// Whether `address` lies in committed, executable memory.
#[cfg(target_os = "windows")]
pub fn is_executable(address: usize) -> bool {
    use winapi::um::memoryapi::VirtualQuery;
    use winapi::um::winnt::{
        MEMORY_BASIC_INFORMATION, MEM_COMMIT, PAGE_EXECUTE, PAGE_EXECUTE_READ,
        PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY, PAGE_GUARD, PAGE_NOACCESS,
    };

    if address == 0 {
        return false;
    }

    let mut info: MEMORY_BASIC_INFORMATION = unsafe { std::mem::zeroed() };
    let written = unsafe {
        VirtualQuery(
            address as *const _,
            &mut info,
            std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
        )
    };
    if written == 0 || info.State != MEM_COMMIT {
        return false;
    }
    if info.Protect & (PAGE_GUARD | PAGE_NOACCESS) != 0 {
        return false;
    }
    info.Protect
        & (PAGE_EXECUTE | PAGE_EXECUTE_READ | PAGE_EXECUTE_READWRITE | PAGE_EXECUTE_WRITECOPY)
        != 0
}

#[cfg(target_os = "linux")]
pub fn is_executable(address: usize) -> bool {
    maps::is_executable(address)
}

/// Without a cheap way to query page protection, only obviously bogus
/// addresses are rejected here.
#[cfg(not(any(target_os = "windows", target_os = "linux")))]
pub fn is_executable(address: usize) -> bool {
    address >= 0x10000
}

/// Whether [`is_executable`] really inspects page protection on this target
pub const fn guards_code_pointers() -> bool {
    cfg!(any(target_os = "windows", target_os = "linux"))
}

#[cfg(target_os = "linux")]
mod maps {
    use once_cell::sync::Lazy;
    use parking_lot::RwLock;

    static EXECUTABLE_REGIONS: Lazy<RwLock<Vec<(usize, usize)>>> =
        Lazy::new(|| RwLock::new(read_regions()));

    fn read_regions() -> Vec<(usize, usize)> {
        std::fs::read_to_string("/proc/self/maps")
            .map(|maps| parse_executable_regions(&maps))
            .unwrap_or_default()
    }

    fn contains(regions: &[(usize, usize)], address: usize) -> bool {
        regions
            .iter()
            .any(|(start, end)| address >= *start && address < *end)
    }

    /// Regions are re-read once on a miss, since JIT code lands in fresh mappings.
    pub(super) fn is_executable(address: usize) -> bool {
        if address == 0 {
            return false;
        }
        if contains(&EXECUTABLE_REGIONS.read(), address) {
            return true;
        }

        let mut regions = EXECUTABLE_REGIONS.write();
        *regions = read_regions();
        contains(&regions, address)
    }

    /// Parse `/proc/<pid>/maps` lines into executable `[start, end)` ranges
    pub(super) fn parse_executable_regions(maps: &str) -> Vec<(usize, usize)> {
        maps.lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let range = parts.next()?;
                let perms = parts.next()?;
                if !perms.contains('x') {
                    return None;
                }
                let (start, end) = range.split_once('-')?;
                Some((
                    usize::from_str_radix(start, 16).ok()?,
                    usize::from_str_radix(end, 16).ok()?,
                ))
            })
            .collect()
    }
}

/// Base address of the loaded module containing `address`.
#[cfg(target_os = "windows")]
pub fn module_base_of(address: usize) -> Option<usize> {
    use winapi::shared::minwindef::HMODULE;
    use winapi::um::libloaderapi::{
        GetModuleHandleExW, GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS,
        GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
    };

    let mut module: HMODULE = std::ptr::null_mut();
    let found = unsafe {
        GetModuleHandleExW(
            GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS | GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
            address as *const u16,
            &mut module,
        )
    };
    if found == 0 || module.is_null() {
        None
    } else {
        Some(module as usize)
    }
}

#[cfg(unix)]
pub fn module_base_of(address: usize) -> Option<usize> {
    let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
    let found = unsafe { libc::dladdr(address as *const libc::c_void, &mut info) };
    if found == 0 || info.dli_fbase.is_null() {
        None
    } else {
        Some(info.dli_fbase as usize)
    }
}
