//! Binding to the unrar library API (`unrar.dll` / `libunrar.so`).
//!
//! Layouts follow `dll.hpp` from the UnRAR source distribution
//! (<https://www.rarlab.com/rar_add.htm>). The library is resolved once per
//! process and stays loaded until exit.

use std::ffi::{c_char, c_int, c_uint, c_void};
use std::iter;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::Result;

/// Lowest API version whose `RARHeaderDataEx` matches the layout below
pub const RAR_DLL_VERSION: c_int = 6;
pub const RAR_OM_EXTRACT: c_uint = 1;
pub const RAR_SKIP: c_int = 0;
pub const RAR_TEST: c_int = 1;
pub const UCM_PROCESSDATA: c_uint = 1;

/// `wchar_t` of the platform C ABI
#[cfg(windows)]
pub type WChar = u16;
#[cfg(not(windows))]
pub type WChar = u32;

pub type LParam = isize;
pub type Handle = *mut c_void;

pub type UnrarCallback = extern "system" fn(c_uint, LParam, LParam, LParam) -> c_int;

#[repr(C, packed)]
pub struct RarHeaderDataEx {
    pub arc_name: [c_char; 1024],
    pub arc_name_w: [WChar; 1024],
    pub file_name: [c_char; 1024],
    pub file_name_w: [WChar; 1024],
    pub flags: c_uint,
    pub pack_size: c_uint,
    pub pack_size_high: c_uint,
    pub unp_size: c_uint,
    pub unp_size_high: c_uint,
    pub host_os: c_uint,
    pub file_crc: c_uint,
    pub file_time: c_uint,
    pub unp_ver: c_uint,
    pub method: c_uint,
    pub file_attr: c_uint,
    pub cmt_buf: *mut c_char,
    pub cmt_buf_size: c_uint,
    pub cmt_size: c_uint,
    pub cmt_state: c_uint,
    pub dict_size: c_uint,
    pub hash_type: c_uint,
    pub hash: [c_char; 32],
    pub reserved: [c_uint; 1014],
}

#[repr(C, packed)]
pub struct RarOpenArchiveDataEx {
    pub arc_name: *mut c_char,
    pub arc_name_w: *mut WChar,
    pub open_mode: c_uint,
    pub open_result: c_uint,
    pub cmt_buf: *mut c_char,
    pub cmt_buf_size: c_uint,
    pub cmt_size: c_uint,
    pub cmt_state: c_uint,
    pub flags: c_uint,
    pub callback: Option<UnrarCallback>,
    pub user_data: LParam,
    pub reserved: [c_uint; 28],
}

pub type RarGetDllVersionFn = unsafe extern "system" fn() -> c_int;
pub type RarOpenArchiveExFn = unsafe extern "system" fn(*mut RarOpenArchiveDataEx) -> Handle;
pub type RarReadHeaderExFn = unsafe extern "system" fn(Handle, *mut RarHeaderDataEx) -> c_int;
pub type RarProcessFileFn =
    unsafe extern "system" fn(Handle, c_int, *mut c_char, *mut c_char) -> c_int;
pub type RarCloseArchiveFn = unsafe extern "system" fn(Handle) -> c_int;

/// Entry points resolved from the loaded library
pub struct UnrarApi {
    pub get_dll_version: RarGetDllVersionFn,
    pub open_archive_ex: RarOpenArchiveExFn,
    pub read_header_ex: RarReadHeaderExFn,
    pub process_file: RarProcessFileFn,
    pub close_archive: RarCloseArchiveFn,
    #[cfg(feature = "unrar-fallback")]
    _library: libloading::Library,
}

static UNRAR: OnceLock<Option<UnrarApi>> = OnceLock::new();

/// The process-wide binding, `None` when the library or an entry point is missing
pub fn unrar_api() -> Option<&'static UnrarApi> {
    UNRAR
        .get_or_init(|| match load() {
            Ok(api) => Some(api),
            Err(e) => {
                log::debug!("unrar fallback unavailable: {:#}", e);
                None
            }
        })
        .as_ref()
}

#[cfg(feature = "unrar-fallback")]
fn library_path() -> Result<std::path::PathBuf> {
    use anyhow::anyhow;

    let exe = std::env::current_exe()?;
    let dir = exe
        .parent()
        .ok_or_else(|| anyhow!("Failed to resolve executable directory"))?;
    #[cfg(target_pointer_width = "64")]
    {
        let wide = dir.join(libloading::library_filename("unrar64"));
        if wide.exists() {
            return Ok(wide);
        }
    }
    Ok(dir.join(libloading::library_filename("unrar")))
}

#[cfg(feature = "unrar-fallback")]
fn load() -> Result<UnrarApi> {
    use anyhow::{anyhow, bail};
    use libloading::Library;

    let path = library_path()?;
    if !path.exists() {
        bail!("{} not found", path.display());
    }
    let library = unsafe { Library::new(&path) }
        .map_err(|e| anyhow!("Failed to load {}: {}", path.display(), e))?;

    macro_rules! symbol {
        ($ty:ty, $name:literal) => {{
            let symbol: libloading::Symbol<$ty> =
                unsafe { library.get(concat!($name, "\0").as_bytes()) }
                    .map_err(|e| anyhow!("Missing symbol {}: {}", $name, e))?;
            *symbol
        }};
    }

    let open_archive_ex: RarOpenArchiveExFn = symbol!(RarOpenArchiveExFn, "RAROpenArchiveEx");
    let read_header_ex: RarReadHeaderExFn = symbol!(RarReadHeaderExFn, "RARReadHeaderEx");
    let process_file: RarProcessFileFn = symbol!(RarProcessFileFn, "RARProcessFile");
    let close_archive: RarCloseArchiveFn = symbol!(RarCloseArchiveFn, "RARCloseArchive");
    // Resolved last so a usable version implies every other entry point exists
    let get_dll_version: RarGetDllVersionFn = symbol!(RarGetDllVersionFn, "RARGetDllVersion");

    log::debug!("Loaded unrar fallback from {}", path.display());
    Ok(UnrarApi {
        get_dll_version,
        open_archive_ex,
        read_header_ex,
        process_file,
        close_archive,
        _library: library,
    })
}

#[cfg(not(feature = "unrar-fallback"))]
fn load() -> Result<UnrarApi> {
    anyhow::bail!("built without the unrar-fallback feature")
}

/// NUL-terminated wide copy of `path`
pub fn to_wide(path: &Path) -> Vec<WChar> {
    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        path.as_os_str().encode_wide().chain(iter::once(0)).collect()
    }
    #[cfg(not(windows))]
    {
        path.to_string_lossy()
            .chars()
            .map(|c| c as WChar)
            .chain(iter::once(0))
            .collect()
    }
}

/// Decode a NUL-terminated wide buffer
pub fn from_wide(buf: &[WChar]) -> String {
    let len = buf.iter().position(|&c| c == 0).unwrap_or(buf.len());
    #[cfg(windows)]
    {
        String::from_utf16_lossy(&buf[..len])
    }
    #[cfg(not(windows))]
    {
        buf[..len]
            .iter()
            .map(|&c| char::from_u32(c).unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_strings_round_trip() {
        let wide = to_wide(Path::new("comics/Übersicht.cbr"));
        assert_eq!(wide.last(), Some(&0));
        assert_eq!(from_wide(&wide), "comics/Übersicht.cbr");
    }

    #[test]
    fn from_wide_stops_at_terminator() {
        let buf: [WChar; 4] = [b'a' as WChar, 0, b'b' as WChar, 0];
        assert_eq!(from_wide(&buf), "a");
    }
}
