//! Secondary RAR backend driving an external unrar library.
//!
//! [`Archive`](crate::Archive) constructs it when the primary RAR decoder
//! cannot open a file. It works on paths rather than streams because the
//! library opens archives itself. When the library is not installed next to
//! the executable every operation fails.

mod ffi;

use std::ffi::{c_int, c_uint};
use std::path::Path;
use std::{mem, ptr};

use anyhow::{bail, Context, Result};

use crate::entry::{name_eq_ignore_case, FileData, DATA_TERMINATOR_LEN};
use ffi::{
    from_wide, to_wide, unrar_api, Handle, LParam, RarHeaderDataEx, RarOpenArchiveDataEx,
    UnrarApi, RAR_DLL_VERSION, RAR_OM_EXTRACT, RAR_SKIP, RAR_TEST, UCM_PROCESSDATA,
};

/// Handle on the process-wide unrar binding
#[derive(Clone, Copy)]
pub struct UnrarFallback {
    api: Option<&'static UnrarApi>,
}

impl Default for UnrarFallback {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UnrarFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnrarFallback")
            .field("available", &self.is_available())
            .finish()
    }
}

impl UnrarFallback {
    /// Bind the library on first use in this process
    pub fn new() -> Self {
        Self { api: unrar_api() }
    }

    pub fn is_available(&self) -> bool {
        self.api.is_some()
    }

    /// Append the names of all entries of `rar_path` to `filenames`.
    ///
    /// Names use `/` as separator. Names already present are expected to
    /// match the archive position by position; a difference fails the call.
    pub fn extract_filenames(&self, rar_path: &Path, filenames: &mut Vec<String>) -> bool {
        let Some(api) = self.api else {
            return false;
        };
        match extract_filenames(api, rar_path, filenames) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("unrar listing of {} failed: {:#}", rar_path.display(), e);
                false
            }
        }
    }

    /// Extract the first entry whose name matches `filename` ignoring case
    pub fn file_by_name(&self, rar_path: &Path, filename: &str) -> Option<FileData> {
        let api = self.api?;
        match file_by_name(api, rar_path, filename) {
            Ok(data) => Some(data),
            Err(e) => {
                log::debug!(
                    "unrar extraction of {} from {} failed: {:#}",
                    filename,
                    rar_path.display(),
                    e
                );
                None
            }
        }
    }
}

/// Open archive, closed on drop
struct ArchiveHandle {
    api: &'static UnrarApi,
    handle: Handle,
}

impl ArchiveHandle {
    /// `sink` receives decompressed bytes while the handle is processing
    fn open(api: &'static UnrarApi, rar_path: &Path, sink: Option<*mut Vec<u8>>) -> Result<Self> {
        let version = unsafe { (api.get_dll_version)() };
        if version < RAR_DLL_VERSION {
            bail!("unrar API version {} is older than {}", version, RAR_DLL_VERSION);
        }

        let mut arc_name = to_wide(rar_path);
        let mut data: RarOpenArchiveDataEx = unsafe { mem::zeroed() };
        data.arc_name_w = arc_name.as_mut_ptr();
        data.open_mode = RAR_OM_EXTRACT;
        if let Some(sink) = sink {
            data.callback = Some(unrar_callback);
            data.user_data = sink as LParam;
        }

        let handle = unsafe { (api.open_archive_ex)(&mut data) };
        let open_result = data.open_result;
        if handle.is_null() {
            bail!("RAROpenArchiveEx failed with {}", open_result);
        }
        let archive = Self { api, handle };
        if open_result != 0 {
            bail!("RAROpenArchiveEx failed with {}", open_result);
        }
        Ok(archive)
    }

    /// 0 on success, non-zero at the end of the archive or on error
    fn read_header(&self, header: &mut RarHeaderDataEx) -> c_int {
        unsafe { (self.api.read_header_ex)(self.handle, header) }
    }

    fn process(&self, operation: c_int) -> c_int {
        unsafe { (self.api.process_file)(self.handle, operation, ptr::null_mut(), ptr::null_mut()) }
    }
}

impl Drop for ArchiveHandle {
    fn drop(&mut self) {
        unsafe {
            (self.api.close_archive)(self.handle);
        }
    }
}

fn new_header() -> Box<RarHeaderDataEx> {
    Box::new(unsafe { mem::zeroed() })
}

fn header_name(header: &RarHeaderDataEx) -> String {
    from_wide(&{ header.file_name_w }).replace('\\', "/")
}

fn extract_filenames(
    api: &'static UnrarApi,
    rar_path: &Path,
    filenames: &mut Vec<String>,
) -> Result<()> {
    let archive = ArchiveHandle::open(api, rar_path, None)?;
    let mut header = new_header();

    for idx in 0.. {
        if archive.read_header(&mut header) != 0 {
            break;
        }
        let name = header_name(&header);
        if idx == filenames.len() {
            filenames.push(name);
        } else if filenames[idx] != name {
            bail!(
                "Entry {} changed from {} to {}",
                idx,
                filenames[idx],
                name
            );
        }
        archive.process(RAR_SKIP);
    }
    Ok(())
}

fn file_by_name(api: &'static UnrarApi, rar_path: &Path, filename: &str) -> Result<FileData> {
    let mut data: Vec<u8> = Vec::new();
    let sink: *mut Vec<u8> = &mut data;
    let archive = ArchiveHandle::open(api, rar_path, Some(sink))?;
    let mut header = new_header();

    loop {
        if archive.read_header(&mut header) != 0 {
            bail!("{} not found", filename);
        }
        if name_eq_ignore_case(&header_name(&header), filename) {
            break;
        }
        archive.process(RAR_SKIP);
    }

    // Only the low 32 bits of the size are accounted for
    let unp_size_high = header.unp_size_high;
    if unp_size_high != 0 {
        bail!("{} is larger than 4 GiB", filename);
    }
    unsafe { (*sink).clear() };
    let res = archive.process(RAR_TEST);
    drop(archive);
    if res != 0 {
        bail!("RARProcessFile failed with {}", res);
    }

    let size = header.unp_size as usize;
    if data.len() != size {
        bail!(
            "{} extracted to {} bytes, header declares {}",
            filename,
            data.len(),
            size
        );
    }
    data.try_reserve_exact(DATA_TERMINATOR_LEN)
        .context("Out of memory")?;
    data.extend_from_slice(&[0; DATA_TERMINATOR_LEN]);
    Ok(FileData::from_parts(data, size))
}

/// Push callback appending streamed bytes to the `Vec<u8>` in `user_data`
extern "system" fn unrar_callback(msg: c_uint, user_data: LParam, p1: LParam, p2: LParam) -> c_int {
    if msg != UCM_PROCESSDATA || user_data == 0 {
        return -1;
    }
    let Ok(len) = usize::try_from(p2) else {
        return -1;
    };
    let sink = unsafe { &mut *(user_data as *mut Vec<u8>) };
    if sink.try_reserve(len).is_err() {
        return -1;
    }
    if len > 0 {
        let chunk = unsafe { std::slice::from_raw_parts(p1 as *const u8, len) };
        sink.extend_from_slice(chunk);
    }
    1
}
