//! SQLite VFS glue for [`RemoteFile`].
//!
//! Only main-database files whose name is an `http(s)` URL are served
//! remotely. Everything else (temp files, local paths) goes to the platform
//! default VFS captured at registration time. A remote file finds its
//! backend through the `newspod_backend` URI parameter.

use libsqlite3_sys as ffi;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr;
use std::sync::Arc;

use super::pages::RemoteFile;
use super::{lookup, RemoteError, BACKEND_PARAM};

/// Longest filename (URL) accepted by `xFullPathname`.
const MAX_PATHNAME: c_int = 2048;

/// `pAppData` of the registered VFS.
struct VfsData {
    fallback: *mut ffi::sqlite3_vfs,
}

/// Per-connection file object. SQLite allocates `szOsFile` bytes and hands
/// us the pointer; `base` must come first.
#[repr(C)]
struct HttpFile {
    base: ffi::sqlite3_file,
    remote: *mut RemoteFile,
}

static IO_METHODS: ffi::sqlite3_io_methods = ffi::sqlite3_io_methods {
    iVersion: 1,
    xClose: Some(x_close),
    xRead: Some(x_read),
    xWrite: Some(x_write),
    xTruncate: Some(x_truncate),
    xSync: Some(x_sync),
    xFileSize: Some(x_file_size),
    xLock: Some(x_lock),
    xUnlock: Some(x_unlock),
    xCheckReservedLock: Some(x_check_reserved_lock),
    xFileControl: Some(x_file_control),
    xSectorSize: Some(x_sector_size),
    xDeviceCharacteristics: Some(x_device_characteristics),
    xShmMap: None,
    xShmLock: None,
    xShmBarrier: None,
    xShmUnmap: None,
    xFetch: None,
    xUnfetch: None,
};

/// Register the VFS called `name`. Called once per process.
pub(super) fn register(name: &str) -> Result<(), RemoteError> {
    let zname = CString::new(name)
        .map_err(|_| RemoteError::Register(format!("VFS name contains NUL: {name:?}")))?;

    // SAFETY: sqlite3_vfs_find returns a pointer into SQLite's static VFS
    // list (or null). The copy we register is leaked and never unregistered,
    // so SQLite never observes a dangling VFS, name or app data.
    unsafe {
        let fallback = ffi::sqlite3_vfs_find(ptr::null());
        if fallback.is_null() {
            return Err(RemoteError::Register("no default SQLite VFS".to_string()));
        }

        let mut vfs: ffi::sqlite3_vfs = ptr::read(fallback);
        vfs.szOsFile = (*fallback)
            .szOsFile
            .max(std::mem::size_of::<HttpFile>() as c_int);
        vfs.mxPathname = (*fallback).mxPathname.max(MAX_PATHNAME);
        vfs.pNext = ptr::null_mut();
        vfs.zName = zname.into_raw();
        vfs.pAppData = Box::into_raw(Box::new(VfsData { fallback })) as *mut c_void;
        vfs.xOpen = Some(x_open);
        vfs.xDelete = Some(x_delete);
        vfs.xAccess = Some(x_access);
        vfs.xFullPathname = Some(x_full_pathname);

        let vfs = Box::into_raw(Box::new(vfs));
        let rc = ffi::sqlite3_vfs_register(vfs, 0);
        if rc != ffi::SQLITE_OK {
            let vfs = Box::from_raw(vfs);
            drop(CString::from_raw(vfs.zName as *mut c_char));
            drop(Box::from_raw(vfs.pAppData as *mut VfsData));
            return Err(RemoteError::Register(format!("sqlite3_vfs_register returned {rc}")));
        }
    }
    Ok(())
}

fn is_remote(name: &CStr) -> bool {
    let bytes = name.to_bytes();
    bytes.starts_with(b"http://") || bytes.starts_with(b"https://")
}

unsafe fn data<'a>(vfs: *mut ffi::sqlite3_vfs) -> &'a VfsData {
    &*((*vfs).pAppData as *const VfsData)
}

unsafe fn remote<'a>(file: *mut ffi::sqlite3_file) -> Option<&'a RemoteFile> {
    (*(file as *mut HttpFile)).remote.as_ref()
}

// ============================================================================
// VFS methods
// ============================================================================

unsafe extern "C" fn x_open(
    vfs: *mut ffi::sqlite3_vfs,
    name: *const c_char,
    file: *mut ffi::sqlite3_file,
    flags: c_int,
    out_flags: *mut c_int,
) -> c_int {
    let data = data(vfs);
    let remote_name = !name.is_null() && is_remote(CStr::from_ptr(name));
    if !remote_name {
        return match (*data.fallback).xOpen {
            Some(open) => open(data.fallback, name, file, flags, out_flags),
            None => ffi::SQLITE_CANTOPEN,
        };
    }

    let http_file = file as *mut HttpFile;
    (*http_file).base.pMethods = ptr::null();
    (*http_file).remote = ptr::null_mut();

    // Journals and WAL files never exist for a read-only remote catalog.
    if flags & ffi::SQLITE_OPEN_MAIN_DB == 0 {
        return ffi::SQLITE_CANTOPEN;
    }
    let Ok(url) = CStr::from_ptr(name).to_str() else {
        return ffi::SQLITE_CANTOPEN;
    };
    // The handle that asked for this file may already be gone.
    let Some(shared) = lookup(ffi::sqlite3_uri_int64(name, BACKEND_PARAM.as_ptr(), -1)) else {
        return ffi::SQLITE_CANTOPEN;
    };

    match RemoteFile::open(Arc::clone(&shared), url) {
        Ok(remote) => {
            (*http_file).remote = Box::into_raw(Box::new(remote));
            (*http_file).base.pMethods = &IO_METHODS;
            if !out_flags.is_null() {
                *out_flags = (flags & !(ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE))
                    | ffi::SQLITE_OPEN_READONLY;
            }
            ffi::SQLITE_OK
        }
        Err(e) => {
            shared.record(&e);
            ffi::SQLITE_CANTOPEN
        }
    }
}

unsafe extern "C" fn x_delete(
    vfs: *mut ffi::sqlite3_vfs,
    name: *const c_char,
    sync_dir: c_int,
) -> c_int {
    if !name.is_null() && is_remote(CStr::from_ptr(name)) {
        return ffi::SQLITE_READONLY;
    }
    let fallback = data(vfs).fallback;
    match (*fallback).xDelete {
        Some(delete) => delete(fallback, name, sync_dir),
        None => ffi::SQLITE_IOERR_DELETE,
    }
}

unsafe extern "C" fn x_access(
    vfs: *mut ffi::sqlite3_vfs,
    name: *const c_char,
    flags: c_int,
    out: *mut c_int,
) -> c_int {
    if !name.is_null() && is_remote(CStr::from_ptr(name)) {
        // Only journals are ever asked about; there are none.
        *out = 0;
        return ffi::SQLITE_OK;
    }
    let fallback = data(vfs).fallback;
    match (*fallback).xAccess {
        Some(access) => access(fallback, name, flags, out),
        None => ffi::SQLITE_IOERR_ACCESS,
    }
}

unsafe extern "C" fn x_full_pathname(
    vfs: *mut ffi::sqlite3_vfs,
    name: *const c_char,
    n_out: c_int,
    out: *mut c_char,
) -> c_int {
    if name.is_null() || !is_remote(CStr::from_ptr(name)) {
        let fallback = data(vfs).fallback;
        return match (*fallback).xFullPathname {
            Some(full) => full(fallback, name, n_out, out),
            None => ffi::SQLITE_CANTOPEN,
        };
    }
    let bytes = CStr::from_ptr(name).to_bytes_with_nul();
    if bytes.len() > n_out.max(0) as usize {
        return ffi::SQLITE_CANTOPEN;
    }
    ptr::copy_nonoverlapping(bytes.as_ptr() as *const c_char, out, bytes.len());
    ffi::SQLITE_OK
}

// ============================================================================
// File methods
// ============================================================================

unsafe extern "C" fn x_close(file: *mut ffi::sqlite3_file) -> c_int {
    let http_file = file as *mut HttpFile;
    if !(*http_file).remote.is_null() {
        drop(Box::from_raw((*http_file).remote));
        (*http_file).remote = ptr::null_mut();
    }
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_read(
    file: *mut ffi::sqlite3_file,
    buf: *mut c_void,
    amount: c_int,
    offset: ffi::sqlite3_int64,
) -> c_int {
    let Some(remote) = remote(file) else {
        return ffi::SQLITE_IOERR_READ;
    };
    let buf = std::slice::from_raw_parts_mut(buf as *mut u8, amount.max(0) as usize);
    match remote.read_at(buf, offset.max(0) as u64) {
        Ok(n) if n == buf.len() => ffi::SQLITE_OK,
        Ok(n) => {
            // SQLite requires the unread tail to be zeroed.
            buf[n..].fill(0);
            ffi::SQLITE_IOERR_SHORT_READ
        }
        Err(e) => {
            remote.shared().record(&e);
            ffi::SQLITE_IOERR_READ
        }
    }
}

unsafe extern "C" fn x_write(
    _file: *mut ffi::sqlite3_file,
    _buf: *const c_void,
    _amount: c_int,
    _offset: ffi::sqlite3_int64,
) -> c_int {
    ffi::SQLITE_READONLY
}

unsafe extern "C" fn x_truncate(_file: *mut ffi::sqlite3_file, _size: ffi::sqlite3_int64) -> c_int {
    ffi::SQLITE_READONLY
}

unsafe extern "C" fn x_sync(_file: *mut ffi::sqlite3_file, _flags: c_int) -> c_int {
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_file_size(file: *mut ffi::sqlite3_file, size: *mut ffi::sqlite3_int64) -> c_int {
    match remote(file) {
        Some(remote) => {
            *size = remote.size() as ffi::sqlite3_int64;
            ffi::SQLITE_OK
        }
        None => ffi::SQLITE_IOERR_FSTAT,
    }
}

unsafe extern "C" fn x_lock(_file: *mut ffi::sqlite3_file, _level: c_int) -> c_int {
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_unlock(_file: *mut ffi::sqlite3_file, _level: c_int) -> c_int {
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_check_reserved_lock(_file: *mut ffi::sqlite3_file, out: *mut c_int) -> c_int {
    *out = 0;
    ffi::SQLITE_OK
}

unsafe extern "C" fn x_file_control(
    _file: *mut ffi::sqlite3_file,
    _op: c_int,
    _arg: *mut c_void,
) -> c_int {
    ffi::SQLITE_NOTFOUND
}

unsafe extern "C" fn x_sector_size(_file: *mut ffi::sqlite3_file) -> c_int {
    512
}

unsafe extern "C" fn x_device_characteristics(_file: *mut ffi::sqlite3_file) -> c_int {
    ffi::SQLITE_IOCAP_IMMUTABLE
}

/// Number of registered VFSes called `name`.
#[cfg(test)]
pub(super) fn registered_count(name: &str) -> usize {
    let mut count = 0;
    // SAFETY: walks SQLite's VFS list; entries are never freed.
    unsafe {
        let mut vfs = ffi::sqlite3_vfs_find(ptr::null());
        while !vfs.is_null() {
            if !(*vfs).zName.is_null() && CStr::from_ptr((*vfs).zName).to_bytes() == name.as_bytes() {
                count += 1;
            }
            vfs = (*vfs).pNext;
        }
    }
    count
}
