//! Conversions between C arguments and Rust values.
//!
//! Nothing here unwinds: panics are caught by [`guard`] and errors are turned
//! into C strings by [`report`].

use arbor_core::{Error, Result};
use std::any::Any;
use std::ffi::{c_char, CStr, CString};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;

/// Runs `f`, returning `fallback` if it panics.
pub(crate) fn guard<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            tracing::error!(panic = %panic_message(payload.as_ref()), "panic caught at C boundary");
            fallback
        }
    }
}

/// Runs a fallible operation for a rich entry point.
///
/// Returns true on success. On failure or panic, stores a message in
/// `*error` when `error` is non-null.
///
/// # Safety
///
/// `error` must be null or valid for a pointer write.
pub(crate) unsafe fn report(error: *mut *mut c_char, f: impl FnOnce() -> Result<()>) -> bool {
    let outcome = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(outcome) => outcome.map_err(|err| err.to_string()),
        Err(payload) => Err(format!("internal panic: {}", panic_message(payload.as_ref()))),
    };
    match outcome {
        Ok(()) => true,
        Err(message) => {
            tracing::debug!(error = %message, "operation failed");
            // SAFETY: forwarded from the caller.
            unsafe { set_error(error, &message) };
            false
        }
    }
}

/// Runs a fallible operation for a convenience entry point, discarding the
/// message.
pub(crate) fn discard(f: impl FnOnce() -> Result<()>) -> bool {
    guard(false, || match f() {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(error = %err, code = err.code(), "operation failed");
            false
        }
    })
}

/// Stores a newly allocated copy of `message` in `*error`.
///
/// # Safety
///
/// `error` must be null or valid for a pointer write.
pub(crate) unsafe fn set_error(error: *mut *mut c_char, message: &str) {
    if error.is_null() {
        return;
    }
    let text = CString::new(message.replace('\0', " ")).unwrap_or_default();
    // SAFETY: non-null and writable per the caller's contract.
    unsafe { *error = text.into_raw() };
}

/// Reads a NUL-terminated path.
///
/// # Safety
///
/// `filename` must be null or point to a NUL-terminated string.
pub(crate) unsafe fn path_from_c(filename: *const c_char) -> Result<PathBuf> {
    if filename.is_null() {
        return Err(Error::InvalidInput("filename is null".to_string()));
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract.
    let raw = unsafe { CStr::from_ptr(filename) };
    raw.to_str()
        .map(PathBuf::from)
        .map_err(|_| Error::InvalidInput("filename is not valid UTF-8".to_string()))
}

/// Borrows `len` floats from `ptr`, or `None` if `ptr` is null.
///
/// # Safety
///
/// `ptr` must be null or valid for reads of `len` floats.
pub(crate) unsafe fn floats<'a>(ptr: *const f32, len: usize) -> Option<&'a [f32]> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: valid for `len` reads per the caller's contract.
    Some(unsafe { std::slice::from_raw_parts(ptr, len) })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
