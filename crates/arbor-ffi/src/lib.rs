// C ABI boundary - pedantic lints relaxed for raw pointer entry points
#![allow(clippy::pedantic)]
#![allow(clippy::missing_safety_doc)]
#![allow(clippy::not_unsafe_ptr_arg_deref)]

//! Arbor C ABI - flat entry points for host languages
//!
//! Every index lives behind an opaque `ArborIndex *` created by one of the
//! `arbor_create_*` factories and released with exactly one call to
//! [`arbor_delete_index`]. All data crosses as primitives and raw buffers.
//!
//! # Two Error Styles
//!
//! - **Convenience** (`arbor_add_item`, `arbor_build`, `arbor_save`, ...):
//!   return a bare `bool` (or nothing); the reason for a failure is dropped.
//! - **Rich** (`*_ex`): return `bool` and, on failure, store a message in
//!   `*error` when `error` is non-null. Release it with [`arbor_free_error`].
//!
//! # Caller Contract
//!
//! Using a handle after [`arbor_delete_index`], or passing output buffers
//! shorter than `n` (neighbors) or `f` (item vectors), is undefined behavior.
//! Null handles and null buffers are rejected. Panics never cross the
//! boundary.
//!
//! # Example (C)
//!
//! ```c
//! ArborIndex *index = arbor_create_angular(3);
//! float v[3] = {1.0f, 0.0f, 0.0f};
//! arbor_add_item(index, 0, v);
//! arbor_build(index, 10);
//!
//! int32_t ids[5];
//! float distances[5];
//! int32_t found = arbor_get_nns_by_vector(index, v, 5, -1, ids, distances);
//!
//! char *error = NULL;
//! if (!arbor_save_ex(index, "vectors.arbor", false, &error)) {
//!     fprintf(stderr, "%s\n", error);
//!     arbor_free_error(error);
//! }
//! arbor_delete_index(index);
//! ```

mod handle;
mod logging;
mod marshal;


pub use handle::ArborIndex;

use arbor_core::{Error, MetricKind, Neighbors};
use marshal::{discard, floats, guard, path_from_c, report, set_error};
use std::ffi::{c_char, CStr, CString};
use std::ptr;

// ============================================================================
// Factories and release
// ============================================================================

fn create(metric: MetricKind, f: i32) -> *mut ArborIndex {
    guard(ptr::null_mut(), || {
        let Ok(dimension) = usize::try_from(f) else {
            tracing::warn!(%metric, f, "refusing to create index with negative dimension");
            return ptr::null_mut();
        };
        match ArborIndex::new(metric, dimension) {
            Ok(index) => Box::into_raw(Box::new(index)),
            Err(err) => {
                tracing::warn!(%metric, f, error = %err, "index creation failed");
                ptr::null_mut()
            }
        }
    })
}

/// Creates an angular index for vectors of `f` floats. Null if `f <= 0`.
#[no_mangle]
pub extern "C" fn arbor_create_angular(f: i32) -> *mut ArborIndex {
    create(MetricKind::Angular, f)
}

/// Creates a Euclidean index for vectors of `f` floats. Null if `f <= 0`.
#[no_mangle]
pub extern "C" fn arbor_create_euclidean(f: i32) -> *mut ArborIndex {
    create(MetricKind::Euclidean, f)
}

/// Creates a Manhattan index for vectors of `f` floats. Null if `f <= 0`.
#[no_mangle]
pub extern "C" fn arbor_create_manhattan(f: i32) -> *mut ArborIndex {
    create(MetricKind::Manhattan, f)
}

/// Creates a Hamming index for vectors of `f` floats, each thresholded at
/// 0.5 into one bit. Null if `f <= 0`.
#[no_mangle]
pub extern "C" fn arbor_create_hamming(f: i32) -> *mut ArborIndex {
    create(MetricKind::Hamming, f)
}

/// Releases a handle and everything it owns. Null is a no-op.
///
/// # Safety
///
/// `ptr` must be null or come from an `arbor_create_*` call and not have
/// been released already.
#[no_mangle]
pub unsafe extern "C" fn arbor_delete_index(ptr: *mut ArborIndex) {
    if ptr.is_null() {
        return;
    }
    guard((), || {
        // SAFETY: ownership returns from the caller per the contract above.
        drop(unsafe { Box::from_raw(ptr) });
    });
}

// ============================================================================
// Convenience surface
// ============================================================================

/// Adds an item of `f` floats read from `w`.
///
/// # Safety
///
/// `ptr` must be a live handle; `w` must be readable for `f` floats.
#[no_mangle]
pub unsafe extern "C" fn arbor_add_item(ptr: *mut ArborIndex, item: i32, w: *const f32) -> bool {
    // SAFETY: forwarded from the caller.
    let Some(index) = (unsafe { ptr.as_mut() }) else {
        return false;
    };
    discard(|| {
        // SAFETY: readable for `dimension` floats per the contract.
        let vector = unsafe { floats(w, index.dimension()) }.ok_or_else(null_vector)?;
        index.add_item(item, vector)
    })
}

/// Builds `n_trees` trees (`<= 0` = configured or automatic count) with the
/// configured thread count.
///
/// # Safety
///
/// `ptr` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn arbor_build(ptr: *mut ArborIndex, n_trees: i32) -> bool {
    // SAFETY: forwarded from the caller.
    let Some(index) = (unsafe { ptr.as_mut() }) else {
        return false;
    };
    discard(|| index.build(n_trees, None))
}

/// Saves the built index to `filename`. The handle is loaded from that file
/// afterwards.
///
/// # Safety
///
/// `ptr` must be a live handle; `filename` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn arbor_save(ptr: *mut ArborIndex, filename: *const c_char) -> bool {
    // SAFETY: forwarded from the caller.
    let Some(index) = (unsafe { ptr.as_mut() }) else {
        return false;
    };
    discard(|| {
        // SAFETY: NUL-terminated per the contract.
        let path = unsafe { path_from_c(filename) }?;
        index.save(&path, false)
    })
}

/// Releases items and trees. The handle stays valid.
///
/// # Safety
///
/// `ptr` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn arbor_unload(ptr: *mut ArborIndex) {
    // SAFETY: forwarded from the caller.
    if let Some(index) = unsafe { ptr.as_mut() } {
        guard((), || index.unload());
    }
}

/// Loads the index stored at `filename` into this handle.
///
/// # Safety
///
/// `ptr` must be a live handle; `filename` must be a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn arbor_load(ptr: *mut ArborIndex, filename: *const c_char) -> bool {
    // SAFETY: forwarded from the caller.
    let Some(index) = (unsafe { ptr.as_mut() }) else {
        return false;
    };
    discard(|| {
        // SAFETY: NUL-terminated per the contract.
        let path = unsafe { path_from_c(filename) }?;
        index.load(&path, false)
    })
}

/// Distance between two stored items; NaN if either is unknown.
///
/// # Safety
///
/// `ptr` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn arbor_get_distance(ptr: *const ArborIndex, i: i32, j: i32) -> f32 {
    // SAFETY: forwarded from the caller.
    match unsafe { ptr.as_ref() } {
        Some(index) => guard(f32::NAN, || index.get_distance(i, j)),
        None => f32::NAN,
    }
}

/// Writes up to `n` nearest neighbors of a stored item into `result` and,
/// when non-null, `distances`. Returns how many were written.
///
/// # Safety
///
/// `ptr` must be a live handle; `result` (and `distances` if non-null) must
/// be writable for `n` elements.
#[no_mangle]
pub unsafe extern "C" fn arbor_get_nns_by_item(
    ptr: *const ArborIndex,
    item: i32,
    n: i32,
    search_k: i32,
    result: *mut i32,
    distances: *mut f32,
) -> i32 {
    // SAFETY: forwarded from the caller.
    let Some(index) = (unsafe { ptr.as_ref() }) else {
        return 0;
    };
    let Ok(n) = usize::try_from(n) else {
        return 0;
    };
    guard(0, || {
        let found = index.get_nns_by_item(item, n, search_k);
        // SAFETY: writable for `n` elements per the contract.
        unsafe { write_neighbors(&found, result, distances) }
    })
}

/// Writes up to `n` nearest neighbors of the `f` floats at `w`.
///
/// # Safety
///
/// `ptr` must be a live handle; `w` must be readable for `f` floats;
/// `result` (and `distances` if non-null) must be writable for `n` elements.
#[no_mangle]
pub unsafe extern "C" fn arbor_get_nns_by_vector(
    ptr: *const ArborIndex,
    w: *const f32,
    n: i32,
    search_k: i32,
    result: *mut i32,
    distances: *mut f32,
) -> i32 {
    // SAFETY: forwarded from the caller.
    let Some(index) = (unsafe { ptr.as_ref() }) else {
        return 0;
    };
    let Ok(n) = usize::try_from(n) else {
        return 0;
    };
    guard(0, || {
        // SAFETY: readable for `dimension` floats per the contract.
        let Some(vector) = (unsafe { floats(w, index.dimension()) }) else {
            return 0;
        };
        let found = index.get_nns_by_vector(vector, n, search_k);
        // SAFETY: writable for `n` elements per the contract.
        unsafe { write_neighbors(&found, result, distances) }
    })
}

/// Highest added item id plus one.
///
/// # Safety
///
/// `ptr` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn arbor_get_n_items(ptr: *const ArborIndex) -> i32 {
    // SAFETY: forwarded from the caller.
    unsafe { ptr.as_ref() }.map_or(0, ArborIndex::get_n_items)
}

/// Number of trees in the built index.
///
/// # Safety
///
/// `ptr` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn arbor_get_n_trees(ptr: *const ArborIndex) -> i32 {
    // SAFETY: forwarded from the caller.
    unsafe { ptr.as_ref() }.map_or(0, ArborIndex::get_n_trees)
}

/// Logs build progress at `info` level when `v` is true.
///
/// # Safety
///
/// `ptr` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn arbor_verbose(ptr: *mut ArborIndex, v: bool) {
    // SAFETY: forwarded from the caller.
    if let Some(index) = unsafe { ptr.as_mut() } {
        index.verbose(v);
    }
}

/// Copies the stored vector of `item` into `v` (`f` floats). For Hamming
/// indexes the values are 0.0 or 1.0. Returns false and leaves `v` untouched
/// if `item` is unknown.
///
/// # Safety
///
/// `ptr` must be a live handle; `v` must be writable for `f` floats.
#[no_mangle]
pub unsafe extern "C" fn arbor_get_item(ptr: *const ArborIndex, item: i32, v: *mut f32) -> bool {
    // SAFETY: forwarded from the caller.
    let Some(index) = (unsafe { ptr.as_ref() }) else {
        return false;
    };
    if v.is_null() {
        return false;
    }
    guard(false, || {
        // SAFETY: writable for `dimension` floats per the contract.
        let out = unsafe { std::slice::from_raw_parts_mut(v, index.dimension()) };
        index.get_item(item, out)
    })
}

/// Seeds the next build.
///
/// # Safety
///
/// `ptr` must be a live handle.
#[no_mangle]
pub unsafe extern "C" fn arbor_set_seed(ptr: *mut ArborIndex, seed: u64) {
    // SAFETY: forwarded from the caller.
    if let Some(index) = unsafe { ptr.as_mut() } {
        index.set_seed(seed);
    }
}

// ============================================================================
// Rich surface
// ============================================================================

/// Adds an item; on failure stores the reason in `*error`.
///
/// # Safety
///
/// As [`arbor_add_item`]; `error` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn arbor_add_item_ex(
    ptr: *mut ArborIndex,
    item: i32,
    w: *const f32,
    error: *mut *mut c_char,
) -> bool {
    // SAFETY: forwarded from the caller.
    unsafe {
        with_index(ptr, error, |index| {
            let vector = floats(w, index.dimension()).ok_or_else(null_vector)?;
            index.add_item(item, vector)
        })
    }
}

/// Builds `n_trees` trees on `n_threads` threads (`1` = sequential,
/// `<= 0` = all cores).
///
/// # Safety
///
/// `ptr` must be a live handle; `error` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn arbor_build_ex(
    ptr: *mut ArborIndex,
    n_trees: i32,
    n_threads: i32,
    error: *mut *mut c_char,
) -> bool {
    // SAFETY: forwarded from the caller.
    unsafe { with_index(ptr, error, |index| index.build(n_trees, Some(n_threads))) }
}

/// Drops the trees so more items can be added.
///
/// # Safety
///
/// `ptr` must be a live handle; `error` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn arbor_unbuild_ex(ptr: *mut ArborIndex, error: *mut *mut c_char) -> bool {
    // SAFETY: forwarded from the caller.
    unsafe { with_index(ptr, error, ArborIndex::unbuild) }
}

/// Saves the built index; with `prefault`, the reloaded file is paged in
/// eagerly.
///
/// # Safety
///
/// `ptr` must be a live handle; `filename` must be a NUL-terminated string;
/// `error` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn arbor_save_ex(
    ptr: *mut ArborIndex,
    filename: *const c_char,
    prefault: bool,
    error: *mut *mut c_char,
) -> bool {
    // SAFETY: forwarded from the caller.
    unsafe {
        with_index(ptr, error, |index| {
            let path = path_from_c(filename)?;
            index.save(&path, prefault)
        })
    }
}

/// Loads the index at `filename`; with `prefault`, pages it in eagerly.
///
/// # Safety
///
/// `ptr` must be a live handle; `filename` must be a NUL-terminated string;
/// `error` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn arbor_load_ex(
    ptr: *mut ArborIndex,
    filename: *const c_char,
    prefault: bool,
    error: *mut *mut c_char,
) -> bool {
    // SAFETY: forwarded from the caller.
    unsafe {
        with_index(ptr, error, |index| {
            let path = path_from_c(filename)?;
            index.load(&path, prefault)
        })
    }
}

/// Makes the next build write directly to `filename`.
///
/// # Safety
///
/// `ptr` must be a live handle; `filename` must be a NUL-terminated string;
/// `error` must be null or writable.
#[no_mangle]
pub unsafe extern "C" fn arbor_on_disk_build_ex(
    ptr: *mut ArborIndex,
    filename: *const c_char,
    error: *mut *mut c_char,
) -> bool {
    // SAFETY: forwarded from the caller.
    unsafe {
        with_index(ptr, error, |index| {
            let path = path_from_c(filename)?;
            index.on_disk_build(&path)
        })
    }
}

/// Releases a message stored by a `*_ex` call. Null is a no-op.
///
/// # Safety
///
/// `error` must be null or a message from this library not yet released.
#[no_mangle]
pub unsafe extern "C" fn arbor_free_error(error: *mut c_char) {
    if !error.is_null() {
        // SAFETY: allocated by `CString::into_raw` in this library.
        drop(unsafe { CString::from_raw(error) });
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Installs a stderr logger. `level` is a filter such as `"info"` or
/// `"arbor_core=debug"`; null uses the configured level and format.
/// `RUST_LOG` overrides both. Returns false if a logger is already installed.
///
/// # Safety
///
/// `level` must be null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn arbor_init_logging(level: *const c_char) -> bool {
    guard(false, || {
        let config = handle::load_config();
        let level = if level.is_null() {
            config.logging.level.clone()
        } else {
            // SAFETY: NUL-terminated per the contract.
            match unsafe { CStr::from_ptr(level) }.to_str() {
                Ok(level) => level.to_string(),
                Err(_) => return false,
            }
        };
        logging::init(&level, logging::LogFormat::parse(&config.logging.format))
    })
}

// ============================================================================
// Helpers
// ============================================================================

/// Runs `f` on a live handle with rich error reporting.
///
/// # Safety
///
/// `ptr` must be null or a live handle; `error` must be null or writable.
unsafe fn with_index(
    ptr: *mut ArborIndex,
    error: *mut *mut c_char,
    f: impl FnOnce(&mut ArborIndex) -> arbor_core::Result<()>,
) -> bool {
    // SAFETY: forwarded from the caller.
    match unsafe { ptr.as_mut() } {
        // SAFETY: forwarded from the caller.
        Some(index) => unsafe { report(error, || f(index)) },
        None => {
            // SAFETY: forwarded from the caller.
            unsafe { set_error(error, "index handle is null") };
            false
        }
    }
}

/// Copies neighbors into caller buffers and returns the count.
///
/// # Safety
///
/// `result` and non-null `distances` must be writable for `found.len()`
/// elements.
unsafe fn write_neighbors(found: &Neighbors, result: *mut i32, distances: *mut f32) -> i32 {
    if result.is_null() {
        return 0;
    }
    // SAFETY: writable for `found.len()` elements per the contract.
    unsafe {
        ptr::copy_nonoverlapping(found.ids.as_ptr(), result, found.len());
        if !distances.is_null() {
            ptr::copy_nonoverlapping(found.distances.as_ptr(), distances, found.len());
        }
    }
    found.len() as i32
}

fn null_vector() -> Error {
    Error::InvalidInput("vector pointer is null".to_string())
}
