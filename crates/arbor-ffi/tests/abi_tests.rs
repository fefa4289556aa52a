//! End-to-end tests driving the index the way a C or JNA host would.

use arbor::*;
use std::ffi::{c_char, CStr, CString};
use std::ptr;
use tempfile::TempDir;

fn c_path(dir: &TempDir, name: &str) -> CString {
    CString::new(dir.path().join(name).to_str().unwrap()).unwrap()
}

fn take_error(error: *mut c_char) -> String {
    assert!(!error.is_null(), "expected an error message");
    let text = unsafe { CStr::from_ptr(error) }.to_string_lossy().into_owned();
    unsafe { arbor_free_error(error) };
    text
}

/// Builds a 2-d Euclidean index over the points (i, 0) for i in 0..count.
fn line_index(count: i32) -> *mut ArborIndex {
    let ptr = arbor_create_euclidean(2);
    assert!(!ptr.is_null());
    for i in 0..count {
        let v = [i as f32, 0.0];
        assert!(unsafe { arbor_add_item(ptr, i, v.as_ptr()) });
    }
    ptr
}

#[test]
fn test_build_and_query_by_item() {
    let ptr = line_index(10);
    unsafe {
        assert!(arbor_build(ptr, 5));
        assert_eq!(arbor_get_n_items(ptr), 10);
        assert_eq!(arbor_get_n_trees(ptr), 5);

        let mut ids = [-1i32; 3];
        let mut distances = [0.0f32; 3];
        let found = arbor_get_nns_by_item(ptr, 4, 3, 1000, ids.as_mut_ptr(), distances.as_mut_ptr());

        assert_eq!(found, 3);
        assert_eq!(ids[0], 4);
        assert_eq!(distances[0], 0.0);
        assert!(ids[1..].contains(&3) && ids[1..].contains(&5));
        assert!((distances[1] - 1.0).abs() < 1e-6);
        arbor_delete_index(ptr);
    }
}

#[test]
fn test_query_by_vector_without_distances() {
    let ptr = line_index(6);
    unsafe {
        assert!(arbor_build(ptr, 2));
        let query = [5.2f32, 0.0];
        let mut ids = [-1i32; 10];

        let found = arbor_get_nns_by_vector(ptr, query.as_ptr(), 10, -1, ids.as_mut_ptr(), ptr::null_mut());

        assert_eq!(found, 6);
        assert_eq!(ids[0], 5);
        assert_eq!(ids[6], -1);
        arbor_delete_index(ptr);
    }
}

#[test]
fn test_get_distance_and_unknown_items() {
    let ptr = line_index(3);
    unsafe {
        assert!(arbor_build(ptr, 1));
        assert!((arbor_get_distance(ptr, 0, 2) - 2.0).abs() < 1e-6);
        assert!(arbor_get_distance(ptr, 0, 99).is_nan());

        let mut v = [7.0f32; 2];
        assert!(!arbor_get_item(ptr, 99, v.as_mut_ptr()));
        assert_eq!(v, [7.0, 7.0]);
        assert!(arbor_get_item(ptr, 2, v.as_mut_ptr()));
        assert_eq!(v, [2.0, 0.0]);
        arbor_delete_index(ptr);
    }
}

#[test]
fn test_hamming_round_trip_through_c() {
    let ptr = arbor_create_hamming(128);
    let zeros = [0.0f32; 128];
    let ones = [0.9f32; 128];
    unsafe {
        assert!(arbor_add_item(ptr, 1, zeros.as_ptr()));
        assert!(arbor_add_item(ptr, 2, ones.as_ptr()));
        assert!(arbor_build(ptr, 10));

        let mut ids = [0i32; 10];
        let mut distances = [0.0f32; 10];
        let found = arbor_get_nns_by_item(ptr, 1, 10, -1, ids.as_mut_ptr(), distances.as_mut_ptr());

        assert_eq!(found, 2);
        assert_eq!(&ids[..2], &[1, 2]);
        assert_eq!(&distances[..2], &[0.0, 128.0]);
        assert_eq!(arbor_get_distance(ptr, 1, 2), 128.0);

        let mut v = [0.5f32; 128];
        assert!(arbor_get_item(ptr, 2, v.as_mut_ptr()));
        assert!(v.iter().all(|x| *x == 1.0));
        arbor_delete_index(ptr);
    }
}

#[test]
fn test_add_after_build_fails_with_message() {
    let ptr = line_index(2);
    let mut error: *mut c_char = ptr::null_mut();
    unsafe {
        assert!(arbor_build(ptr, 1));
        let v = [9.0f32, 9.0];
        assert!(!arbor_add_item(ptr, 2, v.as_ptr()));
        assert!(!arbor_add_item_ex(ptr, 2, v.as_ptr(), &mut error));
    }
    assert!(take_error(error).contains("ARBOR-001"));
    unsafe { arbor_delete_index(ptr) };
}

#[test]
fn test_unbuild_then_add_and_rebuild() {
    let ptr = line_index(2);
    let mut error: *mut c_char = ptr::null_mut();
    unsafe {
        assert!(arbor_build_ex(ptr, 1, 1, &mut error));
        assert!(arbor_unbuild_ex(ptr, &mut error));
        assert!(error.is_null());

        let v = [2.0f32, 0.0];
        assert!(arbor_add_item(ptr, 2, v.as_ptr()));
        assert!(arbor_build_ex(ptr, 3, 0, &mut error));
        assert_eq!(arbor_get_n_items(ptr), 3);
        assert_eq!(arbor_get_n_trees(ptr), 3);
        arbor_delete_index(ptr);
    }
}

#[test]
fn test_build_twice_reports_error() {
    let ptr = line_index(2);
    let mut error: *mut c_char = ptr::null_mut();
    unsafe {
        assert!(arbor_build(ptr, 1));
        assert!(!arbor_build_ex(ptr, 1, 1, &mut error));
    }
    assert!(take_error(error).contains("ARBOR-001"));
    unsafe { arbor_delete_index(ptr) };
}

#[test]
fn test_save_and_load_into_fresh_handle() {
    let dir = TempDir::new().unwrap();
    let path = c_path(&dir, "line.arbor");
    let ptr = line_index(20);
    unsafe {
        assert!(arbor_set_seed_and_build(ptr));
        assert!(arbor_save(ptr, path.as_ptr()));

        let mut before = [0i32; 5];
        arbor_get_nns_by_item(ptr, 7, 5, -1, before.as_mut_ptr(), ptr::null_mut());
        arbor_delete_index(ptr);

        let loaded = arbor_create_euclidean(2);
        assert!(arbor_load(loaded, path.as_ptr()));
        assert_eq!(arbor_get_n_items(loaded), 20);

        let mut after = [0i32; 5];
        arbor_get_nns_by_item(loaded, 7, 5, -1, after.as_mut_ptr(), ptr::null_mut());
        assert_eq!(before, after);

        arbor_unload(loaded);
        assert_eq!(arbor_get_n_items(loaded), 0);
        assert!(arbor_load_ex(loaded, path.as_ptr(), true, ptr::null_mut()));
        assert_eq!(arbor_get_n_items(loaded), 20);
        arbor_delete_index(loaded);
    }
}

unsafe fn arbor_set_seed_and_build(ptr: *mut ArborIndex) -> bool {
    unsafe {
        arbor_set_seed(ptr, 42);
        arbor_verbose(ptr, true);
        arbor_build(ptr, 4)
    }
}

#[test]
fn test_load_into_wrong_metric_reports_format_error() {
    let dir = TempDir::new().unwrap();
    let path = c_path(&dir, "line.arbor");
    let ptr = line_index(4);
    let other = arbor_create_angular(2);
    let mut error: *mut c_char = ptr::null_mut();
    unsafe {
        assert!(arbor_build(ptr, 2));
        assert!(arbor_save_ex(ptr, path.as_ptr(), false, &mut error));
        assert!(!arbor_load_ex(other, path.as_ptr(), false, &mut error));
    }
    assert!(take_error(error).contains("ARBOR-005"));
    unsafe {
        arbor_delete_index(ptr);
        arbor_delete_index(other);
    }
}

#[test]
fn test_load_missing_file_reports_io_error() {
    let dir = TempDir::new().unwrap();
    let path = c_path(&dir, "absent.arbor");
    let ptr = arbor_create_manhattan(3);
    let mut error: *mut c_char = ptr::null_mut();
    unsafe {
        assert!(!arbor_load(ptr, path.as_ptr()));
        assert!(!arbor_load_ex(ptr, path.as_ptr(), false, &mut error));
    }
    assert!(take_error(error).contains("ARBOR-006"));
    unsafe { arbor_delete_index(ptr) };
}

#[test]
fn test_save_before_build_fails() {
    let dir = TempDir::new().unwrap();
    let path = c_path(&dir, "early.arbor");
    let ptr = line_index(2);
    let mut error: *mut c_char = ptr::null_mut();
    unsafe {
        assert!(!arbor_save(ptr, path.as_ptr()));
        assert!(!arbor_save_ex(ptr, path.as_ptr(), false, &mut error));
    }
    assert!(take_error(error).contains("ARBOR-001"));
    unsafe { arbor_delete_index(ptr) };
}

#[test]
fn test_null_filename_reports_invalid_input() {
    let ptr = line_index(1);
    let mut error: *mut c_char = ptr::null_mut();
    unsafe {
        assert!(!arbor_load_ex(ptr, ptr::null(), false, &mut error));
    }
    assert!(take_error(error).contains("filename is null"));
    unsafe { arbor_delete_index(ptr) };
}

#[test]
fn test_on_disk_build_writes_loadable_file() {
    let dir = TempDir::new().unwrap();
    let path = c_path(&dir, "disk.arbor");
    let ptr = arbor_create_angular(2);
    let mut error: *mut c_char = ptr::null_mut();
    unsafe {
        assert!(arbor_on_disk_build_ex(ptr, path.as_ptr(), &mut error));
        for (i, v) in [[1.0f32, 0.0], [0.0, 1.0], [1.0, 1.0]].iter().enumerate() {
            assert!(arbor_add_item(ptr, i as i32, v.as_ptr()));
        }
        assert!(arbor_build_ex(ptr, 2, 1, &mut error));
        assert!(error.is_null());
        arbor_delete_index(ptr);

        let loaded = arbor_create_angular(2);
        assert!(arbor_load(loaded, path.as_ptr()));
        assert_eq!(arbor_get_n_items(loaded), 3);
        arbor_delete_index(loaded);
    }
}

#[test]
fn test_build_result_independent_of_thread_count() {
    let query = [3.3f32, 0.0];
    let mut results = Vec::new();
    for threads in [1, 4] {
        let ptr = line_index(50);
        let mut ids = [0i32; 5];
        unsafe {
            arbor_set_seed(ptr, 9);
            assert!(arbor_build_ex(ptr, 6, threads, ptr::null_mut()));
            arbor_get_nns_by_vector(ptr, query.as_ptr(), 5, 20, ids.as_mut_ptr(), ptr::null_mut());
            arbor_delete_index(ptr);
        }
        results.push(ids);
    }
    assert_eq!(results[0], results[1]);
}
