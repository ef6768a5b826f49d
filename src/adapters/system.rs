//! Heap statistics for the RAM figure in the status registers.

/// `(free, total)` bytes of the default heap.
#[cfg(target_os = "espidf")]
pub fn heap_usage() -> (u64, u64) {
    use esp_idf_svc::sys::{heap_caps_get_free_size, heap_caps_get_total_size, MALLOC_CAP_DEFAULT};
    // SAFETY: read-only allocator queries.
    unsafe {
        (
            heap_caps_get_free_size(MALLOC_CAP_DEFAULT) as u64,
            heap_caps_get_total_size(MALLOC_CAP_DEFAULT) as u64,
        )
    }
}

/// Host runs report a fixed, half-free heap.
#[cfg(not(target_os = "espidf"))]
pub fn heap_usage() -> (u64, u64) {
    (160 * 1024, 320 * 1024)
}
