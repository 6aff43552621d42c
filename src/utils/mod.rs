#[cfg(all(test, unix))]
pub mod test_support;

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Converts a byte count to megabytes (1 MB = 1024 * 1024 bytes).
pub fn bytes_to_megabytes(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MEGABYTE
}
