//! API constants

/// API base path prefix (version-independent)
pub const API_BASE: &str = "/api";

/// Version segment of every API route
pub const API_VERSION: &str = "v0";

/// Versioned prefix, e.g. `/api/v0`
pub const API_PREFIX: &str = "/api/v0";

/// Header carrying the declared upload size; `Content-Length` is used when absent
pub const UPLOAD_SIZE_HEADER: &str = "x-upload-size";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_is_base_plus_version() {
        assert_eq!(API_PREFIX, format!("{}/{}", API_BASE, API_VERSION));
    }
}
