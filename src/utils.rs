//! Utility functions and constants
//!
//! **Used by**: sequence indexing, file sources

pub mod natural_sort;

pub use natural_sort::{natural_cmp, natural_cmp_paths};

/// File extension helpers
pub mod media {
    use std::path::Path;

    /// Default geometry file extension
    pub const GEOMETRY_EXT: &str = "ply";

    /// Default texture file extension
    pub const TEXTURE_EXT: &str = "dds";

    /// Case-insensitive extension check (`ext` without the dot)
    pub fn has_extension(path: &Path, ext: &str) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|s| s.eq_ignore_ascii_case(ext.trim_start_matches('.')))
            .unwrap_or(false)
    }

}
