//! Shared utilities for initforge crates
//!
//! Provides the filesystem primitives every artifact writer in the build
//! pipeline relies on: whole-buffer writes with rotate-aside backups,
//! on-demand parent directory creation, and the generator banner.

pub mod fs;

/// The banner block stamped into generated scripts.
pub fn banner() -> String {
    format!("#\n# Generated by initforge v{}\n#", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_contains_version() {
        let banner = banner();
        assert!(banner.starts_with("#\n# Generated by initforge v"));
        assert!(banner.ends_with("\n#"));
    }
}
