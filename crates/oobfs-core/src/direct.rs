//! Direct removal of real filesystem objects.
//!
//! Pass-through cleanup that bypasses the shadow namespace entirely. A
//! failure here is operational, not a consistency violation: the OS error
//! is logged and the caller decides whether to retry or ignore.

use std::fs;
use std::path::Path;
use tracing::error;

/// Unlinks a real file. Returns false (after logging the OS error) on
/// failure.
pub fn remove_file_direct(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            error!("direct unlink of {} failed: {}", path.display(), e);
            false
        }
    }
}

/// Removes a real, empty directory. Returns false (after logging the OS
/// error) on failure.
pub fn remove_dir_direct(path: &Path) -> bool {
    match fs::remove_dir(path) {
        Ok(()) => true,
        Err(e) => {
            error!("direct rmdir of {} failed: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_file_direct_succeeds_on_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("victim");
        fs::write(&path, b"x").unwrap();
        assert!(remove_file_direct(&path));
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_file_direct_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!remove_file_direct(&dir.path().join("absent")));
    }

    #[test]
    fn test_remove_dir_direct_succeeds_on_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub");
        fs::create_dir(&path).unwrap();
        assert!(remove_dir_direct(&path));
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_dir_direct_reports_non_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("child"), b"x").unwrap();
        assert!(!remove_dir_direct(&path));
        assert!(path.exists());
    }
}
