use thiserror::Error;

/// Recoverable filesystem failures, surfaced to the kernel as errno values.
///
/// Shadow-namespace consistency violations are not represented here; those
/// are protocol bugs in the out-of-band caller and abort the process.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path not found: {path}")]
    NotFound { path: String },

    #[error("Name already exists: {path}")]
    AlreadyExists { path: String },

    #[error("Not a directory: {path}")]
    NotDirectory { path: String },

    #[error("Is a directory: {path}")]
    IsDirectory { path: String },

    #[error("Directory not empty: {path}")]
    NotEmpty { path: String },

    #[error("Permission denied: {path}")]
    PermissionDenied { path: String },

    #[error("Operation not supported: {op}")]
    NotSupported { op: String },

    #[error("Invalid argument: {msg}")]
    InvalidArgument { msg: String },
}

/// Result alias for backing-filesystem operations.
pub type FsResult<T> = std::result::Result<T, FsError>;

impl FsError {
    /// Shorthand for the default body of an unimplemented capability slot.
    pub fn not_supported(op: &str) -> Self {
        FsError::NotSupported { op: op.to_string() }
    }

    pub fn to_errno(&self) -> i32 {
        use libc::*;
        match self {
            FsError::Io(e) => e.raw_os_error().unwrap_or(EIO),
            FsError::NotFound { .. } => ENOENT,
            FsError::AlreadyExists { .. } => EEXIST,
            FsError::NotDirectory { .. } => ENOTDIR,
            FsError::IsDirectory { .. } => EISDIR,
            FsError::NotEmpty { .. } => ENOTEMPTY,
            FsError::PermissionDenied { .. } => EACCES,
            FsError::NotSupported { .. } => ENOSYS,
            FsError::InvalidArgument { .. } => EINVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_errno() {
        let err = FsError::NotFound {
            path: "/a/b".to_string(),
        };
        assert_eq!(err.to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_already_exists_errno() {
        let err = FsError::AlreadyExists {
            path: "/a".to_string(),
        };
        assert_eq!(err.to_errno(), libc::EEXIST);
    }

    #[test]
    fn test_not_directory_errno() {
        let err = FsError::NotDirectory {
            path: "/a".to_string(),
        };
        assert_eq!(err.to_errno(), libc::ENOTDIR);
    }

    #[test]
    fn test_not_supported_errno() {
        let err = FsError::not_supported("link");
        assert_eq!(err.to_errno(), libc::ENOSYS);
    }

    #[test]
    fn test_io_error_errno_passthrough() {
        let io_err = std::io::Error::from_raw_os_error(libc::EBUSY);
        let err = FsError::Io(io_err);
        assert_eq!(err.to_errno(), libc::EBUSY);
    }

    #[test]
    fn test_io_error_without_os_code_maps_to_eio() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "synthetic");
        let err = FsError::Io(io_err);
        assert_eq!(err.to_errno(), libc::EIO);
    }

    #[test]
    fn test_display_messages_non_empty() {
        let errors = [
            FsError::NotFound {
                path: "/x".to_string(),
            },
            FsError::AlreadyExists {
                path: "/x".to_string(),
            },
            FsError::IsDirectory {
                path: "/x".to_string(),
            },
            FsError::NotEmpty {
                path: "/x".to_string(),
            },
            FsError::PermissionDenied {
                path: "/x".to_string(),
            },
            FsError::not_supported("open"),
            FsError::InvalidArgument {
                msg: "bad".to_string(),
            },
        ];
        for err in errors {
            assert!(!err.to_string().is_empty());
        }
    }
}
