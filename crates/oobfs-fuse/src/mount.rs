//! Mount options and mountpoint validation.

use std::path::Path;
use thiserror::Error;

/// Options applied when establishing the mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    /// Allow other users to access the mount.
    pub allow_other: bool,
    /// Allow root to access the mount.
    pub allow_root: bool,
    /// Let the kernel enforce permissions from the reported modes.
    pub default_permissions: bool,
    /// Unmount automatically when the daemon exits.
    pub auto_unmount: bool,
    /// Read-only mount.
    pub ro: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        MountOptions {
            allow_other: false,
            allow_root: false,
            default_permissions: false,
            auto_unmount: true,
            ro: false,
        }
    }
}

/// Construction failures for the mount. Reported to the caller, never a
/// crash.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Invalid mount option: {0}")]
    InvalidOption(String),

    #[error("Mount failed at {mountpoint}: {reason}")]
    MountFailed { mountpoint: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Checks that the mountpoint exists and is a directory.
pub fn validate_mountpoint(path: &Path) -> Result<(), MountError> {
    if !path.exists() {
        return Err(MountError::PathNotFound(path.display().to_string()));
    }
    if !path.is_dir() {
        return Err(MountError::NotADirectory(path.display().to_string()));
    }
    Ok(())
}

/// Parses a comma-separated option list.
///
/// Valid options: allow_other, allow_root, default_permissions,
/// auto_unmount, ro, rw.
pub fn parse_mount_options(opts_str: &str) -> Result<MountOptions, MountError> {
    let mut options = MountOptions::default();
    for opt in opts_str.split(',') {
        match opt.trim() {
            "allow_other" => options.allow_other = true,
            "allow_root" => options.allow_root = true,
            "default_permissions" => options.default_permissions = true,
            "auto_unmount" => options.auto_unmount = true,
            "ro" => options.ro = true,
            "rw" => options.ro = false,
            "" => {}
            other => return Err(MountError::InvalidOption(other.to_string())),
        }
    }
    Ok(options)
}

/// Converts to the option list `fuser` takes at mount time.
pub fn options_to_fuser(opts: &MountOptions) -> Vec<fuser::MountOption> {
    let mut fuser_opts = vec![fuser::MountOption::FSName("oobfs".to_string())];
    if opts.allow_other {
        fuser_opts.push(fuser::MountOption::AllowOther);
    }
    if opts.allow_root {
        fuser_opts.push(fuser::MountOption::AllowRoot);
    }
    if opts.default_permissions {
        fuser_opts.push(fuser::MountOption::DefaultPermissions);
    }
    if opts.auto_unmount {
        fuser_opts.push(fuser::MountOption::AutoUnmount);
    }
    if opts.ro {
        fuser_opts.push(fuser::MountOption::RO);
    }
    fuser_opts
}
