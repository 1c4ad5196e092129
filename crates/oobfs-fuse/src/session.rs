//! Mount lifecycle.
//!
//! A [`FuseSession`] owns an established mount: construction mounts,
//! [`FuseSession::run`] blocks dispatching kernel requests until the
//! session ends, and a [`Killswitch`] asks the dispatch loop to exit from
//! another thread. Dropping the session unmounts.

use crate::host::HostFilesystem;
use crate::mount::{options_to_fuser, validate_mountpoint, MountError, MountOptions};
use oobfs_core::{AuditLog, OobFilesystem, OobRegistry, OobRouter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// An established FUSE mount.
pub struct FuseSession<F: OobFilesystem + 'static> {
    mountpoint: PathBuf,
    session: fuser::Session<HostFilesystem<F>>,
}

impl<F: OobFilesystem + 'static> FuseSession<F> {
    /// Wraps `backend` in the out-of-band router and mounts at
    /// `mountpoint`. Any failure is reported as a [`MountError`].
    pub fn mount(
        backend: F,
        registry: Arc<OobRegistry>,
        audit: AuditLog,
        mountpoint: &Path,
        options: &MountOptions,
    ) -> Result<Self, MountError> {
        validate_mountpoint(mountpoint)?;
        let router = OobRouter::with_audit(backend, audit);
        let host = HostFilesystem::new(router, registry);
        let session = fuser::Session::new(host, mountpoint, &options_to_fuser(options))
            .map_err(|e| MountError::MountFailed {
                mountpoint: mountpoint.display().to_string(),
                reason: e.to_string(),
            })?;
        info!("mounted oobfs at {}", mountpoint.display());
        Ok(FuseSession {
            mountpoint: mountpoint.to_path_buf(),
            session,
        })
    }

    /// The mounted path.
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// A handle that can end the dispatch loop from another thread.
    pub fn killswitch(&mut self) -> Killswitch {
        Killswitch {
            unmounter: self.session.unmount_callable(),
        }
    }

    /// Dispatches kernel requests until the session is unmounted or killed.
    /// In-flight calls complete before this returns.
    pub fn run(&mut self) -> Result<(), MountError> {
        self.session.run()?;
        debug!("dispatch loop for {} ended", self.mountpoint.display());
        Ok(())
    }
}

/// Requests session exit. Killing twice is harmless.
pub struct Killswitch {
    unmounter: fuser::SessionUnmounter,
}

impl Killswitch {
    /// Asks the dispatch loop to exit by unmounting. Errors (already
    /// unmounted, mount raced away) are ignored.
    pub fn kill(&mut self) {
        if let Err(e) = self.unmounter.unmount() {
            debug!("unmount on kill: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oobfs_core::NullFilesystem;

    #[test]
    fn test_mount_reports_missing_mountpoint() {
        let result = FuseSession::mount(
            NullFilesystem,
            Arc::new(OobRegistry::new()),
            AuditLog::with_sink(Box::new(std::io::sink())),
            Path::new("/nonexistent_oobfs_mountpoint"),
            &MountOptions::default(),
        );
        assert!(matches!(result, Err(MountError::PathNotFound(_))));
    }

    #[test]
    fn test_mount_reports_file_mountpoint() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"x").unwrap();
        let result = FuseSession::mount(
            NullFilesystem,
            Arc::new(OobRegistry::new()),
            AuditLog::with_sink(Box::new(std::io::sink())),
            &file,
            &MountOptions::default(),
        );
        assert!(matches!(result, Err(MountError::NotADirectory(_))));
    }
}
