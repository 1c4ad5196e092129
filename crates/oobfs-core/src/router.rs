//! Out-of-band routing.
//!
//! Composes the shadow namespace with a backing filesystem. Each call
//! carries an explicit out-of-band flag computed by the caller's
//! thread-affinity classification: when set, the intercepted operations are
//! serviced entirely from the shadow tree and always succeed; when clear,
//! the call is delegated to the backing filesystem, bracketed by its
//! `operation_begin`/`operation_end` hooks. Operations the router does not
//! intercept are always delegated, with the same bracketing rule.

use crate::attr::{FileAttr, FileKind};
use crate::audit::AuditLog;
use crate::backend::{DirEntry, OobFilesystem};
use crate::error::FsResult;
use crate::tree::ShadowTree;
use tracing::debug;

/// Decorator around a backing filesystem.
pub struct OobRouter<F: OobFilesystem> {
    backend: F,
    tree: ShadowTree,
    audit: AuditLog,
}

impl<F: OobFilesystem> OobRouter<F> {
    /// Wraps `backend`, auditing mutations to stderr.
    pub fn new(backend: F) -> Self {
        Self::with_audit(backend, AuditLog::stderr())
    }

    /// Wraps `backend` with an explicit audit sink.
    pub fn with_audit(backend: F, audit: AuditLog) -> Self {
        OobRouter {
            backend,
            tree: ShadowTree::new(),
            audit,
        }
    }

    /// The wrapped backing filesystem.
    pub fn backend(&self) -> &F {
        &self.backend
    }

    /// The shadow namespace.
    pub fn tree(&self) -> &ShadowTree {
        &self.tree
    }

    /// Delegates to the backing filesystem. In-band calls are bracketed by
    /// the lifecycle hooks; out-of-band calls reaching the backend (the
    /// non-intercepted operations) bypass them.
    fn delegate<T>(&self, out_of_band: bool, call: impl FnOnce(&F) -> FsResult<T>) -> FsResult<T> {
        if out_of_band {
            return call(&self.backend);
        }
        self.backend.operation_begin();
        let result = call(&self.backend);
        self.backend.operation_end();
        result
    }

    /// Attribute query. Out-of-band: synthesized from the shadow namespace,
    /// full permissions, kind bit per the tree; panics if the path was
    /// never established there.
    pub fn getattr(&self, out_of_band: bool, path: &str) -> FsResult<FileAttr> {
        if out_of_band {
            debug!(path, "oob getattr");
            let kind = if self.tree.is_directory(path) {
                FileKind::Directory
            } else {
                FileKind::RegularFile
            };
            return Ok(FileAttr::synthesized(kind));
        }
        self.delegate(false, |b| b.getattr(false, path))
    }

    /// File creation.
    pub fn create(&self, out_of_band: bool, path: &str, mode: u32) -> FsResult<()> {
        self.audit.created(path);
        if out_of_band {
            debug!(path, "oob create");
            self.tree.create(path, false);
            return Ok(());
        }
        self.delegate(false, |b| b.create(false, path, mode))
    }

    /// Directory creation.
    pub fn mkdir(&self, out_of_band: bool, path: &str, mode: u32) -> FsResult<()> {
        self.audit.created(path);
        if out_of_band {
            debug!(path, "oob mkdir");
            self.tree.create(path, true);
            return Ok(());
        }
        self.delegate(false, |b| b.mkdir(false, path, mode))
    }

    /// File removal.
    pub fn unlink(&self, out_of_band: bool, path: &str) -> FsResult<()> {
        self.audit.removed(path);
        if out_of_band {
            debug!(path, "oob unlink");
            self.tree.destroy(path);
            return Ok(());
        }
        self.delegate(false, |b| b.unlink(false, path))
    }

    /// Directory removal.
    pub fn rmdir(&self, out_of_band: bool, path: &str) -> FsResult<()> {
        self.audit.removed(path);
        if out_of_band {
            debug!(path, "oob rmdir");
            self.tree.destroy(path);
            return Ok(());
        }
        self.delegate(false, |b| b.rmdir(false, path))
    }

    /// Rename. Out-of-band renames move the shadow node in one atomic step.
    pub fn rename(&self, out_of_band: bool, from: &str, to: &str) -> FsResult<()> {
        self.audit.removed(from);
        self.audit.created(to);
        if out_of_band {
            debug!(from, to, "oob rename");
            self.tree.rename(from, to);
            return Ok(());
        }
        self.delegate(false, |b| b.rename(false, from, to))
    }

    /// Hard-link-style path creation: `to` becomes an alias of `from`.
    pub fn link(&self, out_of_band: bool, from: &str, to: &str) -> FsResult<()> {
        self.audit.created(to);
        if out_of_band {
            debug!(from, to, "oob link");
            self.tree.link(from, to);
            return Ok(());
        }
        self.delegate(false, |b| b.link(false, from, to))
    }

    // Non-intercepted operations: always forwarded, whatever the flag.

    pub fn setattr(&self, out_of_band: bool, path: &str, mode: u32) -> FsResult<FileAttr> {
        self.delegate(out_of_band, |b| b.setattr(out_of_band, path, mode))
    }

    pub fn open(&self, out_of_band: bool, path: &str, flags: i32) -> FsResult<u64> {
        self.delegate(out_of_band, |b| b.open(out_of_band, path, flags))
    }

    pub fn read(
        &self,
        out_of_band: bool,
        path: &str,
        fh: u64,
        offset: i64,
        size: u32,
    ) -> FsResult<Vec<u8>> {
        self.delegate(out_of_band, |b| b.read(out_of_band, path, fh, offset, size))
    }

    pub fn write(
        &self,
        out_of_band: bool,
        path: &str,
        fh: u64,
        offset: i64,
        data: &[u8],
    ) -> FsResult<u32> {
        self.delegate(out_of_band, |b| b.write(out_of_band, path, fh, offset, data))
    }

    pub fn release(&self, out_of_band: bool, path: &str, fh: u64) -> FsResult<()> {
        self.delegate(out_of_band, |b| b.release(out_of_band, path, fh))
    }

    pub fn readdir(&self, out_of_band: bool, path: &str) -> FsResult<Vec<DirEntry>> {
        self.delegate(out_of_band, |b| b.readdir(out_of_band, path))
    }
}
