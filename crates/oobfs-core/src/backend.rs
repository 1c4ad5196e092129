//! The wrapped-filesystem capability interface.
//!
//! A backing filesystem implements the subset of operations it actually
//! supports and names that subset in [`OobFilesystem::capabilities`]; the
//! host adapter builds its registration table from that answer at mount
//! time instead of probing the type. Every operation takes the out-of-band
//! flag as its first argument; the default bodies report the slot as
//! unimplemented.

use crate::attr::{FileAttr, FileKind};
use crate::error::{FsError, FsResult};

/// Operation slots a backing filesystem may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    Getattr,
    Setattr,
    Create,
    Mkdir,
    Unlink,
    Rmdir,
    Rename,
    Link,
    Open,
    Read,
    Write,
    Release,
    Readdir,
}

impl FsOp {
    const ALL: [FsOp; 13] = [
        FsOp::Getattr,
        FsOp::Setattr,
        FsOp::Create,
        FsOp::Mkdir,
        FsOp::Unlink,
        FsOp::Rmdir,
        FsOp::Rename,
        FsOp::Link,
        FsOp::Open,
        FsOp::Read,
        FsOp::Write,
        FsOp::Release,
        FsOp::Readdir,
    ];

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// The set of operation slots a concrete backing filesystem provides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    bits: u32,
}

impl CapabilitySet {
    /// No slot registered.
    pub fn empty() -> Self {
        CapabilitySet { bits: 0 }
    }

    /// Every slot registered.
    pub fn all() -> Self {
        let mut set = Self::empty();
        for op in FsOp::ALL {
            set = set.with(op);
        }
        set
    }

    /// Adds a slot to the set.
    #[must_use]
    pub fn with(self, op: FsOp) -> Self {
        CapabilitySet {
            bits: self.bits | op.bit(),
        }
    }

    /// Whether the slot is registered.
    pub fn supports(self, op: FsOp) -> bool {
        self.bits & op.bit() != 0
    }
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileKind,
}

/// A backing filesystem wrapped by the out-of-band router.
///
/// Operations are optional: a concrete type overrides the ones it supports
/// and lists them in [`OobFilesystem::capabilities`]. The `out_of_band`
/// flag is threaded through every call; most backends ignore it, but some
/// use it to vary bookkeeping.
#[allow(unused_variables)]
pub trait OobFilesystem: Send + Sync {
    /// Names the operation slots this type provides. The host adapter only
    /// routes a delegated call to a slot that appears here.
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::empty()
    }

    /// Invoked immediately before a delegated (in-band) call. Out-of-band
    /// calls bypass both hooks entirely.
    fn operation_begin(&self) {}

    /// Invoked immediately after a delegated (in-band) call.
    fn operation_end(&self) {}

    fn getattr(&self, out_of_band: bool, path: &str) -> FsResult<FileAttr> {
        Err(FsError::not_supported("getattr"))
    }

    fn setattr(&self, out_of_band: bool, path: &str, mode: u32) -> FsResult<FileAttr> {
        Err(FsError::not_supported("setattr"))
    }

    fn create(&self, out_of_band: bool, path: &str, mode: u32) -> FsResult<()> {
        Err(FsError::not_supported("create"))
    }

    fn mkdir(&self, out_of_band: bool, path: &str, mode: u32) -> FsResult<()> {
        Err(FsError::not_supported("mkdir"))
    }

    fn unlink(&self, out_of_band: bool, path: &str) -> FsResult<()> {
        Err(FsError::not_supported("unlink"))
    }

    fn rmdir(&self, out_of_band: bool, path: &str) -> FsResult<()> {
        Err(FsError::not_supported("rmdir"))
    }

    fn rename(&self, out_of_band: bool, from: &str, to: &str) -> FsResult<()> {
        Err(FsError::not_supported("rename"))
    }

    fn link(&self, out_of_band: bool, from: &str, to: &str) -> FsResult<()> {
        Err(FsError::not_supported("link"))
    }

    fn open(&self, out_of_band: bool, path: &str, flags: i32) -> FsResult<u64> {
        Err(FsError::not_supported("open"))
    }

    fn read(
        &self,
        out_of_band: bool,
        path: &str,
        fh: u64,
        offset: i64,
        size: u32,
    ) -> FsResult<Vec<u8>> {
        Err(FsError::not_supported("read"))
    }

    fn write(
        &self,
        out_of_band: bool,
        path: &str,
        fh: u64,
        offset: i64,
        data: &[u8],
    ) -> FsResult<u32> {
        Err(FsError::not_supported("write"))
    }

    fn release(&self, out_of_band: bool, path: &str, fh: u64) -> FsResult<()> {
        Err(FsError::not_supported("release"))
    }

    fn readdir(&self, out_of_band: bool, path: &str) -> FsResult<Vec<DirEntry>> {
        Err(FsError::not_supported("readdir"))
    }
}

/// A backend providing no operation at all. Stands in for the real wrapped
/// filesystem when the daemon is mounted for out-of-band traffic only.
pub struct NullFilesystem;

impl OobFilesystem for NullFilesystem {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set_supports_nothing() {
        let set = CapabilitySet::empty();
        for op in FsOp::ALL {
            assert!(!set.supports(op));
        }
    }

    #[test]
    fn test_all_set_supports_everything() {
        let set = CapabilitySet::all();
        for op in FsOp::ALL {
            assert!(set.supports(op));
        }
    }

    #[test]
    fn test_with_registers_only_the_named_slot() {
        let set = CapabilitySet::empty().with(FsOp::Mkdir).with(FsOp::Rmdir);
        assert!(set.supports(FsOp::Mkdir));
        assert!(set.supports(FsOp::Rmdir));
        assert!(!set.supports(FsOp::Create));
        assert!(!set.supports(FsOp::Readdir));
    }

    #[test]
    fn test_null_filesystem_has_no_capabilities() {
        let fs = NullFilesystem;
        assert_eq!(fs.capabilities(), CapabilitySet::empty());
    }

    #[test]
    fn test_default_slot_reports_not_supported() {
        let fs = NullFilesystem;
        let err = fs.getattr(false, "/x").unwrap_err();
        assert!(matches!(err, FsError::NotSupported { .. }));
        assert_eq!(err.to_errno(), libc::ENOSYS);
    }

    #[test]
    fn test_default_hooks_are_no_ops() {
        let fs = NullFilesystem;
        fs.operation_begin();
        fs.operation_end();
    }
}
