//! Test doubles shared by the core and adapter test suites.

use crate::attr::{FileAttr, FileKind};
use crate::backend::{CapabilitySet, DirEntry, OobFilesystem};
use crate::error::{FsError, FsResult};
use parking_lot::Mutex;
use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One recorded backend invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub op: &'static str,
    pub out_of_band: bool,
    pub path: String,
}

/// A scripted backing filesystem that records every call it receives.
///
/// Mutating operations succeed; `getattr` answers with a 0o640 regular
/// file so tests can tell a delegated result from a synthesized one;
/// `open` hands out file handle 7; `link` fails with `EXDEV` to exercise
/// delegated-failure paths.
pub struct MockFilesystem {
    capabilities: CapabilitySet,
    calls: Mutex<Vec<MockCall>>,
    begins: AtomicUsize,
    ends: AtomicUsize,
}

impl MockFilesystem {
    pub fn new() -> Self {
        Self::with_capabilities(CapabilitySet::all())
    }

    pub fn with_capabilities(capabilities: CapabilitySet) -> Self {
        MockFilesystem {
            capabilities,
            calls: Mutex::new(Vec::new()),
            begins: AtomicUsize::new(0),
            ends: AtomicUsize::new(0),
        }
    }

    fn record(&self, op: &'static str, out_of_band: bool, path: impl Into<String>) {
        self.calls.lock().push(MockCall {
            op,
            out_of_band,
            path: path.into(),
        });
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn begin_count(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn end_count(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }
}

impl Default for MockFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl OobFilesystem for MockFilesystem {
    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    fn operation_begin(&self) {
        self.begins.fetch_add(1, Ordering::SeqCst);
    }

    fn operation_end(&self) {
        self.ends.fetch_add(1, Ordering::SeqCst);
    }

    fn getattr(&self, out_of_band: bool, path: &str) -> FsResult<FileAttr> {
        self.record("getattr", out_of_band, path);
        Ok(FileAttr {
            kind: FileKind::RegularFile,
            perm: 0o640,
            size: 11,
            nlink: 1,
            uid: 1000,
            gid: 1000,
            mtime_secs: 1,
            mtime_nsecs: 0,
        })
    }

    fn setattr(&self, out_of_band: bool, path: &str, mode: u32) -> FsResult<FileAttr> {
        self.record("setattr", out_of_band, path);
        Ok(FileAttr {
            kind: FileKind::RegularFile,
            perm: (mode & 0o777) as u16,
            size: 11,
            nlink: 1,
            uid: 1000,
            gid: 1000,
            mtime_secs: 1,
            mtime_nsecs: 0,
        })
    }

    fn create(&self, out_of_band: bool, path: &str, _mode: u32) -> FsResult<()> {
        self.record("create", out_of_band, path);
        Ok(())
    }

    fn mkdir(&self, out_of_band: bool, path: &str, _mode: u32) -> FsResult<()> {
        self.record("mkdir", out_of_band, path);
        Ok(())
    }

    fn unlink(&self, out_of_band: bool, path: &str) -> FsResult<()> {
        self.record("unlink", out_of_band, path);
        Ok(())
    }

    fn rmdir(&self, out_of_band: bool, path: &str) -> FsResult<()> {
        self.record("rmdir", out_of_band, path);
        Ok(())
    }

    fn rename(&self, out_of_band: bool, from: &str, to: &str) -> FsResult<()> {
        self.record("rename", out_of_band, format!("{from} -> {to}"));
        Ok(())
    }

    fn link(&self, out_of_band: bool, from: &str, to: &str) -> FsResult<()> {
        self.record("link", out_of_band, format!("{from} -> {to}"));
        Err(FsError::Io(io::Error::from_raw_os_error(libc::EXDEV)))
    }

    fn open(&self, out_of_band: bool, path: &str, _flags: i32) -> FsResult<u64> {
        self.record("open", out_of_band, path);
        Ok(7)
    }

    fn read(
        &self,
        out_of_band: bool,
        path: &str,
        _fh: u64,
        _offset: i64,
        size: u32,
    ) -> FsResult<Vec<u8>> {
        self.record("read", out_of_band, path);
        Ok(vec![0u8; size.min(11) as usize])
    }

    fn write(
        &self,
        out_of_band: bool,
        path: &str,
        _fh: u64,
        _offset: i64,
        data: &[u8],
    ) -> FsResult<u32> {
        self.record("write", out_of_band, path);
        Ok(data.len() as u32)
    }

    fn release(&self, out_of_band: bool, path: &str, _fh: u64) -> FsResult<()> {
        self.record("release", out_of_band, path);
        Ok(())
    }

    fn readdir(&self, out_of_band: bool, path: &str) -> FsResult<Vec<DirEntry>> {
        self.record("readdir", out_of_band, path);
        Ok(vec![
            DirEntry {
                name: "sub".to_string(),
                kind: FileKind::Directory,
            },
            DirEntry {
                name: "file".to_string(),
                kind: FileKind::RegularFile,
            },
        ])
    }
}

/// A cloneable in-memory `Write` sink for capturing audit output.
#[derive(Clone, Default)]
pub struct SharedSink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl SharedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
