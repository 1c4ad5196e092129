//! Framework-agnostic file attributes.

/// Kind bit of an attribute result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    RegularFile,
    Directory,
}

/// POSIX-style attributes, independent of any host framework's own
/// attribute struct. The FUSE adapter converts these at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttr {
    pub kind: FileKind,
    pub perm: u16,
    pub size: u64,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime_secs: i64,
    pub mtime_nsecs: u32,
}

impl FileAttr {
    /// The attribute result served for out-of-band queries: full
    /// read/write/execute permission for owner, group, and other, the kind
    /// bit from the shadow namespace, everything else zeroed.
    pub fn synthesized(kind: FileKind) -> Self {
        FileAttr {
            kind,
            perm: 0o777,
            size: 0,
            nlink: 0,
            uid: 0,
            gid: 0,
            mtime_secs: 0,
            mtime_nsecs: 0,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }
}
