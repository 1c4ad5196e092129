//! Conversion between router attributes and `fuser` attributes.

use oobfs_core::{FileAttr, FileKind};
use std::time::{Duration, SystemTime};

pub fn kind_to_fuser(kind: FileKind) -> fuser::FileType {
    match kind {
        FileKind::RegularFile => fuser::FileType::RegularFile,
        FileKind::Directory => fuser::FileType::Directory,
    }
}

/// Maps a router attribute result onto the kernel's attribute struct.
/// Zeroed timestamps come out as the epoch.
pub fn to_fuser_attr(ino: u64, attr: &FileAttr) -> fuser::FileAttr {
    let mtime = SystemTime::UNIX_EPOCH
        + Duration::new(attr.mtime_secs.max(0) as u64, attr.mtime_nsecs);
    fuser::FileAttr {
        ino,
        size: attr.size,
        blocks: attr.size.div_ceil(512),
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: SystemTime::UNIX_EPOCH,
        kind: kind_to_fuser(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}
