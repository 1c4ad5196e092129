//! The kernel-facing filesystem.
//!
//! Implements `fuser::Filesystem` on top of the out-of-band router. Each
//! incoming request is classified by its originating context id, inodes are
//! translated to absolute paths, and unregistered backend slots answer
//! `ENOSYS` without reaching the router. The intercepted operations are
//! always available to out-of-band callers: the router services those from
//! the shadow namespace no matter what the backend provides.

use std::ffi::OsStr;
use std::os::raw::c_int;
use std::sync::Arc;
use std::time::Duration;

use fuser::{
    FileType as FuserFileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::attr::{kind_to_fuser, to_fuser_attr};
use crate::inode::InodeTable;
use oobfs_core::{
    CapabilitySet, FileAttr, FileKind, FsError, FsOp, FsResult, OobFilesystem, OobRegistry,
    OobRouter,
};

const TTL: Duration = Duration::from_secs(1);

fn is_intercepted(op: FsOp) -> bool {
    matches!(
        op,
        FsOp::Getattr
            | FsOp::Create
            | FsOp::Mkdir
            | FsOp::Unlink
            | FsOp::Rmdir
            | FsOp::Rename
            | FsOp::Link
    )
}

/// Whether a call slot is serviceable. Out-of-band callers always reach the
/// intercepted operations; everything else requires the backend to have
/// registered the slot.
fn registered(caps: CapabilitySet, out_of_band: bool, op: FsOp) -> bool {
    (out_of_band && is_intercepted(op)) || caps.supports(op)
}

fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Adapter between the kernel dispatch and the router.
pub struct HostFilesystem<F: OobFilesystem> {
    router: OobRouter<F>,
    registry: Arc<OobRegistry>,
    caps: CapabilitySet,
    table: Mutex<InodeTable>,
}

impl<F: OobFilesystem> HostFilesystem<F> {
    /// Builds the adapter; the registration table is snapshotted from the
    /// backend's capability answer here, once.
    pub fn new(router: OobRouter<F>, registry: Arc<OobRegistry>) -> Self {
        let caps = router.backend().capabilities();
        HostFilesystem {
            router,
            registry,
            caps,
            table: Mutex::new(InodeTable::new()),
        }
    }

    /// The router this host dispatches into.
    pub fn router(&self) -> &OobRouter<F> {
        &self.router
    }

    fn out_of_band(&self, req: &Request<'_>) -> bool {
        self.registry.is_out_of_band(req.pid())
    }

    /// Attribute result for a freshly created entry. Falls back to the
    /// creation mode when the backend has no attribute query.
    fn attr_after_mutation(
        &self,
        out_of_band: bool,
        path: &str,
        kind: FileKind,
        mode: u32,
    ) -> FsResult<FileAttr> {
        if registered(self.caps, out_of_band, FsOp::Getattr) {
            match self.router.getattr(out_of_band, path) {
                Ok(attr) => return Ok(attr),
                Err(FsError::NotSupported { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(FileAttr {
            kind,
            perm: (mode & 0o777) as u16,
            size: 0,
            nlink: 0,
            uid: 0,
            gid: 0,
            mtime_secs: 0,
            mtime_nsecs: 0,
        })
    }
}

impl<F: OobFilesystem> Filesystem for HostFilesystem<F> {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        debug!("oobfs host init");
        Ok(())
    }

    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name_str = name.to_string_lossy();
        let oob = self.out_of_band(req);
        debug!("lookup parent={} name={} oob={}", parent, name_str, oob);

        let mut table = self.table.lock();
        let parent_path = match table.path_of(parent) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let path = join_path(&parent_path, &name_str);

        if let Some(ino) = table.lookup_child(parent, &name_str) {
            match self.router.getattr(oob, &path) {
                Ok(attr) => {
                    table.bump_lookup(ino);
                    reply.entry(&TTL, &to_fuser_attr(ino, &attr), 0);
                }
                Err(e) => reply.error(e.to_errno()),
            }
            return;
        }

        // No live inode for this name. Out-of-band callers only see what
        // was established through the shadow namespace of this mount, so
        // an unknown name is simply absent; in-band lookups may discover
        // entries that exist on the backing filesystem.
        if oob || !self.caps.supports(FsOp::Getattr) {
            reply.error(libc::ENOENT);
            return;
        }
        match self.router.getattr(false, &path) {
            Ok(attr) => match table.alloc(parent, &name_str, attr.kind) {
                Some(ino) => reply.entry(&TTL, &to_fuser_attr(ino, &attr), 0),
                None => reply.error(libc::ENOENT),
            },
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        debug!("forget ino={} nlookup={}", ino, nlookup);
        self.table.lock().forget(ino, nlookup);
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let oob = self.out_of_band(req);
        debug!("getattr ino={} oob={}", ino, oob);

        let path = match self.table.lock().path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        if !registered(self.caps, oob, FsOp::Getattr) {
            reply.error(libc::ENOSYS);
            return;
        }
        match self.router.getattr(oob, &path) {
            Ok(attr) => reply.attr(&TTL, &to_fuser_attr(ino, &attr)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let oob = self.out_of_band(req);
        debug!("setattr ino={} mode={:?} oob={}", ino, mode, oob);

        let path = match self.table.lock().path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let result = match mode {
            Some(m) => {
                if !registered(self.caps, oob, FsOp::Setattr) {
                    reply.error(libc::ENOSYS);
                    return;
                }
                self.router.setattr(oob, &path, m)
            }
            // Nothing this host applies; answer with the current attributes.
            None => {
                if !registered(self.caps, oob, FsOp::Getattr) {
                    reply.error(libc::ENOSYS);
                    return;
                }
                self.router.getattr(oob, &path)
            }
        };
        match result {
            Ok(attr) => reply.attr(&TTL, &to_fuser_attr(ino, &attr)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let name_str = name.to_string_lossy();
        let oob = self.out_of_band(req);
        debug!("mkdir parent={} name={} oob={}", parent, name_str, oob);

        if !registered(self.caps, oob, FsOp::Mkdir) {
            reply.error(libc::ENOSYS);
            return;
        }
        let mut table = self.table.lock();
        let parent_path = match table.path_of(parent) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let path = join_path(&parent_path, &name_str);
        if let Err(e) = self.router.mkdir(oob, &path, mode) {
            reply.error(e.to_errno());
            return;
        }
        let attr = match self.attr_after_mutation(oob, &path, FileKind::Directory, mode) {
            Ok(attr) => attr,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };
        match table.alloc(parent, &name_str, FileKind::Directory) {
            Some(ino) => reply.entry(&TTL, &to_fuser_attr(ino, &attr), 0),
            None => reply.error(libc::ENOENT),
        }
    }

    fn unlink(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name_str = name.to_string_lossy();
        let oob = self.out_of_band(req);
        debug!("unlink parent={} name={} oob={}", parent, name_str, oob);

        if !registered(self.caps, oob, FsOp::Unlink) {
            reply.error(libc::ENOSYS);
            return;
        }
        let mut table = self.table.lock();
        let parent_path = match table.path_of(parent) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let path = join_path(&parent_path, &name_str);
        match self.router.unlink(oob, &path) {
            Ok(()) => {
                if let Some(ino) = table.lookup_child(parent, &name_str) {
                    table.remove(ino);
                }
                reply.ok();
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rmdir(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name_str = name.to_string_lossy();
        let oob = self.out_of_band(req);
        debug!("rmdir parent={} name={} oob={}", parent, name_str, oob);

        if !registered(self.caps, oob, FsOp::Rmdir) {
            reply.error(libc::ENOSYS);
            return;
        }
        let mut table = self.table.lock();
        let parent_path = match table.path_of(parent) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let path = join_path(&parent_path, &name_str);
        match self.router.rmdir(oob, &path) {
            Ok(()) => {
                if let Some(ino) = table.lookup_child(parent, &name_str) {
                    table.remove(ino);
                }
                reply.ok();
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rename(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let name_str = name.to_string_lossy();
        let newname_str = newname.to_string_lossy();
        let oob = self.out_of_band(req);
        debug!(
            "rename parent={} name={} newparent={} newname={} oob={}",
            parent, name_str, newparent, newname_str, oob
        );

        if !registered(self.caps, oob, FsOp::Rename) {
            reply.error(libc::ENOSYS);
            return;
        }
        let mut table = self.table.lock();
        let (from, to) = match (table.path_of(parent), table.path_of(newparent)) {
            (Some(p), Some(np)) => (
                join_path(&p, &name_str),
                join_path(&np, &newname_str),
            ),
            _ => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        match self.router.rename(oob, &from, &to) {
            Ok(()) => {
                if let Some(displaced) = table.lookup_child(newparent, &newname_str) {
                    table.remove(displaced);
                }
                if let Some(ino) = table.lookup_child(parent, &name_str) {
                    table.reparent(ino, newparent, &newname_str);
                }
                reply.ok();
            }
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn link(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let newname_str = newname.to_string_lossy();
        let oob = self.out_of_band(req);
        debug!(
            "link ino={} newparent={} newname={} oob={}",
            ino, newparent, newname_str, oob
        );

        if !registered(self.caps, oob, FsOp::Link) {
            reply.error(libc::ENOSYS);
            return;
        }
        let mut table = self.table.lock();
        let (from, kind) = match table.get(ino) {
            Some(entry) => (
                match table.path_of(ino) {
                    Some(p) => p,
                    None => {
                        reply.error(libc::ENOENT);
                        return;
                    }
                },
                entry.kind,
            ),
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let to = match table.path_of(newparent) {
            Some(np) => join_path(&np, &newname_str),
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        if let Err(e) = self.router.link(oob, &from, &to) {
            reply.error(e.to_errno());
            return;
        }
        let attr = match self.attr_after_mutation(oob, &to, kind, 0o777) {
            Ok(attr) => attr,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };
        // The alias gets its own inode entry; both paths reach the same
        // shadow node through the router.
        match table.alloc(newparent, &newname_str, kind) {
            Some(alias) => reply.entry(&TTL, &to_fuser_attr(alias, &attr), 0),
            None => reply.error(libc::ENOENT),
        }
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let oob = self.out_of_band(req);
        debug!("open ino={} flags={} oob={}", ino, flags, oob);

        if !registered(self.caps, oob, FsOp::Open) {
            reply.error(libc::ENOSYS);
            return;
        }
        let path = match self.table.lock().path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        match self.router.open(oob, &path, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let name_str = name.to_string_lossy();
        let oob = self.out_of_band(req);
        debug!(
            "create parent={} name={} mode={:o} oob={}",
            parent, name_str, mode, oob
        );

        if !registered(self.caps, oob, FsOp::Create) {
            reply.error(libc::ENOSYS);
            return;
        }
        let mut table = self.table.lock();
        let parent_path = match table.path_of(parent) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let path = join_path(&parent_path, &name_str);
        if let Err(e) = self.router.create(oob, &path, mode) {
            reply.error(e.to_errno());
            return;
        }
        let attr = match self.attr_after_mutation(oob, &path, FileKind::RegularFile, mode) {
            Ok(attr) => attr,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };
        match table.alloc(parent, &name_str, FileKind::RegularFile) {
            Some(ino) => reply.created(&TTL, &to_fuser_attr(ino, &attr), 0, 0, flags as u32),
            None => reply.error(libc::ENOENT),
        }
    }

    fn read(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let oob = self.out_of_band(req);
        debug!("read ino={} offset={} size={} oob={}", ino, offset, size, oob);

        if !registered(self.caps, oob, FsOp::Read) {
            reply.error(libc::ENOSYS);
            return;
        }
        let path = match self.table.lock().path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        match self.router.read(oob, &path, fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn write(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let oob = self.out_of_band(req);
        debug!(
            "write ino={} offset={} size={} oob={}",
            ino,
            offset,
            data.len(),
            oob
        );

        if !registered(self.caps, oob, FsOp::Write) {
            reply.error(libc::ENOSYS);
            return;
        }
        let path = match self.table.lock().path_of(ino) {
            Some(p) => p,
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        match self.router.write(oob, &path, fh, offset, data) {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn release(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let oob = self.out_of_band(req);
        debug!("release ino={} fh={} oob={}", ino, fh, oob);

        if !registered(self.caps, oob, FsOp::Release) {
            // Releasing a handle nobody tracks is not an error.
            reply.ok();
            return;
        }
        let path = match self.table.lock().path_of(ino) {
            Some(p) => p,
            None => {
                reply.ok();
                return;
            }
        };
        match self.router.release(oob, &path, fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let oob = self.out_of_band(req);
        debug!("readdir ino={} offset={} oob={}", ino, offset, oob);

        if !registered(self.caps, oob, FsOp::Readdir) {
            reply.error(libc::ENOSYS);
            return;
        }
        let mut table = self.table.lock();
        let (path, parent) = match table.get(ino) {
            Some(entry) => match table.path_of(ino) {
                Some(p) => (p, entry.parent),
                None => {
                    reply.error(libc::ENOENT);
                    return;
                }
            },
            None => {
                reply.error(libc::ENOENT);
                return;
            }
        };
        let entries = match self.router.readdir(oob, &path) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };

        let mut off = offset;
        if offset == 0 {
            if reply.add(ino, 1, FuserFileType::Directory, ".") {
                return;
            }
            off = 1;
        }
        if offset <= 1 {
            if reply.add(parent, 2, FuserFileType::Directory, "..") {
                return;
            }
            off = 2;
        }
        for (index, entry) in entries.iter().enumerate() {
            let entry_offset = index as i64 + 3;
            if entry_offset <= off {
                continue;
            }
            let child_ino = match table.lookup_child(ino, &entry.name) {
                Some(child) => child,
                None => match table.alloc(ino, &entry.name, entry.kind) {
                    Some(child) => child,
                    None => continue,
                },
            };
            if reply.add(child_ino, entry_offset, kind_to_fuser(entry.kind), &entry.name) {
                return;
            }
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        debug!("statfs");
        reply.statfs(0, 0, 0, 0, 0, 4096, 255, 4096);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oobfs_core::testing::MockFilesystem;
    use oobfs_core::AuditLog;

    fn make_host(caps: CapabilitySet) -> HostFilesystem<MockFilesystem> {
        let router = OobRouter::with_audit(
            MockFilesystem::with_capabilities(caps),
            AuditLog::with_sink(Box::new(std::io::sink())),
        );
        HostFilesystem::new(router, Arc::new(OobRegistry::new()))
    }

    #[test]
    fn test_join_path_at_root_and_below() {
        assert_eq!(join_path("/", "a"), "/a");
        assert_eq!(join_path("/a", "b"), "/a/b");
    }

    #[test]
    fn test_intercepted_ops_always_registered_for_oob() {
        let caps = CapabilitySet::empty();
        for op in [
            FsOp::Getattr,
            FsOp::Create,
            FsOp::Mkdir,
            FsOp::Unlink,
            FsOp::Rmdir,
            FsOp::Rename,
            FsOp::Link,
        ] {
            assert!(registered(caps, true, op));
            assert!(!registered(caps, false, op));
        }
    }

    #[test]
    fn test_pass_through_ops_gated_by_capability_even_when_oob() {
        let caps = CapabilitySet::empty();
        for op in [FsOp::Open, FsOp::Read, FsOp::Write, FsOp::Release, FsOp::Readdir] {
            assert!(!registered(caps, true, op));
            assert!(!registered(caps, false, op));
        }
        let caps = CapabilitySet::empty().with(FsOp::Open);
        assert!(registered(caps, true, FsOp::Open));
        assert!(registered(caps, false, FsOp::Open));
    }

    #[test]
    fn test_capability_snapshot_taken_at_construction() {
        let host = make_host(CapabilitySet::empty().with(FsOp::Mkdir));
        assert!(host.caps.supports(FsOp::Mkdir));
        assert!(!host.caps.supports(FsOp::Rmdir));
    }

    #[test]
    fn test_attr_after_mutation_prefers_router_answer() {
        let host = make_host(CapabilitySet::all());
        // Shadow namespace path: established out-of-band, synthesized attr.
        host.router.mkdir(true, "/d", 0o755).unwrap();
        let attr = host
            .attr_after_mutation(true, "/d", FileKind::Directory, 0o755)
            .unwrap();
        assert_eq!(attr.perm, 0o777);
        assert!(attr.is_directory());
    }

    #[test]
    fn test_attr_after_mutation_falls_back_to_mode_without_getattr() {
        let host = make_host(CapabilitySet::empty().with(FsOp::Mkdir));
        let attr = host
            .attr_after_mutation(false, "/d", FileKind::Directory, 0o750)
            .unwrap();
        assert_eq!(attr.perm, 0o750);
        assert!(attr.is_directory());
    }
}
