use std::ffi::OsStr;
use std::os::raw::c_int;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use tracing::{trace, warn};

use crate::consts::{FileDescriptor, InodePointer};
use crate::driver::DeviceDriver;
use crate::ops::{FileStat, FlatFS, Whence};
use crate::util::error::{FsError, Result};

const TTL: Duration = Duration::from_secs(1);
const ROOT_INO: u64 = 1;
// inode 0 becomes ino 2, the root takes 1
const INO_OFFSET: u64 = 2;

/// Exposes the flat namespace as the single root directory of a FUSE mount.
pub struct FuseDriver<A: DeviceDriver> {
    fs: FlatFS<A>,
    uid: u32,
    gid: u32,
    mounted_at: SystemTime,
}

fn reply_errno(operation: &'static str, ino: u64, error: &FsError) -> c_int {
    let errno = error.to_errno();
    if errno == libc::ENOENT {
        trace!(op = operation, ino, errno, %error, "FUSE op returned ENOENT");
    } else {
        warn!(op = operation, ino, errno, %error, "FUSE op failed");
    }
    errno
}

fn to_inode(ino: u64) -> Option<InodePointer> {
    ino.checked_sub(INO_OFFSET).map(|index| index as InodePointer)
}

impl<A: DeviceDriver> FuseDriver<A> {
    pub fn new(fs: FlatFS<A>) -> FuseDriver<A> {
        FuseDriver { fs, uid: 0, gid: 0, mounted_at: SystemTime::now() }
    }

    fn root_attr(&self) -> FileAttr {
        FileAttr {
            ino: ROOT_INO,
            size: 0,
            blocks: 0,
            atime: self.mounted_at,
            mtime: self.mounted_at,
            ctime: self.mounted_at,
            crtime: self.mounted_at,
            kind: FileType::Directory,
            perm: 0o755,
            nlink: 2,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            flags: 0,
            blksize: self.fs.get_block_size() as u32,
        }
    }

    fn stat_to_fileattr(&self, stat: &FileStat) -> FileAttr {
        let block_size = self.fs.get_block_size() as u64;
        FileAttr {
            ino: stat.inode as u64 + INO_OFFSET,
            size: stat.size as u64,
            blocks: stat.blocks as u64 * block_size / 512,
            atime: self.mounted_at,
            mtime: self.mounted_at,
            ctime: self.mounted_at,
            crtime: self.mounted_at,
            kind: FileType::RegularFile,
            perm: 0o644,
            nlink: 1,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            flags: 0,
            blksize: block_size as u32,
        }
    }

    fn lookup_name(&self, parent: u64, name: &OsStr) -> Result<FileStat> {
        let name = name.to_str().ok_or(FsError::InvalidName)?;
        if parent != ROOT_INO {
            return Err(FsError::NotFound(name.to_string()));
        }
        self.fs.stat(name)
    }

    fn stat_ino(&self, ino: u64) -> Result<FileStat> {
        let index = to_inode(ino).ok_or_else(|| FsError::NotFound(format!("ino {}", ino)))?;
        self.fs.stat_inode(index)
    }

    /// Positions `fd` at an absolute offset, which may not lie past the end.
    fn seek_to(&mut self, fd: FileDescriptor, offset: i64) -> Result<()> {
        self.fs.seek(fd, 0, Whence::Begin)?;
        self.fs.seek(fd, offset, Whence::Current)?;
        Ok(())
    }

    fn read_at(&mut self, fd: FileDescriptor, offset: i64, size: u32) -> Result<Vec<u8>> {
        let file_size = self.fs.stat_inode(fd)?.size as i64;
        if offset >= file_size {
            return Ok(Vec::new());
        }
        self.seek_to(fd, offset)?;
        let mut buffer = vec![0u8; size as usize];
        let n = self.fs.read(fd, &mut buffer)?;
        buffer.truncate(n);
        Ok(buffer)
    }

    fn write_at(&mut self, fd: FileDescriptor, offset: i64, data: &[u8]) -> Result<usize> {
        self.seek_to(fd, offset)?;
        self.fs.write(fd, data)
    }

    fn create_file(&mut self, parent: u64, name: &OsStr) -> Result<(FileStat, FileDescriptor)> {
        let name = name.to_str().ok_or(FsError::InvalidName)?;
        if parent != ROOT_INO {
            return Err(FsError::NotFound(name.to_string()));
        }
        self.fs.create(name)?;
        let fd = self.fs.open(name)?;
        Ok((self.fs.stat(name)?, fd))
    }

    /// Only the size can change, and only downwards. Other attributes are
    /// fixed and silently kept.
    fn set_size(&mut self, ino: u64, size: Option<u64>) -> Result<FileStat> {
        let stat = self.stat_ino(ino)?;
        match size {
            Some(size) => {
                let len = u32::try_from(size).unwrap_or(u32::MAX);
                self.fs.truncate(&stat.name, len)?;
                self.stat_ino(ino)
            }
            None => Ok(stat),
        }
    }

    fn unlink_file(&mut self, parent: u64, name: &OsStr) -> Result<()> {
        let name = name.to_str().ok_or(FsError::InvalidName)?;
        if parent != ROOT_INO {
            return Err(FsError::NotFound(name.to_string()));
        }
        self.fs.remove(name)
    }
}

impl<A: DeviceDriver> Filesystem for FuseDriver<A> {
    fn init(&mut self, req: &Request<'_>, _config: &mut KernelConfig) -> std::result::Result<(), c_int> {
        self.uid = req.uid();
        self.gid = req.gid();
        Ok(())
    }

    fn destroy(&mut self) {
        if let Err(error) = self.fs.unmount() {
            warn!(%error, "unmount on destroy failed, syncing instead");
            if let Err(error) = self.fs.sync() {
                warn!(%error, "sync on destroy failed");
            }
        }
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.lookup_name(parent, name) {
            Ok(stat) => reply.entry(&TTL, &self.stat_to_fileattr(&stat), 0),
            Err(error) => reply.error(reply_errno("lookup", parent, &error)),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        if ino == ROOT_INO {
            reply.attr(&TTL, &self.root_attr());
            return;
        }
        match self.stat_ino(ino) {
            Ok(stat) => reply.attr(&TTL, &self.stat_to_fileattr(&stat)),
            Err(error) => reply.error(reply_errno("getattr", ino, &error)),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        if ino == ROOT_INO {
            reply.attr(&TTL, &self.root_attr());
            return;
        }
        match self.set_size(ino, size) {
            Ok(stat) => reply.attr(&TTL, &self.stat_to_fileattr(&stat)),
            Err(error) => reply.error(reply_errno("setattr", ino, &error)),
        }
    }

    fn readdir(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        if ino != ROOT_INO {
            reply.error(libc::ENOTDIR);
            return;
        }
        let names = match self.fs.list() {
            Ok(names) => names,
            Err(error) => {
                reply.error(reply_errno("readdir", ino, &error));
                return;
            }
        };

        let mut entries = vec![
            (ROOT_INO, FileType::Directory, ".".to_string()),
            (ROOT_INO, FileType::Directory, "..".to_string()),
        ];
        for name in names {
            if let Ok(stat) = self.fs.stat(&name) {
                entries.push((stat.inode as u64 + INO_OFFSET, FileType::RegularFile, name));
            }
        }

        for (i, (entry_ino, kind, name)) in entries.into_iter().enumerate().skip(offset.max(0) as usize) {
            if reply.add(entry_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        match self.create_file(parent, name) {
            Ok((stat, fd)) => reply.created(&TTL, &self.stat_to_fileattr(&stat), 0, fd as u64, 0),
            Err(error) => reply.error(reply_errno("create", parent, &error)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match self.unlink_file(parent, name) {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(reply_errno("unlink", parent, &error)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let opened = self.stat_ino(ino).and_then(|stat| self.fs.open(&stat.name));
        match opened {
            Ok(fd) => reply.opened(fd as u64, 0),
            Err(error) => reply.error(reply_errno("open", ino, &error)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.fs.close(fh as FileDescriptor) {
            Ok(()) => reply.ok(),
            Err(error) => reply.error(reply_errno("release", ino, &error)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.read_at(fh as FileDescriptor, offset, size) {
            Ok(data) => reply.data(&data),
            Err(error) => reply.error(reply_errno("read", ino, &error)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.write_at(fh as FileDescriptor, offset, data) {
            Ok(written) => reply.written(written as u32),
            Err(error) => reply.error(reply_errno("write", ino, &error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::MIN_SIZE_SYS_FILES;
    use crate::driver::MemoryDrive;

    fn driver() -> FuseDriver<MemoryDrive> {
        let fs = FlatFS::format(MemoryDrive::new(MIN_SIZE_SYS_FILES, 512), MIN_SIZE_SYS_FILES).unwrap();
        FuseDriver::new(fs)
    }

    #[test]
    fn create_write_read_at_offsets() {
        let mut driver = driver();
        let (stat, fd) = driver.create_file(ROOT_INO, OsStr::new("f")).unwrap();
        assert_eq!(driver.stat_to_fileattr(&stat).ino, INO_OFFSET);

        assert_eq!(driver.write_at(fd, 0, b"hello world").unwrap(), 11);
        assert_eq!(driver.write_at(fd, 6, b"there").unwrap(), 5);
        assert_eq!(driver.read_at(fd, 0, 64).unwrap(), b"hello there");
        assert_eq!(driver.read_at(fd, 6, 3).unwrap(), b"the");
        assert!(driver.read_at(fd, 100, 4).unwrap().is_empty());
        assert!(matches!(
            driver.write_at(fd, 100, b"x"),
            Err(FsError::InvalidOffset(_))
        ));
    }

    #[test]
    fn lookup_and_unlink() {
        let mut driver = driver();
        let (_, fd) = driver.create_file(ROOT_INO, OsStr::new("f")).unwrap();
        assert!(driver.lookup_name(ROOT_INO, OsStr::new("f")).is_ok());
        assert!(matches!(
            driver.lookup_name(ROOT_INO + 5, OsStr::new("f")),
            Err(FsError::NotFound(_))
        ));
        assert!(matches!(
            driver.unlink_file(ROOT_INO, OsStr::new("f")),
            Err(FsError::Busy(_))
        ));
        driver.fs.close(fd).unwrap();
        driver.unlink_file(ROOT_INO, OsStr::new("f")).unwrap();
        assert!(matches!(driver.stat_ino(INO_OFFSET), Err(FsError::NotFound(_))));
        assert!(matches!(driver.stat_ino(0), Err(FsError::NotFound(_))));
    }

    #[test]
    fn truncate_on_open_with_trunc() {
        let mut driver = driver();
        let (stat, fd) = driver.create_file(ROOT_INO, OsStr::new("f")).unwrap();
        let ino = stat.inode as u64 + INO_OFFSET;
        driver.write_at(fd, 0, &[7u8; 3000]).unwrap();

        assert_eq!(driver.set_size(ino, None).unwrap().size, 3000);
        let stat = driver.set_size(ino, Some(0)).unwrap();
        assert_eq!(stat.size, 0);
        assert_eq!(stat.blocks, 1);
        assert_eq!(driver.write_at(fd, 0, b"x").unwrap(), 1);
        assert_eq!(driver.read_at(fd, 0, 16).unwrap(), b"x");

        assert!(matches!(driver.set_size(ino, Some(10)), Err(FsError::InvalidOffset(_))));
        assert!(matches!(
            driver.set_size(ino, Some(u64::MAX)),
            Err(FsError::InvalidOffset(_))
        ));
    }

    #[test]
    fn link_registry_stays_hidden() {
        let mut driver = driver();
        driver.create_file(ROOT_INO, OsStr::new("a")).unwrap();
        driver.fs.create_link("a", "alias").unwrap();
        let registry = OsStr::new(crate::consts::LINK_REGISTRY_NAME);

        assert!(matches!(driver.lookup_name(ROOT_INO, registry), Err(FsError::InvalidName)));
        assert!(matches!(driver.unlink_file(ROOT_INO, registry), Err(FsError::InvalidName)));
        assert!(matches!(driver.create_file(ROOT_INO, registry), Err(FsError::InvalidName)));
        // the registry took the inode right after "a"
        assert!(matches!(driver.stat_ino(INO_OFFSET + 1), Err(FsError::NotFound(_))));
        assert_eq!(driver.fs.resolve_link("alias").unwrap(), "a");
    }
}
