use tracing::{debug, warn};

use crate::consts::{FileDescriptor, InodePointer, MAX_N_INODES};
use crate::driver::DeviceDriver;
use crate::ops::FlatFS;
use crate::util::checksum::checksum;
use crate::util::error::{FsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityStatus {
    Clean,
    Corrupted,
}

impl<A: DeviceDriver> FlatFS<A> {
    /// Compares the current content of `name` against its stored checksum.
    pub fn check_integrity(&mut self, name: &str) -> Result<IntegrityStatus> {
        self.ensure_mounted()?;
        let index = self.lookup_file(name)?;
        let inode = self.structure.inode_table.get(index)?;
        if !inode.integrity {
            return Err(FsError::IntegrityNotEstablished(name.to_string()));
        }
        let stored = inode.checksum;

        let current = self.content_checksum(index)?;
        if current == stored {
            Ok(IntegrityStatus::Clean)
        } else {
            warn!(file = name, stored, current, "checksum mismatch");
            Ok(IntegrityStatus::Corrupted)
        }
    }

    /// Takes the current content of `name` as its integrity baseline.
    pub fn include_integrity(&mut self, name: &str) -> Result<()> {
        self.ensure_mounted()?;
        let index = self.lookup_file(name)?;
        let sum = self.content_checksum(index)?;

        let inode = self.structure.inode_table.get_mut(index)?;
        inode.checksum = sum;
        inode.integrity = true;
        debug!(file = name, checksum = sum, "stored checksum");
        Ok(())
    }

    /// Opens `name` only if its content still matches the stored checksum.
    pub fn open_integrity(&mut self, name: &str) -> Result<FileDescriptor> {
        match self.check_integrity(name)? {
            IntegrityStatus::Clean => self.open(name),
            IntegrityStatus::Corrupted => Err(FsError::Corrupted(name.to_string())),
        }
    }

    /// Re-certifies the content as the new baseline, then closes.
    pub fn close_integrity(&mut self, fd: FileDescriptor) -> Result<()> {
        self.ensure_mounted()?;
        if fd >= MAX_N_INODES {
            return Err(FsError::InvalidDescriptor(fd));
        }
        let inode = self.structure.inode_table.get(fd)?;
        if inode.is_free() {
            return Err(FsError::NotOpen(fd));
        }
        let name = inode.name_lossy();
        if !inode.integrity {
            return Err(FsError::IntegrityNotEstablished(name));
        }

        self.include_integrity(&name)?;
        self.close(fd)
    }

    /// Checksum over the whole file. Opens the file for the duration if it
    /// was closed, and leaves the seek position untouched.
    fn content_checksum(&mut self, index: InodePointer) -> Result<u32> {
        let opened_here = !self.structure.inode_table.get(index)?.is_open();
        let fd = if opened_here { self.open_index(index)? } else { index };

        let content = self.read_all(fd);
        if opened_here {
            self.close(fd)?;
        }
        Ok(checksum(&content?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::BLOCK_SIZE;
    use crate::ops::tests::new_fs;
    use crate::ops::Whence;

    fn corrupt_first_block(fs: &mut FlatFS<crate::driver::MemoryDrive>, name: &str) {
        let index = fs.lookup(name).unwrap();
        let pointer = fs.structure.inode_table.get(index).unwrap().pointers()[0].unwrap();
        let block = fs.structure.super_block.first_data_block as usize + pointer as usize;
        fs.structure.io.device.as_bytes_mut()[block * BLOCK_SIZE] ^= 0xff;
    }

    fn file_with(fs: &mut FlatFS<crate::driver::MemoryDrive>, name: &str, data: &[u8]) {
        fs.create(name).unwrap();
        let fd = fs.open(name).unwrap();
        fs.write(fd, data).unwrap();
        fs.close(fd).unwrap();
    }

    #[test]
    fn clean_after_include() {
        let mut fs = new_fs();
        file_with(&mut fs, "doc", b"certified content");
        fs.include_integrity("doc").unwrap();
        assert_eq!(fs.check_integrity("doc").unwrap(), IntegrityStatus::Clean);
        assert!(fs.stat("doc").unwrap().integrity);
        assert!(!fs.stat("doc").unwrap().open);
    }

    #[test]
    fn detects_out_of_band_corruption() {
        let mut fs = new_fs();
        file_with(&mut fs, "doc", b"certified content");
        fs.include_integrity("doc").unwrap();
        corrupt_first_block(&mut fs, "doc");
        assert_eq!(fs.check_integrity("doc").unwrap(), IntegrityStatus::Corrupted);
        assert!(matches!(fs.open_integrity("doc"), Err(FsError::Corrupted(_))));
        assert!(!fs.stat("doc").unwrap().open);
    }

    #[test]
    fn check_keeps_open_file_open_and_position() {
        let mut fs = new_fs();
        file_with(&mut fs, "doc", b"0123456789");
        fs.include_integrity("doc").unwrap();

        let fd = fs.open("doc").unwrap();
        fs.seek(fd, 4, Whence::Current).unwrap();
        assert_eq!(fs.check_integrity("doc").unwrap(), IntegrityStatus::Clean);
        assert!(fs.stat("doc").unwrap().open);
        assert_eq!(fs.seek(fd, 0, Whence::Current).unwrap(), 4);
    }

    #[test]
    fn errors() {
        let mut fs = new_fs();
        assert!(matches!(fs.include_integrity("nope"), Err(FsError::NotFound(_))));
        assert!(matches!(fs.check_integrity("nope"), Err(FsError::NotFound(_))));
        assert!(matches!(
            fs.include_integrity(crate::consts::LINK_REGISTRY_NAME),
            Err(FsError::InvalidName)
        ));

        file_with(&mut fs, "plain", b"x");
        assert!(matches!(
            fs.check_integrity("plain"),
            Err(FsError::IntegrityNotEstablished(_))
        ));
        assert!(matches!(
            fs.open_integrity("plain"),
            Err(FsError::IntegrityNotEstablished(_))
        ));
        let fd = fs.open("plain").unwrap();
        assert!(matches!(
            fs.close_integrity(fd),
            Err(FsError::IntegrityNotEstablished(_))
        ));
        assert!(matches!(
            fs.close_integrity(MAX_N_INODES),
            Err(FsError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn close_integrity_recertifies() {
        let mut fs = new_fs();
        file_with(&mut fs, "doc", b"version one");
        fs.include_integrity("doc").unwrap();

        let fd = fs.open_integrity("doc").unwrap();
        fs.seek(fd, 0, Whence::End).unwrap();
        fs.write(fd, b" and two").unwrap();
        fs.close_integrity(fd).unwrap();

        assert!(!fs.stat("doc").unwrap().open);
        assert_eq!(fs.check_integrity("doc").unwrap(), IntegrityStatus::Clean);
        let fd = fs.open_integrity("doc").unwrap();
        assert_eq!(fs.read_all(fd).unwrap(), b"version one and two");
    }

    #[test]
    fn corrupted_content_is_accepted_after_recertify() {
        let mut fs = new_fs();
        file_with(&mut fs, "doc", b"payload");
        fs.include_integrity("doc").unwrap();
        corrupt_first_block(&mut fs, "doc");

        let fd = fs.open("doc").unwrap();
        fs.close_integrity(fd).unwrap();
        assert_eq!(fs.check_integrity("doc").unwrap(), IntegrityStatus::Clean);
    }
}
