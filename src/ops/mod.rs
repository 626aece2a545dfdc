use crate::consts::{InodePointer, ENTRY_DELIMITER, LINK_REGISTRY_NAME, MAX_NAME_LENGTH, NAME_DELIMITER};
use crate::driver::DeviceDriver;
use crate::structure::Structure;
use crate::util::error::{FsError, Result};

pub mod file;
pub mod integrity;
pub mod link;

pub use file::Whence;
pub use integrity::IntegrityStatus;

/// A mounted flat filesystem.
///
/// All state lives here and every call runs to completion; callers that
/// share one instance across threads have to serialize access themselves.
pub struct FlatFS<A: DeviceDriver> {
    pub(crate) structure: Structure<A>,
    mounted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub inode: InodePointer,
    pub name: String,
    pub size: u32,
    pub blocks: usize,
    pub open: bool,
    pub integrity: bool,
}

impl<A: DeviceDriver> FlatFS<A> {
    /// Lays out a fresh filesystem of `device_size` bytes and mounts it.
    pub fn format(device: A, device_size: u64) -> Result<FlatFS<A>> {
        let structure = Structure::format(device, device_size)?;
        Ok(FlatFS { structure, mounted: true })
    }

    pub fn mount(device: A) -> Result<FlatFS<A>> {
        let structure = Structure::mount(device)?;
        Ok(FlatFS { structure, mounted: true })
    }

    /// Flushes everything and detaches. Fails while any file is open.
    pub fn unmount(&mut self) -> Result<()> {
        self.ensure_mounted()?;
        self.structure.unmount()?;
        self.mounted = false;
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.ensure_mounted()?;
        self.structure.sync()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    /// Gives the device back. Unsynced changes are lost unless `unmount` or
    /// `sync` ran first.
    pub fn into_device(self) -> A {
        self.structure.into_device()
    }

    pub fn list(&self) -> Result<Vec<String>> {
        self.ensure_mounted()?;
        Ok(self
            .structure
            .inode_table
            .iter()
            .filter(|(_, inode)| !inode.is_free() && inode.name() != LINK_REGISTRY_NAME.as_bytes())
            .map(|(_, inode)| inode.name_lossy())
            .collect())
    }

    pub fn stat(&self, name: &str) -> Result<FileStat> {
        self.ensure_mounted()?;
        let index = self.lookup_file(name)?;
        self.stat_inode(index)
    }

    pub fn stat_inode(&self, index: InodePointer) -> Result<FileStat> {
        self.ensure_mounted()?;
        let inode = self.structure.inode_table.get(index)?;
        if inode.is_free() || inode.name() == LINK_REGISTRY_NAME.as_bytes() {
            return Err(FsError::NotFound(format!("inode {}", index)));
        }
        Ok(FileStat {
            inode: index,
            name: inode.name_lossy(),
            size: inode.size,
            blocks: inode.used_blocks(),
            open: inode.is_open(),
            integrity: inode.integrity,
        })
    }

    pub fn free_inodes(&self) -> usize {
        self.structure.free_inode_count()
    }

    pub fn free_blocks(&self) -> usize {
        self.structure.free_block_count()
    }

    pub fn get_block_size(&self) -> usize {
        self.structure.get_block_size()
    }

    pub(crate) fn ensure_mounted(&self) -> Result<()> {
        if self.mounted {
            Ok(())
        } else {
            Err(FsError::NotMounted)
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<InodePointer> {
        self.structure
            .inode_table
            .find(name.as_bytes())
            .ok_or_else(|| FsError::NotFound(name.to_string()))
    }

    /// Like `lookup`, but the link registry is not a file callers may touch.
    pub(crate) fn lookup_file(&self, name: &str) -> Result<InodePointer> {
        if name == LINK_REGISTRY_NAME {
            return Err(FsError::InvalidName);
        }
        self.lookup(name)
    }
}

pub(crate) fn validate_name(name: &str) -> Result<&[u8]> {
    let bytes = name.as_bytes();
    if name == LINK_REGISTRY_NAME
        || bytes.is_empty()
        || bytes.contains(&ENTRY_DELIMITER)
        || bytes.contains(&NAME_DELIMITER)
    {
        return Err(FsError::InvalidName);
    }
    if bytes.len() > MAX_NAME_LENGTH {
        return Err(FsError::NameTooLong);
    }
    Ok(bytes)
}
