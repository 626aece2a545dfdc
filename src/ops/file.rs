use tracing::{debug, trace};

use crate::consts::{FileDescriptor, InodePointer, MAX_N_INODES, MAX_SIZE_FILE};
use crate::driver::DeviceDriver;
use crate::ops::{validate_name, FlatFS};
use crate::structure::inode::{FileState, Inode};
use crate::util::error::{FsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// Relative to the current position.
    Current,
    End,
    Begin,
}

impl<A: DeviceDriver> FlatFS<A> {
    /// Creates an empty file holding one data block.
    pub fn create(&mut self, name: &str) -> Result<()> {
        self.ensure_mounted()?;
        validate_name(name)?;
        self.create_entry(name)
    }

    /// Creates `name` without the user-facing name checks, so the link
    /// registry can be created through it.
    pub(crate) fn create_entry(&mut self, name: &str) -> Result<()> {
        let bytes = name.as_bytes();
        if self.structure.inode_table.find(bytes).is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }

        let index = self.structure.allocate_inode().map_err(|_| FsError::NoSpace)?;
        let block = match self.structure.allocate_block() {
            Ok(block) => block,
            Err(_) => {
                self.structure.free_inode(index)?;
                return Err(FsError::NoSpace);
            }
        };

        let inode = self.structure.inode_table.get_mut(index)?;
        inode.set_name(bytes)?;
        inode.pointers[0] = Some(block);
        debug!(file = name, inode = index, block, "created file");
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        self.ensure_mounted()?;
        let index = self.lookup_file(name)?;
        if self.structure.inode_table.get(index)?.is_open() {
            return Err(FsError::Busy(name.to_string()));
        }
        self.structure.free_blocks(index)?;
        self.structure.free_inode(index)?;
        debug!(file = name, inode = index, "removed file");
        Ok(())
    }

    /// Opens a closed file at position 0. The descriptor is its inode index.
    pub fn open(&mut self, name: &str) -> Result<FileDescriptor> {
        self.ensure_mounted()?;
        let index = self.lookup_file(name)?;
        self.open_index(index)
    }

    pub(crate) fn open_index(&mut self, index: InodePointer) -> Result<FileDescriptor> {
        let inode = self.structure.inode_table.get_mut(index)?;
        if inode.is_free() {
            return Err(FsError::NotFound(format!("inode {}", index)));
        }
        if inode.is_open() {
            return Err(FsError::AlreadyOpen(inode.name_lossy()));
        }
        inode.state = FileState::Open;
        inode.pos = 0;
        debug!(fd = index, "opened file");
        Ok(index)
    }

    /// Closing an already closed descriptor is not an error.
    pub fn close(&mut self, fd: FileDescriptor) -> Result<()> {
        self.ensure_mounted()?;
        if fd >= MAX_N_INODES {
            return Err(FsError::InvalidDescriptor(fd));
        }
        self.structure.inode_table.get_mut(fd)?.state = FileState::Closed;
        debug!(fd, "closed file");
        Ok(())
    }

    /// Reads up to `buffer.len()` bytes from the current position, never past
    /// the end of the file.
    pub fn read(&mut self, fd: FileDescriptor, buffer: &mut [u8]) -> Result<usize> {
        self.ensure_mounted()?;
        let block_size = self.structure.get_block_size();
        let inode = self.open_inode(fd)?;
        let pos = inode.pos as usize;
        let size = inode.size as usize;
        let pointers = inode.pointers;

        if buffer.is_empty() || pos >= size {
            return Ok(0);
        }
        let end = (pos + buffer.len()).min(size).min(Inode::capacity());

        let mut cursor = pos;
        let mut done = 0;
        while cursor < end {
            let block_index = cursor / block_size;
            let offset = cursor % block_size;
            let chunk = (block_size - offset).min(end - cursor);
            let pointer = pointers[block_index]
                .ok_or_else(|| FsError::Corrupted(format!("fd {} has a hole at block {}", fd, block_index)))?;

            let block = self.structure.read_data(pointer)?;
            buffer[done..done + chunk].copy_from_slice(&block[offset..offset + chunk]);
            trace!(fd, block = pointer, offset, chunk, "read chunk");

            cursor += chunk;
            done += chunk;
        }

        self.structure.inode_table.get_mut(fd)?.pos = end as u32;
        Ok(done)
    }

    /// Writes at the current position, growing the file up to its maximum
    /// size. Data past the maximum is dropped.
    ///
    /// Blocks attached before a failed allocation stay attached; the write
    /// is not rolled back.
    pub fn write(&mut self, fd: FileDescriptor, data: &[u8]) -> Result<usize> {
        self.ensure_mounted()?;
        let block_size = self.structure.get_block_size();
        let pos = self.open_inode(fd)?.pos as usize;

        if data.is_empty() || pos >= MAX_SIZE_FILE {
            return Ok(0);
        }
        let end = (pos + data.len()).min(MAX_SIZE_FILE);
        let first_block = pos / block_size;
        let last_block = (end - 1) / block_size;

        for block_index in first_block..=last_block {
            if self.structure.inode_table.get(fd)?.pointers[block_index].is_some() {
                continue;
            }
            let pointer = self.structure.allocate_block().map_err(|_| FsError::NoSpace)?;
            self.structure.inode_table.get_mut(fd)?.pointers[block_index] = Some(pointer);
            debug!(fd, block_index, block = pointer, "extended file");
        }

        let pointers = self.structure.inode_table.get(fd)?.pointers;
        let mut cursor = pos;
        let mut done = 0;
        while cursor < end {
            let block_index = cursor / block_size;
            let offset = cursor % block_size;
            let chunk = (block_size - offset).min(end - cursor);
            let pointer = pointers[block_index]
                .ok_or_else(|| FsError::Corrupted(format!("fd {} has a hole at block {}", fd, block_index)))?;

            let mut block = self.structure.read_data(pointer)?;
            block[offset..offset + chunk].copy_from_slice(&data[done..done + chunk]);
            self.structure.write_data(pointer, &block)?;
            trace!(fd, block = pointer, offset, chunk, "wrote chunk");

            cursor += chunk;
            done += chunk;
        }

        let inode = self.structure.inode_table.get_mut(fd)?;
        inode.pos = end as u32;
        inode.size = inode.size.max(end as u32);
        Ok(done)
    }

    /// Moves the position of an open file and returns the new position.
    ///
    /// `offset` only applies to [`Whence::Current`]; the other modes jump
    /// straight to the start or the end.
    pub fn seek(&mut self, fd: FileDescriptor, offset: i64, whence: Whence) -> Result<u32> {
        self.ensure_mounted()?;
        if fd >= MAX_N_INODES {
            return Err(FsError::InvalidDescriptor(fd));
        }
        if offset < 0 || offset > MAX_SIZE_FILE as i64 {
            return Err(FsError::InvalidOffset(offset));
        }

        let inode = self.open_inode_mut(fd)?;
        match whence {
            Whence::Current => {
                let target = inode.pos as i64 + offset;
                if target > MAX_SIZE_FILE as i64 || target > inode.size as i64 {
                    return Err(FsError::InvalidOffset(offset));
                }
                inode.pos = target as u32;
            }
            Whence::End => inode.pos = inode.size,
            Whence::Begin => inode.pos = 0,
        }
        Ok(inode.pos)
    }

    /// Shrinks `name` to `len` bytes and releases the blocks past the new
    /// end. Growing a file this way is refused since files have no holes.
    pub fn truncate(&mut self, name: &str, len: u32) -> Result<()> {
        self.ensure_mounted()?;
        let index = self.lookup_file(name)?;
        if len > self.structure.inode_table.get(index)?.size {
            return Err(FsError::InvalidOffset(len as i64));
        }
        self.structure.truncate(index, len)?;
        debug!(file = name, len, "truncated file");
        Ok(())
    }

    /// Reads the whole file from the start without moving its position.
    pub(crate) fn read_all(&mut self, fd: FileDescriptor) -> Result<Vec<u8>> {
        let inode = self.open_inode(fd)?;
        let saved = inode.pos;
        let mut buffer = vec![0u8; inode.size as usize];

        self.seek(fd, 0, Whence::Begin)?;
        let result = self.read(fd, &mut buffer);
        self.open_inode_mut(fd)?.pos = saved;

        let n = result?;
        buffer.truncate(n);
        Ok(buffer)
    }

    /// Replaces the whole content of an open file with `data`.
    pub(crate) fn rewrite(&mut self, fd: FileDescriptor, data: &[u8]) -> Result<()> {
        if data.len() > MAX_SIZE_FILE {
            return Err(FsError::NoSpace);
        }
        self.seek(fd, 0, Whence::Begin)?;
        self.write(fd, data)?;
        self.structure.truncate(fd as InodePointer, data.len() as u32)
    }

    fn open_inode(&self, fd: FileDescriptor) -> Result<&Inode> {
        if fd >= MAX_N_INODES {
            return Err(FsError::InvalidDescriptor(fd));
        }
        let inode = self.structure.inode_table.get(fd)?;
        if !inode.is_open() {
            return Err(FsError::NotOpen(fd));
        }
        Ok(inode)
    }

    fn open_inode_mut(&mut self, fd: FileDescriptor) -> Result<&mut Inode> {
        if fd >= MAX_N_INODES {
            return Err(FsError::InvalidDescriptor(fd));
        }
        let inode = self.structure.inode_table.get_mut(fd)?;
        if !inode.is_open() {
            return Err(FsError::NotOpen(fd));
        }
        Ok(inode)
    }
}
