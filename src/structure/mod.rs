use std::io;

use tracing::{debug, info, warn};

use crate::consts::{BlockPointer, DataPointer, InodePointer, BLOCK_SIZE, SUPERBLOCK_INDEX};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::bitmap::Bitmap;
use crate::structure::inode::Inode;
use crate::structure::inode_table::InodeTable;
use crate::structure::superblock::SuperBlock;
use crate::util::error::{FsError, Result};
use crate::util::format::pretty_size_from_bytes;

pub mod bitmap;
pub mod inode;
pub mod inode_table;
pub mod superblock;

/// Everything that is mounted: superblock, both bitmaps and the inode table,
/// plus the device they live on.
pub struct Structure<A: DeviceDriver> {
    pub(crate) io: IO<A>,
    pub(crate) super_block: SuperBlock,
    pub(crate) inode_map: Bitmap,
    pub(crate) block_map: Bitmap,
    pub(crate) inode_table: InodeTable,
}

impl<A: DeviceDriver> Structure<A> {
    pub fn format(device: A, device_size: u64) -> Result<Structure<A>> {
        let super_block = SuperBlock::new(device_size)?;
        let io = IO::new(device, BLOCK_SIZE)?;
        if io.block_count < super_block.block_count as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "device holds {} blocks, layout needs {}",
                    io.block_count, super_block.block_count
                ),
            )
            .into());
        }

        let mut structure = Structure {
            inode_map: Bitmap::new(super_block.inode_count as usize),
            block_map: Bitmap::new(super_block.data_block_count as usize),
            inode_table: InodeTable::new(
                super_block.inode_table_index(),
                super_block.inode_count as usize,
                BLOCK_SIZE,
            ),
            super_block,
            io,
        };
        structure.sync()?;

        info!(
            size = %pretty_size_from_bytes(device_size),
            data_blocks = structure.super_block.data_block_count,
            first_data_block = structure.super_block.first_data_block,
            "formatted filesystem"
        );
        Ok(structure)
    }

    pub fn mount(device: A) -> Result<Structure<A>> {
        let io = IO::new(device, BLOCK_SIZE)?;
        let super_block = SuperBlock::read(&io)?;
        if io.block_count < super_block.block_count as u64 {
            warn!(
                device_blocks = io.block_count,
                recorded_blocks = super_block.block_count,
                "device is smaller than its superblock claims"
            );
            return Err(FsError::UnknownFormat);
        }
        let inode_map = Bitmap::read(&io, super_block.inode_map_index(), super_block.inode_count as usize)?;
        let block_map = Bitmap::read(&io, super_block.block_map_index(), super_block.data_block_count as usize)?;
        let inode_table = InodeTable::read(&io, super_block.inode_table_index(), super_block.inode_count as usize)?;

        info!(
            size = %pretty_size_from_bytes(super_block.device_size),
            free_inodes = inode_map.count_free(),
            free_blocks = block_map.count_free(),
            "mounted filesystem"
        );
        Ok(Structure { io, super_block, inode_map, block_map, inode_table })
    }

    pub fn unmount(&mut self) -> Result<()> {
        if self.inode_table.any_open() {
            warn!("unmount refused, files are still open");
            return Err(FsError::FilesOpen);
        }
        self.sync()?;
        info!("unmounted filesystem");
        Ok(())
    }

    /// Writes superblock, inode bitmap, data bitmap and inode table, in that
    /// order. A failure part way leaves the earlier regions written.
    pub fn sync(&mut self) -> Result<()> {
        self.super_block.write(&mut self.io)?;
        self.inode_map.write(&mut self.io, self.super_block.inode_map_index())?;
        self.block_map.write(&mut self.io, self.super_block.block_map_index())?;
        self.inode_table.write(&mut self.io)?;
        self.io.flush()?;
        debug!(superblock = SUPERBLOCK_INDEX, "synced metadata");
        Ok(())
    }

    pub fn allocate_inode(&mut self) -> Result<InodePointer> {
        let index = self.inode_map.allocate().ok_or(FsError::NoFreeInodes)?;
        *self.inode_table.get_mut(index)? = Inode::new();
        debug!(inode = index, "allocated inode");
        Ok(index)
    }

    pub fn free_inode(&mut self, index: InodePointer) -> Result<()> {
        if index >= self.inode_map.len() {
            return Err(FsError::InvalidIndex(index));
        }
        *self.inode_table.get_mut(index)? = Inode::new();
        self.inode_map.set(index, false);
        debug!(inode = index, "freed inode");
        Ok(())
    }

    pub fn allocate_block(&mut self) -> Result<DataPointer> {
        let index = self.block_map.allocate().ok_or(FsError::NoFreeBlocks)?;
        let pointer = index as DataPointer;
        let zeroes = vec![0u8; self.io.block_size];
        if let Err(err) = self.write_data(pointer, &zeroes) {
            self.block_map.set(index, false);
            return Err(err);
        }
        debug!(block = pointer, "allocated data block");
        Ok(pointer)
    }

    /// Releases every data block referenced by the inode.
    pub fn free_blocks(&mut self, index: InodePointer) -> Result<()> {
        let data_blocks = self.super_block.data_block_count;
        let inode = self.inode_table.get_mut(index)?;
        if let Some(bad) = inode.pointers.iter().flatten().find(|p| **p >= data_blocks) {
            return Err(FsError::InvalidBlockRef(*bad));
        }
        for slot in inode.pointers.iter_mut() {
            if let Some(pointer) = slot.take() {
                self.block_map.set(pointer as usize, false);
                debug!(inode = index, block = pointer, "freed data block");
            }
        }
        Ok(())
    }

    /// Shrinks a file to `len` bytes, releasing blocks past the new end.
    /// The first block stays attached.
    pub fn truncate(&mut self, index: InodePointer, len: u32) -> Result<()> {
        let block_size = self.io.block_size;
        let inode = self.inode_table.get_mut(index)?;
        if len >= inode.size {
            return Ok(());
        }
        inode.size = len;
        inode.pos = inode.pos.min(len);

        let keep = (len as usize).div_ceil(block_size).max(1);
        for slot in inode.pointers.iter_mut().skip(keep) {
            if let Some(pointer) = slot.take() {
                self.block_map.set(pointer as usize, false);
                debug!(inode = index, block = pointer, "released block on truncate");
            }
        }
        Ok(())
    }

    pub(crate) fn read_data(&self, pointer: DataPointer) -> Result<Vec<u8>> {
        let block = self.data_block(pointer)?;
        self.io.read_block(block)
    }

    pub(crate) fn write_data(&mut self, pointer: DataPointer, data: &[u8]) -> Result<()> {
        let block = self.data_block(pointer)?;
        self.io.write_block(block, data)
    }

    #[inline]
    fn data_block(&self, pointer: DataPointer) -> Result<BlockPointer> {
        if pointer >= self.super_block.data_block_count {
            return Err(FsError::InvalidBlockRef(pointer));
        }
        Ok(self.super_block.first_data_block as u64 + pointer as u64)
    }

    pub fn get_block_size(&self) -> usize {
        self.io.block_size
    }

    pub fn free_inode_count(&self) -> usize {
        self.inode_map.count_free()
    }

    pub fn free_block_count(&self) -> usize {
        self.block_map.count_free()
    }

    pub(crate) fn into_device(self) -> A {
        self.io.device
    }
}
