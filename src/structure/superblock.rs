use crate::consts::{
    BlockPointer, BLOCK_SIZE, FIRST_MAP_INDEX, MAGIC_NUMBER, MAX_N_INODES, MAX_SIZE_SYS_FILES,
    MIN_SIZE_SYS_FILES, SUPERBLOCK_INDEX,
};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::bitmap::Bitmap;
use crate::structure::inode::Inode;
use crate::util::error::{FsError, Result};
use crate::util::serializable::{read_u32, read_u64, ByteSerializable, KnownSize};

/// Partitioning of the device, fixed at format time.
#[derive(Debug, Clone, PartialEq)]
pub struct SuperBlock {
    pub magic: u32,
    pub device_size: u64,
    pub block_size: u32,
    pub block_count: u32,
    pub inode_count: u32,
    pub inode_map_blocks: u32,
    pub block_map_blocks: u32,
    pub inode_table_blocks: u32,
    pub data_block_count: u32,
    pub first_data_block: u32,
}

impl SuperBlock {
    pub fn new(device_size: u64) -> Result<SuperBlock> {
        if !(MIN_SIZE_SYS_FILES..=MAX_SIZE_SYS_FILES).contains(&device_size) {
            return Err(FsError::SizeOutOfRange(device_size));
        }

        let block_count = device_size / BLOCK_SIZE as u64;
        let inode_map_blocks = Bitmap::blocks_for(MAX_N_INODES, BLOCK_SIZE);
        let block_map_blocks = Bitmap::blocks_for(block_count as usize, BLOCK_SIZE);
        let inode_table_blocks =
            ((MAX_N_INODES * Inode::size_on_disk()).div_ceil(BLOCK_SIZE)).max(1) as u64;

        for blocks in [inode_map_blocks, block_map_blocks, inode_table_blocks] {
            if blocks > MAX_N_INODES as u64 {
                return Err(FsError::LayoutOverflow(blocks));
            }
        }

        let first_data_block = FIRST_MAP_INDEX + inode_map_blocks + block_map_blocks + inode_table_blocks;
        if first_data_block >= block_count {
            return Err(FsError::LayoutOverflow(first_data_block));
        }

        Ok(SuperBlock {
            magic: MAGIC_NUMBER,
            device_size,
            block_size: BLOCK_SIZE as u32,
            block_count: block_count as u32,
            inode_count: MAX_N_INODES as u32,
            inode_map_blocks: inode_map_blocks as u32,
            block_map_blocks: block_map_blocks as u32,
            inode_table_blocks: inode_table_blocks as u32,
            data_block_count: (block_count - first_data_block) as u32,
            first_data_block: first_data_block as u32,
        })
    }

    #[inline]
    pub fn inode_map_index(&self) -> BlockPointer {
        FIRST_MAP_INDEX
    }

    #[inline]
    pub fn block_map_index(&self) -> BlockPointer {
        self.inode_map_index() + self.inode_map_blocks as u64
    }

    #[inline]
    pub fn inode_table_index(&self) -> BlockPointer {
        self.block_map_index() + self.block_map_blocks as u64
    }

    pub(crate) fn read<A: DeviceDriver>(io: &IO<A>) -> Result<SuperBlock> {
        let block = io.read_block(SUPERBLOCK_INDEX)?;
        SuperBlock::from_bytes(&block)
    }

    pub(crate) fn write<A: DeviceDriver>(&self, io: &mut IO<A>) -> Result<()> {
        let mut buffer = self.to_bytes();
        buffer.resize(io.block_size, 0);
        io.write_block(SUPERBLOCK_INDEX, &buffer)
    }
}

impl KnownSize for SuperBlock {
    fn size_on_disk() -> usize {
        4 + 8 + 4 * 8
    }
}

impl ByteSerializable for SuperBlock {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(SuperBlock::size_on_disk());
        buffer.extend_from_slice(&self.magic.to_le_bytes());
        buffer.extend_from_slice(&self.device_size.to_le_bytes());
        buffer.extend_from_slice(&self.block_size.to_le_bytes());
        buffer.extend_from_slice(&self.block_count.to_le_bytes());
        buffer.extend_from_slice(&self.inode_count.to_le_bytes());
        buffer.extend_from_slice(&self.inode_map_blocks.to_le_bytes());
        buffer.extend_from_slice(&self.block_map_blocks.to_le_bytes());
        buffer.extend_from_slice(&self.inode_table_blocks.to_le_bytes());
        buffer.extend_from_slice(&self.data_block_count.to_le_bytes());
        buffer.extend_from_slice(&self.first_data_block.to_le_bytes());
        buffer
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SuperBlock::size_on_disk() || read_u32(bytes, 0) != MAGIC_NUMBER {
            return Err(FsError::UnknownFormat);
        }
        let superblock = SuperBlock {
            magic: read_u32(bytes, 0),
            device_size: read_u64(bytes, 4),
            block_size: read_u32(bytes, 12),
            block_count: read_u32(bytes, 16),
            inode_count: read_u32(bytes, 20),
            inode_map_blocks: read_u32(bytes, 24),
            block_map_blocks: read_u32(bytes, 28),
            inode_table_blocks: read_u32(bytes, 32),
            data_block_count: read_u32(bytes, 36),
            first_data_block: read_u32(bytes, 40),
        };
        // every region is derived from the device size, so a record that
        // disagrees with its own recomputation cannot be trusted
        match SuperBlock::new(superblock.device_size) {
            Ok(expected) if expected == superblock => Ok(superblock),
            _ => Err(FsError::UnknownFormat),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SuperBlock;
    use crate::consts::{MAX_SIZE_SYS_FILES, MIN_SIZE_SYS_FILES};
    use crate::util::serializable::ByteSerializable;
    use crate::driver::MemoryDrive;
    use crate::io::IO;
    use crate::util::error::FsError;

    #[test]
    fn layout() {
        let superblock = SuperBlock::new(MAX_SIZE_SYS_FILES).unwrap();
        assert_eq!(superblock.block_count, 300);
        assert_eq!(superblock.inode_map_blocks, 1);
        assert_eq!(superblock.block_map_blocks, 1);
        assert_eq!(superblock.inode_table_blocks, 3);
        assert_eq!(superblock.first_data_block, 7);
        assert_eq!(superblock.data_block_count, 293);
        assert_eq!(superblock.inode_map_index(), 2);
        assert_eq!(superblock.block_map_index(), 3);
        assert_eq!(superblock.inode_table_index(), 4);
        assert_eq!(
            superblock.block_count,
            2 + superblock.inode_map_blocks
                + superblock.block_map_blocks
                + superblock.inode_table_blocks
                + superblock.data_block_count
        );
    }

    #[test]
    fn size_bounds() {
        assert!(SuperBlock::new(MIN_SIZE_SYS_FILES).is_ok());
        assert!(matches!(
            SuperBlock::new(MIN_SIZE_SYS_FILES - 1),
            Err(FsError::SizeOutOfRange(_))
        ));
        assert!(matches!(
            SuperBlock::new(MAX_SIZE_SYS_FILES + 1),
            Err(FsError::SizeOutOfRange(_))
        ));
    }

    #[test]
    fn read_write_superblock() {
        let mut io = IO::new(MemoryDrive::new(MIN_SIZE_SYS_FILES, 512), 2048).unwrap();
        assert!(matches!(SuperBlock::read(&io), Err(FsError::UnknownFormat)));

        let superblock = SuperBlock::new(MIN_SIZE_SYS_FILES).unwrap();
        superblock.write(&mut io).unwrap();
        assert_eq!(superblock, SuperBlock::read(&io).unwrap());
    }

    #[test]
    fn rejects_inconsistent_layout() {
        let good = SuperBlock::new(MAX_SIZE_SYS_FILES).unwrap();
        assert_eq!(SuperBlock::from_bytes(&good.to_bytes()).unwrap(), good);

        let mut damaged = good.clone();
        damaged.first_data_block = 2;
        assert!(matches!(
            SuperBlock::from_bytes(&damaged.to_bytes()),
            Err(FsError::UnknownFormat)
        ));

        let mut damaged = good.clone();
        damaged.data_block_count += 1;
        assert!(matches!(
            SuperBlock::from_bytes(&damaged.to_bytes()),
            Err(FsError::UnknownFormat)
        ));

        let mut damaged = good;
        damaged.device_size = 1;
        assert!(matches!(
            SuperBlock::from_bytes(&damaged.to_bytes()),
            Err(FsError::UnknownFormat)
        ));
    }
}
