pub const MAGIC_NUMBER: u32 = 0x464c_4154;

pub const BLOCK_SIZE: usize = 2048;
pub const MAX_N_INODES: usize = 48;
pub const BLOCKS_PER_FILE: usize = 10;
pub const MAX_SIZE_FILE: usize = BLOCKS_PER_FILE * BLOCK_SIZE;
pub const MAX_NAME_LENGTH: usize = 32;

pub const MIN_SIZE_SYS_FILES: u64 = 460 * 1024;
pub const MAX_SIZE_SYS_FILES: u64 = 600 * 1024;

// block 0 is never touched, block 1 holds the superblock
pub(crate) const SUPERBLOCK_INDEX: BlockPointer = 1;
pub(crate) const FIRST_MAP_INDEX: BlockPointer = 2;

pub(crate) const LINK_REGISTRY_NAME: &str = ".flatfs-links";
pub(crate) const ENTRY_DELIMITER: u8 = 0x1e;
pub(crate) const NAME_DELIMITER: u8 = 0x1f;

/// Absolute block number on the device.
pub type BlockPointer = u64;
/// Index into the data region, as stored in an inode.
pub type DataPointer = u32;
pub type InodePointer = usize;
pub type FileDescriptor = usize;
pub type DirectPointers = [Option<DataPointer>; BLOCKS_PER_FILE];
