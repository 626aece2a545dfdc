use crate::consts::{BlockPointer, InodePointer};
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::structure::inode::{FileState, Inode};
use crate::util::error::{FsError, Result};
use crate::util::serializable::{ByteSerializable, KnownSize};

/// In-memory copy of every inode, mirrored to the table blocks on sync.
pub struct InodeTable {
    inodes: Vec<Inode>,
    table_index: BlockPointer,
    pub(crate) block_count: usize,
}

impl InodeTable {
    pub fn new(table_index: BlockPointer, inode_count: usize, block_size: usize) -> InodeTable {
        InodeTable {
            inodes: vec![Inode::new(); inode_count],
            table_index,
            block_count: Self::blocks_needed(inode_count, block_size),
        }
    }

    pub(crate) fn read<A: DeviceDriver>(io: &IO<A>, table_index: BlockPointer, inode_count: usize) -> Result<InodeTable> {
        let mut table = InodeTable::new(table_index, inode_count, io.block_size);
        let mut raw = Vec::with_capacity(table.block_count * io.block_size);
        for i in 0..table.block_count {
            raw.extend_from_slice(&io.read_block(table_index + i as u64)?);
        }
        for (index, inode) in table.inodes.iter_mut().enumerate() {
            let offset = index * Inode::size_on_disk();
            *inode = Inode::from_bytes(&raw[offset..offset + Inode::size_on_disk()])?;
            // open state never survives a remount
            inode.state = FileState::Closed;
        }
        Ok(table)
    }

    pub(crate) fn write<A: DeviceDriver>(&self, io: &mut IO<A>) -> Result<()> {
        let mut raw = Vec::with_capacity(self.block_count * io.block_size);
        for inode in &self.inodes {
            raw.extend_from_slice(&inode.to_bytes());
        }
        raw.resize(self.block_count * io.block_size, 0);
        for (i, block) in raw.chunks(io.block_size).enumerate() {
            io.write_block(self.table_index + i as u64, block)?;
        }
        Ok(())
    }

    #[inline]
    fn blocks_needed(inode_count: usize, block_size: usize) -> usize {
        (inode_count * Inode::size_on_disk()).div_ceil(block_size).max(1)
    }

    pub fn get(&self, index: InodePointer) -> Result<&Inode> {
        self.inodes.get(index).ok_or(FsError::InvalidIndex(index))
    }

    pub fn get_mut(&mut self, index: InodePointer) -> Result<&mut Inode> {
        self.inodes.get_mut(index).ok_or(FsError::InvalidIndex(index))
    }

    pub fn find(&self, name: &[u8]) -> Option<InodePointer> {
        if name.is_empty() {
            return None;
        }
        self.inodes.iter().position(|inode| inode.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (InodePointer, &Inode)> {
        self.inodes.iter().enumerate()
    }

    pub fn any_open(&self) -> bool {
        self.inodes.iter().any(|inode| inode.is_open())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::MAX_N_INODES;
    use crate::driver::MemoryDrive;

    #[test]
    fn read_write_table() {
        let mut io = IO::new(MemoryDrive::new(64 * 2048, 512), 2048).unwrap();
        let mut table = InodeTable::new(4, MAX_N_INODES, 2048);
        assert_eq!(table.block_count, 3);

        let inode = table.get_mut(47).unwrap();
        inode.set_name(b"last").unwrap();
        inode.size = 10;
        inode.state = FileState::Open;
        table.write(&mut io).unwrap();

        let read = InodeTable::read(&io, 4, MAX_N_INODES).unwrap();
        assert_eq!(read.find(b"last"), Some(47));
        let inode = read.get(47).unwrap();
        assert_eq!(inode.size, 10);
        assert_eq!(inode.state, FileState::Closed);
        assert!(!read.any_open());
    }

    #[test]
    fn lookups() {
        let mut table = InodeTable::new(4, MAX_N_INODES, 2048);
        table.get_mut(3).unwrap().set_name(b"a").unwrap();
        assert_eq!(table.find(b"a"), Some(3));
        assert_eq!(table.find(b"b"), None);
        assert_eq!(table.find(b""), None);
        assert!(matches!(table.get(MAX_N_INODES), Err(FsError::InvalidIndex(48))));
    }
}
