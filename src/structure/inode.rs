use crate::consts::{DataPointer, DirectPointers, BLOCKS_PER_FILE, BLOCK_SIZE, MAX_NAME_LENGTH};
use crate::util::error::{FsError, Result};
use crate::util::serializable::{read_u32, ByteSerializable, KnownSize};

const NULL_POINTER: u32 = u32::MAX;

const SIZE_OFFSET: usize = 0;
const POS_OFFSET: usize = 4;
const STATE_OFFSET: usize = 8;
const INTEGRITY_OFFSET: usize = 9;
const NAME_LEN_OFFSET: usize = 10;
const CHECKSUM_OFFSET: usize = 12;
const NAME_OFFSET: usize = 16;
const POINTERS_OFFSET: usize = NAME_OFFSET + MAX_NAME_LENGTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileState {
    #[default]
    Closed,
    Open,
}

/// Metadata of one file. A free slot has an empty name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Inode {
    pub size: u32,
    pub pos: u32,
    pub state: FileState,
    pub integrity: bool,
    pub checksum: u32,
    name: [u8; MAX_NAME_LENGTH],
    name_len: u8,
    pub(crate) pointers: DirectPointers,
}

impl Inode {
    pub fn new() -> Inode {
        Inode::default()
    }

    pub fn name(&self) -> &[u8] {
        &self.name[..self.name_len as usize]
    }

    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(self.name()).into_owned()
    }

    pub fn set_name(&mut self, name: &[u8]) -> Result<()> {
        if name.len() > MAX_NAME_LENGTH {
            return Err(FsError::NameTooLong);
        }
        self.name = [0; MAX_NAME_LENGTH];
        self.name[..name.len()].copy_from_slice(name);
        self.name_len = name.len() as u8;
        Ok(())
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.name_len == 0
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.state == FileState::Open
    }

    pub fn pointers(&self) -> &DirectPointers {
        &self.pointers
    }

    pub fn used_blocks(&self) -> usize {
        self.pointers.iter().filter(|p| p.is_some()).count()
    }

    pub fn capacity() -> usize {
        BLOCKS_PER_FILE * BLOCK_SIZE
    }
}

impl KnownSize for Inode {
    #[inline]
    fn size_on_disk() -> usize {
        POINTERS_OFFSET + BLOCKS_PER_FILE * 4
    }
}

impl ByteSerializable for Inode {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; Inode::size_on_disk()];
        bytes[SIZE_OFFSET..SIZE_OFFSET + 4].copy_from_slice(&self.size.to_le_bytes());
        bytes[POS_OFFSET..POS_OFFSET + 4].copy_from_slice(&self.pos.to_le_bytes());
        bytes[STATE_OFFSET] = self.is_open() as u8;
        bytes[INTEGRITY_OFFSET] = self.integrity as u8;
        bytes[NAME_LEN_OFFSET] = self.name_len;
        bytes[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&self.checksum.to_le_bytes());
        bytes[NAME_OFFSET..POINTERS_OFFSET].copy_from_slice(&self.name);
        for (i, pointer) in self.pointers.iter().enumerate() {
            let offset = POINTERS_OFFSET + i * 4;
            let raw: DataPointer = pointer.unwrap_or(NULL_POINTER);
            bytes[offset..offset + 4].copy_from_slice(&raw.to_le_bytes());
        }
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Inode::size_on_disk() {
            return Err(FsError::UnknownFormat);
        }
        let name_len = bytes[NAME_LEN_OFFSET];
        if name_len as usize > MAX_NAME_LENGTH {
            return Err(FsError::UnknownFormat);
        }

        let mut name = [0u8; MAX_NAME_LENGTH];
        name.copy_from_slice(&bytes[NAME_OFFSET..POINTERS_OFFSET]);

        let mut pointers: DirectPointers = [None; BLOCKS_PER_FILE];
        for (i, pointer) in pointers.iter_mut().enumerate() {
            let raw = read_u32(bytes, POINTERS_OFFSET + i * 4);
            *pointer = (raw != NULL_POINTER).then_some(raw);
        }

        Ok(Inode {
            size: read_u32(bytes, SIZE_OFFSET),
            pos: read_u32(bytes, POS_OFFSET),
            state: if bytes[STATE_OFFSET] != 0 { FileState::Open } else { FileState::Closed },
            integrity: bytes[INTEGRITY_OFFSET] != 0,
            checksum: read_u32(bytes, CHECKSUM_OFFSET),
            name,
            name_len,
            pointers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inode_to_bytes() {
        let mut inode = Inode::new();
        inode.set_name(b"notes.txt").unwrap();
        inode.size = 5000;
        inode.pointers[0] = Some(0);
        inode.pointers[1] = Some(7);
        inode.pointers[2] = Some(8);

        let bytes = inode.to_bytes();
        assert_eq!(bytes.len(), Inode::size_on_disk());
        assert_eq!(&bytes[POINTERS_OFFSET + 12..POINTERS_OFFSET + 16], &[0xff; 4]);
    }

    #[test]
    fn test_inode_from_bytes() {
        let mut inode = Inode::new();
        inode.set_name(b"notes.txt").unwrap();
        inode.size = 4100;
        inode.pos = 12;
        inode.state = FileState::Open;
        inode.integrity = true;
        inode.checksum = 0xdead_beef;
        inode.pointers[0] = Some(0);
        inode.pointers[1] = Some(3);
        inode.pointers[2] = Some(4);

        let decoded = Inode::from_bytes(&inode.to_bytes()).unwrap();
        assert_eq!(decoded, inode);
        assert_eq!(decoded.name(), b"notes.txt");
        assert_eq!(decoded.used_blocks(), 3);
    }

    #[test]
    fn name_bounds() {
        let mut inode = Inode::new();
        assert!(inode.is_free());
        inode.set_name(&[b'a'; MAX_NAME_LENGTH]).unwrap();
        assert!(!inode.is_free());
        assert!(matches!(
            inode.set_name(&[b'a'; MAX_NAME_LENGTH + 1]),
            Err(FsError::NameTooLong)
        ));
    }
}
