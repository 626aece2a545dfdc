use crate::consts::BlockPointer;
use crate::driver::DeviceDriver;
use crate::io::IO;
use crate::util::error::Result;

/// One bit per inode slot or data block, 1 meaning allocated.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    bits: usize,
    data: Vec<u8>,
}

impl Bitmap {
    pub fn new(bits: usize) -> Bitmap {
        Bitmap { bits, data: vec![0; bits.div_ceil(8)] }
    }

    /// Number of blocks needed to persist `bits` bits.
    pub fn blocks_for(bits: usize, block_size: usize) -> u64 {
        bits.div_ceil(8).div_ceil(block_size).max(1) as u64
    }

    pub fn len(&self) -> usize {
        self.bits
    }

    pub fn get(&self, index: usize) -> bool {
        index < self.bits && self.data[index / 8] & (1 << (index % 8)) != 0
    }

    pub fn set(&mut self, index: usize, value: bool) {
        if index >= self.bits {
            return;
        }
        if value {
            self.data[index / 8] |= 1 << (index % 8);
        } else {
            self.data[index / 8] &= !(1 << (index % 8));
        }
    }

    /// Lowest clear bit, if any.
    pub fn first_free(&self) -> Option<usize> {
        for (byte_index, byte) in self.data.iter().enumerate() {
            if *byte == 0xff {
                continue;
            }
            for j in 0..8 {
                let index = byte_index * 8 + j;
                if index >= self.bits {
                    return None;
                }
                if byte & (1 << j) == 0 {
                    return Some(index);
                }
            }
        }
        None
    }

    /// Takes the lowest clear bit and marks it used.
    pub fn allocate(&mut self) -> Option<usize> {
        let index = self.first_free()?;
        self.set(index, true);
        Some(index)
    }

    pub fn count_free(&self) -> usize {
        (0..self.bits).filter(|i| !self.get(*i)).count()
    }

    pub(crate) fn read<A: DeviceDriver>(io: &IO<A>, first_block: BlockPointer, bits: usize) -> Result<Bitmap> {
        let mut map = Bitmap::new(bits);
        let blocks = Bitmap::blocks_for(bits, io.block_size);
        let mut offset = 0;
        for i in 0..blocks {
            let block = io.read_block(first_block + i)?;
            let limit = (offset + io.block_size).min(map.data.len());
            map.data[offset..limit].copy_from_slice(&block[..limit - offset]);
            offset = limit;
        }
        Ok(map)
    }

    pub(crate) fn write<A: DeviceDriver>(&self, io: &mut IO<A>, first_block: BlockPointer) -> Result<()> {
        let blocks = Bitmap::blocks_for(self.bits, io.block_size);
        for i in 0..blocks as usize {
            let mut block = vec![0u8; io.block_size];
            let offset = (i * io.block_size).min(self.data.len());
            let limit = (offset + io.block_size).min(self.data.len());
            block[..limit - offset].copy_from_slice(&self.data[offset..limit]);
            io.write_block(first_block + i as u64, &block)?;
        }
        Ok(())
    }
}
