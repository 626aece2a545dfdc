use std::io;

use crate::consts::BlockPointer;
use crate::driver::DeviceDriver;
use crate::util::error::Result;
use raw::{raw_read_block, raw_write_block};

mod raw;

/// Block store adapter: fixed-size logical blocks on top of a sector device.
pub(crate) struct IO<A: DeviceDriver> {
    pub(crate) device: A,
    pub block_size: usize,
    pub block_count: u64,
}

impl<A: DeviceDriver> IO<A> {
    pub fn new(device: A, block_size: usize) -> Result<IO<A>> {
        let sector_size = device.get_sector_size();
        if sector_size == 0 || block_size < sector_size || block_size % sector_size != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("block size {} is not a multiple of sector size {}", block_size, sector_size),
            )
            .into());
        }
        let block_count = device.get_size() / block_size as u64;
        Ok(IO { device, block_size, block_count })
    }

    pub(crate) fn write_block(&mut self, index: BlockPointer, block: &[u8]) -> Result<()> {
        self.check(index, block.len())?;
        raw_write_block(&mut self.device, self.block_size, block, index)?;
        Ok(())
    }

    pub(crate) fn read_block(&self, index: BlockPointer) -> Result<Vec<u8>> {
        let mut buffer = vec![0; self.block_size];
        self.check(index, buffer.len())?;
        raw_read_block(&self.device, self.block_size, index, &mut buffer)?;
        Ok(buffer)
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        self.device.flush()?;
        Ok(())
    }

    fn check(&self, index: BlockPointer, len: usize) -> Result<()> {
        if len != self.block_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("block size mismatch - expected {}, got {}", self.block_size, len),
            )
            .into());
        }
        if index >= self.block_count {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("block {} out of range ({} blocks)", index, self.block_count),
            )
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::driver::MemoryDrive;
    use crate::util::error::FsError;

    #[test]
    fn read_write() {
        let drive = MemoryDrive::new(1024 * 512, 1024);
        let mut io = super::IO::new(drive, 1024).unwrap();

        let block = vec![42; 1024];
        io.write_block(0, &block).unwrap();
        assert_eq!(io.read_block(0).unwrap(), block);
    }

    #[test]
    fn read_write_large_block() {
        let drive = MemoryDrive::new(1024 * 512, 512);
        let mut io = super::IO::new(drive, 2048).unwrap();
        assert_eq!(io.block_count, 256);

        let block1 = vec![0x42; 2048];
        io.write_block(3, &block1).unwrap();
        assert_eq!(io.read_block(3).unwrap(), block1);

        let block2 = vec![0x1; 2048];
        io.write_block(4, &block2).unwrap();
        assert_eq!(io.read_block(4).unwrap(), block2);

        let block3 = vec![0x8; 2048];
        io.write_block(3, &block3).unwrap();
        assert_eq!(io.read_block(3).unwrap(), block3);
        assert_eq!(io.read_block(4).unwrap(), block2);
    }

    #[test]
    fn rejects_bad_requests() {
        let drive = MemoryDrive::new(8 * 2048, 512);
        let mut io = super::IO::new(drive, 2048).unwrap();
        assert!(matches!(io.read_block(8), Err(FsError::Io(_))));
        assert!(matches!(io.write_block(0, &[0; 10]), Err(FsError::Io(_))));

        let drive = MemoryDrive::new(8 * 2048, 768);
        assert!(super::IO::new(drive, 2048).is_err());
    }
}
