use std::io;

use crate::driver::{check_sector, DeviceDriver};

/// In-memory device, mostly useful for tests.
pub struct MemoryDrive {
    data: Vec<u8>,
    sector_size: usize,
}

impl MemoryDrive {
    pub fn new(bytes: u64, sector_size: usize) -> MemoryDrive {
        MemoryDrive { data: vec![0; bytes as usize], sector_size }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Direct access to the backing bytes, bypassing the filesystem.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl DeviceDriver for MemoryDrive {
    fn get_sector_count(&self) -> u64 {
        (self.data.len() / self.sector_size) as u64
    }

    fn get_sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sector(&self, index: u64, buffer: &mut [u8]) -> io::Result<()> {
        check_sector(index, buffer.len(), self.get_sector_count(), self.sector_size)?;
        let offset = index as usize * self.sector_size;
        buffer.copy_from_slice(&self.data[offset..offset + self.sector_size]);
        Ok(())
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        check_sector(index, data.len(), self.get_sector_count(), self.sector_size)?;
        let offset = index as usize * self.sector_size;
        self.data[offset..offset + self.sector_size].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sectors() {
        let mut drive = MemoryDrive::new(8 * 512, 512);
        assert_eq!(drive.get_sector_count(), 8);
        assert_eq!(drive.get_size(), 8 * 512);

        drive.write_sector(3, &[0xab; 512]).unwrap();
        let mut buffer = [0u8; 512];
        drive.read_sector(3, &mut buffer).unwrap();
        assert_eq!(buffer, [0xab; 512]);
        assert_eq!(drive.as_bytes()[3 * 512], 0xab);

        assert!(drive.write_sector(8, &[0; 512]).is_err());
    }
}
