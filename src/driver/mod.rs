use std::io;

#[cfg(test)]
pub(crate) mod faulty_drive;
pub mod file_drive;
pub mod memory_drive;

pub use file_drive::FileDrive;
pub use memory_drive::MemoryDrive;

/// Sector-addressed backing device.
pub trait DeviceDriver {
    fn get_sector_count(&self) -> u64;
    fn get_sector_size(&self) -> usize;
    fn read_sector(&self, index: u64, buffer: &mut [u8]) -> io::Result<()>;
    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn get_size(&self) -> u64 {
        self.get_sector_count() * self.get_sector_size() as u64
    }
}

pub(crate) fn check_sector(index: u64, len: usize, sector_count: u64, sector_size: usize) -> io::Result<()> {
    if len != sector_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("sector size mismatch - expected {}, got {}", sector_size, len),
        ));
    }
    if index >= sector_count {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("sector {} out of range ({} sectors)", index, sector_count),
        ));
    }
    Ok(())
}
