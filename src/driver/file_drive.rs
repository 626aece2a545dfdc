use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use tracing::debug;

use crate::driver::{check_sector, DeviceDriver};

/// Disk image stored in a regular file.
pub struct FileDrive {
    file: File,
    bytes: u64,
    sector_size: usize,
}

impl FileDrive {
    /// Creates a new zero-filled image. Fails if the file already exists.
    pub fn create<P: AsRef<Path>>(path: P, bytes: u64, sector_size: usize) -> io::Result<FileDrive> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path.as_ref())?;
        file.set_len(bytes)?;
        debug!(path = %path.as_ref().display(), bytes, sector_size, "created disk image");
        Ok(FileDrive { file, bytes, sector_size })
    }

    pub fn open<P: AsRef<Path>>(path: P, sector_size: usize) -> io::Result<FileDrive> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        let bytes = file.metadata()?.len();
        debug!(path = %path.as_ref().display(), bytes, sector_size, "opened disk image");
        Ok(FileDrive { file, bytes, sector_size })
    }
}

impl DeviceDriver for FileDrive {
    fn get_sector_count(&self) -> u64 {
        self.bytes / self.sector_size as u64
    }

    fn get_sector_size(&self) -> usize {
        self.sector_size
    }

    fn read_sector(&self, index: u64, buffer: &mut [u8]) -> io::Result<()> {
        check_sector(index, buffer.len(), self.get_sector_count(), self.sector_size)?;
        self.file.read_exact_at(buffer, index * self.sector_size as u64)
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        check_sector(index, data.len(), self.get_sector_count(), self.sector_size)?;
        self.file.write_all_at(data, index * self.sector_size as u64)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.sync_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_sectors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drive.img");
        let mut drive = FileDrive::create(&path, 1024 * 512, 512).unwrap();

        let sector0 = vec![0x42; 512];
        let sector1023 = vec![0x52; 512];
        drive.write_sector(0, &sector0).unwrap();
        drive.write_sector(1023, &sector1023).unwrap();

        let mut buffer = vec![0; 512];
        drive.read_sector(0, &mut buffer).unwrap();
        assert_eq!(buffer, sector0);
        drive.read_sector(1023, &mut buffer).unwrap();
        assert_eq!(buffer, sector1023);
        drive.read_sector(2, &mut buffer).unwrap();
        assert_eq!(buffer, vec![0; 512]);

        assert!(drive.read_sector(1024, &mut buffer).is_err());
        assert!(drive.write_sector(0, &[0; 100]).is_err());
    }

    #[test]
    fn reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.img");
        {
            let mut drive = FileDrive::create(&path, 64 * 512, 512).unwrap();
            drive.write_sector(7, &[0x7; 512]).unwrap();
            drive.flush().unwrap();
        }
        let drive = FileDrive::open(&path, 512).unwrap();
        assert_eq!(drive.get_sector_count(), 64);
        let mut buffer = vec![0; 512];
        drive.read_sector(7, &mut buffer).unwrap();
        assert_eq!(buffer, vec![0x7; 512]);

        assert!(FileDrive::create(&path, 512, 512).is_err());
    }
}
