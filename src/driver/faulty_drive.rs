use std::io;

use crate::driver::{DeviceDriver, MemoryDrive};

/// `MemoryDrive` that starts failing on command, for exercising I/O error
/// paths.
pub(crate) struct FaultyDrive {
    pub(crate) inner: MemoryDrive,
    /// Sector writes still allowed; `None` means unlimited.
    pub(crate) writes_left: Option<usize>,
    pub(crate) bad_read_sector: Option<u64>,
}

fn injected(what: &str, index: u64) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("injected {} failure at sector {}", what, index))
}

impl FaultyDrive {
    pub(crate) fn new(inner: MemoryDrive) -> FaultyDrive {
        FaultyDrive { inner, writes_left: None, bad_read_sector: None }
    }
}

impl DeviceDriver for FaultyDrive {
    fn get_sector_count(&self) -> u64 {
        self.inner.get_sector_count()
    }

    fn get_sector_size(&self) -> usize {
        self.inner.get_sector_size()
    }

    fn read_sector(&self, index: u64, buffer: &mut [u8]) -> io::Result<()> {
        if self.bad_read_sector == Some(index) {
            return Err(injected("read", index));
        }
        self.inner.read_sector(index, buffer)
    }

    fn write_sector(&mut self, index: u64, data: &[u8]) -> io::Result<()> {
        match self.writes_left {
            Some(0) => return Err(injected("write", index)),
            Some(ref mut left) => *left -= 1,
            None => {}
        }
        self.inner.write_sector(index, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fails_after_budget() {
        let mut drive = FaultyDrive::new(MemoryDrive::new(4 * 512, 512));
        drive.writes_left = Some(1);
        drive.write_sector(0, &[1; 512]).unwrap();
        assert!(drive.write_sector(1, &[1; 512]).is_err());

        drive.bad_read_sector = Some(2);
        let mut buffer = [0u8; 512];
        drive.read_sector(0, &mut buffer).unwrap();
        assert_eq!(buffer, [1; 512]);
        assert!(drive.read_sector(2, &mut buffer).is_err());
    }
}
