use std::io;

use tracing::trace;

use crate::consts::BlockPointer;
use crate::driver::DeviceDriver;

pub(crate) fn raw_write_block<A: DeviceDriver>(drive: &mut A, block_size: usize, data: &[u8], index: BlockPointer) -> io::Result<()> {
    let sector_size = drive.get_sector_size();
    if block_size == sector_size {
        return drive.write_sector(index, data);
    }

    let ratio = (block_size / sector_size) as u64;
    let start = index * ratio;
    for (i, chunk) in data.chunks(sector_size).enumerate() {
        trace!(block = index, sector = start + i as u64, "writing sector");
        drive.write_sector(start + i as u64, chunk)?;
    }
    Ok(())
}

pub(crate) fn raw_read_block<A: DeviceDriver>(drive: &A, block_size: usize, index: BlockPointer, buffer: &mut [u8]) -> io::Result<()> {
    let sector_size = drive.get_sector_size();
    if block_size == sector_size {
        return drive.read_sector(index, buffer);
    }

    let ratio = (block_size / sector_size) as u64;
    let start = index * ratio;
    for (i, chunk) in buffer.chunks_mut(sector_size).enumerate() {
        trace!(block = index, sector = start + i as u64, "reading sector");
        drive.read_sector(start + i as u64, chunk)?;
    }
    Ok(())
}
