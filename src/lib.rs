//! A flat, single-directory filesystem on top of a sector-addressed device,
//! with per-file integrity checksums and a registry of symbolic links.

pub mod consts;
pub mod driver;
pub mod fuse;
pub(crate) mod io;
pub mod ops;
pub mod structure;
pub mod util;

pub use driver::{DeviceDriver, FileDrive, MemoryDrive};
pub use ops::{FileStat, FlatFS, IntegrityStatus, Whence};
pub use util::error::{FsError, Result};
