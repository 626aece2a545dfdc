use std::os::raw::c_int;

use thiserror::Error;

type ErrorNum = c_int;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("device size {0} is outside the supported range")]
    SizeOutOfRange(u64),

    #[error("layout needs {0} blocks for a single region")]
    LayoutOverflow(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no flatfs superblock found")]
    UnknownFormat,

    #[error("filesystem is not mounted")]
    NotMounted,

    #[error("files are still open")]
    FilesOpen,

    #[error("no free inodes")]
    NoFreeInodes,

    #[error("no free data blocks")]
    NoFreeBlocks,

    #[error("no space left on device")]
    NoSpace,

    #[error("inode index {0} out of range")]
    InvalidIndex(usize),

    #[error("invalid file descriptor {0}")]
    InvalidDescriptor(usize),

    #[error("inode references block {0} outside the data region")]
    InvalidBlockRef(u32),

    #[error("name too long")]
    NameTooLong,

    #[error("invalid name")]
    InvalidName,

    #[error("file exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("file is busy: {0}")]
    Busy(String),

    #[error("file is already open: {0}")]
    AlreadyOpen(String),

    #[error("file descriptor {0} is not open")]
    NotOpen(usize),

    #[error("invalid offset {0}")]
    InvalidOffset(i64),

    #[error("file is corrupted: {0}")]
    Corrupted(String),

    #[error("integrity was never established for {0}")]
    IntegrityNotEstablished(String),
}

impl FsError {
    /// Errno used when replying to the kernel.
    pub fn to_errno(&self) -> ErrorNum {
        match self {
            Self::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
            Self::UnknownFormat | Self::Corrupted(_) => libc::EIO,
            Self::SizeOutOfRange(_)
            | Self::LayoutOverflow(_)
            | Self::InvalidIndex(_)
            | Self::InvalidBlockRef(_)
            | Self::InvalidName
            | Self::InvalidOffset(_)
            | Self::IntegrityNotEstablished(_) => libc::EINVAL,
            Self::NotMounted => libc::ENODEV,
            Self::FilesOpen | Self::Busy(_) | Self::AlreadyOpen(_) => libc::EBUSY,
            Self::NoFreeInodes | Self::NoFreeBlocks | Self::NoSpace => libc::ENOSPC,
            Self::InvalidDescriptor(_) | Self::NotOpen(_) => libc::EBADF,
            Self::NameTooLong => libc::ENAMETOOLONG,
            Self::AlreadyExists(_) => libc::EEXIST,
            Self::NotFound(_) => libc::ENOENT,
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
