pub mod checksum;
pub mod error;
pub mod format;
pub(crate) mod serializable;
