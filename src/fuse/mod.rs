use std::io;
use std::path::Path;

use fuser::MountOption;
use tracing::info;

use crate::driver::DeviceDriver;
use crate::ops::FlatFS;

pub mod filesystem;

pub use filesystem::FuseDriver;

#[derive(Debug, Clone, Default)]
pub struct MountOptions {
    pub allow_other: bool,
    pub auto_unmount: bool,
}

impl MountOptions {
    fn to_fuse_options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName("flatfs".to_string()),
            MountOption::DefaultPermissions,
            MountOption::NoAtime,
        ];
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        options
    }
}

/// Serves `fs` at `mountpoint` until the kernel unmounts it.
pub fn mount<A: DeviceDriver, P: AsRef<Path>>(fs: FlatFS<A>, mountpoint: P, options: &MountOptions) -> io::Result<()> {
    let mountpoint = mountpoint.as_ref();
    info!(mountpoint = %mountpoint.display(), ?options, "mounting");
    fuser::mount2(FuseDriver::new(fs), mountpoint, &options.to_fuse_options())
}
