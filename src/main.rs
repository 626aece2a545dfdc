use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use tracing_subscriber::EnvFilter;

use flatfs::fuse::{self, MountOptions};
use flatfs::util::format::pretty_size_from_bytes;
use flatfs::{FileDrive, FlatFS};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(error) = run() {
        eprintln!("error: {:#}", error);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let image = Arg::with_name("image").required(true).help("Path of the disk image");
    let sector_size = Arg::with_name("sector-size")
        .long("sector-size")
        .takes_value(true)
        .default_value("512")
        .help("Sector size of the image in bytes");

    let matches = App::new("flatfs")
        .about("Flat filesystem with integrity checksums and symbolic links")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("format")
                .about("Create and format a new disk image")
                .arg(image.clone().index(1))
                .arg(
                    Arg::with_name("size")
                        .long("size")
                        .takes_value(true)
                        .default_value("614400")
                        .help("Image size in bytes"),
                )
                .arg(sector_size.clone()),
        )
        .subcommand(
            SubCommand::with_name("inspect")
                .about("Print files, links and free space of an image")
                .arg(image.clone().index(1))
                .arg(sector_size.clone()),
        )
        .subcommand(
            SubCommand::with_name("mount")
                .about("Serve an image through FUSE")
                .arg(image.index(1))
                .arg(Arg::with_name("mountpoint").required(true).index(2))
                .arg(sector_size)
                .arg(Arg::with_name("allow-other").long("allow-other"))
                .arg(Arg::with_name("auto-unmount").long("auto-unmount")),
        )
        .get_matches();

    match matches.subcommand() {
        ("format", Some(args)) => format_cmd(args),
        ("inspect", Some(args)) => inspect_cmd(args),
        ("mount", Some(args)) => mount_cmd(args),
        (other, _) => bail!("unknown command: {}", other),
    }
}

fn parse_number<T: std::str::FromStr>(args: &ArgMatches, name: &str) -> Result<T> {
    let value = args.value_of(name).unwrap_or_default();
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid value for --{}: {}", name, value))
}

fn open_image(args: &ArgMatches) -> Result<FlatFS<FileDrive>> {
    let path = Path::new(args.value_of("image").unwrap_or_default());
    let drive = FileDrive::open(path, parse_number(args, "sector-size")?)
        .with_context(|| format!("failed to open {}", path.display()))?;
    FlatFS::mount(drive).with_context(|| format!("failed to mount {}", path.display()))
}

fn format_cmd(args: &ArgMatches) -> Result<()> {
    let path = Path::new(args.value_of("image").unwrap_or_default());
    let size: u64 = parse_number(args, "size")?;
    let drive = FileDrive::create(path, size, parse_number(args, "sector-size")?)
        .with_context(|| format!("failed to create {}", path.display()))?;
    let mut fs = FlatFS::format(drive, size).with_context(|| format!("failed to format {}", path.display()))?;
    fs.unmount()?;
    println!("formatted {} ({})", path.display(), pretty_size_from_bytes(size));
    Ok(())
}

fn inspect_cmd(args: &ArgMatches) -> Result<()> {
    let mut fs = open_image(args)?;
    let block_size = fs.get_block_size();
    println!("free inodes: {}", fs.free_inodes());
    println!(
        "free blocks: {} ({})",
        fs.free_blocks(),
        pretty_size_from_bytes((fs.free_blocks() * block_size) as u64)
    );
    for name in fs.list()? {
        let stat = fs.stat(&name)?;
        let integrity = if stat.integrity {
            format!("{:?}", fs.check_integrity(&name)?)
        } else {
            "-".to_string()
        };
        println!("{:>4} {:>8} {:>10} {}", stat.inode, stat.size, integrity, stat.name);
    }
    for (link, target) in fs.links()? {
        println!("{} -> {}", link, target);
    }
    fs.unmount()?;
    Ok(())
}

fn mount_cmd(args: &ArgMatches) -> Result<()> {
    let fs = open_image(args)?;
    let mountpoint = args.value_of("mountpoint").unwrap_or_default();
    let options = MountOptions {
        allow_other: args.is_present("allow-other"),
        auto_unmount: args.is_present("auto-unmount"),
    };
    fuse::mount(fs, mountpoint, &options).with_context(|| format!("failed to mount at {}", mountpoint))
}
