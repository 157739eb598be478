use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::path::PathBuf;

use chainfs::chainfs::ChainFs;
use chainfs::fuse::ChainFuse;
use chainfs::storage::FileStorage;

#[derive(Parser)]
struct Args {
    /// chainfs disk image
    disk_image: PathBuf,
    /// FUSE mountpoint
    mountpoint: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let disk_image = File::options()
        .read(true)
        .write(true)
        .open(args.disk_image)
        .context("unable to open disk image in read-write mode")?;

    let fs = ChainFs::load(FileStorage::new(disk_image)).context("loading filesystem")?;

    fuser::mount2(ChainFuse::new(fs), args.mountpoint, &[]).context("mounting filesystem")?;

    Ok(())
}
