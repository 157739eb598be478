use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use chainfs::chainfs::ChainFs;
use chainfs::storage::FileStorage;

#[derive(Parser)]
struct Args {
    /// chainfs disk image
    disk_image: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let disk_image = File::options()
        .read(true)
        .open(args.disk_image)
        .context("unable to open disk image")?;

    // loading runs the full consistency check
    let fs = ChainFs::load(FileStorage::new(disk_image))?;

    println!(
        "clean: {} entries, {} of {} blocks free",
        fs.num_entries(),
        fs.num_free_blocks(),
        fs.num_blocks()
    );

    Ok(())
}
