use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use chainfs::chainfs::format;
use chainfs::disk_format::layout::{Layout, DEFAULT_NUM_BLOCKS};
use chainfs::storage::FileStorage;

#[derive(Parser)]
struct Args {
    /// Path of the disk image to create. An existing file is overwritten.
    disk_image: PathBuf,
    /// Number of blocks in the image.
    #[arg(long, default_value_t = DEFAULT_NUM_BLOCKS)]
    blocks: usize,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let layout = Layout::new(args.blocks).context("invalid block count")?;

    let disk_image = File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(&args.disk_image)
        .context("unable to create disk image")?;
    disk_image
        .set_len(layout.image_size())
        .context("sizing disk image")?;

    format(&FileStorage::new(disk_image)).context("formatting disk image")?;

    println!(
        "created {} with {} blocks ({} bytes)",
        args.disk_image.display(),
        args.blocks,
        layout.image_size()
    );

    Ok(())
}
