mod cli;

use std::io::{self, Write};

use clap::Parser;
use cli::{Cli, Command};
use sfs::ROOT_DIR_SECTOR;
use typed_bytesize::ByteSizeIec;

fn main() -> io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Format { size_mib } => {
            let fs = sfs_fuse::create_image(&cli.image, ByteSizeIec::mib(size_mib).0)?;
            println!(
                "{:?}: {} sectors, {} free",
                cli.image,
                fs.total_sectors(),
                fs.free_sectors()
            );
        }
        Command::Pack { source, size_mib } => {
            let fs = sfs_fuse::create_image(&cli.image, ByteSizeIec::mib(size_mib).0)?;
            let count = sfs_fuse::pack(&fs, &source, "/")?;
            println!("source={source:?}\nimage={:?}", cli.image);
            println!("{count} files, {} sectors free", fs.free_sectors());
        }
        Command::Ls { path } => {
            let fs = sfs_fuse::open_image(&cli.image)?;
            for name in fs
                .read_dir(&path, ROOT_DIR_SECTOR)
                .map_err(sfs_fuse::to_io)?
            {
                println!("{name}");
            }
        }
        Command::Cat { path } => {
            let fs = sfs_fuse::open_image(&cli.image)?;
            let data = sfs_fuse::read_file(&fs, &path)?;
            io::stdout().write_all(&data)?;
        }
    }

    Ok(())
}
