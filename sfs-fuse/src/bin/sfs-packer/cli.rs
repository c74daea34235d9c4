use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version, about = "Build and inspect sfs disk images")]
pub struct Cli {
    /// Image file
    #[arg(long, short, default_value = "fs.img")]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty image
    Format {
        /// Image size in MiB
        #[arg(long, short = 'S', default_value_t = 16)]
        size_mib: u64,
    },

    /// Create an image holding a copy of a host directory
    Pack {
        /// Host directory to copy
        #[arg(long, short)]
        source: PathBuf,

        /// Image size in MiB
        #[arg(long, short = 'S', default_value_t = 16)]
        size_mib: u64,
    },

    /// List a directory of the image
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Print a file of the image
    Cat { path: String },
}
