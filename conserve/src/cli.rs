use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "conserve")]
#[command(about = "Robust portable backup archives")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log more: -v for info, -vv for debug
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log bare messages, without the timestamp and level
    #[arg(short = 'L', long, global = true)]
    pub plain_log: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new, empty archive
    Init {
        /// Directory for the archive, which must not exist yet
        archive: PathBuf,
    },

    /// Store files as a new band in an archive
    Backup {
        /// Read sources relative to this directory, and store them relative to it
        #[arg(short = 'C', long, value_name = "DIR")]
        base_dir: Option<PathBuf>,

        /// Files or directories to store
        #[arg(required = true)]
        sources: Vec<PathBuf>,

        /// The archive to add to
        archive: PathBuf,
    },

    /// Restore the most recent band into a new directory
    Restore {
        archive: PathBuf,

        /// Destination, which must not exist yet
        dest: PathBuf,
    },

    /// Check the whole archive for problems
    Validate { archive: PathBuf },

    /// Print one of the archive's metadata records as text
    Printproto { file: PathBuf },
}
