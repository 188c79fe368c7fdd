//! Command line arguments

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "scriptsim",
    version,
    about = "Build and simulate device script projects",
    long_about = "Manage the files of a device script project package, exchange them as \
                  binary images, and build and run the project on the simulated device."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// More log output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Settings file to use instead of the default location
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a new project package with a starter script
    New {
        /// Package directory to create
        project: PathBuf,
    },

    /// List the files in a project
    Ls {
        project: PathBuf,
    },

    /// Copy a file from disk into a project
    Add {
        project: PathBuf,
        /// File to copy
        source: PathBuf,
        /// Path inside the project (default: the source file name)
        #[arg(long = "as", value_name = "PATH")]
        dest: Option<String>,
    },

    /// Remove a file from a project
    Rm {
        project: PathBuf,
        path: String,
    },

    /// Rename a file inside a project
    Mv {
        project: PathBuf,
        from: String,
        to: String,
    },

    /// Write a project file to stdout
    Cat {
        project: PathBuf,
        path: String,
    },

    /// Replace every project file with the contents of a binary image
    Import {
        project: PathBuf,
        image: PathBuf,
        /// Confirm that existing files will be discarded
        #[arg(long)]
        yes: bool,
    },

    /// Write the project files to a binary image
    Export {
        project: PathBuf,
        image: PathBuf,
    },

    /// Compile a project and report diagnostics
    Build {
        project: PathBuf,
        /// Print the generated code
        #[arg(long)]
        print_code: bool,
        /// Keep source locations for the listing and device errors
        #[arg(long)]
        debug: bool,
    },

    /// Build and run a project on the simulated device
    Run(RunArgs),

    /// Show the active settings
    Config {
        /// Write the default settings file
        #[arg(long)]
        init: bool,
    },
}

#[derive(Args)]
pub struct RunArgs {
    pub project: PathBuf,

    /// Stop after this many ticks
    #[arg(long, value_name = "N")]
    pub ticks: Option<u64>,

    /// Tick period in milliseconds (overrides settings)
    #[arg(long, value_name = "MS")]
    pub period_ms: Option<u64>,

    /// Report device errors with their source location
    #[arg(long)]
    pub debug: bool,
}
