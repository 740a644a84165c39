//! Command-line interface for valbox.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "valbox")]
#[command(about = "Box/unbox function and static box cache generator", long_about = None)]
pub struct Cli {
    /// Log debug output (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct TargetArgs {
    /// Target triple (default: host)
    #[arg(long)]
    pub target: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile conversion functions and box caches into an object file
    Emit {
        /// Output object file
        #[arg(short, long, default_value = "valbox.o")]
        output: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// program, dynamic, static, library or test-harness
        #[arg(long)]
        output_kind: Option<String>,

        /// Class to generate conversions for (repeatable; default: every builtin)
        #[arg(long = "class", value_name = "NAME")]
        classes: Vec<String>,
    },
    /// Print the static box caches a native binary would carry
    Plan {
        #[command(flatten)]
        target: TargetArgs,
    },
}
