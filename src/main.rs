//! valbox CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;
use valbox::{
    ClassTable, PipelineResult, build_config, emit_object, render_cache_plan, requested_classes,
};

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli.command) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Command) -> PipelineResult<()> {
    match command {
        Command::Emit {
            output,
            target,
            output_kind,
            classes: names,
        } => {
            let config = build_config(
                target.config.as_deref(),
                target.target.as_deref(),
                output_kind.as_deref(),
            )?;
            let classes = ClassTable::new();
            let requested = requested_classes(&classes, &names)?;
            emit_object(classes, config, &requested, &output)
        }
        Command::Plan { target } => {
            let config = build_config(target.config.as_deref(), target.target.as_deref(), None)?;
            print!("{}", render_cache_plan(&config));
            Ok(())
        }
    }
}
