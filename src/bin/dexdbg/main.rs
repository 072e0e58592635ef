mod app;
mod commands;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::app::{Cli, Command};

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Command::Encode {
            method,
            output,
            annotate,
            validate,
        } => commands::encode(method, output.as_deref(), *annotate, *validate),
        Command::Decode {
            stream,
            method,
            offset,
            json,
        } => commands::decode(stream, method, *offset, *json),
        Command::Layout {
            methods,
            base,
            alignment,
            output,
        } => commands::layout(methods, *base, *alignment, output.as_deref()),
    }
}
