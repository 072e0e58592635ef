use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

/// dexdbg - encode, decode and lay out dex debug info streams
#[derive(Debug, Parser)]
#[command(name = "dexdbg", version, about, long_about = None)]
pub struct Cli {
    /// Raise the log level: -v for debug, -vv for trace. RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Encode the tables of a method description into a debug info stream.
    Encode {
        /// JSON method description (shape, code size, positions, locals).
        #[arg(value_name = "METHOD")]
        method: PathBuf,

        /// Write the raw stream here instead of printing it.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Print an annotated dump of the emitted bytes.
        #[arg(long)]
        annotate: bool,

        /// Decode the result again and compare it against the input.
        #[arg(long)]
        validate: bool,
    },

    /// Decode a debug info stream stored in a file.
    Decode {
        /// File containing the stream.
        #[arg(value_name = "STREAM")]
        stream: PathBuf,

        /// JSON method description; only its shape and code size are used.
        #[arg(short, long, value_name = "METHOD")]
        method: PathBuf,

        /// Offset of the stream inside the file (hex like 0x1a or decimal).
        #[arg(long, default_value = "0", value_parser = parse_number)]
        offset: u32,

        /// Emit the decoded tables as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Pack the streams of several methods into one debug info section.
    Layout {
        /// JSON method descriptions, one per method.
        #[arg(value_name = "METHOD", required = true)]
        methods: Vec<PathBuf>,

        /// Offset at which the section may start.
        #[arg(long, default_value = "0", value_parser = parse_number)]
        base: u32,

        /// Alignment of the section.
        #[arg(long, default_value = "1", value_parser = parse_number)]
        alignment: u32,

        /// Write the resulting image here.
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn parse_number(value: &str) -> Result<u32, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|err| format!("invalid number '{value}': {err}"))
}
