//! # `settings-convert`: JSON <-> YAML Settings Converter
//!
//! Loads a settings file and saves it in the format of the output file's
//! extension. Dates, times, datetimes and durations keep their tagged
//! encoding, and legacy object encodings found in the input are upgraded.
//!
//! ## Usage
//!
//! ```bash
//! settings-convert --input app.json --output app.yaml
//! settings-convert --input app.yml --output app.json --readable
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use lib_flotils::loadable::{load_file, save_file};
use lib_flotils::loggers::{LoggerLocal, LoggerLocalOptions};

/// # Command Line Arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Converts settings files between JSON and YAML")]
struct Args {
    /// Settings file to read (.json, .yml or .yaml).
    #[arg(short, long)]
    input: PathBuf,

    /// Settings file to write; its extension picks the format.
    #[arg(short, long)]
    output: PathBuf,

    /// Indent JSON output with four spaces.
    #[arg(short, long)]
    readable: bool,

    /// Log filter, e.g. `debug` or `lib_flotils=debug,warn`.
    #[arg(long, env = "FLOTILS_LOG", default_value = "warn")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let logger_local = LoggerLocal::new(
        "settings-convert",
        Some(LoggerLocalOptions { level: args.log_level.clone(), ..Default::default() }),
    )?;
    let sink = logger_local.sink();

    // Decoding warnings (bad payloads, legacy objects) go to the sink
    let value = sink
        .scope(|| load_file(&args.input))
        .with_context(|| format!("Failed to load '{}'", args.input.display()))?;

    save_file(&args.output, &value, args.readable)
        .with_context(|| format!("Failed to save '{}'", args.output.display()))?;

    println!(
        "{} {} -> {}",
        "Converted".green().bold(),
        args.input.display(),
        args.output.display()
    );
    Ok(())
}
