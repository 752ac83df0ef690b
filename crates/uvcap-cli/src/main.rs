// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

mod capture;
mod error;
mod info;
mod metrics;
mod utils;

use clap::{ArgAction, Parser, Subcommand};
use error::result_to_exit_code;
use log::LevelFilter;
use std::process::ExitCode;

/// Userspace V4L2 capture over memory-mapped kernel buffers
#[derive(Parser)]
#[command(name = "uvcap", version, propagate_version = true)]
#[command(about = "uvcap CLI - capture frames from V4L2 webcams and report frame timing")]
struct Cli {
    /// Log buffer activity: -v for stream setup, -vv for every dequeue and queue
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Default log filter; RUST_LOG still overrides it
    fn log_level(&self) -> LevelFilter {
        match (self.quiet, self.verbose) {
            (true, _) => LevelFilter::Error,
            (false, 0) => LevelFilter::Info,
            (false, 1) => LevelFilter::Debug,
            (false, _) => LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Stream from a device and report frame interval statistics
    Capture(capture::Args),

    /// Show a device's capabilities, current format and pixel formats
    Info(info::Args),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level());

    let result = match cli.command {
        Commands::Capture(args) => capture::execute(args, cli.json),
        Commands::Info(args) => info::execute(args, cli.json),
    };

    result_to_exit_code(result)
}

fn init_logging(level: LevelFilter) {
    let env = env_logger::Env::default().default_filter_or(level.as_str());
    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .init();

    log::debug!("log level {}", level);
}
