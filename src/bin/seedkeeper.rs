//! The Controller binary: run a maintenance tick, or (invoked as the
//! daemon's `script-torrent-done` hook) place one finished torrent first.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::wildcard_imports)]

use clap::{arg, command, value_parser, Parser};
use std::path::PathBuf;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

use seedkeeper::config::Config;
use seedkeeper::controller::{self, Invocation};
use seedkeeper::errors::*;
use seedkeeper::regexload;

const NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Parser, Debug)]
#[command(version = env!("BUILD_FULL_VERSION"))]
struct Cli {
    /// Configuration file
    #[arg(long, short, value_parser = value_parser!(PathBuf))]
    config: Option<PathBuf>,
    /// Report what would happen without touching the daemon or filesystem
    #[arg(long)]
    dry_run: bool,
    /// Run against an in-memory mock client instead of the real daemon
    #[arg(long, hide(true))]
    mock: bool,
}

fn register_tracing() {
    if std::env::var("RUST_LOG").is_ok() {
        let filter = EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy();
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    register_tracing();

    let cfg = match &cli.config {
        Some(path) => Config::load_path(path)?,
        None => Config::load(NAME)?,
    };
    cfg.validate()?;

    let av_regex_src = regexload::load(&cfg.regex_file)?;
    let av_regex = regex::Regex::new(&av_regex_src)
        .with_context(|| format!("compiling regex from {}", cfg.regex_file.display()))?;

    let invocation = Invocation::from_env();

    if cli.mock {
        let mut client = seedkeeper::rpc::MockRequest::default();
        return controller::run(&mut client, &cfg, &av_regex, invocation, cli.dry_run);
    }

    let mut client = cfg.new_sync_client()?;
    controller::run(&mut client, &cfg, &av_regex, invocation, cli.dry_run)
}

fn main() {
    match run() {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            if err.downcast_ref::<LockHeld>().is_some() {
                std::process::exit(0);
            }
            eprintln!("{NAME}: {err:#}");
            std::process::exit(1);
        }
    }
}
