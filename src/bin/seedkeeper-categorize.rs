//! Standalone categorizer: read
//! alternating null-terminated `path\0size\0…` fields from stdin, classify
//! the resulting bag, and print one category token to stdout.

#![warn(clippy::all, clippy::pedantic)]

use std::io::{Read, Write};
use std::path::PathBuf;

use clap::{arg, value_parser, Parser};
use seedkeeper::categorizer;
use seedkeeper::errors::*;
use seedkeeper::regexload;

const NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Parser, Debug)]
#[command(version = env!("BUILD_FULL_VERSION"))]
struct Cli {
    /// File with the AV-marker regex on its first non-blank line
    #[arg(long, value_parser = value_parser!(PathBuf))]
    regex_file: PathBuf,
}

fn read_records(input: &[u8]) -> Vec<(String, String)> {
    let mut fields = input
        .split(|b| *b == 0)
        .map(|f| String::from_utf8_lossy(f).into_owned())
        .filter(|f| !f.is_empty());

    let mut pairs = Vec::new();
    while let Some(path) = fields.next() {
        let Some(size) = fields.next() else {
            eprintln!("{NAME}: trailing path with no size field, dropping: {path}");
            break;
        };
        pairs.push((path, size));
    }
    pairs
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let av_regex_src = regexload::load(&cli.regex_file)?;
    let av_regex = regex::Regex::new(&av_regex_src)
        .with_context(|| format!("compiling regex from {}", cli.regex_file.display()))?;

    let mut input = Vec::new();
    std::io::stdin()
        .read_to_end(&mut input)
        .context("reading stdin")?;

    let raw = read_records(&input);
    let (category, diagnostics) = categorizer::classify_with_diagnostics(raw, &av_regex)?;
    for diag in &diagnostics {
        eprintln!("{NAME}: {diag}");
    }

    let mut stdout = std::io::stdout();
    writeln!(stdout, "{category}").context("writing stdout")?;
    Ok(())
}

fn main() {
    match run() {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            eprintln!("{NAME}: {err:#}");
            std::process::exit(1);
        }
    }
}
