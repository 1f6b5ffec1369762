//! Thin wrapper exposing `fz output` as its own binary (§6).

use clap::Parser;
use fz_core::cli::{self, OutputArgs};

fn main() {
    let args = OutputArgs::parse();
    std::process::exit(cli::run_output(args));
}
