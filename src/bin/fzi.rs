//! Thin wrapper exposing `fz input` as its own binary (§6).

use clap::Parser;
use fz_core::cli::{self, InputArgs};

fn main() {
    let args = InputArgs::parse();
    std::process::exit(cli::run_input(args));
}
