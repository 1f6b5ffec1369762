//! Thin wrapper exposing `fz list` as its own binary (§6).

use clap::Parser;
use fz_core::cli::{self, ListArgs};

fn main() {
    let args = ListArgs::parse();
    std::process::exit(cli::run_list(args));
}
