//! Thin wrapper exposing `fz compile` as its own binary (§6).

use clap::Parser;
use fz_core::cli::{self, CompileArgs};

fn main() {
    let args = CompileArgs::parse();
    std::process::exit(cli::run_compile(args));
}
