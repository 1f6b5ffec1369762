//! Thin wrapper exposing `fz run` as its own binary (§6).

use clap::Parser;
use fz_core::cli::{self, RunArgs};
use fz_core::shutdown::{self, ShutdownFlag};

#[tokio::main]
async fn main() {
    let args = RunArgs::parse();
    let flag = ShutdownFlag::new();
    shutdown::install_interrupt_handler(flag.clone());
    let code = tokio::task::spawn_blocking(move || cli::run_run(args, flag)).await.unwrap_or(1);
    std::process::exit(code);
}
