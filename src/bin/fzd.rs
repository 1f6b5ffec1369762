//! Thin wrapper exposing `fz design` as its own binary (§6).

use clap::Parser;
use fz_core::cli::{self, DesignArgs};
use fz_core::shutdown::{self, ShutdownFlag};

#[tokio::main]
async fn main() {
    let args = DesignArgs::parse();
    let flag = ShutdownFlag::new();
    shutdown::install_interrupt_handler(flag.clone());
    let code = tokio::task::spawn_blocking(move || cli::run_design(args, flag)).await.unwrap_or(1);
    std::process::exit(code);
}
