use clap::Parser;
use fz_core::cli::{self, Cli};
use fz_core::shutdown::{self, ShutdownFlag};

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let flag = ShutdownFlag::new();
    shutdown::install_interrupt_handler(flag.clone());

    let code = tokio::task::spawn_blocking(move || cli::run(cli, flag))
        .await
        .unwrap_or(1);
    std::process::exit(code);
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let level = std::env::var("FZ_LOG").unwrap_or_else(|_| "info".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}
