//! Error kinds (§7). One variant per error kind in the spec's table, each
//! keeping its short identifier as the variant name. Library code returns
//! `Result<_, Error>`; the CLI boundary wraps these in `anyhow::Error`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    ConfigError(String),

    #[error("template error: {path}: {message}")]
    TemplateError { path: String, message: String },

    #[error("backend transport error ({calculator}): {message}")]
    BackendTransportError { calculator: String, message: String },

    #[error("backend exec error ({calculator}): {message}")]
    BackendExecError { calculator: String, message: String },

    #[error("timeout after {seconds}s ({calculator})")]
    TimeoutError { calculator: String, seconds: u64 },

    #[error("extraction error for field '{field}': {message}")]
    ExtractionError { field: String, message: String },

    #[error("cancelled")]
    CancellationError,

    #[error("fatal error: {0}")]
    FatalError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// `ExpressionWarning` is not a propagated error kind (§7: "non-fatal;
/// original text preserved, warning logged") — it is represented as a log
/// event (`tracing::warn!`) at the call site in `template::expression`, not
/// as an `Error` variant, matching the spec's "never raised" wording for
/// `TemplateError` on expression failures.
pub fn log_expression_warning(file: &str, expr: &str, message: &str) {
    tracing::warn!(file, expr, message, "embedded expression failed; original text preserved");
}
