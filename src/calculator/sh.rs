//! Local-shell backend (§4.3.1): executes a command with its arguments in
//! `case_dir` using the platform shell, polling for completion so that the
//! process-wide shutdown flag and the effective timeout can both be
//! honored cooperatively (`std::process::Child` has no built-in timeout).

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant, SystemTime};

use crate::calculator::{write_log_file, CalculatorDescriptor, CaseOutcome};
use crate::error::{Error, Result};
use crate::shutdown::ShutdownFlag;
use crate::toolpath;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const KILL_GRACE: Duration = Duration::from_secs(5);

pub struct ShBackend {
    desc: CalculatorDescriptor,
}

impl ShBackend {
    pub fn new(desc: CalculatorDescriptor) -> Self {
        Self { desc }
    }

    fn shell() -> (String, &'static str) {
        if cfg!(windows) {
            (toolpath::resolve("cmd"), "/C")
        } else {
            (toolpath::resolve("sh"), "-c")
        }
    }
}

impl super::Calculator for ShBackend {
    fn run(
        &self,
        case_dir: &Path,
        command: &str,
        effective_timeout: Duration,
        shutdown: &ShutdownFlag,
    ) -> Result<CaseOutcome> {
        let (shell, flag) = Self::shell();
        let stdout_path = case_dir.join("out.txt");
        let stderr_path = case_dir.join("err.txt");
        let stdout_file = std::fs::File::create(&stdout_path)?;
        let stderr_file = std::fs::File::create(&stderr_path)?;

        let start = SystemTime::now();
        let deadline = Instant::now() + effective_timeout;

        let mut child = Command::new(&shell)
            .arg(flag)
            .arg(command)
            .current_dir(case_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file))
            .spawn()
            .map_err(|e| Error::BackendExecError {
                calculator: self.desc.uri.clone(),
                message: format!("failed to spawn '{shell}': {e}"),
            })?;

        let (exit_status, timed_out, cancelled) = loop {
            match child.try_wait() {
                Ok(Some(status)) => break (status.code(), false, false),
                Ok(None) => {}
                Err(e) => {
                    return Err(Error::BackendExecError {
                        calculator: self.desc.uri.clone(),
                        message: format!("error waiting on child: {e}"),
                    })
                }
            }
            if shutdown.is_set() {
                terminate(&mut child, KILL_GRACE);
                break (None, false, true);
            }
            if Instant::now() >= deadline {
                terminate(&mut child, KILL_GRACE);
                break (None, true, false);
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        let end = SystemTime::now();
        let log_path = write_log_file(
            case_dir,
            command,
            exit_status,
            start,
            end,
            &std::env::current_dir().unwrap_or_else(|_| case_dir.to_path_buf()),
        )?;

        let error = if cancelled {
            Some(Error::CancellationError)
        } else if timed_out {
            Some(Error::TimeoutError {
                calculator: self.desc.uri.clone(),
                seconds: effective_timeout.as_secs(),
            })
        } else if exit_status != Some(0) {
            Some(Error::BackendExecError {
                calculator: self.desc.uri.clone(),
                message: format!("exit code {:?}", exit_status),
            })
        } else {
            None
        };

        Ok(CaseOutcome {
            exit_status,
            stdout_path,
            stderr_path,
            log_path,
            error,
            cached: false,
        })
    }

    fn identity(&self) -> &str {
        &self.desc.uri
    }
}

fn terminate(child: &mut std::process::Child, grace: Duration) {
    #[cfg(unix)]
    {
        unsafe {
            libc::kill(child.id() as i32, libc::SIGTERM);
        }
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = child.try_wait() {
                return;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::Calculator;

    #[test]
    fn runs_true_and_reports_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let desc = CalculatorDescriptor::parse("sh://true").unwrap();
        let backend = ShBackend::new(desc);
        let shutdown = ShutdownFlag::new();
        let outcome = backend
            .run(dir.path(), "true", Duration::from_secs(5), &shutdown)
            .unwrap();
        assert_eq!(outcome.exit_status, Some(0));
        assert!(outcome.error.is_none());
        assert!(outcome.log_path.exists());
    }

    #[test]
    fn nonzero_exit_is_reported_as_exec_error() {
        let dir = tempfile::tempdir().unwrap();
        let desc = CalculatorDescriptor::parse("sh://false").unwrap();
        let backend = ShBackend::new(desc);
        let shutdown = ShutdownFlag::new();
        let outcome = backend
            .run(dir.path(), "false", Duration::from_secs(5), &shutdown)
            .unwrap();
        assert_eq!(outcome.exit_status, Some(1));
        assert!(matches!(outcome.error, Some(Error::BackendExecError { .. })));
    }

    #[test]
    fn writes_stdout_to_out_txt() {
        let dir = tempfile::tempdir().unwrap();
        let desc = CalculatorDescriptor::parse("sh://echo hello").unwrap();
        let backend = ShBackend::new(desc);
        let shutdown = ShutdownFlag::new();
        let outcome = backend
            .run(dir.path(), "echo hello", Duration::from_secs(5), &shutdown)
            .unwrap();
        let content = std::fs::read_to_string(outcome.stdout_path).unwrap();
        assert_eq!(content.trim(), "hello");
    }
}
