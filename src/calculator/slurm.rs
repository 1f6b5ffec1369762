//! Batch-scheduler backend (§4.3.3): submits `command` through `srun` with
//! the descriptor's partition, blocking until the job completes. When the
//! descriptor carries no host, the submission happens on the local machine
//! (via the `sh` backend); otherwise it tunnels through `ssh` to the login
//! node first. `srun` itself blocks for the job's duration, so both paths
//! reuse the underlying backend's polling/cancellation/timeout handling
//! rather than re-implementing it.

use std::path::Path;
use std::time::Duration;

use crate::calculator::{sh::ShBackend, ssh::SshBackend, Calculator, CalculatorDescriptor, CaseOutcome};
use crate::error::Result;
use crate::shutdown::ShutdownFlag;

pub struct SlurmBackend {
    desc: CalculatorDescriptor,
}

impl SlurmBackend {
    pub fn new(desc: CalculatorDescriptor) -> Self {
        Self { desc }
    }

    fn srun_command(&self) -> String {
        match &self.desc.partition {
            Some(p) => format!("srun --partition={p} {}", self.desc.command),
            None => format!("srun {}", self.desc.command),
        }
    }
}

impl Calculator for SlurmBackend {
    fn run(
        &self,
        case_dir: &Path,
        _command: &str,
        effective_timeout: Duration,
        shutdown: &ShutdownFlag,
    ) -> Result<CaseOutcome> {
        let submit = self.srun_command();
        if self.desc.host.is_some() {
            let mut ssh_desc = self.desc.clone();
            ssh_desc.command = submit.clone();
            let backend = SshBackend::new(ssh_desc);
            backend.run(case_dir, &submit, effective_timeout, shutdown)
        } else {
            let mut sh_desc = self.desc.clone();
            sh_desc.command = submit.clone();
            let backend = ShBackend::new(sh_desc);
            backend.run(case_dir, &submit, effective_timeout, shutdown)
        }
    }

    fn identity(&self) -> &str {
        &self.desc.uri
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_submission_builds_srun_with_partition() {
        let desc = CalculatorDescriptor::parse("slurm://:compute/mycode --flag").unwrap();
        let backend = SlurmBackend::new(desc);
        assert_eq!(backend.srun_command(), "srun --partition=compute mycode --flag");
    }

    #[test]
    fn local_submission_without_partition() {
        let desc = CalculatorDescriptor::parse("slurm://:unused/").unwrap();
        let backend = SlurmBackend::new(CalculatorDescriptor {
            partition: None,
            ..desc
        });
        assert_eq!(backend.srun_command(), "srun ");
    }
}
