//! Process-wide shutdown latch (§3 "Process-wide shutdown flag", §5).
//!
//! A single monotonic latch: once set it cannot be cleared until process
//! exit. Set by the interrupt handler; observed by the scheduler and all
//! blocking backend operations. This is the only process-wide mutable state
//! in the engine besides the tool-path resolver cache (`toolpath`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Install a Ctrl-C handler that sets `flag` on first interrupt and exits
/// the process immediately with code 130 on a second interrupt (§5: "Double
/// interrupt forces immediate exit without cleanup; single interrupt drains
/// in-flight work and preserves partial results.").
pub fn install_interrupt_handler(flag: ShutdownFlag) {
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            if flag.is_set() {
                tracing::warn!("second interrupt received, exiting immediately");
                std::process::exit(130);
            }
            tracing::info!("interrupt received, draining in-flight work");
            flag.set();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_is_monotonic() {
        let flag = ShutdownFlag::new();
        assert!(!flag.is_set());
        flag.set();
        assert!(flag.is_set());
        flag.set();
        assert!(flag.is_set());
    }

    #[test]
    fn clones_share_state() {
        let flag = ShutdownFlag::new();
        let clone = flag.clone();
        clone.set();
        assert!(flag.is_set());
    }
}
