//! Progress-event observer (§4.4 "Progress reporting"). Observers run on the
//! emitting worker thread and must not block.

use crate::result_set::CaseStatus;

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    CaseEnqueued { index: usize, path: String },
    CaseStarted { index: usize, calculator: String },
    CaseCompleted { index: usize, status: CaseStatus },
    RunFinished { total: usize },
}

pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

/// A no-op observer, used when the caller registers none.
pub struct NullObserver;

impl ProgressObserver for NullObserver {
    fn on_event(&self, _event: &ProgressEvent) {}
}

/// Emits a `tracing` event per progress event, matching the ambient logging
/// stack rather than introducing a second channel for run status.
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_event(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::CaseEnqueued { index, path } => {
                tracing::debug!(index, path, "case enqueued")
            }
            ProgressEvent::CaseStarted { index, calculator } => {
                tracing::info!(index, calculator, "case started")
            }
            ProgressEvent::CaseCompleted { index, status } => {
                tracing::info!(index, status = status.as_str(), "case completed")
            }
            ProgressEvent::RunFinished { total } => tracing::info!(total, "run finished"),
        }
    }
}
