//! Parallel scheduler (§4.4): drives every case to a terminal status under
//! a bounded worker pool, one OS thread per calculator slot (capped by
//! `max_workers`, §5/§6 `FZ_MAX_WORKERS`), with fallback-chain retry and
//! cooperative cancellation.

pub mod progress;

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indexmap::IndexMap;

use crate::calculator::{self, CalculatorDescriptor, Scheme};
use crate::case::Case;
use crate::error::{Error, Result};
use crate::extractor;
use crate::fingerprint::Fingerprint;
use crate::model::Model;
use crate::result_set::{CaseResultRecord, CaseStatus, ResultSet};
use crate::scheduler::progress::{ProgressEvent, ProgressObserver};
use crate::shutdown::ShutdownFlag;
use crate::template;

pub struct RunOptions<'a> {
    pub input_path: &'a Path,
    pub model: &'a Model,
    pub run_dir: &'a Path,
    pub calculator_uris: &'a [String],
    pub retry_bound: u32,
    pub env_default_timeout: u64,
    /// Upper bound on worker-pool width (§5, §6 `FZ_MAX_WORKERS`); the pool
    /// width is `min(slots.len(), max_workers)`.
    pub max_workers: usize,
    pub shutdown: ShutdownFlag,
    pub observers: Vec<Arc<dyn ProgressObserver>>,
}

struct Slot {
    descriptor: CalculatorDescriptor,
    backend: Box<dyn calculator::Calculator>,
    lock: Mutex<()>,
}

/// Materialize every case's directory (compiling its inputs and writing its
/// fingerprint sidecar), then dispatch all cases through the scheduler.
/// Returns the final result set with row order equal to `cases`' order
/// (§4.4 "Ordering guarantees").
pub fn run(cases: &[Case], opts: RunOptions) -> Result<ResultSet> {
    let descriptors: Vec<CalculatorDescriptor> = opts
        .calculator_uris
        .iter()
        .map(|u| CalculatorDescriptor::parse(u))
        .collect::<Result<_>>()?;

    let slots: Vec<Slot> = descriptors
        .into_iter()
        .map(|d| {
            let backend = calculator::build(&d);
            Slot { descriptor: d, backend, lock: Mutex::new(()) }
        })
        .collect();

    let case_dirs: Vec<PathBuf> = cases
        .iter()
        .map(|c| {
            let key = c.case_key();
            if key.is_empty() {
                opts.run_dir.to_path_buf()
            } else {
                opts.run_dir.join(key)
            }
        })
        .collect();

    for (i, (case, dir)) in cases.iter().zip(&case_dirs).enumerate() {
        std::fs::create_dir_all(dir)?;
        let written = template::compile(opts.input_path, case, opts.model, dir)?;
        let fp = Fingerprint::compute(dir, &written)?;
        fp.write_sidecar(dir)?;
        emit(&opts.observers, &ProgressEvent::CaseEnqueued { index: i, path: dir.display().to_string() });
    }

    let queue: Mutex<VecDeque<usize>> = Mutex::new((0..cases.len()).collect());
    let results: Mutex<Vec<Option<CaseResultRecord>>> = Mutex::new(vec![None; cases.len()]);

    let worker_count = slots.len().max(1).min(opts.max_workers.max(1));

    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            scope.spawn(|| loop {
                let index = {
                    let mut q = queue.lock().unwrap();
                    q.pop_front()
                };
                let Some(index) = index else { break };

                let record = run_one_case(
                    index,
                    &cases[index],
                    &case_dirs[index],
                    &slots,
                    &opts,
                );
                results.lock().unwrap()[index] = Some(record);
            });
        }
    });

    emit(&opts.observers, &ProgressEvent::RunFinished { total: cases.len() });

    let rows = results
        .into_inner()
        .unwrap()
        .into_iter()
        .map(|r| r.expect("every queued case produces exactly one result record"))
        .collect();
    Ok(ResultSet { rows })
}

fn emit(observers: &[Arc<dyn ProgressObserver>], event: &ProgressEvent) {
    for obs in observers {
        obs.on_event(event);
    }
}

fn run_one_case(
    index: usize,
    case: &Case,
    case_dir: &Path,
    slots: &[Slot],
    opts: &RunOptions,
) -> CaseResultRecord {
    let mut attempts = 0u32;

    loop {
        if opts.shutdown.is_set() {
            return finalize(case, case_dir, CaseStatus::Interrupted, "", "", Some("cancelled by shutdown flag".to_string()), &opts.observers, index);
        }

        for slot in slots {
            if opts.shutdown.is_set() {
                break;
            }
            emit(&opts.observers, &ProgressEvent::CaseStarted { index, calculator: slot.descriptor.uri.clone() });

            if slot.descriptor.scheme == Scheme::Cache {
                match try_cache(slot, case_dir, opts.model) {
                    Ok(Some(candidate)) => {
                        if import_candidate(&candidate, case_dir).is_ok() {
                            let command = read_candidate_command(&candidate);
                            return finalize(case, case_dir, CaseStatus::Cached, &slot.descriptor.uri, &command, None, &opts.observers, index);
                        }
                    }
                    Ok(None) => continue,
                    Err(_) => continue,
                }
                continue;
            }

            let timeout = Duration::from_secs(slot.descriptor.effective_timeout(opts.model.timeout, opts.env_default_timeout));
            let _guard = slot.lock.lock().unwrap();
            let outcome = slot.backend.run(case_dir, &slot.descriptor.command, timeout, &opts.shutdown);
            drop(_guard);

            match outcome {
                Ok(o) if o.error.is_none() => {
                    return finalize(case, case_dir, CaseStatus::Done, &slot.descriptor.uri, &slot.descriptor.command, None, &opts.observers, index);
                }
                Ok(o) => {
                    if matches!(o.error, Some(Error::CancellationError)) {
                        return finalize(case, case_dir, CaseStatus::Interrupted, &slot.descriptor.uri, &slot.descriptor.command, Some(o.error.unwrap().to_string()), &opts.observers, index);
                    }
                    // retryable: advance to the next calculator in the chain.
                    continue;
                }
                Err(_) => continue,
            }
        }

        attempts += 1;
        if attempts >= opts.retry_bound.max(1) {
            return finalize(case, case_dir, CaseStatus::Failed, "", "", Some("exhausted retry bound across the calculator chain".to_string()), &opts.observers, index);
        }
    }
}

fn finalize(
    case: &Case,
    case_dir: &Path,
    status: CaseStatus,
    calculator: &str,
    command: &str,
    error: Option<String>,
    observers: &[Arc<dyn ProgressObserver>],
    index: usize,
) -> CaseResultRecord {
    emit(observers, &ProgressEvent::CaseCompleted { index, status });
    CaseResultRecord {
        inputs: case.values.clone(),
        outputs: BTreeMap::new(),
        status,
        calculator: calculator.to_string(),
        error,
        command: command.to_string(),
        path: case_dir.display().to_string(),
    }
}

fn try_cache(slot: &Slot, case_dir: &Path, model: &Model) -> Result<Option<PathBuf>> {
    let target = Fingerprint::read_sidecar(case_dir).unwrap_or_default();
    let cache_backend = calculator::cache::CacheBackend::new(slot.descriptor.clone());
    cache_backend.probe(case_dir, &target, model)
}

fn import_candidate(candidate: &Path, case_dir: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(candidate)? {
        let entry = entry?;
        if entry.path().is_file() {
            let dest = case_dir.join(entry.file_name());
            std::fs::copy(entry.path(), dest)?;
        }
    }
    Ok(())
}

fn read_candidate_command(candidate: &Path) -> String {
    std::fs::read_to_string(candidate.join("log.txt"))
        .ok()
        .and_then(|text| {
            text.lines()
                .find(|l| l.starts_with("Command:"))
                .map(|l| l.trim_start_matches("Command:").trim().to_string())
        })
        .unwrap_or_default()
}

/// Re-run the output extractor and attach results to already-finalized
/// records in place (kept separate from the dispatch loop so the CLI layer
/// can choose whether/when to pay the extraction cost, e.g. skipping it for
/// `interrupted` rows).
pub fn populate_outputs(result_set: &mut ResultSet, model: &Model) -> Result<()> {
    for row in &mut result_set.rows {
        if matches!(row.status, CaseStatus::Done | CaseStatus::Cached) {
            let outputs = extractor::extract_all(Path::new(&row.path), model)?;
            row.outputs = outputs;
        }
    }
    Ok(())
}
