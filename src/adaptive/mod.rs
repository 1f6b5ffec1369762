//! Adaptive sampling driver (§4.7): drives a pluggable algorithm through
//! rounds of design-point proposal, case dispatch, and analysis.

pub mod builtin;
pub mod payload;

use std::path::Path;

use indexmap::IndexMap;

use crate::case::{Case, VarSpecEntry};
use crate::error::Result;
use crate::model::Model;
use crate::result_set::ResultSet;
use crate::scheduler::{self, RunOptions};
use crate::shutdown::ShutdownFlag;
use crate::template::expression::evaluate_scalar;
use crate::value::Value;

/// `(low, high)` bounds for one ranged input variable (§4.7 driver loop
/// step 1: "Split variable inputs into fixed (single value) and ranged
/// (two-value interval)").
pub type VarRanges = IndexMap<String, (f64, f64)>;
pub type DesignPoint = IndexMap<String, Value>;

#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    pub text: String,
    pub data: Option<Value>,
}

/// The four-operation plug-in contract (§4.7 "Plug-in contract").
pub trait Algorithm {
    fn initial_design(&self, var_ranges: &VarRanges, output_names: &[String]) -> Vec<DesignPoint>;

    /// Returns the next batch of points, or an empty vec to stop.
    fn next_design(&self, history_x: &[DesignPoint], history_y: &[Option<f64>]) -> Vec<DesignPoint>;

    fn analysis(&self, history_x: &[DesignPoint], history_y: &[Option<f64>]) -> AnalysisResult;

    fn analysis_intermediate(&self, history_x: &[DesignPoint], history_y: &[Option<f64>]) -> Option<AnalysisResult> {
        let _ = (history_x, history_y);
        None
    }
}

pub struct DriverOptions<'a> {
    pub input_path: &'a Path,
    pub model: &'a Model,
    pub analysis_dir: &'a Path,
    pub calculator_uris: &'a [String],
    pub output_expression: &'a str,
    pub retry_bound: u32,
    pub env_default_timeout: u64,
    pub max_workers: usize,
    pub shutdown: ShutdownFlag,
}

#[derive(Debug, Clone)]
pub struct DriverReport {
    pub xy: ResultSet,
    pub analysis: AnalysisResult,
    pub algorithm: String,
    pub iterations: usize,
    pub total_evaluations: usize,
    pub summary: String,
}

/// Run the full adaptive-sampling loop (§4.7 "Driver loop").
pub fn drive(
    algorithm: &dyn Algorithm,
    algorithm_name: &str,
    fixed: &IndexMap<String, Value>,
    ranges: &VarRanges,
    output_names: &[String],
    opts: DriverOptions,
) -> Result<DriverReport> {
    std::fs::create_dir_all(opts.analysis_dir)?;

    let mut history_x: Vec<DesignPoint> = Vec::new();
    let mut history_y: Vec<Option<f64>> = Vec::new();
    let mut all_rows = ResultSet::default();
    let mut iteration = 0usize;

    let mut batch = algorithm.initial_design(ranges, output_names);

    while !batch.is_empty() {
        if opts.shutdown.is_set() {
            break;
        }
        let iter_dir = opts.analysis_dir.join(format!("iter{iteration}"));
        std::fs::create_dir_all(&iter_dir)?;

        let rows: Vec<IndexMap<String, Value>> = batch
            .iter()
            .map(|point| {
                let mut row = fixed.clone();
                for (k, v) in point {
                    row.insert(k.clone(), v.clone());
                }
                row
            })
            .collect();
        let cases: Vec<Case> = rows.into_iter().map(Case::new).collect();

        let run_opts = RunOptions {
            input_path: opts.input_path,
            model: opts.model,
            run_dir: &iter_dir,
            calculator_uris: opts.calculator_uris,
            retry_bound: opts.retry_bound,
            env_default_timeout: opts.env_default_timeout,
            max_workers: opts.max_workers,
            shutdown: opts.shutdown.clone(),
            observers: vec![],
        };
        let mut result_set = scheduler::run(&cases, run_opts)?;
        scheduler::populate_outputs(&mut result_set, opts.model)?;

        for (point, row) in batch.iter().zip(&result_set.rows) {
            history_x.push(point.clone());
            let scalar = evaluate_scalar(&row.outputs, opts.output_expression);
            history_y.push(scalar);
        }

        write_xy_csv(opts.analysis_dir, &history_x, &history_y)?;
        all_rows.rows.extend(result_set.rows);

        if let Some(intermediate) = algorithm.analysis_intermediate(&history_x, &history_y) {
            payload::dispatch(&intermediate, &opts.analysis_dir.join(format!("intermediate_iter{iteration}")))?;
        }

        let next = algorithm.next_design(&history_x, &history_y);
        if next.is_empty() {
            batch = Vec::new();
        } else {
            batch = next;
        }
        iteration += 1;
    }

    let analysis = algorithm.analysis(&history_x, &history_y);
    payload::dispatch(&analysis, &opts.analysis_dir.join("analysis"))?;

    Ok(DriverReport {
        xy: all_rows,
        total_evaluations: history_x.len(),
        iterations: iteration,
        summary: analysis.text.clone(),
        analysis,
        algorithm: algorithm_name.to_string(),
    })
}

fn write_xy_csv(analysis_dir: &Path, history_x: &[DesignPoint], history_y: &[Option<f64>]) -> Result<()> {
    let x_names: Vec<String> = history_x.first().map(|p| p.keys().cloned().collect()).unwrap_or_default();

    let mut x_writer = csv::Writer::from_path(analysis_dir.join("X.csv")).map_err(csv_to_io)?;
    x_writer.write_record(&x_names).map_err(csv_to_io)?;
    for point in history_x {
        let record: Vec<String> = x_names.iter().map(|n| point.get(n).map(Value::canonical_string).unwrap_or_default()).collect();
        x_writer.write_record(&record).map_err(csv_to_io)?;
    }
    x_writer.flush()?;

    let mut y_writer = csv::Writer::from_path(analysis_dir.join("Y.csv")).map_err(csv_to_io)?;
    y_writer.write_record(["y"]).map_err(csv_to_io)?;
    for y in history_y {
        y_writer
            .write_record([y.map(|v| v.to_string()).unwrap_or_default()])
            .map_err(csv_to_io)?;
    }
    y_writer.flush()?;
    Ok(())
}

fn csv_to_io(e: csv::Error) -> crate::error::Error {
    crate::error::Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

/// Split raw variable-input values into fixed and ranged groups (§4.7 step
/// 1). A ranged entry is a two-element sequence interpreted as `(low,
/// high)`; anything else (a scalar, or a sequence with a different length)
/// is fixed.
pub fn split_fixed_and_ranged(spec: &IndexMap<String, VarSpecEntry>) -> (IndexMap<String, Value>, VarRanges) {
    let mut fixed = IndexMap::new();
    let mut ranges = VarRanges::new();
    for (name, entry) in spec {
        match entry {
            VarSpecEntry::Scalar(v) => {
                fixed.insert(name.clone(), v.clone());
            }
            VarSpecEntry::Sequence(values) if values.len() == 2 => {
                if let (Some(lo), Some(hi)) = (values[0].as_f64(), values[1].as_f64()) {
                    ranges.insert(name.clone(), (lo, hi));
                } else {
                    fixed.insert(name.clone(), values[0].clone());
                }
            }
            VarSpecEntry::Sequence(values) => {
                if let Some(first) = values.first() {
                    fixed.insert(name.clone(), first.clone());
                }
            }
        }
    }
    (fixed, ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_fixed_and_ranged_separates_correctly() {
        let mut spec = IndexMap::new();
        spec.insert("a".to_string(), VarSpecEntry::Scalar(Value::Int(5)));
        spec.insert("b".to_string(), VarSpecEntry::Sequence(vec![Value::Float(0.0), Value::Float(1.0)]));
        let (fixed, ranges) = split_fixed_and_ranged(&spec);
        assert_eq!(fixed.get("a"), Some(&Value::Int(5)));
        assert_eq!(ranges.get("b"), Some(&(0.0, 1.0)));
    }
}
