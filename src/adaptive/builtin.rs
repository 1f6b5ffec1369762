//! Built-in sampling algorithms and the declarative plug-in header parser
//! (§4.7 "Options come from a declarative header in the plug-in file").

use std::collections::BTreeMap;

use rand::Rng;

use crate::adaptive::{Algorithm, AnalysisResult, DesignPoint, VarRanges};
use crate::config;
use crate::error::{Error, Result};
use crate::value::Value;

/// `key=value` header lines at the top of an `algorithms/<name>` plug-in
/// file, terminated by the first blank line or non-`key=value` line.
#[derive(Debug, Clone, Default)]
pub struct PluginHeader {
    pub options: BTreeMap<String, String>,
}

impl PluginHeader {
    pub fn parse(text: &str) -> PluginHeader {
        let mut options = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                if options.is_empty() {
                    continue;
                }
                break;
            }
            match line.split_once('=') {
                Some((k, v)) => {
                    options.insert(k.trim().to_string(), v.trim().to_string());
                }
                None => break,
            }
        }
        PluginHeader { options }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn get_usize(&self, key: &str, default: usize) -> usize {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }
}

/// Resolve and load an algorithm by name (§4.8 `algorithms/<name>`),
/// returning its declared options header and a concrete `Algorithm`
/// selected by the header's `kind=` field (`grid` or `random`; default
/// `random` when the file carries no `kind` or the bare name matches a
/// built-in directly with no file on disk).
pub fn load(name: &str, caller_options: &BTreeMap<String, String>) -> Result<(PluginHeader, Box<dyn Algorithm>)> {
    let mut header = match config::resolve_named(config::ALGORITHMS_DIR, name) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)?;
            PluginHeader::parse(&text)
        }
        None => match name {
            "grid" | "random" => PluginHeader { options: BTreeMap::from([("kind".to_string(), name.to_string())]) },
            other => {
                return Err(Error::ConfigError(format!(
                    "no algorithm named '{other}' found under ./.fz/algorithms or ~/.fz/algorithms"
                )))
            }
        },
    };
    for (k, v) in caller_options {
        header.options.insert(k.clone(), v.clone());
    }

    let kind = header.get("kind").unwrap_or("random").to_string();
    let algorithm: Box<dyn Algorithm> = match kind.as_str() {
        "grid" => Box::new(GridSamplingAlgorithm { steps: header.get_usize("steps", 5) }),
        "random" => Box::new(RandomSamplingAlgorithm { batch_size: header.get_usize("batch_size", 10) }),
        other => return Err(Error::ConfigError(format!("unknown algorithm kind '{other}'"))),
    };
    Ok((header, algorithm))
}

/// Uniform random sampling: one batch of `batch_size` points, then stop.
pub struct RandomSamplingAlgorithm {
    pub batch_size: usize,
}

impl Algorithm for RandomSamplingAlgorithm {
    fn initial_design(&self, var_ranges: &VarRanges, _output_names: &[String]) -> Vec<DesignPoint> {
        let mut rng = rand::thread_rng();
        (0..self.batch_size)
            .map(|_| {
                var_ranges
                    .iter()
                    .map(|(name, (lo, hi))| (name.clone(), Value::Float(rng.gen_range(*lo..=*hi))))
                    .collect()
            })
            .collect()
    }

    fn next_design(&self, _history_x: &[DesignPoint], _history_y: &[Option<f64>]) -> Vec<DesignPoint> {
        Vec::new()
    }

    fn analysis(&self, history_x: &[DesignPoint], history_y: &[Option<f64>]) -> AnalysisResult {
        summarize("random", history_x, history_y)
    }
}

/// Regular grid sampling over every ranged variable with `steps` points per
/// dimension (full factorial), one batch, then stop.
pub struct GridSamplingAlgorithm {
    pub steps: usize,
}

impl Algorithm for GridSamplingAlgorithm {
    fn initial_design(&self, var_ranges: &VarRanges, _output_names: &[String]) -> Vec<DesignPoint> {
        if var_ranges.is_empty() || self.steps == 0 {
            return Vec::new();
        }
        let mut points = vec![DesignPoint::new()];
        for (name, (lo, hi)) in var_ranges {
            let values: Vec<f64> = if self.steps == 1 {
                vec![*lo]
            } else {
                (0..self.steps)
                    .map(|i| lo + (hi - lo) * (i as f64) / ((self.steps - 1) as f64))
                    .collect()
            };
            let mut next = Vec::with_capacity(points.len() * values.len());
            for point in &points {
                for v in &values {
                    let mut p = point.clone();
                    p.insert(name.clone(), Value::Float(*v));
                    next.push(p);
                }
            }
            points = next;
        }
        points
    }

    fn next_design(&self, _history_x: &[DesignPoint], _history_y: &[Option<f64>]) -> Vec<DesignPoint> {
        Vec::new()
    }

    fn analysis(&self, history_x: &[DesignPoint], history_y: &[Option<f64>]) -> AnalysisResult {
        summarize("grid", history_x, history_y)
    }
}

fn summarize(name: &str, history_x: &[DesignPoint], history_y: &[Option<f64>]) -> AnalysisResult {
    let evaluated = history_y.iter().filter(|y| y.is_some()).count();
    let best = history_y
        .iter()
        .enumerate()
        .filter_map(|(i, y)| y.map(|v| (i, v)))
        .max_by(|a, b| a.1.total_cmp(&b.1));
    let text = match best {
        Some((i, v)) => format!(
            "algorithm={name}\nevaluations={total}\nvalid={evaluated}\nbest_index={i}\nbest_value={v}",
            total = history_x.len()
        ),
        None => format!("algorithm={name}\nevaluations={total}\nvalid=0", total = history_x.len()),
    };
    AnalysisResult { text, data: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn plugin_header_parses_leading_key_value_lines() {
        let text = "kind=grid\nsteps=3\n\n# comment below the header\nsome script body\n";
        let header = PluginHeader::parse(text);
        assert_eq!(header.get("kind"), Some("grid"));
        assert_eq!(header.get_usize("steps", 0), 3);
    }

    #[test]
    fn grid_algorithm_produces_full_factorial() {
        let algo = GridSamplingAlgorithm { steps: 2 };
        let mut ranges: VarRanges = IndexMap::new();
        ranges.insert("a".to_string(), (0.0, 1.0));
        ranges.insert("b".to_string(), (10.0, 20.0));
        let points = algo.initial_design(&ranges, &[]);
        assert_eq!(points.len(), 4);
    }

    #[test]
    fn random_algorithm_respects_batch_size_and_bounds() {
        let algo = RandomSamplingAlgorithm { batch_size: 5 };
        let mut ranges: VarRanges = IndexMap::new();
        ranges.insert("a".to_string(), (0.0, 1.0));
        let points = algo.initial_design(&ranges, &[]);
        assert_eq!(points.len(), 5);
        for p in &points {
            let v = p.get("a").unwrap().as_f64().unwrap();
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn both_builtins_stop_after_one_batch() {
        let algo = RandomSamplingAlgorithm { batch_size: 1 };
        assert!(algo.next_design(&[], &[]).is_empty());
    }

    #[test]
    fn load_falls_back_to_bare_builtin_names() {
        let (header, _algo) = load("random", &BTreeMap::new()).unwrap();
        assert_eq!(header.get("kind"), Some("random"));
    }

    #[test]
    fn load_rejects_unknown_name_with_no_file() {
        assert!(load("not-a-real-algorithm-xyz", &BTreeMap::new()).is_err());
    }
}
