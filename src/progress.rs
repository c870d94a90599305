//! Training-progress bookkeeping and checkpoint retention.
//!
//! A [`Reporter`] accumulates per-iteration metrics, collects them into
//! per-pass averages written to a log file, answers threshold conditions on
//! the collected history, and manages saved checkpoint files with optional
//! metric-keyed gating and bounded retention.

use crate::error::{ProgressError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// A reported metric value.
///
/// Integer and float metrics are tracked separately so collected averages
/// format the way they were reported (epoch counters stay integral).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    /// Numeric view used for averaging and comparisons.
    pub fn as_f64(self) -> f64 {
        match self {
            Value::Int(v) => v as f64,
            Value::Float(v) => v,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:.5}"),
        }
    }
}

/// Closed set of comparison operators for metric conditions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cmp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Cmp {
    /// Apply the comparison to `lhs ? rhs`.
    pub fn eval(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Cmp::Gt => lhs > rhs,
            Cmp::Ge => lhs >= rhs,
            Cmp::Lt => lhs < rhs,
            Cmp::Le => lhs <= rhs,
            Cmp::Eq => lhs == rhs,
            Cmp::Ne => lhs != rhs,
        }
    }
}

/// One collected pass of averaged metrics, in report order.
pub type Collected = Vec<(String, Value)>;

/// Options controlling checkpoint saving.
#[derive(Clone, Debug)]
pub struct SaveOptions {
    /// Metric names appended to the saved file-name suffix
    pub add_info: Vec<String>,
    /// Save only when this collected metric improves on the running threshold
    pub by_key: Option<String>,
    /// Direction of improvement for `by_key` (true = larger is better)
    pub by_max: bool,
    /// Keep at most this many saved generations (0 = keep all)
    pub max_retain: usize,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            add_info: Vec::new(),
            by_key: None,
            by_max: true,
            max_retain: 0,
        }
    }
}

/// Training-progress reporter and checkpoint bookkeeper.
pub struct Reporter {
    out_dir: PathBuf,
    log_path: PathBuf,
    current: Vec<(String, Vec<Value>)>,
    history: Vec<Collected>,
    saved: Vec<Vec<(String, PathBuf)>>,
    last_saved: Vec<(String, PathBuf)>,
    threshold: Option<f64>,
    iter_symbol: u64,
}

impl Reporter {
    /// Create the output directory and an empty `log` file inside it.
    pub fn new(out_dir: impl AsRef<Path>) -> Result<Self> {
        let out_dir = out_dir.as_ref().to_path_buf();
        fs::create_dir_all(&out_dir).map_err(ProgressError::Io)?;

        let log_path = out_dir.join("log");
        File::create(&log_path).map_err(ProgressError::Io)?;

        Ok(Self {
            out_dir,
            log_path,
            current: Vec::new(),
            history: Vec::new(),
            saved: Vec::new(),
            last_saved: Vec::new(),
            threshold: None,
            iter_symbol: 0,
        })
    }

    /// Directory holding the log file and saved checkpoints.
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Accumulate one metric value. Names are case-insensitive.
    pub fn report(&mut self, name: &str, value: impl Into<Value>) {
        let name = name.to_lowercase();
        let value = value.into();
        match self.current.iter_mut().find(|(n, _)| *n == name) {
            Some((_, values)) => values.push(value),
            None => self.current.push((name, vec![value])),
        }
    }

    /// Accumulate several metrics at once.
    pub fn report_all<'a>(&mut self, entries: impl IntoIterator<Item = (&'a str, Value)>) {
        for (name, value) in entries {
            self.report(name, value);
        }
    }

    /// Average the accumulated metrics into one collected pass.
    ///
    /// The averages are appended to the in-memory history and written as one
    /// line to the log file; integer metrics stay integral (truncated mean).
    pub fn collect(&mut self) -> Result<Collected> {
        let mut collected = Vec::with_capacity(self.current.len());
        for (name, values) in self.current.drain(..) {
            let mean = if values.is_empty() {
                0.0
            } else {
                values.iter().map(|v| v.as_f64()).sum::<f64>() / values.len() as f64
            };
            let is_float = values.iter().any(|v| matches!(v, Value::Float(_)));
            let value = if is_float {
                Value::Float(mean)
            } else {
                Value::Int(mean as i64)
            };
            collected.push((name, value));
        }

        let line = collected
            .iter()
            .map(|(name, value)| format!("{name}:{value}"))
            .collect::<Vec<_>>()
            .join("    ");
        tracing::info!("{line}");

        let mut log = OpenOptions::new()
            .append(true)
            .open(&self.log_path)
            .map_err(ProgressError::Io)?;
        writeln!(log, "{line}").map_err(ProgressError::Io)?;

        self.history.push(collected.clone());
        Ok(collected)
    }

    /// Most recent collected value for `key`, scanning the history backwards.
    pub fn latest(&self, key: &str) -> Option<Value> {
        let key = key.to_lowercase();
        self.history
            .iter()
            .rev()
            .find_map(|pass| pass.iter().find(|(n, _)| *n == key).map(|(_, v)| *v))
    }

    /// Check a condition against the most recent collected value of `key`.
    ///
    /// Returns false when the key was never collected.
    pub fn judge(&self, key: &str, cmp: Cmp, threshold: f64) -> bool {
        match self.latest(key) {
            Some(value) => cmp.eval(value.as_f64(), threshold),
            None => false,
        }
    }

    /// Check a condition against the relative change between the two most
    /// recent collected values of `key`: `|(new - old) / new|`.
    ///
    /// Returns false until the key has been collected twice.
    pub fn judge_delta_ratio(&self, key: &str, cmp: Cmp, threshold: f64) -> bool {
        let key = key.to_lowercase();
        let mut pair = self
            .history
            .iter()
            .rev()
            .filter_map(|pass| pass.iter().find(|(n, _)| *n == key).map(|(_, v)| v.as_f64()));

        match (pair.next(), pair.next()) {
            (Some(newer), Some(older)) => {
                let ratio = ((newer - older) / newer).abs();
                cmp.eval(ratio, threshold)
            }
            _ => false,
        }
    }

    /// Save a generation of checkpoints through `save_fn`.
    ///
    /// Each `(name, object)` pair is assigned a path under the output
    /// directory, suffixed with a running generation counter (advanced only
    /// when the save goes ahead), any `add_info` metrics
    /// and the gating metric's value. `save_fn` receives all paths at once
    /// and may append its own extension; the final on-disk names are
    /// recovered afterwards by prefix match. With `by_key` set, the save
    /// only happens when that collected metric improves on the best value
    /// seen so far (`by_max` picks the direction). Older generations beyond
    /// `max_retain` are deleted.
    ///
    /// Returns whether the generation was saved.
    pub fn save_archives<A, F>(
        &mut self,
        save_fn: F,
        archs: &[(&str, &A)],
        opts: &SaveOptions,
    ) -> Result<bool>
    where
        F: FnOnce(&[(PathBuf, &A)]) -> Result<()>,
    {
        let mut suffix = format!("_{}", self.iter_symbol);

        for name in &opts.add_info {
            match self.latest(name) {
                Some(value) => suffix.push_str(&metric_suffix(name, value)),
                None => suffix.push_str(&format!("_{}None", name.to_lowercase())),
            }
        }

        // The decision flag starts out false and is only raised by an
        // explicit rule below.
        let mut save = false;

        if let Some(key) = &opts.by_key {
            let Some(value) = self.latest(key) else {
                tracing::warn!(key = %key, "skipping save: gating key was not collected");
                return Ok(false);
            };
            let value = value.as_f64();

            match self.threshold {
                None => {
                    self.threshold = Some(value);
                    save = true;
                }
                Some(best) if opts.by_max && value > best => {
                    self.threshold = Some(value);
                    save = true;
                }
                Some(best) if !opts.by_max && value < best => {
                    self.threshold = Some(value);
                    save = true;
                }
                Some(_) => {}
            }

            if save && !opts.add_info.iter().any(|n| n.eq_ignore_ascii_case(key)) {
                suffix.push_str(&metric_suffix(key, Value::Float(value)));
            }
        } else {
            save = true;
        }

        if !save {
            return Ok(false);
        }

        // Skipped generations keep the numbering contiguous.
        self.iter_symbol += 1;

        let entries: Vec<(PathBuf, &A)> = archs
            .iter()
            .map(|(name, arch)| (self.out_dir.join(format!("{name}{suffix}")), *arch))
            .collect();

        save_fn(&entries)?;

        // `save_fn` may have appended an extension; recover the real file
        // names by prefix match.
        let mut generation = Vec::with_capacity(archs.len());
        for ((name, _), (path, _)) in archs.iter().zip(&entries) {
            let real = self.find_by_prefix(path)?;
            generation.push((name.to_string(), real));
        }

        self.last_saved = generation.clone();
        self.saved.push(generation);

        if opts.max_retain > 0 && self.saved.len() > opts.max_retain {
            let stale = self.saved.drain(..self.saved.len() - opts.max_retain);
            for generation in stale {
                for (name, path) in generation {
                    tracing::debug!(name = %name, path = %path.display(), "pruning saved archive");
                    remove_path(&path)?;
                }
            }
        }

        Ok(true)
    }

    /// The most recently saved generation, as `(name, path)` pairs.
    pub fn last_archives(&self) -> &[(String, PathBuf)] {
        &self.last_saved
    }

    /// All collected passes, collecting any pending reports first.
    pub fn dump(&mut self) -> Result<&[Collected]> {
        if !self.current.is_empty() {
            self.collect()?;
        }
        if self.history.is_empty() {
            return Err(ProgressError::NothingCollected.into());
        }
        Ok(&self.history)
    }

    /// All collected passes grouped per key.
    pub fn dump_by_key(&mut self) -> Result<BTreeMap<String, Vec<Value>>> {
        let mut items: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for pass in self.dump()? {
            for (name, value) in pass {
                items.entry(name.clone()).or_default().push(*value);
            }
        }
        Ok(items)
    }

    fn find_by_prefix(&self, path: &Path) -> Result<PathBuf> {
        let prefix = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut matches = Vec::new();
        for entry in fs::read_dir(&self.out_dir).map_err(ProgressError::Io)? {
            let entry = entry.map_err(ProgressError::Io)?;
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                matches.push(entry.path());
            }
        }

        match matches.len() {
            0 => Err(ProgressError::ArchiveMissing { prefix }.into()),
            1 => Ok(matches.remove(0)),
            _ => Err(ProgressError::ArchiveAmbiguous { prefix }.into()),
        }
    }
}

/// `_{name}{value}` with dots stripped from float values, so suffixes stay
/// file-name safe.
fn metric_suffix(name: &str, value: Value) -> String {
    let rendered = match value {
        Value::Int(v) => v.to_string(),
        Value::Float(v) => format!("{v:.4}").replace('.', ""),
    };
    format!("_{}{rendered}", name.to_lowercase())
}

fn remove_path(path: &Path) -> Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path).map_err(ProgressError::Io)?;
    } else if path.exists() {
        fs::remove_file(path).map_err(ProgressError::Io)?;
    }
    Ok(())
}
