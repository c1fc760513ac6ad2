//! Per-iteration metrics and the sinks that receive them.
//!
//! The loop calls [`MetricsLogger::log`] exactly once per completed
//! iteration. Sinks take `&self` and use interior mutability, so one logger
//! can be shared behind an [`Arc`] and inspected while a run is going.
//!
//! - [`MemoryLogger`] - keeps every row in memory
//! - [`TracingLogger`] - emits one `tracing` event per row
//! - [`JsonlLogger`] - appends one JSON object per line (`journal` feature)

use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single metric: a scalar or a sequence of scalars.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum MetricValue {
    /// A number.
    Scalar(f64),
    /// A point or any other vector.
    Sequence(Vec<f64>),
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

impl From<usize> for MetricValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(v: usize) -> Self {
        Self::Scalar(v as f64)
    }
}

impl From<Vec<f64>> for MetricValue {
    fn from(v: Vec<f64>) -> Self {
        Self::Sequence(v)
    }
}

impl From<&[f64]> for MetricValue {
    fn from(v: &[f64]) -> Self {
        Self::Sequence(v.to_vec())
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(v) => write!(f, "{v}"),
            Self::Sequence(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Named metrics of one iteration, ordered by name.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Metrics {
    entries: BTreeMap<String, MetricValue>,
}

impl Metrics {
    /// An empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a metric, builder style.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<MetricValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds or replaces a metric.
    pub fn insert(&mut self, name: &str, value: impl Into<MetricValue>) {
        self.entries.insert(name.to_owned(), value.into());
    }

    /// Looks up a metric by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.entries.get(name)
    }

    /// Looks up a scalar metric.
    #[must_use]
    pub fn scalar(&self, name: &str) -> Option<f64> {
        match self.entries.get(name) {
            Some(MetricValue::Scalar(v)) => Some(*v),
            _ => None,
        }
    }

    /// Looks up a sequence metric.
    #[must_use]
    pub fn sequence(&self, name: &str) -> Option<&[f64]> {
        match self.entries.get(name) {
            Some(MetricValue::Sequence(v)) => Some(v),
            _ => None,
        }
    }

    /// Number of metrics in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the row is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates metrics in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// Receives one [`Metrics`] row per iteration.
///
/// Errors returned from [`log`](Self::log) are reported by the loop but do
/// not stop the run.
pub trait MetricsLogger: Send + Sync {
    /// Records one row.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Logger`](crate::Error::Logger) if the row could not
    /// be recorded.
    fn log(&self, metrics: &Metrics) -> Result<()>;
}

impl<L: MetricsLogger + ?Sized> MetricsLogger for Arc<L> {
    fn log(&self, metrics: &Metrics) -> Result<()> {
        (**self).log(metrics)
    }
}

impl<L: MetricsLogger + ?Sized> MetricsLogger for Box<L> {
    fn log(&self, metrics: &Metrics) -> Result<()> {
        (**self).log(metrics)
    }
}

/// Discards every row.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullLogger;

impl MetricsLogger for NullLogger {
    fn log(&self, _metrics: &Metrics) -> Result<()> {
        Ok(())
    }
}

/// Keeps every row in memory.
///
/// # Examples
///
/// ```
/// use manifold_bo::logger::{MemoryLogger, Metrics, MetricsLogger};
///
/// let logger = MemoryLogger::new();
/// logger.log(&Metrics::new().with("best_value", -1.0)).unwrap();
/// assert_eq!(logger.len(), 1);
/// assert_eq!(logger.rows()[0].scalar("best_value"), Some(-1.0));
/// ```
#[derive(Debug, Default)]
pub struct MemoryLogger {
    rows: Mutex<Vec<Metrics>>,
}

impl MemoryLogger {
    /// An empty logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all rows logged so far.
    #[must_use]
    pub fn rows(&self) -> Vec<Metrics> {
        self.rows.lock().clone()
    }

    /// Number of rows logged so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    /// Whether nothing has been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

impl MetricsLogger for MemoryLogger {
    fn log(&self, metrics: &Metrics) -> Result<()> {
        self.rows.lock().push(metrics.clone());
        Ok(())
    }
}

/// Emits each row as an `info` event.
///
/// Without the `tracing` feature this logger discards rows.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl MetricsLogger for TracingLogger {
    fn log(&self, metrics: &Metrics) -> Result<()> {
        trace_info!(
            iteration = metrics.scalar("iteration"),
            best_value = metrics.scalar("best_value"),
            metrics = %metrics,
            "iteration metrics"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = metrics;
        Ok(())
    }
}

#[cfg(feature = "journal")]
pub use journal::JsonlLogger;

#[cfg(feature = "journal")]
mod journal {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::path::{Path, PathBuf};

    use fs2::FileExt;
    use parking_lot::Mutex;

    use super::{Metrics, MetricsLogger};
    use crate::error::{Error, Result};

    /// Appends each row as one JSON object per line.
    ///
    /// The file is created on the first write. Several processes may share
    /// one file: each write holds an exclusive file lock.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use manifold_bo::logger::JsonlLogger;
    ///
    /// let logger = JsonlLogger::new("metrics.jsonl");
    /// ```
    #[derive(Debug)]
    pub struct JsonlLogger {
        path: PathBuf,
        /// Serialises in-process writes so the file lock is held briefly.
        write_lock: Mutex<()>,
    }

    impl JsonlLogger {
        /// A logger appending to `path`.
        #[must_use]
        pub fn new(path: impl AsRef<Path>) -> Self {
            Self {
                path: path.as_ref().to_path_buf(),
                write_lock: Mutex::new(()),
            }
        }

        /// Target file.
        #[must_use]
        pub fn path(&self) -> &Path {
            &self.path
        }

        /// Reads back every row of a JSONL metrics file.
        ///
        /// # Errors
        ///
        /// Returns [`Error::Logger`] if the file cannot be read or a line
        /// does not parse.
        pub fn read_rows(path: impl AsRef<Path>) -> Result<Vec<Metrics>> {
            let content =
                std::fs::read_to_string(path).map_err(|e| Error::Logger(e.to_string()))?;
            content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| serde_json::from_str(line).map_err(|e| Error::Logger(e.to_string())))
                .collect()
        }
    }

    impl MetricsLogger for JsonlLogger {
        fn log(&self, metrics: &Metrics) -> Result<()> {
            let _guard = self.write_lock.lock();

            let line = serde_json::to_string(metrics).map_err(|e| Error::Logger(e.to_string()))?;

            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| Error::Logger(e.to_string()))?;
            file.lock_exclusive()
                .map_err(|e| Error::Logger(e.to_string()))?;
            writeln!(file, "{line}").map_err(|e| Error::Logger(e.to_string()))?;
            file.flush().map_err(|e| Error::Logger(e.to_string()))?;
            file.unlock().map_err(|e| Error::Logger(e.to_string()))?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_accessors_match_value_kind() {
        let m = Metrics::new()
            .with("iteration", 3_usize)
            .with("best_point", vec![0.0, 1.0]);
        assert_eq!(m.scalar("iteration"), Some(3.0));
        assert_eq!(m.sequence("best_point"), Some(&[0.0, 1.0][..]));
        assert_eq!(m.scalar("best_point"), None);
        assert_eq!(m.len(), 2);
    }

    #[test]
    fn display_is_name_ordered() {
        let m = Metrics::new().with("b", 1.0).with("a", vec![1.0, 2.0]);
        assert_eq!(m.to_string(), "a=[1, 2] b=1");
    }

    #[test]
    fn shared_memory_logger_sees_rows() {
        let logger = Arc::new(MemoryLogger::new());
        let sink: Box<dyn MetricsLogger> = Box::new(Arc::clone(&logger));
        sink.log(&Metrics::new().with("x", 1.0)).unwrap();
        sink.log(&Metrics::new().with("x", 2.0)).unwrap();
        assert_eq!(logger.len(), 2);
        assert_eq!(logger.rows()[1].scalar("x"), Some(2.0));
    }

    #[test]
    fn tracing_and_null_loggers_accept_rows() {
        let m = Metrics::new().with("best_value", 0.5);
        assert!(TracingLogger.log(&m).is_ok());
        assert!(NullLogger.log(&m).is_ok());
    }
}
