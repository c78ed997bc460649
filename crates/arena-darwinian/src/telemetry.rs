//! Epoch telemetry: metrics sinks and Prometheus gauges
//!
//! Sinks receive one [`InequalitySample`] per epoch. The CSV sink writes rows
//! of the form `timestamp,gini,topKShare` with four decimal places.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use arena_common::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use prometheus::{Gauge, IntCounter, IntGauge, Registry};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::scheduler::EpochReport;

/// Header row of the CSV time series
pub const CSV_HEADER: &str = "timestamp,gini,topKShare";

/// One point of the inequality time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InequalitySample {
    pub timestamp: DateTime<Utc>,
    pub gini: f64,
    pub top_k_share: f64,
}

impl InequalitySample {
    pub fn csv_row(&self) -> String {
        format!(
            "{},{:.4},{:.4}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.gini,
            self.top_k_share
        )
    }
}

/// Destination for epoch metrics
pub trait MetricsSink: Send + Sync {
    fn record(&self, sample: &InequalitySample) -> Result<()>;
}

/// Appends samples to a CSV file
pub struct CsvMetricsSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvMetricsSink {
    /// Create the sink, writing the header if the file is new or empty
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{}", CSV_HEADER)?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for CsvMetricsSink {
    fn record(&self, sample: &InequalitySample) -> Result<()> {
        let _guard = self.lock.lock();
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{}", sample.csv_row())?;
        debug!(row = %sample.csv_row(), "Metrics row appended");
        Ok(())
    }
}

/// Keeps samples in memory
#[derive(Default)]
pub struct MemoryMetricsSink {
    samples: Mutex<Vec<InequalitySample>>,
}

impl MemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<InequalitySample> {
        self.samples.lock().clone()
    }
}

impl MetricsSink for MemoryMetricsSink {
    fn record(&self, sample: &InequalitySample) -> Result<()> {
        self.samples.lock().push(sample.clone());
        Ok(())
    }
}

/// Prometheus gauges updated after every epoch
pub struct EpochTelemetry {
    gini: Gauge,
    top_k_share: Gauge,
    alive_agents: IntGauge,
    epochs: IntCounter,
    offspring: IntCounter,
    culled: IntCounter,
}

impl EpochTelemetry {
    /// Create the gauges and register them with `registry`
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let telemetry = Self {
            gini: Gauge::new("arena_gini", "Gini coefficient of alive balances")?,
            top_k_share: Gauge::new("arena_top_k_share", "Share of balance held by the top K agents")?,
            alive_agents: IntGauge::new("arena_alive_agents", "Alive agents after the last epoch")?,
            epochs: IntCounter::new("arena_epochs_total", "Completed epochs")?,
            offspring: IntCounter::new("arena_offspring_total", "Offspring created")?,
            culled: IntCounter::new("arena_culled_total", "Agents culled")?,
        };

        registry.register(Box::new(telemetry.gini.clone()))?;
        registry.register(Box::new(telemetry.top_k_share.clone()))?;
        registry.register(Box::new(telemetry.alive_agents.clone()))?;
        registry.register(Box::new(telemetry.epochs.clone()))?;
        registry.register(Box::new(telemetry.offspring.clone()))?;
        registry.register(Box::new(telemetry.culled.clone()))?;
        Ok(telemetry)
    }

    pub fn observe(&self, report: &EpochReport) {
        self.gini.set(report.gini);
        self.top_k_share.set(report.top_k_share);
        self.alive_agents.set(report.alive_after as i64);
        self.epochs.inc();
        self.offspring.inc_by(report.offspring as u64);
        self.culled.inc_by(report.culled.len() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_csv_row_format() {
        let sample = InequalitySample {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            gini: 2.0 / 3.0,
            top_k_share: 1.0,
        };
        assert_eq!(sample.csv_row(), "2024-05-01T12:00:00Z,0.6667,1.0000");
    }

    #[test]
    fn test_csv_sink_appends_with_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.csv");
        let sample = InequalitySample {
            timestamp: Utc::now(),
            gini: 0.25,
            top_k_share: 0.5,
        };

        CsvMetricsSink::create(&path).unwrap().record(&sample).unwrap();
        CsvMetricsSink::create(&path).unwrap().record(&sample).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].ends_with(",0.2500,0.5000"));
    }

    #[test]
    fn test_telemetry_registers_once() {
        let registry = Registry::new();
        assert!(EpochTelemetry::register(&registry).is_ok());
        // Duplicate names are rejected by the registry
        assert!(EpochTelemetry::register(&registry).is_err());
    }
}
