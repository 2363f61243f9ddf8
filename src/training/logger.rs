use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::UnetResult;

pub const DEFAULT_LOGNAME: &str = "logs.json";

pub type Metrics = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Epoch(usize),
    /// Summary records (final scores) that belong to no epoch.
    Summary,
}

#[derive(Serialize)]
struct LogRecord<'a> {
    timestamp: f64,
    step: Option<usize>,
    data: &'a Metrics,
}

/// Appends one JSON object per record to a file in the results directory and
/// mirrors each record to the `log` facade.
pub struct MetricsLogger {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl MetricsLogger {
    pub fn new<P: AsRef<Path>>(results: P, logname: &str) -> UnetResult<Self> {
        fs::create_dir_all(results.as_ref())?;
        let path = results.as_ref().join(logname);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(MetricsLogger {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&mut self, step: Step, data: &Metrics) -> UnetResult<()> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let record = LogRecord {
            timestamp,
            step: match step {
                Step::Epoch(epoch) => Some(epoch),
                Step::Summary => None,
            },
            data,
        };
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;

        let rendered = data
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join(" | ");
        match step {
            Step::Epoch(epoch) => log::info!("Epoch: {} {}", epoch, rendered),
            Step::Summary => log::info!("{}", rendered),
        }
        Ok(())
    }

    pub fn flush(&mut self) -> UnetResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Per-class dice as `L1..Ln` plus their mean, rounded to two decimals.
pub fn dice_metrics(dice: &[f32]) -> Metrics {
    let mut metrics = Metrics::new();
    if !dice.is_empty() {
        let mean = dice.iter().map(|&d| d as f64).sum::<f64>() / dice.len() as f64;
        metrics.insert("Mean dice".to_string(), round2(mean));
    }
    for (j, &d) in dice.iter().enumerate() {
        metrics.insert(format!("L{}", j + 1), round2(d as f64));
    }
    metrics
}

pub fn log_dice<P: AsRef<Path>>(logname: &str, dice: &[f32], results: P) -> UnetResult<()> {
    let mut logger = MetricsLogger::new(results, logname)?;
    logger.log(Step::Summary, &dice_metrics(dice))?;
    logger.flush()
}
