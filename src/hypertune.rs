use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

use crate::config::HypertuneConfig;
use crate::error::{Result, TrainError};

const MAX_REPORTED_METRICS: usize = 100;

/// Writes tuning metrics to the file the tuning service polls. The file is
/// rewritten on every report with one JSON object per line.
pub struct HyperTune {
    metric_path: PathBuf,
    trial_id: String,
    reported: VecDeque<Map<String, Value>>,
}

impl HyperTune {
    pub fn new(metric_path: PathBuf, trial_id: String) -> Self {
        Self {
            metric_path,
            trial_id,
            reported: VecDeque::new(),
        }
    }

    pub fn from_config(config: &HypertuneConfig) -> Self {
        Self::new(config.metric_path.clone(), config.trial_id.clone())
    }

    pub fn report_hyperparameter_tuning_metric(
        &mut self,
        metric_tag: &str,
        metric_value: f64,
        global_step: Option<u64>,
    ) -> Result<()> {
        if metric_tag.trim().is_empty() {
            return Err(TrainError::Report("metric tag must not be empty".to_string()));
        }
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or_default();

        let mut body = Map::new();
        body.insert("timestamp".to_string(), Value::from(timestamp));
        body.insert("trial".to_string(), Value::from(self.trial_id.clone()));
        body.insert(metric_tag.to_string(), Value::from(metric_value.to_string()));
        body.insert(
            "global_step".to_string(),
            Value::from(global_step.unwrap_or(0).to_string()),
        );
        body.insert("checkpoint_path".to_string(), Value::from(String::new()));

        if self.reported.len() == MAX_REPORTED_METRICS {
            self.reported.pop_front();
        }
        self.reported.push_back(body);
        self.flush()?;

        info!(
            path = %self.metric_path.display(),
            tag = metric_tag,
            value = metric_value,
            trial = %self.trial_id,
            "reported tuning metric"
        );
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.metric_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    TrainError::Report(format!("failed to create {}: {}", parent.display(), err))
                })?;
            }
        }
        let file = File::create(&self.metric_path).map_err(|err| {
            TrainError::Report(format!("failed to open {}: {}", self.metric_path.display(), err))
        })?;
        let mut writer = BufWriter::new(file);
        for metric in &self.reported {
            let line = serde_json::to_string(metric)
                .map_err(|err| TrainError::Report(format!("failed to encode metric: {}", err)))?;
            writeln!(writer, "{}", line)
                .map_err(|err| TrainError::Report(format!("failed to write metric: {}", err)))?;
        }
        writer
            .flush()
            .map_err(|err| TrainError::Report(format!("failed to write metric: {}", err)))
    }
}
