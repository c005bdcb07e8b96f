pub mod config;
pub mod error;
pub mod forest;
pub mod hypertune;
pub mod metrics;
pub mod pipeline;
pub mod preprocess;
pub mod publish;
pub mod table;

use std::path::Path;
use tracing::info;

use crate::config::TrainerConfig;
use crate::error::{Result, TrainError};
use crate::forest::ForestParams;
use crate::hypertune::HyperTune;
use crate::pipeline::Pipeline;
use crate::table::Table;

#[derive(Debug, Clone)]
pub struct TrainJob {
    pub job_dir: Option<String>,
    pub training_dataset_path: String,
    pub validation_dataset_path: String,
    pub max_depth: usize,
    pub n_estimators: usize,
    pub hptune: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    MetricReported { metric_tag: String, value: f64 },
    ModelPublished { remote_path: String },
}

pub fn train_evaluate(job: &TrainJob, config: &TrainerConfig) -> Result<Outcome> {
    let job_dir = if job.hptune {
        None
    } else {
        Some(job.job_dir.as_deref().filter(|dir| !dir.trim().is_empty()).ok_or_else(|| {
            TrainError::Config("job_dir is required when not tuning".to_string())
        })?)
    };

    let staging = tempfile::tempdir()
        .map_err(|err| TrainError::Input(format!("failed to create staging dir: {}", err)))?;
    let training_path = publish::stage_input(
        &job.training_dataset_path,
        "training",
        staging.path(),
        &config.publish,
    )?;
    let validation_path = publish::stage_input(
        &job.validation_dataset_path,
        "validation",
        staging.path(),
        &config.publish,
    )?;

    let mut train = load_table(&training_path)?;
    let validation = load_table(&validation_path)?;

    if !job.hptune {
        train = train.concat(validation.clone())?;
        info!(rows = train.n_rows(), "merged validation rows into training");
    }

    let label = config.data.label_column.as_str();
    let numeric_features = config.data.feature_start..config.data.feature_end;
    let x_train = train.features(label, 0..config.data.feature_end)?;
    let y_train = train.labels(label)?;

    let mut pipeline = Pipeline::new(numeric_features, &config.forest);
    pipeline.set_params(ForestParams {
        max_depth: Some(job.max_depth),
        n_estimators: job.n_estimators,
    });

    info!(
        rows = x_train.nrows(),
        max_depth = job.max_depth,
        n_estimators = job.n_estimators,
        "fitting pipeline"
    );
    pipeline.fit(&x_train, &y_train)?;
    info!(
        seed = pipeline.classifier().seed(),
        classes = ?pipeline.classifier().classes(),
        "pipeline fitted"
    );

    match job_dir {
        None => {
            let x_validation = validation.features(label, 0..config.data.feature_end)?;
            let y_validation = validation.labels(label)?;
            let y_pred_proba = pipeline.predict_positive_proba(&x_validation)?;
            let auc = metrics::roc_auc_score(y_validation.view(), y_pred_proba.view())?;

            println!("Model {}: {}", config.hypertune.metric_tag, format_metric(auc));

            let mut hpt = HyperTune::from_config(&config.hypertune);
            hpt.report_hyperparameter_tuning_metric(&config.hypertune.metric_tag, auc, None)?;
            Ok(Outcome::MetricReported {
                metric_tag: config.hypertune.metric_tag.clone(),
                value: auc,
            })
        }
        Some(job_dir) => {
            let remote_path = publish::publish_model(&pipeline, job_dir, &config.publish)?;
            println!("Saved model in: {}", remote_path);
            Ok(Outcome::ModelPublished { remote_path })
        }
    }
}

/// Scores a persisted pipeline against a labeled CSV.
pub fn score_model(model_path: &Path, dataset_path: &str, config: &TrainerConfig) -> Result<f64> {
    let pipeline = Pipeline::load(model_path)?;
    let staging = tempfile::tempdir()
        .map_err(|err| TrainError::Input(format!("failed to create staging dir: {}", err)))?;
    let local = publish::stage_input(dataset_path, "dataset", staging.path(), &config.publish)?;
    let table = load_table(&local)?;

    let label = config.data.label_column.as_str();
    let x = table.features(label, 0..config.data.feature_end)?;
    let y = table.labels(label)?;
    let proba = pipeline.predict_positive_proba(&x)?;
    metrics::roc_auc_score(y.view(), proba.view())
}

/// Always renders a decimal point so `1` prints as `1.0`.
pub fn format_metric(value: f64) -> String {
    format!("{:?}", value)
}

fn load_table(path: &Path) -> Result<Table> {
    let table = Table::read_csv(path)?;
    info!(
        path = %path.display(),
        rows = table.n_rows(),
        columns = table.columns().len(),
        "loaded table"
    );
    Ok(table)
}
