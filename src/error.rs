use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("input error: {0}")]
    Input(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("fit error: {0}")]
    Fit(String),
    #[error("metric error: {0}")]
    Metric(String),
    #[error("report error: {0}")]
    Report(String),
    #[error("publish error: {0}")]
    Publish(String),
}

pub type Result<T> = std::result::Result<T, TrainError>;
