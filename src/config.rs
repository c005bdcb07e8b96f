use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Result, TrainError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub label_column: String,
    pub feature_start: usize,
    pub feature_end: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            label_column: "Class".to_string(),
            feature_start: 0,
            feature_end: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        let n = n_features as f64;
        let count = match self {
            MaxFeatures::Sqrt => n.sqrt().floor() as usize,
            MaxFeatures::Log2 => n.log2().floor() as usize,
            MaxFeatures::All => n_features,
        };
        count.clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub seed: Option<u64>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            seed: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub model_filename: String,
    pub local_dir: Option<PathBuf>,
    pub copy_program: String,
    pub copy_args: Vec<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            model_filename: "model.pkl".to_string(),
            local_dir: None,
            copy_program: "gsutil".to_string(),
            copy_args: vec!["cp".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HypertuneConfig {
    pub metric_tag: String,
    pub metric_path: PathBuf,
    pub trial_id: String,
}

impl Default for HypertuneConfig {
    fn default() -> Self {
        Self {
            metric_tag: "roc_auc".to_string(),
            metric_path: PathBuf::from("/tmp/hypertune/output.metrics"),
            trial_id: "0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub data: DataConfig,
    pub forest: ForestConfig,
    pub publish: PublishConfig,
    pub hypertune: HypertuneConfig,
}

impl TrainerConfig {
    pub fn load(path: Option<PathBuf>) -> Result<(Self, Option<PathBuf>)> {
        let config_path = path.or_else(default_config_path);
        let mut config = if let Some(path) = config_path.as_ref() {
            if path.exists() {
                let contents = std::fs::read_to_string(path).map_err(|err| {
                    TrainError::Config(format!("failed to read config: {}", err))
                })?;
                Self::from_toml(&contents)?
            } else {
                TrainerConfig::default()
            }
        } else {
            TrainerConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok((config, config_path))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|err| TrainError::Config(format!("failed to parse config: {}", err)))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| TrainError::Config(format!("failed to create config dir: {}", err)))?;
        }
        let payload = toml::to_string_pretty(self)
            .map_err(|err| TrainError::Config(format!("failed to serialize config: {}", err)))?;
        std::fs::write(path, payload)
            .map_err(|err| TrainError::Config(format!("failed to write config: {}", err)))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.data.feature_end <= self.data.feature_start {
            return Err(TrainError::Config(format!(
                "empty feature range {}..{}",
                self.data.feature_start, self.data.feature_end
            )));
        }
        if self.data.label_column.trim().is_empty() {
            return Err(TrainError::Config("label_column must not be empty".to_string()));
        }
        if self.forest.min_samples_split < 2 {
            return Err(TrainError::Config(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        if self.forest.min_samples_leaf < 1 {
            return Err(TrainError::Config(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        if self.publish.model_filename.trim().is_empty() {
            return Err(TrainError::Config("model_filename must not be empty".to_string()));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(seed) = env::var("TRAINER_SEED") {
            if let Ok(value) = seed.trim().parse::<u64>() {
                self.forest.seed = Some(value);
            }
        }
        if let Ok(program) = env::var("TRAINER_COPY_PROGRAM") {
            if !program.trim().is_empty() {
                self.publish.copy_program = program;
            }
        }
        if let Ok(path) = env::var("CLOUD_ML_HP_METRIC_FILE") {
            if !path.trim().is_empty() {
                self.hypertune.metric_path = PathBuf::from(path);
            }
        }
        if let Ok(trial) = env::var("CLOUD_ML_TRIAL_ID") {
            if !trial.trim().is_empty() {
                self.hypertune.trial_id = trial;
            }
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    env::var("TRAINER_CONFIG_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| Some(PathBuf::from("config/trainer.toml")))
}
