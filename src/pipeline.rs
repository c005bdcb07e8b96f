use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::ops::Range;
use std::path::Path;

use crate::config::ForestConfig;
use crate::error::{Result, TrainError};
use crate::forest::{ForestParams, RandomForest};
use crate::preprocess::ColumnScaler;

pub const POSITIVE_CLASS: u8 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    preprocessor: ColumnScaler,
    classifier: RandomForest,
}

impl Pipeline {
    pub fn new(numeric_features: Range<usize>, forest: &ForestConfig) -> Self {
        Self {
            preprocessor: ColumnScaler::new(numeric_features),
            classifier: RandomForest::new(forest),
        }
    }

    pub fn set_params(&mut self, params: ForestParams) {
        self.classifier.set_params(params);
    }

    pub fn preprocessor(&self) -> &ColumnScaler {
        &self.preprocessor
    }

    pub fn classifier(&self) -> &RandomForest {
        &self.classifier
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<u8>) -> Result<()> {
        let scaled = self.preprocessor.fit_transform(x)?;
        self.classifier.fit(&scaled, y)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let scaled = self.preprocessor.transform(x)?;
        self.classifier.predict_proba(&scaled)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<u8>> {
        let scaled = self.preprocessor.transform(x)?;
        self.classifier.predict(&scaled)
    }

    pub fn predict_positive_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let column = self
            .classifier
            .classes()
            .iter()
            .position(|class| *class == POSITIVE_CLASS)
            .ok_or_else(|| {
                TrainError::Metric(format!(
                    "class {} was not present during fit (classes {:?})",
                    POSITIVE_CLASS,
                    self.classifier.classes()
                ))
            })?;
        let proba = self.predict_proba(x)?;
        Ok(proba.column(column).to_owned())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|err| TrainError::Publish(format!("failed to serialize pipeline: {}", err)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|err| TrainError::Input(format!("failed to deserialize pipeline: {}", err)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|err| {
            TrainError::Publish(format!("failed to create {}: {}", path.display(), err))
        })?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)
            .map_err(|err| TrainError::Publish(format!("failed to serialize pipeline: {}", err)))?;
        writer
            .flush()
            .map_err(|err| TrainError::Publish(format!("failed to write {}: {}", path.display(), err)))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|err| TrainError::Input(format!("failed to open {}: {}", path.display(), err)))?;
        bincode::deserialize_from(BufReader::new(file))
            .map_err(|err| TrainError::Input(format!("failed to deserialize {}: {}", path.display(), err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn fitted() -> (Pipeline, Array2<f64>) {
        let x = array![
            [0.0, 100.0, 7.0],
            [1.0, 110.0, 7.0],
            [2.0, 120.0, 7.0],
            [10.0, 900.0, 7.0],
            [11.0, 910.0, 7.0],
            [12.0, 920.0, 7.0]
        ];
        let y = array![0, 0, 0, 1, 1, 1];
        let config = ForestConfig {
            seed: Some(5),
            ..ForestConfig::default()
        };
        let mut pipeline = Pipeline::new(0..2, &config);
        pipeline.set_params(ForestParams {
            max_depth: Some(3),
            n_estimators: 8,
        });
        pipeline.fit(&x, &y).unwrap();
        (pipeline, x)
    }

    #[test]
    fn fit_standardizes_only_the_numeric_range() {
        let (pipeline, _) = fitted();
        let scaler = pipeline.preprocessor().scaler();
        assert_eq!(scaler.mean().unwrap().len(), 2);
        assert!((scaler.mean().unwrap()[0] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn positive_probability_ranks_positive_rows_higher() {
        let (pipeline, x) = fitted();
        let proba = pipeline.predict_positive_proba(&x).unwrap();
        assert!(proba[0] < proba[5]);
        assert!(proba[2] < proba[3]);
    }

    #[test]
    fn bytes_round_trip_preserves_predictions() {
        let (pipeline, x) = fitted();
        let restored = Pipeline::from_bytes(&pipeline.to_bytes().unwrap()).unwrap();
        let before = pipeline.predict_proba(&x).unwrap();
        let after = restored.predict_proba(&x).unwrap();
        assert!(before
            .iter()
            .zip(after.iter())
            .all(|(a, b)| a.to_bits() == b.to_bits()));
    }

    #[test]
    fn missing_positive_class_is_a_metric_error() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0, 0, 0];
        let mut pipeline = Pipeline::new(0..1, &ForestConfig::default());
        pipeline.set_params(ForestParams {
            max_depth: Some(2),
            n_estimators: 3,
        });
        pipeline.fit(&x, &y).unwrap();
        assert!(matches!(
            pipeline.predict_positive_proba(&x),
            Err(TrainError::Metric(_))
        ));
    }
}
