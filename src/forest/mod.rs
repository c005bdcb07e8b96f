pub mod tree;

use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ForestConfig, MaxFeatures};
use crate::error::{Result, TrainError};

pub use tree::{DecisionTree, Node, TreeParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestParams {
    pub max_depth: Option<usize>,
    pub n_estimators: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            n_estimators: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: MaxFeatures,
    bootstrap: bool,
    seed: Option<u64>,
    classes: Vec<u8>,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(config: &ForestConfig) -> Self {
        Self {
            params: ForestParams::default(),
            min_samples_split: config.min_samples_split,
            min_samples_leaf: config.min_samples_leaf,
            max_features: config.max_features,
            bootstrap: config.bootstrap,
            seed: config.seed,
            classes: Vec::new(),
            trees: Vec::new(),
        }
    }

    pub fn set_params(&mut self, params: ForestParams) {
        self.params = params;
    }

    pub fn classes(&self) -> &[u8] {
        &self.classes
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Seed used by the last fit, or the configured one before fitting.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<u8>) -> Result<()> {
        if self.params.n_estimators == 0 {
            return Err(TrainError::Fit("n_estimators must be at least 1".to_string()));
        }
        if self.params.max_depth == Some(0) {
            return Err(TrainError::Fit("max_depth must be at least 1".to_string()));
        }
        if x.nrows() == 0 {
            return Err(TrainError::Fit("cannot fit on zero rows".to_string()));
        }
        if x.nrows() != y.len() {
            return Err(TrainError::Fit(format!(
                "{} feature rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }
        if x.iter().any(|value| !value.is_finite()) {
            return Err(TrainError::Fit("features contain non-finite values".to_string()));
        }

        let mut classes = y.to_vec();
        classes.sort_unstable();
        classes.dedup();
        let targets = y
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or(0))
            .collect::<Vec<_>>();

        let seed = self.seed.unwrap_or_else(|| rand::thread_rng().gen());
        let mut master = StdRng::seed_from_u64(seed);
        let tree_params = TreeParams {
            max_depth: self.params.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
        };

        let mut trees = Vec::with_capacity(self.params.n_estimators);
        for index in 0..self.params.n_estimators {
            let mut rng = StdRng::seed_from_u64(master.gen());
            let samples = if self.bootstrap {
                tree::bootstrap_indices(x.nrows(), &mut rng)
            } else {
                (0..x.nrows()).collect()
            };
            let tree = DecisionTree::fit(x, &targets, classes.len(), samples, &tree_params, &mut rng);
            debug!(tree = index, nodes = tree.n_nodes(), depth = tree.depth(), "tree fitted");
            trees.push(tree);
        }

        self.seed = Some(seed);
        self.classes = classes;
        self.trees = trees;
        Ok(())
    }

    /// Mean class distribution over all trees, one column per entry of `classes()`.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(TrainError::Fit("forest used before fit".to_string()));
        }
        let n_classes = self.classes.len();
        let mut proba = Array2::<f64>::zeros((x.nrows(), n_classes));
        for (row_index, row) in x.rows().into_iter().enumerate() {
            for tree in &self.trees {
                for (class, p) in tree.predict_row(row).iter().enumerate() {
                    proba[[row_index, class]] += p;
                }
            }
        }
        proba /= self.trees.len() as f64;
        Ok(proba)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<u8>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                let mut best = 0;
                for (index, p) in row.iter().enumerate() {
                    if *p > row[best] {
                        best = index;
                    }
                }
                self.classes[best]
            })
            .collect())
    }
}
