use ndarray::{Array2, ArrayView1};
use rand::{rngs::StdRng, seq::index, Rng};
use serde::{Deserialize, Serialize};

use crate::config::MaxFeatures;

#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    n_classes: usize,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl DecisionTree {
    /// `targets` holds class indexes in `0..n_classes`. `samples` may repeat rows.
    pub fn fit(
        x: &Array2<f64>,
        targets: &[usize],
        n_classes: usize,
        samples: Vec<usize>,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            n_classes,
        };
        tree.grow(x, targets, samples, 0, params, rng);
        tree
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        self.depth_from(0)
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    fn depth_from(&self, index: usize) -> usize {
        match &self.nodes[index] {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => {
                1 + self.depth_from(*left).max(self.depth_from(*right))
            }
        }
    }

    fn grow(
        &mut self,
        x: &Array2<f64>,
        targets: &[usize],
        samples: Vec<usize>,
        depth: usize,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> usize {
        let counts = class_counts(targets, &samples, self.n_classes);
        let node_index = self.nodes.len();
        self.nodes.push(Node::Leaf {
            distribution: normalize(&counts),
        });

        let depth_reached = params.max_depth.map_or(false, |max| depth >= max);
        let pure = counts.iter().filter(|count| **count > 0).count() <= 1;
        if depth_reached || pure || samples.len() < params.min_samples_split {
            return node_index;
        }

        let parent_impurity = gini(&counts, samples.len());
        let split = match self.best_split(x, targets, &samples, params, rng) {
            Some(split) if split.impurity < parent_impurity - 1e-12 => split,
            _ => return node_index,
        };

        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|sample| x[[*sample, split.feature]] <= split.threshold);

        let left = self.grow(x, targets, left_samples, depth + 1, params, rng);
        let right = self.grow(x, targets, right_samples, depth + 1, params, rng);
        self.nodes[node_index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        node_index
    }

    fn best_split(
        &self,
        x: &Array2<f64>,
        targets: &[usize],
        samples: &[usize],
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Option<SplitCandidate> {
        let n_features = x.ncols();
        let n_draw = params.max_features.resolve(n_features);
        let features = index::sample(rng, n_features, n_draw).into_vec();

        let total = class_counts(targets, samples, self.n_classes);
        let n = samples.len();
        let mut best: Option<SplitCandidate> = None;
        let mut ordered = samples.to_vec();

        for feature in features {
            ordered.sort_by(|a, b| x[[*a, feature]].total_cmp(&x[[*b, feature]]));

            let mut left = vec![0usize; self.n_classes];
            for position in 0..n - 1 {
                left[targets[ordered[position]]] += 1;
                let current = x[[ordered[position], feature]];
                let next = x[[ordered[position + 1], feature]];
                if next <= current {
                    continue;
                }

                let n_left = position + 1;
                let n_right = n - n_left;
                if n_left < params.min_samples_leaf || n_right < params.min_samples_leaf {
                    continue;
                }

                let right = total
                    .iter()
                    .zip(left.iter())
                    .map(|(all, l)| all - l)
                    .collect::<Vec<_>>();
                let impurity = (n_left as f64 * gini(&left, n_left)
                    + n_right as f64 * gini(&right, n_right))
                    / n as f64;

                let better = match &best {
                    Some(current_best) => impurity < current_best.impurity,
                    None => true,
                };
                if better {
                    let mut threshold = current / 2.0 + next / 2.0;
                    if threshold >= next || !threshold.is_finite() {
                        threshold = current;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        impurity,
                    });
                }
            }
        }

        best
    }
}

pub fn bootstrap_indices(n_rows: usize, rng: &mut StdRng) -> Vec<usize> {
    (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect()
}

fn class_counts(targets: &[usize], samples: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for sample in samples {
        counts[targets[*sample]] += 1;
    }
    counts
}

fn normalize(counts: &[usize]) -> Vec<f64> {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return vec![0.0; counts.len()];
    }
    counts
        .iter()
        .map(|count| *count as f64 / total as f64)
        .collect()
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|count| {
            let p = *count as f64 / total;
            p * p
        })
        .sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn params(max_depth: Option<usize>) -> TreeParams {
        TreeParams {
            max_depth,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
        }
    }

    #[test]
    fn separable_data_is_fit_exactly() {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0], [12.0]];
        let targets = vec![0, 0, 0, 1, 1, 1];
        let mut rng = StdRng::seed_from_u64(1);
        let tree = DecisionTree::fit(&x, &targets, 2, (0..6).collect(), &params(None), &mut rng);

        assert_eq!(tree.depth(), 1);
        for (row, target) in x.rows().into_iter().zip(targets.iter()) {
            assert_eq!(tree.predict_row(row)[*target], 1.0);
        }
        assert_eq!(tree.predict_row(array![6.0].view()), &[1.0, 0.0]);
    }

    #[test]
    fn max_depth_limits_growth() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0]];
        let targets = vec![0, 1, 0, 1, 0, 1];
        let mut rng = StdRng::seed_from_u64(3);
        let tree = DecisionTree::fit(&x, &targets, 2, (0..6).collect(), &params(Some(2)), &mut rng);
        assert!(tree.depth() <= 2);

        let stump = DecisionTree::fit(&x, &targets, 2, (0..6).collect(), &params(Some(0)), &mut rng);
        assert_eq!(stump.n_nodes(), 1);
        assert_eq!(stump.predict_row(array![0.0].view()), &[0.5, 0.5]);
    }

    #[test]
    fn single_class_yields_single_leaf() {
        let x = array![[0.0], [1.0], [2.0]];
        let targets = vec![0, 0, 0];
        let mut rng = StdRng::seed_from_u64(5);
        let tree = DecisionTree::fit(&x, &targets, 1, (0..3).collect(), &params(None), &mut rng);
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.predict_row(array![7.0].view()), &[1.0]);
    }

    #[test]
    fn bootstrap_draws_within_bounds() {
        let mut rng = StdRng::seed_from_u64(9);
        let indices = bootstrap_indices(10, &mut rng);
        assert_eq!(indices.len(), 10);
        assert!(indices.iter().all(|index| *index < 10));
    }

    #[test]
    fn gini_of_balanced_binary_is_half() {
        assert!((gini(&[5, 5], 10) - 0.5).abs() < 1e-12);
        assert_eq!(gini(&[4, 0], 4), 0.0);
    }
}
