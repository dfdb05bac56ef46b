//! Bagged CART regression trees.
use itertools::Itertools;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// None grows every tree until its leaves are pure
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    params: ForestParams,
    trees: Vec<RegressionTree>,
}

impl RandomForestRegressor {
    /// Fits `params.n_estimators` trees on bootstrap samples of the rows.
    ///
    /// Every tree draws from its own ChaCha stream, so the result does not depend
    /// on how rayon schedules the work.
    pub fn fit<R>(params: ForestParams, x: &[R], y: &[f64]) -> Self
    where
        R: AsRef<[f64]> + Sync,
    {
        let n = x.len().min(y.len());
        let estimators = params.n_estimators.max(1);

        let trees = (0..estimators)
            .into_par_iter()
            .map(|tree_index| {
                let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
                rng.set_stream(tree_index as u64);

                let sample = (0..n).map(|_| rng.gen_range(0..n)).collect_vec();

                RegressionTree::fit(&params, x, y, sample)
            })
            .collect();

        RandomForestRegressor { params, trees }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }

        self.trees.iter().map(|t| t.predict(row)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Nodes live in one arena, the root is index 0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct RegressionTree {
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    cost: f64,
}

impl RegressionTree {
    fn fit<R: AsRef<[f64]>>(params: &ForestParams, x: &[R], y: &[f64], sample: Vec<usize>) -> Self {
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut pending = vec![(0usize, sample, 0usize)];

        while let Some((node_id, indices, depth)) = pending.pop() {
            let value = if indices.is_empty() {
                0.0
            } else {
                indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64
            };

            let may_split = indices.len() >= params.min_samples_split.max(2)
                && params.max_depth.is_none_or(|max| depth < max);

            let split = if may_split {
                best_split(x, y, &indices, params.min_samples_leaf.max(1))
            } else {
                None
            };

            let Some(split) = split else {
                nodes[node_id] = Node::Leaf { value };
                continue;
            };

            let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| x[i].as_ref()[split.feature] <= split.threshold);

            if left_indices.is_empty() || right_indices.is_empty() {
                nodes[node_id] = Node::Leaf { value };
                continue;
            }

            let left = nodes.len();
            let right = left + 1;
            nodes.push(Node::Leaf { value: 0.0 });
            nodes.push(Node::Leaf { value: 0.0 });
            nodes[node_id] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };

            pending.push((right, right_indices, depth + 1));
            pending.push((left, left_indices, depth + 1));
        }

        RegressionTree { nodes }
    }

    fn predict(&self, row: &[f64]) -> f64 {
        let mut node_id = 0;

        loop {
            match &self.nodes[node_id] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let v = row.get(*feature).copied().unwrap_or(0.0);
                    node_id = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// The split minimising the summed squared error of both children.
/// None when the node is already pure or no two feature values differ.
fn best_split<R: AsRef<[f64]>>(
    x: &[R],
    y: &[f64],
    indices: &[usize],
    min_samples_leaf: usize,
) -> Option<SplitCandidate> {
    let n = indices.len();
    let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();
    let parent_cost = total_sq - total_sum * total_sum / n as f64;

    if parent_cost <= 1e-12 {
        return None;
    }

    let width = x[indices[0]].as_ref().len();
    let mut best: Option<SplitCandidate> = None;

    for feature in 0..width {
        let sorted = indices
            .iter()
            .copied()
            .sorted_by(|&a, &b| x[a].as_ref()[feature].total_cmp(&x[b].as_ref()[feature]))
            .collect_vec();

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;

        for left_count in 1..n {
            let moved = y[sorted[left_count - 1]];
            left_sum += moved;
            left_sq += moved * moved;

            if left_count < min_samples_leaf || n - left_count < min_samples_leaf {
                continue;
            }

            let lower = x[sorted[left_count - 1]].as_ref()[feature];
            let upper = x[sorted[left_count]].as_ref()[feature];
            if lower >= upper {
                continue;
            }

            let right_count = (n - left_count) as f64;
            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;

            let cost = (left_sq - left_sum * left_sum / left_count as f64)
                + (right_sq - right_sum * right_sum / right_count);

            if best.as_ref().is_none_or(|b| cost < b.cost) {
                let mut threshold = lower + (upper - lower) / 2.0;
                // adjacent floats can round the midpoint up onto `upper`
                if threshold >= upper {
                    threshold = lower;
                }

                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    cost,
                });
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (Vec<[f64; 2]>, Vec<f64>) {
        let x = (0..40)
            .map(|i| [i as f64, (i % 3) as f64])
            .collect_vec();
        let y = (0..40).map(|i| if i < 20 { 10.0 } else { 90.0 }).collect_vec();

        (x, y)
    }

    #[test]
    fn test_single_tree_learns_step() {
        let (x, y) = step_data();
        let params = ForestParams::default();

        let tree = RegressionTree::fit(&params, &x, &y, (0..x.len()).collect());

        assert_eq!(tree.predict(&[3.0, 0.0]), 10.0);
        assert_eq!(tree.predict(&[35.0, 2.0]), 90.0);
        // root split sits between 19 and 20
        match &tree.nodes[0] {
            Node::Split {
                feature, threshold, ..
            } => {
                assert_eq!(*feature, 0);
                assert_eq!(*threshold, 19.5);
            }
            Node::Leaf { .. } => panic!("expected a split at the root"),
        }
    }

    #[test]
    fn test_max_depth_zero_predicts_mean() {
        let (x, y) = step_data();
        let params = ForestParams {
            max_depth: Some(0),
            ..ForestParams::default()
        };

        let tree = RegressionTree::fit(&params, &x, &y, (0..x.len()).collect());

        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.predict(&[0.0, 0.0]), 50.0);
    }

    #[test]
    fn test_forest_is_deterministic_and_bounded() {
        let (x, y) = step_data();
        let params = ForestParams {
            n_estimators: 15,
            ..ForestParams::default()
        };

        let a = RandomForestRegressor::fit(params, &x, &y);
        let b = RandomForestRegressor::fit(params, &x, &y);

        assert_eq!(a, b);
        assert_eq!(a.tree_count(), 15);

        for row in [[0.0, 0.0], [19.0, 1.0], [20.0, 2.0], [1000.0, -5.0]] {
            let p = a.predict(&row);
            assert!((10.0..=90.0).contains(&p), "prediction {p} out of target range");
        }

        assert!(a.predict(&[2.0, 0.0]) < 30.0);
        assert!(a.predict(&[38.0, 0.0]) > 70.0);
    }

    #[test]
    fn test_constant_target_gives_single_leaf() {
        let x = vec![[1.0], [2.0], [3.0]];
        let y = vec![5.0, 5.0, 5.0];

        let tree = RegressionTree::fit(&ForestParams::default(), &x, &y, vec![0, 1, 2]);

        assert_eq!(tree.nodes, vec![Node::Leaf { value: 5.0 }]);
    }

    #[test]
    fn test_identical_features_cannot_split() {
        let x = vec![[1.0], [1.0], [1.0]];
        let y = vec![0.0, 3.0, 6.0];

        let tree = RegressionTree::fit(&ForestParams::default(), &x, &y, vec![0, 1, 2]);

        assert_eq!(tree.nodes, vec![Node::Leaf { value: 3.0 }]);
    }
}
