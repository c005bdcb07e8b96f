use ndarray::ArrayView1;
use std::cmp::Ordering;

use crate::error::{Result, TrainError};

/// Area under the ROC curve via the rank-sum statistic. Tied scores share
/// their average rank, which matches the trapezoidal curve.
pub fn roc_auc_score(y_true: ArrayView1<u8>, y_score: ArrayView1<f64>) -> Result<f64> {
    if y_true.len() != y_score.len() {
        return Err(TrainError::Metric(format!(
            "{} labels but {} scores",
            y_true.len(),
            y_score.len()
        )));
    }
    if y_score.iter().any(|score| score.is_nan()) {
        return Err(TrainError::Metric("scores contain NaN".to_string()));
    }

    let positives = y_true.iter().filter(|label| **label == 1).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(TrainError::Metric(
            "only one class present in y_true, ROC AUC is undefined".to_string(),
        ));
    }

    let mut order = (0..y_score.len()).collect::<Vec<_>>();
    order.sort_by(|a, b| y_score[*a].partial_cmp(&y_score[*b]).unwrap_or(Ordering::Equal));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && y_score[order[end]] == y_score[order[start]] {
            end += 1;
        }
        // ranks are 1-based; the tie group spans start+1..=end
        let average_rank = (start + 1 + end) as f64 / 2.0;
        let tied_positives = order[start..end]
            .iter()
            .filter(|index| y_true[**index] == 1)
            .count();
        positive_rank_sum += average_rank * tied_positives as f64;
        start = end;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Ok((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}
