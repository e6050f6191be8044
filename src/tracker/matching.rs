//! Scoring and assignment utilities for track/observation matching.

use nalgebra::DVector;
use ndarray::Array2;
use tracing::debug;

/// Score a Euclidean distance against the matching threshold `thresh`.
///
/// Flat 1.0 inside the threshold, linear falloff to 0.5 at twice the
/// threshold, exponential decay beyond. Continuous at both knees.
pub fn distance_score(distance: f32, thresh: f32) -> f32 {
    if distance < thresh {
        1.0
    } else if distance < 2.0 * thresh {
        1.5 - distance / (2.0 * thresh)
    } else {
        0.5 * (2.0 - distance / thresh).exp()
    }
}

/// Cosine similarity of two class-confidence features, mapped to [0, 1].
///
/// Both features must have the same dimension; passing mismatched vectors is
/// a programming error.
pub fn feature_score(a: &DVector<f32>, b: &DVector<f32>) -> f32 {
    assert_eq!(a.len(), b.len(), "feature dimensions must match");

    let denominator = a.norm() * b.norm();
    let cosine = if denominator == 0.0 {
        0.0
    } else {
        a.dot(b) / denominator
    };
    (cosine + 1.0) / 2.0
}

/// Max-utility one-to-one assignment via a forward auction.
///
/// Rows bid for the column with the best net value (utility minus price),
/// raising its price by the bid increment; an outbid row re-enters the pool.
/// Terminates when every row holds a column or after `max_iter` rounds,
/// returning the best partial matching found so far. `None` marks an
/// unassigned row.
pub fn auction(utility: &Array2<f32>, max_iter: usize) -> Vec<Option<usize>> {
    let (num_rows, num_cols) = utility.dim();
    let mut row_to_col: Vec<Option<usize>> = vec![None; num_rows];
    if num_rows == 0 || num_cols == 0 {
        return row_to_col;
    }

    let mut col_owner: Vec<Option<usize>> = vec![None; num_cols];
    let mut prices = vec![0.0f32; num_cols];
    let epsilon = 1.0 / (num_cols as f32 + 1.0);

    for _ in 0..max_iter {
        let Some(row) = row_to_col.iter().position(Option::is_none) else {
            return row_to_col;
        };

        let mut best_col = 0;
        let mut best_value = f32::NEG_INFINITY;
        let mut second_value = f32::NEG_INFINITY;
        for col in 0..num_cols {
            let value = utility[[row, col]] - prices[col];
            if value > best_value {
                second_value = best_value;
                best_value = value;
                best_col = col;
            } else if value > second_value {
                second_value = value;
            }
        }

        let bid = if second_value.is_finite() {
            best_value - second_value + epsilon
        } else {
            epsilon
        };
        prices[best_col] += bid;

        if let Some(outbid) = col_owner[best_col].replace(row) {
            row_to_col[outbid] = None;
        }
        row_to_col[row] = Some(best_col);
    }

    debug!("auction hit the iteration cap, keeping partial matching");
    row_to_col
}
