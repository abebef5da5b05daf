//! Output transformation from raw booster margins to probabilities

/// How raw margins become final predictions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTransform {
    /// Logistic sigmoid, one output per row
    Sigmoid,
    /// Softmax across each row's class margins
    Softmax,
}

impl OutputTransform {
    /// Apply the transformation in place to a row-major `(n_rows, n_outputs)` buffer.
    pub fn transform_inplace(&self, predictions: &mut [f32], n_outputs: usize) {
        debug_assert!(n_outputs > 0);

        match self {
            OutputTransform::Sigmoid => {
                for x in predictions.iter_mut() {
                    *x = sigmoid(*x);
                }
            }
            OutputTransform::Softmax => {
                for row in predictions.chunks_mut(n_outputs) {
                    softmax_inplace(row);
                }
            }
        }
    }
}

/// Numerically stable sigmoid.
#[inline]
pub fn sigmoid(x: f32) -> f32 {
    let clamped = x.clamp(-500.0, 500.0);
    if clamped >= 0.0 {
        1.0 / (1.0 + (-clamped).exp())
    } else {
        let e = clamped.exp();
        e / (1.0 + e)
    }
}

/// Inverse of the sigmoid, used to move a probability-space base score into margin space.
#[inline]
pub fn logit(p: f32) -> f32 {
    let p = p.clamp(1e-7, 1.0 - 1e-7);
    (p / (1.0 - p)).ln()
}

#[inline]
fn softmax_inplace(row: &mut [f32]) {
    if row.is_empty() {
        return;
    }

    let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);

    let mut sum = 0.0f32;
    for x in row.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }

    if sum > 0.0 {
        for x in row.iter_mut() {
            *x /= sum;
        }
    }
}
