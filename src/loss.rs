/**
Loss strategies for token classification. Logits are given as a `(positions, classes)` matrix and
labels as one class index per position. Positions labelled with [`IGNORE_INDEX`] do not take part
in the loss, which is how padding and sub-word continuations are excluded.
*/
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};
use thiserror::Error;

/// Label of the positions excluded from the loss.
pub const IGNORE_INDEX: i64 = -100;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LossError {
    #[error("Expected {expected} {what}, found {found}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Label {label} at position {position} is not a class index in 0..{num_classes}")]
    LabelOutOfRange {
        position: usize,
        label: i64,
        num_classes: usize,
    },
    #[error("Expected one weight per class ({expected}), found {found} weights")]
    WeightLength { expected: usize, found: usize },
    #[error("Every position is ignored, the loss is undefined")]
    NoActivePosition,
    #[error("The weights of the active positions sum to zero")]
    ZeroTotalWeight,
}

/// Replaces the label of every position whose attention mask is 0 with [`IGNORE_INDEX`].
pub fn mask_labels(
    labels: ArrayView1<i64>,
    attention_mask: ArrayView1<i64>,
) -> Result<Array1<i64>, LossError> {
    if labels.len() != attention_mask.len() {
        return Err(LossError::ShapeMismatch {
            what: "attention mask values",
            expected: labels.len(),
            found: attention_mask.len(),
        });
    }
    Ok(Zip::from(&labels)
        .and(&attention_mask)
        .map_collect(|&label, &mask| if mask == 1 { label } else { IGNORE_INDEX }))
}

/// A loss over the logits of every position of a batch.
pub trait TokenLoss {
    fn compute(&self, logits: ArrayView2<f32>, labels: ArrayView1<i64>) -> Result<f32, LossError>;
}

/// Cross-entropy with optional per-class weights. With weights, the result is the weighted mean
/// `sum(w[y] * nll) / sum(w[y])` over the active positions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeightedCrossEntropy {
    pub class_weights: Option<Array1<f32>>,
}

impl WeightedCrossEntropy {
    pub fn new(class_weights: Array1<f32>) -> Self {
        Self {
            class_weights: Some(class_weights),
        }
    }
}

impl TokenLoss for WeightedCrossEntropy {
    fn compute(&self, logits: ArrayView2<f32>, labels: ArrayView1<i64>) -> Result<f32, LossError> {
        if let Some(weights) = &self.class_weights {
            check_weights(weights.len(), logits.ncols())?;
        }
        let targets = active_targets(logits, labels)?;
        let mut total = 0.0;
        let mut weight_sum = 0.0;
        for (position, class) in targets {
            let weight = self.class_weights.as_ref().map_or(1.0, |w| w[class]);
            let log_p = log_softmax(logits.row(position))[class];
            total += -weight * log_p;
            weight_sum += weight;
        }
        if weight_sum == 0.0 {
            return Err(LossError::ZeroTotalWeight);
        }
        Ok(total / weight_sum)
    }
}

/// Focal loss, `-alpha * (1 - p)^gamma * log(p)` averaged over the active positions. With
/// `gamma = 0` and `alpha = 1` it equals the unweighted cross-entropy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocalLoss {
    pub gamma: f32,
    pub alpha: f32,
}

impl Default for FocalLoss {
    fn default() -> Self {
        Self {
            gamma: 2.0,
            alpha: 1.0,
        }
    }
}

impl TokenLoss for FocalLoss {
    fn compute(&self, logits: ArrayView2<f32>, labels: ArrayView1<i64>) -> Result<f32, LossError> {
        let targets = active_targets(logits, labels)?;
        let count = targets.len() as f32;
        let total: f32 = targets
            .into_iter()
            .map(|(position, class)| {
                let log_p = log_softmax(logits.row(position))[class];
                let p = log_p.exp();
                -self.alpha * (1.0 - p).powf(self.gamma) * log_p
            })
            .sum();
        Ok(total / count)
    }
}

/// Masks the labels with the attention mask, if any, and computes `loss`.
pub fn masked_loss(
    loss: &dyn TokenLoss,
    logits: ArrayView2<f32>,
    labels: ArrayView1<i64>,
    attention_mask: Option<ArrayView1<i64>>,
) -> Result<f32, LossError> {
    match attention_mask {
        Some(mask) => {
            let masked = mask_labels(labels, mask)?;
            loss.compute(logits, masked.view())
        }
        None => loss.compute(logits, labels),
    }
}

fn check_weights(found: usize, expected: usize) -> Result<(), LossError> {
    if found != expected {
        return Err(LossError::WeightLength { expected, found });
    }
    Ok(())
}

/// (position, class) of every position not labelled with the ignore index.
fn active_targets(
    logits: ArrayView2<f32>,
    labels: ArrayView1<i64>,
) -> Result<Vec<(usize, usize)>, LossError> {
    if logits.nrows() != labels.len() {
        return Err(LossError::ShapeMismatch {
            what: "logit rows",
            expected: labels.len(),
            found: logits.nrows(),
        });
    }
    let num_classes = logits.ncols();
    let mut targets = Vec::with_capacity(labels.len());
    for (position, &label) in labels.iter().enumerate() {
        if label == IGNORE_INDEX {
            continue;
        }
        match usize::try_from(label) {
            Ok(class) if class < num_classes => targets.push((position, class)),
            _ => {
                return Err(LossError::LabelOutOfRange {
                    position,
                    label,
                    num_classes,
                })
            }
        }
    }
    if targets.is_empty() {
        return Err(LossError::NoActivePosition);
    }
    Ok(targets)
}

fn log_softmax(row: ArrayView1<f32>) -> Array1<f32> {
    let max = row.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
    let log_sum = row.mapv(|x| (x - max).exp()).sum().ln() + max;
    row.mapv(|x| x - log_sum)
}
