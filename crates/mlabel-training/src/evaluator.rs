//! Evaluation over a test loader.

use burn::tensor::{activation::sigmoid, backend::Backend, ElementConversion};
use mlabel_core::{Error, MultiLabelCounts, MultiLabelMetrics, Result, DEFAULT_THRESHOLD};
use mlabel_dataset::MultiLabelLoader;

use crate::loss::MultiLabelLoss;
use crate::model::ExperimentModel;

/// Mean loss and multi-label metrics of one pass over a loader
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub loss: f64,
    pub metrics: MultiLabelMetrics,
}

/// Runs `model` over every batch of `loader`.
///
/// The model should be on a non-autodiff backend (`model.valid()`).
pub fn evaluate<B: Backend>(
    model: &ExperimentModel<B>,
    loader: &MultiLabelLoader<B>,
    loss_fn: &MultiLabelLoss,
) -> Result<Evaluation> {
    let mut counts = MultiLabelCounts::with_threshold(model.num_classes(), DEFAULT_THRESHOLD);
    let mut loss_sum = 0.0;
    let mut batches = 0usize;

    for batch in loader.iter() {
        let logits = model.forward(batch.images);
        let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
        loss_sum += loss.into_scalar().elem::<f64>();
        batches += 1;

        let probs: Vec<f32> = sigmoid(logits)
            .into_data()
            .convert::<f32>()
            .to_vec()
            .map_err(|e| Error::Training(format!("Failed to read predictions: {e:?}")))?;
        let targets: Vec<i64> = batch
            .targets
            .into_data()
            .convert::<i64>()
            .to_vec()
            .map_err(|e| Error::Training(format!("Failed to read targets: {e:?}")))?;
        counts.update(&probs, &targets);
    }

    if batches == 0 {
        return Err(Error::Training("test loader produced no batches".to_string()));
    }

    Ok(Evaluation {
        loss: loss_sum / batches as f64,
        metrics: counts.compute(),
    })
}
