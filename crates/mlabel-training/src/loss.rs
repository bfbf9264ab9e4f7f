//! Multi-label loss functions.
//!
//! All losses take raw logits `[batch, classes]` and 0/1 targets of the same
//! shape and return the mean over every element as a one-element tensor.

use burn::nn::loss::BinaryCrossEntropyLossConfig;
use burn::tensor::activation::{log_sigmoid, sigmoid};
use burn::tensor::{backend::Backend, Int, Tensor};
use mlabel_core::{AslParams, BceParams, FocalParams, LossKind, LossParams, Result};

/// Lower bound applied to probabilities before taking logs
const LOG_EPS: f32 = 1e-8;

#[derive(Debug, Clone, PartialEq)]
pub enum MultiLabelLoss {
    /// Binary cross-entropy on logits
    Bce(BceParams),
    /// Sigmoid focal loss (Lin et al.)
    Focal(FocalParams),
    /// Asymmetric loss (Ridnik et al.)
    Asl(AslParams),
}

impl MultiLabelLoss {
    /// Builds the loss; `None` selects the defaults of `kind`
    pub fn new(kind: LossKind, params: Option<LossParams>) -> Result<Self> {
        let params = params.unwrap_or_else(|| LossParams::defaults_for(kind));
        params.check_kind(kind)?;
        params.validate()?;

        Ok(match params {
            LossParams::Bce(p) => MultiLabelLoss::Bce(p),
            LossParams::Focal(p) => MultiLabelLoss::Focal(p),
            LossParams::Asl(p) => MultiLabelLoss::Asl(p),
        })
    }

    /// Builds the loss from a command line name with default parameters
    pub fn from_name(name: &str) -> Result<Self> {
        Self::new(LossKind::from_name(name)?, None)
    }

    pub fn kind(&self) -> LossKind {
        match self {
            MultiLabelLoss::Bce(_) => LossKind::Bce,
            MultiLabelLoss::Focal(_) => LossKind::Focal,
            MultiLabelLoss::Asl(_) => LossKind::Asl,
        }
    }

    pub fn forward<B: Backend>(
        &self,
        logits: Tensor<B, 2>,
        targets: Tensor<B, 2, Int>,
    ) -> Tensor<B, 1> {
        match self {
            MultiLabelLoss::Bce(p) => bce(p, logits, targets),
            MultiLabelLoss::Focal(p) => focal(p, logits, targets),
            MultiLabelLoss::Asl(p) => asymmetric(p, logits, targets),
        }
    }
}

fn bce<B: Backend>(
    p: &BceParams,
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2, Int>,
) -> Tensor<B, 1> {
    BinaryCrossEntropyLossConfig::new()
        .with_logits(true)
        .with_weights(p.weights.clone())
        .with_smoothing(p.smoothing)
        .init(&logits.device())
        .forward(logits, targets)
}

fn focal<B: Backend>(
    p: &FocalParams,
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2, Int>,
) -> Tensor<B, 1> {
    let t = targets.float();
    let not_t = t.clone().neg().add_scalar(1.0);

    // Element-wise BCE with logits
    let ce = (t.clone() * log_sigmoid(logits.clone())
        + not_t.clone() * log_sigmoid(logits.clone().neg()))
    .neg();

    let prob = sigmoid(logits);
    let p_t = prob.clone() * t.clone() + prob.neg().add_scalar(1.0) * not_t.clone();
    let mut loss = ce;
    if p.gamma != 0.0 {
        let modulator = p_t.neg().add_scalar(1.0).clamp_min(0.0).powf_scalar(p.gamma);
        loss = loss * modulator;
    }

    let alpha_t = t.mul_scalar(p.alpha) + not_t.mul_scalar(1.0 - p.alpha);
    (loss * alpha_t).mean()
}

fn asymmetric<B: Backend>(
    p: &AslParams,
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2, Int>,
) -> Tensor<B, 1> {
    let t = targets.float();
    let not_t = t.clone().neg().add_scalar(1.0);

    let xs_pos = sigmoid(logits);
    let mut xs_neg = xs_pos.clone().neg().add_scalar(1.0);
    if p.clip > 0.0 {
        // Probability shifting: easy negatives stop contributing
        xs_neg = xs_neg.add_scalar(p.clip).clamp_max(1.0);
    }

    let mut pos = t.clone() * xs_pos.clone().clamp_min(LOG_EPS).log();
    let mut neg = not_t.clone() * xs_neg.clone().clamp_min(LOG_EPS).log();

    if p.gamma_pos > 0.0 {
        pos = pos * xs_pos.neg().add_scalar(1.0).clamp_min(0.0).powf_scalar(p.gamma_pos);
    }
    if p.gamma_neg > 0.0 {
        neg = neg * xs_neg.neg().add_scalar(1.0).clamp_min(0.0).powf_scalar(p.gamma_neg);
    }

    (pos + neg).neg().mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;
    use mlabel_core::Error;

    type TestBackend = NdArray;

    fn inputs(
        logits: Vec<f32>,
        targets: Vec<i64>,
    ) -> (Tensor<TestBackend, 2>, Tensor<TestBackend, 2, Int>) {
        let device = Default::default();
        let n = logits.len() / 2;
        (
            Tensor::from_floats(TensorData::new(logits, [n, 2]), &device),
            Tensor::from_data(TensorData::new(targets, [n, 2]), &device),
        )
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_data().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn test_every_loss_name_builds() {
        for name in ["bce", "focal", "asl"] {
            let loss = MultiLabelLoss::from_name(name).unwrap();
            assert_eq!(loss.kind().name(), name);
        }
        assert!(matches!(
            MultiLabelLoss::from_name("hinge"),
            Err(Error::UnsupportedLoss(_))
        ));
    }

    #[test]
    fn test_mismatched_params_rejected() {
        let params = LossParams::defaults_for(LossKind::Focal);
        assert!(matches!(
            MultiLabelLoss::new(LossKind::Bce, Some(params)),
            Err(Error::InvalidLossParams(_))
        ));
    }

    #[test]
    fn test_bce_matches_closed_form() {
        let (logits, targets) = inputs(vec![0.0, 0.0], vec![1, 0]);
        let loss = MultiLabelLoss::from_name("bce").unwrap();
        let value = scalar(loss.forward(logits, targets));
        assert!((value - std::f32::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn test_focal_downweights_easy_examples() {
        let (easy_logits, easy_targets) = inputs(vec![4.0, -4.0], vec![1, 0]);
        let (hard_logits, hard_targets) = inputs(vec![-1.0, 1.0], vec![1, 0]);

        let bce = MultiLabelLoss::from_name("bce").unwrap();
        let focal = MultiLabelLoss::from_name("focal").unwrap();

        let easy_ratio = scalar(focal.forward(easy_logits.clone(), easy_targets.clone()))
            / scalar(bce.forward(easy_logits, easy_targets));
        let hard_ratio = scalar(focal.forward(hard_logits.clone(), hard_targets.clone()))
            / scalar(bce.forward(hard_logits, hard_targets));
        assert!(easy_ratio < hard_ratio);
    }

    #[test]
    fn test_focal_without_focusing_is_weighted_bce() {
        let params = LossParams::Focal(FocalParams {
            gamma: 0.0,
            alpha: 0.5,
        });
        let focal = MultiLabelLoss::new(LossKind::Focal, Some(params)).unwrap();
        let bce = MultiLabelLoss::from_name("bce").unwrap();

        let (logits, targets) = inputs(vec![0.3, -1.2, 2.0, 0.1], vec![1, 0, 0, 1]);
        let f = scalar(focal.forward(logits.clone(), targets.clone()));
        let b = scalar(bce.forward(logits, targets));
        assert!((f - 0.5 * b).abs() < 1e-5);
    }

    #[test]
    fn test_asl_ignores_clipped_negatives() {
        // Negative with p = sigmoid(-5) < clip contributes nothing
        let (logits, targets) = inputs(vec![-5.0, -5.0], vec![0, 0]);
        let asl = MultiLabelLoss::from_name("asl").unwrap();
        assert!(scalar(asl.forward(logits, targets)).abs() < 1e-6);
    }

    #[test]
    fn test_asl_without_focusing_or_clip_is_bce() {
        let params = LossParams::Asl(AslParams {
            gamma_pos: 0.0,
            gamma_neg: 0.0,
            clip: 0.0,
        });
        let asl = MultiLabelLoss::new(LossKind::Asl, Some(params)).unwrap();
        let bce = MultiLabelLoss::from_name("bce").unwrap();

        let (logits, targets) = inputs(vec![0.5, -0.5, 1.5, -2.0], vec![1, 1, 0, 0]);
        let a = scalar(asl.forward(logits.clone(), targets.clone()));
        let b = scalar(bce.forward(logits, targets));
        assert!((a - b).abs() < 1e-4);
    }

    #[test]
    fn test_bce_with_weights_and_smoothing() {
        let raw = r#"{"weights": [2.0, 0.0], "smoothing": 0.1}"#;
        let params = LossParams::parse(LossKind::Bce, raw).unwrap();
        let loss = MultiLabelLoss::new(LossKind::Bce, params).unwrap();
        let (logits, targets) = inputs(vec![0.0, 9.0], vec![1, 0]);
        let value = scalar(loss.forward(logits, targets));
        assert!(value.is_finite());
        assert!(value > 0.0);
    }
}
