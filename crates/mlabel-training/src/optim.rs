//! Optimizer construction.
//!
//! Burn optimizers have distinct concrete types, so they are handed to a
//! visitor instead of being returned. The visitor is generic over the
//! optimizer and runs the training with it.

use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{AdamConfig, AdamWConfig, Optimizer, RmsPropConfig, SgdConfig};
use burn::tensor::backend::AutodiffBackend;
use mlabel_core::{OptimizerKind, Result};

/// SGD momentum
pub const SGD_MOMENTUM: f64 = 0.9;

/// Receives the concrete optimizer selected by an `OptimizerSpec`
pub trait OptimizerVisitor<M, B>
where
    M: AutodiffModule<B>,
    B: AutodiffBackend,
{
    type Output;

    fn visit<O: Optimizer<M, B>>(self, optimizer: O) -> Self::Output;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerSpec {
    pub kind: OptimizerKind,
    pub weight_decay: Option<f64>,
}

impl OptimizerSpec {
    pub fn new(kind: OptimizerKind) -> Self {
        Self {
            kind,
            weight_decay: None,
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Ok(Self::new(OptimizerKind::from_name(name)?))
    }

    pub fn with_weight_decay(mut self, weight_decay: Option<f64>) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    fn decay(&self) -> Option<WeightDecayConfig> {
        self.weight_decay.map(|wd| WeightDecayConfig::new(wd as f32))
    }

    /// Creates a fresh optimizer and passes it to `visitor`
    pub fn dispatch<M, B, V>(&self, visitor: V) -> V::Output
    where
        M: AutodiffModule<B>,
        B: AutodiffBackend,
        V: OptimizerVisitor<M, B>,
    {
        match self.kind {
            OptimizerKind::Adam => visitor.visit(
                AdamConfig::new()
                    .with_weight_decay(self.decay())
                    .init::<B, M>(),
            ),
            OptimizerKind::AdamW => {
                let mut config = AdamWConfig::new();
                if let Some(wd) = self.weight_decay {
                    config = config.with_weight_decay(wd as f32);
                }
                visitor.visit(config.init::<B, M>())
            }
            OptimizerKind::Sgd => visitor.visit(
                SgdConfig::new()
                    .with_momentum(Some(
                        MomentumConfig::new()
                            .with_momentum(SGD_MOMENTUM)
                            .with_dampening(0.0),
                    ))
                    .with_weight_decay(self.decay())
                    .init::<B, M>(),
            ),
            OptimizerKind::RmsProp => visitor.visit(
                RmsPropConfig::new()
                    .with_weight_decay(self.decay())
                    .init::<B, M>(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExperimentModel;
    use burn::backend::{Autodiff, NdArray};
    use burn::optim::GradientsParams;
    use burn::tensor::Tensor;
    use mlabel_core::{Error, ModelKind};

    type TestBackend = Autodiff<NdArray>;

    /// Performs one optimizer step and reports whether the weights moved
    struct StepOnce {
        device: <TestBackend as burn::tensor::backend::Backend>::Device,
    }

    impl OptimizerVisitor<ExperimentModel<TestBackend>, TestBackend> for StepOnce {
        type Output = bool;

        fn visit<O: Optimizer<ExperimentModel<TestBackend>, TestBackend>>(
            self,
            mut optimizer: O,
        ) -> bool {
            let model = ExperimentModel::<TestBackend>::for_image_size(
                ModelKind::ResNetModified,
                2,
                16,
                &self.device,
            )
            .unwrap();
            let input = Tensor::<TestBackend, 4>::ones([2, 1, 16, 16], &self.device);

            let before: Vec<f32> = model.forward(input.clone()).into_data().to_vec().unwrap();
            let loss = model.forward(input.clone()).powf_scalar(2.0).mean();
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            let model = optimizer.step(1e-2, model, grads);
            let after: Vec<f32> = model.forward(input).into_data().to_vec().unwrap();

            before != after
        }
    }

    #[test]
    fn test_every_optimizer_steps() {
        for name in ["adam", "adamw", "sgd", "rmsprop"] {
            let spec = OptimizerSpec::from_name(name).unwrap();
            let moved = spec.dispatch(StepOnce {
                device: Default::default(),
            });
            assert!(moved, "{name} did not update the weights");
        }
    }

    #[test]
    fn test_weight_decay_is_accepted() {
        let spec = OptimizerSpec::from_name("sgd")
            .unwrap()
            .with_weight_decay(Some(1e-4));
        assert!(spec.dispatch(StepOnce {
            device: Default::default(),
        }));
    }

    #[test]
    fn test_unknown_optimizer() {
        assert!(matches!(
            OptimizerSpec::from_name("lbfgs"),
            Err(Error::UnsupportedOptimizer(_))
        ));
    }
}
