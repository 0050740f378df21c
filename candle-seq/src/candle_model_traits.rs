#![allow(dead_code)]

use crate::candle_data_loader::SeqBatch;
use crate::candle_distribution::DiagonalGaussian;
use crate::candle_summary::StepSummary;

use candle_core::{Result, Tensor};
use candle_nn::rnn::LSTMState;

/// Run modes of the computational graph. Train and Eval draw a
/// reparameterized latent sample; Infer substitutes the posterior mean
/// (three modes, two sampling policies).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Train,
    Eval,
    Infer,
}

impl RunMode {
    pub fn stochastic(&self) -> bool {
        !matches!(self, RunMode::Infer)
    }

    pub fn is_train(&self) -> bool {
        matches!(self, RunMode::Train)
    }
}

/// Source-side observation parameters, sufficient to compute a
/// reconstruction loss for either language-model variant.
pub enum SourceObservation {
    /// per-position logits over the source vocabulary (n x t x v)
    Categorical { logits_ntv: Tensor },
    /// per-position Gaussian over embedding space (n x t x e)
    Continuous { params: DiagonalGaussian },
}

/// The four scalar terms of the objective, each already reduced to a
/// scalar. Immutable once created; recreated every forward pass.
pub struct LossComponents {
    pub tm_loss: Tensor,
    pub lm_loss: Tensor,
    pub kl_z: Tensor,
    pub entropy: Tensor,
}

impl LossComponents {
    /// total = tm_loss + lm_loss + KL_Z - entropy
    pub fn total(&self) -> Result<Tensor> {
        self.tm_loss
            .add(&self.lm_loss)?
            .add(&self.kl_z)?
            .sub(&self.entropy)
    }
}

/// Everything a forward pass produces.
///
/// `loss` is `None` exactly when the graph was built in `Infer` mode
/// (no ground truth available).
pub struct JointGraph {
    pub tm_logits: Tensor,
    pub loss: Option<Tensor>,
    pub components: Option<LossComponents>,
    pub source_observation: SourceObservation,
    pub decoder_state: LSTMState,
    pub sampled_ids: Tensor,
}

/// The seam between the training loop and a concrete joint model.
pub trait JointModelT {
    fn build_graph(&self, batch: &SeqBatch, mode: RunMode) -> Result<JointGraph>;

    /// Named scalar metrics for one training step, grouped by batch type
    fn summarize(&self, batch: &SeqBatch, graph: &JointGraph) -> Result<StepSummary>;

    fn dim_latent(&self) -> usize;
}
