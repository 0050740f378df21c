#![allow(dead_code)]

use crate::candle_aux_layers::{softplus, StackLayers};
use crate::candle_distribution::DiagonalGaussian;
use crate::candle_loss_functions::runtime_select;
use crate::candle_model_traits::RunMode;
use crate::candle_seq_encoder::{masked_average_pool, BidirectionalEncoder};

use candle_core::{Result, Tensor};
use candle_nn::{Activation, Linear, Module, VarBuilder};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// How much the variational posterior is amortized.
///
/// * `Full` - one inference network conditioned on the source alone
///   serves every batch type.
/// * `Less` - separate networks: the bilingual one conditions on the
///   source and target encodings concatenated, the monolingual one on
///   the source alone; the sample is selected per batch at run time.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AmortizationMode {
    Full,
    Less,
}

impl FromStr for AmortizationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "full" => Ok(AmortizationMode::Full),
            "less" => Ok(AmortizationMode::Less),
            _ => anyhow::bail!("unknown z inference amortization option: {}", s),
        }
    }
}

/// One amortized posterior network.
///
/// A pooled sentence encoding feeds two independent two-layer branches:
/// the mean branch ends linearly, the stddev branch ends in a softplus
/// so the standard deviation stays strictly positive. The encodings
/// must be computed from detached embeddings; this network must never
/// push gradients into the generative embedding table.
pub struct LatentInference {
    z_dim: usize,
    src_encoder: BidirectionalEncoder,
    tgt_encoder: Option<BidirectionalEncoder>,
    mean_net: StackLayers<Linear>,
    stddev_net: StackLayers<Linear>,
}

impl LatentInference {
    /// Creates these variables under `vs`:
    ///
    /// * `source_sentence_encoder.{fwd,bwd}.{layer}.*`
    /// * `target_sentence_encoder.*` when `use_target`
    /// * `mean_inference_network.{fc,out}.*`
    /// * `stddev_inference_network.{fc,out}.*`
    pub fn new(
        embed_dim: usize,
        num_units: usize,
        num_bi_layers: usize,
        z_dim: usize,
        use_target: bool,
        vs: VarBuilder,
    ) -> Result<Self> {
        if z_dim == 0 {
            candle_core::bail!("z_dim must be a positive integer");
        }

        let src_encoder = BidirectionalEncoder::new(
            embed_dim,
            num_units,
            num_bi_layers,
            vs.pp("source_sentence_encoder"),
        )?;

        let tgt_encoder = if use_target {
            Some(BidirectionalEncoder::new(
                embed_dim,
                num_units,
                num_bi_layers,
                vs.pp("target_sentence_encoder"),
            )?)
        } else {
            None
        };

        let pooled_dim = if use_target {
            4 * num_units
        } else {
            2 * num_units
        };

        let mut mean_net = StackLayers::<Linear>::new();
        let vs_mean = vs.pp("mean_inference_network");
        mean_net.push_with_act(
            candle_nn::linear(pooled_dim, z_dim, vs_mean.pp("fc"))?,
            Activation::Relu,
        );
        mean_net.push(candle_nn::linear(z_dim, z_dim, vs_mean.pp("out"))?);

        let mut stddev_net = StackLayers::<Linear>::new();
        let vs_stddev = vs.pp("stddev_inference_network");
        stddev_net.push_with_act(
            candle_nn::linear(pooled_dim, z_dim, vs_stddev.pp("fc"))?,
            Activation::Relu,
        );
        stddev_net.push(candle_nn::linear(z_dim, z_dim, vs_stddev.pp("out"))?);

        Ok(Self {
            z_dim,
            src_encoder,
            tgt_encoder,
            mean_net,
            stddev_net,
        })
    }

    pub fn dim_latent(&self) -> usize {
        self.z_dim
    }

    pub fn conditions_on_target(&self) -> bool {
        self.tgt_encoder.is_some()
    }

    ///
    /// Evaluate the posterior q(z | sentence encodings).
    ///
    /// * `src_emb_nte` - detached source embeddings (n x t x e)
    /// * `src_lengths_n` - source lengths (n)
    /// * `tgt` - detached target embeddings and lengths; required
    ///   exactly when this network conditions on the target
    ///
    pub fn posterior(
        &self,
        src_emb_nte: &Tensor,
        src_lengths_n: &Tensor,
        tgt: Option<(&Tensor, &Tensor)>,
    ) -> Result<DiagonalGaussian> {
        let (src_out, _) = self.src_encoder.forward(src_emb_nte)?;
        let mut pooled = masked_average_pool(&src_out, src_lengths_n)?;

        if let Some(tgt_encoder) = &self.tgt_encoder {
            let (tgt_emb_nte, tgt_lengths_n) = tgt.ok_or_else(|| {
                candle_core::Error::Msg(
                    "this inference network conditions on the target side, none given".into(),
                )
            })?;
            let (tgt_out, _) = tgt_encoder.forward(tgt_emb_nte)?;
            let tgt_pooled = masked_average_pool(&tgt_out, tgt_lengths_n)?;
            pooled = Tensor::cat(&[&pooled, &tgt_pooled], 1)?;
        }

        let z_mean = self.mean_net.forward(&pooled)?;
        let z_stddev = softplus(&self.stddev_net.forward(&pooled)?)?;
        DiagonalGaussian::new(z_mean, z_stddev)
    }
}

/// The latent sample together with both posteriors. Under full
/// amortization `bi` and `mono` are the same shared instance.
pub struct LatentSample {
    pub z: Tensor,
    pub bi: Arc<DiagonalGaussian>,
    pub mono: Arc<DiagonalGaussian>,
}

/// The inference side of the joint model, holding one or two posterior
/// networks depending on the amortization mode. Both networks of the
/// `Less` mode are always constructed; only the sample path is selected
/// per batch.
pub enum ZInference {
    Full {
        shared: LatentInference,
    },
    Less {
        bilingual: LatentInference,
        monolingual: LatentInference,
    },
}

impl ZInference {
    pub fn new(
        mode: AmortizationMode,
        embed_dim: usize,
        num_units: usize,
        num_bi_layers: usize,
        z_dim: usize,
        vs: VarBuilder,
    ) -> Result<Self> {
        match mode {
            AmortizationMode::Full => Ok(ZInference::Full {
                shared: LatentInference::new(
                    embed_dim,
                    num_units,
                    num_bi_layers,
                    z_dim,
                    false,
                    vs.pp("z_inference_model"),
                )?,
            }),
            AmortizationMode::Less => Ok(ZInference::Less {
                bilingual: LatentInference::new(
                    embed_dim,
                    num_units,
                    num_bi_layers,
                    z_dim,
                    true,
                    vs.pp("z_bilingual_inference_model"),
                )?,
                monolingual: LatentInference::new(
                    embed_dim,
                    num_units,
                    num_bi_layers,
                    z_dim,
                    false,
                    vs.pp("z_monolingual_inference_model"),
                )?,
            }),
        }
    }

    pub fn mode(&self) -> AmortizationMode {
        match self {
            ZInference::Full { .. } => AmortizationMode::Full,
            ZInference::Less { .. } => AmortizationMode::Less,
        }
    }

    ///
    /// Infer z from detached sentence embeddings.
    ///
    /// Train and Eval draw a reparameterized sample; Infer substitutes
    /// the posterior mean with zero sampling noise. Under `Less`
    /// amortization both samples are drawn and the batch-type flag
    /// selects one inside the graph, keeping both paths differentiable.
    ///
    pub fn infer_z(
        &self,
        src_emb_nte: &Tensor,
        src_lengths_n: &Tensor,
        tgt: Option<(&Tensor, &Tensor)>,
        mono_flag: &Tensor,
        mode: RunMode,
    ) -> Result<LatentSample> {
        match self {
            ZInference::Full { shared } => {
                let post = Arc::new(shared.posterior(src_emb_nte, src_lengths_n, None)?);
                let z = if mode.stochastic() {
                    post.sample()?
                } else {
                    post.mean().clone()
                };
                Ok(LatentSample {
                    z,
                    bi: post.clone(),
                    mono: post,
                })
            }
            ZInference::Less {
                bilingual,
                monolingual,
            } => {
                let mono_post = Arc::new(monolingual.posterior(src_emb_nte, src_lengths_n, None)?);

                if !mode.stochastic() {
                    // generation time: no target side exists, so the
                    // source-only posterior supplies the mean
                    let z = mono_post.mean().clone();
                    return Ok(LatentSample {
                        z,
                        bi: mono_post.clone(),
                        mono: mono_post,
                    });
                }

                let bi_post = Arc::new(bilingual.posterior(src_emb_nte, src_lengths_n, tgt)?);
                let z = runtime_select(mono_flag, &mono_post.sample()?, &bi_post.sample()?)?;
                Ok(LatentSample {
                    z,
                    bi: bi_post,
                    mono: mono_post,
                })
            }
        }
    }
}
