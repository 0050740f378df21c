#![allow(dead_code)]

use crate::candle_aux_layers::tile_over_time;
use crate::candle_data_loader::{SeqBatch, SourcePosterior, BOS_ID, EOS_ID};
use crate::candle_embedding::GenerativeEmbedding;
use crate::candle_encoder_latent::{AmortizationMode, LatentSample, ZInference};
use crate::candle_loss_functions::*;
use crate::candle_model_traits::*;
use crate::candle_seq_decoder::LatentSeqDecoder;
use crate::candle_seq_encoder::BidirectionalEncoder;
use crate::candle_seq_lm::{shift_right, LatentLanguageModel, SourceModel};
use crate::candle_summary::{StepSummary, SummaryGroup};

use candle_core::{DType, Result, Tensor, D};
use candle_nn::VarBuilder;
use serde::{Deserialize, Serialize};

/// Configuration of the joint model, persisted as JSON next to the
/// trained weights so a translation run can rebuild the same graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JointVaeConfig {
    pub src_vocab: usize,
    pub tgt_vocab: usize,
    pub embed_dim: usize,
    pub num_units: usize,
    /// total encoder depth; bidirectional layers use half of it
    pub num_layers: usize,
    pub z_dim: usize,
    pub amortization: AmortizationMode,
    pub source_model: SourceModel,
    pub max_decode_len: usize,
}

impl JointVaeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.z_dim == 0 {
            candle_core::bail!("z_dim must be a positive integer");
        }
        if self.src_vocab == 0 || self.tgt_vocab == 0 {
            candle_core::bail!("vocabulary sizes must be positive");
        }
        if self.num_layers < 2 {
            candle_core::bail!(
                "num_layers must be at least 2 to split into bidirectional halves, got {}",
                self.num_layers
            );
        }
        if self.max_decode_len == 0 {
            candle_core::bail!("max_decode_len must be positive");
        }
        Ok(())
    }

    pub fn num_bi_layers(&self) -> usize {
        self.num_layers / 2
    }
}

/// The joint translation/language model with a shared sentence-level
/// latent variable.
///
/// Every forward pass builds an independent subgraph; the only shared
/// state is the parameter store handed in through the `VarBuilder`,
/// scoped as
///
/// * `z_inference_model` (full amortization), or
///   `z_bilingual_inference_model` + `z_monolingual_inference_model`
/// * `generative_model.{source,target}_embedding`
/// * `generative_model.language_model`
/// * `generative_model.encoder` / `generative_model.decoder`
pub struct JointVae {
    config: JointVaeConfig,
    src_embedding: GenerativeEmbedding,
    tgt_embedding: GenerativeEmbedding,
    z_inference: ZInference,
    language_model: LatentLanguageModel,
    encoder: BidirectionalEncoder,
    decoder: LatentSeqDecoder,
}

impl JointVae {
    pub fn new(config: JointVaeConfig, vs: VarBuilder) -> Result<Self> {
        config.validate()?;

        let z_inference = ZInference::new(
            config.amortization,
            config.embed_dim,
            config.num_units,
            config.num_bi_layers(),
            config.z_dim,
            vs.clone(),
        )?;

        let vs_gen = vs.pp("generative_model");
        let src_embedding = GenerativeEmbedding::new(
            config.src_vocab,
            config.embed_dim,
            vs_gen.pp("source_embedding"),
        )?;
        let tgt_embedding = GenerativeEmbedding::new(
            config.tgt_vocab,
            config.embed_dim,
            vs_gen.pp("target_embedding"),
        )?;

        let language_model = LatentLanguageModel::new(
            config.src_vocab,
            config.embed_dim,
            config.num_units,
            config.z_dim,
            config.source_model,
            vs_gen.pp("language_model"),
        )?;

        // the translation encoder sees the latent sample concatenated
        // to every input step
        let encoder = BidirectionalEncoder::new(
            config.embed_dim + config.z_dim,
            config.num_units,
            config.num_bi_layers(),
            vs_gen.pp("encoder"),
        )?;

        let decoder = LatentSeqDecoder::new(
            config.tgt_vocab,
            config.embed_dim,
            config.num_units,
            config.z_dim,
            vs_gen.pp("decoder"),
        )?;

        Ok(Self {
            config,
            src_embedding,
            tgt_embedding,
            z_inference,
            language_model,
            encoder,
            decoder,
        })
    }

    pub fn config(&self) -> &JointVaeConfig {
        &self.config
    }

    pub fn z_inference(&self) -> &ZInference {
        &self.z_inference
    }

    /// Infer the latent variable for one batch. The embeddings feeding
    /// the inference networks are detached: the gradient wall between
    /// the variational and the generative side.
    pub fn infer_z(&self, batch: &SeqBatch, mode: RunMode) -> Result<LatentSample> {
        let src_emb = self.src_embedding.forward_detached(&batch.source_ids)?;

        let tgt_pack = match &batch.target {
            Some(tgt) => Some((
                self.tgt_embedding.forward_detached(&tgt.input_ids)?,
                tgt.lengths.clone(),
            )),
            None => None,
        };

        let mono_flag = batch.mono_flag()?;
        self.z_inference.infer_z(
            &src_emb,
            &batch.source_lengths,
            tgt_pack.as_ref().map(|(e, l)| (e, l)),
            &mono_flag,
            mode,
        )
    }

    fn compute_loss(
        &self,
        tm_logits: &Tensor,
        lm_obs: &SourceObservation,
        latent: &LatentSample,
        batch: &SeqBatch,
    ) -> Result<LossComponents> {
        let device = batch.source_ids.device();
        let tgt = batch.target.as_ref().ok_or_else(|| {
            candle_core::Error::Msg("loss computation requires a target side".into())
        })?;
        let mono_flag = batch.mono_flag()?;
        let zero = Tensor::zeros((), DType::F32, device)?;

        // cross-entropy of the translation decoder under the sampled z
        let tm_loss = masked_cross_entropy(tm_logits, &tgt.output_ids, &tgt.lengths)?;

        let (lm_loss, entropy) = match lm_obs {
            SourceObservation::Categorical { logits_ntv } => {
                let dense_ntv = match &batch.source_posterior {
                    Some(SourcePosterior::Categorical(q_ntv)) => q_ntv.clone(),
                    _ => one_hot(&batch.source_ids, self.config.src_vocab)?,
                };
                let lm_loss =
                    masked_dense_cross_entropy(logits_ntv, &dense_ntv, &batch.source_lengths)?;

                // entropy of the discrete source posterior, counted for
                // monolingual batches only; both paths are built and the
                // flag selects one inside the graph
                let h = match &batch.source_posterior {
                    Some(SourcePosterior::Categorical(q_ntv)) => {
                        masked_categorical_entropy(q_ntv, &batch.source_lengths)?
                    }
                    _ => zero.clone(),
                };
                let entropy = runtime_select(&mono_flag, &h, &zero)?;
                (lm_loss, entropy)
            }
            SourceObservation::Continuous { params } => {
                let target_nte = self.src_embedding.forward(&batch.source_ids)?;
                let lm_loss = masked_gaussian_nll(params, &target_nte, &batch.source_lengths)?;

                // the continuous relaxation counts the Gaussian posterior
                // entropy for every batch type, unlike the categorical
                // variant above; inherited asymmetry, kept as-is
                let entropy = match &batch.source_posterior {
                    Some(SourcePosterior::Gaussian(qx)) => gaussian_sequence_entropy(qx)?,
                    _ => zero.clone(),
                };
                (lm_loss, entropy)
            }
        };

        // analytic KL between the selected posterior and its N(0, I)
        // prior, selected by batch type at run time
        let kl_bi_n = latent.bi.kl_divergence(&latent.bi.standard_like()?)?;
        let kl_mono_n = latent.mono.kl_divergence(&latent.mono.standard_like()?)?;
        let kl_z = runtime_select(&mono_flag, &kl_mono_n, &kl_bi_n)?.mean_all()?;

        Ok(LossComponents {
            tm_loss,
            lm_loss,
            kl_z,
            entropy,
        })
    }
}

impl JointModelT for JointVae {
    fn build_graph(&self, batch: &SeqBatch, mode: RunMode) -> Result<JointGraph> {
        let latent = self.infer_z(batch, mode)?;

        // p(x | z) language model over the bos-shifted source
        let src_in_ids = shift_right(&batch.source_ids, BOS_ID)?;
        let src_in_emb = self.src_embedding.forward(&src_in_ids)?;
        let source_observation = self.language_model.forward(&src_in_emb, &latent.z)?;

        // p(y | x, z) encoder, latent sample in the input pathway with
        // gradients intact
        let src_emb = self.src_embedding.forward(&batch.source_ids)?;
        let t_src = src_emb.dims3()?.1;
        let z_src = tile_over_time(&latent.z, t_src)?;
        let enc_in = Tensor::cat(&[&src_emb, &z_src], 2)?;
        let (_enc_out, enc_state) = self.encoder.forward(&enc_in)?;

        match mode {
            RunMode::Infer => {
                let (tm_logits, sampled_ids, decoder_state) = self.decoder.greedy_decode(
                    &self.tgt_embedding,
                    &latent.z,
                    &enc_state,
                    BOS_ID,
                    EOS_ID,
                    self.config.max_decode_len,
                )?;
                Ok(JointGraph {
                    tm_logits,
                    loss: None,
                    components: None,
                    source_observation,
                    decoder_state,
                    sampled_ids,
                })
            }
            RunMode::Train | RunMode::Eval => {
                let tgt = batch.target.as_ref().ok_or_else(|| {
                    candle_core::Error::Msg(
                        "train/eval graphs require a target side; use Infer mode to generate"
                            .into(),
                    )
                })?;
                let tgt_in_emb = self.tgt_embedding.forward(&tgt.input_ids)?;
                let (tm_logits, decoder_state) =
                    self.decoder.forward_t(&tgt_in_emb, &latent.z, &enc_state)?;
                let sampled_ids = tm_logits.argmax(D::Minus1)?;

                let components =
                    self.compute_loss(&tm_logits, &source_observation, &latent, batch)?;
                let loss = components.total()?;

                Ok(JointGraph {
                    tm_logits,
                    loss: Some(loss),
                    components: Some(components),
                    source_observation,
                    decoder_state,
                    sampled_ids,
                })
            }
        }
    }

    fn summarize(&self, batch: &SeqBatch, graph: &JointGraph) -> Result<StepSummary> {
        let group = if batch.mono_batch {
            SummaryGroup::SemiSupervised
        } else {
            SummaryGroup::Supervised
        };
        let mut summary = StepSummary::new(group);

        let components = match &graph.components {
            Some(c) => c,
            None => return Ok(summary),
        };

        if let Some(tgt) = &batch.target {
            let tm_acc = masked_accuracy(&graph.tm_logits, &tgt.output_ids, &tgt.lengths)?;
            summary.push("tm_accuracy", tm_acc.to_scalar::<f32>()?);
        }

        summary.push("tm_loss", components.tm_loss.to_scalar::<f32>()?);
        summary.push("lm_loss", components.lm_loss.to_scalar::<f32>()?);
        summary.push("KL_Z", components.kl_z.to_scalar::<f32>()?);
        if let Some(loss) = &graph.loss {
            summary.push("ELBO", -loss.to_scalar::<f32>()?);
        }

        match group {
            SummaryGroup::Supervised => {
                // lm accuracy only makes sense for the categorical head
                if let SourceObservation::Categorical { logits_ntv } = &graph.source_observation {
                    let lm_acc =
                        masked_accuracy(logits_ntv, &batch.source_ids, &batch.source_lengths)?;
                    summary.push("lm_accuracy", lm_acc.to_scalar::<f32>()?);
                }
            }
            SummaryGroup::SemiSupervised => {
                summary.push("entropy", components.entropy.to_scalar::<f32>()?);
            }
        }

        Ok(summary)
    }

    fn dim_latent(&self) -> usize {
        self.config.z_dim
    }
}
