#![allow(dead_code)]

use crate::candle_aux_layers::{softplus, tile_over_time};
use crate::candle_distribution::DiagonalGaussian;
use crate::candle_model_traits::SourceObservation;
use crate::candle_seq_encoder::stack_hidden_states;

use candle_core::{Result, Tensor};
use candle_nn::{LSTMConfig, Linear, Module, RNN, VarBuilder, LSTM};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which observation family the source language model emits
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SourceModel {
    /// per-position categorical logits over the source vocabulary
    Categorical,
    /// per-position Gaussian over embedding space
    Continuous,
}

impl FromStr for SourceModel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "categorical" => Ok(SourceModel::Categorical),
            "continuous" => Ok(SourceModel::Continuous),
            _ => anyhow::bail!("unknown source model option: {}", s),
        }
    }
}

enum ObservationHead {
    Categorical { proj: Linear },
    Continuous { mean: Linear, stddev: Linear },
}

/// p(x | z): a unidirectional LSTM over the bos-shifted source with the
/// latent sample concatenated to every input step. The observation
/// head turns hidden states into whichever parameters the configured
/// source-model variant needs; both variants sit behind the same
/// `SourceObservation` interface.
pub struct LatentLanguageModel {
    n_vocab: usize,
    embed_dim: usize,
    num_units: usize,
    z_dim: usize,
    cell: LSTM,
    head: ObservationHead,
}

impl LatentLanguageModel {
    pub fn new(
        n_vocab: usize,
        embed_dim: usize,
        num_units: usize,
        z_dim: usize,
        variant: SourceModel,
        vs: VarBuilder,
    ) -> Result<Self> {
        let cell = candle_nn::lstm(
            embed_dim + z_dim,
            num_units,
            LSTMConfig::default(),
            vs.pp("cell"),
        )?;

        let head = match variant {
            SourceModel::Categorical => ObservationHead::Categorical {
                proj: candle_nn::linear(num_units, n_vocab, vs.pp("output_projection"))?,
            },
            SourceModel::Continuous => ObservationHead::Continuous {
                mean: candle_nn::linear(num_units, embed_dim, vs.pp("obs_mean"))?,
                stddev: candle_nn::linear(num_units, embed_dim, vs.pp("obs_stddev"))?,
            },
        };

        Ok(Self {
            n_vocab,
            embed_dim,
            num_units,
            z_dim,
            cell,
            head,
        })
    }

    pub fn variant(&self) -> SourceModel {
        match self.head {
            ObservationHead::Categorical { .. } => SourceModel::Categorical,
            ObservationHead::Continuous { .. } => SourceModel::Continuous,
        }
    }

    ///
    /// Run the language model over one batch.
    ///
    /// * `src_in_emb_nte` - embeddings of the bos-shifted source
    /// * `z_nk` - latent sample, broadcast over every time step
    ///
    pub fn forward(&self, src_in_emb_nte: &Tensor, z_nk: &Tensor) -> Result<SourceObservation> {
        let (_n, t, _e) = src_in_emb_nte.dims3()?;
        let z_ntk = tile_over_time(z_nk, t)?;
        let inp_nte = Tensor::cat(&[src_in_emb_nte, &z_ntk], 2)?;

        let states = self.cell.seq(&inp_nte)?;
        let h_ntu = stack_hidden_states(&states)?;

        match &self.head {
            ObservationHead::Categorical { proj } => Ok(SourceObservation::Categorical {
                logits_ntv: proj.forward(&h_ntu)?,
            }),
            ObservationHead::Continuous { mean, stddev } => {
                let m_nte = mean.forward(&h_ntu)?;
                let s_nte = softplus(&stddev.forward(&h_ntu)?)?;
                Ok(SourceObservation::Continuous {
                    params: DiagonalGaussian::new(m_nte, s_nte)?,
                })
            }
        }
    }

    pub fn dim_obs(&self) -> usize {
        match self.head {
            ObservationHead::Categorical { .. } => self.n_vocab,
            ObservationHead::Continuous { .. } => self.embed_dim,
        }
    }

    pub fn dim_latent(&self) -> usize {
        self.z_dim
    }
}

/// Prefix each sequence with bos and drop the last position, turning
/// observed ids into language-model inputs: (n, t) -> (n, t)
pub fn shift_right(ids_nt: &Tensor, bos_id: u32) -> Result<Tensor> {
    let (n, t) = ids_nt.dims2()?;
    let bos_n1 = Tensor::full(bos_id, (n, 1), ids_nt.device())?;
    if t == 1 {
        return Ok(bos_n1);
    }
    let body = ids_nt.narrow(1, 0, t - 1)?;
    Tensor::cat(&[&bos_n1, &body], 1)
}
