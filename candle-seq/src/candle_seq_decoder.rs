#![allow(dead_code)]

use crate::candle_aux_layers::tile_over_time;
use crate::candle_embedding::GenerativeEmbedding;
use crate::candle_seq_encoder::stack_hidden_states;

use candle_core::{DType, Result, Tensor, D};
use candle_nn::rnn::LSTMState;
use candle_nn::{LSTMConfig, Linear, Module, RNN, VarBuilder, LSTM};

/// Translation decoder: an LSTM initialized from the source encoder's
/// final state, consuming the target embedding concatenated with the
/// latent sample at every step. The latent conditioning path is part
/// of the generative model, so nothing here is detached.
pub struct LatentSeqDecoder {
    n_vocab: usize,
    num_units: usize,
    z_dim: usize,
    cell: LSTM,
    out_proj: Linear,
}

impl LatentSeqDecoder {
    pub fn new(
        n_vocab: usize,
        embed_dim: usize,
        num_units: usize,
        z_dim: usize,
        vs: VarBuilder,
    ) -> Result<Self> {
        let cell = candle_nn::lstm(
            embed_dim + z_dim,
            num_units,
            LSTMConfig::default(),
            vs.pp("cell"),
        )?;
        let out_proj = candle_nn::linear(num_units, n_vocab, vs.pp("output_projection"))?;

        Ok(Self {
            n_vocab,
            num_units,
            z_dim,
            cell,
            out_proj,
        })
    }

    ///
    /// Teacher-forced pass for training and evaluation.
    ///
    /// * `tgt_in_emb_nte` - embeddings of the bos-prefixed target
    /// * `z_nk` - latent sample
    /// * `init_state` - source encoder final state
    ///
    /// # Returns `(logits_ntv, final_state)`
    pub fn forward_t(
        &self,
        tgt_in_emb_nte: &Tensor,
        z_nk: &Tensor,
        init_state: &LSTMState,
    ) -> Result<(Tensor, LSTMState)> {
        let (_n, t, _e) = tgt_in_emb_nte.dims3()?;
        let z_ntk = tile_over_time(z_nk, t)?;
        let inp_nte = Tensor::cat(&[tgt_in_emb_nte, &z_ntk], 2)?;

        let states = self.cell.seq_init(&inp_nte, init_state)?;
        let h_ntu = stack_hidden_states(&states)?;
        let logits_ntv = self.out_proj.forward(&h_ntu)?;

        let final_state = states
            .last()
            .cloned()
            .ok_or_else(|| candle_core::Error::Msg("decoded an empty target sequence".into()))?;
        Ok((logits_ntv, final_state))
    }

    ///
    /// Greedy generation: feed back the argmax token until `max_len`
    /// steps, or earlier when every sequence in the batch has emitted
    /// eos.
    ///
    /// # Returns `(logits_nlv, sampled_ids_nl, final_state)`
    pub fn greedy_decode(
        &self,
        embedding: &GenerativeEmbedding,
        z_nk: &Tensor,
        init_state: &LSTMState,
        bos_id: u32,
        eos_id: u32,
        max_len: usize,
    ) -> Result<(Tensor, Tensor, LSTMState)> {
        if max_len == 0 {
            candle_core::bail!("max decode length must be positive");
        }
        let (n, _k) = z_nk.dims2()?;
        let device = z_nk.device();

        let mut prev_n = Tensor::full(bos_id, n, device)?;
        let mut state = init_state.clone();
        let mut step_logits = Vec::with_capacity(max_len);
        let mut step_ids = Vec::with_capacity(max_len);

        for _ in 0..max_len {
            let emb_ne = embedding.forward(&prev_n)?;
            let inp_n = Tensor::cat(&[&emb_ne, z_nk], 1)?;
            state = self.cell.step(&inp_n, &state)?;

            let logits_nv = self.out_proj.forward(state.h())?;
            prev_n = logits_nv.argmax(D::Minus1)?;

            step_logits.push(logits_nv);
            step_ids.push(prev_n.clone());

            let n_finished = prev_n
                .eq(eos_id)?
                .to_dtype(DType::F32)?
                .sum_all()?
                .to_scalar::<f32>()? as usize;
            if n_finished == n {
                break;
            }
        }

        let logits_nlv = Tensor::stack(&step_logits, 1)?;
        let ids_nl = Tensor::stack(&step_ids, 1)?;
        Ok((logits_nlv, ids_nl, state))
    }

    pub fn dim_obs(&self) -> usize {
        self.n_vocab
    }

    pub fn dim_latent(&self) -> usize {
        self.z_dim
    }
}
