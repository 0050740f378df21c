#![allow(dead_code)]

use crate::candle_loss_functions::sequence_mask;

use candle_core::{Result, Tensor};
use candle_nn::rnn::LSTMState;
use candle_nn::{LSTMConfig, RNN, VarBuilder, LSTM};

/// Collect per-step hidden states into one (n x t x u) tensor
pub fn stack_hidden_states(states: &[LSTMState]) -> Result<Tensor> {
    let h: Vec<Tensor> = states.iter().map(|s| s.h().clone()).collect();
    Tensor::stack(&h, 1)
}

/// Stacked bidirectional LSTM encoder.
///
/// Each layer runs a forward pass and a time-reversed backward pass and
/// concatenates the two, so the per-step output width is `2 * num_units`.
/// Variables live under `{scope}.fwd.{layer}` / `{scope}.bwd.{layer}`.
pub struct BidirectionalEncoder {
    in_dim: usize,
    num_units: usize,
    num_bi_layers: usize,
    fwd: Vec<LSTM>,
    bwd: Vec<LSTM>,
}

impl BidirectionalEncoder {
    pub fn new(
        in_dim: usize,
        num_units: usize,
        num_bi_layers: usize,
        vs: VarBuilder,
    ) -> Result<Self> {
        if num_bi_layers == 0 {
            candle_core::bail!("bidirectional encoder requires at least one layer");
        }

        let mut fwd = Vec::with_capacity(num_bi_layers);
        let mut bwd = Vec::with_capacity(num_bi_layers);

        let mut prev_dim = in_dim;
        for j in 0..num_bi_layers {
            fwd.push(candle_nn::lstm(
                prev_dim,
                num_units,
                LSTMConfig::default(),
                vs.pp(format!("fwd.{}", j)),
            )?);
            bwd.push(candle_nn::lstm(
                prev_dim,
                num_units,
                LSTMConfig::default(),
                vs.pp(format!("bwd.{}", j)),
            )?);
            prev_dim = 2 * num_units;
        }

        Ok(Self {
            in_dim,
            num_units,
            num_bi_layers,
            fwd,
            bwd,
        })
    }

    ///
    /// Encode an embedded sequence.
    ///
    /// * `emb_nte` - input embeddings (n x t x e)
    ///
    /// # Returns `(outputs_nt2u, state)`
    /// * `outputs_nt2u` - per-step encodings (n x t x 2u)
    /// * `state` - final forward state of the top layer, used to
    ///   initialize a downstream decoder
    pub fn forward(&self, emb_nte: &Tensor) -> Result<(Tensor, LSTMState)> {
        let (_n, t, _e) = emb_nte.dims3()?;
        let rev_t = Tensor::from_vec(
            (0..t as u32).rev().collect::<Vec<u32>>(),
            t,
            emb_nte.device(),
        )?;

        let mut h = emb_nte.clone();
        let mut top_state: Option<LSTMState> = None;

        for j in 0..self.num_bi_layers {
            let fwd_states = self.fwd[j].seq(&h)?;
            let bwd_states = self.bwd[j].seq(&h.index_select(&rev_t, 1)?)?;

            let fwd_nt = stack_hidden_states(&fwd_states)?;
            let bwd_nt = stack_hidden_states(&bwd_states)?.index_select(&rev_t, 1)?;

            h = Tensor::cat(&[&fwd_nt, &bwd_nt], 2)?;
            top_state = fwd_states.last().cloned();
        }

        let state = top_state
            .ok_or_else(|| candle_core::Error::Msg("encoder produced no final state".into()))?;
        Ok((h, state))
    }

    pub fn dim_in(&self) -> usize {
        self.in_dim
    }

    pub fn dim_out(&self) -> usize {
        2 * self.num_units
    }
}

///
/// Average per-step encodings over the time dimension with padding
/// positions zeroed out first.
///
/// The divisor is the nominal max time length, not the per-item valid
/// length, so shorter sequences are down-weighted in proportion to
/// their padding ratio (inherited pooling policy; a sequence of five
/// valid steps of value 1.0 padded to eight pools to 5/8).
///
/// * `h_ntd` - per-step encodings (n x t x d)
/// * `lengths_n` - valid lengths (n, u32)
///
pub fn masked_average_pool(h_ntd: &Tensor, lengths_n: &Tensor) -> Result<Tensor> {
    let (_n, t, _d) = h_ntd.dims3()?;
    let mask_nt1 = sequence_mask(lengths_n, t)?.unsqueeze(2)?;
    h_ntd.broadcast_mul(&mask_nt1)?.mean(1)
}
