#![allow(dead_code)]

use candle_core::{Result, Tensor};
use candle_nn::{Embedding, Module, VarBuilder};

/// Token embeddings owned by the generative model.
///
/// The inference networks read the same table through
/// `forward_detached`, which cuts the gradient so that inference-side
/// losses never update the generative embedding parameters.
pub struct GenerativeEmbedding {
    emb: Embedding,
    n_vocab: usize,
    dim: usize,
}

impl GenerativeEmbedding {
    /// Creates the variable `{scope}.weight` of shape (n_vocab, dim)
    pub fn new(n_vocab: usize, dim: usize, vs: VarBuilder) -> Result<Self> {
        let emb = candle_nn::embedding(n_vocab, dim, vs)?;
        Ok(Self { emb, n_vocab, dim })
    }

    pub fn forward(&self, ids: &Tensor) -> Result<Tensor> {
        self.emb.forward(ids)
    }

    /// Lookup with the gradient cut on the way out
    pub fn forward_detached(&self, ids: &Tensor) -> Result<Tensor> {
        Ok(self.emb.forward(ids)?.detach())
    }

    pub fn n_vocab(&self) -> usize {
        self.n_vocab
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}
