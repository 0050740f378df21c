#![allow(dead_code)]

use candle_core::{Result, Tensor};
use candle_nn::{Activation, Module};

/// a stack of `M` layers, each optionally followed by an activation
pub struct StackLayers<M>
where
    M: Module,
{
    layers: Vec<(M, Option<Activation>)>,
}

impl<M> Module for StackLayers<M>
where
    M: Module,
{
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let mut x = input.clone();
        for (module, activation) in self.layers.iter() {
            x = module.forward(&x)?;
            if let Some(activation) = activation {
                x = activation.forward(&x)?;
            }
        }
        Ok(x)
    }
}

impl<M> StackLayers<M>
where
    M: Module,
{
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Appends a layer followed by an activation
    pub fn push_with_act(&mut self, layer: M, activation: Activation) {
        self.layers.push((layer, Some(activation)));
    }

    /// Appends a layer with no activation
    pub fn push(&mut self, layer: M) {
        self.layers.push((layer, None));
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl<M> Default for StackLayers<M>
where
    M: Module,
{
    fn default() -> Self {
        Self::new()
    }
}

/// softplus(x) = log(1 + exp(x)), evaluated as
/// max(x, 0) + log(1 + exp(-|x|)) so that large inputs do not overflow
///
/// `candle_nn::Activation` has no softplus variant, and the posterior
/// standard deviation must stay strictly positive.
pub fn softplus(x: &Tensor) -> Result<Tensor> {
    let zero = x.zeros_like()?;
    let pos = x.maximum(&zero)?;
    let neg_abs = x.abs()?.neg()?;
    pos + (neg_abs.exp()? + 1.0)?.log()?
}

/// tile a per-item vector over the time dimension: (n, k) -> (n, t, k)
pub fn tile_over_time(z_nk: &Tensor, max_time: usize) -> Result<Tensor> {
    z_nk.unsqueeze(1)?.repeat((1, max_time, 1))
}
