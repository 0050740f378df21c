#![allow(dead_code)]

use crate::candle_distribution::DiagonalGaussian;

use candle_core::{DType, Result, Tensor, D};
use candle_nn::ops;

/// Binary mask for valid (non-padding) positions
///
/// * `lengths_n` - per-item valid lengths (u32, shape n)
/// * `max_time` - padded sequence length
///
/// # Returns mask (n x t), 1.0 where step < length
pub fn sequence_mask(lengths_n: &Tensor, max_time: usize) -> Result<Tensor> {
    let n = lengths_n.dims1()?;
    let steps_t = Tensor::arange(0u32, max_time as u32, lengths_n.device())?;
    let steps_nt = steps_t
        .unsqueeze(0)?
        .broadcast_as((n, max_time))?
        .contiguous()?;
    let lengths_nt = lengths_n
        .unsqueeze(1)?
        .broadcast_as((n, max_time))?
        .contiguous()?;
    lengths_nt.gt(&steps_nt)?.to_dtype(DType::F32)
}

/// One-hot encoding of token ids: (n, t) -> (n, t, depth)
pub fn one_hot(ids_nt: &Tensor, depth: usize) -> Result<Tensor> {
    let (n, t) = ids_nt.dims2()?;
    let iota_v = Tensor::arange(0u32, depth as u32, ids_nt.device())?;
    let iota_ntv = iota_v
        .reshape((1, 1, depth))?
        .broadcast_as((n, t, depth))?
        .contiguous()?;
    let ids_ntv = ids_nt
        .unsqueeze(D::Minus1)?
        .broadcast_as((n, t, depth))?
        .contiguous()?;
    ids_ntv.eq(&iota_ntv)?.to_dtype(DType::F32)
}

/// Cross-entropy in log space with length masking.
///
/// Padded positions contribute neither to the numerator nor to the
/// denominator; the result is the mean over valid token positions.
///
/// * `logits_ntv` - unnormalized scores (n x t x v)
/// * `target_ids_nt` - token ids (n x t, u32)
/// * `lengths_n` - valid lengths (n)
pub fn masked_cross_entropy(
    logits_ntv: &Tensor,
    target_ids_nt: &Tensor,
    lengths_n: &Tensor,
) -> Result<Tensor> {
    let (_n, t, _v) = logits_ntv.dims3()?;
    let log_p_ntv = ops::log_softmax(logits_ntv, D::Minus1)?;
    let picked_nt = log_p_ntv
        .gather(&target_ids_nt.unsqueeze(D::Minus1)?, 2)?
        .squeeze(D::Minus1)?;

    let mask_nt = sequence_mask(lengths_n, t)?;
    let total = picked_nt.mul(&mask_nt)?.sum_all()?.neg()?;
    total.div(&mask_nt.sum_all()?)
}

/// Cross-entropy against a dense (soft) target distribution.
///
/// One-hot targets reduce this to `masked_cross_entropy`; soft targets
/// arise when the source side of a monolingual batch is a relaxed
/// posterior rather than observed tokens.
pub fn masked_dense_cross_entropy(
    logits_ntv: &Tensor,
    target_probs_ntv: &Tensor,
    lengths_n: &Tensor,
) -> Result<Tensor> {
    let (_n, t, _v) = logits_ntv.dims3()?;
    let log_p_ntv = ops::log_softmax(logits_ntv, D::Minus1)?;
    let ce_nt = target_probs_ntv.mul(&log_p_ntv)?.sum(D::Minus1)?.neg()?;

    let mask_nt = sequence_mask(lengths_n, t)?;
    let total = ce_nt.mul(&mask_nt)?.sum_all()?;
    total.div(&mask_nt.sum_all()?)
}

/// Gaussian negative log-likelihood of observed vectors under
/// per-position diagonal-Gaussian observation parameters, masked and
/// averaged over valid positions.
///
/// * `obs` - observation parameters, mean/stddev of shape (n x t x e)
/// * `target_nte` - observed vectors (n x t x e)
/// * `lengths_n` - valid lengths (n)
pub fn masked_gaussian_nll(
    obs: &DiagonalGaussian,
    target_nte: &Tensor,
    lengths_n: &Tensor,
) -> Result<Tensor> {
    let (_n, t, _e) = target_nte.dims3()?;
    let half_ln_2pi = 0.5 * (2.0 * std::f64::consts::PI).ln();

    let var2 = (obs.stddev().powf(2.)? * 2.)?;
    let nll_nte = target_nte
        .sub(obs.mean())?
        .powf(2.)?
        .div(&var2)?
        .add(&obs.stddev().log()?)?
        .affine(1.0, half_ln_2pi)?;
    let nll_nt = nll_nte.sum(D::Minus1)?;

    let mask_nt = sequence_mask(lengths_n, t)?;
    let total = nll_nt.mul(&mask_nt)?.sum_all()?;
    total.div(&mask_nt.sum_all()?)
}

/// Entropy of a dense per-position categorical posterior, masked,
/// summed over time and averaged over the batch.
///
/// llik-style zero guard: positions with p = 0 contribute 0, not NaN.
pub fn masked_categorical_entropy(probs_ntv: &Tensor, lengths_n: &Tensor) -> Result<Tensor> {
    let (_n, t, _v) = probs_ntv.dims3()?;
    let log_p_ntv = probs_ntv
        .gt(0.0)?
        .where_cond(&probs_ntv.log()?, &Tensor::zeros_like(probs_ntv)?)?;
    let h_nt = probs_ntv.mul(&log_p_ntv)?.sum(D::Minus1)?.neg()?;

    let mask_nt = sequence_mask(lengths_n, t)?;
    h_nt.mul(&mask_nt)?.sum(1)?.mean_all()
}

/// Entropy of a per-position Gaussian posterior, summed over time and
/// averaged over the batch. No length mask: the continuous relaxation
/// computes this over the full padded sequence.
pub fn gaussian_sequence_entropy(qx: &DiagonalGaussian) -> Result<Tensor> {
    qx.entropy()?.sum(D::Minus1)?.mean_all()
}

/// Conditional selection over two precomputed values.
///
/// Both operands are always evaluated (both graph paths exist and stay
/// differentiable); the runtime flag only decides which value, and
/// therefore which gradient path, is used. `flag` is a scalar u8
/// tensor, broadcast to the operand shape.
pub fn runtime_select(flag: &Tensor, on_true: &Tensor, on_false: &Tensor) -> Result<Tensor> {
    let cond = flag
        .to_dtype(DType::U8)?
        .broadcast_as(on_true.shape())?
        .contiguous()?;
    cond.where_cond(on_true, on_false)
}

/// Fraction of valid positions where the argmax prediction matches
pub fn masked_accuracy(
    logits_ntv: &Tensor,
    target_ids_nt: &Tensor,
    lengths_n: &Tensor,
) -> Result<Tensor> {
    let (_n, t, _v) = logits_ntv.dims3()?;
    let pred_nt = logits_ntv.argmax(D::Minus1)?;
    let hit_nt = pred_nt.eq(target_ids_nt)?.to_dtype(DType::F32)?;

    let mask_nt = sequence_mask(lengths_n, t)?;
    let total = hit_nt.mul(&mask_nt)?.sum_all()?;
    total.div(&mask_nt.sum_all()?)
}
