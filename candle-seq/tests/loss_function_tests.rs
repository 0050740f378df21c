use candle_seq::candle_distribution::DiagonalGaussian;
use candle_seq::candle_loss_functions::*;

use approx::assert_abs_diff_eq;
use candle_core::{DType, Device, Tensor};

#[test]
fn uniform_logits_give_log_vocab_loss() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let (n, t, v) = (2, 4, 8);

    let logits = Tensor::zeros((n, t, v), DType::F32, &dev)?;
    let targets = Tensor::from_vec(vec![3u32; n * t], (n, t), &dev)?;
    let lengths = Tensor::from_vec(vec![4u32, 2], n, &dev)?;

    let loss = masked_cross_entropy(&logits, &targets, &lengths)?.to_scalar::<f32>()?;
    assert_abs_diff_eq!(loss, (v as f32).ln(), epsilon = 1e-5);
    Ok(())
}

#[test]
fn padding_positions_do_not_contribute() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let (n, t, v) = (1, 5, 6);

    let valid = Tensor::randn(0f32, 1f32, (n, 3, v), &dev)?;
    let pad_a = Tensor::zeros((n, t - 3, v), DType::F32, &dev)?;
    let pad_b = (Tensor::randn(0f32, 1f32, (n, t - 3, v), &dev)? * 100.0)?;

    let logits_a = Tensor::cat(&[&valid, &pad_a], 1)?;
    let logits_b = Tensor::cat(&[&valid, &pad_b], 1)?;

    let targets = Tensor::from_vec(vec![1u32; n * t], (n, t), &dev)?;
    let lengths = Tensor::from_vec(vec![3u32], n, &dev)?;

    let loss_a = masked_cross_entropy(&logits_a, &targets, &lengths)?.to_scalar::<f32>()?;
    let loss_b = masked_cross_entropy(&logits_b, &targets, &lengths)?.to_scalar::<f32>()?;
    assert_abs_diff_eq!(loss_a, loss_b, epsilon = 1e-5);
    Ok(())
}

#[test]
fn dense_cross_entropy_matches_sparse_on_one_hot() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let (n, t, v) = (2, 3, 5);

    let logits = Tensor::randn(0f32, 1f32, (n, t, v), &dev)?;
    let targets = Tensor::from_vec(vec![0u32, 4, 2, 1, 3, 0], (n, t), &dev)?;
    let lengths = Tensor::from_vec(vec![3u32, 2], n, &dev)?;

    let sparse = masked_cross_entropy(&logits, &targets, &lengths)?.to_scalar::<f32>()?;

    let dense_targets = one_hot(&targets, v)?;
    let dense =
        masked_dense_cross_entropy(&logits, &dense_targets, &lengths)?.to_scalar::<f32>()?;

    assert_abs_diff_eq!(sparse, dense, epsilon = 1e-5);
    Ok(())
}

#[test]
fn gaussian_nll_standard_normal_at_zero() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let (n, t, e) = (1, 2, 3);

    // N(0, 1) observations scored at x = 0: nll = e/2 * log(2 pi) per step
    let obs = DiagonalGaussian::new(
        Tensor::zeros((n, t, e), DType::F32, &dev)?,
        Tensor::ones((n, t, e), DType::F32, &dev)?,
    )?;
    let x = Tensor::zeros((n, t, e), DType::F32, &dev)?;
    let lengths = Tensor::from_vec(vec![2u32], n, &dev)?;

    let nll = masked_gaussian_nll(&obs, &x, &lengths)?.to_scalar::<f32>()?;
    let expected = 0.5 * (e as f64) * (2.0 * std::f64::consts::PI).ln();
    assert_abs_diff_eq!(nll, expected as f32, epsilon = 1e-5);
    Ok(())
}

#[test]
fn categorical_entropy_of_uniform_posterior() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let (n, t, v) = (2, 4, 8);

    let probs = (Tensor::ones((n, t, v), DType::F32, &dev)? / v as f64)?;
    let lengths = Tensor::from_vec(vec![4u32, 2], n, &dev)?;

    // per valid position log(v), summed over time, averaged over batch
    let h = masked_categorical_entropy(&probs, &lengths)?.to_scalar::<f32>()?;
    let expected = (4.0 + 2.0) / 2.0 * (v as f32).ln();
    assert_abs_diff_eq!(h, expected, epsilon = 1e-4);
    Ok(())
}

#[test]
fn runtime_select_picks_by_flag() -> anyhow::Result<()> {
    let dev = Device::Cpu;

    let a = Tensor::from_vec(vec![1.0f32, 2.0, 3.0], 3, &dev)?;
    let b = Tensor::from_vec(vec![-1.0f32, -2.0, -3.0], 3, &dev)?;

    let yes = Tensor::new(1u8, &dev)?;
    let no = Tensor::new(0u8, &dev)?;

    assert_eq!(
        runtime_select(&yes, &a, &b)?.to_vec1::<f32>()?,
        vec![1.0, 2.0, 3.0]
    );
    assert_eq!(
        runtime_select(&no, &a, &b)?.to_vec1::<f32>()?,
        vec![-1.0, -2.0, -3.0]
    );

    // scalars select too (the entropy term is a scalar)
    let sa = Tensor::new(0.5f32, &dev)?;
    let sb = Tensor::new(0.0f32, &dev)?;
    assert_abs_diff_eq!(
        runtime_select(&no, &sa, &sb)?.to_scalar::<f32>()?,
        0.0,
        epsilon = 1e-7
    );
    Ok(())
}

#[test]
fn masked_accuracy_counts_valid_positions_only() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let (n, t, v) = (1, 4, 3);

    // argmax ids: 2, 1, 0, 0
    let logits = Tensor::from_vec(
        vec![
            0.0f32, 0.1, 0.9, //
            0.0, 0.8, 0.2, //
            0.9, 0.1, 0.0, //
            0.9, 0.1, 0.0,
        ],
        (n, t, v),
        &dev,
    )?;
    let targets = Tensor::from_vec(vec![2u32, 0, 0, 2], (n, t), &dev)?;
    let lengths = Tensor::from_vec(vec![3u32], n, &dev)?;

    // within the first three positions: hits at step 0 and 2
    let acc = masked_accuracy(&logits, &targets, &lengths)?.to_scalar::<f32>()?;
    assert_abs_diff_eq!(acc, 2.0 / 3.0, epsilon = 1e-5);
    Ok(())
}

#[test]
fn one_hot_round_trip() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let ids = Tensor::from_vec(vec![0u32, 3, 1, 2], (2, 2), &dev)?;

    let oh = one_hot(&ids, 4)?;
    assert_eq!(oh.dims(), &[2, 2, 4]);

    let back = oh.argmax(candle_core::D::Minus1)?.to_vec2::<u32>()?;
    assert_eq!(back, vec![vec![0, 3], vec![1, 2]]);

    let sums = oh.sum(candle_core::D::Minus1)?.to_vec2::<f32>()?;
    assert_eq!(sums, vec![vec![1.0, 1.0], vec![1.0, 1.0]]);
    Ok(())
}
