use candle_seq::candle_loss_functions::sequence_mask;
use candle_seq::candle_seq_encoder::{masked_average_pool, BidirectionalEncoder};

use approx::assert_abs_diff_eq;
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};

#[test]
fn sequence_mask_marks_valid_positions() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let lengths = Tensor::from_vec(vec![3u32, 0, 5], 3, &dev)?;

    let mask = sequence_mask(&lengths, 5)?.to_vec2::<f32>()?;
    assert_eq!(mask[0], vec![1.0, 1.0, 1.0, 0.0, 0.0]);
    assert_eq!(mask[1], vec![0.0; 5]);
    assert_eq!(mask[2], vec![1.0; 5]);
    Ok(())
}

#[test]
fn pooling_divides_by_max_time_not_valid_length() -> anyhow::Result<()> {
    let dev = Device::Cpu;

    // five valid steps of value 1.0 padded to eight: the pooled value
    // is 5/8, not 1.0
    let h = Tensor::ones((1, 8, 3), DType::F32, &dev)?;
    let lengths = Tensor::from_vec(vec![5u32], 1, &dev)?;

    let pooled = masked_average_pool(&h, &lengths)?.to_vec2::<f32>()?;
    for &v in pooled[0].iter() {
        assert_abs_diff_eq!(v, 0.625, epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn pooling_ignores_padding_values() -> anyhow::Result<()> {
    let dev = Device::Cpu;

    // garbage in the padding region must not leak into the average
    let valid = Tensor::ones((1, 5, 2), DType::F32, &dev)?;
    let garbage = (Tensor::ones((1, 3, 2), DType::F32, &dev)? * 1e6)?;
    let h = Tensor::cat(&[&valid, &garbage], 1)?;
    let lengths = Tensor::from_vec(vec![5u32], 1, &dev)?;

    let pooled = masked_average_pool(&h, &lengths)?.to_vec2::<f32>()?;
    for &v in pooled[0].iter() {
        assert_abs_diff_eq!(v, 0.625, epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn encoder_output_shapes() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let vm = VarMap::new();
    let vs = VarBuilder::from_varmap(&vm, DType::F32, &dev);

    let (n, t, e, u) = (2, 7, 5, 4);
    let encoder = BidirectionalEncoder::new(e, u, 1, vs)?;

    let emb = Tensor::randn(0f32, 1f32, (n, t, e), &dev)?;
    let (out, state) = encoder.forward(&emb)?;

    assert_eq!(out.dims(), &[n, t, 2 * u]);
    assert_eq!(state.h().dims(), &[n, u]);
    assert_eq!(state.c().dims(), &[n, u]);
    assert_eq!(encoder.dim_out(), 2 * u);
    Ok(())
}

#[test]
fn encoder_backward_direction_sees_the_future() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let vm = VarMap::new();
    let vs = VarBuilder::from_varmap(&vm, DType::F32, &dev);

    let (n, t, e, u) = (1, 6, 3, 4);
    let encoder = BidirectionalEncoder::new(e, u, 1, vs)?;

    let a = Tensor::randn(0f32, 1f32, (n, t, e), &dev)?;

    // perturb only the last time step; the backward half of the first
    // step's output must change, so the full first-step output changes
    let head = a.narrow(1, 0, t - 1)?;
    let tail = (a.narrow(1, t - 1, 1)? + 1.0)?;
    let b = Tensor::cat(&[&head, &tail], 1)?;

    let (out_a, _) = encoder.forward(&a)?;
    let (out_b, _) = encoder.forward(&b)?;

    let first_a = out_a.narrow(1, 0, 1)?.flatten_all()?.to_vec1::<f32>()?;
    let first_b = out_b.narrow(1, 0, 1)?.flatten_all()?.to_vec1::<f32>()?;
    assert_ne!(first_a, first_b);
    Ok(())
}

#[test]
fn encoder_requires_at_least_one_layer() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let vm = VarMap::new();
    let vs = VarBuilder::from_varmap(&vm, DType::F32, &dev);

    assert!(BidirectionalEncoder::new(4, 4, 0, vs).is_err());
    Ok(())
}
