use candle_seq::candle_distribution::DiagonalGaussian;

use approx::assert_abs_diff_eq;
use candle_core::{Device, Tensor};

fn gaussian(mean: &[f32], stddev: &[f32], dev: &Device) -> anyhow::Result<DiagonalGaussian> {
    let k = mean.len();
    let mean = Tensor::from_vec(mean.to_vec(), (1, k), dev)?;
    let stddev = Tensor::from_vec(stddev.to_vec(), (1, k), dev)?;
    Ok(DiagonalGaussian::new(mean, stddev)?)
}

#[test]
fn kl_of_self_is_zero() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let p = gaussian(&[0.3, -1.2, 2.0], &[0.5, 1.0, 2.5], &dev)?;

    let kl = p.kl_divergence(&p)?.sum_all()?.to_scalar::<f32>()?;
    assert_abs_diff_eq!(kl, 0.0, epsilon = 1e-6);
    Ok(())
}

#[test]
fn kl_is_non_negative() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let p = gaussian(&[0.3, -1.2, 2.0], &[0.5, 1.0, 2.5], &dev)?;
    let q = gaussian(&[-0.7, 0.8, 0.1], &[1.5, 0.2, 0.9], &dev)?;

    let kl_pq = p.kl_divergence(&q)?.sum_all()?.to_scalar::<f32>()?;
    let kl_qp = q.kl_divergence(&p)?.sum_all()?.to_scalar::<f32>()?;
    assert!(kl_pq > 0.0);
    assert!(kl_qp > 0.0);
    Ok(())
}

#[test]
fn kl_to_standard_normal_closed_form() -> anyhow::Result<()> {
    let dev = Device::Cpu;

    // KL(N(1, 1) || N(0, 1)) = 1/2 per dimension
    let p = gaussian(&[1.0, 1.0], &[1.0, 1.0], &dev)?;
    let prior = p.standard_like()?;

    let kl = p.kl_divergence(&prior)?.sum_all()?.to_scalar::<f32>()?;
    assert_abs_diff_eq!(kl, 1.0, epsilon = 1e-5);
    Ok(())
}

#[test]
fn near_zero_stddev_sample_collapses_to_mean() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let p = gaussian(&[0.7, -2.0, 0.1, 5.0], &[1e-8, 1e-8, 1e-8, 1e-8], &dev)?;

    for _ in 0..20 {
        let z = p.sample()?;
        let delta = z
            .sub(p.mean())?
            .abs()?
            .max(1)?
            .squeeze(0)?
            .to_scalar::<f32>()?;
        assert!(delta < 1e-5, "sample strayed from the mean by {}", delta);
    }
    Ok(())
}

#[test]
fn entropy_closed_form() -> anyhow::Result<()> {
    let dev = Device::Cpu;

    // unit stddev: H = k/2 * (1 + log(2 pi))
    let k = 3_usize;
    let p = gaussian(&[0.0; 3], &[1.0; 3], &dev)?;
    let expected = 0.5 * (k as f64) * (1.0 + (2.0 * std::f64::consts::PI).ln());

    let h = p.entropy()?.sum_all()?.to_scalar::<f32>()?;
    assert_abs_diff_eq!(h, expected as f32, epsilon = 1e-5);

    // scaling the stddev by c adds k * log(c)
    let c = 2.5_f32;
    let q = gaussian(&[0.0; 3], &[c; 3], &dev)?;
    let h_scaled = q.entropy()?.sum_all()?.to_scalar::<f32>()?;
    assert_abs_diff_eq!(
        h_scaled - h,
        (k as f32) * c.ln(),
        epsilon = 1e-5
    );
    Ok(())
}

#[test]
fn shape_mismatch_fails_fast() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let mean = Tensor::zeros((2, 4), candle_core::DType::F32, &dev)?;
    let stddev = Tensor::ones((2, 3), candle_core::DType::F32, &dev)?;

    assert!(DiagonalGaussian::new(mean, stddev).is_err());
    Ok(())
}

#[test]
fn kl_shape_mismatch_fails_fast() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let p = gaussian(&[0.0, 0.0], &[1.0, 1.0], &dev)?;
    let q = gaussian(&[0.0, 0.0, 0.0], &[1.0, 1.0, 1.0], &dev)?;

    assert!(p.kl_divergence(&q).is_err());
    Ok(())
}

#[test]
fn sample_is_stochastic_with_positive_stddev() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let p = gaussian(&[0.0, 0.0, 0.0, 0.0], &[1.0, 1.0, 1.0, 1.0], &dev)?;

    let a = p.sample()?.flatten_all()?.to_vec1::<f32>()?;
    let b = p.sample()?.flatten_all()?.to_vec1::<f32>()?;
    assert_ne!(a, b);
    Ok(())
}
