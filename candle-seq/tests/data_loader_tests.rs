use candle_seq::candle_data_loader::*;

use candle_core::{Device, Tensor};

#[test]
fn from_pairs_pads_and_appends_markers() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let batch = SeqBatch::from_pairs(
        &[vec![5, 6, 7], vec![8, 9]],
        Some(&[vec![4, 5], vec![6, 7, 8]]),
        false,
        &dev,
    )?;

    // source: eos appended, padded to the local max
    assert_eq!(
        batch.source_ids.to_vec2::<u32>()?,
        vec![vec![5, 6, 7, EOS_ID], vec![8, 9, EOS_ID, PAD_ID]]
    );
    assert_eq!(batch.source_lengths.to_vec1::<u32>()?, vec![4, 3]);

    let tgt = batch.target.as_ref().expect("target side");
    assert_eq!(
        tgt.input_ids.to_vec2::<u32>()?,
        vec![vec![BOS_ID, 4, 5, PAD_ID], vec![BOS_ID, 6, 7, 8]]
    );
    assert_eq!(
        tgt.output_ids.to_vec2::<u32>()?,
        vec![vec![4, 5, EOS_ID, PAD_ID], vec![6, 7, 8, EOS_ID]]
    );
    assert_eq!(tgt.lengths.to_vec1::<u32>()?, vec![3, 4]);

    assert!(!batch.mono_batch);
    assert_eq!(batch.mono_flag()?.to_scalar::<u8>()?, 0);
    Ok(())
}

#[test]
fn mono_flag_propagates() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let batch = SeqBatch::from_pairs(&[vec![5]], Some(&[vec![6]]), true, &dev)?;
    assert!(batch.mono_batch);
    assert_eq!(batch.mono_flag()?.to_scalar::<u8>()?, 1);
    Ok(())
}

#[test]
fn misaligned_bitext_is_rejected() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    assert!(SeqBatch::from_pairs(&[vec![5], vec![6]], Some(&[vec![7]]), false, &dev).is_err());
    assert!(InMemoryBitext::new(vec![vec![5], vec![6]], Some(vec![vec![7]]), false).is_err());
    Ok(())
}

#[test]
fn length_bound_invariant_is_checked() -> anyhow::Result<()> {
    let dev = Device::Cpu;

    let ids = Tensor::from_vec(vec![5u32, 6, 7, 8], (2, 2), &dev)?;
    let bad_lengths = Tensor::from_vec(vec![2u32, 3], 2, &dev)?;
    assert!(SeqBatch::new(ids, bad_lengths, None, false).is_err());

    let ids = Tensor::from_vec(vec![5u32, 6, 7, 8], (2, 2), &dev)?;
    let short_lengths = Tensor::from_vec(vec![2u32], 1, &dev)?;
    assert!(SeqBatch::new(ids, short_lengths, None, false).is_err());
    Ok(())
}

#[test]
fn shuffled_minibatches_cover_the_corpus() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let source: Vec<Vec<u32>> = (0..5).map(|i| vec![10 + i as u32]).collect();
    let target: Vec<Vec<u32>> = (0..5).map(|i| vec![20 + i as u32]).collect();

    let mut loader = InMemoryBitext::new(source, Some(target), false)?;
    loader.shuffle_minibatch(2)?;

    assert_eq!(loader.num_minibatch(), 3);

    let mut seen = vec![];
    for b in 0..loader.num_minibatch() {
        let batch = loader.minibatch_shuffled(b, &dev)?;
        let n = batch.batch_size()?;
        assert!(n == 2 || n == 1);

        for row in batch.source_ids.to_vec2::<u32>()? {
            seen.push(row[0]);
        }
    }

    seen.sort_unstable();
    assert_eq!(seen, vec![10, 11, 12, 13, 14]);
    Ok(())
}

#[test]
fn minibatch_index_out_of_range_is_an_error() -> anyhow::Result<()> {
    let dev = Device::Cpu;
    let mut loader = InMemoryBitext::new(vec![vec![5]], None, false)?;
    loader.shuffle_minibatch(4)?;

    assert_eq!(loader.num_minibatch(), 1);
    assert!(loader.minibatch_shuffled(1, &dev).is_err());
    Ok(())
}

#[test]
fn max_token_id_spans_both_sides() -> anyhow::Result<()> {
    let loader = InMemoryBitext::new(vec![vec![5, 9]], Some(vec![vec![11, 3]]), false)?;
    assert_eq!(loader.max_token_id(), 11);

    let loader = InMemoryBitext::new(vec![vec![5, 9]], None, false)?;
    assert_eq!(loader.max_token_id(), 9);
    Ok(())
}
