#![allow(dead_code)]

use crate::candle_distribution::DiagonalGaussian;

use candle_core::{Device, Tensor};
use rand::prelude::*;

pub const PAD_ID: u32 = 0;
pub const BOS_ID: u32 = 1;
pub const EOS_ID: u32 = 2;

/// Target-side tensors of a batch. `input_ids` starts with bos and
/// `output_ids` ends with eos; both share the same padded length.
pub struct TargetSide {
    pub input_ids: Tensor,
    pub output_ids: Tensor,
    pub lengths: Tensor,
}

/// Dense posterior over the source side of a semi-supervised batch,
/// produced by the external source-inference model. The entropy term
/// of the objective consumes it.
pub enum SourcePosterior {
    /// per-position probabilities over the source vocabulary (n x t x v)
    Categorical(Tensor),
    /// per-position Gaussian over embedding space (n x t x e)
    Gaussian(DiagonalGaussian),
}

/// One aligned minibatch.
///
/// Invariants, checked at construction: every tensor shares the leading
/// batch dimension, and no length exceeds the padded time dimension.
pub struct SeqBatch {
    pub source_ids: Tensor,
    pub source_lengths: Tensor,
    pub target: Option<TargetSide>,
    pub mono_batch: bool,
    pub source_posterior: Option<SourcePosterior>,
}

impl SeqBatch {
    pub fn new(
        source_ids: Tensor,
        source_lengths: Tensor,
        target: Option<TargetSide>,
        mono_batch: bool,
    ) -> anyhow::Result<Self> {
        let (n, t_src) = source_ids.dims2()?;

        if source_lengths.dims1()? != n {
            anyhow::bail!(
                "source lengths have batch size {} but ids have {}",
                source_lengths.dims1()?,
                n
            );
        }
        check_lengths(&source_lengths, t_src, "source")?;

        if let Some(tgt) = &target {
            let (n_tgt, t_tgt) = tgt.input_ids.dims2()?;
            if n_tgt != n {
                anyhow::bail!("target batch size {} does not match source {}", n_tgt, n);
            }
            if tgt.output_ids.dims2()? != (n_tgt, t_tgt) {
                anyhow::bail!("target input/output shapes differ");
            }
            if tgt.lengths.dims1()? != n {
                anyhow::bail!("target lengths have the wrong batch size");
            }
            check_lengths(&tgt.lengths, t_tgt, "target")?;
        }

        Ok(Self {
            source_ids,
            source_lengths,
            target,
            mono_batch,
            source_posterior: None,
        })
    }

    pub fn with_source_posterior(mut self, posterior: SourcePosterior) -> Self {
        self.source_posterior = Some(posterior);
        self
    }

    pub fn batch_size(&self) -> anyhow::Result<usize> {
        Ok(self.source_ids.dims2()?.0)
    }

    /// The batch-type flag as a scalar graph value (u8), so that
    /// conditional terms are selected inside the graph rather than by
    /// host control flow.
    pub fn mono_flag(&self) -> candle_core::Result<Tensor> {
        Tensor::new(u8::from(self.mono_batch), self.source_ids.device())
    }

    ///
    /// Pad raw sentences into an aligned batch on `device`.
    ///
    /// Source sentences get eos appended; target sentences are split
    /// into a bos-prefixed input stream and an eos-suffixed output
    /// stream, as the decoder expects.
    ///
    pub fn from_pairs(
        source: &[Vec<u32>],
        target: Option<&[Vec<u32>]>,
        mono_batch: bool,
        device: &Device,
    ) -> anyhow::Result<Self> {
        if source.is_empty() {
            anyhow::bail!("cannot build a batch from an empty sentence set");
        }
        let n = source.len();

        let t_src = source.iter().map(|s| s.len() + 1).max().unwrap_or(1);
        let mut src_flat = Vec::with_capacity(n * t_src);
        let mut src_len = Vec::with_capacity(n);
        for sent in source {
            src_len.push((sent.len() + 1) as u32);
            src_flat.extend_from_slice(sent);
            src_flat.push(EOS_ID);
            src_flat.resize(src_flat.len() + t_src - sent.len() - 1, PAD_ID);
        }
        let source_ids = Tensor::from_vec(src_flat, (n, t_src), device)?;
        let source_lengths = Tensor::from_vec(src_len, n, device)?;

        let target = match target {
            None => None,
            Some(tgt_sents) => {
                if tgt_sents.len() != n {
                    anyhow::bail!(
                        "bitext misalignment: {} source vs {} target sentences",
                        n,
                        tgt_sents.len()
                    );
                }
                let t_tgt = tgt_sents.iter().map(|s| s.len() + 1).max().unwrap_or(1);
                let mut in_flat = Vec::with_capacity(n * t_tgt);
                let mut out_flat = Vec::with_capacity(n * t_tgt);
                let mut tgt_len = Vec::with_capacity(n);
                for sent in tgt_sents {
                    tgt_len.push((sent.len() + 1) as u32);
                    let pad = t_tgt - sent.len() - 1;
                    in_flat.push(BOS_ID);
                    in_flat.extend_from_slice(sent);
                    in_flat.resize(in_flat.len() + pad, PAD_ID);
                    out_flat.extend_from_slice(sent);
                    out_flat.push(EOS_ID);
                    out_flat.resize(out_flat.len() + pad, PAD_ID);
                }
                Some(TargetSide {
                    input_ids: Tensor::from_vec(in_flat, (n, t_tgt), device)?,
                    output_ids: Tensor::from_vec(out_flat, (n, t_tgt), device)?,
                    lengths: Tensor::from_vec(tgt_len, n, device)?,
                })
            }
        };

        Self::new(source_ids, source_lengths, target, mono_batch)
    }
}

fn check_lengths(lengths: &Tensor, max_time: usize, side: &str) -> anyhow::Result<()> {
    let lengths = lengths.to_vec1::<u32>()?;
    if let Some(&bad) = lengths.iter().find(|&&l| l as usize > max_time) {
        anyhow::bail!(
            "{} length {} exceeds the padded sequence length {}",
            side,
            bad,
            max_time
        );
    }
    Ok(())
}

/// `SeqDataLoader` for minibatch learning over sentence pairs
pub trait SeqDataLoader {
    fn minibatch_shuffled(&self, batch_idx: usize, device: &Device) -> anyhow::Result<SeqBatch>;

    fn num_minibatch(&self) -> usize;

    fn shuffle_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()>;
}

///
/// In-memory corpus of tokenized sentences. Bilingual corpora hold
/// aligned source/target pairs; monolingual corpora hold observed
/// target sentences with externally sampled source sides, flagged so
/// the loss composition can branch on the batch type.
///
pub struct InMemoryBitext {
    source: Vec<Vec<u32>>,
    target: Option<Vec<Vec<u32>>>,
    mono_batch: bool,
    order: Vec<usize>,
    chunks: Vec<Vec<usize>>,
}

impl InMemoryBitext {
    pub fn new(
        source: Vec<Vec<u32>>,
        target: Option<Vec<Vec<u32>>>,
        mono_batch: bool,
    ) -> anyhow::Result<Self> {
        if source.is_empty() {
            anyhow::bail!("empty corpus");
        }
        if let Some(tgt) = &target {
            if tgt.len() != source.len() {
                anyhow::bail!(
                    "bitext misalignment: {} source vs {} target sentences",
                    source.len(),
                    tgt.len()
                );
            }
        }

        let order = (0..source.len()).collect();
        Ok(Self {
            source,
            target,
            mono_batch,
            order,
            chunks: vec![],
        })
    }

    pub fn num_sentences(&self) -> usize {
        self.source.len()
    }

    /// Largest token id across both sides; a lower bound for the vocab
    pub fn max_token_id(&self) -> u32 {
        let src_max = self.source.iter().flatten().copied().max().unwrap_or(0);
        let tgt_max = self
            .target
            .iter()
            .flatten()
            .flatten()
            .copied()
            .max()
            .unwrap_or(0);
        src_max.max(tgt_max)
    }

    fn gather(&self, rows: &[usize]) -> (Vec<Vec<u32>>, Option<Vec<Vec<u32>>>) {
        let src = rows.iter().map(|&i| self.source[i].clone()).collect();
        let tgt = self
            .target
            .as_ref()
            .map(|t| rows.iter().map(|&i| t[i].clone()).collect());
        (src, tgt)
    }
}

impl SeqDataLoader for InMemoryBitext {
    fn minibatch_shuffled(&self, batch_idx: usize, device: &Device) -> anyhow::Result<SeqBatch> {
        let rows = self
            .chunks
            .get(batch_idx)
            .ok_or_else(|| anyhow::anyhow!("minibatch index {} out of range", batch_idx))?;

        let (src, tgt) = self.gather(rows);
        SeqBatch::from_pairs(&src, tgt.as_deref(), self.mono_batch, device)
    }

    fn num_minibatch(&self) -> usize {
        self.chunks.len()
    }

    fn shuffle_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()> {
        if batch_size == 0 {
            anyhow::bail!("batch size must be positive");
        }
        let mut rng = rand::rng();
        self.order.shuffle(&mut rng);
        self.chunks = self
            .order
            .chunks(batch_size)
            .map(|c| c.to_vec())
            .collect();
        Ok(())
    }
}
