#![allow(dead_code)]

use crate::candle_data_loader::{SeqBatch, SeqDataLoader};
use crate::candle_inference::TrainConfig;
use crate::candle_model_traits::{JointModelT, RunMode};
use crate::candle_summary::SummarySink;

use candle_nn::AdamW;
use candle_nn::Optimizer;
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;

/// Gradient-based training of a joint model.
///
/// The trainer only sees the `JointModelT` seam and the parameter
/// store; bilingual and (optionally) monolingual minibatches are
/// interleaved within each epoch so both branches of the objective see
/// updates at a similar rate.
pub struct JointTrainer<'a, M>
where
    M: JointModelT,
{
    pub model: &'a M,
    pub variable_map: &'a candle_nn::VarMap,
}

impl<'a, M> JointTrainer<'a, M>
where
    M: JointModelT,
{
    pub fn new(model: &'a M, variable_map: &'a candle_nn::VarMap) -> Self {
        Self {
            model,
            variable_map,
        }
    }

    /// Train over `bitext`, interleaving one monolingual minibatch
    /// after each bilingual one when a monolingual loader is given.
    ///
    /// # Returns per-epoch mean ELBO trace
    pub fn train(
        &mut self,
        bitext: &mut dyn SeqDataLoader,
        mut monolingual: Option<&mut dyn SeqDataLoader>,
        sink: &mut dyn SummarySink,
        train_config: &TrainConfig,
    ) -> anyhow::Result<Vec<f32>> {
        let device = &train_config.device;
        let mut adam = AdamW::new_lr(
            self.variable_map.all_vars(),
            train_config.learning_rate.into(),
        )?;

        let pb = ProgressBar::new(train_config.num_epochs as u64);

        if !train_config.show_progress || train_config.verbose {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        let mut elbo_trace = vec![];
        let mut step = 0_usize;

        for _epoch in 0..train_config.num_epochs {
            bitext.shuffle_minibatch(train_config.batch_size)?;
            if let Some(mono) = monolingual.as_mut() {
                mono.shuffle_minibatch(train_config.batch_size)?;
            }

            let mut elbo_tot = 0_f32;
            let mut num_steps = 0_usize;

            for b in 0..bitext.num_minibatch() {
                let batch = bitext.minibatch_shuffled(b, device)?;
                elbo_tot += self.train_step(&batch, &mut adam, sink, step)?;
                num_steps += 1;
                step += 1;

                if let Some(mono) = monolingual.as_mut() {
                    if b < mono.num_minibatch() {
                        let mono_batch = mono.minibatch_shuffled(b, device)?;
                        elbo_tot += self.train_step(&mono_batch, &mut adam, sink, step)?;
                        num_steps += 1;
                        step += 1;
                    }
                }
            }

            elbo_trace.push(elbo_tot / num_steps.max(1) as f32);
            pb.inc(1);

            if train_config.verbose {
                info!(
                    "[{}] ELBO: {}",
                    _epoch + 1,
                    elbo_trace.last().ok_or(anyhow::anyhow!("elbo"))?
                );
            }
        } // each epoch

        pb.finish_and_clear();
        Ok(elbo_trace)
    }

    fn train_step(
        &self,
        batch: &SeqBatch,
        adam: &mut AdamW,
        sink: &mut dyn SummarySink,
        step: usize,
    ) -> anyhow::Result<f32> {
        let graph = self.model.build_graph(batch, RunMode::Train)?;
        let loss = graph
            .loss
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("training step produced no loss"))?;

        adam.backward_step(loss)?;

        let summary = self.model.summarize(batch, &graph)?;
        sink.write_step(step, &summary);

        Ok(-loss.to_scalar::<f32>()?)
    }
}
