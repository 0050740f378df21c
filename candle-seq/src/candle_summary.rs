#![allow(dead_code)]

use log::info;

/// Batch-type grouping of per-step training metrics
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummaryGroup {
    Supervised,
    SemiSupervised,
}

impl SummaryGroup {
    pub fn prefix(&self) -> &'static str {
        match self {
            SummaryGroup::Supervised => "supervised",
            SummaryGroup::SemiSupervised => "semi_supervised",
        }
    }
}

/// Named scalar metrics for one training step
pub struct StepSummary {
    pub group: SummaryGroup,
    pub scalars: Vec<(String, f32)>,
}

impl StepSummary {
    pub fn new(group: SummaryGroup) -> Self {
        Self {
            group,
            scalars: vec![],
        }
    }

    pub fn push(&mut self, name: &str, value: f32) {
        self.scalars.push((name.to_string(), value));
    }
}

/// Fire-and-forget sink for training summaries; the model core never
/// reads anything back from it.
pub trait SummarySink {
    fn write_step(&mut self, step: usize, summary: &StepSummary);
}

/// Writes each scalar through the logging facade as
/// `{group}_{name}: {value}`
pub struct LogSummarySink;

impl SummarySink for LogSummarySink {
    fn write_step(&mut self, step: usize, summary: &StepSummary) {
        for (name, value) in summary.scalars.iter() {
            info!(
                "[step {}] {}_{}: {:.6}",
                step,
                summary.group.prefix(),
                name,
                value
            );
        }
    }
}

/// Drops everything; for evaluation passes that need no summaries
pub struct NullSummarySink;

impl SummarySink for NullSummarySink {
    fn write_step(&mut self, _step: usize, _summary: &StepSummary) {}
}
