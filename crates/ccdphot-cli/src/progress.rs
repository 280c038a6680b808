use std::sync::atomic::{AtomicUsize, Ordering};

use ccdphot_core::pipeline::{PipelineStage, ProgressReporter};
use indicatif::{ProgressBar, ProgressStyle};

/// Progress reporter drawing one bar that is reused across stages.
pub struct BarReporter {
    bar: ProgressBar,
    current_total: AtomicUsize,
}

impl BarReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(bar_style());
        Self {
            bar,
            current_total: AtomicUsize::new(0),
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{msg:28} [{bar:40}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: PipelineStage, total_items: Option<usize>) {
        let total = total_items.unwrap_or(1);
        self.current_total.store(total, Ordering::Relaxed);
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_message(stage.to_string());
    }

    fn advance(&self, items_done: usize) {
        let total = self.current_total.load(Ordering::Relaxed);
        self.bar.set_position(items_done.min(total) as u64);
    }

    fn finish_stage(&self) {
        let total = self.current_total.load(Ordering::Relaxed);
        self.bar.set_position(total as u64);
    }
}
