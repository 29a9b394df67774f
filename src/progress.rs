// Progress reporting: one line every `step` records, plus a final line for
// a trailing partial step.

use tracing::info;

use crate::source::EntityKind;

#[derive(Debug)]
pub struct Progress {
    kind: EntityKind,
    step: usize,
    count: usize,
    reports: usize,
}

impl Progress {
    pub fn new(kind: EntityKind, step: usize) -> Self {
        Progress {
            kind,
            step: step.max(1),
            count: 0,
            reports: 0,
        }
    }

    /// Count one processed record
    pub fn record(&mut self) {
        self.count += 1;
        if self.count % self.step == 0 {
            self.report();
        }
    }

    /// Emit the trailing line if the last step was partial
    pub fn finish(&mut self) -> usize {
        if self.count % self.step != 0 {
            self.report();
        }
        self.count
    }

    /// Number of progress lines emitted so far
    pub fn reports(&self) -> usize {
        self.reports
    }

    fn report(&mut self) {
        self.reports += 1;
        info!(entity = %self.kind, rows = self.count, "processed {} rows", self.count);
    }
}
