//! Progress reporting for line and record sequences.
//!
//! A [`Progress`] counts items flowing through one read or write call and
//! reports through `tracing` every [`REPORT_EVERY`] items and once when the
//! sequence ends. [`ProgressIter`] attaches one to any iterator without
//! touching the items.

use std::time::Instant;

/// Number of items between two intermediate reports.
pub const REPORT_EVERY: u64 = 10_000;

#[derive(Debug)]
pub struct Progress {
    label: String,
    count: u64,
    started: Instant,
    finished: bool,
}

impl Progress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            count: 0,
            started: Instant::now(),
            finished: false,
        }
    }

    /// Items seen so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn tick(&mut self) {
        self.count += 1;
        if self.count % REPORT_EVERY == 0 {
            tracing::info!(
                label = %self.label,
                items = self.count,
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "progress"
            );
        }
    }

    /// Emit the final report. Later calls are no-ops.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        tracing::info!(
            label = %self.label,
            items = self.count,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "done"
        );
    }
}

/// Iterator adapter that ticks an optional [`Progress`] per item.
pub struct ProgressIter<I> {
    inner: I,
    progress: Option<Progress>,
}

impl<I> ProgressIter<I> {
    /// Wrap `inner`; reporting is active only when `enabled`.
    pub fn new(inner: I, enabled: bool, label: impl Into<String>) -> Self {
        Self {
            inner,
            progress: enabled.then(|| Progress::new(label)),
        }
    }

    pub fn progress(&self) -> Option<&Progress> {
        self.progress.as_ref()
    }
}

impl<I: Iterator> Iterator for ProgressIter<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<I::Item> {
        let next = self.inner.next();
        if let Some(progress) = self.progress.as_mut() {
            match next {
                Some(_) => progress.tick(),
                None => progress.finish(),
            }
        }
        next
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
