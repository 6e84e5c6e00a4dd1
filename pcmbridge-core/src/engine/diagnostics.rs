//! Relaxed atomic counters shared by a pump and its façade.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct BufferDiagnostics {
    pub samples_written: AtomicUsize,
    pub samples_read: AtomicUsize,
    pub samples_padded: AtomicUsize,
    pub underruns: AtomicUsize,
    pub fills: AtomicUsize,
    pub empty_fills: AtomicUsize,
    pub backpressure_waits: AtomicUsize,
}

impl BufferDiagnostics {
    /// Called by the façade after every `sample`.
    pub(crate) fn record_sample(&self, real: usize, padded: usize) {
        self.samples_read.fetch_add(real, Ordering::Relaxed);
        if padded > 0 {
            self.samples_padded.fetch_add(padded, Ordering::Relaxed);
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Called by the pump after every source fill.
    pub(crate) fn record_fill(&self, written: usize) {
        self.fills.fetch_add(1, Ordering::Relaxed);
        if written == 0 {
            self.empty_fills.fetch_add(1, Ordering::Relaxed);
        } else {
            self.samples_written.fetch_add(written, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_wait(&self) {
        self.backpressure_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            samples_written: self.samples_written.load(Ordering::Relaxed),
            samples_read: self.samples_read.load(Ordering::Relaxed),
            samples_padded: self.samples_padded.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            fills: self.fills.load(Ordering::Relaxed),
            empty_fills: self.empty_fills.load(Ordering::Relaxed),
            backpressure_waits: self.backpressure_waits.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub samples_written: usize,
    pub samples_read: usize,
    pub samples_padded: usize,
    pub underruns: usize,
    pub fills: usize,
    pub empty_fills: usize,
    pub backpressure_waits: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underrun_counted_once_per_padded_call() {
        let diag = BufferDiagnostics::default();
        diag.record_sample(10, 0);
        diag.record_sample(4, 6);
        diag.record_sample(0, 10);

        let snap = diag.snapshot();
        assert_eq!(snap.samples_read, 14);
        assert_eq!(snap.samples_padded, 16);
        assert_eq!(snap.underruns, 2);
    }

    #[test]
    fn empty_fills_tracked_separately() {
        let diag = BufferDiagnostics::default();
        diag.record_fill(0);
        diag.record_fill(32);
        let snap = diag.snapshot();
        assert_eq!(snap.fills, 2);
        assert_eq!(snap.empty_fills, 1);
        assert_eq!(snap.samples_written, 32);
    }
}
