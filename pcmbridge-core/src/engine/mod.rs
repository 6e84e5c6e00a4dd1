//! Pump + façade pairs that decouple a `SampleSource` from a real-time caller.
//!
//! ## Lifecycle
//!
//! ```text
//! BufferedSampler::spawn(source, config)
//!     └─► pump thread started, status = Running
//!         ├─► source exhausted  → status = Ended      (pump exits)
//!         ├─► source failed     → status = Failed(e)  (pump exits)
//!         └─► stop()/shutdown() → status = Cancelled  (pump exits)
//! ```
//!
//! The status is latched: the first transition away from `Running` wins and
//! is never overwritten. `sample()` keeps returning full, padded buffers in
//! every state; owners watch the status to decide when to tear down.
//!
//! ## Threading
//!
//! Exactly one pump thread writes and exactly one caller reads. `sample`
//! takes `&mut self` and the façades are not `Clone`, so a second reader
//! cannot exist without an external lock.

pub mod buffered;
pub mod diagnostics;
pub mod lockfree;

pub use buffered::BufferedSampler;
pub use diagnostics::{BufferDiagnostics, DiagnosticsSnapshot};
pub use lockfree::LockFreeSampler;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::buffering::UnderrunPolicy;
use crate::error::BridgeError;
use crate::format::{Format, Sample};

/// Terminal state of a pump, observable without blocking the audio path.
#[derive(Debug, Clone)]
pub enum StreamStatus {
    /// The pump is still moving samples.
    Running,
    /// The source reported end of stream.
    Ended,
    /// The source failed; the pump will not retry.
    Failed(Arc<BridgeError>),
    /// The owner stopped the pump.
    Cancelled,
}

impl StreamStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, StreamStatus::Running)
    }

    pub fn error(&self) -> Option<&BridgeError> {
        match self {
            StreamStatus::Failed(e) => Some(e.as_ref()),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StreamStatus::Running => "running",
            StreamStatus::Ended => "ended",
            StreamStatus::Failed(_) => "failed",
            StreamStatus::Cancelled => "cancelled",
        }
    }
}

/// Record `next` in `slot` unless a terminal status is already latched.
///
/// Returns `true` if `next` was recorded.
pub(crate) fn latch_status(
    slot: &mut StreamStatus,
    next: StreamStatus,
    tx: &watch::Sender<StreamStatus>,
) -> bool {
    if !slot.is_running() {
        return false;
    }

    match &next {
        StreamStatus::Failed(e) => warn!(error = %e, "stream failed"),
        other => info!(status = other.label(), "stream finished"),
    }
    *slot = next.clone();
    tx.send_replace(next);
    true
}

/// Tuning for a pump + façade pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct BufferConfig {
    /// How the façade pads reads the ring could not satisfy.
    pub underrun_policy: UnderrunPolicy,
    /// Upper bound on a single backpressure wait before the pump re-checks
    /// for cancellation. Default: 50 ms.
    pub wait_timeout_ms: u64,
    /// Consecutive zero-sample fills tolerated before the source is declared
    /// stuck. `0` disables the check. Default: 100.
    pub max_empty_fills: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            underrun_policy: UnderrunPolicy::Silence,
            wait_timeout_ms: 50,
            max_empty_fills: 100,
        }
    }
}

impl BufferConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms.max(1))
    }
}

/// Consumer-side contract shared by every façade.
///
/// Implementations must return from `sample` without waiting on the
/// producer and must always fill the whole buffer.
pub trait RealtimeSampler: Send + 'static {
    fn format(&self) -> Format;

    /// Fill `buf` completely and return `buf.len()`.
    ///
    /// Samples the ring cannot supply are padded per the underrun policy.
    fn sample(&mut self, buf: &mut [Sample]) -> usize;

    /// Unread samples in the ring. After `Ended` these are still owed to
    /// the caller before the stream is drained.
    fn buffered(&self) -> usize;

    /// Latched pump status (snapshot).
    fn status(&self) -> StreamStatus;

    /// Receiver notified on every status transition.
    fn subscribe_status(&self) -> watch::Receiver<StreamStatus>;

    fn diagnostics(&self) -> DiagnosticsSnapshot;

    /// Ask the pump to exit. Latches `Cancelled` unless already finished.
    /// Does not wait for the pump thread.
    fn stop(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_keeps_first_terminal_status() {
        let (tx, rx) = watch::channel(StreamStatus::Running);
        let mut slot = StreamStatus::Running;

        assert!(latch_status(&mut slot, StreamStatus::Ended, &tx));
        assert!(!latch_status(
            &mut slot,
            StreamStatus::Failed(Arc::new(BridgeError::Source("late".into()))),
            &tx
        ));

        assert!(matches!(slot, StreamStatus::Ended));
        assert!(matches!(*rx.borrow(), StreamStatus::Ended));
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: BufferConfig =
            serde_json::from_str(r#"{ "underrunPolicy": "hold_last" }"#).unwrap();
        assert_eq!(config.underrun_policy, UnderrunPolicy::HoldLast);
        assert_eq!(config.wait_timeout_ms, 50);
        assert_eq!(config.max_empty_fills, 100);
    }

    #[test]
    fn zero_wait_timeout_is_clamped() {
        let config = BufferConfig {
            wait_timeout_ms: 0,
            ..BufferConfig::default()
        };
        assert_eq!(config.wait_timeout(), Duration::from_millis(1));
    }
}
