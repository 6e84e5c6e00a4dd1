//! Mutex + condvar bridge: blocking pump on one side, non-blocking reads on
//! the other.
//!
//! ## Pump loop (per iteration)
//!
//! ```text
//! 1. Lock; while no whole frame fits, wait on `space` (bounded by wait_timeout)
//! 2. Size the request: free space before the write cursor wraps, whole frames
//! 3. Unlock; source.fill(scratch[..request])
//! 4. Lock; ring.write(scratch[..n])
//! 5. Exhausted / error / cancelled → latch status, exit
//! ```
//!
//! The source is never called with the lock held, so a slow source cannot
//! delay `sample()`. `sample()` only holds the lock for one ring copy.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, trace, warn};

use super::{
    latch_status, BufferConfig, BufferDiagnostics, DiagnosticsSnapshot, RealtimeSampler,
    StreamStatus,
};
use crate::buffering::{ring::SampleRing, UnderrunFiller};
use crate::error::{BridgeError, Result};
use crate::format::{Format, Sample};
use crate::source::{Fill, SampleSource};

/// Everything both threads touch. Cursors, full flag and status share one lock.
struct Shared {
    state: Mutex<BufferState>,
    /// Signalled whenever a read frees space or the pump is cancelled.
    space: Condvar,
    running: AtomicBool,
    status_tx: watch::Sender<StreamStatus>,
    diagnostics: BufferDiagnostics,
}

struct BufferState {
    ring: SampleRing,
    status: StreamStatus,
}

impl Shared {
    fn latch(&self, next: StreamStatus) -> bool {
        let mut state = self.state.lock();
        latch_status(&mut state.status, next, &self.status_tx)
    }
}

/// Consumer handle of a one-second ring fed by a background pump thread.
///
/// Dropping the sampler cancels the pump without waiting for it; use
/// [`BufferedSampler::shutdown`] to wait.
pub struct BufferedSampler {
    shared: Arc<Shared>,
    format: Format,
    filler: UnderrunFiller,
    pump: Option<JoinHandle<()>>,
}

impl BufferedSampler {
    /// Size a ring to one second of `source.format()` and start pumping.
    ///
    /// # Errors
    /// - `BridgeError::InvalidFormat` if the source reports a zero field.
    /// - `BridgeError::Io` if the pump thread cannot be spawned.
    pub fn spawn<S: SampleSource>(source: S, config: BufferConfig) -> Result<Self> {
        let reported = source.format();
        let format = Format::new(reported.sample_rate, reported.channels)?;

        let (status_tx, _) = watch::channel(StreamStatus::Running);
        let shared = Arc::new(Shared {
            state: Mutex::new(BufferState {
                ring: SampleRing::new(format.samples_per_second()),
                status: StreamStatus::Running,
            }),
            space: Condvar::new(),
            running: AtomicBool::new(true),
            status_tx,
            diagnostics: BufferDiagnostics::default(),
        });

        let pump_shared = Arc::clone(&shared);
        let pump_config = config.clone();
        let pump = thread::Builder::new()
            .name("pcmbridge-pump".into())
            .spawn(move || run_pump(source, pump_shared, pump_config, format))?;

        info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            capacity = format.samples_per_second(),
            "buffered sampler started"
        );

        Ok(Self {
            shared,
            format,
            filler: UnderrunFiller::new(config.underrun_policy, format),
            pump: Some(pump),
        })
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Fill `buf` completely without waiting for the pump. Returns `buf.len()`.
    ///
    /// Whatever the ring holds is copied first; the rest is padded per the
    /// configured underrun policy. Any drained sample wakes a pump blocked on
    /// a full ring.
    pub fn sample(&mut self, buf: &mut [Sample]) -> usize {
        let real = self.shared.state.lock().ring.read(buf);
        if real > 0 {
            self.shared.space.notify_one();
        }

        let padded = self.filler.complete(buf, real);
        self.shared.diagnostics.record_sample(real, padded);
        buf.len()
    }

    /// Unread samples currently in the ring.
    pub fn buffered(&self) -> usize {
        self.shared.state.lock().ring.occupied()
    }

    pub fn capacity(&self) -> usize {
        self.format.samples_per_second()
    }

    pub fn status(&self) -> StreamStatus {
        self.shared.state.lock().status.clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StreamStatus> {
        self.shared.status_tx.subscribe()
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.shared.diagnostics.snapshot()
    }

    /// Ask the pump to exit and wake it if it is waiting for space.
    ///
    /// Latches `Cancelled` unless the stream already finished. Samples left
    /// in the ring stay readable.
    pub fn stop(&self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            debug!("buffered sampler stop requested");
        }
        self.shared.latch(StreamStatus::Cancelled);
        self.shared.space.notify_all();
    }

    /// Stop the pump and wait for its thread to exit.
    ///
    /// Blocks until any in-flight `SampleSource::fill` returns.
    pub fn shutdown(mut self) -> StreamStatus {
        self.stop();
        if let Some(pump) = self.pump.take() {
            if pump.join().is_err() {
                error!("pump thread panicked");
            }
        }
        self.status()
    }
}

impl Drop for BufferedSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl RealtimeSampler for BufferedSampler {
    fn format(&self) -> Format {
        self.format
    }

    fn sample(&mut self, buf: &mut [Sample]) -> usize {
        BufferedSampler::sample(self, buf)
    }

    fn buffered(&self) -> usize {
        BufferedSampler::buffered(self)
    }

    fn status(&self) -> StreamStatus {
        BufferedSampler::status(self)
    }

    fn subscribe_status(&self) -> watch::Receiver<StreamStatus> {
        BufferedSampler::subscribe_status(self)
    }

    fn diagnostics(&self) -> DiagnosticsSnapshot {
        BufferedSampler::diagnostics(self)
    }

    fn stop(&self) {
        BufferedSampler::stop(self)
    }
}

/// Samples the pump should ask the source for: the free run before the
/// write cursor wraps, or all free space when that run is shorter than a
/// frame. Always whole frames; 0 means wait.
fn request_len(ring: &SampleRing, format: Format) -> usize {
    let contiguous = format.whole_frames(ring.contiguous_free());
    if contiguous > 0 {
        contiguous
    } else {
        format.whole_frames(ring.free())
    }
}

fn run_pump<S: SampleSource>(
    mut source: S,
    shared: Arc<Shared>,
    config: BufferConfig,
    format: Format,
) {
    let _span = info_span!("pump", sample_rate = format.sample_rate, channels = format.channels)
        .entered();
    info!("pump started");

    let mut scratch = vec![0 as Sample; format.samples_per_second()];
    let mut empty_fills = 0usize;

    let outcome = loop {
        // ── 1. Wait for room ─────────────────────────────────────────────
        let request = {
            let mut state = shared.state.lock();
            loop {
                if !shared.running.load(Ordering::Acquire) {
                    break None;
                }
                let request = request_len(&state.ring, format);
                if request > 0 {
                    break Some(request);
                }
                shared.diagnostics.record_wait();
                trace!("ring full, pump waiting");
                let timed_out = shared
                    .space
                    .wait_for(&mut state, config.wait_timeout())
                    .timed_out();
                if timed_out {
                    trace!("backpressure wait timed out");
                }
            }
        };
        let Some(request) = request else {
            break StreamStatus::Cancelled;
        };

        // ── 2. Fill outside the lock ─────────────────────────────────────
        match source.fill(&mut scratch[..request]) {
            Ok(Fill::Produced(0)) => {
                shared.diagnostics.record_fill(0);
                empty_fills += 1;
                if config.max_empty_fills > 0 && empty_fills >= config.max_empty_fills {
                    break StreamStatus::Failed(Arc::new(BridgeError::NoProgress {
                        attempts: empty_fills,
                    }));
                }
                thread::yield_now();
            }
            Ok(Fill::Produced(n)) => {
                empty_fills = 0;
                let n = n.min(request);
                // Single producer: free space only grew since `request` was sized.
                let written = shared.state.lock().ring.write(&scratch[..n]);
                if written < n {
                    warn!(produced = n, written, "ring shrank under the pump");
                }
                shared.diagnostics.record_fill(written);
            }
            Ok(Fill::Exhausted) => {
                debug!("source exhausted");
                break StreamStatus::Ended;
            }
            Err(e) => break StreamStatus::Failed(Arc::new(e)),
        }
    };

    shared.latch(outcome);
    info!("pump stopped");
}
