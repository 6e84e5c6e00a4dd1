//! Wait-free consumer variant built on `ringbuf::HeapRb`.
//!
//! `sample()` never touches a lock: it pops from the SPSC consumer half and
//! unparks the pump thread. The pump parks with a bounded timeout while the
//! ring has no room for a whole frame. Status lives behind its own mutex and
//! is only read off the audio path.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle, Thread};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, trace};

use super::{
    latch_status, BufferConfig, BufferDiagnostics, DiagnosticsSnapshot, RealtimeSampler,
    StreamStatus,
};
use crate::buffering::{
    create_sample_ring, Consumer, Observer, Producer, SampleConsumer, SampleProducer,
    UnderrunFiller,
};
use crate::error::{BridgeError, Result};
use crate::format::{Format, Sample};
use crate::source::{Fill, SampleSource};

struct Shared {
    running: AtomicBool,
    status: Mutex<StreamStatus>,
    status_tx: watch::Sender<StreamStatus>,
    diagnostics: BufferDiagnostics,
}

impl Shared {
    fn latch(&self, next: StreamStatus) -> bool {
        latch_status(&mut self.status.lock(), next, &self.status_tx)
    }
}

pub struct LockFreeSampler {
    consumer: SampleConsumer,
    shared: Arc<Shared>,
    format: Format,
    filler: UnderrunFiller,
    pump_thread: Thread,
    pump: Option<JoinHandle<()>>,
}

impl LockFreeSampler {
    /// Size a lock-free ring to one second of `source.format()` and start
    /// pumping.
    ///
    /// # Errors
    /// Same as [`super::BufferedSampler::spawn`].
    pub fn spawn<S: SampleSource>(source: S, config: BufferConfig) -> Result<Self> {
        let reported = source.format();
        let format = Format::new(reported.sample_rate, reported.channels)?;
        let (producer, consumer) = create_sample_ring(format);

        let (status_tx, _) = watch::channel(StreamStatus::Running);
        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            status: Mutex::new(StreamStatus::Running),
            status_tx,
            diagnostics: BufferDiagnostics::default(),
        });

        let pump_shared = Arc::clone(&shared);
        let pump_config = config.clone();
        let pump = thread::Builder::new()
            .name("pcmbridge-pump-lf".into())
            .spawn(move || run_pump(source, producer, pump_shared, pump_config, format))?;

        info!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            capacity = format.samples_per_second(),
            "lock-free sampler started"
        );

        Ok(Self {
            consumer,
            shared,
            format,
            filler: UnderrunFiller::new(config.underrun_policy, format),
            pump_thread: pump.thread().clone(),
            pump: Some(pump),
        })
    }

    pub fn format(&self) -> Format {
        self.format
    }

    /// Fill `buf` completely. Returns `buf.len()`.
    pub fn sample(&mut self, buf: &mut [Sample]) -> usize {
        let real = self.consumer.pop_slice(buf);
        if real > 0 {
            self.pump_thread.unpark();
        }

        let padded = self.filler.complete(buf, real);
        self.shared.diagnostics.record_sample(real, padded);
        buf.len()
    }

    pub fn buffered(&self) -> usize {
        self.consumer.occupied_len()
    }

    pub fn status(&self) -> StreamStatus {
        self.shared.status.lock().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StreamStatus> {
        self.shared.status_tx.subscribe()
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.shared.diagnostics.snapshot()
    }

    pub fn stop(&self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            debug!("lock-free sampler stop requested");
        }
        self.shared.latch(StreamStatus::Cancelled);
        self.pump_thread.unpark();
    }

    /// Stop the pump and wait for its thread to exit.
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

impl Drop for LockFreeSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl RealtimeSampler for LockFreeSampler {
    fn format(&self) -> Format {
        self.format
    }

    fn sample(&mut self, buf: &mut [Sample]) -> usize {
        LockFreeSampler::sample(self, buf)
    }

    fn buffered(&self) -> usize {
        LockFreeSampler::buffered(self)
    }

    fn status(&self) -> StreamStatus {
        LockFreeSampler::status(self)
    }

    fn subscribe_status(&self) -> watch::Receiver<StreamStatus> {
        LockFreeSampler::subscribe_status(self)
    }

    fn diagnostics(&self) -> DiagnosticsSnapshot {
        LockFreeSampler::diagnostics(self)
    }

    fn stop(&self) {
        LockFreeSampler::stop(self)
    }
}

fn run_pump<S: SampleSource>(
    mut source: S,
    mut producer: SampleProducer,
    shared: Arc<Shared>,
    config: BufferConfig,
    format: Format,
) {
    let _span = info_span!("pump_lf", sample_rate = format.sample_rate, channels = format.channels)
        .entered();
    info!("pump started");

    let mut scratch = vec![0 as Sample; format.samples_per_second()];
    let mut empty_fills = 0usize;

    let outcome = loop {
        if !shared.running.load(Ordering::Acquire) {
            break StreamStatus::Cancelled;
        }

        let request = format.whole_frames(producer.vacant_len());
        if request == 0 {
            shared.diagnostics.record_wait();
            trace!("ring full, pump parked");
            // An unpark that lands before this call makes it return at once.
            thread::park_timeout(config.wait_timeout());
            continue;
        }

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
                let written = producer.push_slice(&scratch[..n.min(request)]);
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
