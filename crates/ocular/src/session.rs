use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    accessor::FrameAccessor,
    config::CameraConfig,
    core::prelude::{
        BufferPool, CaptureMetrics, FrameQueue, MetricsSnapshot, Owner, PoolBuffer, PushOutcome,
    },
    driver::{DriverError, FrameCallback, PortFormat, SensorBackend, SensorComponent},
    params::ParameterPort,
};

/// Where a session sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No hardware held; the only state `start` accepts.
    Uninitialized,
    /// Bring-up in progress.
    Configuring,
    /// Frames are flowing.
    Running,
    /// Teardown in progress.
    Stopping,
}

/// The bring-up step at which setup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    CreateComponent,
    CommitFormat,
    EnableOutput,
    PrimeBuffers,
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SetupStep::CreateComponent => "component create",
            SetupStep::CommitFormat => "format commit",
            SetupStep::EnableOutput => "port enable",
            SetupStep::PrimeBuffers => "buffer priming",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by [`CaptureSession`].
#[derive(Debug, Error)]
pub enum CaptureError {
    /// `start` on a session that is not `Uninitialized`.
    #[error("capture already running")]
    AlreadyRunning,
    /// Bring-up failed; everything acquired so far was unwound.
    #[error("setup failed at {step}: {source}")]
    Setup {
        step: SetupStep,
        #[source]
        source: DriverError,
    },
    /// `stop` while the consumer still holds a frame.
    #[error("a frame is still checked out")]
    FrameNotReleased,
    /// A frame accessor for this session already exists.
    #[error("a frame accessor is already live")]
    AccessorLive,
    /// The operation needs a running session.
    #[error("capture is not running")]
    NotRunning,
}

impl CaptureError {
    /// Stable short code for logs and metrics labels.
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::AlreadyRunning => "already-running",
            CaptureError::Setup { .. } => "setup",
            CaptureError::FrameNotReleased => "frame-not-released",
            CaptureError::AccessorLive => "accessor-live",
            CaptureError::NotRunning => "not-running",
        }
    }
}

/// The running half of a session: pool, queue and sensor wired together.
///
/// `ingest` runs on the sensor's callback thread and never blocks; the
/// consumer side drains `queue` through a [`FrameAccessor`].
pub(crate) struct Pipeline {
    pub(crate) pool: BufferPool,
    pub(crate) queue: FrameQueue<PoolBuffer>,
    pub(crate) format: PortFormat,
    pub(crate) metrics: CaptureMetrics,
    pub(crate) sensor: Arc<dyn SensorComponent>,
}

impl Pipeline {
    /// Handle one buffer coming back from the port.
    ///
    /// Empty buffers are discarded. A filled buffer goes to the frame
    /// queue when there is room; otherwise it is recycled straight back
    /// to the pool so the port never starves behind a slow consumer.
    pub(crate) fn ingest(&self, buf: PoolBuffer) {
        if buf.is_empty() {
            debug!(index = buf.index(), "discarding empty buffer");
            self.metrics.record_discarded_empty();
            self.pool.release(buf);
        } else {
            // Tag before the push; once queued the consumer may retag it.
            self.pool.retag(&buf, Owner::InQueue);
            match self.queue.try_push(buf) {
                PushOutcome::Accepted => self.metrics.record_queued(),
                PushOutcome::Rejected(buf) => {
                    self.metrics.record_recycled();
                    self.pool.release(buf);
                }
            }
        }
        self.refill();
    }

    /// Return a consumer-held buffer and top the port back up.
    pub(crate) fn recycle(&self, buf: PoolBuffer) {
        self.pool.release(buf);
        self.refill();
    }

    /// Push every free buffer back to the port.
    pub(crate) fn refill(&self) {
        while let Some(buf) = self.pool.checkout(Owner::InHardware) {
            if let Err(buf) = self.sensor.submit_buffer(buf) {
                self.pool.release(buf);
                break;
            }
        }
        if self.pool.counts().in_hardware == 0 {
            warn!("port has no buffers, waiting on the consumer");
            self.metrics.record_starved();
        }
    }
}

struct Active {
    pipeline: Arc<Pipeline>,
    accessor_live: Arc<AtomicBool>,
}

/// Owns one camera from bring-up to teardown.
///
/// The session is a strict state machine: `start` only succeeds from
/// `Uninitialized`, `stop` is a no-op unless `Running`, and a failed
/// `start` releases everything it acquired before returning.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use ocular::{config::CameraConfig, session::CaptureSession, sim::SimBackend};
///
/// let backend = SimBackend::new();
/// let session = CaptureSession::new(backend.handle(), CameraConfig::default());
/// session.start().unwrap();
/// backend.sensor().unwrap().deliver(&[0x80; 32]);
///
/// let mut frames = session.accessor().unwrap();
/// let frame = frames.next(Duration::from_millis(100)).unwrap();
/// assert_eq!(frame.payload()[0], 0x80);
/// drop(frames);
/// session.stop().unwrap();
/// ```
pub struct CaptureSession {
    backend: Arc<dyn SensorBackend>,
    config: Mutex<CameraConfig>,
    state: Mutex<SessionState>,
    active: Mutex<Option<Active>>,
    params: ParameterPort,
    metrics: CaptureMetrics,
}

impl CaptureSession {
    pub fn new(backend: Arc<dyn SensorBackend>, config: CameraConfig) -> Self {
        Self {
            backend,
            config: Mutex::new(config),
            state: Mutex::new(SessionState::Uninitialized),
            active: Mutex::new(None),
            params: ParameterPort::default(),
            metrics: CaptureMetrics::default(),
        }
    }

    /// Bring the camera up and start frame flow.
    ///
    /// On any failure every step already completed is undone, and the
    /// session is back in `Uninitialized` with nothing held.
    pub fn start(&self) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if *state != SessionState::Uninitialized {
            return Err(CaptureError::AlreadyRunning);
        }
        *state = SessionState::Configuring;
        let config = self.config.lock().clone();
        match self.bring_up(&config) {
            Ok(pipeline) => {
                info!(
                    width = pipeline.format.width,
                    height = pipeline.format.height,
                    encoding = %pipeline.format.encoding,
                    buffers = pipeline.pool.capacity(),
                    queue_depth = pipeline.queue.depth(),
                    "capture running"
                );
                *self.active.lock() = Some(Active {
                    pipeline,
                    accessor_live: Arc::new(AtomicBool::new(false)),
                });
                *state = SessionState::Running;
                Ok(())
            }
            Err(err) => {
                *state = SessionState::Uninitialized;
                warn!(%err, "bring-up failed, unwound");
                Err(err)
            }
        }
    }

    fn bring_up(&self, config: &CameraConfig) -> Result<Arc<Pipeline>, CaptureError> {
        let sensor = self
            .backend
            .create_component(config.device_index)
            .map_err(|source| CaptureError::Setup {
                step: SetupStep::CreateComponent,
                source,
            })?;

        let format = PortFormat::for_config(config);
        if let Err(source) = sensor.commit_format(&format) {
            return Err(CaptureError::Setup {
                step: SetupStep::CommitFormat,
                source,
            });
        }

        for param in &config.initial_parameters {
            self.params.set(*param);
        }

        let pool = BufferPool::allocate(config.buffer_count, format.frame_bytes());
        let pipeline = Arc::new(Pipeline {
            pool,
            queue: FrameQueue::with_depth(config.queue_depth),
            format,
            metrics: self.metrics.clone(),
            sensor: Arc::clone(&sensor),
        });

        // Weak so the sensor's callback does not keep the pipeline alive
        // after teardown; a late buffer is dropped with it.
        let weak = Arc::downgrade(&pipeline);
        let callback: FrameCallback = Box::new(move |buf| {
            if let Some(pipeline) = weak.upgrade() {
                pipeline.ingest(buf);
            }
        });
        if let Err(source) = sensor.enable_output(callback) {
            return Err(CaptureError::Setup {
                step: SetupStep::EnableOutput,
                source,
            });
        }

        self.params.bind(Arc::clone(&sensor));
        pipeline.refill();
        if pipeline.pool.counts().in_hardware == 0 {
            self.params.unbind();
            sensor.disable_output();
            for buf in sensor.drain_output() {
                pipeline.pool.release(buf);
            }
            return Err(CaptureError::Setup {
                step: SetupStep::PrimeBuffers,
                source: DriverError::PortStarved,
            });
        }
        Ok(pipeline)
    }

    /// Tear the camera down and reclaim every buffer.
    ///
    /// Idempotent: stopping a session that is not running is `Ok`.
    /// Fails only when the consumer still holds a checked-out frame.
    pub fn stop(&self) -> Result<(), CaptureError> {
        let mut state = self.state.lock();
        if *state != SessionState::Running {
            return Ok(());
        }
        let mut active_slot = self.active.lock();
        if let Some(active) = active_slot.as_ref() {
            if active.pipeline.pool.counts().checked_out > 0 {
                return Err(CaptureError::FrameNotReleased);
            }
        }
        *state = SessionState::Stopping;
        if let Some(active) = active_slot.take() {
            let pipeline = active.pipeline;
            pipeline.sensor.disable_output();
            for buf in pipeline.sensor.drain_output() {
                pipeline.pool.release(buf);
            }
            for buf in pipeline.queue.drain() {
                pipeline.pool.release(buf);
            }
            self.params.unbind();
            let counts = pipeline.pool.counts();
            if counts.free != pipeline.pool.capacity() {
                debug!(?counts, "buffers still out at teardown");
            }
            info!(metrics = ?self.metrics, "capture stopped");
        }
        *state = SessionState::Uninitialized;
        Ok(())
    }

    /// Replace the configuration used by the next `start`.
    pub fn configure(&self, config: CameraConfig) -> Result<(), CaptureError> {
        let state = self.state.lock();
        if *state != SessionState::Uninitialized {
            return Err(CaptureError::AlreadyRunning);
        }
        *self.config.lock() = config;
        Ok(())
    }

    /// Open the consumer side. At most one accessor exists at a time.
    pub fn accessor(&self) -> Result<FrameAccessor, CaptureError> {
        let state = self.state.lock();
        if *state != SessionState::Running {
            return Err(CaptureError::NotRunning);
        }
        let active = self.active.lock();
        let active = active.as_ref().ok_or(CaptureError::NotRunning)?;
        if active.accessor_live.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AccessorLive);
        }
        Ok(FrameAccessor::new(
            Arc::clone(&active.pipeline),
            Arc::clone(&active.accessor_live),
        ))
    }

    /// Sensor clock in microseconds; 0 when not running or unreadable.
    pub fn timestamp_us(&self) -> u64 {
        match self.active.lock().as_ref() {
            Some(active) => active.pipeline.sensor.clock_us(),
            None => 0,
        }
    }

    /// Tune sensor controls before or during capture.
    pub fn parameters(&self) -> &ParameterPort {
        &self.params
    }

    /// Counters since the session was created.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn config(&self) -> CameraConfig {
        self.config.lock().clone()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.stop().is_err() {
            // A frame is still out; silence the sensor and let the
            // pipeline unwind with the remaining handles.
            if let Some(active) = self.active.lock().take() {
                active.pipeline.sensor.disable_output();
            }
        }
    }
}
