//! In-process stand-in for real camera hardware.
//!
//! The simulated sensor keeps the real buffer contract: submitted buffers
//! queue up inside the "port" and come back through the registered
//! callback one per delivered frame. Tests and demos drive frame arrival
//! explicitly with [`SimSensor::deliver`].

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use tracing::trace;

use crate::{
    core::prelude::PoolBuffer,
    driver::{DriverError, FrameCallback, PortFormat, SensorBackend, SensorComponent},
    params::Parameter,
};

#[derive(Default)]
struct SimShared {
    fail_create: AtomicBool,
    fail_commit: AtomicBool,
    fail_enable: AtomicBool,
    fail_submit: AtomicBool,
    last: Mutex<Option<Arc<SimSensor>>>,
}

/// Backend that fabricates [`SimSensor`] components.
///
/// Failure knobs make each bring-up step refusable, so teardown paths can
/// be exercised without hardware.
///
/// # Example
/// ```rust
/// use ocular::{config::CameraConfig, session::CaptureSession, sim::SimBackend};
///
/// let backend = SimBackend::new();
/// let session = CaptureSession::new(backend.handle(), CameraConfig::default());
/// session.start().unwrap();
/// backend.sensor().unwrap().deliver(&[0u8; 16]);
/// ```
#[derive(Default)]
pub struct SimBackend {
    shared: Arc<SimShared>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cloneable handle implementing [`SensorBackend`].
    pub fn handle(&self) -> Arc<dyn SensorBackend> {
        Arc::new(SimBackendHandle {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Make the next `create_component` fail.
    pub fn fail_component_create(&self, fail: bool) {
        self.shared.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make `commit_format` fail on sensors created afterwards.
    pub fn fail_format_commit(&self, fail: bool) {
        self.shared.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Make `enable_output` fail on sensors created afterwards.
    pub fn fail_port_enable(&self, fail: bool) {
        self.shared.fail_enable.store(fail, Ordering::SeqCst);
    }

    /// Make every `submit_buffer` bounce.
    pub fn fail_buffer_submit(&self, fail: bool) {
        self.shared.fail_submit.store(fail, Ordering::SeqCst);
    }

    /// The most recently created sensor, if any.
    pub fn sensor(&self) -> Option<Arc<SimSensor>> {
        self.shared.last.lock().clone()
    }
}

struct SimBackendHandle {
    shared: Arc<SimShared>,
}

impl SensorBackend for SimBackendHandle {
    fn create_component(&self, device_index: u32) -> Result<Arc<dyn SensorComponent>, DriverError> {
        if self.shared.fail_create.load(Ordering::SeqCst) {
            return Err(DriverError::Unavailable(format!(
                "no camera at index {device_index}"
            )));
        }
        let sensor = Arc::new(SimSensor {
            shared: Arc::clone(&self.shared),
            submitted: SegQueue::new(),
            callback: Mutex::new(None),
            enabled: AtomicBool::new(false),
            clock_broken: AtomicBool::new(false),
            epoch: Instant::now(),
            applied: Mutex::new(Vec::new()),
            format: Mutex::new(None),
        });
        *self.shared.last.lock() = Some(Arc::clone(&sensor));
        Ok(sensor)
    }
}

/// One simulated camera port.
pub struct SimSensor {
    shared: Arc<SimShared>,
    submitted: SegQueue<PoolBuffer>,
    // Held across the callback invocation so disable_output cannot return
    // while a delivery is mid-flight.
    callback: Mutex<Option<FrameCallback>>,
    enabled: AtomicBool,
    clock_broken: AtomicBool,
    epoch: Instant,
    applied: Mutex<Vec<Parameter>>,
    format: Mutex<Option<PortFormat>>,
}

impl SimSensor {
    /// Fill the oldest submitted buffer with `payload`, stamp it and run
    /// the callback. Returns false when the port is disabled or has no
    /// buffer to fill, which is how real hardware drops a frame.
    pub fn deliver(&self, payload: &[u8]) -> bool {
        let callback = self.callback.lock();
        let Some(callback) = callback.as_ref() else {
            return false;
        };
        let Some(mut buf) = self.submitted.pop() else {
            trace!("frame dropped, no buffer at the port");
            return false;
        };
        buf.fill(payload);
        buf.set_timestamp_us(self.clock_us());
        callback(buf);
        true
    }

    /// Run the callback with a zero-length buffer, as ports do for
    /// metadata-only transfers.
    pub fn deliver_empty(&self) -> bool {
        let callback = self.callback.lock();
        let Some(callback) = callback.as_ref() else {
            return false;
        };
        let Some(buf) = self.submitted.pop() else {
            return false;
        };
        callback(buf);
        true
    }

    /// Buffers currently waiting at the port.
    pub fn pending(&self) -> usize {
        self.submitted.len()
    }

    /// Every control write the sensor has accepted, in order.
    pub fn applied_parameters(&self) -> Vec<Parameter> {
        self.applied.lock().clone()
    }

    /// The last committed format.
    pub fn format(&self) -> Option<PortFormat> {
        *self.format.lock()
    }

    /// Simulate an unreadable sensor clock.
    pub fn set_clock_broken(&self, broken: bool) {
        self.clock_broken.store(broken, Ordering::SeqCst);
    }
}

impl SensorComponent for SimSensor {
    fn commit_format(&self, format: &PortFormat) -> Result<(), DriverError> {
        if self.shared.fail_commit.load(Ordering::SeqCst) {
            return Err(DriverError::FormatRejected(format!(
                "{}x{} {} unsupported",
                format.width, format.height, format.encoding
            )));
        }
        *self.format.lock() = Some(*format);
        Ok(())
    }

    fn enable_output(&self, callback: FrameCallback) -> Result<(), DriverError> {
        if self.shared.fail_enable.load(Ordering::SeqCst) {
            return Err(DriverError::EnableFailed("port stuck".into()));
        }
        *self.callback.lock() = Some(callback);
        self.enabled.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disable_output(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.callback.lock().take();
    }

    fn submit_buffer(&self, buf: PoolBuffer) -> Result<(), PoolBuffer> {
        if self.shared.fail_submit.load(Ordering::SeqCst) || !self.enabled.load(Ordering::SeqCst) {
            return Err(buf);
        }
        self.submitted.push(buf);
        Ok(())
    }

    fn drain_output(&self) -> Vec<PoolBuffer> {
        let mut drained = Vec::new();
        while let Some(buf) = self.submitted.pop() {
            drained.push(buf);
        }
        drained
    }

    fn apply_parameter(&self, param: &Parameter) -> Result<(), DriverError> {
        self.applied.lock().push(*param);
        Ok(())
    }

    fn clock_us(&self) -> u64 {
        if self.clock_broken.load(Ordering::SeqCst) {
            return 0;
        }
        // A clock read of 0 means "unknown" to callers, never a real time.
        (self.epoch.elapsed().as_micros() as u64).max(1)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn sensor() -> (SimBackend, Arc<SimSensor>) {
        let backend = SimBackend::new();
        let handle = backend.handle();
        handle.create_component(0).unwrap();
        let sensor = backend.sensor().unwrap();
        (backend, sensor)
    }

    #[test]
    fn delivery_needs_an_enabled_port_and_a_buffer() {
        use crate::core::prelude::{BufferPool, Owner};

        let (_backend, sensor) = sensor();
        assert!(!sensor.deliver(&[1, 2, 3]));

        let delivered = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&delivered);
        sensor
            .enable_output(Box::new(move |buf| {
                assert_eq!(buf.payload(), &[1, 2, 3]);
                assert_ne!(buf.timestamp_us(), 0);
                seen.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        // Still no buffer at the port.
        assert!(!sensor.deliver(&[1, 2, 3]));

        let pool = BufferPool::allocate(1, 16);
        let buf = pool.checkout(Owner::InHardware).unwrap();
        sensor.submit_buffer(buf).map_err(|_| ()).unwrap();
        assert!(sensor.deliver(&[1, 2, 3]));
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disabled_port_bounces_submissions_and_drains() {
        use crate::core::prelude::{BufferPool, Owner};

        let (_backend, sensor) = sensor();
        sensor.enable_output(Box::new(|_| {})).unwrap();

        let pool = BufferPool::allocate(2, 8);
        sensor
            .submit_buffer(pool.checkout(Owner::InHardware).unwrap())
            .map_err(|_| ())
            .unwrap();
        sensor
            .submit_buffer(pool.checkout(Owner::InHardware).unwrap())
            .map_err(|_| ())
            .unwrap();
        assert_eq!(sensor.pending(), 2);

        sensor.disable_output();
        let drained = sensor.drain_output();
        assert_eq!(drained.len(), 2);
        for buf in drained {
            pool.release(buf);
        }
        let buf = pool.checkout(Owner::InHardware).unwrap();
        assert!(sensor.submit_buffer(buf).is_err());
    }

    #[test]
    fn broken_clock_reads_zero() {
        let (_backend, sensor) = sensor();
        assert_ne!(sensor.clock_us(), 0);
        sensor.set_clock_broken(true);
        assert_eq!(sensor.clock_us(), 0);
    }
}
