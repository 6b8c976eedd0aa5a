use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tracing::trace;

use crate::{
    core::prelude::{Owner, PixelEncoding, PoolBuffer},
    session::Pipeline,
};

/// A borrowed view of one delivered frame.
///
/// The pixels live in a pool buffer owned by the [`FrameAccessor`]; the
/// view is valid until the next call to `next` or `release`.
pub struct Frame<'a> {
    buf: &'a PoolBuffer,
    encoding: PixelEncoding,
    width: u32,
    height: u32,
}

impl Frame<'_> {
    /// The frame's pixel bytes.
    pub fn payload(&self) -> &[u8] {
        self.buf.payload()
    }

    /// Capture time on the sensor clock, in microseconds. 0 means the
    /// clock could not be read when the frame was captured.
    pub fn timestamp_us(&self) -> u64 {
        self.buf.timestamp_us()
    }

    pub fn encoding(&self) -> PixelEncoding {
        self.encoding
    }

    /// Padded width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Padded height in rows.
    pub fn height(&self) -> u32 {
        self.height
    }
}

/// The consumer's side of a running session.
///
/// Holds at most one frame at a time: taking the next frame hands the
/// previous buffer back first. Dropping the accessor returns whatever it
/// still holds, so a panicking consumer cannot strand a buffer.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use ocular::{config::CameraConfig, session::CaptureSession, sim::SimBackend};
///
/// let backend = SimBackend::new();
/// let session = CaptureSession::new(backend.handle(), CameraConfig::default());
/// session.start().unwrap();
/// backend.sensor().unwrap().deliver(&[9u8; 24]);
///
/// let mut frames = session.accessor().unwrap();
/// if let Some(frame) = frames.next(Duration::from_millis(100)) {
///     assert_eq!(frame.payload().len(), 24);
/// }
/// ```
pub struct FrameAccessor {
    pipeline: Arc<Pipeline>,
    live: Arc<AtomicBool>,
    current: Option<PoolBuffer>,
}

impl FrameAccessor {
    pub(crate) fn new(pipeline: Arc<Pipeline>, live: Arc<AtomicBool>) -> Self {
        Self {
            pipeline,
            live,
            current: None,
        }
    }

    /// Wait up to `timeout` for the next frame.
    ///
    /// Returns `None` on timeout; that is a normal outcome under a slow
    /// producer, not an error. Any frame still held from the previous
    /// call is released first.
    pub fn next(&mut self, timeout: Duration) -> Option<Frame<'_>> {
        self.release();
        let buf = self.pipeline.queue.wait_pop(timeout)?;
        self.pipeline.pool.retag(&buf, Owner::CheckedOut);
        self.pipeline.metrics.record_delivered();
        trace!(index = buf.index(), len = buf.len(), "frame checked out");
        let format = &self.pipeline.format;
        let frame = Frame {
            buf: self.current.insert(buf),
            encoding: format.encoding,
            width: format.width,
            height: format.height,
        };
        Some(frame)
    }

    /// Give the held frame back to the pipeline. No-op when nothing is
    /// checked out.
    pub fn release(&mut self) {
        if let Some(buf) = self.current.take() {
            self.pipeline.recycle(buf);
        }
    }
}

impl Drop for FrameAccessor {
    fn drop(&mut self) {
        self.release();
        self.live.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::{
        config::CameraConfig,
        session::{CaptureError, CaptureSession},
        sim::{SimBackend, SimSensor},
    };

    fn running_session() -> (SimBackend, CaptureSession, Arc<SimSensor>) {
        let backend = SimBackend::new();
        let session = CaptureSession::new(backend.handle(), CameraConfig::default());
        session.start().unwrap();
        let sensor = backend.sensor().unwrap();
        (backend, session, sensor)
    }

    #[test]
    fn next_delivers_and_release_refills_the_port() {
        let (_backend, session, sensor) = running_session();
        assert!(sensor.deliver(&[5u8; 48]));

        let mut frames = session.accessor().unwrap();
        {
            let frame = frames.next(Duration::from_millis(100)).unwrap();
            assert_eq!(frame.payload(), &[5u8; 48]);
            assert_ne!(frame.timestamp_us(), 0);
            assert_eq!(frame.width(), 640);
            assert_eq!(frame.height(), 480);
        }
        // One buffer is with the consumer, so stop must refuse.
        assert!(matches!(session.stop(), Err(CaptureError::FrameNotReleased)));

        frames.release();
        assert_eq!(sensor.pending(), 3);
        drop(frames);
        session.stop().unwrap();
    }

    #[test]
    fn next_times_out_without_a_frame() {
        let (_backend, session, _sensor) = running_session();
        let mut frames = session.accessor().unwrap();
        let start = Instant::now();
        assert!(frames.next(Duration::from_millis(100)).is_none());
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50), "woke too early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(500), "overslept: {elapsed:?}");
        drop(frames);
        session.stop().unwrap();
    }

    #[test]
    fn next_releases_the_previous_frame_first() {
        let (_backend, session, sensor) = running_session();
        assert!(sensor.deliver(&[1u8; 16]));
        assert!(sensor.deliver(&[2u8; 16]));

        let mut frames = session.accessor().unwrap();
        let first = frames.next(Duration::from_millis(100)).unwrap().payload()[0];
        let second = frames.next(Duration::from_millis(100)).unwrap().payload()[0];
        assert_eq!((first, second), (1, 2));
        // Only one buffer may ever be checked out.
        assert_eq!(session.metrics().delivered, 2);
        drop(frames);
        session.stop().unwrap();
    }

    #[test]
    fn dropping_the_accessor_returns_the_held_frame() {
        let (_backend, session, sensor) = running_session();
        assert!(sensor.deliver(&[3u8; 16]));

        {
            let mut frames = session.accessor().unwrap();
            let _ = frames.next(Duration::from_millis(100)).unwrap();
        }
        // Frame came back on drop; teardown is clean.
        assert_eq!(sensor.pending(), 3);
        session.stop().unwrap();
    }

    #[test]
    fn only_one_accessor_at_a_time() {
        let (_backend, session, _sensor) = running_session();
        let frames = session.accessor().unwrap();
        assert!(matches!(session.accessor(), Err(CaptureError::AccessorLive)));
        drop(frames);
        let _frames = session.accessor().unwrap();
        session.stop().unwrap();
    }
}
