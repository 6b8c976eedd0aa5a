use std::sync::Arc;

use thiserror::Error;

use crate::{
    config::CameraConfig,
    core::prelude::{PixelEncoding, PoolBuffer},
    params::Parameter,
};

/// Failure reported by a sensor backend.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The camera component could not be created or opened.
    #[error("component unavailable: {0}")]
    Unavailable(String),
    /// The port refused the requested format.
    #[error("format rejected: {0}")]
    FormatRejected(String),
    /// The output port could not be switched on.
    #[error("port enable failed: {0}")]
    EnableFailed(String),
    /// The port accepted no buffers during priming.
    #[error("output port took no buffers")]
    PortStarved,
    /// A control write was refused.
    #[error("parameter rejected: {0}")]
    ParameterRejected(String),
}

/// Negotiated geometry and encoding for the output port.
///
/// Width and height are padded to the port's alignment; the crop fields
/// keep the caller's requested picture size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortFormat {
    pub encoding: PixelEncoding,
    /// Padded width in pixels.
    pub width: u32,
    /// Padded height in rows.
    pub height: u32,
    /// Visible width before padding.
    pub crop_width: u32,
    /// Visible height before padding.
    pub crop_height: u32,
    pub framerate: u32,
}

impl PortFormat {
    /// Derive the port format a config asks for.
    ///
    /// # Example
    /// ```rust
    /// use ocular::{config::CameraConfig, driver::PortFormat};
    /// use ocular::core::prelude::Resolution;
    ///
    /// let config = CameraConfig::default().with_resolution(Resolution::new(641, 481).unwrap());
    /// let format = PortFormat::for_config(&config);
    /// assert_eq!((format.width, format.height), (672, 496));
    /// assert_eq!((format.crop_width, format.crop_height), (641, 481));
    /// ```
    pub fn for_config(config: &CameraConfig) -> Self {
        let (width, height) = config.resolution.aligned();
        Self {
            encoding: config.encoding,
            width,
            height,
            crop_width: config.resolution.width.get(),
            crop_height: config.resolution.height.get(),
            framerate: config.framerate,
        }
    }

    /// Byte size a pool buffer needs to hold one frame in this format.
    pub fn frame_bytes(&self) -> usize {
        self.encoding.frame_bytes(self.width, self.height)
    }
}

/// Invoked by the backend for every buffer the port hands back, filled
/// or not. Runs on the backend's thread; must not block.
pub type FrameCallback = Box<dyn Fn(PoolBuffer) + Send + Sync>;

/// Factory for sensor components. One backend can open several devices.
pub trait SensorBackend: Send + Sync {
    fn create_component(&self, device_index: u32) -> Result<Arc<dyn SensorComponent>, DriverError>;
}

/// One opened camera, from format negotiation to buffer traffic.
///
/// Buffers move by value: `submit_buffer` transfers ownership to the
/// port, and the port gives each buffer back exactly once, through the
/// callback while enabled or through `drain_output` after disabling.
pub trait SensorComponent: Send + Sync {
    /// Program the output port geometry and encoding.
    fn commit_format(&self, format: &PortFormat) -> Result<(), DriverError>;

    /// Switch the port on and register the buffer-return callback.
    fn enable_output(&self, callback: FrameCallback) -> Result<(), DriverError>;

    /// Switch the port off. When this returns the callback will not run
    /// again and may be dropped.
    fn disable_output(&self);

    /// Hand a buffer to the port for filling. A port that cannot take
    /// the buffer returns it unconsumed.
    fn submit_buffer(&self, buf: PoolBuffer) -> Result<(), PoolBuffer>;

    /// Buffers the port still holds. Only meaningful after
    /// [`SensorComponent::disable_output`].
    fn drain_output(&self) -> Vec<PoolBuffer>;

    /// Write one control value to the sensor.
    fn apply_parameter(&self, param: &Parameter) -> Result<(), DriverError>;

    /// Sensor clock in microseconds. Returns 0 when the clock cannot be
    /// read; a valid reading is never 0.
    fn clock_us(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::prelude::Resolution;

    #[test]
    fn format_pads_geometry_and_sizes_buffers() {
        let config = CameraConfig::default()
            .with_resolution(Resolution::new(640, 480).unwrap())
            .with_encoding(PixelEncoding::I420);
        let format = PortFormat::for_config(&config);
        assert_eq!((format.width, format.height), (640, 480));
        assert_eq!(format.frame_bytes(), 640 * 480 * 3 / 2);

        let config = config.with_resolution(Resolution::new(1, 1).unwrap());
        let format = PortFormat::for_config(&config);
        assert_eq!((format.width, format.height), (32, 16));
        assert_eq!((format.crop_width, format.crop_height), (1, 1));
    }
}
