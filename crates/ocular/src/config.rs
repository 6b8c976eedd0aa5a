use smallvec::SmallVec;

use crate::{
    core::prelude::{PixelEncoding, Resolution},
    params::Parameter,
};

/// How many frames may sit between the producer and the consumer.
///
/// Two is enough to absorb one frame of consumer jitter; anything deeper
/// only grows the capture-to-delivery latency.
pub const DEFAULT_QUEUE_DEPTH: usize = 2;

/// Pool size when the backend has no recommendation of its own. One
/// buffer filling, one queued, one in flight between the two.
pub const DEFAULT_BUFFER_COUNT: usize = 3;

/// Everything a session needs to bring a camera up.
///
/// Built with `with_*` chaining; the default is a 640x480 I420 stream at
/// 30 fps on device 0.
///
/// # Example
/// ```rust
/// use ocular::config::CameraConfig;
/// use ocular::core::prelude::{PixelEncoding, Resolution};
///
/// let config = CameraConfig::default()
///     .with_resolution(Resolution::new(1280, 720).unwrap())
///     .with_encoding(PixelEncoding::YUYV)
///     .with_framerate(60);
/// assert_eq!(config.framerate, 60);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CameraConfig {
    pub resolution: Resolution,
    pub encoding: PixelEncoding,
    /// Frames per second requested from the sensor.
    pub framerate: u32,
    /// Which attached camera to open.
    pub device_index: u32,
    /// Buffers to preallocate for the port.
    pub buffer_count: usize,
    /// Depth of the producer-to-consumer frame queue.
    pub queue_depth: usize,
    /// Controls pushed to the sensor right after bring-up.
    pub initial_parameters: SmallVec<[Parameter; 8]>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            // Resolution::new only fails on zero dimensions.
            resolution: Resolution::new(640, 480).unwrap_or_else(|| unreachable!()),
            encoding: PixelEncoding::I420,
            framerate: 30,
            device_index: 0,
            buffer_count: DEFAULT_BUFFER_COUNT,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            initial_parameters: SmallVec::new(),
        }
    }
}

impl CameraConfig {
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_encoding(mut self, encoding: PixelEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_framerate(mut self, framerate: u32) -> Self {
        self.framerate = framerate;
        self
    }

    pub fn with_device_index(mut self, device_index: u32) -> Self {
        self.device_index = device_index;
        self
    }

    pub fn with_buffer_count(mut self, buffer_count: usize) -> Self {
        self.buffer_count = buffer_count.max(1);
        self
    }

    pub fn with_queue_depth(mut self, queue_depth: usize) -> Self {
        self.queue_depth = queue_depth.max(1);
        self
    }

    pub fn with_parameter(mut self, param: Parameter) -> Self {
        self.initial_parameters.push(param);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_pipeline_shape() {
        let config = CameraConfig::default();
        assert_eq!(config.queue_depth, 2);
        assert_eq!(config.buffer_count, 3);
        assert_eq!(config.resolution.width.get(), 640);
        assert_eq!(config.encoding, PixelEncoding::I420);
    }

    #[test]
    fn builder_floors_counts_at_one() {
        let config = CameraConfig::default().with_buffer_count(0).with_queue_depth(0);
        assert_eq!(config.buffer_count, 1);
        assert_eq!(config.queue_depth, 1);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn config_round_trips_through_json() {
        let config = CameraConfig::default()
            .with_framerate(60)
            .with_parameter(Parameter::Brightness(55))
            .with_parameter(Parameter::Iso(400));
        let json = serde_json::to_string(&config).unwrap();
        let back: CameraConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.framerate, 60);
        assert_eq!(back.encoding, config.encoding);
        assert_eq!(back.resolution, config.resolution);
        assert_eq!(back.initial_parameters.as_slice(), config.initial_parameters.as_slice());
    }
}
