#![doc = include_str!("../README.md")]

pub mod accessor;
pub mod config;
pub mod driver;
pub mod params;
pub mod session;
pub mod sim;

pub use ocular_core as core;

pub mod prelude {
    pub use crate::{
        accessor::{Frame, FrameAccessor},
        config::{CameraConfig, DEFAULT_BUFFER_COUNT, DEFAULT_QUEUE_DEPTH},
        driver::{DriverError, PortFormat, SensorBackend, SensorComponent},
        params::{
            AwbMode, ExposureMode, MeteringMode, Mirror, Parameter, ParameterPort, Rational,
            Rotation,
        },
        session::{CaptureError, CaptureSession, SessionState, SetupStep},
        sim::{SimBackend, SimSensor},
    };
    pub use ocular_core::prelude::*;
}
