use std::{mem::discriminant, sync::Arc};

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::driver::SensorComponent;

/// Fixed-point ratio as the sensor firmware consumes it.
///
/// Gains and white-balance factors travel to the hardware as a numerator
/// over a 65536 denominator.
///
/// # Example
/// ```rust
/// use ocular::params::Rational;
///
/// let gain = Rational::from_f32(2.0);
/// assert_eq!(gain.num, 131_072);
/// assert_eq!(gain.den, 65_536);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const DEN: i32 = 65_536;

    pub fn from_f32(value: f32) -> Self {
        Self {
            num: (value * Self::DEN as f32) as i32,
            den: Self::DEN,
        }
    }

    pub fn to_f32(self) -> f32 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f32 / self.den as f32
    }
}

/// Image flip applied by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Mirror {
    #[default]
    None,
    Horizontal,
    Vertical,
    Both,
}

/// Output rotation. Only quarter turns are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Snap an arbitrary angle to the nearest supported quarter turn,
    /// or `None` when it is not an exact multiple of 90.
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }
}

/// Automatic exposure program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExposureMode {
    Off,
    #[default]
    Auto,
    Night,
    Sports,
    FixedFps,
}

/// Automatic white balance program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AwbMode {
    Off,
    #[default]
    Auto,
    Sunlight,
    Cloudy,
    Shade,
    Tungsten,
    Fluorescent,
    Incandescent,
    Flash,
    Horizon,
}

/// Exposure metering window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MeteringMode {
    #[default]
    Average,
    Spot,
    Backlit,
    Matrix,
}

/// One tunable sensor control with its value.
///
/// Each variant carries the value in the unit the hardware consumes.
/// [`Parameter::in_range`] encodes the hardware's accepted range; values
/// outside it are silently dropped by [`ParameterPort::set`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parameter {
    /// Colour saturation, -100..=100.
    Saturation(i32),
    /// Edge sharpening, -100..=100.
    Sharpness(i32),
    /// Contrast, -100..=100.
    Contrast(i32),
    /// Brightness, 0..=100.
    Brightness(i32),
    /// Exposure compensation in sixths of a stop, -10..=10.
    ExposureCompensation(i32),
    /// Sensor ISO; only 100, 200, 400 and 800 exist.
    Iso(u32),
    /// Shutter time in microseconds; 0 selects automatic.
    ShutterSpeedUs(u32),
    /// Analog gain, 1.0..=12.0 as a fixed-point ratio.
    AnalogGain(Rational),
    /// Digital gain, 1.0..=64.0 as a fixed-point ratio.
    DigitalGain(Rational),
    /// Manual white-balance gains; both must be positive.
    AwbGains { red: Rational, blue: Rational },
    ExposureMode(ExposureMode),
    AwbMode(AwbMode),
    Metering(MeteringMode),
    Mirror(Mirror),
    Rotation(Rotation),
    VideoStabilisation(bool),
}

impl Parameter {
    /// Whether the hardware would accept this value.
    pub fn in_range(&self) -> bool {
        match *self {
            Parameter::Saturation(v) | Parameter::Sharpness(v) | Parameter::Contrast(v) => {
                (-100..=100).contains(&v)
            }
            Parameter::Brightness(v) => (0..=100).contains(&v),
            Parameter::ExposureCompensation(v) => (-10..=10).contains(&v),
            Parameter::Iso(v) => matches!(v, 100 | 200 | 400 | 800),
            Parameter::ShutterSpeedUs(_) => true,
            Parameter::AnalogGain(r) => (1.0..=12.0).contains(&r.to_f32()),
            Parameter::DigitalGain(r) => (1.0..=64.0).contains(&r.to_f32()),
            Parameter::AwbGains { red, blue } => red.to_f32() > 0.0 && blue.to_f32() > 0.0,
            Parameter::ExposureMode(_)
            | Parameter::AwbMode(_)
            | Parameter::Metering(_)
            | Parameter::Mirror(_)
            | Parameter::Rotation(_)
            | Parameter::VideoStabilisation(_) => true,
        }
    }
}

/// Front door for tuning sensor controls.
///
/// Values set before the session starts are staged and pushed to the
/// sensor during bring-up; values set while running go straight through.
/// Out-of-range values are dropped without an error, matching the firmware
/// contract where a bad control write leaves the previous value in place.
///
/// # Example
/// ```rust
/// use ocular::params::{Parameter, ParameterPort};
///
/// let port = ParameterPort::default();
/// port.set_brightness(60);
/// port.set_brightness(150); // out of range, dropped
/// assert_eq!(port.staged(), vec![Parameter::Brightness(60)]);
/// ```
#[derive(Default)]
pub struct ParameterPort {
    staged: Mutex<SmallVec<[Parameter; 8]>>,
    sink: RwLock<Option<Arc<dyn SensorComponent>>>,
}

impl ParameterPort {
    /// Stage or apply one control value. Out-of-range values are ignored.
    ///
    /// Every accepted value also updates the staged set, so a later
    /// bring-up replays the most recent value for each control.
    pub fn set(&self, param: Parameter) {
        if !param.in_range() {
            debug!(?param, "ignoring out-of-range control");
            return;
        }
        {
            let mut staged = self.staged.lock();
            if let Some(slot) = staged
                .iter_mut()
                .find(|p| discriminant(&**p) == discriminant(&param))
            {
                *slot = param;
            } else {
                staged.push(param);
            }
        }
        if let Some(sink) = self.sink.read().as_ref() {
            if let Err(err) = sink.apply_parameter(&param) {
                warn!(?param, %err, "sensor rejected control");
            }
        }
    }

    pub fn set_saturation(&self, value: i32) {
        self.set(Parameter::Saturation(value));
    }

    pub fn set_sharpness(&self, value: i32) {
        self.set(Parameter::Sharpness(value));
    }

    pub fn set_contrast(&self, value: i32) {
        self.set(Parameter::Contrast(value));
    }

    pub fn set_brightness(&self, value: i32) {
        self.set(Parameter::Brightness(value));
    }

    pub fn set_exposure_compensation(&self, value: i32) {
        self.set(Parameter::ExposureCompensation(value));
    }

    pub fn set_iso(&self, value: u32) {
        self.set(Parameter::Iso(value));
    }

    pub fn set_shutter_speed_us(&self, value: u32) {
        self.set(Parameter::ShutterSpeedUs(value));
    }

    pub fn set_analog_gain(&self, value: f32) {
        self.set(Parameter::AnalogGain(Rational::from_f32(value)));
    }

    pub fn set_digital_gain(&self, value: f32) {
        self.set(Parameter::DigitalGain(Rational::from_f32(value)));
    }

    pub fn set_awb_gains(&self, red: f32, blue: f32) {
        self.set(Parameter::AwbGains {
            red: Rational::from_f32(red),
            blue: Rational::from_f32(blue),
        });
    }

    pub fn set_exposure_mode(&self, mode: ExposureMode) {
        self.set(Parameter::ExposureMode(mode));
    }

    pub fn set_awb_mode(&self, mode: AwbMode) {
        self.set(Parameter::AwbMode(mode));
    }

    pub fn set_metering_mode(&self, mode: MeteringMode) {
        self.set(Parameter::Metering(mode));
    }

    pub fn set_mirror(&self, mirror: Mirror) {
        self.set(Parameter::Mirror(mirror));
    }

    pub fn set_rotation(&self, rotation: Rotation) {
        self.set(Parameter::Rotation(rotation));
    }

    pub fn set_video_stabilisation(&self, enabled: bool) {
        self.set(Parameter::VideoStabilisation(enabled));
    }

    /// Controls staged for the next bring-up, in set order.
    pub fn staged(&self) -> Vec<Parameter> {
        self.staged.lock().to_vec()
    }

    /// Flush staged controls to `sink` and route later sets through it.
    pub(crate) fn bind(&self, sink: Arc<dyn SensorComponent>) {
        for param in self.staged.lock().iter() {
            if let Err(err) = sink.apply_parameter(param) {
                warn!(?param, %err, "sensor rejected staged control");
            }
        }
        *self.sink.write() = Some(sink);
    }

    /// Detach from the sensor; later sets stage again.
    pub(crate) fn unbind(&self) {
        *self.sink.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_values_are_dropped() {
        let port = ParameterPort::default();
        port.set_brightness(150);
        port.set_saturation(-101);
        port.set_iso(350);
        port.set_exposure_compensation(11);
        port.set_analog_gain(0.5);
        assert!(port.staged().is_empty());
    }

    #[test]
    fn later_set_replaces_staged_value() {
        let port = ParameterPort::default();
        port.set_brightness(40);
        port.set_contrast(10);
        port.set_brightness(60);
        assert_eq!(
            port.staged(),
            vec![Parameter::Brightness(60), Parameter::Contrast(10)]
        );
    }

    #[test]
    fn gains_use_the_firmware_denominator() {
        let gain = Rational::from_f32(2.0);
        assert_eq!(gain, Rational { num: 131_072, den: 65_536 });
        assert!((Rational::from_f32(1.5).to_f32() - 1.5).abs() < 1e-4);
    }

    #[test]
    fn rotation_snaps_only_quarter_turns() {
        assert_eq!(Rotation::from_degrees(90), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(45), None);
    }
}
