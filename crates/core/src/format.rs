use std::{fmt, num::NonZeroU32, str::FromStr};

/// Width alignment the output port requires, in pixels.
pub const WIDTH_ALIGN: u32 = 32;
/// Height alignment the output port requires, in rows.
pub const HEIGHT_ALIGN: u32 = 16;

/// Round `value` up to the next multiple of `align`.
///
/// # Example
/// ```rust
/// use ocular_core::prelude::align_up;
///
/// assert_eq!(align_up(640, 32), 640);
/// assert_eq!(align_up(479, 16), 480);
/// ```
pub const fn align_up(value: u32, align: u32) -> u32 {
    value.div_ceil(align) * align
}

/// Four-character code describing the pixel layout delivered by the port.
///
/// # Example
/// ```rust
/// use ocular_core::prelude::PixelEncoding;
///
/// assert_eq!(PixelEncoding::I420.to_string(), "I420");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelEncoding([u8; 4]);

impl PixelEncoding {
    /// Planar YUV 4:2:0.
    pub const I420: PixelEncoding = PixelEncoding(*b"I420");
    /// Packed 24-bit RGB.
    pub const RGB24: PixelEncoding = PixelEncoding(*b"RGB3");
    /// Packed 24-bit BGR.
    pub const BGR24: PixelEncoding = PixelEncoding(*b"BGR3");
    /// Packed YUV 4:2:2.
    pub const YUYV: PixelEncoding = PixelEncoding(*b"YUYV");
    /// Opaque hardware-internal handles.
    pub const OPAQUE: PixelEncoding = PixelEncoding(*b"OPQV");

    /// Construct from raw bytes.
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Little-endian u32 encoding.
    pub fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Try to convert to a printable string.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Worst-case byte size of one full frame at the given (aligned) geometry.
    ///
    /// Used to size pool buffers when the driver does not report its own
    /// recommendation. Unknown codes fall back to 4 bytes per pixel.
    ///
    /// # Example
    /// ```rust
    /// use ocular_core::prelude::PixelEncoding;
    ///
    /// assert_eq!(PixelEncoding::I420.frame_bytes(640, 480), 640 * 480 * 3 / 2);
    /// assert_eq!(PixelEncoding::YUYV.frame_bytes(640, 480), 640 * 480 * 2);
    /// ```
    pub fn frame_bytes(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match &self.0 {
            b"I420" | b"NV12" => pixels * 3 / 2,
            b"YUYV" => pixels * 2,
            b"RGB3" | b"BGR3" => pixels * 3,
            _ => pixels * 4,
        }
    }
}

impl From<u32> for PixelEncoding {
    fn from(value: u32) -> Self {
        Self(value.to_le_bytes())
    }
}

impl fmt::Display for PixelEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.as_str() {
            write!(f, "{s}")
        } else {
            write!(f, "0x{:08x}", self.to_u32())
        }
    }
}

impl FromStr for PixelEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 {
            return Err("pixel encoding must be four ASCII bytes".into());
        }
        let mut arr = [0u8; 4];
        arr.copy_from_slice(bytes);
        Ok(PixelEncoding(arr))
    }
}

/// Resolution of a frame. Immutable for the lifetime of a running session.
///
/// # Example
/// ```rust
/// use ocular_core::prelude::Resolution;
///
/// let res = Resolution::new(640, 480).unwrap();
/// assert_eq!(res.width.get(), 640);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resolution {
    /// Width in pixels (non-zero).
    pub width: NonZeroU32,
    /// Height in pixels (non-zero).
    pub height: NonZeroU32,
}

impl Resolution {
    /// Create a resolution, returning `None` if width or height are zero.
    pub fn new(width: u32, height: u32) -> Option<Self> {
        Some(Self {
            width: NonZeroU32::new(width)?,
            height: NonZeroU32::new(height)?,
        })
    }

    /// Geometry rounded up to the port's alignment requirements.
    ///
    /// # Example
    /// ```rust
    /// use ocular_core::prelude::Resolution;
    ///
    /// let res = Resolution::new(641, 481).unwrap();
    /// assert_eq!(res.aligned(), (672, 496));
    /// ```
    pub fn aligned(&self) -> (u32, u32) {
        (
            align_up(self.width.get(), WIDTH_ALIGN),
            align_up(self.height.get(), HEIGHT_ALIGN),
        )
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for PixelEncoding {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Prefer string encoding so decoding does not rely on `deserialize_any`.
        let encoded = self.as_str().unwrap_or("FFFF");
        serializer.serialize_str(encoded)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for PixelEncoding {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct EncodingVisitor;

        impl<'de> serde::de::Visitor<'de> for EncodingVisitor {
            type Value = PixelEncoding;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a 4-character pixel encoding string")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                PixelEncoding::from_str(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(EncodingVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_is_identity_on_aligned_values() {
        assert_eq!(align_up(0, 32), 0);
        assert_eq!(align_up(32, 32), 32);
        assert_eq!(align_up(33, 32), 64);
    }

    #[test]
    fn encoding_round_trips_through_str() {
        let enc: PixelEncoding = "YUYV".parse().unwrap();
        assert_eq!(enc, PixelEncoding::YUYV);
        assert!("YUY".parse::<PixelEncoding>().is_err());
    }
}
