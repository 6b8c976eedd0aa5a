#![doc = include_str!("../README.md")]

pub mod buffer;
pub mod format;
pub mod metrics;
pub mod queue;

pub mod prelude {
    pub use crate::{
        buffer::{BufferPool, Owner, PoolBuffer, PoolCounts},
        format::{HEIGHT_ALIGN, PixelEncoding, Resolution, WIDTH_ALIGN, align_up},
        metrics::{CaptureMetrics, MetricsSnapshot},
        queue::{FrameQueue, PushOutcome},
    };
}
