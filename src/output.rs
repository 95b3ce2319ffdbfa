//! Frame output: the [`transport::FrameTransport`] wire seam and the
//! [`sink::FrameSink`] that paces delivery, converts surfaces to the wire
//! format, and tracks throughput metrics.

pub mod sink;
pub mod transport;
