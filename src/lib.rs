//! Signcast is a live rendering engine for unattended digital signage.
//!
//! It continuously composes data-driven slides into video frames and emits
//! them as a live feed at a steady target rate, while refreshing each
//! underlying data source on its own independent cadence.
//!
//! # Pipeline overview
//!
//! 1. **Poll**: one timer per [`DataSource`] refreshes the shared
//!    [`DataCache`]; fetch failures never clear previously good values.
//! 2. **Compose**: each frame tick, the [`SlideManager`] renders the
//!    current slide (or a blend of two mid-transition) against whatever is
//!    in the cache, into the back half of a [`FramePair`].
//! 3. **Swap**: the double buffer flips; the sink only ever sees complete
//!    frames.
//! 4. **Emit**: the [`FrameSink`] flattens the front surface to the wire
//!    format and hands it to a [`FrameTransport`] (ffmpeg network stream,
//!    or a null sink for headless runs).
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Data flows one way**: poller → cache → slides → surface → sink;
//!   control calls mutate state the next tick picks up, never the per-frame
//!   path itself.
//! - **No IO in renderers**: fetches, asset loads and transport writes are
//!   the only awaited operations.
//! - **Premultiplied RGBA8** end-to-end, flattened to opaque pixels at the
//!   sink boundary.
#![forbid(unsafe_code)]

mod config;
mod core;
mod data;
mod engine;
mod error;
mod output;
mod render;
mod slides;

pub use config::{
    EngineConfig, EngineConfigPatch, OutputSpec, PollIntervals, TransitionKind, TransitionSpec,
};
pub use self::core::{Canvas, Fps};
pub use data::cache::{ConnectionStatus, DataCache, SourceId, SourceRecord};
pub use data::poll::PollingManager;
pub use data::source::{DataSource, StaticSource};
pub use engine::{Engine, EngineState, EngineStatus};
pub use error::{EngineError, EngineResult};
pub use output::sink::{FrameSink, SinkMetrics};
pub use output::transport::{
    FfmpegStreamTransport, FrameTransport, NullTransport, is_ffmpeg_on_path,
};
pub use render::composite;
pub use render::surface::{FramePair, Surface};
pub use slides::manager::SlideManager;
pub use slides::{
    SlideContent, SlideDescriptor, SlideFactory, SlideInstance, SlideKind, parse_descriptors,
};
pub use slides::content::{PlaceholderTone, SourcePanel, TickerPanel, paint_placeholder};
