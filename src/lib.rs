//! GEOSEQ - Buffered geometry sequence streamer
//!
//! Streams numbered PLY point-cloud/mesh frames (plus optional DDS textures)
//! from disk through a ring buffer of background decodes, paced by a
//! frame-accurate playback clock.

// Core engine (workers, scheduler, clock)
pub mod core;

pub mod config;
pub mod entities;
pub mod error;
pub mod paths;
pub mod utils;

pub use config::StreamSettings;
pub use crate::core::{BufferedReader, ClockEvent, GeometryStream, PlaybackClock, Workers};
pub use entities::{FrameSink, FrameView, SequenceIndex, TextureMode, Topology};
pub use error::{Result, StreamError};
