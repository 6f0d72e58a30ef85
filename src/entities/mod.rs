//! Entities module - sequence data types and pure logic
//!
//! Headers, decoded buffers, sequence indexing and the collaborator traits
//! the engine is built against.

pub mod frame;
pub mod header;
pub mod loader;
pub mod sequence;
pub mod traits;

pub use frame::{Bounds, FrameView, GeometryBuffers, TextureBuffer, TextureView, VertexBuffer};
pub use header::{GeometryHeader, TextureHeader, Topology};
pub use loader::Loader;
pub use sequence::{SequenceHandle, SequenceIndex, TextureMode};
pub use traits::{FileSource, FrameSink, FsSource, Job, WorkerPool};
