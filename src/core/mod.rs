//! Core engine modules - workers, tasks, scheduler, clock, facade
//!
//! These modules form the streaming engine, independent of any renderer.

pub mod clock;
pub mod reader;
pub mod slot;
pub mod stream;
pub mod task;
pub mod workers;

// Re-exports for convenience
pub use clock::{ClockEvent, PlaybackClock};
pub use reader::{BufferedReader, ReaderOptions};
pub use slot::{FrameSlot, SlotState};
pub use stream::GeometryStream;
pub use task::{Epoch, TaskHandle};
pub use workers::{InlinePool, Workers};
