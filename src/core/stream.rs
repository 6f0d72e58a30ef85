//! Stream facade - sequence lifecycle and per-tick orchestration
//!
//! **Architecture**: GeometryStream owns the reader and clock of the open
//! sequence plus the injected collaborators (file source, worker pool, sink).
//! The host calls [`GeometryStream::tick`] once per update with the wall delta.
//!
//! **Used by**: renderer host (owns the sink), headless harness
//!
//! # Tick order
//!
//! 1. Clock advances and, if the target frame is decoded, it goes to the sink
//! 2. Reader moves its window to the clock's playback position
//!
//! A failed load leaves the stream inert: `tick` does nothing until the next
//! successful load.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::config::StreamSettings;
use crate::core::clock::{ClockEvent, PlaybackClock};
use crate::core::reader::BufferedReader;
use crate::core::workers::Workers;
use crate::entities::header::Topology;
use crate::entities::loader::Loader;
use crate::entities::sequence::{SequenceHandle, TextureMode};
use crate::entities::traits::{FileSource, FrameSink, FsSource, WorkerPool};
use crate::error::{Result, StreamError};

struct ActiveSequence {
    handle: Arc<SequenceHandle>,
    topology: Topology,
    reader: BufferedReader,
    clock: PlaybackClock,
}

/// Streams one geometry sequence at a time into a [`FrameSink`]
pub struct GeometryStream<S: FrameSink> {
    settings: StreamSettings,
    source: Arc<dyn FileSource>,
    pool: Arc<dyn WorkerPool>,
    sink: S,
    sequence: Option<ActiveSequence>,
}

impl<S: FrameSink> GeometryStream<S> {
    pub fn new(settings: StreamSettings, source: Arc<dyn FileSource>, pool: Arc<dyn WorkerPool>, sink: S) -> Self {
        Self {
            settings,
            source,
            pool,
            sink,
            sequence: None,
        }
    }

    /// Local filesystem + worker threads sized from settings
    pub fn with_workers(settings: StreamSettings, sink: S) -> std::io::Result<Self> {
        let workers = Workers::new(settings.worker_threads())?;
        Ok(Self::new(settings, Arc::new(FsSource), Arc::new(workers), sink))
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Close the current sequence and open `path` for playback at `fps`.
    ///
    /// Fails without leaving partial state when the directory is unusable or the
    /// sink has no material for the sequence topology.
    pub fn load_sequence(&mut self, path: &Path, fps: f64) -> Result<()> {
        self.close();

        let sequence = self.open_sequence(path, fps).inspect_err(|e| {
            error!("Sequence could not be set up, playback stopped: {}", e);
        })?;

        info!(
            "Loaded sequence {} ({:?}, {} frames, textures {:?})",
            path.display(),
            sequence.topology,
            sequence.handle.total_frames(),
            sequence.handle.texture_mode
        );
        self.sequence = Some(sequence);
        Ok(())
    }

    fn open_sequence(&mut self, path: &Path, fps: f64) -> Result<ActiveSequence> {
        let handle = Arc::new(self.settings.sequence_index().build(&*self.source, path, fps)?);

        let topology = self.probe_topology(&handle)?;
        if !self.sink.has_material(topology) {
            return Err(StreamError::MaterialMissing(topology));
        }

        if let Some(tex_path) = handle.single_texture_path() {
            match Loader::load_texture(&*self.source, tex_path) {
                Ok(texture) => {
                    debug!(
                        "Applying shared texture {} ({}x{})",
                        tex_path.display(),
                        texture.header.width,
                        texture.header.height
                    );
                    self.sink.apply_texture(texture.view());
                }
                Err(e) => warn!("Shared texture skipped: {}", e),
            }
        }

        let mut reader = BufferedReader::open(
            Arc::clone(&handle),
            Arc::clone(&self.source),
            Arc::clone(&self.pool),
            self.settings.reader_options(),
        );
        reader.tick(0);

        let mut clock = PlaybackClock::new(handle.frame_interval_ms, handle.total_frames());
        clock.set_loop(self.settings.loop_play);
        if self.settings.play_at_start {
            clock.play_from_start();
        }

        Ok(ActiveSequence {
            handle,
            topology,
            reader,
            clock,
        })
    }

    /// Topology of the first frame whose header parses
    fn probe_topology(&self, handle: &SequenceHandle) -> Result<Topology> {
        let mut last_err = None;
        for path in handle.geometry_paths.iter().take(self.settings.buffer_size.max(1)) {
            match Loader::geometry_header(&*self.source, path, self.settings.header_line_limit) {
                Ok(header) => return Ok(header.topology),
                Err(e) => {
                    debug!("Topology probe skipped {}: {}", path.display(), e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| StreamError::EmptySequence(handle.directory.clone())))
    }

    /// Reopen the current sequence from disk
    pub fn reload(&mut self) -> Result<()> {
        let Some((path, fps)) = self.sequence.as_ref().map(|s| (s.handle.directory.clone(), s.handle.fps())) else {
            debug!("Reload without an open sequence");
            return Ok(());
        };
        self.load_sequence(&path, fps)
    }

    /// Await in-flight decodes and release every buffer
    pub fn close(&mut self) {
        if let Some(mut sequence) = self.sequence.take() {
            sequence.reader.close();
            info!("Closed sequence {}", sequence.handle.directory.display());
        }
    }

    /// Advance playback by `delta_ms`, show the due frame, refill the buffer.
    pub fn tick(&mut self, delta_ms: f64) -> Option<ClockEvent> {
        let ActiveSequence { reader, clock, .. } = self.sequence.as_mut()?;
        let sink = &mut self.sink;

        let event = clock.advance(delta_ms, |index| {
            let shown = match reader.acquire_ready(index) {
                Some(view) => {
                    sink.show_frame(view);
                    true
                }
                None => false,
            };
            if shown {
                reader.consume(index);
            }
            shown
        });

        reader.tick(clock.playback_index());

        if event == Some(ClockEvent::Finished) {
            info!("Playback finished");
        }
        event
    }

    pub fn is_loaded(&self) -> bool {
        self.sequence.is_some()
    }

    pub fn play(&mut self) {
        if let Some(s) = self.sequence.as_mut() {
            s.clock.play();
        }
    }

    pub fn pause(&mut self) {
        if let Some(s) = self.sequence.as_mut() {
            s.clock.pause();
        }
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.settings.loop_play = enabled;
        if let Some(s) = self.sequence.as_mut() {
            s.clock.set_loop(enabled);
        }
    }

    pub fn play_from_start(&mut self) -> bool {
        let Some(s) = self.sequence.as_mut() else {
            return false;
        };
        s.clock.play_from_start();
        true
    }

    /// Seek to `seconds`; when paused the frame is shown right away if decoded.
    pub fn go_to_time(&mut self, seconds: f64) -> bool {
        let Some(s) = self.sequence.as_mut() else {
            return false;
        };
        if !s.clock.go_to_time(seconds) {
            return false;
        }
        if !s.clock.is_playing() {
            self.tick(0.0);
        }
        true
    }

    pub fn go_to_frame(&mut self, frame: usize) -> bool {
        let Some(interval) = self.sequence.as_ref().map(|s| s.clock.frame_interval_ms()) else {
            return false;
        };
        self.go_to_time(frame as f64 * interval / 1000.0)
    }

    pub fn is_playing(&self) -> bool {
        self.sequence.as_ref().is_some_and(|s| s.clock.is_playing())
    }

    pub fn loop_enabled(&self) -> bool {
        self.settings.loop_play
    }

    /// Last delivered frame
    pub fn current_frame(&self) -> Option<usize> {
        self.sequence.as_ref().and_then(|s| s.clock.current_frame())
    }

    pub fn total_frames(&self) -> usize {
        self.sequence.as_ref().map_or(0, |s| s.handle.total_frames())
    }

    pub fn current_time(&self) -> f64 {
        self.sequence.as_ref().map_or(0.0, |s| s.clock.current_time())
    }

    pub fn total_time(&self) -> f64 {
        self.sequence.as_ref().map_or(0.0, |s| s.clock.total_time())
    }

    pub fn target_fps(&self) -> f64 {
        self.sequence.as_ref().map_or(0.0, |s| s.clock.target_fps())
    }

    pub fn actual_fps(&self) -> f64 {
        self.sequence.as_ref().map_or(0.0, |s| s.clock.actual_fps())
    }

    /// Read-and-clear: a frame was skipped since the last call
    pub fn take_frame_dropped(&mut self) -> bool {
        self.sequence.as_mut().is_some_and(|s| s.clock.take_frame_dropped())
    }

    pub fn elapsed_ms_since_last_frame(&self) -> f64 {
        self.sequence.as_ref().map_or(0.0, |s| s.clock.elapsed_ms_since_last_frame())
    }

    pub fn buffered_count(&mut self) -> usize {
        self.sequence.as_mut().map_or(0, |s| s.reader.buffered_count())
    }

    pub fn topology(&self) -> Option<Topology> {
        self.sequence.as_ref().map(|s| s.topology)
    }

    pub fn texture_mode(&self) -> Option<TextureMode> {
        self.sequence.as_ref().map(|s| s.handle.texture_mode)
    }

    pub fn sequence_path(&self) -> Option<PathBuf> {
        self.sequence.as_ref().map(|s| s.handle.directory.clone())
    }

    /// Frames skipped so far because of bad files
    pub fn skipped_frames(&self) -> usize {
        self.sequence.as_ref().map_or(0, |s| s.reader.skipped().len())
    }
}
