//! Buffered sequence reader - the frame scheduler
//!
//! Owns a fixed ring of [`FrameSlot`]s and keeps the frames of the window
//! `[current, current + buffer_size]` decoding or decoded.
//!
//! Each `tick(current)`:
//! 1. evicts slots whose frame left the window (never blocks)
//! 2. collects window indices held by no slot, nearest first
//! 3. hands them to free slots, parsing headers on this thread first
//!
//! Frames whose header or decode fails are logged and skipped for the rest of
//! the sequence. Readiness checks only poll, so nothing here blocks except
//! [`BufferedReader::close`].

use std::collections::{HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;

use log::{debug, info, trace, warn};
use lru::LruCache;

use crate::core::slot::{FrameSlot, SlotEvent, SlotState};
use crate::core::task::{Epoch, TaskHandle};
use crate::entities::frame::FrameView;
use crate::entities::header::{DEFAULT_HEADER_LINE_LIMIT, GeometryHeader, TextureHeader};
use crate::entities::loader::Loader;
use crate::entities::sequence::{SequenceHandle, TextureMode};
use crate::entities::traits::{FileSource, WorkerPool};
use crate::error::{Result, StreamError};

/// Reader tuning
#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    /// Number of slots and width of the look-ahead window
    pub buffer_size: usize,
    /// Header line cap before a file counts as corrupt
    pub header_line_limit: usize,
    /// Parsed headers remembered across loops
    pub header_cache_size: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            buffer_size: 30,
            header_line_limit: DEFAULT_HEADER_LINE_LIMIT,
            header_cache_size: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FrameHeaders {
    geometry: GeometryHeader,
    texture: Option<TextureHeader>,
}

/// Ring-buffered frame scheduler for one sequence
pub struct BufferedReader {
    handle: Arc<SequenceHandle>,
    source: Arc<dyn FileSource>,
    pool: Arc<dyn WorkerPool>,
    epoch: Epoch,
    slots: Vec<FrameSlot>,
    buffer_size: usize,
    line_limit: usize,
    headers: LruCache<usize, FrameHeaders>,
    skipped: HashSet<usize>,
    /// Window anchor of the previous tick
    anchor: Option<usize>,
    closed: bool,
}

impl BufferedReader {
    /// Allocate `buffer_size` free slots for `handle`.
    ///
    /// In PerFrame texture mode every slot's texture storage is pre-sized from
    /// the first texture header.
    pub fn open(
        handle: Arc<SequenceHandle>,
        source: Arc<dyn FileSource>,
        pool: Arc<dyn WorkerPool>,
        options: ReaderOptions,
    ) -> Self {
        let buffer_size = options.buffer_size.max(1);
        let mut slots: Vec<FrameSlot> = (0..buffer_size).map(|_| FrameSlot::new()).collect();

        if handle.texture_mode == TextureMode::PerFrame
            && let Some(first) = handle.frame_texture_path(0)
        {
            match Loader::texture_header(&*source, first) {
                Ok(header) => {
                    for slot in &mut slots {
                        slot.texture_mut().prepare(header);
                    }
                    debug!(
                        "Pre-sized {} texture buffers to {} bytes ({}x{})",
                        buffer_size, header.size, header.width, header.height
                    );
                }
                Err(e) => warn!("First texture header unreadable, buffers sized lazily: {}", e),
            }
        }

        let cache_size = NonZeroUsize::new(options.header_cache_size).unwrap_or(NonZeroUsize::MIN);

        info!(
            "Reader opened: {} frames, {} slots, {} worker threads",
            handle.total_frames(),
            buffer_size,
            pool.threads()
        );

        Self {
            handle,
            source,
            pool,
            epoch: Epoch::new(),
            slots,
            buffer_size,
            line_limit: options.header_line_limit,
            headers: LruCache::new(cache_size),
            skipped: HashSet::new(),
            anchor: None,
            closed: false,
        }
    }

    pub fn handle(&self) -> &SequenceHandle {
        &self.handle
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn total_frames(&self) -> usize {
        self.handle.total_frames()
    }

    /// Frames permanently skipped because of bad headers or failed decodes
    pub fn skipped(&self) -> &HashSet<usize> {
        &self.skipped
    }

    /// State and frame index of every slot
    pub fn slot_states(&self) -> impl Iterator<Item = (SlotState, Option<usize>)> + '_ {
        self.slots.iter().map(|s| (s.state(), s.playback_index()))
    }

    /// Bytes held by all slots
    pub fn mem(&self) -> usize {
        self.slots.iter().map(FrameSlot::mem).sum()
    }

    /// Advance the buffer window to `current`, returns the number of decodes started.
    pub fn tick(&mut self, current: usize) -> usize {
        if self.closed || current >= self.total_frames() {
            return 0;
        }

        self.poll_slots();

        // Rewind (loop or seek back): frames shown earlier must be decoded again
        if self.anchor.is_some_and(|prev| current < prev) {
            trace!("Window rewound to {}, clearing displayed markers", current);
            self.slots.iter_mut().for_each(FrameSlot::clear_marker);
        }
        self.anchor = Some(current);

        let last = current + self.buffer_size;

        for slot in &mut self.slots {
            if let Some(index) = slot.playback_index()
                && (index < current || index > last)
            {
                if slot.is_occupied() {
                    debug!("Evicting frame {} outside [{}, {}]", index, current, last);
                }
                slot.evict();
            }
        }

        let end = last.min(self.total_frames() - 1);
        let mut missing: VecDeque<usize> = (current..=end)
            .filter(|i| !self.skipped.contains(i))
            .filter(|i| !self.slots.iter().any(|s| s.playback_index() == Some(*i)))
            .collect();

        if missing.is_empty() {
            return 0;
        }

        // Slots without a displayed marker first
        let mut free: Vec<usize> = (0..self.slots.len()).filter(|&s| self.slots[s].is_free()).collect();
        free.sort_by_key(|&s| self.slots[s].is_displayed_marker());

        let mut started = 0;
        'slots: for slot_idx in free {
            while let Some(index) = missing.pop_front() {
                match self.dispatch(slot_idx, index) {
                    Ok(()) => {
                        started += 1;
                        continue 'slots;
                    }
                    Err(e) => {
                        warn!("Skipping frame {}: {}", index, e);
                        self.skipped.insert(index);
                    }
                }
            }
            break;
        }

        if started > 0 {
            trace!("Tick {}: started {} decodes", current, started);
        }
        started
    }

    /// Parse headers, hand slot buffers to the decode job(s), mark slot Decoding
    fn dispatch(&mut self, slot_idx: usize, index: usize) -> Result<()> {
        let headers = self.frame_headers(index)?;
        let slot = &mut self.slots[slot_idx];

        let tex_task = match (headers.texture, self.handle.frame_texture_path(index)) {
            (Some(tex_header), Some(tex_path)) => {
                let mut buffer = slot.take_texture();
                let expected = buffer.data.len();
                if buffer.prepare(tex_header) && expected > 0 {
                    debug!(
                        "{}, buffer resized",
                        StreamError::SizeMismatch {
                            path: tex_path.to_path_buf(),
                            expected,
                            actual: tex_header.size,
                        }
                    );
                }
                let source = Arc::clone(&self.source);
                let tex_path = tex_path.to_path_buf();
                Some(TaskHandle::spawn(&*self.pool, &self.epoch, move || {
                    Loader::decode_texture(&*source, &tex_path, buffer)
                }))
            }
            _ => None,
        };

        let buffers = slot.take_geometry();
        let source = Arc::clone(&self.source);
        let path = self.handle.geometry_paths[index].clone();
        let header = headers.geometry;
        let geo_task = TaskHandle::spawn(&*self.pool, &self.epoch, move || {
            Loader::decode_geometry(&*source, &path, &header, buffers)
        });

        slot.begin_decode(index, header, geo_task, tex_task);
        Ok(())
    }

    /// Geometry (+ PerFrame texture) headers of frame `index`, cached
    fn frame_headers(&mut self, index: usize) -> Result<FrameHeaders> {
        if let Some(headers) = self.headers.get(&index) {
            return Ok(*headers);
        }

        let path = &self.handle.geometry_paths[index];
        let geometry = Loader::geometry_header(&*self.source, path, self.line_limit)?;
        let texture = match self.handle.frame_texture_path(index) {
            Some(tex_path) => Some(Loader::texture_header(&*self.source, tex_path)?),
            None => None,
        };

        let headers = FrameHeaders { geometry, texture };
        self.headers.put(index, headers);
        Ok(headers)
    }

    /// Collect finished decodes. Never blocks.
    fn poll_slots(&mut self) {
        for slot in &mut self.slots {
            match slot.poll() {
                Some(SlotEvent::Failed(index, e)) => {
                    warn!("Decode of frame {} failed, skipping: {}", index, e);
                    self.skipped.insert(index);
                }
                Some(SlotEvent::Ready(index)) => trace!("Frame {} ready", index),
                Some(SlotEvent::Released) | None => {}
            }
        }
    }

    /// Whether frame `index` is fully decoded. Never blocks.
    pub fn is_ready(&mut self, index: usize) -> bool {
        self.poll_slots();
        self.slots.iter().any(|s| s.is_ready() && s.playback_index() == Some(index))
    }

    /// Borrow the decoded frame `index`, if ready.
    ///
    /// The view must not outlive the current tick.
    pub fn acquire_ready(&mut self, index: usize) -> Option<FrameView<'_>> {
        self.poll_slots();
        self.slots
            .iter()
            .find(|s| s.is_ready() && s.playback_index() == Some(index))
            .and_then(FrameSlot::view)
    }

    /// Mark frame `index` as shown, its slot becomes reusable
    pub fn consume(&mut self, index: usize) {
        if let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| s.is_ready() && s.playback_index() == Some(index))
        {
            slot.consume();
        }
    }

    /// Number of fully decoded frames
    pub fn buffered_count(&mut self) -> usize {
        self.poll_slots();
        self.slots.iter().filter(|s| s.is_ready()).count()
    }

    /// Stop buffering, await all in-flight decodes and release every buffer.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.epoch.bump();
        for slot in &mut self.slots {
            slot.release();
        }
        self.headers.clear();
        info!("Reader closed: {}", self.handle.directory.display());
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for BufferedReader {
    fn drop(&mut self) {
        if !self.closed {
            debug!("Reader dropped without close, releasing slots");
            self.close();
        }
    }
}
