//! Ring-buffer slot holding one decoded frame
//!
//! Slot lifecycle:
//! ```text
//! Free -> Decoding -> Ready -> (consumed) -> Free
//!            |          |
//!            v          |
//!        Evicting ------+---> Free
//! ```
//!
//! Buffers are moved into the decode job and come back through its
//! [`TaskHandle`], so a `Decoding` slot owns no memory a worker writes to.
//! `Evicting` is a `Decoding` slot that left the window: its result will be
//! discarded, and the slot is unusable until the job hands the buffers back.
//!
//! A consumed slot is `Free` but keeps its playback index as a marker so the
//! frame on screen is not decoded again while it stays in the window.

use log::trace;

use crate::core::task::TaskHandle;
use crate::entities::frame::{FrameView, GeometryBuffers, TextureBuffer};
use crate::entities::header::GeometryHeader;
use crate::error::StreamError;

/// Slot state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Decoding,
    Ready,
    Evicting,
}

/// Outcome of a completed decode observed by [`FrameSlot::poll`]
#[derive(Debug)]
pub enum SlotEvent {
    /// All tasks finished, frame `index` can be displayed
    Ready(usize),
    /// A task failed, frame `index` must be skipped
    Failed(usize, StreamError),
    /// Evicted decode finished, slot is free again
    Released,
}

/// One reusable frame buffer of the reader
#[derive(Debug)]
pub struct FrameSlot {
    state: SlotState,
    playback_index: Option<usize>,
    header: Option<GeometryHeader>,
    geometry: Option<GeometryBuffers>,
    texture: Option<TextureBuffer>,
    /// Current frame carries a per-frame texture
    textured: bool,
    geo_task: Option<TaskHandle<GeometryBuffers>>,
    tex_task: Option<TaskHandle<TextureBuffer>>,
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            state: SlotState::Free,
            playback_index: None,
            header: None,
            geometry: None,
            texture: None,
            textured: false,
            geo_task: None,
            tex_task: None,
        }
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Frame index held by (or last displayed from) this slot
    pub fn playback_index(&self) -> Option<usize> {
        self.playback_index
    }

    pub fn is_free(&self) -> bool {
        self.state == SlotState::Free
    }

    /// Decoding or Ready: the slot claims its playback index
    pub fn is_occupied(&self) -> bool {
        matches!(self.state, SlotState::Decoding | SlotState::Ready)
    }

    pub fn is_ready(&self) -> bool {
        self.state == SlotState::Ready
    }

    /// Free slot still marking the frame it last displayed
    pub fn is_displayed_marker(&self) -> bool {
        self.state == SlotState::Free && self.playback_index.is_some()
    }

    /// Take the reusable geometry storage for a new decode job
    pub fn take_geometry(&mut self) -> GeometryBuffers {
        self.geometry.take().unwrap_or_default()
    }

    /// Take the reusable texture storage for a new decode job
    pub fn take_texture(&mut self) -> TextureBuffer {
        self.texture.take().unwrap_or_default()
    }

    /// Persistent texture storage (PerFrame mode pre-sizing)
    pub fn texture_mut(&mut self) -> &mut TextureBuffer {
        self.texture.get_or_insert_with(TextureBuffer::default)
    }

    /// Free -> Decoding
    pub fn begin_decode(
        &mut self,
        index: usize,
        header: GeometryHeader,
        geo_task: TaskHandle<GeometryBuffers>,
        tex_task: Option<TaskHandle<TextureBuffer>>,
    ) {
        debug_assert!(self.is_free(), "begin_decode on {:?} slot", self.state);
        trace!("Slot -> Decoding frame {}", index);
        self.state = SlotState::Decoding;
        self.playback_index = Some(index);
        self.header = Some(header);
        self.textured = tex_task.is_some();
        self.geo_task = Some(geo_task);
        self.tex_task = tex_task;
    }

    fn tasks_done(&mut self) -> bool {
        let geo = self.geo_task.as_mut().is_none_or(|t| t.is_done());
        let tex = self.tex_task.as_mut().is_none_or(|t| t.is_done());
        geo && tex
    }

    /// Non-blocking: resolve Decoding/Evicting once every attached task is done.
    pub fn poll(&mut self) -> Option<SlotEvent> {
        if !matches!(self.state, SlotState::Decoding | SlotState::Evicting) || !self.tasks_done() {
            return None;
        }

        let mut failure = None;
        if let Some(task) = self.geo_task.take() {
            match task.take() {
                Ok(buffers) => self.geometry = Some(buffers),
                Err(e) => failure = Some(e),
            }
        }
        if let Some(task) = self.tex_task.take() {
            match task.take() {
                Ok(buffer) => self.texture = Some(buffer),
                Err(e) => failure = failure.or(Some(e)),
            }
        }

        if self.state == SlotState::Evicting {
            trace!("Slot evicting -> Free");
            self.state = SlotState::Free;
            return Some(SlotEvent::Released);
        }

        let index = self.playback_index?;
        match failure {
            None => {
                trace!("Slot -> Ready frame {}", index);
                self.state = SlotState::Ready;
                Some(SlotEvent::Ready(index))
            }
            Some(e) => {
                self.state = SlotState::Free;
                self.playback_index = None;
                self.header = None;
                Some(SlotEvent::Failed(index, e))
            }
        }
    }

    /// Drop the frame because it left the window. Never blocks.
    pub fn evict(&mut self) {
        match self.state {
            SlotState::Ready => {
                trace!("Slot evict frame {:?} -> Free", self.playback_index);
                self.state = SlotState::Free;
            }
            SlotState::Decoding => {
                trace!("Slot evict frame {:?} -> Evicting", self.playback_index);
                self.state = SlotState::Evicting;
                self.poll();
            }
            SlotState::Free | SlotState::Evicting => {}
        }
        self.playback_index = None;
        self.header = None;
    }

    /// Ready -> Free after the frame was shown, index kept as displayed marker
    pub fn consume(&mut self) {
        if self.state == SlotState::Ready {
            self.state = SlotState::Free;
        }
    }

    /// Forget the displayed marker of a free slot
    pub fn clear_marker(&mut self) {
        if self.state == SlotState::Free {
            self.playback_index = None;
            self.header = None;
        }
    }

    /// Block until attached tasks finish and resolve state
    pub fn wait(&mut self) -> Option<SlotEvent> {
        if let Some(task) = self.geo_task.as_mut() {
            task.wait();
        }
        if let Some(task) = self.tex_task.as_mut() {
            task.wait();
        }
        self.poll()
    }

    /// Await outstanding work, then drop all buffers
    pub fn release(&mut self) {
        self.wait();
        self.state = SlotState::Free;
        self.playback_index = None;
        self.header = None;
        self.geometry = None;
        self.texture = None;
    }

    /// View of the decoded frame (Ready only)
    pub fn view(&self) -> Option<FrameView<'_>> {
        if self.state != SlotState::Ready {
            return None;
        }
        let geometry = self.geometry.as_ref()?;
        Some(FrameView {
            index: self.playback_index?,
            header: self.header?,
            vertices: &geometry.vertices,
            indices: &geometry.indices,
            texture: self.texture.as_ref().filter(|_| self.textured).map(TextureBuffer::view),
        })
    }

    /// Bytes held by the slot
    pub fn mem(&self) -> usize {
        self.geometry.as_ref().map_or(0, GeometryBuffers::mem) + self.texture.as_ref().map_or(0, |t| t.data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::Epoch;
    use crate::core::workers::{InlinePool, QueuedPool};
    use crate::entities::header::Topology;

    fn header(n: usize) -> GeometryHeader {
        GeometryHeader {
            topology: Topology::PointCloud,
            vertex_count: n,
            index_count: n,
            has_uvs: false,
            payload_offset: 0,
        }
    }

    fn fake_decode(buffers: GeometryBuffers, n: usize) -> crate::error::Result<GeometryBuffers> {
        let mut buffers = buffers;
        buffers.prepare(&header(n));
        Ok(buffers)
    }

    #[test]
    fn test_decode_to_ready_and_consume() {
        let epoch = Epoch::new();
        let mut slot = FrameSlot::new();
        let buffers = slot.take_geometry();
        let task = TaskHandle::spawn(&InlinePool, &epoch, move || fake_decode(buffers, 3));
        slot.begin_decode(7, header(3), task, None);
        assert!(slot.is_occupied());

        assert!(matches!(slot.poll(), Some(SlotEvent::Ready(7))));
        let view = slot.view().unwrap();
        assert_eq!(view.index, 7);
        assert_eq!(view.vertex_count(), 3);
        assert!(view.texture.is_none());

        slot.consume();
        assert!(slot.is_free());
        assert!(slot.is_displayed_marker());
        assert_eq!(slot.playback_index(), Some(7));
        assert!(slot.view().is_none());
    }

    #[test]
    fn test_evict_decoding_waits_for_buffers() {
        let pool = QueuedPool::default();
        let epoch = Epoch::new();
        let mut slot = FrameSlot::new();
        let buffers = slot.take_geometry();
        let task = TaskHandle::spawn(&pool, &epoch, move || fake_decode(buffers, 5));
        slot.begin_decode(2, header(5), task, None);

        slot.evict();
        assert_eq!(slot.state(), SlotState::Evicting);
        assert!(!slot.is_occupied());
        assert!(!slot.is_free());
        assert_eq!(slot.playback_index(), None);

        pool.run_pending();
        assert!(matches!(slot.poll(), Some(SlotEvent::Released)));
        assert!(slot.is_free());
        // Storage came back for reuse, contents are never shown
        assert!(slot.view().is_none());
        assert_eq!(slot.take_geometry().vertices.len(), 5);
    }

    #[test]
    fn test_failed_decode_frees_slot() {
        let epoch = Epoch::new();
        let mut slot = FrameSlot::new();
        let task: TaskHandle<GeometryBuffers> =
            TaskHandle::spawn(&InlinePool, &epoch, || Err(StreamError::corrupt("f.ply", "bad")));
        slot.begin_decode(4, header(1), task, None);
        assert!(matches!(slot.poll(), Some(SlotEvent::Failed(4, StreamError::CorruptHeader { .. }))));
        assert!(slot.is_free());
        assert_eq!(slot.playback_index(), None);
    }

    #[test]
    fn test_ready_requires_all_tasks() {
        let pool = QueuedPool::default();
        let epoch = Epoch::new();
        let mut slot = FrameSlot::new();
        let geo = TaskHandle::spawn(&InlinePool, &epoch, || fake_decode(GeometryBuffers::default(), 1));
        let tex = TaskHandle::spawn(&pool, &epoch, || Ok(TextureBuffer { header: Default::default(), data: vec![1, 2] }));
        slot.begin_decode(0, header(1), geo, Some(tex));

        assert!(slot.poll().is_none());
        assert!(!slot.is_ready());
        pool.run_pending();
        assert!(matches!(slot.poll(), Some(SlotEvent::Ready(0))));
        assert_eq!(slot.view().unwrap().texture.unwrap().data, &[1, 2]);
    }

    #[test]
    fn test_release_blocks_and_drops() {
        let epoch = Epoch::new();
        let workers = crate::core::workers::Workers::new(1).unwrap();
        let mut slot = FrameSlot::new();
        let task = TaskHandle::spawn(&workers, &epoch, || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            fake_decode(GeometryBuffers::default(), 2)
        });
        slot.begin_decode(1, header(2), task, None);
        slot.release();
        assert!(slot.is_free());
        assert_eq!(slot.mem(), 0);
    }
}
