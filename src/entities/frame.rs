//! Decoded frame buffers and borrowed views
//!
//! **Why**: Point clouds and meshes need different vertex layouts, and decode
//! jobs read file bytes straight into these buffers, so every vertex type is a
//! `#[repr(C)]` POD whose byte image matches the on-disk record.
//!
//! **Used by**: decode jobs (write), FrameSlot (owns), FrameSink (reads views)
//!
//! # Vertex layouts
//!
//! - `VertexBuffer::Points`: position f32x3 + color u8x4 (16 bytes)
//! - `VertexBuffer::Mesh`: position f32x3 (12 bytes)
//! - `VertexBuffer::MeshUv`: position f32x3 + uv f32x2 (20 bytes)

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use super::header::{GeometryHeader, TextureHeader, Topology};

/// Point cloud vertex (position + RGBA)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct PointVertex {
    pub position: [f32; 3],
    pub color: [u8; 4],
}

/// Mesh vertex without texture coordinates
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
}

/// Mesh vertex with texture coordinates
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct MeshVertexUv {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

/// Vertex buffer - stores one of the supported layouts
#[derive(Debug, Clone, PartialEq)]
pub enum VertexBuffer {
    Points(Vec<PointVertex>),
    Mesh(Vec<MeshVertex>),
    MeshUv(Vec<MeshVertexUv>),
}

impl Default for VertexBuffer {
    fn default() -> Self {
        Self::Points(Vec::new())
    }
}

impl VertexBuffer {
    /// Number of vertices
    pub fn len(&self) -> usize {
        match self {
            Self::Points(v) => v.len(),
            Self::Mesh(v) => v.len(),
            Self::MeshUv(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw byte image (what gets uploaded to a vertex buffer)
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Points(v) => bytemuck::cast_slice(v),
            Self::Mesh(v) => bytemuck::cast_slice(v),
            Self::MeshUv(v) => bytemuck::cast_slice(v),
        }
    }

    /// Mutable byte image, for reading file records in place
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Points(v) => bytemuck::cast_slice_mut(v),
            Self::Mesh(v) => bytemuck::cast_slice_mut(v),
            Self::MeshUv(v) => bytemuck::cast_slice_mut(v),
        }
    }

    /// Position of vertex `i`
    pub fn position(&self, i: usize) -> Option<Vec3> {
        let p = match self {
            Self::Points(v) => v.get(i)?.position,
            Self::Mesh(v) => v.get(i)?.position,
            Self::MeshUv(v) => v.get(i)?.position,
        };
        Some(Vec3::from_array(p))
    }

    /// Bounding box over all vertices (None when empty)
    pub fn bounds(&self) -> Option<Bounds> {
        let first = self.position(0)?;
        let (min, max) = (1..self.len())
            .filter_map(|i| self.position(i))
            .fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Bounds { min, max })
    }

    /// Resize to the layout and count described by `header`.
    ///
    /// Keeps the existing allocation when the layout is unchanged.
    pub fn prepare(&mut self, header: &GeometryHeader) {
        let n = header.vertex_count;
        match (header.topology, header.has_uvs, self) {
            (Topology::PointCloud, _, Self::Points(v)) => v.resize(n, Zeroable::zeroed()),
            (Topology::Mesh, false, Self::Mesh(v)) => v.resize(n, Zeroable::zeroed()),
            (Topology::Mesh, true, Self::MeshUv(v)) => v.resize(n, Zeroable::zeroed()),
            (Topology::PointCloud, _, other) => *other = Self::Points(vec![Zeroable::zeroed(); n]),
            (Topology::Mesh, false, other) => *other = Self::Mesh(vec![Zeroable::zeroed(); n]),
            (Topology::Mesh, true, other) => *other = Self::MeshUv(vec![Zeroable::zeroed(); n]),
        }
    }
}

/// Axis-aligned bounding box of a decoded frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

/// Geometry buffers of one frame, reused across decodes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryBuffers {
    pub vertices: VertexBuffer,
    pub indices: Vec<u32>,
}

impl GeometryBuffers {
    /// Size vertex and index storage for `header`
    pub fn prepare(&mut self, header: &GeometryHeader) {
        self.vertices.prepare(header);
        self.indices.resize(header.index_count, 0);
    }

    /// Approximate memory usage in bytes
    pub fn mem(&self) -> usize {
        self.vertices.as_bytes().len() + self.indices.len() * std::mem::size_of::<u32>()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.vertices.bounds()
    }
}

/// Raw block-compressed texture payload plus its header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextureBuffer {
    pub header: TextureHeader,
    pub data: Vec<u8>,
}

impl TextureBuffer {
    /// Buffer pre-sized for textures like `header`
    pub fn with_header(header: TextureHeader) -> Self {
        Self {
            header,
            data: vec![0; header.size],
        }
    }

    /// Adopt `header`, resizing storage if the payload size changed.
    ///
    /// Returns true when a resize happened.
    pub fn prepare(&mut self, header: TextureHeader) -> bool {
        self.header = header;
        if self.data.len() != header.size {
            self.data.resize(header.size, 0);
            true
        } else {
            false
        }
    }

    pub fn view(&self) -> TextureView<'_> {
        TextureView {
            header: self.header,
            data: &self.data,
        }
    }
}

/// Borrowed view of a texture payload
#[derive(Debug, Clone, Copy)]
pub struct TextureView<'a> {
    pub header: TextureHeader,
    pub data: &'a [u8],
}

/// Borrowed view of a decoded frame, valid for one sink call
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    /// Sequence frame index
    pub index: usize,
    pub header: GeometryHeader,
    pub vertices: &'a VertexBuffer,
    pub indices: &'a [u32],
    /// Per-frame texture (PerFrame mode only)
    pub texture: Option<TextureView<'a>>,
}

impl FrameView<'_> {
    pub fn topology(&self) -> Topology {
        self.header.topology
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.vertices.bounds()
    }
}
