//! Geometry and texture payload decoding
//!
//! Bodies of the decode jobs. Each function takes ownership of the buffers it
//! fills and hands them back on success, so a worker never shares memory with
//! the scheduler while it runs.
//!
//! Payload bytes are copied verbatim into the POD vertex buffers and assume a
//! little-endian host; only the face indices are decoded field by field.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use log::debug;

use super::frame::{GeometryBuffers, TextureBuffer};
use super::header::{self, DDS_HEADER_SIZE, FACE_RECORD_SIZE, GeometryHeader, TextureHeader, Topology};
use super::traits::FileSource;
use crate::error::{Result, StreamError};

/// Payload loader with pluggable file source
pub struct Loader;

impl Loader {
    /// Read the geometry header of `path`, rejecting payloads the file cannot hold
    pub fn geometry_header(source: &dyn FileSource, path: &Path, line_limit: usize) -> Result<GeometryHeader> {
        let mut file = source.open(path)?;
        let header = header::parse_geometry_header(&mut file, path, line_limit)?;
        let file_len = file.seek(SeekFrom::End(0))?;
        header.check_payload_fits(path, file_len)?;
        Ok(header)
    }

    /// Read the texture header of `path`
    pub fn texture_header(source: &dyn FileSource, path: &Path) -> Result<TextureHeader> {
        let mut file = source.open(path)?;
        header::parse_texture_header(&mut file, path)
    }

    /// Decode the payload of a geometry file into `buffers`.
    ///
    /// Point clouds get an identity index list; mesh face records have their
    /// leading count byte stripped.
    pub fn decode_geometry(
        source: &dyn FileSource,
        path: &Path,
        header: &GeometryHeader,
        mut buffers: GeometryBuffers,
    ) -> Result<GeometryBuffers> {
        let mut file = source.open(path)?;
        let file_len = file.seek(SeekFrom::End(0))?;
        header.check_payload_fits(path, file_len)?;
        file.seek(SeekFrom::Start(header.payload_offset))?;

        buffers.prepare(header);

        file.read_exact(buffers.vertices.as_bytes_mut())
            .map_err(|e| truncated(path, "vertex", e))?;

        match header.topology {
            Topology::PointCloud => {
                for (i, idx) in buffers.indices.iter_mut().enumerate() {
                    *idx = i as u32;
                }
            }
            Topology::Mesh => {
                let mut faces = vec![0u8; header.face_bytes().unwrap_or(0)];
                file.read_exact(&mut faces).map_err(|e| truncated(path, "face", e))?;
                read_face_indices(&faces, header.vertex_count, path, &mut buffers.indices)?;
            }
        }

        debug!(
            "Decoded {}: {} vertices, {} indices",
            path.display(),
            buffers.vertices.len(),
            buffers.indices.len()
        );

        Ok(buffers)
    }

    /// Decode a texture payload into `buffer`.
    ///
    /// `buffer.header` must already describe the file (see [`Loader::texture_header`]).
    pub fn decode_texture(source: &dyn FileSource, path: &Path, mut buffer: TextureBuffer) -> Result<TextureBuffer> {
        let mut file = source.open(path)?;
        file.seek(SeekFrom::Start(DDS_HEADER_SIZE as u64))?;

        if buffer.data.len() != buffer.header.size {
            buffer.data.resize(buffer.header.size, 0);
        }
        file.read_exact(&mut buffer.data)
            .map_err(|e| truncated(path, "texture", e))?;

        Ok(buffer)
    }

    /// Header + payload of a texture in one call (single texture mode)
    pub fn load_texture(source: &dyn FileSource, path: &Path) -> Result<TextureBuffer> {
        let header = Self::texture_header(source, path)?;
        Self::decode_texture(source, path, TextureBuffer::with_header(header))
    }
}

/// Extract triangle indices from face records (u8 count + 3 x i32 each).
fn read_face_indices(faces: &[u8], vertex_count: usize, path: &Path, out: &mut [u32]) -> Result<()> {
    for (face, (record, dst)) in faces
        .chunks_exact(FACE_RECORD_SIZE)
        .zip(out.chunks_exact_mut(3))
        .enumerate()
    {
        if record[0] != 3 {
            return Err(StreamError::corrupt(
                path,
                format!("face {} has {} indices, only triangles are supported", face, record[0]),
            ));
        }

        for (k, idx) in dst.iter_mut().enumerate() {
            let at = 1 + k * 4;
            let value = i32::from_le_bytes([record[at], record[at + 1], record[at + 2], record[at + 3]]);
            if value < 0 || value as usize >= vertex_count {
                return Err(StreamError::corrupt(
                    path,
                    format!("face {} references vertex {} of {}", face, value, vertex_count),
                ));
            }
            *idx = value as u32;
        }
    }
    Ok(())
}

fn truncated(path: &Path, what: &str, e: std::io::Error) -> StreamError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        StreamError::corrupt(path, format!("{} payload shorter than header declares", what))
    } else {
        StreamError::Io(e)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::entities::frame::{PointVertex, VertexBuffer};
    use crate::entities::traits::FsSource;

    #[test]
    fn test_point_cloud_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame0.ply");
        let points = [point(1), point(2), point(3)];
        std::fs::write(&path, point_cloud_bytes(&points)).unwrap();

        let header = Loader::geometry_header(&FsSource, &path, 64).unwrap();
        assert_eq!(header.topology, Topology::PointCloud);
        let buffers = Loader::decode_geometry(&FsSource, &path, &header, GeometryBuffers::default()).unwrap();

        assert_eq!(buffers.vertices, VertexBuffer::Points(points.to_vec()));
        assert_eq!(buffers.indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_mesh_skips_face_count_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.ply");
        let positions = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]];
        let uvs = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        std::fs::write(&path, mesh_bytes(&positions, Some(&uvs), &[[0, 1, 2], [2, 1, 3]])).unwrap();

        let header = Loader::geometry_header(&FsSource, &path, 64).unwrap();
        assert!(header.has_uvs);
        let buffers = Loader::decode_geometry(&FsSource, &path, &header, GeometryBuffers::default()).unwrap();

        assert_eq!(buffers.indices, vec![0, 1, 2, 2, 1, 3]);
        match &buffers.vertices {
            VertexBuffer::MeshUv(v) => {
                assert_eq!(v.len(), 4);
                assert_eq!(v[3].position, [1.0, 1.0, 0.0]);
                assert_eq!(v[1].uv, [1.0, 0.0]);
            }
            other => panic!("unexpected layout {:?}", other),
        }
    }

    #[test]
    fn test_mesh_rejects_out_of_range_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ply");
        std::fs::write(&path, mesh_bytes(&[[0.0; 3]; 3], None, &[[0, 1, 7]])).unwrap();

        let header = Loader::geometry_header(&FsSource, &path, 64).unwrap();
        let err = Loader::decode_geometry(&FsSource, &path, &header, GeometryBuffers::default()).unwrap_err();
        assert!(matches!(err, StreamError::CorruptHeader { .. }));
    }

    #[test]
    fn test_truncated_payload_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.ply");
        let mut bytes = point_cloud_bytes(&[point(1), point(2)]);
        std::fs::write(&path, &bytes).unwrap();
        let header = Loader::geometry_header(&FsSource, &path, 64).unwrap();

        // File shrinks after its header was cached
        bytes.truncate(bytes.len() - 5);
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            Loader::geometry_header(&FsSource, &path, 64),
            Err(StreamError::CorruptHeader { .. })
        ));
        let err = Loader::decode_geometry(&FsSource, &path, &header, GeometryBuffers::default()).unwrap_err();
        assert!(matches!(err, StreamError::CorruptHeader { .. }));
    }

    #[test]
    fn test_oversized_vertex_count_rejected_before_alloc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.ply");
        let bytes = String::from_utf8(point_cloud_bytes(&[]))
            .unwrap()
            .replace("element vertex 0", "element vertex 20000000000");
        std::fs::write(&path, bytes).unwrap();

        let err = Loader::geometry_header(&FsSource, &path, 64).unwrap_err();
        assert!(matches!(err, StreamError::CorruptHeader { .. }));
    }

    #[test]
    fn test_decode_reuses_buffers() {
        let dir = tempfile::tempdir().unwrap();
        let big = dir.path().join("big.ply");
        let small = dir.path().join("small.ply");
        let many: Vec<PointVertex> = (0..10).map(point).collect();
        std::fs::write(&big, point_cloud_bytes(&many)).unwrap();
        std::fs::write(&small, point_cloud_bytes(&many[..2])).unwrap();

        let h = Loader::geometry_header(&FsSource, &big, 64).unwrap();
        let buffers = Loader::decode_geometry(&FsSource, &big, &h, GeometryBuffers::default()).unwrap();
        let h = Loader::geometry_header(&FsSource, &small, 64).unwrap();
        let buffers = Loader::decode_geometry(&FsSource, &small, &h, buffers).unwrap();
        assert_eq!(buffers.vertices.len(), 2);
        assert_eq!(buffers.indices, vec![0, 1]);
    }

    #[test]
    fn test_load_texture() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tex.dds");
        std::fs::write(&path, texture_bytes(64, 32, &[7u8; 48])).unwrap();

        let tex = Loader::load_texture(&FsSource, &path).unwrap();
        assert_eq!(tex.header.width, 64);
        assert_eq!(tex.header.height, 32);
        assert_eq!(tex.data, vec![7u8; 48]);
    }
}
