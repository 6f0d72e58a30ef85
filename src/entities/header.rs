//! Geometry (PLY) and texture (DDS) header parsing
//!
//! **Why**: Buffers must be sized before the async decode writes into them, and
//! unsupported files must be rejected before any binary read is scheduled.
//!
//! **Used by**: BufferedReader (before dispatch), GeometryStream (topology probe), texture sizing
//!
//! # Geometry layout
//!
//! ASCII header lines (LF, CRLF or CR terminated) up to `end_header`, then a
//! binary little-endian payload:
//! - Point cloud: `vertex_count` x (3 x f32 position + 4 x u8 RGBA)
//! - Mesh: `vertex_count` x (3 x f32 position [+ 2 x f32 UV]), then
//!   `face_count` x (u8 count + 3 x i32 indices)
//!
//! # Texture layout
//!
//! 128-byte DDS preamble; byte 4 must be 124 (header size field), height and
//! width are LE u16 at offsets 12 and 16. Everything after the preamble is an
//! opaque block-compressed payload.

use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use log::trace;

use crate::error::{Result, StreamError};

/// Default cap on header lines before giving up on `end_header`
pub const DEFAULT_HEADER_LINE_LIMIT: usize = 64;

/// Longest header line accepted (bytes); longer input is treated as binary garbage
const MAX_HEADER_LINE_LEN: usize = 1024;

/// Fixed DDS preamble size (magic + 124-byte header)
pub const DDS_HEADER_SIZE: usize = 128;

/// Offset of the DDS header-size field
const DDS_SIZE_FIELD_OFFSET: usize = 4;

/// Value the DDS header-size field must carry
const DDS_SIZE_FIELD_VALUE: u8 = 124;

/// Geometry representation of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    PointCloud,
    Mesh,
}

/// Parsed geometry file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryHeader {
    pub topology: Topology,
    pub vertex_count: usize,
    /// Vertex count for point clouds, 3 x face count for meshes
    pub index_count: usize,
    pub has_uvs: bool,
    /// Byte offset where the binary payload begins
    pub payload_offset: u64,
}

impl GeometryHeader {
    /// Bytes per vertex record on disk
    pub fn vertex_stride(&self) -> usize {
        match (self.topology, self.has_uvs) {
            (Topology::PointCloud, _) => 3 * 4 + 4,
            (Topology::Mesh, false) => 3 * 4,
            (Topology::Mesh, true) => 5 * 4,
        }
    }

    /// Number of faces (zero for point clouds)
    pub fn face_count(&self) -> usize {
        match self.topology {
            Topology::PointCloud => 0,
            Topology::Mesh => self.index_count / 3,
        }
    }

    /// Size of the vertex block in bytes (None on overflow)
    pub fn vertex_bytes(&self) -> Option<usize> {
        self.vertex_count.checked_mul(self.vertex_stride())
    }

    /// Size of the face block in bytes (1 count byte + 3 x i32 per face)
    pub fn face_bytes(&self) -> Option<usize> {
        self.face_count().checked_mul(FACE_RECORD_SIZE)
    }

    /// Minimum payload length the header promises (None on overflow)
    pub fn payload_len(&self) -> Option<usize> {
        self.vertex_bytes()?.checked_add(self.face_bytes()?)
    }

    /// Check the declared payload against the real file length.
    ///
    /// Run before any buffer is sized from the header counts.
    pub fn check_payload_fits(&self, path: &Path, file_len: u64) -> Result<()> {
        let end = self
            .payload_len()
            .and_then(|len| self.payload_offset.checked_add(len as u64))
            .ok_or_else(|| StreamError::corrupt(path, "element counts overflow"))?;
        if end > file_len {
            return Err(StreamError::corrupt(
                path,
                format!("header declares {} bytes, file has {}", end, file_len),
            ));
        }
        Ok(())
    }
}

/// On-disk size of one face record
pub const FACE_RECORD_SIZE: usize = 1 + 3 * 4;

/// Parsed texture file header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureHeader {
    pub width: u32,
    pub height: u32,
    /// Payload byte size (file length minus the preamble)
    pub size: usize,
}

/// One `property` line of the vertex element
#[derive(Debug, Clone, PartialEq)]
struct Property {
    ty: String,
    name: String,
}

/// Parse a geometry header from the start of a file.
///
/// Reads line by line until `end_header`, giving up after `line_limit` lines.
/// Rejects ASCII payloads, big-endian order, 64-bit floats, point clouds
/// without full RGBA and meshes without a triangle face list.
pub fn parse_geometry_header<R: Read>(reader: R, path: &Path, line_limit: usize) -> Result<GeometryHeader> {
    let mut reader = BufReader::new(reader);
    let mut consumed: u64 = 0;

    let mut format: Option<String> = None;
    let mut vertex_count: Option<usize> = None;
    let mut face_count: Option<usize> = None;
    let mut face_list: Option<(String, String)> = None;
    let mut vertex_props: Vec<Property> = Vec::new();
    let mut current_element = String::new();
    let mut found_end = false;

    for line_no in 0..line_limit {
        let line = read_header_line(&mut reader, &mut consumed)
            .map_err(|e| StreamError::corrupt(path, format!("header read failed: {}", e)))?
            .ok_or_else(|| StreamError::corrupt(path, "unexpected end of file in header"))?;

        let tokens: Vec<&str> = line.split_whitespace().collect();

        if line_no == 0 {
            if tokens.first() != Some(&"ply") {
                return Err(StreamError::corrupt(path, "missing 'ply' magic line"));
            }
            continue;
        }

        match tokens.as_slice() {
            [] => {}
            ["comment", ..] | ["obj_info", ..] => {}
            ["format", kind, ..] => format = Some(kind.to_string()),
            ["element", name, count] => {
                let count = count
                    .parse::<usize>()
                    .map_err(|_| StreamError::corrupt(path, format!("invalid element count '{}'", count)))?;
                current_element = name.to_string();
                match *name {
                    "vertex" => vertex_count = Some(count),
                    "face" => face_count = Some(count),
                    _ => {}
                }
            }
            ["property", "list", count_ty, index_ty, _name] if current_element == "face" => {
                face_list = Some((count_ty.to_string(), index_ty.to_string()));
            }
            ["property", ty, name] if current_element == "vertex" => {
                vertex_props.push(Property {
                    ty: ty.to_string(),
                    name: name.to_string(),
                });
            }
            ["property", ..] => {}
            ["end_header"] => {
                found_end = true;
                break;
            }
            _ => {
                return Err(StreamError::corrupt(path, format!("unrecognized header line '{}'", line)));
            }
        }
    }

    if !found_end {
        return Err(StreamError::corrupt(
            path,
            format!("no end_header within {} lines", line_limit),
        ));
    }

    match format.as_deref() {
        Some("binary_little_endian") => {}
        Some("ascii") => return Err(StreamError::unsupported(path, "ASCII payload encoding")),
        Some("binary_big_endian") => return Err(StreamError::unsupported(path, "big-endian byte order")),
        Some(other) => return Err(StreamError::corrupt(path, format!("unknown format '{}'", other))),
        None => return Err(StreamError::corrupt(path, "missing format line")),
    }

    let vertex_count = vertex_count.ok_or_else(|| StreamError::corrupt(path, "missing 'element vertex' line"))?;

    if vertex_props.iter().any(|p| is_double(&p.ty)) {
        return Err(StreamError::unsupported(path, "64-bit float vertex components"));
    }

    let names: Vec<&str> = vertex_props.iter().map(|p| p.name.as_str()).collect();
    if names.len() < 3 || names[..3] != ["x", "y", "z"] || !vertex_props[..3].iter().all(|p| is_float(&p.ty)) {
        return Err(StreamError::unsupported(path, "vertex positions must be float x, y, z"));
    }

    let header = if names.contains(&"red") {
        // Point cloud: position followed by full RGBA
        let color_ok = names[3..] == ["red", "green", "blue", "alpha"]
            && vertex_props[3..].iter().all(|p| is_uchar(&p.ty));
        if !color_ok {
            return Err(StreamError::unsupported(
                path,
                "point cloud requires uchar red, green, blue, alpha",
            ));
        }
        GeometryHeader {
            topology: Topology::PointCloud,
            vertex_count,
            index_count: vertex_count,
            has_uvs: false,
            payload_offset: consumed,
        }
    } else {
        let has_uvs = match &names[3..] {
            [] => false,
            ["s", "t"] | ["u", "v"] if vertex_props[3..].iter().all(|p| is_float(&p.ty)) => true,
            _ => return Err(StreamError::unsupported(path, "unsupported mesh vertex layout")),
        };

        let faces = face_count.ok_or_else(|| StreamError::corrupt(path, "mesh without 'element face' line"))?;
        match face_list.as_ref() {
            Some((count_ty, index_ty)) if is_uchar(count_ty) && is_int32(index_ty) => {}
            Some(_) => return Err(StreamError::unsupported(path, "face list must be uchar count + int32 indices")),
            None if faces == 0 => {}
            None => return Err(StreamError::corrupt(path, "face element without index list")),
        }

        let index_count = faces
            .checked_mul(3)
            .ok_or_else(|| StreamError::corrupt(path, "face count overflows"))?;

        GeometryHeader {
            topology: Topology::Mesh,
            vertex_count,
            index_count,
            has_uvs,
            payload_offset: consumed,
        }
    };

    if header.payload_len().is_none() {
        return Err(StreamError::corrupt(path, "element counts overflow"));
    }

    trace!(
        "Header {}: {:?}, {} vertices, {} indices, uv={}, payload@{}",
        path.display(),
        header.topology,
        header.vertex_count,
        header.index_count,
        header.has_uvs,
        header.payload_offset
    );

    Ok(header)
}

/// Parse a texture header from a seekable stream.
pub fn parse_texture_header<R: Read + Seek>(reader: &mut R, path: &Path) -> Result<TextureHeader> {
    let file_len = reader.seek(SeekFrom::End(0))? as usize;
    reader.seek(SeekFrom::Start(0))?;

    if file_len < DDS_HEADER_SIZE {
        return Err(StreamError::corrupt(
            path,
            format!("texture shorter than {}-byte preamble", DDS_HEADER_SIZE),
        ));
    }

    let mut preamble = [0u8; DDS_HEADER_SIZE];
    reader.read_exact(&mut preamble)?;

    if preamble[DDS_SIZE_FIELD_OFFSET] != DDS_SIZE_FIELD_VALUE {
        return Err(StreamError::corrupt(path, "invalid DDS header size field"));
    }

    let height = u16::from_le_bytes([preamble[12], preamble[13]]) as u32;
    let width = u16::from_le_bytes([preamble[16], preamble[17]]) as u32;

    Ok(TextureHeader {
        width,
        height,
        size: file_len - DDS_HEADER_SIZE,
    })
}

/// Read one header line, accepting LF, CRLF and bare CR terminators.
///
/// Returns `None` at EOF. `consumed` advances by every byte taken from the stream,
/// terminators included, so it ends up at the payload offset.
fn read_header_line<R: BufRead>(reader: &mut R, consumed: &mut u64) -> std::io::Result<Option<String>> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        if reader.read(&mut byte)? == 0 {
            if bytes.is_empty() {
                return Ok(None);
            }
            break;
        }
        *consumed += 1;

        match byte[0] {
            b'\n' => break,
            b'\r' => {
                // Swallow the LF of a CRLF pair
                if reader.fill_buf()?.first() == Some(&b'\n') {
                    reader.consume(1);
                    *consumed += 1;
                }
                break;
            }
            b => {
                if bytes.len() >= MAX_HEADER_LINE_LEN {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "header line too long",
                    ));
                }
                bytes.push(b);
            }
        }
    }

    String::from_utf8(bytes)
        .map(Some)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "non-ASCII header line"))
}

fn is_float(ty: &str) -> bool {
    matches!(ty, "float" | "float32")
}

fn is_double(ty: &str) -> bool {
    matches!(ty, "double" | "float64")
}

fn is_uchar(ty: &str) -> bool {
    matches!(ty, "uchar" | "uint8")
}

fn is_int32(ty: &str) -> bool {
    matches!(ty, "int" | "int32" | "uint" | "uint32")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> Result<GeometryHeader> {
        parse_geometry_header(Cursor::new(text.as_bytes().to_vec()), Path::new("test.ply"), DEFAULT_HEADER_LINE_LIMIT)
    }

    const POINT_HEADER: &str = "ply\nformat binary_little_endian 1.0\nelement vertex 3\n\
        property float x\nproperty float y\nproperty float z\n\
        property uchar red\nproperty uchar green\nproperty uchar blue\nproperty uchar alpha\nend_header\n";

    #[test]
    fn test_point_cloud_header() {
        let header = parse(POINT_HEADER).unwrap();
        assert_eq!(header.topology, Topology::PointCloud);
        assert_eq!(header.vertex_count, 3);
        assert_eq!(header.index_count, 3);
        assert!(!header.has_uvs);
        assert_eq!(header.payload_offset, POINT_HEADER.len() as u64);
        assert_eq!(header.vertex_stride(), 16);
    }

    #[test]
    fn test_mesh_header_with_uvs_crlf() {
        let text = "ply\r\nformat binary_little_endian 1.0\r\ncomment exported\r\nelement vertex 4\r\n\
            property float x\r\nproperty float y\r\nproperty float z\r\n\
            property float s\r\nproperty float t\r\n\
            element face 2\r\nproperty list uchar int vertex_indices\r\nend_header\r\n";
        let header = parse(text).unwrap();
        assert_eq!(header.topology, Topology::Mesh);
        assert!(header.has_uvs);
        assert_eq!(header.index_count, 6);
        assert_eq!(header.face_count(), 2);
        assert_eq!(header.payload_offset, text.len() as u64);
        assert_eq!(header.payload_len(), Some(4 * 20 + 2 * 13));
    }

    #[test]
    fn test_rejects_ascii_big_endian_double() {
        let ascii = POINT_HEADER.replace("binary_little_endian", "ascii");
        assert!(matches!(parse(&ascii), Err(StreamError::UnsupportedEncoding { .. })));

        let big = POINT_HEADER.replace("binary_little_endian", "binary_big_endian");
        assert!(matches!(parse(&big), Err(StreamError::UnsupportedEncoding { .. })));

        let double = POINT_HEADER.replace("property float x", "property double x");
        assert!(matches!(parse(&double), Err(StreamError::UnsupportedEncoding { .. })));
    }

    #[test]
    fn test_rejects_point_cloud_without_alpha() {
        let text = POINT_HEADER.replace("property uchar alpha\n", "");
        assert!(matches!(parse(&text), Err(StreamError::UnsupportedEncoding { .. })));
    }

    #[test]
    fn test_rejects_mesh_without_faces() {
        let text = "ply\nformat binary_little_endian 1.0\nelement vertex 3\n\
            property float x\nproperty float y\nproperty float z\nend_header\n";
        assert!(matches!(parse(text), Err(StreamError::CorruptHeader { .. })));
    }

    #[test]
    fn test_missing_end_header_is_bounded() {
        let mut text = String::from("ply\nformat binary_little_endian 1.0\n");
        for _ in 0..200 {
            text.push_str("comment padding\n");
        }
        let err = parse(&text).unwrap_err();
        assert!(err.to_string().contains("end_header"));

        // Truncated file hits EOF instead of looping
        assert!(matches!(parse("ply\nformat bin"), Err(StreamError::CorruptHeader { .. })));
    }

    #[test]
    fn test_overflowing_counts_are_corrupt() {
        let huge = POINT_HEADER.replace("element vertex 3", &format!("element vertex {}", usize::MAX));
        assert!(matches!(parse(&huge), Err(StreamError::CorruptHeader { .. })));

        let faces = format!(
            "ply\nformat binary_little_endian 1.0\nelement vertex 3\n\
             property float x\nproperty float y\nproperty float z\n\
             element face {}\nproperty list uchar int vertex_indices\nend_header\n",
            usize::MAX / 2
        );
        assert!(matches!(parse(&faces), Err(StreamError::CorruptHeader { .. })));
    }

    #[test]
    fn test_payload_must_fit_file() {
        let header = parse(POINT_HEADER).unwrap();
        let path = Path::new("test.ply");
        let full = POINT_HEADER.len() as u64 + 3 * 16;
        assert!(header.check_payload_fits(path, full).is_ok());
        assert!(header.check_payload_fits(path, full + 10).is_ok());
        assert!(matches!(
            header.check_payload_fits(path, full - 1),
            Err(StreamError::CorruptHeader { .. })
        ));

        let bogus = GeometryHeader {
            vertex_count: usize::MAX / 32,
            ..header
        };
        assert!(bogus.check_payload_fits(path, full).is_err());
    }

    #[test]
    fn test_texture_header() {
        let mut bytes = vec![0u8; DDS_HEADER_SIZE + 64];
        bytes[..4].copy_from_slice(b"DDS ");
        bytes[4] = 124;
        bytes[12..14].copy_from_slice(&256u16.to_le_bytes());
        bytes[16..18].copy_from_slice(&512u16.to_le_bytes());
        let header = parse_texture_header(&mut Cursor::new(bytes), Path::new("t.dds")).unwrap();
        assert_eq!(header.height, 256);
        assert_eq!(header.width, 512);
        assert_eq!(header.size, 64);
    }

    #[test]
    fn test_texture_header_bad_sentinel_and_short() {
        let bytes = vec![0u8; DDS_HEADER_SIZE];
        assert!(parse_texture_header(&mut Cursor::new(bytes), Path::new("t.dds")).is_err());
        let short = vec![0u8; 20];
        assert!(parse_texture_header(&mut Cursor::new(short), Path::new("t.dds")).is_err());
    }
}
