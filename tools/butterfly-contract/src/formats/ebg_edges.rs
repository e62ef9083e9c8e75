//! ebg.edges format - edge-expanded graph handed over by graph construction
//!
//! ```text
//! header (24 B)  magic u32 | version u16 | reserved u16 | n_nodes u32 | pad u32 | n_edges u64
//! record (20 B)  source u32 | target u32 | weight i32 | direction u8 | pad [u8; 3] | segment u32
//! footer (8 B)   edges_crc u64, CRC-64 over the record bytes only
//! ```
//!
//! Weights are stored signed so that a bad upstream weight survives loading and is
//! rejected by the contractor with a precise error instead of wrapping around.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use butterfly_common::{Error, NodeId, Result, SegmentId};

use super::crc::{self, CrcWriter};

const MAGIC: u32 = 0x45424745; // "EBGE"
const VERSION: u16 = 1;
const HEADER_SIZE: u64 = 24;
pub const RECORD_SIZE: usize = 20;
const FOOTER_SIZE: u64 = 8;

/// Traversal direction of an input edge relative to `source → target`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    Forward = 1,
    Backward = 2,
    Both = 3,
}

impl Direction {
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(Direction::Forward),
            2 => Some(Direction::Backward),
            3 => Some(Direction::Both),
            _ => None,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }

    /// `source → target` is traversable
    pub fn forward(self) -> bool {
        self.bits() & 1 != 0
    }

    /// `target → source` is traversable
    pub fn backward(self) -> bool {
        self.bits() & 2 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEdge {
    pub source: NodeId,
    pub target: NodeId,
    /// Raw on-disk weight, validated by the contractor
    pub weight: i32,
    pub direction: Direction,
    pub segment: SegmentId,
}

impl InputEdge {
    fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.source.get().to_le_bytes());
        buf[4..8].copy_from_slice(&self.target.get().to_le_bytes());
        buf[8..12].copy_from_slice(&self.weight.to_le_bytes());
        buf[12] = self.direction.bits();
        buf[16..20].copy_from_slice(&self.segment.get().to_le_bytes());
        buf
    }
}

/// Loaded edge-expanded graph
#[derive(Debug, Clone)]
pub struct EbgEdges {
    pub n_nodes: u32,
    pub edges: Vec<InputEdge>,
    /// Checksum over the edge records, carried into the hierarchy header
    pub edges_crc: u64,
}

impl EbgEdges {
    /// Build an in-memory graph, computing the record checksum
    pub fn new(n_nodes: u32, edges: Vec<InputEdge>) -> Self {
        let edges_crc = EbgEdgesFile::edges_checksum(&edges);
        Self {
            n_nodes,
            edges,
            edges_crc,
        }
    }
}

pub struct EbgEdgesFile;

impl EbgEdgesFile {
    /// CRC-64 over the encoded edge records
    pub fn edges_checksum(edges: &[InputEdge]) -> u64 {
        let mut digest = crc::Digest::new();
        for edge in edges {
            digest.update(&edge.encode());
        }
        digest.finalize()
    }

    /// Write ebg.edges; returns the record checksum stored in the footer
    pub fn write<P: AsRef<Path>>(path: P, data: &EbgEdges) -> Result<u64> {
        let path = path.as_ref();
        let to_write_err = |source| Error::IoWriteFailure {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(to_write_err)?;
        let mut writer = BufWriter::new(file);

        let mut header = Vec::with_capacity(HEADER_SIZE as usize);
        header.extend_from_slice(&MAGIC.to_le_bytes());
        header.extend_from_slice(&VERSION.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes());
        header.extend_from_slice(&data.n_nodes.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&(data.edges.len() as u64).to_le_bytes());
        writer.write_all(&header).map_err(to_write_err)?;

        let mut records = CrcWriter::new(writer);
        for edge in &data.edges {
            records.write_all(&edge.encode()).map_err(to_write_err)?;
        }
        let (mut writer, edges_crc) = records.finish();

        writer
            .write_all(&edges_crc.to_le_bytes())
            .map_err(to_write_err)?;
        writer.flush().map_err(to_write_err)?;

        Ok(edges_crc)
    }

    /// Read and verify ebg.edges
    pub fn read<P: AsRef<Path>>(path: P) -> Result<EbgEdges> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => Error::InputNotFound {
                path: path.to_path_buf(),
            },
            _ => Error::Io(err),
        })?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        if file_len < HEADER_SIZE + FOOTER_SIZE {
            return Err(Error::corrupt(
                path,
                format!("truncated: {file_len} bytes is smaller than header and footer"),
            ));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        read_exact_or_corrupt(&mut reader, &mut header, path)?;

        let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if magic != MAGIC {
            return Err(Error::corrupt(
                path,
                format!("invalid magic: expected 0x{MAGIC:08X}, got 0x{magic:08X}"),
            ));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(Error::corrupt(
                path,
                format!("unsupported version {version}, expected {VERSION}"),
            ));
        }
        let n_nodes = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        let n_edges = u64::from_le_bytes([
            header[16], header[17], header[18], header[19],
            header[20], header[21], header[22], header[23],
        ]);

        let expected_len = n_edges
            .checked_mul(RECORD_SIZE as u64)
            .and_then(|body| body.checked_add(HEADER_SIZE + FOOTER_SIZE));
        if expected_len != Some(file_len) {
            return Err(Error::corrupt(
                path,
                format!("{n_edges} edges do not fit a file of {file_len} bytes"),
            ));
        }

        let mut digest = crc::Digest::new();
        let mut edges = Vec::with_capacity(n_edges as usize);
        let mut buf = [0u8; RECORD_SIZE];
        for index in 0..n_edges {
            read_exact_or_corrupt(&mut reader, &mut buf, path)?;
            digest.update(&buf);
            edges.push(decode_record(&buf, n_nodes, index, path)?);
        }

        let computed_crc = digest.finalize();
        let mut footer = [0u8; FOOTER_SIZE as usize];
        read_exact_or_corrupt(&mut reader, &mut footer, path)?;
        let stored_crc = u64::from_le_bytes(footer);
        if computed_crc != stored_crc {
            return Err(Error::corrupt(
                path,
                format!(
                    "CRC64 mismatch: computed 0x{computed_crc:016X}, stored 0x{stored_crc:016X}"
                ),
            ));
        }

        Ok(EbgEdges {
            n_nodes,
            edges,
            edges_crc: stored_crc,
        })
    }
}

fn decode_record(
    buf: &[u8; RECORD_SIZE],
    n_nodes: u32,
    index: u64,
    path: &Path,
) -> Result<InputEdge> {
    let source = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let target = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let weight = i32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    let segment = u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]);

    if source >= n_nodes || target >= n_nodes {
        return Err(Error::corrupt(
            path,
            format!("edge {index}: endpoint {source} -> {target} outside 0..{n_nodes}"),
        ));
    }
    let direction = Direction::from_bits(buf[12]).ok_or_else(|| {
        Error::corrupt(path, format!("edge {index}: unknown direction bits {:#04x}", buf[12]))
    })?;

    Ok(InputEdge {
        source: NodeId::new(source),
        target: NodeId::new(target),
        weight,
        direction,
        segment: SegmentId::new(segment),
    })
}

fn read_exact_or_corrupt<R: Read>(reader: &mut R, buf: &mut [u8], path: &Path) -> Result<()> {
    reader.read_exact(buf).map_err(|err| match err.kind() {
        ErrorKind::UnexpectedEof => Error::corrupt(path, "truncated"),
        _ => Error::Io(err),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn edge(source: u32, target: u32, weight: i32, direction: Direction) -> InputEdge {
        InputEdge {
            source: NodeId::new(source),
            target: NodeId::new(target),
            weight,
            direction,
            segment: SegmentId::new(source * 10 + target),
        }
    }

    fn sample() -> EbgEdges {
        EbgEdges::new(
            4,
            vec![
                edge(0, 1, 1, Direction::Both),
                edge(1, 2, 2, Direction::Forward),
                edge(2, 3, 3, Direction::Backward),
            ],
        )
    }

    #[test]
    fn test_ebg_edges_write_read() {
        let data = sample();
        let tmpfile = NamedTempFile::new().unwrap();
        let crc = EbgEdgesFile::write(tmpfile.path(), &data).unwrap();
        assert_eq!(crc, data.edges_crc);

        let loaded = EbgEdgesFile::read(tmpfile.path()).unwrap();
        assert_eq!(loaded.n_nodes, 4);
        assert_eq!(loaded.edges, data.edges);
        assert_eq!(loaded.edges_crc, data.edges_crc);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = EbgEdgesFile::read(dir.path().join("absent.ebg")).unwrap_err();
        assert!(matches!(err, Error::InputNotFound { .. }));
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let tmpfile = NamedTempFile::new().unwrap();
        EbgEdgesFile::write(tmpfile.path(), &sample()).unwrap();
        let bytes = std::fs::read(tmpfile.path()).unwrap();
        std::fs::write(tmpfile.path(), &bytes[..bytes.len() - 5]).unwrap();

        let err = EbgEdgesFile::read(tmpfile.path()).unwrap_err();
        assert!(matches!(err, Error::CorruptInput { .. }));
    }

    #[test]
    fn test_flipped_weight_byte_fails_checksum() {
        let tmpfile = NamedTempFile::new().unwrap();
        EbgEdgesFile::write(tmpfile.path(), &sample()).unwrap();
        let mut bytes = std::fs::read(tmpfile.path()).unwrap();
        // weight of the second record
        bytes[HEADER_SIZE as usize + RECORD_SIZE + 8] ^= 0x40;
        std::fs::write(tmpfile.path(), &bytes).unwrap();

        match EbgEdgesFile::read(tmpfile.path()).unwrap_err() {
            Error::CorruptInput { reason, .. } => assert!(reason.contains("CRC64")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_out_of_range_endpoint_is_corrupt() {
        let data = EbgEdges::new(2, vec![edge(0, 5, 1, Direction::Forward)]);
        let tmpfile = NamedTempFile::new().unwrap();
        EbgEdgesFile::write(tmpfile.path(), &data).unwrap();

        let err = EbgEdgesFile::read(tmpfile.path()).unwrap_err();
        assert!(matches!(err, Error::CorruptInput { .. }));
    }

    #[test]
    fn test_negative_weight_survives_loading() {
        let data = EbgEdges::new(2, vec![edge(0, 1, -4, Direction::Forward)]);
        let tmpfile = NamedTempFile::new().unwrap();
        EbgEdgesFile::write(tmpfile.path(), &data).unwrap();

        let loaded = EbgEdgesFile::read(tmpfile.path()).unwrap();
        assert_eq!(loaded.edges[0].weight, -4);
    }

    #[test]
    fn test_direction_bits() {
        assert!(Direction::Both.forward() && Direction::Both.backward());
        assert!(Direction::Forward.forward() && !Direction::Forward.backward());
        assert_eq!(Direction::from_bits(0), None);
        assert_eq!(Direction::from_bits(2), Some(Direction::Backward));
    }
}
