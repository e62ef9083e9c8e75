//! hierarchy.chg format - contracted graph handed to the query engine
//!
//! ```text
//! header (72 B)   magic u32 | version u16 | reserved u16 | n_nodes u32 | pad u32 | n_edges u64
//!                 | input_edges_crc u64 | edges_crc u64 | inputs_sha [u8; 32]
//! node array      (n_nodes + 1) × u64 first-edge offsets
//! edge record     source u32 | target u32 | weight u32 | flags u8 | pad [u8; 3] | id u32
//! core bitmap     ceil(n_nodes / 8) bytes, LSB first
//! footer (8 B)    file_crc u64 over everything above
//! ```
//!
//! The file is committed through `<path>.tmp` + fsync + rename, so a reader sees either
//! the previous artifact or the complete new one.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use butterfly_common::{Error, NodeId, Result, Weight};

use super::crc::{self, CrcWriter};

const MAGIC: u32 = 0x43484847; // "CHHG"
const VERSION: u16 = 1;
const HEADER_SIZE: usize = 72;
const RECORD_SIZE: usize = 20;

const FLAG_FORWARD: u8 = 1;
const FLAG_BACKWARD: u8 = 2;
const FLAG_SHORTCUT: u8 = 4;

/// Final edge record, stored at the endpoint contracted first.
///
/// Field order is the on-disk sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub weight: Weight,
    /// `source → target` is usable by the forward search
    pub forward: bool,
    /// `target → source` is usable by the backward search
    pub backward: bool,
    pub shortcut: bool,
    /// Middle node for shortcuts, original segment otherwise
    pub id: u32,
}

impl QueryEdge {
    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.forward {
            flags |= FLAG_FORWARD;
        }
        if self.backward {
            flags |= FLAG_BACKWARD;
        }
        if self.shortcut {
            flags |= FLAG_SHORTCUT;
        }
        flags
    }

    fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.source.get().to_le_bytes());
        buf[4..8].copy_from_slice(&self.target.get().to_le_bytes());
        buf[8..12].copy_from_slice(&self.weight.get().to_le_bytes());
        buf[12] = self.flags();
        buf[16..20].copy_from_slice(&self.id.to_le_bytes());
        buf
    }

    /// Middle node of a shortcut
    pub fn middle(&self) -> Option<NodeId> {
        self.shortcut.then(|| NodeId::new(self.id))
    }
}

/// Contracted graph in CSR layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hierarchy {
    pub n_nodes: u32,
    /// Sorted by source, then target
    pub edges: Vec<QueryEdge>,
    /// `n_nodes + 1` offsets into `edges`
    pub first_edge: Vec<u64>,
    pub is_core: Vec<bool>,
    /// Edge checksum of the input artifact this hierarchy was built from
    pub input_edges_crc: u64,
    pub edges_crc: u64,
    /// SHA-256 of the input artifact file
    pub inputs_sha: [u8; 32],
}

impl Hierarchy {
    pub fn new(
        n_nodes: u32,
        mut edges: Vec<QueryEdge>,
        is_core: Vec<bool>,
        input_edges_crc: u64,
        inputs_sha: [u8; 32],
    ) -> Self {
        debug_assert_eq!(is_core.len(), n_nodes as usize);
        edges.sort_unstable();
        let first_edge = build_first_edge(n_nodes, &edges);
        let edges_crc = HierarchyFile::edges_checksum(&edges);
        Self {
            n_nodes,
            edges,
            first_edge,
            is_core,
            input_edges_crc,
            edges_crc,
            inputs_sha,
        }
    }

    /// Records stored at `node`
    pub fn edges_from(&self, node: NodeId) -> &[QueryEdge] {
        let start = self.first_edge[node.index()] as usize;
        let end = self.first_edge[node.index() + 1] as usize;
        &self.edges[start..end]
    }

    pub fn core_count(&self) -> usize {
        self.is_core.iter().filter(|&&core| core).count()
    }

    pub fn shortcut_count(&self) -> usize {
        self.edges.iter().filter(|e| e.shortcut).count()
    }
}

fn build_first_edge(n_nodes: u32, sorted: &[QueryEdge]) -> Vec<u64> {
    let mut first_edge = vec![0u64; n_nodes as usize + 1];
    for edge in sorted {
        first_edge[edge.source.index() + 1] += 1;
    }
    for i in 0..n_nodes as usize {
        first_edge[i + 1] += first_edge[i];
    }
    first_edge
}

fn encode_core_bitmap(is_core: &[bool]) -> Vec<u8> {
    let mut bitmap = vec![0u8; is_core.len().div_ceil(8)];
    for (i, &core) in is_core.iter().enumerate() {
        if core {
            bitmap[i / 8] |= 1 << (i % 8);
        }
    }
    bitmap
}

fn decode_core_bitmap(bitmap: &[u8], n_nodes: usize) -> Vec<bool> {
    (0..n_nodes)
        .map(|i| bitmap[i / 8] & (1 << (i % 8)) != 0)
        .collect()
}

/// Checksums of a committed hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub edges_crc: u64,
    pub file_crc: u64,
    pub bytes: u64,
}

pub struct HierarchyFile;

impl HierarchyFile {
    pub fn edges_checksum(edges: &[QueryEdge]) -> u64 {
        let mut digest = crc::Digest::new();
        for edge in edges {
            digest.update(&edge.encode());
        }
        digest.finalize()
    }

    /// Path of the staging file used by [`HierarchyFile::write`]
    pub fn temp_path(path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Atomically write hierarchy.chg
    pub fn write<P: AsRef<Path>>(path: P, hierarchy: &Hierarchy) -> Result<WriteSummary> {
        let path = path.as_ref();
        let tmp = Self::temp_path(path);

        let committed = Self::write_staged(&tmp, hierarchy).and_then(|summary| {
            fs::rename(&tmp, path)?;
            Ok(summary)
        });

        committed.map_err(|source| {
            let _ = fs::remove_file(&tmp);
            Error::IoWriteFailure {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    fn write_staged(tmp: &Path, hierarchy: &Hierarchy) -> io::Result<WriteSummary> {
        let file = File::create(tmp)?;
        let mut writer = CrcWriter::new(BufWriter::new(file));

        // Recomputed over the records actually written
        let edges_crc = Self::edges_checksum(&hierarchy.edges);
        let n_edges = hierarchy.edges.len() as u64;

        writer.put_u32(MAGIC)?;
        writer.put_u16(VERSION)?;
        writer.put_u16(0)?;
        writer.put_u32(hierarchy.n_nodes)?;
        writer.put_u32(0)?;
        writer.put_u64(n_edges)?;
        writer.put_u64(hierarchy.input_edges_crc)?;
        writer.put_u64(edges_crc)?;
        writer.write_all(&hierarchy.inputs_sha)?;

        for &offset in &hierarchy.first_edge {
            writer.put_u64(offset)?;
        }
        for edge in &hierarchy.edges {
            writer.write_all(&edge.encode())?;
        }
        writer.write_all(&encode_core_bitmap(&hierarchy.is_core))?;

        let (mut inner, file_crc) = writer.finish();
        inner.write_all(&file_crc.to_le_bytes())?;
        inner.flush()?;

        let file = inner.into_inner().map_err(|err| err.into_error())?;
        file.sync_all()?;
        let bytes = file.metadata()?.len();

        Ok(WriteSummary {
            edges_crc,
            file_crc,
            bytes,
        })
    }

    /// Read and verify hierarchy.chg
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Hierarchy> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => Error::InputNotFound {
                path: path.to_path_buf(),
            },
            _ => Error::Io(err),
        })?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut file_digest = crc::Digest::new();

        let mut header = [0u8; HEADER_SIZE];
        read_digested(&mut reader, &mut header, &mut file_digest, path)?;

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
        let n_edges = le_u64(&header[16..24]);
        let input_edges_crc = le_u64(&header[24..32]);
        let stored_edges_crc = le_u64(&header[32..40]);
        let mut inputs_sha = [0u8; 32];
        inputs_sha.copy_from_slice(&header[40..72]);

        let n = n_nodes as u64;
        let expected_len = n_edges
            .checked_mul(RECORD_SIZE as u64)
            .and_then(|body| body.checked_add(HEADER_SIZE as u64))
            .and_then(|len| len.checked_add((n + 1) * 8))
            .and_then(|len| len.checked_add(n.div_ceil(8) + 8));
        if expected_len != Some(file_len) {
            return Err(Error::corrupt(
                path,
                format!(
                    "{n_nodes} nodes and {n_edges} edges do not fit a file of {file_len} bytes"
                ),
            ));
        }

        let mut first_edge = Vec::with_capacity(n_nodes as usize + 1);
        let mut buf8 = [0u8; 8];
        for _ in 0..=n_nodes {
            read_digested(&mut reader, &mut buf8, &mut file_digest, path)?;
            first_edge.push(u64::from_le_bytes(buf8));
        }
        if first_edge.first() != Some(&0)
            || first_edge.last() != Some(&n_edges)
            || first_edge.windows(2).any(|w| w[0] > w[1])
        {
            return Err(Error::corrupt(path, "node array is not a monotone offset table"));
        }

        let mut edges_digest = crc::Digest::new();
        let mut edges = Vec::with_capacity(n_edges as usize);
        let mut record = [0u8; RECORD_SIZE];
        let mut node = 0usize;
        for index in 0..n_edges {
            read_digested(&mut reader, &mut record, &mut file_digest, path)?;
            edges_digest.update(&record);
            while first_edge[node + 1] <= index {
                node += 1;
            }
            edges.push(decode_record(&record, n_nodes, node, index, path)?);
        }

        let computed_edges_crc = edges_digest.finalize();
        if computed_edges_crc != stored_edges_crc {
            return Err(Error::corrupt(
                path,
                format!(
                    "edge CRC64 mismatch: computed 0x{:016X}, stored 0x{:016X}",
                    computed_edges_crc, stored_edges_crc
                ),
            ));
        }

        let mut bitmap = vec![0u8; (n_nodes as usize).div_ceil(8)];
        read_digested(&mut reader, &mut bitmap, &mut file_digest, path)?;
        let is_core = decode_core_bitmap(&bitmap, n_nodes as usize);

        let computed_file_crc = file_digest.finalize();
        read_exact_or_corrupt(&mut reader, &mut buf8, path)?;
        let stored_file_crc = u64::from_le_bytes(buf8);
        if computed_file_crc != stored_file_crc {
            return Err(Error::corrupt(
                path,
                format!(
                    "file CRC64 mismatch: computed 0x{:016X}, stored 0x{:016X}",
                    computed_file_crc, stored_file_crc
                ),
            ));
        }

        Ok(Hierarchy {
            n_nodes,
            edges,
            first_edge,
            is_core,
            input_edges_crc,
            edges_crc: stored_edges_crc,
            inputs_sha,
        })
    }
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn decode_record(
    buf: &[u8; RECORD_SIZE],
    n_nodes: u32,
    node: usize,
    index: u64,
    path: &Path,
) -> Result<QueryEdge> {
    let source = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
    let target = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
    let weight = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    let flags = buf[12];
    let id = u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]);

    if source as usize != node || target >= n_nodes {
        return Err(Error::corrupt(
            path,
            format!("edge {index}: {source} -> {target} misplaced under node {node}"),
        ));
    }
    if flags & !(FLAG_FORWARD | FLAG_BACKWARD | FLAG_SHORTCUT) != 0
        || flags & (FLAG_FORWARD | FLAG_BACKWARD) == 0
    {
        return Err(Error::corrupt(path, format!("edge {index}: bad flags {flags:#04x}")));
    }
    if weight > Weight::MAX.get() {
        return Err(Error::corrupt(path, format!("edge {index}: weight {weight} out of range")));
    }

    Ok(QueryEdge {
        source: NodeId::new(source),
        target: NodeId::new(target),
        weight: Weight::new(weight),
        forward: flags & FLAG_FORWARD != 0,
        backward: flags & FLAG_BACKWARD != 0,
        shortcut: flags & FLAG_SHORTCUT != 0,
        id,
    })
}

fn read_digested<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    digest: &mut crc::Digest,
    path: &Path,
) -> Result<()> {
    read_exact_or_corrupt(reader, buf, path)?;
    digest.update(buf);
    Ok(())
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
    use tempfile::TempDir;

    fn record(source: u32, target: u32, weight: u32, fwd: bool, bwd: bool) -> QueryEdge {
        QueryEdge {
            source: NodeId::new(source),
            target: NodeId::new(target),
            weight: Weight::new(weight),
            forward: fwd,
            backward: bwd,
            shortcut: false,
            id: 100 + source,
        }
    }

    fn sample() -> Hierarchy {
        let mut shortcut = record(2, 0, 6, true, true);
        shortcut.shortcut = true;
        shortcut.id = 1;
        Hierarchy::new(
            5,
            vec![
                record(3, 4, 2, true, false),
                shortcut,
                record(1, 0, 1, true, true),
                record(1, 2, 5, false, true),
            ],
            vec![true, false, false, false, true],
            0xABCD,
            [7u8; 32],
        )
    }

    #[test]
    fn test_new_sorts_and_builds_offsets() {
        let h = sample();
        assert_eq!(h.first_edge, vec![0, 0, 2, 3, 4, 4]);
        assert_eq!(h.edges_from(NodeId::new(1)).len(), 2);
        assert_eq!(h.edges_from(NodeId::new(2))[0].middle(), Some(NodeId::new(1)));
        assert!(h.edges_from(NodeId::new(4)).is_empty());
        assert_eq!(h.core_count(), 2);
        assert_eq!(h.shortcut_count(), 1);
    }

    #[test]
    fn test_hierarchy_write_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.chg");
        let h = sample();

        let summary = HierarchyFile::write(&path, &h).unwrap();
        assert_eq!(summary.edges_crc, h.edges_crc);
        assert_eq!(summary.bytes, std::fs::metadata(&path).unwrap().len());
        assert!(!HierarchyFile::temp_path(&path).exists());

        let loaded = HierarchyFile::read(&path).unwrap();
        assert_eq!(loaded, h);
    }

    #[test]
    fn test_write_into_missing_directory_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("out.chg");

        let err = HierarchyFile::write(&path, &sample()).unwrap_err();
        assert!(matches!(err, Error::IoWriteFailure { .. }));
        assert!(!path.exists());
        assert!(!HierarchyFile::temp_path(&path).exists());
    }

    #[test]
    fn test_write_replaces_previous_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.chg");
        std::fs::write(&path, b"stale").unwrap();

        HierarchyFile::write(&path, &sample()).unwrap();
        assert!(HierarchyFile::read(&path).is_ok());
    }

    #[test]
    fn test_corrupted_bitmap_fails_file_crc() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.chg");
        HierarchyFile::write(&path, &sample()).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let bitmap_at = bytes.len() - 8 - 1;
        bytes[bitmap_at] ^= 0x02;
        std::fs::write(&path, &bytes).unwrap();

        match HierarchyFile::read(&path).unwrap_err() {
            Error::CorruptInput { reason, .. } => assert!(reason.contains("file CRC64")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_huge_edge_count_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.chg");
        let single = Hierarchy::new(1, Vec::new(), vec![true], 0, [0u8; 32]);
        HierarchyFile::write(&path, &single).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        bytes[16..24].copy_from_slice(&(u64::MAX / 20).to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            HierarchyFile::read(&path).unwrap_err(),
            Error::CorruptInput { .. }
        ));
    }

    #[test]
    fn test_core_bitmap_bit_order() {
        let bitmap =
            encode_core_bitmap(&[true, false, false, true, false, false, false, false, true]);
        assert_eq!(bitmap, vec![0b0000_1001, 0b0000_0001]);
        assert_eq!(
            decode_core_bitmap(&bitmap, 9),
            vec![true, false, false, true, false, false, false, false, true]
        );
    }
}
