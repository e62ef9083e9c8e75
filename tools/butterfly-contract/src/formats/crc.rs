//! CRC-64 checksum utilities shared by the artifact formats

use std::io::{self, Write};

use crc::{Crc, CRC_64_GO_ISO};

/// CRC-64/GO-ISO, the checksum used by every butterfly artifact
pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// One-shot checksum of a byte slice
pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Incremental CRC-64 digest
pub struct Digest {
    digest: crc::Digest<'static, u64>,
}

impl Digest {
    pub fn new() -> Self {
        Self {
            digest: CRC64.digest(),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    pub fn finalize(self) -> u64 {
        self.digest.finalize()
    }
}

impl Default for Digest {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer adapter that feeds every byte it forwards into a [`Digest`].
///
/// Replaces the write-then-update pairs a format writer would otherwise repeat for
/// each field.
pub struct CrcWriter<W: Write> {
    inner: W,
    digest: Digest,
}

impl<W: Write> CrcWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            digest: Digest::new(),
        }
    }

    pub fn put_u16(&mut self, value: u16) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    pub fn put_u32(&mut self, value: u32) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    pub fn put_u64(&mut self, value: u64) -> io::Result<()> {
        self.write_all(&value.to_le_bytes())
    }

    /// Checksum of everything written so far, plus the inner writer.
    pub fn finish(self) -> (W, u64) {
        (self.inner, self.digest.finalize())
    }
}

impl<W: Write> Write for CrcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.digest.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
