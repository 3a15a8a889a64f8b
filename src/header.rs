//! The superblock: a fixed 20-byte little-endian record at device offset 0
//! describing the filesystem's geometry, self-checked with a trailing CRC32.

use binrw::{BinRead, BinWrite};
use std::io::Cursor;

use crate::crc::crc32;
use crate::device::StorageDevice;
use crate::error::{AcfsError, Result};

pub(crate) const HEADER_SIZE: usize = 20;
pub(crate) const MAGIC: u32 = 0x4143_4653; // "ACFS"
pub(crate) const VERSION_MAJOR: u8 = 1;
/// Minor version bumped to mark the packed cluster-list directory
/// revision adopted from the format's own design notes (see DESIGN.md).
pub(crate) const VERSION_MINOR: u8 = 1;

#[binrw::binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Header {
    pub magic: u32,
    pub version: u16,
    pub cluster_size: u16,
    pub total_clusters: u16,
    pub sys_clusters: u16,
    pub data_entries: u16,
    pub free_clusters: u16,
    pub crc32: u32,
}

impl Header {
    pub fn new(cluster_size: u16, total_clusters: u16, sys_clusters: u16) -> Self {
        Header {
            magic: MAGIC,
            version: ((VERSION_MAJOR as u16) << 8) | VERSION_MINOR as u16,
            cluster_size,
            total_clusters,
            sys_clusters,
            data_entries: 0,
            free_clusters: total_clusters - sys_clusters,
            crc32: 0,
        }
    }

    fn to_bytes(&self) -> Result<[u8; HEADER_SIZE]> {
        let mut buf = Cursor::new(Vec::with_capacity(HEADER_SIZE));
        self.write_le(&mut buf).map_err(|_| AcfsError::IoError)?;
        let v = buf.into_inner();
        let mut out = [0u8; HEADER_SIZE];
        out.copy_from_slice(&v);
        Ok(out)
    }

    fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Result<Self> {
        let mut cur = Cursor::new(buf.as_slice());
        Self::read_le(&mut cur).map_err(|_| AcfsError::IoError)
    }

    /// Reads and CRC-validates the header at device offset 0.
    ///
    /// Errors: `InvalidFilesystem` (bad magic), `DataCorrupted` (bad CRC),
    /// `IoError` (device read failure).
    pub fn load(device: &mut dyn StorageDevice) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        device.read(0, &mut buf)?;
        let header = Self::from_bytes(&buf)?;
        if header.magic != MAGIC {
            return Err(AcfsError::InvalidFilesystem);
        }
        let computed = crc32(&buf[0..16]);
        if computed != header.crc32 {
            return Err(AcfsError::DataCorrupted);
        }
        Ok(header)
    }

    /// Recomputes the CRC and writes the header to device offset 0.
    pub fn save(&mut self, device: &mut dyn StorageDevice) -> Result<()> {
        let mut buf = self.to_bytes()?;
        let computed = crc32(&buf[0..16]);
        self.crc32 = computed;
        buf[16..20].copy_from_slice(&computed.to_le_bytes());
        device.write(0, &buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    #[test]
    fn round_trips_through_a_device() {
        let mut dev = MemoryDevice::eeprom(64 * 1024);
        let mut header = Header::new(256, 256, 4);
        header.save(&mut dev).unwrap();

        let loaded = Header::load(&mut dev).unwrap();
        assert_eq!(loaded, header);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut dev = MemoryDevice::eeprom(64 * 1024);
        let mut header = Header::new(256, 256, 4);
        header.save(&mut dev).unwrap();

        let mut first_word = [0u8; 4];
        dev.read(0, &mut first_word).unwrap();
        first_word[0] ^= 0xFF;
        dev.write(0, &first_word).unwrap();

        assert_eq!(Header::load(&mut dev), Err(AcfsError::InvalidFilesystem));
    }

    #[test]
    fn detects_single_byte_corruption_via_crc() {
        let mut dev = MemoryDevice::eeprom(64 * 1024);
        let mut header = Header::new(256, 256, 4);
        header.save(&mut dev).unwrap();

        // Flip a byte inside the header but outside the CRC field itself.
        let mut byte = [0u8; 1];
        dev.read(6, &mut byte).unwrap();
        byte[0] ^= 0x01;
        dev.write(6, &byte).unwrap();

        assert_eq!(Header::load(&mut dev), Err(AcfsError::DataCorrupted));
    }
}
