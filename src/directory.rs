//! The directory: a dense array of fixed-size entry records living in the
//! system region, plus the packed variable-length cluster lists that
//! follow them.
//!
//! The original on-media layout reserved `MAX_CLUSTERS * 2` bytes per
//! slot for each entry's cluster list — enough to make every directory
//! slot consume over 128 KiB regardless of how small the entry actually
//! is. This revision (format version 1.1, see `header::VERSION_MINOR`)
//! instead packs every live entry's cluster list contiguously right
//! after the fixed array, which is the fix the format's own design notes
//! call for. It also defines an explicit portable on-media record
//! instead of writing the native in-memory struct (with its nonsense
//! pointer-slot bytes) verbatim.

use binrw::{BinRead, BinWrite};
use std::io::Cursor;

use crate::error::{AcfsError, Result};
use crate::header::HEADER_SIZE;

/// Max length of an identifier, not counting the mandatory NUL terminator.
pub const MAX_ID_LEN: usize = 31;
pub(crate) const ID_FIELD_LEN: usize = 32;

/// On-media size of one fixed entry record: 32-byte id + 4-byte data_size
/// + 2-byte cluster_count + 4-byte crc32 + 1-byte valid flag.
pub(crate) const ENTRY_RECORD_SIZE: usize = 43;

#[binrw::binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntryRecord {
    pub id: [u8; ID_FIELD_LEN],
    pub data_size: u32,
    pub cluster_count: u16,
    pub crc32: u32,
    pub valid: u8,
}

impl EntryRecord {
    fn to_bytes(&self) -> Result<[u8; ENTRY_RECORD_SIZE]> {
        let mut cur = Cursor::new(Vec::with_capacity(ENTRY_RECORD_SIZE));
        self.write_le(&mut cur).map_err(|_| AcfsError::IoError)?;
        let v = cur.into_inner();
        let mut out = [0u8; ENTRY_RECORD_SIZE];
        out.copy_from_slice(&v);
        Ok(out)
    }

    fn from_bytes(buf: &[u8; ENTRY_RECORD_SIZE]) -> Result<Self> {
        let mut cur = Cursor::new(buf.as_slice());
        Self::read_le(&mut cur).map_err(|_| AcfsError::IoError)
    }
}

/// In-memory directory entry: the fixed record fields plus its resolved
/// cluster list, in allocation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entry {
    pub id: [u8; ID_FIELD_LEN],
    pub data_size: u32,
    pub crc32: u32,
    pub valid: bool,
    pub clusters: Vec<u16>,
}

impl Entry {
    pub fn new(id_bytes: &[u8], clusters: Vec<u16>) -> Self {
        let mut id = [0u8; ID_FIELD_LEN];
        let n = id_bytes.len().min(MAX_ID_LEN);
        id[..n].copy_from_slice(&id_bytes[..n]);
        Entry {
            id,
            data_size: 0,
            crc32: 0,
            valid: true,
            clusters,
        }
    }

    pub fn id_matches(&self, id_bytes: &[u8]) -> bool {
        let mut candidate = [0u8; ID_FIELD_LEN];
        let n = id_bytes.len().min(MAX_ID_LEN);
        candidate[..n].copy_from_slice(&id_bytes[..n]);
        candidate == self.id
    }

    fn to_record(&self) -> EntryRecord {
        EntryRecord {
            id: self.id,
            data_size: self.data_size,
            cluster_count: self.clusters.len() as u16,
            crc32: self.crc32,
            valid: if self.valid { 1 } else { 0 },
        }
    }
}

/// How many fixed entry slots fit in the system region given `sys_clusters`
/// and `cluster_size`. Mirrors the format's `floor((sys_region - HEADER_SIZE)
/// / ENTRY_RECORD_SIZE)` capacity rule; the packed cluster lists sharing the
/// same region are accounted for at save time, not in this static bound.
pub(crate) fn max_entries(sys_clusters: u16, cluster_size: u16) -> usize {
    let sys_region = sys_clusters as usize * cluster_size as usize;
    sys_region.saturating_sub(HEADER_SIZE) / ENTRY_RECORD_SIZE
}

/// Writes the fixed entry array starting at `HEADER_SIZE`, followed
/// immediately by every entry's packed cluster list in entry order.
pub(crate) fn save(
    device: &mut dyn crate::device::StorageDevice,
    sys_region_size: usize,
    entries: &[Entry],
) -> Result<()> {
    let mut buf = Vec::with_capacity(entries.len() * ENTRY_RECORD_SIZE);
    for entry in entries {
        buf.extend_from_slice(&entry.to_record().to_bytes()?);
    }
    for entry in entries {
        for &cluster in &entry.clusters {
            buf.extend_from_slice(&cluster.to_le_bytes());
        }
    }
    if buf.len() > sys_region_size.saturating_sub(HEADER_SIZE) {
        return Err(AcfsError::NoSpace);
    }
    device.write(HEADER_SIZE as u32, &buf)
}

/// Reads `data_entries` fixed records starting at `HEADER_SIZE`, then reads
/// each valid entry's packed cluster list in the same order.
pub(crate) fn load(
    device: &mut dyn crate::device::StorageDevice,
    data_entries: u16,
) -> Result<Vec<Entry>> {
    let fixed_len = data_entries as usize * ENTRY_RECORD_SIZE;
    let mut fixed_buf = vec![0u8; fixed_len];
    device.read(HEADER_SIZE as u32, &mut fixed_buf)?;

    let mut records = Vec::with_capacity(data_entries as usize);
    for chunk in fixed_buf.chunks_exact(ENTRY_RECORD_SIZE) {
        let mut arr = [0u8; ENTRY_RECORD_SIZE];
        arr.copy_from_slice(chunk);
        records.push(EntryRecord::from_bytes(&arr)?);
    }

    let mut cursor = HEADER_SIZE as u32 + fixed_len as u32;
    let mut entries = Vec::with_capacity(records.len());
    for record in records {
        let list_len = record.cluster_count as usize * 2;
        let mut list_buf = vec![0u8; list_len];
        device.read(cursor, &mut list_buf)?;
        cursor += list_len as u32;

        let clusters = list_buf
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();

        entries.push(Entry {
            id: record.id,
            data_size: record.data_size,
            crc32: record.crc32,
            valid: record.valid != 0,
            clusters,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    fn sample_entries() -> Vec<Entry> {
        let mut a = Entry::new(b"alpha", vec![4, 5]);
        a.data_size = 300;
        a.crc32 = 0xDEAD_BEEF;
        let mut b = Entry::new(b"beta", vec![6]);
        b.data_size = 10;
        b.crc32 = 0xCAFE_F00D;
        vec![a, b]
    }

    #[test]
    fn round_trips_fixed_records_and_cluster_lists() {
        let mut dev = MemoryDevice::eeprom(64 * 1024);
        let entries = sample_entries();
        save(&mut dev, 4 * 256, &entries).unwrap();

        let loaded = load(&mut dev, entries.len() as u16).unwrap();
        assert_eq!(loaded, entries);
    }

    #[test]
    fn cluster_lists_are_packed_contiguously_not_at_max_clusters_stride() {
        let mut dev = MemoryDevice::eeprom(64 * 1024);
        let entries = sample_entries();
        save(&mut dev, 4 * 256, &entries).unwrap();

        // The second entry's cluster list should sit immediately after the
        // first entry's one u16, not MAX_CLUSTERS * 2 bytes later.
        let expected_offset =
            HEADER_SIZE as u32 + (entries.len() * ENTRY_RECORD_SIZE) as u32 + 2;
        let mut buf = [0u8; 2];
        dev.read(expected_offset, &mut buf).unwrap();
        assert_eq!(u16::from_le_bytes(buf), 6);
    }

    #[test]
    fn rejects_saves_that_overflow_the_system_region() {
        let mut dev = MemoryDevice::eeprom(64 * 1024);
        let entries = sample_entries();
        // A system region of a single byte cannot possibly hold this.
        assert_eq!(save(&mut dev, 1, &entries), Err(AcfsError::NoSpace));
    }

    #[test]
    fn id_matches_compares_up_to_the_fixed_width_field() {
        let entry = Entry::new(b"k", vec![]);
        assert!(entry.id_matches(b"k"));
        assert!(!entry.id_matches(b"other"));
    }
}
