//! The filesystem engine: mount/format/write/read/delete and friends,
//! orchestrating the superblock, directory, bitmap and device into one
//! consistent state machine.
//!
//! Mount state is modeled as `Option<Mounted>` rather than either a bare
//! `initialized: bool` flag or a compile-time typestate: the format's
//! `NotInitialized`/`AlreadyInitialized` errors are runtime-observable
//! outcomes a caller is expected to handle, not programmer errors a type
//! system should make unreachable.

use log::{debug, warn};

use crate::bitmap::ClusterBitmap;
use crate::config::Config;
use crate::device::StorageDevice;
use crate::directory::{self, Entry, MAX_ID_LEN};
use crate::error::{AcfsError, ReadError, Result};
use crate::header::Header;

struct Mounted {
    header: Header,
    entries: Vec<Entry>,
    bitmap: ClusterBitmap,
    config: Config,
    max_entries: usize,
}

/// Snapshot returned by [`Acfs::get_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub total: u32,
    pub used: u32,
    pub free: u32,
    pub data_count: u16,
}

/// The mounted (or not-yet-mounted) filesystem instance over a device `D`.
pub struct Acfs<D: StorageDevice> {
    device: D,
    state: Option<Mounted>,
}

fn validate_cluster_size(cluster_size: u16) -> Result<()> {
    if !(64..=4096).contains(&cluster_size) || !cluster_size.is_power_of_two() {
        return Err(AcfsError::InvalidParam);
    }
    Ok(())
}

impl<D: StorageDevice> Acfs<D> {
    /// Wraps a device without touching it. Call [`mount`](Self::mount) or
    /// [`format`](Self::format) before any other operation.
    pub fn new(device: D) -> Self {
        Acfs { device, state: None }
    }

    fn mounted(&self) -> Result<&Mounted> {
        self.state.as_ref().ok_or(AcfsError::NotInitialized)
    }

    fn mounted_mut(&mut self) -> Result<&mut Mounted> {
        self.state.as_mut().ok_or(AcfsError::NotInitialized)
    }

    fn sys_region_size(header: &Header) -> usize {
        header.sys_clusters as usize * header.cluster_size as usize
    }

    fn cluster_addr(header: &Header, cluster: u16) -> u32 {
        cluster as u32 * header.cluster_size as u32
    }

    fn persist(&mut self) -> Result<()> {
        let state = self.state.as_mut().ok_or(AcfsError::NotInitialized)?;
        state.header.save(&mut self.device)?;
        directory::save(
            &mut self.device,
            Self::sys_region_size(&state.header),
            &state.entries,
        )
    }

    /// Computes `total_clusters`/`sys_clusters`, zeroes the system region,
    /// and writes a fresh header. Valid whether or not the instance is
    /// currently mounted; on success the instance ends up mounted onto the
    /// freshly-formatted filesystem.
    pub fn format(&mut self, config: Config) -> Result<()> {
        validate_cluster_size(config.cluster_size)?;

        let total_clusters_u32 = self.device.size() / config.cluster_size as u32;
        if total_clusters_u32 == 0 || total_clusters_u32 > u16::MAX as u32 {
            return Err(AcfsError::InvalidParam);
        }
        let total_clusters = total_clusters_u32 as u16;

        let header_clusters = (crate::header::HEADER_SIZE as u16).div_ceil(config.cluster_size);
        let sys_clusters = config
            .reserved_clusters
            .max(header_clusters)
            .max(2);
        if sys_clusters >= total_clusters {
            return Err(AcfsError::InvalidParam);
        }

        let mut header = Header::new(config.cluster_size, total_clusters, sys_clusters);
        let sys_region = sys_clusters as usize * config.cluster_size as usize;
        let zeros = vec![0u8; sys_region - crate::header::HEADER_SIZE];
        self.device
            .write(crate::header::HEADER_SIZE as u32, &zeros)?;
        header.save(&mut self.device)?;

        let max_entries = directory::max_entries(sys_clusters, config.cluster_size);
        let bitmap = ClusterBitmap::rebuild(total_clusters, sys_clusters, &[]);

        debug!(
            "formatted device: {} clusters of {} bytes, {} reserved for system region",
            total_clusters, config.cluster_size, sys_clusters
        );

        self.state = Some(Mounted {
            header,
            entries: Vec::new(),
            bitmap,
            config,
            max_entries,
        });
        Ok(())
    }

    /// Loads existing on-media state, or formats fresh state when the
    /// header is absent, corrupt, or from an incompatible `cluster_size`
    /// and `config.format_if_invalid` is set.
    pub fn mount(&mut self, config: Config) -> Result<()> {
        if self.state.is_some() {
            return Err(AcfsError::AlreadyInitialized);
        }
        validate_cluster_size(config.cluster_size)?;

        let load_result = Header::load(&mut self.device);
        let needs_format = match &load_result {
            Ok(header) => header.cluster_size != config.cluster_size,
            Err(_) => true,
        };

        if needs_format {
            if !config.format_if_invalid {
                // A loaded header with a mismatched cluster_size is the
                // only case that maps to InvalidFilesystem here; a load
                // failure propagates its own specific cause (DataCorrupted
                // on a bad header CRC, IoError on a device failure) rather
                // than being collapsed into InvalidFilesystem.
                return match load_result {
                    Ok(_) => Err(AcfsError::InvalidFilesystem),
                    Err(err) => Err(err),
                };
            }
            return self.format(config);
        }

        let header = load_result?;
        let max_entries = directory::max_entries(header.sys_clusters, header.cluster_size);
        let entries = directory::load(&mut self.device, header.data_entries)?;
        let bitmap = ClusterBitmap::rebuild(header.total_clusters, header.sys_clusters, &entries);

        debug!("mounted existing filesystem: {} live entries", entries.len());

        self.state = Some(Mounted {
            header,
            entries,
            bitmap,
            config,
            max_entries,
        });
        Ok(())
    }

    /// Drops the in-memory mount state and hands the device back to the
    /// caller. Nothing further is persisted; any unflushed mutation would
    /// already have been persisted by the operation that made it (writes
    /// and deletes always persist before returning).
    pub fn unmount(self) -> D {
        self.device
    }

    fn clusters_needed(cluster_size: u16, n: u32) -> u16 {
        n.div_ceil(cluster_size as u32) as u16
    }

    fn find_entry_index(entries: &[Entry], id: &[u8]) -> Option<usize> {
        entries.iter().position(|e| e.valid && e.id_matches(id))
    }

    /// Creates or overwrites the blob stored under `id`.
    pub fn write(&mut self, id: &[u8], bytes: &[u8]) -> Result<()> {
        if id.is_empty() || id.len() > MAX_ID_LEN || bytes.is_empty() {
            return Err(AcfsError::InvalidParam);
        }
        let state = self.mounted_mut()?;
        let k = Self::clusters_needed(state.header.cluster_size, bytes.len() as u32);

        let existing = Self::find_entry_index(&state.entries, id);
        let entry_index = match existing {
            Some(idx) => {
                if state.entries[idx].clusters.len() as u16 != k {
                    let freed = std::mem::take(&mut state.entries[idx].clusters);
                    state.bitmap.free(&freed);
                    state.header.free_clusters += freed.len() as u16;

                    let new_clusters = state.bitmap.allocate(
                        state.header.sys_clusters,
                        state.header.total_clusters,
                        k,
                    )?;
                    state.header.free_clusters -= k;
                    state.entries[idx].clusters = new_clusters;
                }
                idx
            }
            None => {
                if state.entries.len() >= state.max_entries {
                    return Err(AcfsError::ClusterFull);
                }
                let clusters = state.bitmap.allocate(
                    state.header.sys_clusters,
                    state.header.total_clusters,
                    k,
                )?;
                state.header.free_clusters -= k;
                state.entries.push(Entry::new(id, clusters));
                state.header.data_entries = state.entries.len() as u16;
                state.entries.len() - 1
            }
        };

        let cluster_size = state.header.cluster_size;
        let clusters = state.entries[entry_index].clusters.clone();
        let mut offset = 0usize;
        for &cluster in &clusters {
            let mut block = vec![0u8; cluster_size as usize];
            let take = (bytes.len() - offset).min(cluster_size as usize);
            block[..take].copy_from_slice(&bytes[offset..offset + take]);
            offset += take;
            let addr = Self::cluster_addr(&state.header, cluster);
            self.device.write(addr, &block)?;
        }

        let state = self.mounted_mut()?;
        state.entries[entry_index].data_size = bytes.len() as u32;
        state.entries[entry_index].crc32 = crate::crc::crc32(bytes);
        state.entries[entry_index].valid = true;

        self.persist()
    }

    /// Reads the blob stored under `id` into `buf`, returning the number
    /// of bytes the stored blob actually occupies.
    ///
    /// If `buf` is too small, returns [`ReadError::BufferTooSmall`]
    /// carrying the stored payload's actual size without copying
    /// anything, so the caller can resize and retry without a separate
    /// [`get_size`](Self::get_size) call.
    pub fn read(&mut self, id: &[u8], buf: &mut [u8]) -> std::result::Result<u32, ReadError> {
        let state = self.mounted()?;
        let idx = Self::find_entry_index(&state.entries, id).ok_or(AcfsError::DataNotFound)?;
        let entry = &state.entries[idx];
        if (buf.len() as u32) < entry.data_size {
            return Err(ReadError::BufferTooSmall {
                actual_size: entry.data_size,
            });
        }

        let data_size = entry.data_size;
        let crc_expected = entry.crc32;
        let check_crc = state.config.enable_crc_check;
        let cluster_size = state.header.cluster_size;
        let header = state.header;
        let clusters = entry.clusters.clone();

        let mut payload = Vec::with_capacity(clusters.len() * cluster_size as usize);
        for &cluster in &clusters {
            let mut block = vec![0u8; cluster_size as usize];
            let addr = Self::cluster_addr(&header, cluster);
            self.device.read(addr, &mut block)?;
            payload.extend_from_slice(&block);
        }
        payload.truncate(data_size as usize);

        if check_crc {
            let actual_crc = crate::crc::crc32(&payload);
            if actual_crc != crc_expected {
                warn!("crc mismatch reading entry");
                return Err(AcfsError::CrcMismatch.into());
            }
        }

        buf[..payload.len()].copy_from_slice(&payload);
        Ok(data_size)
    }

    /// Removes the blob stored under `id`, freeing its clusters and
    /// compacting the directory so live entries stay in `[0, data_entries)`.
    pub fn delete(&mut self, id: &[u8]) -> Result<()> {
        let state = self.mounted_mut()?;
        let idx = Self::find_entry_index(&state.entries, id).ok_or(AcfsError::DataNotFound)?;

        let removed = state.entries.remove(idx);
        state.bitmap.free(&removed.clusters);
        state.header.free_clusters += removed.clusters.len() as u16;
        state.header.data_entries = state.entries.len() as u16;

        self.persist()
    }

    pub fn exists(&self, id: &[u8]) -> Result<bool> {
        let state = self.mounted()?;
        Ok(Self::find_entry_index(&state.entries, id).is_some())
    }

    pub fn get_size(&self, id: &[u8]) -> Result<u32> {
        let state = self.mounted()?;
        let idx = Self::find_entry_index(&state.entries, id).ok_or(AcfsError::DataNotFound)?;
        Ok(state.entries[idx].data_size)
    }

    pub fn get_free_space(&self) -> Result<u32> {
        let state = self.mounted()?;
        Ok(state.header.free_clusters as u32 * state.header.cluster_size as u32)
    }

    pub fn get_stats(&self) -> Result<Stats> {
        let state = self.mounted()?;
        let data_region_clusters = state.header.total_clusters - state.header.sys_clusters;
        let total = data_region_clusters as u32 * state.header.cluster_size as u32;
        let free = state.header.free_clusters as u32 * state.header.cluster_size as u32;
        Ok(Stats {
            total,
            used: total - free,
            free,
            data_count: state.header.data_entries,
        })
    }

    /// Reads every valid entry's payload back and recomputes its CRC,
    /// returning `DataCorrupted` on the first mismatch.
    pub fn check_integrity(&mut self) -> Result<()> {
        let state = self.mounted()?;
        let ids: Vec<_> = state.entries.iter().map(|e| e.id).collect();
        for id in ids {
            let state = self.mounted()?;
            let idx = Self::find_entry_index(&state.entries, &id).unwrap();
            let cluster_size = state.header.cluster_size;
            let data_size = state.entries[idx].data_size;
            let crc_expected = state.entries[idx].crc32;
            let header = state.header;
            let clusters = state.entries[idx].clusters.clone();

            let mut payload = Vec::with_capacity(clusters.len() * cluster_size as usize);
            for &cluster in &clusters {
                let addr = Self::cluster_addr(&header, cluster);
                let mut block = vec![0u8; cluster_size as usize];
                self.device.read(addr, &mut block)?;
                payload.extend_from_slice(&block);
            }
            payload.truncate(data_size as usize);
            if crate::crc::crc32(&payload) != crc_expected {
                return Err(AcfsError::DataCorrupted);
            }
        }
        Ok(())
    }

    /// Consolidates every entry's clusters into the lowest available
    /// indices. Because entries are processed in directory order and each
    /// entry's old clusters are freed before its replacement is allocated
    /// (ascending first-fit), the result is fully compacted with no gaps
    /// between live entries' cluster ranges.
    pub fn defragment(&mut self) -> Result<()> {
        let state = self.mounted()?;
        let count = state.entries.len();
        for i in 0..count {
            let state = self.mounted()?;
            let cluster_size = state.header.cluster_size;
            let data_size = state.entries[i].data_size;
            let header = state.header;
            let old_clusters = state.entries[i].clusters.clone();
            let k = old_clusters.len() as u16;

            let mut payload = Vec::with_capacity(old_clusters.len() * cluster_size as usize);
            for &cluster in &old_clusters {
                let addr = Self::cluster_addr(&header, cluster);
                let mut block = vec![0u8; cluster_size as usize];
                self.device.read(addr, &mut block)?;
                payload.extend_from_slice(&block);
            }
            payload.truncate(data_size as usize);

            let state = self.mounted_mut()?;
            state.bitmap.free(&old_clusters);
            let new_clusters =
                state
                    .bitmap
                    .allocate(state.header.sys_clusters, state.header.total_clusters, k)?;
            state.entries[i].clusters = new_clusters.clone();

            let header = state.header;
            let mut offset = 0usize;
            for &cluster in &new_clusters {
                let mut block = vec![0u8; cluster_size as usize];
                let take = (payload.len() - offset).min(cluster_size as usize);
                block[..take].copy_from_slice(&payload[offset..offset + take]);
                offset += take;
                let addr = Self::cluster_addr(&header, cluster);
                self.device.write(addr, &block)?;
            }
        }
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    fn fresh(size: u32, cluster_size: u16, reserved: u16) -> Acfs<MemoryDevice> {
        let mut fs = Acfs::new(MemoryDevice::eeprom(size));
        fs.mount(Config {
            cluster_size,
            reserved_clusters: reserved,
            format_if_invalid: true,
            enable_crc_check: true,
        })
        .unwrap();
        fs
    }

    #[test]
    fn scenario_format_and_stat_empty() {
        let fs = fresh(64 * 1024, 256, 4);
        let stats = fs.get_stats().unwrap();
        assert_eq!(stats.total, 64512);
        assert_eq!(stats.used, 0);
        assert_eq!(stats.free, 64512);
        assert_eq!(stats.data_count, 0);
    }

    #[test]
    fn scenario_write_read_basic() {
        let mut fs = fresh(64 * 1024, 256, 4);
        let payload = b"Hello, ACFS! This is test data 1.\0";
        fs.write(b"test1", payload).unwrap();

        let mut buf = [0u8; 256];
        let actual = fs.read(b"test1", &mut buf).unwrap();
        assert_eq!(actual as usize, payload.len());
        assert_eq!(&buf[..payload.len()], payload.as_slice());
    }

    #[test]
    fn scenario_rewrite_shrinking_frees_clusters() {
        let mut fs = fresh(64 * 1024, 256, 4);
        let big = vec![0xAAu8; 600];
        fs.write(b"k", &big).unwrap();
        let free_before = fs.get_free_space().unwrap();

        let small = vec![0xBBu8; 100];
        fs.write(b"k", &small).unwrap();
        let free_after = fs.get_free_space().unwrap();

        assert_eq!(free_after - free_before, 2 * 256);

        let mut buf = [0u8; 256];
        let actual = fs.read(b"k", &mut buf).unwrap();
        assert_eq!(actual, 100);
        assert_eq!(&buf[..100], small.as_slice());
    }

    #[test]
    fn scenario_delete_compacts_directory() {
        let mut fs = fresh(64 * 1024, 256, 4);
        fs.write(b"a", b"a-data").unwrap();
        fs.write(b"b", b"b-data").unwrap();
        fs.write(b"c", b"c-data").unwrap();

        fs.delete(b"b").unwrap();

        assert!(fs.exists(b"a").unwrap());
        assert!(!fs.exists(b"b").unwrap());
        assert!(fs.exists(b"c").unwrap());
        assert_eq!(fs.get_stats().unwrap().data_count, 2);
    }

    #[test]
    fn scenario_undersized_read_buffer() {
        let mut fs = fresh(64 * 1024, 256, 4);
        let payload = vec![0x11u8; 50];
        fs.write(b"x", &payload).unwrap();

        assert_eq!(fs.get_size(b"x").unwrap(), 50);
        let mut buf = [0u8; 32];
        assert_eq!(
            fs.read(b"x", &mut buf),
            Err(ReadError::BufferTooSmall { actual_size: 50 })
        );
    }

    #[test]
    fn scenario_integrity_detects_corruption() {
        let mut fs = fresh(64 * 1024, 256, 4);
        let payload = vec![0x42u8; 40];
        fs.write(b"x", &payload).unwrap();

        // out-of-band corruption: flip a byte in the payload's first cluster
        fs.device.write(4 * 256, &[0x00]).unwrap();

        assert_eq!(fs.check_integrity(), Err(AcfsError::DataCorrupted));
        let mut buf = [0u8; 64];
        assert_eq!(fs.read(b"x", &mut buf), Err(AcfsError::CrcMismatch.into()));
    }

    #[test]
    fn round_trip_property() {
        let mut fs = fresh(64 * 1024, 256, 4);
        let payload = vec![7u8; 513];
        fs.write(b"rt", &payload).unwrap();
        let mut buf = vec![0u8; 513];
        let actual = fs.read(b"rt", &mut buf).unwrap();
        assert_eq!(actual as usize, payload.len());
        assert_eq!(buf, payload);
    }

    #[test]
    fn idempotent_rewrite() {
        let mut fs = fresh(64 * 1024, 256, 4);
        let payload = vec![9u8; 100];
        fs.write(b"id", &payload).unwrap();
        fs.write(b"id", &payload).unwrap();
        let mut buf = vec![0u8; 100];
        fs.read(b"id", &mut buf).unwrap();
        assert_eq!(buf, payload);
    }

    #[test]
    fn delete_reclaims_free_space_modulo_cluster_granularity() {
        let mut fs = fresh(64 * 1024, 256, 4);
        let free_before = fs.get_free_space().unwrap();
        fs.write(b"a", &vec![1u8; 300]).unwrap();
        fs.delete(b"a").unwrap();
        assert_eq!(fs.get_free_space().unwrap(), free_before);
    }

    #[test]
    fn persistence_across_remount() {
        let mut dev = MemoryDevice::eeprom(64 * 1024);
        {
            let mut fs = Acfs::new(&mut dev);
            fs.mount(Config::default()).unwrap();
            fs.write(b"durable", b"still here").unwrap();
            fs.unmount();
        }
        let mut fs = Acfs::new(&mut dev);
        fs.mount(Config {
            format_if_invalid: false,
            ..Config::default()
        })
        .unwrap();
        let mut buf = [0u8; 32];
        let actual = fs.read(b"durable", &mut buf).unwrap();
        assert_eq!(&buf[..actual as usize], b"still here");
    }

    #[test]
    fn header_crc_corruption_is_detected_on_mount() {
        let mut dev = MemoryDevice::eeprom(64 * 1024);
        {
            let mut fs = Acfs::new(&mut dev);
            fs.format(Config::default()).unwrap();
        }
        // flip a header byte outside the CRC field
        let mut byte = [0u8; 1];
        dev.read(6, &mut byte).unwrap();
        byte[0] ^= 0x01;
        dev.write(6, &byte).unwrap();

        let mut fs = Acfs::new(&mut dev);
        let result = fs.mount(Config {
            format_if_invalid: false,
            ..Config::default()
        });
        assert_eq!(result, Err(AcfsError::DataCorrupted));
    }

    #[test]
    fn bad_magic_is_reported_as_invalid_filesystem_on_mount() {
        let mut dev = MemoryDevice::eeprom(64 * 1024);
        {
            let mut fs = Acfs::new(&mut dev);
            fs.format(Config::default()).unwrap();
        }
        let mut first_word = [0u8; 4];
        dev.read(0, &mut first_word).unwrap();
        first_word[0] ^= 0xFF;
        dev.write(0, &first_word).unwrap();

        let mut fs = Acfs::new(&mut dev);
        let result = fs.mount(Config {
            format_if_invalid: false,
            ..Config::default()
        });
        assert_eq!(result, Err(AcfsError::InvalidFilesystem));
    }

    #[test]
    fn device_too_small_for_a_header_is_reported_as_io_error_on_mount() {
        // A device smaller than the header itself can't even be read at
        // offset 0, so Header::load fails with IoError rather than any
        // header-content-based error.
        let mut fs = Acfs::new(MemoryDevice::eeprom(4));
        let result = fs.mount(Config {
            format_if_invalid: false,
            ..Config::default()
        });
        assert_eq!(result, Err(AcfsError::IoError));
    }

    #[test]
    fn rejects_non_power_of_two_or_out_of_range_cluster_sizes() {
        let mut fs = Acfs::new(MemoryDevice::eeprom(64 * 1024));
        assert_eq!(
            fs.mount(Config { cluster_size: 100, ..Config::default() }),
            Err(AcfsError::InvalidParam)
        );
        assert_eq!(
            fs.mount(Config { cluster_size: 32, ..Config::default() }),
            Err(AcfsError::InvalidParam)
        );
        assert_eq!(
            fs.mount(Config { cluster_size: 8192, ..Config::default() }),
            Err(AcfsError::InvalidParam)
        );
    }

    #[test]
    fn operations_before_mount_return_not_initialized() {
        let fs = Acfs::new(MemoryDevice::eeprom(4096));
        assert_eq!(fs.exists(b"x"), Err(AcfsError::NotInitialized));
    }

    #[test]
    fn double_mount_returns_already_initialized() {
        let mut fs = fresh(64 * 1024, 256, 4);
        assert_eq!(
            fs.mount(Config::default()),
            Err(AcfsError::AlreadyInitialized)
        );
    }

    #[test]
    fn unmount_consumes_the_instance_and_returns_the_device() {
        let fs = fresh(64 * 1024, 256, 4);
        let mut device = fs.unmount();
        // the caller owns the device again and can, e.g., remount it.
        let mut fs = Acfs::new(&mut device);
        fs.mount(Config {
            format_if_invalid: false,
            ..Config::default()
        })
        .unwrap();
    }

    #[test]
    fn defragment_preserves_payloads() {
        let mut fs = fresh(64 * 1024, 256, 4);
        fs.write(b"a", &vec![1u8; 300]).unwrap();
        fs.write(b"b", &vec![2u8; 100]).unwrap();
        fs.write(b"c", &vec![3u8; 500]).unwrap();
        fs.delete(b"b").unwrap();

        fs.defragment().unwrap();

        let mut buf = vec![0u8; 500];
        assert_eq!(fs.read(b"a", &mut buf[..300]).unwrap(), 300);
        assert_eq!(&buf[..300], vec![1u8; 300].as_slice());
        assert_eq!(fs.read(b"c", &mut buf).unwrap(), 500);
        assert_eq!(&buf[..500], vec![3u8; 500].as_slice());
    }
}
