//! Mount/format-time configuration, supplied programmatically by the host
//! — there is no config file or environment variable surface in the core.

/// Parameters controlling how `Acfs::mount` interprets and, if needed,
/// reformats a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Bytes per cluster. Must be a power of two in `[64, 4096]`.
    pub cluster_size: u16,
    /// Minimum number of system clusters to reserve for the superblock and
    /// directory; the actual count may be larger if the header alone
    /// wouldn't otherwise fit in one cluster.
    pub reserved_clusters: u16,
    /// If the on-device header is missing, corrupt, or was written with a
    /// different `cluster_size`, reformat instead of failing `mount`.
    pub format_if_invalid: bool,
    /// Verify payload CRC32 on every `read` and during `check_integrity`.
    /// Disabling this trades integrity detection for throughput on media
    /// where CRC recomputation is expensive; the header CRC is always
    /// checked regardless of this flag.
    pub enable_crc_check: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cluster_size: 256,
            reserved_clusters: 2,
            format_if_invalid: true,
            enable_crc_check: true,
        }
    }
}
