//! CRC32 (zlib/IEEE 802.3 variant: poly 0xEDB88320 reflected, init/xorout
//! 0xFFFFFFFF) used for both header self-check and payload integrity.
//!
//! `crc32fast` implements exactly this algorithm (it's the one used by
//! zlib, gzip and Ethernet FCS), so there is no reason to hand-roll a
//! table here.

/// Computes the CRC32 of a contiguous byte range. Callers are responsible
/// for excluding any trailing CRC field from `data` themselves.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // Standard CRC-32/ISO-HDLC check value for the ASCII string "123456789".
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn empty_input() {
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn single_byte_flip_changes_checksum() {
        let a = crc32(b"hello, acfs");
        let b = crc32(b"hello, Acfs");
        assert_ne!(a, b);
    }
}
