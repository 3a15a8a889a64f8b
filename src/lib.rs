//! A lightweight key/value filesystem for small, byte-addressable
//! persistent media — EEPROM, NOR flash, battery-backed RAM.
//!
//! ACFS stores a flat set of named binary blobs on a single storage
//! region, providing create/update/read/delete by identifier, with CRC32
//! integrity on both metadata and payloads. It does not model
//! hierarchical paths, concurrent writers, journaling, or wear-leveling —
//! see [`Acfs`] for the operations it does provide.
//!
//! ```
//! use acfs::{Acfs, Config, MemoryDevice};
//!
//! let mut fs = Acfs::new(MemoryDevice::eeprom(64 * 1024));
//! fs.mount(Config::default()).unwrap();
//! fs.write(b"greeting", b"hello").unwrap();
//!
//! let mut buf = [0u8; 16];
//! let len = fs.read(b"greeting", &mut buf).unwrap();
//! assert_eq!(&buf[..len as usize], b"hello");
//! ```

mod bitmap;
mod config;
mod crc;
mod device;
mod directory;
mod engine;
mod error;
mod header;

pub use config::Config;
pub use device::{FlashDevice, MediumKind, MemoryDevice, StorageDevice};
pub use engine::{Acfs, Stats};
pub use error::{AcfsError, ReadError, Result};
