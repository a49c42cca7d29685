pub mod error;
pub mod fs;
pub mod image;
pub mod types;
pub mod util;

pub use error::{FsError, FsResult};
pub use fs::{FilesystemManager, Handle};
pub use image::{DriveImage, Store};
pub use types::{DriveHeader, FileAttr, Slot, SlotMeta, VolumeStats};

pub const HEADER_SIZE: u64 = 32;
pub const SLOT_SIZE: u64 = 1024;
pub const SLOT_COUNT: usize = 64;
pub const IMAGE_SIZE: u64 = HEADER_SIZE + SLOT_COUNT as u64 * SLOT_SIZE;

/// Per-file payload capacity in bytes.
pub const DATA_CAPACITY: usize = 960;

pub const VOLUME_NAME_LEN: usize = 30;
pub const FILE_NAME_LEN: usize = 32;
pub const OWNER_LEN: usize = 22;

/// First byte of `file_name` for an unoccupied slot.
pub const FREE_MARKER: u8 = 0;

/// Size of the serialized slot metadata that precedes the payload.
pub const SLOT_META_SIZE: u64 = SLOT_SIZE - DATA_CAPACITY as u64;
