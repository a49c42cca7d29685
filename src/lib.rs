//! S64FFS: a flat file system of 64 fixed-size slots stored in one image.
//!
//! - [`s64`]: on-disk layout, codec and the [`FilesystemManager`]
//! - [`driver`]: path and errno glue for a user-space filesystem driver
//! - [`mkfs`]: creates empty images

pub mod driver;
pub mod mkfs;
pub mod s64;

pub use s64::{FilesystemManager, FsError, FsResult, Handle};
