//! Path-level glue a user-space filesystem driver puts on top of the manager.
//!
//! The kernel transport is not linked here; a binding forwards its callbacks
//! to [`Driver`] and hands back the errno values it returns.

use crate::s64::{FileAttr, FilesystemManager, FsError, Handle, Store, VolumeStats};
use nix::{errno::Errno, sys::stat::SFlag};
use std::path::{Component, Path};

pub type Result<T> = std::result::Result<T, Errno>;

const ROOT_INODE: u64 = 1;

/// Reduces `path` to its single name component. The root has no name.
pub fn name_from_path(path: &Path) -> Result<Option<&str>> {
    let mut names = path.components().filter_map(|c| match c {
        Component::Normal(name) => Some(name),
        _ => None,
    });

    let name = match names.next() {
        Some(name) => name,
        None => return Ok(None),
    };
    if names.next().is_some() {
        return Err(Errno::ENOENT);
    }

    name.to_str().map(Some).ok_or(Errno::EINVAL)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub size: u64,
    pub birthtime: u64,
}

impl FileStat {
    pub fn root(stats: &VolumeStats) -> Self {
        Self {
            ino: ROOT_INODE,
            mode: SFlag::S_IFDIR.bits() as u32 | 0o755,
            nlink: 2,
            size: stats.file_capacity as u64,
            birthtime: 0,
        }
    }

    /// Write permission goes to the recorded owner only.
    pub fn file(handle: Handle, attr: &FileAttr, caller: &str) -> Self {
        let perm = if attr.owner == caller { 0o644 } else { 0o444 };
        Self {
            ino: ROOT_INODE + 1 + handle as u64,
            mode: SFlag::S_IFREG.bits() as u32 | perm,
            nlink: 1,
            size: attr.size as u64,
            birthtime: attr.created_at().unwrap_or(0),
        }
    }
}

#[derive(Debug)]
pub struct Driver<S: Store> {
    fs: FilesystemManager<S>,
}

impl<S: Store> Driver<S> {
    pub fn new(fs: FilesystemManager<S>) -> Self {
        Self { fs }
    }

    pub fn manager(&self) -> &FilesystemManager<S> {
        &self.fs
    }

    pub fn metadata(&self, path: &Path, caller: &str) -> Result<FileStat> {
        match name_from_path(path)? {
            None => Ok(FileStat::root(&self.fs.statfs().map_err(errno)?)),
            Some(name) => {
                let handle = self.fs.open(name).map_err(errno)?;
                let attr = self.fs.attr_of(handle).map_err(errno)?;
                Ok(FileStat::file(handle, &attr, caller))
            }
        }
    }

    pub fn read_dir(&self, path: &Path) -> Result<Vec<String>> {
        match name_from_path(path)? {
            None => {
                let mut entries = vec![".".to_string(), "..".to_string()];
                entries.extend(self.fs.readdir().map_err(errno)?);
                Ok(entries)
            }
            Some(_) => Err(Errno::ENOTDIR),
        }
    }

    pub fn open(&self, path: &Path) -> Result<Handle> {
        let name = name_from_path(path)?.ok_or(Errno::EISDIR)?;
        self.fs.open(name).map_err(errno)
    }

    pub fn create(&self, path: &Path, owner: &str) -> Result<Handle> {
        let name = name_from_path(path)?.ok_or(Errno::EEXIST)?;
        self.fs.create(name, owner).map_err(errno)
    }

    pub fn read(&self, handle: Handle, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.fs.read(handle, offset, buf).map_err(errno)
    }

    pub fn write(&self, handle: Handle, offset: u64, buf: &[u8]) -> Result<usize> {
        self.fs.write(handle, offset, buf).map_err(errno)
    }

    pub fn truncate(&self, path: &Path, size: u64) -> Result<()> {
        let handle = self.open(path)?;
        self.fs.truncate(handle, size).map_err(errno)
    }

    pub fn unlink(&self, path: &Path) -> Result<()> {
        let name = name_from_path(path)?.ok_or(Errno::EISDIR)?;
        self.fs.unlink(name).map_err(errno)
    }

    pub fn statfs(&self) -> Result<VolumeStats> {
        self.fs.statfs().map_err(errno)
    }
}

fn errno(err: FsError) -> Errno {
    log::debug!("{}", err);
    err.errno()
}
