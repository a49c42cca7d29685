use super::{
    error::{FsError, FsResult},
    image::{DriveImage, Store},
    types::{self, DriveHeader, FileAttr, Slot, VolumeStats},
    util, DATA_CAPACITY, SLOT_COUNT,
};
use log::debug;
use memmap::MmapMut;
use std::{
    path::Path,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// Slot index identifying an open file.
pub type Handle = usize;

#[derive(Debug)]
struct Volume<S: Store> {
    header: DriveHeader,
    slots: Vec<Slot>,
    image: DriveImage<S>,
}

impl<S: Store> Volume<S> {
    fn find(&self, name: &str) -> Option<Handle> {
        self.slots.iter().position(|s| s.has_name(name))
    }

    fn occupied(&self, handle: Handle) -> FsResult<&Slot> {
        match self.slots.get(handle) {
            Some(slot) if !slot.is_free() => Ok(slot),
            _ => Err(FsError::InvalidHandle(handle)),
        }
    }

    /// Writes `slot` through to the image, then installs it in the table.
    fn commit_slot(&mut self, handle: Handle, slot: Slot) -> FsResult<()> {
        self.image.persist_slot(handle, &slot)?;
        self.slots[handle] = slot;
        Ok(())
    }

    /// Slot first, header second: the slot table is the commit point and a
    /// stale free count is repaired on the next load.
    fn commit_transition(
        &mut self,
        handle: Handle,
        slot: Slot,
        header: DriveHeader,
    ) -> FsResult<()> {
        self.image.persist_slot(handle, &slot)?;
        self.image.persist_header(&header)?;
        self.slots[handle] = slot;
        self.header = header;
        Ok(())
    }
}

/// The operation surface a user-space driver calls into.
///
/// One readers-writer lock guards the header, the slot table and the
/// backing store. Mutations are flushed before they return.
#[derive(Debug)]
pub struct FilesystemManager<S: Store = MmapMut> {
    volume: RwLock<Volume<S>>,
}

impl FilesystemManager<MmapMut> {
    pub fn new<P>(image_path: P) -> FsResult<Self>
    where
        P: AsRef<Path>,
    {
        Self::load(DriveImage::open(image_path)?)
    }
}

impl<S: Store> FilesystemManager<S> {
    pub fn load(mut image: DriveImage<S>) -> FsResult<Self> {
        let (header, slots) = image.load()?;
        Ok(Self {
            volume: RwLock::new(Volume {
                header,
                slots,
                image,
            }),
        })
    }

    pub fn getattr(&self, name: &str) -> FsResult<FileAttr> {
        let volume = self.read_lock()?;
        let handle = volume
            .find(name)
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;

        Ok(volume.slots[handle].attr())
    }

    /// Attributes of the file behind an open handle.
    pub fn attr_of(&self, handle: Handle) -> FsResult<FileAttr> {
        Ok(self.read_lock()?.occupied(handle)?.attr())
    }

    /// Names of occupied slots in slot-index order.
    pub fn readdir(&self) -> FsResult<Vec<String>> {
        let volume = self.read_lock()?;
        Ok(volume
            .slots
            .iter()
            .filter(|s| !s.is_free())
            .map(Slot::name)
            .collect())
    }

    /// Resolves `name` to its slot index. No state is attached to the handle.
    pub fn open(&self, name: &str) -> FsResult<Handle> {
        self.read_lock()?
            .find(name)
            .ok_or_else(|| FsError::NotFound(name.to_string()))
    }

    /// Copies up to `buf.len()` bytes starting at `offset`, never past the
    /// end of the file. Returns the number of bytes copied.
    pub fn read(&self, handle: Handle, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let volume = self.read_lock()?;
        let contents = volume.occupied(handle)?.contents();
        if offset >= contents.len() as u64 {
            return Ok(0);
        }

        let offset = offset as usize;
        let n = buf.len().min(contents.len() - offset);
        buf[..n].copy_from_slice(&contents[offset..offset + n]);
        Ok(n)
    }

    /// Writes all of `buf` at `offset` or nothing at all. The file grows to
    /// `offset + buf.len()` even when `buf` is empty.
    pub fn write(&self, handle: Handle, offset: u64, buf: &[u8]) -> FsResult<usize> {
        let mut volume = self.write_lock()?;
        let current = volume.occupied(handle)?;

        let end = check_capacity(offset, buf.len() as u64)?;
        let offset = offset as usize;
        let mut slot = current.clone();
        let size = slot.size();
        if offset > size {
            slot.data[size..offset].fill(0);
        }
        slot.data[offset..end].copy_from_slice(buf);
        slot.meta.file_size = size.max(end) as u16;

        volume.commit_slot(handle, slot)?;
        debug!("wrote {} bytes at {} to slot {}", buf.len(), offset, handle);
        Ok(buf.len())
    }

    /// Sets the file length, zero-filling when it grows.
    pub fn truncate(&self, handle: Handle, size: u64) -> FsResult<()> {
        let mut volume = self.write_lock()?;
        let mut slot = volume.occupied(handle)?.clone();

        let new_size = check_capacity(size, 0)?;
        let old_size = slot.size();
        if new_size > old_size {
            slot.data[old_size..new_size].fill(0);
        }
        slot.meta.file_size = new_size as u16;

        volume.commit_slot(handle, slot)?;
        debug!("truncated slot {} to {} bytes", handle, new_size);
        Ok(())
    }

    /// Occupies the lowest-index free slot with an empty file.
    ///
    /// If the slot reaches the image but the header write fails, the error is
    /// returned while the file is already on disk; it shows up after the
    /// next load, which also repairs the free count.
    pub fn create(&self, name: &str, owner: &str) -> FsResult<Handle> {
        types::validate_name(name)?;
        types::validate_owner(owner)?;

        let mut volume = self.write_lock()?;
        if volume.find(name).is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }
        if volume.header.free_count == 0 {
            return Err(FsError::NoSpace);
        }

        let handle = volume
            .slots
            .iter()
            .position(Slot::is_free)
            .ok_or(FsError::NoSpace)?;

        let mut header = volume.header;
        header.free_count -= 1;
        volume.commit_transition(handle, Slot::occupied(name, owner, util::now()), header)?;

        debug!("created {:?} for {:?} in slot {}", name, owner, handle);
        Ok(handle)
    }

    /// Frees the slot holding `name` and zeroes its contents.
    ///
    /// As with `create`, a failed header write after the slot write leaves
    /// the file removed on disk.
    pub fn unlink(&self, name: &str) -> FsResult<()> {
        let mut volume = self.write_lock()?;
        let handle = volume
            .find(name)
            .ok_or_else(|| FsError::NotFound(name.to_string()))?;

        let mut header = volume.header;
        header.free_count += 1;
        volume.commit_transition(handle, Slot::default(), header)?;

        debug!("unlinked {:?} from slot {}", name, handle);
        Ok(())
    }

    pub fn statfs(&self) -> FsResult<VolumeStats> {
        let volume = self.read_lock()?;
        Ok(VolumeStats {
            volume_name: volume.header.volume_name(),
            file_capacity: volume.header.file_capacity as usize,
            free_count: volume.header.free_count as usize,
            data_capacity: SLOT_COUNT * DATA_CAPACITY,
            used_bytes: volume.slots.iter().map(Slot::size).sum(),
        })
    }

    /// Releases the lock and hands back the backing store.
    pub fn unmount(self) -> FsResult<S> {
        let volume = self.volume.into_inner().map_err(|_| FsError::LockPoisoned)?;
        Ok(volume.image.into_inner())
    }

    fn read_lock(&self) -> FsResult<RwLockReadGuard<'_, Volume<S>>> {
        self.volume.read().map_err(|_| FsError::LockPoisoned)
    }

    fn write_lock(&self) -> FsResult<RwLockWriteGuard<'_, Volume<S>>> {
        self.volume.write().map_err(|_| FsError::LockPoisoned)
    }
}

/// `offset + len` as a data index, if it fits the per-file capacity.
fn check_capacity(offset: u64, len: u64) -> FsResult<usize> {
    match offset.checked_add(len) {
        Some(end) if end <= DATA_CAPACITY as u64 => Ok(end as usize),
        _ => Err(FsError::CapacityExceeded { offset, len }),
    }
}
