use super::{
    error::{FsError, FsResult},
    util, DATA_CAPACITY, FILE_NAME_LEN, FREE_MARKER, OWNER_LEN, SLOT_COUNT, VOLUME_NAME_LEN,
};
use serde::{Deserialize, Serialize};

/// Volume header, the first 32 bytes of the image.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveHeader {
    pub name: [u8; VOLUME_NAME_LEN],
    pub file_capacity: u8,
    pub free_count: u8,
}

impl DriveHeader {
    pub fn new(name: &str) -> FsResult<Self> {
        validate_volume_name(name)?;
        Ok(Self {
            name: util::to_fixed(name),
            file_capacity: SLOT_COUNT as u8,
            free_count: SLOT_COUNT as u8,
        })
    }

    pub fn volume_name(&self) -> String {
        util::from_fixed(&self.name)
    }

    pub fn is_terminated(&self) -> bool {
        self.name.contains(&0)
    }
}

/// Fixed-width metadata that precedes a slot's payload.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SlotMeta {
    pub file_name: [u8; FILE_NAME_LEN],
    pub file_size: u16,
    pub owner: [u8; OWNER_LEN],
    pub creation_date: u32,
    pub creation_time: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub meta: SlotMeta,
    pub data: [u8; DATA_CAPACITY],
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            meta: SlotMeta::default(),
            data: [0u8; DATA_CAPACITY],
        }
    }
}

impl Slot {
    /// A freshly created, empty file stamped with `secs`.
    pub fn occupied(name: &str, owner: &str, secs: u64) -> Self {
        let (creation_date, creation_time) = util::pack_timestamp(secs);
        Self {
            meta: SlotMeta {
                file_name: util::to_fixed(name),
                file_size: 0,
                owner: util::to_fixed(owner),
                creation_date,
                creation_time,
            },
            data: [0u8; DATA_CAPACITY],
        }
    }

    pub fn is_free(&self) -> bool {
        self.meta.file_name[0] == FREE_MARKER
    }

    pub fn name(&self) -> String {
        util::from_fixed(&self.meta.file_name)
    }

    pub fn has_name(&self, name: &str) -> bool {
        if self.is_free() {
            return false;
        }
        let end = self
            .meta
            .file_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FILE_NAME_LEN);
        &self.meta.file_name[..end] == name.as_bytes()
    }

    pub fn size(&self) -> usize {
        self.meta.file_size as usize
    }

    /// Valid bytes only; anything past `file_size` is stale.
    pub fn contents(&self) -> &[u8] {
        &self.data[..self.size()]
    }

    pub fn attr(&self) -> FileAttr {
        FileAttr {
            size: self.meta.file_size,
            owner: util::from_fixed(&self.meta.owner),
            creation_date: self.meta.creation_date,
            creation_time: self.meta.creation_time,
        }
    }
}

/// What `getattr` reports for an occupied slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttr {
    pub size: u16,
    pub owner: String,
    pub creation_date: u32,
    pub creation_time: u32,
}

impl FileAttr {
    /// Creation time in seconds since the Unix epoch, if the packed fields
    /// decode to a real date.
    pub fn created_at(&self) -> Option<u64> {
        util::unpack_timestamp(self.creation_date, self.creation_time)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeStats {
    pub volume_name: String,
    pub file_capacity: usize,
    pub free_count: usize,
    pub data_capacity: usize,
    pub used_bytes: usize,
}

pub fn validate_name(name: &str) -> FsResult<()> {
    let bytes = name.as_bytes();
    if bytes.is_empty()
        || bytes.len() >= FILE_NAME_LEN
        || bytes[0] == FREE_MARKER
        || bytes.iter().any(|&b| b == 0 || b == b'/')
    {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}

pub fn validate_owner(owner: &str) -> FsResult<()> {
    if owner.len() >= OWNER_LEN || owner.as_bytes().contains(&0) {
        return Err(FsError::InvalidOwner(owner.to_string()));
    }
    Ok(())
}

pub fn validate_volume_name(name: &str) -> FsResult<()> {
    let printable = name.bytes().all(|b| b.is_ascii_graphic() || b == b' ');
    if name.len() >= VOLUME_NAME_LEN || !printable {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}
