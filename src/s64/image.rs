//! Codec between the fixed on-disk layout and the in-memory slot table.
//!
//! Every `persist_*` call writes the record into the store and flushes the
//! touched byte range before returning.

use super::{
    error::{FsError, FsResult},
    types::{DriveHeader, Slot, SlotMeta},
    util, DATA_CAPACITY, HEADER_SIZE, IMAGE_SIZE, SLOT_COUNT, SLOT_SIZE,
};
use log::{info, warn};
use memmap::MmapMut;
use std::{
    fs::OpenOptions,
    io::{self, prelude::*, Cursor, SeekFrom},
    path::Path,
};

/// A byte-addressable backing store holding exactly one image.
pub trait Store: AsRef<[u8]> + AsMut<[u8]> {
    /// Makes `len` bytes starting at `offset` durable.
    fn flush_range(&mut self, offset: usize, len: usize) -> io::Result<()>;
}

impl Store for MmapMut {
    fn flush_range(&mut self, offset: usize, len: usize) -> io::Result<()> {
        MmapMut::flush_range(self, offset, len)
    }
}

impl Store for Vec<u8> {
    fn flush_range(&mut self, _offset: usize, _len: usize) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct DriveImage<S: Store> {
    store: S,
}

impl DriveImage<MmapMut> {
    /// Maps an existing image file read-write.
    pub fn open<P>(image_path: P) -> FsResult<Self>
    where
        P: AsRef<Path>,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(image_path.as_ref())?;
        let len = file.metadata()?.len();
        if len != IMAGE_SIZE {
            return Err(FsError::CorruptHeader(format!(
                "image is {} bytes, expected {}",
                len, IMAGE_SIZE
            )));
        }

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Self::new(mmap)
    }
}

impl<S: Store> DriveImage<S> {
    pub fn new(store: S) -> FsResult<Self> {
        let len = store.as_ref().len() as u64;
        if len != IMAGE_SIZE {
            return Err(FsError::CorruptHeader(format!(
                "image is {} bytes, expected {}",
                len, IMAGE_SIZE
            )));
        }

        Ok(Self { store })
    }

    /// Writes an empty volume: a fresh header and 64 zeroed slots.
    pub fn format(&mut self, header: &DriveHeader) -> FsResult<()> {
        self.store.as_mut().fill(0);
        {
            let mut cursor = Cursor::new(self.store.as_mut());
            bincode::serialize_into(&mut cursor, header)?;
        }
        self.store.flush_range(0, IMAGE_SIZE as usize)?;

        info!("formatted volume {:?}", header.volume_name());
        Ok(())
    }

    /// Decodes the header and the slot table.
    ///
    /// A `free_count` that disagrees with the slot table is recomputed from
    /// the slots and written back.
    pub fn load(&mut self) -> FsResult<(DriveHeader, Vec<Slot>)> {
        let mut cursor = Cursor::new(self.store.as_ref());
        let mut header: DriveHeader = bincode::deserialize_from(&mut cursor)?;

        if header.file_capacity as usize != SLOT_COUNT {
            return Err(FsError::CorruptHeader(format!(
                "file capacity is {}, expected {}",
                header.file_capacity, SLOT_COUNT
            )));
        }
        if !header.is_terminated() {
            return Err(FsError::CorruptHeader(
                "volume name is not terminated".to_string(),
            ));
        }

        let mut slots = Vec::with_capacity(SLOT_COUNT);
        for index in 0..SLOT_COUNT {
            cursor.seek(SeekFrom::Start(util::slot_offset(index)))?;
            let meta: SlotMeta = bincode::deserialize_from(&mut cursor)?;
            if meta.file_size as usize > DATA_CAPACITY {
                return Err(FsError::CorruptHeader(format!(
                    "slot {} claims {} bytes",
                    index, meta.file_size
                )));
            }
            if let Err(reason) = check_file_name(&meta.file_name) {
                return Err(FsError::CorruptHeader(format!("slot {} {}", index, reason)));
            }

            let mut slot = Slot {
                meta,
                ..Slot::default()
            };
            cursor.read_exact(&mut slot.data)?;
            slots.push(slot);
        }

        let free = slots.iter().filter(|s| s.is_free()).count();
        if header.free_count as usize != free {
            warn!(
                "free count {} disagrees with slot table ({} free), repairing",
                header.free_count, free
            );
            header.free_count = free as u8;
            self.persist_header(&header)?;
        }

        info!(
            "loaded volume {:?}: {} of {} slots free",
            header.volume_name(),
            header.free_count,
            SLOT_COUNT
        );
        Ok((header, slots))
    }

    pub fn persist_header(&mut self, header: &DriveHeader) -> FsResult<()> {
        {
            let mut cursor = Cursor::new(self.store.as_mut());
            bincode::serialize_into(&mut cursor, header)?;
        }

        Ok(self.store.flush_range(0, HEADER_SIZE as usize)?)
    }

    pub fn persist_slot(&mut self, index: usize, slot: &Slot) -> FsResult<()> {
        let offset = util::slot_offset(index);
        {
            let mut cursor = Cursor::new(self.store.as_mut());
            cursor.seek(SeekFrom::Start(offset))?;
            bincode::serialize_into(&mut cursor, &slot.meta)?;
            cursor.write_all(&slot.data)?;
        }

        Ok(self
            .store
            .flush_range(offset as usize, SLOT_SIZE as usize)?)
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

/// Names are looked up as `&str`, so a stored name must be terminated
/// UTF-8 to stay reachable.
fn check_file_name(name: &[u8]) -> Result<(), &'static str> {
    let end = name
        .iter()
        .position(|&b| b == 0)
        .ok_or("file name is not terminated")?;
    std::str::from_utf8(&name[..end])
        .map(|_| ())
        .map_err(|_| "file name is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s64::SLOT_META_SIZE;

    fn blank() -> Vec<u8> {
        vec![0u8; IMAGE_SIZE as usize]
    }

    fn formatted(name: &str) -> anyhow::Result<DriveImage<Vec<u8>>> {
        let mut image = DriveImage::new(blank())?;
        image.format(&DriveHeader::new(name)?)?;
        Ok(image)
    }

    #[test]
    fn rejects_wrong_length() {
        let err = DriveImage::new(vec![0u8; IMAGE_SIZE as usize - 1]).unwrap_err();
        assert!(matches!(err, FsError::CorruptHeader(_)));

        let err = DriveImage::new(vec![0u8; IMAGE_SIZE as usize + 1]).unwrap_err();
        assert!(matches!(err, FsError::CorruptHeader(_)));
    }

    #[test]
    fn rejects_wrong_capacity() -> anyhow::Result<()> {
        let mut buf = formatted("vol")?.into_inner();
        buf[30] = 32;

        let err = DriveImage::new(buf)?.load().unwrap_err();
        assert!(matches!(err, FsError::CorruptHeader(_)));
        Ok(())
    }

    #[test]
    fn rejects_unterminated_name() -> anyhow::Result<()> {
        let mut buf = formatted("vol")?.into_inner();
        buf[..30].fill(b'x');

        let err = DriveImage::new(buf)?.load().unwrap_err();
        assert!(matches!(err, FsError::CorruptHeader(_)));
        Ok(())
    }

    #[test]
    fn rejects_oversized_slot() -> anyhow::Result<()> {
        let mut image = formatted("vol")?;
        let mut slot = Slot::occupied("a", "bob", 0);
        slot.meta.file_size = DATA_CAPACITY as u16 + 1;
        image.persist_slot(3, &slot)?;

        let err = image.load().unwrap_err();
        assert!(matches!(err, FsError::CorruptHeader(_)));
        Ok(())
    }

    #[test]
    fn rejects_unterminated_file_name() -> anyhow::Result<()> {
        let mut buf = formatted("vol")?.into_inner();
        let offset = util::slot_offset(5) as usize;
        buf[offset..offset + 32].fill(b'n');

        let err = DriveImage::new(buf)?.load().unwrap_err();
        assert!(matches!(err, FsError::CorruptHeader(_)));
        Ok(())
    }

    #[test]
    fn rejects_non_utf8_file_name() -> anyhow::Result<()> {
        let mut buf = formatted("vol")?.into_inner();
        let offset = util::slot_offset(0) as usize;
        buf[offset..offset + 2].copy_from_slice(&[0xE9, b'a']);

        let err = DriveImage::new(buf)?.load().unwrap_err();
        assert!(matches!(err, FsError::CorruptHeader(_)));
        Ok(())
    }

    #[test]
    fn format_then_load() -> anyhow::Result<()> {
        let (header, slots) = formatted("scratch")?.load()?;

        assert_eq!(header.volume_name(), "scratch");
        assert_eq!(header.free_count as usize, SLOT_COUNT);
        assert_eq!(slots.len(), SLOT_COUNT);
        assert!(slots.iter().all(|s| s.is_free()));
        Ok(())
    }

    #[test]
    fn slot_lands_at_fixed_offset() -> anyhow::Result<()> {
        let mut image = formatted("vol")?;
        let mut slot = Slot::occupied("b.bin", "eve", 0);
        slot.data[0] = 0xAB;
        slot.data[DATA_CAPACITY - 1] = 0xCD;
        slot.meta.file_size = DATA_CAPACITY as u16;
        image.persist_slot(2, &slot)?;

        let buf = image.into_inner();
        let offset = util::slot_offset(2) as usize;
        assert_eq!(&buf[offset..offset + 6], b"b.bin\0");
        assert_eq!(buf[offset + SLOT_META_SIZE as usize], 0xAB);
        assert_eq!(buf[offset + SLOT_SIZE as usize - 1], 0xCD);
        // neighbours untouched
        assert_eq!(buf[offset - 1], 0);
        assert_eq!(buf[offset + SLOT_SIZE as usize], 0);
        Ok(())
    }

    #[test]
    fn repairs_stale_free_count() -> anyhow::Result<()> {
        let mut image = formatted("vol")?;
        image.persist_slot(0, &Slot::occupied("a", "bob", 0))?;

        let (header, _) = image.load()?;
        assert_eq!(header.free_count as usize, SLOT_COUNT - 1);

        let buf = image.into_inner();
        assert_eq!(buf[31] as usize, SLOT_COUNT - 1);
        Ok(())
    }
}
