use crate::s64::{DriveHeader, DriveImage, IMAGE_SIZE};
use log::info;
use memmap::MmapMut;
use std::{
    fs::{File, OpenOptions},
    path::Path,
};

/// Creates a new, empty image at `path`. Refuses to overwrite.
pub fn make<P>(path: P, volume_name: &str) -> anyhow::Result<()>
where
    P: AsRef<Path>,
{
    let header = DriveHeader::new(volume_name)?;
    let file = create_file(path.as_ref())?;
    file.set_len(IMAGE_SIZE)?;

    let mmap = unsafe { MmapMut::map_mut(&file)? };
    let mut image = DriveImage::new(mmap)?;
    image.format(&header)?;

    info!(
        "created {} ({} bytes)",
        path.as_ref().display(),
        IMAGE_SIZE
    );
    Ok(())
}

fn create_file<P: AsRef<Path>>(name: P) -> anyhow::Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(name)?;

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s64::{FilesystemManager, SLOT_COUNT};
    use std::path::PathBuf;

    fn tmp_path(name: &str) -> anyhow::Result<PathBuf> {
        let mut tmp_file = std::env::temp_dir();
        tmp_file.push(name);
        tmp_file.set_extension("img");
        if tmp_file.exists() {
            std::fs::remove_file(&tmp_file)?;
        }
        Ok(tmp_file)
    }

    #[test]
    fn make_formats_empty_volume() -> anyhow::Result<()> {
        let tmp_file = tmp_path("mkfs_empty")?;
        make(&tmp_file, "blank")?;

        assert_eq!(std::fs::metadata(&tmp_file)?.len(), IMAGE_SIZE);

        let raw = std::fs::read(&tmp_file)?;
        assert_eq!(&raw[..6], b"blank\0");
        assert_eq!(raw[30] as usize, SLOT_COUNT);
        assert_eq!(raw[31] as usize, SLOT_COUNT);
        assert!(raw[32..].iter().all(|&b| b == 0));

        let fs = FilesystemManager::new(&tmp_file)?;
        assert!(fs.readdir()?.is_empty());

        Ok(std::fs::remove_file(&tmp_file)?)
    }

    #[test]
    fn make_refuses_existing_file() -> anyhow::Result<()> {
        let tmp_file = tmp_path("mkfs_existing")?;
        make(&tmp_file, "first")?;

        assert!(make(&tmp_file, "second").is_err());

        let fs = FilesystemManager::new(&tmp_file)?;
        assert_eq!(fs.statfs()?.volume_name, "first");

        Ok(std::fs::remove_file(&tmp_file)?)
    }

    #[test]
    fn make_rejects_long_volume_name() -> anyhow::Result<()> {
        let tmp_file = tmp_path("mkfs_long_name")?;
        assert!(make(&tmp_file, &"v".repeat(30)).is_err());
        assert!(!tmp_file.exists());
        Ok(())
    }
}
