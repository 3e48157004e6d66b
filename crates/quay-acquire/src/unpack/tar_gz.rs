//! Gzip-compressed tarball extraction.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use super::{check_overwrite, safe_join, ExtractError, UnpackOptions, Unpacker};

pub struct TarGzUnpacker;

impl Unpacker for TarGzUnpacker {
    fn unpack(
        &self,
        src: &Path,
        dest: &Path,
        options: &UnpackOptions,
        on_entry_done: &mut dyn FnMut(u64),
    ) -> Result<(), ExtractError> {
        let file = File::open(src)?;
        let mut archive = Archive::new(GzDecoder::new(file));

        for entry in archive.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.into_owned();
            let entry_type = entry.header().entry_type();

            match entry_type {
                // Extended-header entries carry metadata, not files.
                EntryType::XGlobalHeader | EntryType::XHeader => continue,

                EntryType::Directory => {
                    let target = safe_join(dest, &name)?;
                    fs::create_dir_all(&target)?;
                    on_entry_done(0);
                }

                // Character/block devices and fifos are materialized as
                // regular files holding the entry's data.
                EntryType::Regular
                | EntryType::Continuous
                | EntryType::Char
                | EntryType::Block
                | EntryType::Fifo => {
                    let target = safe_join(dest, &name)?;
                    check_overwrite(&target, options)?;
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    let mode = entry.header().mode()?;
                    let mut out = File::create(&target)?;
                    let written = io::copy(&mut entry, &mut out)?;
                    set_mode(&target, mode)?;
                    on_entry_done(written);
                }

                EntryType::Symlink => {
                    let target = safe_join(dest, &name)?;
                    check_overwrite(&target, options)?;
                    let link = entry.link_name()?.ok_or_else(|| {
                        ExtractError::MalformedEntry(format!(
                            "symlink without target: {}",
                            name.display()
                        ))
                    })?;
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    if options.allow_overwrite && target.symlink_metadata().is_ok() {
                        fs::remove_file(&target)?;
                    }
                    make_symlink(&link, &target, &name)?;
                    on_entry_done(0);
                }

                // Hard links name their target relative to the archive
                // root, so it is resolved against the destination.
                EntryType::Link => {
                    let target = safe_join(dest, &name)?;
                    check_overwrite(&target, options)?;
                    let link = entry.link_name()?.ok_or_else(|| {
                        ExtractError::MalformedEntry(format!(
                            "hard link without target: {}",
                            name.display()
                        ))
                    })?;
                    let original = safe_join(dest, &link)?;
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    if options.allow_overwrite && target.exists() {
                        fs::remove_file(&target)?;
                    }
                    fs::hard_link(&original, &target)?;
                    on_entry_done(0);
                }

                other => {
                    return Err(ExtractError::UnsupportedEntryType {
                        name: name.display().to_string(),
                        kind: format!("{:?}", other),
                    })
                }
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn make_symlink(link: &Path, target: &Path, _name: &Path) -> Result<(), ExtractError> {
    std::os::unix::fs::symlink(link, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn make_symlink(_link: &Path, _target: &Path, name: &Path) -> Result<(), ExtractError> {
    Err(ExtractError::UnsupportedEntryType {
        name: name.display().to_string(),
        kind: "Symlink".to_string(),
    })
}
