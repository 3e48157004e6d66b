//! Zip archive extraction.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use zip::ZipArchive;

use super::{check_overwrite, ExtractError, UnpackOptions, Unpacker};

pub struct ZipUnpacker;

impl Unpacker for ZipUnpacker {
    fn unpack(
        &self,
        src: &Path,
        dest: &Path,
        options: &UnpackOptions,
        on_entry_done: &mut dyn FnMut(u64),
    ) -> Result<(), ExtractError> {
        let file = File::open(src)?;
        let mut archive = ZipArchive::new(file)?;

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            let name = entry
                .enclosed_name()
                .ok_or_else(|| ExtractError::PathTraversal(entry.name().to_string()))?;
            let target = dest.join(name);

            if entry.is_dir() {
                fs::create_dir_all(&target)?;
                on_entry_done(0);
                continue;
            }

            check_overwrite(&target, options)?;
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            let written = io::copy(&mut entry, &mut out)?;
            if let Some(mode) = entry.unix_mode() {
                set_mode(&target, mode)?;
            }
            on_entry_done(written);
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
