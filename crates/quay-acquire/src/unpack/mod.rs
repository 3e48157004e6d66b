//! Archive extraction with per-entry progress accounting.

mod tar_gz;
mod zip;

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

pub use tar_gz::TarGzUnpacker;
pub use zip::ZipUnpacker;

use crate::progress::ProgressReporter;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("unsupported entry type {kind} for {name}")]
    UnsupportedEntryType { name: String, kind: String },

    #[error("entry path escapes the destination: {0}")]
    PathTraversal(String),

    #[error("refusing to overwrite {0}")]
    RefuseOverwrite(PathBuf),

    #[error("destination is not a usable directory: {0}")]
    BadDestination(PathBuf),

    #[error("malformed archive entry: {0}")]
    MalformedEntry(String),

    #[error("zip error: {0}")]
    Zip(#[from] ::zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extraction behavior knobs.
#[derive(Debug, Clone)]
pub struct UnpackOptions {
    /// Create the destination directory if it does not exist.
    pub create_dest: bool,
    /// Allow entries to replace existing files. Off by default; an archive
    /// landing on top of a previous installation is treated as a bug.
    pub allow_overwrite: bool,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        Self {
            create_dest: true,
            allow_overwrite: false,
        }
    }
}

/// A format-specific extractor. `on_entry_done` fires after each entry is
/// written, with the number of bytes that entry put on disk.
pub trait Unpacker {
    fn unpack(
        &self,
        src: &Path,
        dest: &Path,
        options: &UnpackOptions,
        on_entry_done: &mut dyn FnMut(u64),
    ) -> Result<(), ExtractError>;
}

/// Pick an extractor by file extension.
pub fn unpacker_for(path: &Path) -> Result<Box<dyn Unpacker>, ExtractError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Ok(Box::new(TarGzUnpacker))
    } else if name.ends_with(".zip") {
        Ok(Box::new(ZipUnpacker))
    } else {
        Err(ExtractError::UnsupportedFormat(path.to_path_buf()))
    }
}

/// Extract `src` into `dest`, reporting progress through `reporter`.
pub fn unpack(
    src: &Path,
    dest: &Path,
    options: &UnpackOptions,
    reporter: &dyn ProgressReporter,
) -> Result<(), ExtractError> {
    let unpacker = unpacker_for(src)?;
    prepare_dest(dest, options)?;

    let compressed_size = std::fs::metadata(src)?.len();
    let progress = UnpackProgress::new(reporter, compressed_size);
    log::debug!("unpacking {} into {}", src.display(), dest.display());

    let mut on_entry_done = |bytes| progress.entry_done(bytes);
    unpacker.unpack(src, dest, options, &mut on_entry_done)?;

    progress.complete();
    Ok(())
}

fn prepare_dest(dest: &Path, options: &UnpackOptions) -> Result<(), ExtractError> {
    if dest.exists() {
        if !dest.is_dir() {
            return Err(ExtractError::BadDestination(dest.to_path_buf()));
        }
        return Ok(());
    }
    if !options.create_dest {
        return Err(ExtractError::BadDestination(dest.to_path_buf()));
    }
    std::fs::create_dir_all(dest)?;
    Ok(())
}

/// Progress accounting for an extraction.
///
/// The uncompressed size is unknown until the archive has been walked, so
/// the bar total starts at 102% of the compressed size as an estimate and
/// `complete` snaps it to whatever was actually written.
pub struct UnpackProgress<'a> {
    reporter: &'a dyn ProgressReporter,
}

impl<'a> UnpackProgress<'a> {
    pub fn new(reporter: &'a dyn ProgressReporter, compressed_size: u64) -> Self {
        let estimate =
            u64::try_from(u128::from(compressed_size) * 102 / 100).unwrap_or(u64::MAX);
        reporter.set_total(estimate, true);
        Self { reporter }
    }

    pub fn entry_done(&self, bytes: u64) {
        self.reporter.increment_by(bytes);
    }

    pub fn complete(&self) {
        self.reporter.complete();
    }
}

/// Join an archive entry name onto the destination, rejecting anything that
/// could step outside it.
pub(crate) fn safe_join(dest: &Path, entry_path: &Path) -> Result<PathBuf, ExtractError> {
    let mut target = dest.to_path_buf();
    for component in entry_path.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            _ => {
                return Err(ExtractError::PathTraversal(
                    entry_path.display().to_string(),
                ))
            }
        }
    }
    Ok(target)
}

pub(crate) fn check_overwrite(target: &Path, options: &UnpackOptions) -> Result<(), ExtractError> {
    if !options.allow_overwrite && target.exists() && !target.is_dir() {
        return Err(ExtractError::RefuseOverwrite(target.to_path_buf()));
    }
    Ok(())
}
