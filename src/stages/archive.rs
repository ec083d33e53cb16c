use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use tar::Archive;
use zip::ZipArchive;
use zstd::stream::read::Decoder as ZstdDecoder;

use crate::error::ArchiveError;

/// Archive formats the ingestion stage knows how to unpack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarZstd,
}

impl ArchiveFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.zst") || name.ends_with(".tzst") {
            Some(Self::TarZstd)
        } else {
            None
        }
    }
}

/// Extract every entry of `archive` into `dest`.
///
/// Existing files with the same name are overwritten; anything else already
/// in `dest` is left alone.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    match ArchiveFormat::from_path(archive) {
        Some(ArchiveFormat::Zip) => extract_zip(archive, dest),
        Some(ArchiveFormat::TarZstd) => extract_tar_zstd(archive, dest),
        None => Err(ArchiveError::UnsupportedFormat(archive.to_path_buf())),
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let zip_err = |source| ArchiveError::Zip {
        path: archive.to_path_buf(),
        source,
    };
    let file = File::open(archive).map_err(io_error(archive))?;
    let mut zip = ZipArchive::new(file).map_err(zip_err)?;

    let mut written = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(zip_err)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| ArchiveError::UnsafeEntry(entry.name().to_string()))?;
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(io_error(&out_path))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let mut out = File::create(&out_path).map_err(io_error(&out_path))?;
        io::copy(&mut entry, &mut out).map_err(io_error(&out_path))?;
        written += 1;
    }
    Ok(written)
}

fn extract_tar_zstd(archive: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    let file = File::open(archive).map_err(io_error(archive))?;
    let decoder = ZstdDecoder::new(file).map_err(io_error(archive))?;
    let mut tar = Archive::new(decoder);
    tar.set_overwrite(true);

    let mut written = 0;
    for entry in tar.entries().map_err(io_error(archive))? {
        let mut entry = entry.map_err(io_error(archive))?;
        let entry_path: PathBuf = entry.path().map_err(io_error(archive))?.into_owned();
        if !is_enclosed(&entry_path) {
            return Err(ArchiveError::UnsafeEntry(entry_path.display().to_string()));
        }
        let is_file = entry.header().entry_type().is_file();
        // unpack_in creates parent directories and refuses to escape `dest`
        entry.unpack_in(dest).map_err(io_error(&entry_path))?;
        if is_file {
            written += 1;
        }
    }
    Ok(written)
}

fn is_enclosed(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
