//! Archive extraction.
//!
//! A fetched target is either a directory, which passes through untouched,
//! or a file, which must be a (possibly compressed) tar archive. The format
//! is sniffed from the file's magic bytes and falls back to the file name.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tar::Archive;

use crate::sources::acquire::PipelineContext;
use crate::util::errors::MixDownError;
use crate::util::fs::is_non_empty_dir;

/// Recognized archive suffixes, longest first so `.tar.gz` wins over `.gz`.
const SUFFIXES: &[(&str, ArchiveFormat)] = &[
    (".tar.bzip2", ArchiveFormat::Bzip2),
    (".tar.gzip", ArchiveFormat::Gzip),
    (".tar.bz2", ArchiveFormat::Bzip2),
    (".tar.gz", ArchiveFormat::Gzip),
    (".tbz2", ArchiveFormat::Bzip2),
    (".tbz", ArchiveFormat::Bzip2),
    (".tb2", ArchiveFormat::Bzip2),
    (".tgz", ArchiveFormat::Gzip),
    (".tar", ArchiveFormat::Tar),
];

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Uncompressed tar
    Tar,
    /// gzip-compressed tar
    Gzip,
    /// bzip2-compressed tar
    Bzip2,
}

impl ArchiveFormat {
    /// Guess the format from a file name or URL path.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        SUFFIXES
            .iter()
            .find(|(suffix, _)| lower.ends_with(suffix))
            .map(|(_, format)| *format)
    }

    /// Detect the format from the first bytes of a file.
    pub fn sniff(header: &[u8]) -> Option<Self> {
        if header.starts_with(&[0x1f, 0x8b]) {
            Some(ArchiveFormat::Gzip)
        } else if header.starts_with(b"BZh") {
            Some(ArchiveFormat::Bzip2)
        } else if header.get(257..262) == Some(b"ustar".as_slice()) {
            Some(ArchiveFormat::Tar)
        } else {
            None
        }
    }

    /// Human-readable name used in error messages.
    pub fn describe(self) -> &'static str {
        match self {
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::Gzip => "gzip-compressed tar",
            ArchiveFormat::Bzip2 => "bzip2-compressed tar",
        }
    }

    fn decoder<'a>(self, reader: impl Read + 'a) -> Box<dyn Read + 'a> {
        match self {
            ArchiveFormat::Tar => Box::new(reader),
            ArchiveFormat::Gzip => Box::new(GzDecoder::new(reader)),
            ArchiveFormat::Bzip2 => Box::new(BzDecoder::new(reader)),
        }
    }
}

/// True if the name ends in a recognized archive suffix.
pub fn is_archive_name(name: &str) -> bool {
    ArchiveFormat::from_name(name).is_some()
}

/// File name with any archive suffix removed (`zlib-1.3.tar.gz` -> `zlib-1.3`).
pub fn archive_stem(name: &str) -> &str {
    let lower = name.to_lowercase();
    for (suffix, _) in SUFFIXES {
        if lower.ends_with(suffix) && name.len() > suffix.len() {
            return name.get(..name.len() - suffix.len()).unwrap_or(name);
        }
    }
    name
}

/// Turns fetched files into directories under the build directory.
#[derive(Debug, Clone)]
pub struct Unpacker {
    build_dir: PathBuf,
}

impl Unpacker {
    pub fn new(build_dir: impl Into<PathBuf>) -> Self {
        Unpacker {
            build_dir: build_dir.into(),
        }
    }

    /// Unpack the context's current path, returning the updated context.
    pub fn unpack(&self, mut cx: PipelineContext) -> Result<PipelineContext, MixDownError> {
        if cx.current.is_dir() {
            return Ok(cx);
        }
        if !cx.current.is_file() {
            return Err(MixDownError::NotUnpackable { path: cx.current });
        }

        let dest = if cx.output_specified {
            if is_non_empty_dir(&cx.output) {
                return Err(MixDownError::OutputNotEmpty { path: cx.output });
            }
            cx.output.clone()
        } else {
            let file_name = cx
                .current
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| cx.target.clone());
            self.build_dir.join(archive_stem(&file_name))
        };

        cx.current = extract_archive(&cx.current, &dest)?;
        Ok(cx)
    }
}

/// Extract `archive` into `dest` and return the source root.
///
/// Entries are extracted into a staging directory next to `dest`, which
/// replaces `dest` only once every entry is out. A corrupt archive leaves
/// `dest` as it was. When the archive holds a single top-level directory
/// (the usual `name-version/` layout) that directory is returned, otherwise
/// `dest`.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<PathBuf, MixDownError> {
    let by_name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(ArchiveFormat::from_name);

    // Plain tar has no reliable magic in old-style headers, so the name is
    // trusted for it; compressed formats must carry their magic bytes.
    let format = match (sniff_file(archive)?, by_name) {
        (Some(format), _) => format,
        (None, Some(ArchiveFormat::Tar)) => ArchiveFormat::Tar,
        (None, Some(format)) => {
            return Err(MixDownError::CorruptArchive {
                path: archive.to_path_buf(),
                format: format.describe(),
            })
        }
        (None, None) => {
            return Err(MixDownError::NotUnderstood {
                path: archive.to_path_buf(),
            })
        }
    };

    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| MixDownError::io(parent, e))?;
    // Dropping the staging dir on any early return removes partial output.
    let staging = tempfile::Builder::new()
        .prefix(".mixdown-unpack-")
        .tempdir_in(parent)
        .map_err(|e| MixDownError::io(parent, e))?;

    let count = unpack_entries(archive, format, staging.path())?;
    if count == 0 {
        return Err(MixDownError::CorruptArchive {
            path: archive.to_path_buf(),
            format: format.describe(),
        });
    }

    if dest.exists() {
        tracing::debug!("Replacing {}", dest.display());
        fs::remove_dir_all(dest).map_err(|e| MixDownError::io(dest, e))?;
    }
    fs::rename(staging.path(), dest).map_err(|e| MixDownError::io(dest, e))?;

    tracing::debug!(
        "Extracted {} entries from {} to {}",
        count,
        archive.display(),
        dest.display()
    );
    source_root(dest)
}

fn sniff_file(path: &Path) -> Result<Option<ArchiveFormat>, MixDownError> {
    let file = File::open(path).map_err(|e| MixDownError::io(path, e))?;
    let mut header = Vec::with_capacity(512);
    file.take(512)
        .read_to_end(&mut header)
        .map_err(|e| MixDownError::io(path, e))?;
    Ok(ArchiveFormat::sniff(&header))
}

fn unpack_entries(
    archive_path: &Path,
    format: ArchiveFormat,
    dest: &Path,
) -> Result<usize, MixDownError> {
    let corrupt = || MixDownError::CorruptArchive {
        path: archive_path.to_path_buf(),
        format: format.describe(),
    };

    let file = File::open(archive_path).map_err(|e| MixDownError::io(archive_path, e))?;
    let mut archive = Archive::new(format.decoder(BufReader::new(file)));

    let mut count = 0;
    for entry in archive.entries().map_err(|_| corrupt())? {
        let mut entry = entry.map_err(|_| corrupt())?;
        let entry_path = entry.path().map_err(|_| corrupt())?.into_owned();

        if !is_contained(&entry_path) {
            return Err(MixDownError::UnsafeArchiveEntry {
                path: archive_path.to_path_buf(),
                entry: entry_path.display().to_string(),
            });
        }

        match entry.unpack_in(dest) {
            Ok(true) => count += 1,
            Ok(false) => {
                return Err(MixDownError::UnsafeArchiveEntry {
                    path: archive_path.to_path_buf(),
                    entry: entry_path.display().to_string(),
                })
            }
            Err(e) => {
                tracing::debug!("failed to extract {}: {}", entry_path.display(), e);
                return Err(corrupt());
            }
        }
    }

    Ok(count)
}

/// Reject absolute paths and `..` components.
fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn source_root(dest: &Path) -> Result<PathBuf, MixDownError> {
    let mut entries = fs::read_dir(dest)
        .map_err(|e| MixDownError::io(dest, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.path());

    match (entries.next(), entries.next()) {
        (Some(only), None) if only.is_dir() => Ok(only),
        _ => Ok(dest.to_path_buf()),
    }
}
