//! Archive extraction with path-traversal protection
//!
//! Toolchain distributions ship as `tar.gz` (or `zip` on Windows) and
//! application bundles as jars. Each container format is adapted to
//! [`EntrySource`], so the safety checks and file writing in [`extract`] are
//! shared by all of them.
//!
//! Every entry must resolve to a strict descendant of the extraction root.
//! The check is lexical (`..` may not climb out) and physical (no
//! already-extracted symlink may redirect a write outside the root). The
//! first violation aborts the whole extraction.

use crate::error::ToolchainError;
use crate::platform::Platform;
use crate::Result;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Directory whose files are marked executable on extraction
const BIN_DIR: &str = "bin";

/// Supported container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Zip,
    /// A zip with a manifest; extracted exactly like [`ArchiveFormat::Zip`]
    Jar,
}

impl ArchiveFormat {
    /// Format of the toolchain distribution published for `platform`
    pub fn for_platform(platform: &Platform) -> Self {
        if platform.is_windows() {
            ArchiveFormat::Zip
        } else {
            ArchiveFormat::TarGz
        }
    }

    /// Infer the format from a file name
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if name.ends_with(".jar") {
            Some(ArchiveFormat::Jar)
        } else if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else {
            None
        }
    }
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tar-gz" | "tar.gz" | "tgz" => Ok(ArchiveFormat::TarGz),
            "zip" => Ok(ArchiveFormat::Zip),
            "jar" => Ok(ArchiveFormat::Jar),
            other => Err(format!("unknown archive format: {other}")),
        }
    }
}

/// What an archive entry materializes as
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
    /// Symbolic link to the recorded target
    Symlink(PathBuf),
    /// Hard link to another entry, named relative to the archive root
    HardLink(PathBuf),
    /// Devices, FIFOs, global headers
    Other,
}

/// One entry streamed out of an archive
pub struct ArchiveEntry<'a> {
    /// Name as recorded in the archive, possibly containing `..`
    pub name: PathBuf,
    pub kind: EntryKind,
    /// Unix permission bits, when the archive records them
    pub mode: Option<u32>,
    pub contents: &'a mut dyn Read,
}

/// A container format that can stream its entries in archive order
pub trait EntrySource {
    fn for_each_entry(
        &mut self,
        visit: &mut dyn FnMut(ArchiveEntry<'_>) -> Result<()>,
    ) -> Result<()>;
}

/// gzip-compressed tar
pub struct TarGzSource<R: Read> {
    archive: tar::Archive<GzDecoder<R>>,
}

impl<R: Read> TarGzSource<R> {
    pub fn new(reader: R) -> Self {
        TarGzSource {
            archive: tar::Archive::new(GzDecoder::new(reader)),
        }
    }
}

impl<R: Read> EntrySource for TarGzSource<R> {
    fn for_each_entry(
        &mut self,
        visit: &mut dyn FnMut(ArchiveEntry<'_>) -> Result<()>,
    ) -> Result<()> {
        for entry in self.archive.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.into_owned();
            let entry_type = entry.header().entry_type();
            let mode = entry.header().mode().ok();

            let kind = if entry_type.is_dir() {
                EntryKind::Directory
            } else if entry_type.is_symlink() || entry_type.is_hard_link() {
                let target = entry
                    .link_name()?
                    .map(|target| target.into_owned())
                    .ok_or_else(|| {
                        ToolchainError::Archive(format!("link without target: {}", name.display()))
                    })?;
                if entry_type.is_symlink() {
                    EntryKind::Symlink(target)
                } else {
                    EntryKind::HardLink(target)
                }
            } else if entry_type.is_file() || entry_type.is_contiguous() {
                EntryKind::File
            } else {
                EntryKind::Other
            };

            visit(ArchiveEntry {
                name,
                kind,
                mode,
                contents: &mut entry,
            })?;
        }
        Ok(())
    }
}

/// zip, and jar by extension
pub struct ZipSource<R: Read + Seek> {
    archive: zip::ZipArchive<R>,
}

impl<R: Read + Seek> ZipSource<R> {
    pub fn new(reader: R) -> Result<Self> {
        Ok(ZipSource {
            archive: zip::ZipArchive::new(reader)?,
        })
    }
}

impl<R: Read + Seek> EntrySource for ZipSource<R> {
    fn for_each_entry(
        &mut self,
        visit: &mut dyn FnMut(ArchiveEntry<'_>) -> Result<()>,
    ) -> Result<()> {
        for index in 0..self.archive.len() {
            let mut file = self.archive.by_index(index)?;
            // Raw name on purpose: traversal is checked by the extractor, not skipped here.
            let name = PathBuf::from(file.name());
            let kind = if file.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            let mode = file.unix_mode();

            visit(ArchiveEntry {
                name,
                kind,
                mode,
                contents: &mut file,
            })?;
        }
        Ok(())
    }
}

/// Counts of what an extraction produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub directories: usize,
    pub files: usize,
    pub links: usize,
    pub skipped: usize,
}

/// Extract `archive` into `destination`, creating it if needed
///
/// # TDD: test_tar_parent_dir_entry_is_rejected
pub fn extract(archive: &Path, destination: &Path, format: ArchiveFormat) -> Result<ExtractSummary> {
    info!("Extracting {:?} into {:?}", archive, destination);

    let file = File::open(archive)?;
    fs::create_dir_all(destination).map_err(|source| ToolchainError::Extraction {
        path: destination.to_path_buf(),
        source,
    })?;
    let root = destination.canonicalize()?;

    let mut source: Box<dyn EntrySource> = match format {
        ArchiveFormat::TarGz => Box::new(TarGzSource::new(BufReader::new(file))),
        ArchiveFormat::Zip | ArchiveFormat::Jar => Box::new(ZipSource::new(BufReader::new(file))?),
    };

    let mut summary = ExtractSummary::default();
    source.for_each_entry(&mut |entry| write_entry(&root, entry, &mut summary))?;

    debug!(
        directories = summary.directories,
        files = summary.files,
        links = summary.links,
        skipped = summary.skipped,
        "Extraction finished"
    );
    Ok(summary)
}

fn write_entry(root: &Path, entry: ArchiveEntry<'_>, summary: &mut ExtractSummary) -> Result<()> {
    let destination = match resolve_destination(root, &entry.name)? {
        Some(path) => path,
        // `./` style entries name the root itself
        None if entry.kind == EntryKind::Directory => return Ok(()),
        None => return Err(traversal(&entry.name)),
    };

    match entry.kind {
        EntryKind::Directory => {
            fs::create_dir_all(&destination).map_err(extraction_error(&destination))?;
            summary.directories += 1;
        }
        EntryKind::Symlink(target) => {
            prepare_parent(&destination)?;
            remove_non_directory(&destination)?;
            create_symlink(&target, &destination).map_err(extraction_error(&destination))?;
            summary.links += 1;
        }
        EntryKind::HardLink(target) => {
            let original = resolve_destination(root, &target)?.ok_or_else(|| traversal(&target))?;
            prepare_parent(&destination)?;
            remove_non_directory(&destination)?;
            fs::hard_link(&original, &destination).map_err(extraction_error(&destination))?;
            summary.links += 1;
        }
        EntryKind::File => {
            prepare_parent(&destination)?;
            remove_non_directory(&destination)?;
            let mut output = File::create(&destination).map_err(extraction_error(&destination))?;
            io::copy(entry.contents, &mut output).map_err(extraction_error(&destination))?;

            let in_bin = destination
                .parent()
                .and_then(Path::file_name)
                .is_some_and(|name| name == BIN_DIR);
            apply_mode(&destination, entry.mode, in_bin).map_err(extraction_error(&destination))?;
            summary.files += 1;
        }
        EntryKind::Other => {
            debug!("Skipping special entry {:?}", entry.name);
            summary.skipped += 1;
        }
    }

    Ok(())
}

/// Map an entry name onto a path under `root`
///
/// Returns `None` when the name denotes the root itself.
fn resolve_destination(root: &Path, name: &Path) -> Result<Option<PathBuf>> {
    let mut relative = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !relative.pop() {
                    return Err(traversal(name));
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(traversal(name)),
        }
    }

    if relative.as_os_str().is_empty() {
        return Ok(None);
    }
    let destination = root.join(&relative);

    // The deepest existing ancestor must still be inside the root once symlinks are resolved.
    let mut ancestor = destination.parent();
    while let Some(dir) = ancestor {
        if let Ok(real) = dir.canonicalize() {
            if !real.starts_with(root) {
                return Err(traversal(name));
            }
            break;
        }
        ancestor = dir.parent();
    }

    Ok(Some(destination))
}

fn traversal(name: &Path) -> ToolchainError {
    ToolchainError::PathTraversal {
        entry: name.display().to_string(),
    }
}

fn extraction_error(path: &Path) -> impl FnOnce(io::Error) -> ToolchainError + '_ {
    move |source| ToolchainError::Extraction {
        path: path.to_path_buf(),
        source,
    }
}

fn prepare_parent(destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(extraction_error(parent))?;
    }
    Ok(())
}

/// Clear a stale file or link so a write never follows an old symlink
fn remove_non_directory(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_dir() => match fs::remove_file(path) {
            // Another extraction into the same root got there first
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(extraction_error(path)(err)),
            _ => Ok(()),
        },
        _ => Ok(()),
    }
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>, executable: bool) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut bits = mode.map(|m| m & 0o777).filter(|m| *m != 0).unwrap_or(0o644);
    if executable {
        bits |= 0o755;
    }
    fs::set_permissions(path, fs::Permissions::from_mode(bits))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>, _executable: bool) -> io::Result<()> {
    Ok(())
}
