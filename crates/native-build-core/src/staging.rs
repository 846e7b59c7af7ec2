//! Bundle staging and classpath computation
//!
//! A boot jar is exploded into `<build dir>/native`. Its `BOOT-INF/classes`
//! tree becomes the first classpath root; every file in `BOOT-INF/lib`
//! follows it.

use crate::error::BuildError;
use crate::Result;
use graal_toolchain::{extract, ArchiveFormat};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Staging directory under the build output root
pub const OUTPUT_DIR: &str = "native";

const BOOT_INF: &str = "BOOT-INF";
const META_INF: &str = "META-INF";
const MANIFEST: &str = "MANIFEST.MF";

fn staging_error(path: &Path) -> impl FnOnce(std::io::Error) -> BuildError + '_ {
    move |source| BuildError::Staging {
        path: path.to_path_buf(),
        source,
    }
}

/// Recursively remove a previous staging directory
///
/// Returns whether anything was removed. A missing directory is not an error.
///
/// # TDD: test_delete_missing_output_dir_is_noop
pub fn delete_output_dir(output_dir: &Path) -> Result<bool> {
    let metadata = match fs::symlink_metadata(output_dir) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("Skip clearing output directory as it does not exist");
            return Ok(false);
        }
        Err(e) => return Err(staging_error(output_dir)(e)),
    };

    info!("Clear output directory {:?}", output_dir);
    if metadata.is_dir() {
        fs::remove_dir_all(output_dir).map_err(staging_error(output_dir))?;
    } else {
        fs::remove_file(output_dir).map_err(staging_error(output_dir))?;
    }

    Ok(true)
}

/// An exploded bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedBundle {
    pub root: PathBuf,
    pub classes_dir: PathBuf,
    pub lib_dir: PathBuf,
}

impl StagedBundle {
    /// Layout of a bundle exploded into `root`
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let boot_inf = root.join(BOOT_INF);
        StagedBundle {
            classes_dir: boot_inf.join("classes"),
            lib_dir: boot_inf.join("lib"),
            root,
        }
    }

    pub fn classpath(&self, separator: char) -> Result<String> {
        compute_classpath(&self.classes_dir, &self.lib_dir, separator)
    }
}

/// Explode `bundle` into `output_dir` and give the classes tree its own manifest
///
/// # TDD: test_stage_bundle_layout
pub fn stage_bundle(bundle: &Path, output_dir: &Path) -> Result<StagedBundle> {
    info!("Decompress dependencies");
    extract(bundle, output_dir, ArchiveFormat::Jar)?;

    let root = fs::canonicalize(output_dir).map_err(staging_error(output_dir))?;
    let staged = StagedBundle::at(root);

    info!("Copy dependencies to output directory");
    let manifest_dir = staged.classes_dir.join(META_INF);
    fs::create_dir_all(&manifest_dir).map_err(staging_error(&manifest_dir))?;

    let source = staged.root.join(META_INF).join(MANIFEST);
    fs::copy(&source, manifest_dir.join(MANIFEST)).map_err(staging_error(&source))?;

    Ok(staged)
}

/// The classes directory followed by every file directly inside `lib_dir`,
/// in directory enumeration order
pub fn compute_classpath(classes_dir: &Path, lib_dir: &Path, separator: char) -> Result<String> {
    let mut entries = vec![classes_dir.to_string_lossy().into_owned()];

    if lib_dir.is_dir() {
        for entry in fs::read_dir(lib_dir).map_err(staging_error(lib_dir))? {
            let entry = entry.map_err(staging_error(lib_dir))?;
            let path = entry.path();
            if path.is_file() {
                entries.push(path.to_string_lossy().into_owned());
            }
        }
    }

    Ok(entries.join(&separator.to_string()))
}
