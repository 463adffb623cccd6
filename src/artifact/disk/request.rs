//! Validated build parameters.

use std::fs;
use std::path::{Path, PathBuf};

use super::error::BuildError;

/// Everything a build needs to know, checked before anything is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    source: PathBuf,
    image: PathBuf,
    partition_image: PathBuf,
    work_dir: PathBuf,
    verbose: bool,
}

/// Host tools receive paths as text, so every path must be valid UTF-8.
fn require_utf8(path: PathBuf, what: &str) -> Result<PathBuf, BuildError> {
    if path.to_str().is_none() {
        return Err(BuildError::Input(format!(
            "{} path is not valid UTF-8: {}",
            what,
            path.display()
        )));
    }
    Ok(path)
}

/// Resolve an output file path against its (existing) parent directory.
fn resolve_output(path: &Path, what: &str) -> Result<PathBuf, BuildError> {
    let name = path
        .file_name()
        .ok_or_else(|| BuildError::Input(format!("{} path has no file name: {}", what, path.display())))?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let parent = fs::canonicalize(parent).map_err(|e| {
        BuildError::Input(format!(
            "{} directory {} is not accessible: {}",
            what,
            parent.display(),
            e
        ))
    })?;
    if !parent.is_dir() {
        return Err(BuildError::Input(format!(
            "{} parent {} is not a directory",
            what,
            parent.display()
        )));
    }
    let resolved = parent.join(name);
    if resolved.is_dir() {
        return Err(BuildError::Input(format!(
            "{} path {} is a directory",
            what,
            resolved.display()
        )));
    }
    require_utf8(resolved, what)
}

fn resolve_dir(path: &Path, what: &str) -> Result<PathBuf, BuildError> {
    let resolved = fs::canonicalize(path).map_err(|e| {
        BuildError::Input(format!("{} {} is not accessible: {}", what, path.display(), e))
    })?;
    if !resolved.is_dir() {
        return Err(BuildError::Input(format!(
            "{} {} is not a directory",
            what,
            resolved.display()
        )));
    }
    require_utf8(resolved, what)
}

impl BuildRequest {
    /// Validate and normalize the build parameters.
    ///
    /// All paths are made absolute. `work_dir` defaults to the current
    /// directory.
    pub fn new(
        source: &Path,
        image: &Path,
        partition_image: &Path,
        work_dir: Option<&Path>,
        verbose: bool,
    ) -> Result<Self, BuildError> {
        let source = resolve_dir(source, "source root file system")?;
        let image = resolve_output(image, "device image")?;
        let partition_image = resolve_output(partition_image, "partition image")?;
        let work_dir = resolve_dir(work_dir.unwrap_or(Path::new(".")), "working directory")?;

        if image == partition_image {
            return Err(BuildError::Input(format!(
                "device image and partition image must differ: {}",
                image.display()
            )));
        }
        for output in [&image, &partition_image] {
            if output.starts_with(&source) {
                return Err(BuildError::Input(format!(
                    "output {} lies inside the source tree {}",
                    output.display(),
                    source.display()
                )));
            }
        }
        if work_dir.starts_with(&source) {
            return Err(BuildError::Input(format!(
                "working directory {} lies inside the source tree {}",
                work_dir.display(),
                source.display()
            )));
        }

        Ok(Self {
            source,
            image,
            partition_image,
            work_dir,
            verbose,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn image(&self) -> &Path {
        &self.image
    }

    pub fn partition_image(&self) -> &Path {
        &self.partition_image
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Both output files.
    pub fn outputs(&self) -> [&Path; 2] {
        [&self.image, &self.partition_image]
    }
}
