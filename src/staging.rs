//! Scratch storage for uploaded files.

use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempDir};

use crate::error::{Error, Result};

pub const REQUIRED_EXTENSION: &str = "pdf";

#[derive(Debug, Clone)]
pub enum StagingMode {
    /// A fresh temporary directory per indexing attempt, removed afterwards.
    PerUpload,
    /// One fixed directory. Each upload lands in a subdirectory of its own,
    /// named by content and file name, and is kept on disk.
    Shared(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Bytes,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.bytes)
    }
}

pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Strips any directory components and checks the extension.
pub fn validate_file_name(raw: &str) -> Result<String> {
    let name = Path::new(raw.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or(Error::NoFile)?;

    let accepted = Path::new(&name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(REQUIRED_EXTENSION));

    if !accepted {
        return Err(Error::UnsupportedFileType(name));
    }

    Ok(name)
}

// One directory per (content, name) pair, so a directory never holds
// another upload's copy of the same bytes.
fn shared_dir_name(file_name: &str, upload: &Upload) -> String {
    format!("{}-{}", upload.fingerprint(), fingerprint(file_name.as_bytes()))
}

enum StagingDir {
    Temp(TempDir),
    Shared(PathBuf),
}

/// An upload written to disk. Dropping a per-upload staging removes it.
pub struct StagedUpload {
    dir: StagingDir,
    pub path: PathBuf,
    pub file_name: String,
}

impl StagedUpload {
    pub fn dir(&self) -> &Path {
        match &self.dir {
            StagingDir::Temp(dir) => dir.path(),
            StagingDir::Shared(dir) => dir,
        }
    }
}

pub fn stage(mode: &StagingMode, upload: &Upload) -> Result<StagedUpload> {
    let file_name = validate_file_name(&upload.file_name)?;
    if upload.bytes.is_empty() {
        return Err(Error::Upload(format!("'{file_name}' is empty")));
    }

    let dir = match mode {
        StagingMode::PerUpload => StagingDir::Temp(tempfile::tempdir()?),
        StagingMode::Shared(root) => {
            let dir = root.join(shared_dir_name(&file_name, upload));
            std::fs::create_dir_all(&dir)?;
            StagingDir::Shared(dir)
        }
    };

    let staged_dir = match &dir {
        StagingDir::Temp(dir) => dir.path().to_path_buf(),
        StagingDir::Shared(dir) => dir.clone(),
    };

    // Written beside the target then renamed, so a reader never sees a partial file.
    let mut scratch = NamedTempFile::new_in(&staged_dir)?;
    scratch.write_all(&upload.bytes)?;
    scratch.flush()?;

    let path = staged_dir.join(&file_name);
    scratch
        .persist(&path)
        .map_err(|e| Error::Upload(format!("could not stage '{file_name}': {}", e.error)))?;

    tracing::debug!("Staged {} at {}", file_name, path.display());

    Ok(StagedUpload {
        dir,
        path,
        file_name,
    })
}
