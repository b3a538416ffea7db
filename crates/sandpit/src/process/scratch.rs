//! Request-scoped scratch files
//!
//! Source text for external interpreters is written to a uniquely named file
//! that lives exactly as long as the request that created it.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::FileExtension;
use crate::process::ProcessError;

/// A uniquely named file in the scratch directory
///
/// # Cleanup
///
/// Call [`remove()`](Self::remove) once the child process has finished. The
/// `Drop` implementation removes the file synchronously if `remove()` never
/// ran (early return, panic, cancelled future), so the file cannot outlive
/// the value.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    removed: bool,
}

impl ScratchFile {
    /// Create a new scratch file holding `contents`
    ///
    /// The name combines a millisecond timestamp with a random UUID and the
    /// file is opened with `create_new`, so concurrent requests never share
    /// or overwrite a file.
    #[instrument(skip(contents), fields(len = contents.len()))]
    pub async fn create(
        dir: &Path,
        extension: &FileExtension,
        contents: &[u8],
    ) -> Result<Self, ProcessError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| ProcessError::ScratchCreate {
                path: dir.to_path_buf(),
                source,
            })?;

        let path = dir.join(unique_name(extension));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|source| ProcessError::ScratchCreate {
                path: path.clone(),
                source,
            })?;

        // From here on the guard owns the file, so a failed write still removes it
        let scratch = Self {
            path,
            removed: false,
        };

        let written = match file.write_all(contents).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        written.map_err(|source| ProcessError::ScratchCreate {
            path: scratch.path.clone(),
            source,
        })?;

        debug!(path = ?scratch.path, "created scratch file");
        Ok(scratch)
    }

    /// Path of the scratch file on the host
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the scratch file
    ///
    /// Consumes the guard: removal is attempted exactly once, and a file that
    /// is already gone counts as removed.
    #[must_use = "cleanup errors should be handled"]
    #[instrument(skip(self), fields(path = ?self.path))]
    pub async fn remove(mut self) -> Result<(), ProcessError> {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("removed scratch file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ProcessError::ScratchRemove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = ?self.path, "removed scratch file on drop"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = ?self.path, error = %e, "failed to remove scratch file"),
        }
    }
}

fn unique_name(extension: &FileExtension) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("code_{millis}_{}.{extension}", Uuid::new_v4().simple())
}
