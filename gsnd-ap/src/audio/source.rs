//! Compressed source: a read-only view over a file's bytes
//!
//! Files are memory-mapped so the decoder reads frames in place without
//! copying the whole file into the heap. In-memory sources are supported for
//! callers that already hold the bytes.

use crate::error::{Error, Result};
use memmap2::Mmap;
use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

enum Backing {
    Mapped(Mmap),
    Owned(Arc<[u8]>),
}

/// Immutable byte view backing one decode session.
///
/// Owned exclusively by one `FrameDecoder`; the mapping is released when the
/// decoder is dropped.
pub struct CompressedSource {
    path: PathBuf,
    backing: Backing,
}

impl CompressedSource {
    /// Map `path` read-only.
    ///
    /// # Errors
    /// `OpenFailed` if the file cannot be opened or mapped, or is empty.
    pub fn open(path: &Path) -> Result<Self> {
        let open_failed = |reason: String| Error::OpenFailed {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| open_failed(e.to_string()))?;
        let len = file
            .metadata()
            .map_err(|e| open_failed(e.to_string()))?
            .len();
        if len == 0 {
            return Err(open_failed("file is empty".to_string()));
        }

        // SAFETY: the mapping is read-only and lives as long as this source.
        // Truncating the file while it is mapped is outside the player's contract.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| open_failed(format!("mmap failed: {}", e)))?;

        debug!("Mapped {} ({} bytes)", path.display(), mmap.len());

        Ok(Self {
            path: path.to_path_buf(),
            backing: Backing::Mapped(mmap),
        })
    }

    /// Wrap bytes already in memory. `name` is used in logs and errors.
    pub fn from_bytes(name: impl Into<PathBuf>, bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        let path = name.into();
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Error::OpenFailed {
                path,
                reason: "source is empty".to_string(),
            });
        }
        Ok(Self {
            path,
            backing: Backing::Owned(bytes),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Deref for CompressedSource {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.backing {
            Backing::Mapped(mmap) => mmap,
            Backing::Owned(bytes) => bytes,
        }
    }
}

impl std::fmt::Debug for CompressedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedSource")
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}
