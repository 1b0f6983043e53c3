//! Scratch files for a single pipeline call.
//!
//! Every call gets its own identifier, so concurrent calls never collide inside the shared
//! scratch directory and no locking is needed. Each path is wrapped in a scope guard that
//! removes the file when dropped, whichever way the call exits.

use scopeguard::ScopeGuard;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A scratch path that is deleted (best effort) when the guard goes out of scope.
pub type ScratchFile = ScopeGuard<PathBuf, fn(PathBuf)>;

/// The shared directory all scratch files live in.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

/// The three artifacts of one pipeline call.
pub struct ScratchSet {
    pub id: String,
    /// Upload bytes written verbatim
    pub input: ScratchFile,
    /// Frame-decimated intermediate GIF
    pub reduced: ScratchFile,
    /// gifsicle output
    pub output: ScratchFile,
}

impl ScratchDir {
    /// Use `root` as the scratch directory, creating it if needed.
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Reserve a fresh set of paths. Nothing is created on disk yet.
    pub fn allocate(&self) -> ScratchSet {
        let id = Uuid::new_v4().simple().to_string();
        ScratchSet {
            input: self.guard(format!("temp_in_full_{id}.gif")),
            reduced: self.guard(format!("temp_reduced_{id}.gif")),
            output: self.guard(format!("temp_out_{id}.gif")),
            id,
        }
    }

    fn guard(&self, name: String) -> ScratchFile {
        scopeguard::guard(self.root.join(name), remove_quietly as fn(PathBuf))
    }
}

fn remove_quietly(path: PathBuf) {
    if let Err(e) = std::fs::remove_file(&path)
        && e.kind() != io::ErrorKind::NotFound
    {
        tracing::debug!(path = %path.display(), error = %e, "Failed to remove scratch file");
    }
}
