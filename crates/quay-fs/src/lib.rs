//! Partial-file coordination and atomic publication for transfers.
//!
//! A download never writes its destination directly. It streams into a
//! sibling partial file (`<dest>.part-<16 hex>`), guarded twice: a
//! per-process claim table so two workers in one process cannot share a
//! partial, and an OS advisory lock on a companion `<partial>.lock` file
//! so two processes cannot either. Successful transfers publish by
//! renaming the partial onto the destination, which is the only write
//! the destination path ever sees.
//!
//! The [`FileProcessor`] trait is the publication seam; callers may
//! substitute their own placement strategy (different staging layout,
//! post-placement hooks) without touching the transfer engine.

pub use self::error::{Error, Result};
pub use self::partial::{PartialClaim, PartialRegistry};
pub use self::processor::{FileProcessor, StdFileProcessor};

mod error;
mod partial;
mod processor;

use std::fs;
use std::path::Path;

/// Create a directory chain, tolerating creation races.
///
/// Another worker may create the same chain between our existence check
/// and the create call; a failed create is only an error if the
/// directory still does not exist afterwards.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() || path.is_dir() {
        return Ok(());
    }
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(_) if path.is_dir() => Ok(()),
        Err(source) => Err(Error::CreateDir {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn ensure_dir_creates_nested_chain() {
        let dir = tempdir().unwrap();
        let deep = dir.path().join("a/b/c");
        ensure_dir(&deep).unwrap();
        assert!(deep.is_dir());
        // Existing chain is fine.
        ensure_dir(&deep).unwrap();
    }
}
