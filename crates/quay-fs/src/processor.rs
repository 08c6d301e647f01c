//! Atomic publication of completed transfers.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::ensure_dir;

/// Placement seam between the transfer engine and the local store.
///
/// The engine never writes a destination path directly; it hands the
/// finished partial to `move_file`, whose contract is that the
/// destination appears fully written or not at all.
pub trait FileProcessor: Send + Sync {
    /// Publish `from` at `to`, atomically with respect to readers of `to`.
    fn move_file(&self, from: &Path, to: &Path) -> Result<()>;

    /// Place small text content (digest sidecars) at `dst`.
    fn write_text(&self, dst: &Path, content: &str) -> Result<()>;
}

/// Default processor: same-filesystem rename, with a copy + sync +
/// sibling-rename fallback when the partial and the destination live on
/// different filesystems.
pub struct StdFileProcessor;

impl FileProcessor for StdFileProcessor {
    fn move_file(&self, from: &Path, to: &Path) -> Result<()> {
        if let Some(parent) = to.parent() {
            ensure_dir(parent)?;
        }
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(_) => copy_publish(from, to),
        }
    }

    fn write_text(&self, dst: &Path, content: &str) -> Result<()> {
        if let Some(parent) = dst.parent() {
            ensure_dir(parent)?;
        }
        let staging = staging_sibling(dst);
        fs::write(&staging, content).map_err(|source| Error::Write {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, dst).map_err(|source| {
            let _ = fs::remove_file(&staging);
            Error::Publish {
                from: staging,
                to: dst.to_path_buf(),
                source,
            }
        })
    }
}

/// Cross-filesystem fallback: stage a copy next to the destination so
/// the final rename stays on one filesystem.
fn copy_publish(from: &Path, to: &Path) -> Result<()> {
    let staging = staging_sibling(to);
    let publish = |source| Error::Publish {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    let result = (|| -> io::Result<()> {
        fs::copy(from, &staging)?;
        File::open(&staging)?.sync_all()?;
        fs::rename(&staging, to)
    })();
    if let Err(source) = result {
        let _ = fs::remove_file(&staging);
        return Err(publish(source));
    }
    let _ = fs::remove_file(from);
    Ok(())
}

fn staging_sibling(dst: &Path) -> PathBuf {
    let mut os = dst.as_os_str().to_os_string();
    os.push(format!(".publish-{:016x}", rand::random::<u64>()));
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn move_file_publishes_content() {
        let dir = tempdir().unwrap();
        let partial = dir.path().join("artifact.jar.part-0000000000000001");
        let dest = dir.path().join("repo/artifact.jar");
        fs::write(&partial, b"HELLO").unwrap();

        StdFileProcessor.move_file(&partial, &dest).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"HELLO");
        assert!(!partial.exists());
    }

    #[test]
    fn write_text_places_sidecar() {
        let dir = tempdir().unwrap();
        let sidecar = dir.path().join("artifact.jar.sha1");

        StdFileProcessor
            .write_text(&sidecar, "c65f99f8c5376adadddc46d5cbcf5762f9e55eb7")
            .unwrap();
        assert_eq!(
            fs::read_to_string(&sidecar).unwrap(),
            "c65f99f8c5376adadddc46d5cbcf5762f9e55eb7"
        );
    }
}
