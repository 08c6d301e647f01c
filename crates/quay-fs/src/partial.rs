//! The in-process table of in-flight partial files.
//!
//! Claiming is two-layered. The registry's claim table serializes
//! workers inside one process; the advisory lock on `<partial>.lock`
//! excludes other processes. A partial abandoned by a dead process
//! leaves its lock free, so the resume scan reclaims it; one still held
//! elsewhere fails the lock attempt and is skipped.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;

use crate::error::{Error, Result};
use crate::ensure_dir;

/// Per-process registry of claimed partial files.
///
/// Invariant: at most one live [`PartialClaim`] per partial path within
/// the process. A claim must be returned via [`PartialRegistry::release`].
pub struct PartialRegistry {
    claimed: Mutex<HashSet<PathBuf>>,
}

/// A claimed partial file, exclusive to one worker.
pub struct PartialClaim {
    final_path: PathBuf,
    partial_path: PathBuf,
    lock: LockFile,
    resume_offset: u64,
}

impl PartialClaim {
    /// The destination the partial will be published to.
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// The partial file the worker writes into.
    pub fn partial_path(&self) -> &Path {
        &self.partial_path
    }

    /// Bytes already present in the partial; zero for a fresh one.
    pub fn resume_offset(&self) -> u64 {
        self.resume_offset
    }
}

impl PartialRegistry {
    pub fn new() -> Self {
        Self {
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Claim a partial file for a download to `dest`.
    ///
    /// With `resume_allowed`, siblings named `<dest>.part*` that hold
    /// data are considered for resumption; the first one whose lock can
    /// be taken wins. Otherwise (or when none can be locked) a fresh
    /// partial named `<dest>.part-<16 hex>` is minted with offset zero.
    pub fn claim(&self, dest: &Path, resume_allowed: bool) -> Result<PartialClaim> {
        let parent = parent_of(dest);
        ensure_dir(&parent)?;

        let stem = dest
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("download"));

        if resume_allowed {
            if let Some(claim) = self.try_resume(&parent, dest, &stem)? {
                return Ok(claim);
            }
        }
        self.mint_fresh(&parent, dest, &stem)
    }

    /// Release a claim, unlocking and removing its `.lock` file.
    ///
    /// With `delete_partial` the partial itself is removed too (failure
    /// cleanup). After a successful publish the partial has already been
    /// renamed away, so the caller passes `false`.
    pub fn release(&self, claim: PartialClaim, delete_partial: bool) -> Result<()> {
        let removed = if delete_partial {
            fs::remove_file(&claim.partial_path).or_else(ignore_missing)
        } else {
            Ok(())
        };
        claim.lock.release();
        self.claimed
            .lock()
            .expect("partial registry poisoned")
            .remove(&claim.partial_path);
        removed.map_err(|source| Error::Remove {
            path: claim.partial_path,
            source,
        })
    }

    fn try_resume(
        &self,
        parent: &Path,
        dest: &Path,
        stem: &OsString,
    ) -> Result<Option<PartialClaim>> {
        let mut prefix = stem.clone();
        prefix.push(".part");
        let prefix = prefix.to_string_lossy().into_owned();

        let entries = match fs::read_dir(parent) {
            Ok(entries) => entries,
            Err(source) => {
                return Err(Error::Open {
                    path: parent.to_path_buf(),
                    source,
                });
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(&prefix) || name.ends_with(".lock") {
                continue;
            }
            let len = match entry.metadata() {
                Ok(meta) if meta.is_file() => meta.len(),
                _ => continue,
            };
            if len == 0 {
                continue;
            }

            let candidate = entry.path();
            if !self.insert_claim(&candidate) {
                // Another worker in this process owns it.
                continue;
            }
            match LockFile::acquire(lock_path(&candidate)) {
                Ok(lock) => {
                    return Ok(Some(PartialClaim {
                        final_path: dest.to_path_buf(),
                        partial_path: candidate,
                        lock,
                        resume_offset: len,
                    }));
                }
                Err(_) => {
                    // Held by another process; leave the partial alone.
                    self.remove_claim(&candidate);
                }
            }
        }
        Ok(None)
    }

    fn mint_fresh(&self, parent: &Path, dest: &Path, stem: &OsString) -> Result<PartialClaim> {
        loop {
            let mut name = stem.clone();
            name.push(format!(".part-{:016x}", rand::random::<u64>()));
            let partial = parent.join(&name);

            if !self.insert_claim(&partial) {
                continue;
            }
            let lock = match LockFile::acquire(lock_path(&partial)) {
                Ok(lock) => lock,
                Err(source) => {
                    self.remove_claim(&partial);
                    return Err(Error::Locked {
                        path: partial,
                        source,
                    });
                }
            };
            match OpenOptions::new().write(true).create_new(true).open(&partial) {
                Ok(_) => {
                    return Ok(PartialClaim {
                        final_path: dest.to_path_buf(),
                        partial_path: partial,
                        lock,
                        resume_offset: 0,
                    });
                }
                Err(source) if source.kind() == io::ErrorKind::AlreadyExists => {
                    // Suffix collision; try another.
                    lock.release();
                    self.remove_claim(&partial);
                }
                Err(source) => {
                    lock.release();
                    self.remove_claim(&partial);
                    return Err(Error::Open {
                        path: partial,
                        source,
                    });
                }
            }
        }
    }

    fn insert_claim(&self, path: &Path) -> bool {
        self.claimed
            .lock()
            .expect("partial registry poisoned")
            .insert(path.to_path_buf())
    }

    fn remove_claim(&self, path: &Path) {
        self.claimed
            .lock()
            .expect("partial registry poisoned")
            .remove(path);
    }
}

impl Default for PartialRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// An acquired advisory lock on a companion `.lock` file.
struct LockFile {
    file: File,
    path: PathBuf,
}

impl LockFile {
    fn acquire(path: PathBuf) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        file.try_lock_exclusive()?;
        Ok(Self { file, path })
    }

    fn release(self) {
        let _ = FileExt::unlock(&self.file);
        let _ = fs::remove_file(&self.path);
    }
}

fn lock_path(partial: &Path) -> PathBuf {
    let mut os = partial.as_os_str().to_os_string();
    os.push(".lock");
    PathBuf::from(os)
}

fn parent_of(dest: &Path) -> PathBuf {
    match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn ignore_missing(err: io::Error) -> io::Result<()> {
    if err.kind() == io::ErrorKind::NotFound {
        Ok(())
    } else {
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fresh_claim_mints_partial_and_lock() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("artifact.jar");
        let registry = PartialRegistry::new();

        let claim = registry.claim(&dest, true).unwrap();
        let name = claim.partial_path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("artifact.jar.part-"));
        assert_eq!(name.len(), "artifact.jar.part-".len() + 16);
        assert_eq!(claim.resume_offset(), 0);
        assert!(claim.partial_path().exists());
        assert!(lock_path(claim.partial_path()).exists());

        let partial = claim.partial_path().to_path_buf();
        registry.release(claim, true).unwrap();
        assert!(!partial.exists());
        assert!(!lock_path(&partial).exists());
    }

    #[test]
    fn resume_picks_up_nonempty_sibling() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("artifact.jar");
        let stale = dir.path().join("artifact.jar.part-00000000deadbeef");
        fs::write(&stale, b"abc").unwrap();

        let registry = PartialRegistry::new();
        let claim = registry.claim(&dest, true).unwrap();
        assert_eq!(claim.partial_path(), stale.as_path());
        assert_eq!(claim.resume_offset(), 3);
        registry.release(claim, true).unwrap();
    }

    #[test]
    fn empty_sibling_is_not_resumed() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("artifact.jar");
        fs::write(dir.path().join("artifact.jar.part-0000000000000000"), b"").unwrap();

        let registry = PartialRegistry::new();
        let claim = registry.claim(&dest, true).unwrap();
        assert_eq!(claim.resume_offset(), 0);
        registry.release(claim, true).unwrap();
    }

    #[test]
    fn second_worker_gets_a_fresh_partial() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("artifact.jar");
        let stale = dir.path().join("artifact.jar.part-00000000deadbeef");
        fs::write(&stale, b"abcdef").unwrap();

        let registry = PartialRegistry::new();
        let first = registry.claim(&dest, true).unwrap();
        let second = registry.claim(&dest, true).unwrap();

        assert_eq!(first.partial_path(), stale.as_path());
        assert_ne!(first.partial_path(), second.partial_path());
        assert_eq!(second.resume_offset(), 0);

        registry.release(first, true).unwrap();
        registry.release(second, true).unwrap();
    }

    #[test]
    fn resume_disabled_always_mints() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("artifact.jar");
        fs::write(dir.path().join("artifact.jar.part-00000000deadbeef"), b"abc").unwrap();

        let registry = PartialRegistry::new();
        let claim = registry.claim(&dest, false).unwrap();
        assert_eq!(claim.resume_offset(), 0);
        registry.release(claim, true).unwrap();
    }

    #[test]
    fn release_without_delete_keeps_partial() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("artifact.jar");
        let registry = PartialRegistry::new();

        let claim = registry.claim(&dest, true).unwrap();
        fs::write(claim.partial_path(), b"abc").unwrap();
        let partial = claim.partial_path().to_path_buf();
        registry.release(claim, false).unwrap();

        assert!(partial.exists());
        assert!(!lock_path(&partial).exists());
        // And it becomes resumable again.
        let claim = registry.claim(&dest, true).unwrap();
        assert_eq!(claim.partial_path(), partial.as_path());
        assert_eq!(claim.resume_offset(), 3);
        registry.release(claim, true).unwrap();
    }
}
