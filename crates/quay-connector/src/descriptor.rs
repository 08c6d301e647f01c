//! Transfer descriptors and their lifecycle state machine.
//!
//! Descriptors are caller-owned. The engine borrows them for the
//! duration of one batch and writes their state and outcome through a
//! shared cell, so a caller's clone observes the terminal result after
//! the batch call returns. Descriptors are single-use: submit a fresh
//! one per batch.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use thiserror::Error;

use crate::error::ConnectorError;

/// Which flavor of repository resource a descriptor addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Artifact,
    Metadata,
}

/// Opaque identity of a remote resource.
///
/// The engine never interprets `id`; a [`RepositoryLayout`] maps it to
/// the repository-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResource {
    pub kind: ResourceKind,
    pub id: String,
}

impl TransferResource {
    pub fn artifact(id: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Artifact,
            id: id.into(),
        }
    }

    pub fn metadata(id: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Metadata,
            id: id.into(),
        }
    }
}

impl fmt::Display for TransferResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Maps an opaque resource to its repository-relative path.
pub trait RepositoryLayout: Send + Sync {
    fn relative_path(&self, resource: &TransferResource) -> String;
}

/// How strictly a download treats its remote checksum sidecars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumPolicy {
    /// Mismatch or missing sidecar fails the transfer.
    Strict,
    /// Mismatch or missing sidecar emits a `Corrupted` event, the file
    /// is accepted anyway.
    Warn,
    /// Skip verification entirely.
    Ignore,
}

/// Lifecycle position of one descriptor. Transitions are monotonic:
/// `New` → `Active` → `Done`, never backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    New,
    Active,
    Done,
}

/// Terminal result of one transfer, set exactly once when the
/// descriptor reaches [`TransferState::Done`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    NotFound,
    AuthDenied,
    Io { message: String },
    ChecksumMismatch { expected: String, actual: String },
    ChecksumUnavailable,
    Cancelled,
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok)
    }

    pub(crate) fn from_error(err: &ConnectorError) -> Self {
        match err {
            ConnectorError::NotFound(_) => Outcome::NotFound,
            ConnectorError::AuthDenied(_) => Outcome::AuthDenied,
            ConnectorError::ChecksumFailure { expected, actual } => Outcome::ChecksumMismatch {
                expected: expected.clone(),
                actual: actual.clone(),
            },
            ConnectorError::ChecksumUnavailable(_) => Outcome::ChecksumUnavailable,
            ConnectorError::Cancelled => Outcome::Cancelled,
            other => Outcome::Io {
                message: other.to_string(),
            },
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ok => f.write_str("ok"),
            Outcome::NotFound => f.write_str("not found"),
            Outcome::AuthDenied => f.write_str("authorization denied"),
            Outcome::Io { message } => write!(f, "i/o failure: {message}"),
            Outcome::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch (expected {expected}, actual {actual})")
            }
            Outcome::ChecksumUnavailable => f.write_str("no remote checksum available"),
            Outcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

const STATE_NEW: u8 = 0;
const STATE_ACTIVE: u8 = 1;
const STATE_DONE: u8 = 2;

/// Shared state/outcome cell behind every descriptor.
///
/// The outcome is a write-once slot: a worker's error path and its
/// cleanup path may both try to finish, and whichever fires first wins.
#[derive(Debug, Default)]
pub(crate) struct StatusCell {
    state: AtomicU8,
    outcome: OnceLock<Outcome>,
}

impl StatusCell {
    pub(crate) fn activate(&self) {
        self.state.fetch_max(STATE_ACTIVE, Ordering::SeqCst);
    }

    /// Record the terminal outcome, returning whether this call won the
    /// write. The state advances to `Done` either way.
    pub(crate) fn finish(&self, outcome: Outcome) -> bool {
        let won = self.outcome.set(outcome).is_ok();
        self.state.fetch_max(STATE_DONE, Ordering::SeqCst);
        won
    }

    pub(crate) fn state(&self) -> TransferState {
        match self.state.load(Ordering::SeqCst) {
            STATE_NEW => TransferState::New,
            STATE_ACTIVE => TransferState::Active,
            _ => TransferState::Done,
        }
    }

    pub(crate) fn outcome(&self) -> Option<Outcome> {
        self.outcome.get().cloned()
    }
}

/// Typed failure a caller reads off a finished descriptor, keeping the
/// artifact/metadata distinction and separating not-found from every
/// other failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("artifact {id} not found")]
    ArtifactNotFound { id: String },

    #[error("metadata {id} not found")]
    MetadataNotFound { id: String },

    #[error("artifact {id} transfer failed: {outcome}")]
    ArtifactTransfer { id: String, outcome: Outcome },

    #[error("metadata {id} transfer failed: {outcome}")]
    MetadataTransfer { id: String, outcome: Outcome },
}

fn wrap_failure(resource: &TransferResource, outcome: Outcome) -> Option<TransferError> {
    if outcome.is_ok() {
        return None;
    }
    let id = resource.id.clone();
    Some(match (resource.kind, &outcome) {
        (ResourceKind::Artifact, Outcome::NotFound) => TransferError::ArtifactNotFound { id },
        (ResourceKind::Metadata, Outcome::NotFound) => TransferError::MetadataNotFound { id },
        (ResourceKind::Artifact, _) => TransferError::ArtifactTransfer { id, outcome },
        (ResourceKind::Metadata, _) => TransferError::MetadataTransfer { id, outcome },
    })
}

/// One download to perform: fetch `resource` into `destination`.
///
/// With `existence_check` and no destination, only a HEAD probe is
/// issued and nothing is written locally.
#[derive(Debug, Clone)]
pub struct Download {
    resource: TransferResource,
    destination: Option<PathBuf>,
    existence_check: bool,
    policy: ChecksumPolicy,
    status: Arc<StatusCell>,
}

impl Download {
    pub fn new(resource: TransferResource, destination: Option<PathBuf>) -> Self {
        Self {
            resource,
            destination,
            existence_check: false,
            policy: ChecksumPolicy::Warn,
            status: Arc::new(StatusCell::default()),
        }
    }

    pub fn artifact(id: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self::new(TransferResource::artifact(id), Some(destination.into()))
    }

    pub fn metadata(id: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self::new(TransferResource::metadata(id), Some(destination.into()))
    }

    pub fn with_policy(mut self, policy: ChecksumPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_existence_check(mut self, existence_check: bool) -> Self {
        self.existence_check = existence_check;
        self
    }

    pub fn resource(&self) -> &TransferResource {
        &self.resource
    }

    pub fn destination(&self) -> Option<&Path> {
        self.destination.as_deref()
    }

    pub fn is_existence_check(&self) -> bool {
        self.existence_check
    }

    pub fn policy(&self) -> ChecksumPolicy {
        self.policy
    }

    pub fn state(&self) -> TransferState {
        self.status.state()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.status.outcome()
    }

    /// The typed failure for this descriptor, if it did not succeed.
    pub fn failure(&self) -> Option<TransferError> {
        wrap_failure(&self.resource, self.status.outcome()?)
    }

    pub(crate) fn status_cell(&self) -> Arc<StatusCell> {
        Arc::clone(&self.status)
    }
}

/// One upload to perform: send the local `source` file as `resource`,
/// followed by best-effort `.sha1`/`.md5` sidecar uploads.
#[derive(Debug, Clone)]
pub struct Upload {
    resource: TransferResource,
    source: PathBuf,
    status: Arc<StatusCell>,
}

impl Upload {
    pub fn new(resource: TransferResource, source: impl Into<PathBuf>) -> Self {
        Self {
            resource,
            source: source.into(),
            status: Arc::new(StatusCell::default()),
        }
    }

    pub fn artifact(id: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self::new(TransferResource::artifact(id), source)
    }

    pub fn metadata(id: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self::new(TransferResource::metadata(id), source)
    }

    pub fn resource(&self) -> &TransferResource {
        &self.resource
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn state(&self) -> TransferState {
        self.status.state()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.status.outcome()
    }

    pub fn failure(&self) -> Option<TransferError> {
        wrap_failure(&self.resource, self.status.outcome()?)
    }

    pub(crate) fn status_cell(&self) -> Arc<StatusCell> {
        Arc::clone(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_is_monotonic() {
        let cell = StatusCell::default();
        assert_eq!(cell.state(), TransferState::New);
        cell.activate();
        assert_eq!(cell.state(), TransferState::Active);
        cell.finish(Outcome::Ok);
        assert_eq!(cell.state(), TransferState::Done);
        // A late activate cannot move the state backwards.
        cell.activate();
        assert_eq!(cell.state(), TransferState::Done);
    }

    #[test]
    fn outcome_is_write_once() {
        let cell = StatusCell::default();
        assert!(cell.finish(Outcome::NotFound));
        assert!(!cell.finish(Outcome::Cancelled));
        assert_eq!(cell.outcome(), Some(Outcome::NotFound));
    }

    #[test]
    fn failure_wraps_by_kind() {
        let download = Download::artifact("g/a/1.0/a-1.0.jar", "/tmp/a.jar");
        download.status_cell().finish(Outcome::NotFound);
        assert_eq!(
            download.failure(),
            Some(TransferError::ArtifactNotFound {
                id: "g/a/1.0/a-1.0.jar".to_string()
            })
        );

        let upload = Upload::metadata("g/a/maven-metadata.xml", "/tmp/m.xml");
        upload.status_cell().finish(Outcome::AuthDenied);
        assert!(matches!(
            upload.failure(),
            Some(TransferError::MetadataTransfer { .. })
        ));
    }

    #[test]
    fn success_has_no_failure() {
        let download = Download::artifact("a", "/tmp/a");
        download.status_cell().finish(Outcome::Ok);
        assert!(download.failure().is_none());
    }

    #[test]
    fn clones_share_the_status_cell() {
        let download = Download::artifact("a", "/tmp/a");
        let observer = download.clone();
        download.status_cell().finish(Outcome::Ok);
        assert_eq!(observer.state(), TransferState::Done);
        assert_eq!(observer.outcome(), Some(Outcome::Ok));
    }
}
