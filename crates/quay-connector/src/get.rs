//! The download worker: claim, fetch, verify, commit, cleanup.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use quay_fs::{FileProcessor, PartialClaim, PartialRegistry};
use quay_verify::{DigestPair, MultiDigester, hex_eq};
use reqwest::header::CONTENT_RANGE;
use reqwest::{Method, StatusCode};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::client::{HttpSession, classify_status};
use crate::descriptor::{ChecksumPolicy, StatusCell};
use crate::error::{ConnectorError, Result, error_chain};
use crate::events::EventSink;

/// Mid-stream I/O failures are resumed from the current partial length
/// this many times before the transfer fails.
const MAX_RESUME_RETRIES: u32 = 3;

const READ_CHUNK: usize = 64 * 1024;

pub(crate) struct GetWorker {
    pub(crate) url: String,
    pub(crate) destination: Option<PathBuf>,
    pub(crate) existence_check: bool,
    pub(crate) policy: ChecksumPolicy,
    pub(crate) session: Arc<HttpSession>,
    pub(crate) registry: Arc<PartialRegistry>,
    pub(crate) processor: Arc<dyn FileProcessor>,
    pub(crate) sink: EventSink,
    pub(crate) cell: Arc<StatusCell>,
}

impl GetWorker {
    pub(crate) async fn run(self) -> Result<()> {
        self.cell.activate();
        self.sink.initiated();

        if self.existence_check && self.destination.is_none() {
            return self.check_existence().await;
        }
        let Some(dest) = self.destination.clone() else {
            return Err(ConnectorError::TransferFailed(format!(
                "no destination configured for {}",
                self.url
            )));
        };

        let claim = self.claim_partial(&dest).await?;
        let result = self.transfer(&claim, &dest).await;
        // The partial survives only while it may still be published.
        if let Err(err) = self.registry.release(claim, result.is_err()) {
            tracing::warn!(url = %self.url, error = %error_chain(&err), "partial cleanup failed");
        }
        result
    }

    async fn check_existence(&self) -> Result<()> {
        let response = self
            .session
            .request(Method::HEAD, &self.url, None)
            .send()
            .await
            .map_err(|err| request_failed(&self.url, &err))?;
        classify_status(response.status(), &self.url)
    }

    async fn claim_partial(&self, dest: &Path) -> Result<PartialClaim> {
        let registry = Arc::clone(&self.registry);
        let dest = dest.to_path_buf();
        let resume_allowed = self.session.resume;
        tokio::task::spawn_blocking(move || registry.claim(&dest, resume_allowed))
            .await
            .map_err(|err| {
                ConnectorError::TransferFailed(format!("partial claim task failed: {err}"))
            })?
            .map_err(|err| ConnectorError::TransferFailed(error_chain(&err)))
    }

    async fn transfer(&self, claim: &PartialClaim, dest: &Path) -> Result<()> {
        let digester = self.fetch(claim).await?;
        self.verify(digester, dest).await?;
        self.commit(claim, dest)
    }

    /// Stream the resource into the partial, feeding the digester and
    /// progress events, resuming from the current length on transient
    /// mid-stream failures.
    async fn fetch(&self, claim: &PartialClaim) -> Result<Option<MultiDigester>> {
        let partial = claim.partial_path();
        let mut digester =
            (self.policy != ChecksumPolicy::Ignore).then(MultiDigester::new);
        let mut offset = claim.resume_offset();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(partial)
            .await
            .map_err(|err| file_failed("open", partial, &err))?;

        if offset > 0 {
            // The digest must cover the whole file, including the bytes
            // a previous process already fetched.
            if let Some(digester) = digester.as_mut() {
                prime_digester(digester, &mut file, offset, partial).await?;
            }
            self.sink.set_transferred(offset);
            tracing::debug!(url = %self.url, offset, "resuming interrupted download");
        }

        let mut attempts = 0u32;
        'attempt: loop {
            let range = (offset > 0).then_some(offset);
            let response = self
                .session
                .request(Method::GET, &self.url, range)
                .send()
                .await
                .map_err(|err| request_failed(&self.url, &err))?;
            classify_status(response.status(), &self.url)?;

            let ranged_response = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value != "none");
            if offset > 0 && !ranged_response {
                // Server ignored the range; start over from zero.
                file.set_len(0)
                    .await
                    .map_err(|err| file_failed("truncate", partial, &err))?;
                offset = 0;
                if let Some(digester) = digester.as_mut() {
                    digester.reset();
                }
                self.sink.set_transferred(0);
            }
            file.seek(SeekFrom::Start(offset))
                .await
                .map_err(|err| file_failed("seek", partial, &err))?;

            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        file.write_all(&bytes)
                            .await
                            .map_err(|err| file_failed("write", partial, &err))?;
                        if let Some(digester) = digester.as_mut() {
                            digester.update(&bytes);
                        }
                        offset += bytes.len() as u64;
                        self.sink.progressed(bytes.len() as u64);
                    }
                    Err(err) if attempts < MAX_RESUME_RETRIES => {
                        attempts += 1;
                        tracing::debug!(
                            url = %self.url,
                            attempt = attempts,
                            offset,
                            error = %err,
                            "stream interrupted, retrying from current length"
                        );
                        continue 'attempt;
                    }
                    Err(err) => {
                        return Err(ConnectorError::TransferFailed(format!(
                            "download of {} failed: {err}",
                            self.url
                        )));
                    }
                }
            }
            break;
        }

        file.sync_all()
            .await
            .map_err(|err| file_failed("sync", partial, &err))?;
        Ok(digester)
    }

    /// Compare the streamed digest against the remote sidecars per the
    /// descriptor's policy. `None` digester means verification was
    /// turned off.
    async fn verify(&self, digester: Option<MultiDigester>, dest: &Path) -> Result<()> {
        let Some(digester) = digester else {
            return Ok(());
        };
        let actual = digester.finalize();

        let verdict = match self.fetch_sidecar("sha1").await {
            Some(expected) => Some(Verdict::new("sha1", expected, actual.sha1.clone())),
            None => self
                .fetch_sidecar("md5")
                .await
                .map(|expected| Verdict::new("md5", expected, actual.md5.clone())),
        };

        let Some(verdict) = verdict else {
            return match self.policy {
                ChecksumPolicy::Strict => {
                    Err(ConnectorError::ChecksumUnavailable(self.url.clone()))
                }
                _ => {
                    self.sink.corrupted("no remote checksum available");
                    Ok(())
                }
            };
        };

        if verdict.matched {
            self.place_sidecar(dest, verdict.extension, &actual);
            return Ok(());
        }
        match self.policy {
            ChecksumPolicy::Strict => Err(ConnectorError::ChecksumFailure {
                expected: verdict.expected,
                actual: verdict.actual,
            }),
            _ => {
                self.sink.corrupted(format!(
                    "checksum mismatch (expected {}, actual {})",
                    verdict.expected, verdict.actual
                ));
                Ok(())
            }
        }
    }

    /// Body of `<url>.<extension>` on a 200, otherwise `None`.
    async fn fetch_sidecar(&self, extension: &str) -> Option<String> {
        let url = format!("{}.{extension}", self.url);
        let response = match self.session.request(Method::GET, &url, None).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(%url, error = %err, "sidecar fetch failed");
                return None;
            }
        };
        if response.status() != StatusCode::OK {
            return None;
        }
        match response.text().await {
            Ok(body) if !body.trim().is_empty() => Some(body),
            _ => None,
        }
    }

    /// Best effort: keep the verified digest next to the destination.
    fn place_sidecar(&self, dest: &Path, extension: &str, digests: &DigestPair) {
        let hex = match extension {
            "sha1" => &digests.sha1,
            _ => &digests.md5,
        };
        let mut sidecar = dest.as_os_str().to_os_string();
        sidecar.push(format!(".{extension}"));
        let sidecar = PathBuf::from(sidecar);
        if let Err(err) = self.processor.write_text(&sidecar, hex) {
            tracing::warn!(
                dest = %dest.display(),
                extension,
                error = %error_chain(&err),
                "failed to place checksum sidecar"
            );
        }
    }

    fn commit(&self, claim: &PartialClaim, dest: &Path) -> Result<()> {
        self.processor
            .move_file(claim.partial_path(), dest)
            .map_err(|err| ConnectorError::TransferFailed(error_chain(&err)))?;
        tracing::debug!(url = %self.url, dest = %dest.display(), "download committed");
        Ok(())
    }
}

struct Verdict {
    extension: &'static str,
    expected: String,
    actual: String,
    matched: bool,
}

impl Verdict {
    fn new(extension: &'static str, expected: String, actual: String) -> Self {
        let matched = hex_eq(&expected, &actual);
        Self {
            extension,
            expected: expected.trim().to_string(),
            actual,
            matched,
        }
    }
}

async fn prime_digester(
    digester: &mut MultiDigester,
    file: &mut File,
    len: u64,
    partial: &Path,
) -> Result<()> {
    file.seek(SeekFrom::Start(0))
        .await
        .map_err(|err| file_failed("seek", partial, &err))?;
    let mut remaining = len;
    let mut buf = vec![0u8; READ_CHUNK];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = file
            .read(&mut buf[..want])
            .await
            .map_err(|err| file_failed("read", partial, &err))?;
        if n == 0 {
            break;
        }
        digester.update(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(())
}

fn request_failed(url: &str, err: &reqwest::Error) -> ConnectorError {
    ConnectorError::TransferFailed(format!("request to {url} failed: {err}"))
}

fn file_failed(what: &str, path: &Path, err: &std::io::Error) -> ConnectorError {
    ConnectorError::TransferFailed(format!("failed to {what} {}: {err}", path.display()))
}
