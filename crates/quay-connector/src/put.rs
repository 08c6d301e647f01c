//! The upload worker: stream the body, then best-effort sidecars.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream;
use quay_verify::{DigestPair, MultiDigester};
use reqwest::Method;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::client::{HttpSession, classify_status};
use crate::descriptor::StatusCell;
use crate::error::{ConnectorError, Result};
use crate::events::EventSink;

const UPLOAD_CHUNK: usize = 32 * 1024;

pub(crate) struct PutWorker {
    pub(crate) url: String,
    pub(crate) source: PathBuf,
    pub(crate) session: Arc<HttpSession>,
    pub(crate) sink: EventSink,
    pub(crate) cell: Arc<StatusCell>,
}

impl PutWorker {
    pub(crate) async fn run(self) -> Result<()> {
        self.cell.activate();
        self.sink.initiated();

        let file = File::open(&self.source).await.map_err(|err| {
            ConnectorError::TransferFailed(format!(
                "failed to open {}: {err}",
                self.source.display()
            ))
        })?;

        let response = self
            .session
            .request(Method::PUT, &self.url, None)
            .body(reqwest::Body::wrap_stream(progress_stream(
                file,
                self.sink.clone(),
            )))
            .send()
            .await
            .map_err(|err| {
                ConnectorError::TransferFailed(format!("upload to {} failed: {err}", self.url))
            })?;
        classify_status(response.status(), &self.url)?;

        // The terminal signal waits for these; their failures do not
        // fail the upload, some remotes reject unknown extensions.
        self.upload_sidecars().await;
        Ok(())
    }

    async fn upload_sidecars(&self) {
        let digests = match digest_file(&self.source).await {
            Ok(digests) => digests,
            Err(err) => {
                tracing::warn!(
                    source = %self.source.display(),
                    error = %err,
                    "failed to digest upload source, skipping checksum sidecars"
                );
                return;
            }
        };
        let DigestPair { sha1, md5 } = digests;
        for (extension, hex) in [("sha1", sha1), ("md5", md5)] {
            let url = format!("{}.{extension}", self.url);
            let outcome = match self.session.request(Method::PUT, &url, None).body(hex).send().await
            {
                Ok(response) => classify_status(response.status(), &url),
                Err(err) => Err(ConnectorError::TransferFailed(format!(
                    "upload to {url} failed: {err}"
                ))),
            };
            if let Err(err) = outcome {
                tracing::warn!(%url, error = %err, "checksum sidecar upload failed");
            }
        }
    }
}

/// Chunked body stream over the source file that reports each chunk to
/// the event sink as it is sent.
fn progress_stream(
    file: File,
    sink: EventSink,
) -> impl futures_util::Stream<Item = std::io::Result<Bytes>> + Send {
    stream::unfold(file, move |mut file| {
        let sink = sink.clone();
        async move {
            let mut buf = vec![0u8; UPLOAD_CHUNK];
            match file.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    sink.progressed(n as u64);
                    Some((Ok(Bytes::from(buf)), file))
                }
                Err(err) => Some((Err(err), file)),
            }
        }
    })
}

async fn digest_file(path: &Path) -> std::io::Result<DigestPair> {
    let mut file = File::open(path).await?;
    let mut digester = MultiDigester::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        digester.update(&buf[..n]);
    }
    Ok(digester.finalize())
}
