//! The connector facade callers construct and submit batches to.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use quay_fs::{FileProcessor, PartialRegistry};

use crate::batch::{TransferTask, run_all};
use crate::client::HttpSession;
use crate::config::SessionConfig;
use crate::descriptor::{Download, RepositoryLayout, Upload};
use crate::endpoint::{ACCEPTED_SCHEMES, RemoteEndpoint, scheme_of};
use crate::error::{ConnectorError, Result};
use crate::events::{EventSink, TransferDirection, TransferListener};
use crate::get::GetWorker;
use crate::put::PutWorker;

/// Connector to one remote repository.
///
/// Construction validates the endpoint and builds the HTTP clients the
/// session lives on. [`get`](Self::get) and [`put`](Self::put) each run
/// one batch to completion: they return only when every submitted
/// descriptor is terminal, and per-descriptor failures are reported
/// through the descriptors, not the call's own `Result`.
pub struct RepositoryConnector {
    session: Arc<HttpSession>,
    layout: Arc<dyn RepositoryLayout>,
    processor: Arc<dyn FileProcessor>,
    listener: Option<Arc<dyn TransferListener>>,
    registry: Arc<PartialRegistry>,
    closed: AtomicBool,
}

impl RepositoryConnector {
    /// Refuses endpoints this connector cannot serve: a content type
    /// other than `"default"`, or a scheme outside
    /// http/https/dav/dav:http/dav:https.
    pub fn new(
        endpoint: &RemoteEndpoint,
        config: &SessionConfig,
        layout: Arc<dyn RepositoryLayout>,
        processor: Arc<dyn FileProcessor>,
        listener: Option<Arc<dyn TransferListener>>,
    ) -> Result<Self> {
        if endpoint.content_type() != "default" {
            return Err(ConnectorError::NoConnector {
                url: endpoint.url().to_string(),
                reason: format!("unsupported content type {:?}", endpoint.content_type()),
            });
        }
        let scheme = scheme_of(endpoint.url()).unwrap_or("");
        if !ACCEPTED_SCHEMES.contains(&scheme) {
            return Err(ConnectorError::NoConnector {
                url: endpoint.url().to_string(),
                reason: format!("unsupported scheme {scheme:?}"),
            });
        }

        Ok(Self {
            session: Arc::new(HttpSession::new(endpoint, config)?),
            layout,
            processor,
            listener,
            registry: Arc::new(PartialRegistry::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Download a batch. Returns once every descriptor is `Done`;
    /// submission order says nothing about completion order.
    pub async fn get(&self, artifacts: &[Download], metadata: &[Download]) -> Result<()> {
        self.ensure_open()?;
        let tasks = artifacts
            .iter()
            .chain(metadata)
            .map(|download| self.download_task(download))
            .collect();
        run_all(tasks).await;
        Ok(())
    }

    /// Upload a batch. Returns once every descriptor is `Done`.
    pub async fn put(&self, artifacts: &[Upload], metadata: &[Upload]) -> Result<()> {
        self.ensure_open()?;
        let tasks = artifacts
            .iter()
            .chain(metadata)
            .map(|upload| self.upload_task(upload))
            .collect();
        run_all(tasks).await;
        Ok(())
    }

    /// Mark the connector closed. Idempotent; subsequent `get`/`put`
    /// calls fail fast, connections drain when the clients drop.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectorError::Closed);
        }
        Ok(())
    }

    fn download_task(&self, download: &Download) -> TransferTask {
        let sink = EventSink::new(
            self.listener.clone(),
            download.resource().clone(),
            TransferDirection::Get,
        );
        let worker = GetWorker {
            url: self
                .session
                .url_of(&self.layout.relative_path(download.resource())),
            destination: download.destination().map(|p| p.to_path_buf()),
            existence_check: download.is_existence_check(),
            policy: download.policy(),
            session: Arc::clone(&self.session),
            registry: Arc::clone(&self.registry),
            processor: Arc::clone(&self.processor),
            sink: sink.clone(),
            cell: download.status_cell(),
        };
        TransferTask {
            cell: download.status_cell(),
            sink,
            fut: Box::pin(worker.run()),
        }
    }

    fn upload_task(&self, upload: &Upload) -> TransferTask {
        let sink = EventSink::new(
            self.listener.clone(),
            upload.resource().clone(),
            TransferDirection::Put,
        );
        let worker = PutWorker {
            url: self
                .session
                .url_of(&self.layout.relative_path(upload.resource())),
            source: upload.source().to_path_buf(),
            session: Arc::clone(&self.session),
            sink: sink.clone(),
            cell: upload.status_cell(),
        };
        TransferTask {
            cell: upload.status_cell(),
            sink,
            fut: Box::pin(worker.run()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TransferResource;
    use quay_fs::StdFileProcessor;

    struct IdentityLayout;

    impl RepositoryLayout for IdentityLayout {
        fn relative_path(&self, resource: &TransferResource) -> String {
            resource.id.clone()
        }
    }

    fn try_connector(endpoint: RemoteEndpoint) -> Result<RepositoryConnector> {
        RepositoryConnector::new(
            &endpoint,
            &SessionConfig::default(),
            Arc::new(IdentityLayout),
            Arc::new(StdFileProcessor),
            None,
        )
    }

    #[test]
    fn refuses_non_default_content_type() {
        let endpoint = RemoteEndpoint::new("https://repo.example").with_content_type("p2");
        assert!(matches!(
            try_connector(endpoint),
            Err(ConnectorError::NoConnector { .. })
        ));
    }

    #[test]
    fn refuses_unsupported_scheme() {
        for url in ["ftp://repo.example", "file:///repo", "repo.example"] {
            assert!(
                matches!(
                    try_connector(RemoteEndpoint::new(url)),
                    Err(ConnectorError::NoConnector { .. })
                ),
                "{url}"
            );
        }
    }

    #[test]
    fn accepts_dav_schemes() {
        for url in ["dav://repo.example", "dav:https://repo.example"] {
            assert!(try_connector(RemoteEndpoint::new(url)).is_ok(), "{url}");
        }
    }

    #[tokio::test]
    async fn closed_connector_fails_fast() {
        let connector = try_connector(RemoteEndpoint::new("https://repo.example")).unwrap();
        connector.close();
        connector.close(); // idempotent

        assert!(matches!(
            connector.get(&[], &[]).await,
            Err(ConnectorError::Closed)
        ));
        assert!(matches!(
            connector.put(&[], &[]).await,
            Err(ConnectorError::Closed)
        ));
    }

    #[tokio::test]
    async fn empty_batch_completes() {
        let connector = try_connector(RemoteEndpoint::new("https://repo.example")).unwrap();
        connector.get(&[], &[]).await.unwrap();
        connector.put(&[], &[]).await.unwrap();
    }
}
