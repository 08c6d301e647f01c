//! HTTP session plumbing shared by both workers.

use reqwest::header::{ACCEPT, PRAGMA, RANGE};
use reqwest::{Client, Method, RequestBuilder, StatusCode};

use crate::config::{DEFAULT_USER_AGENT, SessionConfig};
use crate::endpoint::{Credentials, RemoteEndpoint, build_url, normalize_url};
use crate::error::{ConnectorError, Result};

/// The two clients a session runs on, plus per-request decoration.
///
/// Resumed requests must see the raw byte stream, a range offset is
/// meaningless against a compressed response body, so they go through a
/// second client with compression disabled.
pub(crate) struct HttpSession {
    client: Client,
    resume_client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    no_cache: bool,
    pub(crate) resume: bool,
}

impl HttpSession {
    pub(crate) fn new(endpoint: &RemoteEndpoint, config: &SessionConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(endpoint, config, true)?,
            resume_client: build_client(endpoint, config, false)?,
            base_url: normalize_url(endpoint.url()),
            credentials: endpoint.credentials().cloned(),
            no_cache: !config.use_cache,
            resume: config.resume,
        })
    }

    /// Absolute URL of a repository-relative path.
    pub(crate) fn url_of(&self, relative: &str) -> String {
        build_url(&self.base_url, relative)
    }

    /// A decorated request. `range_offset` selects the resume client
    /// and adds `Range: bytes=<offset>-`.
    pub(crate) fn request(
        &self,
        method: Method,
        url: &str,
        range_offset: Option<u64>,
    ) -> RequestBuilder {
        let client = if range_offset.is_some() {
            &self.resume_client
        } else {
            &self.client
        };
        // The cache directive only concerns fetches; uploads never
        // carry it.
        let no_cache = self.no_cache && (method == Method::GET || method == Method::HEAD);
        let mut request = client.request(method, url).header(ACCEPT, "*/*");
        if let Some(offset) = range_offset {
            request = request.header(RANGE, format!("bytes={offset}-"));
        }
        if no_cache {
            request = request.header(PRAGMA, "no-cache");
        }
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, credentials.password.as_deref());
        }
        request
    }
}

fn build_client(endpoint: &RemoteEndpoint, config: &SessionConfig, gzip: bool) -> Result<Client> {
    let user_agent = config
        .user_agent
        .clone()
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
    let mut builder = Client::builder()
        .user_agent(user_agent)
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .gzip(gzip);

    if let Some(proxy) = endpoint.proxy() {
        let mut proxy_config = reqwest::Proxy::all(&proxy.url).map_err(|err| no_connector(endpoint, &err))?;
        if let Some(credentials) = &proxy.credentials {
            proxy_config = proxy_config.basic_auth(
                &credentials.username,
                credentials.password.as_deref().unwrap_or(""),
            );
        }
        builder = builder.proxy(proxy_config);
    }

    builder.build().map_err(|err| no_connector(endpoint, &err))
}

fn no_connector(endpoint: &RemoteEndpoint, err: &dyn std::error::Error) -> ConnectorError {
    ConnectorError::NoConnector {
        url: endpoint.url().to_string(),
        reason: format!("failed to initialize http client: {err}"),
    }
}

/// The authoritative response-code mapper, shared by HEAD, GET, PUT and
/// sidecar requests.
pub(crate) fn classify_status(status: StatusCode, url: &str) -> Result<()> {
    match status.as_u16() {
        404 => Err(ConnectorError::NotFound(url.to_string())),
        401 | 403 | 407 => Err(ConnectorError::AuthDenied(url.to_string())),
        code if code >= 300 => Err(ConnectorError::TransferFailed(format!(
            "unexpected status {code} for {url}"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> StatusCode {
        StatusCode::from_u16(code).unwrap()
    }

    #[test]
    fn success_codes_pass() {
        for code in [200, 201, 204, 206] {
            assert!(classify_status(status(code), "u").is_ok(), "{code}");
        }
    }

    #[test]
    fn missing_resources_map_to_not_found() {
        assert!(matches!(
            classify_status(status(404), "u"),
            Err(ConnectorError::NotFound(_))
        ));
    }

    #[test]
    fn auth_codes_map_to_auth_denied() {
        for code in [401, 403, 407] {
            assert!(
                matches!(classify_status(status(code), "u"), Err(ConnectorError::AuthDenied(_))),
                "{code}"
            );
        }
    }

    #[test]
    fn other_failures_map_to_transfer_failed() {
        for code in [301, 500, 503] {
            assert!(
                matches!(classify_status(status(code), "u"), Err(ConnectorError::TransferFailed(_))),
                "{code}"
            );
        }
    }
}
