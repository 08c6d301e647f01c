//! Remote endpoint model and URL construction.
//!
//! Endpoints may be declared with a `dav`/`dav:` scheme prefix; the
//! prefix only selects the connector, transport always speaks plain
//! HTTP(S), so it is stripped before any request is built.

/// Username/password pair for the endpoint or its proxy.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
        }
    }
}

/// Proxy the session routes through, with optional proxy credentials.
#[derive(Debug, Clone)]
pub struct ProxySpec {
    pub url: String,
    pub credentials: Option<Credentials>,
}

/// An immutable description of one remote repository.
#[derive(Debug, Clone)]
pub struct RemoteEndpoint {
    url: String,
    content_type: String,
    credentials: Option<Credentials>,
    proxy: Option<ProxySpec>,
}

impl RemoteEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: "default".to_string(),
            credentials: None,
            proxy: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_proxy(mut self, proxy: ProxySpec) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn proxy(&self) -> Option<&ProxySpec> {
        self.proxy.as_ref()
    }
}

pub(crate) const ACCEPTED_SCHEMES: [&str; 5] = ["http", "https", "dav", "dav:http", "dav:https"];

/// The full scheme of an absolute URL, e.g. `dav:https` for
/// `dav:https://host/`.
pub(crate) fn scheme_of(url: &str) -> Option<&str> {
    url.split_once("://").map(|(scheme, _)| scheme)
}

/// Strip the dav prefix down to the underlying transport scheme.
///
/// `dav:http://h` and `dav:https://h` lose the `dav:`; the bare
/// `dav://h` form becomes `http://h`. Plain http(s) URLs pass through.
pub(crate) fn normalize_url(url: &str) -> String {
    match url.strip_prefix("dav:") {
        Some(rest) if rest.starts_with("http") => rest.to_string(),
        _ => match url.strip_prefix("dav") {
            Some(rest) => format!("http{rest}"),
            None => url.to_string(),
        },
    }
}

/// Join the endpoint URL and a relative path with exactly one slash,
/// mapping spaces in the path to `+`.
pub(crate) fn build_url(base: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        relative.trim_start_matches('/').replace(' ', "+")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_is_everything_before_the_separator() {
        assert_eq!(scheme_of("https://repo.example/releases"), Some("https"));
        assert_eq!(scheme_of("dav:https://repo.example"), Some("dav:https"));
        assert_eq!(scheme_of("no-scheme-here"), None);
    }

    #[test]
    fn accepted_schemes_cover_dav_variants() {
        for url in [
            "http://h/",
            "https://h/",
            "dav://h/",
            "dav:http://h/",
            "dav:https://h/",
        ] {
            let scheme = scheme_of(url).unwrap();
            assert!(ACCEPTED_SCHEMES.contains(&scheme), "{url}");
        }
        assert!(!ACCEPTED_SCHEMES.contains(&"ftp"));
    }

    #[test]
    fn dav_prefixes_are_stripped() {
        assert_eq!(normalize_url("dav:http://h/r"), "http://h/r");
        assert_eq!(normalize_url("dav:https://h/r"), "https://h/r");
        assert_eq!(normalize_url("dav://h/r"), "http://h/r");
        assert_eq!(normalize_url("https://h/r"), "https://h/r");
    }

    #[test]
    fn build_url_joins_with_one_slash() {
        assert_eq!(build_url("http://h/repo/", "/a/b.jar"), "http://h/repo/a/b.jar");
        assert_eq!(build_url("http://h/repo", "a/b.jar"), "http://h/repo/a/b.jar");
    }

    #[test]
    fn build_url_encodes_spaces_as_plus() {
        assert_eq!(
            build_url("http://h/repo", "a dir/my artifact.jar"),
            "http://h/repo/a+dir/my+artifact.jar"
        );
    }

    #[test]
    fn endpoint_defaults_to_default_content_type() {
        let endpoint = RemoteEndpoint::new("https://repo.example");
        assert_eq!(endpoint.content_type(), "default");
        assert!(endpoint.credentials().is_none());
        assert!(endpoint.proxy().is_none());
    }
}
