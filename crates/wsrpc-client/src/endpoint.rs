//! Socket URL composition.
//!
//! The RPC endpoint lives on the same origin as the HTTP API. The socket URL is
//! the configured base address with its scheme switched to `ws`/`wss`, the
//! fixed endpoint path appended, and the bearer token (if any) attached as the
//! `token` query parameter.

use url::Url;

use wsrpc_core::prelude::*;

/// Default path suffix of the RPC endpoint.
pub const DEFAULT_ENDPOINT_PATH: &str = "/mcp/ws";

/// Query parameter carrying the bearer credential.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Where the client connects to, minus the credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
    path: String,
}

impl Endpoint {
    /// Build an endpoint from an HTTP(S) (or already WS) base address and an
    /// absolute path suffix.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidUrl`] if `base` does not parse, uses an unsupported
    /// scheme, or cannot carry a path.
    pub fn new(base: &str, path: impl Into<String>) -> Result<Self> {
        let base = Url::parse(base).map_err(|e| Error::invalid_url(format!("{base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::invalid_url(format!("{base}: cannot be a base URL")));
        }
        socket_scheme(base.scheme())?;

        let path = path.into();
        if !path.starts_with('/') {
            return Err(Error::invalid_url(format!(
                "endpoint path must start with '/': {path}"
            )));
        }

        Ok(Self { base, path })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Compose the socket URL, attaching `token` when present and non-empty.
    pub fn socket_url(&self, token: Option<&str>) -> Result<Url> {
        let mut url = self.base.clone();

        let scheme = socket_scheme(url.scheme())?;
        url.set_scheme(scheme)
            .map_err(|()| Error::invalid_url(format!("cannot switch {} to {scheme}", self.base)))?;

        let joined = format!("{}{}", url.path().trim_end_matches('/'), self.path);
        url.set_path(&joined);
        url.set_fragment(None);

        if let Some(token) = token.filter(|t| !t.is_empty()) {
            url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);
        }

        Ok(url)
    }
}

/// Map an origin scheme onto the matching socket scheme.
fn socket_scheme(scheme: &str) -> Result<&'static str> {
    match scheme {
        "http" | "ws" => Ok("ws"),
        "https" | "wss" => Ok("wss"),
        other => Err(Error::invalid_url(format!("unsupported scheme '{other}'"))),
    }
}
