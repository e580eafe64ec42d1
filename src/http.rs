//! HTTP client helper with native-tls support.
//!
//! [`HttpFetch`] is the seam the remote backend talks through: the default
//! implementation wraps a ureq agent configured with native-tls, and tests
//! substitute an in-memory fake.

use std::time::Duration;

use ureq::Agent;
use ureq::tls::{RootCerts, TlsConfig, TlsProvider};

/// Maximum response body size accepted from the rendering server (20 MB).
pub const MAX_RESPONSE_SIZE: u64 = 20 * 1024 * 1024;

/// A successful HTTP response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpBody(pub Vec<u8>);

impl HttpBody {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Blocking, read-only HTTP access.
///
/// Implementations run inside `spawn_blocking`, so they may block freely.
pub trait HttpFetch: Send + Sync {
    /// GET `url`. Transport failures and non-2xx statuses are `Err` with a
    /// human-readable description.
    fn get(&self, url: &str) -> Result<HttpBody, String>;

    /// Check that `url` answers with a success status without reading the
    /// body. Defaults to a `get` whose body is dropped.
    fn head(&self, url: &str) -> Result<(), String> {
        self.get(url).map(|_| ())
    }
}

/// Create a new HTTP agent configured with native-tls.
///
/// This explicitly configures native-tls as the TLS provider, which uses
/// the system's TLS library (Schannel on Windows, OpenSSL on Linux,
/// Security.framework on macOS).
pub fn agent(timeout: Option<Duration>) -> Agent {
    let tls_config = TlsConfig::builder()
        .provider(TlsProvider::NativeTls)
        .root_certs(RootCerts::PlatformVerifier)
        .build();

    Agent::config_builder()
        .tls_config(tls_config)
        .timeout_global(timeout)
        .build()
        .into()
}

/// [`HttpFetch`] backed by a ureq agent.
pub struct UreqFetch {
    agent: Agent,
}

impl UreqFetch {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            agent: agent(timeout),
        }
    }
}

impl HttpFetch for UreqFetch {
    fn get(&self, url: &str) -> Result<HttpBody, String> {
        let bytes = self
            .agent
            .get(url)
            .header("User-Agent", concat!("puml-render/", env!("CARGO_PKG_VERSION")))
            .call()
            .map_err(|e| format!("GET {url} failed: {e}"))?
            .into_body()
            .with_config()
            .limit(MAX_RESPONSE_SIZE)
            .read_to_vec()
            .map_err(|e| format!("Failed to read response from {url}: {e}"))?;
        Ok(HttpBody(bytes))
    }

    fn head(&self, url: &str) -> Result<(), String> {
        self.agent
            .head(url)
            .header("User-Agent", concat!("puml-render/", env!("CARGO_PKG_VERSION")))
            .call()
            .map(|_| ())
            .map_err(|e| format!("HEAD {url} failed: {e}"))
    }
}
