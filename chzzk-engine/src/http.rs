//! Shared reqwest client construction.
//!
//! Mirrors the platform-verifier + preconfigured-TLS pattern used elsewhere in this
//! codebase: reqwest's own rustls backend is bypassed in favor of an explicitly built
//! `ClientConfig` so the platform's native certificate store is trusted instead of a
//! bundled webpki root set.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use rustls::ClientConfig;
use rustls_platform_verifier::BuilderVerifierExt;

use crate::error::{EngineError, Result};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Build the shared HTTP client used by [`crate::client::ChzzkClient`] and
/// [`crate::downloader::Downloader`].
///
/// `connect_timeout`/`request_timeout` are per-attempt; callers apply their own
/// retry loops on top (see §4.2 and §4.4 of the spec this crate implements).
pub fn build_client(connect_timeout: Duration, request_timeout: Duration) -> Result<Client> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let tls_config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .expect("default TLS protocol versions are always valid")
        .with_platform_verifier()
        .with_no_client_auth();

    Client::builder()
        .user_agent(DEFAULT_USER_AGENT)
        .pool_max_idle_per_host(4)
        .use_preconfigured_tls(tls_config)
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(EngineError::from)
}
