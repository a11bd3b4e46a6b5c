//! Backend address resolution.
//!
//! An explicit `[backend] url` (or `TASKCHAT_BACKEND_URL`) always wins. When
//! none is set and discovery is enabled, the machine's public IP is looked up
//! once at startup and the backend is assumed to listen on it at the
//! configured port. Failures here are fatal: there is no usable backend.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::BackendConfig;

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no backend url configured and discovery is disabled (set [backend] url or TASKCHAT_BACKEND_URL)")]
    NotConfigured,

    #[error("ip lookup request failed: {0}")]
    Request(String),

    #[error("unexpected ip lookup response: {0}")]
    Shape(String),
}

#[derive(Debug, Deserialize)]
struct IpLookup {
    ip: String,
}

/// Return the backend base URL for this process.
pub async fn resolve_backend_url(cfg: &BackendConfig) -> Result<String, DiscoveryError> {
    if let Some(url) = &cfg.url {
        info!(backend = %url, "using configured backend url");
        return Ok(url.clone());
    }
    if !cfg.discovery.enabled {
        return Err(DiscoveryError::NotConfigured);
    }

    let client = Client::builder()
        .timeout(DISCOVERY_TIMEOUT)
        .build()
        .map_err(|e| DiscoveryError::Request(format!("failed to build HTTP client: {e}")))?;

    let ip = lookup_public_ip(&client, &cfg.discovery.endpoint).await?;
    let url = backend_url_for(ip, cfg.discovery.port);
    info!(%ip, backend = %url, "backend url discovered");
    Ok(url)
}

/// Ask `endpoint` for this host's public IP (`{"ip": "<address>"}`).
pub async fn lookup_public_ip(client: &Client, endpoint: &str) -> Result<IpAddr, DiscoveryError> {
    let response = client.get(endpoint).send().await.map_err(|e| {
        warn!(%endpoint, error = %e, "ip lookup failed");
        DiscoveryError::Request(e.to_string())
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(DiscoveryError::Request(format!("HTTP {status} from {endpoint}")));
    }

    let body: IpLookup = response
        .json()
        .await
        .map_err(|e| DiscoveryError::Shape(format!("expected {{\"ip\": string}}: {e}")))?;

    body.ip
        .trim()
        .parse::<IpAddr>()
        .map_err(|_| DiscoveryError::Shape(format!("not an ip address: {:?}", body.ip)))
}

/// `http://{ip}:{port}`, bracketing IPv6 addresses.
pub fn backend_url_for(ip: IpAddr, port: u16) -> String {
    match ip {
        IpAddr::V4(v4) => format!("http://{v4}:{port}"),
        IpAddr::V6(v6) => format!("http://[{v6}]:{port}"),
    }
}
