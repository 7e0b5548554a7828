use crate::config::TransportConfig;
use crate::errors::Result;
use tracing::debug;

/// Builds the per-run HTTP client.
///
/// The client owns a keep-alive connection pool. It is created at the start
/// of a run and dropped at its end, so no sockets outlive the run.
/// `connect_timeout` covers the TCP dial and the TLS handshake.
pub fn build_client(config: &TransportConfig) -> Result<reqwest::Client> {
    debug!(
        "Building HTTP client: connect_timeout={:?}, request_timeout={:?}, max_idle_per_host={}",
        config.connect_timeout, config.request_timeout, config.pool_max_idle_per_host
    );

    let client = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .tcp_keepalive(config.tcp_keepalive)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .build()?;

    Ok(client)
}
