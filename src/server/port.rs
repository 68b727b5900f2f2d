use crate::error::{Error, Result};
use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{self, Instant};

/// Answers whether a TCP port is currently held by some process.
#[async_trait]
pub trait PortProbe: Send + Sync {
    /// Returns `true` while something is bound to `port`.
    async fn is_port_in_use(&self, port: u16) -> bool;
}

/// Probes a port by trying to bind it on loopback.
///
/// Any bind failure (address in use, permission denied, ...) counts as "in
/// use"; a successful bind is released immediately and counts as "free".
/// This approximates "the previous server is gone": it says nothing about
/// which process holds the port, only that it is held.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopbackProbe;

#[async_trait]
impl PortProbe for LoopbackProbe {
    async fn is_port_in_use(&self, port: u16) -> bool {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                drop(listener);
                false
            }
            Err(e) => {
                tracing::trace!(port, error = %e, "Port bind failed, treating as in use");
                true
            }
        }
    }
}

/// Polls `probe` every `poll_interval` until `port` is free.
///
/// # Errors
///
/// Returns [`Error::Timeout`] once more than `timeout` has elapsed with the
/// port still in use.
pub async fn wait_for_port_free(
    probe: &dyn PortProbe,
    port: u16,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let started = Instant::now();
    while probe.is_port_in_use(port).await {
        if started.elapsed() > timeout {
            return Err(Error::Timeout(format!(
                "port {} still in use after {}ms",
                port,
                timeout.as_millis()
            )));
        }
        time::sleep(poll_interval).await;
    }

    tracing::trace!(port, waited_ms = started.elapsed().as_millis() as u64, "Port is free");
    Ok(())
}
