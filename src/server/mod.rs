/// Server management module for devloop-runner.
///
/// This module owns the supervised development server: spawning it as a
/// process-group leader, stopping it with SIGTERM then SIGKILL, and deciding
/// it is gone once its port can be bound again.
///
/// # Components
///
/// * `process` - The server handle and the [`ServerControl`] seam
/// * `port` - Loopback port probing and the bounded wait for a free port
/// * `signal` - Process-group signaling that tolerates vanished groups
/// * `lifecycle` - Journal of starts, stops and restart cycles
///
/// # Examples
///
/// Stopping a handle that never started is a no-op:
///
/// ```
/// use devloop_runner::config::{CommandConfig, Timings};
/// use devloop_runner::server::{LoopbackProbe, ServerProcess, ServerStatus};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> devloop_runner::Result<()> {
/// let mut server = ServerProcess::new(
///     CommandConfig::default_server(),
///     ".",
///     8080,
///     Timings::default(),
///     Arc::new(LoopbackProbe),
/// );
/// server.stop().await?;
/// assert_eq!(server.status(), ServerStatus::Stopped);
/// # Ok(())
/// # }
/// ```
pub mod lifecycle;
pub mod port;
mod process;
pub mod signal;

pub use lifecycle::{CycleId, LifecycleEvent, LifecycleJournal, LifecycleRecord};
pub use port::{wait_for_port_free, LoopbackProbe, PortProbe};
pub use process::{ServerControl, ServerProcess, ServerStatus};
pub use signal::{signal_group, GroupSignal, SignalDelivery};
