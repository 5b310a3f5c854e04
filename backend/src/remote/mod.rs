use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Shared handle to the configured remote-access backend.
pub type RemoteHandle = Arc<dyn RemoteAccess>;

/// Error types for remote-access operations
#[derive(Debug, Clone)]
pub enum RemoteError {
    Unreachable(String),
    BackendUnavailable(String),
    Timeout,
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::Unreachable(msg) => write!(f, "Endpoint unreachable: {}", msg),
            RemoteError::BackendUnavailable(msg) => {
                write!(f, "Remote-access backend unavailable: {}", msg)
            }
            RemoteError::Timeout => write!(f, "Probe timeout"),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Backend used to verify that a controller's remote-access port is
/// actually reachable. The tunnel provisioning itself lives elsewhere;
/// this only answers "can we connect right now".
#[async_trait]
pub trait RemoteAccess: Send + Sync {
    /// Returns Ok(true) when a TCP connection to the port succeeds,
    /// Ok(false) when the port refuses, and Err when the probe backend
    /// itself cannot be used.
    async fn probe_port(&self, port: u16) -> Result<bool, RemoteError>;
}

/// Probes tunnel ports on the tunnel terminator host with a short timeout.
pub struct TcpRemoteAccess {
    host: String,
    timeout: Duration,
}

impl TcpRemoteAccess {
    pub fn new(host: String) -> Self {
        Self {
            host,
            timeout: Duration::from_secs(3),
        }
    }
}

#[async_trait]
impl RemoteAccess for TcpRemoteAccess {
    async fn probe_port(&self, port: u16) -> Result<bool, RemoteError> {
        let addr = format!("{}:{}", self.host, port);

        match tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => Ok(true),
            Ok(Err(e)) => {
                // Connection refused means the tunnel is down, not that the
                // probe backend failed.
                if e.kind() == std::io::ErrorKind::ConnectionRefused {
                    Ok(false)
                } else {
                    Err(RemoteError::Unreachable(e.to_string()))
                }
            }
            Err(_) => Err(RemoteError::Timeout),
        }
    }
}
