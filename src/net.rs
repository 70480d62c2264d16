//! Persistent outbound connection to the collector.
//!
//! The connection manager owns zero-or-one live TCP stream. Dial and write
//! deadlines are bounded; any write fault drops the stream so the next
//! `ensure_connected` call redials.

use crate::config::{ForwarderConfig, ServerAddress};
use crate::status::StatusHub;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection lifecycle states, as observed by status consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Backoff,
}

impl ConnectionState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Backoff => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Backoff,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Backoff => "backoff",
        };
        write!(f, "{name}")
    }
}

/// Errors from dialing or writing the collector connection.
#[derive(Debug)]
pub enum NetError {
    /// Dial failure: resolution failed or no address accepted the connection
    Connect(String),
    /// Mid-stream I/O fault; the connection has been dropped
    Write(String),
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Connect(msg) => write!(f, "connection error: {msg}"),
            NetError::Write(msg) => write!(f, "write error: {msg}"),
        }
    }
}

impl std::error::Error for NetError {}

/// Owns the single outbound stream to the collector.
///
/// Exclusively held by the forwarder thread; there are never concurrent
/// writers on the socket.
pub struct ConnectionManager {
    server: ServerAddress,
    dial_timeout: Duration,
    write_timeout: Duration,
    dial_attempts: u32,
    stream: Option<TcpStream>,
    state: ConnectionState,
    hub: StatusHub,
}

impl ConnectionManager {
    pub fn new(server: ServerAddress, config: &ForwarderConfig, hub: StatusHub) -> Self {
        Self {
            server,
            dial_timeout: config.dial_timeout,
            write_timeout: config.write_timeout,
            dial_attempts: config.dial_attempts.max(1),
            stream: None,
            state: ConnectionState::Disconnected,
            hub,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            self.state = state;
            self.hub.connection_changed(state);
        }
    }

    /// Return with a live connection, dialing a bounded number of times if
    /// necessary. Never loops forever; backoff between calls is the
    /// caller's concern.
    pub fn ensure_connected(&mut self) -> Result<(), NetError> {
        if self.stream.is_some() {
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);
        let mut last_error = None;
        for attempt in 1..=self.dial_attempts {
            match self.dial() {
                Ok(stream) => {
                    info!(server = %self.server, attempt, "connected to collector");
                    self.stream = Some(stream);
                    self.set_state(ConnectionState::Connected);
                    return Ok(());
                }
                Err(e) => {
                    debug!(server = %self.server, attempt, error = %e, "dial failed");
                    last_error = Some(e);
                }
            }
        }
        self.set_state(ConnectionState::Disconnected);
        Err(last_error
            .unwrap_or_else(|| NetError::Connect(format!("unable to dial {}", self.server))))
    }

    fn dial(&self) -> Result<TcpStream, NetError> {
        let addrs: Vec<SocketAddr> = (self.server.host.as_str(), self.server.port)
            .to_socket_addrs()
            .map_err(|e| NetError::Connect(format!("resolve {}: {e}", self.server)))?
            .collect();
        if addrs.is_empty() {
            return Err(NetError::Connect(format!(
                "no addresses for {}",
                self.server
            )));
        }

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.dial_timeout) {
                Ok(stream) => {
                    stream
                        .set_write_timeout(Some(self.write_timeout))
                        .map_err(|e| NetError::Connect(format!("set write timeout: {e}")))?;
                    // Lines are tiny; coalescing them adds latency for nothing.
                    let _ = stream.set_nodelay(true);
                    return Ok(stream);
                }
                Err(e) => {
                    last_error = Some(NetError::Connect(format!("dial {addr}: {e}")));
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| NetError::Connect(format!("unable to dial {}", self.server))))
    }

    /// Write the full byte sequence to the live connection.
    ///
    /// Any fault drops the stream and marks the manager disconnected so the
    /// next `ensure_connected` redials.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), NetError> {
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Err(NetError::Write("not connected".to_string())),
        };

        if let Err(e) = stream.write_all(bytes).and_then(|()| stream.flush()) {
            warn!(server = %self.server, error = %e, "write failed, dropping connection");
            self.stream = None;
            self.set_state(ConnectionState::Disconnected);
            return Err(NetError::Write(e.to_string()));
        }
        Ok(())
    }

    /// Mark the manager as waiting out a backoff period.
    pub fn mark_backoff(&mut self) {
        if self.stream.is_none() {
            self.set_state(ConnectionState::Backoff);
        }
    }

    /// Release the socket deterministically.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}
