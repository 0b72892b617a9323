//! WebSocket hub for live-reload signals.
//!
//! An acceptor thread performs WebSocket handshakes and registers browser
//! sessions; pipeline orchestrators call [`ReloadHub::broadcast`] after a
//! successful pass. Signals are fire-and-forget: a dead connection is
//! dropped on the next send, and no ordering is guaranteed between signals.

use anyhow::Result;
use parking_lot::Mutex;
use serde::Serialize;
use std::{
    net::{TcpListener, TcpStream},
    sync::Arc,
    time::Duration,
};
use tungstenite::{WebSocket, protocol::Message};

/// Maximum port retry attempts
const MAX_PORT_RETRIES: u16 = 10;

/// Accept-loop poll interval
const ACCEPT_POLL: Duration = Duration::from_millis(100);

// ============================================================================
// Messages
// ============================================================================

/// Push message sent to connected browser sessions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReloadMessage {
    /// Handshake acknowledgement sent to every new client
    Connected,
    /// A pipeline pass finished for the named category
    Reload { category: &'static str },
    /// A pass failed; shown as an overlay in the browser
    Error { path: String, message: String },
}

impl ReloadMessage {
    pub fn to_json(&self) -> String {
        // Serializing a field-struct enum of strings cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ============================================================================
// Hub
// ============================================================================

/// Client registry plus the acceptor that feeds it.
pub struct ReloadHub {
    port: u16,
    clients: Mutex<Vec<WebSocket<TcpStream>>>,
}

impl ReloadHub {
    /// Bind the reload listener (retrying on a busy port) and spawn the
    /// acceptor thread. The hub lives for the rest of the process.
    pub fn start(base_port: u16) -> Result<Arc<Self>> {
        let (listener, port) = try_bind_port(base_port, MAX_PORT_RETRIES)?;
        listener.set_nonblocking(true)?;

        let hub = Arc::new(Self {
            port,
            clients: Mutex::new(Vec::new()),
        });

        let hub_for_acceptor = Arc::clone(&hub);
        std::thread::spawn(move || hub_for_acceptor.accept_loop(listener));

        Ok(hub)
    }

    /// Actual bound port (may differ from the configured one after retry)
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[allow(dead_code)]
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Send a message to every connected client, dropping dead connections.
    pub fn broadcast(&self, msg: &ReloadMessage) {
        let text = msg.to_json();
        let mut clients = self.clients.lock();

        if clients.is_empty() {
            return;
        }

        clients.retain_mut(|ws| match ws.send(Message::Text(text.clone().into())) {
            Ok(()) => true,
            Err(err) => {
                crate::log!("reload"; "client dropped: {err}");
                false
            }
        });
    }

    fn accept_loop(&self, listener: TcpListener) {
        loop {
            match listener.accept() {
                Ok((stream, _addr)) => self.add_client(stream),
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    crate::log!("reload"; "accept error: {e}");
                    std::thread::sleep(ACCEPT_POLL);
                }
            }
        }
    }

    /// Handshake a new connection and register it.
    fn add_client(&self, stream: TcpStream) {
        // Keep blocking mode during the handshake
        let _ = stream.set_nonblocking(false);

        match tungstenite::accept(stream) {
            Ok(mut ws) => {
                if let Err(e) = ws.send(Message::Text(ReloadMessage::Connected.to_json().into())) {
                    crate::log!("reload"; "failed to greet client: {e}");
                    return;
                }
                self.clients.lock().push(ws);
            }
            Err(e) => {
                crate::log!("reload"; "handshake failed: {e}");
            }
        }
    }
}

/// Try binding to port, retry with incremented port if in use
fn try_bind_port(base_port: u16, max_retries: u16) -> Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind(("127.0.0.1", port)) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                return Ok((listener, actual_port));
            }
            Err(e) => {
                last_error = Some(e);
            }
        }
    }

    Err(anyhow::anyhow!(
        "Failed to bind reload listener after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

// ============================================================================
// Tests
// ============================================================================
