//! Command-channel session: one per accepted connection.
//!
//! ```text
//! AwaitingRegistration ──first message──▶ ActiveSession ──▶ Closed
//!          │                                  │
//!          └──────── peer closed ─────────────┴──▶ Closed
//! ```
//!
//! Entering `Closed` always removes the connection's registry record,
//! releases its command queue and shuts the connection down, whatever
//! caused the transition.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use smarthub_oplog::OpLog;
use smarthub_protocol::constants::{ACK_TIMEOUT, MAX_COMMAND_MESSAGE_SIZE};
use smarthub_protocol::{
    Directive, Registration, decode_ack, decode_registration, encode_command, is_quit,
};

use crate::command_source::CommandSource;
use crate::registry::{DeviceRecord, DeviceRegistry, SessionId};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer closed before sending a registration.
    PeerClosedBeforeRegistration,
    /// The peer closed while the session was waiting for a command.
    PeerClosed,
    /// The operator sent `quit`.
    Quit,
    /// The command source has no more commands for this device.
    CommandSourceClosed,
    /// The device registered again on another connection.
    Superseded,
    /// Writing a command failed.
    SendFailed,
    /// The peer closed while an acknowledgement was pending.
    AckChannelClosed,
    /// No acknowledgement arrived within the ack timeout.
    AckTimeout,
    /// Reading from the connection failed.
    ReadFailed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::PeerClosedBeforeRegistration => "peer closed before registering",
            CloseReason::PeerClosed => "peer closed",
            CloseReason::Quit => "quit",
            CloseReason::CommandSourceClosed => "command source closed",
            CloseReason::Superseded => "superseded by a newer registration",
            CloseReason::SendFailed => "send failed",
            CloseReason::AckChannelClosed => "ack channel closed",
            CloseReason::AckTimeout => "ack timeout",
            CloseReason::ReadFailed => "read failed",
        };
        f.write_str(text)
    }
}

/// Shared collaborators handed to every session.
pub struct SessionContext<C> {
    pub registry: DeviceRegistry,
    pub commands: Arc<C>,
    pub oplog: OpLog,
    pub ack_timeout: Duration,
}

impl<C> SessionContext<C> {
    pub fn new(registry: DeviceRegistry, commands: Arc<C>, oplog: OpLog) -> Self {
        Self {
            registry,
            commands,
            oplog,
            ack_timeout: ACK_TIMEOUT,
        }
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }
}

impl<C> Clone for SessionContext<C> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            commands: Arc::clone(&self.commands),
            oplog: self.oplog.clone(),
            ack_timeout: self.ack_timeout,
        }
    }
}

enum SessionState {
    AwaitingRegistration,
    Active(Registration),
    Closed(CloseReason),
}

/// Releases the session's command queue and removes the connection's
/// registry record exactly once: explicitly on entering `Closed`, or on
/// drop if the session future is abandoned.
struct Teardown<C: CommandSource> {
    registry: DeviceRegistry,
    commands: Arc<C>,
    endpoint: SocketAddr,
    session: SessionId,
    done: bool,
}

impl<C: CommandSource> Teardown<C> {
    fn new(ctx: &SessionContext<C>, endpoint: SocketAddr, session: SessionId) -> Self {
        Self {
            registry: ctx.registry.clone(),
            commands: Arc::clone(&ctx.commands),
            endpoint,
            session,
            done: false,
        }
    }

    fn run(&mut self) -> Option<DeviceRecord> {
        if std::mem::replace(&mut self.done, true) {
            return None;
        }
        self.commands.release(self.session);
        self.registry.unregister_by_endpoint(self.endpoint)
    }
}

impl<C: CommandSource> Drop for Teardown<C> {
    fn drop(&mut self) {
        self.run();
    }
}

fn message_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// One device connection on the command channel.
pub struct Session<S, C> {
    stream: S,
    peer: SocketAddr,
    id: SessionId,
    ctx: SessionContext<C>,
    buf: Vec<u8>,
}

impl<S, C> Session<S, C>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    C: CommandSource,
{
    pub fn new(stream: S, peer: SocketAddr, ctx: SessionContext<C>) -> Self {
        Self {
            stream,
            peer,
            id: SessionId::new_v4(),
            ctx,
            buf: vec![0u8; MAX_COMMAND_MESSAGE_SIZE],
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Drives the session to completion and returns why it closed.
    pub async fn run(mut self) -> CloseReason {
        let mut teardown = Teardown::new(&self.ctx, self.peer, self.id);
        self.ctx
            .oplog
            .record(format!("Connected to device at {}", self.peer));

        let mut state = SessionState::AwaitingRegistration;
        let reason = loop {
            state = match state {
                SessionState::AwaitingRegistration => self.await_registration().await,
                SessionState::Active(device) => self.command_loop(&device).await,
                SessionState::Closed(reason) => break reason,
            };
        };

        if let Some(record) = teardown.run() {
            debug!(device = %record.name, "device unregistered");
        }
        if let Err(e) = self.stream.shutdown().await {
            debug!(peer = %self.peer, "shutdown after close failed: {e}");
        }
        self.ctx
            .oplog
            .record(format!("Connection to {} closed ({reason})", self.peer));
        reason
    }

    async fn await_registration(&mut self) -> SessionState {
        let n = match self.stream.read(&mut self.buf).await {
            Ok(0) => {
                self.ctx.oplog.record(format!(
                    "Empty registration from {}, closing.",
                    self.peer
                ));
                return SessionState::Closed(CloseReason::PeerClosedBeforeRegistration);
            }
            Ok(n) => n,
            Err(e) => {
                self.ctx.oplog.warn(format!(
                    "Error reading registration from {}: {e}",
                    self.peer
                ));
                return SessionState::Closed(CloseReason::ReadFailed);
            }
        };

        let raw = &self.buf[..n];
        self.ctx
            .oplog
            .record(format!("Received registration: {}", message_text(raw)));

        let registration = match decode_registration(raw) {
            Ok(registration) => registration,
            Err(e) => {
                let fallback = Registration::fallback(self.peer.port());
                self.ctx.oplog.warn(format!(
                    "Malformed registration from {} ({e}), using fallback name {}",
                    self.peer, fallback.name
                ));
                fallback
            }
        };

        let record = DeviceRecord {
            name: registration.name.clone(),
            kind: registration.kind.clone(),
            endpoint: self.peer,
            session: self.id,
        };
        // The queue exists before the record is visible to operators.
        self.ctx.commands.open(self.id, &registration.name);
        if let Some(previous) = self.ctx.registry.register(record) {
            self.ctx.oplog.record(format!(
                "DEVICE={} re-registered, replacing connection from {}",
                previous.name, previous.endpoint
            ));
            // Wakes the replaced session so it closes instead of lingering.
            self.ctx.commands.release(previous.session);
        }

        self.ctx.oplog.record(format!(
            "Registered DEVICE={} TYPE={}",
            registration.name, registration.kind
        ));
        SessionState::Active(registration)
    }

    async fn command_loop(&mut self, device: &Registration) -> SessionState {
        let Self {
            stream,
            ctx,
            buf,
            id,
            peer,
        } = self;
        let (id, peer) = (*id, *peer);
        let name = device.name.as_str();

        loop {
            // Watch the connection while waiting so a device that hangs up
            // between commands is dropped from the registry promptly.
            let command = tokio::select! {
                command = ctx.commands.next_command(id) => command,
                read = stream.read(buf) => {
                    match read {
                        Ok(0) => {
                            ctx.oplog.record(format!("Device {name} disconnected"));
                            return SessionState::Closed(CloseReason::PeerClosed);
                        }
                        Ok(n) => {
                            ctx.oplog.record(format!(
                                "Unsolicited message from {name}: {}",
                                message_text(&buf[..n])
                            ));
                            continue;
                        }
                        Err(e) => {
                            ctx.oplog.warn(format!("Error reading from {name}: {e}"));
                            return SessionState::Closed(CloseReason::ReadFailed);
                        }
                    }
                }
            };

            let Some(command) = command else {
                let replaced = ctx
                    .registry
                    .lookup(name)
                    .is_some_and(|current| current.session != id);
                if replaced {
                    ctx.oplog.record(format!(
                        "{name} re-registered elsewhere, closing connection from {peer}"
                    ));
                    return SessionState::Closed(CloseReason::Superseded);
                }
                ctx.oplog
                    .record(format!("No more commands for {name}, closing connection"));
                return SessionState::Closed(CloseReason::CommandSourceClosed);
            };
            let command = command.trim();

            if is_quit(command) {
                ctx.oplog.record(format!("Closing connection with {name}"));
                return SessionState::Closed(CloseReason::Quit);
            }
            if command.is_empty() {
                continue;
            }

            let directive = Directive::parse(command);
            let sent: std::io::Result<()> = async {
                stream.write_all(&encode_command(command)).await?;
                stream.flush().await
            }
            .await;
            if let Err(e) = sent {
                ctx.oplog.warn(format!("Error sending to {name}: {e}"));
                return SessionState::Closed(CloseReason::SendFailed);
            }
            debug!(device = name, kind = directive.kind(), "command sent");
            ctx.oplog.record(format!("Sent command to {name}: {command}"));

            match tokio::time::timeout(ctx.ack_timeout, stream.read(buf)).await {
                Ok(Ok(0)) => {
                    ctx.oplog.warn(format!(
                        "Connection closed while waiting for ACK from {name}"
                    ));
                    return SessionState::Closed(CloseReason::AckChannelClosed);
                }
                Ok(Ok(n)) => {
                    let (ack, expected) = decode_ack(&buf[..n]);
                    if expected {
                        ctx.oplog.record(format!("Received ACK from {name}: {ack}"));
                    } else {
                        ctx.oplog.warn(format!(
                            "Received unexpected acknowledgement from {name}: {ack}"
                        ));
                    }
                }
                Ok(Err(e)) => {
                    ctx.oplog
                        .warn(format!("Error waiting for ACK from {name}: {e}"));
                    return SessionState::Closed(CloseReason::ReadFailed);
                }
                Err(_) => {
                    ctx.oplog.warn(format!("Timeout waiting for ACK from {name}"));
                    return SessionState::Closed(CloseReason::AckTimeout);
                }
            }
        }
    }
}
