//! Telemetry-channel receive loop.
//!
//! Datagrams are handled one at a time, including any status reply, so the
//! cycle tracker is owned by this loop and needs no locking.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use smarthub_hub_telemetry::CycleTracker;
use smarthub_oplog::OpLog;
use smarthub_protocol::constants::MAX_DATAGRAM_SIZE;
use smarthub_protocol::{StatusReply, decode_telemetry};

use crate::ServerError;

/// UDP receive loop for the telemetry channel.
pub struct TelemetryServer {
    socket: UdpSocket,
    local_addr: SocketAddr,
    tracker: CycleTracker,
    oplog: OpLog,
    cancel: CancellationToken,
}

impl TelemetryServer {
    /// Binds the socket. Port 0 picks an ephemeral port.
    pub async fn bind(
        addr: SocketAddr,
        packets_per_cycle: usize,
        oplog: OpLog,
        cancel: CancellationToken,
    ) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = socket.local_addr()?;

        Ok(Self {
            socket,
            local_addr,
            tracker: CycleTracker::with_target(packets_per_cycle),
            oplog,
            cancel,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn tracker(&self) -> &CycleTracker {
        &self.tracker
    }

    /// Decodes one datagram and feeds it to the cycle tracker.
    ///
    /// Returns the status reply owed to `from`, if the datagram closed a
    /// cycle. Malformed datagrams are logged and dropped.
    pub fn handle_datagram(&mut self, data: &[u8], from: SocketAddr) -> Option<StatusReply> {
        let line = String::from_utf8_lossy(data);
        let line = line.trim();
        self.oplog.record(format!("Received from {from}: {line}"));

        let packet = match decode_telemetry(data) {
            Ok(packet) => packet,
            Err(e) => {
                self.oplog
                    .warn(format!("Malformed packet from {from} ({e}): {line}"));
                return None;
            }
        };

        self.oplog.record(format!("DATA {}", packet.reading.raw_line));
        tracing::debug!(
            device = %packet.device_id,
            sensor = %packet.sensor_kind,
            value = %packet.value,
            seq = packet.reading.sequence,
            "telemetry reading"
        );

        self.tracker.ingest(&packet.device_id, packet.reading)
    }

    /// Receives datagrams until cancelled or until the socket fails.
    pub async fn run(mut self) -> Result<(), ServerError> {
        self.oplog.record(format!(
            "UDP Smart Hub Data Collector listening on {}",
            self.local_addr
        ));
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let (n, from) = tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("telemetry server shutting down");
                    return Ok(());
                }

                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok(received) => received,
                        Err(e) => {
                            self.oplog.warn(format!("Socket error on recv_from: {e}"));
                            return Err(ServerError::Receive(e));
                        }
                    }
                }
            };

            let Some(reply) = self.handle_datagram(&buf[..n], from) else {
                continue;
            };

            let status = reply.to_string();
            match self.socket.send_to(status.as_bytes(), from).await {
                Ok(_) => self
                    .oplog
                    .record(format!("Sent status to {from}: {status}")),
                Err(e) => self
                    .oplog
                    .warn(format!("Failed to send status to {from}: {e}")),
            }
        }
    }
}
