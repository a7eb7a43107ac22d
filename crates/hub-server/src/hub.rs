//! Composition root: owns the registry and runs both channels.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use smarthub_oplog::OpLog;
use smarthub_protocol::constants::{
    ACK_TIMEOUT, DEFAULT_COMMAND_PORT, DEFAULT_TELEMETRY_PORT, PACKETS_PER_CYCLE,
};

use crate::ServerError;
use crate::command_source::CommandSource;
use crate::registry::DeviceRegistry;
use crate::server::CommandServer;
use crate::session::SessionContext;
use crate::telemetry::TelemetryServer;

/// Hub listening configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// TCP address for the command channel (port 0 = OS-assigned).
    pub command_addr: SocketAddr,
    /// UDP address for the telemetry channel (port 0 = OS-assigned).
    pub telemetry_addr: SocketAddr,
    pub packets_per_cycle: usize,
    pub ack_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_addr: ([127, 0, 0, 1], DEFAULT_COMMAND_PORT).into(),
            telemetry_addr: ([127, 0, 0, 1], DEFAULT_TELEMETRY_PORT).into(),
            packets_per_cycle: PACKETS_PER_CYCLE,
            ack_timeout: ACK_TIMEOUT,
        }
    }
}

/// Operational logs for the two channels.
#[derive(Debug, Clone)]
pub struct HubLogs {
    pub command: OpLog,
    pub telemetry: OpLog,
}

impl HubLogs {
    /// Both channels write to `log`.
    pub fn shared(log: OpLog) -> Self {
        Self {
            command: log.clone(),
            telemetry: log,
        }
    }
}

/// A bound hub, ready to serve both channels.
pub struct Hub<C> {
    registry: DeviceRegistry,
    command_server: CommandServer<C>,
    telemetry_server: TelemetryServer,
    cancel: CancellationToken,
}

impl<C: CommandSource> Hub<C> {
    /// Binds both channels. Failing to bind either is fatal to the hub.
    pub async fn bind(
        config: HubConfig,
        commands: Arc<C>,
        logs: HubLogs,
    ) -> Result<Self, ServerError> {
        let registry = DeviceRegistry::new();
        let cancel = CancellationToken::new();

        let ctx = SessionContext::new(registry.clone(), commands, logs.command)
            .with_ack_timeout(config.ack_timeout);
        let command_server =
            CommandServer::bind(config.command_addr, ctx, cancel.child_token()).await?;
        let telemetry_server = TelemetryServer::bind(
            config.telemetry_addr,
            config.packets_per_cycle,
            logs.telemetry,
            cancel.child_token(),
        )
        .await?;

        Ok(Self {
            registry,
            command_server,
            telemetry_server,
            cancel,
        })
    }

    /// Handle to the hub's device registry.
    pub fn registry(&self) -> DeviceRegistry {
        self.registry.clone()
    }

    pub fn command_addr(&self) -> SocketAddr {
        self.command_server.local_addr()
    }

    pub fn telemetry_addr(&self) -> SocketAddr {
        self.telemetry_server.local_addr()
    }

    /// Token that stops both listening loops when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Serves both channels until shut down.
    ///
    /// A failure in one loop is logged and ends that loop only; the other
    /// keeps running. Returns the first failure once both loops are done.
    pub async fn run(self) -> Result<(), ServerError> {
        let (commands, telemetry) =
            tokio::join!(self.command_server.run(), self.telemetry_server.run());

        if let Err(e) = &commands {
            tracing::error!("command channel stopped: {e}");
        }
        if let Err(e) = &telemetry {
            tracing::error!("telemetry channel stopped: {e}");
        }
        commands.and(telemetry)
    }
}
