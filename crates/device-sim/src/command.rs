use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, warn};

use smarthub_protocol::constants::MAX_COMMAND_MESSAGE_SIZE;
use smarthub_protocol::{Directive, encode_ack, encode_registration};

use crate::DeviceError;

/// What a command device saw before its session ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandDeviceReport {
    /// Commands received and acknowledged, in order.
    pub executed: Vec<Directive>,
    /// Whether the hub closed the connection (as opposed to the device
    /// stopping after its command budget).
    pub closed_by_hub: bool,
}

/// A device on the command channel.
#[derive(Debug, Clone)]
pub struct CommandDevice {
    name: String,
    kind: String,
    max_commands: Option<usize>,
}

impl CommandDevice {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            max_commands: None,
        }
    }

    /// Disconnect after acknowledging `n` commands.
    pub fn with_max_commands(mut self, n: usize) -> Self {
        self.max_commands = Some(n);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Connects to the hub, registers, and acknowledges commands until the
    /// hub closes the connection or the command budget is spent.
    pub async fn run(&self, hub: SocketAddr) -> Result<CommandDeviceReport, DeviceError> {
        let stream = TcpStream::connect(hub).await?;
        info!(device = %self.name, %hub, "connected to smart hub");
        self.run_on(stream).await
    }

    /// Same as [`run`](Self::run) over an already connected stream.
    pub async fn run_on(&self, mut stream: TcpStream) -> Result<CommandDeviceReport, DeviceError> {
        stream
            .write_all(&encode_registration(&self.name, &self.kind))
            .await?;
        info!(device = %self.name, kind = %self.kind, "sent registration");

        let mut report = CommandDeviceReport::default();
        let mut buf = vec![0u8; MAX_COMMAND_MESSAGE_SIZE];

        loop {
            if self
                .max_commands
                .is_some_and(|max| report.executed.len() >= max)
            {
                info!(device = %self.name, "command budget spent, disconnecting");
                break;
            }

            let n = stream.read(&mut buf).await?;
            if n == 0 {
                info!(device = %self.name, "hub closed connection");
                report.closed_by_hub = true;
                break;
            }

            let command = String::from_utf8_lossy(&buf[..n]).trim().to_string();
            let directive = Directive::parse(&command);
            self.execute(&directive);

            stream.write_all(&encode_ack()).await?;
            report.executed.push(directive);
        }

        Ok(report)
    }

    fn execute(&self, directive: &Directive) {
        match directive {
            Directive::SetInterval(secs) => info!(
                device = %self.name,
                "changing reporting interval to {secs} seconds (simulated)"
            ),
            Directive::ActivateAlarm => {
                info!(device = %self.name, "alarm activated (simulated)")
            }
            Directive::Generic(text) if text.starts_with("SET_INTERVAL") => {
                warn!(device = %self.name, "malformed SET_INTERVAL command: {text}")
            }
            Directive::Generic(text) => {
                info!(device = %self.name, "executing generic command: {text}")
            }
        }
    }
}
