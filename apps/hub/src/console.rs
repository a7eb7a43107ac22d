//! Operator console: turns stdin lines into queued device commands.
//!
//! ```text
//! <device> <command...>   queue a command (e.g. `Sensor01 SET_INTERVAL 3`)
//! <device> quit           disconnect the device
//! list                    show registered devices
//! help                    show this text
//! ```

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use smarthub_hub_server::{CommandQueue, DeviceRegistry};
use smarthub_protocol::{Directive, is_quit};

const HELP: &str = "commands: <device> <command> (e.g. 'Sensor01 SET_INTERVAL 3', \
'Sensor01 ACTIVATE_ALARM', 'Sensor01 quit'), list, help";

pub struct Console {
    registry: DeviceRegistry,
    commands: Arc<CommandQueue>,
}

impl Console {
    pub fn new(registry: DeviceRegistry, commands: Arc<CommandQueue>) -> Self {
        Self { registry, commands }
    }

    /// Handles one operator line and returns the text to show, if any.
    pub fn handle_line(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match line {
            "help" => return Some(HELP.to_string()),
            "list" => return Some(self.list()),
            _ => {}
        }

        let Some((device, command)) = line.split_once(char::is_whitespace) else {
            return Some(format!("missing command for {line:?}; {HELP}"));
        };
        let command = command.trim();

        let Some(record) = self.registry.lookup(device) else {
            tracing::warn!(device, "command for unregistered device rejected");
            return Some(format!("device {device} is not registered"));
        };

        // Routed to the connection the device is registered on right now.
        if !self.commands.push(record.session, command) {
            return Some(format!("device {} is no longer connected", record.name));
        }

        if is_quit(command) {
            Some(format!("disconnecting {}", record.name))
        } else {
            let directive = Directive::parse(command);
            Some(format!(
                "queued {} command for {}: {directive}",
                directive.kind(),
                record.name
            ))
        }
    }

    fn list(&self) -> String {
        let devices = self.registry.devices();
        if devices.is_empty() {
            return "no devices registered".to_string();
        }
        devices
            .iter()
            .map(|d| format!("{} ({}) at {}", d.name, d.kind, d.endpoint))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Reads lines until `input` is exhausted.
    pub async fn run<R: AsyncBufRead + Unpin>(self, input: R) {
        let mut lines = input.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(reply) = self.handle_line(&line) {
                        println!("{reply}");
                    }
                }
                Ok(None) => {
                    tracing::info!("console input closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!("console read failed: {e}");
                    break;
                }
            }
        }
    }
}
