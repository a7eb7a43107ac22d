//! Application orchestrator: wires the hub, its logs and the console.

use std::sync::Arc;

use tokio::io::BufReader;

use smarthub_hub_server::{CommandQueue, Hub, HubLogs};
use smarthub_oplog::OpLog;

use crate::config::Config;
use crate::console::Console;

/// Runs the hub until Ctrl-C or until both channels stop.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let hub_config = config.hub_config()?;
    let logs = HubLogs {
        command: OpLog::file(&config.command_log)?,
        telemetry: OpLog::file(&config.telemetry_log)?,
    };

    let commands = Arc::new(CommandQueue::new());
    let hub = Hub::bind(hub_config, Arc::clone(&commands), logs).await?;
    tracing::info!(
        command = %hub.command_addr(),
        telemetry = %hub.telemetry_addr(),
        "smart hub ready"
    );

    // -- Operator console --
    let console = Console::new(hub.registry(), Arc::clone(&commands));
    println!("Enter '<device> <command>' to send a command, 'list' for devices, 'help' for usage.");
    tokio::spawn(console.run(BufReader::new(tokio::io::stdin())));

    // -- Serve until shutdown --
    let shutdown = hub.shutdown_token();
    let mut hub_task = tokio::spawn(hub.run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
        }
        result = &mut hub_task => {
            result??;
            tracing::warn!("both hub channels stopped");
            return Ok(());
        }
    }

    // Stop accepting, then let waiting sessions close their connections.
    shutdown.cancel();
    commands.close();
    hub_task.await??;
    Ok(())
}
