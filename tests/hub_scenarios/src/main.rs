fn main() {
    println!("Run `cargo test -p hub-scenarios` to execute end-to-end hub scenarios.");
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpStream, UdpSocket};
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;

    use smarthub_device_sim::{CommandDevice, TelemetryDevice};
    use smarthub_hub_server::{
        CommandQueue, DeviceRecord, DeviceRegistry, Hub, HubConfig, HubLogs, ServerError,
    };
    use smarthub_oplog::{MemorySink, OpLog};
    use smarthub_protocol::{Directive, StatusReply, decode_status, encode_telemetry};

    /// A hub on ephemeral ports with in-memory logs.
    struct TestHub {
        command_addr: SocketAddr,
        telemetry_addr: SocketAddr,
        registry: DeviceRegistry,
        commands: Arc<CommandQueue>,
        command_log: Arc<MemorySink>,
        telemetry_log: Arc<MemorySink>,
        task: JoinHandle<Result<(), ServerError>>,
        shutdown: CancellationToken,
    }

    async fn start_hub() -> TestHub {
        let config = HubConfig {
            command_addr: ([127, 0, 0, 1], 0).into(),
            telemetry_addr: ([127, 0, 0, 1], 0).into(),
            ack_timeout: Duration::from_secs(2),
            ..HubConfig::default()
        };
        let commands = Arc::new(CommandQueue::new());
        let command_log = Arc::new(MemorySink::default());
        let telemetry_log = Arc::new(MemorySink::default());
        let logs = HubLogs {
            command: OpLog::new(command_log.clone()),
            telemetry: OpLog::new(telemetry_log.clone()),
        };

        let hub = Hub::bind(config, commands.clone(), logs).await.unwrap();
        let command_addr = hub.command_addr();
        let telemetry_addr = hub.telemetry_addr();
        let registry = hub.registry();
        let shutdown = hub.shutdown_token();
        let task = tokio::spawn(hub.run());

        TestHub {
            command_addr,
            telemetry_addr,
            registry,
            commands,
            command_log,
            telemetry_log,
            task,
            shutdown,
        }
    }

    impl TestHub {
        async fn stop(self) {
            self.shutdown.cancel();
            self.commands.close();
            self.task.await.unwrap().unwrap();
        }
    }

    async fn wait_for<T>(mut probe: impl FnMut() -> Option<T>, what: &str) -> T {
        for _ in 0..400 {
            if let Some(value) = probe() {
                return value;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    /// Queues `command` on the connection `device` is registered on.
    fn send(
        registry: &DeviceRegistry,
        commands: &CommandQueue,
        device: &str,
        command: &str,
    ) -> bool {
        registry
            .lookup(device)
            .is_some_and(|record| commands.push(record.session, command))
    }

    impl TestHub {
        fn send(&self, device: &str, command: &str) -> bool {
            send(&self.registry, &self.commands, device, command)
        }
    }

    async fn wait_registered(registry: &DeviceRegistry, name: &str) -> DeviceRecord {
        wait_for(|| registry.lookup(name), name).await
    }

    fn reading(device: &str, seq: u32) -> Vec<u8> {
        encode_telemetry(device, "2024-05-01 12:00:00", "temperature", "22.5", seq)
    }

    async fn recv_status(socket: &UdpSocket) -> StatusReply {
        let mut buf = [0u8; 1024];
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("status reply")
            .unwrap();
        decode_status(&buf[..n]).unwrap()
    }

    async fn assert_no_status(socket: &UdpSocket) {
        let mut buf = [0u8; 1024];
        let pending =
            tokio::time::timeout(Duration::from_millis(100), socket.recv_from(&mut buf)).await;
        assert!(pending.is_err(), "unexpected status reply");
    }

    #[tokio::test]
    async fn command_is_delivered_and_acknowledged() {
        let hub = start_hub().await;

        let addr = hub.command_addr;
        let device = tokio::spawn(async move {
            CommandDevice::new("Sensor01", "temperature")
                .with_max_commands(1)
                .run(addr)
                .await
        });

        let record = wait_registered(&hub.registry, "Sensor01").await;
        assert_eq!(record.kind, "temperature");

        assert!(hub.send("Sensor01", "SET_INTERVAL 5"));
        let report = device.await.unwrap().unwrap();
        assert_eq!(report.executed, vec![Directive::SetInterval(5)]);
        assert!(!report.closed_by_hub);

        let log = hub.command_log.clone();
        wait_for(
            || log.contains("Received ACK from Sensor01: ACK Command Executed").then_some(()),
            "ack record",
        )
        .await;
        assert!(log.contains("Registered DEVICE=Sensor01 TYPE=temperature"));
        assert!(log.contains("Sent command to Sensor01: SET_INTERVAL 5"));

        hub.stop().await;
    }

    #[tokio::test]
    async fn session_stays_open_across_commands() {
        let hub = start_hub().await;

        let mut device = TcpStream::connect(hub.command_addr).await.unwrap();
        device
            .write_all(b"DEVICE Lamp01 TYPE light")
            .await
            .unwrap();
        wait_registered(&hub.registry, "Lamp01").await;

        let mut buf = [0u8; 1024];
        for command in ["ACTIVATE_ALARM", "SET_INTERVAL 30"] {
            assert!(hub.send("Lamp01", command));
            let n = device.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], format!("{command}\n").as_bytes());
            device.write_all(b"ACK Command Executed").await.unwrap();
        }
        assert!(hub.registry.lookup("Lamp01").is_some());

        assert!(hub.send("Lamp01", "quit"));
        let n = device.read(&mut buf).await.unwrap();
        assert_eq!(n, 0, "hub closes the connection on quit");

        let registry = hub.registry.clone();
        wait_for(|| registry.is_empty().then_some(()), "unregister").await;

        hub.stop().await;
    }

    #[tokio::test]
    async fn malformed_registration_gets_fallback_identity() {
        let hub = start_hub().await;

        let mut device = TcpStream::connect(hub.command_addr).await.unwrap();
        let port = device.local_addr().unwrap().port();
        device.write_all(b"HELLO").await.unwrap();

        let name = format!("UnknownDevice_{port}");
        let record = wait_registered(&hub.registry, &name).await;
        assert_eq!(record.kind, "unknown");
        assert!(hub.command_log.contains("Malformed registration"));

        hub.stop().await;
    }

    #[tokio::test]
    async fn disconnect_removes_device() {
        let hub = start_hub().await;

        let device = {
            let mut stream = TcpStream::connect(hub.command_addr).await.unwrap();
            stream
                .write_all(b"DEVICE Door01 TYPE contact")
                .await
                .unwrap();
            stream
        };
        wait_registered(&hub.registry, "Door01").await;
        drop(device);

        let registry = hub.registry.clone();
        wait_for(|| registry.lookup("Door01").is_none().then_some(()), "removal").await;
        assert!(hub.command_log.contains("Door01 disconnected"));

        hub.stop().await;
    }

    #[tokio::test]
    async fn reconnecting_device_takes_over_its_name() {
        let hub = start_hub().await;

        let mut stale = TcpStream::connect(hub.command_addr).await.unwrap();
        stale
            .write_all(b"DEVICE Sensor01 TYPE temperature")
            .await
            .unwrap();
        let first = wait_registered(&hub.registry, "Sensor01").await;

        let mut fresh = TcpStream::connect(hub.command_addr).await.unwrap();
        let fresh_addr = fresh.local_addr().unwrap();
        fresh
            .write_all(b"DEVICE Sensor01 TYPE temperature")
            .await
            .unwrap();
        let registry = hub.registry.clone();
        wait_for(
            || {
                registry
                    .lookup("Sensor01")
                    .filter(|record| record.session != first.session)
            },
            "re-registration",
        )
        .await;

        // The replaced connection is closed without being sent anything.
        let mut buf = [0u8; 64];
        assert_eq!(stale.read(&mut buf).await.unwrap(), 0);

        assert!(hub.send("Sensor01", "ACTIVATE_ALARM"));
        let n = fresh.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ACTIVATE_ALARM\n");
        fresh.write_all(b"ACK Command Executed").await.unwrap();

        let current = hub.registry.lookup("Sensor01").unwrap();
        assert_eq!(current.endpoint.port(), fresh_addr.port());

        hub.stop().await;
    }

    #[tokio::test]
    async fn ack_timeout_closes_session() {
        let config = HubConfig {
            command_addr: ([127, 0, 0, 1], 0).into(),
            telemetry_addr: ([127, 0, 0, 1], 0).into(),
            ack_timeout: Duration::from_millis(100),
            ..HubConfig::default()
        };
        let commands = Arc::new(CommandQueue::new());
        let log = Arc::new(MemorySink::default());
        let hub = Hub::bind(config, commands.clone(), HubLogs::shared(OpLog::new(log.clone())))
            .await
            .unwrap();
        let addr = hub.command_addr();
        let registry = hub.registry();
        let token = hub.shutdown_token();
        let task = tokio::spawn(hub.run());

        let mut device = TcpStream::connect(addr).await.unwrap();
        device
            .write_all(b"DEVICE Silent01 TYPE siren")
            .await
            .unwrap();
        wait_registered(&registry, "Silent01").await;

        assert!(send(&registry, &commands, "Silent01", "ACTIVATE_ALARM"));
        let mut buf = [0u8; 64];
        let n = device.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"ACTIVATE_ALARM\n");

        // Never acknowledge.
        let n = device.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
        assert!(log.contains("Timeout waiting for ACK from Silent01"));
        assert!(registry.is_empty());

        token.cancel();
        commands.close();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn full_cycle_gets_one_complete_reply() {
        let hub = start_hub().await;

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for seq in 1..=9 {
            socket
                .send_to(&reading("Sensor01", seq), hub.telemetry_addr)
                .await
                .unwrap();
        }
        assert_no_status(&socket).await;

        socket
            .send_to(&reading("Sensor01", 10), hub.telemetry_addr)
            .await
            .unwrap();
        let reply = recv_status(&socket).await;
        assert!(reply.is_complete());
        assert_eq!(reply.to_string(), "STATUS RECEIVED 10/10 PACKETS");

        // The next reading starts a fresh cycle.
        socket
            .send_to(&reading("Sensor01", 1), hub.telemetry_addr)
            .await
            .unwrap();
        assert_no_status(&socket).await;
        assert!(hub.telemetry_log.contains("DATA Sensor01"));

        hub.stop().await;
    }

    #[tokio::test]
    async fn gaps_and_duplicates_report_missing_sequences() {
        let hub = start_hub().await;

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for seq in [1, 3, 5, 7, 9, 9, 11, 12, 13, 14, 15] {
            socket
                .send_to(&reading("Sensor02", seq), hub.telemetry_addr)
                .await
                .unwrap();
        }

        let reply = recv_status(&socket).await;
        assert_eq!(reply.received, 10);
        assert_eq!(reply.target, 10);
        assert_eq!(reply.missing, vec![2, 4, 6, 8, 10]);
        assert_eq!(
            reply.to_string(),
            "STATUS RECEIVED 10/10 PACKETS; MISSING: [2, 4, 6, 8, 10]"
        );

        // The cycle was cleared when the reply went out.
        assert_no_status(&socket).await;

        hub.stop().await;
    }

    #[tokio::test]
    async fn malformed_datagram_is_ignored() {
        let hub = start_hub().await;

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket
            .send_to(b"garbage", hub.telemetry_addr)
            .await
            .unwrap();
        assert_no_status(&socket).await;

        let log = hub.telemetry_log.clone();
        wait_for(|| log.contains("Malformed packet").then_some(()), "malformed record").await;

        hub.stop().await;
    }

    #[tokio::test]
    async fn simulated_telemetry_device_completes_cycles() {
        let hub = start_hub().await;

        let device = TelemetryDevice::new("Sensor03", "humidity")
            .with_interval(Duration::ZERO)
            .with_pause(Duration::ZERO)
            .with_values(40.0..60.0);
        let replies = device.run(hub.telemetry_addr, Some(2)).await.unwrap();

        assert_eq!(replies.len(), 2);
        for reply in replies {
            assert!(reply.expect("status reply").is_complete());
        }

        hub.stop().await;
    }
}
