use std::net::SocketAddr;
use std::ops::Range;
use std::time::Duration;

use rand::Rng;
use tokio::net::UdpSocket;
use tracing::{info, warn};

use smarthub_protocol::constants::{PACKETS_PER_CYCLE, STATUS_TIMEOUT};
use smarthub_protocol::{StatusReply, decode_status, encode_telemetry};

use crate::DeviceError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A sensor reporting on the telemetry channel.
///
/// Each cycle sends `SEQ:1..=packets_per_cycle`, then waits for the hub's
/// status reply.
#[derive(Debug, Clone)]
pub struct TelemetryDevice {
    device_id: String,
    sensor_kind: String,
    packets_per_cycle: u32,
    /// Delay between readings within a cycle.
    interval: Duration,
    /// Delay between cycles.
    pause: Duration,
    status_timeout: Duration,
    values: Range<f64>,
}

impl TelemetryDevice {
    pub fn new(device_id: impl Into<String>, sensor_kind: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            sensor_kind: sensor_kind.into(),
            packets_per_cycle: PACKETS_PER_CYCLE as u32,
            interval: Duration::from_secs(2),
            pause: Duration::from_secs(3),
            status_timeout: STATUS_TIMEOUT,
            values: 20.0..30.0,
        }
    }

    pub fn with_packets_per_cycle(mut self, n: u32) -> Self {
        self.packets_per_cycle = n;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    /// Range the simulated values are drawn from.
    pub fn with_values(mut self, values: Range<f64>) -> Self {
        self.values = values;
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Builds one datagram with a fresh timestamp and random value.
    pub fn reading(&self, sequence: u32) -> Vec<u8> {
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        let value = rand::thread_rng().gen_range(self.values.clone());
        let value = format!("{:.1}", value);
        encode_telemetry(
            &self.device_id,
            &timestamp,
            &self.sensor_kind,
            &value,
            sequence,
        )
    }

    /// Sends the given sequence numbers, `interval` apart.
    ///
    /// Send failures are logged and skipped; telemetry is best effort.
    pub async fn send_sequences(
        &self,
        socket: &UdpSocket,
        hub: SocketAddr,
        sequences: impl IntoIterator<Item = u32>,
    ) {
        for seq in sequences {
            let packet = self.reading(seq);
            match socket.send_to(&packet, hub).await {
                Ok(_) => info!(device = %self.device_id, seq, "sent packet"),
                Err(e) => warn!(device = %self.device_id, seq, "failed to send packet: {e}"),
            }
            if !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
        }
    }

    /// Waits for a status reply. `None` on timeout.
    pub async fn await_status(&self, socket: &UdpSocket) -> Result<Option<StatusReply>, DeviceError> {
        let mut buf = [0u8; 1024];
        match tokio::time::timeout(self.status_timeout, socket.recv_from(&mut buf)).await {
            Ok(Ok((n, _))) => {
                let reply = decode_status(&buf[..n])?;
                info!(device = %self.device_id, "{reply}");
                Ok(Some(reply))
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!(device = %self.device_id, "no status received from hub (timeout)");
                Ok(None)
            }
        }
    }

    /// Runs `cycles` full cycles (forever if `None`), returning each
    /// cycle's status reply (`None` where none arrived in time).
    pub async fn run(
        &self,
        hub: SocketAddr,
        cycles: Option<usize>,
    ) -> Result<Vec<Option<StatusReply>>, DeviceError> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        info!(device = %self.device_id, %hub, "sending telemetry to smart hub");

        let mut replies = Vec::new();
        while cycles.is_none_or(|max| replies.len() < max) {
            self.send_sequences(&socket, hub, 1..=self.packets_per_cycle)
                .await;
            replies.push(self.await_status(&socket).await?);

            let done = cycles.is_some_and(|max| replies.len() >= max);
            if !done && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
        }
        Ok(replies)
    }
}

#[cfg(test)]
mod tests {
    use smarthub_protocol::decode_telemetry;

    use super::*;

    #[test]
    fn reading_is_well_formed() {
        let device = TelemetryDevice::new("Sensor01", "temperature").with_values(20.0..30.0);
        let packet = decode_telemetry(&device.reading(4)).unwrap();

        assert_eq!(packet.device_id, "Sensor01");
        assert_eq!(packet.sensor_kind, "temperature");
        assert_eq!(packet.reading.sequence, 4);
        assert_eq!(packet.timestamp.len(), 19);

        let value: f64 = packet.value.parse().unwrap();
        assert!((20.0..=30.0).contains(&value));
    }

    #[tokio::test]
    async fn run_collects_replies() {
        let hub = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let hub_addr = hub.local_addr().unwrap();

        let device = TelemetryDevice::new("Sensor01", "temperature")
            .with_packets_per_cycle(3)
            .with_interval(Duration::ZERO)
            .with_pause(Duration::ZERO);
        let task = tokio::spawn(async move { device.run(hub_addr, Some(1)).await });

        let mut buf = [0u8; 256];
        let mut from = None;
        for expected in 1..=3 {
            let (n, addr) = hub.recv_from(&mut buf).await.unwrap();
            let packet = decode_telemetry(&buf[..n]).unwrap();
            assert_eq!(packet.reading.sequence, expected);
            from = Some(addr);
        }
        hub.send_to(b"STATUS RECEIVED 3/3 PACKETS", from.unwrap())
            .await
            .unwrap();

        let replies = task.await.unwrap().unwrap();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].as_ref().unwrap().is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_status_times_out() {
        let device = TelemetryDevice::new("Sensor01", "temperature")
            .with_status_timeout(Duration::from_secs(5));
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        assert!(device.await_status(&socket).await.unwrap().is_none());
    }
}
