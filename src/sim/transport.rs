use crate::device::{
    DeviceInfo, DeviceTransport, DiscoveryOptions, HandshakeEvent, LightCommand, LightId,
};
use crate::error::{FacelightError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Scripted bridge transport.
///
/// Discovery answers are consumed in order, falling back to a fixed answer
/// once the script runs out. Handshakes replay a per-device script; the
/// sender stays available through [`SimulatedDeviceTransport::emit`] so tests
/// can inject late events.
pub struct SimulatedDeviceTransport {
    probes: Mutex<VecDeque<Result<Vec<DeviceInfo>>>>,
    fallback: Vec<DeviceInfo>,
    probe_count: AtomicU32,
    probe_delay: Duration,
    handshakes: Mutex<HashMap<String, Vec<HandshakeEvent>>>,
    open_handshakes: Mutex<HashMap<String, mpsc::Sender<HandshakeEvent>>>,
    light_count: usize,
    failing_lights: HashSet<usize>,
    commands: Mutex<Vec<(DeviceInfo, LightCommand)>>,
    disconnects: Mutex<Vec<DeviceInfo>>,
}

impl Default for SimulatedDeviceTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDeviceTransport {
    pub fn new() -> Self {
        Self {
            probes: Mutex::new(VecDeque::new()),
            fallback: Vec::new(),
            probe_count: AtomicU32::new(0),
            probe_delay: Duration::ZERO,
            handshakes: Mutex::new(HashMap::new()),
            open_handshakes: Mutex::new(HashMap::new()),
            light_count: 3,
            failing_lights: HashSet::new(),
            commands: Mutex::new(Vec::new()),
            disconnects: Mutex::new(Vec::new()),
        }
    }

    /// A bridge that shows up on probe `found_on` and authenticates at once
    pub fn with_bridge(device: DeviceInfo, found_on: u32, lights: usize) -> Self {
        let transport = Self::new()
            .with_lights(lights)
            .with_fallback(vec![device.clone()])
            .with_handshake(&device, vec![HandshakeEvent::Connected, HandshakeEvent::Authenticated]);
        for _ in 0..found_on {
            transport.push_probe(Ok(Vec::new()));
        }
        transport
    }

    pub fn with_fallback(mut self, devices: Vec<DeviceInfo>) -> Self {
        self.fallback = devices;
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn with_lights(mut self, count: usize) -> Self {
        self.light_count = count;
        self
    }

    /// Commands to the fixture at `index` report an error
    pub fn with_failing_light(mut self, index: usize) -> Self {
        self.failing_lights.insert(index);
        self
    }

    pub fn with_handshake(self, device: &DeviceInfo, events: Vec<HandshakeEvent>) -> Self {
        self.handshakes
            .lock()
            .insert(device.unique_id().to_string(), events);
        self
    }

    pub fn push_probe(&self, result: Result<Vec<DeviceInfo>>) {
        self.probes.lock().push_back(result);
    }

    pub fn probe_count(&self) -> u32 {
        self.probe_count.load(Ordering::SeqCst)
    }

    /// Push a handshake event on the stream opened for `device`
    pub async fn emit(&self, device: &DeviceInfo, event: HandshakeEvent) -> bool {
        let sender = self.open_handshakes.lock().get(device.unique_id()).cloned();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }

    pub fn commands(&self) -> Vec<(DeviceInfo, LightCommand)> {
        self.commands.lock().clone()
    }

    pub fn disconnects(&self) -> Vec<DeviceInfo> {
        self.disconnects.lock().clone()
    }
}

#[async_trait]
impl DeviceTransport for SimulatedDeviceTransport {
    async fn discover(&self, _options: &DiscoveryOptions) -> Result<Vec<DeviceInfo>> {
        let probe = self.probe_count.fetch_add(1, Ordering::SeqCst);
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        let scripted = self.probes.lock().pop_front();
        debug!("Simulated discovery probe {}", probe);
        scripted.unwrap_or_else(|| Ok(self.fallback.clone()))
    }

    async fn connect(&self, device: &DeviceInfo) -> Result<mpsc::Receiver<HandshakeEvent>> {
        let script = self
            .handshakes
            .lock()
            .get(device.unique_id())
            .cloned()
            .unwrap_or_default();

        let (tx, rx) = mpsc::channel(16);
        for event in script {
            tx.send(event)
                .await
                .map_err(|e| FacelightError::transport(e.to_string()))?;
        }
        self.open_handshakes
            .lock()
            .insert(device.unique_id().to_string(), tx);
        Ok(rx)
    }

    async fn disconnect(&self, device: &DeviceInfo) -> Result<()> {
        self.open_handshakes.lock().remove(device.unique_id());
        self.disconnects.lock().push(device.clone());
        Ok(())
    }

    async fn lights(&self, _device: &DeviceInfo) -> Result<Vec<LightId>> {
        Ok((1..=self.light_count)
            .map(|n| LightId(n.to_string()))
            .collect())
    }

    async fn send_command(&self, device: &DeviceInfo, command: &LightCommand) -> Vec<String> {
        self.commands.lock().push((device.clone(), command.clone()));

        let index = command.light.0.parse::<usize>().unwrap_or(0).saturating_sub(1);
        if self.failing_lights.contains(&index) {
            vec![format!("light {} unreachable", command.light)]
        } else {
            Vec::new()
        }
    }
}
