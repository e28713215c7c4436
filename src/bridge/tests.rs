use super::*;
use crate::color::{color_for_emotion, default_pattern_color};
use crate::config::ConnectionConfig;
use crate::control::ControlMessage;
use crate::device::{DeviceInfo, DeviceRegistry, DiscoveryMethod, DiscoveryOptions, HandshakeEvent};
use crate::error::FacelightError;
use crate::events::{EventBus, FacelightEvent};
use crate::pipeline::{Emotion, LightReactor};
use crate::sim::SimulatedDeviceTransport;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout};

fn bridge(id: &str) -> DeviceInfo {
    DeviceInfo::new(format!("192.168.1.{}", id.len() + 10), id)
}

fn drain(events: &mut broadcast::Receiver<FacelightEvent>) -> Vec<FacelightEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

async fn next_message(rx: &mut mpsc::UnboundedReceiver<ControlMessage>) -> ControlMessage {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a control message")
        .expect("control channel closed")
}

mod coordinator {
    use super::*;

    struct Harness {
        coordinator: DiscoveryCoordinator,
        transport: Arc<SimulatedDeviceTransport>,
        registry: DeviceRegistry,
        rx: mpsc::UnboundedReceiver<ControlMessage>,
        events: broadcast::Receiver<FacelightEvent>,
    }

    fn harness(transport: SimulatedDeviceTransport, max_attempts: u32) -> Harness {
        let (tx, rx) = mpsc::unbounded_channel();
        let event_bus = Arc::new(EventBus::new(100));
        let events = event_bus.subscribe();
        let transport = Arc::new(transport);
        let registry = DeviceRegistry::new();
        let options = DiscoveryOptions {
            methods: vec![DiscoveryMethod::IpScan, DiscoveryMethod::Nupnp],
        };

        let coordinator = DiscoveryCoordinator::new(
            transport.clone(),
            registry.clone(),
            event_bus,
            tx,
            options,
            max_attempts,
        );

        Harness {
            coordinator,
            transport,
            registry,
            rx,
            events,
        }
    }

    impl Harness {
        async fn run_to_outcome(&mut self) -> DiscoveryOutcome {
            loop {
                if let ControlMessage::Discovery(message) = next_message(&mut self.rx).await {
                    if let Some(outcome) = self.coordinator.handle_message(message) {
                        return outcome;
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_exhausts_after_max_retries() {
        let mut h = harness(SimulatedDeviceTransport::new(), 20);

        assert!(h.coordinator.start_discovery());
        let outcome = h.run_to_outcome().await;

        assert_eq!(outcome, DiscoveryOutcome::Exhausted { notified: true });
        assert_eq!(h.coordinator.state(), DiscoveryState::Exhausted { attempts: 20 });
        assert_eq!(h.transport.probe_count(), 21);

        let not_found = drain(&mut h.events)
            .into_iter()
            .filter(|e| matches!(e, FacelightEvent::BridgeNotFound { .. }))
            .count();
        assert_eq!(not_found, 1);

        // Nothing else is in flight
        sleep(Duration::from_millis(20)).await;
        assert!(h.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_found_on_fifth_attempt_stops_retrying() {
        let device = bridge("001788fffe4a2b3c");
        let mut h = harness(SimulatedDeviceTransport::with_bridge(device.clone(), 5, 3), 20);

        h.coordinator.start_discovery();
        let outcome = h.run_to_outcome().await;

        assert_eq!(outcome, DiscoveryOutcome::Found(vec![device.clone()]));
        assert_eq!(h.coordinator.state(), DiscoveryState::Found { attempt: 5 });
        assert_eq!(h.transport.probe_count(), 6);
        assert_eq!(h.registry.all(), vec![device]);

        sleep(Duration::from_millis(20)).await;
        assert!(h.rx.try_recv().is_err());
        assert_eq!(h.transport.probe_count(), 6);

        let events = drain(&mut h.events);
        assert!(events
            .iter()
            .any(|e| matches!(e, FacelightEvent::DevicesDiscovered { attempt: 5, .. })));
    }

    #[tokio::test]
    async fn test_stop_discards_late_probe() {
        let device = bridge("001788fffe000001");
        let transport = SimulatedDeviceTransport::new()
            .with_fallback(vec![device])
            .with_probe_delay(Duration::from_millis(30));
        let mut h = harness(transport, 20);

        h.coordinator.start_discovery();
        h.coordinator.stop_discovery();
        assert_eq!(h.coordinator.state(), DiscoveryState::Idle);

        if let ControlMessage::Discovery(message) = next_message(&mut h.rx).await {
            assert!(h.coordinator.handle_message(message).is_none());
        }

        assert_eq!(h.coordinator.state(), DiscoveryState::Idle);
        assert!(h.registry.all().is_empty());
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_searching() {
        let transport = SimulatedDeviceTransport::new().with_probe_delay(Duration::from_millis(30));
        let mut h = harness(transport, 20);

        assert!(h.coordinator.start_discovery());
        assert!(!h.coordinator.start_discovery());
        assert_eq!(h.coordinator.session().map(|s| s.attempt), Some(0));

        next_message(&mut h.rx).await;
        assert_eq!(h.transport.probe_count(), 1);
    }

    #[tokio::test]
    async fn test_probe_error_consumes_an_attempt() {
        let device = bridge("001788fffe000002");
        let transport = SimulatedDeviceTransport::new().with_fallback(vec![device.clone()]);
        transport.push_probe(Err(FacelightError::transport("network unreachable")));
        let mut h = harness(transport, 20);

        h.coordinator.start_discovery();
        let outcome = h.run_to_outcome().await;

        assert_eq!(outcome, DiscoveryOutcome::Found(vec![device]));
        assert_eq!(h.coordinator.state(), DiscoveryState::Found { attempt: 1 });
    }

    #[tokio::test]
    async fn test_no_notification_when_a_bridge_is_known() {
        let mut h = harness(SimulatedDeviceTransport::new(), 2);
        h.registry.upsert(&bridge("001788fffe000003"), Utc::now());

        h.coordinator.start_discovery();
        let outcome = h.run_to_outcome().await;

        assert_eq!(outcome, DiscoveryOutcome::Exhausted { notified: false });
        assert_eq!(h.transport.probe_count(), 3);
        assert!(!drain(&mut h.events)
            .iter()
            .any(|e| matches!(e, FacelightEvent::BridgeNotFound { .. })));
    }

    #[tokio::test]
    async fn test_restart_after_exhaustion() {
        let mut h = harness(SimulatedDeviceTransport::new(), 0);

        h.coordinator.start_discovery();
        h.run_to_outcome().await;
        assert_eq!(h.coordinator.state(), DiscoveryState::Exhausted { attempts: 0 });

        assert!(h.coordinator.start_discovery());
        h.run_to_outcome().await;
        assert_eq!(h.transport.probe_count(), 2);
    }
}

mod state_machine {
    use super::*;

    struct Harness {
        machine: ConnectionStateMachine,
        transport: Arc<SimulatedDeviceTransport>,
        registry: DeviceRegistry,
        rx: mpsc::UnboundedReceiver<ControlMessage>,
        events: broadcast::Receiver<FacelightEvent>,
    }

    fn test_config() -> ConnectionConfig {
        ConnectionConfig {
            disconnect_grace_ms: 20,
            pairing_timeout_seconds: 3,
            pairing_tick_ms: 5,
            command_timeout_ms: 500,
            auto_connect: true,
        }
    }

    fn harness(transport: SimulatedDeviceTransport) -> Harness {
        let (tx, rx) = mpsc::unbounded_channel();
        let event_bus = Arc::new(EventBus::new(100));
        let events = event_bus.subscribe();
        let transport = Arc::new(transport);
        let registry = DeviceRegistry::new();

        let machine = ConnectionStateMachine::new(
            transport.clone(),
            registry.clone(),
            event_bus,
            tx,
            test_config(),
        );

        Harness {
            machine,
            transport,
            registry,
            rx,
            events,
        }
    }

    impl Harness {
        async fn pump_one(&mut self) {
            if let ControlMessage::Connection(message) = next_message(&mut self.rx).await {
                self.machine.handle_message(message);
            }
        }

        async fn pump_until(&mut self, state: ConnectionState) {
            while self.machine.state() != state {
                self.pump_one().await;
            }
        }

        /// Pump until the next fan-out has reported back
        async fn pump_fan_out(&mut self) -> (usize, usize) {
            loop {
                self.pump_one().await;
                for event in drain(&mut self.events) {
                    if let FacelightEvent::LightsUpdated { attempted, failed } = event {
                        return (attempted, failed);
                    }
                }
            }
        }
    }

    fn authenticating(device: &DeviceInfo) -> SimulatedDeviceTransport {
        SimulatedDeviceTransport::new()
            .with_handshake(device, vec![HandshakeEvent::Connected, HandshakeEvent::Authenticated])
    }

    #[tokio::test]
    async fn test_authenticated_connects_and_shows_default_pattern() {
        let device = bridge("bridge-a");
        let mut h = harness(authenticating(&device));

        h.machine.connect(&device).unwrap();
        assert_eq!(h.machine.state(), ConnectionState::Connecting);

        h.pump_until(ConnectionState::Connected).await;
        assert_eq!(
            h.registry.most_recently_connected().map(|r| r.device),
            Some(device.clone())
        );

        assert_eq!(h.pump_fan_out().await, (3, 0));
        let commands = h.transport.commands();
        assert_eq!(commands.len(), 3);
        for (index, (target, command)) in commands.iter().enumerate() {
            assert_eq!(target, &device);
            assert!(command.on);
            assert_eq!(command.color, default_pattern_color(index));
        }
    }

    #[tokio::test]
    async fn test_stale_handshake_after_reconnect_is_ignored() {
        let a = bridge("bridge-a");
        let b = bridge("bridge-b");
        let mut h = harness(SimulatedDeviceTransport::new());

        h.machine.connect(&a).unwrap();
        sleep(Duration::from_millis(10)).await;
        assert!(h.transport.emit(&a, HandshakeEvent::Authenticated).await);
        sleep(Duration::from_millis(10)).await;

        h.machine.release();
        h.machine.connect(&b).unwrap();

        // Authenticated for A arrives tagged with the superseded generation
        h.pump_one().await;

        assert_eq!(h.machine.state(), ConnectionState::Connecting);
        assert_eq!(h.machine.active_device(), Some(&b));
        assert!(!h.registry.has_connected_before());
    }

    #[tokio::test]
    async fn test_conflicting_connection_is_rejected() {
        let a = bridge("bridge-a");
        let b = bridge("bridge-b");
        let mut h = harness(SimulatedDeviceTransport::new());

        h.machine.connect(&a).unwrap();
        let generation = h.machine.generation();

        assert!(h.machine.connect(&a).is_ok());
        assert_eq!(h.machine.generation(), generation);

        let err = h.machine.connect(&b).unwrap_err();
        assert!(matches!(err, FacelightError::ConflictingConnection { .. }));
        assert_eq!(h.machine.active_device(), Some(&a));
    }

    #[tokio::test]
    async fn test_link_button_not_pressed_keeps_connecting() {
        let device = bridge("bridge-a");
        let transport = SimulatedDeviceTransport::new()
            .with_handshake(&device, vec![HandshakeEvent::LinkButtonNotPressed]);
        let mut h = harness(transport);

        h.machine.connect(&device).unwrap();
        h.pump_one().await;

        assert_eq!(h.machine.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn test_pairing_countdown_times_out() {
        let device = bridge("bridge-a");
        let transport = SimulatedDeviceTransport::new()
            .with_handshake(&device, vec![HandshakeEvent::NotAuthenticated]);
        let mut h = harness(transport);

        h.machine.connect(&device).unwrap();
        h.pump_until(ConnectionState::Unauthenticated).await;

        let mut seen = Vec::new();
        while !seen
            .iter()
            .any(|e| matches!(e, FacelightEvent::PairingTimedOut { .. }))
        {
            h.pump_one().await;
            seen.extend(drain(&mut h.events));
        }

        assert!(seen
            .iter()
            .any(|e| matches!(e, FacelightEvent::PairingRequired { .. })));
        assert!(seen.iter().any(|e| matches!(
            e,
            FacelightEvent::StatusMessage { text } if text == "Press the link button on the bridge"
        )));
        let fractions: Vec<f32> = seen
            .iter()
            .filter_map(|e| match e {
                FacelightEvent::PairingProgress { fraction, .. } => Some(*fraction),
                _ => None,
            })
            .collect();
        assert_eq!(fractions.first(), Some(&1.0));
        assert_eq!(fractions.last(), Some(&0.0));
        assert_eq!(fractions.len(), 4);

        // The attempt itself stays open
        assert_eq!(h.machine.state(), ConnectionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_pairing_then_authenticated() {
        let device = bridge("bridge-a");
        let transport = SimulatedDeviceTransport::new()
            .with_handshake(&device, vec![HandshakeEvent::NotAuthenticated]);
        let mut h = harness(transport);

        h.machine.connect(&device).unwrap();
        h.pump_until(ConnectionState::Unauthenticated).await;

        assert!(h.transport.emit(&device, HandshakeEvent::Authenticated).await);
        h.pump_until(ConnectionState::Connected).await;
        assert!(h.registry.has_connected_before());
    }

    #[tokio::test]
    async fn test_connect_elsewhere_while_pairing_is_rejected() {
        let a = bridge("bridge-a");
        let b = bridge("bridge-b");
        let transport = SimulatedDeviceTransport::new()
            .with_handshake(&a, vec![HandshakeEvent::NotAuthenticated]);
        let mut h = harness(transport);

        h.machine.connect(&a).unwrap();
        h.pump_until(ConnectionState::Unauthenticated).await;
        let generation = h.machine.generation();

        let err = h.machine.connect(&b).unwrap_err();
        assert!(matches!(err, FacelightError::ConflictingConnection { .. }));
        assert_eq!(h.machine.active_device(), Some(&a));
        assert_eq!(h.machine.state(), ConnectionState::Unauthenticated);
        assert_eq!(h.machine.generation(), generation);

        // A is still reachable, so pairing can finish
        assert!(h.transport.emit(&a, HandshakeEvent::Authenticated).await);
        h.pump_until(ConnectionState::Connected).await;
        assert!(h.transport.disconnects().is_empty());
    }

    #[tokio::test]
    async fn test_release_while_pairing_closes_bridge() {
        let a = bridge("bridge-a");
        let b = bridge("bridge-b");
        let transport = SimulatedDeviceTransport::new()
            .with_handshake(&a, vec![HandshakeEvent::NotAuthenticated]);
        let mut h = harness(transport);

        h.machine.connect(&a).unwrap();
        h.pump_until(ConnectionState::Unauthenticated).await;

        h.machine.release();
        assert_eq!(h.machine.state(), ConnectionState::Disconnected);
        h.machine.connect(&b).unwrap();
        assert_eq!(h.machine.active_device(), Some(&b));

        sleep(Duration::from_millis(10)).await;
        assert_eq!(h.transport.disconnects(), vec![a]);
    }

    #[tokio::test]
    async fn test_reconnect_same_bridge_while_pairing_restarts_handshake() {
        let device = bridge("bridge-a");
        let transport = SimulatedDeviceTransport::new()
            .with_handshake(&device, vec![HandshakeEvent::NotAuthenticated]);
        let mut h = harness(transport);

        h.machine.connect(&device).unwrap();
        h.pump_until(ConnectionState::Unauthenticated).await;
        let generation = h.machine.generation();

        h.machine.connect(&device).unwrap();
        assert_eq!(h.machine.state(), ConnectionState::Connecting);
        assert!(h.machine.generation() > generation);

        h.pump_until(ConnectionState::Unauthenticated).await;
        assert!(h.transport.emit(&device, HandshakeEvent::Authenticated).await);
        h.pump_until(ConnectionState::Connected).await;
        assert_eq!(h.machine.active_device(), Some(&device));
    }

    #[tokio::test]
    async fn test_apply_color_offline_is_dropped() {
        let mut h = harness(SimulatedDeviceTransport::new());

        h.machine.apply_emotion_reaction(Emotion::Happiness);
        sleep(Duration::from_millis(20)).await;

        assert!(h.transport.commands().is_empty());
        assert!(h.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_emotion_reaction_colors_every_light() {
        let device = bridge("bridge-a");
        let mut h = harness(authenticating(&device).with_lights(4));

        h.machine.connect(&device).unwrap();
        h.pump_until(ConnectionState::Connected).await;
        h.pump_fan_out().await;

        h.machine.apply_emotion_reaction(Emotion::Happiness);
        assert_eq!(h.pump_fan_out().await, (4, 0));

        let expected = color_for_emotion(Emotion::Happiness).unwrap();
        let commands = h.transport.commands();
        assert_eq!(commands.len(), 8);
        assert!(commands[4..].iter().all(|(_, c)| c.color == expected));
    }

    #[tokio::test]
    async fn test_partial_failures_are_reported() {
        let device = bridge("bridge-a");
        let mut h = harness(authenticating(&device).with_failing_light(1));

        h.machine.connect(&device).unwrap();
        h.pump_until(ConnectionState::Connected).await;

        assert_eq!(h.pump_fan_out().await, (3, 1));
        assert_eq!(h.machine.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_disconnect_is_deferred() {
        let device = bridge("bridge-a");
        let mut h = harness(authenticating(&device));

        h.machine.connect(&device).unwrap();
        h.pump_until(ConnectionState::Connected).await;
        h.pump_fan_out().await;

        h.machine.disconnect();
        assert_eq!(h.machine.state(), ConnectionState::Connected);

        h.pump_until(ConnectionState::Disconnected).await;
        assert!(h.machine.active_device().is_none());
        assert!(drain(&mut h.events)
            .iter()
            .any(|e| matches!(e, FacelightEvent::DeviceDisconnected { .. })));

        sleep(Duration::from_millis(10)).await;
        assert_eq!(h.transport.disconnects(), vec![device]);
    }

    #[tokio::test]
    async fn test_reconnect_within_grace_keeps_connection() {
        let device = bridge("bridge-a");
        let mut h = harness(authenticating(&device));

        h.machine.connect(&device).unwrap();
        h.pump_until(ConnectionState::Connected).await;
        h.pump_fan_out().await;

        h.machine.disconnect();
        h.machine.connect(&device).unwrap();

        sleep(Duration::from_millis(50)).await;
        while let Ok(ControlMessage::Connection(message)) = h.rx.try_recv() {
            h.machine.handle_message(message);
        }

        assert_eq!(h.machine.state(), ConnectionState::Connected);
        assert!(h.transport.disconnects().is_empty());
    }

    #[tokio::test]
    async fn test_decline_forgets_last_connected_bridge() {
        let device = bridge("bridge-a");
        let mut h = harness(authenticating(&device));

        h.machine.connect(&device).unwrap();
        h.pump_until(ConnectionState::Connected).await;
        h.pump_fan_out().await;

        h.machine.decline(&device);
        assert!(!h.registry.has_connected_before());

        h.pump_until(ConnectionState::Disconnected).await;
    }
}
