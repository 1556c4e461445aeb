//! Client Bridge
//!
//! WebSocket endpoint for the renderer. Owns everything the connection
//! side shares with the tick loop: the lockstep gate, the input slot, the
//! pending removal list, the cached last snapshot and the session defaults.
//!
//! Only one client is meaningful at a time. A new connection replaces the
//! previous one; the old socket keeps feeding messages until it closes,
//! but replies always go to the newest client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinSet;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::game::entity::{Direction, EntityId};
use crate::game::input::{AdmissionPolicy, InputSlot};
use crate::game::state::SessionDefaults;
use crate::network::lockstep::{AckOutcome, GateEvent, LockstepGate};
use crate::network::protocol::{
    parse_inbound, AckNotice, ControlCommand, Inbound, ProtocolError, StateSnapshot, CLOSE_NOTICE,
};

/// Bridge errors.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Snapshot could not be serialized.
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Frame queued for the connection's writer task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outgoing {
    /// JSON text
    Text(Arc<str>),
    /// Send the close notice and end the connection
    Close,
}

/// What an inbound frame did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Ack matched, counter advanced
    Advanced(u64),
    /// Ack did not match, cached snapshot re-sent
    Resent,
    /// Ack did not match and nothing was cached yet
    Ignored,
    /// Control command applied and acknowledged
    Control(ControlCommand),
    /// Input stored in the slot
    InputAdmitted(Direction),
    /// Input dropped by the one-per-tick rule
    InputDropped(Direction),
    /// Malformed frame, discarded
    Rejected,
}

struct ClientHandle {
    id: u64,
    tx: mpsc::UnboundedSender<Outgoing>,
}

/// Shared state between the connection tasks and the tick loop.
pub struct ClientBridge {
    gate: LockstepGate,
    client: RwLock<Option<ClientHandle>>,
    connected: watch::Sender<bool>,
    next_client_id: AtomicU64,
    last_message: RwLock<Option<Arc<str>>>,
    removals: Mutex<Vec<EntityId>>,
    input: Mutex<InputSlot>,
    defaults: Mutex<SessionDefaults>,
    shutdown: watch::Sender<bool>,
    open_connections: watch::Sender<usize>,
}

impl ClientBridge {
    /// Create a bridge. No client, gate waiting for start.
    pub fn new(defaults: SessionDefaults, admission: AdmissionPolicy) -> Self {
        let (connected, _) = watch::channel(false);
        let (shutdown, _) = watch::channel(false);
        let (open_connections, _) = watch::channel(0);
        Self {
            gate: LockstepGate::new(),
            client: RwLock::new(None),
            connected,
            next_client_id: AtomicU64::new(1),
            last_message: RwLock::new(None),
            removals: Mutex::new(Vec::new()),
            input: Mutex::new(InputSlot::new(admission)),
            defaults: Mutex::new(defaults),
            shutdown,
            open_connections,
        }
    }

    /// The lockstep gate.
    pub fn gate(&self) -> &LockstepGate {
        &self.gate
    }

    // =========================================================================
    // Client handle
    // =========================================================================

    /// Make a new client current. Returns its id and the frames to write.
    pub async fn attach(&self) -> (u64, mpsc::UnboundedReceiver<Outgoing>) {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(old) = self.client.write().await.replace(ClientHandle { id, tx }) {
            info!("Client {} replaced by client {}", old.id, id);
        }
        self.connected.send_replace(true);
        (id, rx)
    }

    /// Forget a client if it is still current.
    pub async fn detach(&self, id: u64) {
        let mut client = self.client.write().await;
        if client.as_ref().is_some_and(|c| c.id == id) {
            *client = None;
            self.connected.send_replace(false);
        }
    }

    /// Is a client attached?
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Resolve once a client is attached.
    pub async fn wait_for_client(&self) {
        let mut rx = self.connected.subscribe();
        let _ = rx.wait_for(|c| *c).await;
    }

    async fn send(&self, frame: Outgoing) -> bool {
        match self.client.read().await.as_ref() {
            Some(client) => client.tx.send(frame).is_ok(),
            None => false,
        }
    }

    async fn send_json(&self, text: String) -> bool {
        #[cfg(feature = "debug-tracing")]
        debug!("Sending {}", text);
        self.send(Outgoing::Text(Arc::from(text))).await
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Handle one inbound text frame.
    pub async fn handle_text(&self, text: &str) -> MessageOutcome {
        debug!("Inbound: {}", text.trim());
        match parse_inbound(text) {
            Ok(Inbound::Ack(token)) => self.handle_ack(token).await,
            Ok(Inbound::Control(command)) => self.handle_control(command).await,
            Ok(Inbound::Input(direction)) => self.handle_input(direction).await,
            Err(e) => {
                warn!("Discarding message: {}", e);
                MessageOutcome::Rejected
            }
        }
    }

    async fn handle_ack(&self, token: u64) -> MessageOutcome {
        match self.gate.handle_ack(token) {
            AckOutcome::Advanced(tick) => MessageOutcome::Advanced(tick),
            AckOutcome::Mismatch { expected, got } => {
                debug!("Ack {} while expecting {}, re-sending last snapshot", got, expected);
                let cached = self.last_message.read().await.clone();
                match cached {
                    Some(text) => {
                        self.send(Outgoing::Text(text)).await;
                        MessageOutcome::Resent
                    }
                    None => MessageOutcome::Ignored,
                }
            }
        }
    }

    async fn handle_control(&self, command: ControlCommand) -> MessageOutcome {
        let value = match command {
            ControlCommand::Start => {
                self.log_transition(command, GateEvent::Start);
                None
            }
            ControlCommand::Pause => {
                self.log_transition(command, GateEvent::Pause);
                None
            }
            ControlCommand::Resume => {
                self.log_transition(command, GateEvent::Resume);
                None
            }
            ControlCommand::Restart => {
                self.log_transition(command, GateEvent::Rearm);
                self.input.lock().await.clear();
                None
            }
            ControlCommand::SetStartTime(v) => Some(self.defaults.lock().await.set_start_time(v)),
            ControlCommand::SetStartLives(v) => Some(self.defaults.lock().await.set_start_lives(v)),
            ControlCommand::SetStartLevel(v) => Some(self.defaults.lock().await.set_start_level(v)),
        };
        if let Some(v) = value {
            info!("{:?} stored as {}", command, v);
        }

        match AckNotice::for_command(command, value).to_json() {
            Ok(text) => {
                self.send_json(text).await;
            }
            Err(e) => error!("Failed to serialize ack: {}", e),
        }
        MessageOutcome::Control(command)
    }

    fn log_transition(&self, command: ControlCommand, event: GateEvent) {
        match self.gate.apply(event) {
            Some(phase) => info!("{:?} received, gate now {:?}", command, phase),
            None => info!("{:?} received, ignored in {:?}", command, self.gate.phase()),
        }
    }

    async fn handle_input(&self, direction: Direction) -> MessageOutcome {
        let window = self.gate.acked_tick();
        if self.input.lock().await.offer(direction, window) {
            debug!("Input {:?} admitted for window {}", direction, window);
            MessageOutcome::InputAdmitted(direction)
        } else {
            debug!("Input {:?} dropped, window {} already has one", direction, window);
            MessageOutcome::InputDropped(direction)
        }
    }

    // =========================================================================
    // Tick loop side
    // =========================================================================

    /// Read and clear the input slot.
    pub async fn take_input(&self) -> Option<Direction> {
        self.input.lock().await.take()
    }

    /// Drop any pending input.
    pub async fn clear_input(&self) {
        self.input.lock().await.clear();
    }

    /// Defaults the next reset uses.
    pub async fn defaults(&self) -> SessionDefaults {
        *self.defaults.lock().await
    }

    /// Queue ids for the client to discard.
    pub async fn enqueue_removals(&self, ids: impl IntoIterator<Item = EntityId>) {
        self.removals.lock().await.extend(ids);
    }

    /// Drain the removal list.
    pub async fn take_removals(&self) -> Vec<EntityId> {
        std::mem::take(&mut *self.removals.lock().await)
    }

    /// Serialize, cache and send a snapshot. Returns whether a client got it.
    pub async fn publish(&self, snapshot: &StateSnapshot) -> Result<bool, BridgeError> {
        let text: Arc<str> = Arc::from(snapshot.to_json()?);
        *self.last_message.write().await = Some(text.clone());
        #[cfg(feature = "debug-tracing")]
        debug!("Sending {}", text);
        Ok(self.send(Outgoing::Text(text)).await)
    }

    /// Last snapshot sent.
    pub async fn last_message(&self) -> Option<Arc<str>> {
        self.last_message.read().await.clone()
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Send the close notice and stop accepting.
    pub async fn shutdown(&self) {
        if self.send(Outgoing::Close).await {
            info!("Close notice sent");
        }
        self.shutdown.send_replace(true);
    }

    /// Has shutdown been requested?
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolve once shutdown has been requested.
    pub async fn closed(&self) {
        let mut rx = self.shutdown.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    // =========================================================================
    // Server
    // =========================================================================

    /// Accept connections until shutdown.
    #[instrument(skip_all, fields(addr = ?listener.local_addr().ok()))]
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> Result<(), BridgeError> {
        info!("Visualization endpoint listening");
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            info!("New connection from {}", addr);
                            connections.spawn(self.clone().handle_connection(stream, addr));
                            self.open_connections.send_replace(connections.len());
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                Some(finished) = connections.join_next() => {
                    if let Err(e) = finished {
                        error!("Connection task failed: {}", e);
                    }
                    self.open_connections.send_replace(connections.len());
                }
                _ = self.closed() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        while connections.join_next().await.is_some() {}
        self.open_connections.send_replace(0);
        Ok(())
    }

    /// Connection tasks still running.
    pub fn open_connections(&self) -> usize {
        *self.open_connections.borrow()
    }

    /// Bind and run.
    pub async fn bind_and_run(self: Arc<Self>, addr: SocketAddr) -> Result<(), BridgeError> {
        let listener = TcpListener::bind(addr).await?;
        self.run(listener).await
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                error!("WebSocket handshake failed for {}: {}", addr, e);
                return;
            }
        };

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (id, mut frames) = self.attach().await;

        // Spawn message sender task
        let sender_task = tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                match frame {
                    Outgoing::Text(text) => {
                        if ws_sender.send(Message::Text(text.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Outgoing::Close => {
                        let _ = ws_sender.send(Message::Text(CLOSE_NOTICE.to_string())).await;
                        let _ = ws_sender.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(&text).await;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            match std::str::from_utf8(&data) {
                                Ok(text) => {
                                    self.handle_text(text).await;
                                }
                                Err(_) => warn!("Discarding non-UTF-8 binary frame from {}", addr),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("Client {} disconnected", addr);
                            break;
                        }
                        Some(Err(e)) => {
                            error!("WebSocket error for {}: {}", addr, e);
                            break;
                        }
                        _ => {}
                    }
                }
                _ = self.closed() => {
                    break;
                }
            }
        }

        self.detach(id).await;
        let _ = sender_task.await;
        info!("Client {} ({}) cleaned up", id, addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;
    use crate::network::lockstep::GatePhase;

    const WAIT: Duration = Duration::from_secs(2);

    fn bridge(admission: AdmissionPolicy) -> ClientBridge {
        ClientBridge::new(SessionDefaults::default(), admission)
    }

    fn text(frame: Outgoing) -> String {
        match frame {
            Outgoing::Text(t) => t.to_string(),
            Outgoing::Close => CLOSE_NOTICE.to_string(),
        }
    }

    fn snapshot(expecting_tick: u64) -> StateSnapshot {
        StateSnapshot {
            expecting_tick,
            tick: expecting_tick - 1,
            lives: 5,
            time_left: 60,
            game_over: false,
            game_won: false,
            level: 1,
            remove_ids: Vec::new(),
            agents: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_ack_mismatch_resends_cached_snapshot_once() {
        let bridge = bridge(AdmissionPolicy::FirstPerTick);
        let (_, mut rx) = bridge.attach().await;

        assert_eq!(bridge.handle_text("9").await, MessageOutcome::Ignored);

        bridge.publish(&snapshot(2)).await.unwrap();
        let sent = text(rx.recv().await.unwrap());

        assert_eq!(bridge.handle_text("\"5\"").await, MessageOutcome::Resent);
        assert_eq!(text(rx.recv().await.unwrap()), sent);
        assert!(rx.try_recv().is_err());
        assert_eq!(bridge.gate().acked_tick(), 1);

        assert_eq!(bridge.handle_text("2.0").await, MessageOutcome::Advanced(2));
        assert_eq!(bridge.gate().acked_tick(), 2);
    }

    #[tokio::test]
    async fn test_controls_drive_gate_and_ack() {
        let bridge = bridge(AdmissionPolicy::FirstPerTick);
        let (_, mut rx) = bridge.attach().await;

        // pause before start is ignored but still acknowledged
        bridge.handle_text(r#"{"type":"control","cmd":"pause"}"#).await;
        assert_eq!(bridge.gate().phase(), GatePhase::WaitingForStart);
        assert_eq!(text(rx.recv().await.unwrap()), r#"{"ack":"paused"}"#);

        bridge.handle_text(r#"{"type":"control","cmd":"start"}"#).await;
        assert_eq!(bridge.gate().phase(), GatePhase::Running);
        assert_eq!(text(rx.recv().await.unwrap()), r#"{"ack":"started"}"#);

        bridge.handle_text(r#"{"type":"control","cmd":"pause"}"#).await;
        assert_eq!(bridge.gate().phase(), GatePhase::Paused);
        rx.recv().await.unwrap();

        bridge.handle_text(r#"{"type":"control","cmd":"restart"}"#).await;
        assert_eq!(bridge.gate().phase(), GatePhase::WaitingForStart);
        assert_eq!(text(rx.recv().await.unwrap()), r#"{"ack":"restarted"}"#);
    }

    #[tokio::test]
    async fn test_setters_clamp_and_report() {
        let bridge = bridge(AdmissionPolicy::FirstPerTick);
        let (_, mut rx) = bridge.attach().await;

        bridge.handle_text(r#"{"type":"control","cmd":"set_start_time","value":5000}"#).await;
        assert_eq!(text(rx.recv().await.unwrap()), r#"{"ack":"set_start_time","value":999}"#);
        bridge.handle_text(r#"{"type":"control","cmd":"set_start_lives","value":"3"}"#).await;
        rx.recv().await.unwrap();
        bridge.handle_text(r#"{"type":"control","cmd":"set_start_level","value":0}"#).await;
        rx.recv().await.unwrap();

        assert_eq!(
            bridge.defaults().await,
            SessionDefaults { start_time: 999, start_lives: 3, start_level: 1 }
        );
    }

    #[tokio::test]
    async fn test_second_input_in_window_dropped() {
        let bridge = bridge(AdmissionPolicy::FirstPerTick);
        let up = r#"{"type":"input","direction":"up"}"#;
        let left = r#"{"type":"input","direction":"left"}"#;

        assert_eq!(bridge.handle_text(up).await, MessageOutcome::InputAdmitted(Direction::Up));
        assert_eq!(bridge.handle_text(left).await, MessageOutcome::InputDropped(Direction::Left));
        assert_eq!(bridge.take_input().await, Some(Direction::Up));

        // next ack opens a new window
        bridge.handle_text("2").await;
        assert_eq!(bridge.handle_text(left).await, MessageOutcome::InputAdmitted(Direction::Left));
    }

    #[tokio::test]
    async fn test_latest_input_retained_when_overwriting() {
        let bridge = bridge(AdmissionPolicy::LatestWins);
        bridge.handle_text(r#"{"type":"input","direction":"up"}"#).await;
        bridge.handle_text(r#"{"type":"input","direction":"right"}"#).await;
        assert_eq!(bridge.take_input().await, Some(Direction::Right));
        assert_eq!(bridge.take_input().await, None);
    }

    #[tokio::test]
    async fn test_malformed_message_leaves_state_untouched() {
        let bridge = bridge(AdmissionPolicy::FirstPerTick);
        assert_eq!(bridge.handle_text("{\"type\":").await, MessageOutcome::Rejected);
        assert_eq!(bridge.handle_text("tick please").await, MessageOutcome::Rejected);
        assert_eq!(bridge.gate().acked_tick(), 1);
        assert_eq!(bridge.gate().phase(), GatePhase::WaitingForStart);
    }

    #[tokio::test]
    async fn test_new_client_replaces_old() {
        let bridge = bridge(AdmissionPolicy::FirstPerTick);
        let (first, mut old_rx) = bridge.attach().await;
        let (_, mut new_rx) = bridge.attach().await;

        bridge.publish(&snapshot(2)).await.unwrap();
        assert!(new_rx.recv().await.is_some());
        // old sender was dropped on replacement
        assert!(old_rx.recv().await.is_none());

        bridge.detach(first).await;
        assert!(bridge.is_connected());
    }

    #[tokio::test]
    async fn test_removals_drain_atomically() {
        let bridge = bridge(AdmissionPolicy::FirstPerTick);
        bridge.enqueue_removals([4, 9]).await;
        bridge.enqueue_removals([12]).await;
        assert_eq!(bridge.take_removals().await, vec![4, 9, 12]);
        assert!(bridge.take_removals().await.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_sends_close() {
        let bridge = bridge(AdmissionPolicy::FirstPerTick);
        let (_, mut rx) = bridge.attach().await;
        bridge.shutdown().await;
        assert_eq!(rx.recv().await, Some(Outgoing::Close));
        assert!(bridge.is_shut_down());
        bridge.closed().await;
    }

    #[tokio::test]
    async fn test_websocket_round_trip() {
        use tokio_tungstenite::connect_async;

        let bridge = Arc::new(bridge(AdmissionPolicy::FirstPerTick));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(bridge.clone().run(listener));

        let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        ws.send(Message::Text(r#"{"type":"control","cmd":"start"}"#.into())).await.unwrap();
        let reply = ws.next().await.unwrap().unwrap();
        assert_eq!(reply, Message::Text(r#"{"ack":"started"}"#.into()));
        assert_eq!(bridge.gate().phase(), GatePhase::Running);

        bridge.shutdown().await;
        assert_eq!(ws.next().await.unwrap().unwrap(), Message::Text(CLOSE_NOTICE.into()));
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_closed_connections_are_reaped() {
        use tokio_tungstenite::connect_async;

        let bridge = Arc::new(bridge(AdmissionPolicy::FirstPerTick));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(bridge.clone().run(listener));
        let mut open = bridge.open_connections.subscribe();

        for _ in 0..3 {
            let (mut ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
            timeout(WAIT, open.wait_for(|n| *n == 1)).await.unwrap().unwrap();
            ws.close(None).await.unwrap();
            timeout(WAIT, open.wait_for(|n| *n == 0)).await.unwrap().unwrap();
        }
        assert!(!bridge.is_connected());

        bridge.shutdown().await;
        server.await.unwrap().unwrap();
        assert_eq!(bridge.open_connections(), 0);
    }
}
