//! Server network layer handling UDP communications and the tick loop

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::game::GameState;
use crate::tick::TickLoop;
use log::{debug, error, info, warn};
use shared::time::unix_millis;
use shared::{
    decode, encode, Packet, PROTOCOL_VERSION, MAX_DATAGRAM_SIZE, TICK_PERIOD_MS, TICK_RATE_HZ,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    Shutdown,
}

/// Messages sent from the main loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        addrs: Vec<SocketAddr>,
    },
}

/// Paces the fixed tick. A late tick moves on to the next boundary instead
/// of bursting to catch up.
pub struct TickClock {
    period: Duration,
    interval: Interval,
    last_tick: Option<Instant>,
}

impl TickClock {
    pub fn new(period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            period,
            interval,
            last_tick: None,
        }
    }

    /// Waits for the next boundary. Returns when the tick started and, if
    /// whole boundaries were skipped, the gap since the previous tick.
    pub async fn tick(&mut self) -> (Instant, Option<Duration>) {
        self.interval.tick().await;
        let started = Instant::now();
        let gap = self
            .last_tick
            .map(|last| started.duration_since(last))
            .filter(|gap| *gap > self.period * 2);
        self.last_tick = Some(started);
        (started, gap)
    }

    /// Time spent since `started`, if it exceeds one period.
    pub fn overrun(&self, started: Instant) -> Option<Duration> {
        let elapsed = started.elapsed();
        (elapsed > self.period).then_some(elapsed)
    }
}

/// Main server coordinating networking and the authoritative simulation
///
/// The main loop is the single writer of both the client roster and the game
/// state. Socket reads and writes happen on their own tasks, so a tick never
/// waits on I/O.
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: ClientManager,
    game_state: GameState,
    tick_loop: TickLoop,
    config: ServerConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::Sender<GameMessage>,
    game_rx: Option<mpsc::Receiver<GameMessage>>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let layout = config.load_layout()?;
        info!(
            "Loaded {}x{} layout with {} obstacles and {} spawn points",
            layout.width,
            layout.height,
            layout.obstacles.len(),
            layout.spawn_points.len()
        );

        let socket = Arc::new(UdpSocket::bind(config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::channel(config.outbound_queue);

        Ok(Server {
            socket,
            clients: ClientManager::new(config.max_clients),
            game_state: GameState::new(layout),
            tick_loop: TickLoop::new(),
            config,
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle for stopping [`Server::run`] from another task.
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn game_state(&self) -> &GameState {
        &self.game_state
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match decode(&buffer[..len]) {
                        Ok(packet) => {
                            if server_tx
                                .send(ServerMessage::PacketReceived { packet, addr })
                                .is_err()
                            {
                                debug!("Main loop gone, stopping receiver");
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping datagram from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes the outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => match encode(&packet) {
                        Ok(data) => {
                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send packet to {}: {}", addr, e);
                            }
                        }
                        Err(e) => error!("Failed to encode packet for {}: {}", addr, e),
                    },
                    GameMessage::BroadcastPacket { packet, addrs } => {
                        let data = match encode(&packet) {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Failed to encode broadcast: {}", e);
                                continue;
                            }
                        };
                        for addr in addrs {
                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Queues an outbound message without waiting. A full queue drops the message.
    fn queue(&self, message: GameMessage) {
        match self.game_tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("Outbound queue full, dropping packet"),
            Err(TrySendError::Closed(_)) => error!("Sender task is gone, dropping packet"),
        }
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        self.queue(GameMessage::SendPacket { packet, addr });
    }

    fn disconnect_player(&mut self, player_id: u32) {
        self.clients.remove_client(&player_id);
        self.game_state.remove_player(&player_id);
    }

    /// Handles one decoded packet. Inputs are only enqueued here; they are
    /// applied by the next tick.
    fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { protocol_version } => {
                info!(
                    "Client connecting from {} (protocol {})",
                    addr, protocol_version
                );

                if protocol_version != PROTOCOL_VERSION {
                    let reason = format!(
                        "Protocol version mismatch: server {}, client {}",
                        PROTOCOL_VERSION, protocol_version
                    );
                    self.send_packet(Packet::Disconnected { reason }, addr);
                    return;
                }

                // A repeated Connect (our Connected got lost) gets the same answer again
                if let Some(existing_id) = self.clients.find_client_by_addr(addr) {
                    self.clients.touch(existing_id);
                    if let Some(player) = self.game_state.player(existing_id) {
                        let response = Packet::Connected {
                            player_id: existing_id,
                            spawn: player.pose,
                            tick_rate_hz: TICK_RATE_HZ,
                        };
                        self.send_packet(response, addr);
                    }
                    return;
                }

                match self.clients.add_client(addr) {
                    Some(player_id) => {
                        let spawn = self.game_state.add_player(player_id);
                        let response = Packet::Connected {
                            player_id,
                            spawn,
                            tick_rate_hz: TICK_RATE_HZ,
                        };
                        self.send_packet(response, addr);
                    }
                    None => {
                        let response = Packet::Disconnected {
                            reason: "Server full".to_string(),
                        };
                        self.send_packet(response, addr);
                    }
                }
            }

            Packet::Input(sample) => match self.clients.find_client_by_addr(addr) {
                Some(player_id) => {
                    self.clients.enqueue_input(player_id, sample);
                }
                None => debug!("Input from unknown address {}", addr),
            },

            Packet::Disconnect => {
                if let Some(player_id) = self.clients.find_client_by_addr(addr) {
                    self.disconnect_player(player_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Runs one tick and queues the resulting snapshot for every client
    fn run_tick(&mut self) {
        let report = self
            .tick_loop
            .step(&mut self.clients, &mut self.game_state, unix_millis());
        let tick = report.snapshot.seq;

        if report.inputs.rejected > 0 {
            debug!(
                "Tick {}: dropped {} malformed inputs",
                tick, report.inputs.rejected
            );
        }

        if !self.clients.is_empty() {
            let addrs = self
                .clients
                .get_client_addrs()
                .into_iter()
                .map(|(_, addr)| addr)
                .collect();
            self.queue(GameMessage::BroadcastPacket {
                packet: Packet::Snapshot(report.snapshot),
                addrs,
            });
        }

        // Periodic performance monitoring
        if tick % (TICK_RATE_HZ as u64 * 5) == 0 && !self.clients.is_empty() {
            debug!(
                "Tick {}: {} clients, {} inputs applied, {} stale",
                tick,
                self.clients.len(),
                report.inputs.applied,
                report.inputs.stale
            );
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();

        let tick_period = Duration::from_millis(TICK_PERIOD_MS);
        let mut tick_clock = TickClock::new(tick_period);
        let mut timeout_interval = interval(Duration::from_secs(1));

        info!("Server started at {} Hz", TICK_RATE_HZ);

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr);
                        }
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                (started, gap) = tick_clock.tick() => {
                    if let Some(since_last) = gap {
                        warn!(
                            "Tick {} started {:?} after the previous one, skipped boundaries",
                            self.tick_loop.snapshot_seq() + 1,
                            since_last
                        );
                    }

                    self.run_tick();

                    if let Some(elapsed) = tick_clock.overrun(started) {
                        warn!(
                            "Tick {} overran: {:?} (budget {:?})",
                            self.tick_loop.snapshot_seq(),
                            elapsed,
                            tick_period
                        );
                    }
                },

                _ = timeout_interval.tick() => {
                    for player_id in self.clients.check_timeouts(self.config.client_timeout) {
                        self.game_state.remove_player(&player_id);
                    }
                },
            }
        }

        let remaining = self.clients.get_client_addrs();
        for (player_id, addr) in &remaining {
            debug!("Notifying client {} of shutdown", player_id);
            self.send_packet(
                Packet::Disconnected {
                    reason: "Server shutting down".to_string(),
                },
                *addr,
            );
        }
        if !remaining.is_empty() {
            // Give the sender task a moment to flush the goodbyes
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Ok(())
    }
}
