//! Client network layer: connection handshake and the 20 Hz sample loop

use crate::config::ClientConfig;
use crate::game::{ClientGameState, ReconcileOutcome};
use crate::input::{ControlSource, InputSampler};
use crate::stats::NetworkStats;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::time::unix_millis;
use shared::{
    decode, encode, InputSample, LayoutError, Packet, PlayerId, ProtocolError, MAX_DATAGRAM_SIZE,
    PROTOCOL_VERSION, TICK_PERIOD_MS, TICK_RATE_HZ,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, sleep_until, timeout_at, Instant, MissedTickBehavior};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error("server refused connection: {0}")]
    Refused(String),
    #[error("server ticks at {server} Hz but this client samples at {client} Hz")]
    TickRateMismatch { server: u32, client: u32 },
    #[error("no answer from server after {0} attempts")]
    ConnectTimeout(u32),
    #[error("packet receiver stopped")]
    ReceiverStopped,
    #[error("no snapshot from server for {0:?}")]
    ServerSilent(Duration),
}

pub struct Client {
    socket: Arc<UdpSocket>,
    config: ClientConfig,
    player_id: Option<PlayerId>,
    last_snapshot_at: Instant,

    game: ClientGameState,
    sampler: InputSampler,
    stats: NetworkStats,
    rng: StdRng,

    inbound_tx: mpsc::UnboundedSender<Packet>,
    inbound_rx: mpsc::UnboundedReceiver<Packet>,
    receiver: Option<JoinHandle<()>>,
}

impl Client {
    pub async fn new(
        config: ClientConfig,
        controls: Box<dyn ControlSource + Send>,
    ) -> Result<Self, ClientError> {
        let bind_addr = if config.server_addr.is_ipv6() {
            "[::]:0"
        } else {
            "0.0.0.0:0"
        };
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let layout = config.load_layout()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ 0x5eed),
            None => StdRng::from_entropy(),
        };
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Ok(Client {
            socket,
            config,
            player_id: None,
            last_snapshot_at: Instant::now(),
            game: ClientGameState::with_obstacles(layout.obstacles),
            sampler: InputSampler::new(controls),
            stats: NetworkStats::new(),
            rng,
            inbound_tx,
            inbound_rx,
            receiver: None,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn game(&self) -> &ClientGameState {
        &self.game
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    /// Access to the sampler's movement suppression hook.
    pub fn sampler_mut(&mut self) -> &mut InputSampler {
        &mut self.sampler
    }

    fn one_way_delay(&self) -> Duration {
        self.config.fake_ping / 2
    }

    /// Spawns the task that decodes datagrams from the server, delaying
    /// each by half the simulated ping.
    fn spawn_network_receiver(&mut self) {
        if self.receiver.is_some() {
            return;
        }

        let socket = Arc::clone(&self.socket);
        let inbound_tx = self.inbound_tx.clone();
        let server_addr = self.config.server_addr;
        let delay = self.one_way_delay();

        self.receiver = Some(tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                let (len, from) = match socket.recv_from(&mut buffer).await {
                    Ok(received) => received,
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        sleep(Duration::from_millis(10)).await;
                        continue;
                    }
                };

                if from != server_addr {
                    debug!("Ignoring datagram from {}", from);
                    continue;
                }

                let packet = match decode(&buffer[..len]) {
                    Ok(packet) => packet,
                    Err(e) => {
                        warn!("Dropping malformed datagram: {}", e);
                        continue;
                    }
                };

                if delay.is_zero() {
                    if inbound_tx.send(packet).is_err() {
                        break;
                    }
                } else {
                    let inbound_tx = inbound_tx.clone();
                    tokio::spawn(async move {
                        sleep(delay).await;
                        let _ = inbound_tx.send(packet);
                    });
                }
            }
        }));
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), ClientError> {
        let data = encode(packet)?;
        let delay = self.one_way_delay();

        if delay.is_zero() {
            self.socket.send_to(&data, self.config.server_addr).await?;
        } else {
            let socket = Arc::clone(&self.socket);
            let server_addr = self.config.server_addr;
            tokio::spawn(async move {
                sleep(delay).await;
                if let Err(e) = socket.send_to(&data, server_addr).await {
                    error!("Failed to send delayed packet: {}", e);
                }
            });
        }
        Ok(())
    }

    /// Sends `Connect` until the server answers, retrying after
    /// `connect_timeout` up to `connect_attempts` times.
    pub async fn connect(&mut self) -> Result<PlayerId, ClientError> {
        self.spawn_network_receiver();

        let attempts = self.config.connect_attempts;
        for attempt in 1..=attempts {
            info!(
                "Connecting to {} (attempt {}/{})",
                self.config.server_addr, attempt, attempts
            );
            self.send_packet(&Packet::Connect {
                protocol_version: PROTOCOL_VERSION,
            })
            .await?;

            let deadline = Instant::now() + self.config.connect_timeout + self.config.fake_ping;
            loop {
                let packet = match timeout_at(deadline, self.inbound_rx.recv()).await {
                    Err(_) => break,
                    Ok(None) => return Err(ClientError::ReceiverStopped),
                    Ok(Some(packet)) => packet,
                };

                match packet {
                    Packet::Connected {
                        player_id,
                        spawn,
                        tick_rate_hz,
                    } => {
                        if tick_rate_hz != TICK_RATE_HZ {
                            return Err(ClientError::TickRateMismatch {
                                server: tick_rate_hz,
                                client: TICK_RATE_HZ,
                            });
                        }
                        info!(
                            "Connected! Player ID: {} at ({:.2}, {:.2}, {:.2})",
                            player_id, spawn.position.x, spawn.position.y, spawn.position.z
                        );
                        self.player_id = Some(player_id);
                        self.game.on_connected(player_id, spawn);
                        self.sampler.reset_sequence();
                        self.last_snapshot_at = Instant::now();
                        return Ok(player_id);
                    }
                    Packet::Disconnected { reason } => return Err(ClientError::Refused(reason)),
                    _ => debug!("Ignoring packet received before connection was confirmed"),
                }
            }
        }

        Err(ClientError::ConnectTimeout(attempts))
    }

    async fn send_input(&mut self, sample: InputSample) -> Result<(), ClientError> {
        if self.config.packet_loss > 0.0 && self.rng.gen_bool(self.config.packet_loss) {
            self.stats.inputs_dropped += 1;
            return Ok(());
        }
        self.send_packet(&Packet::Input(sample)).await?;
        self.stats.inputs_sent += 1;
        Ok(())
    }

    /// One client tick: sample, predict, send.
    ///
    /// The newest sample goes out together with up to `redundancy` older
    /// unacknowledged ones; the server discards the copies it already has.
    async fn sample_and_send(&mut self) -> Result<(), ClientError> {
        let sample = self.sampler.sample();
        if let Err(e) = self.game.apply_prediction(sample) {
            warn!("Discarding sample: {}", e);
            return Ok(());
        }

        let pending = self.game.pending();
        self.stats
            .record_pending(pending.len(), pending.capacity(), pending.overflowed());

        let outgoing: Vec<InputSample> = pending
            .newest(self.config.redundancy.saturating_add(1))
            .cloned()
            .collect();
        for sample in outgoing {
            self.send_input(sample).await?;
        }
        Ok(())
    }

    /// Returns false when the server ended the session.
    fn handle_packet(&mut self, packet: Packet) -> bool {
        match packet {
            Packet::Snapshot(snapshot) => {
                self.last_snapshot_at = Instant::now();
                let seq = snapshot.seq;
                let outcome = self.game.apply_server_snapshot(snapshot);

                match outcome {
                    ReconcileOutcome::Stale { .. } => self.stats.record_stale_snapshot(),
                    ReconcileOutcome::NotSpawned => self.stats.record_snapshot(seq),
                    ReconcileOutcome::Reconciled {
                        correction,
                        acknowledged_sent_at,
                        ..
                    } => {
                        self.stats.record_snapshot(seq);
                        if let Some(sent_at) = acknowledged_sent_at {
                            self.stats.record_rtt((unix_millis() - sent_at) as f64);
                        }
                        if outcome.is_correction() {
                            self.stats.record_correction(correction);
                        }
                    }
                }

                let pending = self.game.pending();
                self.stats
                    .record_pending(pending.len(), pending.capacity(), pending.overflowed());
                true
            }

            Packet::Connected { player_id, .. } => {
                debug!("Duplicate connect acknowledgement for player {}", player_id);
                true
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.player_id = None;
                false
            }

            _ => {
                warn!("Unexpected packet type");
                true
            }
        }
    }

    /// How long the server has been silent, once that exceeds the configured
    /// timeout. A server that timed us out sends nothing more.
    fn server_silence(&self) -> Option<Duration> {
        let silent_for = self.last_snapshot_at.elapsed();
        (silent_for > self.config.server_timeout + self.config.fake_ping).then_some(silent_for)
    }

    fn log_stats(&self) {
        let rtt = self
            .stats
            .rtt_ms
            .map(|rtt| format!("{:.0}ms", rtt))
            .unwrap_or_else(|| "n/a".to_string());
        let pose = self.game.predicted_pose();

        info!(
            "Snapshot {} | pending {} | rtt {} | missed {} | corrections {} (max {:.3}) | quality {} | at ({:.2}, {:.2})",
            self.game.latest_snapshot_seq(),
            self.game.pending().len(),
            rtt,
            self.stats.snapshots_missed,
            self.stats.corrections,
            self.stats.max_correction,
            self.stats.connection_quality(),
            pose.position.x,
            pose.position.z
        );
    }

    /// Connects, then samples and sends input at the tick rate until the
    /// configured duration elapses, the server disconnects us, or Ctrl+C.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        self.connect().await?;

        let mut input_interval = interval(Duration::from_millis(TICK_PERIOD_MS));
        input_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut stats_interval = interval(Duration::from_secs(5));
        stats_interval.tick().await;

        let deadline = self.config.duration.map(|duration| Instant::now() + duration);
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut result = Ok(());

        loop {
            tokio::select! {
                packet = self.inbound_rx.recv() => {
                    match packet {
                        Some(packet) => {
                            if !self.handle_packet(packet) {
                                break;
                            }
                        }
                        None => return Err(ClientError::ReceiverStopped),
                    }
                },

                _ = input_interval.tick() => {
                    if let Err(e) = self.sample_and_send().await {
                        error!("Error sending input: {}", e);
                    }
                    if let Some(silent_for) = self.server_silence() {
                        warn!("No snapshot from server for {:?}, ending session", silent_for);
                        result = Err(ClientError::ServerSilent(silent_for));
                        break;
                    }
                },

                _ = stats_interval.tick() => {
                    self.log_stats();
                },

                _ = wait_until(deadline) => {
                    info!("Session time elapsed");
                    break;
                },

                _ = &mut ctrl_c => {
                    info!("Received Ctrl+C, disconnecting...");
                    break;
                },
            }
        }

        if self.player_id.take().is_some() {
            // Sent immediately, even with simulated latency, so it isn't lost on exit
            let data = encode(&Packet::Disconnect)?;
            if let Err(e) = self.socket.send_to(&data, self.config.server_addr).await {
                warn!("Failed to send disconnect: {}", e);
            }
        }

        self.log_stats();
        result
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(receiver) = self.receiver.take() {
            receiver.abort();
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
