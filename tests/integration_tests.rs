//! Integration tests for the position sync loop
//!
//! These tests drive the client and server crates together, first in-process
//! through the pure tick step and then over real UDP sockets on localhost.

use client::config::ClientConfig;
use client::game::{ClientGameState, ReconcileOutcome};
use client::input::{FixedControls, InputSampler, ScriptedControls};
use client::network::{Client, ClientError};
use server::client_manager::ClientManager;
use server::config::ServerConfig;
use server::game::GameState;
use server::network::{Server, ServerMessage};
use server::tick::TickLoop;
use shared::{
    advance, decode, encode, InputSample, Layout, MovementFlags, Obstacle, ObstacleKind,
    ObstacleMap, Packet, PlayerId, Pose, DEFAULT_LAYOUT, MAX_INPUT_LEAD, PROTOCOL_VERSION,
};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};
use tokio_test::{assert_err, assert_ok};

fn forward(seq: u64) -> InputSample {
    InputSample {
        seq,
        flags: MovementFlags {
            forward: true,
            ..MovementFlags::default()
        },
        look_yaw: 0.0,
        client_timestamp: 0,
    }
}

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// PREDICTION VS AUTHORITY TESTS
mod reconciliation_tests {
    use super::*;

    /// Five forward samples predicted locally land exactly where the server puts them
    #[test]
    fn scenario_a_prediction_matches_authority() {
        let mut client = ClientGameState::new();
        client.on_connected(1, Pose::default());
        for seq in 1..=5 {
            client.apply_prediction(forward(seq)).unwrap();
        }

        let mut game = GameState::new(Layout::parse("S").unwrap());
        let spawn = game.add_player(1);
        assert_eq!(spawn, Pose::default());
        game.apply_inputs(1, (1..=5).map(forward).collect());

        let server_pose = game.player(1).unwrap().pose;
        assert_eq!(client.predicted_pose(), server_pose);
        assert_eq!(
            server_pose.position.z.to_bits(),
            client.predicted_pose().position.z.to_bits()
        );
        assert!(server_pose.position.z < 0.0);
    }

    /// Reordered arrivals inside one tick give the in-order result
    #[test]
    fn scenario_b_reordered_batch() {
        let mut clients = ClientManager::new(4);
        let mut game = GameState::new(Layout::parse("S").unwrap());
        let mut tick = TickLoop::new();
        let id = clients.add_client(addr(7000)).unwrap();
        game.add_player(id);

        for seq in [3, 1, 2] {
            clients.enqueue_input(id, forward(seq));
        }
        let report = tick.step(&mut clients, &mut game, 0);

        let mut expected = Pose::default();
        for seq in 1..=3 {
            expected = advance(expected, &forward(seq), 1.0, Some(game.obstacles()));
        }
        let player = report.snapshot.player(id).unwrap();
        assert_eq!(player.pose(), expected);
        assert_eq!(player.last_processed_seq, 3);
    }

    /// Only samples after the acknowledged one are replayed
    #[test]
    fn scenario_c_partial_acknowledgement() {
        let mut client = ClientGameState::new();
        client.on_connected(1, Pose::default());
        for seq in 6..=8 {
            client.apply_prediction(forward(seq)).unwrap();
        }

        let mut game = GameState::new(Layout::parse("S").unwrap());
        game.add_player(1);
        game.apply_inputs(1, (6..=7).map(forward).collect());
        let snapshot = shared::StateSnapshot {
            seq: 1,
            timestamp: 0,
            players: game.snapshot_players(),
        };

        client.apply_server_snapshot(snapshot);

        let pending: Vec<u64> = client.pending().iter().map(|s| s.seq).collect();
        assert_eq!(pending, vec![8]);
        let authoritative = game.player(1).unwrap().pose;
        assert_eq!(
            client.predicted_pose(),
            advance(authoritative, &forward(8), 1.0, None)
        );
    }

    /// A duplicate of an applied sample changes nothing
    #[test]
    fn scenario_d_duplicate_after_processing() {
        let mut clients = ClientManager::new(4);
        let mut game = GameState::new(Layout::parse("S").unwrap());
        let mut tick = TickLoop::new();
        let id = clients.add_client(addr(7001)).unwrap();
        game.add_player(id);

        for seq in 1..=4 {
            clients.enqueue_input(id, forward(seq));
        }
        let first = tick.step(&mut clients, &mut game, 0);

        clients.enqueue_input(id, forward(4));
        let second = tick.step(&mut clients, &mut game, 0);

        assert_eq!(second.inputs.stale, 1);
        assert_eq!(second.inputs.applied, 0);
        assert_eq!(first.snapshot.player(id), second.snapshot.player(id));
        assert_eq!(second.snapshot.seq, first.snapshot.seq + 1);
    }

    /// Walking diagonally into a wall slides along it on both sides of the connection
    #[test]
    fn scenario_e_wall_sliding_on_both_sides() {
        let mut wall = ObstacleMap::new();
        wall.add(Obstacle::new(-10.0, -2.0, 10.0, -1.0, ObstacleKind::Wall));

        let mut client = ClientGameState::with_obstacles(wall.clone());
        client.on_connected(1, Pose::default());

        let step = |seq: u64| InputSample {
            seq,
            flags: MovementFlags {
                forward: true,
                right: true,
                ..MovementFlags::default()
            },
            look_yaw: 0.0,
            client_timestamp: 0,
        };

        let mut server_pose = Pose::default();
        for seq in 1..=30 {
            client.apply_prediction(step(seq)).unwrap();
            server_pose = advance(server_pose, &step(seq), 1.0, Some(&wall));
        }

        let pose = client.predicted_pose();
        assert_eq!(pose, server_pose);
        // Blocked on Z short of the wall, still sliding along X
        assert!(pose.position.z > -1.0);
        assert!(pose.position.x > 3.0);
    }
}

/// DETERMINISM UNDER LATENCY TESTS
mod latency_tests {
    use super::*;

    /// Runs one player through the maze with inputs and snapshots delayed by
    /// whole ticks, reconciling after every delivered snapshot.
    fn run_delayed_session(upstream_delay: usize, downstream_delay: usize, ticks: usize) -> u64 {
        let layout = Layout::parse(DEFAULT_LAYOUT).unwrap();
        let mut clients = ClientManager::new(4);
        let mut game = GameState::new(layout.clone());
        let mut tick = TickLoop::new();

        let id: PlayerId = clients.add_client(addr(7100)).unwrap();
        let spawn = game.add_player(id);

        let mut client = ClientGameState::with_obstacles(layout.obstacles);
        client.on_connected(id, spawn);
        let mut sampler = InputSampler::new(Box::new(ScriptedControls::new(Some(42))));

        let mut upstream: VecDeque<Vec<InputSample>> = VecDeque::new();
        let mut downstream = VecDeque::new();
        let mut corrections = 0;
        let mut last_processed = 0;

        for _ in 0..ticks {
            let sample = sampler.sample();
            client.apply_prediction(sample.clone()).unwrap();
            upstream.push_back(vec![sample]);

            if upstream.len() > upstream_delay {
                for sample in upstream.pop_front().unwrap_or_default() {
                    clients.enqueue_input(id, sample);
                }
            }

            let report = tick.step(&mut clients, &mut game, 0);
            let processed = report.snapshot.player(id).unwrap().last_processed_seq;
            assert!(processed >= last_processed);
            last_processed = processed;
            downstream.push_back(report.snapshot);

            if downstream.len() > downstream_delay {
                if let Some(snapshot) = downstream.pop_front() {
                    let outcome = client.apply_server_snapshot(snapshot);
                    assert!(matches!(outcome, ReconcileOutcome::Reconciled { .. }));
                    if outcome.is_correction() {
                        corrections += 1;
                    }
                }
            }
        }

        // Once everything is delivered, prediction and authority agree exactly
        for batch in upstream.drain(..) {
            for sample in batch {
                clients.enqueue_input(id, sample);
            }
        }
        let report = tick.step(&mut clients, &mut game, 0);
        client.apply_server_snapshot(report.snapshot);

        assert!(client.pending().is_empty());
        assert_eq!(client.predicted_pose(), game.player(id).unwrap().pose);
        corrections
    }

    #[test]
    fn prediction_never_corrects_without_latency() {
        assert_eq!(run_delayed_session(0, 0, 400), 0);
    }

    #[test]
    fn prediction_never_corrects_with_latency() {
        assert_eq!(run_delayed_session(3, 2, 400), 0);
        assert_eq!(run_delayed_session(10, 10, 400), 0);
    }

    /// The server learns of a door closing that the client's copy still shows open
    #[test]
    fn collision_context_mismatch_is_corrected() {
        let layout = Layout::parse("d\nS").unwrap();
        let mut game = GameState::new(layout.clone());
        let spawn = game.add_player(1);
        let door = game
            .obstacles()
            .iter()
            .find(|(_, o)| matches!(o.kind, ObstacleKind::Door { .. }))
            .map(|(id, _)| id)
            .unwrap();
        game.obstacles_mut().set_door_open(door, false);

        let mut client = ClientGameState::with_obstacles(layout.obstacles);
        client.on_connected(1, spawn);

        for seq in 1..=15 {
            client.apply_prediction(forward(seq)).unwrap();
        }
        game.apply_inputs(1, (1..=15).map(forward).collect());
        let snapshot = shared::StateSnapshot {
            seq: 1,
            timestamp: 0,
            players: game.snapshot_players(),
        };

        let outcome = client.apply_server_snapshot(snapshot);
        assert!(outcome.is_correction());
        assert_eq!(client.predicted_pose(), game.player(1).unwrap().pose);
    }
}

/// REAL NETWORK TESTS
mod network_tests {
    use super::*;

    type ShutdownHandle = tokio::sync::mpsc::UnboundedSender<ServerMessage>;

    async fn start_server(
        max_clients: usize,
    ) -> (SocketAddr, ShutdownHandle, tokio::task::JoinHandle<Server>) {
        let mut server = Server::new(ServerConfig::local(max_clients)).await.unwrap();
        let server_addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let handle = tokio::spawn(async move {
            let _ = server.run().await;
            server
        });
        (server_addr, shutdown, handle)
    }

    fn client_config(server_addr: SocketAddr, seconds: u64) -> ClientConfig {
        let mut config = ClientConfig::new(server_addr);
        config.duration = Some(Duration::from_secs(seconds));
        config.seed = Some(5);
        config
    }

    fn walker(look_yaw: f64) -> Box<FixedControls> {
        Box::new(FixedControls {
            flags: MovementFlags {
                forward: true,
                ..MovementFlags::default()
            },
            look_yaw,
        })
    }

    /// A full session over localhost UDP: connect, move, reconcile, disconnect
    #[tokio::test]
    async fn client_session_against_real_server() {
        let (server_addr, shutdown, server_task) = start_server(4).await;

        let mut client = Client::new(client_config(server_addr, 2), walker(0.3))
            .await
            .unwrap();
        assert_ok!(client.run().await);

        let stats = client.stats();
        assert!(stats.snapshots_received > 10);
        assert!(stats.inputs_sent > 10);
        assert_eq!(stats.corrections, 0);
        assert!(client.game().latest_snapshot_seq() > 10);
        assert!(client.player_id().is_none());

        // Let the disconnect reach the server before stopping it
        sleep(Duration::from_millis(200)).await;
        shutdown.send(ServerMessage::Shutdown).unwrap();
        let server = timeout(Duration::from_secs(5), server_task)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(server.game_state().is_empty());
    }

    /// A second session on the same client numbers its input from 1 again
    #[tokio::test]
    async fn reconnect_restarts_input_sequence() {
        let (server_addr, shutdown, server_task) = start_server(4).await;

        let mut client = Client::new(client_config(server_addr, 1), walker(0.0))
            .await
            .unwrap();
        assert_ok!(client.run().await);

        // Stand in for a first session longer than the server's accepted lead
        for _ in 0..MAX_INPUT_LEAD {
            client.sampler_mut().sample();
        }
        assert!(client.sampler_mut().next_sequence() > MAX_INPUT_LEAD);

        assert_ok!(client.run().await);

        let game = client.game();
        assert!(game.pending().last_seq() < MAX_INPUT_LEAD);
        // The server applied the new session's input and acknowledged it
        assert!(game.pending().len() < 10);
        assert_eq!(client.stats().corrections, 0);

        sleep(Duration::from_millis(200)).await;
        shutdown.send(ServerMessage::Shutdown).unwrap();
        assert_ok!(timeout(Duration::from_secs(5), server_task).await);
    }

    /// Two clients see each other as remote players
    #[tokio::test]
    async fn clients_see_each_other() {
        let (server_addr, shutdown, server_task) = start_server(4).await;

        let mut first = Client::new(client_config(server_addr, 1), walker(0.0))
            .await
            .unwrap();
        let mut second = Client::new(client_config(server_addr, 2), walker(1.5))
            .await
            .unwrap();

        let (a, b) = tokio::join!(first.run(), second.run());
        assert_ok!(a);
        assert_ok!(b);

        let remotes: Vec<PlayerId> = first.game().remote_players().map(|(id, _)| id).collect();
        assert_eq!(remotes.len(), 1);
        assert_ne!(first.game().player_id(), Some(remotes[0]));

        shutdown.send(ServerMessage::Shutdown).unwrap();
        let _ = timeout(Duration::from_secs(5), server_task).await;
    }

    /// A full server refuses further clients
    #[tokio::test]
    async fn full_server_refuses_connection() {
        let (server_addr, shutdown, server_task) = start_server(1).await;

        let mut first = Client::new(ClientConfig::new(server_addr), walker(0.0))
            .await
            .unwrap();
        assert_ok!(first.connect().await);

        let mut second = Client::new(ClientConfig::new(server_addr), walker(0.0))
            .await
            .unwrap();
        let refused = assert_err!(second.connect().await);
        assert!(matches!(refused, ClientError::Refused(_)));

        shutdown.send(ServerMessage::Shutdown).unwrap();
        let _ = timeout(Duration::from_secs(5), server_task).await;
    }

    /// Mismatched protocol versions are refused with a reason
    #[tokio::test]
    async fn protocol_version_mismatch_over_udp() {
        let (server_addr, shutdown, server_task) = start_server(4).await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let connect = Packet::Connect {
            protocol_version: PROTOCOL_VERSION + 1,
        };
        socket
            .send_to(&encode(&connect).unwrap(), server_addr)
            .await
            .unwrap();

        let mut buffer = vec![0u8; 1024];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .expect("no reply from server")
            .unwrap();
        match decode(&buffer[..len]).unwrap() {
            Packet::Disconnected { reason } => assert!(reason.contains("version")),
            other => panic!("Unexpected reply {:?}", other),
        }

        shutdown.send(ServerMessage::Shutdown).unwrap();
        let _ = timeout(Duration::from_secs(5), server_task).await;
    }

    /// Garbage datagrams are dropped and the server keeps serving
    #[tokio::test]
    async fn malformed_datagram_does_not_stop_server() {
        let (server_addr, shutdown, server_task) = start_server(4).await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket.send_to(&[0xff; 13], server_addr).await.unwrap();

        let mut client = Client::new(ClientConfig::new(server_addr), walker(0.0))
            .await
            .unwrap();
        assert_ok!(client.connect().await);

        shutdown.send(ServerMessage::Shutdown).unwrap();
        let _ = timeout(Duration::from_secs(5), server_task).await;
    }

    /// Clients keep in sync with a simulated half-second round trip
    #[tokio::test]
    async fn session_with_simulated_latency() {
        let (server_addr, shutdown, server_task) = start_server(4).await;

        let mut config = client_config(server_addr, 2);
        config.fake_ping = Duration::from_millis(200);
        let mut client = Client::new(config, walker(-0.7)).await.unwrap();
        assert_ok!(client.run().await);

        let stats = client.stats();
        assert!(stats.snapshots_received > 5);
        assert_eq!(stats.corrections, 0);
        assert!(stats.rtt_ms.unwrap_or(0.0) >= 150.0);
        // Samples still in flight when the session ended
        assert!(!client.game().pending().is_empty());

        shutdown.send(ServerMessage::Shutdown).unwrap();
        let _ = timeout(Duration::from_secs(5), server_task).await;
    }

    /// The wire carries the exact sample values the client produced
    #[tokio::test]
    async fn input_packet_preserves_sample_bits() {
        let sample = InputSample {
            seq: u64::MAX - 1,
            flags: MovementFlags {
                forward: true,
                left: true,
                ..MovementFlags::default()
            },
            look_yaw: -std::f64::consts::FRAC_PI_3,
            client_timestamp: i64::MAX,
        };
        let bytes = encode(&Packet::Input(sample.clone())).unwrap();
        match decode(&bytes).unwrap() {
            Packet::Input(decoded) => {
                assert_eq!(decoded.look_yaw.to_bits(), sample.look_yaw.to_bits());
                assert_eq!(decoded, sample);
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }
}
