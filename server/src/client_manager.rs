//! Connected clients and their input inboxes.
//!
//! This module handles the server-side bookkeeping of connected clients:
//! - Client connection lifecycle (connect, disconnect, timeout)
//! - Per-client inboxes that buffer received input samples until the next tick
//! - Connection health monitoring and capacity limits
//!
//! Receiving a sample only ever enqueues it here. Samples are applied to the
//! authoritative state exclusively by the tick, which drains every inbox.

use log::{info, warn};
use shared::{InputSample, PlayerId};
use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Samples buffered per client between two ticks before the oldest is dropped.
pub const MAX_INBOX_DEPTH: usize = 256;

/// Samples received from one client since the last tick, in arrival order.
#[derive(Debug, Default)]
pub struct Inbox {
    samples: VecDeque<InputSample>,
    dropped: u64,
}

impl Inbox {
    pub fn push(&mut self, sample: InputSample) {
        if self.samples.len() >= MAX_INBOX_DEPTH {
            self.samples.pop_front();
            self.dropped += 1;
        }
        self.samples.push_back(sample);
    }

    /// Takes everything received so far, leaving the inbox empty.
    pub fn drain(&mut self) -> Vec<InputSample> {
        self.samples.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples discarded because the inbox overflowed.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Represents a connected client
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier, also used as the player id
    pub id: PlayerId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this client
    pub last_seen: Instant,
    pub inbox: Inbox,
}

impl Client {
    pub fn new(id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            inbox: Inbox::default(),
        }
    }

    /// Checks if the client has exceeded the connection timeout
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected clients
///
/// Clients are kept in id order so every tick drains inboxes in the same
/// order regardless of how the clients connected.
pub struct ClientManager {
    clients: BTreeMap<PlayerId, Client>,
    /// Next available client ID for new connections
    next_client_id: PlayerId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity limit.
    /// Client IDs start from 1 and increment for each new connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to add a new client connection
    ///
    /// Returns Some(client_id) if successful, None if server is at capacity.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client, discarding its inbox. Returns false if it was already gone.
    pub fn remove_client(&mut self, client_id: &PlayerId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            if !client.inbox.is_empty() {
                info!(
                    "Client {} disconnected with {} unprocessed inputs",
                    client.id,
                    client.inbox.len()
                );
            } else {
                info!("Client {} disconnected", client.id);
            }
            true
        } else {
            false
        }
    }

    /// Finds a client ID by their network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Buffers a received sample for the next tick. Returns false if the
    /// client ID is unknown.
    pub fn enqueue_input(&mut self, client_id: PlayerId, sample: InputSample) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.last_seen = Instant::now();
                let dropped_before = client.inbox.dropped();
                client.inbox.push(sample);
                if client.inbox.dropped() > dropped_before && client.inbox.dropped() % 64 == 1 {
                    warn!(
                        "Client {} inbox overflowing, {} inputs dropped so far",
                        client_id,
                        client.inbox.dropped()
                    );
                }
                true
            }
            None => false,
        }
    }

    /// Marks the client as alive without enqueuing anything
    pub fn touch(&mut self, client_id: PlayerId) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = Instant::now();
        }
    }

    /// Empties every inbox, returning the samples per client in client id order.
    pub fn drain_inboxes(&mut self) -> Vec<(PlayerId, Vec<InputSample>)> {
        self.clients
            .iter_mut()
            .map(|(id, client)| (*id, client.inbox.drain()))
            .collect()
    }

    /// Removes clients that have been silent for longer than `timeout`.
    ///
    /// Returns the removed client IDs so the game state can drop them too.
    pub fn check_timeouts(&mut self, timeout: Duration) -> Vec<PlayerId> {
        let timed_out: Vec<PlayerId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            warn!("Client {} timed out", client_id);
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Gets all client IDs and their network addresses for broadcasting
    pub fn get_client_addrs(&self) -> Vec<(PlayerId, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn get(&self, client_id: PlayerId) -> Option<&Client> {
        self.clients.get(&client_id)
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::MovementFlags;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn sample(seq: u64) -> InputSample {
        InputSample {
            seq,
            flags: MovementFlags::default(),
            look_yaw: 0.0,
            client_timestamp: 0,
        }
    }

    #[test]
    fn test_client_creation() {
        let addr = test_addr();
        let client = Client::new(1, addr);

        assert_eq!(client.id, 1);
        assert_eq!(client.addr, addr);
        assert!(client.inbox.is_empty());
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, test_addr());

        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);

        assert!(client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert_eq!(manager.add_client(test_addr()), Some(1));
        assert_eq!(manager.add_client(test_addr2()), None);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut manager = ClientManager::new(2);
        let first = manager.add_client(test_addr()).unwrap();
        manager.remove_client(&first);
        let second = manager.add_client(test_addr()).unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr()).unwrap();

        assert!(manager.remove_client(&client_id));
        assert!(manager.is_empty());
        assert!(!manager.remove_client(&999));
    }

    #[test]
    fn test_find_client_by_addr() {
        let mut manager = ClientManager::new(2);
        let client_id1 = manager.add_client(test_addr()).unwrap();
        let _client_id2 = manager.add_client(test_addr2()).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(client_id1));

        let unknown_addr: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown_addr), None);
    }

    #[test]
    fn test_enqueue_keeps_arrival_order_until_drained() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr()).unwrap();

        assert!(manager.enqueue_input(client_id, sample(3)));
        assert!(manager.enqueue_input(client_id, sample(1)));
        assert!(manager.enqueue_input(client_id, sample(2)));
        assert_eq!(manager.get(client_id).unwrap().inbox.len(), 3);

        let drained = manager.drain_inboxes();
        let seqs: Vec<u64> = drained[0].1.iter().map(|s| s.seq).collect();
        assert_eq!(seqs, vec![3, 1, 2]);
        assert!(manager.get(client_id).unwrap().inbox.is_empty());
    }

    #[test]
    fn test_enqueue_to_unknown_client() {
        let mut manager = ClientManager::new(2);
        assert!(!manager.enqueue_input(999, sample(1)));
    }

    #[test]
    fn test_drain_is_in_client_id_order() {
        let mut manager = ClientManager::new(3);
        let a = manager.add_client(test_addr()).unwrap();
        let b = manager.add_client(test_addr2()).unwrap();
        manager.enqueue_input(b, sample(1));
        manager.enqueue_input(a, sample(1));

        let ids: Vec<PlayerId> = manager.drain_inboxes().iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_inbox_overflow_drops_oldest() {
        let mut inbox = Inbox::default();
        for seq in 1..=(MAX_INBOX_DEPTH as u64 + 3) {
            inbox.push(sample(seq));
        }

        assert_eq!(inbox.len(), MAX_INBOX_DEPTH);
        assert_eq!(inbox.dropped(), 3);
        assert_eq!(inbox.drain()[0].seq, 4);
    }

    #[test]
    fn test_check_timeouts_removes_silent_clients() {
        let mut manager = ClientManager::new(3);
        let quiet = manager.add_client(test_addr()).unwrap();
        let active = manager.add_client(test_addr2()).unwrap();

        if let Some(client) = manager.clients.get_mut(&quiet) {
            client.last_seen = Instant::now() - Duration::from_secs(10);
        }

        let removed = manager.check_timeouts(Duration::from_secs(5));
        assert_eq!(removed, vec![quiet]);
        assert!(manager.get(active).is_some());
        assert_eq!(manager.len(), 1);
    }
}
