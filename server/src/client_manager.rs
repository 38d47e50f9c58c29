//! Connection tracking and movement-sample queuing
//!
//! Every datagram source that completed the `Connect` handshake becomes a
//! [`Client`]. The manager:
//! - hands out connection ids and enforces the seat limit
//! - buffers movement samples per connection and releases them in
//!   timestamp order across all connections
//! - remembers the highest processed sequence so snapshots can acknowledge it
//! - drops connections that have been silent for longer than the timeout
//!
//! Whether a connection may actually drive an actor is decided by the
//! authority manager, not here.

use log::info;
use shared::MoveInput;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct Client {
    pub id: u32,
    pub addr: SocketAddr,
    /// Last time any packet arrived from this connection
    pub last_seen: Instant,
    /// Highest movement sequence applied to the game state
    pub last_processed_input: u32,
    pub pending_inputs: Vec<MoveInput>,
}

impl Client {
    pub fn new(id: u32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            last_processed_input: 0,
            pending_inputs: Vec::new(),
        }
    }

    /// Buffers a movement sample, keeping the queue in sequence order since
    /// datagrams may arrive out of order.
    pub fn add_input(&mut self, input: MoveInput) {
        self.last_seen = Instant::now();
        if input.sequence <= self.last_processed_input {
            return;
        }
        self.pending_inputs.push(input);
        self.pending_inputs.sort_by_key(|i| i.sequence);
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

pub struct ClientManager {
    clients: HashMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Returns the new connection id, or `None` when the server is full.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn addr_of(&self, client_id: u32) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|c| c.addr)
    }

    /// Marks the connection as alive without queuing anything.
    pub fn touch(&mut self, client_id: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_seen = Instant::now();
        }
    }

    pub fn add_input(&mut self, client_id: u32, input: MoveInput) -> bool {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.add_input(input);
            true
        } else {
            false
        }
    }

    /// Unprocessed samples from every connection, oldest timestamp first.
    pub fn get_chronological_inputs(&self) -> Vec<(u32, MoveInput)> {
        let mut all_inputs: Vec<(u32, MoveInput)> = Vec::new();

        for (client_id, client) in &self.clients {
            for input in &client.pending_inputs {
                if input.sequence > client.last_processed_input {
                    all_inputs.push((*client_id, input.clone()));
                }
            }
        }

        all_inputs.sort_by_key(|(_, input)| input.timestamp);
        all_inputs
    }

    pub fn mark_input_processed(&mut self, client_id: u32, sequence: u32) {
        if let Some(client) = self.clients.get_mut(&client_id) {
            client.last_processed_input = client.last_processed_input.max(sequence);
        }
    }

    pub fn cleanup_processed_inputs(&mut self) {
        for client in self.clients.values_mut() {
            client
                .pending_inputs
                .retain(|input| input.sequence > client.last_processed_input);
        }
    }

    pub fn get_last_processed_inputs(&self) -> HashMap<u32, u32> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.last_processed_input))
            .collect()
    }

    /// Drops silent connections and returns their ids so the game can
    /// release their seats and actors.
    pub fn check_timeouts(&mut self) -> Vec<u32> {
        let timed_out: Vec<u32> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(CLIENT_TIMEOUT))
            .map(|(id, _)| *id)
            .collect();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    pub fn get_client_addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.clients
            .iter()
            .map(|(id, client)| (*id, client.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Vec3;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn sample(sequence: u32, timestamp: u64) -> MoveInput {
        MoveInput {
            sequence,
            timestamp,
            position: Vec3::new(sequence as f32, 0.0, 0.0),
            yaw: 0.0,
            pitch: 0.0,
        }
    }

    #[test]
    fn test_client_creation() {
        let client = Client::new(1, test_addr());

        assert_eq!(client.id, 1);
        assert_eq!(client.last_processed_input, 0);
        assert!(client.pending_inputs.is_empty());
    }

    #[test]
    fn test_client_orders_by_sequence() {
        let mut client = Client::new(1, test_addr());
        client.add_input(sample(2, 100));
        client.add_input(sample(1, 50));

        assert_eq!(client.pending_inputs.len(), 2);
        assert_eq!(client.pending_inputs[0].sequence, 1);
        assert_eq!(client.pending_inputs[1].sequence, 2);
    }

    #[test]
    fn test_stale_sample_is_dropped() {
        let mut client = Client::new(1, test_addr());
        client.last_processed_input = 5;
        client.add_input(sample(4, 10));
        assert!(client.pending_inputs.is_empty());
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, test_addr());
        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(client.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_capacity() {
        let mut manager = ClientManager::new(1);
        assert_eq!(manager.add_client(test_addr()), Some(1));
        assert_eq!(manager.add_client(test_addr2()), None);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_and_lookup() {
        let mut manager = ClientManager::new(3);
        let first = manager.add_client(test_addr()).unwrap();
        let second = manager.add_client(test_addr2()).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr2()), Some(second));
        assert_eq!(manager.addr_of(first), Some(test_addr()));

        assert!(manager.remove_client(&first));
        assert!(!manager.remove_client(&first));
        assert_eq!(manager.find_client_by_addr(test_addr()), None);
    }

    #[test]
    fn test_input_for_unknown_client() {
        let mut manager = ClientManager::new(2);
        assert!(!manager.add_input(999, sample(1, 1)));
    }

    #[test]
    fn test_chronological_inputs_and_cleanup() {
        let mut manager = ClientManager::new(3);
        let a = manager.add_client(test_addr()).unwrap();
        let b = manager.add_client(test_addr2()).unwrap();

        manager.add_input(a, sample(1, 100));
        manager.add_input(b, sample(1, 50));
        manager.add_input(a, sample(2, 200));

        let inputs = manager.get_chronological_inputs();
        let timestamps: Vec<u64> = inputs.iter().map(|(_, i)| i.timestamp).collect();
        assert_eq!(timestamps, vec![50, 100, 200]);

        manager.mark_input_processed(a, 2);
        manager.mark_input_processed(b, 1);
        manager.cleanup_processed_inputs();
        assert!(manager.get_chronological_inputs().is_empty());
        assert_eq!(manager.get_last_processed_inputs().get(&a), Some(&2));
    }

    #[test]
    fn test_timeouts_remove_clients() {
        let mut manager = ClientManager::new(2);
        let id = manager.add_client(test_addr()).unwrap();
        manager.clients.get_mut(&id).unwrap().last_seen =
            Instant::now() - CLIENT_TIMEOUT - Duration::from_secs(1);

        assert_eq!(manager.check_timeouts(), vec![id]);
        assert!(manager.is_empty());
    }
}
