//! Server network layer: UDP transport and the fixed-rate game loop
//!
//! Receiving, sending and timeout checks run as separate tokio tasks that
//! only move messages over channels. The main loop owns the [`GameState`]
//! and is the only place game state is mutated.

use crate::client_manager::ClientManager;
use crate::game::{Audience, GameState, Outgoing};
use bincode::{deserialize, serialize, serialized_size};
use log::{debug, error, info, warn};
use shared::{MoveInput, Packet, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the game loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    SendToClient { packet: Packet, client_id: u32 },
    BroadcastPacket { packet: Packet, exclude: Option<u32> },
}

pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,
    tick_duration: Duration,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        game_state: GameState,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            game_state,
            tick_duration,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::SendToClient { packet, client_id } => {
                        let addr = clients.read().await.addr_of(client_id);
                        match addr {
                            Some(addr) => {
                                if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await
                                {
                                    error!("Failed to send to client {}: {}", client_id, e);
                                }
                            }
                            None => debug!("Dropping packet for departed client {}", client_id),
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn queue(&self, message: GameMessage) {
        if let Err(e) = self.game_tx.send(message) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        self.queue(GameMessage::SendPacket { packet, addr });
    }

    /// Hands everything the game produced this tick to the sender task.
    fn flush_outbox(&mut self) {
        for Outgoing { audience, packet } in self.game_state.drain_outbox() {
            if !fits_datagram(&packet) {
                warn!(
                    "Dropping packet for {:?} larger than {} bytes",
                    audience, MAX_PACKET_SIZE
                );
                continue;
            }
            match audience {
                Audience::All => self.queue(GameMessage::BroadcastPacket {
                    packet,
                    exclude: None,
                }),
                Audience::Client(client_id) => {
                    self.queue(GameMessage::SendToClient { packet, client_id })
                }
            }
        }
    }

    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect {
            client_version,
            display_name,
        } = packet
        {
            self.handle_connect(client_version, display_name, addr).await;
            return;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            let client_id = clients.find_client_by_addr(addr);
            if let Some(id) = client_id {
                clients.touch(id);
            }
            client_id
        };
        let Some(client_id) = client_id else {
            warn!("Packet from unknown address {}", addr);
            return;
        };

        match packet {
            Packet::Move {
                sequence,
                timestamp,
                position,
                yaw,
                pitch,
            } => {
                let input = MoveInput {
                    sequence,
                    timestamp,
                    position,
                    yaw,
                    pitch,
                };
                self.clients.write().await.add_input(client_id, input);
            }

            Packet::Heartbeat { .. } => {}

            Packet::Disconnect => {
                self.clients.write().await.remove_client(&client_id);
                self.game_state.remove_client(client_id);
            }

            request => self.game_state.handle_request(client_id, request),
        }
    }

    async fn handle_connect(
        &mut self,
        client_version: u32,
        display_name: Option<String>,
        addr: SocketAddr,
    ) {
        info!(
            "Client connecting from {} (version: {})",
            addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            self.send_packet(
                Packet::Disconnected {
                    reason: "Protocol version mismatch".to_string(),
                },
                addr,
            );
            return;
        }

        let (existing_client_id, client_id) = {
            let mut clients = self.clients.write().await;
            let existing_client_id = clients.find_client_by_addr(addr);
            if let Some(existing_id) = existing_client_id {
                clients.remove_client(&existing_id);
            }
            (existing_client_id, clients.add_client(addr))
        };

        match (client_id, existing_client_id) {
            (Some(client_id), Some(existing_id)) => {
                info!(
                    "Client {} reconnected from {} as {}",
                    existing_id, addr, client_id
                );
                self.send_packet(Packet::Connected { client_id }, addr);
                self.game_state
                    .reconnect_client(existing_id, client_id, display_name);
            }
            (Some(client_id), None) => {
                self.send_packet(Packet::Connected { client_id }, addr);
                self.game_state.add_client(client_id, display_name);
            }
            (None, existing) => {
                if let Some(existing_id) = existing {
                    self.game_state.remove_client(existing_id);
                }
                self.send_packet(
                    Packet::Disconnected {
                        reason: "Server full".to_string(),
                    },
                    addr,
                );
            }
        }
    }

    /// Applies queued movement in timestamp order.
    async fn process_inputs(&mut self) {
        let all_inputs = self.clients.read().await.get_chronological_inputs();
        if all_inputs.is_empty() {
            return;
        }

        let mut clients = self.clients.write().await;
        for (client_id, input) in &all_inputs {
            if let Err(rejection) = self.game_state.apply_move(*client_id, input) {
                debug!("Movement from client {} dropped: {}", client_id, rejection);
            }
            clients.mark_input_processed(*client_id, input.sequence);
        }
        clients.cleanup_processed_inputs();
    }

    async fn broadcast_snapshot(&mut self) {
        let last_processed_input = {
            let clients = self.clients.read().await;
            if clients.is_empty() {
                return;
            }
            clients.get_last_processed_inputs()
        };

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis();
        let timestamp_safe = (timestamp.min(u64::MAX as u128)) as u64;

        let packet = self.game_state.snapshot(timestamp_safe, last_processed_input);
        self.queue(GameMessage::BroadcastPacket {
            packet,
            exclude: None,
        });
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                            self.flush_outbox();
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.game_state.remove_client(client_id);
                            self.flush_outbox();
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.process_inputs().await;
                    self.game_state.update(dt);
                    self.game_state.tick += 1;
                    self.flush_outbox();
                    self.broadcast_snapshot().await;

                    if self.game_state.tick % 300 == 0 {
                        let client_count = self.clients.read().await.len();
                        if client_count > 0 {
                            debug!("Tick {}: {} clients, {:.1}Hz",
                                   self.game_state.tick, client_count, 1.0 / dt);
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

/// Whether a peer can receive the packet in a single read.
pub fn fits_datagram(packet: &Packet) -> bool {
    match serialized_size(packet) {
        Ok(size) => size <= MAX_PACKET_SIZE as u64,
        Err(e) => {
            error!("Failed to size packet: {}", e);
            false
        }
    }
}
