use crate::authority::{ActorControl, ControlSubsystem};
use crate::game::{ClientGameState, LightReporter, Notice};
use crate::input::{Command, InputManager, HELP};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, ServerEvent, LIGHT_CHECK_INTERVAL_SECS, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    display_name: Option<String>,
    connected: bool,
    running: bool,

    game_state: ClientGameState,
    input_manager: InputManager,
    light_reporter: LightReporter,
    control: ActorControl,

    ping_ms: u64,
    fake_ping_ms: u64,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        display_name: Option<String>,
        fake_ping_ms: u64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            display_name,
            connected: false,
            running: true,
            game_state: ClientGameState::new(),
            input_manager: InputManager::new(),
            light_reporter: LightReporter::new(),
            control: ActorControl::new(),
            ping_ms: 0,
            fake_ping_ms,
        })
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server...");

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            display_name: self.display_name.clone(),
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn send_or_log(&self, packet: &Packet) {
        if let Err(e) = self.send_packet(packet).await {
            error!("Error sending packet: {}", e);
        }
    }

    async fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected { client_id } => {
                info!("Connected! Client ID: {}", client_id);
                self.game_state.client_id = Some(client_id);
                self.connected = true;
                println!("{}", HELP);
            }

            Packet::Snapshot {
                tick,
                timestamp,
                time_remaining,
                phase,
                last_processed_input,
                participants,
            } => {
                let now = InputManager::get_timestamp();
                if timestamp > 0 {
                    self.ping_ms = now.saturating_sub(timestamp);
                }

                self.game_state.apply_snapshot(
                    tick,
                    time_remaining,
                    phase,
                    &last_processed_input,
                    participants,
                );
                let hints = self.game_state.update_proximity();
                self.present(hints);
            }

            Packet::Event(ServerEvent::AuthorityGranted { actor_id }) => {
                self.game_state.own_actor = Some(actor_id);
                let mut subsystems: [&mut dyn ControlSubsystem; 2] =
                    [&mut self.input_manager, &mut self.light_reporter];
                if self.control.on_granted(actor_id, &mut subsystems) {
                    self.send_or_log(&Packet::SpawnReady).await;
                }
            }

            Packet::Event(ServerEvent::AuthorityRevoked { actor_id }) => {
                let mut subsystems: [&mut dyn ControlSubsystem; 2] =
                    [&mut self.input_manager, &mut self.light_reporter];
                self.control.on_revoked(actor_id, &mut subsystems);
            }

            Packet::Event(event) => {
                let notices = self.game_state.apply_event(event);
                self.present(notices);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.running = false;
                self.game_state.client_id = None;
            }

            other => {
                warn!("Unexpected packet type: {:?}", other);
            }
        }
    }

    fn present(&self, notices: Vec<Notice>) {
        for notice in notices {
            match notice {
                Notice::Sound(cue) => println!("*{:?}*", cue),
                Notice::Hint(hint) => println!("{:?}", hint),
                Notice::Lobby(seats) => {
                    for seat in seats {
                        println!(
                            "  [{}] {} {:?}{}",
                            if seat.ready { "x" } else { " " },
                            seat.name,
                            seat.role,
                            if Some(seat.client_id) == self.game_state.client_id {
                                " <- you"
                            } else {
                                ""
                            }
                        );
                    }
                }
                Notice::MatchStarted => println!("The night begins."),
                Notice::MatchStartFailed(reason) => println!("Match failed to start: {}", reason),
                Notice::KeysChanged { collected, total } => {
                    println!("Keys: {}/{}", collected, total)
                }
                Notice::PhaseChanged(phase) => println!("It is now {:?}", phase),
                Notice::Died => println!("You were consumed by the light."),
                Notice::Escaped => println!("You escaped!"),
                Notice::GameOver { winning_side, won } => println!(
                    "{:?} win. {}",
                    winning_side,
                    if won { "Victory." } else { "Defeat." }
                ),
            }
        }
    }

    fn print_status(&self) {
        let game = &self.game_state;
        println!(
            "tick {} | {:?} | {:.0}s left | keys {}/{} | ping {}ms",
            game.tick,
            game.phase,
            game.time_remaining,
            game.keys_collected,
            game.keys_total,
            self.ping_ms + self.fake_ping_ms
        );
        match game.own() {
            Some(own) => println!(
                "{} {:?} {:?} hp {:.1} at ({:.1}, {:.1}){}{}",
                own.name,
                own.role,
                own.status,
                own.health,
                own.position.x,
                own.position.z,
                if own.in_light { " lit" } else { "" },
                own.battery_percent
                    .map(|b| format!(" battery {:.0}%", b))
                    .unwrap_or_default()
            ),
            None => println!("Not in a match"),
        }
        for (key_id, position) in &game.keys {
            println!("  key {} at ({:.1}, {:.1})", key_id, position.x, position.z);
        }
        println!("control: {}", self.control.is_enabled());
    }

    async fn handle_command(&mut self, line: &str) {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}. {}", e, HELP);
                return;
            }
        };

        match command {
            Command::Quit => {
                self.running = false;
                return;
            }
            Command::Status => {
                self.print_status();
                return;
            }
            _ => {}
        }

        if !self.connected {
            println!("Not connected yet");
            return;
        }

        match self.input_manager.to_packet(&command) {
            Some(packet) => {
                if let Packet::Move { position, yaw, .. } = &packet {
                    self.game_state.set_local_position(*position, *yaw);
                }
                self.send_or_log(&packet).await;
            }
            None => debug!("{:?} ignored without actor control", command),
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut heartbeat_interval = interval(HEARTBEAT_INTERVAL);
        let mut light_interval =
            interval(Duration::from_secs_f32(LIGHT_CHECK_INTERVAL_SECS));

        let mut buffer = [0u8; MAX_PACKET_SIZE];

        while self.running {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match deserialize::<Packet>(&buffer[0..len]) {
                                Ok(packet) => self.handle_packet(packet).await,
                                Err(e) => warn!("Undecodable packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) if !line.trim().is_empty() => {
                            self.handle_command(&line).await
                        }
                        Ok(Some(_)) => {}
                        Ok(None) => self.running = false,
                        Err(e) => {
                            error!("Error reading input: {}", e);
                            self.running = false;
                        }
                    }
                },

                _ = heartbeat_interval.tick() => {
                    if self.connected {
                        let packet = Packet::Heartbeat { timestamp: InputManager::get_timestamp() };
                        self.send_or_log(&packet).await;
                    }
                },

                _ = light_interval.tick() => {
                    let exposure = self.game_state.local_exposure();
                    if let Some(packet) = self.light_reporter.propose(exposure) {
                        self.send_or_log(&packet).await;
                    }
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}
