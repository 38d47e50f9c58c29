//! Integration tests for the match server and headless client
//!
//! These tests drive the server's game state the way the network loop does,
//! feed its outgoing events into the client mirror, and exercise a real UDP
//! handshake.

use bincode::{deserialize, serialize};
use client::authority::ActorControl;
use client::game::{ClientGameState, LightReporter, Notice};
use client::input::{Command, InputManager};
use rand::rngs::StdRng;
use rand::SeedableRng;
use server::game::{Audience, GameConfig, GameState, Outgoing, Stage};
use server::level::Level;
use shared::{
    MoveInput, Packet, Role, ServerEvent, Side, Status, Vec3, MAX_NAME_CHARS, MAX_PACKET_SIZE,
    PROTOCOL_VERSION, SHADOW_MAX_HEALTH, SPAWN_POLL_INTERVAL_SECS,
};
use std::time::Duration;

fn quiet_level() -> Level {
    let mut level = Level::default_house();
    level.fixtures.clear();
    level.occluders.clear();
    level.ghost_waypoints.clear();
    level
}

fn lobby_with(config: GameConfig, level: Level, count: u32) -> GameState {
    let mut game = GameState::with_rng(config, level, StdRng::seed_from_u64(7));
    for id in 1..=count {
        game.add_client(id, Some(format!("player{}", id)));
    }
    for id in 1..=count {
        game.handle_request(id, Packet::RequestRoleReadyToggle);
    }
    game
}

fn start(mut game: GameState, count: u32) -> GameState {
    for id in 1..=count {
        game.handle_request(id, Packet::SpawnReady);
    }
    game.update(SPAWN_POLL_INTERVAL_SECS);
    assert!(matches!(game.stage(), Stage::Playing(_)));
    game
}

fn running(count: u32) -> GameState {
    let mut game = start(lobby_with(GameConfig::default(), quiet_level(), count), count);
    game.drain_outbox();
    game
}

fn events_for(outgoing: &[Outgoing], client_id: u32) -> Vec<ServerEvent> {
    outgoing
        .iter()
        .filter(|o| o.audience == Audience::All || o.audience == Audience::Client(client_id))
        .filter_map(|o| match &o.packet {
            Packet::Event(event) => Some(event.clone()),
            _ => None,
        })
        .collect()
}

fn place(game: &mut GameState, client_id: u32, position: Vec3, yaw: f32) {
    let input = MoveInput {
        sequence: 1,
        timestamp: 0,
        position,
        yaw,
        pitch: 0.0,
    };
    game.apply_move(client_id, &input).unwrap();
}

/// NETWORK PROTOCOL TESTS
mod protocol_tests {
    use super::*;
    use shared::StateMutation;

    /// Tests packet serialization round-trip for network protocol validation
    #[tokio::test]
    async fn packet_serialization_roundtrip() {
        let test_packets = vec![
            Packet::Connect {
                client_version: PROTOCOL_VERSION,
                display_name: None,
            },
            Packet::Move {
                sequence: 42,
                timestamp: 123456789,
                position: Vec3::new(1.0, 0.0, -2.0),
                yaw: 90.0,
                pitch: -10.0,
            },
            Packet::RequestToggle { object_id: 3 },
            Packet::Mutate(StateMutation::Health {
                participant_id: 2,
                value: 0.0,
            }),
            Packet::Connected { client_id: 42 },
            Packet::Disconnected {
                reason: "Test".to_string(),
            },
        ];

        for packet in test_packets {
            let serialized = serialize(&packet).unwrap();
            let deserialized: Packet = deserialize(&serialized).unwrap();

            match (&packet, &deserialized) {
                (Packet::Connect { .. }, Packet::Connect { .. }) => {}
                (Packet::Move { .. }, Packet::Move { .. }) => {}
                (Packet::RequestToggle { .. }, Packet::RequestToggle { .. }) => {}
                (Packet::Mutate(a), Packet::Mutate(b)) => assert_eq!(a, b),
                (Packet::Connected { .. }, Packet::Connected { .. }) => {}
                (Packet::Disconnected { .. }, Packet::Disconnected { .. }) => {}
                _ => panic!("Packet type mismatch after serialization"),
            }
        }
    }

    /// Level sync and a full snapshot must fit in one datagram
    #[test]
    fn large_packets_fit_datagram() {
        let mut game = running(5);
        game.add_client(6, None);
        for outgoing in game.drain_outbox() {
            assert!(serialize(&outgoing.packet).unwrap().len() <= MAX_PACKET_SIZE);
        }

        let snapshot = game.snapshot(0, Default::default());
        assert!(serialize(&snapshot).unwrap().len() <= MAX_PACKET_SIZE);
    }

    /// Oversized display names cannot push lobby updates past one datagram
    #[test]
    fn long_names_keep_lobby_updates_small() {
        let mut game = GameState::new(GameConfig::default(), quiet_level());
        game.add_client(9, Some("x".repeat(6000)));
        game.add_client(10, Some("y".repeat(6000)));

        let outgoing = game.drain_outbox();
        assert!(!outgoing.is_empty());
        for outgoing in &outgoing {
            assert!(serialize(&outgoing.packet).unwrap().len() <= MAX_PACKET_SIZE);
        }

        let seats = game.lobby().seats();
        assert_eq!(seats.len(), 2);
        assert!(seats.iter().all(|s| s.name.chars().count() == MAX_NAME_CHARS));
    }

    /// Tests the handshake against a live server loop
    #[tokio::test]
    async fn udp_connect_handshake() {
        use server::network::Server;
        use tokio::net::UdpSocket;

        let game = GameState::new(GameConfig::default(), quiet_level());
        let mut server = Server::new("127.0.0.1:0", Duration::from_millis(33), 4, game)
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let connect = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            display_name: Some("Ada".to_string()),
        };
        socket
            .send_to(&serialize(&connect).unwrap(), server_addr)
            .await
            .unwrap();

        let handshake = async {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];
            let mut client_id = None;
            let mut level_synced = false;
            while client_id.is_none() || !level_synced {
                let (len, _) = socket.recv_from(&mut buffer).await.unwrap();
                match deserialize::<Packet>(&buffer[..len]).unwrap() {
                    Packet::Connected { client_id: id } => client_id = Some(id),
                    Packet::Event(ServerEvent::LevelSync(level)) => {
                        assert_eq!(level.toggles.len(), 3);
                        level_synced = true;
                    }
                    _ => {}
                }
            }
            client_id
        };

        let server_loop = server.run();
        tokio::pin!(server_loop);
        tokio::select! {
            _ = &mut server_loop => panic!("Server loop exited"),
            result = tokio::time::timeout(Duration::from_secs(2), handshake) => {
                assert!(result.expect("handshake timed out").is_some());
            }
        }
    }

    /// A client with the wrong protocol version is turned away
    #[tokio::test]
    async fn udp_version_mismatch_is_refused() {
        use server::network::Server;
        use tokio::net::UdpSocket;

        let game = GameState::new(GameConfig::default(), quiet_level());
        let mut server = Server::new("127.0.0.1:0", Duration::from_millis(33), 4, game)
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let connect = Packet::Connect {
            client_version: PROTOCOL_VERSION + 1,
            display_name: None,
        };
        socket
            .send_to(&serialize(&connect).unwrap(), server_addr)
            .await
            .unwrap();

        let reply = async {
            let mut buffer = vec![0u8; MAX_PACKET_SIZE];
            let (len, _) = socket.recv_from(&mut buffer).await.unwrap();
            deserialize::<Packet>(&buffer[..len]).unwrap()
        };

        let server_loop = server.run();
        tokio::pin!(server_loop);
        tokio::select! {
            _ = &mut server_loop => panic!("Server loop exited"),
            result = tokio::time::timeout(Duration::from_secs(2), reply) => {
                assert!(matches!(result.expect("no reply"), Packet::Disconnected { .. }));
            }
        }
    }
}

/// MATCH OUTCOME TESTS
mod outcome_tests {
    use super::*;

    fn count_match_ended(outgoing: &[Outgoing]) -> usize {
        outgoing
            .iter()
            .filter(|o| matches!(o.packet, Packet::Event(ServerEvent::MatchEnded { .. })))
            .count()
    }

    /// Guardian burns every Shadow and the match ends exactly once
    #[test]
    fn guardian_wins_when_all_shadows_die() {
        let mut game = running(3);
        place(&mut game, 1, Vec3::new(0.0, 0.0, -10.0), 0.0);
        place(&mut game, 2, Vec3::new(0.0, 0.0, -5.0), 0.0);
        place(&mut game, 3, Vec3::new(0.5, 0.0, -4.0), 0.0);
        game.handle_request(1, Packet::RequestFlashlight { on: true });

        let mut outgoing = Vec::new();
        for _ in 0..100 {
            game.update(0.05);
            outgoing.extend(game.drain_outbox());
        }

        assert_eq!(count_match_ended(&outgoing), 1);
        assert_eq!(
            game.match_controller().unwrap().winner(),
            Some(Side::Guardians)
        );
        for id in [2, 3] {
            assert_eq!(game.participant(id).unwrap().status(), Status::Dead);
        }
        assert!(events_for(&outgoing, 1).contains(&ServerEvent::GameOver {
            winning_side: Side::Guardians,
            won: true
        }));
        assert!(events_for(&outgoing, 2).contains(&ServerEvent::GameOver {
            winning_side: Side::Guardians,
            won: false
        }));
    }

    /// Both Shadows escape with three keys placed from five points
    #[test]
    fn shadows_escape_together() {
        let mut level = quiet_level();
        level.key_spawn_points.truncate(5);
        let mut game = start(lobby_with(GameConfig::default(), level, 3), 3);
        assert_eq!(game.match_controller().unwrap().keys_spawned(), 3);
        game.drain_outbox();

        let keys: Vec<_> = game.match_controller().unwrap().keys().copied().collect();
        for (index, key) in keys.iter().enumerate() {
            let collector = 2 + (index as u32 % 2);
            place(&mut game, collector, key.position, 0.0);
            game.handle_request(collector, Packet::RequestKeyPickup { key_id: key.id });
        }
        assert!(game.match_controller().unwrap().all_keys_found());

        let exit = game.level().exits[0].position;
        place(&mut game, 2, exit, 0.0);
        game.handle_request(2, Packet::RequestEscape);
        assert!(!game.is_match_over());
        place(&mut game, 3, exit, 0.0);
        game.handle_request(3, Packet::RequestEscape);

        assert_eq!(
            game.match_controller().unwrap().winner(),
            Some(Side::Shadows)
        );
        let outgoing = game.drain_outbox();
        assert_eq!(count_match_ended(&outgoing), 1);
        assert!(events_for(&outgoing, 1).contains(&ServerEvent::GameOver {
            winning_side: Side::Shadows,
            won: false
        }));
    }

    /// The countdown hands the win to the Guardians
    #[test]
    fn timer_expiry_ends_match() {
        let config = GameConfig {
            match_duration: 1.0,
            ..GameConfig::default()
        };
        let mut game = start(lobby_with(config, quiet_level(), 2), 2);
        for _ in 0..4 {
            game.update(0.25);
        }

        assert!(game.is_match_over());
        assert_eq!(
            game.match_controller().unwrap().winner(),
            Some(Side::Guardians)
        );
        assert!(game.authority().is_empty());

        let outgoing = game.drain_outbox();
        assert_eq!(count_match_ended(&outgoing), 1);
        game.update(0.25);
        assert_eq!(count_match_ended(&game.drain_outbox()), 0);
    }

    /// One Shadow escaping wins for the Shadows even if another died
    #[test]
    fn mixed_terminal_statuses_favour_shadows() {
        let mut game = running(3);

        place(&mut game, 1, Vec3::new(0.0, 0.0, -10.0), 0.0);
        place(&mut game, 2, Vec3::new(0.0, 0.0, -5.0), 0.0);
        place(&mut game, 3, Vec3::new(-12.0, 0.0, 12.0), 0.0);
        game.handle_request(1, Packet::RequestFlashlight { on: true });
        for _ in 0..100 {
            game.update(0.05);
        }
        assert_eq!(game.participant(2).unwrap().status(), Status::Dead);
        assert!(!game.is_match_over());
        game.handle_request(1, Packet::RequestFlashlight { on: false });

        let keys: Vec<_> = game.match_controller().unwrap().keys().copied().collect();
        for key in keys {
            place(&mut game, 3, key.position, 0.0);
            game.handle_request(3, Packet::RequestKeyPickup { key_id: key.id });
        }
        let exit = game.level().exits[0].position;
        place(&mut game, 3, exit, 0.0);
        game.handle_request(3, Packet::RequestEscape);

        assert_eq!(
            game.match_controller().unwrap().winner(),
            Some(Side::Shadows)
        );
    }

    /// Actor control is revoked and requests are dropped after the end
    #[test]
    fn requests_after_game_over_are_ignored() {
        let config = GameConfig {
            match_duration: 0.5,
            ..GameConfig::default()
        };
        let mut game = start(lobby_with(config, quiet_level(), 2), 2);
        game.update(0.5);
        assert!(game.is_match_over());
        game.drain_outbox();

        game.handle_request(2, Packet::RequestShadowForm { active: true });
        game.handle_request(1, Packet::RequestFlashlight { on: true });
        assert!(game.drain_outbox().is_empty());
        assert!(!game.participant(2).unwrap().in_shadow_form());

        let input = MoveInput {
            sequence: 9,
            timestamp: 0,
            position: Vec3::new(3.0, 0.0, 3.0),
            yaw: 0.0,
            pitch: 0.0,
        };
        assert!(game.apply_move(2, &input).is_err());
    }
}

/// KEY AND LEVEL TESTS
mod key_tests {
    use super::*;

    /// Fewer spawn points than participants + 1 caps the key count
    #[test]
    fn key_count_capped_by_spawn_points() {
        let mut level = quiet_level();
        level.key_spawn_points.truncate(2);
        let game = start(lobby_with(GameConfig::default(), level, 3), 3);

        let controller = game.match_controller().unwrap();
        assert_eq!(controller.keys_spawned(), 2);
        let positions: Vec<Vec3> = controller.keys().map(|k| k.position).collect();
        assert_ne!(positions[0], positions[1]);
    }

    /// A level with no spawn points still plays, with exits locked
    #[test]
    fn no_spawn_points_means_no_keys() {
        let mut level = quiet_level();
        level.key_spawn_points.clear();
        let mut game = start(lobby_with(GameConfig::default(), level, 2), 2);
        assert_eq!(game.match_controller().unwrap().keys_spawned(), 0);

        let exit = game.level().exits[0].position;
        place(&mut game, 2, exit, 0.0);
        game.handle_request(2, Packet::RequestEscape);
        assert_eq!(game.participant(2).unwrap().status(), Status::Alive);
    }

    /// Guardians cannot pick up keys
    #[test]
    fn guardian_key_pickup_rejected() {
        let mut game = running(2);
        let key = *game.match_controller().unwrap().keys().next().unwrap();
        place(&mut game, 1, key.position, 0.0);
        game.handle_request(1, Packet::RequestKeyPickup { key_id: key.id });
        assert_eq!(game.match_controller().unwrap().keys_collected(), 0);
    }

    /// Two Shadows grabbing the same key only count it once
    #[test]
    fn repeated_key_pickup_counts_once() {
        let mut game = running(3);
        let key = *game.match_controller().unwrap().keys().next().unwrap();
        place(&mut game, 2, key.position, 0.0);
        place(&mut game, 3, key.position, 0.0);

        game.handle_request(2, Packet::RequestKeyPickup { key_id: key.id });
        game.handle_request(3, Packet::RequestKeyPickup { key_id: key.id });

        let collected = events_for(&game.drain_outbox(), 2)
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::KeyCollected { .. }))
            .count();
        assert_eq!(collected, 1);
        assert_eq!(game.match_controller().unwrap().keys_collected(), 1);
    }
}

/// INTERACTABLE REPLICATION TESTS
mod replication_tests {
    use super::*;
    use client::interactable::SoundCue;
    use shared::ToggleKind;

    /// The ghost switches a lamp on its route and every client hears it
    #[test]
    fn ghost_switches_lamp_for_clients() {
        let mut level = quiet_level();
        let lamp = level
            .toggles
            .iter()
            .find(|t| t.kind == ToggleKind::Lamp)
            .map(|t| (t.id, t.position))
            .unwrap();
        level.ghost_waypoints = vec![lamp.1 + Vec3::new(1.0, -2.0, 0.0)];
        let mut game = start(lobby_with(GameConfig::default(), level, 2), 2);

        let mut mirror = ClientGameState::new();
        mirror.client_id = Some(2);
        for event in events_for(&game.drain_outbox(), 2) {
            mirror.apply_event(event);
        }

        game.update(0.1);
        let outgoing = game.drain_outbox();
        assert!(events_for(&outgoing, 2).contains(&ServerEvent::ToggleStateChanged {
            object_id: lamp.0,
            old: true,
            new: false,
        }));
        let notices: Vec<Notice> = events_for(&outgoing, 2)
            .into_iter()
            .flat_map(|event| mirror.apply_event(event))
            .collect();
        assert!(notices.contains(&Notice::Sound(SoundCue::LampOff)));
        assert!(!game.toggles().get(lamp.0).unwrap().is_on());

        // Nothing more until the ghost has rested
        game.update(0.1);
        assert!(!events_for(&game.drain_outbox(), 2)
            .iter()
            .any(|e| matches!(e, ServerEvent::ToggleStateChanged { .. })));
    }

    /// Two requests for the same door in one tick produce one change
    #[test]
    fn concurrent_door_requests_collapse() {
        let mut game = running(3);
        place(&mut game, 2, Vec3::new(0.0, 0.0, 5.0), 0.0);
        place(&mut game, 3, Vec3::new(0.5, 0.0, 5.0), 0.0);

        game.handle_request(2, Packet::RequestToggle { object_id: 1 });
        game.handle_request(3, Packet::RequestToggle { object_id: 1 });

        let changes: Vec<_> = events_for(&game.drain_outbox(), 2)
            .into_iter()
            .filter(|e| matches!(e, ServerEvent::ToggleStateChanged { .. }))
            .collect();
        assert_eq!(changes.len(), 1);
        assert!(game.toggles().get(1).unwrap().is_on());
    }

    /// An unattended open door swings shut by itself
    #[test]
    fn door_closes_when_left_alone() {
        let mut game = running(2);
        place(&mut game, 2, Vec3::new(0.0, 0.0, 5.0), 0.0);
        game.handle_request(2, Packet::RequestToggle { object_id: 1 });
        place(&mut game, 2, Vec3::new(-10.0, 0.0, -10.0), 0.0);
        place(&mut game, 1, Vec3::new(10.0, 0.0, -10.0), 0.0);

        for _ in 0..30 {
            game.update(0.1);
        }
        assert!(!game.toggles().get(1).unwrap().is_on());
    }

    /// A late joiner's mirror updates without replaying any cue
    #[test]
    fn late_joiner_mirror_is_silent() {
        let mut game = running(2);
        place(&mut game, 2, Vec3::new(-6.0, 0.0, 0.5), 0.0);
        game.handle_request(2, Packet::RequestToggle { object_id: 2 });
        game.drain_outbox();

        game.add_client(9, Some("late".to_string()));
        let mut mirror = ClientGameState::new();
        mirror.client_id = Some(9);
        let mut notices = Vec::new();
        for event in events_for(&game.drain_outbox(), 9) {
            notices.extend(mirror.apply_event(event));
        }

        assert!(!notices.iter().any(|n| matches!(n, Notice::Sound(_))));
        assert!(!mirror.toggles.get(2).unwrap().is_on());
        assert_eq!(mirror.keys.len(), 3);
    }

    /// Observers hear exactly one cue per real change
    #[test]
    fn observer_hears_one_cue_per_change() {
        let mut game = running(2);
        let mut mirror = ClientGameState::new();
        mirror.client_id = Some(1);
        mirror.apply_event(ServerEvent::LevelSync(
            game.level().view(game.toggles(), &[]),
        ));

        place(&mut game, 2, Vec3::new(10.0, 0.0, 1.0), 0.0);
        game.handle_request(2, Packet::RequestToggle { object_id: 3 });
        game.handle_request(2, Packet::RequestToggle { object_id: 3 });

        let cues: usize = events_for(&game.drain_outbox(), 1)
            .into_iter()
            .flat_map(|e| mirror.apply_event(e))
            .filter(|n| matches!(n, Notice::Sound(_)))
            .count();
        assert_eq!(cues, 1);
    }
}

/// AUTHORITY TESTS
mod authority_tests {
    use super::*;
    use client::authority::ControlSubsystem;

    /// The client only drives its actor between grant and revoke
    #[test]
    fn client_control_follows_server_grants() {
        let config = GameConfig {
            match_duration: 0.5,
            ..GameConfig::default()
        };
        let mut game = lobby_with(config, quiet_level(), 2);

        let mut control = ActorControl::new();
        let mut input = InputManager::new();
        let mut reporter = LightReporter::new();
        assert!(input.to_packet(&Command::Escape).is_none());

        let apply = |outgoing: Vec<Outgoing>,
                     control: &mut ActorControl,
                     input: &mut InputManager,
                     reporter: &mut LightReporter| {
            for event in events_for(&outgoing, 2) {
                let mut subsystems: [&mut dyn ControlSubsystem; 2] =
                    [&mut *input, &mut *reporter];
                match event {
                    ServerEvent::AuthorityGranted { actor_id } => {
                        control.on_granted(actor_id, &mut subsystems);
                    }
                    ServerEvent::AuthorityRevoked { actor_id } => {
                        control.on_revoked(actor_id, &mut subsystems);
                    }
                    _ => {}
                }
            }
        };

        apply(game.drain_outbox(), &mut control, &mut input, &mut reporter);
        assert!(control.is_enabled());
        assert_eq!(
            control.actor_id(),
            Some(game.participant(2).unwrap().actor_id)
        );
        assert!(input.to_packet(&Command::Escape).is_some());

        game = start(game, 2);
        game.update(0.5);
        apply(game.drain_outbox(), &mut control, &mut input, &mut reporter);
        assert!(!control.is_enabled());
        assert!(input.to_packet(&Command::Escape).is_none());
    }

    /// Proposals raise exposure but never clear server-detected light
    #[test]
    fn light_proposal_cannot_lower_exposure() {
        let mut game = running(2);
        place(&mut game, 1, Vec3::new(0.0, 0.0, -10.0), 0.0);
        place(&mut game, 2, Vec3::new(0.0, 0.0, -5.0), 0.0);
        game.handle_request(1, Packet::RequestFlashlight { on: true });
        game.update(0.1);
        assert!(game.participant(2).unwrap().exposure().in_hostile_light);

        game.handle_request(
            2,
            Packet::ReportLightStatus {
                in_light: false,
                in_hostile_light: false,
            },
        );
        assert!(game.participant(2).unwrap().exposure().in_hostile_light);

        game.handle_request(1, Packet::RequestFlashlight { on: false });
        game.update(0.1);
        assert!(!game.participant(2).unwrap().exposure().in_light);
        game.handle_request(
            2,
            Packet::ReportLightStatus {
                in_light: true,
                in_hostile_light: false,
            },
        );
        assert!(game.participant(2).unwrap().exposure().in_light);
    }

    /// Forged writes of health and role never land
    #[test]
    fn forged_mutations_are_dropped() {
        use shared::StateMutation;

        let mut game = running(2);
        game.handle_request(
            2,
            Packet::Mutate(StateMutation::Health {
                participant_id: 2,
                value: 1.0,
            }),
        );
        game.handle_request(
            1,
            Packet::Mutate(StateMutation::Role {
                participant_id: 2,
                role: Role::Guardian,
            }),
        );
        let shadow = game.participant(2).unwrap();
        assert_eq!(shadow.health(), SHADOW_MAX_HEALTH);
        assert_eq!(shadow.role(), Role::Shadow);
    }
}
