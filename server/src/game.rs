//! Authoritative game state and request dispatch
//!
//! `GameState` owns every service of one server process: the lobby, the
//! participants, the authority manager, toggles, charging stations and the
//! match controller of the running match. All mutation happens here on the
//! game loop. State changes are not sent directly: they are pushed to an
//! outbox as [`Outgoing`] packets that the network layer drains each tick.

use crate::authority::{AuthorityManager, Targeted};
use crate::error::Rejection;
use crate::flashlight::ChargingStation;
use crate::ghost::Ghost;
use crate::level::Level;
use crate::lobby::{BarrierPoll, Lobby, RoleMode, SpawnBarrier};
use crate::match_controller::{MatchController, MatchState};
use crate::participant::{Origin, Participant};
use crate::toggles::ToggleSet;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    evaluate_exposure, sample_points, ActorId, EmitterKey, Exposure, KeyId, LightEmitter,
    LightRegistry, MoveInput, ObjectId, Packet, ParticipantId, ParticipantView, Phase, Role,
    ServerEvent, Side, StateMutation, StationId, Status, BODY_HEIGHT, LIGHT_CHECK_INTERVAL_SECS,
    MATCH_DURATION_SECS, MIN_PLAYERS,
};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Client(u32),
}

#[derive(Debug, Clone)]
pub struct Outgoing {
    pub audience: Audience,
    pub packet: Packet,
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    pub match_duration: f32,
    pub min_players: usize,
    pub role_mode: RoleMode,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            match_duration: MATCH_DURATION_SECS,
            min_players: MIN_PLAYERS,
            role_mode: RoleMode::HostIsGuardian,
        }
    }
}

/// Where the server is between lobby and match end.
#[derive(Debug)]
pub enum Stage {
    Lobby,
    Spawning(SpawnBarrier),
    Playing(MatchController),
    Ended(MatchController),
}

pub struct GameState {
    pub tick: u32,
    config: GameConfig,
    level: Level,
    stage: Stage,
    lobby: Lobby,
    participants: BTreeMap<ParticipantId, Participant>,
    authority: AuthorityManager,
    toggles: ToggleSet,
    stations: Vec<ChargingStation>,
    ghost: Option<Ghost>,
    lights: LightRegistry,
    light_timer: f32,
    next_actor_id: ActorId,
    outbox: Vec<Outgoing>,
    rng: StdRng,
}

impl GameState {
    pub fn new(config: GameConfig, level: Level) -> Self {
        Self::with_rng(config, level, StdRng::from_entropy())
    }

    pub fn with_rng(config: GameConfig, level: Level, rng: StdRng) -> Self {
        let toggles = level.build_toggles();
        let stations = level.build_stations();
        Self {
            tick: 0,
            lobby: Lobby::new(config.role_mode),
            config,
            level,
            stage: Stage::Lobby,
            participants: BTreeMap::new(),
            authority: AuthorityManager::new(),
            toggles,
            stations,
            ghost: None,
            lights: LightRegistry::new(),
            light_timer: 0.0,
            next_actor_id: 1000,
            outbox: Vec::new(),
            rng,
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn lobby(&self) -> &Lobby {
        &self.lobby
    }

    pub fn authority(&self) -> &AuthorityManager {
        &self.authority
    }

    pub fn toggles(&self) -> &ToggleSet {
        &self.toggles
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn lights(&self) -> &LightRegistry {
        &self.lights
    }

    pub fn ghost(&self) -> Option<&Ghost> {
        self.ghost.as_ref()
    }

    pub fn match_controller(&self) -> Option<&MatchController> {
        match &self.stage {
            Stage::Playing(controller) | Stage::Ended(controller) => Some(controller),
            _ => None,
        }
    }

    pub fn time_remaining(&self) -> f32 {
        self.match_controller()
            .map_or(self.config.match_duration, |m| m.time_remaining())
    }

    pub fn phase(&self) -> Phase {
        self.match_controller().map_or(Phase::Evening, |m| m.phase())
    }

    pub fn participant_views(&self) -> Vec<ParticipantView> {
        self.participants.values().map(Participant::view).collect()
    }

    pub fn snapshot(&self, timestamp: u64, last_processed_input: HashMap<u32, u32>) -> Packet {
        Packet::Snapshot {
            tick: self.tick,
            timestamp,
            time_remaining: self.time_remaining(),
            phase: self.phase(),
            last_processed_input,
            participants: self.participant_views(),
        }
    }

    pub fn drain_outbox(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    fn broadcast(&mut self, event: ServerEvent) {
        self.outbox.push(Outgoing {
            audience: Audience::All,
            packet: Packet::Event(event),
        });
    }

    fn send_to(&mut self, client_id: u32, event: ServerEvent) {
        self.outbox.push(Outgoing {
            audience: Audience::Client(client_id),
            packet: Packet::Event(event),
        });
    }

    fn send_targeted(&mut self, notices: impl IntoIterator<Item = Targeted>) {
        for notice in notices {
            self.send_to(notice.connection, notice.event);
        }
    }

    /// Seats a new connection and brings it up to date with the level.
    pub fn add_client(&mut self, client_id: u32, display_name: Option<String>) {
        self.lobby.join(client_id, display_name, &mut self.rng);

        let view = self.level.view(&self.toggles, &self.stations);
        self.send_to(client_id, ServerEvent::LevelSync(view));
        for event in self.toggles.resync_events() {
            self.send_to(client_id, event);
        }
        if let Some(controller) = self.match_controller() {
            let keys: Vec<ServerEvent> = controller
                .keys()
                .map(|k| ServerEvent::KeySpawned {
                    key_id: k.id,
                    position: k.position,
                })
                .collect();
            let count = ServerEvent::KeyCountChanged {
                collected: controller.keys_collected(),
                total: controller.keys_spawned(),
            };
            for event in keys {
                self.send_to(client_id, event);
            }
            self.send_to(client_id, count);
        }

        let lobby = self.lobby.event();
        self.broadcast(lobby);
    }

    /// Removes a connection, its seat and any participant it was driving.
    pub fn remove_client(&mut self, client_id: u32) {
        self.lobby.leave(client_id);
        let lobby = self.lobby.event();
        self.broadcast(lobby);

        for actor in self.authority.release_connection(client_id) {
            debug!("Released actor {} of departed client {}", actor, client_id);
        }

        let departed: Vec<ParticipantId> = self
            .participants
            .values()
            .filter(|p| p.connection_id == client_id)
            .map(|p| p.id)
            .collect();
        if departed.is_empty() {
            return;
        }

        for id in &departed {
            self.participants.remove(id);
            self.lights.deregister(EmitterKey::Flashlight(*id));
            for station in &mut self.stations {
                if station.charging() == Some(*id) {
                    if let Some(event) = station.cancel() {
                        self.outbox.push(Outgoing {
                            audience: Audience::All,
                            packet: Packet::Event(event),
                        });
                    }
                }
            }
            info!("Participant {} left the match", id);
        }

        let guardian_present = self
            .participants
            .values()
            .any(|p| p.role() == Role::Guardian);
        let short_handed = self.participants.len() < self.config.min_players;
        if matches!(self.stage, Stage::Spawning(_)) && (!guardian_present || short_handed) {
            self.abort_spawning("A player left before the match began");
        } else if self.is_playing() && !guardian_present {
            info!("The Guardian left the match");
            self.terminate(Side::Shadows);
        } else {
            self.evaluate_outcome();
        }
    }

    /// Moves a participant onto the new connection of a client that connected
    /// again from the same address. Outside a match this is a plain leave and
    /// join.
    pub fn reconnect_client(
        &mut self,
        old_client_id: u32,
        new_client_id: u32,
        display_name: Option<String>,
    ) {
        let in_match = matches!(self.stage, Stage::Spawning(_) | Stage::Playing(_));
        let actor = driven_by(&mut self.participants, old_client_id)
            .ok()
            .map(|p| p.actor_id);
        let notices = match actor {
            Some(actor) if in_match => self.authority.transfer(actor, new_client_id),
            _ => Err(Rejection::UnknownParticipant(old_client_id)),
        };
        let notices = match notices {
            Ok(notices) => notices,
            Err(rejection) => {
                debug!("Client {} starts over: {}", old_client_id, rejection);
                self.remove_client(old_client_id);
                self.add_client(new_client_id, display_name);
                return;
            }
        };

        if let Ok(participant) = driven_by(&mut self.participants, old_client_id) {
            participant.connection_id = new_client_id;
            info!(
                "Participant {} moved to connection {}",
                participant.id, new_client_id
            );
        }
        let name =
            display_name.or_else(|| self.lobby.seat(old_client_id).map(|s| s.name.clone()));
        self.lobby.leave(old_client_id);
        self.add_client(new_client_id, name);
        self.send_targeted(notices);
    }

    /// Applies a validated request. Rejections are logged and dropped.
    pub fn handle_request(&mut self, client_id: u32, packet: Packet) {
        if let Err(rejection) = self.dispatch(client_id, packet) {
            if rejection.is_benign() {
                debug!("Client {}: {}", client_id, rejection);
            } else {
                warn!("Rejected request from client {}: {}", client_id, rejection);
            }
        }
    }

    fn dispatch(&mut self, client_id: u32, packet: Packet) -> Result<(), Rejection> {
        match packet {
            Packet::RequestRoleReadyToggle => self.toggle_ready(client_id),
            Packet::SpawnReady => self.acknowledge_spawn(client_id),
            Packet::RequestToggle { object_id } => self.request_toggle(client_id, object_id),
            Packet::RequestKeyPickup { key_id } => self.request_key(client_id, key_id),
            Packet::RequestEscape => self.request_escape(client_id),
            Packet::RequestShadowForm { active } => self.request_shadow_form(client_id, active),
            Packet::RequestFlashlight { on } => self.request_flashlight(client_id, on),
            Packet::RequestRecharge { station_id } => self.request_recharge(client_id, station_id),
            Packet::ReportLightStatus {
                in_light,
                in_hostile_light,
            } => self.report_light(
                client_id,
                Exposure {
                    in_light,
                    in_hostile_light,
                },
            ),
            Packet::Mutate(mutation) => self.reject_mutation(client_id, mutation),
            other => {
                warn!("Unexpected packet from client {}: {:?}", client_id, other);
                Ok(())
            }
        }
    }

    fn is_playing(&self) -> bool {
        matches!(self.stage, Stage::Playing(_))
    }

    /// Resolves the participant driven by `client_id` during a running match.
    fn acting_participant(&mut self, client_id: u32) -> Result<&mut Participant, Rejection> {
        if !self.is_playing() {
            return Err(Rejection::MatchNotRunning);
        }
        let participant = driven_by(&mut self.participants, client_id)?;
        self.authority.check(client_id, participant.actor_id)?;
        if !participant.is_alive() {
            return Err(Rejection::NotAlive(participant.id));
        }
        Ok(participant)
    }

    /// Accepts a movement sample from the connection controlling the actor.
    pub fn apply_move(&mut self, client_id: u32, input: &MoveInput) -> Result<(), Rejection> {
        if !matches!(self.stage, Stage::Playing(_) | Stage::Spawning(_)) {
            return Err(Rejection::MatchNotRunning);
        }
        let participant = driven_by(&mut self.participants, client_id)?;
        self.authority.check(client_id, participant.actor_id)?;
        if !participant.is_alive() {
            return Err(Rejection::NotAlive(participant.id));
        }

        participant.position = input.position;
        participant.yaw = input.yaw;
        participant.pitch = input.pitch;
        Ok(())
    }

    fn toggle_ready(&mut self, client_id: u32) -> Result<(), Rejection> {
        if matches!(self.stage, Stage::Spawning(_) | Stage::Playing(_)) {
            return Err(Rejection::MatchInProgress);
        }
        self.lobby.toggle_ready(client_id)?;
        let lobby = self.lobby.event();
        self.broadcast(lobby);

        if self.lobby.ready_to_start(self.config.min_players) {
            self.start_spawning();
        }
        Ok(())
    }

    /// Fixes roles, spawns one actor per seat and waits for acknowledgements.
    fn start_spawning(&mut self) {
        let seats = self.lobby.assign_roles(&mut self.rng);
        info!("Starting match with {} players", seats.len());

        for notice in self.authority.revoke_all() {
            self.send_to(notice.connection, notice.event);
        }
        self.participants.clear();
        self.toggles = self.level.build_toggles();
        self.stations = self.level.build_stations();
        self.ghost = None;

        for (index, seat) in seats.iter().enumerate() {
            let actor_id = self.next_actor_id;
            self.next_actor_id += 1;

            let mut participant = Participant::new(
                seat.client_id,
                seat.client_id,
                actor_id,
                seat.name.clone(),
                seat.role,
            );
            participant.position = self.level.player_spawn(index);
            self.participants.insert(participant.id, participant);

            self.broadcast(ServerEvent::RoleAssigned {
                participant_id: seat.client_id,
                role: seat.role,
            });
            let notices = self.authority.grant(actor_id, seat.client_id);
            self.send_targeted(notices);
        }

        self.stage = Stage::Spawning(SpawnBarrier::default());
    }

    fn acknowledge_spawn(&mut self, client_id: u32) -> Result<(), Rejection> {
        let participant = driven_by(&mut self.participants, client_id)?;
        if participant.spawn_acknowledged {
            return Err(Rejection::NoChange);
        }
        participant.spawn_acknowledged = true;
        debug!("Participant {} acknowledged its spawn", participant.id);
        Ok(())
    }

    fn begin_match(&mut self) {
        let mut controller = MatchController::new(self.config.match_duration);
        let events = controller.initialize(
            self.participants.len(),
            &self.level.key_spawn_points,
            &mut self.rng,
        );
        self.stage = Stage::Playing(controller);
        self.ghost = Ghost::new(self.level.ghost_waypoints.clone());

        self.lights.clear();
        for (index, fixture) in self.level.fixtures.iter().enumerate() {
            self.lights.register(EmitterKey::Fixture(index as u32), *fixture);
        }

        for event in events {
            self.broadcast(event);
        }
        self.broadcast(ServerEvent::MatchStarted {
            duration_secs: self.config.match_duration,
        });
        info!("Match started");
    }

    fn abort_spawning(&mut self, reason: &str) {
        warn!("{}, returning to lobby", reason);
        let notices = self.authority.revoke_all();
        self.send_targeted(notices);
        self.participants.clear();
        self.lobby.reset_ready();
        self.stage = Stage::Lobby;

        self.broadcast(ServerEvent::MatchStartFailed {
            reason: reason.to_string(),
        });
        let lobby = self.lobby.event();
        self.broadcast(lobby);
    }

    fn request_toggle(&mut self, client_id: u32, object_id: ObjectId) -> Result<(), Rejection> {
        let participant = self.acting_participant(client_id)?;
        let (id, position) = (participant.id, participant.position);
        let event = self.toggles.request_flip(object_id, id, position)?;
        self.broadcast(event);
        Ok(())
    }

    fn request_key(&mut self, client_id: u32, key_id: KeyId) -> Result<(), Rejection> {
        let participant = self.acting_participant(client_id)?;
        if participant.role() != Role::Shadow {
            return Err(Rejection::WrongRole {
                participant: participant.id,
                role: participant.role(),
            });
        }
        let (id, position) = (participant.id, participant.position);

        let events = match &mut self.stage {
            Stage::Playing(controller) => controller.collect_key(key_id, id, position)?,
            _ => return Err(Rejection::MatchNotRunning),
        };
        for event in events {
            self.broadcast(event);
        }
        Ok(())
    }

    fn request_escape(&mut self, client_id: u32) -> Result<(), Rejection> {
        let unlocked = self
            .match_controller()
            .map_or(false, |m| m.all_keys_found());
        let exits = self.level.exits.clone();

        let participant = self.acting_participant(client_id)?;
        if participant.role() != Role::Shadow {
            return Err(Rejection::WrongRole {
                participant: participant.id,
                role: participant.role(),
            });
        }
        if !unlocked {
            return Err(Rejection::ExitsLocked);
        }
        let at_exit = exits
            .iter()
            .position(|e| e.position.distance(participant.position) <= e.radius);
        let exit = at_exit.ok_or(Rejection::OutOfRange {
            participant: participant.id,
            object: 0,
        })?;

        let id = participant.id;
        let event = participant.set_status(Status::Escaped)?;
        info!("Participant {} escaped through exit {}", id, exit);
        self.broadcast(event);
        self.retire(id);
        self.evaluate_outcome();
        Ok(())
    }

    fn request_shadow_form(&mut self, client_id: u32, active: bool) -> Result<(), Rejection> {
        let event = self.acting_participant(client_id)?.request_shadow_form(active)?;
        self.broadcast(event);
        Ok(())
    }

    fn request_flashlight(&mut self, client_id: u32, on: bool) -> Result<(), Rejection> {
        let participant = self.acting_participant(client_id)?;
        let id = participant.id;
        let role = participant.role();
        let flashlight = participant
            .flashlight
            .as_mut()
            .ok_or(Rejection::WrongRole {
                participant: id,
                role,
            })?;
        flashlight.switch(on)?;
        self.broadcast(ServerEvent::FlashlightChanged {
            participant_id: id,
            on,
        });
        Ok(())
    }

    fn request_recharge(&mut self, client_id: u32, station_id: StationId) -> Result<(), Rejection> {
        let participant = self.acting_participant(client_id)?;
        let (id, role, position) = (participant.id, participant.role(), participant.position);
        let flashlight = participant
            .flashlight
            .clone()
            .ok_or(Rejection::WrongRole {
                participant: id,
                role,
            })?;

        let station = self
            .stations
            .iter_mut()
            .find(|s| s.id == station_id)
            .ok_or(Rejection::UnknownObject(station_id))?;
        let event = station.start(id, position, &flashlight)?;
        self.broadcast(event);
        Ok(())
    }

    /// Light proposals from the actor's owner can raise exposure only.
    fn report_light(&mut self, client_id: u32, proposal: Exposure) -> Result<(), Rejection> {
        let participant = self.acting_participant(client_id)?;
        if participant.role() != Role::Shadow {
            return Err(Rejection::WrongRole {
                participant: participant.id,
                role: participant.role(),
            });
        }
        let mut events = Vec::new();
        participant.raise_exposure(proposal, &mut events);
        for event in events {
            self.broadcast(event);
        }
        Ok(())
    }

    /// Raw writes to authoritative fields are never honoured from a connection.
    fn reject_mutation(
        &mut self,
        client_id: u32,
        mutation: StateMutation,
    ) -> Result<(), Rejection> {
        let origin = Origin::Connection(client_id);
        match mutation {
            StateMutation::Health {
                participant_id,
                value,
            } => {
                let participant = self
                    .participants
                    .get_mut(&participant_id)
                    .ok_or(Rejection::UnknownParticipant(participant_id))?;
                participant.set_health(origin, value).map(|_| ())
            }
            StateMutation::Role {
                participant_id,
                role,
            } => {
                let participant = self
                    .participants
                    .get_mut(&participant_id)
                    .ok_or(Rejection::UnknownParticipant(participant_id))?;
                participant.set_role(origin, role).map(|_| ())
            }
            StateMutation::Toggle { object_id, .. } => Err(Rejection::ReadOnlyObject(object_id)),
        }
    }

    /// Takes control of the actor away from a participant that is out.
    fn retire(&mut self, participant_id: ParticipantId) {
        let actor = self.participants.get(&participant_id).map(|p| p.actor_id);
        if let Some(notice) = actor.and_then(|actor| self.authority.revoke(actor)) {
            self.send_to(notice.connection, notice.event);
        }
    }

    /// Ends the match if every Shadow is out. Safe to call repeatedly.
    fn evaluate_outcome(&mut self) {
        let statuses: Vec<(Role, Status)> = self
            .participants
            .values()
            .map(|p| (p.role(), p.status()))
            .collect();
        let winner = match &mut self.stage {
            Stage::Playing(controller) => controller.evaluate_outcome(statuses),
            _ => None,
        };
        if let Some(side) = winner {
            self.terminate(side);
        }
    }

    /// Revokes control of every actor and tells each participant how it went.
    fn terminate(&mut self, winning_side: Side) {
        let notices = self.authority.revoke_all();
        self.send_targeted(notices);

        for participant in self.participants.values_mut() {
            if let Some(flashlight) = participant.flashlight.as_mut() {
                flashlight.switch_off();
            }
        }
        let cancelled: Vec<ServerEvent> = self
            .stations
            .iter_mut()
            .filter_map(ChargingStation::cancel)
            .collect();
        for event in cancelled {
            self.broadcast(event);
        }

        let results = MatchController::results(
            winning_side,
            self.participants.values().map(|p| (p.id, p.role())),
        );
        self.broadcast(ServerEvent::MatchEnded {
            winning_side,
            results: results.clone(),
        });

        for result in results {
            let connection = self
                .participants
                .get(&result.participant_id)
                .map(|p| p.connection_id);
            if let Some(connection) = connection {
                self.send_to(
                    connection,
                    ServerEvent::GameOver {
                        winning_side,
                        won: result.won,
                    },
                );
            }
        }

        self.lobby.reset_ready();
        let stage = std::mem::replace(&mut self.stage, Stage::Lobby);
        self.stage = match stage {
            Stage::Playing(controller) => Stage::Ended(controller),
            other => other,
        };
    }

    /// Advances the simulation by one tick.
    pub fn update(&mut self, dt: f32) {
        if self.is_playing() {
            self.update_match(dt);
            return;
        }

        let all_acknowledged = !self.participants.is_empty()
            && self.participants.values().all(|p| p.spawn_acknowledged);
        let poll = match &mut self.stage {
            Stage::Spawning(barrier) => barrier.tick(dt, all_acknowledged),
            _ => return,
        };

        match poll {
            BarrierPoll::Stable => self.begin_match(),
            BarrierPoll::TimedOut => self.abort_spawning("Timed out waiting for players to spawn"),
            BarrierPoll::Pending => {}
        }
    }

    fn update_match(&mut self, dt: f32) {
        let mut events = Vec::new();

        let timer_winner = match &mut self.stage {
            Stage::Playing(controller) => controller.tick(dt, &mut events),
            _ => None,
        };

        let occupants: Vec<_> = self
            .participants
            .values()
            .filter(|p| p.is_alive())
            .map(|p| p.position)
            .collect();
        self.toggles.tick(dt, &occupants, &mut events);
        if let Some(ghost) = self.ghost.as_mut() {
            ghost.tick(dt, &mut self.rng, &mut self.toggles, &mut events);
        }

        self.update_flashlights(dt, &mut events);

        self.light_timer += dt;
        if self.light_timer >= LIGHT_CHECK_INTERVAL_SECS {
            self.light_timer = 0.0;
            self.evaluate_lights(&mut events);
        }

        let mut died = Vec::new();
        for participant in self.participants.values_mut() {
            if participant.tick_health(dt, &mut events) {
                died.push(participant.id);
            }
        }

        for event in events {
            self.broadcast(event);
        }
        for id in &died {
            self.retire(*id);
        }

        if let Some(side) = timer_winner {
            self.terminate(side);
        } else if !died.is_empty() {
            self.evaluate_outcome();
        }
    }

    fn update_flashlights(&mut self, dt: f32, events: &mut Vec<ServerEvent>) {
        for participant in self.participants.values_mut() {
            if let Some(flashlight) = participant.flashlight.as_mut() {
                if flashlight.drain(dt) {
                    info!("Flashlight of participant {} ran flat", participant.id);
                    events.push(ServerEvent::FlashlightChanged {
                        participant_id: participant.id,
                        on: false,
                    });
                }
            }
        }

        for station in &mut self.stations {
            let Some(holder_id) = station.charging() else {
                continue;
            };
            match self.participants.get_mut(&holder_id) {
                Some(holder) => {
                    let position = holder.position;
                    if let Some(flashlight) = holder.flashlight.as_mut() {
                        events.extend(station.tick(dt, position, flashlight));
                    } else {
                        events.extend(station.cancel());
                    }
                }
                None => events.extend(station.cancel()),
            }
        }
    }

    /// Refreshes the lamps and flashlights in the emitter registry and
    /// re-evaluates every Shadow. Fixtures are registered when the match
    /// begins and flashlights leave with their participant.
    fn evaluate_lights(&mut self, events: &mut Vec<ServerEvent>) {
        for (key, emitter) in self.toggles.emitters() {
            self.lights.register(key, emitter);
        }
        for participant in self.participants.values() {
            if let Some(flashlight) = participant.flashlight.as_ref() {
                let mut cone =
                    flashlight.emitter(participant.position, participant.yaw, participant.pitch);
                cone.enabled &= participant.is_alive();
                self.lights.register(
                    EmitterKey::Flashlight(participant.id),
                    LightEmitter::Cone(cone),
                );
            }
        }

        for participant in self.participants.values_mut() {
            if participant.role() != Role::Shadow || !participant.is_alive() {
                continue;
            }
            let samples = sample_points(participant.position, BODY_HEIGHT);
            let exposure =
                evaluate_exposure(&samples, self.lights.emitters(), &self.level.occluders);
            participant.apply_exposure(exposure, events);
        }
    }

    pub fn is_match_over(&self) -> bool {
        matches!(self.stage, Stage::Ended(_))
            || self
                .match_controller()
                .map_or(false, |m| m.state() == MatchState::GameOver)
    }
}

/// The participant whose actor `client_id` was given.
fn driven_by(
    participants: &mut BTreeMap<ParticipantId, Participant>,
    client_id: u32,
) -> Result<&mut Participant, Rejection> {
    participants
        .values_mut()
        .find(|p| p.connection_id == client_id)
        .ok_or(Rejection::UnknownParticipant(client_id))
}
