//! Client mirror of replicated match state
//!
//! Nothing here is authoritative. The mirror applies snapshots and events as
//! the server sends them, reports what the player should hear or see, and
//! evaluates the local actor's light exposure so it can be proposed to the
//! server.

use crate::authority::ControlSubsystem;
use crate::interactable::{ProximityHint, SoundCue, ToggleBoard};
use log::{debug, info};
use shared::{
    evaluate_exposure, sample_points, ActorId, ConeEmitter, EmitterKey, Exposure, KeyId,
    LevelView, LightEmitter, LightRegistry, LobbySeat, Packet, ParticipantId, ParticipantView,
    Phase, Role, ServerEvent, Side, Status, Vec3, BODY_HEIGHT, FLASHLIGHT_HAND_HEIGHT,
    FLASHLIGHT_RANGE, FLASHLIGHT_SPOT_ANGLE,
};
use std::collections::{BTreeMap, HashMap};

/// Something the player should notice as a result of a server message.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Sound(SoundCue),
    Hint(ProximityHint),
    Lobby(Vec<LobbySeat>),
    MatchStarted,
    MatchStartFailed(String),
    KeysChanged { collected: u32, total: u32 },
    PhaseChanged(Phase),
    Died,
    Escaped,
    GameOver { winning_side: Side, won: bool },
}

pub struct ClientGameState {
    pub client_id: Option<u32>,
    /// Last actor the server handed us.
    pub own_actor: Option<ActorId>,
    pub tick: u32,
    pub time_remaining: f32,
    pub phase: Phase,
    pub last_processed_input: u32,
    pub participants: HashMap<u32, ParticipantView>,
    pub level: LevelView,
    pub toggles: ToggleBoard,
    pub keys: BTreeMap<KeyId, Vec3>,
    pub keys_collected: u32,
    pub keys_total: u32,
    pub result: Option<(Side, bool)>,
    local_position: Option<(Vec3, f32)>,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self {
            client_id: None,
            own_actor: None,
            tick: 0,
            time_remaining: 0.0,
            phase: Phase::Evening,
            last_processed_input: 0,
            participants: HashMap::new(),
            level: LevelView::default(),
            toggles: ToggleBoard::new(),
            keys: BTreeMap::new(),
            keys_collected: 0,
            keys_total: 0,
            result: None,
            local_position: None,
        }
    }

    /// Our own participant: the one driving our actor, else the one whose id
    /// is our connection id. The two differ after a reconnect.
    pub fn own(&self) -> Option<&ParticipantView> {
        self.own_actor
            .and_then(|actor| self.participants.values().find(|p| p.actor_id == actor))
            .or_else(|| self.client_id.and_then(|id| self.participants.get(&id)))
    }

    fn is_own(&self, participant_id: ParticipantId) -> bool {
        match self.own() {
            Some(own) => own.id == participant_id,
            None => Some(participant_id) == self.client_id,
        }
    }

    /// Position used for local checks: last commanded move, else the snapshot.
    pub fn own_position(&self) -> Option<(Vec3, f32)> {
        self.local_position
            .or_else(|| self.own().map(|p| (p.position, p.yaw)))
    }

    pub fn set_local_position(&mut self, position: Vec3, yaw: f32) {
        self.local_position = Some((position, yaw));
    }

    pub fn apply_snapshot(
        &mut self,
        tick: u32,
        time_remaining: f32,
        phase: Phase,
        last_processed_input: &HashMap<u32, u32>,
        participants: Vec<ParticipantView>,
    ) {
        if tick < self.tick {
            debug!("Ignoring stale snapshot {} (have {})", tick, self.tick);
            return;
        }
        self.tick = tick;
        self.time_remaining = time_remaining;
        self.phase = phase;
        if let Some(id) = self.client_id {
            if let Some(sequence) = last_processed_input.get(&id) {
                self.last_processed_input = *sequence;
            }
        }
        self.participants = participants.into_iter().map(|p| (p.id, p)).collect();
    }

    pub fn apply_event(&mut self, event: ServerEvent) -> Vec<Notice> {
        let mut notices = Vec::new();
        match event {
            ServerEvent::LevelSync(level) => {
                self.toggles.load(&level.toggles);
                self.level = level;
            }
            ServerEvent::LobbyUpdated { seats } => notices.push(Notice::Lobby(seats)),
            ServerEvent::ToggleStateChanged {
                object_id,
                old,
                new,
            } => {
                if let Some(cue) = self.toggles.apply_change(object_id, old, new) {
                    notices.push(Notice::Sound(cue));
                }
            }
            ServerEvent::MatchStarted { duration_secs } => {
                self.time_remaining = duration_secs;
                self.result = None;
                notices.push(Notice::MatchStarted);
            }
            ServerEvent::MatchStartFailed { reason } => {
                self.local_position = None;
                notices.push(Notice::MatchStartFailed(reason));
            }
            ServerEvent::KeySpawned { key_id, position } => {
                self.keys.insert(key_id, position);
            }
            ServerEvent::KeyCollected { key_id, .. } => {
                self.keys.remove(&key_id);
            }
            ServerEvent::KeyCountChanged { collected, total } => {
                self.keys_collected = collected;
                self.keys_total = total;
                notices.push(Notice::KeysChanged { collected, total });
            }
            ServerEvent::PhaseChanged { phase } => {
                self.phase = phase;
                notices.push(Notice::PhaseChanged(phase));
            }
            ServerEvent::StatusChanged {
                participant_id,
                new,
                ..
            } => {
                if let Some(view) = self.participants.get_mut(&participant_id) {
                    view.status = new;
                }
                if self.is_own(participant_id) {
                    match new {
                        Status::Dead => notices.push(Notice::Died),
                        Status::Escaped => notices.push(Notice::Escaped),
                        Status::Alive => {}
                    }
                }
            }
            ServerEvent::HealthChanged {
                participant_id,
                new,
                ..
            } => {
                if let Some(view) = self.participants.get_mut(&participant_id) {
                    view.health = new;
                }
            }
            ServerEvent::RoleAssigned {
                participant_id,
                role,
            } => {
                if self.is_own(participant_id) {
                    info!("Assigned role {:?}", role);
                }
            }
            ServerEvent::GameOver { winning_side, won } => {
                self.result = Some((winning_side, won));
                self.local_position = None;
                notices.push(Notice::GameOver { winning_side, won });
            }
            other => debug!("Event: {:?}", other),
        }
        notices
    }

    pub fn update_proximity(&mut self) -> Vec<Notice> {
        let Some((position, _)) = self.own_position() else {
            return Vec::new();
        };
        self.toggles
            .update_proximity(position)
            .into_iter()
            .map(Notice::Hint)
            .collect()
    }

    fn flashlight_cone(view: &ParticipantView) -> ConeEmitter {
        ConeEmitter {
            position: view.position + Vec3::UP * FLASHLIGHT_HAND_HEIGHT,
            forward: Vec3::from_yaw_pitch(view.yaw, 0.0),
            range: FLASHLIGHT_RANGE,
            spot_angle: FLASHLIGHT_SPOT_ANGLE,
            enabled: view.flashlight_on && view.status == Status::Alive,
            hostile: true,
        }
    }

    /// Evaluates our own Shadow against every light we know about.
    pub fn local_exposure(&self) -> Option<Exposure> {
        let own = self.own()?;
        if own.role != Role::Shadow || own.status != Status::Alive {
            return None;
        }
        let (position, _) = self.own_position()?;

        let mut registry = LightRegistry::new();
        for (index, fixture) in self.level.fixtures.iter().enumerate() {
            registry.register(EmitterKey::Fixture(index as u32), *fixture);
        }
        for (key, emitter) in self.toggles.emitters() {
            registry.register(key, emitter);
        }
        for view in self.participants.values() {
            if view.role == Role::Guardian {
                registry.register(
                    EmitterKey::Flashlight(view.id),
                    LightEmitter::Cone(Self::flashlight_cone(view)),
                );
            }
        }

        let samples = sample_points(position, BODY_HEIGHT);
        Some(evaluate_exposure(
            &samples,
            registry.emitters(),
            &self.level.occluders,
        ))
    }
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}

/// Proposes the local exposure to the server while we control our actor.
#[derive(Debug, Default)]
pub struct LightReporter {
    enabled: bool,
    last_sent: Option<Exposure>,
}

impl LightReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lit results are always re-sent since the server's own evaluation may
    /// clear them. Dark results are sent once per change.
    pub fn propose(&mut self, exposure: Option<Exposure>) -> Option<Packet> {
        let exposure = exposure?;
        if !self.enabled {
            return None;
        }
        if !exposure.in_light && self.last_sent == Some(exposure) {
            return None;
        }
        self.last_sent = Some(exposure);
        Some(Packet::ReportLightStatus {
            in_light: exposure.in_light,
            in_hostile_light: exposure.in_hostile_light,
        })
    }
}

impl ControlSubsystem for LightReporter {
    fn name(&self) -> &'static str {
        "light reporter"
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.last_sent = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{ToggleKind, ToggleView};

    fn view(id: u32, role: Role, position: Vec3) -> ParticipantView {
        ParticipantView {
            id,
            actor_id: 1000 + id,
            name: format!("p{}", id),
            role,
            status: Status::Alive,
            health: 20.0,
            position,
            yaw: 0.0,
            in_shadow_form: false,
            in_light: false,
            in_hostile_light: false,
            flashlight_on: role == Role::Guardian,
            battery_percent: None,
        }
    }

    fn mirror_with(participants: Vec<ParticipantView>) -> ClientGameState {
        let mut game = ClientGameState::new();
        game.client_id = Some(2);
        game.apply_snapshot(1, 300.0, Phase::Evening, &HashMap::new(), participants);
        game
    }

    #[test]
    fn test_toggle_events_play_one_cue() {
        let mut game = ClientGameState::new();
        game.apply_event(ServerEvent::LevelSync(LevelView {
            toggles: vec![ToggleView {
                id: 1,
                kind: ToggleKind::Door,
                position: Vec3::ZERO,
                range: 2.0,
                is_on: false,
                light_radius: None,
            }],
            ..LevelView::default()
        }));

        let mut notices = Vec::new();
        for (old, new) in [(false, false), (false, true), (true, true)] {
            notices.extend(game.apply_event(ServerEvent::ToggleStateChanged {
                object_id: 1,
                old,
                new,
            }));
        }
        assert_eq!(notices, vec![Notice::Sound(SoundCue::DoorOpen)]);
    }

    #[test]
    fn test_local_exposure_in_guardian_beam() {
        let game = mirror_with(vec![
            view(1, Role::Guardian, Vec3::new(0.0, 0.0, 0.0)),
            view(2, Role::Shadow, Vec3::new(0.0, 0.0, 4.0)),
        ]);
        let exposure = game.local_exposure().unwrap();
        assert!(exposure.in_hostile_light);
    }

    #[test]
    fn test_guardian_does_not_evaluate() {
        let mut game = mirror_with(vec![view(2, Role::Guardian, Vec3::ZERO)]);
        game.set_local_position(Vec3::new(1.0, 0.0, 1.0), 0.0);
        assert_eq!(game.local_exposure(), None);
    }

    #[test]
    fn test_stale_snapshot_ignored() {
        let mut game = mirror_with(vec![view(2, Role::Shadow, Vec3::ZERO)]);
        game.apply_snapshot(5, 200.0, Phase::Night, &HashMap::new(), vec![]);
        game.apply_snapshot(3, 250.0, Phase::Evening, &HashMap::new(), vec![]);
        assert_eq!(game.tick, 5);
        assert_eq!(game.phase, Phase::Night);
        assert_approx_eq!(game.time_remaining, 200.0);
    }

    #[test]
    fn test_own_participant_follows_actor() {
        let mut game = mirror_with(vec![
            view(1, Role::Guardian, Vec3::ZERO),
            view(2, Role::Shadow, Vec3::new(3.0, 0.0, 0.0)),
        ]);
        assert_eq!(game.own().map(|p| p.id), Some(2));

        // Reconnected as connection 7 while still driving participant 1's actor
        game.client_id = Some(7);
        game.own_actor = Some(1001);
        assert_eq!(game.own().map(|p| p.id), Some(1));

        let notices = game.apply_event(ServerEvent::StatusChanged {
            participant_id: 1,
            old: Status::Alive,
            new: Status::Escaped,
        });
        assert_eq!(notices, vec![Notice::Escaped]);
    }

    #[test]
    fn test_game_over_records_result() {
        let mut game = ClientGameState::new();
        let notices = game.apply_event(ServerEvent::GameOver {
            winning_side: Side::Guardians,
            won: true,
        });
        assert_eq!(game.result, Some((Side::Guardians, true)));
        assert_eq!(notices.len(), 1);
    }

    #[test]
    fn test_reporter_needs_control() {
        let mut reporter = LightReporter::new();
        let lit = Some(Exposure {
            in_light: true,
            in_hostile_light: false,
        });
        assert!(reporter.propose(lit).is_none());

        reporter.set_enabled(true);
        assert!(reporter.propose(lit).is_some());
        assert!(reporter.propose(lit).is_some());

        let dark = Some(Exposure::default());
        assert!(reporter.propose(dark).is_some());
        assert!(reporter.propose(dark).is_none());
    }
}
