//! Match Controller: timer, phases, keys, and the single end-of-match decision
//!
//! The controller owns match progress and decides when the match is over. It
//! does not touch participants or connections; the caller passes in what it
//! needs and carries out the termination side effects when a winner comes
//! back. A guard flag guarantees a winner is reported at most once no matter
//! how many times the outcome is evaluated.

use crate::error::Rejection;
use log::{debug, info, warn};
use rand::Rng;
use shared::{
    KeyId, ParticipantId, ParticipantResult, Phase, Role, ServerEvent, Side, Status, Vec3,
    KEY_PICKUP_RANGE,
};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    Playing,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Key {
    pub id: KeyId,
    pub position: Vec3,
}

#[derive(Debug)]
pub struct MatchController {
    max_time: f32,
    time_remaining: f32,
    phase: Phase,
    keys: BTreeMap<KeyId, Key>,
    collected: BTreeSet<KeyId>,
    keys_spawned: u32,
    keys_collected: u32,
    all_keys_found: bool,
    state: MatchState,
    winner: Option<Side>,
}

impl MatchController {
    pub fn new(duration_secs: f32) -> Self {
        Self {
            max_time: duration_secs,
            time_remaining: duration_secs,
            phase: Phase::Evening,
            keys: BTreeMap::new(),
            collected: BTreeSet::new(),
            keys_spawned: 0,
            keys_collected: 0,
            all_keys_found: false,
            state: MatchState::Playing,
            winner: None,
        }
    }

    pub fn time_remaining(&self) -> f32 {
        self.time_remaining
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn winner(&self) -> Option<Side> {
        self.winner
    }

    pub fn keys_spawned(&self) -> u32 {
        self.keys_spawned
    }

    pub fn keys_collected(&self) -> u32 {
        self.keys_collected
    }

    pub fn all_keys_found(&self) -> bool {
        self.all_keys_found
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.keys.values()
    }

    /// Progress through the match as a percentage in [0, 100].
    pub fn progress(&self) -> f32 {
        if self.max_time <= 0.0 {
            return 100.0;
        }
        ((1.0 - self.time_remaining / self.max_time) * 100.0).clamp(0.0, 100.0)
    }

    /// Places `min(participants + 1, spawn_points)` keys on distinct spawn points.
    pub fn initialize<R: Rng>(
        &mut self,
        participant_count: usize,
        spawn_points: &[Vec3],
        rng: &mut R,
    ) -> Vec<ServerEvent> {
        let mut events = Vec::new();

        if spawn_points.is_empty() {
            warn!("No key spawn points configured, keys will not be placed");
            return events;
        }

        let mut available: Vec<Vec3> = spawn_points.to_vec();
        let count = (participant_count + 1).min(available.len());

        for id in 0..count as KeyId {
            let choice = rng.gen_range(0..available.len());
            let position = available.swap_remove(choice);
            debug!("Key {} placed at {:?}", id, position);
            self.keys.insert(id, Key { id, position });
            events.push(ServerEvent::KeySpawned {
                key_id: id,
                position,
            });
        }

        self.keys_spawned = count as u32;
        info!("Placed {} keys", self.keys_spawned);
        events.push(self.key_count_event());
        events
    }

    fn key_count_event(&self) -> ServerEvent {
        ServerEvent::KeyCountChanged {
            collected: self.keys_collected,
            total: self.keys_spawned,
        }
    }

    /// Advances the countdown. Returns the winner when the timer ran out.
    pub fn tick(&mut self, dt: f32, events: &mut Vec<ServerEvent>) -> Option<Side> {
        if self.state != MatchState::Playing {
            return None;
        }

        self.time_remaining = (self.time_remaining - dt).max(0.0);

        let phase = Phase::from_progress(self.progress());
        if phase != self.phase {
            info!("Phase changed to {:?}", phase);
            self.phase = phase;
            events.push(ServerEvent::PhaseChanged { phase });
        }

        if self.progress() >= 100.0 {
            info!("Time is up");
            return self.finish(Side::Guardians);
        }
        None
    }

    /// Removes a key picked up by someone standing at `collector`. A key that
    /// is already gone is a [`Rejection::NoChange`].
    pub fn collect_key(
        &mut self,
        key_id: KeyId,
        participant_id: ParticipantId,
        collector: Vec3,
    ) -> Result<Vec<ServerEvent>, Rejection> {
        if self.state != MatchState::Playing {
            return Err(Rejection::MatchNotRunning);
        }
        if self.collected.contains(&key_id) {
            return Err(Rejection::NoChange);
        }

        let key = self
            .keys
            .get(&key_id)
            .ok_or(Rejection::UnknownObject(key_id))?;
        if key.position.distance(collector) > KEY_PICKUP_RANGE {
            return Err(Rejection::OutOfRange {
                participant: participant_id,
                object: key_id,
            });
        }

        self.keys.remove(&key_id);
        self.collected.insert(key_id);
        let mut events = vec![ServerEvent::KeyCollected {
            key_id,
            participant_id,
        }];
        events.extend(self.on_key_collected());
        Ok(events)
    }

    pub fn on_key_collected(&mut self) -> Option<ServerEvent> {
        if self.keys_collected >= self.keys_spawned {
            return None;
        }

        self.keys_collected += 1;
        if self.keys_collected == self.keys_spawned {
            info!("All {} keys found, exits unlocked", self.keys_spawned);
            self.all_keys_found = true;
        }
        Some(self.key_count_event())
    }

    /// Decides the match once every Shadow reached a terminal status.
    ///
    /// Only Shadow participants count. Returns the winner the first time the
    /// match ends and `None` on every later call.
    pub fn evaluate_outcome(
        &mut self,
        participants: impl IntoIterator<Item = (Role, Status)>,
    ) -> Option<Side> {
        if self.state != MatchState::Playing {
            return None;
        }

        let shadows: Vec<Status> = participants
            .into_iter()
            .filter(|(role, _)| *role == Role::Shadow)
            .map(|(_, status)| status)
            .collect();

        if shadows.is_empty() {
            warn!("Outcome evaluated with no Shadow participants");
            return None;
        }

        let escaped = shadows.iter().filter(|s| **s == Status::Escaped).count();
        let dead = shadows.iter().filter(|s| **s == Status::Dead).count();
        debug!(
            "Shadows: {} total, {} escaped, {} dead",
            shadows.len(),
            escaped,
            dead
        );

        if escaped + dead < shadows.len() {
            return None;
        }

        if escaped > 0 {
            self.finish(Side::Shadows)
        } else {
            self.finish(Side::Guardians)
        }
    }

    fn finish(&mut self, side: Side) -> Option<Side> {
        if self.state == MatchState::GameOver {
            return None;
        }
        info!("Match over, {:?} win", side);
        self.state = MatchState::GameOver;
        self.winner = Some(side);
        Some(side)
    }

    /// Personal result for each participant against the winning side.
    pub fn results(
        winning_side: Side,
        participants: impl IntoIterator<Item = (ParticipantId, Role)>,
    ) -> Vec<ParticipantResult> {
        participants
            .into_iter()
            .map(|(participant_id, role)| ParticipantResult {
                participant_id,
                role,
                won: role.side() == winning_side,
            })
            .collect()
    }
}
