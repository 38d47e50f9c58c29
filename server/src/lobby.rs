//! Pre-match lobby, role assignment and the spawn barrier
//!
//! Connections take a seat when they join. The first seat is treated as the
//! host seat for role assignment but is otherwise an ordinary connection.
//! Once every seat is ready and enough players are seated, actors are
//! spawned and the [`SpawnBarrier`] waits for every client to acknowledge
//! its spawn before keys are placed and the timer starts.

use crate::error::Rejection;
use clap::ValueEnum;
use log::{debug, info};
use rand::Rng;
use shared::{
    LobbySeat, Role, ServerEvent, MAX_NAME_CHARS, SPAWN_MAX_POLLS, SPAWN_POLL_INTERVAL_SECS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RoleMode {
    /// First seat hunts, everyone else hides
    HostIsGuardian,
    /// First seat hides, the next seat hunts
    HostIsShadow,
    /// One Guardian drawn uniformly when the match starts
    Random,
}

#[derive(Debug)]
pub struct Lobby {
    mode: RoleMode,
    seats: Vec<LobbySeat>,
}

impl Lobby {
    pub fn new(mode: RoleMode) -> Self {
        Self {
            mode,
            seats: Vec::new(),
        }
    }

    pub fn seats(&self) -> &[LobbySeat] {
        &self.seats
    }

    pub fn seat(&self, client_id: u32) -> Option<&LobbySeat> {
        self.seats.iter().find(|s| s.client_id == client_id)
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    pub fn join<R: Rng>(&mut self, client_id: u32, name: Option<String>, rng: &mut R) {
        self.leave(client_id);

        let name = name
            .map(|n| n.trim().chars().take(MAX_NAME_CHARS).collect::<String>())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Player_{}", rng.gen_range(1000..10000)));
        info!("Client {} took a lobby seat as {}", client_id, name);

        self.seats.push(LobbySeat {
            client_id,
            name,
            ready: false,
            role: Role::Shadow,
        });
        self.preview_roles();
    }

    pub fn leave(&mut self, client_id: u32) -> bool {
        let before = self.seats.len();
        self.seats.retain(|s| s.client_id != client_id);
        let left = self.seats.len() != before;
        if left {
            self.preview_roles();
        }
        left
    }

    pub fn toggle_ready(&mut self, client_id: u32) -> Result<bool, Rejection> {
        let seat = self
            .seats
            .iter_mut()
            .find(|s| s.client_id == client_id)
            .ok_or(Rejection::UnknownParticipant(client_id))?;
        seat.ready = !seat.ready;
        debug!("Client {} ready: {}", client_id, seat.ready);
        Ok(seat.ready)
    }

    pub fn reset_ready(&mut self) {
        for seat in &mut self.seats {
            seat.ready = false;
        }
    }

    pub fn ready_to_start(&self, min_players: usize) -> bool {
        self.seats.len() >= min_players && self.seats.iter().all(|s| s.ready)
    }

    /// Roles shown while seated. Random mode shows everyone as a Shadow.
    fn preview_roles(&mut self) {
        let mode = self.mode;
        for (index, seat) in self.seats.iter_mut().enumerate() {
            seat.role = match (mode, index) {
                (RoleMode::HostIsGuardian, 0) => Role::Guardian,
                (RoleMode::HostIsShadow, 1) => Role::Guardian,
                _ => Role::Shadow,
            };
        }
    }

    /// Fixes the roles for the match about to start.
    pub fn assign_roles<R: Rng>(&mut self, rng: &mut R) -> Vec<LobbySeat> {
        self.preview_roles();
        if self.mode == RoleMode::Random && !self.seats.is_empty() {
            let guardian = rng.gen_range(0..self.seats.len());
            for (index, seat) in self.seats.iter_mut().enumerate() {
                seat.role = if index == guardian {
                    Role::Guardian
                } else {
                    Role::Shadow
                };
            }
        }
        self.seats.clone()
    }

    pub fn event(&self) -> ServerEvent {
        ServerEvent::LobbyUpdated {
            seats: self.seats.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierPoll {
    Pending,
    Stable,
    TimedOut,
}

/// Polls for spawn acknowledgements at a fixed interval with a bounded budget.
#[derive(Debug, Clone)]
pub struct SpawnBarrier {
    interval: f32,
    max_polls: u32,
    polls: u32,
    since_poll: f32,
}

impl Default for SpawnBarrier {
    fn default() -> Self {
        Self::new(SPAWN_POLL_INTERVAL_SECS, SPAWN_MAX_POLLS)
    }
}

impl SpawnBarrier {
    pub fn new(interval: f32, max_polls: u32) -> Self {
        Self {
            interval,
            max_polls,
            polls: 0,
            since_poll: 0.0,
        }
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn tick(&mut self, dt: f32, all_acknowledged: bool) -> BarrierPoll {
        self.since_poll += dt;
        if self.since_poll < self.interval {
            return BarrierPoll::Pending;
        }
        self.since_poll -= self.interval;
        self.polls += 1;

        if all_acknowledged {
            BarrierPoll::Stable
        } else if self.polls >= self.max_polls {
            BarrierPoll::TimedOut
        } else {
            debug!("Spawn barrier poll {}/{}", self.polls, self.max_polls);
            BarrierPoll::Pending
        }
    }
}
