//! Server half of actor authority
//!
//! Tracks which connection may drive each networked actor. Grants and
//! revokes are delivered only to the connection they concern, and a
//! repeated grant to the current owner produces nothing so the client's
//! control gate flips at most once per grant.

use crate::error::Rejection;
use log::{debug, info};
use shared::{ActorId, ServerEvent};
use std::collections::HashMap;

/// An event addressed to a single connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Targeted {
    pub connection: u32,
    pub event: ServerEvent,
}

impl Targeted {
    fn granted(connection: u32, actor_id: ActorId) -> Self {
        Self {
            connection,
            event: ServerEvent::AuthorityGranted { actor_id },
        }
    }

    fn revoked(connection: u32, actor_id: ActorId) -> Self {
        Self {
            connection,
            event: ServerEvent::AuthorityRevoked { actor_id },
        }
    }
}

#[derive(Debug, Default)]
pub struct AuthorityManager {
    owners: HashMap<ActorId, u32>,
}

impl AuthorityManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(&self, actor: ActorId) -> Option<u32> {
        self.owners.get(&actor).copied()
    }

    pub fn is_authoritative(&self, connection: u32, actor: ActorId) -> bool {
        self.owner(actor) == Some(connection)
    }

    pub fn check(&self, connection: u32, actor: ActorId) -> Result<(), Rejection> {
        if self.is_authoritative(connection, actor) {
            Ok(())
        } else {
            Err(Rejection::AuthorityViolation { connection, actor })
        }
    }

    /// Gives `connection` control of `actor`, taking it from any previous owner.
    pub fn grant(&mut self, actor: ActorId, connection: u32) -> Vec<Targeted> {
        match self.owners.insert(actor, connection) {
            Some(previous) if previous == connection => {
                debug!("Actor {} already owned by connection {}", actor, connection);
                Vec::new()
            }
            Some(previous) => {
                info!(
                    "Actor {} moved from connection {} to {}",
                    actor, previous, connection
                );
                vec![
                    Targeted::revoked(previous, actor),
                    Targeted::granted(connection, actor),
                ]
            }
            None => {
                info!("Granted actor {} to connection {}", actor, connection);
                vec![Targeted::granted(connection, actor)]
            }
        }
    }

    pub fn revoke(&mut self, actor: ActorId) -> Option<Targeted> {
        let connection = self.owners.remove(&actor)?;
        info!("Revoked actor {} from connection {}", actor, connection);
        Some(Targeted::revoked(connection, actor))
    }

    /// Moves an already-owned actor to another connection.
    pub fn transfer(&mut self, actor: ActorId, to: u32) -> Result<Vec<Targeted>, Rejection> {
        if !self.owners.contains_key(&actor) {
            return Err(Rejection::UnknownObject(actor));
        }
        Ok(self.grant(actor, to))
    }

    /// Drops every actor owned by a connection that went away.
    pub fn release_connection(&mut self, connection: u32) -> Vec<ActorId> {
        let released: Vec<ActorId> = self
            .owners
            .iter()
            .filter(|(_, owner)| **owner == connection)
            .map(|(actor, _)| *actor)
            .collect();
        for actor in &released {
            self.owners.remove(actor);
        }
        released
    }

    pub fn revoke_all(&mut self) -> Vec<Targeted> {
        let mut revoked: Vec<Targeted> = self
            .owners
            .drain()
            .map(|(actor, connection)| Targeted::revoked(connection, actor))
            .collect();
        revoked.sort_by_key(|t| t.connection);
        revoked
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
