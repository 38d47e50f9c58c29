//! # Match Server Library
//!
//! This library is the authoritative server for an asymmetric hide-and-seek
//! match: one Guardian carrying a flashlight hunts several Shadows through a
//! dark house. Shadows collect keys and try to reach an exit, the Guardian's
//! light burns them. Every rule of the match is decided here; clients only
//! send requests and render what the server tells them.
//!
//! ## Core Responsibilities
//!
//! ### Match Progress
//! The match controller counts the timer down, derives the time of night
//! (Evening, Night, Dawn), places keys at match start and decides the end of
//! the match exactly once. Shadows win if at least one of them escaped by the
//! time every Shadow is out; otherwise, or when time runs out, the Guardian
//! wins.
//!
//! ### Authoritative State
//! Health, role, status and the state of doors, lamps and windows can only
//! be written by the server. Requests from connections are validated (range,
//! role, liveness, authority over the actor) and either applied or dropped.
//! A raw write attempt from a connection is always rejected and logged.
//!
//! ### Actor Authority
//! Each participant's actor is owned by exactly one connection. Movement and
//! light reports are only accepted from the owner. Grants and revokes are
//! sent to the connection they concern. A Shadow that dies or escapes loses
//! its actor at once, and when the match ends every actor is revoked. A
//! client that connects again from the same address mid-match has its actor
//! transferred to the new connection.
//!
//! ### Light Exposure
//! Ten times per second the server refreshes the registry of light emitters
//! (level fixtures, lamps, the Guardian's flashlight) and evaluates each
//! Shadow at its feet, centre and head against every enabled emitter, with
//! level boxes blocking rays.
//!
//! ## Architecture Design
//!
//! ### Single Game Loop
//! All state lives in [`game::GameState`] and is only touched from the main
//! loop in [`network::Server`]. Network tasks never mutate game state; they
//! move datagrams over channels.
//!
//! ### Outbox Instead Of Callbacks
//! Every state change produces a `ServerEvent` pushed to an outbox, addressed
//! either to everyone or to one connection. The network loop drains the
//! outbox after each packet and each tick.
//!
//! ### Explicit State Machines
//! Waiting for every client to acknowledge its spawn, door transitions and
//! charging sessions are all driven by the tick with explicit timers and
//! budgets.
//!
//! ## Module Organization
//!
//! - `authority`: actor ownership, grants, revokes and transfers
//! - `client_manager`: connection ids, movement queues and timeouts
//! - `error`: typed request rejections and startup errors
//! - `flashlight`: Guardian battery and charging stations
//! - `game`: composition root and request dispatch
//! - `ghost`: server-driven wanderer that switches lamps
//! - `level`: JSON level layout and the built-in default house
//! - `lobby`: seats, role assignment and the spawn barrier
//! - `match_controller`: timer, phases, keys and outcome
//! - `network`: UDP transport and the fixed-rate loop
//! - `participant`: health, status, exposure and shadow form
//! - `toggles`: doors, lamps and windows
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::game::{GameConfig, GameState};
//! use server::level::Level;
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let game = GameState::new(GameConfig::default(), Level::default_house());
//!
//!     // 30Hz loop, at most 8 connections
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(33),
//!         8,
//!         game,
//!     ).await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod authority;
pub mod client_manager;
pub mod error;
pub mod flashlight;
pub mod game;
pub mod ghost;
pub mod level;
pub mod lobby;
pub mod match_controller;
pub mod network;
pub mod participant;
pub mod toggles;
