//! rally-core - Core library for Rally
//!
//! This crate contains the shared models, local SQLite replica, and sync
//! engine used by all Rally interfaces. Every device holds a full copy of
//! the data; the sync layer reconciles it against the remote store in the
//! background.

pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod models;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use identity::DeviceIdentity;
pub use models::{GameId, GameResult, Match, MatchId, Player, PlayerId};
