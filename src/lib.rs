#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
//! Skylark is a per-guild voice connection manager for Discord gateway
//! clients, written in Rust.
//!
//! The library offers:
//!  * An [`AudioManager`] for each guild, which tracks whether the local
//!  member is idle, waiting on a voice server, or connected, and turns
//!  requests to join, move, or leave into gateway voice state updates.
//!  * A shard-aware [`Skylark`] registry, creating managers on demand and
//!  routing transport callbacks to them.
//!  * A one-time bootstrap of the native Opus library in [`codec`], whose
//!  outcome decides whether audio is available to this process.
//!
//! Skylark does not carry audio itself. A voice transport (websocket, UDP,
//! encryption, and encoding) builds an [`AudioConnection`] once the gateway
//! hands out a voice server, and gives it to the matching manager.
//!
//! ## Gateway integration
//! Voice state updates are sent through a [`Shard`]. A [`ShardHandle`]
//! buffers updates while its gateway connection is down, and forwards
//! them as JSON text over a [`flume`] channel once it is registered.
//! Any other gateway can be plugged in by implementing [`VoiceUpdate`].
//!
//! ## Native libraries
//! With the default `"natives"` feature, libopus is loaded from
//! `natives/<platform>/` under the directory named by the
//! `SKYLARK_NATIVES_DIR` environment variable, or else the directory of
//! the running executable. If loading fails, audio is disabled and every
//! attempt to join a channel fails with [`JoinError::AudioUnsupported`].
//!
//! [`AudioConnection`]: connection::AudioConnection
//! [`Shard`]: shards::Shard
//! [`ShardHandle`]: shards::ShardHandle
//! [`VoiceUpdate`]: shards::VoiceUpdate
//! [`JoinError::AudioUnsupported`]: error::JoinError::AudioUnsupported
//! [`flume`]: https://docs.rs/flume

#![warn(clippy::pedantic)]
#![allow(
    // Allowed as they are too pedantic
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
)]

pub mod codec;
mod config;
pub mod connection;
pub mod constants;
pub mod error;
mod handler;
pub mod id;
mod manager;
pub mod model;
pub mod policy;
pub mod shards;

#[cfg(test)]
pub(crate) mod test_utils;

pub use crate::{config::Config, handler::*, manager::*};
