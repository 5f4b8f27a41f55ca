//! A lightweight library for gossip-based state dissemination and consensus
//! detection in clustered systems.
//!
//! Each cluster member keeps a versioned key/value store of what it knows
//! about every member, its own entries included. Members periodically push
//! deltas to a few random peers (anti-entropy), so every local write reaches
//! the whole cluster in O(log n) rounds without a central coordinator.
//! Conflicts resolve by per-member sequence number; wall-clock time is never
//! consulted.
//!
//! ## How it works
//!
//! State is written locally with [`gossip::Gossip::set_state`] and spreads
//! through send/receive rounds. The engine never touches the network itself:
//! [`gossip::Gossip::send_state`] hands prepared deltas to a caller-supplied
//! send function, and whatever arrives from peers is fed back in through
//! [`gossip::Gossip::receive_state`]. Per-peer watermarks keep deltas small,
//! and a delta only counts as delivered once the caller commits it, so lost
//! exchanges are retried on the next round.
//!
//! On top of the store, consensus checks watch a set of keys and signal a
//! [`handle::ConsensusHandle`] once every known member agrees on a derived
//! value, such as the topology hash under [`gossip::TOPOLOGY_KEY`].
//! [`gossiper::Gossiper`] wraps the engine in the periodic loop most
//! applications want.

pub mod config;
pub mod consensus;
pub mod error;
pub mod events;
pub mod gossip;
pub mod gossip_consensus;
pub mod gossiper;
pub mod handle;
pub mod protos;
pub mod state;
pub mod stats;
pub mod types;
pub mod utils;
