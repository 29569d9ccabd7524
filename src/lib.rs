//! Continuous group key agreement over a ratchet tree, in the style of the
//! early MLS (mls10) drafts.
//!
//! A group of members shares a tree of key pairs. Every handshake message
//! (Add, Update, Remove) advances the group to a new epoch with a fresh set
//! of shared secrets that departed members cannot recover and that heals the
//! group after a member's key compromise once that member updates.
//!
//! The crate is transport-agnostic: callers deliver handshakes in order and
//! persist [`group::State`] themselves.

pub mod crypto;
pub mod framing;
pub mod group;
pub mod key_schedule;
pub mod ratchet_tree;
pub mod utilities;
