//! Client-side core of an MLS-style cryptographic group-messaging protocol.
//!
//! Each member of a group holds a [`group::GroupState`]: a ratchet tree of
//! key pairs, a roster of credentials, and the secrets of the current epoch.
//! Membership changes travel as signed [`messages::Handshake`] messages that
//! every member applies in the same order, keeping trees and key schedules
//! in lockstep.

pub mod crypto;
pub mod group;
pub mod messages;
pub mod ratchet_tree;
pub mod roster;
pub mod utilities;
