// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The routing information base of the route decision engine.
//!
//! This crate holds the data plane independent pieces of the decision
//! engine: the address and prefix model, interned path attributes, the
//! per address family prefix tables and the best path selection process.
//! It performs no I/O; the `rde` crate drives it from its event loop.

pub mod attr;
pub mod bestpath;
pub mod db;
pub mod error;
pub mod log;
pub mod nexthop;
pub mod store;
pub mod types;

pub use attr::PathAttributes;
pub use db::{Path, Rib, RibEntry, RibFlags};
pub use store::{AttrHandle, AttrStore};
pub use types::*;

#[cfg(test)]
mod proptest;

/// Local preference assumed for routes that do not carry one.
pub const DEFAULT_LOCAL_PREF: u32 = 100;

/// The reserved AS number used to represent 4-byte AS numbers to speakers
/// that only understand 2-byte AS numbers (RFC 6793).
pub const AS_TRANS: u32 = 23456;

/// Name and id of the unfiltered, never evaluated RIB that retains routes
/// for peers with soft reconfiguration enabled.
pub const RIB_ADJ_IN_NAME: &str = "Adj-RIB-In";
pub const RIB_ADJ_IN: RibId = 0;

/// Name of the RIB peers feed unless configured otherwise.
pub const RIB_LOC_NAME: &str = "Loc-RIB";

pub const COMPONENT_RIB: &str = "rib";
pub const MOD_STORE: &str = "store";
pub const MOD_DB: &str = "database";
pub const MOD_DECISION: &str = "decision";
