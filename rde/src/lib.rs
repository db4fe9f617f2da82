// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The route decision engine. It owns the RIBs, runs import and export
//! policy, selects best paths and tells the session engine and the
//! forwarding plane what changed.

pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod export;
pub mod fanout;
pub mod filter;
pub mod ipc;
pub mod log;
pub mod notification;
pub mod peer;

pub use engine::Rde;

#[cfg(test)]
mod proptest;

use std::time::Duration;

/// How long the event loop waits for input when it has nothing else to do.
pub const IO_TIMEOUT: Duration = Duration::from_millis(100);

/// Prefixes handled per bulk job and events taken per scheduling turn.
pub const RDE_RUNNER_ROUNDS: usize = 100;

/// Default bound of every output channel.
pub const SESSION_CTL_QUEUE_MAX: usize = 10000;

pub const COMPONENT_RDE: &str = "rde";
pub const MOD_ENGINE: &str = "engine";
pub const MOD_CONFIG: &str = "config";
pub const MOD_FANOUT: &str = "fanout";
pub const MOD_CONTROL: &str = "control";
