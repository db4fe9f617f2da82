// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Next hop tracking. Every next hop referenced by a path in an evaluated
//! RIB is tracked here together with what the forwarding plane reported
//! about its reachability.

use crate::types::Addr;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub enum NexthopState {
    /// No answer from the forwarding plane yet.
    Pending,
    Reachable,
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nexthop {
    pub addr: Addr,
    pub state: NexthopState,
    pub cost: u32,
    /// The directly connected gateway the next hop resolves through.
    pub gateway: Option<Addr>,
    pub refs: u64,
}

pub struct NexthopTable {
    entries: BTreeMap<Addr, Nexthop>,
    /// When off, next hops the forwarding plane has not answered for are
    /// treated as reachable at cost 0.
    resolve: bool,
}

impl NexthopTable {
    pub fn new(resolve: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            resolve,
        }
    }

    pub fn set_resolve(&mut self, resolve: bool) {
        self.resolve = resolve;
    }

    /// Count a reference. Returns true when the next hop was not tracked
    /// before and the forwarding plane should be asked about it.
    pub fn reference(&mut self, addr: &Addr) -> bool {
        if let Some(nh) = self.entries.get_mut(addr) {
            nh.refs += 1;
            return false;
        }
        self.entries.insert(
            *addr,
            Nexthop {
                addr: *addr,
                state: NexthopState::Pending,
                cost: 0,
                gateway: None,
                refs: 1,
            },
        );
        true
    }

    /// Drop a reference. Returns true when that was the last one and the
    /// next hop is no longer tracked.
    pub fn unreference(&mut self, addr: &Addr) -> bool {
        let Some(nh) = self.entries.get_mut(addr) else {
            return false;
        };
        nh.refs = nh.refs.saturating_sub(1);
        if nh.refs == 0 {
            self.entries.remove(addr);
            return true;
        }
        false
    }

    /// Record what the forwarding plane reported. Returns true if the
    /// outcome of the decision process may change. Reports for next hops
    /// that are not tracked are ignored.
    pub fn update(
        &mut self,
        addr: &Addr,
        reachable: bool,
        cost: u32,
        gateway: Option<Addr>,
    ) -> bool {
        let resolve = self.resolve;
        let Some(nh) = self.entries.get_mut(addr) else {
            return false;
        };
        let was = (Self::state_reachable(nh.state, resolve), nh.cost);
        nh.state = if reachable {
            NexthopState::Reachable
        } else {
            NexthopState::Unreachable
        };
        nh.cost = cost;
        nh.gateway = gateway;
        was != (reachable, cost)
    }

    fn state_reachable(state: NexthopState, resolve: bool) -> bool {
        match state {
            NexthopState::Reachable => true,
            NexthopState::Unreachable => false,
            NexthopState::Pending => !resolve,
        }
    }

    pub fn reachable(&self, addr: &Addr) -> bool {
        match self.entries.get(addr) {
            Some(nh) => Self::state_reachable(nh.state, self.resolve),
            None => !self.resolve,
        }
    }

    pub fn cost(&self, addr: &Addr) -> u32 {
        match self.entries.get(addr) {
            Some(nh) if nh.state == NexthopState::Reachable => nh.cost,
            _ => 0,
        }
    }

    pub fn get(&self, addr: &Addr) -> Option<&Nexthop> {
        self.entries.get(addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Nexthop> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
