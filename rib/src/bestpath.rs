// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::db::{Path, RibEntry};
use crate::types::{Addr, PeerId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Knobs that alter individual steps of the decision process.
#[derive(
    Debug,
    Copy,
    Clone,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(default)]
pub struct DecisionFlags {
    /// Prefer the older of two otherwise equal paths.
    pub route_age: bool,
    /// Compare MED between paths from different neighbor ASes.
    pub med_always: bool,
    /// Skip the AS path length step.
    pub ignore_aspath_len: bool,
}

/// The properties of the peer a path was learned from that take part in
/// the decision.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub ebgp: bool,
    pub bgp_id: u32,
    pub addr: Addr,
}

/// Lookups the decision process needs from the engine.
pub trait DecisionContext {
    fn peer_info(&self, peer: PeerId) -> PeerInfo;
    fn igp_cost(&self, nexthop: &Addr) -> u32;
}

pub struct Candidate<'a> {
    pub path: &'a Path,
    pub peer: PeerInfo,
    pub igp_cost: u32,
}

impl<'a> Candidate<'a> {
    pub fn new<C: DecisionContext>(path: &'a Path, ctx: &C) -> Self {
        Self {
            path,
            peer: ctx.peer_info(path.peer),
            igp_cost: ctx.igp_cost(&path.attrs.nexthop),
        }
    }
}

fn med_comparable(a: &Candidate, b: &Candidate, flags: &DecisionFlags) -> bool {
    flags.med_always
        || a.path.attrs.as_path.neighbor_as() == b.path.attrs.as_path.neighbor_as()
}

/// Order two candidates. `Less` means `a` is preferred. Criteria, first
/// difference wins:
///
/// - eligible over ineligible
/// - highest local preference
/// - shortest AS path, unless `ignore_aspath_len`
/// - lowest origin
/// - lowest MED, only within the same neighbor AS unless `med_always`
/// - external over internal peers
/// - lowest IGP cost to the next hop
/// - oldest path, if `route_age`
/// - lowest peer BGP identifier
/// - lowest peer address
/// - lowest peer id
pub fn compare(a: &Candidate, b: &Candidate, flags: &DecisionFlags) -> Ordering {
    let (aa, ba) = (&a.path.attrs, &b.path.attrs);

    b.path
        .eligible
        .cmp(&a.path.eligible)
        .then_with(|| ba.local_pref.cmp(&aa.local_pref))
        .then_with(|| {
            if flags.ignore_aspath_len {
                Ordering::Equal
            } else {
                aa.as_path.length().cmp(&ba.as_path.length())
            }
        })
        .then_with(|| aa.origin.cmp(&ba.origin))
        .then_with(|| {
            if med_comparable(a, b, flags) {
                aa.med.unwrap_or(0).cmp(&ba.med.unwrap_or(0))
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| b.peer.ebgp.cmp(&a.peer.ebgp))
        .then_with(|| a.igp_cost.cmp(&b.igp_cost))
        .then_with(|| {
            if flags.route_age {
                a.path.received.cmp(&b.path.received)
            } else {
                Ordering::Equal
            }
        })
        .then_with(|| a.peer.bgp_id.cmp(&b.peer.bgp_id))
        .then_with(|| a.peer.addr.cmp(&b.peer.addr))
        .then_with(|| a.path.peer.cmp(&b.path.peer))
}

/// Pick the best path of `entry`. Candidates are scanned in peer id order
/// and the incumbent is only displaced by a strictly preferred path, so
/// the result is deterministic even though MED makes the order partial.
/// Returns `None` when no candidate is eligible.
pub fn select<C: DecisionContext>(
    entry: &RibEntry,
    ctx: &C,
    flags: &DecisionFlags,
) -> Option<PeerId> {
    entry
        .paths()
        .filter(|p| p.eligible)
        .map(|p| Candidate::new(p, ctx))
        .reduce(|best, c| {
            if compare(&c, &best, flags) == Ordering::Less {
                c
            } else {
                best
            }
        })
        .map(|c| c.path.peer)
}
