// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Answers to control queries. The engine decides what to walk and when;
//! this module decides what matches and how it is presented.

use crate::ipc::{
    CtlNeighbor, CtlNexthop, CtlResult, CtlRibFlags, CtlShowRib,
    NeighborFilter, RdeMemStats, RibRequest,
};
use crate::peer::Peer;
use rib::attr::PathAttributes;
use rib::nexthop::{Nexthop, NexthopState, NexthopTable};
use rib::{AttrStore, Path, PeerId, Prefix, Rib, PEER_ID_SELF};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// The peer a request is restricted to, if any.
pub fn resolve_peer(
    req: &RibRequest,
    peers: &BTreeMap<PeerId, Peer>,
) -> Result<Option<PeerId>, CtlResult> {
    let by_neighbor = match &req.neighbor {
        None => None,
        Some(NeighborFilter::Addr(a)) => Some(
            peers
                .values()
                .find(|p| p.conf.id != PEER_ID_SELF && p.conf.remote_addr == *a)
                .map(|p| p.conf.id)
                .ok_or(CtlResult::NoSuchPeer)?,
        ),
        Some(NeighborFilter::Descr(d)) => Some(
            peers
                .values()
                .find(|p| p.conf.id != PEER_ID_SELF && p.conf.descr == *d)
                .map(|p| p.conf.id)
                .ok_or(CtlResult::NoSuchPeer)?,
        ),
    };
    let peer = match (req.peer, by_neighbor) {
        (Some(a), Some(b)) if a != b => return Err(CtlResult::NoSuchPeer),
        (Some(id), _) | (None, Some(id)) => {
            if !peers.contains_key(&id) {
                return Err(CtlResult::NoSuchPeer);
            }
            Some(id)
        }
        (None, None) => None,
    };
    if req.flags.adj_out && peer.is_none() {
        return Err(CtlResult::NoSuchPeer);
    }
    Ok(peer)
}

impl RibRequest {
    /// Prefix and family conditions. A prefix without `longer` matches only
    /// itself.
    pub fn matches_prefix(&self, prefix: &Prefix) -> bool {
        if self.aid.is_some_and(|aid| aid != prefix.aid()) {
            return false;
        }
        match &self.prefix {
            None => true,
            Some(want) if self.longer => prefix.within(want),
            Some(want) => want == prefix,
        }
    }

    /// Whether a single lookup answers the request instead of a walk.
    pub fn is_lookup(&self) -> bool {
        self.prefix.is_some() && !self.longer
    }

    /// Attribute conditions, evaluated against a path learned from
    /// `peer`.
    pub fn matches_attrs(&self, attrs: &PathAttributes, peer: &Peer) -> bool {
        if let Some(m) = &self.as_match {
            if !m.matches(attrs, peer.conf.remote_as) {
                return false;
            }
        }
        if let Some(c) = &self.community {
            if !c.matches_any(attrs, peer.conf.remote_as) {
                return false;
            }
        }
        true
    }
}

fn record(
    prefix: Prefix,
    attrs: &PathAttributes,
    flags: CtlRibFlags,
    peer: &Peer,
    lastchange: DateTime<Utc>,
    nexthops: &NexthopTable,
) -> CtlShowRib {
    let exit_nexthop = nexthops
        .get(&attrs.nexthop)
        .and_then(|nh| nh.gateway)
        .unwrap_or(attrs.nexthop);
    let aspath = attrs.as_path.to_wire();
    CtlShowRib {
        true_nexthop: attrs.nexthop,
        exit_nexthop,
        prefix,
        remote_addr: peer.conf.remote_addr,
        descr: peer.conf.descr.clone(),
        lastchange,
        remote_id: peer.session.as_ref().map_or(0, |s| s.remote_bgpid),
        local_pref: attrs.local_pref,
        med: attrs.med.unwrap_or(0),
        weight: attrs.weight,
        flags,
        prefixlen: prefix.length(),
        origin: attrs.origin,
        communities: attrs.communities.iter().copied().collect(),
        aspath_len: u16::try_from(aspath.len()).unwrap_or(u16::MAX),
        aspath,
    }
}

/// Records for the paths of one prefix that match the request.
pub fn rib_records(
    rib: &Rib,
    prefix: &Prefix,
    req: &RibRequest,
    only_peer: Option<PeerId>,
    peers: &BTreeMap<PeerId, Peer>,
    nexthops: &NexthopTable,
) -> Vec<CtlShowRib> {
    let Some(entry) = rib.get(prefix) else {
        return Vec::new();
    };
    let best = entry.best().map(|p| p.id);
    entry
        .paths()
        .filter(|p| only_peer.map_or(true, |id| id == p.peer))
        .filter(|p| !req.flags.active_only || Some(p.id) == best)
        .filter_map(|p: &Path| {
            let peer = peers.get(&p.peer)?;
            if !req.matches_attrs(&p.attrs, peer) {
                return None;
            }
            let flags = CtlRibFlags {
                eligible: p.eligible,
                active: Some(p.id) == best,
                internal: p.peer != PEER_ID_SELF && !peer.conf.is_ebgp(),
                announced: p.peer == PEER_ID_SELF,
                stale: p.stale,
            };
            Some(record(
                *prefix,
                &p.attrs,
                flags,
                peer,
                entry.lastchange(),
                nexthops,
            ))
        })
        .collect()
}

/// The record of a prefix in a peer's Adj-RIB-Out.
pub fn adj_out_record(
    peer: &Peer,
    prefix: &Prefix,
    req: &RibRequest,
    nexthops: &NexthopTable,
) -> Option<CtlShowRib> {
    let attrs = peer.adj_out.get(prefix)?;
    if !req.matches_attrs(attrs, peer) {
        return None;
    }
    let flags = CtlRibFlags {
        eligible: true,
        active: true,
        internal: !peer.conf.is_ebgp(),
        announced: true,
        stale: false,
    };
    Some(record(*prefix, attrs, flags, peer, peer.lastchange, nexthops))
}

pub fn neighbor_record(peer: &Peer) -> CtlNeighbor {
    CtlNeighbor {
        id: peer.conf.id,
        descr: peer.conf.descr.clone(),
        remote_addr: peer.conf.remote_addr,
        remote_as: peer.conf.remote_as,
        state: peer.state,
        lastchange: peer.lastchange,
        prefix_count: peer.prefixes.len() as u64,
        adj_out_count: peer.adj_out.len() as u64,
        stats: peer.stats,
    }
}

pub fn nexthop_record(nh: &Nexthop, nexthops: &NexthopTable) -> CtlNexthop {
    CtlNexthop {
        addr: nh.addr,
        reachable: nexthops.reachable(&nh.addr),
        cost: match nh.state {
            NexthopState::Reachable => nh.cost,
            _ => 0,
        },
        gateway: nh.gateway,
        refs: nh.refs,
    }
}

pub fn mem_stats<'a>(
    ribs: impl Iterator<Item = &'a Rib>,
    peers: &BTreeMap<PeerId, Peer>,
    nexthops: &NexthopTable,
    store: &AttrStore,
) -> RdeMemStats {
    let mut stats = RdeMemStats {
        peers: peers.keys().filter(|id| **id != PEER_ID_SELF).count() as u64,
        nexthops: nexthops.len() as u64,
        adj_out_prefixes: peers.values().map(|p| p.adj_out.len() as u64).sum(),
        attrs: store.stats(),
        ..Default::default()
    };
    for rib in ribs {
        stats.rib_count += 1;
        stats.rib_entries += rib.prefix_count() as u64;
        stats.paths += rib.path_count() as u64;
    }
    stats
}
