// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Messages exchanged between the decision engine and its collaborators:
//! the session engine, the forwarding plane and control clients. Inbound
//! events from one peer are processed in the order they are received.

use crate::config::{
    GlobalConfig, NetworkConfig, RdomainConfig, RibConfig,
};
use crate::filter::{AsMatch, CommunityPattern, FilterRule};
use crate::notification::Notification;
use crate::peer::{PeerConfig, PeerState, PeerStats, SessionInfo};
use chrono::{DateTime, Utc};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use rib::attr::{Community, NexthopMode, Origin, PathAttributes};
use rib::store::StoreStats;
use rib::{Addr, Aid, PeerId, Prefix};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RdeEvent {
    /// Announce `prefixes` from `peer` with one attribute set.
    Update {
        peer: PeerId,
        prefixes: Vec<Prefix>,
        attrs: PathAttributes,
    },
    Withdraw {
        peer: PeerId,
        prefixes: Vec<Prefix>,
    },
    /// The session engine rejected an update from the peer.
    UpdateError {
        peer: PeerId,
        notification: Notification,
    },
    SessionUp {
        peer: PeerId,
        session: SessionInfo,
    },
    SessionDown {
        peer: PeerId,
    },
    /// The peer went into graceful restart. Its paths are kept but marked
    /// stale until it comes back or the restart timer fires.
    SessionStale {
        peer: PeerId,
    },
    /// Remove whatever is still stale for the peer.
    SessionFlush {
        peer: PeerId,
    },
    /// The peer asked for our routes of `aid` again.
    RouteRefresh {
        peer: PeerId,
        aid: Aid,
    },
    NetworkAdd(NetworkConfig),
    NetworkRemove {
        prefix: Prefix,
        #[serde(default)]
        rtableid: u32,
    },
    /// Remove all networks that were not configured.
    NetworkFlush,
    NexthopUpdate(NexthopUpdate),
    Reconf(ReconfEvent),
    Control(ControlRequest),
    Shutdown,
}

/// Reachability of a next hop as seen by the forwarding plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NexthopUpdate {
    pub nexthop: Addr,
    pub valid: bool,
    #[serde(default)]
    pub cost: u32,
    #[serde(default)]
    pub gateway: Option<Addr>,
}

/// One step of a reconfiguration transaction. Nothing takes effect until
/// `Done`; `Abort` or any failure leaves the running configuration as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReconfEvent {
    Begin(GlobalConfig),
    Rib(RibConfig),
    Peer(PeerConfig),
    Filter(FilterRule),
    Network(NetworkConfig),
    Rdomain(RdomainConfig),
    Done,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ControlRequest {
    pub client: u32,
    pub query: ControlQuery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ControlQuery {
    ShowRib(RibRequest),
    ShowNeighbor {
        #[serde(default)]
        peer: Option<PeerId>,
    },
    ShowNexthop,
    ShowMemory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum NeighborFilter {
    Addr(Addr),
    Descr(String),
}

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
pub struct RibRequestFlags {
    /// Only best paths.
    pub active_only: bool,
    /// Show the unfiltered Adj-RIB-In instead of a Loc-RIB.
    pub adj_in: bool,
    /// Show what is announced to the selected neighbor.
    pub adj_out: bool,
}

#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(default)]
pub struct RibRequest {
    /// Loc-RIB name, the default RIB when unset.
    pub rib: Option<String>,
    pub neighbor: Option<NeighborFilter>,
    pub prefix: Option<Prefix>,
    /// With `prefix`, show it and all more specific prefixes.
    pub longer: bool,
    pub as_match: Option<AsMatch>,
    pub community: Option<CommunityPattern>,
    pub peer: Option<PeerId>,
    pub flags: RibRequestFlags,
    pub aid: Option<Aid>,
}

#[derive(
    Debug,
    PartialEq,
    Eq,
    Clone,
    Copy,
    TryFromPrimitive,
    IntoPrimitive,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[repr(u8)]
pub enum CtlResult {
    Ok = 0,
    NoSuchPeer,
    Denied,
    NoCap,
    ParseError,
    Pending,
    NoMem,
}

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
pub struct CtlRibFlags {
    pub eligible: bool,
    pub active: bool,
    pub internal: bool,
    pub announced: bool,
    pub stale: bool,
}

/// One path as shown to control clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CtlShowRib {
    pub true_nexthop: Addr,
    pub exit_nexthop: Addr,
    pub prefix: Prefix,
    pub remote_addr: Addr,
    pub descr: String,
    pub lastchange: DateTime<Utc>,
    pub remote_id: u32,
    pub local_pref: u32,
    pub med: u32,
    pub weight: u32,
    pub flags: CtlRibFlags,
    pub prefixlen: u8,
    pub origin: Origin,
    pub communities: Vec<Community>,
    /// Byte length of `aspath`.
    pub aspath_len: u16,
    /// AS path in 4-byte wire encoding.
    pub aspath: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CtlNeighbor {
    pub id: PeerId,
    pub descr: String,
    pub remote_addr: Addr,
    pub remote_as: u32,
    pub state: PeerState,
    pub lastchange: DateTime<Utc>,
    pub prefix_count: u64,
    pub adj_out_count: u64,
    pub stats: PeerStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CtlNexthop {
    pub addr: Addr,
    pub reachable: bool,
    pub cost: u32,
    pub gateway: Option<Addr>,
    pub refs: u64,
}

#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct RdeMemStats {
    pub rib_count: u64,
    pub rib_entries: u64,
    pub paths: u64,
    pub peers: u64,
    pub nexthops: u64,
    pub adj_out_prefixes: u64,
    pub attrs: StoreStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ControlResponse {
    Rib(CtlShowRib),
    Neighbor(CtlNeighbor),
    Nexthop(CtlNexthop),
    Memory(RdeMemStats),
    /// Terminates a successful response.
    End,
    /// Terminates a failed request.
    Result(CtlResult),
}

/// A route change for the forwarding plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct KrouteUpdate {
    pub rtableid: u32,
    pub prefix: Prefix,
    pub nexthop: Addr,
    pub mode: NexthopMode,
    #[serde(default)]
    pub rtlabel: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReconfResult {
    pub result: CtlResult,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RdeOutput {
    Update {
        peer: PeerId,
        prefix: Prefix,
        attrs: Arc<PathAttributes>,
    },
    Withdraw {
        peer: PeerId,
        prefix: Prefix,
    },
    Notify {
        peer: PeerId,
        notification: Notification,
    },
    /// Ask the peer to send its routes of `aid` again.
    RouteRefresh {
        peer: PeerId,
        aid: Aid,
    },
    KrouteChange(KrouteUpdate),
    KrouteDelete {
        rtableid: u32,
        prefix: Prefix,
    },
    /// Start tracking reachability of a next hop.
    NexthopAdd(Addr),
    NexthopRemove(Addr),
    PftableAdd {
        table: String,
        prefix: Prefix,
    },
    PftableRemove {
        table: String,
        prefix: Prefix,
    },
    PftableCommit,
    ReconfResult(ReconfResult),
    Control {
        client: u32,
        response: ControlResponse,
    },
}

impl RdeOutput {
    /// A bounded output channel.
    pub fn channel(bound: usize) -> (SyncSender<RdeOutput>, Receiver<RdeOutput>) {
        sync_channel(bound)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use rde_common::cidr;

    #[test]
    fn test_event_json() {
        let ev = RdeEvent::Withdraw {
            peer: 3,
            prefixes: vec![cidr!("10.0.0.0/24")],
        };
        let s = serde_json::to_string(&ev).unwrap();
        let back: RdeEvent = serde_json::from_str(&s).unwrap();
        assert_eq!(ev, back);

        let ev: RdeEvent = serde_json::from_str(r#""network_flush""#).unwrap();
        assert_eq!(ev, RdeEvent::NetworkFlush);
    }

    #[test]
    fn test_ctl_result_codes() {
        assert_eq!(u8::from(CtlResult::Ok), 0);
        assert_eq!(u8::from(CtlResult::NoMem), 6);
        assert_eq!(CtlResult::try_from(4u8).unwrap(), CtlResult::ParseError);
        assert!(CtlResult::try_from(7u8).is_err());
    }
}
