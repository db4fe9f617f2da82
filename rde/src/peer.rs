// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::filter::{FilterChain, FilterPeer};
use chrono::{DateTime, Utc};
use rib::attr::PathAttributes;
use rib::{Addr, Aid, PeerId, Prefix, RibId, PEER_ID_SELF, RIB_LOC_NAME};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::ops::Bound;
use std::sync::Arc;

#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(default)]
pub struct GracefulRestart {
    pub restart: bool,
    pub timeout: u16,
    /// Families for which forwarding state is preserved across a restart.
    pub forwarding: BTreeSet<Aid>,
}

#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(default)]
pub struct Capabilities {
    /// Multiprotocol families. Empty means only IPv4 unicast.
    pub mp: BTreeSet<Aid>,
    pub refresh: bool,
    pub as4byte: bool,
    pub grestart: GracefulRestart,
}

impl Capabilities {
    pub fn supports(&self, aid: Aid) -> bool {
        if self.mp.is_empty() {
            aid == Aid::Inet
        } else {
            self.mp.contains(&aid)
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(default)]
pub struct PeerFlags {
    /// Do not prepend the local AS toward this peer and accept paths from
    /// it that already contain the local AS.
    pub transparent_as: bool,
    /// Keep an unfiltered copy of everything the peer sends so import
    /// policy can be re-run without a route refresh.
    pub softreconfig_in: bool,
}

fn default_rib() -> String {
    RIB_LOC_NAME.to_string()
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct PeerConfig {
    pub id: PeerId,
    #[serde(default)]
    pub descr: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub groupid: u32,
    pub remote_addr: Addr,
    #[serde(default)]
    pub local_addr: Addr,
    pub remote_as: u32,
    /// The AS presented to this peer. Zero selects the global AS.
    #[serde(default)]
    pub local_as: u32,
    #[serde(default = "default_rib")]
    pub rib: String,
    /// Capabilities announced to the peer.
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub reflector_client: bool,
    #[serde(default)]
    pub flags: PeerFlags,
    #[serde(default)]
    pub enforce_first_as: bool,
    #[serde(default)]
    pub max_prefix: Option<u32>,
}

impl PeerConfig {
    pub fn new(id: PeerId, remote_addr: Addr, remote_as: u32) -> Self {
        Self {
            id,
            descr: String::new(),
            group: String::new(),
            groupid: 0,
            remote_addr,
            local_addr: Addr::Unspec,
            remote_as,
            local_as: 0,
            rib: default_rib(),
            capabilities: Capabilities::default(),
            reflector_client: false,
            flags: PeerFlags::default(),
            enforce_first_as: false,
            max_prefix: None,
        }
    }

    pub fn is_ebgp(&self) -> bool {
        self.remote_as != self.local_as
    }
}

/// What the session engine learned when the session came up.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[serde(default)]
pub struct SessionInfo {
    /// Negotiated capabilities.
    pub capabilities: Capabilities,
    pub remote_bgpid: u32,
    pub remote_addr: Addr,
    pub local_v4: Addr,
    pub local_v6: Addr,
}

impl SessionInfo {
    /// The local address used as next hop for routes of `aid`.
    pub fn local_addr(&self, aid: Aid) -> Addr {
        match aid {
            Aid::Inet6 => self.local_v6,
            _ => self.local_v4,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub enum PeerState {
    Down,
    Up,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct PeerStats {
    pub prefix_rcvd_update: u64,
    pub prefix_rcvd_withdraw: u64,
    pub prefix_sent_update: u64,
    pub prefix_sent_withdraw: u64,
    pub update_errors: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjOutMessage {
    Update(Prefix, Arc<PathAttributes>),
    Withdraw(Prefix),
}

/// What a peer should have (`desired`) against what it was told (`sent`).
/// Changes are queued as prefix references and turned into messages only
/// when the peer's channel has room, so repeated changes to a prefix
/// collapse into one message.
#[derive(Default)]
pub struct AdjRibOut {
    desired: BTreeMap<Prefix, Arc<PathAttributes>>,
    sent: BTreeMap<Prefix, Arc<PathAttributes>>,
    pending: VecDeque<Prefix>,
    queued: HashSet<Prefix>,
}

impl AdjRibOut {
    pub fn set(&mut self, prefix: Prefix, attrs: Option<Arc<PathAttributes>>) {
        match attrs {
            Some(a) => {
                self.desired.insert(prefix, a);
            }
            None => {
                self.desired.remove(&prefix);
            }
        }
        self.mark(prefix);
    }

    fn mark(&mut self, prefix: Prefix) {
        if self.queued.insert(prefix) {
            self.pending.push_back(prefix);
        }
    }

    /// The next message that brings the peer closer to the desired state.
    pub fn next_message(&mut self) -> Option<AdjOutMessage> {
        while let Some(prefix) = self.pending.pop_front() {
            self.queued.remove(&prefix);
            match self.desired.get(&prefix).cloned() {
                Some(want) => {
                    let unchanged = self.sent.get(&prefix).is_some_and(|have| {
                        Arc::ptr_eq(have, &want) || *have == want
                    });
                    if unchanged {
                        continue;
                    }
                    self.sent.insert(prefix, want.clone());
                    return Some(AdjOutMessage::Update(prefix, want));
                }
                None => {
                    if self.sent.remove(&prefix).is_some() {
                        return Some(AdjOutMessage::Withdraw(prefix));
                    }
                }
            }
        }
        None
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Send everything of `aid` again, as after a route refresh request.
    pub fn resend(&mut self, aid: Aid) {
        let prefixes: Vec<Prefix> = self
            .desired
            .keys()
            .filter(|p| p.aid() == aid)
            .copied()
            .collect();
        for p in prefixes {
            self.sent.remove(&p);
            self.mark(p);
        }
    }

    pub fn clear(&mut self) {
        self.desired.clear();
        self.sent.clear();
        self.pending.clear();
        self.queued.clear();
    }

    pub fn get(&self, prefix: &Prefix) -> Option<&Arc<PathAttributes>> {
        self.desired.get(prefix)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Prefix, &Arc<PathAttributes>)> {
        self.desired.iter()
    }

    /// Up to `limit` announced prefixes following `cursor`.
    pub fn prefixes_after(
        &self,
        cursor: Option<&Prefix>,
        limit: usize,
    ) -> Vec<Prefix> {
        let range = match cursor {
            Some(c) => self
                .desired
                .range((Bound::Excluded(*c), Bound::Unbounded)),
            None => self.desired.range::<Prefix, _>(..),
        };
        range.map(|(p, _)| *p).take(limit).collect()
    }

    pub fn len(&self) -> usize {
        self.desired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.desired.is_empty()
    }
}

pub struct Peer {
    pub conf: PeerConfig,
    pub rib: RibId,
    pub import: Arc<FilterChain>,
    pub export: Arc<FilterChain>,
    pub state: PeerState,
    pub session: Option<SessionInfo>,
    /// Prefixes the peer currently announces, before import policy.
    pub prefixes: BTreeSet<Prefix>,
    pub adj_out: AdjRibOut,
    pub stats: PeerStats,
    pub lastchange: DateTime<Utc>,
    /// Set when the peer went into graceful restart.
    pub staletime: Option<DateTime<Utc>>,
    /// Prefixes not yet announced again since the restart began.
    pub stale: BTreeSet<Prefix>,
}

impl Peer {
    pub fn new(conf: PeerConfig, rib: RibId) -> Self {
        Self {
            conf,
            rib,
            import: Arc::new(FilterChain::default()),
            export: Arc::new(FilterChain::default()),
            state: PeerState::Down,
            session: None,
            prefixes: BTreeSet::new(),
            adj_out: AdjRibOut::default(),
            stats: PeerStats::default(),
            lastchange: Utc::now(),
            staletime: None,
            stale: BTreeSet::new(),
        }
    }

    /// The pseudo-peer that locally originated networks belong to.
    pub fn local(asn: u32) -> Self {
        let mut conf = PeerConfig::new(PEER_ID_SELF, Addr::Unspec, asn);
        conf.local_as = asn;
        conf.descr = "LOCAL".to_string();
        Self::new(conf, 0)
    }

    pub fn is_up(&self) -> bool {
        self.state == PeerState::Up
    }

    /// Whether the session negotiated `aid`.
    pub fn supports(&self, aid: Aid) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.capabilities.supports(aid))
    }

    pub fn filter_peer(&self) -> FilterPeer {
        FilterPeer {
            id: self.conf.id,
            remote_as: self.conf.remote_as,
            local_as: self.conf.local_as,
            remote_addr: self.conf.remote_addr,
            ebgp: self.conf.is_ebgp(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use rde_common::cidr;

    fn attrs(lp: u32) -> Arc<PathAttributes> {
        Arc::new(PathAttributes {
            local_pref: lp,
            ..Default::default()
        })
    }

    #[test]
    fn test_adj_out_coalesces() {
        let mut out = AdjRibOut::default();
        let p: Prefix = cidr!("10.0.0.0/24");

        out.set(p, Some(attrs(100)));
        out.set(p, Some(attrs(200)));
        assert_eq!(
            out.next_message(),
            Some(AdjOutMessage::Update(p, attrs(200)))
        );
        assert_eq!(out.next_message(), None);

        // announce then withdraw before sending: nothing new to say
        let q: Prefix = cidr!("10.0.1.0/24");
        out.set(q, Some(attrs(100)));
        out.set(q, None);
        assert_eq!(out.next_message(), None);

        // unchanged content is not resent
        out.set(p, Some(attrs(200)));
        assert_eq!(out.next_message(), None);

        out.set(p, None);
        assert_eq!(out.next_message(), Some(AdjOutMessage::Withdraw(p)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_adj_out_resend() {
        let mut out = AdjRibOut::default();
        let v4: Prefix = cidr!("10.0.0.0/24");
        let v6: Prefix = cidr!("2001:db8::/32");
        out.set(v4, Some(attrs(100)));
        out.set(v6, Some(attrs(100)));
        while out.next_message().is_some() {}

        out.resend(Aid::Inet6);
        assert_eq!(
            out.next_message(),
            Some(AdjOutMessage::Update(v6, attrs(100)))
        );
        assert!(!out.has_pending());
    }

    #[test]
    fn test_capabilities_default_to_ipv4() {
        let c = Capabilities::default();
        assert!(c.supports(Aid::Inet));
        assert!(!c.supports(Aid::Inet6));
        let c = Capabilities {
            mp: [Aid::Inet6].into_iter().collect(),
            ..Default::default()
        };
        assert!(!c.supports(Aid::Inet));
        assert!(c.supports(Aid::Inet6));
    }
}
