// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Engine configuration. A running engine holds one immutable
//! [`RdeConfig`]; a reconfiguration assembles a new one in a
//! [`ConfigBuilder`] and swaps it in as a whole.

use crate::error::Error;
use crate::filter::{FilterRule, PeerSelector, SetAction, Verdict};
use crate::ipc::ReconfEvent;
use crate::peer::PeerConfig;
use crate::{RDE_RUNNER_ROUNDS, SESSION_CTL_QUEUE_MAX};
use rib::attr::{ExtCommunity, PathAttributes};
use rib::bestpath::DecisionFlags;
use rib::store::DEFAULT_ATTR_LIMIT;
use rib::{
    Prefix, PrefixVpn4, RibFlags, PEER_ID_SELF, RIB_ADJ_IN_NAME, RIB_LOC_NAME,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
#[serde(default)]
pub struct Limits {
    /// Distinct attribute sets the store may hold.
    pub attr_max: usize,
    /// Prefixes per bulk job step and events per scheduling turn.
    pub runner_rounds: usize,
    /// Bound of every output channel.
    pub ctl_queue_max: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            attr_max: DEFAULT_ATTR_LIMIT,
            runner_rounds: RDE_RUNNER_ROUNDS,
            ctl_queue_max: SESSION_CTL_QUEUE_MAX,
        }
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct GlobalConfig {
    pub asn: u32,
    pub bgpid: u32,
    /// Set to act as a route reflector.
    #[serde(default)]
    pub clusterid: Option<u32>,
    #[serde(default)]
    pub flags: DecisionFlags,
    /// Require the forwarding plane to confirm next hops before paths
    /// using them become eligible.
    #[serde(default)]
    pub nexthop_resolve: bool,
    #[serde(default)]
    pub limits: Limits,
}

impl GlobalConfig {
    pub fn new(asn: u32, bgpid: u32) -> Self {
        Self {
            asn,
            bgpid,
            clusterid: None,
            flags: DecisionFlags::default(),
            nexthop_resolve: false,
            limits: Limits::default(),
        }
    }
}

fn allow() -> Verdict {
    Verdict::Allow
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct RibConfig {
    pub name: String,
    #[serde(default)]
    pub rtableid: u32,
    #[serde(default)]
    pub flags: RibFlags,
    /// Verdict of the import chain when no rule matched.
    #[serde(default = "allow")]
    pub default_import: Verdict,
    #[serde(default = "allow")]
    pub default_export: Verdict,
}

impl RibConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rtableid: 0,
            flags: RibFlags::default(),
            default_import: Verdict::Allow,
            default_export: Verdict::Allow,
        }
    }
}

/// A locally originated prefix.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct NetworkConfig {
    pub prefix: Prefix,
    /// Routing table the network belongs to. A table that belongs to an
    /// rdomain turns the network into a VPN route of that rdomain.
    #[serde(default)]
    pub rtableid: u32,
    #[serde(default)]
    pub attrs: PathAttributes,
    #[serde(default)]
    pub set: Vec<SetAction>,
}

impl NetworkConfig {
    pub fn new(prefix: Prefix) -> Self {
        Self {
            prefix,
            rtableid: 0,
            attrs: PathAttributes::default(),
            set: Vec::new(),
        }
    }
}

/// A VPN routing domain: routes carrying one of the import targets are
/// installed into `rtableid`; networks of `rtableid` are announced with
/// the route distinguisher and export actions.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct RdomainConfig {
    #[serde(default)]
    pub descr: String,
    pub rd: u64,
    pub rtableid: u32,
    #[serde(default)]
    pub label: u32,
    #[serde(default)]
    pub import_targets: BTreeSet<ExtCommunity>,
    #[serde(default)]
    pub export: Vec<SetAction>,
}

impl RdomainConfig {
    pub fn imports(&self, attrs: &PathAttributes) -> bool {
        attrs
            .ext_communities
            .iter()
            .any(|c| self.import_targets.contains(c))
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct RdeConfig {
    pub global: GlobalConfig,
    #[serde(default)]
    pub ribs: Vec<RibConfig>,
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    #[serde(default)]
    pub filters: Vec<FilterRule>,
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
    #[serde(default)]
    pub rdomains: Vec<RdomainConfig>,
}

impl RdeConfig {
    /// A configuration with no RIBs, peers or policy. Only useful as the
    /// starting point of an engine that has not been configured yet.
    pub fn empty(global: GlobalConfig) -> Self {
        Self {
            global,
            ribs: Vec::new(),
            peers: Vec::new(),
            filters: Vec::new(),
            networks: Vec::new(),
            rdomains: Vec::new(),
        }
    }

    pub fn from_json(s: &str) -> Result<Self, Error> {
        let raw: RdeConfig = serde_json::from_str(s)?;
        raw.validated()
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let s = std::fs::read_to_string(path)?;
        Self::from_json(&s)
    }

    /// Run this configuration through the same checks a reconfiguration
    /// applies.
    pub fn validated(self) -> Result<Self, Error> {
        let mut b = ConfigBuilder::new(self.global);
        for r in self.ribs {
            b.rib(r)?;
        }
        for p in self.peers {
            b.peer(p)?;
        }
        for f in self.filters {
            b.filter(f)?;
        }
        for n in self.networks {
            b.network(n)?;
        }
        for d in self.rdomains {
            b.rdomain(d)?;
        }
        b.finish()
    }

    /// The reconfiguration transaction that installs this configuration.
    pub fn reconf_events(&self) -> Vec<ReconfEvent> {
        let mut out = vec![ReconfEvent::Begin(self.global.clone())];
        out.extend(self.ribs.iter().cloned().map(ReconfEvent::Rib));
        out.extend(self.peers.iter().cloned().map(ReconfEvent::Peer));
        out.extend(self.filters.iter().cloned().map(ReconfEvent::Filter));
        out.extend(self.networks.iter().cloned().map(ReconfEvent::Network));
        out.extend(self.rdomains.iter().cloned().map(ReconfEvent::Rdomain));
        out.push(ReconfEvent::Done);
        out
    }

    pub fn rib(&self, name: &str) -> Option<&RibConfig> {
        self.ribs.iter().find(|r| r.name == name)
    }

    pub fn peer(&self, id: u32) -> Option<&PeerConfig> {
        self.peers.iter().find(|p| p.id == id)
    }

    pub fn rdomain_for_table(&self, rtableid: u32) -> Option<&RdomainConfig> {
        self.rdomains.iter().find(|d| d.rtableid == rtableid)
    }

    /// The prefix a network is announced as. Networks of an rdomain's
    /// table become VPN prefixes with that rdomain's route distinguisher.
    pub fn network_prefix(&self, prefix: &Prefix, rtableid: u32) -> Prefix {
        match (prefix, self.rdomain_for_table(rtableid)) {
            (Prefix::V4(p), Some(d)) if rtableid != 0 => {
                Prefix::Vpn4(PrefixVpn4 {
                    rd: d.rd,
                    prefix: *p,
                })
            }
            _ => *prefix,
        }
    }
}

/// A reconfiguration in progress.
pub struct ConfigBuilder {
    config: RdeConfig,
}

impl ConfigBuilder {
    pub fn new(global: GlobalConfig) -> Self {
        Self {
            config: RdeConfig::empty(global),
        }
    }

    pub fn rib(&mut self, rib: RibConfig) -> Result<(), Error> {
        if rib.name.is_empty() || rib.name == RIB_ADJ_IN_NAME {
            return Err(Error::Config(format!("invalid rib name {:?}", rib.name)));
        }
        if self.config.rib(&rib.name).is_some() {
            return Err(Error::Config(format!("duplicate rib {}", rib.name)));
        }
        self.config.ribs.push(rib);
        Ok(())
    }

    pub fn peer(&mut self, mut peer: PeerConfig) -> Result<(), Error> {
        if peer.id == PEER_ID_SELF {
            return Err(Error::Config("peer id 0 is reserved".into()));
        }
        if self.config.peer(peer.id).is_some() {
            return Err(Error::Config(format!("duplicate peer {}", peer.id)));
        }
        if peer.remote_as == 0 {
            return Err(Error::Config(format!(
                "peer {} has no remote as",
                peer.id
            )));
        }
        if peer.local_as == 0 {
            peer.local_as = self.config.global.asn;
        }
        self.config.peers.push(peer);
        Ok(())
    }

    pub fn filter(&mut self, rule: FilterRule) -> Result<(), Error> {
        for s in &rule.set {
            s.check().map_err(Error::Config)?;
        }
        self.config.filters.push(rule);
        Ok(())
    }

    pub fn network(&mut self, mut network: NetworkConfig) -> Result<(), Error> {
        network.prefix.unset_host_bits();
        if !network.prefix.valid_for_rib() {
            return Err(Error::Config(format!(
                "invalid network {}",
                network.prefix
            )));
        }
        for s in &network.set {
            s.check().map_err(Error::Config)?;
        }
        let dup = self.config.networks.iter().any(|n| {
            n.prefix == network.prefix && n.rtableid == network.rtableid
        });
        if dup {
            return Err(Error::Config(format!(
                "duplicate network {}",
                network.prefix
            )));
        }
        self.config.networks.push(network);
        Ok(())
    }

    pub fn rdomain(&mut self, rdomain: RdomainConfig) -> Result<(), Error> {
        if rdomain.rtableid == 0 {
            return Err(Error::Config("rdomain on routing table 0".into()));
        }
        let dup = self.config.rdomains.iter().any(|d| {
            d.rd == rdomain.rd || d.rtableid == rdomain.rtableid
        });
        if dup {
            return Err(Error::Config(format!(
                "duplicate rdomain {}",
                rdomain.rtableid
            )));
        }
        for s in &rdomain.export {
            s.check().map_err(Error::Config)?;
        }
        self.config.rdomains.push(rdomain);
        Ok(())
    }

    /// Check the assembled configuration as a whole and hand it out.
    pub fn finish(self) -> Result<RdeConfig, Error> {
        let mut config = self.config;
        if config.global.asn == 0 {
            return Err(Error::Config("no local as".into()));
        }
        if config.global.limits.runner_rounds == 0
            || config.global.limits.ctl_queue_max == 0
        {
            return Err(Error::Config("limits must not be zero".into()));
        }
        if config.rib(RIB_LOC_NAME).is_none() {
            config.ribs.insert(0, RibConfig::new(RIB_LOC_NAME));
        }
        for p in &config.peers {
            if config.rib(&p.rib).is_none() {
                return Err(Error::Config(format!(
                    "peer {} uses unknown rib {}",
                    p.id, p.rib
                )));
            }
        }
        for f in &config.filters {
            if let Some(r) = &f.rib {
                if config.rib(r).is_none() {
                    return Err(Error::Config(format!(
                        "filter uses unknown rib {r}"
                    )));
                }
            }
            if let PeerSelector::Peer(id) = f.peer {
                if config.peer(id).is_none() {
                    return Err(Error::Config(format!(
                        "filter uses unknown peer {id}"
                    )));
                }
            }
        }
        Ok(config)
    }
}
