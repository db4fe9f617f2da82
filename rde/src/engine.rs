// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The decision engine event loop.
//!
//! One thread owns all routing state and handles one event at a time.
//! Every change to a prefix is a single recomputation: the best path is
//! snapshotted, the candidate set changed, the decision process run and,
//! if the selection changed, the forwarding plane and every affected
//! Adj-RIB-Out updated before the next event is looked at.
//!
//! Work that touches many prefixes (dumps after a session comes up,
//! policy reloads, next hop changes, control dumps) runs as jobs that
//! advance a bounded number of prefixes per turn so that events keep
//! flowing while they run.

use crate::config::{ConfigBuilder, NetworkConfig, RdeConfig, RdomainConfig};
use crate::control;
use crate::error::Error;
use crate::export::{export_path, ExportContext};
use crate::fanout::{Channel, Fanout};
use crate::filter::{apply_set, Direction, FilterChain, Verdict};
use crate::ipc::{
    ControlQuery, ControlRequest, ControlResponse, CtlResult, KrouteUpdate,
    NexthopUpdate, RdeEvent, RdeOutput, ReconfEvent, ReconfResult, RibRequest,
};
use crate::log::{peer_log, rde_log};
use crate::notification::{CeaseErrorSubcode, Notification};
use crate::peer::{AdjOutMessage, Peer, PeerState, SessionInfo};
use crate::{IO_TIMEOUT, MOD_CONFIG, MOD_CONTROL, MOD_ENGINE};
use chrono::Utc;
use rib::attr::{validate, AttrError, PathAttributes, ValidationContext};
use rib::bestpath::{DecisionContext, PeerInfo};
use rib::db::Selection;
use rib::nexthop::NexthopTable;
use rib::{
    Addr, Aid, AttrHandle, AttrStore, Path, PeerId, Prefix, Rib, RibFlags, RibId,
    PEER_ID_SELF, RIB_ADJ_IN, RIB_ADJ_IN_NAME, RIB_LOC_NAME,
};
use slog::Logger;
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ops::Bound;
use std::sync::mpsc::{
    Receiver, RecvTimeoutError, SyncSender, TryRecvError,
};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
enum DumpSource {
    Rib(RibId),
    AdjOut(PeerId),
}

#[derive(Debug, Clone)]
enum Job {
    /// Fill the Adj-RIB-Out of a peer from its RIB.
    PeerDump { peer: PeerId, cursor: Option<Prefix> },
    /// Run import policy again over the routes a peer sent.
    SoftReconfigIn { peer: PeerId, cursor: Option<Prefix> },
    /// Run the decision process again, for paths through `nexthop` only if
    /// one is given.
    Reevaluate {
        rib: RibId,
        nexthop: Option<Addr>,
        cursor: Option<Prefix>,
    },
    RibDump {
        client: u32,
        req: Box<RibRequest>,
        source: DumpSource,
        peer: Option<PeerId>,
        cursor: Option<Prefix>,
    },
}

impl Job {
    fn peer(&self) -> Option<PeerId> {
        match self {
            Job::PeerDump { peer, .. } | Job::SoftReconfigIn { peer, .. } => {
                Some(*peer)
            }
            _ => None,
        }
    }

    /// The channel the job produces output for.
    fn channel(&self) -> Option<Channel> {
        match self {
            Job::PeerDump { peer, .. } => Some(Channel::Session(*peer)),
            Job::RibDump { client, .. } => Some(Channel::Control(*client)),
            _ => None,
        }
    }
}

/// What the decision process sees of the engine.
struct Decision<'a> {
    peers: &'a BTreeMap<PeerId, Peer>,
    nexthops: &'a NexthopTable,
    bgpid: u32,
}

impl DecisionContext for Decision<'_> {
    fn peer_info(&self, peer: PeerId) -> PeerInfo {
        match self.peers.get(&peer) {
            Some(p) if peer != PEER_ID_SELF => PeerInfo {
                id: peer,
                ebgp: p.conf.is_ebgp(),
                bgp_id: p.session.as_ref().map_or(0, |s| s.remote_bgpid),
                addr: p.conf.remote_addr,
            },
            _ => PeerInfo {
                id: peer,
                ebgp: false,
                bgp_id: self.bgpid,
                addr: Addr::Unspec,
            },
        }
    }

    fn igp_cost(&self, nexthop: &Addr) -> u32 {
        self.nexthops.cost(nexthop)
    }
}

/// A path may become best only if its next hop is reachable and its AS
/// path does not loop through us.
fn path_eligible(
    peer: &Peer,
    nexthops: &NexthopTable,
    attrs: &PathAttributes,
) -> bool {
    if peer.conf.id == PEER_ID_SELF {
        return true;
    }
    let looped = !peer.conf.flags.transparent_as
        && attrs.as_path.contains(peer.conf.local_as);
    !looped && nexthops.reachable(&attrs.nexthop)
}

pub struct Rde {
    config: Arc<RdeConfig>,
    store: AttrStore,
    ribs: BTreeMap<RibId, Rib>,
    peers: BTreeMap<PeerId, Peer>,
    nexthops: NexthopTable,
    fanout: Fanout,
    jobs: VecDeque<Job>,
    reconf: Option<ConfigBuilder>,
    next_rib_id: RibId,
    pub log: Logger,
}

impl Rde {
    pub fn new(
        config: RdeConfig,
        out: SyncSender<RdeOutput>,
        log: Logger,
    ) -> Result<Self, Error> {
        let global = config.global.clone();
        let mut ribs = BTreeMap::new();
        ribs.insert(
            RIB_ADJ_IN,
            Rib::new(
                RIB_ADJ_IN,
                RIB_ADJ_IN_NAME,
                0,
                RibFlags {
                    no_evaluate: true,
                    no_fib: true,
                },
                log.clone(),
            ),
        );
        let mut peers = BTreeMap::new();
        peers.insert(PEER_ID_SELF, Peer::local(global.asn));

        let mut rde = Self {
            store: AttrStore::new(global.limits.attr_max, log.clone()),
            nexthops: NexthopTable::new(global.nexthop_resolve),
            fanout: Fanout::new(out, log.clone()),
            config: Arc::new(RdeConfig::empty(global)),
            ribs,
            peers,
            jobs: VecDeque::new(),
            reconf: None,
            next_rib_id: RIB_ADJ_IN + 1,
            log,
        };
        rde.apply_config(config)?;
        Ok(rde)
    }

    /// Give a session or control client an output channel of its own.
    pub fn attach(&mut self, channel: Channel, tx: SyncSender<RdeOutput>) {
        self.fanout.attach(channel, tx);
    }

    pub fn detach(&mut self, channel: Channel) {
        self.fanout.detach(channel);
    }

    pub fn config(&self) -> &Arc<RdeConfig> {
        &self.config
    }

    pub fn rib(&self, name: &str) -> Option<&Rib> {
        self.ribs.values().find(|r| r.name == name)
    }

    pub fn peer(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    pub fn store(&self) -> &AttrStore {
        &self.store
    }

    pub fn nexthops(&self) -> &NexthopTable {
        &self.nexthops
    }

    /// True while jobs or unsent output remain.
    pub fn busy(&self) -> bool {
        !self.jobs.is_empty()
            || self.fanout.has_backlog()
            || self
                .peers
                .values()
                .any(|p| p.is_up() && p.adj_out.has_pending())
    }

    /// Handle one event. Returns false once the engine was told to shut
    /// down.
    pub fn handle(&mut self, event: RdeEvent) -> bool {
        let shutdown = matches!(event, RdeEvent::Shutdown);
        if let Err(e) = self.dispatch(event) {
            rde_log!(self, error, MOD_ENGINE, "event failed"; "error" => %e);
        }
        self.flush_adj_out();
        !shutdown
    }

    /// One scheduling turn: deliver held back output, advance one job by
    /// a bounded step and move Adj-RIB-Out changes into the session
    /// channels. Returns true if anything happened.
    pub fn turn(&mut self) -> bool {
        let mut progress = self.fanout.flush();
        progress |= self.run_job();
        progress |= self.flush_adj_out();
        progress
    }

    /// Run turns until nothing more can be done without new input.
    pub fn settle(&mut self) {
        while self.turn() {}
    }

    pub fn run(mut self, rx: Receiver<RdeEvent>) {
        rde_log!(self, info, MOD_ENGINE, "decision engine running");
        loop {
            let rounds = self.config.global.limits.runner_rounds;
            let mut handled = 0;
            while handled < rounds {
                match rx.try_recv() {
                    Ok(event) => {
                        handled += 1;
                        if !self.handle(event) {
                            return;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        rde_log!(self, info, MOD_ENGINE, "event channel closed");
                        return;
                    }
                }
            }
            let progress = self.turn();
            if handled == 0 && !progress {
                match rx.recv_timeout(IO_TIMEOUT) {
                    Ok(event) => {
                        if !self.handle(event) {
                            return;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        rde_log!(self, info, MOD_ENGINE, "event channel closed");
                        return;
                    }
                }
            }
        }
    }

    fn dispatch(&mut self, event: RdeEvent) -> Result<(), Error> {
        match event {
            RdeEvent::Update {
                peer,
                prefixes,
                attrs,
            } => {
                let r = self.update(peer, prefixes, attrs);
                if let Err(Error::Rib(rib::error::Error::OutOfMemory(_))) = &r {
                    self.send(RdeOutput::Notify {
                        peer,
                        notification: Notification::cease(
                            CeaseErrorSubcode::OutOfResources,
                        ),
                    });
                }
                r
            }
            RdeEvent::Withdraw { peer, prefixes } => {
                self.withdraw(peer, prefixes)
            }
            RdeEvent::UpdateError { peer, notification } => {
                let p = self
                    .peers
                    .get_mut(&peer)
                    .ok_or(Error::NoSuchPeer(peer))?;
                p.stats.update_errors += 1;
                let p = &self.peers[&peer];
                peer_log!(self, warn, p, "session engine rejected update";
                    "notification" => %notification
                );
                Ok(())
            }
            RdeEvent::SessionUp { peer, session } => {
                self.session_up(peer, session)
            }
            RdeEvent::SessionDown { peer } => self.session_down(peer),
            RdeEvent::SessionStale { peer } => self.session_stale(peer),
            RdeEvent::SessionFlush { peer } => self.session_flush(peer),
            RdeEvent::RouteRefresh { peer, aid } => {
                self.up_peer(peer)?;
                if let Some(p) = self.peers.get_mut(&peer) {
                    p.adj_out.resend(aid);
                }
                Ok(())
            }
            RdeEvent::NetworkAdd(n) => self.network_add(&n),
            RdeEvent::NetworkRemove { prefix, rtableid } => {
                self.network_remove(prefix, rtableid)
            }
            RdeEvent::NetworkFlush => self.network_flush(),
            RdeEvent::NexthopUpdate(u) => {
                self.nexthop_update(u);
                Ok(())
            }
            RdeEvent::Reconf(r) => {
                if let Err(e) = self.reconf(r) {
                    rde_log!(self, warn, MOD_CONFIG, "reconfiguration failed";
                        "error" => %e
                    );
                    self.send(RdeOutput::ReconfResult(ReconfResult {
                        result: e.ctl_result(),
                        message: Some(e.to_string()),
                    }));
                }
                Ok(())
            }
            RdeEvent::Control(req) => {
                self.control(req);
                Ok(())
            }
            RdeEvent::Shutdown => {
                self.shutdown();
                Ok(())
            }
        }
    }

    fn send(&mut self, out: RdeOutput) {
        self.fanout.send(out);
    }

    fn ctl_send(&mut self, client: u32, response: ControlResponse) {
        self.send(RdeOutput::Control { client, response });
    }

    fn up_peer(&self, id: PeerId) -> Result<&Peer, Error> {
        let peer = self
            .peers
            .get(&id)
            .filter(|_| id != PEER_ID_SELF)
            .ok_or(Error::NoSuchPeer(id))?;
        if !peer.is_up() {
            return Err(Error::PeerDown(id));
        }
        Ok(peer)
    }

    fn rib_id(&self, name: &str) -> Option<RibId> {
        self.ribs
            .iter()
            .find(|(_, r)| r.name == name)
            .map(|(id, _)| *id)
    }

    fn loc_rib_ids(&self) -> Vec<RibId> {
        self.ribs.keys().copied().filter(|id| *id != RIB_ADJ_IN).collect()
    }

    /// Default import and export verdicts of a RIB.
    fn rib_policy(&self, rib: RibId) -> (Verdict, Verdict) {
        self.ribs
            .get(&rib)
            .and_then(|r| self.config.rib(&r.name))
            .map_or((Verdict::Allow, Verdict::Allow), |c| {
                (c.default_import, c.default_export)
            })
    }

    // Updates from peers

    fn update(
        &mut self,
        peer_id: PeerId,
        prefixes: Vec<Prefix>,
        attrs: PathAttributes,
    ) -> Result<(), Error> {
        let (checked, supported) = {
            let peer = self.up_peer(peer_id)?;
            let families: BTreeSet<Aid> =
                prefixes.iter().map(|p| p.aid()).collect();
            let checked = families.iter().try_for_each(|aid| {
                validate(
                    &attrs,
                    &ValidationContext {
                        aid: *aid,
                        ebgp: peer.conf.is_ebgp(),
                        remote_as: peer.conf.remote_as,
                        enforce_first_as: peer.conf.enforce_first_as,
                    },
                )
            });
            let supported: BTreeSet<Aid> = families
                .into_iter()
                .filter(|aid| peer.supports(*aid))
                .collect();
            (checked, supported)
        };
        if let Err(e) = checked {
            self.update_error(peer_id, &e);
            return Ok(());
        }

        let soft = self.peers[&peer_id].conf.flags.softreconfig_in;
        for mut prefix in prefixes {
            prefix.unset_host_bits();
            if !supported.contains(&prefix.aid()) || !prefix.valid_for_rib() {
                let peer = &self.peers[&peer_id];
                peer_log!(self, debug, peer, "ignoring prefix";
                    "prefix" => %prefix
                );
                continue;
            }

            let peer = &self.peers[&peer_id];
            let known = peer.prefixes.contains(&prefix);
            let limit = peer.conf.max_prefix;
            if !known
                && limit.is_some_and(|m| peer.prefixes.len() as u64 >= u64::from(m))
            {
                peer_log!(self, warn, peer, "maximum prefix limit reached";
                    "limit" => limit
                );
                self.send(RdeOutput::Notify {
                    peer: peer_id,
                    notification: Notification::cease(
                        CeaseErrorSubcode::MaximumPrefixes,
                    ),
                });
                break;
            }

            if let Some(peer) = self.peers.get_mut(&peer_id) {
                peer.prefixes.insert(prefix);
                peer.stale.remove(&prefix);
                peer.stats.prefix_rcvd_update += 1;
            }
            if soft {
                self.rib_update(RIB_ADJ_IN, prefix, peer_id, Some(attrs.clone()))?;
            }
            self.import(peer_id, prefix, &attrs)?;
        }
        Ok(())
    }

    /// Report a malformed update. The message is dropped; the session
    /// and the RIB are left alone.
    fn update_error(&mut self, peer_id: PeerId, e: &AttrError) {
        if let Some(peer) = self.peers.get_mut(&peer_id) {
            peer.stats.update_errors += 1;
        }
        if let Some(peer) = self.peers.get(&peer_id) {
            peer_log!(self, warn, peer, "malformed update"; "error" => %e);
        }
        self.send(RdeOutput::Notify {
            peer: peer_id,
            notification: Notification::update(e.into()),
        });
    }

    fn import(
        &mut self,
        peer_id: PeerId,
        prefix: Prefix,
        attrs: &PathAttributes,
    ) -> Result<(), Error> {
        let peer = self.peers.get(&peer_id).ok_or(Error::NoSuchPeer(peer_id))?;
        let rib = peer.rib;
        let chain = peer.import.clone();
        let fp = peer.filter_peer();
        let (default, _) = self.rib_policy(rib);
        let result = chain
            .evaluate(default, &fp, &prefix, attrs)
            .map(Cow::into_owned);
        self.rib_update(rib, prefix, peer_id, result)
    }

    fn withdraw(
        &mut self,
        peer_id: PeerId,
        prefixes: Vec<Prefix>,
    ) -> Result<(), Error> {
        let rib = self.up_peer(peer_id)?.rib;
        for mut prefix in prefixes {
            prefix.unset_host_bits();
            let known = match self.peers.get_mut(&peer_id) {
                Some(peer) => {
                    peer.stale.remove(&prefix);
                    let known = peer.prefixes.remove(&prefix);
                    if known {
                        peer.stats.prefix_rcvd_withdraw += 1;
                    }
                    known
                }
                None => false,
            };
            if !known {
                continue;
            }
            self.rib_update(RIB_ADJ_IN, prefix, peer_id, None)?;
            self.rib_update(rib, prefix, peer_id, None)?;
        }
        Ok(())
    }

    // RIB mutation and decision

    /// Set or remove the path of `peer_id` for `prefix` and recompute the
    /// prefix. Installing content equal to what is already there is a
    /// no-op.
    fn rib_update(
        &mut self,
        rib_id: RibId,
        prefix: Prefix,
        peer_id: PeerId,
        attrs: Option<PathAttributes>,
    ) -> Result<(), Error> {
        let rib = self
            .ribs
            .get(&rib_id)
            .ok_or_else(|| Error::NoSuchRib(rib_id.to_string()))?;
        let tracked = !rib.flags.no_evaluate;
        let current = rib.get(&prefix).and_then(|e| e.path(peer_id));
        match (&attrs, current) {
            (Some(a), Some(p)) if !p.stale && *p.attrs == *a => return Ok(()),
            (None, None) => return Ok(()),
            _ => {}
        }
        let before = rib.best(&prefix);

        let replaced = match attrs {
            Some(a) => {
                let handle = self.store.intern(a)?;
                let nexthop = handle.nexthop;
                if tracked
                    && !nexthop.is_unspecified()
                    && self.nexthops.reference(&nexthop)
                {
                    self.send(RdeOutput::NexthopAdd(nexthop));
                }
                let eligible = self
                    .peers
                    .get(&peer_id)
                    .is_some_and(|p| path_eligible(p, &self.nexthops, &handle));
                match self.ribs.get_mut(&rib_id) {
                    Some(rib) => {
                        rib.insert(prefix, peer_id, handle, eligible, Utc::now())
                    }
                    None => {
                        self.store.release(handle);
                        None
                    }
                }
            }
            None => self
                .ribs
                .get_mut(&rib_id)
                .and_then(|rib| rib.remove(&prefix, peer_id)),
        };
        if let Some(old) = replaced {
            self.release_path(tracked, old);
        }
        if tracked {
            self.decide(rib_id, &prefix, before);
        }
        Ok(())
    }

    fn release_path(&mut self, tracked: bool, path: Path) {
        let nexthop = path.attrs.nexthop;
        if tracked
            && !nexthop.is_unspecified()
            && self.nexthops.unreference(&nexthop)
        {
            self.send(RdeOutput::NexthopRemove(nexthop));
        }
        self.store.release(path.attrs);
    }

    fn decide(&mut self, rib_id: RibId, prefix: &Prefix, before: Option<Selection>) {
        let flags = self.config.global.flags;
        let ctx = Decision {
            peers: &self.peers,
            nexthops: &self.nexthops,
            bgpid: self.config.global.bgpid,
        };
        let Some(rib) = self.ribs.get_mut(&rib_id) else {
            return;
        };
        let after = rib.select(prefix, &ctx, &flags);
        if Selection::same_path(&before, &after) {
            return;
        }
        rde_log!(self, trace, MOD_ENGINE, "best path changed";
            "prefix" => %prefix,
            "rib" => rib_id,
            "from" => ?before.as_ref().map(|s| s.peer),
            "to" => ?after.as_ref().map(|s| s.peer)
        );
        self.best_changed(rib_id, prefix, before.as_ref(), after.as_ref());
    }

    fn best_changed(
        &mut self,
        rib_id: RibId,
        prefix: &Prefix,
        before: Option<&Selection>,
        after: Option<&Selection>,
    ) {
        let Some(rib) = self.ribs.get(&rib_id) else {
            return;
        };
        if !rib.flags.no_fib {
            let rtableid = rib.rtableid;
            self.kroute(rtableid, prefix, before, after);
        }
        self.pftable(prefix, before, after);
        self.rdomain_import(prefix, before, after);

        let targets: Vec<PeerId> = self
            .peers
            .values()
            .filter(|p| p.conf.id != PEER_ID_SELF && p.rib == rib_id && p.is_up())
            .map(|p| p.conf.id)
            .collect();
        for peer in targets {
            self.export_one(peer, prefix, after);
        }
    }

    /// Locally originated routes are not installed; they are already
    /// local.
    fn kroute(
        &mut self,
        rtableid: u32,
        prefix: &Prefix,
        before: Option<&Selection>,
        after: Option<&Selection>,
    ) {
        if prefix.aid() == Aid::VpnIpv4 {
            return;
        }
        let remote = |s: &&Selection| s.peer != PEER_ID_SELF;
        match after.filter(remote) {
            Some(s) => self.send(RdeOutput::KrouteChange(KrouteUpdate {
                rtableid,
                prefix: *prefix,
                nexthop: s.attrs.nexthop,
                mode: s.attrs.nexthop_mode,
                rtlabel: s.attrs.rtlabel.clone(),
            })),
            None if before.filter(remote).is_some() => {
                self.send(RdeOutput::KrouteDelete {
                    rtableid,
                    prefix: *prefix,
                })
            }
            None => {}
        }
    }

    fn pftable(
        &mut self,
        prefix: &Prefix,
        before: Option<&Selection>,
        after: Option<&Selection>,
    ) {
        let old = before.and_then(|s| s.attrs.pftable.clone());
        let new = after.and_then(|s| s.attrs.pftable.clone());
        if old == new {
            return;
        }
        if let Some(table) = old {
            self.send(RdeOutput::PftableRemove {
                table,
                prefix: *prefix,
            });
        }
        if let Some(table) = new {
            self.send(RdeOutput::PftableAdd {
                table,
                prefix: *prefix,
            });
        }
        self.send(RdeOutput::PftableCommit);
    }

    /// Install VPN routes into the routing tables of the rdomains that
    /// import them. Local networks are skipped like in the main table.
    fn rdomain_import(
        &mut self,
        prefix: &Prefix,
        before: Option<&Selection>,
        after: Option<&Selection>,
    ) {
        let Prefix::Vpn4(vpn) = prefix else {
            return;
        };
        let inner = Prefix::V4(vpn.prefix);
        let config = self.config.clone();
        let imported = |s: &Selection, d: &RdomainConfig| {
            s.peer != PEER_ID_SELF && d.imports(&s.attrs)
        };
        for d in &config.rdomains {
            let had = before.is_some_and(|s| imported(s, d));
            match after.filter(|s| imported(s, d)) {
                Some(s) => self.send(RdeOutput::KrouteChange(KrouteUpdate {
                    rtableid: d.rtableid,
                    prefix: inner,
                    nexthop: s.attrs.nexthop,
                    mode: s.attrs.nexthop_mode,
                    rtlabel: s.attrs.rtlabel.clone(),
                })),
                None if had => self.send(RdeOutput::KrouteDelete {
                    rtableid: d.rtableid,
                    prefix: inner,
                }),
                None => {}
            }
        }
    }

    /// Bring the Adj-RIB-Out entry of `peer_id` for `prefix` in line with
    /// the best path.
    fn export_one(
        &mut self,
        peer_id: PeerId,
        prefix: &Prefix,
        best: Option<&Selection>,
    ) {
        let result = match (best, self.peers.get(&peer_id)) {
            (Some(sel), Some(to)) => match self.peers.get(&sel.peer) {
                Some(from) => {
                    let (_, default) = self.rib_policy(to.rib);
                    let ctx = ExportContext {
                        global: &self.config.global,
                        default,
                        store: &self.store,
                    };
                    export_path(&ctx, to, from, prefix, &sel.attrs).ok()
                }
                None => None,
            },
            _ => None,
        };
        if let Some(peer) = self.peers.get_mut(&peer_id) {
            peer.adj_out.set(*prefix, result);
        }
    }

    /// Turn queued Adj-RIB-Out changes into messages for every peer whose
    /// channel has room.
    fn flush_adj_out(&mut self) -> bool {
        let mut progress = false;
        for peer in self.peers.values_mut() {
            if !peer.is_up() {
                continue;
            }
            let id = peer.conf.id;
            while !self.fanout.congested(Channel::Session(id)) {
                let Some(msg) = peer.adj_out.next_message() else {
                    break;
                };
                progress = true;
                match msg {
                    AdjOutMessage::Update(prefix, attrs) => {
                        peer.stats.prefix_sent_update += 1;
                        self.fanout.send(RdeOutput::Update {
                            peer: id,
                            prefix,
                            attrs,
                        });
                    }
                    AdjOutMessage::Withdraw(prefix) => {
                        peer.stats.prefix_sent_withdraw += 1;
                        self.fanout.send(RdeOutput::Withdraw { peer: id, prefix });
                    }
                }
            }
        }
        progress
    }

    // Sessions

    fn session_up(
        &mut self,
        peer_id: PeerId,
        session: SessionInfo,
    ) -> Result<(), Error> {
        let peer = self
            .peers
            .get_mut(&peer_id)
            .filter(|p| p.conf.id != PEER_ID_SELF)
            .ok_or(Error::NoSuchPeer(peer_id))?;
        peer.state = PeerState::Up;
        peer.session = Some(session);
        peer.lastchange = Utc::now();
        peer.adj_out.clear();
        let peer = &self.peers[&peer_id];
        peer_log!(self, info, peer, "session up");
        self.jobs.push_back(Job::PeerDump {
            peer: peer_id,
            cursor: None,
        });
        Ok(())
    }

    /// Irrevocable: all paths of the peer are gone before anything else
    /// runs.
    fn session_down(&mut self, peer_id: PeerId) -> Result<(), Error> {
        let peer = self
            .peers
            .get_mut(&peer_id)
            .filter(|p| p.conf.id != PEER_ID_SELF)
            .ok_or(Error::NoSuchPeer(peer_id))?;
        peer.state = PeerState::Down;
        peer.session = None;
        peer.lastchange = Utc::now();
        peer.adj_out.clear();
        peer.staletime = None;
        peer.stale.clear();
        let peer = &self.peers[&peer_id];
        peer_log!(self, info, peer, "session down");

        self.jobs.retain(|j| j.peer() != Some(peer_id));
        let prefixes: Vec<Prefix> = peer.prefixes.iter().copied().collect();
        self.flush_prefixes(peer_id, prefixes)
    }

    fn flush_prefixes(
        &mut self,
        peer_id: PeerId,
        prefixes: Vec<Prefix>,
    ) -> Result<(), Error> {
        let rib = self
            .peers
            .get(&peer_id)
            .map(|p| p.rib)
            .ok_or(Error::NoSuchPeer(peer_id))?;
        for prefix in prefixes {
            if let Some(peer) = self.peers.get_mut(&peer_id) {
                peer.prefixes.remove(&prefix);
            }
            self.rib_update(RIB_ADJ_IN, prefix, peer_id, None)?;
            if self.ribs.contains_key(&rib) {
                self.rib_update(rib, prefix, peer_id, None)?;
            }
        }
        Ok(())
    }

    /// Graceful restart: keep the peer's paths in place, marked stale.
    fn session_stale(&mut self, peer_id: PeerId) -> Result<(), Error> {
        let peer = self
            .peers
            .get_mut(&peer_id)
            .filter(|p| p.conf.id != PEER_ID_SELF)
            .ok_or(Error::NoSuchPeer(peer_id))?;
        peer.state = PeerState::Down;
        peer.lastchange = Utc::now();
        peer.staletime = Some(Utc::now());
        peer.stale = peer.prefixes.clone();
        peer.adj_out.clear();
        let rib = peer.rib;
        let prefixes: Vec<Prefix> = peer.stale.iter().copied().collect();
        let peer = &self.peers[&peer_id];
        peer_log!(self, info, peer, "session stale"; "prefixes" => prefixes.len());

        self.jobs.retain(|j| j.peer() != Some(peer_id));
        for prefix in &prefixes {
            for id in [RIB_ADJ_IN, rib] {
                if let Some(r) = self.ribs.get_mut(&id) {
                    r.set_stale(prefix, peer_id);
                }
            }
        }
        Ok(())
    }

    fn session_flush(&mut self, peer_id: PeerId) -> Result<(), Error> {
        let peer = self
            .peers
            .get_mut(&peer_id)
            .filter(|p| p.conf.id != PEER_ID_SELF)
            .ok_or(Error::NoSuchPeer(peer_id))?;
        let stale: Vec<Prefix> = std::mem::take(&mut peer.stale).into_iter().collect();
        peer.staletime = None;
        let peer = &self.peers[&peer_id];
        peer_log!(self, info, peer, "flushing stale paths"; "prefixes" => stale.len());
        self.flush_prefixes(peer_id, stale)
    }

    // Networks

    /// The prefix and attributes a network is announced with under
    /// `config`.
    fn network_route(
        config: &RdeConfig,
        n: &NetworkConfig,
    ) -> Result<(Prefix, PathAttributes), Error> {
        let mut prefix = n.prefix;
        prefix.unset_host_bits();
        if !prefix.valid_for_rib() {
            return Err(Error::Config(format!("invalid network {prefix}")));
        }
        let prefix = config.network_prefix(&prefix, n.rtableid);
        let local = Peer::local(config.global.asn).filter_peer();
        let mut attrs = n.attrs.clone();
        apply_set(&n.set, &mut attrs, &local);
        if prefix.aid() == Aid::VpnIpv4 {
            if let Some(d) = config.rdomain_for_table(n.rtableid) {
                apply_set(&d.export, &mut attrs, &local);
            }
        }
        Ok((prefix, attrs))
    }

    fn network_add(&mut self, n: &NetworkConfig) -> Result<(), Error> {
        let (prefix, attrs) = Self::network_route(&self.config, n)?;
        if let Some(local) = self.peers.get_mut(&PEER_ID_SELF) {
            local.prefixes.insert(prefix);
        }
        for rib in self.loc_rib_ids() {
            self.rib_update(rib, prefix, PEER_ID_SELF, Some(attrs.clone()))?;
        }
        Ok(())
    }

    fn network_remove(&mut self, mut prefix: Prefix, rtableid: u32) -> Result<(), Error> {
        prefix.unset_host_bits();
        let prefix = self.config.network_prefix(&prefix, rtableid);
        self.withdraw_network(prefix)
    }

    fn withdraw_network(&mut self, prefix: Prefix) -> Result<(), Error> {
        if let Some(local) = self.peers.get_mut(&PEER_ID_SELF) {
            local.prefixes.remove(&prefix);
        }
        for rib in self.loc_rib_ids() {
            self.rib_update(rib, prefix, PEER_ID_SELF, None)?;
        }
        Ok(())
    }

    fn configured_networks(config: &RdeConfig) -> BTreeSet<Prefix> {
        config
            .networks
            .iter()
            .filter_map(|n| Self::network_route(config, n).ok())
            .map(|(prefix, _)| prefix)
            .collect()
    }

    fn network_flush(&mut self) -> Result<(), Error> {
        let keep = Self::configured_networks(&self.config);
        let dynamic: Vec<Prefix> = self
            .peers
            .get(&PEER_ID_SELF)
            .map(|p| p.prefixes.difference(&keep).copied().collect())
            .unwrap_or_default();
        for prefix in dynamic {
            self.withdraw_network(prefix)?;
        }
        Ok(())
    }

    // Next hops

    fn nexthop_update(&mut self, u: NexthopUpdate) {
        if !self.nexthops.update(&u.nexthop, u.valid, u.cost, u.gateway) {
            return;
        }
        rde_log!(self, debug, MOD_ENGINE, "nexthop changed";
            "nexthop" => %u.nexthop,
            "valid" => u.valid,
            "cost" => u.cost
        );
        for rib in self.loc_rib_ids() {
            self.jobs.push_back(Job::Reevaluate {
                rib,
                nexthop: Some(u.nexthop),
                cursor: None,
            });
        }
    }

    /// Refresh eligibility of the affected paths of `prefix` and rerun the
    /// decision process.
    fn reevaluate(&mut self, rib_id: RibId, prefix: &Prefix, nexthop: Option<&Addr>) {
        let Some(rib) = self.ribs.get(&rib_id) else {
            return;
        };
        let Some(entry) = rib.get(prefix) else {
            return;
        };
        let before = rib.best(prefix);
        let changes: Vec<(PeerId, bool)> = entry
            .paths()
            .filter(|p| nexthop.map_or(true, |nh| p.attrs.nexthop == *nh))
            .filter_map(|p| {
                let peer = self.peers.get(&p.peer)?;
                Some((p.peer, path_eligible(peer, &self.nexthops, &p.attrs)))
            })
            .collect();
        if let Some(rib) = self.ribs.get_mut(&rib_id) {
            for (peer, eligible) in changes {
                rib.set_eligible(prefix, peer, eligible);
            }
        }
        self.decide(rib_id, prefix, before);
    }

    // Jobs

    fn job_blocked(&self, job: &Job) -> bool {
        job.channel().is_some_and(|c| self.fanout.congested(c))
    }

    fn run_job(&mut self) -> bool {
        let rounds = self.config.global.limits.runner_rounds;
        for _ in 0..self.jobs.len() {
            let Some(job) = self.jobs.pop_front() else {
                break;
            };
            if self.job_blocked(&job) {
                self.jobs.push_back(job);
                continue;
            }
            if let Some(next) = self.step(job, rounds) {
                self.jobs.push_back(next);
            }
            return true;
        }
        false
    }

    /// Advance a job by at most `rounds` prefixes. Returns the job to
    /// continue with, if it is not done.
    fn step(&mut self, job: Job, rounds: usize) -> Option<Job> {
        match job {
            Job::PeerDump { peer, cursor } => {
                let p = self.peers.get(&peer).filter(|p| p.is_up())?;
                let rib = p.rib;
                let batch = self.ribs.get(&rib)?.prefixes_after(cursor.as_ref(), rounds);
                for prefix in &batch {
                    let best = self.ribs.get(&rib).and_then(|r| r.best(prefix));
                    self.export_one(peer, prefix, best.as_ref());
                }
                (batch.len() == rounds).then(|| Job::PeerDump {
                    peer,
                    cursor: batch.last().copied(),
                })
            }
            Job::SoftReconfigIn { peer, cursor } => {
                let p = self.peers.get(&peer)?;
                let range = match cursor {
                    Some(c) => p.prefixes.range((Bound::Excluded(c), Bound::Unbounded)),
                    None => p.prefixes.range::<Prefix, _>(..),
                };
                let batch: Vec<Prefix> = range.take(rounds).copied().collect();
                for prefix in &batch {
                    let attrs = self
                        .ribs
                        .get(&RIB_ADJ_IN)
                        .and_then(|r| r.get(prefix))
                        .and_then(|e| e.path(peer))
                        .map(|path| (*path.attrs).clone());
                    if let Some(attrs) = attrs {
                        if let Err(e) = self.import(peer, *prefix, &attrs) {
                            rde_log!(self, error, MOD_ENGINE, "soft reconfiguration failed";
                                "peer" => peer,
                                "prefix" => %prefix,
                                "error" => %e
                            );
                        }
                    }
                }
                (batch.len() == rounds).then(|| Job::SoftReconfigIn {
                    peer,
                    cursor: batch.last().copied(),
                })
            }
            Job::Reevaluate {
                rib,
                nexthop,
                cursor,
            } => {
                let batch = self.ribs.get(&rib)?.prefixes_after(cursor.as_ref(), rounds);
                for prefix in &batch {
                    self.reevaluate(rib, prefix, nexthop.as_ref());
                }
                (batch.len() == rounds).then(|| Job::Reevaluate {
                    rib,
                    nexthop,
                    cursor: batch.last().copied(),
                })
            }
            Job::RibDump {
                client,
                req,
                source,
                peer,
                cursor,
            } => {
                let (batch, records) = match &source {
                    DumpSource::Rib(id) => match self.ribs.get(id) {
                        Some(rib) => {
                            let batch = rib.prefixes_after(cursor.as_ref(), rounds);
                            let records: Vec<_> = batch
                                .iter()
                                .filter(|p| req.matches_prefix(p))
                                .flat_map(|p| {
                                    control::rib_records(
                                        rib,
                                        p,
                                        &req,
                                        peer,
                                        &self.peers,
                                        &self.nexthops,
                                    )
                                })
                                .collect();
                            (batch, records)
                        }
                        None => (Vec::new(), Vec::new()),
                    },
                    DumpSource::AdjOut(id) => match self.peers.get(id) {
                        Some(p) => {
                            let batch = p.adj_out.prefixes_after(cursor.as_ref(), rounds);
                            let records: Vec<_> = batch
                                .iter()
                                .filter(|pfx| req.matches_prefix(pfx))
                                .filter_map(|pfx| {
                                    control::adj_out_record(p, pfx, &req, &self.nexthops)
                                })
                                .collect();
                            (batch, records)
                        }
                        None => (Vec::new(), Vec::new()),
                    },
                };
                for r in records {
                    self.ctl_send(client, ControlResponse::Rib(r));
                }
                if batch.len() < rounds {
                    self.ctl_send(client, ControlResponse::End);
                    return None;
                }
                Some(Job::RibDump {
                    client,
                    req,
                    source,
                    peer,
                    cursor: batch.last().copied(),
                })
            }
        }
    }

    // Control

    fn control(&mut self, req: ControlRequest) {
        let client = req.client;
        rde_log!(self, debug, MOD_CONTROL, "control request";
            "client" => client,
            "query" => ?req.query
        );
        match req.query {
            ControlQuery::ShowRib(r) => self.show_rib(client, r),
            ControlQuery::ShowNeighbor { peer } => {
                if let Some(id) = peer {
                    if id == PEER_ID_SELF || !self.peers.contains_key(&id) {
                        self.ctl_send(client, ControlResponse::Result(CtlResult::NoSuchPeer));
                        return;
                    }
                }
                let records: Vec<_> = self
                    .peers
                    .values()
                    .filter(|p| p.conf.id != PEER_ID_SELF)
                    .filter(|p| peer.map_or(true, |id| id == p.conf.id))
                    .map(control::neighbor_record)
                    .collect();
                for r in records {
                    self.ctl_send(client, ControlResponse::Neighbor(r));
                }
                self.ctl_send(client, ControlResponse::End);
            }
            ControlQuery::ShowNexthop => {
                let records: Vec<_> = self
                    .nexthops
                    .iter()
                    .map(|nh| control::nexthop_record(nh, &self.nexthops))
                    .collect();
                for r in records {
                    self.ctl_send(client, ControlResponse::Nexthop(r));
                }
                self.ctl_send(client, ControlResponse::End);
            }
            ControlQuery::ShowMemory => {
                let stats = control::mem_stats(
                    self.ribs.values(),
                    &self.peers,
                    &self.nexthops,
                    &self.store,
                );
                self.ctl_send(client, ControlResponse::Memory(stats));
                self.ctl_send(client, ControlResponse::End);
            }
        }
    }

    fn show_rib(&mut self, client: u32, req: RibRequest) {
        let peer = match control::resolve_peer(&req, &self.peers) {
            Ok(p) => p,
            Err(code) => {
                self.ctl_send(client, ControlResponse::Result(code));
                return;
            }
        };
        let source = match (req.flags.adj_out, peer) {
            (true, Some(id)) => DumpSource::AdjOut(id),
            _ if req.flags.adj_in => DumpSource::Rib(RIB_ADJ_IN),
            _ => {
                let name = req.rib.as_deref().unwrap_or(RIB_LOC_NAME);
                match self.rib_id(name) {
                    Some(id) => DumpSource::Rib(id),
                    None => {
                        self.ctl_send(client, ControlResponse::Result(CtlResult::NoSuchPeer));
                        return;
                    }
                }
            }
        };

        if let (DumpSource::Rib(id), Some(want), true) = (&source, req.prefix, req.is_lookup()) {
            let records = match self.ribs.get(id) {
                Some(rib) => {
                    let found = if want.length() == want.aid().max_prefix_len() {
                        rib.lookup(&want.addr()).map(|e| e.prefix())
                    } else {
                        rib.get(&want).map(|e| e.prefix())
                    };
                    match found {
                        Some(p) => control::rib_records(
                            rib,
                            &p,
                            &req,
                            peer,
                            &self.peers,
                            &self.nexthops,
                        ),
                        None => Vec::new(),
                    }
                }
                None => Vec::new(),
            };
            for r in records {
                self.ctl_send(client, ControlResponse::Rib(r));
            }
            self.ctl_send(client, ControlResponse::End);
            return;
        }

        self.jobs.push_back(Job::RibDump {
            client,
            req: Box::new(req),
            source,
            peer,
            cursor: None,
        });
    }

    // Reconfiguration

    fn reconf(&mut self, event: ReconfEvent) -> Result<(), Error> {
        match event {
            ReconfEvent::Begin(global) => {
                if self.reconf.is_some() {
                    rde_log!(self, warn, MOD_CONFIG, "reconfiguration restarted");
                }
                self.reconf = Some(ConfigBuilder::new(global));
                Ok(())
            }
            ReconfEvent::Abort => {
                if self.reconf.take().is_some() {
                    rde_log!(self, info, MOD_CONFIG, "reconfiguration aborted");
                }
                Ok(())
            }
            ReconfEvent::Done => {
                let builder = self.reconf.take().ok_or(Error::NoReconf)?;
                let config = builder.finish()?;
                self.apply_config(config)?;
                rde_log!(self, info, MOD_CONFIG, "reconfiguration done");
                self.send(RdeOutput::ReconfResult(ReconfResult {
                    result: CtlResult::Ok,
                    message: None,
                }));
                Ok(())
            }
            part => {
                let builder = self.reconf.as_mut().ok_or(Error::NoReconf)?;
                let r = match part {
                    ReconfEvent::Rib(x) => builder.rib(x),
                    ReconfEvent::Peer(x) => builder.peer(x),
                    ReconfEvent::Filter(x) => builder.filter(x),
                    ReconfEvent::Network(x) => builder.network(x),
                    ReconfEvent::Rdomain(x) => builder.rdomain(x),
                    ReconfEvent::Begin(_)
                    | ReconfEvent::Done
                    | ReconfEvent::Abort => Ok(()),
                };
                if r.is_err() {
                    self.reconf = None;
                }
                r
            }
        }
    }

    /// Swap in a new configuration and bring the routing state in line
    /// with it. A configuration that can not be applied is refused before
    /// anything changes.
    fn apply_config(&mut self, new: RdeConfig) -> Result<(), Error> {
        let reserved = self.reserve(&new)?;
        let result = self.switch_config(new);
        for handle in reserved {
            self.store.release(handle);
        }
        result
    }

    /// Check `new` against the running state and intern the attributes of
    /// its networks under the new store limit. The returned handles keep
    /// those entries alive until the networks are installed, so nothing
    /// after the switch needs a new store entry.
    fn reserve(&mut self, new: &RdeConfig) -> Result<Vec<AttrHandle>, Error> {
        if let Some(conf) = new.peers.iter().find(|c| new.rib(&c.rib).is_none()) {
            return Err(Error::NoSuchRib(conf.rib.clone()));
        }
        let limit = self.store.limit();
        self.store.set_limit(new.global.limits.attr_max);
        let mut reserved = Vec::with_capacity(new.networks.len());
        for n in &new.networks {
            let handle = Self::network_route(new, n)
                .and_then(|(_, attrs)| self.store.intern(attrs).map_err(Error::from));
            match handle {
                Ok(h) => reserved.push(h),
                Err(e) => {
                    for h in reserved {
                        self.store.release(h);
                    }
                    self.store.set_limit(limit);
                    return Err(e);
                }
            }
        }
        Ok(reserved)
    }

    fn switch_config(&mut self, new: RdeConfig) -> Result<(), Error> {
        let old = std::mem::replace(&mut self.config, Arc::new(new));
        let new = self.config.clone();

        self.store.set_limit(new.global.limits.attr_max);
        self.nexthops.set_resolve(new.global.nexthop_resolve);
        if let Some(local) = self.peers.get_mut(&PEER_ID_SELF) {
            local.conf.remote_as = new.global.asn;
            local.conf.local_as = new.global.asn;
        }

        // peers that are gone or feed another RIB now
        let existing: Vec<PeerId> = self
            .peers
            .keys()
            .copied()
            .filter(|id| *id != PEER_ID_SELF)
            .collect();
        for id in existing {
            let Some(peer) = self.peers.get(&id) else {
                continue;
            };
            let up = peer.is_up();
            let (cease, remove) = match new.peer(id) {
                None => (CeaseErrorSubcode::PeerDeconfigured, true),
                Some(conf) if conf.rib != peer.conf.rib => {
                    (CeaseErrorSubcode::OtherConfigurationChange, false)
                }
                Some(_) => continue,
            };
            if up {
                self.send(RdeOutput::Notify {
                    peer: id,
                    notification: Notification::cease(cease),
                });
            }
            self.session_down(id)?;
            if remove {
                rde_log!(self, info, MOD_CONFIG, "peer removed"; "peer" => id);
                self.peers.remove(&id);
            }
        }

        // RIBs
        let gone: Vec<RibId> = self
            .ribs
            .iter()
            .filter(|(id, r)| **id != RIB_ADJ_IN && new.rib(&r.name).is_none())
            .map(|(id, _)| *id)
            .collect();
        for id in gone {
            self.remove_rib(id);
        }
        for rc in &new.ribs {
            match self.rib_id(&rc.name) {
                Some(id) => {
                    if let Some(rib) = self.ribs.get_mut(&id) {
                        if rib.flags != rc.flags || rib.rtableid != rc.rtableid {
                            rib.flags = rc.flags;
                            rib.rtableid = rc.rtableid;
                            self.jobs.push_back(Job::Reevaluate {
                                rib: id,
                                nexthop: None,
                                cursor: None,
                            });
                        }
                    }
                }
                None => {
                    let id = self.next_rib_id;
                    self.next_rib_id += 1;
                    rde_log!(self, info, MOD_CONFIG, "rib added";
                        "rib" => &rc.name,
                        "id" => id
                    );
                    self.ribs.insert(
                        id,
                        Rib::new(id, &rc.name, rc.rtableid, rc.flags, self.log.clone()),
                    );
                }
            }
        }

        // peers and their filter chains
        let mut reevaluate: BTreeSet<RibId> = BTreeSet::new();
        let mut redump: BTreeSet<RibId> = BTreeSet::new();
        let mut dumps: BTreeSet<PeerId> = BTreeSet::new();
        for conf in &new.peers {
            let rib = self
                .rib_id(&conf.rib)
                .ok_or_else(|| Error::NoSuchRib(conf.rib.clone()))?;
            let added = !self.peers.contains_key(&conf.id);
            let peer = self
                .peers
                .entry(conf.id)
                .or_insert_with(|| Peer::new(conf.clone(), rib));
            let prev = std::mem::replace(&mut peer.conf, conf.clone());
            peer.rib = rib;

            // eligibility and tie breaks of the paths the peer sent
            if prev.flags.transparent_as != conf.flags.transparent_as
                || prev.local_as != conf.local_as
                || prev.remote_as != conf.remote_as
                || prev.remote_addr != conf.remote_addr
            {
                reevaluate.insert(rib);
            }
            // how the peer's paths are passed on to everybody else
            if prev.local_as != conf.local_as
                || prev.remote_as != conf.remote_as
                || prev.reflector_client != conf.reflector_client
            {
                redump.insert(rib);
            }

            let import = FilterChain::build(&new.filters, Direction::Incoming, conf);
            let export = FilterChain::build(&new.filters, Direction::Outgoing, conf);
            let old_defaults = old.rib(&conf.rib).map(|r| (r.default_import, r.default_export));
            let new_defaults = new.rib(&conf.rib).map(|r| (r.default_import, r.default_export));
            let import_changed = import != *peer.import
                || old_defaults.map(|d| d.0) != new_defaults.map(|d| d.0);
            let export_changed = export != *peer.export
                || old_defaults.map(|d| d.1) != new_defaults.map(|d| d.1)
                || prev != *conf;
            peer.import = Arc::new(import);
            peer.export = Arc::new(export);

            if added || !peer.is_up() {
                continue;
            }
            let id = conf.id;
            if import_changed {
                if conf.flags.softreconfig_in {
                    self.jobs.push_back(Job::SoftReconfigIn { peer: id, cursor: None });
                } else {
                    let refresh: Vec<Aid> = match &peer.session {
                        Some(s) if s.capabilities.refresh => Aid::ROUTABLE
                            .into_iter()
                            .filter(|aid| s.capabilities.supports(*aid))
                            .collect(),
                        _ => Vec::new(),
                    };
                    if refresh.is_empty() {
                        let peer = &self.peers[&id];
                        peer_log!(self, warn, peer,
                            "import policy changed but the peer can not refresh"
                        );
                    }
                    for aid in refresh {
                        self.send(RdeOutput::RouteRefresh { peer: id, aid });
                    }
                }
            }
            if export_changed {
                dumps.insert(id);
            }
        }

        let decision_changed = old.global.flags != new.global.flags
            || old.global.asn != new.global.asn
            || old.global.nexthop_resolve != new.global.nexthop_resolve;
        if decision_changed {
            reevaluate.extend(self.loc_rib_ids());
        }
        for rib in reevaluate {
            self.jobs.push_back(Job::Reevaluate {
                rib,
                nexthop: None,
                cursor: None,
            });
        }
        dumps.extend(
            self.peers
                .values()
                .filter(|p| p.conf.id != PEER_ID_SELF && p.is_up())
                .filter(|p| redump.contains(&p.rib))
                .map(|p| p.conf.id),
        );
        for peer in dumps {
            self.jobs.push_back(Job::PeerDump { peer, cursor: None });
        }

        // networks
        let before = Self::configured_networks(&old);
        let after = Self::configured_networks(&new);
        for prefix in before.difference(&after) {
            self.withdraw_network(*prefix)?;
        }
        for n in &new.networks {
            self.network_add(n)?;
        }
        Ok(())
    }

    fn remove_rib(&mut self, id: RibId) {
        let Some(mut rib) = self.ribs.remove(&id) else {
            return;
        };
        rde_log!(self, info, MOD_CONFIG, "rib removed"; "rib" => &rib.name);
        if !rib.flags.no_fib {
            let installed: Vec<Prefix> = rib
                .iter()
                .filter(|e| {
                    e.prefix().aid() != Aid::VpnIpv4
                        && e.best().is_some_and(|b| b.peer != PEER_ID_SELF)
                })
                .map(|e| e.prefix())
                .collect();
            for prefix in installed {
                self.send(RdeOutput::KrouteDelete {
                    rtableid: rib.rtableid,
                    prefix,
                });
            }
        }
        let tracked = !rib.flags.no_evaluate;
        for (_, path) in rib.drain() {
            self.release_path(tracked, path);
        }
        self.jobs.retain(|j| match j {
            Job::Reevaluate { rib, .. } => *rib != id,
            Job::RibDump { source, .. } => *source != DumpSource::Rib(id),
            _ => true,
        });
    }

    fn shutdown(&mut self) {
        rde_log!(self, info, MOD_ENGINE, "shutting down");
        self.jobs.clear();
        self.reconf = None;
        for peer in self.peers.values_mut() {
            peer.adj_out.clear();
            peer.prefixes.clear();
            peer.stale.clear();
        }
        let ribs = std::mem::take(&mut self.ribs);
        for (_, mut rib) in ribs {
            for (_, path) in rib.drain() {
                self.store.release(path.attrs);
            }
        }
        self.nexthops = NexthopTable::new(self.config.global.nexthop_resolve);
    }
}
