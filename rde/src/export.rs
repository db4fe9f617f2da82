// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! What a best path looks like to one peer, if the peer gets it at all.

use crate::config::GlobalConfig;
use crate::filter::Verdict;
use crate::peer::Peer;
use rib::attr::{Community, NexthopMode, PathAttributes};
use rib::{AttrStore, Prefix, DEFAULT_LOCAL_PREF, PEER_ID_SELF};
use std::sync::Arc;

/// Why a path is not exported to a peer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Suppressed {
    /// The peer is where the path came from.
    SplitHorizon,
    /// The session did not negotiate the address family.
    NoCapability,
    /// Internal to internal without route reflection.
    Ibgp,
    /// A well-known community forbids it.
    Community,
    /// The export chain denied it.
    Filtered,
}

pub struct ExportContext<'a> {
    pub global: &'a GlobalConfig,
    pub default: Verdict,
    pub store: &'a AttrStore,
}

/// Decide whether `best`, learned from `from`, goes to `to`, and with
/// which attributes. Content equal results share one allocation.
pub fn export_path(
    ctx: &ExportContext,
    to: &Peer,
    from: &Peer,
    prefix: &Prefix,
    best: &PathAttributes,
) -> Result<Arc<PathAttributes>, Suppressed> {
    if to.conf.id == from.conf.id {
        return Err(Suppressed::SplitHorizon);
    }
    if !to.supports(prefix.aid()) {
        return Err(Suppressed::NoCapability);
    }

    let to_ebgp = to.conf.is_ebgp();
    let from_ibgp = from.conf.id != PEER_ID_SELF && !from.conf.is_ebgp();
    if !to_ebgp && from_ibgp {
        let reflect = ctx.global.clusterid.is_some()
            && (to.conf.reflector_client || from.conf.reflector_client);
        if !reflect {
            return Err(Suppressed::Ibgp);
        }
    }

    if best.has_community(Community::NO_ADVERTISE) {
        return Err(Suppressed::Community);
    }
    if to_ebgp
        && (best.has_community(Community::NO_EXPORT)
            || best.has_community(Community::NO_EXPORT_SUBCONFED))
    {
        return Err(Suppressed::Community);
    }

    let filtered = to
        .export
        .evaluate(ctx.default, &to.filter_peer(), prefix, best)
        .ok_or(Suppressed::Filtered)?;
    let mut out = filtered.into_owned();

    if to_ebgp {
        if !to.conf.flags.transparent_as {
            out.as_path = out.as_path.prepend(to.conf.local_as, 1);
        }
        out.local_pref = DEFAULT_LOCAL_PREF;
    }

    let local = to
        .session
        .as_ref()
        .map(|s| s.local_addr(prefix.aid()))
        .filter(|a| !a.is_unspecified());
    let rewrite = match out.nexthop_mode {
        NexthopMode::NoModify => false,
        NexthopMode::SelfAddr
        | NexthopMode::Reject
        | NexthopMode::Blackhole => true,
        NexthopMode::Normal => to_ebgp || out.nexthop.is_unspecified(),
    };
    if rewrite {
        if let Some(local) = local {
            out.nexthop = local;
        }
    }

    // local only
    out.nexthop_mode = NexthopMode::Normal;
    out.weight = 0;
    out.rtlabel = None;
    out.pftable = None;

    Ok(ctx.store.share(out))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::filter::{
        Direction, FilterAction, FilterChain, FilterRule, SetAction,
    };
    use crate::peer::{Capabilities, PeerConfig, PeerState, SessionInfo};
    use pretty_assertions::assert_eq;
    use rde_common::log::discard_logger;
    use rde_common::{cidr, ip};
    use rib::attr::AsPath;
    use rib::store::DEFAULT_ATTR_LIMIT;
    use rib::{Addr, Aid};

    const LOCAL_AS: u32 = 65000;

    fn peer(id: u32, remote_as: u32) -> Peer {
        let mut conf = PeerConfig::new(id, Addr::V4([192, 0, 2, id as u8].into()), remote_as);
        conf.local_as = LOCAL_AS;
        let mut p = Peer::new(conf, 1);
        p.state = PeerState::Up;
        p.session = Some(SessionInfo {
            capabilities: Capabilities::default(),
            remote_bgpid: id,
            remote_addr: p.conf.remote_addr,
            local_v4: ip!("198.51.100.1"),
            local_v6: ip!("2001:db8::1"),
        });
        p
    }

    fn best() -> PathAttributes {
        PathAttributes {
            as_path: AsPath::from_sequence(vec![65001]),
            nexthop: ip!("192.0.2.1"),
            local_pref: 150,
            weight: 7,
            rtlabel: Some("lbl".into()),
            ..Default::default()
        }
    }

    struct Fixture {
        global: GlobalConfig,
        store: AttrStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                global: GlobalConfig::new(LOCAL_AS, 1),
                store: AttrStore::new(DEFAULT_ATTR_LIMIT, discard_logger()),
            }
        }

        fn ctx(&self) -> ExportContext<'_> {
            ExportContext {
                global: &self.global,
                default: Verdict::Allow,
                store: &self.store,
            }
        }
    }

    #[test]
    fn test_ebgp_rewrite() {
        let f = Fixture::new();
        let p: Prefix = cidr!("10.0.0.0/24");
        let out = export_path(&f.ctx(), &peer(2, 65002), &peer(1, 65001), &p, &best())
            .unwrap();
        assert_eq!(out.as_path, AsPath::from_sequence(vec![LOCAL_AS, 65001]));
        assert_eq!(out.local_pref, DEFAULT_LOCAL_PREF);
        assert_eq!(out.nexthop, ip!("198.51.100.1"));
        assert_eq!(out.weight, 0);
        assert_eq!(out.rtlabel, None);
    }

    #[test]
    fn test_split_horizon() {
        let f = Fixture::new();
        let p: Prefix = cidr!("10.0.0.0/24");
        let x = peer(1, 65001);
        assert_eq!(
            export_path(&f.ctx(), &x, &x, &p, &best()),
            Err(Suppressed::SplitHorizon)
        );
    }

    #[test]
    fn test_ibgp_to_ibgp_needs_reflection() {
        let mut f = Fixture::new();
        let p: Prefix = cidr!("10.0.0.0/24");
        let a = peer(10, LOCAL_AS);
        let mut b = peer(11, LOCAL_AS);
        assert_eq!(
            export_path(&f.ctx(), &b, &a, &p, &best()),
            Err(Suppressed::Ibgp)
        );

        f.global.clusterid = Some(1);
        assert_eq!(
            export_path(&f.ctx(), &b, &a, &p, &best()),
            Err(Suppressed::Ibgp)
        );
        b.conf.reflector_client = true;
        let out = export_path(&f.ctx(), &b, &a, &p, &best()).unwrap();
        // internal peers keep next hop and local preference
        assert_eq!(out.nexthop, ip!("192.0.2.1"));
        assert_eq!(out.local_pref, 150);
        assert_eq!(out.as_path, AsPath::from_sequence(vec![65001]));

        // locally originated routes go to internal peers
        let local = Peer::local(LOCAL_AS);
        assert!(export_path(&f.ctx(), &a, &local, &p, &best()).is_ok());
    }

    #[test]
    fn test_well_known_communities() {
        let f = Fixture::new();
        let p: Prefix = cidr!("10.0.0.0/24");
        let ext = peer(2, 65002);
        let int = peer(10, LOCAL_AS);
        let from = peer(1, 65001);

        let mut a = best();
        a.communities.insert(Community::NO_EXPORT);
        assert_eq!(
            export_path(&f.ctx(), &ext, &from, &p, &a),
            Err(Suppressed::Community)
        );
        assert!(export_path(&f.ctx(), &int, &from, &p, &a).is_ok());

        let mut a = best();
        a.communities.insert(Community::NO_ADVERTISE);
        assert_eq!(
            export_path(&f.ctx(), &int, &from, &p, &a),
            Err(Suppressed::Community)
        );
    }

    #[test]
    fn test_capability() {
        let f = Fixture::new();
        let p: Prefix = cidr!("2001:db8:1::/48");
        let mut to = peer(2, 65002);
        let mut a = best();
        a.nexthop = ip!("2001:db8::99");
        assert_eq!(
            export_path(&f.ctx(), &to, &peer(1, 65001), &p, &a),
            Err(Suppressed::NoCapability)
        );
        if let Some(s) = to.session.as_mut() {
            s.capabilities.mp = [Aid::Inet, Aid::Inet6].into_iter().collect();
        }
        let out = export_path(&f.ctx(), &to, &peer(1, 65001), &p, &a).unwrap();
        assert_eq!(out.nexthop, ip!("2001:db8::1"));
    }

    #[test]
    fn test_export_filter_and_nexthop_modes() {
        let f = Fixture::new();
        let p: Prefix = cidr!("10.0.0.0/24");
        let from = peer(1, 65001);
        let mut to = peer(2, 65002);

        let mut rule = FilterRule::new(Direction::Outgoing, FilterAction::Allow);
        rule.set.push(SetAction::NexthopNoModify);
        rule.set.push(SetAction::Med(20));
        to.export = Arc::new(FilterChain { rules: vec![rule] });
        let out = export_path(&f.ctx(), &to, &from, &p, &best()).unwrap();
        assert_eq!(out.nexthop, ip!("192.0.2.1"));
        assert_eq!(out.med, Some(20));
        assert_eq!(out.nexthop_mode, NexthopMode::Normal);

        to.export = Arc::new(FilterChain {
            rules: vec![FilterRule::new(Direction::Outgoing, FilterAction::Deny)],
        });
        assert_eq!(
            export_path(&f.ctx(), &to, &from, &p, &best()),
            Err(Suppressed::Filtered)
        );

        let mut int = peer(10, LOCAL_AS);
        let mut rule = FilterRule::new(Direction::Outgoing, FilterAction::Allow);
        rule.set.push(SetAction::NexthopSelf);
        int.export = Arc::new(FilterChain { rules: vec![rule] });
        let out = export_path(&f.ctx(), &int, &from, &p, &best()).unwrap();
        assert_eq!(out.nexthop, ip!("198.51.100.1"));
    }

    #[test]
    fn test_transparent_as() {
        let f = Fixture::new();
        let p: Prefix = cidr!("10.0.0.0/24");
        let mut to = peer(2, 65002);
        to.conf.flags.transparent_as = true;
        let out = export_path(&f.ctx(), &to, &peer(1, 65001), &p, &best()).unwrap();
        assert_eq!(out.as_path, AsPath::from_sequence(vec![65001]));
    }
}
