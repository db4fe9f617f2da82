// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property-based tests for policy evaluation and for the bookkeeping the
//! engine keeps across arbitrary event sequences.

#[cfg(test)]
mod proptest {
    use crate::config::{ConfigBuilder, GlobalConfig};
    use crate::filter::{
        AsLenMatch, CmpOp, Direction, FilterAction, FilterChain, FilterMatch,
        FilterPeer, FilterRule, PrefixMatch, SetAction, Verdict,
    };
    use crate::ipc::{NexthopUpdate, RdeEvent, RdeOutput};
    use crate::peer::{PeerConfig, SessionInfo};
    use crate::Rde;
    use proptest::prelude::*;
    use rde_common::log::discard_logger;
    use rib::attr::{AsPath, PathAttributes};
    use rib::{Addr, Prefix, Prefix4, PEER_ID_SELF, RIB_LOC_NAME};
    use std::net::Ipv4Addr;

    const LOCAL_AS: u32 = 65000;
    const PEERS: u32 = 3;

    fn prefix(i: u8) -> Prefix {
        Prefix::V4(Prefix4::new(Ipv4Addr::new(10, i, 0, 0), 16))
    }

    fn nexthop(i: u8) -> Addr {
        Addr::V4(Ipv4Addr::new(192, 0, 2, 100 + i))
    }

    // Small spaces so paths collide on prefixes, content and next hops.
    fn attrs_strategy() -> impl Strategy<Value = PathAttributes> {
        (0u32..3, prop::collection::vec(64999u32..65003, 1..5), 0u8..3)
            .prop_map(|(lp, asns, nh)| PathAttributes {
                local_pref: 100 + lp * 50,
                as_path: AsPath::from_sequence(asns),
                nexthop: nexthop(nh),
                ..Default::default()
            })
    }

    fn cmp_strategy() -> impl Strategy<Value = CmpOp> {
        prop_oneof![
            (0u32..6).prop_map(CmpOp::Eq),
            (0u32..6).prop_map(CmpOp::Gt),
            (0u32..6).prop_map(CmpOp::Le),
            (0u32..3, 3u32..6).prop_map(|(a, b)| CmpOp::Range(a, b)),
        ]
    }

    fn rule_strategy() -> impl Strategy<Value = FilterRule> {
        (
            prop_oneof![
                Just(FilterAction::Match),
                Just(FilterAction::Allow),
                Just(FilterAction::Deny),
            ],
            any::<bool>(),
            proptest::option::of(cmp_strategy()),
            proptest::option::of(0u8..4),
            proptest::option::of(0u32..300),
        )
            .prop_map(|(action, quick, as_len, pfx, lp)| {
                let mut rule = FilterRule::new(Direction::Incoming, action);
                rule.quick = quick;
                rule.matches = FilterMatch {
                    as_len: as_len.map(AsLenMatch::Length),
                    prefix: pfx.map(|i| PrefixMatch {
                        prefix: prefix(i),
                        len: None,
                    }),
                    ..Default::default()
                };
                if let Some(lp) = lp {
                    rule.set.push(SetAction::LocalPref(lp));
                }
                rule
            })
    }

    fn filter_peer() -> FilterPeer {
        FilterPeer {
            id: 1,
            remote_as: 65001,
            local_as: LOCAL_AS,
            remote_addr: Addr::V4(Ipv4Addr::new(192, 0, 2, 1)),
            ebgp: true,
        }
    }

    #[derive(Debug, Clone)]
    enum Op {
        Announce(u32, u8, PathAttributes),
        Withdraw(u32, u8),
        Up(u32),
        Down(u32),
        Nexthop(u8, bool),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let peer = 1..=PEERS;
        prop_oneof![
            6 => (peer.clone(), 0u8..4, attrs_strategy())
                .prop_map(|(p, i, a)| Op::Announce(p, i, a)),
            3 => (peer.clone(), 0u8..4).prop_map(|(p, i)| Op::Withdraw(p, i)),
            1 => peer.clone().prop_map(Op::Up),
            1 => peer.prop_map(Op::Down),
            1 => (0u8..3, any::<bool>()).prop_map(|(nh, v)| Op::Nexthop(nh, v)),
        ]
    }

    fn engine(resolve: bool) -> Rde {
        let mut global = GlobalConfig::new(LOCAL_AS, 1);
        global.nexthop_resolve = resolve;
        let mut b = ConfigBuilder::new(global);
        for id in 1..=PEERS {
            b.peer(PeerConfig::new(
                id,
                Addr::V4(Ipv4Addr::new(192, 0, 2, id as u8)),
                65000 + id,
            ))
            .unwrap();
        }
        let (tx, _) = RdeOutput::channel(1);
        Rde::new(b.finish().unwrap(), tx, discard_logger()).unwrap()
    }

    fn event(op: Op) -> RdeEvent {
        match op {
            Op::Announce(peer, i, attrs) => RdeEvent::Update {
                peer,
                prefixes: vec![prefix(i)],
                attrs,
            },
            Op::Withdraw(peer, i) => RdeEvent::Withdraw {
                peer,
                prefixes: vec![prefix(i)],
            },
            Op::Up(peer) => RdeEvent::SessionUp {
                peer,
                session: SessionInfo::default(),
            },
            Op::Down(peer) => RdeEvent::SessionDown { peer },
            Op::Nexthop(nh, valid) => RdeEvent::NexthopUpdate(NexthopUpdate {
                nexthop: nexthop(nh),
                valid,
                cost: 0,
                gateway: None,
            }),
        }
    }

    fn check_invariants(rde: &Rde) -> Result<(), TestCaseError> {
        let rib = rde.rib(RIB_LOC_NAME).unwrap();
        let mut paths = 0;
        for entry in rib.iter() {
            paths += entry.len() as u64;
            match entry.best() {
                Some(best) => {
                    prop_assert!(best.eligible);
                    prop_assert!(entry.path(best.peer).is_some());
                }
                None => prop_assert!(entry.paths().all(|p| !p.eligible)),
            }
            // what every peer is told follows the best path
            for id in 1..=PEERS {
                let peer = rde.peer(id).unwrap();
                if !peer.is_up() {
                    prop_assert!(peer.adj_out.is_empty());
                    continue;
                }
                let expect = entry
                    .best()
                    .is_some_and(|b| b.peer != id && b.peer != PEER_ID_SELF);
                prop_assert_eq!(
                    peer.adj_out.get(&entry.prefix()).is_some(),
                    expect
                );
            }
        }
        let stats = rde.store().stats();
        prop_assert_eq!(stats.references, paths);
        let nexthop_refs: u64 = rde.nexthops().iter().map(|n| n.refs).sum();
        prop_assert_eq!(nexthop_refs, paths);
        Ok(())
    }

    proptest! {
        /// Property: evaluating a chain is a pure function of its input
        #[test]
        fn prop_filter_deterministic(
            rules in prop::collection::vec(rule_strategy(), 0..8),
            attrs in attrs_strategy(),
            i in 0u8..4,
        ) {
            let chain = FilterChain { rules };
            let peer = filter_peer();
            let a = chain.evaluate(Verdict::Allow, &peer, &prefix(i), &attrs);
            let b = chain.evaluate(Verdict::Allow, &peer, &prefix(i), &attrs);
            prop_assert_eq!(a, b);
        }

        /// Property: a matching quick deny ends evaluation whatever
        /// follows it
        #[test]
        fn prop_quick_deny_is_final(
            rules in prop::collection::vec(rule_strategy(), 0..8),
            attrs in attrs_strategy(),
            i in 0u8..4,
        ) {
            let mut stop = FilterRule::new(Direction::Incoming, FilterAction::Deny);
            stop.quick = true;
            let mut all = vec![stop];
            all.extend(rules);
            let chain = FilterChain { rules: all };
            prop_assert_eq!(
                chain.evaluate(Verdict::Allow, &filter_peer(), &prefix(i), &attrs),
                None
            );
        }

        /// Property: after every event each prefix has at most one best
        /// path, attribute and next hop references equal the installed
        /// paths and peers are told exactly the best paths
        #[test]
        fn prop_engine_bookkeeping(
            resolve in any::<bool>(),
            ops in prop::collection::vec(op_strategy(), 1..60),
        ) {
            let mut rde = engine(resolve);
            for id in 1..=PEERS {
                rde.handle(event(Op::Up(id)));
            }
            rde.settle();
            for op in ops {
                rde.handle(event(op));
                rde.settle();
                check_invariants(&rde)?;
            }
            prop_assert!(!rde.handle(RdeEvent::Shutdown));
            prop_assert!(rde.store().is_empty());
        }
    }
}
