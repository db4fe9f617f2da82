// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property-based tests for prefixes, AS paths and the attribute store.

#[cfg(test)]
mod proptest {
    use crate::attr::{AsPath, AsPathSegment, PathAttributes};
    use crate::store::{AttrHandle, AttrStore, DEFAULT_ATTR_LIMIT};
    use crate::types::{Addr, Prefix, Prefix4, Prefix6};
    use proptest::prelude::*;
    use rde_common::log::discard_logger;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn ipv4_prefix_strategy() -> impl Strategy<Value = Prefix4> {
        (any::<u32>(), 0u8..=32u8).prop_map(|(addr_bits, length)| {
            Prefix4::new(Ipv4Addr::from(addr_bits), length)
        })
    }

    fn ipv6_prefix_strategy() -> impl Strategy<Value = Prefix6> {
        (any::<u128>(), 0u8..=128u8).prop_map(|(addr_bits, length)| {
            Prefix6::new(Ipv6Addr::from(addr_bits), length)
        })
    }

    fn as_path_strategy() -> impl Strategy<Value = AsPath> {
        prop::collection::vec(
            (any::<bool>(), prop::collection::vec(1u32..70000, 1..6)),
            0..4,
        )
        .prop_map(|segments| AsPath {
            segments: segments
                .into_iter()
                .map(|(set, asns)| {
                    if set {
                        AsPathSegment::set(asns)
                    } else {
                        AsPathSegment::sequence(asns)
                    }
                })
                .collect(),
        })
    }

    // A small content space so interning hits existing entries often.
    fn attrs_strategy() -> impl Strategy<Value = PathAttributes> {
        (0u32..4, 0u32..3).prop_map(|(lp, asn)| PathAttributes {
            local_pref: lp,
            as_path: AsPath::from_sequence(vec![65000 + asn]),
            nexthop: Addr::V4(Ipv4Addr::new(192, 0, 2, 1)),
            ..Default::default()
        })
    }

    #[derive(Debug, Clone)]
    enum StoreOp {
        Intern(PathAttributes),
        Acquire(usize),
        Release(usize),
    }

    fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
        prop_oneof![
            attrs_strategy().prop_map(StoreOp::Intern),
            any::<usize>().prop_map(StoreOp::Acquire),
            any::<usize>().prop_map(StoreOp::Release),
        ]
    }

    proptest! {
        /// Property: host bits are always unset after construction
        #[test]
        fn prop_host_bits_always_unset(
            p4 in ipv4_prefix_strategy(),
            p6 in ipv6_prefix_strategy(),
        ) {
            prop_assert!(p4.host_bits_are_unset(), "{p4} has host bits set");
            prop_assert!(p6.host_bits_are_unset(), "{p6} has host bits set");
        }

        /// Property: a prefix built from an address contains that address
        /// and is within every shorter prefix built from it
        #[test]
        fn prop_prefix_from_addr_contains(bits in any::<u32>(), len in 0u8..=32, shorter in 0u8..=32) {
            let addr = Addr::V4(Ipv4Addr::from(bits));
            let p = Prefix::from_addr(&addr, len).unwrap();
            prop_assert!(p.contains(&addr));
            let q = Prefix::from_addr(&addr, shorter.min(len)).unwrap();
            prop_assert!(p.within(&q));
        }

        /// Property: prefixes survive a display/parse cycle
        #[test]
        fn prop_prefix_display_parse(p in ipv6_prefix_strategy()) {
            let parsed: Prefix = p.to_string().parse().unwrap();
            prop_assert_eq!(parsed, Prefix::V6(p));
        }

        /// Property: prepending n copies of an AS adds n to the path length
        /// and makes it the neighbor AS
        #[test]
        fn prop_prepend_length(path in as_path_strategy(), asn in 1u32..70000, n in 1u8..10) {
            let prepended = path.prepend(asn, n);
            prop_assert_eq!(prepended.length(), path.length() + usize::from(n));
            prop_assert_eq!(prepended.neighbor_as(), Some(asn));
        }

        /// Property: the wire encoding is two header bytes per segment plus
        /// four bytes per AS
        #[test]
        fn prop_wire_length(path in as_path_strategy()) {
            let ases: usize = path.segments.iter().map(|s| s.value.len()).sum();
            prop_assert_eq!(
                path.to_wire().len(),
                2 * path.segments.len() + 4 * ases
            );
        }

        /// Property: the store's count for every content equals the number
        /// of live handles for it, and entries exist exactly while counted
        #[test]
        fn prop_refcount_matches_handles(ops in prop::collection::vec(store_op_strategy(), 1..64)) {
            let mut store = AttrStore::new(DEFAULT_ATTR_LIMIT, discard_logger());
            let mut live: Vec<AttrHandle> = Vec::new();

            for op in ops {
                match op {
                    StoreOp::Intern(a) => live.push(store.intern(a).unwrap()),
                    StoreOp::Acquire(i) if !live.is_empty() => {
                        let h = store.acquire(&live[i % live.len()]);
                        live.push(h);
                    }
                    StoreOp::Release(i) if !live.is_empty() => {
                        let h = live.swap_remove(i % live.len());
                        let content = (*h).clone();
                        let others = live.iter().filter(|o| ***o == content).count();
                        let freed = store.release(h);
                        prop_assert_eq!(freed, others == 0);
                    }
                    _ => {}
                }

                for h in &live {
                    let expected = live.iter().filter(|o| o.ptr_eq(h)).count() as u64;
                    prop_assert_eq!(store.refcount(h), expected);
                }
                prop_assert_eq!(store.stats().references, live.len() as u64);
            }

            for h in live.drain(..) {
                store.release(h);
            }
            prop_assert!(store.is_empty());
        }
    }
}
