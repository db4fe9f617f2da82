// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The filter engine. Operators describe import and export policy as an
//! ordered list of rules. Each rule has a match predicate, a verdict and a
//! list of attribute changes; the rules that select a peer form its chain.
//!
//! A chain is evaluated top to bottom. Every matching rule applies its
//! attribute changes at once, so later rules see the changed attributes,
//! and its verdict replaces the running verdict. A matching `quick` rule
//! ends evaluation. When nothing matched the RIB's default verdict stands.
//!
//! Evaluation is a pure function of the chain, the peer, the prefix and the
//! attributes.

use crate::peer::PeerConfig;
use rib::attr::{
    AsSpec, Community, ExtCommunity, NexthopMode, Origin, PathAttributes,
};
use rib::{Addr, Aid, PeerId, Prefix};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Comparison of a numeric property against configured values.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub enum CmpOp {
    Eq(u32),
    Ne(u32),
    Lt(u32),
    Le(u32),
    Gt(u32),
    Ge(u32),
    /// Inside the inclusive range.
    Range(u32, u32),
    /// Outside the inclusive range.
    XRange(u32, u32),
}

impl CmpOp {
    pub fn matches(&self, v: u32) -> bool {
        match *self {
            CmpOp::Eq(x) => v == x,
            CmpOp::Ne(x) => v != x,
            CmpOp::Lt(x) => v < x,
            CmpOp::Le(x) => v <= x,
            CmpOp::Gt(x) => v > x,
            CmpOp::Ge(x) => v >= x,
            CmpOp::Range(lo, hi) => lo <= v && v <= hi,
            CmpOp::XRange(lo, hi) => v < lo || v > hi,
        }
    }
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub enum Verdict {
    Allow,
    Deny,
}

/// The verdict of a rule. `Match` rules only apply their attribute changes.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub enum FilterAction {
    Match,
    Allow,
    Deny,
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub enum PeerSelector {
    All,
    Peer(PeerId),
    Group(u32),
}

/// The peer a chain is evaluated for: the sender on import, the receiver
/// on export.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FilterPeer {
    pub id: PeerId,
    pub remote_as: u32,
    pub local_as: u32,
    pub remote_addr: Addr,
    pub ebgp: bool,
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct PrefixMatch {
    pub prefix: Prefix,
    /// Allowed lengths of more specific routes. Without it only the exact
    /// prefix matches.
    #[serde(default)]
    pub len: Option<CmpOp>,
}

impl PrefixMatch {
    fn matches(&self, prefix: &Prefix) -> bool {
        if !prefix.within(&self.prefix) {
            return false;
        }
        match self.len {
            Some(op) => op.matches(u32::from(prefix.length())),
            None => prefix.length() == self.prefix.length(),
        }
    }
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct PrefixLenMatch {
    #[serde(default)]
    pub aid: Option<Aid>,
    pub op: CmpOp,
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub enum AsnMatch {
    Value(CmpOp),
    NeighborAs,
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct AsMatch {
    pub spec: AsSpec,
    pub asn: AsnMatch,
}

impl AsMatch {
    pub fn matches(&self, attrs: &PathAttributes, neighbor_as: u32) -> bool {
        attrs.as_path.matches(self.spec, |a| match self.asn {
            AsnMatch::Value(op) => op.matches(a),
            AsnMatch::NeighborAs => a == neighbor_as,
        })
    }
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub enum AsLenMatch {
    /// Compare the AS path length.
    Length(CmpOp),
    /// Matches when some AS repeats more than this many times in a row.
    MaxSequence(u32),
}

impl AsLenMatch {
    fn matches(&self, attrs: &PathAttributes) -> bool {
        match *self {
            AsLenMatch::Length(op) => {
                op.matches(u32::try_from(attrs.as_path.length()).unwrap_or(u32::MAX))
            }
            AsLenMatch::MaxSequence(n) => {
                attrs.as_path.max_sequence() > n as usize
            }
        }
    }
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub enum CommunityPart {
    Value(u16),
    /// `*`
    Any,
    /// The AS of the peer the chain is evaluated for.
    NeighborAs,
}

impl CommunityPart {
    fn matches(&self, v: u16, neighbor_as: u32) -> bool {
        match *self {
            CommunityPart::Value(x) => v == x,
            CommunityPart::Any => true,
            CommunityPart::NeighborAs => u32::from(v) == neighbor_as,
        }
    }

    fn resolve(&self, neighbor_as: u32) -> Option<u16> {
        match *self {
            CommunityPart::Value(x) => Some(x),
            CommunityPart::Any => None,
            CommunityPart::NeighborAs => u16::try_from(neighbor_as).ok(),
        }
    }
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct CommunityPattern {
    pub asn: CommunityPart,
    pub value: CommunityPart,
}

impl CommunityPattern {
    pub fn exact(c: Community) -> Self {
        Self {
            asn: CommunityPart::Value(c.asn),
            value: CommunityPart::Value(c.value),
        }
    }

    pub fn matches(&self, c: &Community, neighbor_as: u32) -> bool {
        self.asn.matches(c.asn, neighbor_as)
            && self.value.matches(c.value, neighbor_as)
    }

    /// The single community this pattern names, if it names one.
    pub fn resolve(&self, neighbor_as: u32) -> Option<Community> {
        Some(Community::new(
            self.asn.resolve(neighbor_as)?,
            self.value.resolve(neighbor_as)?,
        ))
    }

    pub fn matches_any(&self, attrs: &PathAttributes, neighbor_as: u32) -> bool {
        attrs
            .communities
            .iter()
            .any(|c| self.matches(c, neighbor_as))
    }
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct ExtCommunityPattern {
    pub typ: u8,
    pub subtype: u8,
    /// Any value when unset.
    #[serde(default)]
    pub value: Option<u64>,
}

impl ExtCommunityPattern {
    pub fn matches(&self, c: &ExtCommunity) -> bool {
        c.typ == self.typ
            && c.subtype == self.subtype
            && self.value.map_or(true, |v| v == c.value)
    }
}

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub enum NexthopMatch {
    Addr(Addr),
    /// The address of the peer the chain is evaluated for.
    Neighbor,
}

/// All present conditions must hold. An empty match matches everything.
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
pub struct FilterMatch {
    pub prefix: Option<PrefixMatch>,
    pub prefixlen: Option<PrefixLenMatch>,
    pub as_path: Option<AsMatch>,
    pub as_len: Option<AsLenMatch>,
    pub community: Option<CommunityPattern>,
    pub ext_community: Option<ExtCommunityPattern>,
    pub nexthop: Option<NexthopMatch>,
}

impl FilterMatch {
    pub fn matches(
        &self,
        peer: &FilterPeer,
        prefix: &Prefix,
        attrs: &PathAttributes,
    ) -> bool {
        if let Some(m) = &self.prefix {
            if !m.matches(prefix) {
                return false;
            }
        }
        if let Some(m) = &self.prefixlen {
            if m.aid.is_some_and(|aid| aid != prefix.aid())
                || !m.op.matches(u32::from(prefix.length()))
            {
                return false;
            }
        }
        if let Some(m) = &self.as_path {
            if !m.matches(attrs, peer.remote_as) {
                return false;
            }
        }
        if let Some(m) = &self.as_len {
            if !m.matches(attrs) {
                return false;
            }
        }
        if let Some(m) = &self.community {
            if !m.matches_any(attrs, peer.remote_as) {
                return false;
            }
        }
        if let Some(m) = &self.ext_community {
            if !attrs.ext_communities.iter().any(|c| m.matches(c)) {
                return false;
            }
        }
        if let Some(m) = &self.nexthop {
            let want = match m {
                NexthopMatch::Addr(a) => *a,
                NexthopMatch::Neighbor => peer.remote_addr,
            };
            if attrs.nexthop != want {
                return false;
            }
        }
        true
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub enum SetAction {
    LocalPref(u32),
    RelativeLocalPref(i64),
    Med(u32),
    RelativeMed(i64),
    Weight(u32),
    RelativeWeight(i64),
    PrependSelf(u8),
    PrependPeer(u8),
    Nexthop(Addr),
    NexthopReject,
    NexthopBlackhole,
    NexthopNoModify,
    NexthopSelf,
    SetCommunity(CommunityPattern),
    DelCommunity(CommunityPattern),
    SetExtCommunity(ExtCommunity),
    DelExtCommunity(ExtCommunityPattern),
    RtLabel(String),
    ClearRtLabel,
    Origin(Origin),
    PfTable(String),
}

fn adjust(v: u32, delta: i64) -> u32 {
    (i64::from(v) + delta).clamp(0, i64::from(u32::MAX)) as u32
}

impl SetAction {
    pub fn apply(&self, attrs: &mut PathAttributes, peer: &FilterPeer) {
        match self {
            SetAction::LocalPref(v) => attrs.local_pref = *v,
            SetAction::RelativeLocalPref(d) => {
                attrs.local_pref = adjust(attrs.local_pref, *d)
            }
            SetAction::Med(v) => attrs.med = Some(*v),
            SetAction::RelativeMed(d) => {
                attrs.med = Some(adjust(attrs.med.unwrap_or(0), *d))
            }
            SetAction::Weight(v) => attrs.weight = *v,
            SetAction::RelativeWeight(d) => {
                attrs.weight = adjust(attrs.weight, *d)
            }
            SetAction::PrependSelf(n) => {
                attrs.as_path = attrs.as_path.prepend(peer.local_as, *n)
            }
            SetAction::PrependPeer(n) => {
                attrs.as_path = attrs.as_path.prepend(peer.remote_as, *n)
            }
            SetAction::Nexthop(a) => {
                attrs.nexthop = *a;
                attrs.nexthop_mode = NexthopMode::Normal;
            }
            SetAction::NexthopReject => attrs.nexthop_mode = NexthopMode::Reject,
            SetAction::NexthopBlackhole => {
                attrs.nexthop_mode = NexthopMode::Blackhole
            }
            SetAction::NexthopNoModify => {
                attrs.nexthop_mode = NexthopMode::NoModify
            }
            SetAction::NexthopSelf => attrs.nexthop_mode = NexthopMode::SelfAddr,
            SetAction::SetCommunity(p) => {
                if let Some(c) = p.resolve(peer.remote_as) {
                    attrs.communities.insert(c);
                }
            }
            SetAction::DelCommunity(p) => attrs
                .communities
                .retain(|c| !p.matches(c, peer.remote_as)),
            SetAction::SetExtCommunity(c) => {
                attrs.ext_communities.insert(*c);
            }
            SetAction::DelExtCommunity(p) => {
                attrs.ext_communities.retain(|c| !p.matches(c))
            }
            SetAction::RtLabel(l) => attrs.rtlabel = Some(l.clone()),
            SetAction::ClearRtLabel => attrs.rtlabel = None,
            SetAction::Origin(o) => attrs.origin = *o,
            SetAction::PfTable(t) => attrs.pftable = Some(t.clone()),
        }
    }

    /// Reject actions that can never be applied.
    pub fn check(&self) -> Result<(), String> {
        match self {
            SetAction::SetCommunity(p)
                if p.asn == CommunityPart::Any
                    || p.value == CommunityPart::Any =>
            {
                Err("cannot set a community with a wildcard".into())
            }
            SetAction::Nexthop(a) if a.is_unspecified() => {
                Err("cannot set an unspecified next hop".into())
            }
            SetAction::RtLabel(l) | SetAction::PfTable(l) if l.is_empty() => {
                Err("empty label".into())
            }
            _ => Ok(()),
        }
    }
}

/// Apply a list of attribute changes outside of a filter chain, as done
/// for network and rdomain attribute sets.
pub fn apply_set(
    set: &[SetAction],
    attrs: &mut PathAttributes,
    peer: &FilterPeer,
) {
    for s in set {
        s.apply(attrs, peer);
    }
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct FilterRule {
    pub dir: Direction,
    pub action: FilterAction,
    #[serde(default)]
    pub quick: bool,
    #[serde(default = "all_peers")]
    pub peer: PeerSelector,
    /// Restrict the rule to peers feeding this RIB.
    #[serde(default)]
    pub rib: Option<String>,
    #[serde(default, rename = "match")]
    pub matches: FilterMatch,
    #[serde(default)]
    pub set: Vec<SetAction>,
}

fn all_peers() -> PeerSelector {
    PeerSelector::All
}

impl FilterRule {
    pub fn new(dir: Direction, action: FilterAction) -> Self {
        Self {
            dir,
            action,
            quick: false,
            peer: PeerSelector::All,
            rib: None,
            matches: FilterMatch::default(),
            set: Vec::new(),
        }
    }

    pub fn applies_to(&self, dir: Direction, peer: &PeerConfig) -> bool {
        let selected = match self.peer {
            PeerSelector::All => true,
            PeerSelector::Peer(id) => id == peer.id,
            PeerSelector::Group(g) => g == peer.groupid,
        };
        self.dir == dir
            && selected
            && self.rib.as_ref().map_or(true, |r| *r == peer.rib)
    }
}

/// The rules that select one peer in one direction, in configured order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterChain {
    pub rules: Vec<FilterRule>,
}

impl FilterChain {
    pub fn build(rules: &[FilterRule], dir: Direction, peer: &PeerConfig) -> Self {
        Self {
            rules: rules
                .iter()
                .filter(|r| r.applies_to(dir, peer))
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run the chain. Returns the attributes to use when the final verdict
    /// is allow, borrowed when no rule changed them.
    pub fn evaluate<'a>(
        &self,
        default: Verdict,
        peer: &FilterPeer,
        prefix: &Prefix,
        attrs: &'a PathAttributes,
    ) -> Option<Cow<'a, PathAttributes>> {
        let mut current = Cow::Borrowed(attrs);
        let mut verdict = default;

        for rule in &self.rules {
            if !rule.matches.matches(peer, prefix, &current) {
                continue;
            }
            if !rule.set.is_empty() {
                let a = current.to_mut();
                for s in &rule.set {
                    s.apply(a, peer);
                }
            }
            match rule.action {
                FilterAction::Allow => verdict = Verdict::Allow,
                FilterAction::Deny => verdict = Verdict::Deny,
                FilterAction::Match => {}
            }
            if rule.quick {
                break;
            }
        }

        match verdict {
            Verdict::Allow => Some(current),
            Verdict::Deny => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use rde_common::{cidr, ip};
    use rib::attr::AsPath;

    fn peer() -> FilterPeer {
        FilterPeer {
            id: 1,
            remote_as: 65001,
            local_as: 65000,
            remote_addr: ip!("192.0.2.1"),
            ebgp: true,
        }
    }

    fn attrs(asns: Vec<u32>) -> PathAttributes {
        PathAttributes {
            as_path: AsPath::from_sequence(asns),
            nexthop: ip!("192.0.2.1"),
            ..Default::default()
        }
    }

    fn rule(action: FilterAction) -> FilterRule {
        FilterRule::new(Direction::Incoming, action)
    }

    #[test]
    fn test_cmp_ops() {
        assert!(CmpOp::Range(8, 24).matches(8));
        assert!(CmpOp::Range(8, 24).matches(24));
        assert!(!CmpOp::Range(8, 24).matches(25));
        assert!(CmpOp::XRange(8, 24).matches(25));
        assert!(!CmpOp::XRange(8, 24).matches(8));
        assert!(CmpOp::Ne(3).matches(4));
        assert!(CmpOp::Le(3).matches(3) && !CmpOp::Lt(3).matches(3));
        assert!(CmpOp::Ge(3).matches(3) && !CmpOp::Gt(3).matches(3));
    }

    #[test]
    fn test_quick_deny_on_long_as_path() {
        let mut deny = rule(FilterAction::Deny);
        deny.quick = true;
        deny.matches.as_len = Some(AsLenMatch::Length(CmpOp::Gt(5)));
        let mut lp = rule(FilterAction::Allow);
        lp.set.push(SetAction::LocalPref(200));
        let chain = FilterChain {
            rules: vec![deny, lp],
        };
        let p: Prefix = cidr!("10.0.0.0/24");

        let long = attrs(vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(chain.evaluate(Verdict::Allow, &peer(), &p, &long), None);

        let short = attrs(vec![1, 2, 3]);
        let out = chain.evaluate(Verdict::Allow, &peer(), &p, &short).unwrap();
        assert_eq!(out.local_pref, 200);
    }

    #[test]
    fn test_last_match_wins_without_quick() {
        let chain = FilterChain {
            rules: vec![rule(FilterAction::Deny), rule(FilterAction::Allow)],
        };
        let p: Prefix = cidr!("10.0.0.0/24");
        let a = attrs(vec![65001]);
        let out = chain.evaluate(Verdict::Deny, &peer(), &p, &a);
        assert!(matches!(out, Some(Cow::Borrowed(_))));

        let chain = FilterChain {
            rules: vec![rule(FilterAction::Allow), rule(FilterAction::Deny)],
        };
        assert!(chain.evaluate(Verdict::Allow, &peer(), &p, &a).is_none());
    }

    #[test]
    fn test_default_verdict_when_nothing_matches() {
        let mut r = rule(FilterAction::Deny);
        r.matches.prefix = Some(PrefixMatch {
            prefix: cidr!("192.168.0.0/16"),
            len: None,
        });
        let chain = FilterChain { rules: vec![r] };
        let a = attrs(vec![65001]);
        let p: Prefix = cidr!("10.0.0.0/24");
        assert!(chain.evaluate(Verdict::Allow, &peer(), &p, &a).is_some());
        assert!(chain.evaluate(Verdict::Deny, &peer(), &p, &a).is_none());
    }

    #[test]
    fn test_changes_accumulate_and_later_rules_see_them() {
        let mut tag = rule(FilterAction::Match);
        tag.set
            .push(SetAction::SetCommunity(CommunityPattern::exact(Community::new(65000, 1))));
        tag.set.push(SetAction::RelativeLocalPref(-30));
        let mut on_tag = rule(FilterAction::Allow);
        on_tag.matches.community =
            Some(CommunityPattern::exact(Community::new(65000, 1)));
        on_tag.set.push(SetAction::Med(7));

        let chain = FilterChain {
            rules: vec![tag, on_tag],
        };
        let a = attrs(vec![65001]);
        let p: Prefix = cidr!("10.0.0.0/24");
        let out = chain
            .evaluate(Verdict::Deny, &peer(), &p, &a)
            .unwrap()
            .into_owned();
        assert_eq!(out.local_pref, 70);
        assert_eq!(out.med, Some(7));
        assert!(out.has_community(Community::new(65000, 1)));
        // the input is never touched
        assert!(a.communities.is_empty());
    }

    #[test]
    fn test_prefix_match() {
        let exact = PrefixMatch {
            prefix: cidr!("10.0.0.0/8"),
            len: None,
        };
        assert!(exact.matches(&cidr!("10.0.0.0/8")));
        assert!(!exact.matches(&cidr!("10.1.0.0/16")));

        let longer = PrefixMatch {
            prefix: cidr!("10.0.0.0/8"),
            len: Some(CmpOp::Range(16, 24)),
        };
        assert!(longer.matches(&cidr!("10.1.0.0/16")));
        assert!(longer.matches(&cidr!("10.1.2.0/24")));
        assert!(!longer.matches(&cidr!("10.1.2.0/25")));
        assert!(!longer.matches(&cidr!("11.0.0.0/16")));
        assert!(!longer.matches(&cidr!("2001:db8::/32")));
    }

    #[test]
    fn test_as_match_neighbor_as() {
        let m = AsMatch {
            spec: AsSpec::Peer,
            asn: AsnMatch::NeighborAs,
        };
        assert!(m.matches(&attrs(vec![65001, 65002]), 65001));
        assert!(!m.matches(&attrs(vec![65002, 65001]), 65001));

        let src = AsMatch {
            spec: AsSpec::Source,
            asn: AsnMatch::Value(CmpOp::Range(64512, 65534)),
        };
        assert!(src.matches(&attrs(vec![3356, 65010]), 0));
        assert!(!src.matches(&attrs(vec![65010, 3356]), 0));
    }

    #[test]
    fn test_community_patterns() {
        let any_of_peer = CommunityPattern {
            asn: CommunityPart::NeighborAs,
            value: CommunityPart::Any,
        };
        assert!(any_of_peer.matches(&Community::new(65001, 5), 65001));
        assert!(!any_of_peer.matches(&Community::new(65002, 5), 65001));
        assert_eq!(any_of_peer.resolve(65001), None);
        // a 4-byte AS can never be the high half of a community
        assert!(!any_of_peer.matches(&Community::new(1, 5), 4200000001));

        let mut a = attrs(vec![65001]);
        a.communities.insert(Community::new(65001, 1));
        a.communities.insert(Community::new(65001, 2));
        a.communities.insert(Community::new(65002, 1));
        SetAction::DelCommunity(any_of_peer).apply(&mut a, &peer());
        assert_eq!(
            a.communities.into_iter().collect::<Vec<_>>(),
            vec![Community::new(65002, 1)]
        );
    }

    #[test]
    fn test_relative_saturates() {
        let mut a = attrs(vec![]);
        a.local_pref = 10;
        SetAction::RelativeLocalPref(-100).apply(&mut a, &peer());
        assert_eq!(a.local_pref, 0);
        a.weight = u32::MAX - 1;
        SetAction::RelativeWeight(10).apply(&mut a, &peer());
        assert_eq!(a.weight, u32::MAX);
        SetAction::RelativeMed(5).apply(&mut a, &peer());
        assert_eq!(a.med, Some(5));
    }

    #[test]
    fn test_set_actions() {
        let mut a = attrs(vec![65001]);
        let p = peer();
        apply_set(
            &[
                SetAction::PrependSelf(2),
                SetAction::PrependPeer(1),
                SetAction::NexthopBlackhole,
                SetAction::RtLabel("red".into()),
                SetAction::PfTable("bad".into()),
                SetAction::Origin(Origin::Incomplete),
                SetAction::SetExtCommunity(ExtCommunity::route_target(65000, 1)),
            ],
            &mut a,
            &p,
        );
        assert_eq!(
            a.as_path,
            AsPath::from_sequence(vec![65001, 65000, 65000, 65001])
        );
        assert_eq!(a.nexthop_mode, NexthopMode::Blackhole);
        assert_eq!(a.rtlabel.as_deref(), Some("red"));
        assert_eq!(a.pftable.as_deref(), Some("bad"));
        assert_eq!(a.origin, Origin::Incomplete);

        SetAction::DelExtCommunity(ExtCommunityPattern {
            typ: ExtCommunity::TYPE_TWO_OCTET_AS,
            subtype: ExtCommunity::SUBTYPE_ROUTE_TARGET,
            value: None,
        })
        .apply(&mut a, &p);
        assert!(a.ext_communities.is_empty());

        SetAction::Nexthop(ip!("198.51.100.1")).apply(&mut a, &p);
        assert_eq!(a.nexthop_mode, NexthopMode::Normal);
        SetAction::ClearRtLabel.apply(&mut a, &p);
        assert_eq!(a.rtlabel, None);
    }

    #[test]
    fn test_nexthop_match() {
        let mut r = rule(FilterAction::Deny);
        r.matches.nexthop = Some(NexthopMatch::Neighbor);
        let chain = FilterChain { rules: vec![r] };
        let p: Prefix = cidr!("10.0.0.0/24");
        let mut a = attrs(vec![65001]);
        assert!(chain.evaluate(Verdict::Allow, &peer(), &p, &a).is_none());
        a.nexthop = ip!("192.0.2.77");
        assert!(chain.evaluate(Verdict::Allow, &peer(), &p, &a).is_some());
    }

    #[test]
    fn test_chain_build_selects_peer_and_rib() {
        let mut conf = PeerConfig::new(7, ip!("192.0.2.7"), 65007);
        conf.groupid = 3;

        let mut for_peer = rule(FilterAction::Deny);
        for_peer.peer = PeerSelector::Peer(7);
        let mut for_other = rule(FilterAction::Deny);
        for_other.peer = PeerSelector::Peer(8);
        let mut for_group = rule(FilterAction::Allow);
        for_group.peer = PeerSelector::Group(3);
        let mut other_rib = rule(FilterAction::Allow);
        other_rib.rib = Some("other".into());
        let outbound = FilterRule::new(Direction::Outgoing, FilterAction::Allow);

        let rules = vec![
            for_peer.clone(),
            for_other,
            for_group.clone(),
            other_rib,
            outbound.clone(),
        ];
        let chain = FilterChain::build(&rules, Direction::Incoming, &conf);
        assert_eq!(chain.rules, vec![for_peer, for_group]);
        let chain = FilterChain::build(&rules, Direction::Outgoing, &conf);
        assert_eq!(chain.rules, vec![outbound]);
    }

    #[test]
    fn test_set_action_check() {
        assert!(SetAction::SetCommunity(CommunityPattern {
            asn: CommunityPart::Any,
            value: CommunityPart::Value(1)
        })
        .check()
        .is_err());
        assert!(SetAction::Nexthop(Addr::Unspec).check().is_err());
        assert!(SetAction::LocalPref(1).check().is_ok());
    }
}
