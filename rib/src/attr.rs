// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Path attributes as stored in the RIB. A `PathAttributes` value is plain
//! data; sharing and reference counting live in [`crate::store`].

use crate::types::{Addr, Aid};
use crate::DEFAULT_LOCAL_PREF;
use itertools::Itertools;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use std::net::Ipv4Addr;
use std::str::FromStr;

#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Clone,
    Copy,
    TryFromPrimitive,
    IntoPrimitive,
    Serialize,
    Deserialize,
    JsonSchema,
    Default,
)]
#[repr(u8)]
pub enum Origin {
    #[default]
    Igp = 0,
    Egp = 1,
    Incomplete = 2,
}

impl Display for Origin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Igp => write!(f, "IGP"),
            Origin::Egp => write!(f, "EGP"),
            Origin::Incomplete => write!(f, "incomplete"),
        }
    }
}

#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Copy,
    Clone,
    TryFromPrimitive,
    IntoPrimitive,
    Serialize,
    Deserialize,
    JsonSchema,
)]
#[repr(u8)]
pub enum AsPathType {
    AsSet = 1,
    AsSequence = 2,
}

#[derive(
    Debug, PartialEq, Eq, Hash, Clone, Serialize, Deserialize, JsonSchema,
)]
pub struct AsPathSegment {
    pub typ: AsPathType,
    pub value: Vec<u32>,
}

impl AsPathSegment {
    pub fn sequence(value: Vec<u32>) -> Self {
        Self {
            typ: AsPathType::AsSequence,
            value,
        }
    }

    pub fn set(value: Vec<u32>) -> Self {
        Self {
            typ: AsPathType::AsSet,
            value,
        }
    }

    /// Contribution of this segment to the path length: every AS of a
    /// sequence counts, a set counts once.
    pub fn length(&self) -> usize {
        match self.typ {
            AsPathType::AsSequence => self.value.len(),
            AsPathType::AsSet => 1,
        }
    }
}

/// Which AS of a path an AS match looks at.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub enum AsSpec {
    /// Any AS in the path.
    All,
    /// The AS that originated the route, the last one in the path.
    Source,
    /// Any AS except the originating one.
    Transit,
    /// The neighboring AS, the first one in the path.
    Peer,
    /// Matches the empty path, the AS number is ignored.
    Empty,
}

#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Clone,
    Default,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub struct AsPath {
    pub segments: Vec<AsPathSegment>,
}

impl AsPath {
    pub fn from_sequence(asns: Vec<u32>) -> Self {
        if asns.is_empty() {
            return Self::default();
        }
        Self {
            segments: vec![AsPathSegment::sequence(asns)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.value.is_empty())
    }

    /// Path length as used by the decision process.
    pub fn length(&self) -> usize {
        self.segments.iter().map(AsPathSegment::length).sum()
    }

    /// The AS of the neighbor that sent the path. Undefined when the path
    /// is empty or starts with a set.
    pub fn neighbor_as(&self) -> Option<u32> {
        match self.segments.first() {
            Some(s) if s.typ == AsPathType::AsSequence => {
                s.value.first().copied()
            }
            _ => None,
        }
    }

    /// The AS that originated the path.
    pub fn source_as(&self) -> Option<u32> {
        self.segments.last().and_then(|s| s.value.last().copied())
    }

    pub fn contains(&self, asn: u32) -> bool {
        self.segments.iter().any(|s| s.value.contains(&asn))
    }

    /// Return a new path with `asn` prepended `count` times.
    pub fn prepend(&self, asn: u32, count: u8) -> AsPath {
        if count == 0 {
            return self.clone();
        }
        let mut lead = vec![asn; usize::from(count)];
        let mut segments = self.segments.clone();
        match segments.first_mut() {
            Some(first) if first.typ == AsPathType::AsSequence => {
                lead.append(&mut first.value);
                first.value = lead;
            }
            _ => segments.insert(0, AsPathSegment::sequence(lead)),
        }
        AsPath { segments }
    }

    /// Length of the longest run of the same AS inside a sequence.
    pub fn max_sequence(&self) -> usize {
        let mut max = 0;
        for s in &self.segments {
            if s.typ != AsPathType::AsSequence {
                continue;
            }
            let mut run = 0;
            let mut last = None;
            for asn in &s.value {
                if last == Some(asn) {
                    run += 1;
                } else {
                    run = 1;
                    last = Some(asn);
                }
                max = max.max(run);
            }
        }
        max
    }

    /// Check the ASes selected by `spec` against `pred`.
    pub fn matches<F>(&self, spec: AsSpec, pred: F) -> bool
    where
        F: Fn(u32) -> bool,
    {
        match spec {
            AsSpec::Empty => self.is_empty(),
            AsSpec::All => self.segments.iter().flat_map(|s| &s.value).any(|a| pred(*a)),
            AsSpec::Peer => self.neighbor_as().is_some_and(pred),
            AsSpec::Source => self.source_as().is_some_and(pred),
            AsSpec::Transit => {
                let all: Vec<u32> =
                    self.segments.iter().flat_map(|s| s.value.iter().copied()).collect();
                match all.split_last() {
                    Some((_, transit)) => transit.iter().any(|a| pred(*a)),
                    None => false,
                }
            }
        }
    }

    /// Rebuild the real path from a 2-byte path that carries the transition
    /// AS and the 4-byte AS4_PATH sent alongside it (RFC 6793). An AS4 path
    /// longer than the 2-byte path is ignored.
    pub fn merge_as4(&self, as4: &AsPath) -> AsPath {
        let len2 = self.length();
        let len4 = as4.length();
        if len4 > len2 {
            return self.clone();
        }
        let mut keep = len2 - len4;
        let mut segments = Vec::new();
        for s in &self.segments {
            if keep == 0 {
                break;
            }
            match s.typ {
                AsPathType::AsSet => {
                    segments.push(s.clone());
                    keep -= 1;
                }
                AsPathType::AsSequence => {
                    let n = keep.min(s.value.len());
                    segments.push(AsPathSegment::sequence(s.value[..n].to_vec()));
                    keep -= n;
                }
            }
        }
        segments.extend(as4.segments.iter().cloned());

        let mut merged: Vec<AsPathSegment> = Vec::with_capacity(segments.len());
        for s in segments {
            match merged.last_mut() {
                Some(last)
                    if last.typ == AsPathType::AsSequence
                        && s.typ == AsPathType::AsSequence =>
                {
                    last.value.extend(s.value)
                }
                _ => merged.push(s),
            }
        }
        AsPath { segments: merged }
    }

    /// Encode the path with 4-byte AS numbers as it appears in an AS_PATH
    /// attribute. Segments longer than 255 ASes are split.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for s in &self.segments {
            for chunk in s.value.chunks(usize::from(u8::MAX)) {
                buf.push(s.typ.into());
                buf.push(chunk.len() as u8);
                for asn in chunk {
                    buf.extend_from_slice(&asn.to_be_bytes());
                }
            }
        }
        buf
    }
}

impl Display for AsPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for s in &self.segments {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            match s.typ {
                AsPathType::AsSequence => write!(f, "{}", s.value.iter().join(" "))?,
                AsPathType::AsSet => {
                    write!(f, "{{ {} }}", s.value.iter().join(" "))?
                }
            }
        }
        Ok(())
    }
}

/// A standard RFC 1997 community.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub struct Community {
    pub asn: u16,
    pub value: u16,
}

impl Community {
    pub const WELLKNOWN: u16 = 0xffff;

    /// Not advertised outside the local AS or confederation.
    pub const NO_EXPORT: Community = Community::new(Self::WELLKNOWN, 0xff01);
    /// Not advertised to any peer.
    pub const NO_ADVERTISE: Community = Community::new(Self::WELLKNOWN, 0xff02);
    /// Not advertised to external peers, confederation members included.
    pub const NO_EXPORT_SUBCONFED: Community =
        Community::new(Self::WELLKNOWN, 0xff03);
    pub const NO_PEER: Community = Community::new(Self::WELLKNOWN, 0xff04);
    pub const GRACEFUL_SHUTDOWN: Community =
        Community::new(Self::WELLKNOWN, 0x0000);

    pub const fn new(asn: u16, value: u16) -> Self {
        Self { asn, value }
    }

    fn well_known_name(&self) -> Option<&'static str> {
        match *self {
            Self::NO_EXPORT => Some("NO_EXPORT"),
            Self::NO_ADVERTISE => Some("NO_ADVERTISE"),
            Self::NO_EXPORT_SUBCONFED => Some("NO_EXPORT_SUBCONFED"),
            Self::NO_PEER => Some("NO_PEER"),
            Self::GRACEFUL_SHUTDOWN => Some("GRACEFUL_SHUTDOWN"),
            _ => None,
        }
    }
}

impl From<u32> for Community {
    fn from(value: u32) -> Self {
        Self::new((value >> 16) as u16, value as u16)
    }
}

impl From<Community> for u32 {
    fn from(value: Community) -> Self {
        (u32::from(value.asn) << 16) | u32::from(value.value)
    }
}

impl Display for Community {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.well_known_name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{}:{}", self.asn, self.value),
        }
    }
}

impl FromStr for Community {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NO_EXPORT" => return Ok(Self::NO_EXPORT),
            "NO_ADVERTISE" => return Ok(Self::NO_ADVERTISE),
            "NO_EXPORT_SUBCONFED" => return Ok(Self::NO_EXPORT_SUBCONFED),
            "NO_PEER" => return Ok(Self::NO_PEER),
            "GRACEFUL_SHUTDOWN" => return Ok(Self::GRACEFUL_SHUTDOWN),
            _ => {}
        }
        let (asn, value) =
            s.split_once(':').ok_or("malformed community".to_string())?;
        Ok(Self::new(
            asn.parse().map_err(|_| "malformed community asn".to_string())?,
            value
                .parse()
                .map_err(|_| "malformed community value".to_string())?,
        ))
    }
}

/// An RFC 4360 extended community.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub struct ExtCommunity {
    pub typ: u8,
    pub subtype: u8,
    /// The 48 bit value field.
    pub value: u64,
}

impl ExtCommunity {
    pub const IANA: u8 = 0x80;
    /// Set when the community is not transitive across AS boundaries.
    pub const NON_TRANSITIVE: u8 = 0x40;

    pub const TYPE_TWO_OCTET_AS: u8 = 0x00;
    pub const TYPE_IPV4: u8 = 0x01;
    pub const TYPE_FOUR_OCTET_AS: u8 = 0x02;
    pub const TYPE_OPAQUE: u8 = 0x03;

    pub const SUBTYPE_ROUTE_TARGET: u8 = 0x02;
    pub const SUBTYPE_ROUTE_ORIGIN: u8 = 0x03;

    const VALUE_MASK: u64 = 0xffff_ffff_ffff;

    pub fn new(typ: u8, subtype: u8, value: u64) -> Self {
        Self {
            typ,
            subtype,
            value: value & Self::VALUE_MASK,
        }
    }

    pub fn two_octet_as(subtype: u8, asn: u16, local: u32) -> Self {
        Self::new(
            Self::TYPE_TWO_OCTET_AS,
            subtype,
            (u64::from(asn) << 32) | u64::from(local),
        )
    }

    pub fn four_octet_as(subtype: u8, asn: u32, local: u16) -> Self {
        Self::new(
            Self::TYPE_FOUR_OCTET_AS,
            subtype,
            (u64::from(asn) << 16) | u64::from(local),
        )
    }

    pub fn ipv4(subtype: u8, addr: Ipv4Addr, local: u16) -> Self {
        Self::new(
            Self::TYPE_IPV4,
            subtype,
            (u64::from(addr.to_bits()) << 16) | u64::from(local),
        )
    }

    pub fn route_target(asn: u32, local: u32) -> Self {
        match u16::try_from(asn) {
            Ok(asn) => Self::two_octet_as(Self::SUBTYPE_ROUTE_TARGET, asn, local),
            Err(_) => Self::four_octet_as(
                Self::SUBTYPE_ROUTE_TARGET,
                asn,
                local as u16,
            ),
        }
    }

    pub fn is_transitive(&self) -> bool {
        self.typ & Self::NON_TRANSITIVE == 0
    }

    /// The type with the IANA and transitivity bits cleared.
    pub fn base_type(&self) -> u8 {
        self.typ & !(Self::IANA | Self::NON_TRANSITIVE)
    }
}

impl Display for ExtCommunity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self.subtype {
            Self::SUBTYPE_ROUTE_TARGET => "rt",
            Self::SUBTYPE_ROUTE_ORIGIN => "soo",
            _ => {
                return write!(
                    f,
                    "{:#04x}/{:#04x} {:#014x}",
                    self.typ, self.subtype, self.value
                )
            }
        };
        match self.base_type() {
            Self::TYPE_TWO_OCTET_AS => write!(
                f,
                "{name} {}:{}",
                (self.value >> 32) as u16,
                self.value as u32
            ),
            Self::TYPE_FOUR_OCTET_AS => write!(
                f,
                "{name} {}:{}",
                (self.value >> 16) as u32,
                self.value as u16
            ),
            Self::TYPE_IPV4 => write!(
                f,
                "{name} {}:{}",
                Ipv4Addr::from_bits((self.value >> 16) as u32),
                self.value as u16
            ),
            _ => write!(f, "{name} {:#014x}", self.value),
        }
    }
}

impl FromStr for ExtCommunity {
    type Err = String;

    /// Parses `rt <admin>:<local>` and `soo <admin>:<local>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, rest) = s
            .split_once(' ')
            .ok_or("malformed extended community".to_string())?;
        let subtype = match kind {
            "rt" => Self::SUBTYPE_ROUTE_TARGET,
            "soo" => Self::SUBTYPE_ROUTE_ORIGIN,
            _ => return Err(format!("unknown extended community {kind}")),
        };
        let (admin, local) = rest
            .rsplit_once(':')
            .ok_or("malformed extended community".to_string())?;
        let local: u32 = local
            .parse()
            .map_err(|_| "malformed extended community value".to_string())?;
        if let Ok(addr) = admin.parse::<Ipv4Addr>() {
            let local = u16::try_from(local)
                .map_err(|_| "extended community value too large".to_string())?;
            return Ok(Self::ipv4(subtype, addr, local));
        }
        let asn: u32 = admin
            .parse()
            .map_err(|_| "malformed extended community asn".to_string())?;
        match u16::try_from(asn) {
            Ok(asn) => Ok(Self::two_octet_as(subtype, asn, local)),
            Err(_) => {
                let local = u16::try_from(local).map_err(|_| {
                    "extended community value too large".to_string()
                })?;
                Ok(Self::four_octet_as(subtype, asn, local))
            }
        }
    }
}

#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub struct Aggregator {
    pub asn: u32,
    pub addr: Ipv4Addr,
}

/// How the next hop of a route is to be treated.
#[derive(
    Debug,
    PartialEq,
    Eq,
    Hash,
    Copy,
    Clone,
    Default,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub enum NexthopMode {
    #[default]
    Normal,
    /// Install as a reject route.
    Reject,
    /// Install as a blackhole route.
    Blackhole,
    /// Pass the next hop unchanged, even to external peers.
    NoModify,
    /// Announce the session's local address as next hop.
    SelfAddr,
}

/// A complete set of path attributes. Two sets are the same stored entry
/// exactly when all fields compare equal.
#[derive(
    Debug, PartialEq, Eq, Hash, Clone, Serialize, Deserialize, JsonSchema,
)]
#[serde(default)]
pub struct PathAttributes {
    pub origin: Origin,
    pub as_path: AsPath,
    pub nexthop: Addr,
    pub nexthop_mode: NexthopMode,
    pub med: Option<u32>,
    pub local_pref: u32,
    pub weight: u32,
    pub communities: BTreeSet<Community>,
    pub ext_communities: BTreeSet<ExtCommunity>,
    pub atomic_aggregate: bool,
    pub aggregator: Option<Aggregator>,
    pub rtlabel: Option<String>,
    pub pftable: Option<String>,
}

impl Default for PathAttributes {
    fn default() -> Self {
        Self {
            origin: Origin::Igp,
            as_path: AsPath::default(),
            nexthop: Addr::Unspec,
            nexthop_mode: NexthopMode::Normal,
            med: None,
            local_pref: DEFAULT_LOCAL_PREF,
            weight: 0,
            communities: BTreeSet::new(),
            ext_communities: BTreeSet::new(),
            atomic_aggregate: false,
            aggregator: None,
            rtlabel: None,
            pftable: None,
        }
    }
}

impl PathAttributes {
    pub fn has_community(&self, c: Community) -> bool {
        self.communities.contains(&c)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AttrError {
    #[error("next hop missing")]
    MissingNexthop,

    #[error("invalid next hop {0}")]
    InvalidNexthop(Addr),

    #[error("empty as path segment")]
    EmptyAsSegment,

    #[error("empty as path from external peer")]
    EmptyAsPath,

    #[error("first as {found:?} does not match peer as {expected}")]
    FirstAsMismatch { expected: u32, found: Option<u32> },
}

/// What validation needs to know about the sender of an update.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext {
    pub aid: Aid,
    pub ebgp: bool,
    pub remote_as: u32,
    pub enforce_first_as: bool,
}

fn nexthop_fits(aid: Aid, nexthop: &Addr) -> bool {
    match (aid, nexthop) {
        (Aid::Inet, Addr::V4(_)) => true,
        (Aid::Inet6, Addr::V6 { .. }) => true,
        (Aid::VpnIpv4, Addr::V4(_) | Addr::Vpn4(_)) => true,
        _ => false,
    }
}

/// Check an attribute set received from a peer before it is stored.
pub fn validate(
    attrs: &PathAttributes,
    ctx: &ValidationContext,
) -> Result<(), AttrError> {
    if attrs.nexthop.is_unspecified() {
        return Err(AttrError::MissingNexthop);
    }
    if !nexthop_fits(ctx.aid, &attrs.nexthop) {
        return Err(AttrError::InvalidNexthop(attrs.nexthop));
    }
    match attrs.nexthop.ip() {
        Some(ip) if ip.is_multicast() || ip.is_loopback() => {
            return Err(AttrError::InvalidNexthop(attrs.nexthop));
        }
        _ => {}
    }

    if attrs.as_path.segments.iter().any(|s| s.value.is_empty()) {
        return Err(AttrError::EmptyAsSegment);
    }
    if ctx.ebgp && attrs.as_path.is_empty() {
        return Err(AttrError::EmptyAsPath);
    }
    if ctx.ebgp && ctx.enforce_first_as {
        let found = attrs.as_path.neighbor_as();
        if found != Some(ctx.remote_as) {
            return Err(AttrError::FirstAsMismatch {
                expected: ctx.remote_as,
                found,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use rde_common::ip;

    fn ebgp_ctx(remote_as: u32) -> ValidationContext {
        ValidationContext {
            aid: Aid::Inet,
            ebgp: true,
            remote_as,
            enforce_first_as: true,
        }
    }

    #[test]
    fn test_as_path_length_counts_set_once() {
        let p = AsPath {
            segments: vec![
                AsPathSegment::sequence(vec![65001, 65002]),
                AsPathSegment::set(vec![65010, 65011, 65012]),
            ],
        };
        assert_eq!(p.length(), 3);
        assert_eq!(p.neighbor_as(), Some(65001));
        assert_eq!(p.source_as(), Some(65012));
        assert_eq!(p.to_string(), "65001 65002 { 65010 65011 65012 }");
    }

    #[test]
    fn test_as_path_prepend() {
        let p = AsPath::from_sequence(vec![65002]);
        assert_eq!(p.prepend(65001, 2), AsPath::from_sequence(vec![65001, 65001, 65002]));

        let set_first = AsPath {
            segments: vec![AsPathSegment::set(vec![1, 2])],
        };
        let q = set_first.prepend(65001, 1);
        assert_eq!(q.segments.len(), 2);
        assert_eq!(q.neighbor_as(), Some(65001));
        assert_eq!(AsPath::default().prepend(7, 1), AsPath::from_sequence(vec![7]));
    }

    #[test]
    fn test_as_path_matches() {
        let p = AsPath::from_sequence(vec![65001, 65002, 65003]);
        assert!(p.matches(AsSpec::Peer, |a| a == 65001));
        assert!(!p.matches(AsSpec::Peer, |a| a == 65003));
        assert!(p.matches(AsSpec::Source, |a| a == 65003));
        assert!(p.matches(AsSpec::Transit, |a| a == 65002));
        assert!(!p.matches(AsSpec::Transit, |a| a == 65003));
        assert!(p.matches(AsSpec::All, |a| a == 65003));
        assert!(!p.matches(AsSpec::Empty, |_| true));
        assert!(AsPath::default().matches(AsSpec::Empty, |_| false));
    }

    #[test]
    fn test_as_path_max_sequence() {
        let p = AsPath::from_sequence(vec![1, 2, 2, 2, 3, 3]);
        assert_eq!(p.max_sequence(), 3);
        assert_eq!(AsPath::default().max_sequence(), 0);
    }

    #[test]
    fn test_as_path_merge_as4() {
        let as2 = AsPath::from_sequence(vec![65001, 23456, 23456]);
        let as4 = AsPath::from_sequence(vec![4200000001, 4200000002]);
        assert_eq!(
            as2.merge_as4(&as4),
            AsPath::from_sequence(vec![65001, 4200000001, 4200000002])
        );

        let longer = AsPath::from_sequence(vec![1, 2, 3, 4]);
        assert_eq!(as2.merge_as4(&longer), as2);
    }

    #[test]
    fn test_as_path_wire_encoding() {
        let p = AsPath {
            segments: vec![
                AsPathSegment::sequence(vec![65001]),
                AsPathSegment::set(vec![1, 2]),
            ],
        };
        assert_eq!(
            p.to_wire(),
            vec![
                2, 1, 0, 0, 0xfd, 0xe9, //
                1, 2, 0, 0, 0, 1, 0, 0, 0, 2,
            ]
        );

        let long = AsPath::from_sequence(vec![1; 300]);
        let wire = long.to_wire();
        assert_eq!(wire[1], 255);
        assert_eq!(wire.len(), 2 + 255 * 4 + 2 + 45 * 4);
    }

    #[test]
    fn test_community_names() {
        assert_eq!(Community::NO_EXPORT.to_string(), "NO_EXPORT");
        assert_eq!("65000:120".parse::<Community>().unwrap(), Community::new(65000, 120));
        assert_eq!(
            "NO_ADVERTISE".parse::<Community>().unwrap(),
            Community::NO_ADVERTISE
        );
        assert_eq!(u32::from(Community::NO_EXPORT), 0xffffff01);
        assert_eq!(Community::from(0xffffff02), Community::NO_ADVERTISE);
    }

    #[test]
    fn test_ext_community() {
        let rt: ExtCommunity = "rt 65000:100".parse().unwrap();
        assert_eq!(rt, ExtCommunity::route_target(65000, 100));
        assert!(rt.is_transitive());
        assert_eq!(rt.to_string(), "rt 65000:100");

        let big: ExtCommunity = "rt 4200000000:5".parse().unwrap();
        assert_eq!(big.base_type(), ExtCommunity::TYPE_FOUR_OCTET_AS);
        assert_eq!(big.to_string(), "rt 4200000000:5");

        let nt = ExtCommunity::new(ExtCommunity::NON_TRANSITIVE, 0x09, 1);
        assert!(!nt.is_transitive());

        let masked = ExtCommunity::new(0, 0, u64::MAX);
        assert_eq!(masked.value, 0xffff_ffff_ffff);
    }

    #[test]
    fn test_validate() {
        let good = PathAttributes {
            as_path: AsPath::from_sequence(vec![65001]),
            nexthop: ip!("192.0.2.1"),
            ..Default::default()
        };
        assert_eq!(validate(&good, &ebgp_ctx(65001)), Ok(()));

        let mut a = good.clone();
        a.nexthop = Addr::Unspec;
        assert_eq!(validate(&a, &ebgp_ctx(65001)), Err(AttrError::MissingNexthop));

        let mut a = good.clone();
        a.nexthop = ip!("2001:db8::1");
        assert!(matches!(
            validate(&a, &ebgp_ctx(65001)),
            Err(AttrError::InvalidNexthop(_))
        ));

        let mut a = good.clone();
        a.nexthop = ip!("224.0.0.5");
        assert!(matches!(
            validate(&a, &ebgp_ctx(65001)),
            Err(AttrError::InvalidNexthop(_))
        ));

        let mut a = good.clone();
        a.as_path = AsPath::default();
        assert_eq!(validate(&a, &ebgp_ctx(65001)), Err(AttrError::EmptyAsPath));

        // internal peers may send an empty path
        let ibgp = ValidationContext {
            ebgp: false,
            ..ebgp_ctx(65000)
        };
        assert_eq!(validate(&a, &ibgp), Ok(()));

        let mut a = good.clone();
        a.as_path.segments.push(AsPathSegment::set(vec![]));
        assert_eq!(validate(&a, &ebgp_ctx(65001)), Err(AttrError::EmptyAsSegment));

        assert_eq!(
            validate(&good, &ebgp_ctx(65002)),
            Err(AttrError::FirstAsMismatch {
                expected: 65002,
                found: Some(65001)
            })
        );
    }
}
