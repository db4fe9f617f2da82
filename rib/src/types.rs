// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Formatter};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Identifies a peer within the decision engine. Id 0 is reserved for the
/// local pseudo-peer that originates configured networks.
pub type PeerId = u32;
pub const PEER_ID_SELF: PeerId = 0;

/// Identifies a RIB. Id 0 is always the Adj-RIB-In.
pub type RibId = u16;

/// Address family identifier, a compact stand-in for an AFI/SAFI pair.
#[derive(
    Debug,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    PartialOrd,
    Ord,
    JsonSchema,
)]
pub enum Aid {
    Unspec,
    Inet,
    Inet6,
    VpnIpv4,
}

impl Aid {
    /// Every routable address family, in table order.
    pub const ROUTABLE: [Aid; 3] = [Aid::Inet, Aid::Inet6, Aid::VpnIpv4];

    pub fn afi(&self) -> u16 {
        match self {
            Aid::Unspec => 0,
            Aid::Inet | Aid::VpnIpv4 => 1,
            Aid::Inet6 => 2,
        }
    }

    pub fn safi(&self) -> u8 {
        match self {
            Aid::Unspec => 0,
            Aid::Inet | Aid::Inet6 => 1,
            Aid::VpnIpv4 => 128,
        }
    }

    pub fn from_afi_safi(afi: u16, safi: u8) -> Option<Aid> {
        Self::ROUTABLE
            .into_iter()
            .find(|aid| aid.afi() == afi && aid.safi() == safi)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Aid::Unspec => "unspec",
            Aid::Inet => "IPv4 unicast",
            Aid::Inet6 => "IPv6 unicast",
            Aid::VpnIpv4 => "IPv4 vpn",
        }
    }

    pub fn max_prefix_len(&self) -> u8 {
        match self {
            Aid::Unspec => 0,
            Aid::Inet | Aid::VpnIpv4 => 32,
            Aid::Inet6 => 128,
        }
    }
}

impl fmt::Display for Aid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Format a route distinguisher the way operators write them:
/// `asn:value` for types 0 and 2, `a.b.c.d:value` for type 1.
pub fn format_rd(rd: u64) -> String {
    let typ = (rd >> 48) as u16;
    match typ {
        0 => format!("rd {}:{}", (rd >> 32) as u16, rd as u32),
        1 => format!(
            "rd {}:{}",
            Ipv4Addr::from_bits((rd >> 16) as u32),
            rd as u16
        ),
        2 => format!("rd {}:{}", (rd >> 16) as u32, rd as u16),
        _ => format!("rd #{:016x}", rd),
    }
}

/// Parse a route distinguisher. A 2-byte AS number selects type 0, a 4-byte
/// AS number type 2 and an IPv4 address type 1.
pub fn parse_rd(s: &str) -> Result<u64, String> {
    let s = s.strip_prefix("rd ").unwrap_or(s);
    let (admin, assigned) =
        s.rsplit_once(':').ok_or("malformed route distinguisher")?;
    let assigned: u32 = assigned
        .parse()
        .map_err(|_| "malformed route distinguisher value".to_string())?;

    if let Ok(ip) = admin.parse::<Ipv4Addr>() {
        let assigned = u16::try_from(assigned)
            .map_err(|_| "route distinguisher value too large".to_string())?;
        return Ok((1u64 << 48)
            | (u64::from(ip.to_bits()) << 16)
            | u64::from(assigned));
    }

    let asn: u32 = admin
        .parse()
        .map_err(|_| "malformed route distinguisher admin".to_string())?;
    match u16::try_from(asn) {
        Ok(asn) => Ok((u64::from(asn) << 32) | u64::from(assigned)),
        Err(_) => {
            let assigned = u16::try_from(assigned).map_err(|_| {
                "route distinguisher value too large".to_string()
            })?;
            Ok((2u64 << 48) | (u64::from(asn) << 16) | u64::from(assigned))
        }
    }
}

/// An IPv4 address qualified by a route distinguisher, with the MPLS label
/// stack it was learned with.
#[derive(
    Debug,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    PartialOrd,
    Ord,
    JsonSchema,
)]
pub struct Vpn4Addr {
    pub rd: u64,
    pub addr: Ipv4Addr,
    pub labelstack: [u8; 21],
    pub labellen: u8,
}

impl Vpn4Addr {
    pub fn new(rd: u64, addr: Ipv4Addr) -> Self {
        Self {
            rd,
            addr,
            labelstack: [0; 21],
            labellen: 0,
        }
    }

    pub fn labels(&self) -> &[u8] {
        &self.labelstack[..usize::from(self.labellen).min(21)]
    }
}

/// A BGP address of any supported family.
#[derive(
    Debug,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    PartialOrd,
    Ord,
    JsonSchema,
    Default,
)]
pub enum Addr {
    #[default]
    Unspec,
    V4(Ipv4Addr),
    V6 {
        addr: Ipv6Addr,
        scope_id: u32,
    },
    Vpn4(Vpn4Addr),
}

impl Addr {
    pub fn aid(&self) -> Aid {
        match self {
            Addr::Unspec => Aid::Unspec,
            Addr::V4(_) => Aid::Inet,
            Addr::V6 { .. } => Aid::Inet6,
            Addr::Vpn4(_) => Aid::VpnIpv4,
        }
    }

    pub fn is_unspecified(&self) -> bool {
        match self {
            Addr::Unspec => true,
            Addr::V4(a) => a.is_unspecified(),
            Addr::V6 { addr, .. } => addr.is_unspecified(),
            Addr::Vpn4(v) => v.addr.is_unspecified(),
        }
    }

    /// The plain IP address carried by this address, if any.
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            Addr::Unspec => None,
            Addr::V4(a) => Some(IpAddr::V4(*a)),
            Addr::V6 { addr, .. } => Some(IpAddr::V6(*addr)),
            Addr::Vpn4(v) => Some(IpAddr::V4(v.addr)),
        }
    }

    /// Zero all bits past `length`. Scope ids and labels are dropped.
    pub fn masked(&self, length: u8) -> Addr {
        match self {
            Addr::Unspec => Addr::Unspec,
            Addr::V4(a) => Addr::V4(Prefix4::new(*a, length).value),
            Addr::V6 { addr, .. } => Addr::V6 {
                addr: Prefix6::new(*addr, length).value,
                scope_id: 0,
            },
            Addr::Vpn4(v) => Addr::Vpn4(Vpn4Addr::new(
                v.rd,
                Prefix4::new(v.addr, length).value,
            )),
        }
    }
}

impl From<Ipv4Addr> for Addr {
    fn from(value: Ipv4Addr) -> Self {
        Addr::V4(value)
    }
}

impl From<Ipv6Addr> for Addr {
    fn from(value: Ipv6Addr) -> Self {
        Addr::V6 {
            addr: value,
            scope_id: 0,
        }
    }
}

impl From<IpAddr> for Addr {
    fn from(value: IpAddr) -> Self {
        match value {
            IpAddr::V4(a) => a.into(),
            IpAddr::V6(a) => a.into(),
        }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Addr::Unspec => write!(f, "unspec"),
            Addr::V4(a) => write!(f, "{a}"),
            Addr::V6 { addr, scope_id: 0 } => write!(f, "{addr}"),
            Addr::V6 { addr, scope_id } => write!(f, "{addr}%{scope_id}"),
            Addr::Vpn4(v) => write!(f, "{} {}", format_rd(v.rd), v.addr),
        }
    }
}

impl FromStr for Addr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((addr, scope)) = s.split_once('%') {
            let addr: Ipv6Addr =
                addr.parse().map_err(|_| "malformed ipv6 addr".to_string())?;
            let scope_id =
                scope.parse().map_err(|_| "malformed scope id".to_string())?;
            return Ok(Addr::V6 { addr, scope_id });
        }
        if let Some((rd, addr)) = s.rsplit_once(' ') {
            let rd = parse_rd(rd)?;
            let addr =
                addr.parse().map_err(|_| "malformed vpn addr".to_string())?;
            return Ok(Addr::Vpn4(Vpn4Addr::new(rd, addr)));
        }
        s.parse::<IpAddr>()
            .map(Addr::from)
            .map_err(|_| "malformed ip addr".to_string())
    }
}

#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, Eq, Hash, PartialEq, JsonSchema,
)]
pub struct Prefix4 {
    pub value: Ipv4Addr,
    pub length: u8,
}

impl PartialOrd for Prefix4 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Prefix4 {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.value != other.value {
            return self.value.cmp(&other.value);
        }
        self.length.cmp(&other.length)
    }
}

impl Prefix4 {
    const HOST_MASK: u8 = 32;

    /// Create a new `Prefix4` from an IP address and net mask.
    /// The newly created `Prefix4` will have its host bits zeroed upon creation
    /// e.g.
    /// ```
    /// use rib::types::Prefix4;
    /// use std::net::Ipv4Addr;
    /// use std::str::FromStr;
    /// let p4 = Prefix4::new(Ipv4Addr::from_str("10.0.0.10").unwrap(), 24);
    /// assert_eq!(p4.value, Ipv4Addr::from_str("10.0.0.0").unwrap());
    /// ```
    pub fn new(ip: Ipv4Addr, length: u8) -> Self {
        let mut new = Self {
            value: ip,
            length: length.min(Self::HOST_MASK),
        };
        new.unset_host_bits();
        new
    }

    fn mask(length: u8) -> u32 {
        match length {
            0 => 0,
            l if l >= Self::HOST_MASK => !0u32,
            l => (!0u32) << (32 - l),
        }
    }

    pub fn host_bits_are_unset(&self) -> bool {
        self.value.to_bits() & Self::mask(self.length) == self.value.to_bits()
    }

    pub fn unset_host_bits(&mut self) {
        self.value =
            Ipv4Addr::from_bits(self.value.to_bits() & Self::mask(self.length))
    }

    /// Check if this prefix is contained within another prefix.
    /// Returns true if this prefix is equal to or more specific than the other.
    pub fn within(&self, other: &Prefix4) -> bool {
        // A less specific prefix cannot be within a more specific one
        if self.length < other.length {
            return false;
        }
        let mask = Self::mask(other.length);
        self.value.to_bits() & mask == other.value.to_bits() & mask
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = Self::mask(self.length);
        addr.to_bits() & mask == self.value.to_bits() & mask
    }

    /// Check if a prefix contains a subnet that is valid for use in the RIB.
    /// Loopback (127.0.0.0/8), multicast (224.0.0.0/4) and the unspecified
    /// host route are refused. Class E and link-local ranges are accepted
    /// since some networks route them as ordinary unicast space.
    pub fn valid_for_rib(&self) -> bool {
        self.length <= Self::HOST_MASK
            && !(self.value.is_loopback()
                || self.value.is_multicast()
                || self.value.is_unspecified() && self.length == Self::HOST_MASK)
    }
}

impl fmt::Display for Prefix4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.value, self.length)
    }
}

impl FromStr for Prefix4 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, length) =
            s.split_once('/').ok_or("malformed prefix".to_string())?;

        let length: u8 = length
            .parse()
            .map_err(|_| "malformed length".to_string())?;
        if length > Self::HOST_MASK {
            return Err("prefix length out of range".to_string());
        }
        Ok(Self {
            value: value
                .parse()
                .map_err(|_| "malformed ip addr".to_string())?,
            length,
        })
    }
}

#[derive(
    Debug, Copy, Clone, Serialize, Deserialize, Hash, Eq, PartialEq, JsonSchema,
)]
pub struct Prefix6 {
    pub value: Ipv6Addr,
    pub length: u8,
}

impl PartialOrd for Prefix6 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Prefix6 {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.value != other.value {
            return self.value.cmp(&other.value);
        }
        self.length.cmp(&other.length)
    }
}

impl fmt::Display for Prefix6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.value, self.length)
    }
}

impl Prefix6 {
    const HOST_MASK: u8 = 128;

    /// Create a new `Prefix6` from an IP address and net mask.
    /// The newly created `Prefix6` will have its host bits zeroed upon creation
    /// e.g.
    /// ```
    /// use rib::types::Prefix6;
    /// use std::net::Ipv6Addr;
    /// use std::str::FromStr;
    /// let p6 = Prefix6::new(Ipv6Addr::from_str("2001:db8::1").unwrap(), 64);
    /// assert_eq!(p6.value, Ipv6Addr::from_str("2001:db8::").unwrap());
    /// ```
    pub fn new(ip: Ipv6Addr, length: u8) -> Self {
        let mut new = Self {
            value: ip,
            length: length.min(Self::HOST_MASK),
        };
        new.unset_host_bits();
        new
    }

    fn mask(length: u8) -> u128 {
        match length {
            0 => 0,
            l if l >= Self::HOST_MASK => !0u128,
            l => (!0u128) << (128 - l),
        }
    }

    pub fn host_bits_are_unset(&self) -> bool {
        self.value.to_bits() & Self::mask(self.length) == self.value.to_bits()
    }

    pub fn unset_host_bits(&mut self) {
        self.value =
            Ipv6Addr::from_bits(self.value.to_bits() & Self::mask(self.length))
    }

    /// Check if this prefix is contained within another prefix.
    /// Returns true if this prefix is equal to or more specific than the other.
    pub fn within(&self, other: &Prefix6) -> bool {
        if self.length < other.length {
            return false;
        }
        let mask = Self::mask(other.length);
        self.value.to_bits() & mask == other.value.to_bits() & mask
    }

    pub fn contains(&self, addr: Ipv6Addr) -> bool {
        let mask = Self::mask(self.length);
        addr.to_bits() & mask == self.value.to_bits() & mask
    }

    /// Check if a prefix contains a subnet that is valid for use in the RIB.
    /// Refuses the unspecified and loopback host routes, multicast
    /// (ff00::/8) and link-local unicast (fe80::/10).
    pub fn valid_for_rib(&self) -> bool {
        self.length <= Self::HOST_MASK
            && !(self.value.is_loopback()
                || self.value.is_multicast()
                || self.value.is_unicast_link_local()
                || self.value.is_unspecified() && self.length == Self::HOST_MASK)
    }
}

impl FromStr for Prefix6 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, length) =
            s.split_once('/').ok_or("malformed prefix".to_string())?;

        let length: u8 = length
            .parse()
            .map_err(|_| "malformed length".to_string())?;
        if length > Self::HOST_MASK {
            return Err("prefix length out of range".to_string());
        }
        Ok(Self {
            value: value
                .parse()
                .map_err(|_| "malformed ip addr".to_string())?,
            length,
        })
    }
}

/// A VPN-IPv4 prefix. The route distinguisher is part of the key so the same
/// IPv4 prefix from different VPNs occupies distinct RIB entries.
#[derive(
    Debug,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    Hash,
    Eq,
    PartialEq,
    PartialOrd,
    Ord,
    JsonSchema,
)]
pub struct PrefixVpn4 {
    pub rd: u64,
    pub prefix: Prefix4,
}

impl PrefixVpn4 {
    pub fn new(rd: u64, ip: Ipv4Addr, length: u8) -> Self {
        Self {
            rd,
            prefix: Prefix4::new(ip, length),
        }
    }

    pub fn within(&self, other: &PrefixVpn4) -> bool {
        self.rd == other.rd && self.prefix.within(&other.prefix)
    }
}

impl fmt::Display for PrefixVpn4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", format_rd(self.rd), self.prefix)
    }
}

impl FromStr for PrefixVpn4 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rd, prefix) =
            s.rsplit_once(' ').ok_or("malformed vpn prefix".to_string())?;
        Ok(Self {
            rd: parse_rd(rd)?,
            prefix: prefix.parse()?,
        })
    }
}

/// A routable prefix. Ordering groups prefixes by address family first and
/// then by bits and mask length, which is the order the RIB walks them in.
#[derive(
    Debug,
    Copy,
    Clone,
    Serialize,
    Deserialize,
    Eq,
    Hash,
    PartialEq,
    JsonSchema,
    PartialOrd,
    Ord,
)]
pub enum Prefix {
    V4(Prefix4),
    V6(Prefix6),
    Vpn4(PrefixVpn4),
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::V4(p) => p.fmt(f),
            Prefix::V6(p) => p.fmt(f),
            Prefix::Vpn4(p) => p.fmt(f),
        }
    }
}

impl From<Prefix4> for Prefix {
    fn from(value: Prefix4) -> Self {
        Self::V4(value)
    }
}

impl From<Prefix6> for Prefix {
    fn from(value: Prefix6) -> Self {
        Self::V6(value)
    }
}

impl From<PrefixVpn4> for Prefix {
    fn from(value: PrefixVpn4) -> Self {
        Self::Vpn4(value)
    }
}

impl FromStr for Prefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(' ') {
            return s.parse::<PrefixVpn4>().map(Self::Vpn4);
        }
        if let Ok(prefix4) = s.parse::<Prefix4>() {
            Ok(Self::V4(prefix4))
        } else if let Ok(prefix6) = s.parse::<Prefix6>() {
            Ok(Self::V6(prefix6))
        } else {
            Err("malformed prefix".to_string())
        }
    }
}

impl Prefix {
    pub fn new(ip: IpAddr, length: u8) -> Self {
        match ip {
            IpAddr::V4(ip4) => Self::V4(Prefix4::new(ip4, length)),
            IpAddr::V6(ip6) => Self::V6(Prefix6::new(ip6, length)),
        }
    }

    /// Build a prefix covering `addr` with the given mask length. An
    /// unspecified address has no prefix.
    pub fn from_addr(addr: &Addr, length: u8) -> Option<Self> {
        match addr {
            Addr::Unspec => None,
            Addr::V4(a) => Some(Self::V4(Prefix4::new(*a, length))),
            Addr::V6 { addr, .. } => Some(Self::V6(Prefix6::new(*addr, length))),
            Addr::Vpn4(v) => {
                Some(Self::Vpn4(PrefixVpn4::new(v.rd, v.addr, length)))
            }
        }
    }

    pub fn aid(&self) -> Aid {
        match self {
            Self::V4(_) => Aid::Inet,
            Self::V6(_) => Aid::Inet6,
            Self::Vpn4(_) => Aid::VpnIpv4,
        }
    }

    pub fn length(&self) -> u8 {
        match self {
            Self::V4(p) => p.length,
            Self::V6(p) => p.length,
            Self::Vpn4(p) => p.prefix.length,
        }
    }

    /// The network address of this prefix.
    pub fn addr(&self) -> Addr {
        match self {
            Self::V4(p) => Addr::V4(p.value),
            Self::V6(p) => p.value.into(),
            Self::Vpn4(p) => Addr::Vpn4(Vpn4Addr::new(p.rd, p.prefix.value)),
        }
    }

    pub fn host_bits_are_unset(&self) -> bool {
        match self {
            Self::V4(p) => p.host_bits_are_unset(),
            Self::V6(p) => p.host_bits_are_unset(),
            Self::Vpn4(p) => p.prefix.host_bits_are_unset(),
        }
    }

    pub fn unset_host_bits(&mut self) {
        match self {
            Self::V4(p) => p.unset_host_bits(),
            Self::V6(p) => p.unset_host_bits(),
            Self::Vpn4(p) => p.prefix.unset_host_bits(),
        }
    }

    /// True if this prefix is equal to or more specific than `other`.
    /// Prefixes of different families never contain each other.
    pub fn within(&self, other: &Prefix) -> bool {
        match (self, other) {
            (Self::V4(a), Self::V4(b)) => a.within(b),
            (Self::V6(a), Self::V6(b)) => a.within(b),
            (Self::Vpn4(a), Self::Vpn4(b)) => a.within(b),
            _ => false,
        }
    }

    /// True if `addr` falls inside this prefix.
    pub fn contains(&self, addr: &Addr) -> bool {
        match (self, addr) {
            (Self::V4(p), Addr::V4(a)) => p.contains(*a),
            (Self::V6(p), Addr::V6 { addr, .. }) => p.contains(*addr),
            (Self::Vpn4(p), Addr::Vpn4(v)) => {
                p.rd == v.rd && p.prefix.contains(v.addr)
            }
            _ => false,
        }
    }

    pub fn valid_for_rib(&self) -> bool {
        match self {
            Self::V4(p) => p.valid_for_rib(),
            Self::V6(p) => p.valid_for_rib(),
            Self::Vpn4(p) => p.prefix.valid_for_rib(),
        }
    }

    /// The smallest prefix of the same family, used as a lower bound when
    /// walking a table from its start.
    pub fn family_start(aid: Aid) -> Option<Prefix> {
        match aid {
            Aid::Unspec => None,
            Aid::Inet => Some(Self::V4(Prefix4::new(Ipv4Addr::UNSPECIFIED, 0))),
            Aid::Inet6 => {
                Some(Self::V6(Prefix6::new(Ipv6Addr::UNSPECIFIED, 0)))
            }
            Aid::VpnIpv4 => Some(Self::Vpn4(PrefixVpn4::new(
                0,
                Ipv4Addr::UNSPECIFIED,
                0,
            ))),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rde_common::{cidr, ip};

    #[test]
    fn test_prefix_ordering_groups_family() {
        let a: Prefix = cidr!("10.0.0.0/8");
        let b: Prefix = cidr!("10.0.0.0/24");
        let c: Prefix = cidr!("192.168.0.0/16");
        let d: Prefix = cidr!("2001:db8::/32");
        let e: Prefix = cidr!("65000:1 10.0.0.0/8");

        let mut v = vec![e, d, c, b, a];
        v.sort();
        assert_eq!(v, vec![a, b, c, d, e]);
    }

    #[test]
    fn test_prefix_within_and_contains() {
        let wide: Prefix = cidr!("10.0.0.0/8");
        let narrow: Prefix = cidr!("10.1.2.0/24");
        assert!(narrow.within(&wide));
        assert!(!wide.within(&narrow));
        assert!(wide.contains(&ip!("10.200.0.1")));
        assert!(!narrow.contains(&ip!("10.1.3.1")));

        let v6: Prefix = cidr!("2001:db8::/32");
        assert!(!narrow.within(&v6));
        assert!(v6.contains(&ip!("2001:db8::1")));
    }

    #[test]
    fn test_prefix_new_masks_host_bits() {
        let p = Prefix::new("10.1.2.3".parse().unwrap(), 16);
        assert_eq!(p, cidr!("10.1.0.0/16"));
        assert!(p.host_bits_are_unset());

        let raw = Prefix4 {
            value: "10.1.2.3".parse().unwrap(),
            length: 24,
        };
        assert!(!raw.host_bits_are_unset());
    }

    #[test]
    fn test_prefix_parse_rejects_bad_length() {
        assert!("10.0.0.0/33".parse::<Prefix>().is_err());
        assert!("2001:db8::/129".parse::<Prefix>().is_err());
        assert!("10.0.0.0".parse::<Prefix>().is_err());
    }

    #[test]
    fn test_valid_for_rib() {
        let bad: Vec<Prefix> = vec![
            cidr!("127.0.0.0/8"),
            cidr!("224.0.0.0/4"),
            cidr!("0.0.0.0/32"),
            cidr!("fe80::/10"),
            cidr!("ff00::/8"),
        ];
        for p in bad {
            assert!(!p.valid_for_rib(), "{p} should be refused");
        }
        let default: Prefix = cidr!("0.0.0.0/0");
        assert!(default.valid_for_rib());
    }

    #[test]
    fn test_rd_formats() {
        let rd = parse_rd("65000:100").unwrap();
        assert_eq!(format_rd(rd), "rd 65000:100");

        let rd = parse_rd("4200000000:7").unwrap();
        assert_eq!(rd >> 48, 2);
        assert_eq!(format_rd(rd), "rd 4200000000:7");

        let rd = parse_rd("rd 192.0.2.1:9").unwrap();
        assert_eq!(rd >> 48, 1);
        assert_eq!(format_rd(rd), "rd 192.0.2.1:9");
    }

    #[test]
    fn test_addr_parse_and_aid() {
        let a: Addr = ip!("192.0.2.1");
        assert_eq!(a.aid(), Aid::Inet);
        let b: Addr = ip!("fe80::1%3");
        assert_eq!(
            b,
            Addr::V6 {
                addr: "fe80::1".parse().unwrap(),
                scope_id: 3
            }
        );
        let c: Addr = ip!("65000:1 192.0.2.1");
        assert_eq!(c.aid(), Aid::VpnIpv4);
        assert_eq!(c.to_string(), "rd 65000:1 192.0.2.1");
        assert!(Addr::Unspec.is_unspecified());
    }

    #[test]
    fn test_aid_afi_safi() {
        for aid in Aid::ROUTABLE {
            assert_eq!(Aid::from_afi_safi(aid.afi(), aid.safi()), Some(aid));
        }
        assert_eq!(Aid::VpnIpv4.name(), "IPv4 vpn");
        assert_eq!(Aid::from_afi_safi(2, 128), None);
    }
}
