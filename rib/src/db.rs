// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Prefix tables. A [`Rib`] keeps one ordered table per address family;
//! each [`RibEntry`] holds the candidate paths for a prefix, one per peer,
//! and the currently selected best path.

use crate::attr::PathAttributes;
use crate::bestpath::{self, DecisionContext, DecisionFlags};
use crate::log::rib_log;
use crate::store::AttrHandle;
use crate::types::{Addr, Aid, PeerId, Prefix, RibId};
use crate::MOD_DB;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use slog::Logger;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

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
pub struct RibFlags {
    /// Keep paths but never run the decision process.
    pub no_evaluate: bool,
    /// Do not report best path changes to the forwarding table.
    pub no_fib: bool,
}

/// One candidate path of a prefix.
#[derive(Debug)]
pub struct Path {
    /// Unique within the RIB; a replaced path gets a new id even when its
    /// attributes did not change.
    pub id: u64,
    pub peer: PeerId,
    pub attrs: AttrHandle,
    pub received: DateTime<Utc>,
    pub eligible: bool,
    pub stale: bool,
}

/// A snapshot of a selected best path.
#[derive(Debug, Clone)]
pub struct Selection {
    pub peer: PeerId,
    pub path_id: u64,
    pub attrs: Arc<PathAttributes>,
}

impl Selection {
    fn of(path: &Path) -> Self {
        Self {
            peer: path.peer,
            path_id: path.id,
            attrs: path.attrs.shared(),
        }
    }

    /// True if both snapshots name the same path.
    pub fn same_path(a: &Option<Selection>, b: &Option<Selection>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => a.peer == b.peer && a.path_id == b.path_id,
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct RibEntry {
    prefix: Prefix,
    paths: BTreeMap<PeerId, Path>,
    best: Option<PeerId>,
    lastchange: DateTime<Utc>,
}

impl RibEntry {
    fn new(prefix: Prefix) -> Self {
        Self {
            prefix,
            paths: BTreeMap::new(),
            best: None,
            lastchange: Utc::now(),
        }
    }

    pub fn prefix(&self) -> Prefix {
        self.prefix
    }

    pub fn best(&self) -> Option<&Path> {
        self.best.and_then(|peer| self.paths.get(&peer))
    }

    pub fn path(&self, peer: PeerId) -> Option<&Path> {
        self.paths.get(&peer)
    }

    /// Candidate paths in peer id order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.values()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// When the best path of this entry last changed.
    pub fn lastchange(&self) -> DateTime<Utc> {
        self.lastchange
    }
}

pub struct Rib {
    pub id: RibId,
    pub name: String,
    pub rtableid: u32,
    pub flags: RibFlags,
    tables: BTreeMap<Aid, BTreeMap<Prefix, RibEntry>>,
    next_path_id: u64,
    path_count: usize,
    log: Logger,
}

impl Rib {
    pub fn new(
        id: RibId,
        name: &str,
        rtableid: u32,
        flags: RibFlags,
        log: Logger,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            rtableid,
            flags,
            tables: BTreeMap::new(),
            next_path_id: 1,
            path_count: 0,
            log,
        }
    }

    pub fn get(&self, prefix: &Prefix) -> Option<&RibEntry> {
        self.tables.get(&prefix.aid())?.get(prefix)
    }

    /// Longest prefix match for `addr`.
    pub fn lookup(&self, addr: &Addr) -> Option<&RibEntry> {
        let table = self.tables.get(&addr.aid())?;
        (0..=addr.aid().max_prefix_len()).rev().find_map(|len| {
            let prefix = Prefix::from_addr(addr, len)?;
            table.get(&prefix)
        })
    }

    /// Install the path of `peer` for `prefix`, replacing the one that peer
    /// already had there. The replaced path is returned so the caller can
    /// release its attributes. The best path is left untouched until
    /// [`Rib::select`] runs.
    pub fn insert(
        &mut self,
        prefix: Prefix,
        peer: PeerId,
        attrs: AttrHandle,
        eligible: bool,
        received: DateTime<Utc>,
    ) -> Option<Path> {
        let id = self.next_path_id;
        self.next_path_id += 1;
        let path = Path {
            id,
            peer,
            attrs,
            received,
            eligible,
            stale: false,
        };
        let entry = self
            .tables
            .entry(prefix.aid())
            .or_default()
            .entry(prefix)
            .or_insert_with(|| RibEntry::new(prefix));
        let old = entry.paths.insert(peer, path);
        if old.is_none() {
            self.path_count += 1;
        }
        old
    }

    /// Remove the path of `peer` for `prefix`. The entry goes away with
    /// its last path.
    pub fn remove(&mut self, prefix: &Prefix, peer: PeerId) -> Option<Path> {
        let table = self.tables.get_mut(&prefix.aid())?;
        let entry = table.get_mut(prefix)?;
        let path = entry.paths.remove(&peer)?;
        self.path_count -= 1;
        if entry.paths.is_empty() {
            table.remove(prefix);
            rib_log!(self, trace, MOD_DB, "entry removed";
                "rib" => &self.name,
                "prefix" => %prefix
            );
        }
        Some(path)
    }

    /// Update the eligibility of a path. Returns true if it changed.
    pub fn set_eligible(
        &mut self,
        prefix: &Prefix,
        peer: PeerId,
        eligible: bool,
    ) -> bool {
        match self.path_mut(prefix, peer) {
            Some(path) if path.eligible != eligible => {
                path.eligible = eligible;
                true
            }
            _ => false,
        }
    }

    pub fn set_stale(&mut self, prefix: &Prefix, peer: PeerId) {
        if let Some(path) = self.path_mut(prefix, peer) {
            path.stale = true;
        }
    }

    fn path_mut(&mut self, prefix: &Prefix, peer: PeerId) -> Option<&mut Path> {
        self.tables
            .get_mut(&prefix.aid())?
            .get_mut(prefix)?
            .paths
            .get_mut(&peer)
    }

    /// The current best path of `prefix`.
    pub fn best(&self, prefix: &Prefix) -> Option<Selection> {
        self.get(prefix)?.best().map(Selection::of)
    }

    /// Run the decision process for `prefix` and record the result.
    /// RIBs flagged `no_evaluate` never have a best path.
    pub fn select<C: DecisionContext>(
        &mut self,
        prefix: &Prefix,
        ctx: &C,
        flags: &DecisionFlags,
    ) -> Option<Selection> {
        let no_evaluate = self.flags.no_evaluate;
        let entry = self.tables.get_mut(&prefix.aid())?.get_mut(prefix)?;
        let best = if no_evaluate {
            None
        } else {
            bestpath::select(entry, ctx, flags)
        };
        let old = entry.best().map(|p| p.id);
        entry.best = best;
        if entry.best().map(|p| p.id) != old {
            entry.lastchange = Utc::now();
        }
        entry.best().map(Selection::of)
    }

    /// Up to `limit` prefixes following `cursor` in table order, starting
    /// from the beginning when there is no cursor.
    pub fn prefixes_after(
        &self,
        cursor: Option<&Prefix>,
        limit: usize,
    ) -> Vec<Prefix> {
        let mut out = Vec::with_capacity(limit);
        for (aid, table) in &self.tables {
            if out.len() >= limit {
                break;
            }
            let range = match cursor {
                Some(c) if c.aid() > *aid => continue,
                Some(c) if c.aid() == *aid => {
                    table.range((Bound::Excluded(*c), Bound::Unbounded))
                }
                _ => table.range::<Prefix, _>(..),
            };
            out.extend(range.map(|(p, _)| *p).take(limit - out.len()));
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &RibEntry> {
        self.tables.values().flat_map(|t| t.values())
    }

    /// Remove every path. Used when the RIB itself goes away.
    pub fn drain(&mut self) -> Vec<(Prefix, Path)> {
        let tables = std::mem::take(&mut self.tables);
        self.path_count = 0;
        tables
            .into_values()
            .flat_map(|t| t.into_iter())
            .flat_map(|(prefix, entry)| {
                entry.paths.into_values().map(move |p| (prefix, p))
            })
            .collect()
    }

    pub fn prefix_count(&self) -> usize {
        self.tables.values().map(|t| t.len()).sum()
    }

    pub fn path_count(&self) -> usize {
        self.path_count
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bestpath::test::{attrs, TestContext};
    use crate::store::{AttrStore, DEFAULT_ATTR_LIMIT};
    use pretty_assertions::assert_eq;
    use rde_common::log::discard_logger;
    use rde_common::{cidr, ip};

    fn setup() -> (Rib, AttrStore) {
        (
            Rib::new(1, "Loc-RIB", 0, RibFlags::default(), discard_logger()),
            AttrStore::new(DEFAULT_ATTR_LIMIT, discard_logger()),
        )
    }

    #[test]
    fn test_insert_replace_remove() {
        let (mut rib, mut store) = setup();
        let p: Prefix = cidr!("10.0.0.0/24");

        let h = store.intern(attrs(vec![65001], 100)).unwrap();
        assert!(rib.insert(p, 1, h, true, Utc::now()).is_none());
        let h = store.intern(attrs(vec![65001], 200)).unwrap();
        let old = rib.insert(p, 1, h, true, Utc::now()).unwrap();
        assert_eq!(old.attrs.local_pref, 100);
        store.release(old.attrs);

        assert_eq!(rib.path_count(), 1);
        assert_eq!(rib.get(&p).unwrap().len(), 1);

        let gone = rib.remove(&p, 1).unwrap();
        store.release(gone.attrs);
        assert!(rib.get(&p).is_none());
        assert_eq!(rib.path_count(), 0);
        assert!(store.is_empty());
        assert!(rib.remove(&p, 1).is_none());
    }

    #[test]
    fn test_select_tracks_path_identity() {
        let (mut rib, mut store) = setup();
        let ctx = TestContext::new();
        let flags = DecisionFlags::default();
        let p: Prefix = cidr!("10.0.0.0/24");

        let h = store.intern(attrs(vec![65001], 100)).unwrap();
        rib.insert(p, 1, h, true, Utc::now());
        let first = rib.select(&p, &ctx, &flags);
        assert_eq!(first.as_ref().map(|s| s.peer), Some(1));

        // implicit replace with identical content is a new path
        let h = store.intern(attrs(vec![65001], 100)).unwrap();
        rib.insert(p, 1, h, true, Utc::now());
        let second = rib.select(&p, &ctx, &flags);
        assert!(!Selection::same_path(&first, &second));
        assert!(Arc::ptr_eq(
            &first.unwrap().attrs,
            &second.unwrap().attrs
        ));
    }

    #[test]
    fn test_no_evaluate() {
        let mut rib = Rib::new(
            0,
            "Adj-RIB-In",
            0,
            RibFlags {
                no_evaluate: true,
                no_fib: true,
            },
            discard_logger(),
        );
        let mut store = AttrStore::new(DEFAULT_ATTR_LIMIT, discard_logger());
        let p: Prefix = cidr!("10.0.0.0/24");
        let h = store.intern(attrs(vec![65001], 100)).unwrap();
        rib.insert(p, 1, h, true, Utc::now());
        assert!(rib
            .select(&p, &TestContext::new(), &DecisionFlags::default())
            .is_none());
        assert!(rib.get(&p).unwrap().best().is_none());
    }

    #[test]
    fn test_longest_match() {
        let (mut rib, mut store) = setup();
        for (i, p) in ["10.0.0.0/8", "10.1.0.0/16", "10.1.2.0/24"].iter().enumerate()
        {
            let h = store.intern(attrs(vec![65001], 100 + i as u32)).unwrap();
            rib.insert(p.parse().unwrap(), 1, h, true, Utc::now());
        }
        let hit = |a: &str| rib.lookup(&a.parse().unwrap()).map(|e| e.prefix());
        assert_eq!(hit("10.1.2.3"), Some(cidr!("10.1.2.0/24")));
        assert_eq!(hit("10.1.9.9"), Some(cidr!("10.1.0.0/16")));
        assert_eq!(hit("10.9.9.9"), Some(cidr!("10.0.0.0/8")));
        assert_eq!(hit("11.0.0.1"), None);
        assert_eq!(rib.lookup(&ip!("2001:db8::1")).map(|e| e.prefix()), None);
    }

    #[test]
    fn test_prefixes_after_walks_all_families() {
        let (mut rib, mut store) = setup();
        let all: Vec<Prefix> = vec![
            cidr!("10.0.0.0/8"),
            cidr!("10.0.0.0/24"),
            cidr!("192.0.2.0/24"),
            cidr!("2001:db8::/32"),
            cidr!("65000:1 10.0.0.0/8"),
        ];
        for p in all.iter().rev() {
            let h = store.intern(attrs(vec![65001], 100)).unwrap();
            rib.insert(*p, 1, h, true, Utc::now());
        }

        let first = rib.prefixes_after(None, 2);
        assert_eq!(first, all[..2].to_vec());
        let second = rib.prefixes_after(first.last(), 2);
        assert_eq!(second, all[2..4].to_vec());
        let third = rib.prefixes_after(second.last(), 2);
        assert_eq!(third, all[4..].to_vec());
        assert!(rib.prefixes_after(third.last(), 2).is_empty());
    }

    #[test]
    fn test_drain() {
        let (mut rib, mut store) = setup();
        for p in ["10.0.0.0/8", "2001:db8::/32"] {
            let h = store.intern(attrs(vec![65001], 100)).unwrap();
            rib.insert(p.parse().unwrap(), 1, h, true, Utc::now());
        }
        let paths = rib.drain();
        assert_eq!(paths.len(), 2);
        for (_, p) in paths {
            store.release(p.attrs);
        }
        assert!(store.is_empty());
        assert_eq!(rib.prefix_count(), 0);
    }
}
