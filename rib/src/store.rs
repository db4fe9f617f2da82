// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The attribute store interns path attribute sets. Every distinct set is
//! kept once and counted by the number of handles given out for it.

use crate::attr::PathAttributes;
use crate::error::Error;
use crate::log::rib_log;
use crate::MOD_STORE;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use slog::Logger;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Default number of distinct attribute sets the store will hold.
pub const DEFAULT_ATTR_LIMIT: usize = 1 << 20;

/// A counted reference to an interned attribute set. Handles are not
/// `Clone`; a second reference has to come from [`AttrStore::acquire`] so
/// the count stays exact, and every handle goes back through
/// [`AttrStore::release`].
pub struct AttrHandle(Arc<PathAttributes>);

impl AttrHandle {
    /// True if both handles refer to the same stored entry.
    pub fn ptr_eq(&self, other: &AttrHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// The shared allocation, for consumers that only read it.
    pub fn shared(&self) -> Arc<PathAttributes> {
        self.0.clone()
    }
}

impl Deref for AttrHandle {
    type Target = PathAttributes;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for AttrHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttrHandle").field(&*self.0).finish()
    }
}

#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema,
)]
pub struct StoreStats {
    /// Distinct attribute sets held.
    pub entries: u64,
    /// Outstanding handles across all entries.
    pub references: u64,
}

pub struct AttrStore {
    entries: HashMap<Arc<PathAttributes>, u64>,
    references: u64,
    limit: usize,
    log: Logger,
}

impl AttrStore {
    pub fn new(limit: usize, log: Logger) -> Self {
        Self {
            entries: HashMap::new(),
            references: 0,
            limit,
            log,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    /// Return a handle for `attrs`, sharing the stored entry when one with
    /// equal content exists.
    pub fn intern(&mut self, attrs: PathAttributes) -> Result<AttrHandle, Error> {
        if let Some((stored, _)) = self.entries.get_key_value(&attrs) {
            let stored = stored.clone();
            self.bump(&stored);
            return Ok(AttrHandle(stored));
        }
        if self.entries.len() >= self.limit {
            rib_log!(self, error, MOD_STORE,
                "attribute store full, refusing new entry";
                "limit" => self.limit
            );
            return Err(Error::OutOfMemory(self.limit));
        }
        let stored = Arc::new(attrs);
        self.entries.insert(stored.clone(), 1);
        self.references += 1;
        Ok(AttrHandle(stored))
    }

    /// Take another reference to an entry already held through `handle`.
    pub fn acquire(&mut self, handle: &AttrHandle) -> AttrHandle {
        self.bump(&handle.0);
        AttrHandle(handle.0.clone())
    }

    /// Give a reference back. Returns true when this was the last one and
    /// the entry was freed.
    pub fn release(&mut self, handle: AttrHandle) -> bool {
        let attrs: &PathAttributes = &handle.0;
        let Some(count) = self.entries.get_mut(attrs) else {
            rib_log!(self, error, MOD_STORE,
                "release of attributes the store does not hold"
            );
            return false;
        };
        *count -= 1;
        self.references -= 1;
        if *count == 0 {
            self.entries.remove(attrs);
            return true;
        }
        false
    }

    /// The stored allocation for content equal to `attrs`, or a fresh one.
    /// Reference counts are not touched.
    pub fn share(&self, attrs: PathAttributes) -> Arc<PathAttributes> {
        match self.entries.get_key_value(&attrs) {
            Some((stored, _)) => stored.clone(),
            None => Arc::new(attrs),
        }
    }

    /// Outstanding handles for content equal to `attrs`.
    pub fn refcount(&self, attrs: &PathAttributes) -> u64 {
        self.entries.get(attrs).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            entries: self.entries.len() as u64,
            references: self.references,
        }
    }

    fn bump(&mut self, stored: &Arc<PathAttributes>) {
        let attrs: &PathAttributes = stored;
        if let Some(count) = self.entries.get_mut(attrs) {
            *count += 1;
            self.references += 1;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::attr::{AsPath, Community};
    use rde_common::ip;
    use rde_common::log::discard_logger;

    fn attrs(lp: u32) -> PathAttributes {
        PathAttributes {
            as_path: AsPath::from_sequence(vec![65001]),
            nexthop: ip!("192.0.2.1"),
            local_pref: lp,
            ..Default::default()
        }
    }

    #[test]
    fn test_intern_dedups_equal_content() {
        let mut store = AttrStore::new(DEFAULT_ATTR_LIMIT, discard_logger());
        let a = store.intern(attrs(100)).unwrap();
        let b = store.intern(attrs(100)).unwrap();
        let c = store.intern(attrs(150)).unwrap();

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(store.len(), 2);
        assert_eq!(store.refcount(&attrs(100)), 2);
        assert_eq!(store.stats(), StoreStats { entries: 2, references: 3 });

        assert!(!store.release(a));
        assert!(store.release(b));
        assert_eq!(store.refcount(&attrs(100)), 0);
        assert!(store.release(c));
        assert!(store.is_empty());
    }

    #[test]
    fn test_acquire_counts() {
        let mut store = AttrStore::new(DEFAULT_ATTR_LIMIT, discard_logger());
        let a = store.intern(attrs(100)).unwrap();
        let b = store.acquire(&a);
        assert!(a.ptr_eq(&b));
        assert_eq!(store.refcount(&a), 2);
        store.release(b);
        assert_eq!(store.refcount(&a), 1);
        store.release(a);
        assert!(store.is_empty());
    }

    #[test]
    fn test_share_does_not_count() {
        let mut store = AttrStore::new(DEFAULT_ATTR_LIMIT, discard_logger());
        let a = store.intern(attrs(100)).unwrap();
        let shared = store.share(attrs(100));
        assert!(Arc::ptr_eq(&shared, &a.shared()));
        assert_eq!(store.refcount(&a), 1);

        let mut other = attrs(100);
        other.communities.insert(Community::NO_EXPORT);
        let fresh = store.share(other.clone());
        assert_eq!(*fresh, other);
        assert_eq!(store.len(), 1);
        store.release(a);
    }

    #[test]
    fn test_limit() {
        let mut store = AttrStore::new(1, discard_logger());
        let a = store.intern(attrs(100)).unwrap();
        // equal content never needs a new entry
        let b = store.intern(attrs(100)).unwrap();
        assert!(matches!(
            store.intern(attrs(200)),
            Err(Error::OutOfMemory(1))
        ));
        store.release(a);
        store.release(b);
        assert!(store.intern(attrs(200)).is_ok());
    }
}
