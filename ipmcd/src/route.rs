// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The multicast route entry table and its walker.
//!
//! Entries are kept in a [`RouteTrie`].  Every insertion and removal bumps
//! the table's version.  A walk carries a [`WalkMarker`] holding the last key
//! it returned and the version it last saw, and takes the lock only for the
//! duration of a single step.  If the version has moved on between steps the
//! walker re-seeks from its last key rather than trusting any position it
//! held before.  Since the next step is always "the smallest live key greater
//! than the last one returned", a walk never returns a key twice, never
//! returns a key removed before the step that would have reached it, and
//! never skips a key that was present for the whole walk.

use std::sync::Mutex;

use slog::{debug, o};

use common::mcast::{McRouteEntry, RouteEntryKey};

use crate::trie::RouteTrie;
use crate::types::{IpmcError, IpmcResult};
use crate::EntryData;

/// The position of an in-progress walk over the route entry table.
#[derive(Clone, Debug, Default)]
pub struct WalkMarker {
    last: Option<RouteEntryKey>,
    version: u64,
    resyncs: u64,
    done: bool,
}

impl WalkMarker {
    /// The last key returned by the walk.
    pub fn last(&self) -> Option<&RouteEntryKey> {
        self.last.as_ref()
    }

    /// The table version as of the last step.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// How many steps found the table changed since the step before.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

fn no_entry(key: &RouteEntryKey) -> IpmcError {
    IpmcError::Missing(format!("no route entry {key}"))
}

pub struct RouteTable {
    log: slog::Logger,
    trie: RouteTrie<McRouteEntry>,
    version: u64,
    limit: usize,
}

impl RouteTable {
    pub fn new(log: &slog::Logger, limit: usize) -> Self {
        RouteTable {
            log: log.new(o!("unit" => "route_entries")),
            trie: RouteTrie::new(),
            version: 0,
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.trie.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trie.is_empty()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn iter(&self) -> impl Iterator<Item = &McRouteEntry> {
        self.trie.iter().map(|(_, e)| e)
    }

    pub fn find(&self, key: &RouteEntryKey) -> Option<&McRouteEntry> {
        self.trie.get(key)
    }

    pub fn get(&self, key: &RouteEntryKey) -> IpmcResult<&McRouteEntry> {
        self.find(key).ok_or_else(|| no_entry(key))
    }

    /// Verify that an entry with this key could be inserted.
    pub fn check_insert(&self, key: &RouteEntryKey) -> IpmcResult<()> {
        if self.trie.contains_key(key) {
            return Err(IpmcError::Exists(format!(
                "route entry {key} already exists"
            )));
        }
        if self.trie.len() >= self.limit {
            return Err(IpmcError::TableFull("route_entries".to_string()));
        }
        Ok(())
    }

    pub fn insert(&mut self, entry: McRouteEntry) -> IpmcResult<()> {
        self.check_insert(&entry.key)?;
        let key = entry.key;
        self.trie.insert(key, entry).map_err(|_| {
            IpmcError::Exists(format!("route entry {key} already exists"))
        })?;
        self.version += 1;
        debug!(self.log, "inserted route entry";
            "key" => %key, "version" => self.version);
        Ok(())
    }

    /// Replace the contents of an existing entry, returning the old contents.
    /// The set of keys is unchanged, so walks in progress are unaffected.
    pub fn update(&mut self, entry: McRouteEntry) -> IpmcResult<McRouteEntry> {
        let key = entry.key;
        let slot = self.trie.get_mut(&key).ok_or_else(|| no_entry(&key))?;
        debug!(self.log, "updated route entry"; "key" => %key);
        Ok(std::mem::replace(slot, entry))
    }

    pub fn remove(&mut self, key: &RouteEntryKey) -> IpmcResult<McRouteEntry> {
        let entry = self.trie.remove(key).ok_or_else(|| no_entry(key))?;
        self.version += 1;
        debug!(self.log, "removed route entry";
            "key" => %key, "version" => self.version);
        Ok(entry)
    }

    /// Return the entry whose key follows `after`, or the first entry if
    /// `after` is None.  `after` need not be present.
    pub fn get_next(
        &self,
        after: Option<&RouteEntryKey>,
    ) -> Option<&McRouteEntry> {
        let next = match after {
            None => self.trie.first(),
            Some(key) => self.trie.successor(key),
        };
        next.map(|(_, e)| e)
    }

    /// Start a walk over the table.
    pub fn marker(&self) -> WalkMarker {
        WalkMarker {
            version: self.version,
            ..Default::default()
        }
    }

    /// Advance a walk by one entry.
    pub fn walk_next(&self, marker: &mut WalkMarker) -> Option<McRouteEntry> {
        if marker.done {
            return None;
        }
        if marker.version != self.version {
            debug!(self.log, "resyncing route walk";
                "from" => marker.version, "to" => self.version);
            marker.resyncs += 1;
            marker.version = self.version;
        }
        match self.get_next(marker.last.as_ref()) {
            Some(entry) => {
                marker.last = Some(entry.key);
                Some(entry.clone())
            }
            None => {
                marker.done = true;
                None
            }
        }
    }
}

/// A walk over the route entry table that takes the table lock once per
/// step, so writers can make progress while it is underway.
pub struct RouteEntryWalk<'a> {
    entries: &'a Mutex<EntryData>,
    marker: WalkMarker,
}

impl<'a> RouteEntryWalk<'a> {
    pub(crate) fn new(entries: &'a Mutex<EntryData>) -> Self {
        let marker = entries.lock().unwrap().routes.marker();
        RouteEntryWalk { entries, marker }
    }

    pub fn marker(&self) -> &WalkMarker {
        &self.marker
    }
}

impl Iterator for RouteEntryWalk<'_> {
    type Item = McRouteEntry;

    fn next(&mut self) -> Option<McRouteEntry> {
        let entries = self.entries.lock().unwrap();
        entries.routes.walk_next(&mut self.marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::mcast::PacketAction;
    use std::net::{IpAddr, Ipv4Addr};

    fn entry(group: u8) -> McRouteEntry {
        McRouteEntry {
            key: RouteEntryKey::sg(
                0,
                1,
                IpAddr::V4(Ipv4Addr::new(224, 1, 1, group)),
                IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            ),
            ipmc_group: 1,
            rpf_group: 2,
            action: PacketAction::Forward,
            cpu_port: false,
        }
    }

    fn table() -> RouteTable {
        RouteTable::new(&crate::test_logger(), 64)
    }

    #[test]
    fn test_insert_twice() -> anyhow::Result<()> {
        let mut t = table();
        t.insert(entry(1))?;
        assert!(matches!(t.insert(entry(1)), Err(IpmcError::Exists(_))));
        t.remove(&entry(1).key)?;
        t.insert(entry(1))?;
        assert_eq!(t.version(), 3);
        Ok(())
    }

    #[test]
    fn test_limit() -> anyhow::Result<()> {
        let mut t = RouteTable::new(&crate::test_logger(), 1);
        t.insert(entry(1))?;
        assert!(matches!(t.insert(entry(2)), Err(IpmcError::TableFull(_))));
        Ok(())
    }

    #[test]
    fn test_update_keeps_version() -> anyhow::Result<()> {
        let mut t = table();
        t.insert(entry(1))?;
        let v = t.version();
        let mut e = entry(1);
        e.action = PacketAction::Drop;
        let old = t.update(e)?;
        assert_eq!(old.action, PacketAction::Forward);
        assert_eq!(t.get(&entry(1).key)?.action, PacketAction::Drop);
        assert_eq!(t.version(), v);
        assert!(matches!(t.update(entry(2)), Err(IpmcError::Missing(_))));
        Ok(())
    }

    #[test]
    fn test_get_next_visits_all() -> anyhow::Result<()> {
        let mut t = table();
        for g in [9, 3, 200, 1, 50] {
            t.insert(entry(g))?;
        }
        let mut seen = Vec::new();
        let mut cursor = None;
        while let Some(e) = t.get_next(cursor.as_ref()) {
            seen.push(e.key);
            cursor = Some(e.key);
        }
        let expected: Vec<_> =
            [1, 3, 9, 50, 200].iter().map(|g| entry(*g).key).collect();
        assert_eq!(seen, expected);
        Ok(())
    }

    // A walker parked on K1 while a writer inserts K2 and removes K4 sees
    // K2, K3 and K5, each once.
    #[test]
    fn test_walk_across_mutation() -> anyhow::Result<()> {
        let mut t = table();
        for g in [1, 3, 4, 5] {
            t.insert(entry(g))?;
        }
        let mut marker = t.marker();
        assert_eq!(t.walk_next(&mut marker).unwrap().key, entry(1).key);

        t.insert(entry(2))?;
        t.remove(&entry(4).key)?;

        let rest: Vec<_> = std::iter::from_fn(|| t.walk_next(&mut marker))
            .map(|e| e.key)
            .collect();
        assert_eq!(rest, vec![entry(2).key, entry(3).key, entry(5).key]);
        assert_eq!(marker.resyncs(), 1);
        assert!(marker.is_done());
        assert!(t.walk_next(&mut marker).is_none());
        Ok(())
    }

    // Removing the key the walker is parked on doesn't lose its place.
    #[test]
    fn test_walk_after_removing_last() -> anyhow::Result<()> {
        let mut t = table();
        for g in [1, 2, 3] {
            t.insert(entry(g))?;
        }
        let mut marker = t.marker();
        t.walk_next(&mut marker);
        t.walk_next(&mut marker);
        t.remove(&entry(2).key)?;
        t.remove(&entry(1).key)?;
        assert_eq!(t.walk_next(&mut marker).unwrap().key, entry(3).key);
        assert!(t.walk_next(&mut marker).is_none());
        Ok(())
    }
}
