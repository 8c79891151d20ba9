// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Reverse indices from ports and interfaces to the objects that use them.
//!
//! The maps hold only keys.  They are updated in the same critical section
//! as the table mutation whose relationship they record, so a reader holding
//! the lock always sees them agree with the tables.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use common::mcast::{
    BridgePortId, GroupId, GroupKind, RouteEntryKey, RouterIntfId,
};

/// A reference to a group in one of the two group tables.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum GroupRef {
    Ipmc(GroupId),
    Rpf(GroupId),
}

impl GroupRef {
    pub fn new(kind: GroupKind, group_id: GroupId) -> Self {
        match kind {
            GroupKind::Ipmc => GroupRef::Ipmc(group_id),
            GroupKind::Rpf => GroupRef::Rpf(group_id),
        }
    }

    pub fn kind(&self) -> GroupKind {
        match self {
            GroupRef::Ipmc(_) => GroupKind::Ipmc,
            GroupRef::Rpf(_) => GroupKind::Rpf,
        }
    }

    pub fn group_id(&self) -> GroupId {
        match self {
            GroupRef::Ipmc(id) | GroupRef::Rpf(id) => *id,
        }
    }
}

impl fmt::Display for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.group_id())
    }
}

/// A router interface's membership in a group
pub type IntfGroup = (RouterIntfId, GroupRef);

/// A one-to-many map of back-references.  Keys with no remaining values are
/// dropped, so `count()` of an unknown key and of a drained key agree.
#[derive(Debug)]
pub struct RevMap<K, V> {
    map: BTreeMap<K, BTreeSet<V>>,
}

impl<K, V> Default for RevMap<K, V> {
    fn default() -> Self {
        RevMap {
            map: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Copy, V: Ord + Copy> RevMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a relationship.  Returns false if it was already present.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        self.map.entry(key).or_default().insert(value)
    }

    /// Forget a relationship.  Forgetting one that isn't present is not an
    /// error; the return value reports whether anything changed.
    pub fn remove(&mut self, key: &K, value: &V) -> bool {
        let Some(values) = self.map.get_mut(key) else {
            return false;
        };
        let removed = values.remove(value);
        if values.is_empty() {
            self.map.remove(key);
        }
        removed
    }

    /// Forget every relationship for `key`, returning what was removed.
    pub fn remove_all(&mut self, key: &K) -> Vec<V> {
        self.map
            .remove(key)
            .map(|values| values.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &K, value: &V) -> bool {
        self.map.get(key).is_some_and(|values| values.contains(value))
    }

    /// All values recorded for `key`, in order.
    pub fn list(&self, key: &K) -> Vec<V> {
        self.map
            .get(key)
            .map(|values| values.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, key: &K) -> usize {
        self.map.get(key).map(|values| values.len()).unwrap_or(0)
    }

    /// The number of keys with at least one value.
    pub fn key_count(&self) -> usize {
        self.map.len()
    }

    /// Every (key, value) pair, in order.
    pub fn pairs(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.map
            .iter()
            .flat_map(|(k, values)| values.iter().map(move |v| (*k, *v)))
    }
}

/// port -> (router interface, group) pairs whose fan-out includes the port
pub type PortMap = RevMap<BridgePortId, IntfGroup>;

/// (router interface, group) -> keys of the route entries it feeds
pub type RtfEntryMap = RevMap<IntfGroup, RouteEntryKey>;
