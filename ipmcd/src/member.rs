// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Group member lists.
//!
//! Member records live in an arena owned by the group table and are addressed
//! by a [`MemberHandle`].  Each group holds an ordered set of the handles that
//! belong to it.  Handles are allocated from a counter that never goes
//! backwards, so the handle order within a group is the order in which the
//! members were added, and a cursor holding the handle of a member that has
//! since been removed still finds its successor.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use aal::HwHandle;
use common::mcast::{BridgePortId, GroupId, MemberId, RouterIntfId, SwitchId};

use crate::types::{IpmcError, IpmcResult};

/// Stable address of a member record.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
)]
pub struct MemberHandle(u64);

impl std::fmt::Display for MemberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MemberNode {
    pub member_id: MemberId,
    pub switch_id: SwitchId,
    pub group_id: GroupId,
    pub rtr_intf: RouterIntfId,
    /// The physical ports behind `rtr_intf` that receive a copy
    pub ports: BTreeSet<BridgePortId>,
    pub hw_info: Option<HwHandle>,
}

/// Storage for every member record of one group table.
#[derive(Debug)]
pub struct MemberArena {
    next: u64,
    limit: usize,
    nodes: BTreeMap<MemberHandle, MemberNode>,
    by_id: BTreeMap<MemberId, MemberHandle>,
}

impl MemberArena {
    pub fn new(limit: usize) -> Self {
        MemberArena {
            next: 1,
            limit,
            nodes: BTreeMap::new(),
            by_id: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, handle: MemberHandle) -> Option<&MemberNode> {
        self.nodes.get(&handle)
    }

    pub fn get_mut(&mut self, handle: MemberHandle) -> Option<&mut MemberNode> {
        self.nodes.get_mut(&handle)
    }

    /// Look up the handle of a member by its object id.
    pub fn lookup(&self, member_id: MemberId) -> Option<MemberHandle> {
        self.by_id.get(&member_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MemberHandle, &MemberNode)> {
        self.nodes.iter()
    }

    /// Verify that a new record could be stored.
    pub fn check_alloc(&self, member_id: MemberId) -> IpmcResult<()> {
        if self.by_id.contains_key(&member_id) {
            return Err(IpmcError::Exists(format!(
                "member {member_id} already exists"
            )));
        }
        if self.nodes.len() >= self.limit {
            return Err(IpmcError::TableFull("members".to_string()));
        }
        Ok(())
    }

    fn alloc(&mut self, node: MemberNode) -> IpmcResult<MemberHandle> {
        self.check_alloc(node.member_id)?;
        let handle = MemberHandle(self.next);
        self.next += 1;
        self.by_id.insert(node.member_id, handle);
        self.nodes.insert(handle, node);
        Ok(handle)
    }

    fn free(&mut self, handle: MemberHandle) -> Option<MemberNode> {
        let node = self.nodes.remove(&handle)?;
        self.by_id.remove(&node.member_id);
        Some(node)
    }
}

/// The members of one group, in the order they were added.
#[derive(Debug, Default)]
pub struct MemberList {
    handles: BTreeSet<MemberHandle>,
}

impl MemberList {
    /// The number of live members.  The list is the only record of
    /// membership, so this can never drift from the list itself.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = MemberHandle> + '_ {
        self.handles.iter().copied()
    }

    pub fn contains(&self, handle: MemberHandle) -> bool {
        self.handles.contains(&handle)
    }

    /// Verify that `member` could be added to this list.
    pub fn check_add(
        &self,
        arena: &MemberArena,
        member_id: MemberId,
        rtr_intf: RouterIntfId,
    ) -> IpmcResult<()> {
        if self.find_by_router_interface(arena, rtr_intf).is_some() {
            return Err(IpmcError::Exists(format!(
                "router interface {rtr_intf} is already a member"
            )));
        }
        arena.check_alloc(member_id)
    }

    /// Append a member to the list.
    pub fn add(
        &mut self,
        arena: &mut MemberArena,
        node: MemberNode,
    ) -> IpmcResult<MemberHandle> {
        self.check_add(arena, node.member_id, node.rtr_intf)?;
        let handle = arena.alloc(node)?;
        self.handles.insert(handle);
        Ok(handle)
    }

    /// Detach a member from the list and release its record.
    pub fn remove(
        &mut self,
        arena: &mut MemberArena,
        handle: MemberHandle,
    ) -> IpmcResult<MemberNode> {
        if !self.handles.remove(&handle) {
            return Err(IpmcError::Missing(format!(
                "member handle {handle} is not in this group"
            )));
        }
        arena.free(handle).ok_or_else(|| {
            IpmcError::Other(format!("member handle {handle} has no record"))
        })
    }

    pub fn find_by_router_interface(
        &self,
        arena: &MemberArena,
        rtr_intf: RouterIntfId,
    ) -> Option<MemberHandle> {
        self.handles.iter().copied().find(|h| {
            arena.get(*h).map(|m| m.rtr_intf == rtr_intf).unwrap_or(false)
        })
    }

    /// Return the member following `after`, or the first member if `after`
    /// is None.  `after` need not still be in the list.
    pub fn get_next(
        &self,
        after: Option<MemberHandle>,
    ) -> Option<MemberHandle> {
        match after {
            None => self.handles.first().copied(),
            Some(h) => self
                .handles
                .range((
                    std::ops::Bound::Excluded(h),
                    std::ops::Bound::Unbounded,
                ))
                .next()
                .copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(member_id: MemberId, rtr_intf: RouterIntfId) -> MemberNode {
        MemberNode {
            member_id,
            switch_id: 0,
            group_id: 1,
            rtr_intf,
            ports: BTreeSet::new(),
            hw_info: None,
        }
    }

    #[test]
    fn test_unique_router_interface() -> anyhow::Result<()> {
        let mut arena = MemberArena::new(16);
        let mut list = MemberList::default();
        list.add(&mut arena, node(10, 5))?;
        assert!(matches!(
            list.add(&mut arena, node(11, 5)),
            Err(IpmcError::Exists(_))
        ));
        assert!(matches!(
            list.add(&mut arena, node(10, 6)),
            Err(IpmcError::Exists(_))
        ));
        list.add(&mut arena, node(11, 6))?;
        assert_eq!(list.len(), 2);
        assert_eq!(arena.len(), 2);
        Ok(())
    }

    #[test]
    fn test_limit() -> anyhow::Result<()> {
        let mut arena = MemberArena::new(1);
        let mut list = MemberList::default();
        list.add(&mut arena, node(1, 1))?;
        assert!(matches!(
            list.add(&mut arena, node(2, 2)),
            Err(IpmcError::TableFull(_))
        ));
        Ok(())
    }

    #[test]
    fn test_remove() -> anyhow::Result<()> {
        let mut arena = MemberArena::new(16);
        let mut list = MemberList::default();
        let h = list.add(&mut arena, node(1, 1))?;
        assert_eq!(list.remove(&mut arena, h)?.member_id, 1);
        assert!(matches!(
            list.remove(&mut arena, h),
            Err(IpmcError::Missing(_))
        ));
        assert!(arena.is_empty());
        assert_eq!(arena.lookup(1), None);
        Ok(())
    }

    #[test]
    fn test_find_by_router_interface() -> anyhow::Result<()> {
        let mut arena = MemberArena::new(16);
        let mut a = MemberList::default();
        let mut b = MemberList::default();
        let ha = a.add(&mut arena, node(1, 7))?;
        let hb = b.add(&mut arena, node(2, 7))?;
        assert_eq!(a.find_by_router_interface(&arena, 7), Some(ha));
        assert_eq!(b.find_by_router_interface(&arena, 7), Some(hb));
        assert_eq!(a.find_by_router_interface(&arena, 8), None);
        Ok(())
    }

    // Walking the list while removing the member just returned still visits
    // every remaining member exactly once, in insertion order.
    #[test]
    fn test_get_next_survives_removal() -> anyhow::Result<()> {
        let mut arena = MemberArena::new(16);
        let mut list = MemberList::default();
        for i in 0..5 {
            list.add(&mut arena, node(100 - i, i))?;
        }

        let mut seen = Vec::new();
        let mut cursor = list.get_next(None);
        while let Some(h) = cursor {
            seen.push(arena.get(h).unwrap().member_id);
            if seen.len() % 2 == 1 {
                list.remove(&mut arena, h)?;
            }
            cursor = list.get_next(Some(h));
        }
        assert_eq!(seen, vec![100, 99, 98, 97, 96]);
        assert_eq!(list.len(), 2);
        Ok(())
    }

    #[test]
    fn test_get_next_after_removed_cursor() -> anyhow::Result<()> {
        let mut arena = MemberArena::new(16);
        let mut list = MemberList::default();
        let h1 = list.add(&mut arena, node(1, 1))?;
        let h2 = list.add(&mut arena, node(2, 2))?;
        let h3 = list.add(&mut arena, node(3, 3))?;
        assert_eq!(list.get_next(Some(h1)), Some(h2));

        // The cursor is parked on h2 when h2 goes away
        list.remove(&mut arena, h2)?;
        assert_eq!(list.get_next(Some(h2)), Some(h3));
        assert_eq!(list.get_next(Some(h3)), None);
        Ok(())
    }
}
