// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The IPMC and RPF group tables.  Both kinds of group share a shape: an id,
//! an ordered member list, and an optional binding to a replication group.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use slog::{debug, o};

use aal::HwHandle;
use common::mcast::{
    GroupId, GroupKind, MemberId, ReplGroupId, RouteEntryKey, RouterIntfId,
    SwitchId,
};

use crate::member::{MemberArena, MemberHandle, MemberList, MemberNode};
use crate::types::{GroupView, IpmcError, IpmcResult, MemberView};

#[derive(Debug)]
pub struct GroupNode {
    pub group_id: GroupId,
    pub switch_id: SwitchId,
    pub members: MemberList,
    pub repl_group: Option<ReplGroupId>,
    pub hw_info: Option<HwHandle>,
    /// Keys of the route entries that point at this group
    pub route_refs: BTreeSet<RouteEntryKey>,
}

impl GroupNode {
    pub fn new(group_id: GroupId, switch_id: SwitchId) -> Self {
        GroupNode {
            group_id,
            switch_id,
            members: MemberList::default(),
            repl_group: None,
            hw_info: None,
            route_refs: BTreeSet::new(),
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

pub struct GroupTable {
    log: slog::Logger,
    kind: GroupKind,
    limit: usize,
    groups: BTreeMap<GroupId, GroupNode>,
    members: MemberArena,
}

impl GroupTable {
    pub fn new(
        log: &slog::Logger,
        kind: GroupKind,
        max_groups: usize,
        max_members: usize,
    ) -> Self {
        GroupTable {
            log: log.new(o!("unit" => format!("{kind}_groups"))),
            kind,
            limit: max_groups,
            groups: BTreeMap::new(),
            members: MemberArena::new(max_members),
        }
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupNode> {
        self.groups.values()
    }

    pub fn arena(&self) -> &MemberArena {
        &self.members
    }

    fn no_group(&self, group_id: GroupId) -> IpmcError {
        IpmcError::Missing(format!("no such {} group: {group_id}", self.kind))
    }

    fn no_member(&self, member_id: MemberId) -> IpmcError {
        IpmcError::Missing(format!(
            "no such {} group member: {member_id}",
            self.kind
        ))
    }

    pub fn find(&self, group_id: GroupId) -> Option<&GroupNode> {
        self.groups.get(&group_id)
    }

    pub fn get(&self, group_id: GroupId) -> IpmcResult<&GroupNode> {
        self.find(group_id).ok_or_else(|| self.no_group(group_id))
    }

    pub fn get_mut(&mut self, group_id: GroupId) -> IpmcResult<&mut GroupNode> {
        let kind = self.kind;
        self.groups.get_mut(&group_id).ok_or_else(|| {
            IpmcError::Missing(format!("no such {kind} group: {group_id}"))
        })
    }

    /// Return the group following `after` in id order, or the first group if
    /// `after` is None.
    pub fn get_next(&self, after: Option<GroupId>) -> Option<&GroupNode> {
        match after {
            None => self.groups.values().next(),
            Some(id) => self
                .groups
                .range((Bound::Excluded(id), Bound::Unbounded))
                .next()
                .map(|(_, g)| g),
        }
    }

    /// Verify that a group with this id could be inserted.
    pub fn check_insert(&self, group_id: GroupId) -> IpmcResult<()> {
        if self.groups.contains_key(&group_id) {
            return Err(IpmcError::Other(format!(
                "{} group {group_id} already exists",
                self.kind
            )));
        }
        if self.groups.len() >= self.limit {
            return Err(IpmcError::TableFull(format!("{}_groups", self.kind)));
        }
        Ok(())
    }

    pub fn insert(&mut self, node: GroupNode) -> IpmcResult<()> {
        self.check_insert(node.group_id)?;
        debug!(self.log, "inserting group";
            "group_id" => node.group_id,
            "repl_group" => ?node.repl_group);
        self.groups.insert(node.group_id, node);
        Ok(())
    }

    /// Verify that a group could be removed: it must exist, have no members,
    /// and not be used by any route entry.
    pub fn check_remove(&self, group_id: GroupId) -> IpmcResult<&GroupNode> {
        let group = self.get(group_id)?;
        if !group.members.is_empty() {
            return Err(IpmcError::Busy(format!(
                "{} group {group_id} has {} members",
                self.kind,
                group.member_count()
            )));
        }
        if !group.route_refs.is_empty() {
            return Err(IpmcError::Busy(format!(
                "{} group {group_id} is used by {} route entries",
                self.kind,
                group.route_refs.len()
            )));
        }
        Ok(group)
    }

    pub fn remove(&mut self, group_id: GroupId) -> IpmcResult<GroupNode> {
        self.check_remove(group_id)?;
        debug!(self.log, "removing group"; "group_id" => group_id);
        self.groups
            .remove(&group_id)
            .ok_or_else(|| self.no_group(group_id))
    }

    /// Find a member by its object id.
    pub fn member(
        &self,
        member_id: MemberId,
    ) -> IpmcResult<(MemberHandle, &MemberNode)> {
        self.members
            .lookup(member_id)
            .and_then(|h| self.members.get(h).map(|m| (h, m)))
            .ok_or_else(|| self.no_member(member_id))
    }

    pub fn member_mut(
        &mut self,
        member_id: MemberId,
    ) -> IpmcResult<&mut MemberNode> {
        let kind = self.kind;
        self.members
            .lookup(member_id)
            .and_then(|h| self.members.get_mut(h))
            .ok_or_else(|| {
                IpmcError::Missing(format!(
                    "no such {kind} group member: {member_id}"
                ))
            })
    }

    /// Verify that a member could be added to a group.
    pub fn check_member_add(
        &self,
        group_id: GroupId,
        member_id: MemberId,
        rtr_intf: RouterIntfId,
    ) -> IpmcResult<&GroupNode> {
        let group = self.get(group_id)?;
        group
            .members
            .check_add(&self.members, member_id, rtr_intf)?;
        Ok(group)
    }

    pub fn member_add(&mut self, node: MemberNode) -> IpmcResult<MemberHandle> {
        let kind = self.kind;
        let group_id = node.group_id;
        let member_id = node.member_id;
        let group = self.groups.get_mut(&group_id).ok_or_else(|| {
            IpmcError::Missing(format!("no such {kind} group: {group_id}"))
        })?;
        let handle = group.members.add(&mut self.members, node)?;
        debug!(self.log, "added member";
            "group_id" => group_id,
            "member_id" => member_id,
            "handle" => %handle);
        Ok(handle)
    }

    pub fn member_remove(
        &mut self,
        member_id: MemberId,
    ) -> IpmcResult<MemberNode> {
        let (handle, member) = self.member(member_id)?;
        let group_id = member.group_id;
        let kind = self.kind;
        let group = self.groups.get_mut(&group_id).ok_or_else(|| {
            IpmcError::Other(format!(
                "member {member_id} refers to missing {kind} group {group_id}"
            ))
        })?;
        let node = group.members.remove(&mut self.members, handle)?;
        debug!(self.log, "removed member";
            "group_id" => group_id,
            "member_id" => member_id);
        Ok(node)
    }

    pub fn find_member_by_router_interface(
        &self,
        group_id: GroupId,
        rtr_intf: RouterIntfId,
    ) -> IpmcResult<Option<&MemberNode>> {
        let group = self.get(group_id)?;
        Ok(group
            .members
            .find_by_router_interface(&self.members, rtr_intf)
            .and_then(|h| self.members.get(h)))
    }

    /// Return the member of `group_id` following `after`, or its first member
    /// if `after` is None.
    pub fn member_get_next(
        &self,
        group_id: GroupId,
        after: Option<MemberHandle>,
    ) -> IpmcResult<Option<(MemberHandle, &MemberNode)>> {
        let group = self.get(group_id)?;
        Ok(group
            .members
            .get_next(after)
            .and_then(|h| self.members.get(h).map(|m| (h, m))))
    }

    pub fn view(&self, group: &GroupNode) -> GroupView {
        GroupView {
            kind: self.kind,
            group_id: group.group_id,
            switch_id: group.switch_id,
            repl_group: group.repl_group,
            hw_info: group.hw_info,
            member_count: group.member_count(),
            members: group
                .members
                .iter()
                .filter_map(|h| self.members.get(h))
                .map(|m| m.member_id)
                .collect(),
            route_refs: group.route_refs.len(),
        }
    }

    pub fn member_view(
        &self,
        handle: MemberHandle,
        member: &MemberNode,
    ) -> MemberView {
        MemberView {
            kind: self.kind,
            handle,
            member_id: member.member_id,
            switch_id: member.switch_id,
            group_id: member.group_id,
            rtr_intf: member.rtr_intf,
            ports: member.ports.iter().copied().collect(),
            hw_info: member.hw_info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn table() -> GroupTable {
        GroupTable::new(&crate::test_logger(), GroupKind::Ipmc, 4, 16)
    }

    fn member(member_id: MemberId, group_id: GroupId) -> MemberNode {
        MemberNode {
            member_id,
            switch_id: 0,
            group_id,
            rtr_intf: member_id * 10,
            ports: BTreeSet::new(),
            hw_info: None,
        }
    }

    #[test]
    fn test_duplicate_insert() -> anyhow::Result<()> {
        let mut t = table();
        t.insert(GroupNode::new(1, 0))?;
        match t.insert(GroupNode::new(1, 0)) {
            Err(e) => assert_eq!(e.kind(), crate::types::ErrorKind::Failure),
            Ok(_) => panic!("duplicate insert succeeded"),
        }
        Ok(())
    }

    #[test]
    fn test_limit() -> anyhow::Result<()> {
        let mut t = table();
        for id in 0..4 {
            t.insert(GroupNode::new(id, 0))?;
        }
        assert!(matches!(
            t.insert(GroupNode::new(4, 0)),
            Err(IpmcError::TableFull(_))
        ));
        Ok(())
    }

    #[test]
    fn test_remove_busy() -> anyhow::Result<()> {
        let mut t = table();
        t.insert(GroupNode::new(1, 0))?;
        t.member_add(member(5, 1))?;
        assert!(matches!(t.remove(1), Err(IpmcError::Busy(_))));
        t.member_remove(5)?;

        let key =
            RouteEntryKey::xg(0, 1, IpAddr::V4(Ipv4Addr::new(224, 0, 0, 9)));
        t.get_mut(1)?.route_refs.insert(key);
        assert!(matches!(t.remove(1), Err(IpmcError::Busy(_))));
        t.get_mut(1)?.route_refs.remove(&key);

        t.remove(1)?;
        assert!(matches!(t.remove(1), Err(IpmcError::Missing(_))));
        Ok(())
    }

    #[test]
    fn test_members() -> anyhow::Result<()> {
        let mut t = table();
        t.insert(GroupNode::new(1, 0))?;
        t.insert(GroupNode::new(2, 0))?;
        t.member_add(member(5, 1))?;
        t.member_add(member(6, 1))?;
        assert!(matches!(
            t.member_add(member(7, 3)),
            Err(IpmcError::Missing(_))
        ));

        let found = t.find_member_by_router_interface(1, 60)?.unwrap();
        assert_eq!(found.member_id, 6);
        assert!(t.find_member_by_router_interface(2, 60)?.is_none());

        let view = t.view(t.get(1)?);
        assert_eq!(view.member_count, 2);
        assert_eq!(view.members, vec![5, 6]);

        let (h, first) = t.member_get_next(1, None)?.unwrap();
        assert_eq!(first.member_id, 5);
        let (_, second) = t.member_get_next(1, Some(h))?.unwrap();
        assert_eq!(second.member_id, 6);
        Ok(())
    }

    #[test]
    fn test_get_next() -> anyhow::Result<()> {
        let mut t = table();
        for id in [9, 2, 4] {
            t.insert(GroupNode::new(id, 0))?;
        }
        let mut seen = Vec::new();
        let mut cursor = None;
        while let Some(g) = t.get_next(cursor) {
            seen.push(g.group_id);
            cursor = Some(g.group_id);
        }
        assert_eq!(seen, vec![2, 4, 9]);
        Ok(())
    }
}
