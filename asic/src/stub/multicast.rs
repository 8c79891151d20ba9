// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::collections::{BTreeMap, BTreeSet};

use aal::{AsicError, AsicResult, McMember};
use common::mcast::{
    BridgePortId, GroupId, GroupKind, McRouteEntry, MemberId, ReplGroupId,
    RouteEntryKey, RouterIntfId,
};

#[derive(Debug, Default)]
struct StubMember {
    rtr_intf: RouterIntfId,
    ports: BTreeSet<BridgePortId>,
}

#[derive(Debug, Default)]
struct StubGroup {
    repl_index: Option<u32>,
    members: BTreeMap<MemberId, StubMember>,
}

#[derive(Debug)]
struct StubRoute {
    entry: McRouteEntry,
    hit: bool,
    updates: usize,
}

/// The multicast state programmed into the stub ASIC.
#[derive(Debug, Default)]
pub struct McGroupData {
    repl: BTreeMap<ReplGroupId, u32>,
    groups: BTreeMap<(GroupKind, GroupId), StubGroup>,
    routes: BTreeMap<RouteEntryKey, StubRoute>,
}

fn no_repl(repl_id: ReplGroupId) -> AsicError {
    AsicError::InvalidArg(format!("no such replication group: {repl_id}"))
}

fn no_group(kind: GroupKind, group_id: GroupId) -> AsicError {
    AsicError::InvalidArg(format!("no such {kind} group: {group_id}"))
}

fn no_member(group_id: GroupId, member_id: MemberId) -> AsicError {
    AsicError::InvalidArg(format!(
        "group {group_id} has no member {member_id}"
    ))
}

fn no_route(key: &RouteEntryKey) -> AsicError {
    AsicError::Missing(format!("no route entry for {key}"))
}

impl McGroupData {
    fn repl_index_valid(&self, repl_index: Option<u32>) -> AsicResult<()> {
        match repl_index {
            Some(idx) if !self.repl.values().any(|v| *v == idx) => {
                Err(AsicError::InvalidArg(format!(
                    "replication index {idx} is not allocated"
                )))
            }
            _ => Ok(()),
        }
    }

    fn route_groups_valid(&self, entry: &McRouteEntry) -> AsicResult<()> {
        for kind in [GroupKind::Ipmc, GroupKind::Rpf] {
            let group_id = entry.group(kind);
            if !self.groups.contains_key(&(kind, group_id)) {
                return Err(no_group(kind, group_id));
            }
        }
        Ok(())
    }

    fn group_mut(
        &mut self,
        kind: GroupKind,
        group_id: GroupId,
    ) -> AsicResult<&mut StubGroup> {
        self.groups
            .get_mut(&(kind, group_id))
            .ok_or_else(|| no_group(kind, group_id))
    }

    fn member_mut(
        &mut self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
    ) -> AsicResult<&mut StubMember> {
        self.group_mut(kind, group_id)?
            .members
            .get_mut(&member_id)
            .ok_or_else(|| no_member(group_id, member_id))
    }

    pub fn repl_create(
        &mut self,
        repl_id: ReplGroupId,
        hw_index: u32,
    ) -> AsicResult<()> {
        if self.repl.contains_key(&repl_id) {
            return Err(AsicError::InvalidArg(format!(
                "replication group {repl_id} already exists"
            )));
        }
        if self.repl.values().any(|v| *v == hw_index) {
            return Err(AsicError::InvalidArg(format!(
                "replication index {hw_index} already allocated"
            )));
        }
        self.repl.insert(repl_id, hw_index);
        Ok(())
    }

    pub fn repl_destroy(&mut self, repl_id: ReplGroupId) -> AsicResult<()> {
        let idx = *self.repl.get(&repl_id).ok_or_else(|| no_repl(repl_id))?;
        if self.groups.values().any(|g| g.repl_index == Some(idx)) {
            return Err(AsicError::InvalidArg(format!(
                "replication group {repl_id} is still bound to a group"
            )));
        }
        self.repl.remove(&repl_id);
        Ok(())
    }

    pub fn group_create(
        &mut self,
        kind: GroupKind,
        group_id: GroupId,
        repl_index: Option<u32>,
    ) -> AsicResult<()> {
        if self.groups.contains_key(&(kind, group_id)) {
            return Err(AsicError::InvalidArg(format!(
                "{kind} group {group_id} already exists"
            )));
        }
        self.repl_index_valid(repl_index)?;
        self.groups.insert(
            (kind, group_id),
            StubGroup {
                repl_index,
                ..Default::default()
            },
        );
        Ok(())
    }

    pub fn group_destroy(
        &mut self,
        kind: GroupKind,
        group_id: GroupId,
    ) -> AsicResult<()> {
        let group = self
            .groups
            .get(&(kind, group_id))
            .ok_or_else(|| no_group(kind, group_id))?;
        if !group.members.is_empty() {
            return Err(AsicError::InvalidArg(format!(
                "{kind} group {group_id} still has members"
            )));
        }
        if self.routes.values().any(|r| r.entry.group(kind) == group_id) {
            return Err(AsicError::InvalidArg(format!(
                "{kind} group {group_id} is referenced by a route entry"
            )));
        }
        self.groups.remove(&(kind, group_id));
        Ok(())
    }

    pub fn group_modify(
        &mut self,
        kind: GroupKind,
        group_id: GroupId,
        repl_index: Option<u32>,
    ) -> AsicResult<()> {
        self.repl_index_valid(repl_index)?;
        self.group_mut(kind, group_id)?.repl_index = repl_index;
        Ok(())
    }

    pub fn member_create(
        &mut self,
        kind: GroupKind,
        group_id: GroupId,
        member: &McMember,
    ) -> AsicResult<()> {
        let group = self.group_mut(kind, group_id)?;
        if group.members.contains_key(&member.member_id) {
            return Err(AsicError::InvalidArg(format!(
                "group {group_id} already contains member {}",
                member.member_id
            )));
        }
        group.members.insert(
            member.member_id,
            StubMember {
                rtr_intf: member.rtr_intf,
                ports: member.ports.iter().copied().collect(),
            },
        );
        Ok(())
    }

    pub fn member_destroy(
        &mut self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
    ) -> AsicResult<()> {
        match self.group_mut(kind, group_id)?.members.remove(&member_id) {
            Some(_) => Ok(()),
            None => Err(no_member(group_id, member_id)),
        }
    }

    pub fn member_port_add(
        &mut self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
        port: BridgePortId,
    ) -> AsicResult<()> {
        let member = self.member_mut(kind, group_id, member_id)?;
        match member.ports.insert(port) {
            true => Ok(()),
            false => Err(AsicError::InvalidArg(format!(
                "member {member_id} already contains port {port}"
            ))),
        }
    }

    pub fn member_port_remove(
        &mut self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
        port: BridgePortId,
    ) -> AsicResult<()> {
        let member = self.member_mut(kind, group_id, member_id)?;
        match member.ports.remove(&port) {
            true => Ok(()),
            false => Err(AsicError::InvalidArg(format!(
                "member {member_id} doesn't contain port {port}"
            ))),
        }
    }

    pub fn route_create(&mut self, entry: &McRouteEntry) -> AsicResult<()> {
        if self.routes.contains_key(&entry.key) {
            return Err(AsicError::Exists);
        }
        self.route_groups_valid(entry)?;
        self.routes.insert(
            entry.key,
            StubRoute {
                entry: entry.clone(),
                hit: false,
                updates: 0,
            },
        );
        Ok(())
    }

    pub fn route_destroy(&mut self, key: &RouteEntryKey) -> AsicResult<()> {
        match self.routes.remove(key) {
            Some(_) => Ok(()),
            None => Err(no_route(key)),
        }
    }

    pub fn route_update(&mut self, entry: &McRouteEntry) -> AsicResult<()> {
        if !self.routes.contains_key(&entry.key) {
            return Err(no_route(&entry.key));
        }
        self.route_groups_valid(entry)?;
        if let Some(route) = self.routes.get_mut(&entry.key) {
            route.entry = entry.clone();
            route.updates += 1;
        }
        Ok(())
    }

    pub fn route_hit(&self, key: &RouteEntryKey) -> AsicResult<bool> {
        self.routes
            .get(key)
            .map(|r| r.hit)
            .ok_or_else(|| no_route(key))
    }

    pub fn set_route_hit(
        &mut self,
        key: &RouteEntryKey,
        hit: bool,
    ) -> AsicResult<()> {
        let route = self.routes.get_mut(key).ok_or_else(|| no_route(key))?;
        route.hit = hit;
        Ok(())
    }

    pub fn repl_groups(&self) -> Vec<(ReplGroupId, u32)> {
        self.repl.iter().map(|(k, v)| (*k, *v)).collect()
    }

    pub fn group_count(&self, kind: GroupKind) -> usize {
        self.groups.keys().filter(|(k, _)| *k == kind).count()
    }

    /// Returns the replication index a group is bound to, or None if the group
    /// doesn't exist.
    pub fn group_repl_index(
        &self,
        kind: GroupKind,
        group_id: GroupId,
    ) -> Option<Option<u32>> {
        self.groups.get(&(kind, group_id)).map(|g| g.repl_index)
    }

    pub fn member_ports(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
    ) -> Option<Vec<BridgePortId>> {
        self.groups
            .get(&(kind, group_id))?
            .members
            .get(&member_id)
            .map(|m| m.ports.iter().copied().collect())
    }

    pub fn member_rtr_intf(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
    ) -> Option<RouterIntfId> {
        self.groups
            .get(&(kind, group_id))?
            .members
            .get(&member_id)
            .map(|m| m.rtr_intf)
    }

    pub fn route(&self, key: &RouteEntryKey) -> Option<McRouteEntry> {
        self.routes.get(key).map(|r| r.entry.clone())
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn route_updates(&self, key: &RouteEntryKey) -> usize {
        self.routes.get(key).map(|r| r.updates).unwrap_or(0)
    }
}

pub fn init() -> McGroupData {
    McGroupData::default()
}
