// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Multicast cache operations.
//!
//! Each mutation follows the same three steps: validate the request against
//! the cache, program the hardware through an [`HwJournal`], and only then
//! commit the change to the cache.  Validation covers every condition the
//! commit depends on, so once the hardware has accepted a change the commit
//! can't fail.  If the hardware rejects any step, the steps already taken are
//! reversed and the cache is left untouched.

use std::collections::BTreeSet;

use slog::debug;

use aal::{AsicOps, McMember};
use common::mcast::{
    BridgePortId, GroupId, GroupKind, McRouteEntry, MemberId, PacketAction,
    ReplGroupId, ReplOwner, RouteEntryKey, RouterIntfId, SwitchId,
};

use crate::group::GroupNode;
use crate::member::{MemberHandle, MemberNode};
use crate::replication::ReplGroupNode;
use crate::revmap::{GroupRef, IntfGroup};
use crate::route::RouteEntryWalk;
use crate::types::{
    copy_list, GroupView, IpmcError, IpmcResult, MemberCreate, MemberView,
    ReplBinding, RouteEntryView,
};
use crate::{config::MemberRemovalPolicy, EntryData, GroupData, Ipmc};

pub(crate) mod rollback;

use rollback::HwJournal;

// A replication group a new group will bind to
#[derive(Clone, Copy)]
struct ReplPlan {
    repl_id: ReplGroupId,
    hw_index: u32,
    // The replication group has to be created first
    create: bool,
}

// A replication group a group is about to let go of
#[derive(Clone, Copy)]
struct ReplRelease {
    repl_id: ReplGroupId,
    hw_index: u32,
    // This is the last reference, so the replication group goes too
    frees: bool,
}

fn plan_release(
    groups: &GroupData,
    repl_id: ReplGroupId,
) -> IpmcResult<ReplRelease> {
    let node = groups.repl.find(repl_id).ok_or_else(|| {
        IpmcError::Other(format!(
            "group bound to missing replication group {repl_id}"
        ))
    })?;
    Ok(ReplRelease {
        repl_id,
        hw_index: node.hw_index,
        frees: groups.repl.would_free(repl_id)?,
    })
}

/// The (router interface, group) pairs of every member of a group.
pub(crate) fn group_intfs(
    groups: &GroupData,
    kind: GroupKind,
    group_id: GroupId,
) -> IpmcResult<Vec<IntfGroup>> {
    let table = groups.table(kind);
    let group = table.get(group_id)?;
    let gref = GroupRef::new(kind, group_id);
    Ok(group
        .members
        .iter()
        .filter_map(|h| table.arena().get(h))
        .map(|m| (m.rtr_intf, gref))
        .collect())
}

/// Every route entry fed by any of the given interface/group pairs, each
/// listed once.
pub(crate) fn dependent_entries(
    entries: &EntryData,
    intfs: impl IntoIterator<Item = IntfGroup>,
) -> IpmcResult<Vec<McRouteEntry>> {
    let keys: BTreeSet<RouteEntryKey> = intfs
        .into_iter()
        .flat_map(|intf| entries.rtf_map.list(&intf))
        .collect();
    keys.iter()
        .map(|k| entries.routes.get(k).cloned())
        .collect()
}

// Record that `entry` uses its two groups, along with the interfaces that
// feed it.
fn link_route(
    groups: &mut GroupData,
    entries: &mut EntryData,
    entry: &McRouteEntry,
) -> IpmcResult<()> {
    for kind in [GroupKind::Ipmc, GroupKind::Rpf] {
        let group_id = entry.group(kind);
        for intf in group_intfs(groups, kind, group_id)? {
            entries.rtf_map.insert(intf, entry.key);
        }
        groups
            .table_mut(kind)
            .get_mut(group_id)?
            .route_refs
            .insert(entry.key);
    }
    Ok(())
}

fn unlink_route(
    groups: &mut GroupData,
    entries: &mut EntryData,
    entry: &McRouteEntry,
) -> IpmcResult<()> {
    for kind in [GroupKind::Ipmc, GroupKind::Rpf] {
        let group_id = entry.group(kind);
        for intf in group_intfs(groups, kind, group_id)? {
            entries.rtf_map.remove(&intf, &entry.key);
        }
        groups
            .table_mut(kind)
            .get_mut(group_id)?
            .route_refs
            .remove(&entry.key);
    }
    Ok(())
}

// Both groups an entry points at have to exist.
fn check_route_groups(
    groups: &GroupData,
    entry: &McRouteEntry,
) -> IpmcResult<()> {
    for kind in [GroupKind::Ipmc, GroupKind::Rpf] {
        groups.table(kind).get(entry.group(kind))?;
    }
    Ok(())
}

impl<H: AsicOps> Ipmc<H> {
    /// Run a sequence of hardware calls.  If any of them fails, the ones that
    /// succeeded are reversed before the error is returned.
    pub(crate) fn program<'a, T, F>(&'a self, f: F) -> IpmcResult<T>
    where
        F: FnOnce(&mut HwJournal<'a, H>) -> IpmcResult<T>,
    {
        let mut hw = HwJournal::new(&self.asic_hdl, &self.log);
        match f(&mut hw) {
            Ok(v) => Ok(v),
            Err(e) => {
                debug!(self.log, "hardware programming failed, rolling back";
                    "error" => %e);
                Err(hw.unwind(e))
            }
        }
    }

    /// Create a replication group with no references.  It remains until it
    /// is removed with [`Ipmc::repl_group_remove`], even if groups come and
    /// go in the meantime.
    pub fn repl_group_create(
        &self,
        repl_id: ReplGroupId,
        hw_index: u32,
        owner: ReplOwner,
    ) -> IpmcResult<()> {
        let mut groups = self.lock_groups();
        groups.repl.check_create(repl_id, hw_index)?;
        self.program(|hw| hw.repl_group_create(repl_id, hw_index))?;
        groups.repl.create(repl_id, hw_index, owner)
    }

    /// Remove a replication group.  Fails as busy while any group is bound
    /// to it.
    pub fn repl_group_remove(&self, repl_id: ReplGroupId) -> IpmcResult<()> {
        let mut groups = self.lock_groups();
        let hw_index = groups.repl.check_remove(repl_id)?.hw_index;
        self.program(|hw| hw.repl_group_destroy(repl_id, hw_index))?;
        groups.repl.remove(repl_id).map(|_| ())
    }

    pub fn repl_group_get(
        &self,
        repl_id: ReplGroupId,
    ) -> IpmcResult<ReplGroupNode> {
        self.lock_groups().repl.find(repl_id).cloned().ok_or_else(|| {
            IpmcError::Missing(format!("no such replication group: {repl_id}"))
        })
    }

    pub fn repl_group_find_by_hw_index(
        &self,
        hw_index: u32,
    ) -> Option<ReplGroupNode> {
        self.lock_groups().repl.find_by_hw_index(hw_index).cloned()
    }

    pub fn repl_group_get_next(
        &self,
        after: Option<ReplGroupId>,
    ) -> Option<ReplGroupNode> {
        self.lock_groups().repl.get_next(after).cloned()
    }

    pub fn repl_group_list(&self) -> Vec<ReplGroupId> {
        self.lock_groups().repl.iter().map(|g| g.repl_id).collect()
    }

    pub fn repl_group_list_get(
        &self,
        buf: &mut [ReplGroupId],
    ) -> IpmcResult<usize> {
        copy_list(&self.repl_group_list(), buf)
    }

    /// Create an empty group, optionally bound to a replication group.
    pub fn group_create(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        switch_id: SwitchId,
        binding: ReplBinding,
    ) -> IpmcResult<()> {
        let mut groups = self.lock_groups();
        groups.table(kind).check_insert(group_id)?;

        let plan = match binding {
            ReplBinding::None => None,
            ReplBinding::Existing(repl_id) => {
                let node = groups.repl.find(repl_id).ok_or_else(|| {
                    IpmcError::Missing(format!(
                        "no such replication group: {repl_id}"
                    ))
                })?;
                Some(ReplPlan {
                    repl_id,
                    hw_index: node.hw_index,
                    create: false,
                })
            }
            ReplBinding::Allocate { repl_id, hw_index } => {
                // Share the resource if someone already holds this index
                match groups.repl.find_by_hw_index(hw_index) {
                    Some(node) => Some(ReplPlan {
                        repl_id: node.repl_id,
                        hw_index,
                        create: false,
                    }),
                    None => {
                        groups.repl.check_create(repl_id, hw_index)?;
                        Some(ReplPlan {
                            repl_id,
                            hw_index,
                            create: true,
                        })
                    }
                }
            }
        };

        let hw_info = self.program(|hw| {
            if let Some(ReplPlan {
                repl_id,
                hw_index,
                create: true,
            }) = plan
            {
                hw.repl_group_create(repl_id, hw_index)?;
            }
            hw.group_create(kind, group_id, plan.map(|p| p.hw_index))
        })?;

        let mut node = GroupNode::new(group_id, switch_id);
        node.hw_info = Some(hw_info);
        if let Some(plan) = plan {
            let owner = ReplOwner::from(kind);
            if plan.create {
                groups
                    .repl
                    .create_implicit(plan.repl_id, plan.hw_index, owner)?;
            } else {
                groups.repl.acquire(plan.repl_id, owner)?;
            }
            node.repl_group = Some(plan.repl_id);
        }
        groups.table_mut(kind).insert(node)
    }

    /// Remove a group.  The group must have no members and no route entry
    /// may point at it.  If it holds the last reference to an implicitly
    /// created replication group, that goes too.
    pub fn group_remove(
        &self,
        kind: GroupKind,
        group_id: GroupId,
    ) -> IpmcResult<()> {
        let mut groups = self.lock_groups();
        let repl_group = groups.table(kind).check_remove(group_id)?.repl_group;
        let release = repl_group
            .map(|repl_id| plan_release(&groups, repl_id))
            .transpose()?;

        self.program(|hw| {
            hw.group_destroy(kind, group_id, release.map(|r| r.hw_index))?;
            if let Some(ReplRelease {
                repl_id,
                hw_index,
                frees: true,
            }) = release
            {
                hw.repl_group_destroy(repl_id, hw_index)?;
            }
            Ok(())
        })?;

        groups.table_mut(kind).remove(group_id)?;
        if let Some(repl_id) = repl_group {
            groups.repl.release(repl_id)?;
        }
        Ok(())
    }

    /// Bind an unbound group to an existing replication group.
    pub fn group_attach_repl(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        repl_id: ReplGroupId,
    ) -> IpmcResult<()> {
        let mut groups = self.lock_groups();
        if let Some(current) = groups.table(kind).get(group_id)?.repl_group {
            return Err(IpmcError::Exists(format!(
                "{kind} group {group_id} is bound to replication group \
                {current}"
            )));
        }
        let hw_index = groups
            .repl
            .find(repl_id)
            .ok_or_else(|| {
                IpmcError::Missing(format!(
                    "no such replication group: {repl_id}"
                ))
            })?
            .hw_index;

        self.program(|hw| {
            hw.group_modify(kind, group_id, None, Some(hw_index))
        })?;

        groups.repl.acquire(repl_id, kind.into())?;
        groups.table_mut(kind).get_mut(group_id)?.repl_group = Some(repl_id);
        Ok(())
    }

    /// Release a group's replication group, leaving the group unbound.
    pub fn group_detach_repl(
        &self,
        kind: GroupKind,
        group_id: GroupId,
    ) -> IpmcResult<()> {
        let mut groups = self.lock_groups();
        let repl_id = groups
            .table(kind)
            .get(group_id)?
            .repl_group
            .ok_or_else(|| {
                IpmcError::Invalid(format!(
                    "{kind} group {group_id} has no replication group"
                ))
            })?;
        let release = plan_release(&groups, repl_id)?;

        self.program(|hw| {
            hw.group_modify(kind, group_id, Some(release.hw_index), None)?;
            if release.frees {
                hw.repl_group_destroy(repl_id, release.hw_index)?;
            }
            Ok(())
        })?;

        groups.repl.release(repl_id)?;
        groups.table_mut(kind).get_mut(group_id)?.repl_group = None;
        Ok(())
    }

    pub fn group_get(
        &self,
        kind: GroupKind,
        group_id: GroupId,
    ) -> IpmcResult<GroupView> {
        let groups = self.lock_groups();
        let table = groups.table(kind);
        Ok(table.view(table.get(group_id)?))
    }

    pub fn group_get_next(
        &self,
        kind: GroupKind,
        after: Option<GroupId>,
    ) -> Option<GroupView> {
        let groups = self.lock_groups();
        let table = groups.table(kind);
        table.get_next(after).map(|g| table.view(g))
    }

    pub fn group_list(&self, kind: GroupKind) -> Vec<GroupId> {
        self.lock_groups()
            .table(kind)
            .iter()
            .map(|g| g.group_id)
            .collect()
    }

    pub fn group_list_get(
        &self,
        kind: GroupKind,
        buf: &mut [GroupId],
    ) -> IpmcResult<usize> {
        copy_list(&self.group_list(kind), buf)
    }

    pub fn group_member_count(
        &self,
        kind: GroupKind,
        group_id: GroupId,
    ) -> IpmcResult<usize> {
        Ok(self.lock_groups().table(kind).get(group_id)?.member_count())
    }

    /// The ids of a group's members, in the order they were added.
    pub fn group_member_list(
        &self,
        kind: GroupKind,
        group_id: GroupId,
    ) -> IpmcResult<Vec<MemberId>> {
        let groups = self.lock_groups();
        let table = groups.table(kind);
        Ok(table.view(table.get(group_id)?).members)
    }

    pub fn group_member_list_get(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        buf: &mut [MemberId],
    ) -> IpmcResult<usize> {
        copy_list(&self.group_member_list(kind, group_id)?, buf)
    }

    /// Add a member to a group.  Every route entry using the group is
    /// reprogrammed to include it.
    pub fn member_add(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        member: MemberCreate,
    ) -> IpmcResult<MemberHandle> {
        let (mut groups, mut entries) = self.lock_all();
        let group = groups.table(kind).check_member_add(
            group_id,
            member.member_id,
            member.rtr_intf,
        )?;
        let refresh = group
            .route_refs
            .iter()
            .map(|k| entries.routes.get(k).cloned())
            .collect::<IpmcResult<Vec<_>>>()?;

        let ports: BTreeSet<BridgePortId> =
            member.ports.iter().copied().collect();
        let hw_member = McMember {
            member_id: member.member_id,
            rtr_intf: member.rtr_intf,
            ports: ports.iter().copied().collect(),
        };
        let hw_info = self.program(|hw| {
            let hdl = hw.member_create(kind, group_id, &hw_member)?;
            for entry in &refresh {
                hw.route_refresh(entry)?;
            }
            Ok(hdl)
        })?;

        let handle = groups.table_mut(kind).member_add(MemberNode {
            member_id: member.member_id,
            switch_id: member.switch_id,
            group_id,
            rtr_intf: member.rtr_intf,
            ports: ports.clone(),
            hw_info: Some(hw_info),
        })?;
        let intf = (member.rtr_intf, GroupRef::new(kind, group_id));
        for port in ports {
            entries.port_map.insert(port, intf);
        }
        for entry in &refresh {
            entries.rtf_map.insert(intf, entry.key);
        }
        Ok(handle)
    }

    /// Remove a member from its group.  If the member still has ports, the
    /// configured [`MemberRemovalPolicy`] decides whether the removal is
    /// refused or the ports are detached first.
    pub fn member_remove(
        &self,
        kind: GroupKind,
        member_id: MemberId,
    ) -> IpmcResult<()> {
        let (mut groups, mut entries) = self.lock_all();
        let (_, member) = groups.table(kind).member(member_id)?;
        let member = member.clone();
        if !member.ports.is_empty()
            && self.member_removal_policy() == MemberRemovalPolicy::Refuse
        {
            return Err(IpmcError::Busy(format!(
                "{kind} member {member_id} still has {} ports",
                member.ports.len()
            )));
        }

        let group_id = member.group_id;
        let intf = (member.rtr_intf, GroupRef::new(kind, group_id));
        let refresh = dependent_entries(&entries, [intf])?;
        self.program(|hw| {
            for port in &member.ports {
                hw.member_port_remove(kind, group_id, member_id, *port)?;
            }
            let detached = McMember {
                member_id,
                rtr_intf: member.rtr_intf,
                ports: Vec::new(),
            };
            hw.member_destroy(kind, group_id, detached)?;
            for entry in &refresh {
                hw.route_refresh(entry)?;
            }
            Ok(())
        })?;

        groups.table_mut(kind).member_remove(member_id)?;
        for port in &member.ports {
            entries.port_map.remove(port, &intf);
        }
        entries.rtf_map.remove_all(&intf);
        Ok(())
    }

    /// Add a port to a member's fan-out.
    pub fn member_port_add(
        &self,
        kind: GroupKind,
        member_id: MemberId,
        port: BridgePortId,
    ) -> IpmcResult<()> {
        let (mut groups, mut entries) = self.lock_all();
        let (_, member) = groups.table(kind).member(member_id)?;
        if member.ports.contains(&port) {
            return Err(IpmcError::Exists(format!(
                "{kind} member {member_id} already has port {port}"
            )));
        }
        let group_id = member.group_id;
        let intf = (member.rtr_intf, GroupRef::new(kind, group_id));
        let refresh = dependent_entries(&entries, [intf])?;

        self.program(|hw| {
            hw.member_port_add(kind, group_id, member_id, port)?;
            for entry in &refresh {
                hw.route_refresh(entry)?;
            }
            Ok(())
        })?;

        groups.table_mut(kind).member_mut(member_id)?.ports.insert(port);
        entries.port_map.insert(port, intf);
        Ok(())
    }

    /// Remove a port from a member's fan-out.
    pub fn member_port_remove(
        &self,
        kind: GroupKind,
        member_id: MemberId,
        port: BridgePortId,
    ) -> IpmcResult<()> {
        let (mut groups, mut entries) = self.lock_all();
        let (_, member) = groups.table(kind).member(member_id)?;
        if !member.ports.contains(&port) {
            return Err(IpmcError::Invalid(format!(
                "port {port} is not part of {kind} member {member_id}"
            )));
        }
        let group_id = member.group_id;
        let intf = (member.rtr_intf, GroupRef::new(kind, group_id));
        let refresh = dependent_entries(&entries, [intf])?;

        self.program(|hw| {
            hw.member_port_remove(kind, group_id, member_id, port)?;
            for entry in &refresh {
                hw.route_refresh(entry)?;
            }
            Ok(())
        })?;

        groups.table_mut(kind).member_mut(member_id)?.ports.remove(&port);
        entries.port_map.remove(&port, &intf);
        Ok(())
    }

    pub fn member_get(
        &self,
        kind: GroupKind,
        member_id: MemberId,
    ) -> IpmcResult<MemberView> {
        let groups = self.lock_groups();
        let table = groups.table(kind);
        let (handle, member) = table.member(member_id)?;
        Ok(table.member_view(handle, member))
    }

    pub fn member_find_by_router_interface(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        rtr_intf: RouterIntfId,
    ) -> IpmcResult<MemberView> {
        let groups = self.lock_groups();
        let table = groups.table(kind);
        let member = table
            .find_member_by_router_interface(group_id, rtr_intf)?
            .ok_or_else(|| {
                IpmcError::Missing(format!(
                    "{kind} group {group_id} has no member on router \
                    interface {rtr_intf}"
                ))
            })?;
        let (handle, member) = table.member(member.member_id)?;
        Ok(table.member_view(handle, member))
    }

    /// Return the member of a group following the one at `after`, or the
    /// first member if `after` is None.  The member at `after` may have been
    /// removed since it was returned.
    pub fn member_get_next(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        after: Option<MemberHandle>,
    ) -> IpmcResult<Option<MemberView>> {
        let groups = self.lock_groups();
        let table = groups.table(kind);
        Ok(table
            .member_get_next(group_id, after)?
            .map(|(h, m)| table.member_view(h, m)))
    }

    /// Add a route entry.  Both of its groups must already exist.
    pub fn route_entry_create(&self, entry: McRouteEntry) -> IpmcResult<()> {
        let (mut groups, mut entries) = self.lock_all();
        entries.routes.check_insert(&entry.key)?;
        check_route_groups(&groups, &entry)?;

        self.program(|hw| hw.route_create(&entry))?;

        link_route(&mut groups, &mut entries, &entry)?;
        entries.routes.insert(entry)
    }

    pub fn route_entry_remove(&self, key: &RouteEntryKey) -> IpmcResult<()> {
        let (mut groups, mut entries) = self.lock_all();
        let entry = entries.routes.get(key)?.clone();

        self.program(|hw| hw.route_destroy(&entry))?;

        unlink_route(&mut groups, &mut entries, &entry)?;
        entries.routes.remove(key).map(|_| ())
    }

    // Apply a change that leaves an entry's groups alone.
    fn route_entry_modify<F>(
        &self,
        key: &RouteEntryKey,
        change: F,
    ) -> IpmcResult<()>
    where
        F: FnOnce(&mut McRouteEntry),
    {
        let mut entries = self.lock_entries();
        let old = entries.routes.get(key)?.clone();
        let mut new = old.clone();
        change(&mut new);

        self.program(|hw| hw.route_update(&new, &old))?;

        entries.routes.update(new).map(|_| ())
    }

    pub fn route_entry_set_action(
        &self,
        key: &RouteEntryKey,
        action: PacketAction,
    ) -> IpmcResult<()> {
        self.route_entry_modify(key, |e| e.action = action)
    }

    pub fn route_entry_set_cpu_port(
        &self,
        key: &RouteEntryKey,
        cpu_port: bool,
    ) -> IpmcResult<()> {
        self.route_entry_modify(key, |e| e.cpu_port = cpu_port)
    }

    /// Point an entry at a different pair of groups.
    pub fn route_entry_set_groups(
        &self,
        key: &RouteEntryKey,
        ipmc_group: GroupId,
        rpf_group: GroupId,
    ) -> IpmcResult<()> {
        let (mut groups, mut entries) = self.lock_all();
        let old = entries.routes.get(key)?.clone();
        let new = McRouteEntry {
            ipmc_group,
            rpf_group,
            ..old.clone()
        };
        check_route_groups(&groups, &new)?;

        self.program(|hw| hw.route_update(&new, &old))?;

        unlink_route(&mut groups, &mut entries, &old)?;
        link_route(&mut groups, &mut entries, &new)?;
        entries.routes.update(new).map(|_| ())
    }

    /// Return an entry along with whether traffic has matched it.
    pub fn route_entry_get(
        &self,
        key: &RouteEntryKey,
    ) -> IpmcResult<RouteEntryView> {
        let entries = self.lock_entries();
        let entry = entries.routes.get(key)?.clone();
        let hit = self.asic_hdl.mc_route_hit(key)?;
        Ok(RouteEntryView { entry, hit })
    }

    /// Return the entry whose key follows `after`, or the first entry if
    /// `after` is None.
    pub fn route_entry_get_next(
        &self,
        after: Option<&RouteEntryKey>,
    ) -> Option<McRouteEntry> {
        self.lock_entries().routes.get_next(after).cloned()
    }

    /// Walk every entry in key order without holding the lock between
    /// steps.
    pub fn route_entry_walk(&self) -> RouteEntryWalk<'_> {
        RouteEntryWalk::new(&self.entries)
    }

    pub fn route_entry_count(&self) -> usize {
        self.lock_entries().routes.len()
    }

    pub fn route_entry_list(&self) -> Vec<RouteEntryKey> {
        self.lock_entries().routes.iter().map(|e| e.key).collect()
    }

    pub fn route_entry_list_get(
        &self,
        buf: &mut [RouteEntryKey],
    ) -> IpmcResult<usize> {
        copy_list(&self.route_entry_list(), buf)
    }

    /// The (router interface, group) pairs whose fan-out includes `port`.
    pub fn port_map_list(&self, port: BridgePortId) -> Vec<IntfGroup> {
        self.lock_entries().port_map.list(&port)
    }

    pub fn port_map_count(&self, port: BridgePortId) -> usize {
        self.lock_entries().port_map.count(&port)
    }

    pub fn port_map_list_get(
        &self,
        port: BridgePortId,
        buf: &mut [IntfGroup],
    ) -> IpmcResult<usize> {
        copy_list(&self.port_map_list(port), buf)
    }

    /// The keys of the route entries fed by a router interface's membership
    /// in a group.
    pub fn rtf_entry_list(
        &self,
        rtr_intf: RouterIntfId,
        group: GroupRef,
    ) -> Vec<RouteEntryKey> {
        self.lock_entries().rtf_map.list(&(rtr_intf, group))
    }

    pub fn rtf_entry_count(
        &self,
        rtr_intf: RouterIntfId,
        group: GroupRef,
    ) -> usize {
        self.lock_entries().rtf_map.count(&(rtr_intf, group))
    }

    pub fn rtf_entry_list_get(
        &self,
        rtr_intf: RouterIntfId,
        group: GroupRef,
        buf: &mut [RouteEntryKey],
    ) -> IpmcResult<usize> {
        copy_list(&self.rtf_entry_list(rtr_intf, group), buf)
    }
}
