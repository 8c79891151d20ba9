// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Consistency checks across the cache's tables and indices.

use std::collections::{BTreeMap, BTreeSet};

use slog::warn;
use strum::IntoEnumIterator;

use aal::AsicOps;
use common::mcast::{BridgePortId, GroupKind, ReplGroupId, RouteEntryKey};

use crate::revmap::{GroupRef, IntfGroup};
use crate::types::{IpmcError, IpmcResult};
use crate::{EntryData, GroupData, Ipmc};

fn check_members(groups: &GroupData, kind: GroupKind, out: &mut Vec<String>) {
    let table = groups.table(kind);
    let mut listed = 0;
    for group in table.iter() {
        for handle in group.members.iter() {
            listed += 1;
            match table.arena().get(handle) {
                None => out.push(format!(
                    "{kind} group {}: member handle {handle} has no record",
                    group.group_id
                )),
                Some(m) if m.group_id != group.group_id => out.push(format!(
                    "{kind} group {}: member {} claims group {}",
                    group.group_id, m.member_id, m.group_id
                )),
                Some(_) => (),
            }
        }
    }
    if listed != table.arena().len() {
        out.push(format!(
            "{kind} table: {listed} listed members but {} member records",
            table.arena().len()
        ));
    }
}

fn check_repl(groups: &GroupData, out: &mut Vec<String>) {
    let mut holders: BTreeMap<ReplGroupId, u32> = BTreeMap::new();
    for kind in GroupKind::iter() {
        for group in groups.table(kind).iter() {
            let Some(repl_id) = group.repl_group else {
                continue;
            };
            if groups.repl.find(repl_id).is_none() {
                out.push(format!(
                    "{kind} group {} bound to missing replication group \
                    {repl_id}",
                    group.group_id
                ));
            }
            *holders.entry(repl_id).or_default() += 1;
        }
    }
    for node in groups.repl.iter() {
        let bound = holders.get(&node.repl_id).copied().unwrap_or(0);
        if node.ref_count != bound {
            out.push(format!(
                "replication group {}: ref_count {} but {bound} groups bound",
                node.repl_id, node.ref_count
            ));
        }
        if node.ref_count == 0 && !node.pinned {
            out.push(format!(
                "replication group {} is unreferenced and unpinned",
                node.repl_id
            ));
        }
    }
}

fn check_routes(
    groups: &GroupData,
    entries: &EntryData,
    out: &mut Vec<String>,
) {
    let mut refs: BTreeMap<GroupRef, BTreeSet<RouteEntryKey>> =
        BTreeMap::new();
    for entry in entries.routes.iter() {
        for kind in GroupKind::iter() {
            let group_id = entry.group(kind);
            if groups.table(kind).find(group_id).is_none() {
                out.push(format!(
                    "entry {} points at missing {kind} group {group_id}",
                    entry.key
                ));
            }
            refs.entry(GroupRef::new(kind, group_id))
                .or_default()
                .insert(entry.key);
        }
    }
    for kind in GroupKind::iter() {
        for group in groups.table(kind).iter() {
            let gref = GroupRef::new(kind, group.group_id);
            let expected = refs.remove(&gref).unwrap_or_default();
            if group.route_refs != expected {
                out.push(format!(
                    "{gref}: {} route refs recorded, {} entries use it",
                    group.route_refs.len(),
                    expected.len()
                ));
            }
        }
    }
}

// Compare the contents of an index against what the primary tables say it
// should hold.
fn compare<K, V>(
    name: &str,
    actual: BTreeSet<(K, V)>,
    expected: BTreeSet<(K, V)>,
    out: &mut Vec<String>,
) where
    K: Ord + std::fmt::Debug,
    V: Ord + std::fmt::Debug,
{
    for stale in actual.difference(&expected) {
        out.push(format!("{name}: stale row {stale:?}"));
    }
    for missing in expected.difference(&actual) {
        out.push(format!("{name}: missing row {missing:?}"));
    }
}

fn check_port_map(
    groups: &GroupData,
    entries: &EntryData,
    out: &mut Vec<String>,
) {
    let mut expected: BTreeSet<(BridgePortId, IntfGroup)> = BTreeSet::new();
    for kind in GroupKind::iter() {
        for (_, m) in groups.table(kind).arena().iter() {
            let intf = (m.rtr_intf, GroupRef::new(kind, m.group_id));
            expected.extend(m.ports.iter().map(|p| (*p, intf)));
        }
    }
    compare("port map", entries.port_map.pairs().collect(), expected, out);
}

fn check_rtf_map(
    groups: &GroupData,
    entries: &EntryData,
    out: &mut Vec<String>,
) {
    let mut expected: BTreeSet<(IntfGroup, RouteEntryKey)> = BTreeSet::new();
    for entry in entries.routes.iter() {
        for kind in GroupKind::iter() {
            let table = groups.table(kind);
            let group_id = entry.group(kind);
            let Some(group) = table.find(group_id) else {
                continue;
            };
            let gref = GroupRef::new(kind, group_id);
            for m in group.members.iter().filter_map(|h| table.arena().get(h))
            {
                expected.insert(((m.rtr_intf, gref), entry.key));
            }
        }
    }
    compare("rtf map", entries.rtf_map.pairs().collect(), expected, out);
}

impl<H: AsicOps> Ipmc<H> {
    /// Check every cross-table invariant, returning a description of each
    /// one that doesn't hold.
    pub fn audit_violations(&self) -> Vec<String> {
        let (groups, entries) = self.lock_all();
        let mut out = Vec::new();
        for kind in GroupKind::iter() {
            check_members(&groups, kind, &mut out);
        }
        check_repl(&groups, &mut out);
        check_routes(&groups, &entries, &mut out);
        check_port_map(&groups, &entries, &mut out);
        check_rtf_map(&groups, &entries, &mut out);
        out
    }

    pub fn audit(&self) -> IpmcResult<()> {
        let violations = self.audit_violations();
        if violations.is_empty() {
            return Ok(());
        }
        for v in &violations {
            warn!(self.log, "audit failure"; "violation" => %v);
        }
        Err(IpmcError::Other(format!(
            "{} audit failures: {}",
            violations.len(),
            violations.join("; ")
        )))
    }
}
