// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Human-readable renderings of the cache's tables.
//!
//! The whole-table dumps take the relevant lock once per node rather than for
//! the whole table, so a dump of a busy table may reflect changes made while
//! it was being produced.

use std::io::Write;

use serde::Serialize;
use tabwriter::TabWriter;

use aal::AsicOps;
use common::mcast::{
    GroupId, GroupKind, McRouteEntry, MemberId, ReplGroupId, RouteEntryKey,
};

use crate::replication::ReplGroupNode;
use crate::types::{
    GroupView, IpmcError, IpmcResult, MemberView, RouteEntryView,
};
use crate::Ipmc;

const REPL_HEADER: &str = "REPL ID\tHW INDEX\tOWNER\tREFS\tPINNED";
const GROUP_HEADER: &str =
    "KIND\tGROUP ID\tSWITCH\tREPL\tHW INFO\tMEMBERS\tROUTE REFS";
const MEMBER_HEADER: &str =
    "KIND\tMEMBER ID\tHANDLE\tGROUP ID\tRTR INTF\tPORTS\tHW INFO";
const ROUTE_HEADER: &str = "KEY\tIPMC GROUP\tRPF GROUP\tACTION\tCPU PORT";

/// Everything in the cache, in a form suitable for serializing.
#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub repl_groups: Vec<ReplGroupNode>,
    pub ipmc_groups: Vec<GroupView>,
    pub rpf_groups: Vec<GroupView>,
    pub members: Vec<MemberView>,
    pub route_entries: Vec<McRouteEntry>,
}

fn finish(tw: TabWriter<Vec<u8>>) -> IpmcResult<String> {
    let buf = tw
        .into_inner()
        .map_err(|e| IpmcError::Other(format!("rendering dump: {e}")))?;
    String::from_utf8(buf)
        .map_err(|e| IpmcError::Other(format!("rendering dump: {e}")))
}

fn opt<T: std::fmt::Display>(v: Option<T>) -> String {
    match v {
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}

fn repl_row(tw: &mut impl Write, r: &ReplGroupNode) -> IpmcResult<()> {
    writeln!(
        tw,
        "{}\t{}\t{}\t{}\t{}",
        r.repl_id, r.hw_index, r.owner, r.ref_count, r.pinned
    )?;
    Ok(())
}

fn group_row(tw: &mut impl Write, g: &GroupView) -> IpmcResult<()> {
    writeln!(
        tw,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}",
        g.kind,
        g.group_id,
        g.switch_id,
        opt(g.repl_group),
        opt(g.hw_info),
        g.member_count,
        g.route_refs
    )?;
    Ok(())
}

fn member_row(tw: &mut impl Write, m: &MemberView) -> IpmcResult<()> {
    let ports = m
        .ports
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",");
    writeln!(
        tw,
        "{}\t{}\t{}\t{}\t{}\t{}\t{}",
        m.kind,
        m.member_id,
        m.handle,
        m.group_id,
        m.rtr_intf,
        if ports.is_empty() { "-" } else { &ports },
        opt(m.hw_info)
    )?;
    Ok(())
}

fn route_row(tw: &mut impl Write, e: &McRouteEntry) -> IpmcResult<()> {
    writeln!(
        tw,
        "{}\t{}\t{}\t{}\t{}",
        e.key, e.ipmc_group, e.rpf_group, e.action, e.cpu_port
    )?;
    Ok(())
}

impl<H: AsicOps> Ipmc<H> {
    pub fn dump_repl_group(&self, repl_id: ReplGroupId) -> IpmcResult<String> {
        let node = self.repl_group_get(repl_id)?;
        let mut tw = TabWriter::new(Vec::new());
        writeln!(tw, "{REPL_HEADER}")?;
        repl_row(&mut tw, &node)?;
        finish(tw)
    }

    fn dump_group(
        &self,
        kind: GroupKind,
        group_id: GroupId,
    ) -> IpmcResult<String> {
        let group = self.group_get(kind, group_id)?;
        let mut tw = TabWriter::new(Vec::new());
        writeln!(tw, "{GROUP_HEADER}")?;
        group_row(&mut tw, &group)?;
        writeln!(tw)?;
        writeln!(tw, "{MEMBER_HEADER}")?;
        for member_id in &group.members {
            // Skip members removed since the group was read
            if let Ok(m) = self.member_get(kind, *member_id) {
                member_row(&mut tw, &m)?;
            }
        }
        finish(tw)
    }

    /// Render one IPMC group along with its members.
    pub fn dump_ipmc_group(&self, group_id: GroupId) -> IpmcResult<String> {
        self.dump_group(GroupKind::Ipmc, group_id)
    }

    /// Render one RPF group along with its members.
    pub fn dump_rpf_group(&self, group_id: GroupId) -> IpmcResult<String> {
        self.dump_group(GroupKind::Rpf, group_id)
    }

    pub fn dump_member(
        &self,
        kind: GroupKind,
        member_id: MemberId,
    ) -> IpmcResult<String> {
        let member = self.member_get(kind, member_id)?;
        let mut tw = TabWriter::new(Vec::new());
        writeln!(tw, "{MEMBER_HEADER}")?;
        member_row(&mut tw, &member)?;
        finish(tw)
    }

    pub fn dump_route_entry(&self, key: &RouteEntryKey) -> IpmcResult<String> {
        let RouteEntryView { entry, hit } = self.route_entry_get(key)?;
        let mut tw = TabWriter::new(Vec::new());
        writeln!(tw, "{ROUTE_HEADER}\tHIT")?;
        writeln!(
            tw,
            "{}\t{}\t{}\t{}\t{}\t{hit}",
            entry.key,
            entry.ipmc_group,
            entry.rpf_group,
            entry.action,
            entry.cpu_port
        )?;
        finish(tw)
    }

    pub fn dump_all_repl_groups(&self) -> IpmcResult<String> {
        let mut tw = TabWriter::new(Vec::new());
        writeln!(tw, "{REPL_HEADER}")?;
        let mut cursor = None;
        while let Some(node) = self.repl_group_get_next(cursor) {
            repl_row(&mut tw, &node)?;
            cursor = Some(node.repl_id);
        }
        finish(tw)
    }

    pub fn dump_all_groups(&self, kind: GroupKind) -> IpmcResult<String> {
        let mut tw = TabWriter::new(Vec::new());
        writeln!(tw, "{GROUP_HEADER}")?;
        let mut cursor = None;
        while let Some(group) = self.group_get_next(kind, cursor) {
            group_row(&mut tw, &group)?;
            cursor = Some(group.group_id);
        }
        finish(tw)
    }

    pub fn dump_all_ipmc_groups(&self) -> IpmcResult<String> {
        self.dump_all_groups(GroupKind::Ipmc)
    }

    pub fn dump_all_rpf_groups(&self) -> IpmcResult<String> {
        self.dump_all_groups(GroupKind::Rpf)
    }

    /// Every member of every group of one kind, grouped by group.
    pub fn dump_all_members(&self, kind: GroupKind) -> IpmcResult<String> {
        let mut tw = TabWriter::new(Vec::new());
        writeln!(tw, "{MEMBER_HEADER}")?;
        for m in self.all_members(kind) {
            member_row(&mut tw, &m)?;
        }
        finish(tw)
    }

    pub fn dump_all_route_entries(&self) -> IpmcResult<String> {
        let mut tw = TabWriter::new(Vec::new());
        writeln!(tw, "{ROUTE_HEADER}")?;
        for entry in self.route_entry_walk() {
            route_row(&mut tw, &entry)?;
        }
        finish(tw)
    }

    fn all_members(&self, kind: GroupKind) -> Vec<MemberView> {
        let mut out = Vec::new();
        let mut group_cursor = None;
        while let Some(group) = self.group_get_next(kind, group_cursor) {
            group_cursor = Some(group.group_id);
            let mut cursor = None;
            // A group removed mid-walk just ends its member list early
            while let Ok(Some(m)) =
                self.member_get_next(kind, group.group_id, cursor)
            {
                cursor = Some(m.handle);
                out.push(m);
            }
        }
        out
    }

    fn all_groups(&self, kind: GroupKind) -> Vec<GroupView> {
        let mut out = Vec::new();
        let mut cursor = None;
        while let Some(group) = self.group_get_next(kind, cursor) {
            cursor = Some(group.group_id);
            out.push(group);
        }
        out
    }

    /// Collect the contents of every table.
    pub fn snapshot(&self) -> Snapshot {
        let mut repl_groups = Vec::new();
        let mut cursor = None;
        while let Some(node) = self.repl_group_get_next(cursor) {
            cursor = Some(node.repl_id);
            repl_groups.push(node);
        }
        let mut members = self.all_members(GroupKind::Ipmc);
        members.extend(self.all_members(GroupKind::Rpf));

        Snapshot {
            start_time: self.start_time,
            repl_groups,
            ipmc_groups: self.all_groups(GroupKind::Ipmc),
            rpf_groups: self.all_groups(GroupKind::Rpf),
            members,
            route_entries: self.route_entry_walk().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asic::stub::StubHandle;
    use common::mcast::{PacketAction, ReplOwner};

    use crate::config::Config;
    use crate::types::{MemberCreate, ReplBinding};

    fn populated() -> anyhow::Result<Ipmc<StubHandle>> {
        let log = crate::test_logger();
        let ipmc = Ipmc::new(&log, StubHandle::new(&log)?, &Config::default());
        ipmc.repl_group_create(4, 40, ReplOwner::NONE)?;
        ipmc.group_create(GroupKind::Ipmc, 1, 0, ReplBinding::Existing(4))?;
        ipmc.group_create(GroupKind::Rpf, 2, 0, ReplBinding::None)?;
        ipmc.member_add(
            GroupKind::Ipmc,
            1,
            MemberCreate {
                member_id: 10,
                switch_id: 0,
                rtr_intf: 100,
                ports: vec![3, 4],
            },
        )?;
        ipmc.route_entry_create(McRouteEntry {
            key: RouteEntryKey::xg(0, 0, "232.1.1.1".parse()?),
            ipmc_group: 1,
            rpf_group: 2,
            action: PacketAction::Trap,
            cpu_port: true,
        })?;
        Ok(ipmc)
    }

    #[test]
    fn test_dump_group() -> anyhow::Result<()> {
        let ipmc = populated()?;
        let out = ipmc.dump_ipmc_group(1)?;
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 5, "{out}");
        assert!(lines[0].starts_with("KIND"));
        assert!(lines[1].starts_with("ipmc"));
        assert!(lines[4].contains("3,4"));

        assert!(ipmc.dump_rpf_group(1).is_err());
        Ok(())
    }

    #[test]
    fn test_dump_tables() -> anyhow::Result<()> {
        let ipmc = populated()?;
        assert_eq!(ipmc.dump_all_repl_groups()?.lines().count(), 2);
        assert_eq!(ipmc.dump_all_rpf_groups()?.lines().count(), 2);
        assert_eq!(ipmc.dump_all_members(GroupKind::Rpf)?.lines().count(), 1);

        let routes = ipmc.dump_all_route_entries()?;
        assert!(routes.contains("(*, 232.1.1.1)"), "{routes}");
        assert!(routes.contains("trap"), "{routes}");
        Ok(())
    }

    #[test]
    fn test_snapshot() -> anyhow::Result<()> {
        let ipmc = populated()?;
        let snap = ipmc.snapshot();
        assert_eq!(snap.repl_groups.len(), 1);
        assert_eq!(snap.ipmc_groups[0].members, vec![10]);
        assert_eq!(snap.members.len(), 1);
        assert_eq!(snap.route_entries.len(), 1);

        let json = serde_json::to_value(&snap)?;
        assert_eq!(json["members"][0]["ports"], serde_json::json!([3, 4]));
        assert_eq!(json["route_entries"][0]["action"], "trap");
        Ok(())
    }
}
