// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Loading multicast state from a TOML description.
//!
//! ```toml
//! [[repl_group]]
//! repl_id = 4
//! hw_index = 40
//! owners = ["ipmc"]
//!
//! [[group]]
//! kind = "ipmc"
//! group_id = 1
//! repl = { existing = 4 }
//!
//! [[group.member]]
//! member_id = 10
//! rtr_intf = 100
//! ports = [3, 4]
//!
//! [[route_entry]]
//! vrf_id = 0
//! group = "232.1.1.1"
//! source = "10.0.0.1"
//! ipmc_group = 1
//! rpf_group = 2
//! ```
//!
//! An entry without a `source` matches any source.

use std::net::IpAddr;

use serde::Deserialize;
use slog::info;

use aal::AsicOps;
use common::mcast::{
    GroupId, GroupKind, McRouteEntry, PacketAction, ReplGroupId, ReplOwner,
    RouteEntryKey, SwitchId, VrfId,
};

use crate::types::{IpmcError, IpmcResult, MemberCreate, ReplBinding};
use crate::Ipmc;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplGroupSpec {
    pub repl_id: ReplGroupId,
    pub hw_index: u32,
    #[serde(default)]
    pub owners: Vec<GroupKind>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupSpec {
    pub kind: GroupKind,
    pub group_id: GroupId,
    #[serde(default)]
    pub switch_id: SwitchId,
    #[serde(default)]
    pub repl: ReplBinding,
    #[serde(default)]
    pub member: Vec<MemberCreate>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteEntrySpec {
    #[serde(default)]
    pub switch_id: SwitchId,
    pub vrf_id: VrfId,
    pub group: IpAddr,
    pub source: Option<IpAddr>,
    pub ipmc_group: GroupId,
    pub rpf_group: GroupId,
    #[serde(default)]
    pub action: PacketAction,
    #[serde(default)]
    pub cpu_port: bool,
}

impl RouteEntrySpec {
    fn entry(&self) -> McRouteEntry {
        let key = match self.source {
            Some(source) => RouteEntryKey::sg(
                self.switch_id,
                self.vrf_id,
                self.group,
                source,
            ),
            None => RouteEntryKey::xg(self.switch_id, self.vrf_id, self.group),
        };
        McRouteEntry {
            key,
            ipmc_group: self.ipmc_group,
            rpf_group: self.rpf_group,
            action: self.action,
            cpu_port: self.cpu_port,
        }
    }
}

/// The contents of a state file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct State {
    pub repl_group: Vec<ReplGroupSpec>,
    pub group: Vec<GroupSpec>,
    pub route_entry: Vec<RouteEntrySpec>,
}

impl std::str::FromStr for State {
    type Err = IpmcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s).map_err(|e| IpmcError::Invalid(e.to_string()))
    }
}

/// Create everything described by `state`, in dependency order.  Stops at
/// the first failure, leaving whatever was created before it in place.
pub fn apply<H: AsicOps>(ipmc: &Ipmc<H>, state: &State) -> IpmcResult<()> {
    for r in &state.repl_group {
        let owner = r
            .owners
            .iter()
            .fold(ReplOwner::NONE, |o, k| o.union((*k).into()));
        ipmc.repl_group_create(r.repl_id, r.hw_index, owner)?;
    }
    for g in &state.group {
        ipmc.group_create(g.kind, g.group_id, g.switch_id, g.repl)?;
        for m in &g.member {
            ipmc.member_add(g.kind, g.group_id, m.clone())?;
        }
    }
    for e in &state.route_entry {
        ipmc.route_entry_create(e.entry())?;
    }
    info!(ipmc.log, "loaded multicast state";
        "repl_groups" => state.repl_group.len(),
        "groups" => state.group.len(),
        "route_entries" => state.route_entry.len());
    Ok(())
}

/// Read a state file and apply it.
pub fn load_state<H: AsicOps>(ipmc: &Ipmc<H>, path: &str) -> IpmcResult<()> {
    let txt = std::fs::read_to_string(path)?;
    let state: State = txt
        .parse()
        .map_err(|e| IpmcError::Invalid(format!("{path}: {e}")))?;
    apply(ipmc, &state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use asic::stub::StubHandle;
    use pretty_assertions::assert_eq;

    use crate::config::Config;
    use crate::revmap::GroupRef;

    const STATE: &str = r#"
        [[repl_group]]
        repl_id = 4
        hw_index = 40
        owners = ["ipmc", "rpf"]

        [[group]]
        kind = "ipmc"
        group_id = 1
        repl = { existing = 4 }

        [[group.member]]
        member_id = 10
        rtr_intf = 100
        ports = [3, 4]

        [[group]]
        kind = "rpf"
        group_id = 2
        repl = { allocate = { repl_id = 5, hw_index = 50 } }

        [[group.member]]
        member_id = 20
        rtr_intf = 200

        [[route_entry]]
        vrf_id = 1
        group = "232.1.1.1"
        source = "10.0.0.1"
        ipmc_group = 1
        rpf_group = 2

        [[route_entry]]
        vrf_id = 1
        group = "ff0e::1"
        ipmc_group = 1
        rpf_group = 2
        action = "trap"
    "#;

    #[test]
    fn test_apply() -> anyhow::Result<()> {
        let log = crate::test_logger();
        let ipmc = Ipmc::new(&log, StubHandle::new(&log)?, &Config::default());
        let state: State = STATE.parse()?;
        apply(&ipmc, &state)?;

        let pinned = ipmc.repl_group_get(4)?;
        assert!(pinned.pinned);
        assert_eq!(pinned.owner, ReplOwner::IPMC.union(ReplOwner::RPF));
        assert!(!ipmc.repl_group_get(5)?.pinned);

        assert_eq!(ipmc.group_member_list(GroupKind::Ipmc, 1)?, vec![10]);
        assert!(ipmc.member_get(GroupKind::Rpf, 20)?.ports.is_empty());

        let keys = ipmc.route_entry_list();
        assert_eq!(keys.len(), 2);
        let xg = RouteEntryKey::xg(0, 1, "ff0e::1".parse()?);
        assert_eq!(
            ipmc.route_entry_get(&xg)?.entry.action,
            PacketAction::Trap
        );
        let gref = GroupRef::new(GroupKind::Rpf, 2);
        assert_eq!(ipmc.rtf_entry_count(200, gref), 2);
        ipmc.audit()?;
        Ok(())
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let err = "[[group]]\nkind = \"ipmc\"\ngroup_id = 1\ncolor = 3"
            .parse::<State>()
            .unwrap_err();
        assert!(matches!(err, IpmcError::Invalid(_)));
    }
}
