// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Propagation of LAG membership changes into group fan-outs.

use std::sync::Arc;

use slog::{debug, error, info, o};
use strum::IntoEnumIterator;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use aal::{AsicOps, LagUpdate};
use common::mcast::{BridgePortId, GroupId, GroupKind, MemberId, RouterIntfId};

use crate::mcast::dependent_entries;
use crate::revmap::{GroupRef, IntfGroup};
use crate::types::IpmcResult;
use crate::Ipmc;

// A member whose fan-out is changing
struct Affected {
    kind: GroupKind,
    group_id: GroupId,
    member_id: MemberId,
    intf: IntfGroup,
}

impl<H: AsicOps> Ipmc<H> {
    /// `port` has left the LAG behind `rtr_intf`.  Remove it from every
    /// member on that interface and reprogram the route entries those members
    /// feed.  Returns the number of members changed.
    pub fn lag_member_down(
        &self,
        rtr_intf: RouterIntfId,
        port: BridgePortId,
    ) -> IpmcResult<usize> {
        let (mut groups, mut entries) = self.lock_all();

        let mut affected = Vec::new();
        for intf in entries.port_map.list(&port) {
            let (rtr, gref) = intf;
            if rtr != rtr_intf {
                continue;
            }
            let (kind, group_id) = (gref.kind(), gref.group_id());
            if let Some(m) = groups
                .table(kind)
                .find_member_by_router_interface(group_id, rtr)?
            {
                affected.push(Affected {
                    kind,
                    group_id,
                    member_id: m.member_id,
                    intf,
                });
            }
        }
        let refresh =
            dependent_entries(&entries, affected.iter().map(|a| a.intf))?;

        self.program(|hw| {
            for a in &affected {
                hw.member_port_remove(a.kind, a.group_id, a.member_id, port)?;
            }
            for entry in &refresh {
                hw.route_refresh(entry)?;
            }
            Ok(())
        })?;

        for a in &affected {
            groups
                .table_mut(a.kind)
                .member_mut(a.member_id)?
                .ports
                .remove(&port);
            entries.port_map.remove(&port, &a.intf);
        }
        debug!(self.log, "lag member down";
            "rtr_intf" => rtr_intf,
            "port" => port,
            "members" => affected.len(),
            "entries" => refresh.len());
        Ok(affected.len())
    }

    /// `port` has joined the LAG behind `rtr_intf`.  Add it to every member
    /// on that interface that doesn't already have it.  Returns the number of
    /// members changed.
    pub fn lag_member_up(
        &self,
        rtr_intf: RouterIntfId,
        port: BridgePortId,
    ) -> IpmcResult<usize> {
        let (mut groups, mut entries) = self.lock_all();

        let mut affected = Vec::new();
        for kind in GroupKind::iter() {
            let table = groups.table(kind);
            let mut cursor = None;
            while let Some(group) = table.get_next(cursor) {
                cursor = Some(group.group_id);
                let Some(m) = table
                    .find_member_by_router_interface(group.group_id, rtr_intf)?
                else {
                    continue;
                };
                if m.ports.contains(&port) {
                    continue;
                }
                affected.push(Affected {
                    kind,
                    group_id: group.group_id,
                    member_id: m.member_id,
                    intf: (rtr_intf, GroupRef::new(kind, group.group_id)),
                });
            }
        }
        let refresh =
            dependent_entries(&entries, affected.iter().map(|a| a.intf))?;

        self.program(|hw| {
            for a in &affected {
                hw.member_port_add(a.kind, a.group_id, a.member_id, port)?;
            }
            for entry in &refresh {
                hw.route_refresh(entry)?;
            }
            Ok(())
        })?;

        for a in &affected {
            groups
                .table_mut(a.kind)
                .member_mut(a.member_id)?
                .ports
                .insert(port);
            entries.port_map.insert(port, a.intf);
        }
        debug!(self.log, "lag member up";
            "rtr_intf" => rtr_intf,
            "port" => port,
            "members" => affected.len(),
            "entries" => refresh.len());
        Ok(affected.len())
    }

    pub fn handle_lag_update(&self, update: LagUpdate) -> IpmcResult<usize> {
        match update {
            LagUpdate::MemberUp { rtr_intf, port } => {
                self.lag_member_up(rtr_intf, port)
            }
            LagUpdate::MemberDown { rtr_intf, port } => {
                self.lag_member_down(rtr_intf, port)
            }
        }
    }
}

// Task that spins, waiting for LAG membership events from the ASIC layer.
async fn handle_lag_updates<H: AsicOps>(
    ipmc: Arc<Ipmc<H>>,
    mut updates: mpsc::UnboundedReceiver<LagUpdate>,
) {
    let log = ipmc.log.new(o!("unit" => "lag_handler"));

    while let Some(update) = updates.recv().await {
        if let Err(e) = ipmc.handle_lag_update(update) {
            error!(log, "lag_update {update:?} failed: {e:?}");
        }
    }
    info!(log, "lag update channel closed");
}

/// Spawn a task that will receive LAG update events from this ASIC
pub fn init_update_handler<H>(
    ipmc: &Arc<Ipmc<H>>,
) -> IpmcResult<JoinHandle<()>>
where
    H: AsicOps + Send + Sync + 'static,
{
    // Updates arrive one port at a time, so an unbounded queue never grows
    // past a handful of events.
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::task::spawn(handle_lag_updates(ipmc.clone(), rx));
    if let Err(e) = ipmc.asic_hdl.register_lag_update_handler(tx) {
        task.abort();
        return Err(e.into());
    }
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use asic::chaos::{self, AsicConfig, Chaos};
    use asic::stub::StubHandle;
    use pretty_assertions::assert_eq;

    use crate::config::Config;
    use crate::types::{MemberCreate, ReplBinding};
    use common::mcast::{McRouteEntry, PacketAction, RouteEntryKey};

    const IPMC: GroupKind = GroupKind::Ipmc;
    const RPF: GroupKind = GroupKind::Rpf;

    fn key() -> RouteEntryKey {
        RouteEntryKey::xg(0, 1, "232.0.0.9".parse().unwrap())
    }

    // Router interface 7 is a member of IPMC groups 1 and 2 and RPF group 3,
    // with ports 70 and 71.  One entry uses IPMC group 1 and RPF group 3.
    fn populate<H: AsicOps>(ipmc: &Ipmc<H>) -> anyhow::Result<()> {
        for (kind, gid, mid) in [(IPMC, 1, 11), (IPMC, 2, 21), (RPF, 3, 31)] {
            ipmc.group_create(kind, gid, 0, ReplBinding::None)?;
            ipmc.member_add(
                kind,
                gid,
                MemberCreate {
                    member_id: mid,
                    switch_id: 0,
                    rtr_intf: 7,
                    ports: vec![70, 71],
                },
            )?;
        }
        ipmc.route_entry_create(McRouteEntry {
            key: key(),
            ipmc_group: 1,
            rpf_group: 3,
            action: PacketAction::Forward,
            cpu_port: false,
        })?;
        Ok(())
    }

    fn stub_ipmc() -> Ipmc<StubHandle> {
        let log = crate::test_logger();
        let stub = StubHandle::new(&log).unwrap();
        Ipmc::new(&log, stub, &Config::default())
    }

    #[test]
    fn test_member_down_and_up() -> anyhow::Result<()> {
        let ipmc = stub_ipmc();
        populate(&ipmc)?;

        assert_eq!(ipmc.lag_member_down(7, 71)?, 3);
        assert_eq!(ipmc.port_map_count(71), 0);
        for (kind, gid, mid) in [(IPMC, 1, 11), (IPMC, 2, 21), (RPF, 3, 31)] {
            assert_eq!(ipmc.member_get(kind, mid)?.ports, vec![70]);
            assert_eq!(
                ipmc.asic_hdl.member_ports(kind, gid, mid),
                Some(vec![70])
            );
        }
        // The entry depends on two of the three pairs, but is reprogrammed
        // once for the event
        assert_eq!(ipmc.asic_hdl.route_updates(&key()), 1);

        // Nothing left to remove, and another interface is unaffected
        assert_eq!(ipmc.lag_member_down(7, 71)?, 0);
        assert_eq!(ipmc.lag_member_down(8, 70)?, 0);

        assert_eq!(ipmc.lag_member_up(7, 72)?, 3);
        assert_eq!(ipmc.port_map_count(72), 3);
        assert_eq!(ipmc.member_get(IPMC, 21)?.ports, vec![70, 72]);
        assert_eq!(ipmc.asic_hdl.route_updates(&key()), 2);
        assert!(ipmc.audit_violations().is_empty());
        Ok(())
    }

    #[test]
    fn test_cascade_is_all_or_nothing() -> anyhow::Result<()> {
        let log = crate::test_logger();
        let config = AsicConfig {
            mc_route_update: Chaos::new(1.0),
            ..Default::default()
        };
        let hdl = chaos::Handle::new(&log, &config)?;
        let ipmc = Ipmc::new(&log, hdl, &Config::default());

        // Members come before the entry, so nothing is refreshed yet
        populate(&ipmc)?;

        assert!(ipmc.lag_member_down(7, 70).is_err());
        assert_eq!(ipmc.port_map_count(70), 3);
        let stub = ipmc.asic_hdl.stub();
        assert_eq!(stub.member_ports(IPMC, 2, 21), Some(vec![70, 71]));
        assert_eq!(stub.member_ports(RPF, 3, 31), Some(vec![70, 71]));
        assert!(ipmc.audit_violations().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_handler() -> anyhow::Result<()> {
        let ipmc = stub_ipmc();
        populate(&ipmc)?;
        let ipmc = Arc::new(ipmc);
        let _task = init_update_handler(&ipmc)?;

        // Only one handler may be registered
        assert!(init_update_handler(&ipmc).is_err());

        ipmc.asic_hdl.send_lag_update(LagUpdate::MemberDown {
            rtr_intf: 7,
            port: 70,
        })?;
        ipmc.asic_hdl.send_lag_update(LagUpdate::MemberUp {
            rtr_intf: 7,
            port: 75,
        })?;

        let mut done = false;
        for _ in 0..200 {
            if ipmc.port_map_count(70) == 0 && ipmc.port_map_count(75) == 3 {
                done = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(done, "lag updates were not applied");
        assert_eq!(ipmc.member_get(RPF, 31)?.ports, vec![71, 75]);
        Ok(())
    }
}
