// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use slog::{debug, info, o};
use tokio::sync::mpsc;

use aal::{AsicError, AsicOps, AsicResult, HwHandle, LagUpdate, McMember};
use common::mcast::{
    BridgePortId, GroupId, GroupKind, McRouteEntry, MemberId, ReplGroupId,
    RouteEntryKey, RouterIntfId,
};

pub mod multicast;

/// An ASIC with no hardware behind it.  Every operation is applied to an
/// in-memory model, which tests can inspect to confirm what the cache
/// programmed.
pub struct StubHandle {
    log: slog::Logger,
    mc_data: Mutex<multicast::McGroupData>,
    lag_tx: Mutex<Option<mpsc::UnboundedSender<LagUpdate>>>,
    next_hdl: AtomicU64,
}

impl StubHandle {
    pub fn new(log: &slog::Logger) -> AsicResult<Self> {
        let log = log.new(o!("unit" => "stub_asic"));
        info!(log, "initialized stub ASIC");
        Ok(StubHandle {
            log,
            mc_data: Mutex::new(multicast::init()),
            lag_tx: Mutex::new(None),
            next_hdl: AtomicU64::new(1),
        })
    }

    fn alloc_hdl(&self) -> HwHandle {
        self.next_hdl.fetch_add(1, Ordering::Relaxed)
    }

    /// Simulate the link aggregation layer reporting a change in the active
    /// ports behind a router interface.
    pub fn send_lag_update(&self, update: LagUpdate) -> AsicResult<()> {
        let tx = self.lag_tx.lock().unwrap();
        match tx.as_ref() {
            Some(tx) => tx.send(update).map_err(|e| {
                AsicError::Internal(format!("lag update channel closed: {e}"))
            }),
            None => Err(AsicError::Internal(
                "no lag update handler registered".into(),
            )),
        }
    }

    /// Mark whether traffic has matched a route entry.
    pub fn set_route_hit(
        &self,
        key: &RouteEntryKey,
        hit: bool,
    ) -> AsicResult<()> {
        self.mc_data.lock().unwrap().set_route_hit(key, hit)
    }

    pub fn repl_groups(&self) -> Vec<(ReplGroupId, u32)> {
        self.mc_data.lock().unwrap().repl_groups()
    }

    pub fn group_count(&self, kind: GroupKind) -> usize {
        self.mc_data.lock().unwrap().group_count(kind)
    }

    pub fn group_repl_index(
        &self,
        kind: GroupKind,
        group_id: GroupId,
    ) -> Option<Option<u32>> {
        self.mc_data.lock().unwrap().group_repl_index(kind, group_id)
    }

    pub fn member_ports(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
    ) -> Option<Vec<BridgePortId>> {
        self.mc_data
            .lock()
            .unwrap()
            .member_ports(kind, group_id, member_id)
    }

    pub fn member_rtr_intf(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
    ) -> Option<RouterIntfId> {
        self.mc_data
            .lock()
            .unwrap()
            .member_rtr_intf(kind, group_id, member_id)
    }

    pub fn route(&self, key: &RouteEntryKey) -> Option<McRouteEntry> {
        self.mc_data.lock().unwrap().route(key)
    }

    pub fn route_count(&self) -> usize {
        self.mc_data.lock().unwrap().route_count()
    }

    /// How many times an entry has been reprogrammed since it was created.
    pub fn route_updates(&self, key: &RouteEntryKey) -> usize {
        self.mc_data.lock().unwrap().route_updates(key)
    }
}

impl AsicOps for StubHandle {
    fn mc_repl_group_create(
        &self,
        repl_id: ReplGroupId,
        hw_index: u32,
    ) -> AsicResult<()> {
        debug!(self.log, "creating replication group";
            "repl_id" => repl_id, "hw_index" => hw_index);
        self.mc_data.lock().unwrap().repl_create(repl_id, hw_index)
    }

    fn mc_repl_group_destroy(&self, repl_id: ReplGroupId) -> AsicResult<()> {
        debug!(self.log, "destroying replication group"; "repl_id" => repl_id);
        self.mc_data.lock().unwrap().repl_destroy(repl_id)
    }

    fn mc_group_create(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        repl_index: Option<u32>,
    ) -> AsicResult<HwHandle> {
        debug!(self.log, "creating group";
            "kind" => %kind, "group_id" => group_id, "repl" => ?repl_index);
        self.mc_data
            .lock()
            .unwrap()
            .group_create(kind, group_id, repl_index)?;
        Ok(self.alloc_hdl())
    }

    fn mc_group_destroy(
        &self,
        kind: GroupKind,
        group_id: GroupId,
    ) -> AsicResult<()> {
        debug!(self.log, "destroying group";
            "kind" => %kind, "group_id" => group_id);
        self.mc_data.lock().unwrap().group_destroy(kind, group_id)
    }

    fn mc_group_modify(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        repl_index: Option<u32>,
    ) -> AsicResult<()> {
        self.mc_data
            .lock()
            .unwrap()
            .group_modify(kind, group_id, repl_index)
    }

    fn mc_member_create(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        member: &McMember,
    ) -> AsicResult<HwHandle> {
        debug!(self.log, "creating member";
            "kind" => %kind, "group_id" => group_id,
            "member_id" => member.member_id);
        self.mc_data
            .lock()
            .unwrap()
            .member_create(kind, group_id, member)?;
        Ok(self.alloc_hdl())
    }

    fn mc_member_destroy(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
    ) -> AsicResult<()> {
        self.mc_data
            .lock()
            .unwrap()
            .member_destroy(kind, group_id, member_id)
    }

    fn mc_member_port_add(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
        port: BridgePortId,
    ) -> AsicResult<()> {
        self.mc_data
            .lock()
            .unwrap()
            .member_port_add(kind, group_id, member_id, port)
    }

    fn mc_member_port_remove(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
        port: BridgePortId,
    ) -> AsicResult<()> {
        self.mc_data
            .lock()
            .unwrap()
            .member_port_remove(kind, group_id, member_id, port)
    }

    fn mc_route_create(&self, entry: &McRouteEntry) -> AsicResult<()> {
        debug!(self.log, "creating route entry"; "key" => %entry.key);
        self.mc_data.lock().unwrap().route_create(entry)
    }

    fn mc_route_destroy(&self, key: &RouteEntryKey) -> AsicResult<()> {
        debug!(self.log, "destroying route entry"; "key" => %key);
        self.mc_data.lock().unwrap().route_destroy(key)
    }

    fn mc_route_update(&self, entry: &McRouteEntry) -> AsicResult<()> {
        self.mc_data.lock().unwrap().route_update(entry)
    }

    fn mc_route_hit(&self, key: &RouteEntryKey) -> AsicResult<bool> {
        self.mc_data.lock().unwrap().route_hit(key)
    }

    fn register_lag_update_handler(
        &self,
        updates: mpsc::UnboundedSender<LagUpdate>,
    ) -> AsicResult<()> {
        let mut tx = self.lag_tx.lock().unwrap();
        if tx.is_some() {
            return Err(AsicError::Exists);
        }
        *tx = Some(updates);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn entry(ipmc: GroupId, rpf: GroupId) -> McRouteEntry {
        McRouteEntry {
            key: RouteEntryKey::xg(
                0,
                1,
                IpAddr::V4(Ipv4Addr::new(224, 1, 1, 1)),
            ),
            ipmc_group: ipmc,
            rpf_group: rpf,
            action: Default::default(),
            cpu_port: false,
        }
    }

    #[test]
    fn test_repl_binding() {
        let hdl = StubHandle::new(&crate::test_logger()).unwrap();
        assert!(hdl.mc_group_create(GroupKind::Ipmc, 1, Some(7)).is_err());
        hdl.mc_repl_group_create(100, 7).unwrap();
        assert!(hdl.mc_repl_group_create(101, 7).is_err());
        hdl.mc_group_create(GroupKind::Ipmc, 1, Some(7)).unwrap();
        assert_eq!(hdl.group_repl_index(GroupKind::Ipmc, 1), Some(Some(7)));

        // A bound replication resource can't be released
        assert!(hdl.mc_repl_group_destroy(100).is_err());
        hdl.mc_group_modify(GroupKind::Ipmc, 1, None).unwrap();
        hdl.mc_repl_group_destroy(100).unwrap();
    }

    #[test]
    fn test_member_ports() {
        let hdl = StubHandle::new(&crate::test_logger()).unwrap();
        hdl.mc_group_create(GroupKind::Rpf, 5, None).unwrap();
        let member = McMember {
            member_id: 9,
            rtr_intf: 3,
            ports: vec![10],
        };
        hdl.mc_member_create(GroupKind::Rpf, 5, &member).unwrap();
        assert!(hdl.mc_member_create(GroupKind::Rpf, 5, &member).is_err());
        assert!(hdl.mc_member_create(GroupKind::Ipmc, 5, &member).is_err());

        hdl.mc_member_port_add(GroupKind::Rpf, 5, 9, 11).unwrap();
        assert!(hdl.mc_member_port_add(GroupKind::Rpf, 5, 9, 11).is_err());
        assert_eq!(
            hdl.member_ports(GroupKind::Rpf, 5, 9),
            Some(vec![10, 11])
        );
        hdl.mc_member_port_remove(GroupKind::Rpf, 5, 9, 10).unwrap();
        assert!(hdl.mc_member_port_remove(GroupKind::Rpf, 5, 9, 10).is_err());

        assert!(hdl.mc_group_destroy(GroupKind::Rpf, 5).is_err());
        hdl.mc_member_destroy(GroupKind::Rpf, 5, 9).unwrap();
        hdl.mc_group_destroy(GroupKind::Rpf, 5).unwrap();
    }

    #[test]
    fn test_route_lifecycle() {
        let hdl = StubHandle::new(&crate::test_logger()).unwrap();
        let e = entry(1, 2);
        assert!(hdl.mc_route_create(&e).is_err());
        hdl.mc_group_create(GroupKind::Ipmc, 1, None).unwrap();
        hdl.mc_group_create(GroupKind::Rpf, 2, None).unwrap();
        hdl.mc_route_create(&e).unwrap();
        assert!(matches!(hdl.mc_route_create(&e), Err(AsicError::Exists)));
        assert!(hdl.mc_group_destroy(GroupKind::Rpf, 2).is_err());

        assert!(!hdl.mc_route_hit(&e.key).unwrap());
        hdl.set_route_hit(&e.key, true).unwrap();
        assert!(hdl.mc_route_hit(&e.key).unwrap());

        hdl.mc_route_update(&e).unwrap();
        assert_eq!(hdl.route_updates(&e.key), 1);

        hdl.mc_route_destroy(&e.key).unwrap();
        assert!(matches!(
            hdl.mc_route_destroy(&e.key),
            Err(AsicError::Missing(_))
        ));
    }

    #[tokio::test]
    async fn test_lag_update_delivery() {
        let hdl = StubHandle::new(&crate::test_logger()).unwrap();
        let update = LagUpdate::MemberDown {
            rtr_intf: 1,
            port: 2,
        };
        assert!(hdl.send_lag_update(update).is_err());

        let (tx, mut rx) = mpsc::unbounded_channel();
        hdl.register_lag_update_handler(tx.clone()).unwrap();
        assert!(hdl.register_lag_update_handler(tx).is_err());
        hdl.send_lag_update(update).unwrap();
        assert_eq!(rx.recv().await, Some(update));
    }
}
