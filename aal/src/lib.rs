// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

use serde::{Deserialize, Serialize};
use thiserror::Error;

use common::mcast::{
    BridgePortId, GroupId, GroupKind, McRouteEntry, MemberId, ReplGroupId,
    RouteEntryKey, RouterIntfId,
};

/// Opaque token returned by the ASIC layer when it programs a group or
/// member.  The cache stores it and hands it back in dumps, nothing more.
pub type HwHandle = u64;

/// A specialized Result type for ASIC operations
pub type AsicResult<T> = Result<T, AsicError>;

/// Error type conveying additional information about ASIC errors
#[derive(Error, Debug)]
pub enum AsicError {
    /// An argument passed to the ASIC layer is invalid or inappropriate.  This
    /// indicates misbehavior from the caller.
    #[error("Invalid argument: {}", .0)]
    InvalidArg(String),
    /// This operation is unsupported by the ASIC model being used
    #[error("Operation unsupported by the ASIC")]
    OperationUnsupported,
    /// The ASIC layer detected some internal inconsistency
    #[error("Internal error: {}",.0)]
    Internal(String),
    /// An error derived from a purposely triggered synthetic fault for testing
    /// purposes.
    #[error("Synthetic ASIC error: {}", .0)]
    Synthetic(String),
    /// A general indication that a caller is trying to create something that
    /// already exists.
    #[error("Already exists")]
    Exists,
    /// A general indication that a caller is trying to modify something that
    /// is not present.
    #[error("Missing: {}", .0)]
    Missing(String),
}

/// The member of a group as the ASIC sees it: a router interface and the
/// physical ports that interface fans out to.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct McMember {
    pub member_id: MemberId,
    pub rtr_intf: RouterIntfId,
    pub ports: Vec<BridgePortId>,
}

/// The `AsicOps` trait is the table of hardware operations the multicast
/// cache drives.  Every call is synchronous from the cache's point of view and
/// is made while the cache holds the lock protecting the object being
/// programmed.  A failure here aborts the cache mutation that prompted it.
pub trait AsicOps {
    /// Allocate the replication resource at `hw_index`.
    fn mc_repl_group_create(
        &self,
        repl_id: ReplGroupId,
        hw_index: u32,
    ) -> AsicResult<()>;

    /// Release a replication resource.
    fn mc_repl_group_destroy(&self, repl_id: ReplGroupId) -> AsicResult<()>;

    /// Create an empty group, optionally bound to a replication index.
    fn mc_group_create(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        repl_index: Option<u32>,
    ) -> AsicResult<HwHandle>;

    /// Destroy an empty group.
    fn mc_group_destroy(
        &self,
        kind: GroupKind,
        group_id: GroupId,
    ) -> AsicResult<()>;

    /// Change the replication index a group is bound to.
    fn mc_group_modify(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        repl_index: Option<u32>,
    ) -> AsicResult<()>;

    /// Add a member, along with its initial set of ports, to a group.
    fn mc_member_create(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        member: &McMember,
    ) -> AsicResult<HwHandle>;

    /// Remove a member from a group.
    fn mc_member_destroy(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
    ) -> AsicResult<()>;

    /// Add a port to a member's fan-out.
    fn mc_member_port_add(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
        port: BridgePortId,
    ) -> AsicResult<()>;

    /// Remove a port from a member's fan-out.
    fn mc_member_port_remove(
        &self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
        port: BridgePortId,
    ) -> AsicResult<()>;

    /// Program a new route entry.
    fn mc_route_create(&self, entry: &McRouteEntry) -> AsicResult<()>;

    /// Remove a route entry.
    fn mc_route_destroy(&self, key: &RouteEntryKey) -> AsicResult<()>;

    /// Reprogram an existing route entry.  This is also used to refresh an
    /// entry after the membership of one of its groups has changed.
    fn mc_route_update(&self, entry: &McRouteEntry) -> AsicResult<()>;

    /// Report whether traffic has matched this entry.
    fn mc_route_hit(&self, key: &RouteEntryKey) -> AsicResult<bool>;

    /// Register with the ASIC layer to receive LagUpdate events
    fn register_lag_update_handler(
        &self,
        updates: tokio::sync::mpsc::UnboundedSender<LagUpdate>,
    ) -> AsicResult<()>;
}

/// When the link aggregation layer changes the set of physical ports backing
/// a router interface, it sends a LagUpdate event to the multicast cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum LagUpdate {
    /// `port` has become an active member of the LAG behind `rtr_intf`
    MemberUp {
        rtr_intf: RouterIntfId,
        port: BridgePortId,
    },
    /// `port` is no longer an active member of the LAG behind `rtr_intf`
    MemberDown {
        rtr_intf: RouterIntfId,
        port: BridgePortId,
    },
}
