// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! General types used throughout the multicast cache.

use std::convert;

use aal::{AsicError, HwHandle};
use common::mcast::{
    BridgePortId, GroupId, GroupKind, McRouteEntry, MemberId, ReplGroupId,
    RouterIntfId, SwitchId,
};
use serde::Serialize;

use crate::member::MemberHandle;

pub type IpmcResult<T> = Result<T, IpmcError>;

#[derive(Debug, thiserror::Error)]
pub enum IpmcError {
    #[error("I/O error: {0:?}")]
    Io(std::io::Error),
    #[error("ASIC error: {0:?}")]
    Switch(AsicError),
    #[error("Resource already exists: {0}")]
    Exists(String),
    #[error("Resource is busy: {0}")]
    Busy(String),
    #[error("Resource is missing: {0}")]
    Missing(String),
    #[error("Invalid argument: {0}")]
    Invalid(String),
    #[error("Table {0} is full")]
    TableFull(String),
    #[error("Buffer too small: {needed} entries needed, capacity {capacity}")]
    BufferOverflow { needed: usize, capacity: usize },
    #[error("Error: {0}")]
    Other(String),
    #[error("Unwind: initial: {initial}, unwind: {unwind}")]
    Unwind {
        initial: Box<IpmcError>,
        unwind: Box<IpmcError>,
    },
}

/// The classification reported to callers of the cache.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    strum::Display,
    strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    ObjectInUse,
    InvalidParameter,
    NoMemory,
    BufferOverflow,
    Failure,
}

impl IpmcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IpmcError::Missing(_) => ErrorKind::NotFound,
            IpmcError::Exists(_) => ErrorKind::AlreadyExists,
            IpmcError::Busy(_) => ErrorKind::ObjectInUse,
            IpmcError::Invalid(_) => ErrorKind::InvalidParameter,
            IpmcError::TableFull(_) => ErrorKind::NoMemory,
            IpmcError::BufferOverflow { .. } => ErrorKind::BufferOverflow,
            IpmcError::Io(_)
            | IpmcError::Switch(_)
            | IpmcError::Other(_)
            | IpmcError::Unwind { .. } => ErrorKind::Failure,
        }
    }
}

impl convert::From<std::io::Error> for IpmcError {
    fn from(err: std::io::Error) -> Self {
        IpmcError::Io(err)
    }
}

impl convert::From<AsicError> for IpmcError {
    fn from(err: AsicError) -> Self {
        IpmcError::Switch(err)
    }
}

/// How a group is bound to a replication resource when it is created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplBinding {
    /// The group replicates nothing
    #[default]
    None,
    /// Share a replication group that already exists
    Existing(ReplGroupId),
    /// Use the replication resource at `hw_index`, creating a new replication
    /// group for it unless one already holds that index
    Allocate { repl_id: ReplGroupId, hw_index: u32 },
}

/// The arguments needed to add a member to a group.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize)]
pub struct MemberCreate {
    pub member_id: MemberId,
    #[serde(default)]
    pub switch_id: SwitchId,
    pub rtr_intf: RouterIntfId,
    #[serde(default)]
    pub ports: Vec<BridgePortId>,
}

/// A snapshot of a single group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupView {
    pub kind: GroupKind,
    pub group_id: GroupId,
    pub switch_id: SwitchId,
    pub repl_group: Option<ReplGroupId>,
    pub hw_info: Option<HwHandle>,
    pub member_count: usize,
    /// Member ids, in insertion order
    pub members: Vec<MemberId>,
    pub route_refs: usize,
}

/// A snapshot of a single group member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MemberView {
    pub kind: GroupKind,
    pub handle: MemberHandle,
    pub member_id: MemberId,
    pub switch_id: SwitchId,
    pub group_id: GroupId,
    pub rtr_intf: RouterIntfId,
    pub ports: Vec<BridgePortId>,
    pub hw_info: Option<HwHandle>,
}

/// A route entry as cached, along with whether traffic has matched it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RouteEntryView {
    pub entry: McRouteEntry,
    pub hit: bool,
}

/// Copy a result set into a caller-supplied buffer.  If the buffer can't hold
/// all of it, nothing is copied.
pub fn copy_list<T: Copy>(items: &[T], buf: &mut [T]) -> IpmcResult<usize> {
    if items.len() > buf.len() {
        return Err(IpmcError::BufferOverflow {
            needed: items.len(),
            capacity: buf.len(),
        });
    }
    buf[..items.len()].copy_from_slice(items);
    Ok(items.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_list() {
        let mut buf = [0u64; 3];
        assert_eq!(copy_list(&[7, 8], &mut buf).unwrap(), 2);
        assert_eq!(buf, [7, 8, 0]);

        let mut small = [0u64; 1];
        match copy_list(&[1, 2, 3], &mut small) {
            Err(IpmcError::BufferOverflow { needed, capacity }) => {
                assert_eq!(needed, 3);
                assert_eq!(capacity, 1);
            }
            x => panic!("expected overflow, got {x:?}"),
        }
        // No partial copy
        assert_eq!(small, [0]);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            IpmcError::Busy("x".into()).kind(),
            ErrorKind::ObjectInUse
        );
        assert_eq!(
            IpmcError::from(AsicError::Synthetic("x".into())).kind(),
            ErrorKind::Failure
        );
        let unwind = IpmcError::Unwind {
            initial: Box::new(IpmcError::Missing("a".into())),
            unwind: Box::new(IpmcError::Other("b".into())),
        };
        assert_eq!(unwind.kind(), ErrorKind::Failure);
        assert_eq!(ErrorKind::NoMemory.to_string(), "no-memory");
    }
}
