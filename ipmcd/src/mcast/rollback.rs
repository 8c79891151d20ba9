// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! Rollback for multi-step hardware programming.
//!
//! Every hardware call made on behalf of a cache mutation goes through an
//! [`HwJournal`], which records the call that would reverse it.  If a later
//! step fails, the journal replays those inverse calls newest first, so the
//! hardware is returned to the state it was in before the mutation began and
//! the cache, which hasn't been touched yet, still matches it.

use std::fmt;

use slog::{debug, error};

use aal::{AsicOps, AsicResult, HwHandle, McMember};
use common::mcast::{
    BridgePortId, GroupId, GroupKind, McRouteEntry, MemberId, ReplGroupId,
    RouteEntryKey,
};

use crate::types::{IpmcError, IpmcResult};

/// The inverse of one hardware call.
#[derive(Debug)]
pub(crate) enum HwUndo {
    ReplGroupCreate {
        repl_id: ReplGroupId,
        hw_index: u32,
    },
    ReplGroupDestroy(ReplGroupId),
    GroupCreate {
        kind: GroupKind,
        group_id: GroupId,
        repl_index: Option<u32>,
    },
    GroupDestroy {
        kind: GroupKind,
        group_id: GroupId,
    },
    GroupModify {
        kind: GroupKind,
        group_id: GroupId,
        repl_index: Option<u32>,
    },
    MemberCreate {
        kind: GroupKind,
        group_id: GroupId,
        member: McMember,
    },
    MemberDestroy {
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
    },
    MemberPortAdd {
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
        port: BridgePortId,
    },
    MemberPortRemove {
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
        port: BridgePortId,
    },
    RouteCreate(McRouteEntry),
    RouteDestroy(RouteEntryKey),
    RouteUpdate(McRouteEntry),
    /// Reprogram an entry so it picks up group membership as it stands once
    /// every other step has been undone
    RouteRefresh(McRouteEntry),
}

impl fmt::Display for HwUndo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HwUndo::ReplGroupCreate { repl_id, .. } => {
                write!(f, "recreate replication group {repl_id}")
            }
            HwUndo::ReplGroupDestroy(repl_id) => {
                write!(f, "destroy replication group {repl_id}")
            }
            HwUndo::GroupCreate { kind, group_id, .. } => {
                write!(f, "recreate {kind} group {group_id}")
            }
            HwUndo::GroupDestroy { kind, group_id } => {
                write!(f, "destroy {kind} group {group_id}")
            }
            HwUndo::GroupModify { kind, group_id, .. } => {
                write!(f, "restore {kind} group {group_id} replication")
            }
            HwUndo::MemberCreate { kind, member, .. } => {
                write!(f, "recreate {kind} member {}", member.member_id)
            }
            HwUndo::MemberDestroy {
                kind, member_id, ..
            } => write!(f, "destroy {kind} member {member_id}"),
            HwUndo::MemberPortAdd {
                kind,
                member_id,
                port,
                ..
            } => write!(f, "re-add port {port} to {kind} member {member_id}"),
            HwUndo::MemberPortRemove {
                kind,
                member_id,
                port,
                ..
            } => {
                write!(f, "remove port {port} from {kind} member {member_id}")
            }
            HwUndo::RouteCreate(entry) => {
                write!(f, "recreate route entry {}", entry.key)
            }
            HwUndo::RouteDestroy(key) => {
                write!(f, "destroy route entry {key}")
            }
            HwUndo::RouteUpdate(entry) => {
                write!(f, "restore route entry {}", entry.key)
            }
            HwUndo::RouteRefresh(entry) => {
                write!(f, "refresh route entry {}", entry.key)
            }
        }
    }
}

impl HwUndo {
    fn apply<H: AsicOps>(&self, asic: &H) -> AsicResult<()> {
        match self {
            HwUndo::ReplGroupCreate { repl_id, hw_index } => {
                asic.mc_repl_group_create(*repl_id, *hw_index)
            }
            HwUndo::ReplGroupDestroy(repl_id) => {
                asic.mc_repl_group_destroy(*repl_id)
            }
            HwUndo::GroupCreate {
                kind,
                group_id,
                repl_index,
            } => asic
                .mc_group_create(*kind, *group_id, *repl_index)
                .map(|_| ()),
            HwUndo::GroupDestroy { kind, group_id } => {
                asic.mc_group_destroy(*kind, *group_id)
            }
            HwUndo::GroupModify {
                kind,
                group_id,
                repl_index,
            } => asic.mc_group_modify(*kind, *group_id, *repl_index),
            HwUndo::MemberCreate {
                kind,
                group_id,
                member,
            } => asic
                .mc_member_create(*kind, *group_id, member)
                .map(|_| ()),
            HwUndo::MemberDestroy {
                kind,
                group_id,
                member_id,
            } => asic.mc_member_destroy(*kind, *group_id, *member_id),
            HwUndo::MemberPortAdd {
                kind,
                group_id,
                member_id,
                port,
            } => asic.mc_member_port_add(*kind, *group_id, *member_id, *port),
            HwUndo::MemberPortRemove {
                kind,
                group_id,
                member_id,
                port,
            } => {
                asic.mc_member_port_remove(*kind, *group_id, *member_id, *port)
            }
            HwUndo::RouteCreate(entry) => asic.mc_route_create(entry),
            HwUndo::RouteDestroy(key) => asic.mc_route_destroy(key),
            HwUndo::RouteUpdate(entry) | HwUndo::RouteRefresh(entry) => {
                asic.mc_route_update(entry)
            }
        }
    }
}

/// A record of the hardware calls made so far by one cache mutation.
pub(crate) struct HwJournal<'a, H: AsicOps> {
    asic: &'a H,
    log: &'a slog::Logger,
    undo: Vec<HwUndo>,
}

impl<'a, H: AsicOps> HwJournal<'a, H> {
    pub(crate) fn new(asic: &'a H, log: &'a slog::Logger) -> Self {
        HwJournal {
            asic,
            log,
            undo: Vec::new(),
        }
    }

    pub(crate) fn repl_group_create(
        &mut self,
        repl_id: ReplGroupId,
        hw_index: u32,
    ) -> IpmcResult<()> {
        self.asic.mc_repl_group_create(repl_id, hw_index)?;
        self.undo.push(HwUndo::ReplGroupDestroy(repl_id));
        Ok(())
    }

    pub(crate) fn repl_group_destroy(
        &mut self,
        repl_id: ReplGroupId,
        hw_index: u32,
    ) -> IpmcResult<()> {
        self.asic.mc_repl_group_destroy(repl_id)?;
        self.undo
            .push(HwUndo::ReplGroupCreate { repl_id, hw_index });
        Ok(())
    }

    pub(crate) fn group_create(
        &mut self,
        kind: GroupKind,
        group_id: GroupId,
        repl_index: Option<u32>,
    ) -> IpmcResult<HwHandle> {
        let hdl = self.asic.mc_group_create(kind, group_id, repl_index)?;
        self.undo.push(HwUndo::GroupDestroy { kind, group_id });
        Ok(hdl)
    }

    /// Destroy a group.  `repl_index` is the binding to restore if the group
    /// has to be recreated.
    pub(crate) fn group_destroy(
        &mut self,
        kind: GroupKind,
        group_id: GroupId,
        repl_index: Option<u32>,
    ) -> IpmcResult<()> {
        self.asic.mc_group_destroy(kind, group_id)?;
        self.undo.push(HwUndo::GroupCreate {
            kind,
            group_id,
            repl_index,
        });
        Ok(())
    }

    pub(crate) fn group_modify(
        &mut self,
        kind: GroupKind,
        group_id: GroupId,
        old_index: Option<u32>,
        new_index: Option<u32>,
    ) -> IpmcResult<()> {
        self.asic.mc_group_modify(kind, group_id, new_index)?;
        self.undo.push(HwUndo::GroupModify {
            kind,
            group_id,
            repl_index: old_index,
        });
        Ok(())
    }

    pub(crate) fn member_create(
        &mut self,
        kind: GroupKind,
        group_id: GroupId,
        member: &McMember,
    ) -> IpmcResult<HwHandle> {
        let hdl = self.asic.mc_member_create(kind, group_id, member)?;
        self.undo.push(HwUndo::MemberDestroy {
            kind,
            group_id,
            member_id: member.member_id,
        });
        Ok(hdl)
    }

    /// Destroy a member.  `member` describes it as it stands in the hardware
    /// at the time of the call, which is how it will be recreated.
    pub(crate) fn member_destroy(
        &mut self,
        kind: GroupKind,
        group_id: GroupId,
        member: McMember,
    ) -> IpmcResult<()> {
        self.asic
            .mc_member_destroy(kind, group_id, member.member_id)?;
        self.undo.push(HwUndo::MemberCreate {
            kind,
            group_id,
            member,
        });
        Ok(())
    }

    pub(crate) fn member_port_add(
        &mut self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
        port: BridgePortId,
    ) -> IpmcResult<()> {
        self.asic
            .mc_member_port_add(kind, group_id, member_id, port)?;
        self.undo.push(HwUndo::MemberPortRemove {
            kind,
            group_id,
            member_id,
            port,
        });
        Ok(())
    }

    pub(crate) fn member_port_remove(
        &mut self,
        kind: GroupKind,
        group_id: GroupId,
        member_id: MemberId,
        port: BridgePortId,
    ) -> IpmcResult<()> {
        self.asic
            .mc_member_port_remove(kind, group_id, member_id, port)?;
        self.undo.push(HwUndo::MemberPortAdd {
            kind,
            group_id,
            member_id,
            port,
        });
        Ok(())
    }

    pub(crate) fn route_create(
        &mut self,
        entry: &McRouteEntry,
    ) -> IpmcResult<()> {
        self.asic.mc_route_create(entry)?;
        self.undo.push(HwUndo::RouteDestroy(entry.key));
        Ok(())
    }

    pub(crate) fn route_destroy(
        &mut self,
        entry: &McRouteEntry,
    ) -> IpmcResult<()> {
        self.asic.mc_route_destroy(&entry.key)?;
        self.undo.push(HwUndo::RouteCreate(entry.clone()));
        Ok(())
    }

    /// Replace the contents of an entry.
    pub(crate) fn route_update(
        &mut self,
        new: &McRouteEntry,
        old: &McRouteEntry,
    ) -> IpmcResult<()> {
        self.asic.mc_route_update(new)?;
        self.undo.push(HwUndo::RouteUpdate(old.clone()));
        Ok(())
    }

    /// Reprogram an unchanged entry after the membership of one of its groups
    /// has changed.
    pub(crate) fn route_refresh(
        &mut self,
        entry: &McRouteEntry,
    ) -> IpmcResult<()> {
        self.asic.mc_route_update(entry)?;
        self.undo.push(HwUndo::RouteRefresh(entry.clone()));
        Ok(())
    }

    /// Reverse every call recorded so far.  Refreshes are replayed last, once
    /// the group membership they depend on has been restored.  Returns the
    /// error that prompted the rollback, wrapped in `Unwind` if the rollback
    /// itself failed.
    pub(crate) fn unwind(self, initial: IpmcError) -> IpmcError {
        let (refresh, rest): (Vec<_>, Vec<_>) = self
            .undo
            .into_iter()
            .rev()
            .partition(|u| matches!(u, HwUndo::RouteRefresh(_)));

        let mut unwind_err = None;
        for undo in rest.iter().chain(refresh.iter()) {
            if let Err(e) = undo.apply(self.asic) {
                debug!(
                    self.log,
                    "failed operation during rollback";
                    "operation" => %undo,
                    "error" => ?e,
                );
                unwind_err.get_or_insert(IpmcError::from(e));
            }
        }

        match unwind_err {
            None => initial,
            Some(unwind) => {
                error!(self.log, "rollback failed";
                    "initial" => %initial, "unwind" => %unwind);
                IpmcError::Unwind {
                    initial: Box::new(initial),
                    unwind: Box::new(unwind),
                }
            }
        }
    }
}
